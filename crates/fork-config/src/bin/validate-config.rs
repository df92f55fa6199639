//! Configuration validation utility
//!
//! Usage: cargo run --bin validate-config config/multifork.toml

use std::env;
use std::path::Path;
use std::process;

use fork_config::ConfigValidator;

fn main() {
	let args: Vec<String> = env::args().collect();

	if args.len() != 2 {
		eprintln!("Usage: {} <config-file>", args[0]);
		process::exit(1);
	}

	let config_path = &args[1];

	println!("Validating configuration file: {}", config_path);

	match ConfigValidator::new().load_and_validate(Path::new(config_path)) {
		Ok(config) => {
			println!("✅ Configuration is valid!");
			println!("Node backend: {}", config.node.backend);
			println!("Chains configured: {}", config.chains.len());
			for (name, chain) in &config.chains {
				println!(
					"  {} (chain id: {}, block: {})",
					name,
					chain
						.chain_id
						.map(|id| id.to_string())
						.unwrap_or_else(|| "preset".to_string()),
					chain
						.block_number
						.filter(|block| *block > 0)
						.map(|block| block.to_string())
						.unwrap_or_else(|| "latest".to_string()),
				);
			}
		}
		Err(report) => {
			eprintln!("❌ Configuration validation failed:");
			for error in &report.errors {
				eprintln!("  - {}", error);
			}
			process::exit(1);
		}
	}
}
