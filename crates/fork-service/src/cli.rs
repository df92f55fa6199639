//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "multifork")]
#[command(about = "Run and test local forks of several EVM networks", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
	/// Path to configuration file; the environment alone is used if it does not exist
	#[arg(short, long, env = "MULTIFORK_CONFIG", default_value = "multifork.toml")]
	pub config: PathBuf,

	/// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
	#[arg(long, env = "MULTIFORK_LOG_LEVEL", default_value = "info")]
	pub log_level: String,

	/// Emit logs as JSON
	#[arg(long)]
	pub json_logs: bool,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Fork a single network and keep it running until interrupted
	Fork {
		/// Network to fork (ethereum, polygon, sepolia, amoy)
		#[arg(short, long)]
		network: String,

		/// Block to fork from; 0 forks from the latest block
		#[arg(short, long)]
		block: u64,
	},

	/// Fork several networks, deploy Multichain to each and check what it reports
	TestMultichain {
		/// Chains to test; defaults to every chain with an RPC URL
		#[arg(long, value_delimiter = ',')]
		chains: Vec<String>,

		/// Compiled Multichain artifact (Hardhat or Foundry JSON)
		#[arg(long)]
		artifact: Option<PathBuf>,

		/// Print the reports as JSON
		#[arg(long)]
		json: bool,
	},

	/// Validate the configuration file
	Validate {
		/// Also require an RPC URL variable for every configured chain
		#[arg(long)]
		check_env: bool,
	},

	/// Generate an example configuration file
	GenerateConfig {
		#[arg(short, long, default_value = "multifork.toml")]
		output: PathBuf,

		/// Overwrite an existing file
		#[arg(long)]
		force: bool,
	},
}
