//! Subcommand implementations.

use anyhow::{bail, Context, Result};
use fork_config::{presets, Config, ConfigLoader, ConfigValidator};
use fork_core::{ChainManager, ChainReport, MultichainHarness};
use fork_deploy::{ContractArtifact, Deployer};
use fork_network::{fetch_block_number, CleanupRegistry};
use fork_types::{ForkError, ForkSpec};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Loads `path`, or builds the configuration from the environment when the
/// file does not exist.
pub fn load_config(path: &Path) -> Result<Config> {
	if path.exists() {
		info!("Loading configuration from: {:?}", path);
		ConfigLoader::from_file(path).context("Failed to load configuration")
	} else {
		info!("{:?} not found, using environment configuration", path);
		ConfigLoader::from_env().context("Failed to load configuration from environment")
	}
}

/// Checks the network name and block, then resolves what to spawn.
pub fn resolve_single_fork(
	config: &Config,
	network: &str,
	block: u64,
) -> Result<ForkSpec, ForkError> {
	if presets::preset(network).is_none() {
		return Err(ForkError::configuration_field(
			format!(
				"Invalid network name: {}. Supported networks: {}",
				network,
				presets::preset_names().collect::<Vec<_>>().join(", ")
			),
			"network",
		));
	}

	let mut spec = config.resolve_fork(network)?;
	spec.block_number = Some(block).filter(|block| *block > 0);
	Ok(spec)
}

pub async fn fork(mut config: Config, network: &str, block: u64) -> Result<()> {
	config.node.host = "127.0.0.1".to_string();
	let spec = resolve_single_fork(&config, network, block)?;

	let latest = fetch_block_number(&spec.rpc_url)
		.await
		.with_context(|| format!("Failed to reach the {} RPC endpoint", network))?;
	info!("Latest {} block: {}", network, latest);

	match spec.block_number {
		Some(block) if block > latest => warn!(
			"Requested block {} is above the latest {} block {}",
			block, network, latest
		),
		Some(block) => info!("Forking {} at block {}", network, block),
		None => info!("Forking {} at the latest block", network),
	}

	let manager = ChainManager::new(config);
	let setup = tokio::select! {
		result = manager.setup_specs(vec![spec]) => Some(result),
		_ = crate::setup_shutdown_signal() => None,
	};

	let handles = match setup {
		Some(result) => result,
		None => {
			info!("Shutdown signal received before the fork was ready");
			manager.cleanup().await;
			return Ok(());
		}
	};

	let handles = match handles {
		Ok(handles) => handles,
		Err(e) => {
			manager.cleanup().await;
			return Err(e).context(format!("Failed to start {} fork", network));
		}
	};

	for handle in handles.values() {
		info!(
			"Fork {} is running at {} (chain id {})",
			handle.name, handle.rpc_url, handle.chain_id
		);
	}

	crate::setup_shutdown_signal().await;
	info!("Shutdown signal received, stopping fork...");
	manager.cleanup().await;

	Ok(())
}

pub async fn test_multichain(
	mut config: Config,
	chains: Vec<String>,
	artifact: Option<PathBuf>,
	json: bool,
) -> Result<()> {
	if let Some(artifact) = artifact {
		config.deployer.artifact = artifact;
	}

	let key = match config.deployer.private_key.clone() {
		Some(key) => key,
		None => {
			ConfigValidator::new().validate_required_vars(&["DEPLOYER_PRIVATE_KEY"])?;
			bail!("No deployer private key configured");
		}
	};
	let deployer = Deployer::new(&key).context("Invalid deployer key")?;
	let artifact = ContractArtifact::load(&config.deployer.artifact)
		.context("Failed to load the Multichain artifact; compile the contract first")?;

	let chains = if chains.is_empty() {
		config
			.supported_chains()
			.into_iter()
			.filter(|name| config.resolve_fork(name).is_ok())
			.collect()
	} else {
		chains
	};
	if chains.is_empty() {
		bail!("No chain has an RPC URL configured");
	}

	info!("Deployer: {}", deployer.address());
	info!("Testing chains: {}", chains.join(", "));

	let manager = Arc::new(ChainManager::new(config));
	let registry = Arc::new(CleanupRegistry::new());
	manager.register_cleanup(&registry).await;
	let signals = registry
		.install_signal_handlers()
		.context("Failed to install signal handlers")?;

	let harness = MultichainHarness::new(manager.clone(), deployer, artifact);
	let result = harness.run(&chains).await;

	registry.execute_all().await;
	signals.abort();

	let reports = result.context("Failed to set up forks")?;
	print_reports(&reports, json)?;

	let failed: Vec<&str> = reports
		.iter()
		.filter(|report| !report.passed())
		.map(|report| report.chain.as_str())
		.collect();
	if !failed.is_empty() {
		bail!("Multichain check failed on: {}", failed.join(", "));
	}

	Ok(())
}

fn print_reports(reports: &[ChainReport], json: bool) -> Result<()> {
	if json {
		println!("{}", serde_json::to_string_pretty(reports)?);
		return Ok(());
	}

	for report in reports {
		let status = if report.passed() { "✅" } else { "❌" };
		println!("{} {}", status, report.chain);
		if let Some(address) = report.address {
			println!("   contract: {}", address);
		}
		if let Some(identity) = &report.identity {
			println!(
				"   getChain(): ({}, {})",
				identity.chain_id, identity.chain_name
			);
		}
		if let Some(block) = report.block_number {
			println!("   block: {}", block);
		}
		for error in &report.errors {
			println!("   error: {}", error);
		}
	}

	Ok(())
}

pub fn validate(path: &Path, check_env: bool) -> Result<()> {
	info!("Validating configuration file: {:?}", path);

	let validator = ConfigValidator::new();
	let config = match validator.load_and_validate(path) {
		Ok(config) => config,
		Err(report) => {
			error!("Configuration validation failed:");
			for e in &report.errors {
				error!("  - {}", e);
			}
			bail!("{} configuration errors", report.errors.len());
		}
	};

	info!("Configuration is valid");
	info!("Node backend: {}", config.node.backend);
	for name in config.chains.keys() {
		info!("  Chain: {}", name);
	}

	if check_env {
		let names: Vec<String> = config.chains.keys().cloned().collect();
		let report = validator.validate_environment(&names);
		if !report.is_valid() {
			for e in &report.errors {
				error!("  - {}", e);
			}
			bail!("Environment validation failed");
		}
		info!("Environment is complete");
	}

	Ok(())
}

pub fn generate_config(output: &Path, force: bool) -> Result<()> {
	if output.exists() && !force {
		bail!("{:?} already exists; pass --force to overwrite it", output);
	}

	if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
		std::fs::create_dir_all(parent)
			.with_context(|| format!("Failed to create {:?}", parent))?;
	}

	let sample = ConfigValidator::sample_toml()?;
	std::fs::write(output, sample).with_context(|| format!("Failed to write {:?}", output))?;

	info!("Wrote example configuration to {:?}", output);
	Ok(())
}
