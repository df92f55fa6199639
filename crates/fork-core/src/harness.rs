//! Deploys the chain-identity contract to every fork and checks the result.

use crate::manager::{ChainManager, ForkHandle};
use alloy::primitives::Address;
use alloy::providers::Provider;
use fork_deploy::{
	query_chain_identity, ChainIdentity, ContractArtifact, DeployOptions, DeployOverrides, Deployer,
};
use fork_types::ForkError;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of the identity check on one fork.
#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
	pub chain: String,
	pub address: Option<Address>,
	pub identity: Option<ChainIdentity>,
	pub block_number: Option<u64>,
	pub errors: Vec<String>,
}

impl ChainReport {
	fn new(chain: &str) -> Self {
		Self {
			chain: chain.to_string(),
			address: None,
			identity: None,
			block_number: None,
			errors: Vec::new(),
		}
	}

	pub fn passed(&self) -> bool {
		self.errors.is_empty()
	}
}

pub struct MultichainHarness {
	manager: Arc<ChainManager>,
	deployer: Deployer,
	artifact: ContractArtifact,
}

impl MultichainHarness {
	pub fn new(manager: Arc<ChainManager>, deployer: Deployer, artifact: ContractArtifact) -> Self {
		Self {
			manager,
			deployer,
			artifact,
		}
	}

	/// Starts the forks, then deploys and checks every chain concurrently.
	pub async fn run<S: AsRef<str>>(&self, chains: &[S]) -> Result<Vec<ChainReport>, ForkError> {
		let handles = self.manager.setup_chains(chains).await?;
		info!("Forks ready: {}", handles.keys().cloned().collect::<Vec<_>>().join(", "));

		Ok(join_all(handles.values().map(|handle| self.check_chain(handle))).await)
	}

	async fn check_chain(&self, handle: &ForkHandle) -> ChainReport {
		let mut report = ChainReport::new(&handle.name);

		if let Err(e) = self.deploy_and_query(handle, &mut report).await {
			warn!("Chain {} failed: {}", handle.name, e);
			report.errors.push(e.to_string());
		}

		report
	}

	async fn deploy_and_query(
		&self,
		handle: &ForkHandle,
		report: &mut ChainReport,
	) -> Result<(), ForkError> {
		let chain = self.manager.config().chain(&handle.name).unwrap_or_default();
		let overrides = DeployOverrides {
			gas_limit: chain.gas_limit,
			gas_price: chain.gas_price_wei()?,
		};

		let mut options = DeployOptions::default();
		if let Some(timeout_ms) = chain.timeout_ms {
			options.timeout = Duration::from_millis(timeout_ms);
		}
		if let Some(retries) = chain.retries {
			options.retry.max_retries = retries;
		}

		let deployed = self
			.deployer
			.deploy_with_retry(
				&handle.name,
				&handle.rpc_url,
				handle.chain_id,
				&self.artifact,
				&overrides,
				&options,
			)
			.await?;
		report.address = Some(deployed.address);

		let identity = query_chain_identity(handle.provider.clone(), deployed.address).await?;
		report
			.errors
			.extend(identity.mismatches(handle.expected_chain_id, &handle.name));
		report.identity = Some(identity);

		let block_number = handle
			.provider
			.get_block_number()
			.await
			.map_err(|e| ForkError::network_with_source(&handle.name, "Failed to get block number", e))?;
		report.block_number = Some(block_number);

		if let Some(fork_block) = handle.block_number {
			if block_number < fork_block {
				report.errors.push(format!(
					"block number {} is below fork block {}",
					block_number, fork_block
				));
			}
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use fork_types::ChainId;

	#[test]
	fn test_report_passes_without_errors() {
		let mut report = ChainReport::new("amoy");
		report.identity = Some(ChainIdentity {
			chain_id: ChainId::AMOY,
			chain_name: "amoy".to_string(),
		});
		assert!(report.passed());

		report.errors.push("expected chain id 80002, got 31337".to_string());
		assert!(!report.passed());
	}

	#[test]
	fn test_report_serializes() {
		let report = ChainReport::new("sepolia");
		let json = serde_json::to_value(&report).unwrap();
		assert_eq!(json["chain"], "sepolia");
		assert!(json["address"].is_null());
	}

	#[tokio::test]
	async fn test_run_fails_on_config_errors() {
		let manager = Arc::new(ChainManager::new(fork_config::Config::default()));
		let deployer = Deployer::new(
			"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
		)
		.unwrap();
		let artifact = ContractArtifact::from_json(r#"{ "bytecode": "0x6080" }"#).unwrap();

		let harness = MultichainHarness::new(manager, deployer, artifact);
		// no RPC URL configured for amoy
		let err = harness.run(&["amoy"]).await.unwrap_err();
		assert!(err.is_configuration());
	}
}
