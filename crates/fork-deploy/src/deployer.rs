//! Signing and sending contract-creation transactions.

use crate::artifact::ContractArtifact;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, TxHash};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use fork_network::{retry_with_backoff, with_timeout, RetryOptions};
use fork_types::{ChainId, ForkError};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// Optional gas settings for the creation transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeployOverrides {
	pub gas_limit: Option<u64>,
	pub gas_price: Option<u128>,
}

/// Per-attempt timeout and retry schedule for deployments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeployOptions {
	pub timeout: Duration,
	pub retry: RetryOptions,
}

impl Default for DeployOptions {
	fn default() -> Self {
		Self {
			timeout: Duration::from_secs(60),
			retry: RetryOptions::default()
				.with_max_retries(3)
				.with_delay(Duration::from_millis(2_000)),
		}
	}
}

/// A contract that landed on a fork.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployedContract {
	pub chain: String,
	pub address: Address,
	pub tx_hash: TxHash,
	pub block_number: Option<u64>,
}

/// Deploys contracts from a single account.
pub struct Deployer {
	signer: PrivateKeySigner,
}

impl Deployer {
	/// Parses a 32-byte hex private key, with or without `0x`.
	pub fn new(private_key: &str) -> Result<Self, ForkError> {
		let key = private_key.trim();
		let digits = key.strip_prefix("0x").unwrap_or(key);

		if digits.len() != 64 {
			return Err(ForkError::configuration_field(
				format!(
					"Deployer private key must be 32 bytes of hex, got {} characters",
					digits.len()
				),
				"private_key",
			));
		}

		let signer = digits.parse::<PrivateKeySigner>().map_err(|e| {
			ForkError::configuration_field(format!("Invalid private key: {}", e), "private_key")
		})?;

		Ok(Self { signer })
	}

	pub fn address(&self) -> Address {
		self.signer.address()
	}

	/// Sends the creation transaction and waits for its receipt.
	pub async fn deploy(
		&self,
		chain: &str,
		rpc_url: &str,
		chain_id: ChainId,
		artifact: &ContractArtifact,
		overrides: &DeployOverrides,
	) -> Result<DeployedContract, ForkError> {
		let url = rpc_url.parse::<Url>().map_err(|e| {
			ForkError::configuration_field(format!("Invalid RPC URL {}: {}", rpc_url, e), "rpc_url")
		})?;

		let wallet = EthereumWallet::from(self.signer.clone());
		let provider = ProviderBuilder::new().wallet(wallet).connect_http(url);

		let mut request = TransactionRequest::default()
			.with_from(self.address())
			.with_chain_id(chain_id.0)
			.with_deploy_code(artifact.bytecode.clone());
		if let Some(gas_limit) = overrides.gas_limit {
			request = request.with_gas_limit(gas_limit);
		}
		if let Some(gas_price) = overrides.gas_price {
			request = request.with_gas_price(gas_price);
		}

		info!(
			"Deploying {} to {} from {}",
			artifact.contract_name.as_deref().unwrap_or("contract"),
			chain,
			self.address()
		);

		let pending = provider
			.send_transaction(request)
			.await
			.map_err(|e| ForkError::network_with_source(chain, "Failed to send deployment", e))?;

		let receipt = pending.get_receipt().await.map_err(|e| {
			ForkError::network_with_source(chain, "Failed to get deployment receipt", e)
		})?;

		if !receipt.status() {
			return Err(ForkError::Deployment(format!(
				"Deployment transaction {} reverted on {}",
				receipt.transaction_hash, chain
			)));
		}

		let address = receipt.contract_address.ok_or_else(|| {
			ForkError::Deployment(format!(
				"Receipt for {} on {} has no contract address",
				receipt.transaction_hash, chain
			))
		})?;

		info!("Deployed to {} at {}", chain, address);

		Ok(DeployedContract {
			chain: chain.to_string(),
			address,
			tx_hash: receipt.transaction_hash,
			block_number: receipt.block_number,
		})
	}

	/// [`Deployer::deploy`] with a per-attempt timeout and retries.
	pub async fn deploy_with_retry(
		&self,
		chain: &str,
		rpc_url: &str,
		chain_id: ChainId,
		artifact: &ContractArtifact,
		overrides: &DeployOverrides,
		options: &DeployOptions,
	) -> Result<DeployedContract, ForkError> {
		let message = format!("Deployment timeout on {}", chain);

		retry_with_backoff(&options.retry, || {
			with_timeout(
				self.deploy(chain, rpc_url, chain_id, artifact, overrides),
				options.timeout,
				Some(message.as_str()),
			)
		})
		.await
	}
}
