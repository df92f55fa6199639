//! Bindings for the chain-identity contract.

use alloy::primitives::Address;
use alloy::providers::DynProvider;
use alloy::sol;
use fork_types::{ChainId, ForkError};
use serde::Serialize;

sol! {
	#[sol(rpc)]
	interface Multichain {
		function getChain() external view returns (uint256 chainId, string memory chainName);
	}
}

/// What a deployed `Multichain` contract reports about its chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainIdentity {
	pub chain_id: ChainId,
	pub chain_name: String,
}

impl ChainIdentity {
	/// Lists every field that differs from the expected values.
	pub fn mismatches(&self, chain_id: ChainId, chain_name: &str) -> Vec<String> {
		let mut mismatches = Vec::new();
		if self.chain_id != chain_id {
			mismatches.push(format!(
				"expected chain id {}, got {}",
				chain_id, self.chain_id
			));
		}
		if self.chain_name != chain_name {
			mismatches.push(format!(
				"expected chain name '{}', got '{}'",
				chain_name, self.chain_name
			));
		}
		mismatches
	}
}

/// Calls `getChain()` on the contract at `address`.
pub async fn query_chain_identity(
	provider: DynProvider,
	address: Address,
) -> Result<ChainIdentity, ForkError> {
	let contract = Multichain::new(address, provider);

	let result = contract
		.getChain()
		.call()
		.await
		.map_err(|e| ForkError::Deployment(format!("getChain() call failed: {}", e)))?;

	let chain_id = u64::try_from(result.chainId).map_err(|_| {
		ForkError::Deployment(format!("Chain id {} does not fit in u64", result.chainId))
	})?;

	Ok(ChainIdentity {
		chain_id: ChainId(chain_id),
		chain_name: result.chainName,
	})
}
