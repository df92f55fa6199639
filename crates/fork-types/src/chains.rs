//! Chain-related types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chain identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
	pub const ETHEREUM: Self = Self(1);
	pub const POLYGON: Self = Self(137);
	pub const SEPOLIA: Self = Self(11155111);
	pub const AMOY: Self = Self(80002);
	/// Chain id a local hardhat node reports when nothing overrides it.
	pub const HARDHAT: Self = Self(31337);
}

impl fmt::Display for ChainId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for ChainId {
	type Err = std::num::ParseIntError;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		Ok(ChainId(s.parse()?))
	}
}

impl From<u64> for ChainId {
	fn from(value: u64) -> Self {
		ChainId(value)
	}
}

/// Fully resolved description of one fork to spawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkSpec {
	/// Chain name, also used as the cache key and log file prefix.
	pub name: String,
	/// Upstream RPC endpoint the fork reads state from.
	pub rpc_url: String,
	/// Local port the fork serves JSON-RPC on.
	pub port: u16,
	/// Block to pin the fork to. `None` forks from the latest block.
	pub block_number: Option<u64>,
	/// Chain id the fork is expected to report.
	pub chain_id: ChainId,
}

impl ForkSpec {
	/// JSON-RPC URL of the running fork.
	pub fn local_url(&self, host: &str) -> String {
		format!("http://{}:{}", host, self.port)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_chain_id_constants() {
		assert_eq!(ChainId::ETHEREUM.0, 1);
		assert_eq!(ChainId::POLYGON.0, 137);
		assert_eq!(ChainId::SEPOLIA.0, 11155111);
		assert_eq!(ChainId::AMOY.0, 80002);
		assert_eq!(ChainId::HARDHAT.0, 31337);
	}

	#[test]
	fn test_chain_id_display_and_parse() {
		assert_eq!(ChainId(80002).to_string(), "80002");
		assert_eq!("137".parse::<ChainId>().unwrap(), ChainId::POLYGON);
		assert!("polygon".parse::<ChainId>().is_err());
	}

	#[test]
	fn test_local_url() {
		let spec = ForkSpec {
			name: "sepolia".to_string(),
			rpc_url: "https://sepolia.example.com".to_string(),
			port: 8547,
			block_number: Some(7200064),
			chain_id: ChainId::SEPOLIA,
		};

		assert_eq!(spec.local_url("127.0.0.1"), "http://127.0.0.1:8547");
	}
}
