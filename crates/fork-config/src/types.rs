//! Configuration types for the fork harness.

use crate::presets;
use fork_types::{ChainId, ForkError, ForkSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Complete harness configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
	/// How fork processes are launched
	#[serde(default)]
	pub node: NodeConfig,
	/// Contract deployment settings
	#[serde(default)]
	pub deployer: DeployerConfig,
	/// Per-chain settings keyed by chain name
	#[serde(default)]
	pub chains: BTreeMap<String, ChainConfig>,
}

/// Which local node implementation serves the forks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeBackend {
	#[default]
	Hardhat,
	Anvil,
}

impl fmt::Display for NodeBackend {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			NodeBackend::Hardhat => write!(f, "hardhat"),
			NodeBackend::Anvil => write!(f, "anvil"),
		}
	}
}

impl std::str::FromStr for NodeBackend {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"hardhat" => Ok(NodeBackend::Hardhat),
			"anvil" => Ok(NodeBackend::Anvil),
			other => Err(format!("Unknown node backend: {}", other)),
		}
	}
}

/// Fork process settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
	#[serde(default)]
	pub backend: NodeBackend,
	/// Executable override; defaults to `npx` for hardhat and `anvil` for anvil
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub program: Option<String>,
	/// Interface the forks bind to
	#[serde(default = "default_host")]
	pub host: String,
	/// Fixed pause between spawning a fork and polling it
	#[serde(default = "default_startup_delay_ms")]
	pub startup_delay_ms: u64,
	/// Upper bound on readiness polling
	#[serde(default = "default_ready_timeout_ms")]
	pub ready_timeout_ms: u64,
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	/// Directory receiving `<chain>-node.log` files
	#[serde(default = "default_log_dir")]
	pub log_dir: PathBuf,
}

impl Default for NodeConfig {
	fn default() -> Self {
		Self {
			backend: NodeBackend::default(),
			program: None,
			host: default_host(),
			startup_delay_ms: default_startup_delay_ms(),
			ready_timeout_ms: default_ready_timeout_ms(),
			poll_interval_ms: default_poll_interval_ms(),
			log_dir: default_log_dir(),
		}
	}
}

/// Contract deployment settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeployerConfig {
	/// Hex private key of the deployer account
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub private_key: Option<String>,
	/// Compiled contract artifact (Hardhat or Foundry JSON)
	#[serde(default = "default_artifact")]
	pub artifact: PathBuf,
}

impl Default for DeployerConfig {
	fn default() -> Self {
		Self {
			private_key: None,
			artifact: default_artifact(),
		}
	}
}

/// Chain-specific configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ChainConfig {
	/// Upstream RPC endpoint to fork from
	#[serde(default, alias = "rpc", skip_serializing_if = "Option::is_none")]
	pub rpc_url: Option<String>,
	/// Block to fork at; 0 means latest
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub block_number: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub chain_id: Option<u64>,
	/// Local port; defaults to the preset port
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub fork_port: Option<u16>,
	/// Gas price in wei, as a decimal string
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gas_price: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gas_limit: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timeout_ms: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub retries: Option<u32>,
}

impl ChainConfig {
	/// Gas price parsed to wei, if configured.
	pub fn gas_price_wei(&self) -> Result<Option<u128>, ForkError> {
		self.gas_price
			.as_deref()
			.map(|price| {
				price.parse::<u128>().map_err(|_| {
					ForkError::configuration_field(
						format!("Gas price must be a numeric string, got '{}'", price),
						"gas_price",
					)
				})
			})
			.transpose()
	}
}

impl Config {
	/// Names of every chain that can be resolved: configured chains plus presets.
	pub fn supported_chains(&self) -> Vec<String> {
		let mut names: Vec<String> = self.chains.keys().cloned().collect();
		for name in presets::preset_names() {
			if !self.chains.contains_key(name) {
				names.push(name.to_string());
			}
		}
		names.sort();
		names
	}

	/// Chain settings for `name`, falling back to an empty entry for presets.
	pub fn chain(&self, name: &str) -> Option<ChainConfig> {
		match self.chains.get(name) {
			Some(chain) => Some(chain.clone()),
			None => presets::preset(name).map(|_| ChainConfig::default()),
		}
	}

	/// Resolves everything needed to spawn a fork of `name`.
	pub fn resolve_fork(&self, name: &str) -> Result<ForkSpec, ForkError> {
		let preset = presets::preset(name);
		let chain = self.chain(name).ok_or_else(|| {
			ForkError::configuration_field(
				format!(
					"Unsupported chain: {}. Supported networks: {}",
					name,
					self.supported_chains().join(", ")
				),
				"chains",
			)
		})?;

		let rpc_url = chain
			.rpc_url
			.filter(|url| !url.trim().is_empty())
			.ok_or_else(|| {
				ForkError::configuration_field(
					format!(
						"RPC URL for {} is not configured. Please set rpc_url in the config file or one of: {}",
						name,
						presets::rpc_env_vars(name).join(", ")
					),
					"rpc_url",
				)
			})?;

		let port = chain
			.fork_port
			.or_else(|| preset.map(|p| p.port))
			.ok_or_else(|| {
				ForkError::configuration_field(
					format!("No fork port configured for {}", name),
					"fork_port",
				)
			})?;

		let chain_id = chain
			.chain_id
			.map(ChainId)
			.or_else(|| preset.map(|p| p.chain_id))
			.unwrap_or(ChainId::HARDHAT);

		Ok(ForkSpec {
			name: name.to_string(),
			rpc_url,
			port,
			block_number: chain.block_number.filter(|block| *block > 0),
			chain_id,
		})
	}
}

fn default_host() -> String {
	"127.0.0.1".to_string()
}

fn default_startup_delay_ms() -> u64 {
	5_000
}

fn default_ready_timeout_ms() -> u64 {
	100_000
}

fn default_poll_interval_ms() -> u64 {
	1_000
}

fn default_log_dir() -> PathBuf {
	PathBuf::from("./log")
}

fn default_artifact() -> PathBuf {
	PathBuf::from("artifacts/contracts/Multichain.sol/Multichain.json")
}
