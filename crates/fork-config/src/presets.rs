//! Built-in defaults for the networks the harness knows how to fork.

use fork_types::ChainId;

/// Defaults for one supported network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkPreset {
	pub name: &'static str,
	pub chain_id: ChainId,
	/// Local port the fork listens on.
	pub port: u16,
	/// Short block-number variable kept for existing `.env` files.
	pub block_env: &'static str,
}

pub const PRESETS: [NetworkPreset; 4] = [
	NetworkPreset {
		name: "ethereum",
		chain_id: ChainId::ETHEREUM,
		port: 8545,
		block_env: "ETH_BLOCK",
	},
	NetworkPreset {
		name: "polygon",
		chain_id: ChainId::POLYGON,
		port: 8546,
		block_env: "POLY_BLOCK",
	},
	NetworkPreset {
		name: "sepolia",
		chain_id: ChainId::SEPOLIA,
		port: 8547,
		block_env: "SEPOLIA_BLOCK",
	},
	NetworkPreset {
		name: "amoy",
		chain_id: ChainId::AMOY,
		port: 8548,
		block_env: "AMOY_BLOCK",
	},
];

pub fn preset(name: &str) -> Option<&'static NetworkPreset> {
	PRESETS.iter().find(|p| p.name == name)
}

pub fn preset_names() -> impl Iterator<Item = &'static str> {
	PRESETS.iter().map(|p| p.name)
}

/// Variables consulted for a chain's upstream RPC URL, in priority order.
pub fn rpc_env_vars(chain: &str) -> Vec<String> {
	let upper = env_name(chain);
	vec![
		format!("{}_RPC", upper),
		format!("{}_RPC_URL", upper),
		format!("{}_PROVIDER_URL", upper),
	]
}

/// Variables consulted for a chain's fork block number, in priority order.
pub fn block_env_vars(chain: &str) -> Vec<String> {
	let mut vars = vec![format!("{}_BLOCK_NUMBER", env_name(chain))];
	if let Some(preset) = preset(chain) {
		vars.push(preset.block_env.to_string());
	}
	vars
}

fn env_name(chain: &str) -> String {
	chain.to_ascii_uppercase().replace('-', "_")
}
