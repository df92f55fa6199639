//! Command lines for fork node processes.

use fork_config::{NodeBackend, NodeConfig};
use fork_types::ForkSpec;
use std::fmt;

/// Program, arguments and extra environment for one fork node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCommand {
	pub program: String,
	pub args: Vec<String>,
	pub envs: Vec<(String, String)>,
}

impl NodeCommand {
	pub fn for_fork(node: &NodeConfig, spec: &ForkSpec) -> Self {
		match node.backend {
			NodeBackend::Hardhat => Self::hardhat(node, spec),
			NodeBackend::Anvil => Self::anvil(node, spec),
		}
	}

	/// `npx hardhat node ...`; an explicit program is the hardhat executable.
	fn hardhat(node: &NodeConfig, spec: &ForkSpec) -> Self {
		let (program, mut args) = match &node.program {
			Some(program) => (program.clone(), Vec::new()),
			None => ("npx".to_string(), vec!["hardhat".to_string()]),
		};

		args.extend([
			"node".to_string(),
			"--fork".to_string(),
			spec.rpc_url.clone(),
			"--port".to_string(),
			spec.port.to_string(),
			"--hostname".to_string(),
			node.host.clone(),
		]);
		if let Some(block) = spec.block_number {
			args.push("--fork-block-number".to_string());
			args.push(block.to_string());
		}

		Self {
			program,
			args,
			envs: vec![("HH_CHAIN_ID".to_string(), spec.chain_id.to_string())],
		}
	}

	fn anvil(node: &NodeConfig, spec: &ForkSpec) -> Self {
		let mut args = vec![
			"--fork-url".to_string(),
			spec.rpc_url.clone(),
			"--port".to_string(),
			spec.port.to_string(),
			"--host".to_string(),
			node.host.clone(),
			"--chain-id".to_string(),
			spec.chain_id.to_string(),
		];
		if let Some(block) = spec.block_number {
			args.push("--fork-block-number".to_string());
			args.push(block.to_string());
		}

		Self {
			program: node.program.clone().unwrap_or_else(|| "anvil".to_string()),
			args,
			envs: Vec::new(),
		}
	}

	pub fn to_command(&self) -> tokio::process::Command {
		let mut cmd = tokio::process::Command::new(&self.program);
		cmd.args(&self.args);
		cmd.envs(self.envs.iter().map(|(k, v)| (k, v)));
		cmd
	}
}

impl fmt::Display for NodeCommand {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.program)?;
		for arg in &self.args {
			write!(f, " {}", arg)?;
		}
		Ok(())
	}
}
