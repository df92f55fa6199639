//! Configuration loading from files and environment.

use crate::presets;
use crate::types::{ChainConfig, Config, NodeBackend};
use crate::{process_env, ConfigError, EnvLookup};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<PathBuf>,
	env_prefix: String,
	env: EnvLookup,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "MULTIFORK_".to_string(),
			env: process_env(),
		}
	}

	/// Loads a configuration file from the process environment.
	pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
		Self::new().with_file(path).load()
	}

	/// Builds a configuration from presets and environment variables only.
	pub fn from_env() -> Result<Config, ConfigError> {
		Self::new().load()
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_path_buf());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub fn with_env_lookup(mut self, env: EnvLookup) -> Self {
		self.env = env;
		self
	}

	/// Loads the configuration.
	///
	/// With a file the file is parsed after `${VAR}` substitution; without one
	/// the preset networks are used. Either way every preset network is
	/// present afterwards and environment overrides have been applied.
	pub fn load(&self) -> Result<Config, ConfigError> {
		let mut config = match &self.file_path {
			Some(path) => self.load_from_file(path)?,
			None => {
				info!("No configuration file given, using built-in networks");
				Config::default()
			}
		};

		for name in presets::preset_names() {
			config
				.chains
				.entry(name.to_string())
				.or_insert_with(ChainConfig::default);
		}

		self.apply_env_overrides(&mut config)?;
		Ok(config)
	}

	fn load_from_file(&self, path: &Path) -> Result<Config, ConfigError> {
		info!("Loading configuration from {:?}", path);
		let value = self.read_value(path)?;

		value
			.try_into::<Config>()
			.map_err(|e| ConfigError::ParseError(e.to_string()))
	}

	/// Reads a configuration file into an untyped TOML value.
	///
	/// JSON and YAML files are accepted by extension. Environment variables
	/// are substituted before parsing.
	pub fn read_value(&self, path: &Path) -> Result<toml::Value, ConfigError> {
		if !path.exists() {
			return Err(ConfigError::FileNotFound(path.display().to_string()));
		}

		let content = std::fs::read_to_string(path)?;
		let substituted = self.substitute_env_vars(&content)?;

		match path.extension().and_then(|s| s.to_str()) {
			Some("toml") | None => toml::from_str::<toml::Table>(&substituted)
				.map(toml::Value::Table)
				.map_err(|e| ConfigError::ParseError(format!("Failed to parse TOML: {}", e))),
			Some("json") => serde_json::from_str(&substituted)
				.map_err(|e| ConfigError::ParseError(format!("Failed to parse JSON: {}", e))),
			Some("yaml") | Some("yml") => serde_yaml::from_str(&substituted)
				.map_err(|e| ConfigError::ParseError(format!("Failed to parse YAML: {}", e))),
			Some(other) => Err(ConfigError::ParseError(format!(
				"Unsupported config format: {}",
				other
			))),
		}
	}

	/// Replaces `${VAR}` and `${VAR:-default}` with environment values.
	///
	/// Placeholders inside `#` comments are left alone.
	pub fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let re = env_pattern();
		let mut result = String::with_capacity(content.len());

		for line in content.split_inclusive('\n') {
			let (code, comment) = line.split_at(comment_start(line).unwrap_or(line.len()));

			for cap in re.captures_iter(code) {
				let var_name = &cap[1];
				if cap.get(2).is_none() && (self.env)(var_name).is_none() {
					return Err(ConfigError::EnvVarNotFound(var_name.to_string()));
				}
			}

			let replaced = re.replace_all(code, |cap: &regex::Captures<'_>| {
				let var_name = &cap[1];
				(self.env)(var_name)
					.or_else(|| cap.get(2).map(|m| m.as_str().to_string()))
					.unwrap_or_default()
			});
			result.push_str(&replaced);
			result.push_str(comment);
		}

		Ok(result)
	}

	fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
		if let Some(backend) = (self.env)(&format!("{}NODE_BACKEND", self.env_prefix)) {
			config.node.backend = backend
				.parse::<NodeBackend>()
				.map_err(ConfigError::ValidationError)?;
		}

		if let Some(log_dir) = (self.env)(&format!("{}LOG_DIR", self.env_prefix)) {
			config.node.log_dir = PathBuf::from(log_dir);
		}

		let has_key = config
			.deployer
			.private_key
			.as_deref()
			.is_some_and(|key| !key.trim().is_empty());
		if !has_key {
			config.deployer.private_key = (self.env)("DEPLOYER_PRIVATE_KEY");
			if config.deployer.private_key.is_some() {
				debug!("Using deployer key from environment");
			}
		}

		for (name, chain) in config.chains.iter_mut() {
			let has_url = chain
				.rpc_url
				.as_deref()
				.is_some_and(|url| !url.trim().is_empty());
			if !has_url {
				if let Some((var, url)) = self.first_set(&presets::rpc_env_vars(name)) {
					debug!("Using RPC URL for {} from {}", name, var);
					chain.rpc_url = Some(url);
				}
			}

			if chain.block_number.is_none() {
				if let Some((var, block)) = self.first_set(&presets::block_env_vars(name)) {
					let block = block.trim().parse::<u64>().map_err(|_| {
						ConfigError::ValidationError(format!(
							"Invalid block number in {}: {}",
							var, block
						))
					})?;
					chain.block_number = Some(block);
				}
			}
		}

		Ok(())
	}

	fn first_set(&self, vars: &[String]) -> Option<(String, String)> {
		vars.iter()
			.find_map(|var| (self.env)(var).map(|value| (var.clone(), value)))
	}
}

/// Byte offset of the first `#` outside a quoted string.
fn comment_start(line: &str) -> Option<usize> {
	let mut quote = None;
	let mut escaped = false;

	for (i, c) in line.char_indices() {
		match quote {
			Some('"') if escaped => escaped = false,
			Some('"') if c == '\\' => escaped = true,
			Some(q) if c == q => quote = None,
			Some(_) => {}
			None if c == '"' || c == '\'' => quote = Some(c),
			None if c == '#' => return Some(i),
			None => {}
		}
	}

	None
}

fn env_pattern() -> &'static Regex {
	static PATTERN: OnceLock<Regex> = OnceLock::new();
	PATTERN.get_or_init(|| {
		Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
			.expect("environment placeholder pattern is valid")
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::static_env;
	use std::io::Write;

	fn write_config(extension: &str, contents: &str) -> tempfile::NamedTempFile {
		let mut file = tempfile::Builder::new()
			.suffix(&format!(".{}", extension))
			.tempfile()
			.unwrap();
		file.write_all(contents.as_bytes()).unwrap();
		file
	}

	#[test]
	fn test_substitution_with_defaults() {
		let loader = ConfigLoader::new().with_env_lookup(static_env([("AMOY_RPC", "https://amoy")]));

		let out = loader
			.substitute_env_vars("a = \"${AMOY_RPC}\"\nb = \"${MISSING:-fallback}\"\nc = \"${EMPTY:-}\"")
			.unwrap();
		assert_eq!(out, "a = \"https://amoy\"\nb = \"fallback\"\nc = \"\"");
	}

	#[test]
	fn test_substitution_missing_var() {
		let loader = ConfigLoader::new().with_env_lookup(static_env(Vec::<(String, String)>::new()));

		let err = loader.substitute_env_vars("rpc_url = \"${NOPE}\"").unwrap_err();
		assert!(matches!(err, ConfigError::EnvVarNotFound(var) if var == "NOPE"));
	}

	#[test]
	fn test_load_toml_file() {
		let file = write_config(
			"toml",
			r#"
[node]
backend = "anvil"
startup_delay_ms = 0

[chains.sepolia]
rpc_url = "${SEPOLIA_RPC}"
block_number = 7200064

[chains.devnet]
rpc = "http://10.0.0.5:8545"
fork_port = 9545
chain_id = 1337
"#,
		);

		let config = ConfigLoader::new()
			.with_file(file.path())
			.with_env_lookup(static_env([("SEPOLIA_RPC", "https://sepolia.example.com")]))
			.load()
			.unwrap();

		assert_eq!(config.node.backend, NodeBackend::Anvil);
		assert_eq!(config.node.startup_delay_ms, 0);
		assert_eq!(
			config.chains["sepolia"].rpc_url.as_deref(),
			Some("https://sepolia.example.com")
		);
		assert_eq!(config.chains["devnet"].chain_id, Some(1337));
		// presets are merged in even when the file omits them
		assert!(config.chains.contains_key("amoy"));
	}

	#[test]
	fn test_load_json_file() {
		let file = write_config(
			"json",
			r#"{ "chains": { "amoy": { "rpcUrl": "ignored", "rpc_url": "https://amoy.example.com", "chain_id": 80002 } } }"#,
		);

		let config = ConfigLoader::new()
			.with_file(file.path())
			.with_env_lookup(static_env(Vec::<(String, String)>::new()))
			.load()
			.unwrap();

		assert_eq!(
			config.chains["amoy"].rpc_url.as_deref(),
			Some("https://amoy.example.com")
		);
	}

	#[test]
	fn test_missing_file() {
		let err = ConfigLoader::new()
			.with_file("/definitely/not/here.toml")
			.load()
			.unwrap_err();
		assert!(matches!(err, ConfigError::FileNotFound(_)));
	}

	#[test]
	fn test_env_only_config() {
		let config = ConfigLoader::new()
			.with_env_lookup(static_env([
				("ETHEREUM_RPC", "https://eth.example.com"),
				("ETH_BLOCK", "21625925"),
				("POLYGON_PROVIDER_URL", "https://polygon.example.com"),
				("AMOY_BLOCK_NUMBER", "15975574"),
				("DEPLOYER_PRIVATE_KEY", "0xabc"),
				("MULTIFORK_NODE_BACKEND", "anvil"),
			]))
			.load()
			.unwrap();

		let eth = config.resolve_fork("ethereum").unwrap();
		assert_eq!(eth.rpc_url, "https://eth.example.com");
		assert_eq!(eth.block_number, Some(21625925));

		let polygon = config.resolve_fork("polygon").unwrap();
		assert_eq!(polygon.rpc_url, "https://polygon.example.com");
		assert_eq!(polygon.block_number, None);

		assert_eq!(config.chains["amoy"].block_number, Some(15975574));
		assert!(config.resolve_fork("amoy").is_err());

		assert_eq!(config.deployer.private_key.as_deref(), Some("0xabc"));
		assert_eq!(config.node.backend, NodeBackend::Anvil);
	}

	#[test]
	fn test_file_values_win_over_env() {
		let file = write_config(
			"toml",
			r#"
[chains.ethereum]
rpc_url = "https://from-file.example.com"
block_number = 100
"#,
		);

		let config = ConfigLoader::new()
			.with_file(file.path())
			.with_env_lookup(static_env([
				("ETHEREUM_RPC", "https://from-env.example.com"),
				("ETH_BLOCK", "200"),
			]))
			.load()
			.unwrap();

		let eth = config.resolve_fork("ethereum").unwrap();
		assert_eq!(eth.rpc_url, "https://from-file.example.com");
		assert_eq!(eth.block_number, Some(100));
	}

	#[test]
	fn test_invalid_block_env() {
		let err = ConfigLoader::new()
			.with_env_lookup(static_env([("SEPOLIA_BLOCK", "latest")]))
			.load()
			.unwrap_err();
		assert!(matches!(err, ConfigError::ValidationError(msg) if msg.contains("SEPOLIA_BLOCK")));
	}

	#[test]
	fn test_placeholders_in_comments_are_ignored() {
		let loader = ConfigLoader::new().with_env_lookup(static_env([("AMOY_RPC", "https://amoy.example.com")]));

		let result = loader
			.substitute_env_vars(
				"# ${VAR} is replaced\nrpc_url = \"${AMOY_RPC}\" # or ${AMOY_PROVIDER_URL}\nname = \"a#b ${AMOY_RPC}\"\n",
			)
			.unwrap();

		assert_eq!(
			result,
			"# ${VAR} is replaced\nrpc_url = \"https://amoy.example.com\" # or ${AMOY_PROVIDER_URL}\nname = \"a#b https://amoy.example.com\"\n"
		);
	}

	#[test]
	fn test_example_config() {
		let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/multifork.toml");

		let config = ConfigLoader::new()
			.with_file(&path)
			.with_env_lookup(static_env([
				("AMOY_RPC", "https://amoy.example.com"),
				("DEPLOYER_PRIVATE_KEY", "0xabc"),
			]))
			.load()
			.unwrap();

		assert_eq!(config.deployer.private_key.as_deref(), Some("0xabc"));
		assert_eq!(config.chains["amoy"].gas_limit, Some(5_000_000));

		let amoy = config.resolve_fork("amoy").unwrap();
		assert_eq!(amoy.rpc_url, "https://amoy.example.com");
		assert_eq!(amoy.block_number, Some(15975574));
		assert!(config.resolve_fork("polygon").is_err());
	}
}
