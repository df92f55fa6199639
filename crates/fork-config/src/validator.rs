//! Validation of harness configuration files.
//!
//! Unlike [`ConfigLoader`], the validator looks at the raw file contents and
//! reports every problem it finds instead of stopping at the first one.

use crate::presets;
use crate::types::{ChainConfig, Config};
use crate::{process_env, ConfigLoader, EnvLookup};
use fork_types::{ConfigSchema, Field, FieldType, ForkError, Schema, ValidationError};
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

/// Every error found while validating a configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
	pub errors: Vec<String>,
}

impl ValidationReport {
	pub fn is_valid(&self) -> bool {
		self.errors.is_empty()
	}

	fn single(error: impl Into<String>) -> Self {
		Self {
			errors: vec![error.into()],
		}
	}
}

impl fmt::Display for ValidationReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, error) in self.errors.iter().enumerate() {
			if i > 0 {
				writeln!(f)?;
			}
			write!(f, "{}", error)?;
		}
		Ok(())
	}
}

/// Field rules for one `[chains.<name>]` table.
pub struct ChainSchema;

impl ChainSchema {
	fn schema() -> Schema {
		let url_field = |name: &str| {
			Field::new(name, FieldType::String).with_validator(|value| {
				let url = value.as_str().unwrap_or_default();
				if url.is_empty() || is_valid_url(url) {
					Ok(())
				} else {
					Err(format!("Invalid RPC URL format: {}", url))
				}
			})
		};

		Schema::new(
			vec![],
			vec![
				url_field("rpc_url"),
				url_field("rpc"),
				Field::new(
					"block_number",
					FieldType::Integer {
						min: Some(0),
						max: None,
					},
				),
				Field::new(
					"chain_id",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
				Field::new(
					"fork_port",
					FieldType::Integer {
						min: Some(1),
						max: Some(u16::MAX as i64),
					},
				),
				Field::new(
					"timeout_ms",
					FieldType::Integer {
						min: Some(1000),
						max: None,
					},
				),
				Field::new(
					"retries",
					FieldType::Integer {
						min: Some(0),
						max: Some(10),
					},
				),
				Field::new("gas_price", FieldType::String).with_validator(|value| {
					let price = value.as_str().unwrap_or_default();
					if !price.is_empty() && price.bytes().all(|b| b.is_ascii_digit()) {
						Ok(())
					} else {
						Err("Gas price must be a numeric string".to_string())
					}
				}),
				Field::new(
					"gas_limit",
					FieldType::Integer {
						min: Some(21000),
						max: None,
					},
				),
			],
		)
	}
}

impl ConfigSchema for ChainSchema {
	fn validate(&self, config: &toml::Value) -> Vec<ValidationError> {
		let mut errors = Self::schema().collect_errors(config);

		if let Some(table) = config.as_table() {
			let has_url = ["rpc_url", "rpc"]
				.iter()
				.any(|key| {
					table
						.get(*key)
						.and_then(|v| v.as_str())
						.is_some_and(|url| !url.trim().is_empty())
				});
			if !has_url {
				errors.insert(0, ValidationError::MissingField("rpc_url".to_string()));
			}
		}

		errors
	}
}

/// Validates configuration files and the environment they rely on.
pub struct ConfigValidator {
	env: EnvLookup,
}

impl Default for ConfigValidator {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigValidator {
	pub fn new() -> Self {
		Self { env: process_env() }
	}

	pub fn with_env_lookup(mut self, env: EnvLookup) -> Self {
		self.env = env;
		self
	}

	/// Validates a whole configuration value.
	pub fn validate(&self, config: &toml::Value) -> ValidationReport {
		let Some(root) = config.as_table() else {
			return ValidationReport::single("Configuration must be a table");
		};

		let Some(chains) = root.get("chains") else {
			return ValidationReport::single("Configuration must have a chains table");
		};

		let Some(chains) = chains.as_table() else {
			return ValidationReport::single("chains must be a table");
		};

		self.validate_chains(chains)
	}

	/// Validates every `[chains.<name>]` entry.
	pub fn validate_chains(&self, chains: &toml::Table) -> ValidationReport {
		let mut report = ValidationReport::default();

		for (name, chain) in chains {
			debug!("Validating chain {}", name);

			for error in ChainSchema.validate(chain) {
				report.errors.push(describe_chain_error(name, &error));
			}

			if !chain_name_pattern().is_match(name) {
				report.errors.push(format!(
					"Invalid chain name '{}': Must start with a letter and contain only letters, numbers, underscores, and hyphens",
					name
				));
			}
		}

		report
	}

	/// Reads, substitutes and validates a configuration file.
	///
	/// Returns the parsed configuration only when no errors were found.
	pub fn load_and_validate(&self, path: &Path) -> Result<Config, ValidationReport> {
		let loader = ConfigLoader::new().with_env_lookup(self.env.clone());

		let value = loader
			.read_value(path)
			.map_err(|e| ValidationReport::single(format!("Failed to load config file: {}", e)))?;

		let report = self.validate(&value);
		if !report.is_valid() {
			return Err(report);
		}

		value
			.try_into::<Config>()
			.map_err(|e| ValidationReport::single(format!("Failed to load config file: {}", e)))
	}

	/// Checks that every chain has an RPC URL variable set.
	pub fn validate_environment(&self, chain_names: &[String]) -> ValidationReport {
		let mut report = ValidationReport::default();

		for name in chain_names {
			let vars = presets::rpc_env_vars(name);
			if !vars.iter().any(|var| (self.env)(var).is_some()) {
				report.errors.push(format!(
					"Missing environment variable for {}: {}",
					name,
					vars.join(" or ")
				));
			}
		}

		report
	}

	/// Fails with one error naming every unset variable.
	pub fn validate_required_vars(&self, vars: &[&str]) -> Result<(), ForkError> {
		let missing: Vec<&str> = vars
			.iter()
			.copied()
			.filter(|var| (self.env)(var).is_none())
			.collect();

		if missing.is_empty() {
			return Ok(());
		}

		Err(ForkError::configuration(format!(
			"Missing required environment variables: {}. Please check your environment and ensure all required variables are set.",
			missing.join(", ")
		)))
	}

	/// Sample configuration covering two mainnets.
	pub fn sample_config() -> Config {
		let mut config = Config::default();
		config.chains.insert(
			"ethereum".to_string(),
			ChainConfig {
				rpc_url: Some("https://eth-mainnet.g.alchemy.com/v2/YOUR_API_KEY".to_string()),
				block_number: Some(0),
				chain_id: Some(1),
				timeout_ms: Some(30_000),
				retries: Some(3),
				..Default::default()
			},
		);
		config.chains.insert(
			"polygon".to_string(),
			ChainConfig {
				rpc_url: Some("https://polygon-mainnet.g.alchemy.com/v2/YOUR_API_KEY".to_string()),
				block_number: Some(0),
				chain_id: Some(137),
				timeout_ms: Some(30_000),
				retries: Some(3),
				..Default::default()
			},
		);
		config
	}

	/// The sample configuration rendered as TOML.
	pub fn sample_toml() -> Result<String, ForkError> {
		toml::to_string_pretty(&Self::sample_config()).map_err(|e| {
			ForkError::configuration(format!("Failed to render sample configuration: {}", e))
		})
	}
}

fn describe_chain_error(chain: &str, error: &ValidationError) -> String {
	match error {
		ValidationError::MissingField(field) if field == "rpc_url" => {
			format!("Chain '{}': Either 'rpc_url' or 'rpc' must be provided", chain)
		}
		other => format!("Chain '{}': {}", chain, other),
	}
}

fn is_valid_url(url: &str) -> bool {
	["http://", "https://", "ws://", "wss://"]
		.iter()
		.find_map(|scheme| url.strip_prefix(scheme))
		.is_some_and(|rest| {
			let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
			!host.is_empty() && !rest.chars().any(char::is_whitespace)
		})
}

fn chain_name_pattern() -> &'static Regex {
	static PATTERN: OnceLock<Regex> = OnceLock::new();
	PATTERN.get_or_init(|| {
		Regex::new(r"^[a-zA-Z][a-zA-Z0-9_-]*$").expect("chain name pattern is valid")
	})
}
