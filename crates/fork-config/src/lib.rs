// fork-config/src/lib.rs

use fork_types::ForkError;
use std::sync::Arc;
use thiserror::Error;

pub mod loader;
pub mod presets;
pub mod types;
pub mod validator;

pub use loader::ConfigLoader;
pub use presets::{NetworkPreset, PRESETS};
pub use types::*;
pub use validator::{ConfigValidator, ValidationReport};

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

impl From<ConfigError> for ForkError {
	fn from(err: ConfigError) -> Self {
		match err {
			ConfigError::IoError(e) => ForkError::Io(e),
			ConfigError::EnvVarNotFound(var) => ForkError::configuration_field(
				format!("Environment variable not found: {}", var),
				var,
			),
			other => ForkError::configuration(other.to_string()),
		}
	}
}

/// Looks up an environment variable by name.
///
/// Loading and validation read the environment through this so tests can
/// supply a fixed map instead of mutating the process environment.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Environment lookup backed by the process environment. Empty values count
/// as unset.
pub fn process_env() -> EnvLookup {
	Arc::new(|name: &str| std::env::var(name).ok().filter(|v| !v.is_empty()))
}

/// Environment lookup backed by a fixed set of pairs.
pub fn static_env<I, K, V>(vars: I) -> EnvLookup
where
	I: IntoIterator<Item = (K, V)>,
	K: Into<String>,
	V: Into<String>,
{
	let vars: std::collections::HashMap<String, String> = vars
		.into_iter()
		.map(|(k, v)| (k.into(), v.into()))
		.collect();
	Arc::new(move |name: &str| vars.get(name).filter(|v| !v.is_empty()).cloned())
}
