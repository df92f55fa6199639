//! Error types shared across the fork harness.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ForkError>;

#[derive(Error, Debug)]
pub enum ForkError {
	/// An RPC endpoint (upstream or local fork) could not be reached or failed.
	#[error("Network error on '{network}': {message}")]
	Network {
		network: String,
		message: String,
		cause: Option<String>,
	},

	/// Missing or invalid configuration. Always fatal.
	#[error("Configuration error: {message}")]
	Configuration {
		message: String,
		field: Option<String>,
	},

	#[error("{message}")]
	Timeout { message: String, timeout_ms: u64 },

	#[error("Process error: {0}")]
	Process(String),

	#[error("Deployment error: {0}")]
	Deployment(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

impl ForkError {
	pub fn network(network: impl Into<String>, message: impl Into<String>) -> Self {
		Self::Network {
			network: network.into(),
			message: message.into(),
			cause: None,
		}
	}

	/// Network error that keeps the text of the underlying failure.
	pub fn network_with_source(
		network: impl Into<String>,
		message: impl Into<String>,
		source: impl std::fmt::Display,
	) -> Self {
		Self::Network {
			network: network.into(),
			message: message.into(),
			cause: Some(source.to_string()),
		}
	}

	pub fn configuration(message: impl Into<String>) -> Self {
		Self::Configuration {
			message: message.into(),
			field: None,
		}
	}

	pub fn configuration_field(message: impl Into<String>, field: impl Into<String>) -> Self {
		Self::Configuration {
			message: message.into(),
			field: Some(field.into()),
		}
	}

	/// Timeout error; falls back to a generic message when none is given.
	pub fn timeout(timeout_ms: u64, message: Option<&str>) -> Self {
		let message = message
			.map(str::to_string)
			.unwrap_or_else(|| format!("Operation timed out after {}ms", timeout_ms));
		Self::Timeout {
			message,
			timeout_ms,
		}
	}

	pub fn is_configuration(&self) -> bool {
		matches!(self, Self::Configuration { .. })
	}

	pub fn is_network(&self) -> bool {
		matches!(self, Self::Network { .. })
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout { .. })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_timeout_default_message() {
		let err = ForkError::timeout(2500, None);
		assert_eq!(err.to_string(), "Operation timed out after 2500ms");
		assert!(err.is_timeout());

		let err = ForkError::timeout(10, Some("Deployment timeout on amoy"));
		assert_eq!(err.to_string(), "Deployment timeout on amoy");
	}

	#[test]
	fn test_network_error_keeps_source() {
		let err = ForkError::network_with_source("sepolia", "Failed to connect", "refused");
		match err {
			ForkError::Network {
				network, cause, ..
			} => {
				assert_eq!(network, "sepolia");
				assert_eq!(cause.as_deref(), Some("refused"));
			}
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[test]
	fn test_configuration_field() {
		let err = ForkError::configuration_field("RPC URL not configured", "rpc_url");
		assert!(err.is_configuration());
		assert_eq!(
			err.to_string(),
			"Configuration error: RPC URL not configured"
		);
	}
}
