//! Compiled contract artifacts.

use alloy::primitives::Bytes;
use fork_types::ForkError;
use serde::Deserialize;
use std::path::Path;

/// Creation bytecode and ABI of a compiled contract.
#[derive(Debug, Clone)]
pub struct ContractArtifact {
	pub contract_name: Option<String>,
	pub abi: serde_json::Value,
	pub bytecode: Bytes,
}

#[derive(Deserialize)]
struct RawArtifact {
	#[serde(rename = "contractName")]
	contract_name: Option<String>,
	#[serde(default)]
	abi: serde_json::Value,
	bytecode: RawBytecode,
}

/// Hardhat stores bytecode as a string, Foundry nests it under `object`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
	Hex(String),
	Object { object: String },
}

impl ContractArtifact {
	pub fn load(path: &Path) -> Result<Self, ForkError> {
		let content = std::fs::read_to_string(path).map_err(|e| {
			ForkError::Deployment(format!(
				"Failed to read artifact {}: {}",
				path.display(),
				e
			))
		})?;

		Self::from_json(&content)
	}

	pub fn from_json(json: &str) -> Result<Self, ForkError> {
		let raw: RawArtifact = serde_json::from_str(json)
			.map_err(|e| ForkError::Deployment(format!("Invalid artifact: {}", e)))?;

		let code = match &raw.bytecode {
			RawBytecode::Hex(code) => code,
			RawBytecode::Object { object } => object,
		};
		let code = code.trim();
		let code = code.strip_prefix("0x").unwrap_or(code);

		if code.is_empty() {
			return Err(ForkError::Deployment(
				"Artifact has no bytecode; is the contract abstract or an interface?".to_string(),
			));
		}

		if code.contains("__") {
			return Err(ForkError::Deployment(
				"Artifact bytecode has unlinked library references".to_string(),
			));
		}

		let bytecode = hex::decode(code)
			.map_err(|e| ForkError::Deployment(format!("Invalid bytecode hex: {}", e)))?;

		Ok(Self {
			contract_name: raw.contract_name,
			abi: raw.abi,
			bytecode: Bytes::from(bytecode),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn test_hardhat_artifact() {
		let artifact = ContractArtifact::from_json(
			r#"{
				"_format": "hh-sol-artifact-1",
				"contractName": "Multichain",
				"abi": [],
				"bytecode": "0x6080604052",
				"deployedBytecode": "0x6080"
			}"#,
		)
		.unwrap();

		assert_eq!(artifact.contract_name.as_deref(), Some("Multichain"));
		assert_eq!(artifact.bytecode.as_ref(), &[0x60, 0x80, 0x60, 0x40, 0x52]);
	}

	#[test]
	fn test_foundry_artifact() {
		let artifact = ContractArtifact::from_json(
			r#"{
				"abi": [],
				"bytecode": { "object": "0x6080", "linkReferences": {} }
			}"#,
		)
		.unwrap();

		assert!(artifact.contract_name.is_none());
		assert_eq!(artifact.bytecode.len(), 2);
	}

	#[test]
	fn test_rejects_unusable_bytecode() {
		for json in [
			r#"{ "bytecode": "0x" }"#,
			r#"{ "bytecode": { "object": "" } }"#,
			r#"{ "bytecode": "0x60__$abc$__80" }"#,
			r#"{ "bytecode": "0xnothex" }"#,
			r#"{ "abi": [] }"#,
		] {
			let err = ContractArtifact::from_json(json).unwrap_err();
			assert!(matches!(err, ForkError::Deployment(_)), "{}", json);
		}
	}

	#[test]
	fn test_load_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(br#"{ "contractName": "Multichain", "bytecode": "0x00" }"#)
			.unwrap();

		let artifact = ContractArtifact::load(file.path()).unwrap();
		assert_eq!(artifact.bytecode.as_ref(), &[0x00]);

		let err = ContractArtifact::load(Path::new("/no/such/artifact.json")).unwrap_err();
		assert!(err.to_string().contains("Failed to read artifact"));
	}
}
