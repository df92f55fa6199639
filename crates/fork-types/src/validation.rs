//! Schema validation for TOML configuration values.
//!
//! A [`Schema`] can either stop at the first problem ([`Schema::validate`]) or
//! walk the whole value and report everything it finds
//! ([`Schema::collect_errors`]). The configuration validator uses the latter
//! so a user sees every mistake in one run.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
	/// Error that occurs when a required field is missing.
	#[error("Missing required field: {0}")]
	MissingField(String),
	/// Error that occurs when a field has an invalid value.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	/// Error that occurs when field type is incorrect.
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

impl ValidationError {
	/// Prefixes the field path, used when descending into nested tables.
	fn nested(self, parent: &str) -> Self {
		match self {
			ValidationError::MissingField(f) => {
				ValidationError::MissingField(format!("{}.{}", parent, f))
			}
			ValidationError::InvalidValue { field, message } => ValidationError::InvalidValue {
				field: format!("{}.{}", parent, field),
				message,
			},
			ValidationError::TypeMismatch {
				field,
				expected,
				actual,
			} => ValidationError::TypeMismatch {
				field: format!("{}.{}", parent, field),
				expected,
				actual,
			},
		}
	}
}

/// Type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
	Array(Box<FieldType>),
	Table(Schema),
}

/// Type alias for field validator functions.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A field definition with name and type.
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	/// Creates a new field with the given name and type.
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Adds a custom validator, run only once the type check passed.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value, errors: &mut Vec<ValidationError>) {
		let before = errors.len();
		check_field_type(&self.name, value, &self.field_type, errors);
		if errors.len() != before {
			return;
		}

		if let Some(validator) = &self.validator {
			if let Err(message) = validator(value) {
				errors.push(ValidationError::InvalidValue {
					field: self.name.clone(),
					message,
				});
			}
		}
	}
}

/// Schema definition with required and optional fields.
#[derive(Debug, Default)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	/// Creates a new schema with required and optional fields.
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML value against this schema, stopping at the first error.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		match self.collect_errors(config).into_iter().next() {
			Some(error) => Err(error),
			None => Ok(()),
		}
	}

	/// Validates a TOML value and returns every error found.
	pub fn collect_errors(&self, config: &toml::Value) -> Vec<ValidationError> {
		let mut errors = Vec::new();

		let Some(table) = config.as_table() else {
			errors.push(ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			});
			return errors;
		};

		for field in &self.required {
			match table.get(&field.name) {
				Some(value) => field.check(value, &mut errors),
				None => errors.push(ValidationError::MissingField(field.name.clone())),
			}
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value, &mut errors);
			}
		}

		errors
	}
}

fn type_mismatch(field_name: &str, expected: &str, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field_name.to_string(),
		expected: expected.to_string(),
		actual: value.type_str().to_string(),
	}
}

fn check_field_type(
	field_name: &str,
	value: &toml::Value,
	expected_type: &FieldType,
	errors: &mut Vec<ValidationError>,
) {
	match expected_type {
		FieldType::String => {
			if !value.is_str() {
				errors.push(type_mismatch(field_name, "string", value));
			}
		}
		FieldType::Integer { min, max } => {
			let Some(int_val) = value.as_integer() else {
				errors.push(type_mismatch(field_name, "integer", value));
				return;
			};

			if let Some(min_val) = min {
				if int_val < *min_val {
					errors.push(ValidationError::InvalidValue {
						field: field_name.to_string(),
						message: format!("Value {} is less than minimum {}", int_val, min_val),
					});
				}
			}

			if let Some(max_val) = max {
				if int_val > *max_val {
					errors.push(ValidationError::InvalidValue {
						field: field_name.to_string(),
						message: format!("Value {} is greater than maximum {}", int_val, max_val),
					});
				}
			}
		}
		FieldType::Boolean => {
			if !value.is_bool() {
				errors.push(type_mismatch(field_name, "boolean", value));
			}
		}
		FieldType::Array(inner_type) => {
			let Some(array) = value.as_array() else {
				errors.push(type_mismatch(field_name, "array", value));
				return;
			};

			for (i, item) in array.iter().enumerate() {
				check_field_type(&format!("{}[{}]", field_name, i), item, inner_type, errors);
			}
		}
		FieldType::Table(schema) => {
			errors.extend(
				schema
					.collect_errors(value)
					.into_iter()
					.map(|e| e.nested(field_name)),
			);
		}
	}
}

/// Trait defining a configuration schema that can validate TOML values.
pub trait ConfigSchema: Send + Sync {
	/// Validates a TOML configuration value, returning every problem found.
	fn validate(&self, config: &toml::Value) -> Vec<ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(contents: &str) -> toml::Value {
		toml::Value::Table(toml::from_str(contents).unwrap())
	}

	fn port_schema() -> Schema {
		Schema::new(
			vec![Field::new(
				"port",
				FieldType::Integer {
					min: Some(1),
					max: Some(65535),
				},
			)],
			vec![Field::new("host", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(host) if !host.is_empty() => Ok(()),
					_ => Err("host must not be empty".to_string()),
				}
			})],
		)
	}

	#[test]
	fn test_valid_table() {
		let value = parse("port = 8545\nhost = \"127.0.0.1\"");
		assert!(port_schema().validate(&value).is_ok());
	}

	#[test]
	fn test_collects_all_errors() {
		let value = parse("port = 0\nhost = \"\"");
		let errors = port_schema().collect_errors(&value);

		assert_eq!(errors.len(), 2);
		assert!(matches!(&errors[0], ValidationError::InvalidValue { field, .. } if field == "port"));
		assert!(matches!(&errors[1], ValidationError::InvalidValue { field, .. } if field == "host"));
	}

	#[test]
	fn test_missing_and_mismatched() {
		let value = parse("host = 1");
		let errors = port_schema().collect_errors(&value);

		assert_eq!(errors[0], ValidationError::MissingField("port".to_string()));
		assert!(matches!(
			&errors[1],
			ValidationError::TypeMismatch { field, expected, .. } if field == "host" && expected == "string"
		));
	}

	#[test]
	fn test_nested_table_paths() {
		let schema = Schema::new(
			vec![Field::new("node", FieldType::Table(port_schema()))],
			vec![],
		);
		let value = parse("[node]\nport = 70000");

		let err = schema.validate(&value).unwrap_err();
		assert!(matches!(err, ValidationError::InvalidValue { field, .. } if field == "node.port"));
	}

	#[test]
	fn test_array_items() {
		let schema = Schema::new(
			vec![Field::new("chains", FieldType::Array(Box::new(FieldType::String)))],
			vec![],
		);
		let value = parse("chains = [\"amoy\", 2]");

		let err = schema.validate(&value).unwrap_err();
		assert!(matches!(err, ValidationError::TypeMismatch { field, .. } if field == "chains[1]"));
	}
}
