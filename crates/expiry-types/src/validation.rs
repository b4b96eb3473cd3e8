//! Configuration validation for pluggable implementations.
//!
//! Every store and scheduler backend receives its own raw TOML table. The
//! backend describes the table it accepts as a [`Schema`] and validates it
//! before construction, so misconfiguration fails at startup with a field
//! path instead of at the first scheduled run.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

impl ValidationError {
	/// Prefixes the field path with `parent.`.
	fn nested(self, parent: &str) -> Self {
		match self {
			ValidationError::MissingField(f) => {
				ValidationError::MissingField(format!("{}.{}", parent, f))
			},
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

/// The expected type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// An integer with optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
	Array(Box<FieldType>),
	Table(Schema),
}

/// Custom check run after type validation. Returns an error message on failure.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named field within a [`Schema`].
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
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		check_type(&self.name, value, &self.field_type)?;
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			})?;
		}
		Ok(())
	}
}

/// Required and optional fields of a TOML table.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML table against this schema.
	///
	/// Required fields must be present. Every present field must have the
	/// declared type and pass its validator. Unknown keys are ignored.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}

		Ok(())
	}
}

fn mismatch(field: &str, expected: &str, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field.to_string(),
		expected: expected.to_string(),
		actual: value.type_str().to_string(),
	}
}

fn check_type(
	field: &str,
	value: &toml::Value,
	expected: &FieldType,
) -> Result<(), ValidationError> {
	match expected {
		FieldType::String if !value.is_str() => Err(mismatch(field, "string", value)),
		FieldType::Boolean if !value.is_bool() => Err(mismatch(field, "boolean", value)),
		FieldType::String | FieldType::Boolean => Ok(()),
		FieldType::Integer { min, max } => {
			let n = value
				.as_integer()
				.ok_or_else(|| mismatch(field, "integer", value))?;
			if let Some(min) = min.filter(|min| n < *min) {
				return Err(ValidationError::InvalidValue {
					field: field.to_string(),
					message: format!("Value {} is less than minimum {}", n, min),
				});
			}
			if let Some(max) = max.filter(|max| n > *max) {
				return Err(ValidationError::InvalidValue {
					field: field.to_string(),
					message: format!("Value {} is greater than maximum {}", n, max),
				});
			}
			Ok(())
		},
		FieldType::Array(inner) => {
			let items = value
				.as_array()
				.ok_or_else(|| mismatch(field, "array", value))?;
			for (i, item) in items.iter().enumerate() {
				check_type(&format!("{}[{}]", field, i), item, inner)?;
			}
			Ok(())
		},
		FieldType::Table(schema) => schema.validate(value).map_err(|e| e.nested(field)),
	}
}

/// Validator accepting non-empty strings.
pub fn non_empty(value: &toml::Value) -> Result<(), String> {
	match value.as_str() {
		Some(s) if !s.trim().is_empty() => Ok(()),
		_ => Err("must not be empty".to_string()),
	}
}

/// Validator accepting absolute `http://` or `https://` URLs.
pub fn http_url(value: &toml::Value) -> Result<(), String> {
	let s = value.as_str().unwrap_or_default();
	if is_http_url(s) {
		Ok(())
	} else {
		Err(format!("'{}' is not an http(s) URL", s))
	}
}

/// Returns true for `http://host...` or `https://host...`.
pub fn is_http_url(s: &str) -> bool {
	["http://", "https://"]
		.iter()
		.filter_map(|scheme| s.strip_prefix(scheme))
		.any(|rest| !rest.is_empty() && !rest.starts_with('/'))
}

/// A schema-backed validator that implementations return from `config_schema()`.
pub trait ConfigSchema: Send + Sync {
	/// Validates a raw TOML implementation table.
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn table(s: &str) -> toml::Value {
		toml::from_str(s).unwrap()
	}

	#[test]
	fn test_required_and_optional_fields() {
		let schema = Schema::new(
			vec![Field::new("procedure", FieldType::String).with_validator(non_empty)],
			vec![Field::new(
				"timeout_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(300),
				},
			)],
		);

		assert!(schema.validate(&table("procedure = \"mark\"")).is_ok());
		assert!(matches!(
			schema.validate(&table("timeout_seconds = 5")),
			Err(ValidationError::MissingField(f)) if f == "procedure"
		));
		assert!(matches!(
			schema.validate(&table("procedure = \"  \"")),
			Err(ValidationError::InvalidValue { .. })
		));
		assert!(matches!(
			schema.validate(&table("procedure = \"m\"\ntimeout_seconds = 0")),
			Err(ValidationError::InvalidValue { field, .. }) if field == "timeout_seconds"
		));
		assert!(matches!(
			schema.validate(&table("procedure = 3")),
			Err(ValidationError::TypeMismatch { .. })
		));
	}

	#[test]
	fn test_nested_table_paths() {
		let schema = Schema::new(
			vec![Field::new(
				"target",
				FieldType::Table(Schema::new(
					vec![Field::new("url", FieldType::String).with_validator(http_url)],
					vec![Field::new("tags", FieldType::Array(Box::new(FieldType::String)))],
				)),
			)],
			vec![],
		);

		let err = schema
			.validate(&table("[target]\nurl = \"ftp://x\""))
			.unwrap_err();
		assert!(err.to_string().contains("target.url"));

		let err = schema
			.validate(&table("[target]\nurl = \"https://x\"\ntags = [\"a\", 1]"))
			.unwrap_err();
		assert!(err.to_string().contains("target.tags[1]"));
	}

	#[test]
	fn test_is_http_url() {
		assert!(is_http_url("https://project.supabase.co"));
		assert!(is_http_url("http://127.0.0.1:54321/functions/v1/x"));
		assert!(!is_http_url("https://"));
		assert!(!is_http_url("ftp://example.com"));
		assert!(!is_http_url("example.com"));
	}
}
