//! Configuration module for the order expiry service.
//!
//! Configuration is a single TOML file. Any `${VAR}` or `${VAR:-default}`
//! reference is substituted from the process environment before parsing,
//! which is how the backend URL and both credentials are injected at deploy
//! time without being written to disk.

use expiry_types::{is_http_url, BackendConfig, CronSchedule};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep only the message, not the echoed input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub service: ServiceConfig,
	/// Managed backend URL and credentials.
	pub backend: BackendConfig,
	/// Order store implementations.
	pub storage: StorageConfig,
	/// Cron facility implementations.
	pub scheduler: SchedulerConfig,
	/// The recurring job installed by the registrar.
	#[serde(default)]
	pub job: JobConfig,
	/// HTTP API server. Absent means the server is not started.
	pub api: Option<ApiConfig>,
}

/// Identity of this service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Identifier included in startup logs.
	pub id: String,
}

/// Configuration for the order store backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of implementation names to their raw configuration.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the scheduler backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of implementation names to their raw configuration.
	pub implementations: HashMap<String, toml::Value>,
}

/// Definition of the recurring expiration job.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobConfig {
	/// Unique job name; registering again under this name replaces the job.
	#[serde(default = "default_job_name")]
	pub name: String,
	/// Five-field cron expression.
	#[serde(default = "default_job_schedule")]
	pub schedule: String,
	/// URL the job calls. Defaults to the backend's `expire-orders` function.
	pub worker_url: Option<String>,
}

impl Default for JobConfig {
	fn default() -> Self {
		Self {
			name: default_job_name(),
			schedule: default_job_schedule(),
			worker_url: None,
		}
	}
}

fn default_job_name() -> String {
	"expire-orders-hourly".to_string()
}

/// Top of every hour.
fn default_job_schedule() -> String {
	"0 * * * *".to_string()
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_api_host")]
	pub host: String,
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Maximum request body size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	#[serde(default)]
	pub cors: CorsConfig,
}

/// CORS configuration for both endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	/// `["*"]` allows any origin.
	#[serde(default = "default_allowed_origins")]
	pub allowed_origins: Vec<String>,
	#[serde(default = "default_allowed_headers")]
	pub allowed_headers: Vec<String>,
}

impl Default for CorsConfig {
	fn default() -> Self {
		Self {
			allowed_origins: default_allowed_origins(),
			allowed_headers: default_allowed_headers(),
		}
	}
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_max_request_size() -> usize {
	64 * 1024
}

fn default_allowed_origins() -> Vec<String> {
	vec!["*".to_string()]
}

fn default_allowed_headers() -> Vec<String> {
	["authorization", "x-client-info", "apikey", "content-type"]
		.into_iter()
		.map(String::from)
		.collect()
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of `VAR_NAME`, or with `default` for
/// `${VAR_NAME:-default}` when the variable is unset. Full-line `#` comments
/// are copied through untouched. Inputs are capped at 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut missing = None;
	let mut resolved = String::with_capacity(input.len());
	for line in input.split_inclusive('\n') {
		if line.trim_start().starts_with('#') {
			resolved.push_str(line);
			continue;
		}
		let replaced = re.replace_all(line, |caps: &regex::Captures<'_>| {
			let var_name = &caps[1];
			match (std::env::var(var_name), caps.get(2)) {
				(Ok(value), _) => value,
				(Err(_), Some(default)) => default.as_str().to_string(),
				(Err(_), None) => {
					missing.get_or_insert_with(|| var_name.to_string());
					String::new()
				},
			}
		});
		resolved.push_str(&replaced);
	}

	match missing {
		Some(var_name) => Err(ConfigError::Validation(format!(
			"Environment variable '{}' not found",
			var_name
		))),
		None => Ok(resolved),
	}
}

impl Config {
	/// Loads configuration from a file, resolving environment variables.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path.as_ref()).await?;
		content.parse()
	}

	/// URL the scheduled job calls.
	pub fn worker_url(&self) -> String {
		self.job
			.worker_url
			.clone()
			.unwrap_or_else(|| self.backend.function_url("expire-orders"))
	}

	/// Validates cross-field constraints that serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		if !is_http_url(&self.backend.url) {
			return Err(ConfigError::Validation(format!(
				"Backend url '{}' must be an http(s) URL",
				self.backend.url
			)));
		}
		if self.backend.timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"Backend timeout_seconds must be greater than 0".into(),
			));
		}

		validate_primary("storage", &self.storage.primary, &self.storage.implementations)?;
		validate_primary(
			"scheduler",
			&self.scheduler.primary,
			&self.scheduler.implementations,
		)?;

		if self.job.name.trim().is_empty() {
			return Err(ConfigError::Validation("Job name cannot be empty".into()));
		}
		CronSchedule::from_str(&self.job.schedule).map_err(|e| {
			ConfigError::Validation(format!("Invalid job schedule '{}': {}", self.job.schedule, e))
		})?;
		let worker_url = self.worker_url();
		if !is_http_url(&worker_url) {
			return Err(ConfigError::Validation(format!(
				"Job worker_url '{}' must be an http(s) URL",
				worker_url
			)));
		}

		if let Some(ref api) = self.api {
			if api.enabled && api.port == 0 {
				return Err(ConfigError::Validation(
					"API port must be greater than 0".into(),
				));
			}
		}

		Ok(())
	}
}

fn validate_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Parses TOML, resolving environment variables first and validating after.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

/// In-memory configuration for tests in downstream crates.
#[cfg(feature = "testing")]
impl Config {
	/// A valid configuration using the `memory` store and scheduler.
	pub fn for_testing() -> Self {
		let empty = || toml::Value::Table(toml::map::Map::new());
		Config {
			service: ServiceConfig {
				id: "expiry-test".to_string(),
			},
			backend: BackendConfig {
				url: "http://127.0.0.1:54321".to_string(),
				service_role_key: "service-role-test".into(),
				anon_key: "anon-test".into(),
				timeout_seconds: 5,
			},
			storage: StorageConfig {
				primary: "memory".to_string(),
				implementations: HashMap::from([("memory".to_string(), empty())]),
			},
			scheduler: SchedulerConfig {
				primary: "memory".to_string(),
				implementations: HashMap::from([("memory".to_string(), empty())]),
			},
			job: JobConfig::default(),
			api: None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const BASE: &str = r#"
[service]
id = "marketplace-expiry"

[backend]
url = "https://project.supabase.co"
service_role_key = "service"
anon_key = "anon"

[storage]
primary = "rest"
[storage.implementations.rest]
[storage.implementations.memory]

[scheduler]
primary = "pg_cron"
[scheduler.implementations.pg_cron]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("EXPIRY_TEST_HOST", "localhost");
		std::env::set_var("EXPIRY_TEST_PORT", "5432");

		let input = "host = \"${EXPIRY_TEST_HOST}:${EXPIRY_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		std::env::remove_var("EXPIRY_TEST_HOST");
		std::env::remove_var("EXPIRY_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${EXPIRY_MISSING_VAR:-fallback}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"fallback\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let result = resolve_env_vars("value = \"${EXPIRY_ABSENT_VAR}\"");
		assert!(result.unwrap_err().to_string().contains("EXPIRY_ABSENT_VAR"));
	}

	#[test]
	fn test_defaults() {
		let config: Config = BASE.parse().unwrap();

		assert_eq!(config.job.name, "expire-orders-hourly");
		assert_eq!(config.job.schedule, "0 * * * *");
		assert_eq!(
			config.worker_url(),
			"https://project.supabase.co/functions/v1/expire-orders"
		);
		assert_eq!(config.backend.timeout_seconds, 30);
		assert!(config.api.is_none());
	}

	#[test]
	fn test_credentials_from_environment() {
		std::env::set_var("EXPIRY_TEST_SERVICE_KEY", "svc-from-env");

		let config_str = BASE.replace("\"service\"", "\"${EXPIRY_TEST_SERVICE_KEY}\"");
		let config: Config = config_str.parse().unwrap();
		assert_eq!(config.backend.service_role_key.expose_secret(), "svc-from-env");

		std::env::remove_var("EXPIRY_TEST_SERVICE_KEY");
	}

	#[test]
	fn test_api_section() {
		let config_str = format!(
			"{}\n[api]\nenabled = true\nport = 8080\n[api.cors]\nallowed_origins = [\"https://app.example\"]\n",
			BASE
		);
		let config: Config = config_str.parse().unwrap();
		let api = config.api.unwrap();

		assert!(api.enabled);
		assert_eq!(api.port, 8080);
		assert_eq!(api.host, "127.0.0.1");
		assert_eq!(api.cors.allowed_origins, vec!["https://app.example"]);
		assert!(api.cors.allowed_headers.contains(&"apikey".to_string()));
	}

	#[test]
	fn test_invalid_schedule_rejected() {
		let config_str = format!("{}\n[job]\nschedule = \"every hour\"\n", BASE);
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("Invalid job schedule"));
	}

	#[test]
	fn test_missing_primary_rejected() {
		let config_str = BASE.replace("primary = \"rest\"", "primary = \"file\"");
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err
			.to_string()
			.contains("Primary storage 'file' not found in implementations"));
	}

	#[test]
	fn test_bad_urls_rejected() {
		let config_str = BASE.replace("https://project.supabase.co", "project.supabase.co");
		assert!(Config::from_str(&config_str).is_err());

		let config_str = format!("{}\n[job]\nworker_url = \"not-a-url\"\n", BASE);
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("worker_url"));
	}

	#[tokio::test]
	async fn test_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("expiry.toml");
		std::fs::write(&path, BASE).unwrap();

		let config = Config::from_file(&path).await.unwrap();
		assert_eq!(config.service.id, "marketplace-expiry");
		assert_eq!(config.storage.primary, "rest");
		assert!(config.scheduler.implementations.contains_key("pg_cron"));
	}

	#[test]
	fn test_comment_lines_are_not_resolved() {
		let input = "# set ${EXPIRY_UNSET_IN_COMMENT} before starting\n  # ${ALSO_UNSET}\nvalue = \"${EXPIRY_COMMENT_TEST:-x}\"\n";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(
			result,
			"# set ${EXPIRY_UNSET_IN_COMMENT} before starting\n  # ${ALSO_UNSET}\nvalue = \"x\"\n"
		);
	}

	#[test]
	fn test_shipped_config_parses() {
		// Fill the placeholders in the text so no process environment is touched
		let shipped = include_str!("../../../config/order-expiry.toml")
			.replace("${SUPABASE_URL}", "https://project.supabase.co")
			.replace("${SUPABASE_SERVICE_ROLE_KEY}", "service")
			.replace("${SUPABASE_ANON_KEY}", "anon");

		let config: Config = shipped.parse().unwrap();
		assert_eq!(config.backend.url, "https://project.supabase.co");
		assert_eq!(config.storage.primary, "rest");
		assert_eq!(config.scheduler.primary, "pg_cron");
		assert!(config.api.is_some_and(|api| api.enabled && api.port == 3000));
	}

	#[tokio::test]
	async fn test_from_missing_file() {
		let result = Config::from_file("/nonexistent/expiry.toml").await;
		assert!(matches!(result, Err(ConfigError::Io(_))));
	}
}
