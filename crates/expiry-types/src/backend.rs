//! Connection settings for the managed backend.

use crate::SecretString;
use serde::{Deserialize, Serialize};

/// Base URL and credentials of the backend-as-a-service.
///
/// The service-role key is privileged and used for writes. The anonymous
/// key is only embedded into scheduled job requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
	/// Base URL, e.g. `https://project.supabase.co`.
	pub url: String,
	pub service_role_key: SecretString,
	pub anon_key: SecretString,
	/// Timeout for each backend request.
	#[serde(default = "default_timeout_seconds")]
	pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
	30
}

impl BackendConfig {
	/// Joins `path` onto the base URL with exactly one slash between them.
	pub fn endpoint(&self, path: &str) -> String {
		format!(
			"{}/{}",
			self.url.trim_end_matches('/'),
			path.trim_start_matches('/')
		)
	}

	/// URL of the PostgREST API root.
	pub fn rest_url(&self) -> String {
		self.endpoint("rest/v1")
	}

	/// URL of a deployed function, e.g. `functions/v1/expire-orders`.
	pub fn function_url(&self, name: &str) -> String {
		self.endpoint(&format!("functions/v1/{}", name))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn backend(url: &str) -> BackendConfig {
		BackendConfig {
			url: url.to_string(),
			service_role_key: SecretString::from("service"),
			anon_key: SecretString::from("anon"),
			timeout_seconds: 30,
		}
	}

	#[test]
	fn test_endpoint_joining() {
		assert_eq!(
			backend("https://x.test/").rest_url(),
			"https://x.test/rest/v1"
		);
		assert_eq!(
			backend("https://x.test").function_url("expire-orders"),
			"https://x.test/functions/v1/expire-orders"
		);
	}
}
