//! API types for the expiry service HTTP endpoints.
//!
//! Both endpoints answer with a small JSON envelope carrying an ISO-8601
//! timestamp. Failures always render as HTTP 500 with `{error, timestamp}`.

use crate::utils::now_timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Optional body accepted by the expire-orders endpoint.
///
/// The `scheduled` marker is only logged; it never changes behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpireOrdersRequest {
	#[serde(default)]
	pub scheduled: bool,
}

/// Success body of the expire-orders endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpireOrdersResponse {
	pub success: bool,
	pub message: String,
	pub timestamp: String,
}

/// Success body of the setup-cron endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupCronResponse {
	pub success: bool,
	pub message: String,
	/// Human readable description of the installed schedule.
	pub schedule: String,
	pub timestamp: String,
}

/// Failure body shared by all endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub error: String,
	pub timestamp: String,
}

/// Error surfaced at the HTTP boundary.
///
/// Every failure of an endpoint is converted into this type so that no
/// error reaches the transport layer unformatted.
#[derive(Debug)]
pub struct ApiError {
	message: String,
	timestamp: String,
}

impl ApiError {
	/// Creates an error stamped with the current time.
	pub fn internal(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			timestamp: now_timestamp(),
		}
	}

	pub fn message(&self) -> &str {
		&self.message
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		ErrorResponse {
			error: self.message.clone(),
			timestamp: self.timestamp.clone(),
		}
	}
}

impl fmt::Display for ApiError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Internal Server Error: {}", self.message)
	}
}

impl std::error::Error for ApiError {}

impl axum::response::IntoResponse for ApiError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		(StatusCode::INTERNAL_SERVER_ERROR, Json(self.to_error_response())).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::response::IntoResponse;

	#[test]
	fn test_request_body_is_optional() {
		let empty: ExpireOrdersRequest = serde_json::from_str("{}").unwrap();
		assert!(!empty.scheduled);

		let scheduled: ExpireOrdersRequest =
			serde_json::from_str(r#"{"scheduled": true, "extra": 1}"#).unwrap();
		assert!(scheduled.scheduled);
	}

	#[test]
	fn test_api_error_renders_500() {
		let error = ApiError::internal("boom");
		assert_eq!(error.to_error_response().error, "boom");
		assert!(chrono::DateTime::parse_from_rfc3339(&error.to_error_response().timestamp).is_ok());

		let response = error.into_response();
		assert_eq!(
			response.status(),
			axum::http::StatusCode::INTERNAL_SERVER_ERROR
		);
	}
}
