//! HTTP server for the order expiry endpoints.
//!
//! Exposes the expiration worker and the scheduler registrar as two
//! invokable functions. Every failure is rendered as a 500 with an
//! `{error, timestamp}` body.

use axum::{
	body::Bytes,
	extract::{DefaultBodyLimit, State},
	http::{header::HeaderName, HeaderValue, Method, StatusCode},
	response::Json,
	routing::{get, post},
	Router,
};
use expiry_config::{ApiConfig, CorsConfig};
use expiry_core::{ExpiryEngine, Invocation};
use expiry_types::{
	format_timestamp, ApiError, ExpireOrdersRequest, ExpireOrdersResponse, SetupCronResponse,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<ExpiryEngine>,
}

/// Builds the router with both functions, the health probe and CORS.
///
/// `CorsLayer` answers every OPTIONS request itself, so pre-flight never
/// reaches a handler.
pub fn router(state: AppState, api_config: &ApiConfig) -> Router {
	Router::new()
		.nest(
			"/functions/v1",
			Router::new()
				.route("/expire-orders", post(handle_expire_orders))
				.route("/setup-cron", post(handle_setup_cron)),
		)
		.route("/health", get(handle_health))
		.layer(
			ServiceBuilder::new()
				.layer(cors_layer(&api_config.cors))
				.layer(DefaultBodyLimit::max(api_config.max_request_size)),
		)
		.with_state(state)
}

fn cors_layer(cors: &CorsConfig) -> CorsLayer {
	let allow_origin = if cors.allowed_origins.iter().any(|o| o == "*") {
		AllowOrigin::any()
	} else {
		let origins: Vec<HeaderValue> = cors
			.allowed_origins
			.iter()
			.filter_map(|origin| match HeaderValue::from_str(origin) {
				Ok(value) => Some(value),
				Err(_) => {
					tracing::warn!("Ignoring invalid CORS origin: {}", origin);
					None
				},
			})
			.collect();
		AllowOrigin::list(origins)
	};

	let allowed_headers: Vec<HeaderName> = cors
		.allowed_headers
		.iter()
		.filter_map(|name| match HeaderName::from_bytes(name.as_bytes()) {
			Ok(header) => Some(header),
			Err(_) => {
				tracing::warn!("Ignoring invalid CORS header name: {}", name);
				None
			},
		})
		.collect();

	CorsLayer::new()
		.allow_origin(allow_origin)
		.allow_methods([Method::POST, Method::OPTIONS])
		.allow_headers(allowed_headers)
}

/// Starts the HTTP server and runs until interrupted.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<ExpiryEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(AppState { engine }, &api_config);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Order expiry API server starting on {}", bind_address);

	axum::serve(listener, app)
		.with_graceful_shutdown(async {
			if let Err(e) = tokio::signal::ctrl_c().await {
				tracing::error!("Failed to listen for shutdown signal: {}", e);
			}
		})
		.await?;

	Ok(())
}

/// Reads the optional request body.
///
/// A missing or malformed body is treated as an unscheduled invocation.
fn parse_request(body: &[u8]) -> ExpireOrdersRequest {
	if body.iter().all(u8::is_ascii_whitespace) {
		return ExpireOrdersRequest::default();
	}
	serde_json::from_slice(body).unwrap_or_else(|e| {
		tracing::debug!("Ignoring unparseable request body: {}", e);
		ExpireOrdersRequest::default()
	})
}

/// Handles POST /functions/v1/expire-orders.
async fn handle_expire_orders(
	State(state): State<AppState>,
	body: Bytes,
) -> Result<Json<ExpireOrdersResponse>, ApiError> {
	let request = parse_request(&body);

	match state
		.engine
		.worker()
		.run(Invocation::new(request.scheduled))
		.await
	{
		Ok(outcome) => Ok(Json(ExpireOrdersResponse {
			success: true,
			message: outcome.message().to_string(),
			timestamp: format_timestamp(outcome.timestamp),
		})),
		Err(e) => {
			tracing::warn!("Expiration request failed: {}", e);
			Err(ApiError::internal(e.to_string()))
		},
	}
}

/// Handles POST /functions/v1/setup-cron.
async fn handle_setup_cron(
	State(state): State<AppState>,
) -> Result<Json<SetupCronResponse>, ApiError> {
	match state.engine.registrar().register().await {
		Ok(outcome) => Ok(Json(SetupCronResponse {
			success: true,
			message: outcome.message().to_string(),
			schedule: outcome.schedule.clone(),
			timestamp: format_timestamp(outcome.timestamp),
		})),
		Err(e) => {
			tracing::warn!("Cron setup request failed: {}", e);
			Err(ApiError::internal(e.to_string()))
		},
	}
}

async fn handle_health() -> Json<serde_json::Value> {
	Json(serde_json::json!({ "status": "ok" }))
}
