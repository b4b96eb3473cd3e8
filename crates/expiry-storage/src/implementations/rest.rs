//! Order store backed by the managed backend's PostgREST API.
//!
//! The expiration update is delegated to the `mark_expired_orders` stored
//! procedure, which evaluates the deadline predicate server side in a single
//! `UPDATE ... WHERE` statement. Statistics are computed client side from a
//! `{status, is_expired}` projection of non-completed orders.

use crate::{OrderStoreInterface, StoreError, StoreFactory, StoreRegistry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use expiry_types::{
	non_empty, BackendConfig, ConfigSchema, Field, FieldType, ImplementationRegistry, Order,
	OrderStats, OrderStatsRow, Schema, SecretString, ValidationError,
};
use std::time::Duration;

/// PostgREST-backed order store.
pub struct RestOrderStore {
	client: reqwest::Client,
	/// `{backend}/rest/v1`
	rest_url: String,
	/// Privileged key used for every request.
	service_key: SecretString,
	/// Name of the expiration stored procedure.
	procedure: String,
	/// Name of the orders table.
	table: String,
}

impl RestOrderStore {
	pub fn new(
		backend: &BackendConfig,
		procedure: impl Into<String>,
		table: impl Into<String>,
	) -> Result<Self, StoreError> {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(backend.timeout_seconds))
			.build()
			.map_err(|e| StoreError::Configuration(e.to_string()))?;

		Ok(Self {
			client,
			rest_url: backend.rest_url(),
			service_key: backend.service_role_key.clone(),
			procedure: procedure.into(),
			table: table.into(),
		})
	}

	fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
		request
			.header("apikey", self.service_key.expose_secret())
			.header("Authorization", self.service_key.bearer())
	}

	fn table_url(&self) -> String {
		format!("{}/{}", self.rest_url, self.table)
	}

	/// Sends a request and turns non-2xx responses into `StoreError::Backend`.
	async fn send(
		&self,
		what: &str,
		request: reqwest::RequestBuilder,
	) -> Result<reqwest::Response, StoreError> {
		let response = self
			.authorized(request)
			.send()
			.await
			.map_err(|e| StoreError::Network(format!("{}: {}", what, e)))?;

		let status = response.status();
		if status.is_success() {
			return Ok(response);
		}

		let body = response.text().await.unwrap_or_default();
		Err(StoreError::Backend(format!(
			"{} failed with {}: {}",
			what,
			status,
			error_message(&body)
		)))
	}
}

/// Extracts PostgREST's `message` field, falling back to the raw body.
fn error_message(body: &str) -> String {
	serde_json::from_str::<serde_json::Value>(body)
		.ok()
		.and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
		.unwrap_or_else(|| body.trim().to_string())
}

/// Reads the affected-row count a procedure may return.
///
/// Void procedures answer with an empty body or `null`; both mean "unknown".
fn affected_rows(body: &str) -> Option<u64> {
	match serde_json::from_str::<serde_json::Value>(body.trim()) {
		Ok(serde_json::Value::Number(n)) => n.as_u64(),
		_ => None,
	}
}

#[async_trait]
impl OrderStoreInterface for RestOrderStore {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(RestOrderStoreSchema)
	}

	async fn mark_expired_orders(&self, _now: DateTime<Utc>) -> Result<Option<u64>, StoreError> {
		let url = format!("{}/rpc/{}", self.rest_url, self.procedure);
		let response = self
			.send(
				&format!("rpc {}", self.procedure),
				self.client.post(url).json(&serde_json::json!({})),
			)
			.await?;

		let body = response
			.text()
			.await
			.map_err(|e| StoreError::Network(e.to_string()))?;
		Ok(affected_rows(&body))
	}

	async fn order_stats(&self) -> Result<OrderStats, StoreError> {
		let request = self
			.client
			.get(self.table_url())
			.query(&[("select", "status,is_expired"), ("status", "neq.completed")]);
		let rows: Vec<OrderStatsRow> = self
			.send("order stats query", request)
			.await?
			.json()
			.await
			.map_err(|e| StoreError::Serialization(e.to_string()))?;

		Ok(OrderStats::tally(
			rows.iter().map(|row| (row.status.as_str(), row.is_expired)),
		))
	}

	async fn put_order(&self, order: &Order) -> Result<(), StoreError> {
		let request = self
			.client
			.post(self.table_url())
			.header("Prefer", "resolution=merge-duplicates,return=minimal")
			.json(order);
		self.send("order upsert", request).await?;
		Ok(())
	}

	async fn get_order(&self, id: &str) -> Result<Order, StoreError> {
		let id_filter = format!("eq.{}", id);
		let request = self
			.client
			.get(self.table_url())
			.query(&[("select", "*"), ("id", id_filter.as_str())]);
		let orders: Vec<Order> = self
			.send("order lookup", request)
			.await?
			.json()
			.await
			.map_err(|e| StoreError::Serialization(e.to_string()))?;

		orders.into_iter().next().ok_or(StoreError::NotFound)
	}
}

/// Configuration schema for RestOrderStore.
pub struct RestOrderStoreSchema;

impl ConfigSchema for RestOrderStoreSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("procedure", FieldType::String).with_validator(non_empty),
				Field::new("table", FieldType::String).with_validator(non_empty),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a REST order store from configuration.
///
/// Configuration parameters:
/// - `procedure`: expiration stored procedure (default: "mark_expired_orders")
/// - `table`: orders table (default: "orders")
pub fn create_store(
	config: &toml::Value,
	backend: &BackendConfig,
) -> Result<Box<dyn OrderStoreInterface>, StoreError> {
	RestOrderStoreSchema
		.validate(config)
		.map_err(|e| StoreError::Configuration(e.to_string()))?;

	let procedure = config
		.get("procedure")
		.and_then(|v| v.as_str())
		.unwrap_or("mark_expired_orders");
	let table = config
		.get("table")
		.and_then(|v| v.as_str())
		.unwrap_or("orders");

	Ok(Box::new(RestOrderStore::new(backend, procedure, table)?))
}

/// Registry for the REST order store.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "rest";
	type Factory = StoreFactory;

	fn factory() -> Self::Factory {
		create_store
	}
}

impl StoreRegistry for Registry {}
