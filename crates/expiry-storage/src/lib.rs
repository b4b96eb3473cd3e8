//! Order store module for the expiry service.
//!
//! This module abstracts the data store that owns order records. The only
//! mutation the expiry service performs is [`OrderStoreInterface::mark_expired_orders`],
//! which every backend must implement as a single set-based conditional
//! update so that concurrent invocations converge to the same state.
//!
//! The expiration predicate all backends share is documented on
//! [`expiry_types::Order::is_due`]: not yet expired, status `active` or
//! `in_progress`, and a deadline strictly before "now".

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use expiry_types::{BackendConfig, ConfigSchema, ImplementationRegistry, Order, OrderStats};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
	pub mod rest;
}

/// Errors that can occur during order store operations.
#[derive(Debug, Error)]
pub enum StoreError {
	/// The requested order does not exist.
	#[error("Not found")]
	NotFound,
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// The store could not be reached.
	#[error("Network error: {0}")]
	Network(String),
	/// The store rejected or failed the operation.
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface to the data store that owns orders.
#[async_trait]
pub trait OrderStoreInterface: Send + Sync {
	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Atomically marks every due order as expired.
	///
	/// Must be a single set-based update, never a read-then-write loop
	/// over individual orders. Returns the number of affected orders when the
	/// backend reports it. Calling it again without time passing affects
	/// nothing and still succeeds.
	///
	/// Backends that evaluate "now" server side ignore `now`.
	async fn mark_expired_orders(&self, now: DateTime<Utc>) -> Result<Option<u64>, StoreError>;

	/// Counts non-completed orders split by the expired flag.
	async fn order_stats(&self) -> Result<OrderStats, StoreError>;

	/// Inserts or replaces an order.
	async fn put_order(&self, order: &Order) -> Result<(), StoreError>;

	/// Retrieves an order by ID.
	async fn get_order(&self, id: &str) -> Result<Order, StoreError>;
}

/// Type alias for order store factory functions.
pub type StoreFactory =
	fn(&toml::Value, &BackendConfig) -> Result<Box<dyn OrderStoreInterface>, StoreError>;

/// Registry trait for order store implementations.
pub trait StoreRegistry: ImplementationRegistry<Factory = StoreFactory> {}

/// Get all registered order store implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StoreFactory)> {
	use implementations::{file, memory, rest};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
		(rest::Registry::NAME, rest::Registry::factory()),
	]
}

/// High-level order store service.
///
/// Wraps the configured backend and adds tracing around each call.
pub struct OrderStoreService {
	backend: Box<dyn OrderStoreInterface>,
}

impl OrderStoreService {
	pub fn new(backend: Box<dyn OrderStoreInterface>) -> Self {
		Self { backend }
	}

	/// Runs the backend's atomic expiration update.
	pub async fn mark_expired_orders(
		&self,
		now: DateTime<Utc>,
	) -> Result<Option<u64>, StoreError> {
		let affected = self.backend.mark_expired_orders(now).await?;
		tracing::debug!(affected = ?affected, "Expiration update applied");
		Ok(affected)
	}

	/// Fetches order statistics.
	pub async fn order_stats(&self) -> Result<OrderStats, StoreError> {
		self.backend.order_stats().await
	}

	pub async fn put_order(&self, order: &Order) -> Result<(), StoreError> {
		self.backend.put_order(order).await
	}

	pub async fn get_order(&self, id: &str) -> Result<Order, StoreError> {
		self.backend.get_order(id).await
	}
}
