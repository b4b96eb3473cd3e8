//! In-memory order store.
//!
//! Useful for tests and local development. The expiration update runs under
//! a single write lock, which makes it atomic with respect to every other
//! operation on the same store.

use crate::{OrderStoreInterface, StoreError, StoreFactory, StoreRegistry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use expiry_types::{
	BackendConfig, ConfigSchema, ImplementationRegistry, Order, OrderStats, Schema,
	ValidationError,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory order store.
///
/// Clones share the same underlying map, so a test can keep a handle for
/// seeding and inspection after boxing another clone into a service.
#[derive(Clone, Default)]
pub struct MemoryOrderStore {
	orders: Arc<RwLock<HashMap<String, Order>>>,
}

impl MemoryOrderStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of stored orders.
	pub async fn len(&self) -> usize {
		self.orders.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.orders.read().await.is_empty()
	}
}

#[async_trait]
impl OrderStoreInterface for MemoryOrderStore {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryOrderStoreSchema)
	}

	async fn mark_expired_orders(&self, now: DateTime<Utc>) -> Result<Option<u64>, StoreError> {
		let mut orders = self.orders.write().await;
		let affected = orders
			.values_mut()
			.map(|order| order.expire_if_due(now))
			.filter(|changed| *changed)
			.count();
		Ok(Some(affected as u64))
	}

	async fn order_stats(&self) -> Result<OrderStats, StoreError> {
		let orders = self.orders.read().await;
		Ok(OrderStats::from_orders(orders.values()))
	}

	async fn put_order(&self, order: &Order) -> Result<(), StoreError> {
		let mut orders = self.orders.write().await;
		orders.insert(order.id.clone(), order.clone());
		Ok(())
	}

	async fn get_order(&self, id: &str) -> Result<Order, StoreError> {
		let orders = self.orders.read().await;
		orders.get(id).cloned().ok_or(StoreError::NotFound)
	}
}

/// Configuration schema for MemoryOrderStore.
pub struct MemoryOrderStoreSchema;

impl ConfigSchema for MemoryOrderStoreSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// No options
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory order store from configuration.
pub fn create_store(
	config: &toml::Value,
	_backend: &BackendConfig,
) -> Result<Box<dyn OrderStoreInterface>, StoreError> {
	MemoryOrderStoreSchema
		.validate(config)
		.map_err(|e| StoreError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryOrderStore::new()))
}

/// Registry for the memory order store.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = StoreFactory;

	fn factory() -> Self::Factory {
		create_store
	}
}

impl StoreRegistry for Registry {}
