//! File-backed order store.
//!
//! Orders live in one JSON document. Every operation takes an advisory lock
//! on a sibling file named after the document plus `.lock`, so the expiration update is atomic across
//! threads and across processes sharing the same path. Writes go to a temp
//! file that is renamed over the document.

use crate::{OrderStoreInterface, StoreError, StoreFactory, StoreRegistry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use expiry_types::{
	BackendConfig, ConfigSchema, Field, FieldType, ImplementationRegistry, Order, OrderStats,
	Schema, ValidationError,
};
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

type OrderMap = BTreeMap<String, Order>;

/// File-based order store.
pub struct FileOrderStore {
	path: PathBuf,
}

impl FileOrderStore {
	pub fn new(path: PathBuf) -> Self {
		Self { path }
	}

	fn lock_path(path: &Path) -> PathBuf {
		sibling(path, ".lock")
	}

	/// Runs `op` on the order map while holding the lock.
	///
	/// When `op` reports a change the map is written back before the lock
	/// is released.
	async fn with_orders<T, F>(&self, exclusive: bool, op: F) -> Result<T, StoreError>
	where
		T: Send + 'static,
		F: FnOnce(&mut OrderMap) -> (T, bool) + Send + 'static,
	{
		let path = self.path.clone();
		tokio::task::spawn_blocking(move || {
			let lock = open_lock(&Self::lock_path(&path))?;
			let locked = if exclusive {
				FileExt::lock_exclusive(&lock)
			} else {
				FileExt::lock_shared(&lock)
			};
			locked.map_err(|e| StoreError::Backend(format!("Failed to lock store: {}", e)))?;

			let result = read_orders(&path).and_then(|mut orders| {
				let (value, changed) = op(&mut orders);
				if changed {
					write_orders(&path, &orders)?;
				}
				Ok(value)
			});

			if let Err(e) = FileExt::unlock(&lock) {
				tracing::warn!("Failed to release store lock {:?}: {}", path, e);
			}
			result
		})
		.await
		.map_err(|e| StoreError::Backend(format!("Store task failed: {}", e)))?
	}
}

fn open_lock(path: &Path) -> Result<File, StoreError> {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).map_err(|e| StoreError::Backend(e.to_string()))?;
	}
	OpenOptions::new()
		.create(true)
		.truncate(false)
		.write(true)
		.open(path)
		.map_err(|e| StoreError::Backend(e.to_string()))
}

fn read_orders(path: &Path) -> Result<OrderMap, StoreError> {
	match fs::read(path) {
		Ok(bytes) if bytes.is_empty() => Ok(OrderMap::new()),
		Ok(bytes) => {
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
		},
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(OrderMap::new()),
		Err(e) => Err(StoreError::Backend(e.to_string())),
	}
}

/// `orders.json` becomes `orders.json<suffix>`, never replacing an extension.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
	let mut name = path.as_os_str().to_owned();
	name.push(suffix);
	PathBuf::from(name)
}

fn write_orders(path: &Path, orders: &OrderMap) -> Result<(), StoreError> {
	let bytes =
		serde_json::to_vec_pretty(orders).map_err(|e| StoreError::Serialization(e.to_string()))?;
	let temp_path = sibling(path, ".tmp");
	fs::write(&temp_path, bytes).map_err(|e| StoreError::Backend(e.to_string()))?;
	fs::rename(&temp_path, path).map_err(|e| StoreError::Backend(e.to_string()))
}

#[async_trait]
impl OrderStoreInterface for FileOrderStore {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileOrderStoreSchema)
	}

	async fn mark_expired_orders(&self, now: DateTime<Utc>) -> Result<Option<u64>, StoreError> {
		self.with_orders(true, move |orders| {
			let affected = orders
				.values_mut()
				.map(|order| order.expire_if_due(now))
				.filter(|changed| *changed)
				.count() as u64;
			(Some(affected), affected > 0)
		})
		.await
	}

	async fn order_stats(&self) -> Result<OrderStats, StoreError> {
		self.with_orders(false, |orders| (OrderStats::from_orders(orders.values()), false))
			.await
	}

	async fn put_order(&self, order: &Order) -> Result<(), StoreError> {
		let order = order.clone();
		self.with_orders(true, move |orders| {
			orders.insert(order.id.clone(), order);
			((), true)
		})
		.await
	}

	async fn get_order(&self, id: &str) -> Result<Order, StoreError> {
		let id = id.to_string();
		self.with_orders(false, move |orders| (orders.get(&id).cloned(), false))
			.await?
			.ok_or(StoreError::NotFound)
	}
}

/// Configuration schema for FileOrderStore.
pub struct FileOrderStoreSchema;

impl ConfigSchema for FileOrderStoreSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new("path", FieldType::String).with_validator(expiry_types::non_empty)],
		);
		schema.validate(config)
	}
}

/// Factory function to create a file order store from configuration.
///
/// Configuration parameters:
/// - `path`: JSON document holding the orders (default: "./data/orders.json")
pub fn create_store(
	config: &toml::Value,
	_backend: &BackendConfig,
) -> Result<Box<dyn OrderStoreInterface>, StoreError> {
	FileOrderStoreSchema
		.validate(config)
		.map_err(|e| StoreError::Configuration(e.to_string()))?;

	let path = config
		.get("path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/orders.json");

	Ok(Box::new(FileOrderStore::new(PathBuf::from(path))))
}

/// Registry for the file order store.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StoreFactory;

	fn factory() -> Self::Factory {
		create_store
	}
}

impl StoreRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;
	use expiry_types::OrderStatus;
	use std::sync::Arc;

	fn store_in(dir: &tempfile::TempDir) -> FileOrderStore {
		FileOrderStore::new(dir.path().join("orders.json"))
	}

	#[tokio::test]
	async fn test_missing_file_is_empty() {
		let dir = tempfile::tempdir().unwrap();
		let store = store_in(&dir);

		assert_eq!(store.order_stats().await.unwrap(), OrderStats::default());
		assert_eq!(
			store.mark_expired_orders(Utc::now()).await.unwrap(),
			Some(0)
		);
		assert!(!dir.path().join("orders.json").exists());
	}

	#[tokio::test]
	async fn test_expiration_persists_across_instances() {
		let dir = tempfile::tempdir().unwrap();
		let now = Utc::now();
		let past = Some(now - Duration::minutes(10));

		let store = store_in(&dir);
		store.put_order(&Order::new("a", past)).await.unwrap();
		store
			.put_order(&Order::new("b", past).with_status(OrderStatus::Completed))
			.await
			.unwrap();

		assert_eq!(store.mark_expired_orders(now).await.unwrap(), Some(1));
		assert_eq!(store.mark_expired_orders(now).await.unwrap(), Some(0));

		let reopened = store_in(&dir);
		assert!(reopened.get_order("a").await.unwrap().is_expired);
		assert!(!reopened.get_order("b").await.unwrap().is_expired);
		assert!(matches!(
			reopened.get_order("c").await,
			Err(StoreError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_concurrent_runs_converge() {
		let dir = tempfile::tempdir().unwrap();
		let now = Utc::now();
		let store = Arc::new(store_in(&dir));
		for i in 0..5 {
			store
				.put_order(&Order::new(format!("o-{}", i), Some(now - Duration::hours(1))))
				.await
				.unwrap();
		}

		let runs: Vec<_> = (0..4)
			.map(|_| {
				let store = Arc::clone(&store);
				tokio::spawn(async move { store.mark_expired_orders(now).await.unwrap() })
			})
			.collect();

		let mut total = 0;
		for run in runs {
			total += run.await.unwrap().unwrap();
		}
		assert_eq!(total, 5);
		assert_eq!(store.order_stats().await.unwrap().expired, 5);
	}

	#[tokio::test]
	async fn test_document_named_like_lock_or_temp_file() {
		let dir = tempfile::tempdir().unwrap();
		let now = Utc::now();

		for name in ["orders.lock", "orders.tmp"] {
			let path = dir.path().join(name);
			let store = FileOrderStore::new(path.clone());
			store
				.put_order(&Order::new("due", Some(now - Duration::hours(1))))
				.await
				.unwrap();
			assert_eq!(store.mark_expired_orders(now).await.unwrap(), Some(1));

			let reopened = FileOrderStore::new(path.clone());
			assert!(reopened.get_order("due").await.unwrap().is_expired);
			assert!(dir.path().join(format!("{}.lock", name)).exists());
			assert!(!dir.path().join(format!("{}.tmp", name)).exists());
		}
	}

	#[tokio::test]
	async fn test_corrupt_document_is_reported() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("orders.json"), b"not json").unwrap();

		let result = store_in(&dir).mark_expired_orders(Utc::now()).await;
		assert!(matches!(result, Err(StoreError::Serialization(_))));
	}

	#[test]
	fn test_schema_rejects_empty_path() {
		let config: toml::Value = toml::from_str("path = \"\"").unwrap();
		assert!(FileOrderStoreSchema.validate(&config).is_err());
	}
}
