//! Test doubles for exercising failure paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use expiry_scheduler::{SchedulerError, SchedulerInterface};
use expiry_storage::implementations::memory::{MemoryOrderStore, MemoryOrderStoreSchema};
use expiry_storage::{OrderStoreInterface, StoreError};
use expiry_types::{ConfigSchema, Order, OrderStats, ScheduledJob, Schema, ValidationError};

/// Memory store whose mutation or statistics query can be forced to fail.
#[derive(Clone)]
pub struct FailingStore {
	inner: MemoryOrderStore,
	fail_mutation: bool,
	fail_stats: bool,
}

impl FailingStore {
	pub fn failing_mutation(inner: MemoryOrderStore) -> Self {
		Self {
			inner,
			fail_mutation: true,
			fail_stats: false,
		}
	}

	pub fn failing_stats(inner: MemoryOrderStore) -> Self {
		Self {
			inner,
			fail_mutation: false,
			fail_stats: true,
		}
	}
}

#[async_trait]
impl OrderStoreInterface for FailingStore {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryOrderStoreSchema)
	}

	async fn mark_expired_orders(&self, now: DateTime<Utc>) -> Result<Option<u64>, StoreError> {
		if self.fail_mutation {
			return Err(StoreError::Network("connection refused".into()));
		}
		self.inner.mark_expired_orders(now).await
	}

	async fn order_stats(&self) -> Result<OrderStats, StoreError> {
		if self.fail_stats {
			return Err(StoreError::Backend("statement timeout".into()));
		}
		self.inner.order_stats().await
	}

	async fn put_order(&self, order: &Order) -> Result<(), StoreError> {
		self.inner.put_order(order).await
	}

	async fn get_order(&self, id: &str) -> Result<Order, StoreError> {
		self.inner.get_order(id).await
	}
}

/// Scheduler that rejects every job.
pub struct FailingScheduler;

struct NoOptions;

impl ConfigSchema for NoOptions {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

#[async_trait]
impl SchedulerInterface for FailingScheduler {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(NoOptions)
	}

	async fn upsert_job(&self, _job: &ScheduledJob) -> Result<(), SchedulerError> {
		Err(SchedulerError::Backend("permission denied for schema cron".into()))
	}
}
