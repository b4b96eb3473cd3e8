//! Core of the order expiry service.
//!
//! Wires the order store and the scheduler into the two operations the
//! service exposes: the [`worker::ExpirationWorker`], which marks overdue
//! orders expired, and the [`registrar::SchedulerRegistrar`], which installs
//! the recurring job that calls the worker.

use crate::event_bus::EventBus;
use crate::registrar::SchedulerRegistrar;
use crate::worker::ExpirationWorker;
use expiry_config::Config;
use expiry_scheduler::SchedulerService;
use expiry_storage::OrderStoreService;
use std::sync::Arc;

pub mod builder;
pub mod event_bus;
pub mod registrar;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod worker;

pub use builder::{BuilderError, ExpiryBuilder, ExpiryFactories};
pub use registrar::{RegistrarError, RegistrationOutcome};
pub use worker::{Invocation, WorkerError, WorkerOutcome};

/// The assembled service.
///
/// Every component is immutable after construction and shared through
/// `Arc`, so one engine serves any number of concurrent requests.
pub struct ExpiryEngine {
	config: Config,
	store: Arc<OrderStoreService>,
	scheduler: Arc<SchedulerService>,
	worker: Arc<ExpirationWorker>,
	registrar: Arc<SchedulerRegistrar>,
	event_bus: EventBus,
}

impl ExpiryEngine {
	pub fn new(
		config: Config,
		store: Arc<OrderStoreService>,
		scheduler: Arc<SchedulerService>,
		event_bus: EventBus,
	) -> Self {
		let worker = Arc::new(ExpirationWorker::new(store.clone(), event_bus.clone()));
		let registrar = Arc::new(SchedulerRegistrar::from_config(
			&config,
			scheduler.clone(),
			event_bus.clone(),
		));

		Self {
			config,
			store,
			scheduler,
			worker,
			registrar,
			event_bus,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn store(&self) -> &Arc<OrderStoreService> {
		&self.store
	}

	pub fn scheduler(&self) -> &Arc<SchedulerService> {
		&self.scheduler
	}

	pub fn worker(&self) -> &Arc<ExpirationWorker> {
		&self.worker
	}

	pub fn registrar(&self) -> &Arc<SchedulerRegistrar> {
		&self.registrar
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{Duration, Utc};
	use expiry_scheduler::implementations::memory::MemoryScheduler;
	use expiry_storage::implementations::memory::MemoryOrderStore;
	use expiry_types::Order;

	#[tokio::test]
	async fn test_registered_job_targets_worker() {
		let scheduler = MemoryScheduler::new();
		let engine = ExpiryEngine::new(
			Config::for_testing(),
			Arc::new(OrderStoreService::new(Box::new(MemoryOrderStore::new()))),
			Arc::new(SchedulerService::new(Box::new(scheduler.clone()))),
			EventBus::default(),
		);

		engine.registrar().register().await.unwrap();

		let job = scheduler.job("expire-orders-hourly").await.unwrap();
		assert_eq!(
			job.target.url,
			"http://127.0.0.1:54321/functions/v1/expire-orders"
		);
		assert_eq!(job.target.header("Authorization"), Some("Bearer anon-test"));
	}

	#[tokio::test]
	async fn test_worker_shares_store() {
		let engine = ExpiryEngine::new(
			Config::for_testing(),
			Arc::new(OrderStoreService::new(Box::new(MemoryOrderStore::new()))),
			Arc::new(SchedulerService::new(Box::new(MemoryScheduler::new()))),
			EventBus::default(),
		);
		let now = Utc::now();
		engine
			.store()
			.put_order(&Order::new("o-1", Some(now - Duration::seconds(1))))
			.await
			.unwrap();

		let outcome = engine.worker().run(Invocation::at(false, now)).await.unwrap();
		assert_eq!(outcome.marked, Some(1));
		assert!(engine.store().get_order("o-1").await.unwrap().is_expired);
	}
}
