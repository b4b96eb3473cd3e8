//! The expiration worker.
//!
//! One call to [`ExpirationWorker::run`] is one short-lived, stateless
//! invocation: mark every due order expired, then log best-effort
//! statistics. Overlapping invocations converge because the mutation is a
//! single set-based update in the store.

use crate::event_bus::EventBus;
use chrono::{DateTime, Utc};
use expiry_storage::OrderStoreService;
use expiry_types::{truncate_id, ExpiryEvent, OrderStats, WorkerEvent};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

/// Message returned to callers of a successful run.
pub const SUCCESS_MESSAGE: &str = "Expired orders processed successfully";

/// Errors that abort an expiration run.
#[derive(Debug, Error)]
pub enum WorkerError {
	/// The expiration update itself failed. Nothing was reported as marked.
	#[error("{0}")]
	Mutation(String),
}

/// A single request to run the worker.
#[derive(Debug, Clone)]
pub struct Invocation {
	pub id: String,
	/// Set by the scheduled job. Logged only.
	pub scheduled: bool,
	/// The "now" the expiration predicate is evaluated against.
	pub at: DateTime<Utc>,
}

impl Invocation {
	pub fn new(scheduled: bool) -> Self {
		Self::at(scheduled, Utc::now())
	}

	/// Creates an invocation evaluated at a fixed point in time.
	pub fn at(scheduled: bool, at: DateTime<Utc>) -> Self {
		Self {
			id: Uuid::new_v4().to_string(),
			scheduled,
			at,
		}
	}
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct WorkerOutcome {
	pub invocation_id: String,
	/// Orders transitioned by this run, when the store reports it.
	pub marked: Option<u64>,
	/// `None` when the statistics query failed.
	pub stats: Option<OrderStats>,
	pub timestamp: DateTime<Utc>,
}

impl WorkerOutcome {
	pub fn message(&self) -> &'static str {
		SUCCESS_MESSAGE
	}
}

/// Runs the expiration update against the configured order store.
pub struct ExpirationWorker {
	store: Arc<OrderStoreService>,
	event_bus: EventBus,
}

impl ExpirationWorker {
	pub fn new(store: Arc<OrderStoreService>, event_bus: EventBus) -> Self {
		Self { store, event_bus }
	}

	/// Runs one invocation.
	///
	/// A failure of the expiration update aborts the run. A failure of the
	/// statistics query is logged and the run still succeeds.
	#[instrument(skip_all, fields(invocation = %truncate_id(&invocation.id)))]
	pub async fn run(&self, invocation: Invocation) -> Result<WorkerOutcome, WorkerError> {
		tracing::info!(scheduled = invocation.scheduled, "Starting order expiration");
		self.publish(WorkerEvent::Started {
			invocation_id: invocation.id.clone(),
			scheduled: invocation.scheduled,
			at: invocation.at,
		});

		let marked = match self.store.mark_expired_orders(invocation.at).await {
			Ok(marked) => marked,
			Err(e) => {
				tracing::error!(error = %e, "Failed to mark expired orders");
				self.publish(WorkerEvent::Failed {
					invocation_id: invocation.id.clone(),
					reason: e.to_string(),
				});
				return Err(WorkerError::Mutation(e.to_string()));
			},
		};

		match marked {
			Some(count) => tracing::info!(marked = count, "Successfully marked expired orders"),
			None => tracing::info!("Successfully marked expired orders"),
		}
		self.publish(WorkerEvent::OrdersMarked {
			invocation_id: invocation.id.clone(),
			count: marked,
		});

		let stats = match self.store.order_stats().await {
			Ok(stats) => {
				tracing::info!(
					total = stats.total,
					active = stats.active,
					expired = stats.expired,
					"Order statistics"
				);
				self.publish(WorkerEvent::StatsCollected {
					invocation_id: invocation.id.clone(),
					stats,
				});
				Some(stats)
			},
			Err(e) => {
				tracing::warn!(error = %e, "Failed to fetch order statistics");
				self.publish(WorkerEvent::StatsUnavailable {
					invocation_id: invocation.id.clone(),
					reason: e.to_string(),
				});
				None
			},
		};

		Ok(WorkerOutcome {
			invocation_id: invocation.id,
			marked,
			stats,
			timestamp: Utc::now(),
		})
	}

	fn publish(&self, event: WorkerEvent) {
		self.event_bus.publish(ExpiryEvent::Worker(event));
	}
}
