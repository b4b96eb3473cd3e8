//! Event types for in-process observers.
//!
//! The worker and registrar publish what they did on an injected event bus
//! instead of writing into shared global state. Observers (tests, metrics
//! exporters, audit sinks) subscribe to the bus.

use crate::OrderStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Main event type encompassing all expiry events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExpiryEvent {
	/// Events from the expiration worker.
	Worker(WorkerEvent),
	/// Events from the scheduler registrar.
	Registrar(RegistrarEvent),
}

/// Events related to an expiration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerEvent {
	/// A run has started.
	Started {
		invocation_id: String,
		scheduled: bool,
		at: DateTime<Utc>,
	},
	/// The set-based expiration update succeeded.
	OrdersMarked {
		invocation_id: String,
		/// Affected rows, when the store reports them.
		count: Option<u64>,
	},
	/// Best-effort statistics were collected.
	StatsCollected {
		invocation_id: String,
		stats: OrderStats,
	},
	/// Statistics could not be collected. The run still succeeds.
	StatsUnavailable {
		invocation_id: String,
		reason: String,
	},
	/// The expiration update failed and the run was aborted.
	Failed {
		invocation_id: String,
		reason: String,
	},
}

/// Events related to job registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistrarEvent {
	/// A job was created or replaced.
	JobRegistered { job_name: String, schedule: String },
	/// Registration failed; nothing was installed.
	RegistrationFailed { job_name: String, reason: String },
}
