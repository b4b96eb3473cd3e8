//! Event bus for broadcasting expiry events to observers.
//!
//! Constructed once by the builder and handed to every component that
//! publishes. There is no process-wide instance.

use expiry_types::{ExpiryEvent, RegistrarEvent, WorkerEvent};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Broadcast channel wrapper. Clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<ExpiryEvent>,
}

impl EventBus {
	/// Creates a bus that buffers up to `capacity` events per subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Subscribes to events published after this call.
	pub fn subscribe(&self) -> broadcast::Receiver<ExpiryEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event. Having no subscribers is not an error.
	pub fn publish(&self, event: ExpiryEvent) {
		let _ = self.sender.send(event);
	}
}

/// Logs failure events until every publisher is dropped.
///
/// Returns the number of failures seen.
pub async fn log_failures(mut receiver: broadcast::Receiver<ExpiryEvent>) -> u64 {
	let mut failures = 0;
	loop {
		match receiver.recv().await {
			Ok(ExpiryEvent::Worker(WorkerEvent::Failed {
				invocation_id,
				reason,
			})) => {
				failures += 1;
				tracing::error!(invocation_id = %invocation_id, "Expiration run failed: {}", reason);
			},
			Ok(ExpiryEvent::Registrar(RegistrarEvent::RegistrationFailed {
				job_name,
				reason,
			})) => {
				failures += 1;
				tracing::error!(job = %job_name, "Job registration failed: {}", reason);
			},
			Ok(_) => {},
			Err(RecvError::Lagged(skipped)) => {
				tracing::warn!("Event monitor lagged, skipped {} events", skipped);
			},
			Err(RecvError::Closed) => return failures,
		}
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(1000)
	}
}
