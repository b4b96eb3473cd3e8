//! The scheduler registrar.
//!
//! Installs the recurring job that calls the expiration worker. The job is
//! assembled from configuration each time [`SchedulerRegistrar::register`]
//! runs, so the bearer token embedded in it is whatever anonymous key is
//! configured at that moment. Rotating the key requires registering again.

use crate::event_bus::EventBus;
use chrono::{DateTime, Utc};
use expiry_config::{Config, JobConfig};
use expiry_scheduler::SchedulerService;
use expiry_types::{ExpiryEvent, JobTarget, RegistrarEvent, ScheduledJob, SecretString};
use std::sync::Arc;
use thiserror::Error;

/// Message returned to callers of a successful registration.
pub const SUCCESS_MESSAGE: &str = "Cron job scheduled successfully";

/// Errors that abort a registration.
#[derive(Debug, Error)]
pub enum RegistrarError {
	#[error("Invalid schedule '{schedule}': {reason}")]
	InvalidSchedule { schedule: String, reason: String },
	/// The scheduler rejected the job. Nothing was installed.
	#[error("{0}")]
	Registration(String),
}

/// Result of a successful registration.
#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
	pub job_name: String,
	/// Human readable description, e.g. "every hour at minute 0".
	pub schedule: String,
	/// The raw cron expression.
	pub expression: String,
	/// When the job fires next.
	pub next_run: Option<DateTime<Utc>>,
	pub timestamp: DateTime<Utc>,
}

impl RegistrationOutcome {
	pub fn message(&self) -> &'static str {
		SUCCESS_MESSAGE
	}
}

/// Installs the expiration job into the configured scheduler.
pub struct SchedulerRegistrar {
	scheduler: Arc<SchedulerService>,
	job: JobConfig,
	worker_url: String,
	anon_key: SecretString,
	event_bus: EventBus,
}

impl SchedulerRegistrar {
	pub fn new(
		scheduler: Arc<SchedulerService>,
		job: JobConfig,
		worker_url: String,
		anon_key: SecretString,
		event_bus: EventBus,
	) -> Self {
		Self {
			scheduler,
			job,
			worker_url,
			anon_key,
			event_bus,
		}
	}

	pub fn from_config(
		config: &Config,
		scheduler: Arc<SchedulerService>,
		event_bus: EventBus,
	) -> Self {
		Self::new(
			scheduler,
			config.job.clone(),
			config.worker_url(),
			config.backend.anon_key.clone(),
			event_bus,
		)
	}

	/// The job this registrar installs.
	pub fn job(&self) -> ScheduledJob {
		ScheduledJob::new(
			self.job.name.clone(),
			self.job.schedule.clone(),
			JobTarget::post_json(
				self.worker_url.clone(),
				self.anon_key.expose_secret(),
				serde_json::json!({ "scheduled": true }),
			),
		)
	}

	/// Creates the job, or replaces an existing job with the same name.
	pub async fn register(&self) -> Result<RegistrationOutcome, RegistrarError> {
		let job = self.job();
		tracing::info!(job = %job.name, schedule = %job.schedule, "Registering expiration job");

		let cron = job.cron().map_err(|e| {
			let err = RegistrarError::InvalidSchedule {
				schedule: job.schedule.clone(),
				reason: e.to_string(),
			};
			self.failed(&job.name, &err);
			err
		})?;

		if let Err(e) = self.scheduler.register(&job).await {
			let err = RegistrarError::Registration(e.to_string());
			self.failed(&job.name, &err);
			return Err(err);
		}

		let now = Utc::now();
		let outcome = RegistrationOutcome {
			job_name: job.name.clone(),
			schedule: cron.describe(),
			expression: job.schedule.clone(),
			next_run: cron.next_after(now),
			timestamp: now,
		};

		tracing::info!(
			job = %outcome.job_name,
			schedule = %outcome.schedule,
			next_run = ?outcome.next_run,
			"Expiration job registered"
		);
		self.event_bus
			.publish(ExpiryEvent::Registrar(RegistrarEvent::JobRegistered {
				job_name: outcome.job_name.clone(),
				schedule: outcome.expression.clone(),
			}));
		Ok(outcome)
	}

	fn failed(&self, job_name: &str, err: &RegistrarError) {
		tracing::error!(job = %job_name, error = %err, "Failed to register expiration job");
		self.event_bus
			.publish(ExpiryEvent::Registrar(RegistrarEvent::RegistrationFailed {
				job_name: job_name.to_string(),
				reason: err.to_string(),
			}));
	}
}
