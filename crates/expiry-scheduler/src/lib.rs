//! Scheduler module for the expiry service.
//!
//! Abstracts the backend's cron facility. Jobs are plain [`ScheduledJob`]
//! values; each implementation decides how to install them. Installation is
//! an upsert keyed by job name, so registering the same job twice leaves a
//! single job carrying the latest parameters.

use async_trait::async_trait;
use expiry_types::{is_http_url, BackendConfig, ConfigSchema, ImplementationRegistry, ScheduledJob};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
	pub mod pg_cron;
}

/// Errors that can occur during scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
	/// The scheduler could not be reached.
	#[error("Network error: {0}")]
	Network(String),
	/// The scheduler rejected or failed the operation.
	#[error("Backend error: {0}")]
	Backend(String),
	/// The job definition is not installable.
	#[error("Invalid job: {0}")]
	InvalidJob(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
	#[error("Unsupported operation: {0}")]
	Unsupported(String),
}

/// Trait defining the interface to a cron facility.
#[async_trait]
pub trait SchedulerInterface: Send + Sync {
	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Creates the job, or replaces the job with the same name.
	///
	/// Must be a single call so that a failure leaves nothing behind.
	async fn upsert_job(&self, job: &ScheduledJob) -> Result<(), SchedulerError>;

	/// Lists installed jobs.
	async fn list_jobs(&self) -> Result<Vec<ScheduledJob>, SchedulerError> {
		Err(SchedulerError::Unsupported("list_jobs".into()))
	}
}

/// Type alias for scheduler factory functions.
pub type SchedulerFactory =
	fn(&toml::Value, &BackendConfig) -> Result<Box<dyn SchedulerInterface>, SchedulerError>;

/// Registry trait for scheduler implementations.
pub trait SchedulerRegistry: ImplementationRegistry<Factory = SchedulerFactory> {}

/// Get all registered scheduler implementations.
pub fn get_all_implementations() -> Vec<(&'static str, SchedulerFactory)> {
	use implementations::{memory, pg_cron};

	vec![
		(memory::Registry::NAME, memory::Registry::factory()),
		(pg_cron::Registry::NAME, pg_cron::Registry::factory()),
	]
}

/// High-level scheduler service.
///
/// Checks a job before handing it to the configured backend.
pub struct SchedulerService {
	backend: Box<dyn SchedulerInterface>,
}

impl SchedulerService {
	pub fn new(backend: Box<dyn SchedulerInterface>) -> Self {
		Self { backend }
	}

	/// Validates and installs a job.
	pub async fn register(&self, job: &ScheduledJob) -> Result<(), SchedulerError> {
		validate_job(job)?;
		self.backend.upsert_job(job).await?;
		tracing::debug!(job = %job.name, schedule = %job.schedule, "Job upserted");
		Ok(())
	}

	pub async fn list_jobs(&self) -> Result<Vec<ScheduledJob>, SchedulerError> {
		self.backend.list_jobs().await
	}
}

fn validate_job(job: &ScheduledJob) -> Result<(), SchedulerError> {
	if job.name.trim().is_empty() {
		return Err(SchedulerError::InvalidJob("job name cannot be empty".into()));
	}
	job.cron()
		.map_err(|e| SchedulerError::InvalidJob(format!("schedule '{}': {}", job.schedule, e)))?;
	if !is_http_url(&job.target.url) {
		return Err(SchedulerError::InvalidJob(format!(
			"target url '{}' must be an http(s) URL",
			job.target.url
		)));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use expiry_types::JobTarget;
	use implementations::memory::MemoryScheduler;

	fn job(name: &str, schedule: &str, url: &str) -> ScheduledJob {
		ScheduledJob::new(
			name,
			schedule,
			JobTarget::post_json(url, "anon", serde_json::json!({ "scheduled": true })),
		)
	}

	#[test]
	fn test_all_implementations_registered() {
		let names: Vec<&str> = get_all_implementations()
			.into_iter()
			.map(|(name, _)| name)
			.collect();
		assert_eq!(names, vec!["memory", "pg_cron"]);
	}

	#[tokio::test]
	async fn test_register_rejects_invalid_jobs() {
		let scheduler = MemoryScheduler::new();
		let service = SchedulerService::new(Box::new(scheduler.clone()));

		for bad in [
			job("", "0 * * * *", "https://x.test/fn"),
			job("hourly", "every hour", "https://x.test/fn"),
			job("hourly", "0 * * * *", "ftp://x.test/fn"),
		] {
			assert!(matches!(
				service.register(&bad).await,
				Err(SchedulerError::InvalidJob(_))
			));
		}
		assert!(scheduler.jobs().await.is_empty());
	}

	#[tokio::test]
	async fn test_register_installs_job() {
		let scheduler = MemoryScheduler::new();
		let service = SchedulerService::new(Box::new(scheduler.clone()));

		service
			.register(&job("hourly", "0 * * * *", "https://x.test/fn"))
			.await
			.unwrap();
		assert_eq!(service.list_jobs().await.unwrap().len(), 1);
		assert!(scheduler.job("hourly").await.is_some());
	}
}
