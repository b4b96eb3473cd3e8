//! In-memory scheduler for tests and local development.
//!
//! Jobs are recorded but never fired.

use crate::{SchedulerError, SchedulerFactory, SchedulerInterface, SchedulerRegistry};
use async_trait::async_trait;
use expiry_types::{
	BackendConfig, ConfigSchema, ImplementationRegistry, ScheduledJob, Schema, ValidationError,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory scheduler keyed by job name.
///
/// Clones share the same job table.
#[derive(Clone, Default)]
pub struct MemoryScheduler {
	jobs: Arc<RwLock<BTreeMap<String, ScheduledJob>>>,
}

impl MemoryScheduler {
	pub fn new() -> Self {
		Self::default()
	}

	/// All installed jobs, ordered by name.
	pub async fn jobs(&self) -> Vec<ScheduledJob> {
		self.jobs.read().await.values().cloned().collect()
	}

	pub async fn job(&self, name: &str) -> Option<ScheduledJob> {
		self.jobs.read().await.get(name).cloned()
	}
}

#[async_trait]
impl SchedulerInterface for MemoryScheduler {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemorySchedulerSchema)
	}

	async fn upsert_job(&self, job: &ScheduledJob) -> Result<(), SchedulerError> {
		self.jobs
			.write()
			.await
			.insert(job.name.clone(), job.clone());
		Ok(())
	}

	async fn list_jobs(&self) -> Result<Vec<ScheduledJob>, SchedulerError> {
		Ok(self.jobs().await)
	}
}

/// Configuration schema for MemoryScheduler.
pub struct MemorySchedulerSchema;

impl ConfigSchema for MemorySchedulerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory scheduler from configuration.
pub fn create_scheduler(
	config: &toml::Value,
	_backend: &BackendConfig,
) -> Result<Box<dyn SchedulerInterface>, SchedulerError> {
	MemorySchedulerSchema
		.validate(config)
		.map_err(|e| SchedulerError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryScheduler::new()))
}

/// Registry for the memory scheduler.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = SchedulerFactory;

	fn factory() -> Self::Factory {
		create_scheduler
	}
}

impl SchedulerRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use expiry_types::JobTarget;

	#[tokio::test]
	async fn test_upsert_replaces_by_name() {
		let scheduler = MemoryScheduler::new();
		let target =
			|token: &str| JobTarget::post_json("https://x.test/fn", token, serde_json::json!({}));

		scheduler
			.upsert_job(&ScheduledJob::new("hourly", "0 * * * *", target("old")))
			.await
			.unwrap();
		scheduler
			.upsert_job(&ScheduledJob::new("hourly", "30 * * * *", target("new")))
			.await
			.unwrap();

		let jobs = scheduler.jobs().await;
		assert_eq!(jobs.len(), 1);
		assert_eq!(jobs[0].schedule, "30 * * * *");
		assert_eq!(jobs[0].target.header("authorization"), Some("Bearer new"));
	}
}
