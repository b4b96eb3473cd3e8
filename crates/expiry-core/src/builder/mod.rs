//! Builder pattern for constructing expiry engines.
//!
//! Composes an ExpiryEngine from the configured order store and scheduler
//! implementations using factory functions keyed by implementation name.

use crate::event_bus::EventBus;
use crate::ExpiryEngine;
use expiry_config::Config;
use expiry_scheduler::{SchedulerError, SchedulerInterface, SchedulerService};
use expiry_storage::{OrderStoreInterface, OrderStoreService, StoreError};
use expiry_types::BackendConfig;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable component, keyed by name.
pub struct ExpiryFactories<SF, SCF> {
	pub storage_factories: HashMap<String, SF>,
	pub scheduler_factories: HashMap<String, SCF>,
}

/// Builder for constructing an ExpiryEngine with pluggable implementations.
pub struct ExpiryBuilder {
	config: Config,
	event_bus: Option<EventBus>,
}

impl ExpiryBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			event_bus: None,
		}
	}

	/// Uses an existing event bus instead of creating one.
	pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
		self.event_bus = Some(event_bus);
		self
	}

	/// Builds the engine, creating only the primary implementation of each
	/// component.
	pub fn build<SF, SCF>(
		self,
		factories: ExpiryFactories<SF, SCF>,
	) -> Result<ExpiryEngine, BuilderError>
	where
		SF: Fn(&toml::Value, &BackendConfig) -> Result<Box<dyn OrderStoreInterface>, StoreError>,
		SCF: Fn(
			&toml::Value,
			&BackendConfig,
		) -> Result<Box<dyn SchedulerInterface>, SchedulerError>,
	{
		let store_backend = load_primary(
			"storage",
			&self.config.storage.primary,
			&self.config.storage.implementations,
			&factories.storage_factories,
			&self.config.backend,
		)?;
		let scheduler_backend = load_primary(
			"scheduler",
			&self.config.scheduler.primary,
			&self.config.scheduler.implementations,
			&factories.scheduler_factories,
			&self.config.backend,
		)?;

		let event_bus = self.event_bus.unwrap_or_default();
		Ok(ExpiryEngine::new(
			self.config,
			Arc::new(OrderStoreService::new(store_backend)),
			Arc::new(SchedulerService::new(scheduler_backend)),
			event_bus,
		))
	}
}

/// Creates the primary implementation of one component.
fn load_primary<T, E, F>(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
	backend: &BackendConfig,
) -> Result<T, BuilderError>
where
	E: Display,
	F: Fn(&toml::Value, &BackendConfig) -> Result<T, E>,
{
	for name in implementations.keys() {
		if name != primary && !factories.contains_key(name) {
			tracing::warn!(component, implementation = %name, "No factory registered, ignoring");
		}
	}

	let config = implementations.get(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' not found in implementations",
			component, primary
		))
	})?;
	let factory = factories.get(primary).ok_or_else(|| {
		BuilderError::MissingComponent(format!("{} implementation '{}'", component, primary))
	})?;

	match factory(config, backend) {
		Ok(implementation) => {
			tracing::info!(component, implementation = %primary, "Loaded");
			Ok(implementation)
		},
		Err(e) => {
			tracing::error!(
				component,
				implementation = %primary,
				error = %e,
				"Failed to create implementation"
			);
			Err(BuilderError::Config(format!(
				"Failed to create {} implementation '{}': {}",
				component, primary, e
			)))
		},
	}
}
