//! Factory registry for order store and scheduler implementations.
//!
//! Collects every implementation the linked crates provide and hands the
//! builder only the factories the configuration asks for.

use expiry_config::Config;
use expiry_core::{ExpiryBuilder, ExpiryEngine, ExpiryFactories};
use expiry_scheduler::SchedulerFactory;
use expiry_storage::StoreFactory;
use std::collections::HashMap;

/// All known implementation factories, keyed by name.
pub struct FactoryRegistry {
	pub storage: HashMap<String, StoreFactory>,
	pub scheduler: HashMap<String, SchedulerFactory>,
}

impl FactoryRegistry {
	/// Registry populated with every built-in implementation.
	pub fn with_all_implementations() -> Self {
		let mut registry = Self {
			storage: HashMap::new(),
			scheduler: HashMap::new(),
		};

		for (name, factory) in expiry_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.storage.insert(name.to_string(), factory);
		}
		for (name, factory) in expiry_scheduler::get_all_implementations() {
			tracing::debug!("Registering scheduler implementation: {}", name);
			registry.scheduler.insert(name.to_string(), factory);
		}

		registry
	}
}

/// Picks the factories named in `configured`, rejecting unknown names.
fn select<F: Copy>(
	available: &HashMap<String, F>,
	configured: &HashMap<String, toml::Value>,
	type_name: &str,
) -> Result<HashMap<String, F>, String> {
	let mut factories = HashMap::new();
	for name in configured.keys() {
		match available.get(name) {
			Some(factory) => {
				factories.insert(name.clone(), *factory);
			},
			None => {
				let mut known: Vec<_> = available.keys().cloned().collect();
				known.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					type_name,
					name,
					known.join(", ")
				));
			},
		}
	}
	Ok(factories)
}

/// Builds the engine from configuration using the built-in implementations.
pub fn build_engine_from_config(
	config: Config,
) -> Result<ExpiryEngine, Box<dyn std::error::Error>> {
	let registry = FactoryRegistry::with_all_implementations();

	let factories = ExpiryFactories {
		storage_factories: select(&registry.storage, &config.storage.implementations, "storage")?,
		scheduler_factories: select(
			&registry.scheduler,
			&config.scheduler.implementations,
			"scheduler",
		)?,
	};

	Ok(ExpiryBuilder::new(config).build(factories)?)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_registry_contains_builtins() {
		let registry = FactoryRegistry::with_all_implementations();
		for name in ["file", "memory", "rest"] {
			assert!(registry.storage.contains_key(name), "missing {}", name);
		}
		for name in ["memory", "pg_cron"] {
			assert!(registry.scheduler.contains_key(name), "missing {}", name);
		}
	}

	#[test]
	fn test_build_engine() {
		let engine = build_engine_from_config(Config::for_testing()).unwrap();
		assert_eq!(engine.config().job.name, "expire-orders-hourly");
	}

	#[test]
	fn test_unknown_implementation() {
		let mut config = Config::for_testing();
		config
			.scheduler
			.implementations
			.insert("quartz".into(), toml::Value::Table(Default::default()));

		let err = build_engine_from_config(config).err().unwrap();
		assert_eq!(
			err.to_string(),
			"Unknown scheduler implementation 'quartz'. Available: [memory, pg_cron]"
		);
	}
}
