//! Registry trait for self-registering implementations.
//!
//! Each pluggable backend module (order stores, schedulers) exposes a
//! `Registry` struct that ties its configuration name to its factory.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// Name used in configuration files to select this implementation, e.g.
	/// `"memory"` for `[storage.implementations.memory]` or `"pg_cron"` for
	/// `[scheduler.implementations.pg_cron]`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Returns the factory that builds this implementation from configuration.
	fn factory() -> Self::Factory;
}
