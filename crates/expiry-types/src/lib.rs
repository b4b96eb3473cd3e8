//! Common types module for the order expiry service.
//!
//! This module defines the data types shared by every crate in the workspace:
//! the order records the expiration worker acts on, the scheduled job
//! definitions the registrar installs, the HTTP response bodies, and the
//! configuration validation primitives used by pluggable backends.

/// API types for HTTP endpoints and response bodies.
pub mod api;
/// Backend connection settings shared by REST-based implementations.
pub mod backend;
/// Event types published on the in-process event bus.
pub mod events;
/// Order records, statuses and aggregate statistics.
pub mod order;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Scheduled job definitions and cron expressions.
pub mod schedule;
/// Redacting wrapper for credentials.
pub mod secret_string;
/// Timestamp and identifier formatting helpers.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

// Re-export all types for convenient access
pub use api::*;
pub use backend::BackendConfig;
pub use events::*;
pub use order::*;
pub use registry::ImplementationRegistry;
pub use schedule::*;
pub use secret_string::SecretString;
pub use utils::{format_timestamp, now_timestamp, truncate_id};
pub use validation::*;
