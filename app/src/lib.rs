//! # Attendance App
//!
//! Wires the booking engine for a deployment:
//!
//! - [`Config`]: environment configuration with defaults
//! - [`App`]: store, notification dispatcher, engine and metrics server
//! - [`TracingNotificationSink`]: notification sink that writes notices to the log
//!
//! The `demo` binary runs a short booking scenario against the configured store.

pub mod bootstrap;
pub mod config;
pub mod sink;

pub use bootstrap::{App, BootstrapError, init_tracing};
pub use config::{Config, ConfigError, StoreBackend};
pub use sink::TracingNotificationSink;
