//! Runar Common
//!
//! Common utilities for the Runar TLS stack.
//!
//! This crate provides:
//! - Component-based structured logging with scope context
//! - Level-gated logging macros (`log_debug!`, `log_info!`, ...)
//! - Key/value process configuration sources

pub mod config;
pub mod logging;
#[macro_use]
mod macros;

pub use config::{ConfigSource, EnvConfigSource, MapConfigSource};
pub use logging::{Component, LogLevel, Logger, LoggingConfig};
