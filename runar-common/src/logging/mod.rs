// Logging utilities for the Runar TLS stack
//
// This module provides component-scoped structured logging on top of the
// `log` facade:
// - Component-based prefixes (`RootStore`, `Handshake`, ...)
// - Scope tracking (process, channel or listener identity) through logger inheritance
// - Optional target-name tagging for per-channel security state
// - `env_logger` installation for binaries and tests

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Arguments, Display, Formatter};

/// Predefined components for logging categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Security,
    RootStore,
    Handshake,
    Identity,
    NameCheck,
    SessionCache,
    Config,
    Custom(&'static str),
}

impl Component {
    /// Get the string representation of the component
    pub fn as_str(&self) -> &str {
        match self {
            Component::Security => "Security",
            Component::RootStore => "RootStore",
            Component::Handshake => "Handshake",
            Component::Identity => "Identity",
            Component::NameCheck => "NameCheck",
            Component::SessionCache => "SessionCache",
            Component::Config => "Config",
            Component::Custom(name) => name,
        }
    }
}

// Display helper so the prefix is written straight into the log record.
struct PrefixDisplay<'a> {
    parent: Option<Component>,
    component: Component,
    target: Option<&'a str>,
}

impl Display for PrefixDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.parent {
            Some(parent) if parent != Component::Security => {
                write!(f, "{}.{}", parent.as_str(), self.component.as_str())?
            }
            _ => write!(f, "{}", self.component.as_str())?,
        }
        if let Some(target) = self.target {
            write!(f, "|target={target}")?;
        }
        Ok(())
    }
}

/// A helper for creating component-specific loggers with scope tracking
#[derive(Clone)]
pub struct Logger {
    /// Component this logger is for
    component: Component,
    /// Scope the log lines belong to (process, channel or listener id)
    scope: String,
    /// Parent component for hierarchical logging (if any)
    parent_component: Option<Component>,
    /// Target name of the channel the security state belongs to
    target: Option<String>,
}

impl Logger {
    /// Create a new root logger for a specific component and scope
    pub fn new_root(component: Component, scope: &str) -> Self {
        Self {
            component,
            scope: scope.to_string(),
            parent_component: None,
            target: None,
        }
    }

    /// Create a child logger with the same scope but different component
    pub fn with_component(&self, component: Component) -> Self {
        Self {
            component,
            scope: self.scope.clone(),
            parent_component: Some(self.component),
            target: self.target.clone(),
        }
    }

    /// Create a logger tagged with the target name of a channel
    pub fn with_target(&self, target: impl Into<String>) -> Self {
        Self {
            component: self.component,
            scope: self.scope.clone(),
            parent_component: self.parent_component,
            target: Some(target.into()),
        }
    }

    pub fn component(&self) -> Component {
        self.component
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    fn prefix(&self) -> PrefixDisplay<'_> {
        PrefixDisplay {
            parent: self.parent_component,
            component: self.component,
            target: self.target(),
        }
    }

    /// Log a debug message
    pub fn debug(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Debug) {
            debug!("[{}][{}] {}", self.scope, self.prefix(), message.into());
        }
    }

    /// Log a debug message using fmt::Arguments (avoids allocating message String)
    pub fn debug_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Debug) {
            debug!("[{}][{}] {}", self.scope, self.prefix(), args);
        }
    }

    /// Log an info message
    pub fn info(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Info) {
            info!("[{}][{}] {}", self.scope, self.prefix(), message.into());
        }
    }

    /// Log an info message using fmt::Arguments
    pub fn info_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Info) {
            info!("[{}][{}] {}", self.scope, self.prefix(), args);
        }
    }

    /// Log a warning message
    pub fn warn(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Warn) {
            warn!("[{}][{}] {}", self.scope, self.prefix(), message.into());
        }
    }

    /// Log a warning using fmt::Arguments
    pub fn warn_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Warn) {
            warn!("[{}][{}] {}", self.scope, self.prefix(), args);
        }
    }

    /// Log an error message
    pub fn error(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Error) {
            error!("[{}][{}] {}", self.scope, self.prefix(), message.into());
        }
    }

    /// Log an error using fmt::Arguments
    pub fn error_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Error) {
            error!("[{}][{}] {}", self.scope, self.prefix(), args);
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("component", &self.component)
            .field("scope", &self.scope)
            .field("target", &self.target)
            .finish()
    }
}

/// Log level used by [`LoggingConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    Off,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }
}

/// Backend configuration for binaries and tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Route output through the test harness capture
    #[serde(default)]
    pub is_test: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            is_test: false,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn for_tests(mut self) -> Self {
        self.is_test = true;
        self
    }

    /// Install `env_logger` as the `log` backend.
    ///
    /// `RUST_LOG` takes precedence over the configured level. Installing twice
    /// is a no-op, so every test may call this.
    pub fn apply(&self) {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(self.level.into());
        if let Ok(spec) = std::env::var("RUST_LOG") {
            builder.parse_filters(&spec);
        }
        builder.is_test(self.is_test);
        let _ = builder.try_init();
    }
}
