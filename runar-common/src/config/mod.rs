// Process configuration sources
//
// Settings are read through the `ConfigSource` trait so that the security
// layer can be driven by environment variables in production and by an
// in-memory map when embedded or under test.

use std::collections::HashMap;

use crate::logging::{Component, Logger};

/// Read-only key/value configuration source.
pub trait ConfigSource: Send + Sync {
    /// Raw string value for `key`, if set.
    fn get_string(&self, key: &str) -> Option<String>;

    /// Boolean value for `key`.
    ///
    /// Accepts `1/0`, `true/false`, `yes/no` and `on/off` in any case.
    /// Anything else is logged and treated as unset.
    fn get_bool(&self, key: &str) -> Option<bool> {
        let raw = self.get_string(key)?;
        let parsed = parse_bool(&raw);
        if parsed.is_none() {
            let logger = Logger::new_root(Component::Config, "process");
            crate::log_warn!(logger, "Ignoring unparsable boolean value {raw:?} for {key}");
        }
        parsed
    }
}

/// Parse a permissive boolean literal.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration read from process environment variables
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn get_string(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// In-memory configuration
#[derive(Debug, Clone, Default)]
pub struct MapConfigSource {
    values: HashMap<String, String>,
}

impl MapConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl ConfigSource for MapConfigSource {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

impl<T: ConfigSource + ?Sized> ConfigSource for &T {
    fn get_string(&self, key: &str) -> Option<String> {
        (**self).get_string(key)
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        (**self).get_bool(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_variants() {
        for value in ["1", "true", "TRUE", " yes ", "On"] {
            assert_eq!(parse_bool(value), Some(true), "{value}");
        }
        for value in ["0", "false", "No", "off"] {
            assert_eq!(parse_bool(value), Some(false), "{value}");
        }
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn test_map_source_bool_falls_back_to_none_on_garbage() {
        let source = MapConfigSource::new()
            .with_value("flag", "true")
            .with_value("broken", "sometimes");
        assert_eq!(source.get_bool("flag"), Some(true));
        assert_eq!(source.get_bool("broken"), None);
        assert_eq!(source.get_bool("missing"), None);
        assert_eq!(source.get_string("flag").as_deref(), Some("true"));
    }
}
