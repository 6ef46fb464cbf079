//! Process-level security settings
//!
//! Settings are read once from a [`ConfigSource`] (environment variables by
//! default) and are immutable afterwards.

use std::path::PathBuf;
use std::sync::OnceLock;

use runar_common::config::{ConfigSource, EnvConfigSource};
use serde::{Deserialize, Serialize};

/// Path to a PEM file holding the default root certificates.
pub const DEFAULT_ROOTS_FILE_PATH_KEY: &str = "RUNAR_TLS_DEFAULT_ROOTS_FILE_PATH";

/// Disables loading root certificates from the OS trust store.
pub const NOT_USE_SYSTEM_ROOTS_KEY: &str = "RUNAR_TLS_NOT_USE_SYSTEM_ROOTS";

/// Colon separated list of cipher suites.
pub const CIPHER_SUITES_KEY: &str = "RUNAR_TLS_CIPHER_SUITES";

/// All default suites are compliant with HTTP/2.
pub const DEFAULT_CIPHER_SUITES: &str = "ECDHE-ECDSA-AES128-GCM-SHA256:\
ECDHE-ECDSA-AES256-GCM-SHA384:\
ECDHE-RSA-AES128-GCM-SHA256:\
ECDHE-RSA-AES256-GCM-SHA384";

const INSTALLED_ROOTS_SUFFIX: &str = "share/runar/roots.pem";

/// Location of the root bundle shipped with the installation.
///
/// Honors `RUNAR_TLS_INSTALL_PREFIX` at compile time and falls back to `/usr`.
pub fn installed_roots_path() -> PathBuf {
    let prefix = option_env!("RUNAR_TLS_INSTALL_PREFIX").unwrap_or("/usr");
    PathBuf::from(prefix).join(INSTALLED_ROOTS_SUFFIX)
}

/// Security settings of the process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// PEM root bundle to use before any other source; empty means unset
    pub default_roots_file_path: String,
    /// Skip the OS trust store when resolving default roots
    pub not_use_system_roots: bool,
    /// Colon separated cipher suite names
    pub cipher_suites: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            default_roots_file_path: String::new(),
            not_use_system_roots: false,
            cipher_suites: DEFAULT_CIPHER_SUITES.to_string(),
        }
    }
}

impl SecurityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every setting from `source`, keeping defaults for unset keys.
    pub fn from_source(source: &dyn ConfigSource) -> Self {
        let defaults = Self::default();
        Self {
            default_roots_file_path: source
                .get_string(DEFAULT_ROOTS_FILE_PATH_KEY)
                .unwrap_or(defaults.default_roots_file_path),
            not_use_system_roots: source
                .get_bool(NOT_USE_SYSTEM_ROOTS_KEY)
                .unwrap_or(defaults.not_use_system_roots),
            cipher_suites: source
                .get_string(CIPHER_SUITES_KEY)
                .unwrap_or(defaults.cipher_suites),
        }
    }

    pub fn from_env() -> Self {
        Self::from_source(&EnvConfigSource)
    }

    pub fn with_default_roots_file_path(mut self, path: impl Into<String>) -> Self {
        self.default_roots_file_path = path.into();
        self
    }

    pub fn with_not_use_system_roots(mut self, disable: bool) -> Self {
        self.not_use_system_roots = disable;
        self
    }

    pub fn with_cipher_suites(mut self, suites: impl Into<String>) -> Self {
        self.cipher_suites = suites.into();
        self
    }
}

/// Cipher suite list computed at most once.
///
/// The first caller reads the configuration; every caller, concurrent or
/// later, observes that same value.
#[derive(Debug, Default)]
pub struct CipherSuiteSetting {
    value: OnceLock<String>,
}

impl CipherSuiteSetting {
    pub const fn new() -> Self {
        Self {
            value: OnceLock::new(),
        }
    }

    pub fn get_or_load(&self, source: &dyn ConfigSource) -> &str {
        self.value
            .get_or_init(|| SecurityConfig::from_source(source).cipher_suites)
    }

    pub fn get(&self) -> Option<&str> {
        self.value.get().map(String::as_str)
    }
}

static PROCESS_CIPHER_SUITES: CipherSuiteSetting = CipherSuiteSetting::new();

/// Cipher suites of the process, read from the environment on first use.
pub fn process_cipher_suites() -> &'static str {
    PROCESS_CIPHER_SUITES.get_or_load(&EnvConfigSource)
}
