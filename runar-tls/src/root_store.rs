//! Default root certificate resolution
//!
//! INTENTION: Compute, once per process, the PEM trust anchors used when a
//! channel is built without explicit root certificates. Sources are tried in
//! priority order and the first one producing bytes wins:
//!
//! 1. the file named by the security configuration
//! 2. the registered override callback
//! 3. the OS trust store, unless disabled
//! 4. the bundle shipped with the installation, unless the override callback
//!    failed permanently
//!
//! Sources are fallbacks, never merged.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwapOption;
use rustls::RootCertStore;
use rustls_pki_types::CertificateDer;
use runar_common::logging::{Component, Logger};
use runar_common::{log_debug, log_error, log_info, log_warn};

use crate::config::{installed_roots_path, SecurityConfig};
use crate::peer::der_to_pem;

/// Result of the roots override callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootsOverride {
    /// Use these PEM bytes as the default roots.
    ///
    /// The bytes are kept as given, without a trailing NUL. An empty buffer
    /// counts as no result and resolution continues with the OS trust store.
    Ok(Vec<u8>),
    /// No override; continue with the next source
    Fail,
    /// No override, and the installed bundle must not be used either
    FailPermanently,
}

type RootsOverrideFn = Box<dyn Fn() -> RootsOverride + Send + Sync>;

/// Atomic slot holding at most one override callback.
///
/// Registration is last-writer-wins; readers never block.
#[derive(Default)]
pub struct RootsOverrideSlot {
    callback: ArcSwapOption<RootsOverrideFn>,
}

impl RootsOverrideSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot consulted by [`DefaultRootStore::global`]
    pub fn global() -> &'static Arc<RootsOverrideSlot> {
        static GLOBAL: OnceLock<Arc<RootsOverrideSlot>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(RootsOverrideSlot::new()))
    }

    pub fn set<F>(&self, callback: F)
    where
        F: Fn() -> RootsOverride + Send + Sync + 'static,
    {
        let callback: RootsOverrideFn = Box::new(callback);
        self.callback.store(Some(Arc::new(callback)));
    }

    pub fn is_set(&self) -> bool {
        self.callback.load().is_some()
    }

    /// Run the registered callback, if any
    pub fn invoke(&self) -> Option<RootsOverride> {
        self.callback.load_full().map(|callback| callback())
    }
}

/// Register the process-wide roots override callback.
///
/// Must happen before the first channel is built to have any effect, since
/// default roots are resolved only once.
pub fn set_roots_override_callback<F>(callback: F)
where
    F: Fn() -> RootsOverride + Send + Sync + 'static,
{
    RootsOverrideSlot::global().set(callback);
}

/// Source of the OS trust store
pub trait SystemRootsLoader: Send + Sync {
    /// PEM encoded roots; empty when none could be loaded
    fn load_system_roots(&self) -> Vec<u8>;
}

/// OS trust store through `rustls-native-certs`
#[derive(Debug, Clone)]
pub struct NativeRootsLoader {
    logger: Logger,
}

impl NativeRootsLoader {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl Default for NativeRootsLoader {
    fn default() -> Self {
        Self::new(Logger::new_root(Component::RootStore, "process"))
    }
}

impl SystemRootsLoader for NativeRootsLoader {
    fn load_system_roots(&self) -> Vec<u8> {
        match rustls_native_certs::load_native_certs() {
            Ok(certs) => certs
                .iter()
                .flat_map(|cert| der_to_pem(&cert.0).into_bytes())
                .collect(),
            Err(e) => {
                log_warn!(self.logger, "Failed to load system root certificates: {e}");
                Vec::new()
            }
        }
    }
}

/// Computes the default PEM root bundle from the configured sources
pub struct RootStoreResolver {
    config: SecurityConfig,
    override_slot: Arc<RootsOverrideSlot>,
    system_roots: Arc<dyn SystemRootsLoader>,
    installed_roots_path: PathBuf,
    logger: Logger,
}

impl RootStoreResolver {
    pub fn new(config: SecurityConfig) -> Self {
        let logger = Logger::new_root(Component::RootStore, "process");
        Self {
            config,
            override_slot: RootsOverrideSlot::global().clone(),
            system_roots: Arc::new(NativeRootsLoader::new(logger.clone())),
            installed_roots_path: installed_roots_path(),
            logger,
        }
    }

    pub fn from_env() -> Self {
        Self::new(SecurityConfig::from_env())
    }

    pub fn with_override_slot(mut self, slot: Arc<RootsOverrideSlot>) -> Self {
        self.override_slot = slot;
        self
    }

    pub fn with_system_roots(mut self, loader: Arc<dyn SystemRootsLoader>) -> Self {
        self.system_roots = loader;
        self
    }

    pub fn with_installed_roots_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.installed_roots_path = path.into();
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Resolve the PEM bundle; empty when no source produced anything.
    pub fn compute_pem_root_certs(&self) -> Vec<u8> {
        let mut fail_permanently = false;

        if !self.config.default_roots_file_path.is_empty() {
            let pem = self.load_file(Path::new(&self.config.default_roots_file_path));
            if !pem.is_empty() {
                log_info!(
                    self.logger,
                    "Using default roots from {}",
                    self.config.default_roots_file_path
                );
                return pem;
            }
        }

        if let Some(result) = self.override_slot.invoke() {
            match result {
                RootsOverride::Ok(pem) if !pem.is_empty() => {
                    log_info!(self.logger, "Using default roots from override callback");
                    return pem;
                }
                RootsOverride::Ok(_) | RootsOverride::Fail => {
                    log_debug!(self.logger, "Roots override callback provided no roots");
                }
                RootsOverride::FailPermanently => {
                    log_debug!(self.logger, "Roots override callback failed permanently");
                    fail_permanently = true;
                }
            }
        }

        if !self.config.not_use_system_roots {
            let pem = self.system_roots.load_system_roots();
            if !pem.is_empty() {
                log_info!(self.logger, "Using default roots from the OS trust store");
                return pem;
            }
        }

        if !fail_permanently {
            let pem = self.load_file(&self.installed_roots_path);
            if !pem.is_empty() {
                log_info!(
                    self.logger,
                    "Using installed default roots from {}",
                    self.installed_roots_path.display()
                );
                return pem;
            }
        }

        log_error!(self.logger, "Could not get default pem root certs");
        Vec::new()
    }

    fn load_file(&self, path: &Path) -> Vec<u8> {
        match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                log_warn!(
                    self.logger,
                    "Failed to read root certificates from {}: {e}",
                    path.display()
                );
                Vec::new()
            }
        }
    }
}

/// Resolved default roots: PEM bytes plus the compiled trust store
#[derive(Debug, Clone)]
pub struct RootCertBundle {
    pem: Arc<[u8]>,
    store: Option<Arc<RootCertStore>>,
}

impl RootCertBundle {
    /// The store is only compiled from a non-empty bundle holding at least
    /// one parsable certificate.
    pub fn from_pem(pem: Vec<u8>) -> Self {
        Self::from_pem_with_logger(pem, &Logger::new_root(Component::RootStore, "process"))
    }

    pub(crate) fn from_pem_with_logger(pem: Vec<u8>, logger: &Logger) -> Self {
        let store = if pem.is_empty() {
            None
        } else {
            compile_root_store(&pem, logger)
        };
        Self {
            pem: pem.into(),
            store,
        }
    }

    pub fn pem(&self) -> &[u8] {
        &self.pem
    }

    pub fn store(&self) -> Option<&Arc<RootCertStore>> {
        self.store.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.pem.is_empty()
    }
}

fn compile_root_store(pem: &[u8], logger: &Logger) -> Option<Arc<RootCertStore>> {
    let ders = match rustls_pemfile::certs(&mut &pem[..]) {
        Ok(ders) => ders,
        Err(e) => {
            log_warn!(logger, "Failed to parse default root bundle: {e}");
            return None;
        }
    };
    let mut store = RootCertStore::empty();
    let (added, ignored) =
        store.add_parsable_certificates(ders.into_iter().map(CertificateDer::from));
    if ignored > 0 {
        log_debug!(logger, "Ignored {ignored} unparsable default root certificates");
    }
    (added > 0).then(|| Arc::new(store))
}

/// Lazily resolved default roots.
///
/// The first accessor call runs the resolver; concurrent first calls wait for
/// that single computation and every later call returns the cached bundle.
pub struct DefaultRootStore {
    resolver: RootStoreResolver,
    bundle: OnceLock<RootCertBundle>,
}

impl DefaultRootStore {
    pub fn new(resolver: RootStoreResolver) -> Self {
        Self {
            resolver,
            bundle: OnceLock::new(),
        }
    }

    /// Process-wide instance configured from the environment
    pub fn global() -> &'static Arc<DefaultRootStore> {
        static GLOBAL: OnceLock<Arc<DefaultRootStore>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(DefaultRootStore::new(RootStoreResolver::from_env())))
    }

    pub fn bundle(&self) -> &RootCertBundle {
        self.bundle
            .get_or_init(|| {
                RootCertBundle::from_pem_with_logger(
                    self.resolver.compute_pem_root_certs(),
                    &self.resolver.logger,
                )
            })
    }

    /// Default PEM roots; `None` when no source produced any
    pub fn pem_root_certs(&self) -> Option<&[u8]> {
        let bundle = self.bundle();
        (!bundle.is_empty()).then(|| bundle.pem())
    }

    pub fn root_store(&self) -> Option<Arc<RootCertStore>> {
        self.bundle().store().cloned()
    }
}
