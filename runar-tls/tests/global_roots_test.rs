//! Process-wide roots override, in its own test binary so no other test
//! resolves the global default roots first.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use common::TestPki;
use runar_common::LoggingConfig;
use runar_tls::{
    process_cipher_suites, set_roots_override_callback, DefaultRootStore, HandshakerFactoryBuilder,
    RootsOverride,
};

#[test]
fn test_global_override_feeds_default_roots_once() -> Result<()> {
    LoggingConfig::new().for_tests().apply();

    let pki = TestPki::new("Global Override Root")?;
    let pem = pki.ca_pem().to_vec();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    set_roots_override_callback(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        RootsOverride::Ok(pem.clone())
    });

    let builder = HandshakerFactoryBuilder::new();
    let first = builder.build_client_factory(None, None, None)?;
    let second = builder.build_client_factory(None, None, None)?;
    assert_eq!(first.config().alpn_protocols, second.config().alpn_protocols);

    assert_eq!(
        DefaultRootStore::global().pem_root_certs(),
        Some(pki.ca_pem())
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Registering later has no effect on already resolved roots.
    set_roots_override_callback(|| RootsOverride::FailPermanently);
    assert_eq!(
        DefaultRootStore::global().pem_root_certs(),
        Some(pki.ca_pem())
    );

    assert!(!process_cipher_suites().is_empty());
    Ok(())
}
