//! Default root certificate resolution against controlled sources

mod common;

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use common::{isolated_resolver, CountingSystemRoots, TestPki};
use runar_tls::{DefaultRootStore, RootsOverride, RootsOverrideSlot, SecurityConfig};
use tempfile::NamedTempFile;

fn pem_file(contents: &[u8]) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents)?;
    file.flush()?;
    Ok(file)
}

#[test]
fn test_configured_file_wins_and_os_store_is_never_queried() -> Result<()> {
    let pki = TestPki::new("File Root")?;
    // Arbitrary trailing bytes must come back untouched.
    let mut contents = pki.ca_pem().to_vec();
    contents.extend_from_slice(b"\n# trailing comment\n");
    let file = pem_file(&contents)?;

    let override_calls = Arc::new(AtomicUsize::new(0));
    let slot = Arc::new(RootsOverrideSlot::new());
    let counter = override_calls.clone();
    slot.set(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        RootsOverride::Ok(b"override".to_vec())
    });
    let system = CountingSystemRoots::returning(b"system");

    let config = SecurityConfig::new()
        .with_default_roots_file_path(file.path().to_string_lossy().into_owned());
    let store = DefaultRootStore::new(isolated_resolver(config, slot, system.clone()));

    assert_eq!(store.pem_root_certs(), Some(contents.as_slice()));
    assert!(store.root_store().is_some());
    assert_eq!(system.calls(), 0);
    assert_eq!(override_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_override_beats_os_store() -> Result<()> {
    let pki = TestPki::new("Override Root")?;
    let slot = Arc::new(RootsOverrideSlot::new());
    let pem = pki.ca_pem().to_vec();
    slot.set(move || RootsOverride::Ok(pem.clone()));
    let system = CountingSystemRoots::returning(b"system");

    let store = DefaultRootStore::new(isolated_resolver(
        SecurityConfig::new(),
        slot,
        system.clone(),
    ));
    assert_eq!(store.pem_root_certs(), Some(pki.ca_pem()));
    assert_eq!(system.calls(), 0);
    Ok(())
}

#[test]
fn test_failed_override_falls_back_to_os_store() {
    let slot = Arc::new(RootsOverrideSlot::new());
    slot.set(|| RootsOverride::Fail);
    let system = CountingSystemRoots::returning(b"system roots");

    let resolver = isolated_resolver(SecurityConfig::new(), slot, system.clone());
    assert_eq!(resolver.compute_pem_root_certs(), b"system roots");
    assert_eq!(system.calls(), 1);
}

#[test]
fn test_disabled_os_store_is_skipped() -> Result<()> {
    let installed = pem_file(b"installed roots")?;
    let system = CountingSystemRoots::returning(b"system roots");

    let resolver = isolated_resolver(
        SecurityConfig::new().with_not_use_system_roots(true),
        Arc::new(RootsOverrideSlot::new()),
        system.clone(),
    )
    .with_installed_roots_path(installed.path());

    assert_eq!(resolver.compute_pem_root_certs(), b"installed roots");
    assert_eq!(system.calls(), 0);
    Ok(())
}

#[test]
fn test_failed_override_still_allows_installed_bundle() -> Result<()> {
    let installed = pem_file(b"installed roots")?;
    let slot = Arc::new(RootsOverrideSlot::new());
    slot.set(|| RootsOverride::Fail);

    let resolver = isolated_resolver(
        SecurityConfig::new(),
        slot,
        CountingSystemRoots::returning(b""),
    )
    .with_installed_roots_path(installed.path());

    assert_eq!(resolver.compute_pem_root_certs(), b"installed roots");
    Ok(())
}

#[test]
fn test_permanent_override_failure_skips_installed_bundle() -> Result<()> {
    let installed = pem_file(b"installed roots")?;
    let slot = Arc::new(RootsOverrideSlot::new());
    slot.set(|| RootsOverride::FailPermanently);

    let without_os = isolated_resolver(
        SecurityConfig::new().with_not_use_system_roots(true),
        slot.clone(),
        CountingSystemRoots::returning(b"system roots"),
    )
    .with_installed_roots_path(installed.path());
    assert!(without_os.compute_pem_root_certs().is_empty());

    let with_os = isolated_resolver(
        SecurityConfig::new(),
        slot,
        CountingSystemRoots::returning(b"system roots"),
    )
    .with_installed_roots_path(installed.path());
    assert_eq!(with_os.compute_pem_root_certs(), b"system roots");
    Ok(())
}

#[test]
fn test_nothing_available_yields_no_roots() {
    let store = common::empty_root_store();
    assert_eq!(store.pem_root_certs(), None);
    assert!(store.root_store().is_none());
}

#[test]
fn test_concurrent_first_access_resolves_once() -> Result<()> {
    let pki = TestPki::new("Concurrent Root")?;
    let system = CountingSystemRoots::returning(pki.ca_pem());
    let store = Arc::new(DefaultRootStore::new(isolated_resolver(
        SecurityConfig::new(),
        Arc::new(RootsOverrideSlot::new()),
        system.clone(),
    )));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            thread::spawn(move || {
                if i % 2 == 0 {
                    store.pem_root_certs().map(<[u8]>::to_vec)
                } else {
                    store.root_store().map(|_| store.bundle().pem().to_vec())
                }
            })
        })
        .collect();

    for handle in handles {
        let pem = handle.join().expect("resolver thread panicked");
        assert_eq!(pem.as_deref(), Some(pki.ca_pem()));
    }
    assert_eq!(system.calls(), 1);

    // Later calls reuse the cached bundle.
    let _ = store.pem_root_certs();
    assert_eq!(system.calls(), 1);
    Ok(())
}
