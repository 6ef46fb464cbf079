//! Shared fixtures for the runar-tls integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair, SanType,
    PKCS_RSA_SHA256,
};
use runar_tls::{
    DefaultRootStore, PemKeyCertPair, RootStoreResolver, RootsOverrideSlot, SecurityConfig,
    SystemRootsLoader,
};
use rustls::{ClientConnection, ServerConnection};

/// Fixed RSA 2048 key, rcgen cannot generate RSA keys itself
const RSA_2048_ROOT_KEY: &str = include_str!("rsa2048_root_key.pem");

/// Test certificate authority issuing ECDSA P-256 leaves
pub struct TestPki {
    ca: Certificate,
    ca_pem: String,
}

impl TestPki {
    pub fn new(common_name: &str) -> Result<Self> {
        let mut params = CertificateParams::new(Vec::<String>::new());
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        let ca = Certificate::from_params(params)?;
        let ca_pem = ca.serialize_pem()?;
        Ok(Self { ca, ca_pem })
    }

    /// Self-signed root with an RSA 2048 key signing with SHA-256
    pub fn with_rsa_root(common_name: &str) -> Result<Self> {
        let mut params = CertificateParams::new(Vec::<String>::new());
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        params.alg = &PKCS_RSA_SHA256;
        params.key_pair = Some(KeyPair::from_pem(RSA_2048_ROOT_KEY)?);
        let ca = Certificate::from_params(params)?;
        let ca_pem = ca.serialize_pem()?;
        Ok(Self { ca, ca_pem })
    }

    pub fn ca_pem(&self) -> &[u8] {
        self.ca_pem.as_bytes()
    }

    /// Leaf with the given common name and DNS subject alternative names
    pub fn issue(&self, common_name: &str, dns_names: &[&str]) -> Result<PemKeyCertPair> {
        let names: Vec<String> = dns_names.iter().map(|n| n.to_string()).collect();
        let mut params = CertificateParams::new(names);
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        self.sign(params)
    }

    /// Leaf carrying IP address subject alternative names only
    pub fn issue_for_ips(
        &self,
        common_name: &str,
        ips: &[std::net::IpAddr],
    ) -> Result<PemKeyCertPair> {
        let mut params = CertificateParams::new(Vec::<String>::new());
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        params.subject_alt_names = ips.iter().map(|ip| SanType::IpAddress(*ip)).collect();
        self.sign(params)
    }

    fn sign(&self, params: CertificateParams) -> Result<PemKeyCertPair> {
        let leaf = Certificate::from_params(params)?;
        let cert_pem = leaf.serialize_pem_with_signer(&self.ca)?;
        Ok(PemKeyCertPair::new(leaf.serialize_private_key_pem(), cert_pem))
    }
}

/// DER of the first certificate in a PEM chain
pub fn first_der(pem: &[u8]) -> Result<Vec<u8>> {
    let mut certs = rustls_pemfile::certs(&mut &pem[..])?;
    if certs.is_empty() {
        bail!("no certificate in PEM");
    }
    Ok(certs.remove(0))
}

/// OS trust store stand-in that counts how often it is queried
#[derive(Default)]
pub struct CountingSystemRoots {
    pub pem: Vec<u8>,
    pub calls: AtomicUsize,
}

impl CountingSystemRoots {
    pub fn returning(pem: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            pem: pem.to_vec(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SystemRootsLoader for CountingSystemRoots {
    fn load_system_roots(&self) -> Vec<u8> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pem.clone()
    }
}

/// Resolver that touches no process-wide state
pub fn isolated_resolver(
    config: SecurityConfig,
    slot: Arc<RootsOverrideSlot>,
    system_roots: Arc<dyn SystemRootsLoader>,
) -> RootStoreResolver {
    RootStoreResolver::new(config)
        .with_override_slot(slot)
        .with_system_roots(system_roots)
        .with_installed_roots_path("/nonexistent/runar/share/roots.pem")
}

/// Default roots with every source empty
pub fn empty_root_store() -> Arc<DefaultRootStore> {
    Arc::new(DefaultRootStore::new(isolated_resolver(
        SecurityConfig::new().with_not_use_system_roots(true),
        Arc::new(RootsOverrideSlot::new()),
        CountingSystemRoots::returning(b""),
    )))
}

fn client_to_server(client: &mut ClientConnection, server: &mut ServerConnection) -> Result<()> {
    let mut buf = Vec::new();
    while client.wants_write() {
        client.write_tls(&mut buf)?;
    }
    let mut reader = &buf[..];
    while !reader.is_empty() {
        server.read_tls(&mut reader)?;
        server.process_new_packets()?;
    }
    Ok(())
}

fn server_to_client(server: &mut ServerConnection, client: &mut ClientConnection) -> Result<()> {
    let mut buf = Vec::new();
    while server.wants_write() {
        server.write_tls(&mut buf)?;
    }
    let mut reader = &buf[..];
    while !reader.is_empty() {
        client.read_tls(&mut reader)?;
        client.process_new_packets()?;
    }
    Ok(())
}

/// Drive both ends in memory until the handshake and any session tickets
/// have been exchanged.
pub fn complete_handshake(
    client: &mut ClientConnection,
    server: &mut ServerConnection,
) -> Result<()> {
    for _ in 0..16 {
        client_to_server(client, server)?;
        server_to_client(server, client)?;
        let settled = !client.is_handshaking()
            && !server.is_handshaking()
            && !client.wants_write()
            && !server.wants_write();
        if settled {
            return Ok(());
        }
    }
    bail!("handshake did not complete")
}
