//! Transport-level peer credentials
//!
//! A [`PeerCredential`] is the owned list of certificate properties produced by
//! a completed handshake. A [`PeerCredentialView`] is the borrowed counterpart:
//! its values point into storage owned by someone else (a `PeerCredential` or
//! an `AuthContext`), so dropping a view never releases the underlying bytes.

use std::net::IpAddr;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rustls_pki_types::CertificateDer;
use x509_parser::prelude::*;

use crate::error::{Result, SecurityError};

/// Property names emitted by the TLS engine for a verified peer
pub mod property {
    pub const CERTIFICATE_TYPE: &str = "certificate_type";
    pub const SUBJECT_COMMON_NAME: &str = "x509_subject_common_name";
    pub const SUBJECT_ALTERNATIVE_NAME: &str = "x509_subject_alternative_name";
    pub const PEM_CERT: &str = "x509_pem_cert";
    pub const SESSION_REUSED: &str = "ssl_session_reused";

    pub const X509_CERTIFICATE_TYPE: &str = "X509";
}

/// One named property of a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerProperty {
    pub name: String,
    pub value: Vec<u8>,
}

impl PeerProperty {
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// Owned peer credential produced by a handshake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerCredential {
    properties: Vec<PeerProperty>,
}

impl PeerCredential {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.properties.push(PeerProperty::new(name, value));
    }

    pub fn properties(&self) -> &[PeerProperty] {
        &self.properties
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Borrowed view over this credential
    pub fn view(&self) -> PeerCredentialView<'_> {
        PeerCredentialView {
            properties: self
                .properties
                .iter()
                .map(|p| PeerPropertyRef {
                    name: p.name.as_str(),
                    value: p.value.as_slice(),
                })
                .collect(),
        }
    }

    /// Build the credential of a peer from its verified certificate chain.
    ///
    /// Only the leaf certificate contributes properties. A peer that sent no
    /// certificate still gets the certificate type and session-reused flag,
    /// which yields an unauthenticated auth context.
    pub fn from_peer_certificates(
        chain: &[CertificateDer<'_>],
        session_reused: bool,
    ) -> Result<Self> {
        match chain.first() {
            Some(leaf) => Self::from_certificate_der(leaf.as_ref(), session_reused),
            None => Ok(PeerCredential::new()
                .with_property(property::CERTIFICATE_TYPE, property::X509_CERTIFICATE_TYPE)
                .with_property(property::SESSION_REUSED, session_reused_value(session_reused))),
        }
    }

    /// Build the credential of a peer from a DER encoded leaf certificate.
    pub fn from_certificate_der(der: &[u8], session_reused: bool) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der).map_err(|e| {
            SecurityError::InvalidPeerCertificate(format!("Failed to parse certificate: {e}"))
        })?;

        let mut credential = PeerCredential::new().with_property(
            property::CERTIFICATE_TYPE,
            property::X509_CERTIFICATE_TYPE,
        );

        for cn in cert.subject().iter_common_name() {
            let value = cn.as_str().map_err(|e| {
                SecurityError::InvalidPeerCertificate(format!("Invalid common name: {e}"))
            })?;
            credential.push(property::SUBJECT_COMMON_NAME, value);
        }

        let san = cert.subject_alternative_name().map_err(|e| {
            SecurityError::InvalidPeerCertificate(format!(
                "Invalid subject alternative name extension: {e}"
            ))
        })?;
        if let Some(san) = san {
            for name in &san.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => {
                        credential.push(property::SUBJECT_ALTERNATIVE_NAME, *dns)
                    }
                    GeneralName::IPAddress(bytes) => {
                        if let Some(ip) = ip_from_bytes(bytes) {
                            credential.push(property::SUBJECT_ALTERNATIVE_NAME, ip.to_string());
                        }
                    }
                    _ => {}
                }
            }
        }

        credential.push(property::PEM_CERT, der_to_pem(der));
        credential.push(property::SESSION_REUSED, session_reused_value(session_reused));
        Ok(credential)
    }
}

fn session_reused_value(session_reused: bool) -> &'static str {
    if session_reused {
        "true"
    } else {
        "false"
    }
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from),
        _ => None,
    }
}

/// PEM encode a DER certificate with 64 column lines.
pub fn der_to_pem(der: &[u8]) -> String {
    let encoded = STANDARD.encode(der);
    let mut pem = String::with_capacity(encoded.len() + encoded.len() / 64 + 64);
    pem.push_str("-----BEGIN CERTIFICATE-----\n");
    for line in encoded.as_bytes().chunks(64) {
        // base64 output is ASCII
        pem.push_str(std::str::from_utf8(line).unwrap_or_default());
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}

/// Borrowed property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerPropertyRef<'a> {
    pub name: &'a str,
    pub value: &'a [u8],
}

impl<'a> PeerPropertyRef<'a> {
    pub fn value_str(&self) -> Option<&'a str> {
        std::str::from_utf8(self.value).ok()
    }
}

/// Borrowed peer credential.
///
/// Only the index of properties belongs to the view; every value slice is
/// owned by the structure the view was derived from and outlives it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerCredentialView<'a> {
    properties: Vec<PeerPropertyRef<'a>>,
}

impl<'a> PeerCredentialView<'a> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            properties: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, name: &'a str, value: &'a [u8]) {
        self.properties.push(PeerPropertyRef { name, value });
    }

    pub fn properties(&self) -> &[PeerPropertyRef<'a>] {
        &self.properties
    }

    pub fn find<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s PeerPropertyRef<'a>> + 's {
        self.properties.iter().filter(move |p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Number of slots reserved when the view was built
    pub fn capacity(&self) -> usize {
        self.properties.capacity()
    }

    /// Copy the borrowed values into an owned credential
    pub fn to_owned_credential(&self) -> PeerCredential {
        let mut credential = PeerCredential::new();
        for p in &self.properties {
            credential.push(p.name, p.value);
        }
        credential
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_borrows_values() {
        let credential = PeerCredential::new()
            .with_property(property::SUBJECT_COMMON_NAME, "svc")
            .with_property(property::SUBJECT_ALTERNATIVE_NAME, "a.example.com");
        let view = credential.view();

        assert_eq!(view.len(), 2);
        assert_eq!(
            view.properties()[1].value.as_ptr(),
            credential.properties()[1].value.as_ptr()
        );
        assert_eq!(view.to_owned_credential(), credential);
        assert_eq!(view.find(property::SUBJECT_COMMON_NAME).count(), 1);
    }

    #[test]
    fn test_der_to_pem_wraps_at_64_columns() {
        let pem = der_to_pem(&[0u8; 100]);
        let lines: Vec<&str> = pem.lines().collect();
        assert_eq!(lines.first(), Some(&"-----BEGIN CERTIFICATE-----"));
        assert_eq!(lines.last(), Some(&"-----END CERTIFICATE-----"));
        assert!(lines[1..lines.len() - 1].iter().all(|l| l.len() <= 64));
        assert_eq!(lines[1].len(), 64);
    }

    #[test]
    fn test_garbage_certificate_is_rejected() {
        let err = PeerCredential::from_certificate_der(b"not a certificate", false).unwrap_err();
        assert!(matches!(err, SecurityError::InvalidPeerCertificate(_)));
    }

    #[test]
    fn test_missing_certificate_keeps_type_and_session_flag() {
        let credential = PeerCredential::from_peer_certificates(&[], true).unwrap();
        assert_eq!(
            credential.properties(),
            &[
                PeerProperty::new(property::CERTIFICATE_TYPE, property::X509_CERTIFICATE_TYPE),
                PeerProperty::new(property::SESSION_REUSED, "true"),
            ]
        );
    }
}
