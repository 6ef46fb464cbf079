//! Authenticated identity attached to calls
//!
//! INTENTION: Hold the properties of an authenticated peer in a form the RPC
//! layer can query. One context is created per handshake and shared as
//! `Arc<AuthContext>` by every call on the connection.

use crate::error::{Result, SecurityError};

/// Property names exposed to application code
pub mod property {
    pub const TRANSPORT_SECURITY_TYPE: &str = "transport_security_type";
    pub const SSL_TRANSPORT_SECURITY_TYPE: &str = "ssl";

    pub const X509_CN: &str = "x509_common_name";
    pub const X509_SAN: &str = "x509_subject_alternative_name";
    pub const X509_PEM_CERT: &str = "x509_pem_cert";
    pub const SSL_SESSION_REUSED: &str = "ssl_session_reused";
}

/// One (name, value) entry of an auth context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthProperty {
    name: String,
    value: Vec<u8>,
}

impl AuthProperty {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// Authenticated identity of a peer
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    properties: Vec<AuthProperty>,
    peer_identity_property_name: Option<String>,
}

impl AuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_property(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.properties.push(AuthProperty {
            name: name.into(),
            value: value.into(),
        });
    }

    pub fn add_str_property(&mut self, name: impl Into<String>, value: &str) {
        self.add_property(name, value.as_bytes());
    }

    /// All properties in insertion order
    pub fn properties(&self) -> impl Iterator<Item = &AuthProperty> {
        self.properties.iter()
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    pub fn find_properties_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a AuthProperty> + 'a {
        self.properties.iter().filter(move |p| p.name == name)
    }

    pub fn peer_identity_property_name(&self) -> Option<&str> {
        self.peer_identity_property_name.as_deref()
    }

    /// Designate which property carries the peer identity.
    ///
    /// Fails when no property with that name has been added.
    pub fn set_peer_identity_property_name(&mut self, name: &str) -> Result<()> {
        if self.find_properties_by_name(name).next().is_none() {
            return Err(SecurityError::InvalidIdentityPropertyName(name.to_string()));
        }
        self.peer_identity_property_name = Some(name.to_string());
        Ok(())
    }

    /// Values of the peer identity property; empty when unauthenticated
    pub fn peer_identity(&self) -> impl Iterator<Item = &AuthProperty> {
        let name = self.peer_identity_property_name.as_deref();
        self.properties
            .iter()
            .filter(move |p| Some(p.name.as_str()) == name)
    }

    pub fn is_peer_authenticated(&self) -> bool {
        self.peer_identity_property_name.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_name_requires_existing_property() {
        let mut ctx = AuthContext::new();
        ctx.add_str_property(property::X509_CN, "svc");

        let err = ctx
            .set_peer_identity_property_name(property::X509_SAN)
            .unwrap_err();
        assert!(matches!(err, SecurityError::InvalidIdentityPropertyName(ref n) if n == property::X509_SAN));
        assert!(!ctx.is_peer_authenticated());

        ctx.set_peer_identity_property_name(property::X509_CN).unwrap();
        assert!(ctx.is_peer_authenticated());
        let identity: Vec<_> = ctx.peer_identity().filter_map(|p| p.value_str()).collect();
        assert_eq!(identity, vec!["svc"]);
    }

    #[test]
    fn test_multi_valued_properties_keep_order() {
        let mut ctx = AuthContext::new();
        ctx.add_str_property(property::X509_SAN, "a.example.com");
        ctx.add_str_property(property::X509_CN, "svc");
        ctx.add_str_property(property::X509_SAN, "b.example.com");

        let sans: Vec<_> = ctx
            .find_properties_by_name(property::X509_SAN)
            .filter_map(|p| p.value_str())
            .collect();
        assert_eq!(sans, vec!["a.example.com", "b.example.com"]);
        assert_eq!(ctx.property_count(), 3);
        assert_eq!(ctx.peer_identity().count(), 0);
    }
}
