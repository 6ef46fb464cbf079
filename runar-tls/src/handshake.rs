//! Handshaker factory construction
//!
//! INTENTION: Assemble the options a TLS engine needs for a channel or a
//! listener (trust anchors, local key material, ALPN list, cipher suites,
//! client certificate policy, session cache) and turn engine failures into
//! [`SecurityError`]s that abort channel or listener construction.

use std::sync::Arc;

use runar_common::logging::{Component, Logger};
use runar_common::{log_debug, log_error};

use crate::config::process_cipher_suites;
use crate::engine::{
    ClientHandshakerFactory, ClientHandshakerOptions, EngineClientCertificatePolicy,
    PemKeyCertPair, RustlsEngine, ServerHandshakerFactory, ServerHandshakerOptions, TlsEngine,
};
use crate::error::{Result, SecurityError};
use crate::root_store::DefaultRootStore;
use crate::session_cache::SessionCache;

/// ALPN protocol ids offered by the wire protocol, in preference order
pub trait AlpnProtocols: Send + Sync {
    fn num_versions(&self) -> usize;
    fn version(&self, index: usize) -> &str;
}

/// HTTP/2 over TLS
#[derive(Debug, Clone, Copy, Default)]
pub struct Http2Alpn;

impl AlpnProtocols for Http2Alpn {
    fn num_versions(&self) -> usize {
        1
    }

    fn version(&self, _index: usize) -> &str {
        "h2"
    }
}

pub fn fill_alpn_protocols(alpn: &dyn AlpnProtocols) -> Vec<Vec<u8>> {
    (0..alpn.num_versions())
        .map(|i| alpn.version(i).as_bytes().to_vec())
        .collect()
}

/// How a server asks clients for certificates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum ClientCertificateRequestType {
    #[default]
    DontRequest = 0,
    RequestButDontVerify = 1,
    RequestAndVerify = 2,
    RequireButDontVerify = 3,
    RequireAndVerify = 4,
}

impl From<u32> for ClientCertificateRequestType {
    /// Unknown values fall back to not requesting a certificate.
    fn from(value: u32) -> Self {
        match value {
            1 => Self::RequestButDontVerify,
            2 => Self::RequestAndVerify,
            3 => Self::RequireButDontVerify,
            4 => Self::RequireAndVerify,
            _ => Self::DontRequest,
        }
    }
}

impl From<ClientCertificateRequestType> for EngineClientCertificatePolicy {
    fn from(value: ClientCertificateRequestType) -> Self {
        match value {
            ClientCertificateRequestType::DontRequest => Self::DontRequest,
            ClientCertificateRequestType::RequestButDontVerify => Self::RequestButDontVerify,
            ClientCertificateRequestType::RequestAndVerify => Self::RequestAndVerify,
            ClientCertificateRequestType::RequireButDontVerify => Self::RequireButDontVerify,
            ClientCertificateRequestType::RequireAndVerify => Self::RequireAndVerify,
        }
    }
}

/// Builds client and server handshaker factories
#[derive(Clone)]
pub struct HandshakerFactoryBuilder {
    engine: Arc<dyn TlsEngine>,
    alpn: Arc<dyn AlpnProtocols>,
    root_store: Arc<DefaultRootStore>,
    cipher_suites: Option<String>,
    logger: Logger,
}

impl Default for HandshakerFactoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HandshakerFactoryBuilder {
    /// Builder over the process-wide roots and cipher suites
    pub fn new() -> Self {
        Self {
            engine: Arc::new(RustlsEngine::new()),
            alpn: Arc::new(Http2Alpn),
            root_store: DefaultRootStore::global().clone(),
            cipher_suites: None,
            logger: Logger::new_root(Component::Handshake, "process"),
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn TlsEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_alpn(mut self, alpn: Arc<dyn AlpnProtocols>) -> Self {
        self.alpn = alpn;
        self
    }

    pub fn with_root_store(mut self, root_store: Arc<DefaultRootStore>) -> Self {
        self.root_store = root_store;
        self
    }

    /// Use `suites` instead of the process-wide cipher suite setting
    pub fn with_cipher_suites(mut self, suites: impl Into<String>) -> Self {
        self.cipher_suites = Some(suites.into());
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    fn cipher_suites(&self) -> String {
        match &self.cipher_suites {
            Some(suites) => suites.clone(),
            None => process_cipher_suites().to_string(),
        }
    }

    /// Factory for client handshakes.
    ///
    /// Without explicit `pem_root_certs` the default roots are used; the call
    /// fails with [`SecurityError::RootCertUnavailable`] when there are none.
    pub fn build_client_factory(
        &self,
        key_cert_pair: Option<&PemKeyCertPair>,
        pem_root_certs: Option<&[u8]>,
        session_cache: Option<&SessionCache>,
    ) -> Result<ClientHandshakerFactory> {
        let mut options = ClientHandshakerOptions::default();

        match pem_root_certs {
            Some(pem) => options.pem_root_certs = Some(pem.to_vec()),
            None => {
                let pem = self.root_store.pem_root_certs().ok_or_else(|| {
                    log_error!(self.logger, "Could not get default pem root certs");
                    SecurityError::RootCertUnavailable
                })?;
                options.pem_root_certs = Some(pem.to_vec());
                options.root_store = self.root_store.root_store();
            }
        }

        if let Some(pair) = key_cert_pair.filter(|pair| pair.is_complete()) {
            options.pem_key_cert_pair = Some(pair.clone());
        }
        options.alpn_protocols = fill_alpn_protocols(self.alpn.as_ref());
        options.cipher_suites = self.cipher_suites();
        options.session_cache = session_cache.cloned();

        log_debug!(
            self.logger,
            "Creating client handshaker factory with {} ALPN protocols",
            options.alpn_protocols.len()
        );
        self.engine
            .create_client_factory(options)
            .map_err(|e| {
                log_error!(self.logger, "Handshaker client factory creation failed with {e}");
                SecurityError::HandshakeFactoryCreationFailed(e.to_string())
            })
    }

    /// Factory for server handshakes
    pub fn build_server_factory(
        &self,
        key_cert_pairs: &[PemKeyCertPair],
        pem_client_root_certs: Option<&[u8]>,
        client_certificate_request: ClientCertificateRequestType,
    ) -> Result<ServerHandshakerFactory> {
        let options = ServerHandshakerOptions {
            pem_key_cert_pairs: key_cert_pairs.to_vec(),
            pem_client_root_certs: pem_client_root_certs.map(<[u8]>::to_vec),
            client_certificate_request: client_certificate_request.into(),
            alpn_protocols: fill_alpn_protocols(self.alpn.as_ref()),
            cipher_suites: self.cipher_suites(),
        };

        log_debug!(
            self.logger,
            "Creating server handshaker factory with {} key/cert pairs",
            options.pem_key_cert_pairs.len()
        );
        self.engine
            .create_server_factory(options)
            .map_err(|e| {
                log_error!(self.logger, "Handshaker server factory creation failed with {e}");
                SecurityError::HandshakeFactoryCreationFailed(e.to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TwoProtocols;

    impl AlpnProtocols for TwoProtocols {
        fn num_versions(&self) -> usize {
            2
        }

        fn version(&self, index: usize) -> &str {
            ["h2", "runar/1"][index]
        }
    }

    #[test]
    fn test_fill_alpn_protocols() {
        assert_eq!(fill_alpn_protocols(&Http2Alpn), vec![b"h2".to_vec()]);
        assert_eq!(
            fill_alpn_protocols(&TwoProtocols),
            vec![b"h2".to_vec(), b"runar/1".to_vec()]
        );
    }

    #[test]
    fn test_request_type_from_raw() {
        assert_eq!(
            ClientCertificateRequestType::from(4),
            ClientCertificateRequestType::RequireAndVerify
        );
        assert_eq!(
            ClientCertificateRequestType::from(99),
            ClientCertificateRequestType::DontRequest
        );
        assert_eq!(
            EngineClientCertificatePolicy::from(ClientCertificateRequestType::RequestButDontVerify),
            EngineClientCertificatePolicy::RequestButDontVerify
        );
    }
}
