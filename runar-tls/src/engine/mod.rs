//! TLS engine seam
//!
//! INTENTION: Keep the handshake state machine out of the trust-bootstrap
//! code. The handshake builder only fills option structures and asks a
//! [`TlsEngine`] for factories; the engine owns parsing of key material and
//! the actual protocol.

use std::fmt;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, CommonState, HandshakeKind, RootCertStore};
use rustls::{ServerConfig, ServerConnection};
use thiserror::Error;

use crate::error::Result;
use crate::peer::PeerCredential;
use crate::session_cache::SessionCache;

pub mod rustls_engine;

pub use rustls_engine::RustlsEngine;

/// Errors reported by a TLS engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("TLS error: {0}")]
    Rustls(#[from] rustls::Error),

    #[error("Client certificate verifier error: {0}")]
    Verifier(String),

    #[error("PEM parsing error: {0}")]
    Pem(std::io::Error),
}

/// PEM encoded private key and certificate chain
#[derive(Clone, PartialEq, Eq)]
pub struct PemKeyCertPair {
    pub private_key: Vec<u8>,
    pub cert_chain: Vec<u8>,
}

impl PemKeyCertPair {
    pub fn new(private_key: impl Into<Vec<u8>>, cert_chain: impl Into<Vec<u8>>) -> Self {
        Self {
            private_key: private_key.into(),
            cert_chain: cert_chain.into(),
        }
    }

    /// Both halves must be present for the pair to be used
    pub fn is_complete(&self) -> bool {
        !self.private_key.is_empty() && !self.cert_chain.is_empty()
    }
}

impl fmt::Debug for PemKeyCertPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PemKeyCertPair")
            .field("private_key", &"<redacted>")
            .field("cert_chain_len", &self.cert_chain.len())
            .finish()
    }
}

/// Client certificate policy as understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineClientCertificatePolicy {
    #[default]
    DontRequest,
    RequestButDontVerify,
    RequestAndVerify,
    RequireButDontVerify,
    RequireAndVerify,
}

/// Options for a client handshaker factory.
///
/// When `root_store` is set it is used as is; otherwise `pem_root_certs`
/// is parsed.
#[derive(Debug, Clone, Default)]
pub struct ClientHandshakerOptions {
    pub pem_root_certs: Option<Vec<u8>>,
    pub root_store: Option<Arc<RootCertStore>>,
    pub pem_key_cert_pair: Option<PemKeyCertPair>,
    pub alpn_protocols: Vec<Vec<u8>>,
    pub cipher_suites: String,
    pub session_cache: Option<SessionCache>,
}

/// Options for a server handshaker factory
#[derive(Debug, Clone, Default)]
pub struct ServerHandshakerOptions {
    pub pem_key_cert_pairs: Vec<PemKeyCertPair>,
    pub pem_client_root_certs: Option<Vec<u8>>,
    pub client_certificate_request: EngineClientCertificatePolicy,
    pub alpn_protocols: Vec<Vec<u8>>,
    pub cipher_suites: String,
}

/// Creates client connections sharing one TLS configuration.
///
/// Holds a reference on the session cache it resumes from.
#[derive(Debug, Clone)]
pub struct ClientHandshakerFactory {
    config: Arc<ClientConfig>,
    session_cache: Option<SessionCache>,
}

impl ClientHandshakerFactory {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self {
            config,
            session_cache: None,
        }
    }

    pub fn with_session_cache(mut self, session_cache: Option<SessionCache>) -> Self {
        self.session_cache = session_cache;
        self
    }

    pub fn config(&self) -> &Arc<ClientConfig> {
        &self.config
    }

    pub fn session_cache(&self) -> Option<&SessionCache> {
        self.session_cache.as_ref()
    }

    /// Start a handshake with the server expected to present `server_name`
    pub fn new_connection(
        &self,
        server_name: &str,
    ) -> std::result::Result<ClientConnection, EngineError> {
        let name = ServerName::try_from(server_name.to_string()).map_err(|e| {
            EngineError::InvalidArgument(format!("Invalid server name {server_name}: {e}"))
        })?;
        Ok(ClientConnection::new(self.config.clone(), name)?)
    }
}

/// Creates server connections sharing one TLS configuration
#[derive(Debug, Clone)]
pub struct ServerHandshakerFactory {
    config: Arc<ServerConfig>,
}

impl ServerHandshakerFactory {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.config
    }

    pub fn new_connection(&self) -> std::result::Result<ServerConnection, EngineError> {
        Ok(ServerConnection::new(self.config.clone())?)
    }
}

/// TLS engine used to build handshaker factories
pub trait TlsEngine: Send + Sync {
    fn create_client_factory(
        &self,
        options: ClientHandshakerOptions,
    ) -> std::result::Result<ClientHandshakerFactory, EngineError>;

    fn create_server_factory(
        &self,
        options: ServerHandshakerOptions,
    ) -> std::result::Result<ServerHandshakerFactory, EngineError>;
}

/// Peer credential of a connection whose handshake has completed.
///
/// A peer that presented no certificate yields a credential without identity
/// properties.
pub fn peer_credential(state: &CommonState) -> Result<PeerCredential> {
    let chain = state.peer_certificates().unwrap_or_default();
    let reused = state.handshake_kind() == Some(HandshakeKind::Resumed);
    PeerCredential::from_peer_certificates(chain, reused)
}
