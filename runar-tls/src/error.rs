use thiserror::Error;

/// Error types for the runar-tls crate
#[derive(Error, Debug)]
pub enum SecurityError {
    #[error("No default root certificates are available")]
    RootCertUnavailable,

    #[error("Handshaker factory creation failed: {0}")]
    HandshakeFactoryCreationFailed(String),

    #[error("Peer name {0} is not in peer certificate")]
    PeerNameMismatch(String),

    #[error("Call host {host} does not match SSL server name")]
    CallHostMismatch { host: String },

    #[error("Invalid peer identity property name: {0}")]
    InvalidIdentityPropertyName(String),

    #[error("Invalid peer certificate: {0}")]
    InvalidPeerCertificate(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runar-tls operations
pub type Result<T> = std::result::Result<T, SecurityError>;
