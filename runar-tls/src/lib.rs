//! Runar TLS – trust bootstrap and peer identity facade
//!
//! Decides which root certificates peers are validated against, builds the
//! handshaker factories for channels and listeners, turns verified peer
//! certificates into call-level identities and checks requested names
//! against them.

pub mod auth_context;
pub mod channel_args;
pub mod config;
pub mod engine;
pub mod error;
pub mod handshake;
pub mod identity;
pub mod name_check;
pub mod peer;
pub mod root_store;
pub mod session_cache;

pub use error::{Result, SecurityError};

pub use config::{process_cipher_suites, CipherSuiteSetting, SecurityConfig};

pub use root_store::{
    set_roots_override_callback, DefaultRootStore, NativeRootsLoader, RootCertBundle,
    RootStoreResolver, RootsOverride, RootsOverrideSlot, SystemRootsLoader,
};

pub use engine::{
    peer_credential, ClientHandshakerFactory, ClientHandshakerOptions,
    EngineClientCertificatePolicy, EngineError, PemKeyCertPair, RustlsEngine,
    ServerHandshakerFactory, ServerHandshakerOptions, TlsEngine,
};

pub use handshake::{
    fill_alpn_protocols, AlpnProtocols, ClientCertificateRequestType, HandshakerFactoryBuilder,
    Http2Alpn,
};

pub use auth_context::{AuthContext, AuthProperty};
pub use identity::{peer_to_auth_context, shallow_peer_from_auth_context, PeerIdentityProperty};
pub use peer::{PeerCredential, PeerCredentialView, PeerProperty, PeerPropertyRef};

pub use name_check::{
    check_alpn, check_call_host, check_peer_name, cmp_target_name, host_matches_name,
    split_host_port, CallHostMatch, PeerNameMatcher, TargetIdentity, X509NameMatcher,
};

pub use channel_args::{ChannelArg, ChannelArgValue, ChannelArgs, PointerArg};
pub use session_cache::{LruSessionStore, SessionCache, SESSION_CACHE_ARG};
