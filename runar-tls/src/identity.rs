//! Translation between peer credentials and auth contexts
//!
//! INTENTION: Turn the certificate properties of a completed handshake into the
//! identity object used for call authorization, and rebuild a borrowed
//! credential from that identity when a call host has to be checked later.

use std::sync::{Arc, OnceLock};

use runar_common::log_debug;
use runar_common::logging::{Component, Logger};

use crate::auth_context::{property as auth, AuthContext};
use crate::peer::{property as peer, PeerCredential, PeerCredentialView};

fn logger() -> &'static Logger {
    static LOGGER: OnceLock<Logger> = OnceLock::new();
    LOGGER.get_or_init(|| Logger::new_root(Component::Identity, "process"))
}

/// Properties that can carry the canonical peer identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerIdentityProperty {
    CommonName,
    SubjectAltName,
}

impl PeerIdentityProperty {
    pub fn name(&self) -> &'static str {
        match self {
            PeerIdentityProperty::CommonName => auth::X509_CN,
            PeerIdentityProperty::SubjectAltName => auth::X509_SAN,
        }
    }
}

/// Build the auth context of a peer.
///
/// The caller must have checked the certificate type, so the credential holds
/// at least one property. SAN takes precedence over CN as the peer identity
/// whenever both are present, regardless of property order.
pub fn peer_to_auth_context(credential: &PeerCredential) -> Arc<AuthContext> {
    assert!(
        !credential.is_empty(),
        "peer credential must carry at least one property"
    );

    let mut ctx = AuthContext::new();
    ctx.add_str_property(
        auth::TRANSPORT_SECURITY_TYPE,
        auth::SSL_TRANSPORT_SECURITY_TYPE,
    );

    let mut has_cn = false;
    let mut has_san = false;
    for prop in credential.properties() {
        match prop.name.as_str() {
            peer::SUBJECT_COMMON_NAME => {
                has_cn = true;
                ctx.add_property(auth::X509_CN, prop.value.as_slice());
            }
            peer::SUBJECT_ALTERNATIVE_NAME => {
                has_san = true;
                ctx.add_property(auth::X509_SAN, prop.value.as_slice());
            }
            peer::PEM_CERT => ctx.add_property(auth::X509_PEM_CERT, prop.value.as_slice()),
            peer::SESSION_REUSED => {
                ctx.add_property(auth::SSL_SESSION_REUSED, prop.value.as_slice())
            }
            _ => {}
        }
    }

    let identity = if has_san {
        Some(PeerIdentityProperty::SubjectAltName)
    } else if has_cn {
        Some(PeerIdentityProperty::CommonName)
    } else {
        None
    };
    match identity {
        Some(identity) => {
            // The property was added above, so this cannot fail.
            if let Err(err) = ctx.set_peer_identity_property_name(identity.name()) {
                panic!("peer identity property must exist: {err}");
            }
        }
        None => log_debug!(logger(), "Peer presented no certificate identity"),
    }
    Arc::new(ctx)
}

/// Borrowed peer credential rebuilt from an auth context.
///
/// Only SAN, CN and PEM certificate properties map back; the returned view
/// references the context's own bytes and reserves one slot per context
/// property, so its length may be smaller than its capacity.
pub fn shallow_peer_from_auth_context(ctx: &AuthContext) -> PeerCredentialView<'_> {
    let mut view = PeerCredentialView::with_capacity(ctx.property_count());
    for prop in ctx.properties() {
        let peer_name = match prop.name() {
            auth::X509_SAN => peer::SUBJECT_ALTERNATIVE_NAME,
            auth::X509_CN => peer::SUBJECT_COMMON_NAME,
            auth::X509_PEM_CERT => peer::PEM_CERT,
            _ => continue,
        };
        view.push(peer_name, prop.value());
    }
    view
}
