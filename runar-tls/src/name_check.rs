//! Hostname and target-name checks
//!
//! INTENTION: Decide whether the identity in a peer certificate matches the
//! name a caller meant to reach. Certificate name semantics (SAN before CN,
//! wildcards, IP literals) live behind [`PeerNameMatcher`]; this module owns
//! host/port splitting, zone-id stripping and the call-level policy.

use std::cmp::Ordering;
use std::net::IpAddr;
use std::sync::OnceLock;

use runar_common::log_debug;
use runar_common::logging::{Component, Logger};

use crate::auth_context::AuthContext;
use crate::error::{Result, SecurityError};
use crate::identity::shallow_peer_from_auth_context;
use crate::peer::{property, PeerCredentialView, PeerPropertyRef};

/// Certificate name matching capability of the TLS engine
pub trait PeerNameMatcher: Send + Sync {
    fn matches_name(&self, peer: &PeerCredentialView<'_>, name: &str) -> bool;
}

/// X.509 name matching.
///
/// - IP literals only match SAN entries exactly.
/// - DNS names match SAN entries case-insensitively, with `*.` wildcards
///   covering exactly one left-most label.
/// - CN is consulted only when the peer has no SAN entry at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct X509NameMatcher;

impl PeerNameMatcher for X509NameMatcher {
    fn matches_name(&self, peer: &PeerCredentialView<'_>, name: &str) -> bool {
        let like_ip = name.parse::<IpAddr>().is_ok();
        let mut san_count = 0;
        let mut cn: Option<&PeerPropertyRef<'_>> = None;

        for prop in peer.properties() {
            if prop.name == property::SUBJECT_ALTERNATIVE_NAME {
                san_count += 1;
                let Some(entry) = prop.value_str() else {
                    continue;
                };
                if like_ip {
                    if entry == name {
                        return true;
                    }
                } else if entry_matches_name(entry, name) {
                    return true;
                }
            } else if prop.name == property::SUBJECT_COMMON_NAME {
                cn = Some(prop);
            }
        }

        if san_count == 0 && !like_ip {
            if let Some(entry) = cn.and_then(|p| p.value_str()) {
                return entry_matches_name(entry, name);
            }
        }
        false
    }
}

fn logger() -> &'static Logger {
    static LOGGER: OnceLock<Logger> = OnceLock::new();
    LOGGER.get_or_init(|| Logger::new_root(Component::NameCheck, "process"))
}

fn entry_matches_name(entry: &str, name: &str) -> bool {
    if entry.is_empty() {
        return false;
    }
    let name = name.strip_suffix('.').unwrap_or(name);
    let entry = match entry.strip_suffix('.') {
        Some("") => return false,
        Some(stripped) => stripped,
        None => entry,
    };

    if name.eq_ignore_ascii_case(entry) {
        return true;
    }
    let Some(entry_domain) = entry.strip_prefix('*') else {
        return false;
    };
    // At least "*.x"
    let Some(entry_domain) = entry_domain.strip_prefix('.').filter(|d| !d.is_empty()) else {
        log_debug!(logger(), "Invalid wildcard entry {entry:?}");
        return false;
    };

    let Some(dot) = name.find('.') else {
        return false;
    };
    if dot + 2 >= name.len() {
        return false;
    }
    let name_domain = &name[dot + 1..];
    match name_domain.find('.') {
        Some(inner) if inner + 1 < name_domain.len() => {}
        _ => {
            log_debug!(logger(), "Invalid top level domain in {name:?}");
            return false;
        }
    }
    name_domain.eq_ignore_ascii_case(entry_domain)
}

/// Split `host[:port]`, `[v6]`, `[v6]:port` or a bare IPv6 literal.
///
/// Returns `None` when the input is malformed.
pub fn split_host_port(name: &str) -> Option<(&str, Option<&str>)> {
    if let Some(rest) = name.strip_prefix('[') {
        let close = rest.find(']')?;
        let host = &rest[..close];
        let after = &rest[close + 1..];
        if after.is_empty() {
            return Some((host, None));
        }
        let port = after.strip_prefix(':')?;
        return Some((host, Some(port)));
    }

    match name.find(':') {
        None => Some((name, None)),
        Some(colon) => {
            if name[colon + 1..].contains(':') {
                // Bare IPv6 literal; it cannot carry a port.
                Some((name, None))
            } else {
                Some((&name[..colon], Some(&name[colon + 1..])))
            }
        }
    }
}

/// Whether `name` (host with optional port) matches the peer certificate.
pub fn host_matches_name(peer: &PeerCredentialView<'_>, name: &str) -> bool {
    host_matches_name_with(&X509NameMatcher, peer, name)
}

pub fn host_matches_name_with(
    matcher: &dyn PeerNameMatcher,
    peer: &PeerCredentialView<'_>,
    name: &str,
) -> bool {
    let host = match split_host_port(name) {
        Some((host, _port)) if !host.is_empty() => host,
        _ => return false,
    };
    // IPv6 zone ids are link-local and never part of certificate identity.
    let host = match host.find('%') {
        Some(zone) => &host[..zone],
        None => host,
    };
    matcher.matches_name(peer, host)
}

/// Check the peer certificate against the name the caller asked for.
///
/// An empty name skips the check.
pub fn check_peer_name(name: &str, peer: &PeerCredentialView<'_>) -> Result<()> {
    if !name.is_empty() && !host_matches_name(peer, name) {
        return Err(SecurityError::PeerNameMismatch(name.to_string()));
    }
    Ok(())
}

/// ALPN enforcement hook; protocol selection is validated by the engine.
pub fn check_alpn(_peer: &PeerCredentialView<'_>) -> Result<()> {
    Ok(())
}

/// Why a call host was accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallHostMatch {
    /// The host matches the peer certificate
    Certificate,
    /// The host equals the channel target and an override name is set
    TargetOverride,
}

/// Authorize the `:authority` of a call against the connection identity.
pub fn check_call_host(
    host: &str,
    target_name: &str,
    overridden_target_name: &str,
    auth_context: &AuthContext,
) -> Result<CallHostMatch> {
    check_call_host_with(
        &X509NameMatcher,
        host,
        target_name,
        overridden_target_name,
        auth_context,
    )
}

pub fn check_call_host_with(
    matcher: &dyn PeerNameMatcher,
    host: &str,
    target_name: &str,
    overridden_target_name: &str,
    auth_context: &AuthContext,
) -> Result<CallHostMatch> {
    let peer = shallow_peer_from_auth_context(auth_context);
    if host_matches_name_with(matcher, &peer, host) {
        return Ok(CallHostMatch::Certificate);
    }
    if !overridden_target_name.is_empty() && host == target_name {
        return Ok(CallHostMatch::TargetOverride);
    }
    Err(SecurityError::CallHostMismatch {
        host: host.to_string(),
    })
}

/// Order two (target, override) pairs: target first, then override.
pub fn cmp_target_name(
    target_name: &str,
    overridden_target_name: &str,
    other_target_name: &str,
    other_overridden_target_name: &str,
) -> Ordering {
    target_name
        .cmp(other_target_name)
        .then_with(|| overridden_target_name.cmp(other_overridden_target_name))
}

/// Key for caches of per-target security state
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetIdentity {
    pub target_name: String,
    pub overridden_target_name: String,
}

impl TargetIdentity {
    pub fn new(target_name: impl Into<String>, overridden_target_name: impl Into<String>) -> Self {
        Self {
            target_name: target_name.into(),
            overridden_target_name: overridden_target_name.into(),
        }
    }
}

impl Ord for TargetIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_target_name(
            &self.target_name,
            &self.overridden_target_name,
            &other.target_name,
            &other.overridden_target_name,
        )
    }
}

impl PartialOrd for TargetIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
