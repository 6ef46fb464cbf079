//! Shared TLS session resumption cache
//!
//! INTENTION: Let one bounded client session store be shared by every channel
//! that copies a given configuration. The cache lives until both the explicit
//! [`SessionCache::destroy`] call and the last configuration copy are gone.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustls::client::{ClientSessionStore, Tls12ClientSessionValue, Tls13ClientSessionValue};
use rustls::NamedGroup;
use rustls_pki_types::ServerName;
use runar_common::log_debug;
use runar_common::logging::{Component, Logger};

use crate::channel_args::{ChannelArgs, PointerArg};

/// Channel configuration key the session cache is attached under
pub const SESSION_CACHE_ARG: &str = "runar.tls.session_cache";

/// TLS 1.3 tickets kept per server, newest last
const MAX_TLS13_TICKETS_PER_SERVER: usize = 8;

#[derive(Default)]
struct ServerSessions {
    kx_hint: Option<NamedGroup>,
    tls12: Option<Tls12ClientSessionValue>,
    tls13: VecDeque<Tls13ClientSessionValue>,
}

#[derive(Default)]
struct LruState {
    servers: HashMap<ServerName<'static>, ServerSessions>,
    // Least recently used first
    order: VecDeque<ServerName<'static>>,
}

impl LruState {
    fn touch(&mut self, name: &ServerName<'static>) {
        if let Some(pos) = self.order.iter().position(|n| n == name) {
            if let Some(key) = self.order.remove(pos) {
                self.order.push_back(key);
            }
        }
    }

    fn get_mut(&mut self, name: &ServerName<'static>) -> Option<&mut ServerSessions> {
        if !self.servers.contains_key(name) {
            return None;
        }
        self.touch(name);
        self.servers.get_mut(name)
    }

    fn entry(&mut self, name: ServerName<'static>, capacity: usize) -> &mut ServerSessions {
        if self.servers.contains_key(&name) {
            self.touch(&name);
        } else {
            while self.order.len() >= capacity {
                match self.order.pop_front() {
                    Some(evicted) => {
                        self.servers.remove(&evicted);
                    }
                    None => break,
                }
            }
            self.order.push_back(name.clone());
        }
        self.servers.entry(name).or_default()
    }
}

/// Client session store keeping the sessions of at most `capacity` servers,
/// evicting the least recently used server first.
pub struct LruSessionStore {
    capacity: usize,
    state: Mutex<LruState>,
}

impl LruSessionStore {
    /// A capacity of zero is raised to one so the store can always resume.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(LruState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of servers with stored state
    pub fn len(&self) -> usize {
        self.lock().servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, LruState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for LruSessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruSessionStore")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl ClientSessionStore for LruSessionStore {
    fn set_kx_hint(&self, server_name: ServerName<'static>, group: NamedGroup) {
        self.lock().entry(server_name, self.capacity).kx_hint = Some(group);
    }

    fn kx_hint(&self, server_name: &ServerName<'_>) -> Option<NamedGroup> {
        self.lock()
            .get_mut(&server_name.to_owned())
            .and_then(|s| s.kx_hint)
    }

    fn set_tls12_session(&self, server_name: ServerName<'static>, value: Tls12ClientSessionValue) {
        self.lock().entry(server_name, self.capacity).tls12 = Some(value);
    }

    fn tls12_session(&self, server_name: &ServerName<'_>) -> Option<Tls12ClientSessionValue> {
        self.lock()
            .get_mut(&server_name.to_owned())
            .and_then(|s| s.tls12.clone())
    }

    fn remove_tls12_session(&self, server_name: &ServerName<'static>) {
        if let Some(sessions) = self.lock().servers.get_mut(server_name) {
            sessions.tls12 = None;
        }
    }

    fn insert_tls13_ticket(&self, server_name: ServerName<'static>, value: Tls13ClientSessionValue) {
        let mut state = self.lock();
        let tickets = &mut state.entry(server_name, self.capacity).tls13;
        if tickets.len() >= MAX_TLS13_TICKETS_PER_SERVER {
            tickets.pop_front();
        }
        tickets.push_back(value);
    }

    fn take_tls13_ticket(
        &self,
        server_name: &ServerName<'static>,
    ) -> Option<Tls13ClientSessionValue> {
        self.lock()
            .get_mut(server_name)
            .and_then(|s| s.tls13.pop_back())
    }
}

#[derive(Debug)]
struct SessionCacheInner {
    store: Arc<LruSessionStore>,
}

/// Reference counted handle to a client session store.
///
/// Cloning takes a new reference; equality is by identity.
#[derive(Debug, Clone)]
pub struct SessionCache {
    inner: Arc<SessionCacheInner>,
}

impl SessionCache {
    /// Create a least-recently-used cache holding the sessions of up to
    /// `capacity` servers.
    pub fn create_lru(capacity: usize) -> Self {
        let store = LruSessionStore::new(capacity);
        let logger = Logger::new_root(Component::SessionCache, "process");
        log_debug!(
            logger,
            "Creating TLS session cache with capacity {}",
            store.capacity()
        );
        Self {
            inner: Arc::new(SessionCacheInner {
                store: Arc::new(store),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.store.capacity()
    }

    /// Number of servers the cache currently holds sessions for
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    /// Store handed to the TLS engine for session resumption
    pub fn client_store(&self) -> Arc<dyn ClientSessionStore> {
        self.inner.store.clone()
    }

    /// Number of live references: handles plus attached configuration values
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Release this handle.
    ///
    /// The cache stays alive while any configuration value still holds it.
    pub fn destroy(self) {
        drop(self);
    }

    /// Wrap the cache as an opaque configuration value
    pub fn to_channel_arg(&self) -> PointerArg {
        PointerArg::new(self.inner.clone())
    }

    /// Attach the cache to `args` under [`SESSION_CACHE_ARG`]
    pub fn attach_to_channel_args(&self, args: ChannelArgs) -> ChannelArgs {
        args.with_pointer(SESSION_CACHE_ARG, self.to_channel_arg())
    }

    /// Session cache attached to `args`, if any
    pub fn from_channel_args(args: &ChannelArgs) -> Option<Self> {
        let inner = args
            .get_pointer(SESSION_CACHE_ARG)?
            .downcast::<SessionCacheInner>()?;
        Some(Self { inner })
    }
}

impl PartialEq for SessionCache {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for SessionCache {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_copy_destroy_is_symmetric() {
        let cache = SessionCache::create_lru(16);
        assert_eq!(cache.ref_count(), 1);

        let probe = Arc::downgrade(&cache.inner);
        let args = cache.attach_to_channel_args(ChannelArgs::new());
        assert_eq!(cache.ref_count(), 2);

        let copy1 = args.clone();
        let copy2 = args.clone();
        assert_eq!(cache.ref_count(), 4);

        cache.destroy();
        assert!(probe.upgrade().is_some());

        drop(args);
        drop(copy1);
        assert!(probe.upgrade().is_some());
        drop(copy2);
        assert!(probe.upgrade().is_none());
    }

    #[test]
    fn test_recovered_from_channel_args() {
        let cache = SessionCache::create_lru(4);
        let args = cache.attach_to_channel_args(ChannelArgs::new().with_string("target", "x"));

        let recovered = SessionCache::from_channel_args(&args).unwrap();
        assert_eq!(recovered, cache);
        assert_eq!(recovered.capacity(), 4);
        assert_ne!(SessionCache::create_lru(4), cache);

        assert!(SessionCache::from_channel_args(&ChannelArgs::new()).is_none());
        let wrong_type =
            ChannelArgs::new().with_pointer(SESSION_CACHE_ARG, PointerArg::new(Arc::new(1u8)));
        assert!(SessionCache::from_channel_args(&wrong_type).is_none());
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        assert_eq!(SessionCache::create_lru(0).capacity(), 1);
        assert_eq!(SessionCache::create_lru(1).capacity(), 1);
        assert!(SessionCache::create_lru(3).is_empty());
    }

    #[test]
    fn test_least_recently_used_server_is_evicted() {
        let store = LruSessionStore::new(2);
        let a = ServerName::try_from("a.example.com").unwrap();
        let b = ServerName::try_from("b.example.com").unwrap();
        let c = ServerName::try_from("c.example.com").unwrap();

        store.set_kx_hint(a.clone(), NamedGroup::X25519);
        store.set_kx_hint(b.clone(), NamedGroup::secp256r1);
        // Reading `a` makes `b` the eviction candidate.
        assert_eq!(store.kx_hint(&a), Some(NamedGroup::X25519));
        store.set_kx_hint(c.clone(), NamedGroup::secp384r1);

        assert_eq!(store.len(), 2);
        assert_eq!(store.kx_hint(&a), Some(NamedGroup::X25519));
        assert_eq!(store.kx_hint(&b), None);
        assert_eq!(store.kx_hint(&c), Some(NamedGroup::secp384r1));
    }

    #[test]
    fn test_single_server_capacity_keeps_its_entry() {
        let store = LruSessionStore::new(1);
        let a = ServerName::try_from("a.example.com").unwrap();
        store.set_kx_hint(a.clone(), NamedGroup::X25519);
        store.set_kx_hint(a.clone(), NamedGroup::secp256r1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.kx_hint(&a), Some(NamedGroup::secp256r1));
    }

    #[test]
    fn test_configurations_sharing_a_cache_compare_equal() {
        let cache = SessionCache::create_lru(8);
        let a = cache.attach_to_channel_args(ChannelArgs::new());
        let b = cache.attach_to_channel_args(ChannelArgs::new());
        let c = SessionCache::create_lru(8).attach_to_channel_args(ChannelArgs::new());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
