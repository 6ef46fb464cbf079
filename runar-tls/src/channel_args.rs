//! Channel configuration values
//!
//! Channels and listeners are configured with an ordered list of keyed
//! values. Pointer values carry shared native resources (such as a session
//! cache) and compare by identity, so two channels configured with the same
//! resource compare equal without inspecting it.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Opaque shared value stored in channel configuration.
///
/// Cloning takes a new strong reference; dropping releases it.
#[derive(Clone)]
pub struct PointerArg(Arc<dyn Any + Send + Sync>);

impl PointerArg {
    pub fn new<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self(value)
    }

    /// Recover the shared value when it has type `T`
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.0.clone().downcast::<T>().ok()
    }

    /// Number of strong references to the shared value
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl fmt::Debug for PointerArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PointerArg({:p})", self.addr())
    }
}

impl PartialEq for PointerArg {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for PointerArg {}

impl PartialOrd for PointerArg {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PointerArg {
    fn cmp(&self, other: &Self) -> Ordering {
        self.addr().cmp(&other.addr())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChannelArgValue {
    String(String),
    Integer(i64),
    Pointer(PointerArg),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChannelArg {
    pub key: String,
    pub value: ChannelArgValue,
}

/// Ordered channel configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelArgs {
    args: Vec<ChannelArg>,
}

impl ChannelArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the value under `key`
    pub fn set(&mut self, key: impl Into<String>, value: ChannelArgValue) {
        let key = key.into();
        match self.args.iter_mut().find(|arg| arg.key == key) {
            Some(arg) => arg.value = value,
            None => self.args.push(ChannelArg { key, value }),
        }
    }

    pub fn with_string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, ChannelArgValue::String(value.into()));
        self
    }

    pub fn with_integer(mut self, key: impl Into<String>, value: i64) -> Self {
        self.set(key, ChannelArgValue::Integer(value));
        self
    }

    pub fn with_pointer(mut self, key: impl Into<String>, value: PointerArg) -> Self {
        self.set(key, ChannelArgValue::Pointer(value));
        self
    }

    pub fn get(&self, key: &str) -> Option<&ChannelArgValue> {
        self.args
            .iter()
            .find(|arg| arg.key == key)
            .map(|arg| &arg.value)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(ChannelArgValue::String(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_integer(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(ChannelArgValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn get_pointer(&self, key: &str) -> Option<&PointerArg> {
        match self.get(key) {
            Some(ChannelArgValue::Pointer(value)) => Some(value),
            _ => None,
        }
    }

    /// Remove the value under `key`, returning it
    pub fn remove(&mut self, key: &str) -> Option<ChannelArgValue> {
        let index = self.args.iter().position(|arg| arg.key == key)?;
        Some(self.args.remove(index).value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelArg> {
        self.args.iter()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}
