//! Network endpoint values.
//!
//! [`Endpoint`] is plain immutable data (host + port with formatting
//! helpers). [`EndpointCell`] is the long-lived slot a service binding
//! occupies in the result tree: watch callbacks write through it, so any
//! holder of the cell observes registry updates without re-reading the
//! tree.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// An address + port pair, replaced wholesale on each update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// `"address:port"` form.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// `"address:port/<suffix>"` form.
    pub fn build_uri(&self, suffix: &str) -> String {
        format!("{}/{}", self.authority(), suffix)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.authority())
    }
}

/// Shared mutable slot for a service binding's endpoint.
///
/// Cloning the cell shares the same slot. The cell itself is the stable
/// identity: registry watch updates replace the `Endpoint` inside, never
/// the cell, so references handed to callers keep seeing fresh values.
#[derive(Debug, Clone, Default)]
pub struct EndpointCell {
    inner: Arc<RwLock<Option<Endpoint>>>,
}

impl EndpointCell {
    /// A cell with no endpoint assigned yet.
    pub fn unset() -> Self {
        Self::default()
    }

    /// Replace the endpoint, returning the previous one.
    pub(crate) fn set(&self, endpoint: Option<Endpoint>) -> Option<Endpoint> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, endpoint)
    }

    /// Snapshot of the current endpoint.
    pub fn get(&self) -> Option<Endpoint> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn address(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|e| e.address.clone())
    }

    pub fn port(&self) -> Option<u16> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|e| e.port)
    }

    /// `"address:port"`, if an endpoint is assigned.
    pub fn authority(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Endpoint::authority)
    }

    /// `"address:port/<suffix>"`, if an endpoint is assigned.
    pub fn build_uri(&self, suffix: &str) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|e| e.build_uri(suffix))
    }

    pub fn is_set(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
