//! # Registry collaborator contract
//!
//! The distributed key-value + service-catalog system supplying dynamic
//! configuration and service-discovery data is an external collaborator.
//! The core only needs the operations on the [`Registry`] trait: point
//! lookups, and open-ended watch subscriptions delivering `(data, status)`
//! events for as long as they stay open.
//!
//! Connection management, long-polling, and retries against the actual
//! transport belong to implementations of this trait, not to this crate.
//! [`memory::MemoryRegistry`] is the in-process implementation used by
//! tests and local development.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::RegistryError;

pub use memory::MemoryRegistry;

/// Outcome attached to every watch event.
///
/// `Failure` covers anything non-2xx-equivalent: lookup errors, missing
/// keys, transport hiccups. The watch stays open either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Success,
    Failure,
}

impl EventStatus {
    pub fn is_success(self) -> bool {
        matches!(self, EventStatus::Success)
    }
}

/// One registered instance of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub address: String,
    pub port: u16,
}

impl ServiceInstance {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

/// One change event on a watched key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub value: Option<String>,
    pub status: EventStatus,
}

/// One change event on a watched service's instance list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEvent {
    pub instances: Vec<ServiceInstance>,
    pub status: EventStatus,
}

/// Abstract registry client.
///
/// Watch subscriptions are persistent: implementations deliver every event
/// they produce, in order, until the receiver is dropped. There is no
/// backoff or retry policy here beyond what the implementation provides
/// natively.
#[async_trait]
pub trait Registry: Send + Sync + 'static {
    /// One-shot reachability check, performed once per build. On failure
    /// the whole build degrades to env/default resolution.
    async fn probe(&self) -> Result<(), RegistryError>;

    /// Point lookup of a key's current value.
    async fn get_value(&self, key: &str) -> Result<Option<String>, RegistryError>;

    /// Point lookup of a service's current instance list.
    async fn get_service_instances(
        &self,
        service: &str,
    ) -> Result<Vec<ServiceInstance>, RegistryError>;

    /// Open an open-ended watch on a key. The current state is delivered
    /// as the first event.
    fn watch_key(&self, key: &str) -> mpsc::UnboundedReceiver<KeyEvent>;

    /// Open an open-ended watch on a service's instance list. The current
    /// state is delivered as the first event.
    fn watch_service(&self, service: &str) -> mpsc::UnboundedReceiver<ServiceEvent>;
}
