//! In-memory registry for tests and local development.
//!
//! Holds keys and service instance lists in process memory and pushes a
//! change event to every open watch on each mutation. New watches are
//! seeded with the current state, mirroring how a blocking-query registry
//! answers the first poll immediately.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::RegistryError;

use super::{EventStatus, KeyEvent, Registry, ServiceEvent, ServiceInstance};

#[derive(Default)]
struct Inner {
    reachable: bool,
    keys: HashMap<String, String>,
    services: HashMap<String, Vec<ServiceInstance>>,
    key_watchers: HashMap<String, Vec<mpsc::UnboundedSender<KeyEvent>>>,
    service_watchers: HashMap<String, Vec<mpsc::UnboundedSender<ServiceEvent>>>,
}

/// In-process [`Registry`] implementation.
///
/// Clones share the same state, so a test can keep a handle for mutations
/// after handing the registry to a build.
#[derive(Clone)]
pub struct MemoryRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRegistry {
    /// A reachable, empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                reachable: true,
                ..Inner::default()
            })),
        }
    }

    /// A registry whose probe always fails, for exercising the
    /// degraded default-only mode.
    pub fn unreachable() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Set a key's value and notify its watchers.
    pub fn set_key(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        let mut inner = self.lock();
        inner.keys.insert(key.clone(), value.clone());
        notify_key(
            &mut inner,
            &key,
            KeyEvent {
                value: Some(value),
                status: EventStatus::Success,
            },
        );
    }

    /// Remove a key and deliver a failure event to its watchers, the way
    /// a deleted key turns a blocking query into a not-found response.
    pub fn remove_key(&self, key: &str) {
        let mut inner = self.lock();
        inner.keys.remove(key);
        notify_key(
            &mut inner,
            key,
            KeyEvent {
                value: None,
                status: EventStatus::Failure,
            },
        );
    }

    /// Deliver a failure event for a key without touching stored state,
    /// simulating a transient lookup error.
    pub fn fail_key(&self, key: &str) {
        let mut inner = self.lock();
        notify_key(
            &mut inner,
            key,
            KeyEvent {
                value: None,
                status: EventStatus::Failure,
            },
        );
    }

    /// Register one service instance and notify watchers with the full
    /// updated list.
    pub fn register_service(&self, service: impl Into<String>, instance: ServiceInstance) {
        let service = service.into();
        let mut inner = self.lock();
        inner
            .services
            .entry(service.clone())
            .or_default()
            .push(instance);
        let instances = inner.services[&service].clone();
        notify_service(
            &mut inner,
            &service,
            ServiceEvent {
                instances,
                status: EventStatus::Success,
            },
        );
    }

    /// Replace a service's instance list wholesale and notify watchers.
    /// An empty list is delivered as a successful event with no instances.
    pub fn set_service_instances(
        &self,
        service: impl Into<String>,
        instances: Vec<ServiceInstance>,
    ) {
        let service = service.into();
        let mut inner = self.lock();
        inner.services.insert(service.clone(), instances.clone());
        notify_service(
            &mut inner,
            &service,
            ServiceEvent {
                instances,
                status: EventStatus::Success,
            },
        );
    }

    /// Deliver a failure event for a service without touching stored
    /// state, simulating a transient catalog error.
    pub fn fail_service(&self, service: &str) {
        let mut inner = self.lock();
        notify_service(
            &mut inner,
            service,
            ServiceEvent {
                instances: Vec::new(),
                status: EventStatus::Failure,
            },
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn notify_key(inner: &mut Inner, key: &str, event: KeyEvent) {
    if let Some(watchers) = inner.key_watchers.get_mut(key) {
        watchers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn notify_service(inner: &mut Inner, service: &str, event: ServiceEvent) {
    if let Some(watchers) = inner.service_watchers.get_mut(service) {
        watchers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn probe(&self) -> Result<(), RegistryError> {
        if self.lock().reachable {
            Ok(())
        } else {
            Err(RegistryError::Unreachable {
                message: "memory registry marked unreachable".to_string(),
            })
        }
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>, RegistryError> {
        let inner = self.lock();
        if !inner.reachable {
            return Err(RegistryError::Unreachable {
                message: "memory registry marked unreachable".to_string(),
            });
        }
        Ok(inner.keys.get(key).cloned())
    }

    async fn get_service_instances(
        &self,
        service: &str,
    ) -> Result<Vec<ServiceInstance>, RegistryError> {
        let inner = self.lock();
        if !inner.reachable {
            return Err(RegistryError::Unreachable {
                message: "memory registry marked unreachable".to_string(),
            });
        }
        Ok(inner.services.get(service).cloned().unwrap_or_default())
    }

    fn watch_key(&self, key: &str) -> mpsc::UnboundedReceiver<KeyEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();

        // Seed with current state: a present key is a successful event,
        // an absent key a not-found failure.
        let seed = match inner.keys.get(key) {
            Some(value) => KeyEvent {
                value: Some(value.clone()),
                status: EventStatus::Success,
            },
            None => KeyEvent {
                value: None,
                status: EventStatus::Failure,
            },
        };
        let _ = tx.send(seed);

        inner
            .key_watchers
            .entry(key.to_string())
            .or_default()
            .push(tx);

        debug!(event = "confactor.registry.key_watch_opened", key = key);
        rx
    }

    fn watch_service(&self, service: &str) -> mpsc::UnboundedReceiver<ServiceEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();

        // An unknown service is a successful event with an empty list,
        // matching catalog semantics.
        let seed = ServiceEvent {
            instances: inner.services.get(service).cloned().unwrap_or_default(),
            status: EventStatus::Success,
        };
        let _ = tx.send(seed);

        inner
            .service_watchers
            .entry(service.to_string())
            .or_default()
            .push(tx);

        debug!(
            event = "confactor.registry.service_watch_opened",
            service = service,
        );
        rx
    }
}
