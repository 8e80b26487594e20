//! Persistent registry watches.
//!
//! One watch task runs per leaf that resolves through the registry. Each
//! task consumes its subscription's event stream for as long as it stays
//! open and applies every event to the leaf's cell, emitting the change
//! on the bus. Tasks are collected into a [`WatchSet`] so a build's
//! subscriptions can be released as a group on shutdown.

use std::sync::Arc;

use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::ChangeBus;
use crate::endpoint::{Endpoint, EndpointCell};
use crate::registry::{KeyEvent, Registry, ServiceEvent};
use crate::tree::ValueCell;
use crate::value::{Reader, Value, redacted};

/// The watch tasks belonging to one built configuration.
#[derive(Default)]
pub(crate) struct WatchSet {
    handles: Vec<JoinHandle<()>>,
}

impl WatchSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }

    /// Abort every watch task. Idempotent.
    pub(crate) fn close(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

/// Everything a scalar watch task needs to apply key events.
pub(crate) struct ScalarWatch {
    pub(crate) name: String,
    pub(crate) key: String,
    pub(crate) cell: ValueCell,
    pub(crate) reader: Reader,
    pub(crate) default: Option<Value>,
    pub(crate) sensitive: bool,
}

/// Everything a service watch task needs to apply catalog events.
pub(crate) struct ServiceWatch {
    pub(crate) name: String,
    pub(crate) service: String,
    pub(crate) cell: EndpointCell,
    pub(crate) default: Option<Endpoint>,
}

/// Spawn the long-lived task consuming a key watch.
pub(crate) fn spawn_scalar_watch(
    registry: Arc<dyn Registry>,
    watch: ScalarWatch,
    bus: ChangeBus,
) -> JoinHandle<()> {
    let mut rx = registry.watch_key(&watch.key);
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            apply_key_event(&watch, &bus, event);
        }
        debug!(
            event = "confactor.watch.key_stream_closed",
            name = watch.name.as_str(),
            key = watch.key.as_str(),
        );
    })
}

/// Spawn the long-lived task consuming a service watch.
pub(crate) fn spawn_service_watch(
    registry: Arc<dyn Registry>,
    watch: ServiceWatch,
    bus: ChangeBus,
) -> JoinHandle<()> {
    let mut rx = registry.watch_service(&watch.service);
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            apply_service_event(&watch, &bus, event);
        }
        debug!(
            event = "confactor.watch.service_stream_closed",
            name = watch.name.as_str(),
            service = watch.service.as_str(),
        );
    })
}

/// Apply one key event: a successful, non-empty value is coerced and
/// assigned; anything else falls back to the default. With no default the
/// cell is left untouched and nothing is emitted.
fn apply_key_event(watch: &ScalarWatch, bus: &ChangeBus, event: KeyEvent) {
    if event.status.is_success()
        && let Some(raw) = event.value.as_deref()
        && !raw.is_empty()
    {
        match watch.reader.apply(raw) {
            Some(value) => {
                let previous = watch.cell.set(Some(value.clone()));
                info!(
                    event = "confactor.watch.key_applied",
                    name = watch.name.as_str(),
                    value = %redacted(&value, watch.sensitive),
                );
                bus.emit(&watch.name, Some(value), previous);
                return;
            }
            None => {
                warn!(
                    event = "confactor.watch.key_unreadable",
                    name = watch.name.as_str(),
                    key = watch.key.as_str(),
                    "Registry value did not coerce, falling back to default"
                );
            }
        }
    } else {
        warn!(
            event = "confactor.watch.key_lookup_failed",
            name = watch.name.as_str(),
            key = watch.key.as_str(),
        );
    }

    match &watch.default {
        Some(default) => {
            let previous = watch.cell.set(Some(default.clone()));
            info!(
                event = "confactor.watch.key_default_applied",
                name = watch.name.as_str(),
                value = %redacted(default, watch.sensitive),
            );
            bus.emit(&watch.name, Some(default.clone()), previous);
        }
        None => {
            debug!(
                event = "confactor.watch.key_left_unset",
                name = watch.name.as_str(),
                "No default declared, leaf left untouched"
            );
        }
    }
}

/// Apply one service event: a successful event with instances picks one
/// uniformly at random (spreading load across registered instances over
/// repeated events) and writes it through the existing cell; anything
/// else falls back to the default. With no default the cell is left
/// untouched and nothing is emitted.
fn apply_service_event(watch: &ServiceWatch, bus: &ChangeBus, event: ServiceEvent) {
    if event.status.is_success() && !event.instances.is_empty() {
        let index = rand::thread_rng().gen_range(0..event.instances.len());
        let instance = &event.instances[index];
        let endpoint = Endpoint::new(instance.address.clone(), instance.port);

        let previous = watch.cell.set(Some(endpoint.clone()));
        info!(
            event = "confactor.watch.service_applied",
            name = watch.name.as_str(),
            service = watch.service.as_str(),
            endpoint = %endpoint,
            instances = event.instances.len(),
        );
        bus.emit(
            &watch.name,
            Some(Value::Endpoint(endpoint)),
            previous.map(Value::Endpoint),
        );
        return;
    }

    warn!(
        event = "confactor.watch.service_lookup_failed",
        name = watch.name.as_str(),
        service = watch.service.as_str(),
        status_ok = event.status.is_success(),
        instances = event.instances.len(),
    );

    match &watch.default {
        Some(default) => {
            let previous = watch.cell.set(Some(default.clone()));
            info!(
                event = "confactor.watch.service_default_applied",
                name = watch.name.as_str(),
                endpoint = %default,
            );
            bus.emit(
                &watch.name,
                Some(Value::Endpoint(default.clone())),
                previous.map(Value::Endpoint),
            );
        }
        None => {
            debug!(
                event = "confactor.watch.service_left_unset",
                name = watch.name.as_str(),
                "No default declared, slot left untouched"
            );
        }
    }
}
