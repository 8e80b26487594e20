//! In-process change notification.
//!
//! Every leaf assignment, whether synchronous during the initial walk or
//! from a watch callback later, funnels through [`ChangeBus::emit`], which marks
//! the leaf satisfied in the required-set and then fans the event out to
//! any subscribed observers. The completion gate never reads the bus; it
//! waits on the required-set directly, so a full broadcast buffer can
//! never stall readiness.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::gate::RequiredSet;
use crate::value::Value;

/// One resolution or re-resolution of a leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Fully-qualified dotted name of the leaf.
    pub name: String,
    /// The newly assigned value.
    pub value: Option<Value>,
    /// The value the leaf held before this assignment.
    pub previous: Option<Value>,
}

/// Broadcast fan-out of [`ChangeEvent`]s.
#[derive(Clone)]
pub(crate) struct ChangeBus {
    tx: broadcast::Sender<ChangeEvent>,
    required: RequiredSet,
}

impl ChangeBus {
    pub(crate) fn new(capacity: usize, required: RequiredSet) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, required }
    }

    /// Subscribe to future change events. Events emitted before the
    /// subscription are not replayed.
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Record an assignment: satisfy the required-set entry first, then
    /// broadcast. Send failure just means nobody is observing.
    pub(crate) fn emit(&self, name: &str, value: Option<Value>, previous: Option<Value>) {
        self.required.mark_satisfied(name);

        let event = ChangeEvent {
            name: name.to_string(),
            value,
            previous,
        };
        if self.tx.send(event).is_err() {
            debug!(
                event = "confactor.bus.no_observers",
                name = name,
                "No observers subscribed, change event dropped"
            );
        }
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
