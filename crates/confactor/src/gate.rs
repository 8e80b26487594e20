//! Required-leaf tracking and the completion gate.
//!
//! Every non-optional leaf is registered here during the initial walk,
//! before any watch for it can fire. The first assignment to a leaf
//! (from any source) flips its still-missing flag; the gate is a
//! `tokio::sync::watch` counter of missing leaves that readiness waits
//! on, decoupled from change-bus observers.
//!
//! A required leaf that never receives a value (no env var, no reachable
//! registry, no default) keeps the gate pending forever. That liveness
//! risk is deliberate; callers wanting bounded startup wrap readiness in
//! `tokio::time::timeout`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

/// Map of fully-qualified name to still-missing flag, plus a watchable
/// missing-counter.
#[derive(Clone)]
pub(crate) struct RequiredSet {
    names: Arc<Mutex<HashMap<String, bool>>>,
    missing_tx: Arc<watch::Sender<usize>>,
}

impl RequiredSet {
    pub(crate) fn new() -> Self {
        let (missing_tx, _) = watch::channel(0);
        Self {
            names: Arc::new(Mutex::new(HashMap::new())),
            missing_tx: Arc::new(missing_tx),
        }
    }

    /// Register a required leaf as still missing. Idempotent: a name
    /// already satisfied stays satisfied.
    pub(crate) fn register(&self, name: &str) {
        let mut names = self.lock();
        names.entry(name.to_string()).or_insert(true);
        self.publish(&names);
    }

    /// Flip a leaf to satisfied if it was registered. Names never
    /// registered (optional leaves) are ignored.
    pub(crate) fn mark_satisfied(&self, name: &str) {
        let mut names = self.lock();
        if let Some(missing) = names.get_mut(name)
            && *missing
        {
            *missing = false;
            self.publish(&names);
        }
    }

    /// Number of required leaves still missing a value.
    pub(crate) fn missing(&self) -> usize {
        count_missing(&self.lock())
    }

    /// Names of required leaves still missing a value, for diagnostics.
    pub(crate) fn missing_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, missing)| **missing)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Resolves the first time no required leaf is missing. Resolves
    /// immediately when nothing is (or nothing was ever) required.
    pub(crate) async fn ready(&self) {
        let mut rx = self.missing_tx.subscribe();
        // The sender lives as long as this set, so this cannot error
        // while a caller holds the set.
        let _ = rx.wait_for(|&missing| missing == 0).await;
    }

    fn publish(&self, names: &HashMap<String, bool>) {
        self.missing_tx.send_replace(count_missing(names));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, bool>> {
        self.names.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn count_missing(names: &HashMap<String, bool>) -> usize {
    names.values().filter(|missing| **missing).count()
}
