//! Build invocation surface.
//!
//! [`build`] probes the registry once, walks the spec tree, and returns a
//! [`Config`] handle over the live result tree. The walk is synchronous;
//! registry-resolved leaves fill in asynchronously as their watches fire.
//! [`Config::ready`] is the completion gate: it resolves the first time
//! every required leaf has received a value from any source.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use confactor::builder::{BuildOptions, build};
//! use confactor::registry::MemoryRegistry;
//! use confactor::spec::{SpecTree, value};
//!
//! # async fn example() -> Result<(), confactor::errors::SpecError> {
//! let spec = SpecTree::new().with("greeting", value().default("hello"));
//! let options = BuildOptions::new()
//!     .env_prefix("myapp")
//!     .registry(Arc::new(MemoryRegistry::new()), "myapp");
//! let config = build(&spec, options).await?;
//! config.ready().await;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::bus::{ChangeBus, ChangeEvent};
use crate::endpoint::EndpointCell;
use crate::errors::SpecError;
use crate::gate::RequiredSet;
use crate::registry::Registry;
use crate::resolver::{ResolveCtx, resolve_tree};
use crate::spec::SpecTree;
use crate::tree::ResultTree;
use crate::value::Value;
use crate::watch::WatchSet;

const DEFAULT_BUS_CAPACITY: usize = 256;

/// Options recognized by [`build`].
#[derive(Default)]
pub struct BuildOptions {
    env_prefix: Option<String>,
    registry: Option<Arc<dyn Registry>>,
    registry_prefix: Option<String>,
    env_override: Option<HashMap<String, String>>,
    bus_capacity: Option<usize>,
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix prepended to every derived environment variable name.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Registry collaborator and the key prefix under which scalar leaves
    /// are looked up. Service watches only need the collaborator; scalar
    /// key watches need the prefix too.
    pub fn registry(mut self, registry: Arc<dyn Registry>, prefix: impl Into<String>) -> Self {
        self.registry = Some(registry);
        self.registry_prefix = Some(prefix.into());
        self
    }

    /// Registry collaborator without a key prefix: service bindings
    /// resolve through it, scalar bindings skip straight to defaults.
    pub fn registry_without_prefix(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Environment snapshot to resolve against instead of the process
    /// environment.
    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env_override = Some(env);
        self
    }

    /// Change bus buffer size per observer. Slow observers that fall more
    /// than this many events behind see a lagged error, not a stall.
    pub fn bus_capacity(mut self, capacity: usize) -> Self {
        self.bus_capacity = Some(capacity);
        self
    }
}

/// A built configuration: the live result tree plus the handles that keep
/// it current.
pub struct Config {
    tree: ResultTree,
    bus: ChangeBus,
    required: RequiredSet,
    watches: Mutex<WatchSet>,
}

impl Config {
    /// The resolved result tree.
    pub fn tree(&self) -> &ResultTree {
        &self.tree
    }

    /// Snapshot of the value at a dotted path.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.tree.get(path)
    }

    /// The live endpoint cell at a dotted path, if it names a service.
    pub fn endpoint(&self, path: &str) -> Option<EndpointCell> {
        self.tree.endpoint(path)
    }

    /// Completion gate: resolves the first time every required leaf has
    /// received a value, immediately when nothing is required. Never
    /// rejects; a required leaf that no source can satisfy keeps this
    /// pending forever, so callers wanting bounded startup should wrap it
    /// in `tokio::time::timeout`.
    pub async fn ready(&self) {
        self.required.ready().await;
    }

    /// Names of required leaves still awaiting a first value.
    pub fn missing(&self) -> Vec<String> {
        self.required.missing_names()
    }

    /// Subscribe to change events for every future re-resolution.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.bus.subscribe()
    }

    /// Number of currently subscribed change observers.
    pub fn observer_count(&self) -> usize {
        self.bus.observer_count()
    }

    /// Number of open registry watches.
    pub fn watch_count(&self) -> usize {
        self.watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Release every registry watch belonging to this build. The result
    /// tree stays readable; it just stops updating. Idempotent.
    pub fn close(&self) {
        let mut watches = self.watches.lock().unwrap_or_else(PoisonError::into_inner);
        let count = watches.len();
        watches.close();
        info!(event = "confactor.build.closed", watches = count);
    }
}

/// Resolve a spec tree into a live [`Config`].
///
/// The registry is probed once; on failure every leaf that would have
/// used it falls back to its default instead, and the build still
/// succeeds. The only error path is a malformed spec, which is a
/// programmer error and surfaces synchronously.
pub async fn build(spec: &SpecTree, options: BuildOptions) -> Result<Config, SpecError> {
    let env = options
        .env_override
        .unwrap_or_else(|| std::env::vars().collect());

    let required = RequiredSet::new();
    let bus = ChangeBus::new(
        options.bus_capacity.unwrap_or(DEFAULT_BUS_CAPACITY),
        required.clone(),
    );

    let registry = match &options.registry {
        Some(registry) => match registry.probe().await {
            Ok(()) => {
                info!(event = "confactor.build.registry_probed");
                Some(Arc::clone(registry))
            }
            Err(e) => {
                warn!(
                    event = "confactor.build.registry_unreachable",
                    error = %e,
                    "Registry probe failed, resolving from environment and defaults only"
                );
                None
            }
        },
        None => None,
    };

    let ctx = ResolveCtx {
        env: &env,
        env_prefix: options.env_prefix.as_deref(),
        registry: registry.as_ref(),
        registry_prefix: options.registry_prefix.as_deref(),
        bus: &bus,
        required: &required,
    };

    let mut watches = WatchSet::new();
    let tree = resolve_tree(spec, &ctx, &[], &mut watches)?;

    info!(
        event = "confactor.build.walk_completed",
        leaves_missing = required.missing(),
        watches = watches.len(),
    );

    Ok(Config {
        tree,
        bus,
        required,
        watches: Mutex::new(watches),
    })
}
