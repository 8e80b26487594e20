//! # Spec Trees
//!
//! The caller-authored description of the configuration shape: a nested
//! structure mixing resolvable leaf bindings, literal constants, and
//! further nesting.
//!
//! ## Example
//!
//! ```rust
//! use confactor::spec::{SpecTree, service, value};
//!
//! let spec = SpecTree::new()
//!     .with("environment", "production")
//!     .with("timeout_ms", value().default(5000))
//!     .with(
//!         "db",
//!         service("postgres").extend(
//!             SpecTree::new()
//!                 .with("username", value().default("root"))
//!                 .with("password", value().sensitive()),
//!         ),
//!     )
//!     .with(
//!         "features",
//!         SpecTree::new().with("dark_mode", value().default(false)),
//!     );
//! # let _ = spec;
//! ```
//!
//! A tree is authored once as a literal and never mutated afterwards, so
//! cycles are impossible by construction.

use crate::endpoint::Endpoint;
use crate::value::{Reader, Value};

/// Declare a single-value leaf binding.
///
/// Mirrors the conventional `value(opts)` construction surface: chain
/// builder methods for the default, optionality, sensitivity, and an
/// explicit reader.
pub fn value() -> ScalarBinding {
    ScalarBinding {
        default: None,
        optional: false,
        sensitive: false,
        reader: None,
    }
}

/// Declare a service leaf binding resolved from the named service's
/// registered instances (or `<KEY>_ADDRESS`/`<KEY>_PORT` env vars).
pub fn service(name: impl Into<String>) -> ServiceBinding {
    ServiceBinding {
        service: name.into(),
        default: None,
        optional: false,
        extensions: None,
    }
}

/// Descriptor of one single-value configuration slot.
#[derive(Debug, Clone)]
pub struct ScalarBinding {
    pub(crate) default: Option<Value>,
    pub(crate) optional: bool,
    pub(crate) sensitive: bool,
    pub(crate) reader: Option<Reader>,
}

impl ScalarBinding {
    /// Value assigned when neither the environment nor the registry
    /// supplies one. Also selects the inferred reader: an integer default
    /// integer-parses raw strings, a boolean default boolean-parses them.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Mark the leaf optional: the completion gate does not wait for it.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Redact the value in traces. Change bus observers still see it.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Explicit coercion, overriding the reader inferred from the default.
    pub fn reader(mut self, reader: Reader) -> Self {
        self.reader = Some(reader);
        self
    }

    /// The explicit reader if one was supplied, else the inferred one.
    pub(crate) fn effective_reader(&self) -> Reader {
        self.reader
            .clone()
            .unwrap_or_else(|| Reader::infer(self.default.as_ref()))
    }
}

/// Descriptor of one service slot (address + port pair).
#[derive(Debug, Clone)]
pub struct ServiceBinding {
    pub(crate) service: String,
    pub(crate) default: Option<Endpoint>,
    pub(crate) optional: bool,
    pub(crate) extensions: Option<SpecTree>,
}

impl ServiceBinding {
    /// Endpoint assigned when neither the environment nor the registry
    /// supplies one.
    pub fn default(mut self, endpoint: Endpoint) -> Self {
        self.default = Some(endpoint);
        self
    }

    /// Mark the service optional: the completion gate does not wait for it.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Attach a sub-tree resolved relative to this service's own path,
    /// letting a service declare sibling credentials next to its
    /// address/port (e.g. `db.username` alongside `db.address`).
    pub fn extend(mut self, extensions: SpecTree) -> Self {
        self.extensions = Some(extensions);
        self
    }
}

/// One entry in a spec tree.
#[derive(Debug, Clone)]
pub enum SpecNode {
    Scalar(ScalarBinding),
    Service(ServiceBinding),
    Literal(Value),
    Tree(SpecTree),
}

impl From<ScalarBinding> for SpecNode {
    fn from(binding: ScalarBinding) -> Self {
        SpecNode::Scalar(binding)
    }
}

impl From<ServiceBinding> for SpecNode {
    fn from(binding: ServiceBinding) -> Self {
        SpecNode::Service(binding)
    }
}

impl From<SpecTree> for SpecNode {
    fn from(tree: SpecTree) -> Self {
        SpecNode::Tree(tree)
    }
}

impl From<Value> for SpecNode {
    fn from(value: Value) -> Self {
        SpecNode::Literal(value)
    }
}

impl From<&str> for SpecNode {
    fn from(s: &str) -> Self {
        SpecNode::Literal(Value::from(s))
    }
}

impl From<String> for SpecNode {
    fn from(s: String) -> Self {
        SpecNode::Literal(Value::from(s))
    }
}

impl From<i64> for SpecNode {
    fn from(n: i64) -> Self {
        SpecNode::Literal(Value::from(n))
    }
}

impl From<i32> for SpecNode {
    fn from(n: i32) -> Self {
        SpecNode::Literal(Value::from(n))
    }
}

impl From<bool> for SpecNode {
    fn from(b: bool) -> Self {
        SpecNode::Literal(Value::from(b))
    }
}

/// Ordered mapping of keys to spec nodes.
///
/// Order is insertion order and is also the resolution walk order.
/// Duplicate keys within one tree are rejected when the tree is built
/// into a configuration.
#[derive(Debug, Clone, Default)]
pub struct SpecTree {
    entries: Vec<(String, SpecNode)>,
}

impl SpecTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, builder-style.
    pub fn with(mut self, key: impl Into<String>, node: impl Into<SpecNode>) -> Self {
        self.insert(key, node);
        self
    }

    /// Append an entry.
    pub fn insert(&mut self, key: impl Into<String>, node: impl Into<SpecNode>) {
        self.entries.push((key.into(), node.into()));
    }

    pub(crate) fn entries(&self) -> &[(String, SpecNode)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
