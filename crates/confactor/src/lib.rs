//! confactor: registry-backed declarative configuration resolution
//!
//! This library resolves a declaratively described, nested configuration
//! object whose leaves come from environment variables, a dynamic
//! registry (key-value + service catalog), or static defaults, in that
//! strict precedence order, and keeps the resolved object current as
//! registry data changes, without the consuming application restarting.
//!
//! # Main Entry Points
//!
//! - [`spec`] - Author the configuration shape (`value()`, `service()`)
//! - [`builder`] - Resolve a spec into a live [`Config`](builder::Config)
//! - [`registry`] - The registry collaborator contract and an in-memory
//!   implementation for tests
//! - [`bus`] - Change events observable by external subscribers
//! - [`tree`] - The resolved result tree and its live cells

pub mod builder;
pub mod bus;
pub mod endpoint;
pub mod errors;
pub mod logging;
pub mod registry;
pub mod spec;
pub mod tree;
pub mod value;

mod gate;
mod resolver;
mod watch;

// Re-export commonly used types at crate root for convenience
pub use builder::{BuildOptions, Config, build};
pub use bus::ChangeEvent;
pub use endpoint::{Endpoint, EndpointCell};
pub use errors::{ConfactorError, RegistryError, SpecError};
pub use registry::{EventStatus, MemoryRegistry, Registry, ServiceInstance};
pub use spec::{ScalarBinding, ServiceBinding, SpecNode, SpecTree, service, value};
pub use tree::{ResultNode, ResultTree, ValueCell};
pub use value::{Reader, Value};

// Re-export logging initialization
pub use logging::init_logging;
