//! The spec-tree walker.
//!
//! `resolve_tree` walks a spec depth-first in insertion order, applying
//! each binding's resolution protocol and mirroring the shape into a
//! result tree. The walk itself is synchronous and single-pass: leaves
//! either fill immediately (environment or default) or start unset with a
//! registry watch in flight. Re-resolution after the walk happens only
//! through watch callbacks, never by walking again.
//!
//! Required names are registered before any resolution branch runs, so a
//! watch event can never arrive for a leaf the required-set does not yet
//! know about.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bus::ChangeBus;
use crate::endpoint::{Endpoint, EndpointCell};
use crate::errors::SpecError;
use crate::gate::RequiredSet;
use crate::registry::Registry;
use crate::spec::{ScalarBinding, ServiceBinding, SpecNode, SpecTree};
use crate::tree::{ResultNode, ResultTree, ServiceNode, ValueCell};
use crate::value::{Value, leading_int, redacted};
use crate::watch::{ScalarWatch, ServiceWatch, WatchSet, spawn_scalar_watch, spawn_service_watch};

/// Immutable context threaded through the recursive walk.
///
/// `registry` is present only when one was configured *and* its probe
/// succeeded; a failed probe degrades the whole build to env/default
/// resolution.
pub(crate) struct ResolveCtx<'a> {
    pub(crate) env: &'a HashMap<String, String>,
    pub(crate) env_prefix: Option<&'a str>,
    pub(crate) registry: Option<&'a Arc<dyn Registry>>,
    pub(crate) registry_prefix: Option<&'a str>,
    pub(crate) bus: &'a ChangeBus,
    pub(crate) required: &'a RequiredSet,
}

/// Walk one spec tree level, producing its result mirror and collecting
/// spawned watches.
pub(crate) fn resolve_tree(
    spec: &SpecTree,
    ctx: &ResolveCtx<'_>,
    path: &[String],
    watches: &mut WatchSet,
) -> Result<ResultTree, SpecError> {
    let mut tree = ResultTree::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for (key, node) in spec.entries() {
        if !seen.insert(key.as_str()) {
            return Err(SpecError::DuplicateKey {
                path: path.join("."),
                key: key.clone(),
            });
        }

        let resolved = match node {
            SpecNode::Scalar(binding) => {
                ResultNode::Leaf(apply_scalar(binding, ctx, path, key, watches)?)
            }
            SpecNode::Service(binding) => {
                ResultNode::Service(apply_service(binding, ctx, path, key, watches)?)
            }
            SpecNode::Literal(value) => ResultNode::Literal(value.clone()),
            SpecNode::Tree(subtree) => {
                let child = child_path(path, key);
                ResultNode::Tree(resolve_tree(subtree, ctx, &child, watches)?)
            }
        };
        tree.insert(key.clone(), resolved);
    }

    Ok(tree)
}

/// Scalar resolution protocol: environment, then registry watch, then
/// default. First match wins.
fn apply_scalar(
    binding: &ScalarBinding,
    ctx: &ResolveCtx<'_>,
    path: &[String],
    key: &str,
    watches: &mut WatchSet,
) -> Result<ValueCell, SpecError> {
    let name = fully_qualified(path, key);
    if matches!(binding.default, Some(Value::Endpoint(_))) {
        return Err(SpecError::InvalidDefault { path: name });
    }

    // Required status is registered up front so even an asynchronous
    // registry resolution is tracked before its watch can fire.
    if !binding.optional {
        ctx.required.register(&name);
    }

    let cell = ValueCell::default();
    let reader = binding.effective_reader();

    let var = env_var_name(ctx.env_prefix, path, &[key]);
    if let Some(raw) = ctx.env.get(&var) {
        if let Some(value) = reader.apply(raw) {
            info!(
                event = "confactor.resolve.env_applied",
                name = name.as_str(),
                var = var.as_str(),
                value = %redacted(&value, binding.sensitive),
            );
            let previous = cell.set(Some(value.clone()));
            ctx.bus.emit(&name, Some(value), previous);
            return Ok(cell);
        }
        warn!(
            event = "confactor.resolve.env_unreadable",
            name = name.as_str(),
            var = var.as_str(),
            "Environment value did not coerce, treated as absent"
        );
    }

    if let (Some(registry), Some(prefix)) = (ctx.registry, ctx.registry_prefix) {
        let registry_key = key_path(prefix, path, key);
        debug!(
            event = "confactor.resolve.key_watch_opened",
            name = name.as_str(),
            key = registry_key.as_str(),
        );
        watches.push(spawn_scalar_watch(
            Arc::clone(registry),
            ScalarWatch {
                name,
                key: registry_key,
                cell: cell.clone(),
                reader,
                default: binding.default.clone(),
                sensitive: binding.sensitive,
            },
            ctx.bus.clone(),
        ));
        return Ok(cell);
    }

    match &binding.default {
        Some(default) => {
            info!(
                event = "confactor.resolve.default_applied",
                name = name.as_str(),
                value = %redacted(default, binding.sensitive),
            );
            let previous = cell.set(Some(default.clone()));
            ctx.bus.emit(&name, Some(default.clone()), previous);
        }
        None => {
            debug!(
                event = "confactor.resolve.leaf_unresolved",
                name = name.as_str(),
                "No env var, registry, or default; leaf stays unset"
            );
        }
    }

    Ok(cell)
}

/// Service resolution protocol: the `<KEY>_ADDRESS`/`<KEY>_PORT` env pair
/// wins unconditionally; otherwise a catalog watch when the registry is
/// reachable; otherwise the default endpoint. Extensions resolve as a
/// nested tree rooted at this service's own path afterwards.
fn apply_service(
    binding: &ServiceBinding,
    ctx: &ResolveCtx<'_>,
    path: &[String],
    key: &str,
    watches: &mut WatchSet,
) -> Result<ServiceNode, SpecError> {
    let name = fully_qualified(path, key);
    if !binding.optional {
        ctx.required.register(&name);
    }

    let cell = EndpointCell::unset();

    let addr_var = env_var_name(ctx.env_prefix, path, &[key, "ADDRESS"]);
    let port_var = env_var_name(ctx.env_prefix, path, &[key, "PORT"]);

    let mut resolved = false;
    if let (Some(address), Some(port_raw)) = (ctx.env.get(&addr_var), ctx.env.get(&port_var)) {
        match parse_port(port_raw) {
            Some(port) => {
                let endpoint = Endpoint::new(address.clone(), port);
                info!(
                    event = "confactor.resolve.service_env_applied",
                    name = name.as_str(),
                    endpoint = %endpoint,
                );
                let previous = cell.set(Some(endpoint.clone()));
                ctx.bus.emit(
                    &name,
                    Some(Value::Endpoint(endpoint)),
                    previous.map(Value::Endpoint),
                );
                resolved = true;
            }
            None => {
                warn!(
                    event = "confactor.resolve.service_port_invalid",
                    name = name.as_str(),
                    var = port_var.as_str(),
                    raw = port_raw.as_str(),
                    "Port env var did not parse, falling through"
                );
            }
        }
    }

    if !resolved {
        if let Some(registry) = ctx.registry {
            debug!(
                event = "confactor.resolve.service_watch_opened",
                name = name.as_str(),
                service = binding.service.as_str(),
            );
            watches.push(spawn_service_watch(
                Arc::clone(registry),
                ServiceWatch {
                    name: name.clone(),
                    service: binding.service.clone(),
                    cell: cell.clone(),
                    default: binding.default.clone(),
                },
                ctx.bus.clone(),
            ));
        } else if let Some(default) = &binding.default {
            info!(
                event = "confactor.resolve.service_default_applied",
                name = name.as_str(),
                endpoint = %default,
            );
            let previous = cell.set(Some(default.clone()));
            ctx.bus.emit(
                &name,
                Some(Value::Endpoint(default.clone())),
                previous.map(Value::Endpoint),
            );
        } else {
            // Accepted caller configuration error: the slot stays unset
            // for the lifetime of the build.
            debug!(
                event = "confactor.resolve.service_unresolved",
                name = name.as_str(),
                service = binding.service.as_str(),
            );
        }
    }

    let extensions = match &binding.extensions {
        Some(subtree) => {
            let child = child_path(path, key);
            resolve_tree(subtree, ctx, &child, watches)?
        }
        None => ResultTree::default(),
    };

    Ok(ServiceNode { cell, extensions })
}

/// Dot-joined fully-qualified leaf name.
fn fully_qualified(path: &[String], key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path.join("."), key)
    }
}

fn child_path(path: &[String], key: &str) -> Vec<String> {
    let mut child = path.to_vec();
    child.push(key.to_string());
    child
}

/// Environment variable name: optional prefix, then path segments, then
/// trailing segments, underscore-joined and upper-cased.
fn env_var_name(prefix: Option<&str>, path: &[String], trailing: &[&str]) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(prefix) = prefix {
        parts.push(prefix);
    }
    parts.extend(path.iter().map(String::as_str));
    parts.extend(trailing);
    parts.join("_").to_uppercase()
}

/// Registry key path: prefix, then path segments, then key, slash-joined.
fn key_path(prefix: &str, path: &[String], key: &str) -> String {
    let mut parts: Vec<&str> = vec![prefix];
    parts.extend(path.iter().map(String::as_str));
    parts.push(key);
    parts.join("/")
}

fn parse_port(raw: &str) -> Option<u16> {
    leading_int(raw).and_then(|n| u16::try_from(n).ok())
}
