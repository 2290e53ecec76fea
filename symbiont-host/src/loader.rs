//! Module loading and isolation policy.
//!
//! Each plugin owns a private namespace of named types and resources; the
//! host exposes a shared namespace visible to every plugin. The isolation
//! policy decides, per name, which namespace resolves first:
//!
//! - *plugin-first* type-name prefixes resolve from the plugin even when
//!   the host also defines the name (intentional shadowing of a host-wide
//!   utility),
//! - *plugin-only* resource patterns never fall through to the host
//!   (prevents collisions such as duplicate configuration files),
//! - everything else resolves host-first, plugin-second.

use crate::config::{Environment, PROP_PLUGIN_FIRST_CLASSES, PROP_PLUGIN_ONLY_RESOURCES};
use crate::persistence::EntityDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Resolution order decided by the isolation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOrder {
    HostFirst,
    PluginFirst,
    PluginOnly,
}

/// Per-plugin visibility rules, bound from the plugin environment.
#[derive(Debug, Clone, Default)]
pub struct IsolationPolicy {
    plugin_first_classes: Vec<String>,
    plugin_only_resources: Vec<String>,
}

impl IsolationPolicy {
    pub fn new(plugin_first_classes: Vec<String>, plugin_only_resources: Vec<String>) -> Self {
        Self {
            plugin_first_classes,
            plugin_only_resources,
        }
    }

    /// Binds the policy from the indexed reserved properties.
    pub fn from_environment(env: &Environment) -> Self {
        let policy = Self::new(
            env.indexed_values(PROP_PLUGIN_FIRST_CLASSES),
            env.indexed_values(PROP_PLUGIN_ONLY_RESOURCES),
        );
        debug!(
            plugin_first = policy.plugin_first_classes.len(),
            plugin_only = policy.plugin_only_resources.len(),
            "isolation policy bound"
        );
        policy
    }

    pub fn plugin_first_classes(&self) -> &[String] {
        &self.plugin_first_classes
    }

    pub fn plugin_only_resources(&self) -> &[String] {
        &self.plugin_only_resources
    }

    /// Resolution order for a type name. Plugin-first entries match
    /// exactly or as a dotted prefix.
    pub fn class_order(&self, type_name: &str) -> ResolutionOrder {
        let shadowed = self.plugin_first_classes.iter().any(|prefix| {
            type_name == prefix
                || type_name
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        });
        if shadowed {
            ResolutionOrder::PluginFirst
        } else {
            ResolutionOrder::HostFirst
        }
    }

    /// Resolution order for a resource name. Plugin-only entries are `*`
    /// wildcard patterns.
    pub fn resource_order(&self, resource: &str) -> ResolutionOrder {
        if self
            .plugin_only_resources
            .iter()
            .any(|pattern| wildcard_match(pattern, resource))
        {
            ResolutionOrder::PluginOnly
        } else {
            ResolutionOrder::HostFirst
        }
    }
}

/// Minimal `*` glob: `*` matches any run of characters, everything else
/// is literal. Iterative scan; backtracking re-enters only the most
/// recent star, so star-heavy patterns cannot blow up.
fn wildcard_match(pattern: &str, candidate: &str) -> bool {
    let p = pattern.as_bytes();
    let c = candidate.as_bytes();
    let (mut pi, mut ci) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ci < c.len() {
        if pi < p.len() && p[pi] == b'*' {
            star = Some((pi, ci));
            pi += 1;
        } else if pi < p.len() && p[pi] == c[ci] {
            pi += 1;
            ci += 1;
        } else if let Some((star_pi, star_ci)) = star {
            // widen the last star by one character and retry
            pi = star_pi + 1;
            ci = star_ci + 1;
            star = Some((star_pi, star_ci + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == b'*' {
        pi += 1;
    }
    pi == p.len()
}

/// A named type a module can resolve. Entity descriptors piggyback here
/// so persistence scanning can run under the plugin's own loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Fully qualified dotted name, e.g. `demo.shelf.model.Book`.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityDescriptor>,
}

impl TypeDescriptor {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity: None,
        }
    }

    pub fn entity(descriptor: EntityDescriptor) -> Self {
        Self {
            name: descriptor.type_name.clone(),
            entity: Some(descriptor),
        }
    }
}

/// One namespace of types and raw resources (the plugin's own, or the
/// host's shared one).
#[derive(Debug, Clone, Default)]
pub struct ResourceSpace {
    types: BTreeMap<String, TypeDescriptor>,
    resources: BTreeMap<String, Vec<u8>>,
}

impl ResourceSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_type(&mut self, descriptor: TypeDescriptor) {
        self.types.insert(descriptor.name.clone(), descriptor);
    }

    pub fn with_type(mut self, descriptor: TypeDescriptor) -> Self {
        self.add_type(descriptor);
        self
    }

    pub fn add_resource(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.resources.insert(name.into(), bytes);
    }

    pub fn with_resource(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.add_resource(name, bytes);
        self
    }

    pub fn type_descriptor(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }

    pub fn resource(&self, name: &str) -> Option<&[u8]> {
        self.resources.get(name).map(Vec::as_slice)
    }

    /// Types under a dotted package prefix, in name order.
    pub fn types_in_package(&self, package: &str) -> Vec<&TypeDescriptor> {
        self.types
            .values()
            .filter(|t| {
                t.name
                    .strip_prefix(package)
                    .is_some_and(|rest| rest.starts_with('.'))
            })
            .collect()
    }
}

/// Per-plugin loader combining the plugin namespace, the host's shared
/// namespace, and the isolation policy that orders them.
pub struct ModuleLoader {
    plugin_id: String,
    own: ResourceSpace,
    shared: Arc<ResourceSpace>,
    policy: IsolationPolicy,
}

impl ModuleLoader {
    pub fn new(
        plugin_id: impl Into<String>,
        own: ResourceSpace,
        shared: Arc<ResourceSpace>,
        policy: IsolationPolicy,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            own,
            shared,
            policy,
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn policy(&self) -> &IsolationPolicy {
        &self.policy
    }

    pub fn resolve_type(&self, name: &str) -> Option<&TypeDescriptor> {
        match self.policy.class_order(name) {
            ResolutionOrder::PluginFirst | ResolutionOrder::PluginOnly => self
                .own
                .type_descriptor(name)
                .or_else(|| self.shared.type_descriptor(name)),
            ResolutionOrder::HostFirst => self
                .shared
                .type_descriptor(name)
                .or_else(|| self.own.type_descriptor(name)),
        }
    }

    pub fn resolve_resource(&self, name: &str) -> Option<&[u8]> {
        match self.policy.resource_order(name) {
            ResolutionOrder::PluginOnly => self.own.resource(name),
            ResolutionOrder::PluginFirst => {
                self.own.resource(name).or_else(|| self.shared.resource(name))
            }
            ResolutionOrder::HostFirst => self
                .shared
                .resource(name)
                .or_else(|| self.own.resource(name)),
        }
    }

    /// Types the plugin itself ships under a package. Persistence
    /// scanning uses this: the host namespace cannot see plugin types.
    pub fn own_types_in_package(&self, package: &str) -> Vec<&TypeDescriptor> {
        self.own.types_in_package(package)
    }
}
