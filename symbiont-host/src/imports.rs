//! Cross-context component imports.
//!
//! Resolution order is fixed: the host root registry first, then the
//! plugin's declared dependencies in declared order, skipping any
//! dependency that is not started. A match is copied as a flattened definition,
//! its live instance registered under the same name with a
//! lifecycle-inert proxy, and the name recorded in the imported set.
//! Unresolved requests are reported, never thrown: the caller decides
//! whether a missing dependency is fatal.

use crate::bootstrap::RunningContext;
use std::any::TypeId;
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use symbiont_registry::{
    ComponentHandle, ComponentRegistry, LifecycleProxyFactory, ProxyDecision,
};
use tracing::{debug, error, warn};

/// A by-capability import request, carried as a runtime type id so the
/// resolver does not need the capability type statically.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityRequest {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl CapabilityRequest {
    pub fn of<C: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<C>(),
            type_name: std::any::type_name::<C>(),
        }
    }
}

/// Lookup of already-started dependency contexts, keyed by plugin id.
/// Implemented by the plugin host; contexts of plugins that are not
/// started must not be returned.
pub trait DependencyContexts: Sync {
    fn started_context(&self, plugin_id: &str) -> Option<Arc<RunningContext>>;
}

/// Provider for contexts without dependencies (tests, standalone use).
pub struct NoDependencies;

impl DependencyContexts for NoDependencies {
    fn started_context(&self, _plugin_id: &str) -> Option<Arc<RunningContext>> {
        None
    }
}

pub(crate) struct ImportResolver<'a> {
    pub plugin_id: &'a str,
    pub root: &'a RwLock<ComponentRegistry>,
    pub dependencies: &'a [String],
    pub contexts: &'a dyn DependencyContexts,
}

impl ImportResolver<'_> {
    /// Imports one component by name. Returns whether the component is
    /// available in the destination afterwards.
    pub fn import_by_name(
        &self,
        dest: &mut ComponentRegistry,
        imported: &mut BTreeSet<String>,
        name: &str,
    ) -> bool {
        if dest.contains(name) {
            debug!(plugin_id = %self.plugin_id, component = %name, "already present, import skipped");
            return true;
        }

        {
            let root = self.root.read().expect("host root registry lock poisoned");
            if copy_component(&root, dest, imported, name) {
                return true;
            }
        }

        for dependency in self.dependencies {
            let Some(context) = self.contexts.started_context(dependency) else {
                continue;
            };
            let source = context
                .registry()
                .read()
                .expect("plugin registry lock poisoned");
            if copy_component(&source, dest, imported, name) {
                return true;
            }
        }

        error!(plugin_id = %self.plugin_id, component = %name, "component not found in host or started dependencies");
        false
    }

    /// Imports every component exposing a capability from the first
    /// source that has any match. Existing destination names are
    /// skipped, never overwritten.
    pub fn import_by_capability(
        &self,
        dest: &mut ComponentRegistry,
        imported: &mut BTreeSet<String>,
        request: &CapabilityRequest,
    ) -> bool {
        {
            let root = self.root.read().expect("host root registry lock poisoned");
            if copy_all_with_capability(&root, dest, imported, request) {
                return true;
            }
        }

        for dependency in self.dependencies {
            let Some(context) = self.contexts.started_context(dependency) else {
                continue;
            };
            let source = context
                .registry()
                .read()
                .expect("plugin registry lock poisoned");
            if copy_all_with_capability(&source, dest, imported, request) {
                return true;
            }
        }

        error!(
            plugin_id = %self.plugin_id,
            capability = %request.type_name,
            "no component with capability found in host or started dependencies"
        );
        false
    }
}

/// Copies one named component: flatten the definition, substitute the
/// lifecycle-inert proxy, register, record.
fn copy_component(
    source: &ComponentRegistry,
    dest: &mut ComponentRegistry,
    imported: &mut BTreeSet<String>,
    name: &str,
) -> bool {
    let Some(entry) = source.get(name) else {
        return false;
    };
    let definition = entry.definition.flattened(source.context_id());
    let handle = proxied_handle(&entry.handle, name);
    dest.register(definition, handle);
    imported.insert(name.to_string());
    debug!(
        component = %name,
        source = %source.context_id(),
        "component imported"
    );
    true
}

fn copy_all_with_capability(
    source: &ComponentRegistry,
    dest: &mut ComponentRegistry,
    imported: &mut BTreeSet<String>,
    request: &CapabilityRequest,
) -> bool {
    let matches = source.names_with_capability_id(request.type_id);
    if matches.is_empty() {
        return false;
    }
    for name in &matches {
        if dest.contains(name) {
            debug!(component = %name, "destination already defines name, skipped");
            continue;
        }
        copy_component(source, dest, imported, name);
    }
    debug!(
        capability = %request.type_name,
        source = %source.context_id(),
        count = matches.len(),
        "capability imported"
    );
    true
}

/// Substitutes the lifecycle proxy on a copied handle. A wrap veto
/// downgrades to an unwrapped import with a warning; handles without a
/// lifecycle need no proxy at all.
fn proxied_handle(handle: &ComponentHandle, name: &str) -> ComponentHandle {
    let copied = handle.clone();
    let Some(lifecycle) = copied.lifecycle().cloned() else {
        return copied;
    };
    match LifecycleProxyFactory::wrap(lifecycle) {
        Ok(ProxyDecision::Wrapped(proxy)) => copied.replace_lifecycle(proxy),
        Ok(ProxyDecision::LeftIntact(original)) => copied.replace_lifecycle(original),
        Err(err) => {
            warn!(component = %name, error = %err, "lifecycle proxy failed, imported unwrapped");
            copied
        }
    }
}
