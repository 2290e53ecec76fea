//! Per-context component registry.
//!
//! Maps component names to entries (definition + live handle). Handles
//! carry the concrete instance plus pre-cast capability handles keyed by
//! `TypeId`, so a component can be looked up by its concrete type or by
//! any trait object it was exposed as. Re-registering a name overrides
//! the previous entry; registration order is preserved for lifecycle
//! ordering.

use crate::definition::{ComponentDefinition, Scope};
use crate::error::RegistryError;
use crate::lifecycle::Lifecycle;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Live handle for one registered component: the instance, its exposed
/// capabilities, and an optional lifecycle hook handle.
#[derive(Clone)]
pub struct ComponentHandle {
    instance: Arc<dyn Any + Send + Sync>,
    casts: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    lifecycle: Option<Arc<dyn Lifecycle>>,
}

impl ComponentHandle {
    /// Creates a handle for a concrete instance. The concrete type is
    /// automatically exposed as a capability.
    pub fn new<T: Any + Send + Sync>(instance: Arc<T>) -> Self {
        let mut casts: HashMap<TypeId, Arc<dyn Any + Send + Sync>> = HashMap::new();
        casts.insert(TypeId::of::<T>(), Arc::new(Arc::clone(&instance)));
        Self {
            instance,
            casts,
            lifecycle: None,
        }
    }

    /// Exposes an additional capability, typically a trait object the
    /// component implements: `handle.expose::<dyn DataAccess>(arc)`.
    pub fn expose<C: ?Sized + Send + Sync + 'static>(mut self, capability: Arc<C>) -> Self {
        self.casts.insert(TypeId::of::<C>(), Arc::new(capability));
        self
    }

    /// Attaches the lifecycle hook handle the owning context will invoke.
    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn Lifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Replaces the lifecycle handle, keeping instance and capabilities.
    /// Used when an import substitutes the inert proxy.
    pub fn replace_lifecycle(mut self, lifecycle: Arc<dyn Lifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Resolves a capability by type. Works for the concrete type and for
    /// every exposed trait object.
    pub fn capability<C: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<C>> {
        self.casts
            .get(&TypeId::of::<C>())
            .and_then(|cast| cast.downcast_ref::<Arc<C>>())
            .cloned()
    }

    pub fn has_capability_id(&self, id: TypeId) -> bool {
        self.casts.contains_key(&id)
    }

    pub fn lifecycle(&self) -> Option<&Arc<dyn Lifecycle>> {
        self.lifecycle.as_ref()
    }

    /// Raw instance pointer, mainly for identity checks in diagnostics.
    pub fn raw_instance(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.instance
    }
}

impl fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("capabilities", &self.casts.len())
            .field("has_lifecycle", &self.lifecycle.is_some())
            .finish()
    }
}

/// One registered component: recipe plus live handle.
#[derive(Debug, Clone)]
pub struct ComponentEntry {
    pub definition: ComponentDefinition,
    pub handle: ComponentHandle,
}

/// Name → component mapping owned by a single context.
pub struct ComponentRegistry {
    context_id: String,
    entries: HashMap<String, ComponentEntry>,
    order: Vec<String>,
}

impl ComponentRegistry {
    pub fn new(context_id: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// Registers a component. An existing entry of the same name is
    /// overridden in place; its position in the registration order is
    /// kept.
    pub fn register(&mut self, definition: ComponentDefinition, handle: ComponentHandle) {
        let name = definition.name.clone();
        if self
            .entries
            .insert(name.clone(), ComponentEntry { definition, handle })
            .is_some()
        {
            debug!(context = %self.context_id, component = %name, "component definition overridden");
        } else {
            self.order.push(name);
        }
    }

    /// Convenience for the common case: an eager local singleton of a
    /// concrete type.
    pub fn register_singleton<T: Any + Send + Sync>(&mut self, name: &str, instance: Arc<T>) {
        let definition = ComponentDefinition::singleton(name, std::any::type_name::<T>());
        self.register(definition, ComponentHandle::new(instance));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ComponentEntry> {
        self.entries.get(name)
    }

    pub fn definition(&self, name: &str) -> Option<&ComponentDefinition> {
        self.entries.get(name).map(|e| &e.definition)
    }

    /// Singleton instance lookup with capability downcast.
    pub fn instance<C: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Option<Arc<C>> {
        self.entries.get(name).and_then(|e| e.handle.capability())
    }

    /// Like [`instance`](Self::instance) but with a typed error.
    pub fn require<C: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<Arc<C>, RegistryError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        entry
            .handle
            .capability()
            .ok_or_else(|| RegistryError::CapabilityNotExposed {
                name: name.to_string(),
                capability: std::any::type_name::<C>().to_string(),
            })
    }

    /// Resolves a component honoring its scope: prototypes go through
    /// their factory, singletons return the registered instance.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Any + Send + Sync>, RegistryError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        match entry.definition.scope {
            Scope::Singleton => Ok(Arc::clone(entry.handle.raw_instance())),
            Scope::Prototype => {
                let factory = entry
                    .definition
                    .factory()
                    .ok_or_else(|| RegistryError::MissingFactory(name.to_string()))?;
                Ok(factory())
            }
        }
    }

    /// All components exposing a capability, in registration order.
    pub fn all_with_capability<C: ?Sized + Send + Sync + 'static>(&self) -> Vec<(String, Arc<C>)> {
        self.order
            .iter()
            .filter_map(|name| {
                let entry = &self.entries[name];
                entry.handle.capability().map(|cap| (name.clone(), cap))
            })
            .collect()
    }

    /// Names of components exposing a capability identified at runtime.
    /// Used by the cross-context import resolver, which carries a
    /// `TypeId` rather than a static type.
    pub fn names_with_capability_id(&self, id: TypeId) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| self.entries[*name].handle.has_capability_id(id))
            .cloned()
            .collect()
    }

    /// Component names in registration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn remove(&mut self, name: &str) -> Option<ComponentEntry> {
        let removed = self.entries.remove(name);
        if removed.is_some() {
            self.order.retain(|n| n != name);
        }
        removed
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("context_id", &self.context_id)
            .field("components", &self.order)
            .finish()
    }
}
