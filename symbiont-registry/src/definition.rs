//! Component definitions: the explicit construction recipe a registry
//! stores alongside the live instance.
//!
//! Definitions are plain records so any registry implementation can copy
//! one across a context boundary without reaching into framework-private
//! state. A copied definition is always *flattened* first: forced eager,
//! forced singleton, factory indirection stripped, so the destination
//! context can hold the component without depending on the source
//! context's internal wiring.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Construction scope of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// One shared instance per context.
    Singleton,
    /// A fresh instance per resolution, built by the factory.
    Prototype,
}

/// Where a definition came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Defined and owned by this context.
    Local,
    /// Copied from another context; the source retains lifecycle ownership.
    Imported { source_context: String },
}

/// Factory recipe for prototype-scoped components.
pub type FactoryFn = Arc<dyn Fn() -> Arc<dyn Any + Send + Sync> + Send + Sync>;

/// The recipe for one named component: type, scope, laziness, optional
/// factory, and provenance.
#[derive(Clone)]
pub struct ComponentDefinition {
    pub name: String,
    pub type_name: String,
    pub scope: Scope,
    pub lazy: bool,
    pub origin: Origin,
    factory: Option<FactoryFn>,
}

impl ComponentDefinition {
    /// A local, eager singleton definition.
    pub fn singleton(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            scope: Scope::Singleton,
            lazy: false,
            origin: Origin::Local,
            factory: None,
        }
    }

    /// A local prototype definition backed by a factory.
    pub fn prototype(
        name: impl Into<String>,
        type_name: impl Into<String>,
        factory: FactoryFn,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            scope: Scope::Prototype,
            lazy: false,
            origin: Origin::Local,
            factory: Some(factory),
        }
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn factory(&self) -> Option<&FactoryFn> {
        self.factory.as_ref()
    }

    pub fn is_imported(&self) -> bool {
        matches!(self.origin, Origin::Imported { .. })
    }

    /// Produces the self-contained copy registered into a destination
    /// context on import: eager, singleton, no factory indirection.
    pub fn flattened(&self, source_context: &str) -> Self {
        Self {
            name: self.name.clone(),
            type_name: self.type_name.clone(),
            scope: Scope::Singleton,
            lazy: false,
            origin: Origin::Imported {
                source_context: source_context.to_string(),
            },
            factory: None,
        }
    }
}

impl fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("scope", &self.scope)
            .field("lazy", &self.lazy)
            .field("origin", &self.origin)
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}
