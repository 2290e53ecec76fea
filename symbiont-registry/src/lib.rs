//! Container-agnostic component model for the symbiont plugin host.
//!
//! A component is a named, usually singleton, unit of application logic.
//! Each context (the host root, or one per started plugin) owns a
//! [`ComponentRegistry`] mapping component names to a definition (the
//! construction recipe) plus the live handle. Components imported across
//! context boundaries keep their capability surface but get a
//! lifecycle-inert proxy so the destination context can never re-trigger
//! hooks owned by the source context.

mod definition;
mod error;
mod lifecycle;
mod registry;

pub use definition::{ComponentDefinition, FactoryFn, Origin, Scope};
pub use error::RegistryError;
pub use lifecycle::{
    Lifecycle, LifecycleError, LifecycleProxy, LifecycleProxyFactory, ProxyDecision, ProxyError,
};
pub use registry::{ComponentEntry, ComponentHandle, ComponentRegistry};
