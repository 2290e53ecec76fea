//! In-process plugin host with cross-context component sharing.
//!
//! The host owns a root component registry and a shared resource
//! namespace; each plugin boots into its own isolated context and
//! imports components from the host root or from started dependency
//! plugins. Imported components share the live instance but never the
//! lifecycle: the destination context sees a hook-inert proxy, so only
//! the source context initializes and destroys what it owns.
//!
//! Plugin contexts layer their configuration (plugin presets over host
//! presets over the exclusion defaults), bind a module-loader isolation
//! policy from it, and may contribute entity types to the host's shared
//! persistence unit.

mod bootstrap;
mod config;
mod error;
mod exclusions;
mod host;
mod imports;
mod loader;
mod persistence;
mod plugin;

pub use bootstrap::{
    Bootstrap, PluginRuntimeContext, RunningContext, COMPONENT_IMPORTED_NAMES, COMPONENT_PLUGIN,
};
pub use config::{
    ConfigSource, Environment, PLUGIN_PROP_PREFIX, PROP_AUTOCONFIGURE_EXCLUDE,
    PROP_PLUGIN_FIRST_CLASSES, PROP_PLUGIN_ONLY_RESOURCES,
};
pub use error::HostError;
pub use exclusions::ExclusionPolicy;
pub use host::{
    DefaultRegistryProvider, HostContext, HostContextBuilder, HostSettings, PluginHost,
    PluginRegistration, RegistryProvider, StartupObserver, DEFAULT_EXCLUSIONS,
};
pub use imports::{CapabilityRequest, DependencyContexts, NoDependencies};
pub use loader::{
    IsolationPolicy, ModuleLoader, ResolutionOrder, ResourceSpace, TypeDescriptor,
};
pub use persistence::{
    EntityDescriptor, EntityField, PersistenceMetadata, PersistenceUnit,
};
pub use plugin::{
    NoopConfigurer, PersistenceConfigurer, PluginConfigurer, PluginDescriptor, PluginState,
};
