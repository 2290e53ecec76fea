//! Error types for the plugin host runtime.

use crate::plugin::PluginState;
use symbiont_registry::{LifecycleError, RegistryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    #[error("plugin already registered: {0}")]
    PluginAlreadyRegistered(String),

    #[error("plugin '{plugin_id}' is in state {state:?}, cannot {operation}")]
    InvalidState {
        plugin_id: String,
        state: PluginState,
        operation: &'static str,
    },

    #[error("bootstrap failed for plugin '{plugin_id}': {source}")]
    BootstrapFailed {
        plugin_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("lifecycle hook failed for component '{component}': {source}")]
    LifecycleHook {
        component: String,
        #[source]
        source: LifecycleError,
    },

    #[error("persistence metadata rebuild failed: {0}")]
    PersistenceRebuild(String),

    #[error("incompatible runtime: {0}")]
    IncompatibleRuntime(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
