//! Error types for the component registry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("component not found: {0}")]
    NotFound(String),

    #[error("component '{name}' does not expose capability '{capability}'")]
    CapabilityNotExposed { name: String, capability: String },

    #[error("prototype component '{0}' has no factory")]
    MissingFactory(String),
}
