//! Component lifecycle hooks and the lifecycle-inert proxy used for
//! imported components.
//!
//! A context invokes `after_init` on every registered component when it
//! finishes starting, and `before_destroy` in reverse order when it tears
//! down. A component imported from another context must never have its
//! hooks re-invoked by the destination; the source context is the sole
//! lifecycle owner. Imports are therefore wrapped in [`LifecycleProxy`],
//! which keeps the capability surface intact and turns exactly these two
//! hook calls into no-ops.

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("component initialization failed: {0}")]
    InitFailed(String),
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("component '{0}' does not support lifecycle proxying")]
    Unsupported(String),
}

/// Lifecycle participation contract for components.
///
/// All methods have defaults so plain data components can implement this
/// as an empty marker. `supports_proxy` lets a component veto wrapping
/// (the analogue of proxy technologies that cannot wrap certain
/// implementation classes); a veto downgrades the import to unwrapped,
/// it never fails it.
pub trait Lifecycle: Send + Sync {
    /// Post-construction hook, run once by the owning context.
    fn after_init(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    /// Pre-destruction hook, run once by the owning context.
    fn before_destroy(&self) {}

    /// Component name used in diagnostics.
    fn component_name(&self) -> &str {
        "<unnamed>"
    }

    /// Whether this handle may be wrapped in a lifecycle proxy.
    fn supports_proxy(&self) -> bool {
        true
    }

    /// True for handles that are already an interception proxy produced
    /// by some cross-cutting mechanism; these are never double-wrapped.
    fn is_interception_proxy(&self) -> bool {
        false
    }
}

/// Hook-inert wrapper around an imported component's lifecycle handle.
///
/// The original handle is retained only for diagnostics; neither hook
/// call is forwarded.
pub struct LifecycleProxy {
    inner: Arc<dyn Lifecycle>,
}

impl LifecycleProxy {
    pub fn source(&self) -> &Arc<dyn Lifecycle> {
        &self.inner
    }
}

impl Lifecycle for LifecycleProxy {
    fn after_init(&self) -> Result<(), LifecycleError> {
        // owned by the source context; never re-initialize
        Ok(())
    }

    fn before_destroy(&self) {
        // owned by the source context; never dispose
    }

    fn component_name(&self) -> &str {
        self.inner.component_name()
    }

    fn is_interception_proxy(&self) -> bool {
        true
    }
}

/// Outcome of a wrap attempt.
pub enum ProxyDecision {
    /// A fresh inert proxy was produced.
    Wrapped(Arc<dyn Lifecycle>),
    /// The handle was already an interception proxy and is kept as-is.
    LeftIntact(Arc<dyn Lifecycle>),
}

pub struct LifecycleProxyFactory;

impl LifecycleProxyFactory {
    /// Wraps a lifecycle handle for cross-context registration.
    ///
    /// Handles that are already interception proxies are left alone.
    /// A veto via [`Lifecycle::supports_proxy`] is an error the caller is
    /// expected to downgrade to an unwrapped import.
    pub fn wrap(lifecycle: Arc<dyn Lifecycle>) -> Result<ProxyDecision, ProxyError> {
        if lifecycle.is_interception_proxy() {
            debug!(
                component = %lifecycle.component_name(),
                "already an interception proxy, left intact"
            );
            return Ok(ProxyDecision::LeftIntact(lifecycle));
        }
        if !lifecycle.supports_proxy() {
            return Err(ProxyError::Unsupported(
                lifecycle.component_name().to_string(),
            ));
        }
        Ok(ProxyDecision::Wrapped(Arc::new(LifecycleProxy {
            inner: lifecycle,
        })))
    }
}
