//! Plugin identity, lifecycle states, and the configurer hook surface
//! exposed to plugin authors.

use crate::bootstrap::PluginRuntimeContext;
use crate::host::HostContext;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a registered plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    Created,
    /// Startup is in flight; the slot is claimed and a second start is
    /// rejected until the attempt resolves to Started or Failed.
    Starting,
    Started,
    Stopped,
    /// Startup was attempted and aborted; the context was discarded.
    Failed,
}

/// Plugin identity plus its ordered dependency list. The dependency
/// order fixes the cross-context import search order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl PluginDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: String::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn depends_on(mut self, plugin_id: impl Into<String>) -> Self {
        self.dependencies.push(plugin_id.into());
        self
    }
}

/// Hooks a plugin author overrides to customize startup. Every method has
/// a no-op default.
pub trait PluginConfigurer: Send + Sync {
    /// Additional auto-configured subsystems to disable for this plugin.
    /// Merged additively with the host defaults.
    fn exclude_configurations(&self) -> Vec<String> {
        Vec::new()
    }

    /// Runs after the plugin registry exists and declared imports have
    /// resolved, before the plugin counts as started. May request further
    /// imports or merge persistence metadata. An error aborts this
    /// plugin's startup only.
    fn on_bootstrap(&self, ctx: &mut PluginRuntimeContext<'_>) -> anyhow::Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Runs once the plugin is marked started.
    fn on_start(&self, plugin: &PluginDescriptor) {
        let _ = plugin;
    }

    /// Runs when the plugin is stopped, before its context is torn down.
    fn on_stop(&self, plugin: &PluginDescriptor) {
        let _ = plugin;
    }

    /// Last-chance cleanup of host-side resources the plugin acquired.
    fn release_legacy_resource(&self, plugin: &PluginDescriptor, host: &HostContext) {
        let _ = (plugin, host);
    }
}

/// Configurer for plugins that need nothing beyond defaults.
pub struct NoopConfigurer;

impl PluginConfigurer for NoopConfigurer {}

/// Ready-made configurer for plugins contributing entity types to the
/// host's shared persistence unit.
///
/// Disables the plugin-local persistence subsystem (the host copy is
/// shared instead), imports the shared data-access components by name,
/// and merges the declared model packages. A merge failure fails the
/// plugin bootstrap, as required for a non-transactional rebuild.
pub struct PersistenceConfigurer {
    shared_components: Vec<String>,
    model_packages: Vec<String>,
}

impl PersistenceConfigurer {
    pub const DEFAULT_SHARED_COMPONENTS: [&str; 3] =
        ["dataSource", "transactionManager", "entityManagerFactory"];

    pub fn new(model_packages: impl IntoIterator<Item = String>) -> Self {
        Self {
            shared_components: Self::DEFAULT_SHARED_COMPONENTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            model_packages: model_packages.into_iter().collect(),
        }
    }

    /// Overrides the set of data-access components imported by name.
    pub fn shared_components(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.shared_components = names.into_iter().collect();
        self
    }
}

impl PluginConfigurer for PersistenceConfigurer {
    fn exclude_configurations(&self) -> Vec<String> {
        vec!["symbiont.autoconfig.Persistence".to_string()]
    }

    fn on_bootstrap(&self, ctx: &mut PluginRuntimeContext<'_>) -> anyhow::Result<()> {
        for name in &self.shared_components {
            ctx.import_component(name);
        }
        let packages: Vec<&str> = self.model_packages.iter().map(String::as_str).collect();
        let loader = ctx.loader();
        ctx.host().persistence().merge_model(&loader, &packages)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_builder_preserves_dependency_order() {
        let descriptor = PluginDescriptor::new("b")
            .version("1.2.0")
            .depends_on("d1")
            .depends_on("d2");
        assert_eq!(descriptor.id, "b");
        assert_eq!(descriptor.version, "1.2.0");
        assert_eq!(descriptor.dependencies, vec!["d1", "d2"]);
    }

    #[test]
    fn descriptor_round_trips_through_json() {
        let descriptor = PluginDescriptor::new("shelf").depends_on("core");
        let json = serde_json::to_string(&descriptor).unwrap();
        let back: PluginDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "shelf");
        assert_eq!(back.dependencies, vec!["core"]);
    }

    #[test]
    fn noop_configurer_declares_no_exclusions() {
        assert!(NoopConfigurer.exclude_configurations().is_empty());
    }

    #[test]
    fn persistence_configurer_excludes_persistence_subsystem() {
        let configurer = PersistenceConfigurer::new(["shelf.model".to_string()]);
        assert_eq!(
            configurer.exclude_configurations(),
            vec!["symbiont.autoconfig.Persistence".to_string()]
        );
    }
}
