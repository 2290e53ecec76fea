//! Host context and the plugin lifecycle manager.
//!
//! [`HostContext`] owns everything shared across plugin contexts: the
//! root component registry, the shared resource namespace, the exclusion
//! policy, the persistence unit, and host settings. [`PluginHost`] owns
//! the plugin table and drives start/stop transitions; it is the
//! [`DependencyContexts`] implementation the import resolver consults.

use crate::bootstrap::{Bootstrap, RunningContext};
use crate::config::ConfigSource;
use crate::error::HostError;
use crate::exclusions::ExclusionPolicy;
use crate::imports::{CapabilityRequest, DependencyContexts};
use crate::loader::ResourceSpace;
use crate::persistence::{EntityDescriptor, PersistenceUnit};
use crate::plugin::{PluginConfigurer, PluginDescriptor, PluginState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, RwLock};
use symbiont_registry::{ComponentDefinition, ComponentHandle, ComponentRegistry};
use tracing::{info, warn};

/// Auto-configured subsystems disabled in every plugin context by
/// default. Plugins share the host's copies instead of wiring their own.
pub const DEFAULT_EXCLUSIONS: [&str; 7] = [
    "symbiont.autoconfig.HostBootstrap",
    "symbiont.autoconfig.WebServer",
    "symbiont.autoconfig.WebEndpoints",
    "symbiont.autoconfig.Management",
    "symbiont.autoconfig.Metrics",
    "symbiont.autoconfig.Security",
    "symbiont.autoconfig.Session",
];

/// Host configuration parsed from `symbiont.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSettings {
    #[serde(default = "default_exclusions")]
    pub default_exclusions: Vec<String>,
    /// Startup observer names never notified for plugin transitions.
    #[serde(default)]
    pub excluded_observers: Vec<String>,
    /// Host-wide preset properties merged into every plugin environment
    /// beneath the plugin's own presets.
    #[serde(default)]
    pub preset: BTreeMap<String, String>,
}

fn default_exclusions() -> Vec<String> {
    DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect()
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            default_exclusions: default_exclusions(),
            excluded_observers: Vec::new(),
            preset: BTreeMap::new(),
        }
    }
}

impl HostSettings {
    /// Loads settings from an explicit path. Falls back to defaults with
    /// a warning on read or parse errors; a missing file is the normal
    /// zero-configuration case.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            info!("No host settings file at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<SettingsFile>(&contents) {
                Ok(file) => {
                    info!("Loaded host settings from {:?}", path);
                    file.host
                }
                Err(e) => {
                    warn!(
                        "Failed to parse host settings {:?}: {}. Using defaults.",
                        path, e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read host settings {:?}: {}. Using defaults.", path, e);
                Self::default()
            }
        }
    }
}

/// Raw TOML structure matching the settings file format.
#[derive(Deserialize)]
struct SettingsFile {
    #[serde(default)]
    host: HostSettings,
}

/// Constructs the per-context component registry. The host probes the
/// provider once at build time; a provider whose registries do not
/// override by name cannot carry the import semantics and is rejected.
pub trait RegistryProvider: Send + Sync {
    fn build(&self, context_id: &str) -> ComponentRegistry;
}

/// The stock provider: a plain [`ComponentRegistry`] per context.
pub struct DefaultRegistryProvider;

impl RegistryProvider for DefaultRegistryProvider {
    fn build(&self, context_id: &str) -> ComponentRegistry {
        ComponentRegistry::new(context_id)
    }
}

/// Observes plugin lifecycle transitions host-wide. Observers whose name
/// appears in [`HostSettings::excluded_observers`] are never notified.
pub trait StartupObserver: Send + Sync {
    fn name(&self) -> &str;

    fn on_plugin_started(&self, plugin: &PluginDescriptor) {
        let _ = plugin;
    }

    fn on_plugin_stopped(&self, plugin: &PluginDescriptor) {
        let _ = plugin;
    }
}

/// Shared state of one host instance. Everything here is a value owned
/// by the context; two hosts in one process never interfere.
pub struct HostContext {
    root: RwLock<ComponentRegistry>,
    shared_space: Arc<ResourceSpace>,
    exclusions: ExclusionPolicy,
    persistence: PersistenceUnit,
    settings: HostSettings,
    registry_provider: Arc<dyn RegistryProvider>,
    observers: Vec<Arc<dyn StartupObserver>>,
}

impl HostContext {
    pub fn builder() -> HostContextBuilder {
        HostContextBuilder::default()
    }

    pub fn root_registry(&self) -> &RwLock<ComponentRegistry> {
        &self.root
    }

    pub fn shared_space(&self) -> Arc<ResourceSpace> {
        Arc::clone(&self.shared_space)
    }

    pub fn exclusions(&self) -> &ExclusionPolicy {
        &self.exclusions
    }

    pub fn persistence(&self) -> &PersistenceUnit {
        &self.persistence
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    pub fn registry_provider(&self) -> &dyn RegistryProvider {
        self.registry_provider.as_ref()
    }

    /// Registers an eager singleton into the host root registry, the
    /// pool every plugin imports from.
    pub fn register_root_singleton<T: std::any::Any + Send + Sync>(
        &self,
        name: &str,
        instance: Arc<T>,
    ) {
        self.root
            .write()
            .expect("host root registry lock poisoned")
            .register_singleton(name, instance);
    }

    /// Registers a component with an explicit definition and handle.
    pub fn register_root(&self, definition: ComponentDefinition, handle: ComponentHandle) {
        self.root
            .write()
            .expect("host root registry lock poisoned")
            .register(definition, handle);
    }

    /// The host preset properties as a configuration source.
    pub fn preset_source(&self) -> ConfigSource {
        ConfigSource::from_map("host-preset", self.settings.preset.clone())
    }

    fn notify_started(&self, descriptor: &PluginDescriptor) {
        for observer in self.active_observers() {
            observer.on_plugin_started(descriptor);
        }
    }

    fn notify_stopped(&self, descriptor: &PluginDescriptor) {
        for observer in self.active_observers() {
            observer.on_plugin_stopped(descriptor);
        }
    }

    fn active_observers(&self) -> impl Iterator<Item = &Arc<dyn StartupObserver>> {
        self.observers.iter().filter(|o| {
            !self
                .settings
                .excluded_observers
                .iter()
                .any(|excluded| excluded == o.name())
        })
    }
}

/// Builder for [`HostContext`].
pub struct HostContextBuilder {
    shared_space: ResourceSpace,
    settings: HostSettings,
    registry_provider: Arc<dyn RegistryProvider>,
    base_entities: Vec<EntityDescriptor>,
    observers: Vec<Arc<dyn StartupObserver>>,
}

impl Default for HostContextBuilder {
    fn default() -> Self {
        Self {
            shared_space: ResourceSpace::new(),
            settings: HostSettings::default(),
            registry_provider: Arc::new(DefaultRegistryProvider),
            base_entities: Vec::new(),
            observers: Vec::new(),
        }
    }
}

impl HostContextBuilder {
    /// Sets the host's shared resource namespace.
    pub fn shared_space(mut self, space: ResourceSpace) -> Self {
        self.shared_space = space;
        self
    }

    pub fn settings(mut self, settings: HostSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn registry_provider(mut self, provider: Arc<dyn RegistryProvider>) -> Self {
        self.registry_provider = provider;
        self
    }

    /// Entity types the host itself contributes to the persistence unit.
    pub fn base_entities(mut self, entities: Vec<EntityDescriptor>) -> Self {
        self.base_entities = entities;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn StartupObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn build(self) -> Result<Arc<HostContext>, HostError> {
        probe_provider(self.registry_provider.as_ref())?;

        let exclusions = ExclusionPolicy::new(self.settings.default_exclusions.iter().cloned());
        let persistence = PersistenceUnit::new(self.base_entities)?;
        let root = RwLock::new(self.registry_provider.build("root"));

        Ok(Arc::new(HostContext {
            root,
            shared_space: Arc::new(self.shared_space),
            exclusions,
            persistence,
            settings: self.settings,
            registry_provider: self.registry_provider,
            observers: self.observers,
        }))
    }
}

/// Import semantics require override-by-name registration. Checked once
/// against a throwaway registry before the host accepts the provider.
/// Only the namespaced probe key is inspected; a provider may
/// pre-register its own infrastructure components.
fn probe_provider(provider: &dyn RegistryProvider) -> Result<(), HostError> {
    const PROBE_KEY: &str = "symbiont.host.probe";
    let mut probe = provider.build("host-probe");
    probe.register_singleton(PROBE_KEY, Arc::new(1_u8));
    let len_after_first = probe.len();
    probe.register_singleton(PROBE_KEY, Arc::new(2_u8));
    let overridden = probe.len() == len_after_first
        && probe
            .instance::<u8>(PROBE_KEY)
            .is_some_and(|value| *value == 2);
    if overridden {
        Ok(())
    } else {
        Err(HostError::IncompatibleRuntime(
            "registry provider does not override components by name".to_string(),
        ))
    }
}

/// Everything needed to start a plugin, captured at registration so the
/// plugin can be restarted after a stop.
pub struct PluginRegistration {
    descriptor: PluginDescriptor,
    configurer: Arc<dyn PluginConfigurer>,
    space: ResourceSpace,
    import_names: Vec<String>,
    import_capabilities: Vec<CapabilityRequest>,
    presets: BTreeMap<String, String>,
}

impl PluginRegistration {
    pub fn new(descriptor: PluginDescriptor, configurer: Arc<dyn PluginConfigurer>) -> Self {
        Self {
            descriptor,
            configurer,
            space: ResourceSpace::new(),
            import_names: Vec::new(),
            import_capabilities: Vec::new(),
            presets: BTreeMap::new(),
        }
    }

    /// The plugin's own resource namespace.
    pub fn space(mut self, space: ResourceSpace) -> Self {
        self.space = space;
        self
    }

    /// Declares a by-name import resolved on every start.
    pub fn import_component(mut self, name: impl Into<String>) -> Self {
        self.import_names.push(name.into());
        self
    }

    /// Declares a by-capability import resolved on every start.
    pub fn import_capability<C: ?Sized + Send + Sync + 'static>(mut self) -> Self {
        self.import_capabilities.push(CapabilityRequest::of::<C>());
        self
    }

    pub fn preset_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.presets.insert(key.into(), value.into());
        self
    }
}

struct PluginSlot {
    registration: PluginRegistration,
    state: PluginState,
    context: Option<Arc<RunningContext>>,
}

/// The plugin table and lifecycle driver of one host instance.
pub struct PluginHost {
    context: Arc<HostContext>,
    plugins: RwLock<HashMap<String, PluginSlot>>,
}

impl PluginHost {
    pub fn new(context: Arc<HostContext>) -> Self {
        Self {
            context,
            plugins: RwLock::new(HashMap::new()),
        }
    }

    pub fn host_context(&self) -> &Arc<HostContext> {
        &self.context
    }

    // ================================================================
    // Registration
    // ================================================================

    pub fn register_plugin(&self, registration: PluginRegistration) -> Result<(), HostError> {
        let mut plugins = self.plugins.write().expect("plugin table lock poisoned");
        let plugin_id = registration.descriptor.id.clone();
        if plugins.contains_key(&plugin_id) {
            return Err(HostError::PluginAlreadyRegistered(plugin_id));
        }
        info!(plugin_id = %plugin_id, "plugin registered");
        plugins.insert(
            plugin_id,
            PluginSlot {
                registration,
                state: PluginState::Created,
                context: None,
            },
        );
        Ok(())
    }

    // ================================================================
    // Start / Stop
    // ================================================================

    /// Starts a registered plugin. The slot is claimed (moved to
    /// Starting) under the table lock before any bootstrap work, so a
    /// concurrent start of the same plugin fails fast instead of racing.
    /// Bootstrap itself runs outside the lock so sibling plugins stay
    /// startable and the import resolver can consult started contexts.
    pub fn start_plugin(&self, plugin_id: &str) -> Result<(), HostError> {
        let bootstrap = {
            let mut plugins = self.plugins.write().expect("plugin table lock poisoned");
            let slot = plugins
                .get_mut(plugin_id)
                .ok_or_else(|| HostError::PluginNotFound(plugin_id.to_string()))?;
            if slot.state == PluginState::Started || slot.state == PluginState::Starting {
                return Err(HostError::InvalidState {
                    plugin_id: plugin_id.to_string(),
                    state: slot.state,
                    operation: "start",
                });
            }
            slot.state = PluginState::Starting;

            let registration = &slot.registration;
            let mut bootstrap = Bootstrap::new(
                Arc::clone(&self.context),
                registration.descriptor.clone(),
                Arc::clone(&registration.configurer),
                registration.space.clone(),
            );
            for name in &registration.import_names {
                bootstrap = bootstrap.import_component(name.clone());
            }
            for request in &registration.import_capabilities {
                bootstrap = bootstrap.import_capability_request(*request);
            }
            for (key, value) in &registration.presets {
                bootstrap = bootstrap.preset_property(key.clone(), value.clone());
            }
            bootstrap
        };

        match bootstrap.run(self) {
            Ok(running) => {
                let descriptor = running.descriptor().clone();
                let configurer = {
                    let mut plugins = self.plugins.write().expect("plugin table lock poisoned");
                    let slot = plugins
                        .get_mut(plugin_id)
                        .ok_or_else(|| HostError::PluginNotFound(plugin_id.to_string()))?;
                    slot.state = PluginState::Started;
                    slot.context = Some(Arc::new(running));
                    Arc::clone(&slot.registration.configurer)
                };
                configurer.on_start(&descriptor);
                self.context.notify_started(&descriptor);
                info!(plugin_id = %plugin_id, "plugin started");
                Ok(())
            }
            Err(err) => {
                let mut plugins = self.plugins.write().expect("plugin table lock poisoned");
                if let Some(slot) = plugins.get_mut(plugin_id) {
                    slot.state = PluginState::Failed;
                    slot.context = None;
                }
                warn!(plugin_id = %plugin_id, error = %err, "plugin start failed");
                Err(err)
            }
        }
    }

    /// Stops a started plugin: stop hook, context teardown, persistence
    /// contributions marked stale, legacy resource release.
    pub fn stop_plugin(&self, plugin_id: &str) -> Result<(), HostError> {
        let (descriptor, configurer, running) = {
            let mut plugins = self.plugins.write().expect("plugin table lock poisoned");
            let slot = plugins
                .get_mut(plugin_id)
                .ok_or_else(|| HostError::PluginNotFound(plugin_id.to_string()))?;
            if slot.state != PluginState::Started {
                return Err(HostError::InvalidState {
                    plugin_id: plugin_id.to_string(),
                    state: slot.state,
                    operation: "stop",
                });
            }
            slot.state = PluginState::Stopped;
            let running = slot.context.take();
            (
                slot.registration.descriptor.clone(),
                Arc::clone(&slot.registration.configurer),
                running,
            )
        };

        configurer.on_stop(&descriptor);
        if let Some(running) = running {
            running.shutdown();
        }
        self.context.persistence().mark_stale(plugin_id);
        configurer.release_legacy_resource(&descriptor, &self.context);
        self.context.notify_stopped(&descriptor);
        info!(plugin_id = %plugin_id, "plugin stopped");
        Ok(())
    }

    // ================================================================
    // Queries
    // ================================================================

    pub fn plugin_state(&self, plugin_id: &str) -> Result<PluginState, HostError> {
        self.plugins
            .read()
            .expect("plugin table lock poisoned")
            .get(plugin_id)
            .map(|slot| slot.state)
            .ok_or_else(|| HostError::PluginNotFound(plugin_id.to_string()))
    }

    pub fn is_started(&self, plugin_id: &str) -> bool {
        matches!(self.plugin_state(plugin_id), Ok(PluginState::Started))
    }

    /// Registered plugin ids with their states, in id order.
    pub fn list_plugins(&self) -> Vec<(String, PluginState)> {
        let plugins = self.plugins.read().expect("plugin table lock poisoned");
        let mut listed: Vec<(String, PluginState)> = plugins
            .iter()
            .map(|(id, slot)| (id.clone(), slot.state))
            .collect();
        listed.sort_by(|a, b| a.0.cmp(&b.0));
        listed
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins
            .read()
            .expect("plugin table lock poisoned")
            .len()
    }
}

impl DependencyContexts for PluginHost {
    fn started_context(&self, plugin_id: &str) -> Option<Arc<RunningContext>> {
        let plugins = self.plugins.read().expect("plugin table lock poisoned");
        plugins
            .get(plugin_id)
            .filter(|slot| slot.state == PluginState::Started)
            .and_then(|slot| slot.context.as_ref().map(Arc::clone))
    }
}
