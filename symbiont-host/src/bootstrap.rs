//! Plugin bootstrap pipeline.
//!
//! [`Bootstrap`] assembles one plugin context in a fixed order: layered
//! environment, isolation policy, module loader, fresh registry, the
//! plugin descriptor component, declared imports, then the configurer's
//! bootstrap hook. Only a fully assembled context is returned; any
//! failure discards the partial context and leaves the host and sibling
//! plugins untouched.

use crate::config::{ConfigSource, Environment};
use crate::error::HostError;
use crate::host::HostContext;
use crate::imports::{CapabilityRequest, DependencyContexts, ImportResolver};
use crate::loader::{IsolationPolicy, ModuleLoader, ResourceSpace};
use crate::plugin::{PluginConfigurer, PluginDescriptor};
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use symbiont_registry::ComponentRegistry;
use tracing::{debug, info};

/// Well-known component name under which every plugin context exposes
/// its own [`PluginDescriptor`].
pub const COMPONENT_PLUGIN: &str = "pluginDescriptor";

/// Well-known component name for the set of names this context imported
/// from other contexts, exposed as `Arc<BTreeSet<String>>`.
pub const COMPONENT_IMPORTED_NAMES: &str = "importedComponentNames";

enum DeclaredImport {
    Name(String),
    Capability(CapabilityRequest),
}

/// Builder for one plugin startup attempt.
pub struct Bootstrap {
    host: Arc<HostContext>,
    descriptor: PluginDescriptor,
    configurer: Arc<dyn PluginConfigurer>,
    space: ResourceSpace,
    imports: Vec<DeclaredImport>,
    presets: ConfigSource,
}

impl Bootstrap {
    pub fn new(
        host: Arc<HostContext>,
        descriptor: PluginDescriptor,
        configurer: Arc<dyn PluginConfigurer>,
        space: ResourceSpace,
    ) -> Self {
        Self {
            host,
            descriptor,
            configurer,
            space,
            imports: Vec::new(),
            presets: ConfigSource::new("plugin-preset"),
        }
    }

    /// Declares a by-name import resolved before the bootstrap hook runs.
    pub fn import_component(mut self, name: impl Into<String>) -> Self {
        self.imports.push(DeclaredImport::Name(name.into()));
        self
    }

    /// Declares a by-capability import resolved before the bootstrap hook
    /// runs.
    pub fn import_capability<C: ?Sized + Send + Sync + 'static>(self) -> Self {
        self.import_capability_request(CapabilityRequest::of::<C>())
    }

    /// Same as [`import_capability`](Self::import_capability) for a
    /// request captured earlier.
    pub fn import_capability_request(mut self, request: CapabilityRequest) -> Self {
        self.imports.push(DeclaredImport::Capability(request));
        self
    }

    /// Sets a plugin preset property, the highest-precedence environment
    /// layer of the new context.
    pub fn preset_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.presets.set(key, value);
        self
    }

    /// Runs the pipeline to completion.
    pub fn run(self, contexts: &dyn DependencyContexts) -> Result<RunningContext, HostError> {
        let plugin_id = self.descriptor.id.clone();
        debug!(plugin_id = %plugin_id, "bootstrap starting");

        let mut environment = Environment::new();
        if !self.presets.is_empty() {
            environment.push_last(self.presets);
        }
        environment.push_last(self.host.preset_source());
        environment.push_last(
            self.host
                .exclusions()
                .config_source(&self.configurer.exclude_configurations()),
        );

        let policy = IsolationPolicy::from_environment(&environment);
        let loader = Arc::new(ModuleLoader::new(
            plugin_id.clone(),
            self.space,
            self.host.shared_space(),
            policy,
        ));

        let mut registry = self.host.registry_provider().build(&plugin_id);
        registry.register_singleton(COMPONENT_PLUGIN, Arc::new(self.descriptor.clone()));

        let mut ctx = PluginRuntimeContext {
            descriptor: self.descriptor,
            host: Arc::clone(&self.host),
            loader,
            environment,
            registry,
            imported: BTreeSet::new(),
            contexts,
        };

        for declared in &self.imports {
            let resolver = ImportResolver {
                plugin_id: &ctx.descriptor.id,
                root: ctx.host.root_registry(),
                dependencies: &ctx.descriptor.dependencies,
                contexts,
            };
            match declared {
                DeclaredImport::Name(name) => {
                    resolver.import_by_name(&mut ctx.registry, &mut ctx.imported, name);
                }
                DeclaredImport::Capability(request) => {
                    resolver.import_by_capability(&mut ctx.registry, &mut ctx.imported, request);
                }
            }
        }

        self.configurer
            .on_bootstrap(&mut ctx)
            .map_err(|source| HostError::BootstrapFailed {
                plugin_id: plugin_id.clone(),
                source,
            })?;

        ctx.finish()
    }
}

/// The in-flight context handed to [`PluginConfigurer::on_bootstrap`].
/// Grants access to the environment, registry, and loader of the plugin
/// being assembled, plus on-demand imports.
pub struct PluginRuntimeContext<'a> {
    descriptor: PluginDescriptor,
    host: Arc<HostContext>,
    loader: Arc<ModuleLoader>,
    environment: Environment,
    registry: ComponentRegistry,
    imported: BTreeSet<String>,
    contexts: &'a dyn DependencyContexts,
}

impl PluginRuntimeContext<'_> {
    pub fn plugin_id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    pub fn host(&self) -> &HostContext {
        &self.host
    }

    pub fn loader(&self) -> Arc<ModuleLoader> {
        Arc::clone(&self.loader)
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.registry
    }

    /// Names imported into this context so far.
    pub fn imported(&self) -> &BTreeSet<String> {
        &self.imported
    }

    /// Imports a component by name from the host root or a started
    /// dependency. Returns whether the name is available afterwards.
    pub fn import_component(&mut self, name: &str) -> bool {
        let resolver = ImportResolver {
            plugin_id: &self.descriptor.id,
            root: self.host.root_registry(),
            dependencies: &self.descriptor.dependencies,
            contexts: self.contexts,
        };
        resolver.import_by_name(&mut self.registry, &mut self.imported, name)
    }

    /// Imports every component exposing the capability from the first
    /// source context that has a match.
    pub fn import_capability<C: ?Sized + Send + Sync + 'static>(&mut self) -> bool {
        let request = CapabilityRequest::of::<C>();
        let resolver = ImportResolver {
            plugin_id: &self.descriptor.id,
            root: self.host.root_registry(),
            dependencies: &self.descriptor.dependencies,
            contexts: self.contexts,
        };
        resolver.import_by_capability(&mut self.registry, &mut self.imported, &request)
    }

    /// Seals the context: publishes the imported-name set as a component
    /// and runs init hooks in registration order. Imported components
    /// carry inert proxies, so only locally registered hooks fire.
    fn finish(mut self) -> Result<RunningContext, HostError> {
        self.registry.register_singleton(
            COMPONENT_IMPORTED_NAMES,
            Arc::new(self.imported.clone()),
        );

        for name in self.registry.names().to_vec() {
            let Some(entry) = self.registry.get(&name) else {
                continue;
            };
            if let Some(lifecycle) = entry.handle.lifecycle() {
                lifecycle
                    .after_init()
                    .map_err(|source| HostError::LifecycleHook {
                        component: name.clone(),
                        source,
                    })?;
            }
        }

        info!(
            plugin_id = %self.descriptor.id,
            components = self.registry.len(),
            imported = self.imported.len(),
            "plugin context assembled"
        );
        Ok(RunningContext {
            descriptor: self.descriptor,
            registry: RwLock::new(self.registry),
            imported: self.imported,
            loader: self.loader,
            environment: self.environment,
        })
    }
}

/// A fully assembled plugin context. Holds the registry other contexts
/// import from while the plugin is started.
pub struct RunningContext {
    descriptor: PluginDescriptor,
    registry: RwLock<ComponentRegistry>,
    imported: BTreeSet<String>,
    loader: Arc<ModuleLoader>,
    environment: Environment,
}

impl std::fmt::Debug for RunningContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningContext")
            .field("descriptor", &self.descriptor)
            .field("imported", &self.imported)
            .finish_non_exhaustive()
    }
}

impl RunningContext {
    pub fn plugin_id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    pub fn registry(&self) -> &RwLock<ComponentRegistry> {
        &self.registry
    }

    pub fn imported(&self) -> &BTreeSet<String> {
        &self.imported
    }

    pub fn loader(&self) -> &Arc<ModuleLoader> {
        &self.loader
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Capability lookup shortcut against the context registry.
    pub fn instance<C: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Option<Arc<C>> {
        self.registry
            .read()
            .expect("plugin registry lock poisoned")
            .instance::<C>(name)
    }

    /// Tears the context down: destroy hooks run in reverse registration
    /// order. Imported components carry inert proxies, so shared
    /// instances survive the teardown of a borrowing context. Hook
    /// failures are logged and do not stop the teardown.
    pub fn shutdown(&self) {
        let registry = self
            .registry
            .read()
            .expect("plugin registry lock poisoned");
        for name in registry.names().iter().rev() {
            let Some(entry) = registry.get(name) else {
                continue;
            };
            if let Some(lifecycle) = entry.handle.lifecycle() {
                lifecycle.before_destroy();
            }
        }
        info!(plugin_id = %self.descriptor.id, "plugin context shut down");
    }
}
