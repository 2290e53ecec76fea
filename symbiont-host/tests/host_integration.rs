//! End-to-end scenarios across the public host API: cross-context
//! imports, lifecycle proxying, persistence merging, and concurrent
//! plugin startup.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use symbiont_host::{
    DependencyContexts, EntityDescriptor, EntityField, HostContext, HostError, NoopConfigurer,
    PersistenceConfigurer, PluginConfigurer, PluginDescriptor, PluginHost, PluginRegistration,
    PluginRuntimeContext, PluginState, ResourceSpace, TypeDescriptor, COMPONENT_IMPORTED_NAMES,
};
use symbiont_registry::{
    ComponentDefinition, ComponentHandle, Lifecycle, LifecycleError,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn new_host() -> PluginHost {
    init_logging();
    PluginHost::new(HostContext::builder().build().unwrap())
}

// ====================================================================
// Sharing semantics: an import is the same live instance
// ====================================================================

#[test]
fn imported_component_shares_state_with_the_source() {
    let host = new_host();
    let journal: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    host.host_context()
        .register_root_singleton("journal", Arc::clone(&journal));

    host.register_plugin(
        PluginRegistration::new(PluginDescriptor::new("writer"), Arc::new(NoopConfigurer))
            .import_component("journal"),
    )
    .unwrap();
    host.start_plugin("writer").unwrap();

    let context = host.started_context("writer").unwrap();
    let imported = context
        .instance::<Mutex<Vec<String>>>("journal")
        .unwrap();
    imported.lock().unwrap().push("written by plugin".to_string());

    // the mutation is visible through the host's own handle
    assert_eq!(journal.lock().unwrap().as_slice(), ["written by plugin"]);
}

// ====================================================================
// Resolution order: root first, then dependencies in declared order
// ====================================================================

struct Defining(&'static str, u32);

impl PluginConfigurer for Defining {
    fn on_bootstrap(&self, ctx: &mut PluginRuntimeContext<'_>) -> anyhow::Result<()> {
        ctx.registry_mut()
            .register_singleton(self.0, Arc::new(self.1));
        Ok(())
    }
}

#[test]
fn first_declared_dependency_wins() {
    let host = new_host();
    host.register_plugin(PluginRegistration::new(
        PluginDescriptor::new("dep1"),
        Arc::new(Defining("svc", 1)),
    ))
    .unwrap();
    host.register_plugin(PluginRegistration::new(
        PluginDescriptor::new("dep2"),
        Arc::new(Defining("svc", 2)),
    ))
    .unwrap();
    host.register_plugin(
        PluginRegistration::new(
            PluginDescriptor::new("consumer")
                .depends_on("dep1")
                .depends_on("dep2"),
            Arc::new(NoopConfigurer),
        )
        .import_component("svc"),
    )
    .unwrap();

    host.start_plugin("dep1").unwrap();
    host.start_plugin("dep2").unwrap();
    host.start_plugin("consumer").unwrap();

    let context = host.started_context("consumer").unwrap();
    assert_eq!(*context.instance::<u32>("svc").unwrap(), 1);
}

#[test]
fn host_root_outranks_dependencies() {
    let host = new_host();
    host.host_context()
        .register_root_singleton("svc", Arc::new(0_u32));
    host.register_plugin(PluginRegistration::new(
        PluginDescriptor::new("dep"),
        Arc::new(Defining("svc", 1)),
    ))
    .unwrap();
    host.register_plugin(
        PluginRegistration::new(
            PluginDescriptor::new("consumer").depends_on("dep"),
            Arc::new(NoopConfigurer),
        )
        .import_component("svc"),
    )
    .unwrap();

    host.start_plugin("dep").unwrap();
    host.start_plugin("consumer").unwrap();

    let context = host.started_context("consumer").unwrap();
    assert_eq!(*context.instance::<u32>("svc").unwrap(), 0);
}

// ====================================================================
// Lifecycle ownership: imported hooks never re-fire
// ====================================================================

struct Hooked {
    inits: AtomicUsize,
    destroys: AtomicUsize,
}

impl Lifecycle for Hooked {
    fn after_init(&self) -> Result<(), LifecycleError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn before_destroy(&self) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn importing_context_never_runs_source_hooks() {
    let hook = Arc::new(Hooked {
        inits: AtomicUsize::new(0),
        destroys: AtomicUsize::new(0),
    });
    let host = new_host();
    host.host_context().register_root(
        ComponentDefinition::singleton("svc", "Svc"),
        ComponentHandle::new(Arc::new(11_u32)).with_lifecycle(Arc::clone(&hook) as Arc<dyn Lifecycle>),
    );

    host.register_plugin(
        PluginRegistration::new(PluginDescriptor::new("p"), Arc::new(NoopConfigurer))
            .import_component("svc"),
    )
    .unwrap();
    host.start_plugin("p").unwrap();
    host.stop_plugin("p").unwrap();

    // neither plugin startup nor shutdown touched the source lifecycle
    assert_eq!(hook.inits.load(Ordering::SeqCst), 0);
    assert_eq!(hook.destroys.load(Ordering::SeqCst), 0);
}

// ====================================================================
// By-capability imports
// ====================================================================

trait Codec: Send + Sync {
    fn id(&self) -> &'static str;
}

struct Json;
impl Codec for Json {
    fn id(&self) -> &'static str {
        "json"
    }
}

struct Toml;
impl Codec for Toml {
    fn id(&self) -> &'static str {
        "toml"
    }
}

#[test]
fn capability_import_brings_all_matches() {
    let host = new_host();
    let json = Arc::new(Json);
    let toml = Arc::new(Toml);
    host.host_context().register_root(
        ComponentDefinition::singleton("jsonCodec", "Json"),
        ComponentHandle::new(Arc::clone(&json)).expose::<dyn Codec>(json),
    );
    host.host_context().register_root(
        ComponentDefinition::singleton("tomlCodec", "Toml"),
        ComponentHandle::new(Arc::clone(&toml)).expose::<dyn Codec>(toml),
    );

    host.register_plugin(
        PluginRegistration::new(PluginDescriptor::new("p"), Arc::new(NoopConfigurer))
            .import_capability::<dyn Codec>(),
    )
    .unwrap();
    host.start_plugin("p").unwrap();

    let context = host.started_context("p").unwrap();
    assert_eq!(context.instance::<dyn Codec>("jsonCodec").unwrap().id(), "json");
    assert_eq!(context.instance::<dyn Codec>("tomlCodec").unwrap().id(), "toml");

    let imported = context
        .instance::<BTreeSet<String>>(COMPONENT_IMPORTED_NAMES)
        .unwrap();
    assert_eq!(
        *imported,
        BTreeSet::from(["jsonCodec".to_string(), "tomlCodec".to_string()])
    );
}

struct PublishingCodec;

impl PluginConfigurer for PublishingCodec {
    fn on_bootstrap(&self, ctx: &mut PluginRuntimeContext<'_>) -> anyhow::Result<()> {
        let json = Arc::new(Json);
        ctx.registry_mut().register(
            ComponentDefinition::singleton("jsonCodec", "Json"),
            ComponentHandle::new(Arc::clone(&json)).expose::<dyn Codec>(json),
        );
        Ok(())
    }
}

#[test]
fn capability_import_walks_started_dependencies() {
    let host = new_host();
    host.register_plugin(PluginRegistration::new(
        PluginDescriptor::new("codecs"),
        Arc::new(PublishingCodec),
    ))
    .unwrap();
    host.register_plugin(
        PluginRegistration::new(
            PluginDescriptor::new("consumer").depends_on("codecs"),
            Arc::new(NoopConfigurer),
        )
        .import_capability::<dyn Codec>(),
    )
    .unwrap();

    host.start_plugin("codecs").unwrap();
    host.start_plugin("consumer").unwrap();

    let context = host.started_context("consumer").unwrap();
    assert_eq!(context.instance::<dyn Codec>("jsonCodec").unwrap().id(), "json");
    assert!(context.imported().contains("jsonCodec"));
}

#[test]
fn stopped_dependency_capability_import_is_false_not_fatal() {
    struct Tolerant;
    impl PluginConfigurer for Tolerant {
        fn on_bootstrap(&self, ctx: &mut PluginRuntimeContext<'_>) -> anyhow::Result<()> {
            // optional dependency: a miss is reported, not fatal
            assert!(!ctx.import_capability::<dyn Codec>());
            Ok(())
        }
    }

    let host = new_host();
    host.register_plugin(PluginRegistration::new(
        PluginDescriptor::new("codecs"),
        Arc::new(PublishingCodec),
    ))
    .unwrap();
    host.register_plugin(PluginRegistration::new(
        PluginDescriptor::new("consumer").depends_on("codecs"),
        Arc::new(Tolerant),
    ))
    .unwrap();

    host.start_plugin("codecs").unwrap();
    host.stop_plugin("codecs").unwrap();

    host.start_plugin("consumer").unwrap();
    assert!(host.is_started("consumer"));
    let context = host.started_context("consumer").unwrap();
    assert!(context.imported().is_empty());
}

#[test]
fn missing_capability_fails_startup_when_callback_insists() {
    struct Strict;
    impl PluginConfigurer for Strict {
        fn on_bootstrap(&self, ctx: &mut PluginRuntimeContext<'_>) -> anyhow::Result<()> {
            if !ctx.import_capability::<dyn Codec>() {
                anyhow::bail!("codec capability unavailable");
            }
            Ok(())
        }
    }

    let host = new_host();
    host.register_plugin(PluginRegistration::new(
        PluginDescriptor::new("codecs"),
        Arc::new(PublishingCodec),
    ))
    .unwrap();
    host.register_plugin(PluginRegistration::new(
        PluginDescriptor::new("consumer").depends_on("codecs"),
        Arc::new(Strict),
    ))
    .unwrap();

    host.start_plugin("codecs").unwrap();
    host.stop_plugin("codecs").unwrap();

    let err = host.start_plugin("consumer").unwrap_err();
    assert!(matches!(err, HostError::BootstrapFailed { .. }));
    assert_eq!(host.plugin_state("consumer").unwrap(), PluginState::Failed);
}

// ====================================================================
// Persistence: end-to-end merge through the stock configurer
// ====================================================================

fn persistence_host() -> PluginHost {
    init_logging();
    let context = HostContext::builder().build().unwrap();
    context.register_root_singleton("dataSource", Arc::new(String::from("jdbc:shared")));
    context.register_root_singleton("transactionManager", Arc::new(String::from("tx")));
    context.register_root_singleton("entityManagerFactory", Arc::new(String::from("emf")));
    PluginHost::new(context)
}

#[test]
fn persistence_plugin_merges_model_and_imports_data_access() {
    let host = persistence_host();
    let space = ResourceSpace::new()
        .with_type(TypeDescriptor::entity(EntityDescriptor::new(
            "shelf.model.Book",
            "Book",
            vec![EntityField::indexed("title", "text")],
        )))
        .with_type(TypeDescriptor::plain("shelf.service.Shelf"));

    host.register_plugin(
        PluginRegistration::new(
            PluginDescriptor::new("shelf"),
            Arc::new(PersistenceConfigurer::new(["shelf.model".to_string()])),
        )
        .space(space),
    )
    .unwrap();
    host.start_plugin("shelf").unwrap();

    let unit = host.host_context().persistence();
    assert!(unit.contains_entity("Book"));
    assert_eq!(unit.contributed_packages("shelf"), vec!["shelf.model".to_string()]);

    let context = host.started_context("shelf").unwrap();
    assert_eq!(
        *context.instance::<String>("dataSource").unwrap(),
        "jdbc:shared"
    );
    assert!(context.imported().contains("transactionManager"));
    assert!(context.imported().contains("entityManagerFactory"));
}

#[test]
fn conflicting_entity_name_fails_only_the_offending_plugin() {
    let host = persistence_host();
    let book = |package: &str| {
        ResourceSpace::new().with_type(TypeDescriptor::entity(EntityDescriptor::new(
            &format!("{package}.Book"),
            "Book",
            vec![],
        )))
    };

    host.register_plugin(
        PluginRegistration::new(
            PluginDescriptor::new("first"),
            Arc::new(PersistenceConfigurer::new(["first.model".to_string()])),
        )
        .space(book("first.model")),
    )
    .unwrap();
    host.register_plugin(
        PluginRegistration::new(
            PluginDescriptor::new("second"),
            Arc::new(PersistenceConfigurer::new(["second.model".to_string()])),
        )
        .space(book("second.model")),
    )
    .unwrap();

    host.start_plugin("first").unwrap();
    let revision_before = host.host_context().persistence().revision();

    let err = host.start_plugin("second").unwrap_err();
    assert!(matches!(err, HostError::BootstrapFailed { .. }));
    assert_eq!(host.plugin_state("second").unwrap(), PluginState::Failed);

    // the unit kept its pre-merge state and the first plugin is intact
    assert_eq!(host.host_context().persistence().revision(), revision_before);
    assert!(host.is_started("first"));
}

// ====================================================================
// Concurrent startup
// ====================================================================

#[test]
fn plugins_start_concurrently_against_one_host() {
    let host = new_host();
    host.host_context()
        .register_root_singleton("shared", Arc::new(1_u32));

    let ids: Vec<String> = (0..8).map(|i| format!("plugin-{i}")).collect();
    for id in &ids {
        host.register_plugin(
            PluginRegistration::new(PluginDescriptor::new(id.clone()), Arc::new(NoopConfigurer))
                .import_component("shared"),
        )
        .unwrap();
    }

    std::thread::scope(|scope| {
        for id in &ids {
            scope.spawn(|| host.start_plugin(id).unwrap());
        }
    });

    for id in &ids {
        assert!(host.is_started(id));
        let context = host.started_context(id).unwrap();
        assert_eq!(*context.instance::<u32>("shared").unwrap(), 1);
    }
}
