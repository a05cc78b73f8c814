use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use serde_json::json;
use trellis_registry::{ComponentAddress, ComponentTypeId, Registry};

use super::*;

trait Greeter: Send + Sync {
    fn greet(&self) -> String;
}
crate::declare_interface!(Greeter);

trait Counted: Send + Sync {
    fn count(&self) -> usize;
}
crate::declare_interface!(Counted, "test.Counted");

static DESTROYED: AtomicUsize = AtomicUsize::new(0);

struct Hello {
    name: String,
}

impl Component for Hello {
    fn on_destroyed(&self) {
        DESTROYED.fetch_add(1, Ordering::SeqCst);
    }
}

impl Greeter for Hello {
    fn greet(&self) -> String {
        format!("hello {}", self.name)
    }
}

struct Picky;

impl Component for Picky {
    fn on_created(&self) -> Result<(), BoxError> {
        Err("not today".into())
    }
}

fn type_id(s: &str) -> ComponentTypeId {
    ComponentTypeId::new(s).unwrap()
}

fn hello_info() -> StaticComponentInfo {
    StaticComponentInfo::builder(type_id("Hello"), |ctx| {
        Ok(Hello {
            name: ctx.required("name")?,
        })
    })
    .description("says hello")
    .attribute(AttributeDescriptor::value("name", ValueType::String).with_default("world"))
    .interface::<dyn Greeter>(|c| c)
    .build()
    .unwrap()
}

#[test]
fn builder_rejects_duplicate_attributes() {
    let err = StaticComponentInfo::builder(type_id("Hello"), |_| Ok(Picky))
        .attribute(AttributeDescriptor::value("a", ValueType::Bool))
        .attribute(AttributeDescriptor::value("a", ValueType::Integer))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateAttribute { attribute, .. } if attribute == "a"));
}

#[test]
fn builder_rejects_unknown_related_attributes() {
    let bounded = AttributeDescriptor::builder()
        .name("value")
        .kind(AttributeKind::Value(ValueType::Real))
        .related(vec!["limit".to_string()])
        .build();
    let err = StaticComponentInfo::builder(type_id("Bounded"), |_| Ok(Picky))
        .attribute(bounded)
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::UnknownRelatedAttribute { related, .. } if related == "limit"));
}

#[test]
fn builder_type_checks_defaults() {
    let err = StaticComponentInfo::builder(type_id("Bad"), |_| Ok(Picky))
        .attribute(AttributeDescriptor::value("n", ValueType::Integer).with_default("seven"))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::InvalidDefault { .. }));

    let err = StaticComponentInfo::builder(type_id("Bad"), |_| Ok(Picky))
        .attribute(
            AttributeDescriptor::value("ns", ValueType::Integer)
                .with_flags(AttributeFlags::MULTI)
                .with_default(json!([1, 2.5])),
        )
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::InvalidDefault { .. }));
}

#[test]
fn builder_rejects_duplicate_interfaces() {
    let err = StaticComponentInfo::builder(type_id("Hello"), |_| {
        Ok(Hello {
            name: String::new(),
        })
    })
    .interface::<dyn Greeter>(|c| c)
    .interface::<dyn Greeter>(|c| c)
    .build()
    .unwrap_err();
    assert!(matches!(err, Error::DuplicateInterface { interface: "Greeter", .. }));
}

#[test]
fn register_is_idempotent_for_identical_metadata() {
    let mut builder = ComponentTypesBuilder::new();
    builder.register(hello_info()).unwrap();
    builder.register(hello_info()).unwrap();

    let conflicting = StaticComponentInfo::builder(type_id("Hello"), |_| Ok(Picky))
        .build()
        .unwrap();
    let err = builder.register(conflicting).unwrap_err();
    assert!(matches!(err, Error::DuplicateRegistration { .. }));

    let types = builder.freeze();
    assert_eq!(types.len(), 1);
    assert_eq!(types.get("Hello").unwrap().description(), "says hello");
}

#[test]
fn composite_types_share_the_type_namespace() {
    let mut builder = ComponentTypesBuilder::new();
    builder.register(hello_info()).unwrap();

    let err = builder
        .register_composite(type_id("Hello"), Registry::new())
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateRegistration { .. }));

    builder
        .register_composite(type_id("Group"), Registry::new())
        .unwrap();
    builder
        .register_composite(type_id("Group"), Registry::new())
        .unwrap();
    let types = builder.freeze();
    assert!(types.composite("Group").is_some());
    assert!(types.contains("Group"));
    assert!(types.get("Group").is_none());
}

struct Greetings;

impl ComponentLibrary for Greetings {
    fn descriptor(&self) -> LibraryDescriptor {
        LibraryDescriptor::builder()
            .name("greetings")
            .description("friendly components")
            .tags(vec!["demo".to_string()])
            .build()
    }

    fn register(&self, types: &mut ComponentTypesBuilder) -> Result<(), Error> {
        types.register(hello_info())
    }
}

#[test]
fn libraries_stamp_their_types_and_load_once() {
    let mut builder = ComponentTypesBuilder::new();
    builder.load_library(&Greetings).unwrap();
    let err = builder.load_library(&Greetings).unwrap_err();
    assert!(matches!(err, Error::DuplicateLibrary { name } if name == "greetings"));

    let types = builder.freeze();
    assert_eq!(types.libraries().len(), 1);
    assert_eq!(types.libraries()[0].tags, vec!["demo".to_string()]);
    assert_eq!(types.get("Hello").unwrap().library(), Some("greetings"));
}

#[test]
fn extraction_is_first_match_and_unimplemented_is_none() {
    let info = Arc::new(hello_info());
    assert!(info.provides(InterfaceId::of::<dyn Greeter>()));
    assert!(info.get_extractor(InterfaceId::of::<dyn Counted>()).is_none());
    assert_eq!(InterfaceId::of::<dyn Counted>().name(), "test.Counted");

    let slots = AttributeSlots::from([(
        "name".to_string(),
        AttributeSlot::Value(Some(json!("trellis"))),
    )]);
    let environment = Environment::new();
    let address = ComponentAddress::root();
    let context = CreationContext::new(&address, &info, &slots, &environment);
    let instance = info.instantiate(&context).unwrap();

    assert_eq!(
        instance.get_interface::<dyn Greeter>().unwrap().greet(),
        "hello trellis"
    );
    assert!(instance.get_interface::<dyn Counted>().is_none());
    assert_eq!(instance.downcast::<Hello>().unwrap().name, "trellis");
    assert!(instance.downcast::<Picky>().is_none());
}

#[test]
fn creation_hook_failure_is_reported_with_the_address() {
    let info = Arc::new(
        StaticComponentInfo::builder(type_id("Picky"), |_| Ok(Picky))
            .build()
            .unwrap(),
    );
    let slots = AttributeSlots::new();
    let environment = Environment::new();
    let address: ComponentAddress = "/a/b".parse().unwrap();
    let context = CreationContext::new(&address, &info, &slots, &environment);

    let err = info.instantiate(&context).unwrap_err();
    let Error::ComponentInitialization { address, source, .. } = err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(address.to_string(), "/a/b");
    assert_eq!(source.to_string(), "not today");
}

#[test]
fn context_accessors_check_slot_kinds() {
    let info = hello_info();
    let slots = AttributeSlots::from([
        ("name".to_string(), AttributeSlot::Value(Some(json!("x")))),
        ("tags".to_string(), AttributeSlot::Values(vec![json!(1), json!(2)])),
        ("maybe".to_string(), AttributeSlot::Reference(None)),
    ]);
    let environment = Environment::new();
    let address = ComponentAddress::root();
    let ctx = CreationContext::new(&address, &info, &slots, &environment);

    assert_eq!(ctx.value::<String>("name").unwrap().as_deref(), Some("x"));
    assert_eq!(ctx.values::<u8>("tags").unwrap(), vec![1, 2]);
    assert!(ctx.reference::<dyn Greeter>("maybe").unwrap().is_none());
    assert!(matches!(
        ctx.value::<u32>("name"),
        Err(Error::AttributeAccess { .. })
    ));
    assert!(matches!(
        ctx.values::<u8>("name"),
        Err(Error::AttributeAccess { .. })
    ));
    assert!(matches!(
        ctx.slot("missing"),
        Err(Error::AttributeAccess { .. })
    ));
}

#[test]
fn unset_slots_follow_defaults_and_flags() {
    let with_default = AttributeDescriptor::value("n", ValueType::Integer).with_default(3);
    assert!(matches!(
        AttributeSlot::unset(&with_default),
        Some(AttributeSlot::Value(Some(v))) if v == json!(3)
    ));

    let required = AttributeDescriptor::reference::<dyn Greeter>("peer");
    assert!(AttributeSlot::unset(&required).is_none());

    let optional_list = AttributeDescriptor::reference::<dyn Greeter>("peers")
        .with_flags(AttributeFlags::MULTI | AttributeFlags::NULLABLE);
    assert!(matches!(
        AttributeSlot::unset(&optional_list),
        Some(AttributeSlot::References(list)) if list.is_empty()
    ));
}

#[test]
fn factories_build_from_defaults_and_destroy_on_drop() {
    let factory = ComponentFactory::new(
        Arc::new(hello_info()),
        Environment::new(),
        ComponentAddress::root(),
    );
    let before = DESTROYED.load(Ordering::SeqCst);
    {
        let owned = factory.create().unwrap();
        assert_eq!(
            owned.get_interface::<dyn Greeter>().unwrap().greet(),
            "hello world"
        );
    }
    assert!(DESTROYED.load(Ordering::SeqCst) > before);

    let needs_peer = StaticComponentInfo::builder(type_id("NeedsPeer"), |_| Ok(Picky))
        .attribute(AttributeDescriptor::reference::<dyn Greeter>("peer"))
        .build()
        .unwrap();
    let factory = ComponentFactory::new(
        Arc::new(needs_peer),
        Environment::new(),
        ComponentAddress::root(),
    );
    assert!(matches!(
        factory.create(),
        Err(Error::MissingAttribute { attribute, .. }) if attribute == "peer"
    ));
}

trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

struct FixedClock(u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

#[test]
fn environment_serves_trait_objects_and_stays_shared() {
    let clock: Arc<dyn Clock> = Arc::new(FixedClock(42));
    let environment = Environment::new().with("clock", clock);
    let copy = environment.clone();

    assert_eq!(copy.get_service::<dyn Clock>("clock").unwrap().now(), 42);
    assert!(copy.get_service::<FixedClock>("clock").is_none());
    assert!(copy.get_service::<dyn Clock>("fs").is_none());
    assert!(copy.get_service_any("clock").is_some());
    assert!(copy.contains("clock"));

    let mut extended = environment.clone();
    extended.insert("fs", Arc::new(FixedClock(1)));
    assert!(extended.contains("fs"));
    assert!(!environment.contains("fs"));
}

static FAREWELLS: AtomicUsize = AtomicUsize::new(0);

struct Leaving;

impl Component for Leaving {
    fn on_destroyed(&self) {
        FAREWELLS.fetch_add(1, Ordering::SeqCst);
    }
}

fn leaving_factory() -> ComponentFactory {
    let info = StaticComponentInfo::builder(type_id("Leaving"), |_| Ok(Leaving))
        .build()
        .unwrap();
    ComponentFactory::new(Arc::new(info), Environment::new(), ComponentAddress::root())
}

#[test]
fn component_type_is_reachable_through_shared_handles() {
    let info: Arc<StaticComponentInfo> = Arc::new(hello_info());
    assert_eq!(info.component_type().as_str(), "Hello");

    let factory = ComponentFactory::new(info, Environment::new(), ComponentAddress::root());
    assert_eq!(factory.component_type().as_str(), "Hello");
    let owned = factory.create().unwrap();
    assert_eq!(owned.component_type().as_str(), "Hello");
    let shared: Arc<ComponentInstance> = Arc::new(ComponentInstance::clone(&owned));
    assert_eq!(shared.component_type().as_str(), "Hello");
}

#[test]
fn destruction_hook_fires_once_per_instance() {
    let owned = leaving_factory().create().unwrap();
    let before = FAREWELLS.load(Ordering::SeqCst);
    let handle = ComponentInstance::clone(&owned);

    assert!(handle.run_destroyed_hook());
    assert!(!owned.run_destroyed_hook());
    assert!(owned.is_destroyed());
    drop(owned);
    assert!(!handle.run_destroyed_hook());
    assert_eq!(FAREWELLS.load(Ordering::SeqCst), before + 1);
}

struct HalfBaked;

impl ComponentLibrary for HalfBaked {
    fn descriptor(&self) -> LibraryDescriptor {
        LibraryDescriptor::builder().name("half-baked").build()
    }

    fn register(&self, types: &mut ComponentTypesBuilder) -> Result<(), Error> {
        types.register(hello_info())?;
        types.register_composite(type_id("Group"), Registry::new())?;
        types.register(
            StaticComponentInfo::builder(type_id("Existing"), |_| Ok(Picky))
                .description("conflicting")
                .build()?,
        )
    }
}

#[test]
fn failed_library_registration_is_rolled_back() {
    let mut builder = ComponentTypesBuilder::new();
    builder
        .register(
            StaticComponentInfo::builder(type_id("Existing"), |_| Ok(Picky))
                .build()
                .unwrap(),
        )
        .unwrap();

    let err = builder.load_library(&HalfBaked).unwrap_err();
    assert!(matches!(err, Error::DuplicateRegistration { .. }));
    assert!(builder.contains("Existing"));
    assert!(!builder.contains("Hello"));
    assert!(!builder.contains("Group"));

    builder.load_library(&Greetings).unwrap();
    let types = builder.freeze();
    assert_eq!(types.libraries().len(), 1);
    assert_eq!(types.get("Existing").unwrap().library(), None);
}
