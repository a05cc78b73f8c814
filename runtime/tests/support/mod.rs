#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicI64, Ordering},
};

use trellis_component::{
    AttributeDescriptor, AttributeFlags, BoxError, Component, ComponentFactory,
    ComponentTypes, ComponentTypesBuilder, CreationContext, Environment, StaticComponentInfo,
    ValueType, declare_interface,
};
use trellis_registry::{AttributeValue, ComponentTypeId, ElementName, Registry};
use trellis_runtime::Session;

pub trait NumberSource: Send + Sync {
    fn value(&self) -> i64;
}
declare_interface!(NumberSource);

pub trait Labeled: Send + Sync {
    fn label(&self) -> String;
}
declare_interface!(Labeled);

/// Records lifecycle events of every component in a session.
#[derive(Debug, Default)]
pub struct Journal(Mutex<Vec<String>>);

impl Journal {
    pub fn record(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }
}

struct Tracker {
    journal: Option<Arc<Journal>>,
    address: String,
}

impl Tracker {
    fn new(ctx: &CreationContext<'_>) -> Self {
        Self {
            journal: ctx.environment().get_service::<Journal>("journal"),
            address: ctx.address().to_string(),
        }
    }

    fn record(&self, event: &str) {
        if let Some(journal) = &self.journal {
            journal.record(format!("{event} {}", self.address));
        }
    }
}

pub struct Counter {
    tracker: Tracker,
    value: AtomicI64,
}

impl Counter {
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::SeqCst);
    }
}

impl NumberSource for Counter {
    fn value(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }
}

impl Component for Counter {
    fn on_created(&self) -> Result<(), BoxError> {
        self.tracker.record("created");
        Ok(())
    }

    fn on_destroyed(&self) {
        self.tracker.record("destroyed");
    }
}

pub struct Adder {
    tracker: Tracker,
    left: Arc<dyn NumberSource>,
    right: i64,
}

impl NumberSource for Adder {
    fn value(&self) -> i64 {
        self.left.value() + self.right
    }
}

impl Component for Adder {
    fn on_created(&self) -> Result<(), BoxError> {
        self.tracker.record("created");
        Ok(())
    }

    fn on_destroyed(&self) {
        self.tracker.record("destroyed");
    }
}

/// Sums every bound source; unbound slots count as zero.
pub struct Sum {
    tracker: Tracker,
    pub sources: Vec<Option<Arc<dyn NumberSource>>>,
}

impl NumberSource for Sum {
    fn value(&self) -> i64 {
        self.sources.iter().flatten().map(|s| s.value()).sum()
    }
}

impl Component for Sum {
    fn on_created(&self) -> Result<(), BoxError> {
        self.tracker.record("created");
        Ok(())
    }
}

pub struct Optional {
    pub peer: Option<Arc<dyn NumberSource>>,
}

impl Component for Optional {}

pub struct Label {
    text: String,
}

impl Labeled for Label {
    fn label(&self) -> String {
        self.text.clone()
    }
}

impl Component for Label {}

/// Fails its creation hook when `fail` is set.
pub struct Fragile {
    tracker: Tracker,
    fail: bool,
}

impl Component for Fragile {
    fn on_created(&self) -> Result<(), BoxError> {
        if self.fail {
            return Err("refusing to start".into());
        }
        self.tracker.record("created");
        Ok(())
    }
}

pub struct Spawner {
    pub factory: Option<ComponentFactory>,
}

impl Component for Spawner {}

pub fn name(s: &str) -> ElementName {
    ElementName::new(s).unwrap()
}

pub fn type_id(s: &str) -> ComponentTypeId {
    ComponentTypeId::new(s).unwrap()
}

pub fn types_builder() -> ComponentTypesBuilder {
    let mut types = ComponentTypesBuilder::new();

    types
        .register(
            StaticComponentInfo::builder(type_id("Counter"), |ctx| {
                Ok(Counter {
                    tracker: Tracker::new(ctx),
                    value: AtomicI64::new(ctx.required("start")?),
                })
            })
            .attribute(AttributeDescriptor::value("start", ValueType::Integer).with_default(0))
            .interface::<dyn NumberSource>(|c| c)
            .build()
            .unwrap(),
        )
        .unwrap();

    types
        .register(
            StaticComponentInfo::builder(type_id("Adder"), |ctx| {
                let left = ctx
                    .reference::<dyn NumberSource>("left")?
                    .ok_or("left is unbound")?;
                Ok(Adder {
                    tracker: Tracker::new(ctx),
                    left,
                    right: ctx.required("right")?,
                })
            })
            .attribute(AttributeDescriptor::reference::<dyn NumberSource>("left"))
            .attribute(AttributeDescriptor::value("right", ValueType::Integer).with_default(0))
            .interface::<dyn NumberSource>(|c| c)
            .build()
            .unwrap(),
        )
        .unwrap();

    types
        .register(
            StaticComponentInfo::builder(type_id("Sum"), |ctx| {
                Ok(Sum {
                    tracker: Tracker::new(ctx),
                    sources: ctx.references::<dyn NumberSource>("sources")?,
                })
            })
            .attribute(
                AttributeDescriptor::reference::<dyn NumberSource>("sources")
                    .with_flags(AttributeFlags::MULTI | AttributeFlags::NULLABLE),
            )
            .interface::<dyn NumberSource>(|c| c)
            .build()
            .unwrap(),
        )
        .unwrap();

    types
        .register(
            StaticComponentInfo::builder(type_id("Optional"), |ctx| {
                Ok(Optional {
                    peer: ctx.reference::<dyn NumberSource>("peer")?,
                })
            })
            .attribute(
                AttributeDescriptor::reference::<dyn NumberSource>("peer")
                    .with_flags(AttributeFlags::NULLABLE),
            )
            .build()
            .unwrap(),
        )
        .unwrap();

    types
        .register(
            StaticComponentInfo::builder(type_id("Label"), |ctx| {
                Ok(Label {
                    text: ctx.required("text")?,
                })
            })
            .attribute(AttributeDescriptor::value("text", ValueType::String).with_default("label"))
            .interface::<dyn Labeled>(|c| c)
            .build()
            .unwrap(),
        )
        .unwrap();

    types
        .register(
            StaticComponentInfo::builder(type_id("Fragile"), |ctx| {
                ctx.reference::<dyn NumberSource>("input")?;
                Ok(Fragile {
                    tracker: Tracker::new(ctx),
                    fail: ctx.required("fail")?,
                })
            })
            .attribute(AttributeDescriptor::reference::<dyn NumberSource>("input"))
            .attribute(AttributeDescriptor::value("fail", ValueType::Bool).with_default(false))
            .build()
            .unwrap(),
        )
        .unwrap();

    types
        .register(
            StaticComponentInfo::builder(type_id("Spawner"), |ctx| {
                Ok(Spawner {
                    factory: ctx.factory("factory")?,
                })
            })
            .attribute(AttributeDescriptor::factory::<dyn NumberSource>("factory"))
            .build()
            .unwrap(),
        )
        .unwrap();

    types
}

pub fn types() -> ComponentTypes {
    types_builder().freeze()
}

pub fn add(registry: &mut Registry, element: &str, type_name: &str) {
    registry
        .add_element(name(element), type_id(type_name))
        .unwrap();
}

pub fn set(registry: &mut Registry, element: &str, attribute: &str, value: AttributeValue) {
    registry
        .set_attribute_value(element, attribute, value)
        .unwrap();
}

pub fn reference(path: &str) -> AttributeValue {
    AttributeValue::reference(path).unwrap()
}

/// Counter `X` and `Y = X + 5`.
pub fn counter_adder() -> Registry {
    let mut registry = Registry::new();
    add(&mut registry, "X", "Counter");
    add(&mut registry, "Y", "Adder");
    set(&mut registry, "Y", "left", reference("X"));
    set(&mut registry, "Y", "right", AttributeValue::literal(5));
    registry
}

pub fn session_with(types: ComponentTypes, registry: Registry) -> (Session, Arc<Journal>) {
    let journal = Arc::new(Journal::default());
    let environment = Environment::new().with("journal", Arc::clone(&journal));
    (Session::new(types, environment, registry), journal)
}

pub fn session(registry: Registry) -> (Session, Arc<Journal>) {
    session_with(types(), registry)
}

pub fn number(session: &mut Session, path: &str) -> i64 {
    session
        .resolve(path)
        .unwrap()
        .get_interface::<dyn NumberSource>()
        .unwrap()
        .value()
}
