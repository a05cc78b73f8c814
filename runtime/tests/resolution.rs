mod support;

use std::sync::Arc;

use serde_json::json;
use support::*;
use trellis_registry::{AttributeValue, ComponentAddress, MemoryArchive, Registry};
use trellis_runtime::{ContextState, Error};

fn address(s: &str) -> ComponentAddress {
    s.parse().unwrap()
}

#[test]
fn adder_reflects_the_live_counter() {
    let (mut session, _) = session(counter_adder());

    assert_eq!(number(&mut session, "Y"), 5);
    assert_eq!(
        session.creation_order(),
        vec![address("/X"), address("/Y")]
    );

    let counter = session.resolve("X").unwrap().downcast::<Counter>().unwrap();
    counter.set(10);
    assert_eq!(number(&mut session, "Y"), 15);
}

#[test]
fn resolving_twice_returns_the_same_instance() {
    let (mut session, journal) = session(counter_adder());

    let first = session.resolve("Y").unwrap();
    let second = session.resolve("./Y").unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(journal.count("created /Y"), 1);
    assert_eq!(session.state(&address("/Y")), Some(ContextState::Created));
}

#[test]
fn missing_required_attribute_fails_but_nullable_binds_none() {
    let mut registry = Registry::new();
    add(&mut registry, "Y", "Adder");
    add(&mut registry, "O", "Optional");
    let (mut session, _) = session(registry);

    let err = session.resolve("Y").unwrap_err();
    assert!(
        matches!(&err, Error::MissingAttribute { attribute, .. } if attribute == "left"),
        "{err}"
    );
    assert_eq!(session.state(&address("/Y")), Some(ContextState::Unbound));

    let optional = session.resolve("O").unwrap().downcast::<Optional>().unwrap();
    assert!(optional.peer.is_none());
}

#[test]
fn reference_cycles_are_detected_from_either_side() {
    let mut registry = Registry::new();
    add(&mut registry, "A", "Adder");
    add(&mut registry, "B", "Adder");
    set(&mut registry, "A", "left", reference("B"));
    set(&mut registry, "B", "left", reference("A"));
    let (mut session, _) = session(registry);

    let Error::CyclicDependency { cycle } = session.resolve("A").unwrap_err() else {
        panic!("expected a cycle");
    };
    assert_eq!(cycle, vec![address("/A"), address("/B"), address("/A")]);

    let err = session.resolve("B").unwrap_err();
    assert!(matches!(err, Error::CyclicDependency { .. }), "{err}");
    assert!(err.to_string().contains("/B -> /A -> /B"));

    assert_eq!(session.state(&address("/A")), Some(ContextState::Unbound));
    assert_eq!(session.state(&address("/B")), Some(ContextState::Unbound));
    assert!(session.creation_order().is_empty());
}

#[test]
fn shared_dependency_is_constructed_once() {
    let mut registry = Registry::new();
    add(&mut registry, "Z", "Counter");
    add(&mut registry, "P", "Adder");
    add(&mut registry, "Q", "Adder");
    set(&mut registry, "Z", "start", AttributeValue::literal(1));
    set(&mut registry, "P", "left", reference("Z"));
    set(&mut registry, "Q", "left", reference("Z"));
    set(&mut registry, "Q", "right", AttributeValue::literal(2));
    let (mut session, journal) = session(registry);

    assert_eq!(number(&mut session, "P"), 1);
    assert_eq!(number(&mut session, "Q"), 3);
    assert_eq!(journal.count("created /Z"), 1);
}

#[test]
fn removed_reference_target_is_unresolved() {
    let mut registry = counter_adder();
    registry.remove_element("X").unwrap();
    let (mut session, _) = session(registry);

    let err = session.resolve("Y").unwrap_err();
    assert!(
        matches!(&err, Error::UnresolvedReference { path, .. } if path == "X"),
        "{err}"
    );
}

#[test]
fn declaration_order_does_not_drive_resolution() {
    let mut registry = Registry::new();
    add(&mut registry, "A", "Adder");
    add(&mut registry, "B", "Adder");
    add(&mut registry, "C", "Counter");
    set(&mut registry, "A", "left", reference("B"));
    set(&mut registry, "B", "left", reference("C"));
    let (mut session, _) = session(registry);

    session.resolve_all().unwrap();
    assert_eq!(
        session.creation_order(),
        vec![address("/C"), address("/B"), address("/A")]
    );
}

#[test]
fn undeclared_attributes_are_rejected_at_resolution() {
    let mut registry = counter_adder();
    set(&mut registry, "Y", "bogus", AttributeValue::literal(true));
    let (mut session, _) = session(registry);

    let err = session.resolve("Y").unwrap_err();
    assert!(
        matches!(&err, Error::UnknownAttribute { attribute, .. } if attribute == "bogus"),
        "{err}"
    );
}

#[test]
fn unregistered_types_and_wrong_literals_are_reported() {
    let mut registry = counter_adder();
    add(&mut registry, "Ghost", "Nowhere");
    set(&mut registry, "Y", "right", AttributeValue::literal("five"));
    let (mut session, _) = session(registry);

    assert!(matches!(
        session.resolve("Ghost"),
        Err(Error::UnknownComponentType { .. })
    ));
    assert!(matches!(
        session.resolve("Y"),
        Err(Error::AttributeType { .. })
    ));
}

#[test]
fn reference_to_wrong_interface_is_a_mismatch() {
    let mut registry = Registry::new();
    add(&mut registry, "L", "Label");
    add(&mut registry, "Y", "Adder");
    set(&mut registry, "Y", "left", reference("L"));
    let (mut session, _) = session(registry);

    let err = session.resolve("Y").unwrap_err();
    assert!(
        matches!(&err, Error::InterfaceMismatch { interface: "NumberSource", .. }),
        "{err}"
    );
    // The target itself was fine and stays created.
    assert_eq!(session.state(&address("/L")), Some(ContextState::Created));
}

#[test]
fn nullable_reference_to_wrong_interface_binds_none() {
    let mut registry = Registry::new();
    add(&mut registry, "L", "Label");
    add(&mut registry, "O", "Optional");
    set(&mut registry, "O", "peer", reference("L"));
    let (mut session, _) = session(registry);

    let optional = session.resolve("O").unwrap().downcast::<Optional>().unwrap();
    assert!(optional.peer.is_none());
}

#[test]
fn nullable_reference_to_missing_element_binds_none() {
    let mut registry = Registry::new();
    add(&mut registry, "O", "Optional");
    set(&mut registry, "O", "peer", reference("Nope"));
    let (mut session, _) = session(registry);

    let optional = session.resolve("O").unwrap().downcast::<Optional>().unwrap();
    assert!(optional.peer.is_none());
}

#[test]
fn multi_reference_keeps_registry_order_and_null_slots() {
    let mut registry = Registry::new();
    add(&mut registry, "A", "Counter");
    add(&mut registry, "B", "Counter");
    add(&mut registry, "S", "Sum");
    set(&mut registry, "A", "start", AttributeValue::literal(1));
    set(&mut registry, "B", "start", AttributeValue::literal(10));
    set(
        &mut registry,
        "S",
        "sources",
        AttributeValue::multi_reference(["B", "Missing", "A"]).unwrap(),
    );
    let (mut session, _) = session(registry);

    let sum = session.resolve("S").unwrap().downcast::<Sum>().unwrap();
    let values: Vec<Option<i64>> = sum
        .sources
        .iter()
        .map(|s| s.as_ref().map(|s| s.value()))
        .collect();
    assert_eq!(values, vec![Some(10), None, Some(1)]);
    assert_eq!(session.creation_order().len(), 3);
}

#[test]
fn unset_multi_nullable_attribute_is_an_empty_list() {
    let mut registry = Registry::new();
    add(&mut registry, "S", "Sum");
    let (mut session, _) = session(registry);

    let sum = session.resolve("S").unwrap().downcast::<Sum>().unwrap();
    assert!(sum.sources.is_empty());
}

#[test]
fn failed_creation_keeps_dependencies_cached() {
    let mut registry = Registry::new();
    add(&mut registry, "X", "Counter");
    add(&mut registry, "F", "Fragile");
    set(&mut registry, "F", "input", reference("X"));
    set(&mut registry, "F", "fail", AttributeValue::literal(true));
    let (mut session, journal) = session(registry);

    let err = session.resolve("F").unwrap_err();
    let Error::ComponentInitialization { address: failed, source, .. } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(failed, &address("/F"));
    assert_eq!(source.to_string(), "refusing to start");

    assert_eq!(session.state(&address("/F")), Some(ContextState::Unbound));
    assert_eq!(session.state(&address("/X")), Some(ContextState::Created));
    assert_eq!(session.creation_order(), vec![address("/X")]);

    session.resolve("X").unwrap();
    assert_eq!(journal.count("created /X"), 1);
}

#[test]
fn factory_attributes_create_fresh_components() {
    let mut registry = Registry::new();
    add(&mut registry, "S", "Spawner");
    set(
        &mut registry,
        "S",
        "factory",
        AttributeValue::FactoryReference(type_id("Counter")),
    );
    let (mut session, journal) = session(registry);

    let spawner = session.resolve("S").unwrap().downcast::<Spawner>().unwrap();
    let factory = spawner.factory.as_ref().unwrap();
    let first = factory.create().unwrap();
    let second = factory.create().unwrap();
    assert!(!first.ptr_eq(&second));
    assert_eq!(first.get_interface::<dyn NumberSource>().unwrap().value(), 0);

    drop(first);
    drop(second);
    assert_eq!(journal.count("destroyed /S"), 2);
}

#[test]
fn factory_of_wrong_interface_is_a_mismatch() {
    let mut registry = Registry::new();
    add(&mut registry, "S", "Spawner");
    set(
        &mut registry,
        "S",
        "factory",
        AttributeValue::FactoryReference(type_id("Label")),
    );
    let (mut session, _) = session(registry);

    assert!(matches!(
        session.resolve("S"),
        Err(Error::InterfaceMismatch { .. })
    ));
}

#[test]
fn archived_registry_resolves_like_the_original() {
    let mut original = counter_adder();
    set(&mut original, "X", "start", AttributeValue::literal(json!(7)));

    let mut writer = MemoryArchive::writer();
    original.store(&mut writer).unwrap();
    let loaded = Registry::load(&mut writer.to_reader()).unwrap();
    assert_eq!(loaded.addresses(), original.addresses());

    let types = types();
    let (mut before, _) = session_with(types.clone(), original);
    let (mut after, _) = session_with(types, loaded);
    assert_eq!(number(&mut before, "Y"), 12);
    assert_eq!(number(&mut after, "Y"), 12);
    assert_eq!(before.creation_order(), after.creation_order());
}

#[test]
fn sessions_share_frozen_types() {
    let types = types();
    let (mut a, _) = session_with(types.clone(), counter_adder());
    let (mut b, _) = session_with(types.clone(), counter_adder());

    let ya = a.resolve("Y").unwrap();
    let yb = b.resolve("Y").unwrap();
    assert!(!ya.ptr_eq(&yb));
    assert!(Arc::ptr_eq(ya.info().unwrap(), yb.info().unwrap()));
}
