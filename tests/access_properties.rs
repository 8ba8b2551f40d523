mod common;

use common::{array_len, capturing_resolver, messages};
use php_access::core::alias::AliasRef;
use php_access::core::value::{ArrayData, ArrayKey, ObjectRef, Val};
use php_access::vm::container::{ArrayMut, ArraySlot, Container, PropertySlot, Scope};
use php_access::vm::diagnostics::DiagnosticKind;
use php_access::vm::flags::AccessFlags;
use php_access::vm::path::AccessPath;
use php_access::vm::resolver::{AccessError, Operand, Resolved, Resolver};
use std::rc::Rc;

#[test]
fn test_write_then_read_round_trips() {
    let (mut resolver, seen) = capturing_resolver();
    let mut scope = Scope::new();

    for val in [
        Val::Int(7),
        Val::Float(1.5),
        Val::string("hello"),
        Val::Bool(false),
        Val::Null,
        Val::from(ArrayData::from_iter([("k", 1i64)])),
    ] {
        resolver.write(&mut scope.var("v"), val.clone()).unwrap();
        assert_eq!(resolver.read_value(&mut scope.var("v")).unwrap(), val);
    }
    assert!(seen.borrow().is_empty());
}

#[test]
fn test_array_copy_is_separated_on_write() {
    let (mut resolver, _) = capturing_resolver();
    let mut scope = Scope::new();
    let arr = Val::from(ArrayData::from_iter([(0i64, 1i64)]));
    resolver.write(&mut scope.var("a"), arr).unwrap();

    // $b = $a
    let copy = resolver.read_value(&mut scope.var("a")).unwrap();
    resolver.write(&mut scope.var("b"), copy).unwrap();

    // $b[1] = 2
    {
        let mut b = scope.var("b");
        let mut data = resolver.ensure_array(&mut b).unwrap().unwrap();
        resolver
            .write(&mut ArraySlot::new(&mut data, 1i64), Val::Int(2))
            .unwrap();
    }

    assert_eq!(array_len(scope.value("a")), 1);
    assert_eq!(array_len(scope.value("b")), 2);
}

#[test]
fn test_objects_are_shared_not_copied() {
    let (mut resolver, _) = capturing_resolver();
    let mut scope = Scope::new();
    let obj = ObjectRef::new("Point");
    resolver.write(&mut scope.var("a"), Val::Object(obj.clone())).unwrap();

    let copy = resolver.read_value(&mut scope.var("a")).unwrap();
    resolver.write(&mut scope.var("b"), copy).unwrap();
    let b = resolver.ensure_object(&mut scope.var("b")).unwrap().unwrap();
    resolver
        .write(&mut PropertySlot::new(b, "x"), Val::Int(3))
        .unwrap();

    assert_eq!(obj.property("x"), Some(Val::Int(3)));
}

fn unset_then_read(resolver: &mut Resolver, container: &mut dyn Container) {
    resolver.unset(container).unwrap();
    assert!(!resolver.isset(container).unwrap());
    assert_eq!(resolver.read_value(container).unwrap(), Val::Null);
}

#[test]
fn test_unset_then_isset_and_read_on_every_container() {
    let (mut resolver, seen) = capturing_resolver();

    let mut scope = Scope::new();
    resolver.write(&mut scope.var("x"), Val::Int(1)).unwrap();
    unset_then_read(&mut resolver, &mut scope.var("x"));

    let mut rc = Rc::new(ArrayData::from_iter([("k", 1i64)]));
    let mut arr = ArrayMut::from(&mut rc);
    unset_then_read(&mut resolver, &mut ArraySlot::new(&mut arr, "k"));

    let obj = ObjectRef::new("Point");
    obj.set_property("p", Val::Int(1));
    unset_then_read(&mut resolver, &mut PropertySlot::new(obj, "p"));

    assert_eq!(
        messages(&seen),
        vec![
            "Warning: Undefined variable $x",
            "Warning: Undefined array key \"k\"",
            "Warning: Undefined property: Point::$p",
        ]
    );
}

#[test]
fn test_unset_is_idempotent() {
    let (mut resolver, seen) = capturing_resolver();
    let mut scope = Scope::new();
    resolver.unset(&mut scope.var("never")).unwrap();
    resolver.unset(&mut scope.var("never")).unwrap();
    assert!(!scope.contains("never"));
    assert!(seen.borrow().is_empty());
}

#[test]
fn test_alias_shared_visibility_survives_unset() {
    let (mut resolver, seen) = capturing_resolver();
    let mut scope = Scope::new();
    resolver.write(&mut scope.var("a"), Val::Int(1)).unwrap();

    // $b = &$a
    let cell = resolver.ensure_alias(&mut scope.var("a")).unwrap();
    resolver.bind(&mut scope.var("b"), cell).unwrap();

    resolver.write(&mut scope.var("a"), Val::Int(10)).unwrap();
    assert_eq!(resolver.read_value(&mut scope.var("b")).unwrap(), Val::Int(10));

    resolver.unset(&mut scope.var("a")).unwrap();
    assert_eq!(resolver.read_value(&mut scope.var("b")).unwrap(), Val::Int(10));
    let held = scope.alias_of("b").unwrap();
    assert_eq!(held.holders(), 2);
    drop(held);

    // $a is a fresh variable now; writing it must not reach $b.
    resolver.write(&mut scope.var("a"), Val::Int(0)).unwrap();
    assert_eq!(scope.value("b"), Some(Val::Int(10)));
    assert!(seen.borrow().is_empty());
}

#[test]
fn test_write_alias_releases_previous_cell() {
    let (mut resolver, _) = capturing_resolver();
    let mut scope = Scope::new();
    let first = resolver.ensure_alias(&mut scope.var("a")).unwrap();
    assert_eq!(first.holders(), 2);

    let other = resolver.ensure_alias(&mut scope.var("c")).unwrap();
    resolver.bind(&mut scope.var("a"), other.clone()).unwrap();

    assert_eq!(first.holders(), 1);
    assert!(scope.alias_of("a").unwrap().ptr_eq(&other));
}

#[test]
fn test_ensure_array_is_idempotent() {
    let (mut resolver, seen) = capturing_resolver();
    let mut scope = Scope::new();
    {
        let mut var = scope.var("a");
        let mut first = resolver.ensure_array(&mut var).unwrap().unwrap();
        resolver
            .write(&mut ArraySlot::new(&mut first, "k"), Val::Int(1))
            .unwrap();
    }
    {
        let mut var = scope.var("a");
        let mut second = resolver.ensure_array(&mut var).unwrap().unwrap();
        assert_eq!(second.len().unwrap(), 1);
        assert_eq!(
            resolver
                .read_value(&mut ArraySlot::new(&mut second, "k"))
                .unwrap(),
            Val::Int(1)
        );
    }
    assert!(seen.borrow().is_empty());
}

#[test]
fn test_ensure_object_is_idempotent() {
    let (mut resolver, _) = capturing_resolver();
    let mut scope = Scope::new();
    let first = resolver.ensure_object(&mut scope.var("o")).unwrap().unwrap();
    let second = resolver.ensure_object(&mut scope.var("o")).unwrap().unwrap();
    assert!(first.ptr_eq(&second));
}

#[test]
fn test_ensure_object_on_int_leaves_value() {
    let (mut resolver, seen) = capturing_resolver();
    let mut scope = Scope::new();
    resolver.write(&mut scope.var("c"), Val::Int(5)).unwrap();

    assert!(resolver.ensure_object(&mut scope.var("c")).unwrap().is_none());
    assert_eq!(scope.value("c"), Some(Val::Int(5)));
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(
        seen.borrow()[0].1.kind,
        DiagnosticKind::InvalidConversion {
            from: "int",
            to: "object"
        }
    );
}

#[test]
fn test_ensure_array_on_string_leaves_value() {
    let (mut resolver, seen) = capturing_resolver();
    let mut scope = Scope::new();
    resolver.write(&mut scope.var("s"), Val::string("abc")).unwrap();

    assert!(resolver.ensure_array(&mut scope.var("s")).unwrap().is_none());
    assert_eq!(scope.value("s"), Some(Val::string("abc")));
    assert_eq!(
        messages(&seen),
        vec!["Error: Cannot use a scalar value of type string as an array"]
    );
}

#[test]
fn test_undefined_variable_scenario() {
    let (mut resolver, seen) = capturing_resolver();
    let mut scope = Scope::new();

    assert!(matches!(
        resolver
            .resolve(&mut scope.var("x"), AccessFlags::ISSET, Operand::None)
            .unwrap(),
        Resolved::Isset(false)
    ));
    assert!(matches!(
        resolver
            .resolve(&mut scope.var("x"), AccessFlags::CHECK_ONLY, Operand::None)
            .unwrap(),
        Resolved::Value(Val::Null)
    ));
    assert!(seen.borrow().is_empty());

    assert!(matches!(
        resolver
            .resolve(&mut scope.var("x"), AccessFlags::DEFAULT, Operand::None)
            .unwrap(),
        Resolved::Value(Val::Null)
    ));
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(seen.borrow()[0].1.kind, DiagnosticKind::UndefinedVariable);

    resolver
        .resolve(
            &mut scope.var("x"),
            AccessFlags::WRITE_VALUE,
            Operand::Value(Val::Int(42)),
        )
        .unwrap();
    assert!(resolver.isset(&mut scope.var("x")).unwrap());
    assert_eq!(resolver.read_value(&mut scope.var("x")).unwrap(), Val::Int(42));
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn test_ensure_alias_wins_over_other_ensure_bits() {
    let (mut resolver, seen) = capturing_resolver();
    let mut scope = Scope::new();
    let all = AccessFlags::ENSURE_ALIAS | AccessFlags::ENSURE_OBJECT | AccessFlags::ENSURE_ARRAY;
    assert!(matches!(
        resolver.resolve(&mut scope.var("x"), all, Operand::None).unwrap(),
        Resolved::Alias(_)
    ));
    assert_eq!(scope.value("x"), Some(Val::Null));
    assert!(scope.alias_of("x").is_some());
    assert!(seen.borrow().is_empty());
}

#[test]
fn test_ensure_object_wins_over_ensure_array() {
    let (mut resolver, _) = capturing_resolver();
    let mut scope = Scope::new();
    assert!(matches!(
        resolver
            .resolve(
                &mut scope.var("x"),
                AccessFlags::ENSURE_OBJECT | AccessFlags::ENSURE_ARRAY,
                Operand::None,
            )
            .unwrap(),
        Resolved::Object(_)
    ));
}

#[test]
fn test_isset_reads_through_alias() {
    let (mut resolver, _) = capturing_resolver();
    let mut scope = Scope::new();
    let cell = resolver.ensure_alias(&mut scope.var("a")).unwrap();
    assert!(!resolver.isset(&mut scope.var("a")).unwrap());
    cell.set(Val::Int(1));
    assert!(resolver.isset(&mut scope.var("a")).unwrap());
}

#[test]
fn test_array_element_alias_keeps_key_order() {
    let (mut resolver, _) = capturing_resolver();
    let mut rc = Rc::new(ArrayData::from_iter([("a", 1i64), ("b", 2i64)]));
    let mut arr = ArrayMut::from(&mut rc);
    let cell = resolver.ensure_alias(&mut ArraySlot::new(&mut arr, "a")).unwrap();
    cell.set(Val::Int(9));
    drop(arr);

    let keys: Vec<ArrayKey> = rc.map.keys().cloned().collect();
    assert_eq!(keys, vec![ArrayKey::from("a"), ArrayKey::from("b")]);
    assert_eq!(rc.get(&ArrayKey::from("a")), Some(Val::Int(9)));
}

#[test]
fn test_nested_array_handle_leaves_shared_cell_readable() {
    let (mut resolver, seen) = capturing_resolver();
    let mut first = Scope::new();
    let mut second = Scope::new();
    let shared = ArrayData::from_iter([("inner", Val::empty_array())]);
    let cell = AliasRef::new(Val::from(shared));
    resolver.bind(&mut first.var("a"), cell.clone()).unwrap();
    resolver.bind(&mut second.var("b"), cell).unwrap();

    let mut a = first.var("a");
    let mut outer = resolver.ensure_array(&mut a).unwrap().unwrap();
    let mut inner_slot = ArraySlot::new(&mut outer, "inner");
    let mut inner = resolver.ensure_array(&mut inner_slot).unwrap().unwrap();

    // $a['inner'][$b['k']] = 1: $b is read while the write handle is alive.
    let before = resolver.read_quiet(&mut second.var("b")).unwrap();
    resolver
        .write(&mut ArraySlot::new(&mut inner, "k"), Val::Int(1))
        .unwrap();

    let b_inner_k = AccessPath::var("b").index("inner").index("k");
    assert_eq!(resolver.fetch_path(&mut second, &b_inner_k).unwrap(), Val::Int(1));
    match before {
        Val::Array(arr) => assert_eq!(array_len(arr.get(&ArrayKey::from("inner"))), 0),
        other => panic!("Expected $b to be an array, got {:?}", other),
    }
    assert!(seen.borrow().is_empty());
}

#[test]
fn test_read_of_locked_cell_is_an_error() {
    let (mut resolver, _) = capturing_resolver();
    let mut scope = Scope::new();
    let cell = AliasRef::new(Val::from(ArrayData::from_iter([("k", 1i64)])));
    resolver.bind(&mut scope.var("b"), cell.clone()).unwrap();

    let mut arr = ArrayMut::aliased(cell);
    let mut element = ArraySlot::new(&mut arr, "k");
    let held = element.slot_mut().unwrap();
    assert!(matches!(
        resolver.read_quiet(&mut scope.var("b")),
        Err(AccessError::AliasBorrowed)
    ));
    assert!(matches!(
        resolver.isset(&mut scope.var("b")),
        Err(AccessError::AliasBorrowed)
    ));
    drop(held);
    assert_eq!(array_len(scope.value("b")), 1);
}
