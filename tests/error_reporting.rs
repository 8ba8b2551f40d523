mod common;

use common::{capturing_resolver, capturing_resolver_with, messages};
use php_access::core::value::Val;
use php_access::runtime::config::AccessConfig;
use php_access::vm::container::Scope;
use php_access::vm::diagnostics::{DiagnosticKind, ErrorLevel};
use php_access::vm::flags::{AccessFlags, AccessKind, classify};
use php_access::vm::path::AccessPath;
use php_access::vm::resolver::{AccessError, Operand};

#[test]
fn test_error_reporting_mask_filters_sink() {
    let config = AccessConfig {
        error_reporting: ErrorLevel::Error.to_bitmask(),
        ..Default::default()
    };
    let (mut resolver, seen) = capturing_resolver_with(config);
    let mut scope = Scope::new();

    assert_eq!(resolver.read_value(&mut scope.var("x")).unwrap(), Val::Null);
    assert!(seen.borrow().is_empty());
    assert_eq!(resolver.diagnostics.reported(), 0);
    assert_eq!(
        resolver.diagnostics.last_error.as_ref().map(|d| d.kind.clone()),
        Some(DiagnosticKind::UndefinedVariable)
    );

    resolver.write(&mut scope.var("x"), Val::Int(1)).unwrap();
    assert!(resolver.ensure_array(&mut scope.var("x")).unwrap().is_none());
    assert_eq!(
        messages(&seen),
        vec!["Error: Cannot use a scalar value of type int as an array"]
    );
}

#[test]
fn test_error_reporting_can_be_changed_at_runtime() {
    let (mut resolver, seen) = capturing_resolver();
    let mut scope = Scope::new();
    resolver.config.error_reporting = 0;
    resolver.read_value(&mut scope.var("x")).unwrap();
    assert!(seen.borrow().is_empty());

    resolver.config.error_reporting = ErrorLevel::Warning.to_bitmask();
    resolver.read_value(&mut scope.var("x")).unwrap();
    assert_eq!(messages(&seen), vec!["Warning: Undefined variable $x"]);
}

#[test]
fn test_autovivify_class_from_config() {
    let config: AccessConfig = serde_json::from_str(r#"{"autovivify_class": "Bag"}"#).unwrap();
    let (mut resolver, _) = capturing_resolver_with(config);
    let mut scope = Scope::new();

    assert!(resolver
        .assign_path(&mut scope, &AccessPath::var("o").prop("p"), Val::Int(1))
        .unwrap());
    let Some(Val::Object(obj)) = scope.value("o") else {
        panic!("Expected $o to be an object");
    };
    assert_eq!(&*obj.class(), "Bag");
}

#[test]
fn test_mixed_flags_are_rejected_before_touching_storage() {
    let (mut resolver, seen) = capturing_resolver();
    let mut scope = Scope::new();
    let flags = AccessFlags::WRITE_VALUE | AccessFlags::ENSURE_ARRAY;

    assert!(classify(flags).is_err());
    let err = resolver
        .resolve(&mut scope.var("x"), flags, Operand::Value(Val::Int(1)))
        .unwrap_err();
    assert!(matches!(err, AccessError::MixedAccess(f) if f == flags));
    assert!(!scope.contains("x"));
    assert!(seen.borrow().is_empty());
}

#[test]
fn test_conflicting_writes_are_rejected() {
    let (mut resolver, _) = capturing_resolver();
    let mut scope = Scope::new();
    resolver.write(&mut scope.var("x"), Val::Int(1)).unwrap();

    let err = resolver
        .resolve(
            &mut scope.var("x"),
            AccessFlags::UNSET | AccessFlags::WRITE_VALUE,
            Operand::None,
        )
        .unwrap_err();
    assert!(matches!(err, AccessError::ConflictingWrites(_)));
    assert_eq!(scope.value("x"), Some(Val::Int(1)));
}

#[test]
fn test_classify_every_single_bit() {
    for bit in 0..8u8 {
        let flags = AccessFlags::from_bits(1 << bit);
        let expected = if flags == AccessFlags::UNSET {
            AccessKind::Unset
        } else if AccessFlags::WRITE_MASK.contains(flags) {
            AccessKind::Write
        } else {
            AccessKind::Read
        };
        assert_eq!(classify(flags).unwrap(), expected, "{:?}", flags);
    }
}
