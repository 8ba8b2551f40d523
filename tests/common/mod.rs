//! Common test helpers for access tests
//!
//! Every helper builds a [`Resolver`] whose diagnostics land in a shared
//! vector instead of stderr, so tests can assert on exactly what was reported.

#![allow(dead_code)]

use php_access::core::value::Val;
use php_access::runtime::config::AccessConfig;
use php_access::vm::diagnostics::{CapturingSink, Diagnostic, ErrorLevel};
use php_access::vm::resolver::Resolver;
use std::cell::RefCell;
use std::rc::Rc;

pub type Seen = Rc<RefCell<Vec<(ErrorLevel, Diagnostic)>>>;

/// Resolver with default configuration and a capturing sink.
pub fn capturing_resolver() -> (Resolver, Seen) {
    capturing_resolver_with(AccessConfig::default())
}

pub fn capturing_resolver_with(config: AccessConfig) -> (Resolver, Seen) {
    let seen: Seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    let sink = CapturingSink::new(move |level: ErrorLevel, d: &Diagnostic| {
        seen_clone.borrow_mut().push((level, d.clone()));
    });
    (Resolver::with_sink(config, Box::new(sink)), seen)
}

/// Rendered messages in report order, `"Warning: Undefined variable $x"` style.
pub fn messages(seen: &Seen) -> Vec<String> {
    seen.borrow()
        .iter()
        .map(|(level, d)| format!("{}: {}", level.label(), d))
        .collect()
}

/// Element count of an array value; panics on anything else.
pub fn array_len(val: Option<Val>) -> usize {
    match val {
        Some(Val::Array(arr)) => arr.len(),
        other => panic!("Expected array, got {:?}", other),
    }
}
