//! Variable access resolution for a PHP-style runtime.
//!
//! Every read, write, reference bind and unset of a variable, array element or
//! object property goes through [`vm::resolver::Resolver::resolve`], driven by
//! an [`vm::flags::AccessFlags`] bitset. Chained expressions such as
//! `$a['x']->y[] = 1` are walked by [`vm::path`].

pub mod core;
pub mod runtime;
pub mod vm;

pub use crate::core::alias::AliasRef;
pub use crate::core::value::{ArrayData, ArrayKey, Name, ObjectRef, Slot, Val};
pub use crate::runtime::config::AccessConfig;
pub use crate::vm::container::{ArrayMut, ArraySlot, Container, PropertySlot, Scope};
pub use crate::vm::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, ErrorLevel};
pub use crate::vm::flags::{AccessFlags, AccessKind, classify};
pub use crate::vm::path::AccessPath;
pub use crate::vm::resolver::{AccessError, Operand, Resolved, Resolver};
