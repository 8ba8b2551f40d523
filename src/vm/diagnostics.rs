//! Diagnostics
//!
//! Undefined-access notices and conversion failures are reported through a
//! [`DiagnosticSink`]. Reporting never fails and never changes what the
//! resolver returns. The [`Diagnostics`] dispatcher applies the caller's
//! `error_reporting` mask and remembers the last diagnostic the way
//! `error_get_last()` does, whether or not the level is enabled.
//!
//! Reference: $PHP_SRC_PATH/Zend/zend.c - zend_error

use crate::core::value::{ArrayKey, Name};
use std::fmt;
use std::io::{self, Write};

/// PHP error levels matching Zend constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
    Notice,     // E_NOTICE
    Warning,    // E_WARNING
    Error,      // E_ERROR
    Deprecated, // E_DEPRECATED
}

impl ErrorLevel {
    /// Convert error level to the corresponding bitmask value
    pub fn to_bitmask(self) -> u32 {
        match self {
            ErrorLevel::Error => 1,         // E_ERROR
            ErrorLevel::Warning => 2,       // E_WARNING
            ErrorLevel::Notice => 8,        // E_NOTICE
            ErrorLevel::Deprecated => 8192, // E_DEPRECATED
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ErrorLevel::Notice => "Notice",
            ErrorLevel::Warning => "Warning",
            ErrorLevel::Error => "Error",
            ErrorLevel::Deprecated => "Deprecated",
        }
    }
}

/// Which storage location an access targeted.
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    Variable(Name),
    Index(ArrayKey),
    /// `$a[]`; the key does not exist until the slot is written.
    Append,
    Property { class: Name, name: Name },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticKind {
    UndefinedVariable,
    UndefinedIndex,
    UndefinedProperty,
    /// An Ensure request met a value it may not convert.
    InvalidConversion {
        from: &'static str,
        to: &'static str,
    },
    /// `$a[]` when the next integer key is already taken.
    NextElementOccupied,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub location: Location,
}

impl Diagnostic {
    /// The undefined-access notice matching the kind of location.
    pub fn undefined(location: Location) -> Self {
        let kind = match location {
            Location::Variable(_) => DiagnosticKind::UndefinedVariable,
            Location::Index(_) | Location::Append => DiagnosticKind::UndefinedIndex,
            Location::Property { .. } => DiagnosticKind::UndefinedProperty,
        };
        Diagnostic { kind, location }
    }

    pub fn invalid_conversion(location: Location, from: &'static str, to: &'static str) -> Self {
        Diagnostic {
            kind: DiagnosticKind::InvalidConversion { from, to },
            location,
        }
    }

    pub fn next_element_occupied() -> Self {
        Diagnostic {
            kind: DiagnosticKind::NextElementOccupied,
            location: Location::Append,
        }
    }

    /// PHP 8 raises undefined accesses as warnings; a refused conversion is an
    /// error that the engine recovers from.
    pub fn level(&self) -> ErrorLevel {
        match self.kind {
            DiagnosticKind::InvalidConversion { .. } | DiagnosticKind::NextElementOccupied => {
                ErrorLevel::Error
            }
            _ => ErrorLevel::Warning,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.location) {
            (DiagnosticKind::InvalidConversion { from, to: "array" }, _) => {
                write!(f, "Cannot use a scalar value of type {} as an array", from)
            }
            (DiagnosticKind::InvalidConversion { from, to }, Location::Property { name, .. }) => {
                write!(f, "Cannot convert {} to {} in property \"{}\"", from, to, name)
            }
            (DiagnosticKind::InvalidConversion { from, to }, _) => {
                write!(f, "Cannot convert {} to {}", from, to)
            }
            (DiagnosticKind::NextElementOccupied, _) => write!(
                f,
                "Cannot add element to the array as the next element is already occupied"
            ),
            (_, Location::Variable(name)) => write!(f, "Undefined variable ${}", name),
            (_, Location::Index(key)) => write!(f, "Undefined array key {}", key),
            (_, Location::Append) => write!(f, "Cannot use [] for reading"),
            (_, Location::Property { class, name }) => {
                write!(f, "Undefined property: {}::${}", class, name)
            }
        }
    }
}

pub trait DiagnosticSink {
    /// Report a diagnostic. Must not panic or fail.
    fn report(&mut self, level: ErrorLevel, diagnostic: &Diagnostic);
}

/// Default sink that writes to stderr
pub struct StderrSink {
    stderr: io::Stderr,
}

impl Default for StderrSink {
    fn default() -> Self {
        Self {
            stderr: io::stderr(),
        }
    }
}

impl DiagnosticSink for StderrSink {
    fn report(&mut self, level: ErrorLevel, diagnostic: &Diagnostic) {
        let _ = writeln!(self.stderr, "{}: {}", level.label(), diagnostic);
        let _ = self.stderr.flush();
    }
}

/// Capturing sink for tests and embedding hosts
pub struct CapturingSink<F: FnMut(ErrorLevel, &Diagnostic)> {
    callback: F,
}

impl<F: FnMut(ErrorLevel, &Diagnostic)> CapturingSink<F> {
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F: FnMut(ErrorLevel, &Diagnostic)> DiagnosticSink for CapturingSink<F> {
    fn report(&mut self, level: ErrorLevel, diagnostic: &Diagnostic) {
        (self.callback)(level, diagnostic);
    }
}

/// Per-context dispatcher in front of the sink.
pub struct Diagnostics {
    sink: Box<dyn DiagnosticSink>,
    pub last_error: Option<Diagnostic>,
    reported: usize,
}

impl Diagnostics {
    pub fn new(sink: Box<dyn DiagnosticSink>) -> Self {
        Self {
            sink,
            last_error: None,
            reported: 0,
        }
    }

    pub fn set_sink(&mut self, sink: Box<dyn DiagnosticSink>) {
        self.sink = sink;
    }

    /// Report respecting the error_reporting level. The diagnostic is kept as
    /// `last_error` even when its level is masked out.
    pub fn report(&mut self, diagnostic: Diagnostic, error_reporting: u32) {
        let level = diagnostic.level();
        if (error_reporting & level.to_bitmask()) != 0 {
            self.sink.report(level, &diagnostic);
            self.reported += 1;
        }
        self.last_error = Some(diagnostic);
    }

    /// Number of diagnostics delivered to the sink.
    pub fn reported(&self) -> usize {
        self.reported
    }
}
