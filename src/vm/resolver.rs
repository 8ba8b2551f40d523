//! Access resolver
//!
//! Resolves one access request against one [`Container`]. The request is an
//! [`AccessFlags`] bitset plus an optional [`Operand`] (the value for
//! WriteValue, the cell for WriteAlias). Flags are checked as a priority
//! chain: Unset, WriteAlias, WriteValue, then the read family.
//!
//! ## Read family
//!
//! | slot    | Isset   | CheckOnly | Ensure*          | plain            |
//! |---------|---------|-----------|------------------|------------------|
//! | absent  | `false` | null      | autovivify       | notice, null     |
//! | present | `!null` | value     | convert or refuse| value            |
//!
//! Ensure requests never convert a non-null value of the wrong type. The
//! resolver reports an `InvalidConversion` and returns the value untouched.
//!
//! ## Errors
//!
//! Undefined accesses and refused conversions are diagnostics, never `Err`.
//! [`AccessError`] is reserved for requests the compiler should never have
//! emitted (mixed flag groups, missing operands, capabilities the container
//! lacks) and for re-entrant borrows of the same object or alias cell.
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_execute.c` - zend_fetch_dimension_address, ZEND_FETCH_OBJ_W
//! - Zend: `$PHP_SRC_PATH/Zend/zend_execute.c` - ZEND_ASSIGN_REF, ZEND_ISSET_ISEMPTY_*

use crate::core::alias::AliasRef;
use crate::core::value::{ObjectRef, Slot, Val};
use crate::runtime::config::AccessConfig;
use crate::vm::container::{ArrayMut, Capability, Container};
use crate::vm::diagnostics::{Diagnostic, DiagnosticSink, Diagnostics, Location, StderrSink};
use crate::vm::flags::{self, AccessFlags, AccessKind, Ensure, Intent};
use std::fmt;

#[derive(Debug)]
pub enum AccessError {
    /// Read and write bits in one request
    MixedAccess(AccessFlags),
    /// More than one of WriteValue, WriteAlias, Unset
    ConflictingWrites(AccessFlags),
    /// The operand does not fit the request
    OperandMismatch {
        kind: AccessKind,
        operand: &'static str,
    },
    /// The container cannot serve this kind of access (e.g. reading `$a[]`)
    Unsupported {
        capability: Capability,
        location: Location,
    },
    /// An alias cell is already borrowed by an outstanding access
    AliasBorrowed,
    /// An object is already borrowed by an outstanding access
    ObjectBorrowed,
    /// An alias cell no longer holds the array it was resolved to
    StaleArray,
    /// `$a[]` on an array whose next integer key is already taken
    NextElementOccupied,
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessError::MixedAccess(flags) => {
                write!(f, "Read and write access requested together: {:?}", flags)
            }
            AccessError::ConflictingWrites(flags) => {
                write!(f, "Conflicting write access requested: {:?}", flags)
            }
            AccessError::OperandMismatch { kind, operand } => {
                write!(f, "{:?} access cannot take {} operand", kind, operand)
            }
            AccessError::Unsupported {
                capability,
                location,
            } => {
                write!(f, "{:?} access is not supported on {:?}", capability, location)
            }
            AccessError::AliasBorrowed => write!(f, "Reference is already in use"),
            AccessError::ObjectBorrowed => write!(f, "Object is already in use"),
            AccessError::StaleArray => write!(f, "Reference no longer holds an array"),
            AccessError::NextElementOccupied => write!(
                f,
                "Cannot add element to the array as the next element is already occupied"
            ),
        }
    }
}

impl std::error::Error for AccessError {}

/// Right-hand side of a request.
#[derive(Debug, Clone, Default)]
pub enum Operand {
    #[default]
    None,
    Value(Val),
    Alias(AliasRef),
}

impl Operand {
    fn describe(&self) -> &'static str {
        match self {
            Operand::None => "no",
            Operand::Value(_) => "a value",
            Operand::Alias(_) => "an alias",
        }
    }
}

/// Outcome of a request.
pub enum Resolved<'c> {
    Value(Val),
    /// EnsureArray: the array in place, ready for element access
    Array(ArrayMut<'c>),
    /// EnsureObject: the object, shared by identity
    Object(ObjectRef),
    /// EnsureAlias: the cell now bound to the container
    Alias(AliasRef),
    Isset(bool),
    /// Writes and unsets
    Done,
}

impl Resolved<'_> {
    /// Collapse to a plain value (arrays are returned as a shared snapshot).
    pub fn into_value(self) -> Result<Val, AccessError> {
        Ok(match self {
            Resolved::Value(v) => v,
            Resolved::Array(arr) => arr.snapshot()?,
            Resolved::Object(obj) => Val::Object(obj),
            Resolved::Alias(cell) => cell.try_get().ok_or(AccessError::AliasBorrowed)?,
            Resolved::Isset(b) => Val::Bool(b),
            Resolved::Done => Val::Null,
        })
    }
}

impl fmt::Debug for Resolved<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolved::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Resolved::Array(_) => write!(f, "Array(..)"),
            Resolved::Object(obj) => f.debug_tuple("Object").field(obj).finish(),
            Resolved::Alias(cell) => f.debug_tuple("Alias").field(cell).finish(),
            Resolved::Isset(b) => f.debug_tuple("Isset").field(b).finish(),
            Resolved::Done => write!(f, "Done"),
        }
    }
}

/// Resolver state for one execution context: configuration and the
/// diagnostics channel. `config.error_reporting` is read on every report, so
/// changing it takes effect immediately.
pub struct Resolver {
    pub config: AccessConfig,
    pub diagnostics: Diagnostics,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(AccessConfig::default())
    }
}

impl Resolver {
    /// Resolver reporting to stderr.
    pub fn new(config: AccessConfig) -> Self {
        Self::with_sink(config, Box::new(StderrSink::default()))
    }

    pub fn with_sink(config: AccessConfig, sink: Box<dyn DiagnosticSink>) -> Self {
        Self {
            config,
            diagnostics: Diagnostics::new(sink),
        }
    }

    pub(crate) fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics
            .report(diagnostic, self.config.error_reporting);
    }

    /// Resolve one request against `container`.
    pub fn resolve<'c, C: Container + ?Sized>(
        &mut self,
        container: &'c mut C,
        flags: AccessFlags,
        operand: Operand,
    ) -> Result<Resolved<'c>, AccessError> {
        let intent = flags::intent(flags)?;
        let resolved = match (intent, operand) {
            (Intent::Unset, Operand::None) => {
                require(&*container, Capability::Unset)?;
                // Dropping the slot releases its alias cell if this was the last holder.
                container.remove()?;
                Ok(Resolved::Done)
            }
            (Intent::WriteAlias, Operand::Alias(cell)) => {
                require(&*container, Capability::Alias)?;
                bind(container, cell)?;
                Ok(Resolved::Done)
            }
            (Intent::WriteValue, Operand::Value(val)) => {
                require(&*container, Capability::Write)?;
                assign(container, val)?;
                Ok(Resolved::Done)
            }
            (
                Intent::Read {
                    ensure,
                    quiet,
                    isset,
                },
                Operand::None,
            ) => self.read(container, ensure, quiet, isset),
            (intent, operand) => Err(AccessError::OperandMismatch {
                kind: intent.kind(),
                operand: operand.describe(),
            }),
        };
        match resolved {
            // Nothing was stored; PHP raises this as a recoverable Error.
            Err(AccessError::NextElementOccupied) => {
                self.report(Diagnostic::next_element_occupied());
                Ok(Resolved::Value(Val::Null))
            }
            other => other,
        }
    }

    fn read<'c, C: Container + ?Sized>(
        &mut self,
        container: &'c mut C,
        ensure: Option<Ensure>,
        quiet: bool,
        isset: bool,
    ) -> Result<Resolved<'c>, AccessError> {
        match ensure {
            Some(Ensure::Alias) => require(&*container, Capability::Alias)?,
            Some(_) => require(&*container, Capability::Write)?,
            None => require(&*container, Capability::Read)?,
        }

        let Some(slot) = container.get()? else {
            if isset {
                return Ok(Resolved::Isset(false));
            }
            if quiet {
                return Ok(Resolved::Value(Val::Null));
            }
            return match ensure {
                Some(Ensure::Alias) => {
                    let cell = AliasRef::new(Val::Null);
                    container.insert(Slot::Alias(cell.clone()))?;
                    Ok(Resolved::Alias(cell))
                }
                Some(Ensure::Object) => {
                    let obj = self.new_object();
                    container.insert(Slot::Value(Val::Object(obj.clone())))?;
                    Ok(Resolved::Object(obj))
                }
                Some(Ensure::Array) => {
                    container.insert(Slot::Value(Val::empty_array()))?;
                    array_in(container)
                }
                None => {
                    self.report(Diagnostic::undefined(container.location()));
                    Ok(Resolved::Value(Val::Null))
                }
            };
        };

        if !isset && ensure == Some(Ensure::Alias) {
            return match slot {
                Slot::Alias(cell) => Ok(Resolved::Alias(cell)),
                Slot::Value(_) => promote(container).map(Resolved::Alias),
            };
        }

        let current = slot.try_get().ok_or(AccessError::AliasBorrowed)?;
        if isset {
            return Ok(Resolved::Isset(!current.is_null()));
        }

        match ensure {
            Some(Ensure::Object) => match current {
                Val::Object(obj) => Ok(Resolved::Object(obj)),
                Val::Null => {
                    let obj = self.new_object();
                    assign(container, Val::Object(obj.clone()))?;
                    Ok(Resolved::Object(obj))
                }
                other => Ok(self.refuse(container.location(), other, "object")),
            },
            Some(Ensure::Array) => match current {
                Val::Array(_) => array_in(container),
                Val::Null => {
                    assign(container, Val::empty_array())?;
                    array_in(container)
                }
                other => Ok(self.refuse(container.location(), other, "array")),
            },
            // Arrays come back as a shared Rc; the receiver separates on its first write.
            Some(Ensure::Alias) | None => Ok(Resolved::Value(current)),
        }
    }

    fn refuse<'c>(&mut self, location: Location, val: Val, to: &'static str) -> Resolved<'c> {
        self.report(Diagnostic::invalid_conversion(location, val.type_name(), to));
        Resolved::Value(val)
    }

    fn new_object(&self) -> ObjectRef {
        ObjectRef::new(self.config.autovivify_class_name())
    }

    /// Plain read; reports a notice when undefined.
    pub fn read_value<C: Container + ?Sized>(&mut self, container: &mut C) -> Result<Val, AccessError> {
        self.resolve(container, AccessFlags::DEFAULT, Operand::None)?
            .into_value()
    }

    /// Read without notices.
    pub fn read_quiet<C: Container + ?Sized>(&mut self, container: &mut C) -> Result<Val, AccessError> {
        self.resolve(container, AccessFlags::CHECK_ONLY, Operand::None)?
            .into_value()
    }

    /// `isset($x)`
    pub fn isset<C: Container + ?Sized>(&mut self, container: &mut C) -> Result<bool, AccessError> {
        match self.resolve(container, AccessFlags::ISSET, Operand::None)? {
            Resolved::Isset(b) => Ok(b),
            other => Ok(!other.into_value()?.is_null()),
        }
    }

    /// `empty($x)`: quiet read, then falsiness.
    pub fn empty<C: Container + ?Sized>(&mut self, container: &mut C) -> Result<bool, AccessError> {
        Ok(!self.read_quiet(container)?.to_bool())
    }

    /// `$x = value`
    pub fn write<C: Container + ?Sized>(&mut self, container: &mut C, val: Val) -> Result<(), AccessError> {
        self.resolve(container, AccessFlags::WRITE_VALUE, Operand::Value(val))
            .map(|_| ())
    }

    /// `$x = &...` with the cell of the right-hand side
    pub fn bind<C: Container + ?Sized>(&mut self, container: &mut C, cell: AliasRef) -> Result<(), AccessError> {
        self.resolve(container, AccessFlags::WRITE_ALIAS, Operand::Alias(cell))
            .map(|_| ())
    }

    /// `unset($x)`
    pub fn unset<C: Container + ?Sized>(&mut self, container: &mut C) -> Result<(), AccessError> {
        self.resolve(container, AccessFlags::UNSET, Operand::None)
            .map(|_| ())
    }

    /// The alias cell of `container`, creating it if needed. Unlike `resolve`,
    /// an exhausted `$a[]` surfaces as `Err(NextElementOccupied)` here.
    pub fn ensure_alias<C: Container + ?Sized>(&mut self, container: &mut C) -> Result<AliasRef, AccessError> {
        require(&*container, Capability::Alias)?;
        promote(container)
    }

    /// The object in `container`, created if absent or null. `None` when the
    /// container holds a value that cannot become an object.
    pub fn ensure_object<C: Container + ?Sized>(
        &mut self,
        container: &mut C,
    ) -> Result<Option<ObjectRef>, AccessError> {
        match self.resolve(container, AccessFlags::ENSURE_OBJECT, Operand::None)? {
            Resolved::Object(obj) => Ok(Some(obj)),
            _ => Ok(None),
        }
    }

    /// The array in `container`, created if absent or null. `None` when the
    /// container holds a value that cannot become an array.
    pub fn ensure_array<'c, C: Container + ?Sized>(
        &mut self,
        container: &'c mut C,
    ) -> Result<Option<ArrayMut<'c>>, AccessError> {
        match self.resolve(container, AccessFlags::ENSURE_ARRAY, Operand::None)? {
            Resolved::Array(arr) => Ok(Some(arr)),
            _ => Ok(None),
        }
    }
}

fn require<C: Container + ?Sized>(container: &C, capability: Capability) -> Result<(), AccessError> {
    if container.supports(capability) {
        Ok(())
    } else {
        Err(AccessError::Unsupported {
            capability,
            location: container.location(),
        })
    }
}

/// Store `val`, writing through an alias cell when the container is bound to one.
fn assign<C: Container + ?Sized>(container: &mut C, val: Val) -> Result<(), AccessError> {
    // The slot may sit inside the very array its cell holds (`$a['self'] = &$a`),
    // so no container guard may be alive while the cell is written.
    if let Some(Slot::Alias(cell)) = container.get()? {
        let mut inner = cell.try_borrow_mut().ok_or(AccessError::AliasBorrowed)?;
        *inner = val;
        return Ok(());
    }
    if let Some(mut slot) = container.slot_mut()? {
        *slot = Slot::Value(val);
        return Ok(());
    }
    container.insert(Slot::Value(val))
}

/// Rebind to `cell`; the previous binding is dropped.
fn bind<C: Container + ?Sized>(container: &mut C, cell: AliasRef) -> Result<(), AccessError> {
    if let Some(mut slot) = container.slot_mut()? {
        *slot = Slot::Alias(cell);
        return Ok(());
    }
    container.insert(Slot::Alias(cell))
}

/// Move the current value into a fresh alias cell and bind the container to it.
fn promote<C: Container + ?Sized>(container: &mut C) -> Result<AliasRef, AccessError> {
    if let Some(mut slot) = container.slot_mut()? {
        let cell = match &mut *slot {
            Slot::Alias(cell) => return Ok(cell.clone()),
            Slot::Value(val) => AliasRef::new(std::mem::replace(val, Val::Null)),
        };
        *slot = Slot::Alias(cell.clone());
        return Ok(cell);
    }
    let cell = AliasRef::new(Val::Null);
    container.insert(Slot::Alias(cell.clone()))?;
    Ok(cell)
}

/// Mutable access to the array the container now holds.
fn array_in<'c, C: Container + ?Sized>(container: &'c mut C) -> Result<Resolved<'c>, AccessError> {
    if let Some(arr) = container.detached_array()? {
        return Ok(Resolved::Array(arr));
    }
    let slot = container.slot_mut()?.ok_or(AccessError::StaleArray)?;
    slot.filter_map(|s| match s {
        Slot::Value(Val::Array(rc)) => Some(rc),
        _ => None,
    })
    .map(|guard| Resolved::Array(ArrayMut::Borrowed(guard)))
    .ok_or(AccessError::StaleArray)
}
