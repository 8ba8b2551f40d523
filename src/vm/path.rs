//! Chained access paths
//!
//! An [`AccessPath`] is a variable followed by index, append and property
//! steps: `$a['x']->y[]`. Every step is one resolver request against the
//! container produced by the previous step:
//!
//! - writes (`assign`, `bind`, `make_ref`) autovivify with EnsureArray for
//!   index/append steps and EnsureObject for property steps. A refused
//!   conversion stops the walk; the diagnostic has already been reported.
//! - `fetch` reads each link. The first undefined link reports once and
//!   yields null.
//! - `isset` and `empty` read quietly and never create anything.
//! - `unset` descends only into arrays and objects that already exist.
//!
//! Walking into an object restarts from a fresh [`PropertySlot`], so no borrow
//! of the outer containers is held across object boundaries.
//!
//! Reference: $PHP_SRC_PATH/Zend/zend_execute.c - zend_fetch_dimension_address_W,
//! zend_fetch_property_address

use crate::core::alias::AliasRef;
use crate::core::value::{ArrayKey, Name, Val};
use crate::vm::container::{ArrayMut, ArraySlot, Capability, Container, PropertySlot, Scope};
use crate::vm::diagnostics::{Diagnostic, Location};
use crate::vm::flags::AccessFlags;
use crate::vm::resolver::{AccessError, Operand, Resolved, Resolver};
use smallvec::SmallVec;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Index(ArrayKey),
    Append,
    Property(Name),
}

impl Step {
    fn target(&self) -> &'static str {
        match self {
            Step::Property(_) => "object",
            Step::Index(_) | Step::Append => "array",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessPath {
    pub root: Name,
    pub steps: SmallVec<[Step; 4]>,
}

impl AccessPath {
    pub fn var(name: impl Into<Name>) -> Self {
        Self {
            root: name.into(),
            steps: SmallVec::new(),
        }
    }

    pub fn index(mut self, key: impl Into<ArrayKey>) -> Self {
        self.steps.push(Step::Index(key.into()));
        self
    }

    pub fn append(mut self) -> Self {
        self.steps.push(Step::Append);
        self
    }

    pub fn prop(mut self, name: impl Into<Name>) -> Self {
        self.steps.push(Step::Property(name.into()));
        self
    }
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.root)?;
        for step in &self.steps {
            match step {
                Step::Index(key) => write!(f, "[{}]", key)?,
                Step::Append => write!(f, "[]")?,
                Step::Property(name) => write!(f, "->{}", name)?,
            }
        }
        Ok(())
    }
}

enum Mode {
    Assign(Val),
    Bind(AliasRef),
    MakeRef,
    Fetch,
    Isset,
    Empty,
    Unset,
}

impl Mode {
    fn writes(&self) -> bool {
        matches!(self, Mode::Assign(_) | Mode::Bind(_) | Mode::MakeRef)
    }

    /// Result when a link before the leaf is missing or not traversable.
    fn missing(&self) -> Outcome {
        match self {
            Mode::Fetch => Outcome::Value(Val::Null),
            Mode::Isset => Outcome::Bool(false),
            Mode::Empty => Outcome::Bool(true),
            Mode::Unset => Outcome::Done,
            Mode::Assign(_) | Mode::Bind(_) | Mode::MakeRef => Outcome::Blocked,
        }
    }
}

enum Outcome {
    Value(Val),
    Alias(AliasRef),
    Bool(bool),
    Done,
    /// A refused conversion stopped a write walk.
    Blocked,
}

enum Walk {
    Finished(Outcome),
    /// Continue at `steps[usize]` from this property.
    Property(PropertySlot, usize),
}

impl Resolver {
    /// `$a['x']->y = value`. Returns false when nothing was stored: an
    /// intermediate value could not be converted, or `$a[]` had no free key.
    pub fn assign_path(&mut self, scope: &mut Scope, path: &AccessPath, val: Val) -> Result<bool, AccessError> {
        Ok(!matches!(
            self.run_path(scope, path, &Mode::Assign(val))?,
            Outcome::Blocked
        ))
    }

    /// `$a['x']->y = &$other`
    pub fn bind_path(&mut self, scope: &mut Scope, path: &AccessPath, cell: AliasRef) -> Result<bool, AccessError> {
        Ok(!matches!(
            self.run_path(scope, path, &Mode::Bind(cell))?,
            Outcome::Blocked
        ))
    }

    /// `&$a['x']->y`: the alias cell at the end of the path.
    pub fn ref_path(&mut self, scope: &mut Scope, path: &AccessPath) -> Result<Option<AliasRef>, AccessError> {
        match self.run_path(scope, path, &Mode::MakeRef)? {
            Outcome::Alias(cell) => Ok(Some(cell)),
            _ => Ok(None),
        }
    }

    pub fn fetch_path(&mut self, scope: &mut Scope, path: &AccessPath) -> Result<Val, AccessError> {
        match self.run_path(scope, path, &Mode::Fetch)? {
            Outcome::Value(val) => Ok(val),
            _ => Ok(Val::Null),
        }
    }

    pub fn isset_path(&mut self, scope: &mut Scope, path: &AccessPath) -> Result<bool, AccessError> {
        Ok(matches!(
            self.run_path(scope, path, &Mode::Isset)?,
            Outcome::Bool(true)
        ))
    }

    pub fn empty_path(&mut self, scope: &mut Scope, path: &AccessPath) -> Result<bool, AccessError> {
        Ok(!matches!(
            self.run_path(scope, path, &Mode::Empty)?,
            Outcome::Bool(false)
        ))
    }

    pub fn unset_path(&mut self, scope: &mut Scope, path: &AccessPath) -> Result<(), AccessError> {
        self.run_path(scope, path, &Mode::Unset).map(|_| ())
    }

    fn run_path(&mut self, scope: &mut Scope, path: &AccessPath, mode: &Mode) -> Result<Outcome, AccessError> {
        let mut walk = self.walk(&mut scope.var(path.root.clone()), &path.steps, 0, mode)?;
        loop {
            match walk {
                Walk::Finished(outcome) => return Ok(outcome),
                Walk::Property(mut prop, at) => {
                    walk = self.walk(&mut prop, &path.steps, at, mode)?;
                }
            }
        }
    }

    fn walk(
        &mut self,
        container: &mut dyn Container,
        steps: &[Step],
        at: usize,
        mode: &Mode,
    ) -> Result<Walk, AccessError> {
        let Some(step) = steps.get(at) else {
            return self.leaf(container, mode).map(Walk::Finished);
        };

        if mode.writes() {
            let flags = match step {
                Step::Property(_) => AccessFlags::ENSURE_OBJECT,
                Step::Index(_) | Step::Append => AccessFlags::ENSURE_ARRAY,
            };
            return match (step, self.resolve(container, flags, Operand::None)?) {
                (Step::Property(name), Resolved::Object(obj)) => {
                    Ok(Walk::Property(PropertySlot::new(obj, name.clone()), at + 1))
                }
                (Step::Index(_) | Step::Append, Resolved::Array(mut arr)) => {
                    self.walk(&mut element(&mut arr, step), steps, at + 1, mode)
                }
                _ => Ok(Walk::Finished(Outcome::Blocked)),
            };
        }

        if let Mode::Unset = mode {
            return match (step, self.read_quiet(container)?) {
                (Step::Append, _) => Err(AccessError::Unsupported {
                    capability: Capability::Unset,
                    location: Location::Append,
                }),
                (Step::Property(name), Val::Object(obj)) => {
                    Ok(Walk::Property(PropertySlot::new(obj, name.clone()), at + 1))
                }
                // The array exists, so this only hands out write access to it.
                (Step::Index(_), Val::Array(_)) => match self.ensure_array(container)? {
                    Some(mut arr) => self.walk(&mut element(&mut arr, step), steps, at + 1, mode),
                    None => Ok(Walk::Finished(Outcome::Done)),
                },
                _ => Ok(Walk::Finished(Outcome::Done)),
            };
        }

        let quiet = !matches!(mode, Mode::Fetch);
        let current = if quiet {
            self.read_quiet(container)?
        } else {
            self.read_value(container)?
        };
        match (step, current) {
            (Step::Property(name), Val::Object(obj)) => {
                Ok(Walk::Property(PropertySlot::new(obj, name.clone()), at + 1))
            }
            // Reads go through a private handle, so nothing is separated.
            (Step::Index(_) | Step::Append, Val::Array(mut rc)) => {
                let mut arr = ArrayMut::from(&mut rc);
                self.walk(&mut element(&mut arr, step), steps, at + 1, mode)
            }
            (_, Val::Null) => Ok(Walk::Finished(mode.missing())),
            (step, other) => {
                if !quiet {
                    self.report(Diagnostic::invalid_conversion(
                        container.location(),
                        other.type_name(),
                        step.target(),
                    ));
                }
                Ok(Walk::Finished(mode.missing()))
            }
        }
    }

    fn leaf(&mut self, container: &mut dyn Container, mode: &Mode) -> Result<Outcome, AccessError> {
        Ok(match mode {
            // An exhausted `$a[]` leaf stores nothing and resolves to a value.
            Mode::Assign(val) => {
                match self.resolve(container, AccessFlags::WRITE_VALUE, Operand::Value(val.clone()))? {
                    Resolved::Done => Outcome::Done,
                    _ => Outcome::Blocked,
                }
            }
            Mode::Bind(cell) => {
                match self.resolve(container, AccessFlags::WRITE_ALIAS, Operand::Alias(cell.clone()))? {
                    Resolved::Done => Outcome::Done,
                    _ => Outcome::Blocked,
                }
            }
            Mode::MakeRef => match self.resolve(container, AccessFlags::ENSURE_ALIAS, Operand::None)? {
                Resolved::Alias(cell) => Outcome::Alias(cell),
                _ => Outcome::Blocked,
            },
            Mode::Fetch => Outcome::Value(self.read_value(container)?),
            Mode::Isset => Outcome::Bool(self.isset(container)?),
            Mode::Empty => Outcome::Bool(self.empty(container)?),
            Mode::Unset => {
                self.unset(container)?;
                Outcome::Done
            }
        })
    }
}

/// Element addressed by an index or append step.
fn element<'a, 'b>(arr: &'a mut ArrayMut<'b>, step: &Step) -> ArraySlot<'a, 'b> {
    match step {
        Step::Index(key) => ArraySlot::new(arr, key.clone()),
        _ => ArraySlot::append(arr),
    }
}
