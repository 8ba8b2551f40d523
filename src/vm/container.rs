//! Containers
//!
//! A container is one addressable storage location: a variable in a [`Scope`],
//! an element of an array, or a property of an object. The resolver only sees
//! the [`Container`] trait, so every access mode behaves identically for all
//! three kinds. Each kind supplies its own lookup, insertion and removal.
//!
//! Mutable access is handed out through [`Guard`], which is either a plain
//! `&mut` into the storage or a `RefMut` when the storage sits behind an
//! object or an alias cell.

use crate::core::alias::AliasRef;
use crate::core::value::{ArrayData, ArrayKey, Name, ObjectRef, Slot, Val};
use crate::vm::diagnostics::Location;
use crate::vm::resolver::AccessError;
use indexmap::IndexMap;
use smallvec::SmallVec;
use std::cell::RefMut;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

/// Mutable access to storage that may live behind a `RefCell`.
pub enum Guard<'a, T> {
    Ref(&'a mut T),
    Cell(RefMut<'a, T>),
}

impl<'a, T> Guard<'a, T> {
    /// Narrow the guard to a part of the guarded value.
    pub fn filter_map<U>(self, f: impl FnOnce(&mut T) -> Option<&mut U>) -> Option<Guard<'a, U>> {
        match self {
            Guard::Ref(r) => f(r).map(Guard::Ref),
            Guard::Cell(g) => RefMut::filter_map(g, f).ok().map(Guard::Cell),
        }
    }
}

impl<T> Deref for Guard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self {
            Guard::Ref(r) => r,
            Guard::Cell(g) => g,
        }
    }
}

impl<T> DerefMut for Guard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match self {
            Guard::Ref(r) => r,
            Guard::Cell(g) => g,
        }
    }
}

pub type SlotMut<'a> = Guard<'a, Slot>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    Write,
    Unset,
    Alias,
}

/// One storage location, as seen by the resolver.
///
/// `get` returns a cheap clone of the stored slot (strings and arrays are
/// shared). Structural mutation only happens through `slot_mut`, `insert` and
/// `remove`.
pub trait Container {
    fn location(&self) -> Location;

    fn get(&self) -> Result<Option<Slot>, AccessError>;

    fn slot_mut(&mut self) -> Result<Option<SlotMut<'_>>, AccessError>;

    /// Create the location; it did not exist before.
    fn insert(&mut self, slot: Slot) -> Result<(), AccessError>;

    fn remove(&mut self) -> Result<Option<Slot>, AccessError>;

    /// The array stored here as a handle that holds no borrow of the
    /// container. Only locations reached through an alias cell have one.
    fn detached_array(&self) -> Result<Option<ArrayMut<'static>>, AccessError> {
        Ok(aliased_array(self.get()?))
    }

    fn readable(&self) -> bool {
        true
    }

    fn writable(&self) -> bool {
        true
    }

    fn unsettable(&self) -> bool {
        true
    }

    fn aliasable(&self) -> bool {
        true
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Read => self.readable(),
            Capability::Write => self.writable(),
            Capability::Unset => self.unsettable(),
            Capability::Alias => self.aliasable(),
        }
    }
}

/// A symbol table of variables (one function frame, or the global scope).
/// Reference: $PHP_SRC_PATH/Zend/zend_execute_API.c - zend_rebuild_symbol_table
#[derive(Debug, Default, Clone)]
pub struct Scope {
    pub locals: IndexMap<Name, Slot>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Container for the variable `$name`.
    pub fn var(&mut self, name: impl Into<Name>) -> VariableSlot<'_> {
        VariableSlot {
            scope: self,
            name: name.into(),
        }
    }

    /// Dereferenced value of `$name`, if defined.
    pub fn value(&self, name: &str) -> Option<Val> {
        self.locals.get(name).map(Slot::get)
    }

    pub fn alias_of(&self, name: &str) -> Option<AliasRef> {
        self.locals.get(name).and_then(Slot::as_alias).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.locals.contains_key(name)
    }
}

pub struct VariableSlot<'a> {
    scope: &'a mut Scope,
    name: Name,
}

impl Container for VariableSlot<'_> {
    fn location(&self) -> Location {
        Location::Variable(self.name.clone())
    }

    fn get(&self) -> Result<Option<Slot>, AccessError> {
        Ok(self.scope.locals.get(&self.name).cloned())
    }

    fn slot_mut(&mut self) -> Result<Option<SlotMut<'_>>, AccessError> {
        Ok(self.scope.locals.get_mut(&self.name).map(Guard::Ref))
    }

    fn insert(&mut self, slot: Slot) -> Result<(), AccessError> {
        self.scope.locals.insert(self.name.clone(), slot);
        Ok(())
    }

    fn remove(&mut self) -> Result<Option<Slot>, AccessError> {
        Ok(self.scope.locals.shift_remove(&self.name))
    }
}

/// Mutable access to an array that lives in some container, as produced by an
/// EnsureArray read.
///
/// The array stays shared until an element is structurally changed; the
/// `Rc::make_mut` at that point separates it from every other holder.
pub enum ArrayMut<'a> {
    Borrowed(Guard<'a, Rc<ArrayData>>),
    /// An array reached through an alias cell: the cell's contents, or the
    /// nested array found by following `path` from them. The cell is borrowed
    /// per operation, so other holders can still read it in between.
    Aliased(AliasRef, SmallVec<[ArrayKey; 2]>),
}

impl<'a> From<&'a mut Rc<ArrayData>> for ArrayMut<'a> {
    fn from(rc: &'a mut Rc<ArrayData>) -> Self {
        ArrayMut::Borrowed(Guard::Ref(rc))
    }
}

impl ArrayMut<'static> {
    /// The array held directly by `cell`.
    pub fn aliased(cell: AliasRef) -> Self {
        ArrayMut::Aliased(cell, SmallVec::new())
    }
}

fn nested<'v>(val: &'v Val, path: &[ArrayKey]) -> Option<&'v Rc<ArrayData>> {
    let Val::Array(rc) = val else {
        return None;
    };
    let mut rc: &Rc<ArrayData> = rc;
    for key in path {
        match rc.map.get(key) {
            Some(Slot::Value(Val::Array(inner))) => rc = inner,
            _ => return None,
        }
    }
    Some(rc)
}

/// Separates every level on the way down.
fn nested_mut<'v>(val: &'v mut Val, path: &[ArrayKey]) -> Option<&'v mut ArrayData> {
    let Val::Array(rc) = val else {
        return None;
    };
    let mut data = Rc::make_mut(rc);
    for key in path {
        match data.map.get_mut(key) {
            Some(Slot::Value(Val::Array(inner))) => data = Rc::make_mut(inner),
            _ => return None,
        }
    }
    Some(data)
}

impl ArrayMut<'_> {
    fn with_data<R>(&self, f: impl FnOnce(&ArrayData) -> R) -> Result<Option<R>, AccessError> {
        match self {
            ArrayMut::Borrowed(g) => Ok(Some(f(g))),
            ArrayMut::Aliased(cell, path) => {
                let val = cell.try_borrow().ok_or(AccessError::AliasBorrowed)?;
                Ok(nested(&val, path).map(|rc| f(rc)))
            }
        }
    }

    fn data_mut(&mut self) -> Result<Guard<'_, ArrayData>, AccessError> {
        match self {
            ArrayMut::Borrowed(g) => Ok(Guard::Ref(Rc::make_mut(g))),
            ArrayMut::Aliased(cell, path) => {
                let val = cell.try_borrow_mut().ok_or(AccessError::AliasBorrowed)?;
                RefMut::filter_map(val, |v| nested_mut(v, path))
                    .map(Guard::Cell)
                    .map_err(|_| AccessError::StaleArray)
            }
        }
    }

    /// Snapshot of the array, sharing storage until either side mutates.
    pub fn snapshot(&self) -> Result<Val, AccessError> {
        match self {
            ArrayMut::Borrowed(g) => Ok(Val::Array(Rc::clone(g))),
            ArrayMut::Aliased(cell, path) => {
                let val = cell.try_borrow().ok_or(AccessError::AliasBorrowed)?;
                nested(&val, path)
                    .map(|rc| Val::Array(Rc::clone(rc)))
                    .ok_or(AccessError::StaleArray)
            }
        }
    }

    pub fn len(&self) -> Result<usize, AccessError> {
        Ok(self.with_data(ArrayData::len)?.unwrap_or(0))
    }
}

/// A borrow-free handle for an array held through an alias cell.
fn aliased_array(slot: Option<Slot>) -> Option<ArrayMut<'static>> {
    match slot {
        Some(Slot::Alias(cell)) => Some(ArrayMut::aliased(cell)),
        _ => None,
    }
}

/// An element of an array, or `$a[]` when no key is given.
pub struct ArraySlot<'a, 'b> {
    array: &'a mut ArrayMut<'b>,
    key: Option<ArrayKey>,
}

impl<'a, 'b> ArraySlot<'a, 'b> {
    pub fn new(array: &'a mut ArrayMut<'b>, key: impl Into<ArrayKey>) -> Self {
        Self {
            array,
            key: Some(key.into()),
        }
    }

    /// `$a[]`: write-only until inserted, then addresses the new element.
    pub fn append(array: &'a mut ArrayMut<'b>) -> Self {
        Self { array, key: None }
    }

    pub fn key(&self) -> Option<&ArrayKey> {
        self.key.as_ref()
    }
}

impl Container for ArraySlot<'_, '_> {
    fn location(&self) -> Location {
        match &self.key {
            Some(key) => Location::Index(key.clone()),
            None => Location::Append,
        }
    }

    fn get(&self) -> Result<Option<Slot>, AccessError> {
        let Some(key) = &self.key else {
            return Ok(None);
        };
        Ok(self
            .array
            .with_data(|d| d.map.get(key).cloned())?
            .flatten())
    }

    fn slot_mut(&mut self) -> Result<Option<SlotMut<'_>>, AccessError> {
        let ArraySlot { array, key } = self;
        let Some(key) = key.as_ref() else {
            return Ok(None);
        };
        // Don't separate a shared array just to find out the key is missing.
        if array.with_data(|d| d.map.contains_key(key))? != Some(true) {
            return Ok(None);
        }
        Ok(array.data_mut()?.filter_map(|d| d.map.get_mut(key)))
    }

    fn insert(&mut self, slot: Slot) -> Result<(), AccessError> {
        let mut data = self.array.data_mut()?;
        match &self.key {
            Some(key) => {
                data.insert(key.clone(), slot);
            }
            None => {
                let key = data.push(slot).ok_or(AccessError::NextElementOccupied)?;
                drop(data);
                self.key = Some(key);
            }
        }
        Ok(())
    }

    fn remove(&mut self) -> Result<Option<Slot>, AccessError> {
        let Some(key) = &self.key else {
            return Ok(None);
        };
        if self.array.with_data(|d| d.map.contains_key(key))? != Some(true) {
            return Ok(None);
        }
        Ok(self.array.data_mut()?.map.shift_remove(key))
    }

    fn detached_array(&self) -> Result<Option<ArrayMut<'static>>, AccessError> {
        let slot = self.get()?;
        let (Some(key), ArrayMut::Aliased(cell, path)) = (&self.key, &*self.array) else {
            return Ok(aliased_array(slot));
        };
        Ok(match slot {
            Some(Slot::Value(Val::Array(_))) => {
                let mut path = path.clone();
                path.push(key.clone());
                Some(ArrayMut::Aliased(cell.clone(), path))
            }
            other => aliased_array(other),
        })
    }

    fn readable(&self) -> bool {
        self.key.is_some()
    }

    fn unsettable(&self) -> bool {
        self.key.is_some()
    }
}

/// A declared or dynamic property of an object. Holds its own handle to the
/// object and borrows the instance only for the duration of each operation.
pub struct PropertySlot {
    object: ObjectRef,
    name: Name,
}

impl PropertySlot {
    pub fn new(object: ObjectRef, name: impl Into<Name>) -> Self {
        Self {
            object,
            name: name.into(),
        }
    }
}

impl Container for PropertySlot {
    fn location(&self) -> Location {
        Location::Property {
            class: self.object.class(),
            name: self.name.clone(),
        }
    }

    fn get(&self) -> Result<Option<Slot>, AccessError> {
        let data = self.object.try_borrow().ok_or(AccessError::ObjectBorrowed)?;
        Ok(data.properties.get(&self.name).cloned())
    }

    fn slot_mut(&mut self) -> Result<Option<SlotMut<'_>>, AccessError> {
        let data = self
            .object
            .try_borrow_mut()
            .ok_or(AccessError::ObjectBorrowed)?;
        let name = &self.name;
        Ok(RefMut::filter_map(data, |d| d.properties.get_mut(name))
            .ok()
            .map(Guard::Cell))
    }

    fn insert(&mut self, slot: Slot) -> Result<(), AccessError> {
        let mut data = self
            .object
            .try_borrow_mut()
            .ok_or(AccessError::ObjectBorrowed)?;
        data.properties.insert(self.name.clone(), slot);
        Ok(())
    }

    fn remove(&mut self) -> Result<Option<Slot>, AccessError> {
        let mut data = self
            .object
            .try_borrow_mut()
            .ok_or(AccessError::ObjectBorrowed)?;
        Ok(data.properties.shift_remove(&self.name))
    }
}
