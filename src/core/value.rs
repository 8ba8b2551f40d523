use crate::core::alias::AliasRef;
use indexmap::IndexMap;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

/// Variable, property and class names.
pub type Name = Rc<str>;

/// Array metadata for efficient operations
/// Reference: $PHP_SRC_PATH/Zend/zend_hash.h - HashTable::nNextFreeElement
#[derive(Debug, Clone, Default)]
pub struct ArrayData {
    pub map: IndexMap<ArrayKey, Slot>,
    pub next_free: i64, // Cached next auto-increment index (like HashTable::nNextFreeElement)
}

impl ArrayData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key-value pair and update next_free if needed
    /// Reference: $PHP_SRC_PATH/Zend/zend_hash.c - _zend_hash_index_add_or_update_i
    pub fn insert(&mut self, key: ArrayKey, slot: Slot) -> Option<Slot> {
        if let ArrayKey::Int(i) = &key {
            if *i >= self.next_free {
                // Saturates at i64::MAX; push then finds that key taken.
                self.next_free = i.saturating_add(1);
            }
        }
        self.map.insert(key, slot)
    }

    /// Append with an auto-incremented key, returning the key used.
    /// `None` when the next element is already occupied (the key space is
    /// exhausted up to i64::MAX).
    pub fn push(&mut self, slot: Slot) -> Option<ArrayKey> {
        let key = ArrayKey::Int(self.next_free);
        if self.map.contains_key(&key) {
            return None;
        }
        self.next_free = self.next_free.saturating_add(1);
        self.map.insert(key.clone(), slot);
        Some(key)
    }

    /// Get the next auto-increment index (O(1))
    pub fn next_index(&self) -> i64 {
        self.next_free
    }

    /// Dereferenced value stored under `key`.
    pub fn get(&self, key: &ArrayKey) -> Option<Val> {
        self.map.get(key).map(Slot::get)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl PartialEq for ArrayData {
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map
        // Don't compare next_free as it's cached metadata
    }
}

impl<K: Into<ArrayKey>, V: Into<Val>> FromIterator<(K, V)> for ArrayData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut data = ArrayData::new();
        for (k, v) in iter {
            data.insert(k.into(), Slot::Value(v.into()));
        }
        data
    }
}

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum ArrayKey {
    Int(i64),
    Str(Rc<Vec<u8>>),
}

impl From<i64> for ArrayKey {
    fn from(i: i64) -> Self {
        ArrayKey::Int(i)
    }
}

impl From<&str> for ArrayKey {
    fn from(s: &str) -> Self {
        ArrayKey::Str(Rc::new(s.as_bytes().to_vec()))
    }
}

impl fmt::Display for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayKey::Int(i) => write!(f, "{}", i),
            ArrayKey::Str(s) => write!(f, "\"{}\"", String::from_utf8_lossy(s)),
        }
    }
}

#[derive(Debug, Default)]
pub struct ObjectData {
    pub properties: IndexMap<Name, Slot>,
}

/// Shared object handle. Objects have identity: cloning the handle never copies
/// the instance.
#[derive(Clone)]
pub struct ObjectRef {
    class: Name,
    data: Rc<RefCell<ObjectData>>,
}

impl ObjectRef {
    pub fn new(class: impl Into<Name>) -> Self {
        ObjectRef {
            class: class.into(),
            data: Rc::new(RefCell::new(ObjectData::default())),
        }
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }

    pub fn class(&self) -> Name {
        self.class.clone()
    }

    /// Dereferenced value of a property, if it exists.
    pub fn property(&self, name: &str) -> Option<Val> {
        self.data.borrow().properties.get(name).map(Slot::get)
    }

    pub fn set_property(&self, name: impl Into<Name>, val: Val) {
        self.data
            .borrow_mut()
            .properties
            .insert(name.into(), Slot::Value(val));
    }

    pub(crate) fn try_borrow(&self) -> Option<Ref<'_, ObjectData>> {
        self.data.try_borrow().ok()
    }

    pub(crate) fn try_borrow_mut(&self) -> Option<RefMut<'_, ObjectData>> {
        self.data.try_borrow_mut().ok()
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Properties may point back at this object; print identity only.
        write!(f, "Object({}#{:p})", self.class, Rc::as_ptr(&self.data))
    }
}

#[derive(Debug, Clone)]
pub enum Val {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<Vec<u8>>),  // PHP strings are byte arrays (COW)
    Array(Rc<ArrayData>), // Array with cached metadata (COW)
    Object(ObjectRef),
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::Null, Val::Null) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Int(a), Val::Int(b)) => a == b,
            (Val::Float(a), Val::Float(b)) => a == b,
            (Val::String(a), Val::String(b)) => a == b,
            (Val::Array(a), Val::Array(b)) => Rc::ptr_eq(a, b) || a == b,
            (Val::Object(a), Val::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Val {
    pub fn empty_array() -> Self {
        Val::Array(Rc::new(ArrayData::new()))
    }

    pub fn string(s: &str) -> Self {
        Val::String(Rc::new(s.as_bytes().to_vec()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Val::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Null => "null",
            Val::Bool(_) => "bool",
            Val::Int(_) => "int",
            Val::Float(_) => "float",
            Val::String(_) => "string",
            Val::Array(_) => "array",
            Val::Object(_) => "object",
        }
    }

    /// Convert to boolean following PHP's zend_is_true semantics
    /// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - zend_is_true
    pub fn to_bool(&self) -> bool {
        match self {
            Val::Null => false,
            Val::Bool(b) => *b,
            Val::Int(i) => *i != 0,
            Val::Float(f) => *f != 0.0,
            // Empty string or "0" is false
            Val::String(s) => !(s.is_empty() || s.as_slice() == b"0"),
            Val::Array(arr) => !arr.is_empty(),
            Val::Object(_) => true,
        }
    }
}

impl From<i64> for Val {
    fn from(i: i64) -> Self {
        Val::Int(i)
    }
}

impl From<bool> for Val {
    fn from(b: bool) -> Self {
        Val::Bool(b)
    }
}

impl From<f64> for Val {
    fn from(f: f64) -> Self {
        Val::Float(f)
    }
}

impl From<&str> for Val {
    fn from(s: &str) -> Self {
        Val::string(s)
    }
}

impl From<ArrayData> for Val {
    fn from(data: ArrayData) -> Self {
        Val::Array(Rc::new(data))
    }
}

impl From<ObjectRef> for Val {
    fn from(obj: ObjectRef) -> Self {
        Val::Object(obj)
    }
}

/// What a storage location holds: a plain value or a binding to an alias cell
/// (the `is_ref` zval of the Zend engine).
#[derive(Debug, Clone)]
pub enum Slot {
    Value(Val),
    Alias(AliasRef),
}

impl Slot {
    /// Dereferenced value.
    pub fn get(&self) -> Val {
        match self {
            Slot::Value(v) => v.clone(),
            Slot::Alias(cell) => cell.get(),
        }
    }

    /// Dereferenced value; `None` while the alias cell is mutably borrowed.
    pub fn try_get(&self) -> Option<Val> {
        match self {
            Slot::Value(v) => Some(v.clone()),
            Slot::Alias(cell) => cell.try_get(),
        }
    }

    pub fn as_alias(&self) -> Option<&AliasRef> {
        match self {
            Slot::Alias(cell) => Some(cell),
            Slot::Value(_) => None,
        }
    }
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Slot::Alias(a), Slot::Alias(b)) if a.ptr_eq(b) => true,
            _ => self.try_get() == other.try_get(),
        }
    }
}
