//! Alias cells (PHP references)
//!
//! A reference assignment `$a = &$b` makes both variables hold the same
//! [`AliasRef`]. The cell always holds a dereferenced [`Val`], so chains of
//! aliases cannot be expressed. The cell lives as long as one slot is bound
//! to it; the holder count is the strong count of the shared box.
//!
//! Reference: $PHP_SRC_PATH/Zend/zend_types.h - zend_reference

use crate::core::value::Val;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

#[derive(Clone)]
pub struct AliasRef(Rc<RefCell<Val>>);

impl AliasRef {
    pub fn new(val: Val) -> Self {
        AliasRef(Rc::new(RefCell::new(val)))
    }

    /// Current contents. Arrays come back as a shared copy-on-write handle.
    pub fn get(&self) -> Val {
        self.0.borrow().clone()
    }

    /// Current contents, or `None` while an access holds the cell mutably.
    pub fn try_get(&self) -> Option<Val> {
        self.0.try_borrow().ok().map(|v| v.clone())
    }

    /// Overwrite the contents, visible through every holder.
    pub fn set(&self, val: Val) {
        *self.0.borrow_mut() = val;
    }

    /// Number of slots (and outstanding handles) bound to this cell.
    pub fn holders(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn ptr_eq(&self, other: &AliasRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn try_borrow(&self) -> Option<Ref<'_, Val>> {
        self.0.try_borrow().ok()
    }

    pub(crate) fn try_borrow_mut(&self) -> Option<RefMut<'_, Val>> {
        self.0.try_borrow_mut().ok()
    }
}

impl fmt::Debug for AliasRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(v) => write!(f, "Alias({:?})", *v),
            Err(_) => write!(f, "Alias(<borrowed>)"),
        }
    }
}
