use std::cell::RefCell;
pub use std::cell::{Ref, RefMut};
use std::fmt;
use std::fmt::Formatter;
use std::rc::Rc;

/// A shared, mutable handle.
pub struct Handle<T> {
    rc: Rc<RefCell<T>>,
}

impl<T> Handle<T> {
    pub fn new(value: T) -> Self {
        Self {
            rc: Rc::new(RefCell::new(value)),
        }
    }

    #[inline(always)]
    pub fn borrow(&self) -> Ref<'_, T> {
        self.rc.borrow()
    }

    #[inline(always)]
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.rc.borrow_mut()
    }

    /// Identity comparison: do both handles point to the same object?
    #[inline]
    pub fn ptr_eq(&self, other: &Handle<T>) -> bool {
        Rc::ptr_eq(&self.rc, &other.rc)
    }
}

impl<T: Clone> Handle<T> {
    /// Unwrap the inner value when this is the only handle,
    /// or fall back to a clone when the value is shared.
    pub fn take_or_clone(self) -> T {
        match Rc::try_unwrap(self.rc) {
            Ok(cell) => cell.into_inner(),
            Err(rc) => rc.borrow().clone(),
        }
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            rc: Rc::clone(&self.rc),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.rc.borrow(), f)
    }
}
