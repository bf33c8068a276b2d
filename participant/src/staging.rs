use std::{cell::RefCell, rc::Rc};

/// Holds the most recent value requested while a write waits for authority.
///
/// Every request overwrites the staged value. The first waiter to resume
/// after the grant takes it and writes it; waiters resuming later find
/// nothing and skip their write, so only the latest request lands.
pub struct LatestRequest<T> {
    staged: Rc<RefCell<Option<T>>>,
}

impl<T> Clone for LatestRequest<T> {
    fn clone(&self) -> Self {
        Self {
            staged: self.staged.clone(),
        }
    }
}

impl<T> Default for LatestRequest<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestRequest<T> {
    pub fn new() -> Self {
        Self {
            staged: Rc::new(RefCell::new(None)),
        }
    }

    pub fn stage(&self, value: T) {
        *self.staged.borrow_mut() = Some(value);
    }

    pub fn take(&self) -> Option<T> {
        self.staged.borrow_mut().take()
    }

    pub fn is_staged(&self) -> bool {
        self.staged.borrow().is_some()
    }
}
