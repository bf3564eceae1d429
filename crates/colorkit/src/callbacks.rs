//! Callback registry shared by the stores and the feature registry.
//!
//! Callbacks are cloned out of the registry before dispatch, so a callback
//! may register or unregister others without a `RefCell` double borrow.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Handle returned by [`Callbacks::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// Ordered list of `Fn(&T)` listeners.
pub struct Callbacks<T> {
    next_id: Cell<u64>,
    entries: RefCell<Vec<(CallbackId, Rc<dyn Fn(&T)>)>>,
}

impl<T> Default for Callbacks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Callbacks<T> {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(1),
            entries: RefCell::new(Vec::new()),
        }
    }

    pub fn register<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&T) + 'static,
    {
        let id = CallbackId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.entries.borrow_mut().push((id, Rc::new(callback)));
        id
    }

    /// Remove a callback. Returns false if it was already gone.
    pub fn unregister(&self, id: CallbackId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Invoke every registered callback with `value`.
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<Rc<dyn Fn(&T)>> = self
            .entries
            .borrow()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in snapshot {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_notify() {
        let callbacks: Callbacks<u32> = Callbacks::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        callbacks.register(move |v| s.borrow_mut().push(*v));
        callbacks.notify(&7);
        callbacks.notify(&8);
        assert_eq!(*seen.borrow(), vec![7, 8]);
    }

    #[test]
    fn test_unregister() {
        let callbacks: Callbacks<()> = Callbacks::new();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let id = callbacks.register(move |_| c.set(c.get() + 1));
        assert!(callbacks.unregister(id));
        assert!(!callbacks.unregister(id));
        callbacks.notify(&());
        assert_eq!(count.get(), 0);
        assert!(callbacks.is_empty());
    }

    #[test]
    fn test_callback_may_register_during_notify() {
        let callbacks: Rc<Callbacks<()>> = Rc::new(Callbacks::new());
        let inner = callbacks.clone();
        callbacks.register(move |_| {
            inner.register(|_| {});
        });
        callbacks.notify(&());
        assert_eq!(callbacks.len(), 2);
    }
}
