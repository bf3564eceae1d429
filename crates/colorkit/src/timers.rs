//! Tracked timers.
//!
//! Every engine that can have more than one outstanding timer owns a
//! [`TimerSet`] and clears it on teardown, so nothing it scheduled can fire
//! afterwards. [`Debouncer`] and [`FrameCoalescer`] keep at most one pending
//! task: scheduling again cancels the previous one.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use crate::event_loop::{EventLoop, TimerId};

/// Registry of pending timers, cancelled together by [`TimerSet::clear`].
pub struct TimerSet {
    event_loop: Rc<dyn EventLoop>,
    ids: Rc<RefCell<HashSet<TimerId>>>,
}

impl TimerSet {
    pub fn new(event_loop: Rc<dyn EventLoop>) -> Self {
        Self {
            event_loop,
            ids: Rc::new(RefCell::new(HashSet::new())),
        }
    }

    /// One-shot task. Its id leaves the set once it has run.
    pub fn timeout<F>(&self, delay_ms: u64, task: F) -> TimerId
    where
        F: FnOnce() + 'static,
    {
        let own_id: Rc<Cell<Option<TimerId>>> = Rc::new(Cell::new(None));
        let ids = Rc::downgrade(&self.ids);
        let slot = own_id.clone();
        let id = self.event_loop.set_timeout(
            delay_ms,
            Box::new(move || {
                if let (Some(ids), Some(id)) = (ids.upgrade(), slot.get()) {
                    ids.borrow_mut().remove(&id);
                }
                task();
            }),
        );
        own_id.set(Some(id));
        self.ids.borrow_mut().insert(id);
        id
    }

    pub fn interval<F>(&self, period_ms: u64, task: F) -> TimerId
    where
        F: Fn() + 'static,
    {
        let id = self.event_loop.set_interval(period_ms, Rc::new(task));
        self.ids.borrow_mut().insert(id);
        id
    }

    pub fn cancel(&self, id: TimerId) {
        self.ids.borrow_mut().remove(&id);
        self.event_loop.cancel(id);
    }

    /// Cancel everything still pending. Safe to call repeatedly.
    pub fn clear(&self) {
        let ids: Vec<TimerId> = self.ids.borrow_mut().drain().collect();
        for id in ids {
            self.event_loop.cancel(id);
        }
    }

    pub fn len(&self) -> usize {
        self.ids.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.borrow().is_empty()
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Cancel-and-reschedule timeout.
pub struct Debouncer {
    event_loop: Rc<dyn EventLoop>,
    pending: Rc<Cell<Option<TimerId>>>,
}

impl Debouncer {
    pub fn new(event_loop: Rc<dyn EventLoop>) -> Self {
        Self {
            event_loop,
            pending: Rc::new(Cell::new(None)),
        }
    }

    /// Run `task` after `delay_ms`, dropping whatever was pending.
    pub fn schedule<F>(&self, delay_ms: u64, task: F)
    where
        F: FnOnce() + 'static,
    {
        self.cancel();
        let pending = Rc::downgrade(&self.pending);
        let id = self.event_loop.set_timeout(
            delay_ms,
            Box::new(move || {
                if let Some(pending) = pending.upgrade() {
                    pending.set(None);
                }
                task();
            }),
        );
        self.pending.set(Some(id));
    }

    pub fn cancel(&self) {
        if let Some(id) = self.pending.take() {
            self.event_loop.cancel(id);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.get().is_some()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Cancel-and-reschedule animation frame.
pub struct FrameCoalescer {
    event_loop: Rc<dyn EventLoop>,
    pending: Rc<Cell<Option<TimerId>>>,
}

impl FrameCoalescer {
    pub fn new(event_loop: Rc<dyn EventLoop>) -> Self {
        Self {
            event_loop,
            pending: Rc::new(Cell::new(None)),
        }
    }

    /// Run `task` on the next frame instead of whatever was queued.
    pub fn schedule<F>(&self, task: F)
    where
        F: FnOnce() + 'static,
    {
        self.cancel();
        let pending = Rc::downgrade(&self.pending);
        let id = self.event_loop.request_animation_frame(Box::new(move || {
            if let Some(pending) = pending.upgrade() {
                pending.set(None);
            }
            task();
        }));
        self.pending.set(Some(id));
    }

    /// Run `task` two frames from now, letting one full frame settle first.
    pub fn schedule_double<F>(&self, task: F)
    where
        F: FnOnce() + 'static,
    {
        self.cancel();
        let event_loop = Rc::downgrade(&self.event_loop);
        let pending = Rc::downgrade(&self.pending);
        let id = self.event_loop.request_animation_frame(Box::new(move || {
            let (Some(event_loop), Some(pending)) = (event_loop.upgrade(), pending.upgrade())
            else {
                return;
            };
            let weak = Rc::downgrade(&pending);
            let inner = event_loop.request_animation_frame(Box::new(move || {
                if let Some(pending) = weak.upgrade() {
                    pending.set(None);
                }
                task();
            }));
            pending.set(Some(inner));
        }));
        self.pending.set(Some(id));
    }

    pub fn cancel(&self) {
        if let Some(id) = self.pending.take() {
            self.event_loop.cancel(id);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.get().is_some()
    }
}

impl Drop for FrameCoalescer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::event_loop::ManualEventLoop;

    fn event_loop() -> Rc<ManualEventLoop> {
        Rc::new(ManualEventLoop::new(
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        ))
    }

    #[test]
    fn test_timer_set_clear_cancels_everything() {
        let el = event_loop();
        let timers = TimerSet::new(el.clone());
        let fired = Rc::new(Cell::new(0));
        for delay in [10, 20, 30] {
            let f = fired.clone();
            timers.timeout(delay, move || f.set(f.get() + 1));
        }
        let f = fired.clone();
        timers.interval(5, move || f.set(f.get() + 100));
        assert_eq!(timers.len(), 4);

        el.advance(12);
        assert_eq!(fired.get(), 201);
        assert_eq!(timers.len(), 3);

        timers.clear();
        timers.clear();
        el.advance(1000);
        assert_eq!(fired.get(), 201);
        assert_eq!(el.pending(), 0);
    }

    #[test]
    fn test_timer_set_drop_cancels() {
        let el = event_loop();
        let fired = Rc::new(Cell::new(false));
        {
            let timers = TimerSet::new(el.clone());
            let f = fired.clone();
            timers.timeout(10, move || f.set(true));
        }
        el.advance(100);
        assert!(!fired.get());
    }

    #[test]
    fn test_debouncer_keeps_only_latest() {
        let el = event_loop();
        let debouncer = Debouncer::new(el.clone());
        let log = Rc::new(RefCell::new(Vec::new()));
        for (i, at) in [0u64, 50, 90].into_iter().enumerate() {
            el.advance(at.saturating_sub(el.now_ms()));
            let log = log.clone();
            debouncer.schedule(100, move || log.borrow_mut().push(i));
        }
        el.advance(99);
        assert!(log.borrow().is_empty());
        assert!(debouncer.is_pending());
        el.advance(1);
        assert_eq!(*log.borrow(), vec![2]);
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_frame_coalescer_double_frame() {
        let el = event_loop();
        let frames = FrameCoalescer::new(el.clone());
        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        frames.schedule_double(move || r.set(true));
        el.advance(16);
        assert!(!ran.get());
        assert!(frames.is_pending());
        el.advance(16);
        assert!(ran.get());
        assert!(!frames.is_pending());
    }

    #[test]
    fn test_frame_coalescer_cancel_and_reschedule() {
        let el = event_loop();
        let frames = FrameCoalescer::new(el.clone());
        let count = Rc::new(Cell::new(0));
        for _ in 0..5 {
            let c = count.clone();
            frames.schedule(move || c.set(c.get() + 1));
        }
        el.advance(32);
        assert_eq!(count.get(), 1);
    }
}
