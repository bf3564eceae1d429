//! Cancellable mutation subscriptions.
//!
//! Every engine watches the page the same way: observe a node, decide per
//! batch of records whether it matters and how soon to react, then run one
//! coalesced callback. Only the most recent pending reaction survives.

use std::cell::Cell;
use std::rc::Rc;

use crate::dom::{Dom, MutationRecord, NodeId, ObserveOptions, ObserverId};
use crate::event_loop::EventLoop;
use crate::timers::{Debouncer, FrameCoalescer};

/// How soon a relevant batch should trigger the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Debounce by this many milliseconds.
    After(u64),
    /// Coalesce into the next animation frame.
    NextFrame,
}

/// Live observer plus its pending reaction. Dropping it cancels both.
pub struct Subscription {
    dom: Rc<dyn Dom>,
    observer: Cell<Option<ObserverId>>,
    debouncer: Rc<Debouncer>,
    frames: Rc<FrameCoalescer>,
}

impl Subscription {
    /// Disconnect and drop any pending reaction. Idempotent.
    pub fn cancel(&self) {
        if let Some(id) = self.observer.take() {
            self.dom.disconnect(id);
        }
        self.debouncer.cancel();
        self.frames.cancel();
    }

    pub fn is_active(&self) -> bool {
        self.observer.get().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending() || self.frames.is_pending()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Observe `target` and run `callback` once per burst of relevant records.
///
/// `classify` sees every batch; returning `None` ignores it. A relevant batch
/// replaces whatever reaction was already pending.
pub fn subscribe<C, F>(
    dom: &Rc<dyn Dom>,
    event_loop: &Rc<dyn EventLoop>,
    target: NodeId,
    options: ObserveOptions,
    classify: C,
    callback: F,
) -> Subscription
where
    C: Fn(&[MutationRecord]) -> Option<Schedule> + 'static,
    F: Fn() + 'static,
{
    let debouncer = Rc::new(Debouncer::new(event_loop.clone()));
    let frames = Rc::new(FrameCoalescer::new(event_loop.clone()));
    let callback: Rc<dyn Fn()> = Rc::new(callback);

    let weak_debouncer = Rc::downgrade(&debouncer);
    let weak_frames = Rc::downgrade(&frames);
    let observer = dom.observe(
        target,
        options,
        Rc::new(move |records: &[MutationRecord]| {
            let Some(schedule) = classify(records) else {
                return;
            };
            let cb = callback.clone();
            match schedule {
                Schedule::After(delay) => {
                    if let Some(debouncer) = weak_debouncer.upgrade() {
                        debouncer.schedule(delay, move || cb());
                    }
                }
                Schedule::NextFrame => {
                    if let Some(frames) = weak_frames.upgrade() {
                        frames.schedule(move || cb());
                    }
                }
            }
        }),
    );

    Subscription {
        dom: dom.clone(),
        observer: Cell::new(Some(observer)),
        debouncer,
        frames,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::dom::MemoryDom;
    use crate::event_loop::ManualEventLoop;

    fn setup() -> (Rc<MemoryDom>, Rc<ManualEventLoop>) {
        let dom = Rc::new(MemoryDom::new());
        let el = Rc::new(ManualEventLoop::new(
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        ));
        let d = dom.clone();
        el.set_idle_hook(Rc::new(move || {
            d.deliver_mutations();
        }));
        (dom, el)
    }

    #[test]
    fn test_burst_coalesces_into_one_callback() {
        let (dom, el) = setup();
        let dyn_dom: Rc<dyn Dom> = dom.clone();
        let dyn_el: Rc<dyn EventLoop> = el.clone();
        let runs = Rc::new(Cell::new(0));
        let r = runs.clone();
        let sub = subscribe(
            &dyn_dom,
            &dyn_el,
            dom.document_element(),
            ObserveOptions::child_list_subtree(),
            |_| Some(Schedule::After(100)),
            move || r.set(r.get() + 1),
        );
        for _ in 0..3 {
            dom.element(dom.body(), "div", &[]);
            el.advance(40);
        }
        assert_eq!(runs.get(), 0);
        el.advance(100);
        assert_eq!(runs.get(), 1);
        assert!(sub.is_active());
    }

    #[test]
    fn test_classify_can_ignore_batches() {
        let (dom, el) = setup();
        let dyn_dom: Rc<dyn Dom> = dom.clone();
        let dyn_el: Rc<dyn EventLoop> = el.clone();
        let runs = Rc::new(Cell::new(0));
        let r = runs.clone();
        let _sub = subscribe(
            &dyn_dom,
            &dyn_el,
            dom.document_element(),
            ObserveOptions::child_list_subtree(),
            |records| records.iter().any(|r| r.added_nodes() > 1).then_some(Schedule::NextFrame),
            move || r.set(r.get() + 1),
        );
        dom.element(dom.body(), "div", &[]);
        el.advance(50);
        assert_eq!(runs.get(), 0);

        let a = dom.create_element("div");
        let b = dom.create_element("div");
        dom.append_children(dom.body(), &[a, b]);
        el.advance(50);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_cancel_is_idempotent_and_drops_pending() {
        let (dom, el) = setup();
        let dyn_dom: Rc<dyn Dom> = dom.clone();
        let dyn_el: Rc<dyn EventLoop> = el.clone();
        let runs = Rc::new(Cell::new(0));
        let r = runs.clone();
        let sub = subscribe(
            &dyn_dom,
            &dyn_el,
            dom.document_element(),
            ObserveOptions::child_list_subtree(),
            |_| Some(Schedule::After(100)),
            move || r.set(r.get() + 1),
        );
        dom.element(dom.body(), "div", &[]);
        el.advance(10);
        assert!(sub.is_pending());
        sub.cancel();
        sub.cancel();
        assert!(!sub.is_active());
        assert_eq!(dom.observer_count(), 0);
        el.advance(500);
        assert_eq!(runs.get(), 0);
    }

    #[test]
    fn test_drop_disconnects() {
        let (dom, el) = setup();
        let dyn_dom: Rc<dyn Dom> = dom.clone();
        let dyn_el: Rc<dyn EventLoop> = el.clone();
        {
            let _sub = subscribe(
                &dyn_dom,
                &dyn_el,
                dom.body(),
                ObserveOptions::default().all_attributes(),
                |_| Some(Schedule::After(0)),
                || {},
            );
            assert_eq!(dom.observer_count(), 1);
        }
        assert_eq!(dom.observer_count(), 0);
    }
}
