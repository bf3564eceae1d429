//! Scheduling seam: timeouts, intervals and animation frames.
//!
//! Everything in ColorKit runs on one thread. "Later" means a task queued on
//! an [`EventLoop`], never a blocking wait. [`ManualEventLoop`] is a virtual
//! clock that only moves when told to, which makes every debounce, poll and
//! retry in the engines deterministic under test.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::NaiveDate;

/// Frame period used for `request_animation_frame`.
pub const FRAME_MS: u64 = 16;

/// Handle to a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

pub trait EventLoop {
    /// Milliseconds since the loop started.
    fn now_ms(&self) -> u64;
    /// The user's current local date.
    fn today(&self) -> NaiveDate;
    fn set_timeout(&self, delay_ms: u64, task: Box<dyn FnOnce()>) -> TimerId;
    fn set_interval(&self, period_ms: u64, task: Rc<dyn Fn()>) -> TimerId;
    /// Run `task` before the next repaint.
    fn request_animation_frame(&self, task: Box<dyn FnOnce()>) -> TimerId;
    /// Cancel a pending task. Unknown or already-run ids are ignored.
    fn cancel(&self, id: TimerId);
}

enum Task {
    Once(Box<dyn FnOnce()>),
    Repeat(Rc<dyn Fn()>, u64),
}

struct LoopState {
    now: u64,
    today: NaiveDate,
    next_id: u64,
    /// Keyed by `(due, id)` so equal deadlines run in scheduling order.
    queue: BTreeMap<(u64, TimerId), Task>,
    running: Option<TimerId>,
    running_cancelled: bool,
    idle: Option<Rc<dyn Fn()>>,
}

/// Deterministic event loop driven by [`advance`](ManualEventLoop::advance).
pub struct ManualEventLoop {
    state: RefCell<LoopState>,
}

impl ManualEventLoop {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            state: RefCell::new(LoopState {
                now: 0,
                today,
                next_id: 0,
                queue: BTreeMap::new(),
                running: None,
                running_cancelled: false,
                idle: None,
            }),
        }
    }

    pub fn set_today(&self, today: NaiveDate) {
        self.state.borrow_mut().today = today;
    }

    /// Hook run after every task, used to flush DOM mutation records between
    /// tasks the way a browser runs its microtask checkpoint.
    pub fn set_idle_hook(&self, hook: Rc<dyn Fn()>) {
        self.state.borrow_mut().idle = Some(hook);
    }

    /// Number of scheduled tasks, intervals included.
    pub fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }

    fn schedule(&self, due: u64, task: Task) -> TimerId {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = TimerId(state.next_id);
        state.queue.insert((due, id), task);
        id
    }

    fn run_idle(&self) {
        let hook = self.state.borrow().idle.clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Run every task due within the next `ms` milliseconds, in deadline
    /// order, moving the clock as it goes.
    pub fn advance(&self, ms: u64) {
        self.run_idle();
        let target = self.state.borrow().now + ms;
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                let key = match state.queue.keys().next() {
                    Some(&key) if key.0 <= target => key,
                    _ => break,
                };
                let task = state.queue.remove(&key);
                state.now = state.now.max(key.0);
                state.running = Some(key.1);
                state.running_cancelled = false;
                task.map(|t| (key, t))
            };
            let Some(((due, id), task)) = next else {
                continue;
            };
            match task {
                Task::Once(f) => f(),
                Task::Repeat(f, period) => {
                    f();
                    let mut state = self.state.borrow_mut();
                    if !state.running_cancelled {
                        state
                            .queue
                            .insert((due + period.max(1), id), Task::Repeat(f, period));
                    }
                }
            }
            self.state.borrow_mut().running = None;
            self.run_idle();
        }
        self.state.borrow_mut().now = target;
    }

    /// Run whatever is already due without moving the clock.
    pub fn flush(&self) {
        self.advance(0);
    }
}

impl EventLoop for ManualEventLoop {
    fn now_ms(&self) -> u64 {
        self.state.borrow().now
    }

    fn today(&self) -> NaiveDate {
        self.state.borrow().today
    }

    fn set_timeout(&self, delay_ms: u64, task: Box<dyn FnOnce()>) -> TimerId {
        let due = self.now_ms() + delay_ms;
        self.schedule(due, Task::Once(task))
    }

    fn set_interval(&self, period_ms: u64, task: Rc<dyn Fn()>) -> TimerId {
        let due = self.now_ms() + period_ms.max(1);
        self.schedule(due, Task::Repeat(task, period_ms))
    }

    fn request_animation_frame(&self, task: Box<dyn FnOnce()>) -> TimerId {
        let now = self.now_ms();
        let due = (now / FRAME_MS + 1) * FRAME_MS;
        self.schedule(due, Task::Once(task))
    }

    fn cancel(&self, id: TimerId) {
        let mut state = self.state.borrow_mut();
        if state.running == Some(id) {
            state.running_cancelled = true;
        }
        state.queue.retain(|(_, queued), _| *queued != id);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn event_loop() -> ManualEventLoop {
        ManualEventLoop::new(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
    }

    #[test]
    fn test_timeouts_run_in_deadline_order() {
        let el = event_loop();
        let log = Rc::new(RefCell::new(Vec::new()));
        for (delay, tag) in [(30, "c"), (10, "a"), (20, "b")] {
            let log = log.clone();
            el.set_timeout(delay, Box::new(move || log.borrow_mut().push(tag)));
        }
        el.advance(15);
        assert_eq!(*log.borrow(), vec!["a"]);
        el.advance(100);
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
        assert_eq!(el.now_ms(), 115);
    }

    #[test]
    fn test_interval_repeats_until_cancelled() {
        let el = Rc::new(event_loop());
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let id = el.set_interval(100, Rc::new(move || c.set(c.get() + 1)));
        el.advance(350);
        assert_eq!(count.get(), 3);
        el.cancel(id);
        el.advance(1000);
        assert_eq!(count.get(), 3);
        assert_eq!(el.pending(), 0);
    }

    #[test]
    fn test_interval_cancelling_itself() {
        let el = Rc::new(event_loop());
        let count = Rc::new(Cell::new(0));
        let id_slot: Rc<Cell<Option<TimerId>>> = Rc::new(Cell::new(None));
        let (c, slot, weak) = (count.clone(), id_slot.clone(), Rc::downgrade(&el));
        let id = el.set_interval(
            50,
            Rc::new(move || {
                c.set(c.get() + 1);
                if c.get() == 2
                    && let (Some(el), Some(id)) = (weak.upgrade(), slot.get())
                {
                    el.cancel(id);
                }
            }),
        );
        id_slot.set(Some(id));
        el.advance(500);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_animation_frames_align_to_frame_boundary() {
        let el = event_loop();
        let ran_at = Rc::new(Cell::new(0));
        el.advance(5);
        let r = ran_at.clone();
        el.request_animation_frame(Box::new(move || r.set(1)));
        el.advance(10);
        assert_eq!(ran_at.get(), 0);
        el.advance(1);
        assert_eq!(ran_at.get(), 1);
        assert_eq!(el.now_ms(), 16);
    }

    #[test]
    fn test_idle_hook_runs_after_each_task() {
        let el = event_loop();
        let idles = Rc::new(Cell::new(0));
        let i = idles.clone();
        el.set_idle_hook(Rc::new(move || i.set(i.get() + 1)));
        el.set_timeout(1, Box::new(|| {}));
        el.set_timeout(2, Box::new(|| {}));
        el.advance(5);
        // Once up front, once per task.
        assert_eq!(idles.get(), 3);
    }
}
