//! Per-task chip coloring.
//!
//! Stored colors (`taskId -> hex`) are painted onto every visible chip of
//! that task. The page re-renders chips constantly, so painting is driven by
//! a body observer through a tapering throttle, with a short unthrottled
//! burst after anything that looks like navigation. The task editor gets a
//! row of color controls injected once its color host exists.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use colorkit_core::color::{colors_match, contrasting_text_color, is_valid_hex};
use colorkit_core::selectors::{TASK_ID_PREFIXES, attr, class, owned, page_attr, role};
use colorkit_core::{Error, Result, TaskColoringSettings};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Feature, Host, TASK_COLORING, parse_section, set_attribute_if_changed};
use crate::callbacks::CallbackId;
use crate::dom::{DomEvent, EventKind, ListenerId, MutationKind, MutationRecord, NodeId, ObserveOptions};
use crate::event_loop::TimerId;
use crate::observer::{Schedule, Subscription, subscribe};
use crate::storage::{StoreChange, TaskColorMap};
use crate::timers::{Debouncer, TimerSet};

const BACKGROUND: &str = "background-color";
const TEXT_COLOR: &str = "color";

/// Any element identifying a task.
const TASK_CHIP: &str =
    "[data-eventid^=\"tasks_\"], [data-eventid^=\"tasks.\"], [data-taskid]";

/// A single mutation adding more nodes than this looks like navigation.
const NAVIGATION_ADDED_NODES: usize = 5;

/// More back-to-back batches than this look like navigation.
const NAVIGATION_BATCHES: u32 = 3;

/// Words that mark the calendar's own appearance settings dialog.
const APPEARANCE_KEYWORDS: [&str; 3] = ["appearance", "theme", "density"];

/// Task id carried by a chip's attributes.
///
/// `data-eventid` values start with one of the task prefixes, which are
/// stripped; a plain `data-taskid` is used as is.
pub fn task_id_from_attributes(event_id: Option<&str>, task_id: Option<&str>) -> Option<String> {
    if let Some(event_id) = event_id
        && let Some(id) = TASK_ID_PREFIXES
            .iter()
            .find_map(|prefix| event_id.strip_prefix(prefix))
        && !id.is_empty()
    {
        return Some(id.to_string());
    }
    task_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Outcome of one injection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Injection {
    Injected,
    /// Not a dialog for an existing task; retrying won't help.
    Rejected,
    /// The color host isn't rendered yet.
    NotReady,
}

/// Repaint rate limiting for one burst of requests.
#[derive(Debug, Default)]
struct Throttle {
    /// Requests since the last quiet period.
    burst: u32,
    last_request: Option<u64>,
    pending: Option<TimerId>,
}

/// The task editor awaited after a chip click.
#[derive(Debug)]
struct EditorWait {
    task_id: String,
    clicked_at: u64,
    /// Dialog seen while waiting, with the time it first showed up.
    dialog: Option<(NodeId, u64)>,
}

/// Arrival of observer batches, for navigation detection.
#[derive(Debug, Default)]
struct BatchTracker {
    consecutive: u32,
    last_at: Option<u64>,
}

pub struct TaskColorEngine {
    host: Host,
    weak_self: Weak<Self>,
    settings: RefCell<TaskColoringSettings>,
    enabled: Cell<bool>,
    /// Color map and the time it was read.
    colors: RefCell<Option<(u64, TaskColorMap)>>,
    /// Chip elements from the last lookup.
    chips: RefCell<Option<Vec<NodeId>>>,
    timers: TimerSet,
    trailing: Debouncer,
    throttle: RefCell<Throttle>,
    batches: RefCell<BatchTracker>,
    /// Repaints left that skip the throttle.
    immediate_budget: Cell<u32>,
    observer: RefCell<Option<Subscription>>,
    click_listener: Cell<Option<ListenerId>>,
    store_listener: Cell<Option<CallbackId>>,
    injection: Cell<Option<TimerId>>,
    editor_wait: RefCell<Option<EditorWait>>,
    passes: Cell<usize>,
    paints: Cell<usize>,
}

impl TaskColorEngine {
    pub fn new(host: Host) -> Rc<Self> {
        let timers = TimerSet::new(host.event_loop.clone());
        let trailing = Debouncer::new(host.event_loop.clone());
        Rc::new_cyclic(|weak_self| Self {
            host,
            weak_self: weak_self.clone(),
            settings: RefCell::new(TaskColoringSettings::default()),
            enabled: Cell::new(false),
            colors: RefCell::new(None),
            chips: RefCell::new(None),
            timers,
            trailing,
            throttle: RefCell::new(Throttle::default()),
            batches: RefCell::new(BatchTracker::default()),
            immediate_budget: Cell::new(0),
            observer: RefCell::new(None),
            click_listener: Cell::new(None),
            store_listener: Cell::new(None),
            injection: Cell::new(None),
            editor_wait: RefCell::new(None),
            passes: Cell::new(0),
            paints: Cell::new(0),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    /// Chip writes so far. Chips already showing their color cost nothing.
    pub fn paint_count(&self) -> usize {
        self.paints.get()
    }

    /// Repaint passes run so far.
    pub fn paint_passes(&self) -> usize {
        self.passes.get()
    }

    fn now(&self) -> u64 {
        self.host.event_loop.now_ms()
    }

    // ===== Color map =====

    fn color_map(&self) -> TaskColorMap {
        let now = self.now();
        let ttl = self.host.config.tasks.cache_ttl_ms;
        if let Some((read_at, colors)) = &*self.colors.borrow()
            && now.saturating_sub(*read_at) < ttl
        {
            return colors.clone();
        }
        let colors = self.host.store.task_colors();
        *self.colors.borrow_mut() = Some((now, colors.clone()));
        colors
    }

    fn cache_colors(&self, colors: TaskColorMap) {
        *self.colors.borrow_mut() = Some((self.now(), colors));
    }

    /// Store `hex` for `task_id` and repaint right away.
    pub fn set_task_color(&self, task_id: &str, hex: &str) -> Result<()> {
        let hex = hex.trim().to_ascii_lowercase();
        if task_id.is_empty() || !is_valid_hex(&hex) {
            return Err(Error::SettingsValidation(vec![format!(
                "taskColors.{task_id}: invalid color {hex:?}"
            )]));
        }
        let mut colors = self.host.store.task_colors();
        colors.insert(task_id.to_string(), hex);
        self.host.store.save_task_colors(&colors)?;
        self.cache_colors(colors);
        self.repaint(true);
        Ok(())
    }

    /// Forget the color of `task_id`; its chips go back to the page's own.
    pub fn clear_task_color(&self, task_id: &str) -> Result<()> {
        let mut colors = self.host.store.task_colors();
        if colors.remove(task_id).is_some() {
            self.host.store.save_task_colors(&colors)?;
        }
        self.cache_colors(colors);
        self.repaint(true);
        Ok(())
    }

    // ===== Chips =====

    fn chips(&self) -> Vec<NodeId> {
        let dom = &self.host.dom;
        if let Some(chips) = &*self.chips.borrow()
            && chips.iter().all(|&chip| dom.is_connected(chip))
        {
            return chips.clone();
        }
        let chips = dom.query_all(dom.body(), TASK_CHIP);
        *self.chips.borrow_mut() = Some(chips.clone());
        chips
    }

    fn invalidate_chips(&self) {
        *self.chips.borrow_mut() = None;
    }

    fn node_task_id(&self, node: NodeId) -> Option<String> {
        let dom = &self.host.dom;
        task_id_from_attributes(
            dom.attribute(node, page_attr::EVENT_ID).as_deref(),
            dom.attribute(node, page_attr::TASK_ID).as_deref(),
        )
    }

    /// Task id of `node` or, failing that, of its parent.
    fn chip_task_id(&self, node: NodeId) -> Option<String> {
        self.node_task_id(node).or_else(|| {
            self.host
                .dom
                .parent(node)
                .and_then(|parent| self.node_task_id(parent))
        })
    }

    /// The chip's styleable surface: its inner button if it has one.
    fn paint_target(&self, chip: NodeId) -> NodeId {
        self.host.dom.query(chip, role::BUTTON).unwrap_or(chip)
    }

    fn in_dialog(&self, node: NodeId) -> bool {
        self.host.dom.closest(node, role::DIALOG).is_some()
    }

    /// Paint `target` with `hex` unless it already shows it. Returns true on
    /// a write.
    fn paint_chip(&self, target: NodeId, hex: &str) -> bool {
        let dom = &self.host.dom;
        let marked = dom.attribute(target, attr::TASK_PAINTED).as_deref() == Some(hex);
        let shown = dom
            .computed_style(target, BACKGROUND)
            .is_some_and(|current| colors_match(&current, hex));
        if marked && shown {
            return false;
        }
        dom.set_inline_style(target, BACKGROUND, hex, true);
        dom.set_inline_style(target, TEXT_COLOR, contrasting_text_color(hex), true);
        set_attribute_if_changed(dom.as_ref(), target, attr::TASK_PAINTED, hex);
        self.paints.set(self.paints.get() + 1);
        true
    }

    fn unpaint_chip(&self, target: NodeId) {
        let dom = &self.host.dom;
        dom.remove_inline_style(target, BACKGROUND);
        dom.remove_inline_style(target, TEXT_COLOR);
        dom.remove_attribute(target, attr::TASK_PAINTED);
    }

    /// Remove ColorKit paint from every chip, neutral included.
    fn strip_paint(&self) {
        let dom = &self.host.dom;
        let painted = dom.query_all(
            dom.document_element(),
            &format!("[{}]", attr::TASK_PAINTED),
        );
        for target in painted {
            self.unpaint_chip(target);
        }
    }

    fn paint_now(&self) {
        if !self.enabled.get() {
            return;
        }
        self.passes.set(self.passes.get() + 1);
        let colors = self.color_map();
        let mut written = 0;
        for chip in self.chips() {
            if self.in_dialog(chip) {
                continue;
            }
            let Some(task_id) = self.chip_task_id(chip) else {
                continue;
            };
            let target = self.paint_target(chip);
            match colors.get(&task_id) {
                Some(hex) => {
                    if self.paint_chip(target, hex) {
                        written += 1;
                    }
                }
                None => {
                    if self.host.dom.attribute(target, attr::TASK_PAINTED).is_some() {
                        self.unpaint_chip(target);
                    }
                }
            }
        }
        if written > 0 {
            debug!("TaskColorEngine: painted {written} chips");
        }
    }

    /// Paint every visible task chip with the fixed neutral color, whether
    /// or not it has a stored one.
    fn paint_neutral(&self) {
        let neutral = self.host.config.tasks.neutral_color.clone();
        let dom = &self.host.dom;
        let chips = dom.query_all(dom.body(), TASK_CHIP);
        for chip in chips {
            if self.in_dialog(chip) || self.chip_task_id(chip).is_none() {
                continue;
            }
            self.paint_chip(self.paint_target(chip), &neutral);
        }
        info!("TaskColorEngine: tasks reset to {neutral}");
    }

    // ===== Scheduling =====

    /// Repaint visible chips. `immediate` skips the throttle; user actions
    /// use it.
    pub fn repaint(&self, immediate: bool) {
        if immediate {
            self.cancel_pending();
            self.paint_now();
        } else {
            self.request_repaint();
        }
    }

    fn cancel_pending(&self) {
        if let Some(id) = self.throttle.borrow_mut().pending.take() {
            self.timers.cancel(id);
        }
    }

    fn request_repaint(&self) {
        let budget = self.immediate_budget.get();
        if budget > 0 {
            self.immediate_budget.set(budget - 1);
            self.repaint(true);
            return;
        }

        let timing = &self.host.config.tasks;
        let now = self.now();
        let mut throttle = self.throttle.borrow_mut();
        if throttle
            .last_request
            .is_none_or(|last| now.saturating_sub(last) >= timing.quiet_reset_ms)
        {
            throttle.burst = 0;
        }
        throttle.last_request = Some(now);

        if throttle.burst >= timing.burst_cap {
            drop(throttle);
            // Over the cap: drop the request, but make sure the final state
            // gets painted once things calm down.
            let weak = self.weak_self.clone();
            self.trailing.schedule(timing.quiet_reset_ms, move || {
                if let Some(engine) = weak.upgrade() {
                    engine.paint_now();
                }
            });
            return;
        }

        let spread = timing
            .max_repaint_interval_ms
            .saturating_sub(timing.min_repaint_interval_ms);
        let delay = timing.min_repaint_interval_ms
            + spread * u64::from(throttle.burst) / u64::from(timing.burst_cap.max(1));
        throttle.burst += 1;
        if throttle.pending.is_some() {
            return;
        }
        let weak = self.weak_self.clone();
        throttle.pending = Some(self.timers.timeout(delay, move || {
            if let Some(engine) = weak.upgrade() {
                engine.throttle.borrow_mut().pending = None;
                engine.paint_now();
            }
        }));
    }

    /// Forget cached chips and repaint in a staggered burst while the page
    /// finishes rendering.
    fn on_navigation(&self) {
        debug!("TaskColorEngine: navigation detected");
        self.invalidate_chips();
        let timing = &self.host.config.tasks;
        self.immediate_budget.set(timing.navigation_burst);
        for &delay in &timing.navigation_delays_ms {
            let weak = self.weak_self.clone();
            self.timers.timeout(delay, move || {
                if let Some(engine) = weak.upgrade() {
                    engine.request_repaint();
                }
            });
        }
    }

    /// Decide whether an observer batch needs a repaint, tracking navigation
    /// along the way.
    fn classify(&self, records: &[MutationRecord]) -> Option<Schedule> {
        let relevant: Vec<&MutationRecord> =
            records.iter().filter(|r| !self.in_dialog(r.target)).collect();
        if relevant.is_empty() {
            return None;
        }

        let now = self.now();
        let gap = self.host.config.tasks.max_repaint_interval_ms;
        let burst = {
            let mut batches = self.batches.borrow_mut();
            let back_to_back = batches
                .last_at
                .is_some_and(|last| now.saturating_sub(last) < gap);
            batches.consecutive = if back_to_back { batches.consecutive + 1 } else { 1 };
            batches.last_at = Some(now);
            let burst = batches.consecutive > NAVIGATION_BATCHES;
            if burst {
                batches.consecutive = 0;
            }
            burst
        };
        let large = relevant
            .iter()
            .any(|r| r.added_nodes() > NAVIGATION_ADDED_NODES);

        if large || burst {
            self.on_navigation();
        } else if relevant
            .iter()
            .any(|r| matches!(r.kind, MutationKind::ChildList { .. }))
        {
            self.invalidate_chips();
        }
        Some(Schedule::After(0))
    }

    // ===== Controls =====

    fn handle_click(&self, target: NodeId) {
        let dom = &self.host.dom;
        let controls_selector = format!(".{}", owned::TASK_CONTROLS_CLASS);

        if let Some(controls) = dom.closest(target, &controls_selector) {
            let swatch_selector = format!("[{}]", attr::SWATCH_COLOR);
            if let Some(swatch) = dom.closest(target, &swatch_selector)
                && swatch != controls
                && let Some(color) = dom.attribute(swatch, attr::SWATCH_COLOR)
            {
                set_attribute_if_changed(dom.as_ref(), controls, attr::SWATCH_COLOR, &color);
                return;
            }
            let Some(task_id) = dom.attribute(controls, attr::CONTROL_TASK) else {
                return;
            };
            let action = dom
                .closest(target, &format!("[{}]", attr::ACTION))
                .and_then(|button| dom.attribute(button, attr::ACTION));
            let result = match action.as_deref() {
                Some("apply") => match dom.attribute(controls, attr::SWATCH_COLOR) {
                    Some(color) => self.set_task_color(&task_id, &color),
                    None => Ok(()),
                },
                Some("clear") => self.clear_task_color(&task_id),
                _ => Ok(()),
            };
            if let Err(e) = result {
                warn!("TaskColorEngine: {e}");
            }
            return;
        }

        if self.in_dialog(target) {
            return;
        }
        if let Some(task_id) = self.chip_task_id(target) {
            *self.editor_wait.borrow_mut() = Some(EditorWait {
                task_id,
                clicked_at: self.now(),
                dialog: None,
            });
            self.cancel_injection();
            self.schedule_injection(1);
        }
    }

    fn cancel_injection(&self) {
        if let Some(id) = self.injection.take() {
            self.timers.cancel(id);
        }
    }

    fn schedule_injection(&self, attempt: u32) {
        let timing = &self.host.config.tasks;
        if attempt > timing.injection_max_attempts {
            if let Some(wait) = self.editor_wait.take() {
                debug!("TaskColorEngine: no editor for {}, giving up", wait.task_id);
            }
            return;
        }
        let delay = timing.injection_base_delay_ms * u64::from(attempt);
        let weak = self.weak_self.clone();
        let id = self.timers.timeout(delay, move || {
            let Some(engine) = weak.upgrade() else {
                return;
            };
            engine.injection.set(None);
            match engine.inject_awaited() {
                Injection::NotReady => engine.schedule_injection(attempt + 1),
                Injection::Injected | Injection::Rejected => {
                    engine.editor_wait.take();
                }
            }
        });
        self.injection.set(Some(id));
    }

    /// One attempt at the editor awaited after the last chip click.
    fn inject_awaited(&self) -> Injection {
        let dom = &self.host.dom;
        let Some(dialog) = dom.query(dom.body(), role::DIALOG) else {
            return Injection::NotReady;
        };
        let now = self.now();
        let window = self.host.config.tasks.editor_open_window_ms;
        let (task_id, opened_with_click) = {
            let mut guard = self.editor_wait.borrow_mut();
            let Some(wait) = guard.as_mut() else {
                return Injection::Rejected;
            };
            let seen_at = match wait.dialog {
                Some((seen, at)) if seen == dialog => at,
                _ => {
                    wait.dialog = Some((dialog, now));
                    now
                }
            };
            (
                wait.task_id.clone(),
                seen_at.saturating_sub(wait.clicked_at) <= window,
            )
        };
        self.try_inject(dialog, &task_id, opened_with_click)
    }

    fn is_appearance_dialog(&self, dialog: NodeId) -> bool {
        let dom = &self.host.dom;
        let mut text = dom.text_content(dialog);
        if let Some(label) = dom.attribute(dialog, "aria-label") {
            text.push(' ');
            text.push_str(&label);
        }
        let text = text.to_lowercase();
        APPEARANCE_KEYWORDS.iter().any(|word| text.contains(word))
    }

    /// Task ids the dialog itself names.
    fn dialog_task_ids(&self, dialog: NodeId) -> Vec<String> {
        let dom = &self.host.dom;
        std::iter::once(dialog)
            .chain(dom.query_all(dialog, TASK_CHIP))
            .filter_map(|node| self.node_task_id(node))
            .collect()
    }

    /// Add color controls for `task_id` to an open task editor. Returns true
    /// once the controls are present.
    ///
    /// The dialog must name `task_id`, unless `task_id` is the chip clicked
    /// within the editor open window.
    pub fn inject_controls(&self, dialog: NodeId, task_id: &str) -> bool {
        let now = self.now();
        let window = self.host.config.tasks.editor_open_window_ms;
        let just_clicked = self.editor_wait.borrow().as_ref().is_some_and(|wait| {
            wait.task_id == task_id && now.saturating_sub(wait.clicked_at) <= window
        });
        self.try_inject(dialog, task_id, just_clicked) == Injection::Injected
    }

    /// `opened_with_click`: the dialog appeared right after `task_id` was
    /// clicked, which stands in for a missing task marker.
    fn try_inject(&self, dialog: NodeId, task_id: &str, opened_with_click: bool) -> Injection {
        let dom = &self.host.dom;
        let controls_selector = format!(".{}", owned::TASK_CONTROLS_CLASS);
        if dom.query(dialog, &controls_selector).is_some() {
            return Injection::Injected;
        }
        if self.is_appearance_dialog(dialog) {
            debug!("TaskColorEngine: skipping appearance dialog");
            return Injection::Rejected;
        }
        let named = self.dialog_task_ids(dialog);
        if named.is_empty() {
            // A brand-new task has no id to store a color under.
            if !opened_with_click {
                debug!("TaskColorEngine: dialog is not for an existing task");
                return Injection::Rejected;
            }
        } else if !named.iter().any(|id| id == task_id) {
            debug!("TaskColorEngine: dialog belongs to another task, not {task_id}");
            return Injection::Rejected;
        }
        let Some(host) = dom.query(dialog, &format!(".{}", class::TASK_COLOR_HOST)) else {
            return Injection::NotReady;
        };

        let controls = self.build_controls(task_id);
        dom.append_child(host, controls);
        info!("TaskColorEngine: controls added for {task_id}");
        Injection::Injected
    }

    /// Detached controls element: one swatch per preset and inline color,
    /// then the Apply and Clear buttons.
    fn build_controls(&self, task_id: &str) -> NodeId {
        let dom = &self.host.dom;
        let controls = dom.create_element("div");
        dom.set_attribute(controls, "class", owned::TASK_CONTROLS_CLASS);
        dom.set_attribute(controls, attr::CONTROL_TASK, task_id);
        if let Some(current) = self.color_map().get(task_id) {
            dom.set_attribute(controls, attr::SWATCH_COLOR, current);
        }

        let settings = self.settings.borrow();
        for color in settings.preset_colors.iter().chain(&settings.inline_colors) {
            let swatch = dom.create_element("button");
            dom.set_attribute(swatch, "class", owned::SWATCH_CLASS);
            dom.set_attribute(swatch, attr::SWATCH_COLOR, color);
            dom.set_attribute(swatch, "title", color);
            dom.set_inline_style(swatch, BACKGROUND, color, false);
            dom.append_child(controls, swatch);
        }
        for (action, label) in [("apply", "Apply"), ("clear", "Clear")] {
            let button = dom.create_element("button");
            dom.set_attribute(button, attr::ACTION, action);
            dom.set_text_content(button, label);
            dom.append_child(controls, button);
        }
        controls
    }

    fn remove_controls(&self) {
        let dom = &self.host.dom;
        let selector = format!(".{}", owned::TASK_CONTROLS_CLASS);
        for controls in dom.query_all(dom.document_element(), &selector) {
            dom.remove(controls);
        }
    }

    // ===== Lifecycle =====

    fn start(&self) {
        self.enabled.set(true);
        let dom = &self.host.dom;

        if self.observer.borrow().is_none() {
            let weak = self.weak_self.clone();
            let classify = move |records: &[MutationRecord]| weak.upgrade()?.classify(records);
            let weak = self.weak_self.clone();
            let subscription = subscribe(
                dom,
                &self.host.event_loop,
                dom.body(),
                ObserveOptions::child_list_subtree()
                    .with_attributes(&[page_attr::EVENT_ID, page_attr::TASK_ID]),
                classify,
                move || {
                    if let Some(engine) = weak.upgrade() {
                        engine.request_repaint();
                    }
                },
            );
            *self.observer.borrow_mut() = Some(subscription);
        }

        if self.click_listener.get().is_none() {
            let weak = self.weak_self.clone();
            let id = dom.add_event_listener(
                EventKind::Click,
                Rc::new(move |event: &DomEvent| {
                    if let DomEvent::Click { target } = *event
                        && let Some(engine) = weak.upgrade()
                    {
                        engine.handle_click(target);
                    }
                }),
            );
            self.click_listener.set(Some(id));
        }

        if self.store_listener.get().is_none() {
            let weak = self.weak_self.clone();
            let id = self.host.store.on_change(Box::new(move |change: &StoreChange| {
                if let StoreChange::TaskColors(colors) = change
                    && let Some(engine) = weak.upgrade()
                {
                    engine.cache_colors(colors.clone());
                    engine.repaint(true);
                }
            }));
            self.store_listener.set(Some(id));
        }

        info!("TaskColorEngine: enabled");
        self.repaint(true);
    }

    /// Release everything the engine holds. Painted chips stay as they are.
    fn stop(&self) {
        self.enabled.set(false);
        self.timers.clear();
        self.trailing.cancel();
        self.injection.set(None);
        *self.throttle.borrow_mut() = Throttle::default();
        *self.batches.borrow_mut() = BatchTracker::default();
        self.immediate_budget.set(0);
        if let Some(subscription) = self.observer.borrow_mut().take() {
            subscription.cancel();
        }
        if let Some(id) = self.click_listener.take() {
            self.host.dom.remove_event_listener(id);
        }
        if let Some(id) = self.store_listener.take() {
            self.host.store.remove_listener(id);
        }
        self.remove_controls();
        self.invalidate_chips();
        *self.colors.borrow_mut() = None;
        self.editor_wait.take();
    }

    fn disable(&self) {
        let was_enabled = self.enabled.get();
        self.stop();
        if was_enabled {
            self.paint_neutral();
        }
    }
}

impl Feature for TaskColorEngine {
    fn id(&self) -> &'static str {
        TASK_COLORING
    }

    fn init(&self, settings: &Value) {
        let parsed: TaskColoringSettings = parse_section(TASK_COLORING, settings);
        let enabled = parsed.enabled;
        *self.settings.borrow_mut() = parsed;
        if enabled {
            self.start();
        } else {
            self.stop();
        }
    }

    fn on_settings_changed(&self, settings: &Value) {
        let parsed: TaskColoringSettings = parse_section(TASK_COLORING, settings);
        let enabled = parsed.enabled;
        *self.settings.borrow_mut() = parsed;
        match (self.enabled.get(), enabled) {
            (false, true) => self.start(),
            (true, false) => self.disable(),
            (true, true) => self.repaint(true),
            (false, false) => {}
        }
    }

    fn teardown(&self) {
        self.stop();
        self.strip_paint();
    }
}
