//! Day-column coloring.
//!
//! Paints every visible day with its weekday color (or its date override):
//!
//! - day view: a scoped stylesheet for the event column and the matching
//!   mini-calendar day, backed by an inline `!important` background that is
//!   verified shortly after and watched for the page overwriting it
//! - week and custom-days views: one stylesheet rule per column, reached
//!   through both the `nth-child` anchors and the stamped column index
//! - month view: handed to the [`MonthPainter`]
//!
//! Once active the engine follows the page through a debounced observer on
//! the document element plus a URL poll, since client-side navigation does
//! not always produce a mutation the observer can see.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use chrono::NaiveDate;
use colorkit_core::column_map::{
    ColumnSignals, DatedCell, HeaderCell, has_leading_gutter, map_columns,
};
use colorkit_core::css::{ColumnPaint, WEEK_STRATEGIES, day_view_css, mini_calendar_cell, week_view_css};
use colorkit_core::selectors::{attr, class, owned, page_attr, role};
use colorkit_core::view::{ViewKind, WeekStart, date_from_url, weekday_index};
use colorkit_core::{Settings, color};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{DAY_COLORING, Feature, Host, MonthPainter, element_date, set_attribute_if_changed};
use crate::dom::{MutationRecord, NodeId, ObserveOptions};
use crate::event_loop::TimerId;
use crate::observer::{Schedule, Subscription, subscribe};
use crate::timers::TimerSet;

const BACKGROUND: &str = "background-color";

/// Page attributes whose change means the visible range may have moved.
const WATCHED_ATTRIBUTES: [&str; 4] = [
    page_attr::VIEW_KEY,
    page_attr::DATE_KEY,
    page_attr::DATE,
    page_attr::START_DATE_KEY,
];

/// Lifecycle of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Disabled,
    /// Waiting for the calendar to render.
    Initializing,
    Active,
    /// A paint pass is running.
    Reapplying,
}

/// Day-column coloring engine.
pub struct DayColoringEngine {
    host: Host,
    weak_self: Weak<Self>,
    state: Cell<EngineState>,
    settings: RefCell<Option<Settings>>,
    month: Rc<MonthPainter>,
    timers: TimerSet,
    main_observer: RefCell<Option<Subscription>>,
    /// Watches inline backgrounds in day view.
    style_observer: RefCell<Option<Subscription>>,
    fallback: Cell<Option<TimerId>>,
    last_href: RefCell<String>,
    last_view: Cell<Option<ViewKind>>,
    /// Background the day view should currently show.
    day_rgba: RefCell<Option<String>>,
    paints: Cell<usize>,
}

impl DayColoringEngine {
    pub fn new(host: Host) -> Rc<Self> {
        let month = MonthPainter::new(host.clone());
        let timers = TimerSet::new(host.event_loop.clone());
        Rc::new_cyclic(|weak_self| Self {
            host,
            weak_self: weak_self.clone(),
            state: Cell::new(EngineState::Disabled),
            settings: RefCell::new(None),
            month,
            timers,
            main_observer: RefCell::new(None),
            style_observer: RefCell::new(None),
            fallback: Cell::new(None),
            last_href: RefCell::new(String::new()),
            last_view: Cell::new(None),
            day_rgba: RefCell::new(None),
            paints: Cell::new(0),
        })
    }

    pub fn state(&self) -> EngineState {
        self.state.get()
    }

    pub fn month_painter(&self) -> &Rc<MonthPainter> {
        &self.month
    }

    /// Completed paint passes.
    pub fn paint_passes(&self) -> usize {
        self.paints.get()
    }

    fn parse(settings: &Value) -> Option<Settings> {
        match Settings::from_value(settings) {
            Ok(settings) => Some(settings),
            Err(e) => {
                warn!("DayColoringEngine: unreadable settings: {e}");
                None
            }
        }
    }

    fn start(&self, settings: Settings) {
        *self.settings.borrow_mut() = Some(settings);
        if self.state.get() != EngineState::Disabled {
            self.reapply();
            return;
        }
        info!("DayColoringEngine: waiting for the calendar");
        self.state.set(EngineState::Initializing);
        let started = self.host.event_loop.now_ms();
        self.poll_ready(started);
    }

    fn is_ready(&self) -> bool {
        let dom = &self.host.dom;
        let root = dom.document_element();
        dom.query(root, role::MAIN).is_some() || dom.query(root, role::GRID).is_some()
    }

    /// Bounded wait for the calendar. Always ends in [`activate`], found or not.
    ///
    /// [`activate`]: DayColoringEngine::activate
    fn poll_ready(&self, started: u64) {
        if self.state.get() != EngineState::Initializing {
            return;
        }
        let timing = &self.host.config.day_coloring;
        let elapsed = self.host.event_loop.now_ms().saturating_sub(started);
        if self.is_ready() {
            self.activate();
            return;
        }
        if elapsed >= timing.ready_timeout_ms {
            debug!("DayColoringEngine: calendar not found after {elapsed}ms, proceeding");
            self.activate();
            return;
        }
        let weak = self.weak_self.clone();
        self.timers.timeout(timing.ready_poll_ms, move || {
            if let Some(engine) = weak.upgrade() {
                engine.poll_ready(started);
            }
        });
    }

    fn activate(&self) {
        if self.state.get() != EngineState::Initializing {
            return;
        }
        self.state.set(EngineState::Active);
        info!("DayColoringEngine: active");
        self.paint();
        self.install_main_observer();
        self.start_href_poll();
    }

    fn install_main_observer(&self) {
        let dom = &self.host.dom;
        let timing = self.host.config.day_coloring.clone();
        let weak = self.weak_self.clone();
        let classify = move |records: &[MutationRecord]| {
            let engine = weak.upgrade()?;
            if records.iter().all(|r| engine.is_own_record(r)) {
                return None;
            }
            let view_changed = records.iter().any(|r| {
                matches!(
                    r.attribute_name(),
                    Some(page_attr::VIEW_KEY) | Some(page_attr::START_DATE_KEY)
                )
            }) || engine.host.current_view() != engine.last_view.get().unwrap_or(ViewKind::Other);
            Some(Schedule::After(if view_changed {
                timing.view_change_debounce_ms
            } else {
                timing.debounce_ms
            }))
        };
        let weak = self.weak_self.clone();
        let subscription = subscribe(
            dom,
            &self.host.event_loop,
            dom.document_element(),
            ObserveOptions::child_list_subtree().with_attributes(&WATCHED_ATTRIBUTES),
            classify,
            move || {
                if let Some(engine) = weak.upgrade() {
                    engine.reapply();
                }
            },
        );
        *self.main_observer.borrow_mut() = Some(subscription);
    }

    /// Records caused by our own stylesheet writes.
    fn is_own_record(&self, record: &MutationRecord) -> bool {
        let dom = &self.host.dom;
        record.target == dom.head()
            || dom.attribute(record.target, "id").as_deref() == Some(owned::DAY_STYLE_ID)
    }

    fn start_href_poll(&self) {
        let weak = self.weak_self.clone();
        self.timers
            .interval(self.host.config.day_coloring.href_poll_ms, move || {
                let Some(engine) = weak.upgrade() else {
                    return;
                };
                let href = engine.host.dom.location_href();
                if *engine.last_href.borrow() != href {
                    debug!("DayColoringEngine: navigation to {href}");
                    engine.reapply();
                }
            });
    }

    /// Repaint if the engine is running.
    pub fn reapply(&self) {
        if matches!(
            self.state.get(),
            EngineState::Active | EngineState::Reapplying
        ) {
            self.paint();
        }
    }

    fn paint(&self) {
        let Some(settings) = self.settings.borrow().clone() else {
            return;
        };
        if !settings.enabled {
            return;
        }
        self.state.set(EngineState::Reapplying);

        let href = self.host.dom.location_href();
        *self.last_href.borrow_mut() = href.clone();
        let view = self.host.current_view();
        if let Some(previous) = self.last_view.replace(Some(view))
            && previous != view
        {
            debug!(
                "DayColoringEngine: view {} -> {}",
                previous.as_str(),
                view.as_str()
            );
            self.leave_view(previous);
        }

        match view {
            ViewKind::Day => self.paint_day(&settings, &href),
            ViewKind::Week | ViewKind::CustomDays => self.paint_week(&settings),
            ViewKind::Month => {
                // The month painter owns month cells; a leftover column
                // stylesheet would fight it.
                self.remove_stylesheet();
                self.month.apply_month_colors(&settings);
            }
            ViewKind::Other => self.remove_stylesheet(),
        }

        self.paints.set(self.paints.get() + 1);
        self.state.set(EngineState::Active);
    }

    fn leave_view(&self, previous: ViewKind) {
        match previous {
            ViewKind::Day => {
                self.stop_day_watchers();
                self.clear_inline();
            }
            ViewKind::Month => self.month.clear(),
            _ => {}
        }
    }

    // ===== Day view =====

    fn paint_day(&self, settings: &Settings, href: &str) {
        let date = date_from_url(href).unwrap_or_else(|| self.host.event_loop.today());
        let weekday = weekday_index(date);
        let Some(rgba) = settings.rgba_for_day(weekday, Some(date)) else {
            debug!("DayColoringEngine: no color for {date}");
            self.remove_stylesheet();
            self.clear_inline();
            *self.day_rgba.borrow_mut() = None;
            return;
        };

        self.write_stylesheet(&day_view_css(&rgba, date));
        self.apply_day_inline(&rgba, date);
        *self.day_rgba.borrow_mut() = Some(rgba);

        self.ensure_style_observer();
        self.ensure_fallback();
        let weak = self.weak_self.clone();
        self.timers
            .timeout(self.host.config.day_coloring.verify_delay_ms, move || {
                if let Some(engine) = weak.upgrade() {
                    engine.verify_day(date);
                }
            });
    }

    /// Elements the day view paints: event columns and the mini-calendar day.
    fn day_targets(&self, date: NaiveDate) -> Vec<NodeId> {
        let dom = &self.host.dom;
        let root = dom.document_element();
        let mut targets = dom.query_all(root, &format!(".{}", class::DAY_VIEW_COLUMN));
        targets.extend(dom.query_all(root, &mini_calendar_cell(date)));
        targets
    }

    fn apply_day_inline(&self, rgba: &str, date: NaiveDate) {
        let dom = &self.host.dom;
        let targets = self.day_targets(date);
        // A previous date's mini-calendar cell may still carry our paint.
        let stale = dom.query_all(
            dom.document_element(),
            &format!("[{}]", attr::DAY_PAINTED),
        );
        for node in stale.into_iter().filter(|n| !targets.contains(n)) {
            self.clear_inline_on(node);
        }
        for node in targets {
            dom.set_inline_style(node, BACKGROUND, rgba, true);
            set_attribute_if_changed(dom.as_ref(), node, attr::DAY_PAINTED, "1");
        }
    }

    /// Re-apply the inline background wherever the stylesheet didn't win.
    fn verify_day(&self, date: NaiveDate) {
        if self.last_view.get() != Some(ViewKind::Day) {
            return;
        }
        let Some(rgba) = self.day_rgba.borrow().clone() else {
            return;
        };
        let dom = &self.host.dom;
        let mut repaired = 0;
        for node in self.day_targets(date) {
            let current = dom.computed_style(node, BACKGROUND).unwrap_or_default();
            if !color::colors_match(&current, &rgba) {
                dom.set_inline_style(node, BACKGROUND, &rgba, true);
                repaired += 1;
            }
        }
        if repaired > 0 {
            debug!("DayColoringEngine: verify re-applied {repaired} inline backgrounds");
        }
    }

    /// Immediate repaint when the page rewrites the style of a painted day.
    fn ensure_style_observer(&self) {
        if self.style_observer.borrow().is_some() {
            return;
        }
        let dom = &self.host.dom;
        let weak = self.weak_self.clone();
        let classify = move |records: &[MutationRecord]| {
            let engine = weak.upgrade()?;
            let rgba = engine.day_rgba.borrow().clone()?;
            let dom = &engine.host.dom;
            records
                .iter()
                .any(|r| {
                    dom.attribute(r.target, attr::DAY_PAINTED).is_some()
                        && !dom
                            .computed_style(r.target, BACKGROUND)
                            .is_some_and(|c| color::colors_match(&c, &rgba))
                })
                .then_some(Schedule::After(0))
        };
        let weak = self.weak_self.clone();
        let subscription = subscribe(
            dom,
            &self.host.event_loop,
            dom.body(),
            ObserveOptions {
                subtree: true,
                ..Default::default()
            }
            .with_attributes(&["style"]),
            classify,
            move || {
                if let Some(engine) = weak.upgrade() {
                    debug!("DayColoringEngine: day background overridden, repainting");
                    engine.reapply();
                }
            },
        );
        *self.style_observer.borrow_mut() = Some(subscription);
    }

    /// Periodic day-view repaint; cancels itself once the view changes.
    fn ensure_fallback(&self) {
        if self.fallback.get().is_some() {
            return;
        }
        let weak = self.weak_self.clone();
        let id = self
            .timers
            .interval(self.host.config.day_coloring.day_fallback_ms, move || {
                let Some(engine) = weak.upgrade() else {
                    return;
                };
                let running = matches!(engine.state.get(), EngineState::Active);
                if !running || engine.host.current_view() != ViewKind::Day {
                    engine.stop_fallback();
                    return;
                }
                engine.paint();
            });
        self.fallback.set(Some(id));
    }

    fn stop_fallback(&self) {
        if let Some(id) = self.fallback.take() {
            self.timers.cancel(id);
        }
    }

    fn stop_day_watchers(&self) {
        self.stop_fallback();
        if let Some(subscription) = self.style_observer.borrow_mut().take() {
            subscription.cancel();
        }
    }

    fn clear_inline_on(&self, node: NodeId) {
        let dom = &self.host.dom;
        dom.remove_inline_style(node, BACKGROUND);
        dom.remove_attribute(node, attr::DAY_PAINTED);
    }

    fn clear_inline(&self) {
        let dom = &self.host.dom;
        let painted = dom.query_all(
            dom.document_element(),
            &format!("[{}]", attr::DAY_PAINTED),
        );
        for node in painted {
            self.clear_inline_on(node);
        }
    }

    // ===== Week and custom-days views =====

    /// The main time grid, skipping the mini calendar's own grid.
    fn time_grid(&self) -> Option<NodeId> {
        let dom = &self.host.dom;
        dom.query_all(dom.document_element(), role::GRID)
            .into_iter()
            .find(|&grid| !self.host.in_mini_calendar(grid))
    }

    /// Cells of each row, with whether the row opens with a gutter.
    fn grid_rows(&self, grid: NodeId) -> Vec<(Vec<NodeId>, bool)> {
        let dom = &self.host.dom;
        dom.query_all(grid, role::ROW)
            .into_iter()
            .filter_map(|row| {
                let cells: Vec<NodeId> = dom
                    .children(row)
                    .into_iter()
                    .filter(|&c| dom.matches(c, role::GRIDCELL))
                    .collect();
                let &first = cells.first()?;
                let dated = element_date(dom.as_ref(), first).is_some();
                let gutter = has_leading_gutter(cells.len(), dated);
                Some((cells, gutter))
            })
            .collect()
    }

    fn extract_signals(&self, grid: NodeId, week_start: WeekStart) -> ColumnSignals {
        let dom = &self.host.dom;
        let mut signals = ColumnSignals {
            week_start,
            ..Default::default()
        };
        for (cells, gutter) in self.grid_rows(grid) {
            let days = cells.len() - usize::from(gutter);
            signals.column_count = signals.column_count.max(days);
            for (column, &cell) in cells.iter().enumerate() {
                if let Some(date) = element_date(dom.as_ref(), cell) {
                    signals.dated_cells.push(DatedCell {
                        column,
                        gutter,
                        date,
                    });
                }
            }
        }
        signals.headers = dom
            .query_all(dom.document_element(), role::COLUMN_HEADER)
            .into_iter()
            .filter(|&h| !self.host.in_mini_calendar(h))
            .map(|h| HeaderCell {
                center_x: dom.bounding_rect(h).center_x(),
                text: dom.text_content(h),
            })
            .collect();
        signals
    }

    fn paint_week(&self, settings: &Settings) {
        let Some(grid) = self.time_grid() else {
            debug!("DayColoringEngine: no time grid yet");
            return;
        };
        let signals = self.extract_signals(grid, settings.week_start());
        let mapping = match map_columns(&signals) {
            Ok(mapping) => mapping,
            Err(e) => {
                // Stale rules from the last layout would color the wrong days.
                debug!("DayColoringEngine: skipping pass: {e}");
                self.remove_stylesheet();
                return;
            }
        };

        let paints: Vec<ColumnPaint> = mapping
            .iter()
            .filter_map(|(column, weekday)| {
                settings
                    .rgba_for_day(weekday, mapping.date(column))
                    .map(|rgba| ColumnPaint { column, rgba })
            })
            .collect();
        self.write_stylesheet(&week_view_css(&paints, mapping.len(), WEEK_STRATEGIES));

        let dom = &self.host.dom;
        for (cells, gutter) in self.grid_rows(grid) {
            for (column, &cell) in cells.iter().skip(usize::from(gutter)).enumerate() {
                set_attribute_if_changed(
                    dom.as_ref(),
                    cell,
                    attr::COLUMN_INDEX,
                    &column.to_string(),
                );
            }
        }
    }

    // ===== Stylesheet =====

    pub fn stylesheet_text(&self) -> Option<String> {
        let dom = &self.host.dom;
        dom.element_by_id(owned::DAY_STYLE_ID)
            .map(|style| dom.text_content(style))
    }

    fn write_stylesheet(&self, css: &str) {
        let dom = &self.host.dom;
        let style = match dom.element_by_id(owned::DAY_STYLE_ID) {
            Some(style) => style,
            None => {
                let style = dom.create_element("style");
                dom.set_attribute(style, "id", owned::DAY_STYLE_ID);
                dom.append_child(dom.head(), style);
                style
            }
        };
        if dom.text_content(style) != css {
            dom.set_text_content(style, css);
        }
    }

    fn remove_stylesheet(&self) {
        let dom = &self.host.dom;
        if let Some(style) = dom.element_by_id(owned::DAY_STYLE_ID) {
            dom.remove(style);
        }
    }

    fn clear_column_indices(&self) {
        let dom = &self.host.dom;
        let stamped = dom.query_all(
            dom.document_element(),
            &format!("[{}]", attr::COLUMN_INDEX),
        );
        for node in stamped {
            dom.remove_attribute(node, attr::COLUMN_INDEX);
        }
    }
}

impl Feature for DayColoringEngine {
    fn id(&self) -> &'static str {
        DAY_COLORING
    }

    fn init(&self, settings: &Value) {
        match Self::parse(settings) {
            Some(settings) if settings.enabled => self.start(settings),
            parsed => {
                // Leftovers from an earlier session must not survive.
                self.teardown();
                *self.settings.borrow_mut() = parsed;
            }
        }
    }

    fn on_settings_changed(&self, settings: &Value) {
        let Some(next) = Self::parse(settings) else {
            return;
        };
        let unchanged = self
            .settings
            .borrow()
            .as_ref()
            .is_some_and(|current| current.same_day_coloring(&next));
        if unchanged {
            debug!("DayColoringEngine: settings unchanged, skipping repaint");
            *self.settings.borrow_mut() = Some(next);
            return;
        }
        if next.enabled {
            self.start(next);
        } else {
            info!("DayColoringEngine: disabled");
            self.teardown();
            *self.settings.borrow_mut() = Some(next);
        }
    }

    fn teardown(&self) {
        self.timers.clear();
        self.fallback.set(None);
        if let Some(subscription) = self.main_observer.borrow_mut().take() {
            subscription.cancel();
        }
        if let Some(subscription) = self.style_observer.borrow_mut().take() {
            subscription.cancel();
        }
        self.remove_stylesheet();
        self.clear_inline();
        self.clear_column_indices();
        self.month.clear();
        self.last_view.set(None);
        *self.day_rgba.borrow_mut() = None;
        if self.state.replace(EngineState::Disabled) != EngineState::Disabled {
            debug!("DayColoringEngine: torn down");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use colorkit_core::Config;
    use serde_json::json;

    use super::*;
    use crate::dom::{Dom, MemoryDom, Rect};
    use crate::event_loop::ManualEventLoop;
    use crate::storage::MemorySettingsStore;

    struct Page {
        dom: Rc<MemoryDom>,
        el: Rc<ManualEventLoop>,
        engine: Rc<DayColoringEngine>,
    }

    fn page() -> Page {
        let dom = Rc::new(MemoryDom::new());
        let el = Rc::new(ManualEventLoop::new(
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        ));
        let d = dom.clone();
        el.set_idle_hook(Rc::new(move || {
            d.deliver_mutations();
        }));
        let host = Host::new(
            dom.clone(),
            el.clone(),
            Rc::new(MemorySettingsStore::new()),
            Config::default(),
        );
        let engine = DayColoringEngine::new(host);
        Page { dom, el, engine }
    }

    fn settings(enabled: bool) -> Value {
        json!({
            "enabled": enabled,
            "weekdayColors": {"1": "#e8deff", "3": "#000000"},
            "weekdayOpacity": {"1": 30, "3": 50},
            "weekStart": 0
        })
    }

    /// Week grid with a leading gutter cell and no usable signals, so the
    /// arithmetic fallback decides.
    fn week_grid(dom: &MemoryDom, columns: usize) -> NodeId {
        dom.set_attribute(dom.body(), page_attr::VIEW_KEY, "WEEK");
        let grid = dom.element(dom.body(), "div", &[("role", "grid")]);
        let row = dom.element(grid, "div", &[("role", "row")]);
        dom.element(row, "div", &[("role", "gridcell")]);
        for _ in 0..columns {
            dom.element(row, "div", &[("role", "gridcell")]);
        }
        row
    }

    /// The stylesheet rule reaching `column` through its stamped index.
    fn rule_for(css: &str, column: usize) -> String {
        let selector = format!("[data-column-index=\"{column}\"]");
        css.split("}\n")
            .find(|rule| rule.contains(&selector))
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn test_disabled_init_leaves_nothing() {
        let p = page();
        p.engine.init(&settings(false));
        assert_eq!(p.engine.state(), EngineState::Disabled);
        assert_eq!(p.dom.observer_count(), 0);
        assert_eq!(p.el.pending(), 0);
        assert!(p.engine.stylesheet_text().is_none());
    }

    #[test]
    fn test_ready_wait_always_proceeds() {
        let p = page();
        p.engine.init(&settings(true));
        assert_eq!(p.engine.state(), EngineState::Initializing);
        p.el.advance(4900);
        assert_eq!(p.engine.state(), EngineState::Initializing);
        p.el.advance(200);
        assert_eq!(p.engine.state(), EngineState::Active);
    }

    #[test]
    fn test_week_columns_by_arithmetic() {
        let p = page();
        let row = week_grid(&p.dom, 7);
        p.engine.init(&settings(true));
        assert_eq!(p.engine.state(), EngineState::Active);

        let css = p.engine.stylesheet_text().unwrap();
        // Sunday start: column 1 is Monday, column 3 is Wednesday.
        assert!(rule_for(&css, 1).contains("rgba(232, 222, 255, 0.3)"));
        assert!(rule_for(&css, 3).contains("rgba(0, 0, 0, 0.5)"));
        assert!(!rule_for(&css, 0).contains("rgba(232, 222, 255, 0.3)"));
        // Unset weekdays keep their default colors.
        assert_eq!(css.matches('{').count(), 7);

        let cells = p.dom.children(row);
        assert_eq!(p.dom.attribute(cells[0], attr::COLUMN_INDEX), None);
        assert_eq!(
            p.dom.attribute(cells[2], attr::COLUMN_INDEX).as_deref(),
            Some("1")
        );
    }

    #[test]
    fn test_weekends_hidden_behind_gutter() {
        let p = page();
        let row = week_grid(&p.dom, 5);
        p.engine.init(&settings(true));
        p.el.advance(500);
        assert_eq!(p.engine.state(), EngineState::Active);

        let css = p.engine.stylesheet_text().unwrap();
        // Monday..Friday whatever the week start: column 0 Monday, 2 Wednesday.
        assert!(rule_for(&css, 0).contains("rgba(232, 222, 255, 0.3)"));
        assert!(rule_for(&css, 2).contains("rgba(0, 0, 0, 0.5)"));
        assert_eq!(css.matches('{').count(), 5);

        let cells = p.dom.children(row);
        assert_eq!(p.dom.attribute(cells[0], attr::COLUMN_INDEX), None);
        assert_eq!(
            p.dom.attribute(cells[1], attr::COLUMN_INDEX).as_deref(),
            Some("0")
        );
        assert_eq!(
            p.dom.attribute(cells[5], attr::COLUMN_INDEX).as_deref(),
            Some("4")
        );
    }

    #[test]
    fn test_unmappable_grid_skips_pass() {
        let p = page();
        // Gutter plus three days: four cells, no weekday layout fits.
        week_grid(&p.dom, 3);
        p.engine.init(&settings(true));
        assert_eq!(p.engine.state(), EngineState::Active);
        assert!(p.engine.stylesheet_text().is_none());
    }

    #[test]
    fn test_date_attributes_beat_week_start() {
        let p = page();
        p.dom.set_attribute(p.dom.body(), page_attr::VIEW_KEY, "WEEK");
        let grid = p.dom.element(p.dom.body(), "div", &[("role", "grid")]);
        let row = p.dom.element(grid, "div", &[("role", "row")]);
        // Monday 2024-01-15 .. Sunday 2024-01-21.
        for day in 15..=21 {
            let date = format!("202401{day}");
            p.dom
                .element(row, "div", &[("role", "gridcell"), ("data-date", &date)]);
        }
        p.engine.init(&settings(true));
        let css = p.engine.stylesheet_text().unwrap();
        // Monday is column 0, Wednesday column 2.
        assert!(rule_for(&css, 0).contains(":nth-child(1):nth-last-child(7)"));
        assert!(rule_for(&css, 0).contains("rgba(232, 222, 255, 0.3)"));
        assert!(rule_for(&css, 2).contains("rgba(0, 0, 0, 0.5)"));
    }

    #[test]
    fn test_header_text_mapping() {
        let p = page();
        p.dom.set_attribute(p.dom.body(), page_attr::VIEW_KEY, "WEEK");
        let grid = p.dom.element(p.dom.body(), "div", &[("role", "grid")]);
        // Headers in DOM order differ from screen order.
        let labels = ["MON 15", "TUE 16", "WED 17", "THU 18", "FRI 19", "SAT 20", "SUN 21"];
        for (i, label) in labels.iter().enumerate().rev() {
            let header = p
                .dom
                .element(grid, "div", &[("role", "columnheader")]);
            p.dom.set_text_content(header, label);
            p.dom
                .set_rect(header, Rect::new(i as f64 * 100.0, 0.0, 100.0, 20.0));
        }
        let row = p.dom.element(grid, "div", &[("role", "row")]);
        for _ in 0..7 {
            p.dom.element(row, "div", &[("role", "gridcell")]);
        }
        p.engine.init(&settings(true));
        let css = p.engine.stylesheet_text().unwrap();
        assert!(rule_for(&css, 0).contains("rgba(232, 222, 255, 0.3)"));
        assert!(rule_for(&css, 2).contains("rgba(0, 0, 0, 0.5)"));
    }

    #[test]
    fn test_mutation_triggers_debounced_repaint() {
        let p = page();
        week_grid(&p.dom, 7);
        p.engine.init(&settings(true));
        let passes = p.engine.paint_passes();

        let grid = p.engine.time_grid().unwrap();
        p.dom.element(grid, "div", &[]);
        p.el.advance(50);
        assert_eq!(p.engine.paint_passes(), passes);
        p.el.advance(60);
        assert_eq!(p.engine.paint_passes(), passes + 1);
    }

    #[test]
    fn test_own_stylesheet_writes_do_not_loop() {
        let p = page();
        week_grid(&p.dom, 7);
        p.engine.init(&settings(true));
        p.el.advance(400);
        let passes = p.engine.paint_passes();
        p.el.advance(400);
        assert_eq!(p.engine.paint_passes(), passes);
    }

    #[test]
    fn test_href_poll_catches_silent_navigation() {
        let p = page();
        p.dom.set_location("https://calendar.google.com/calendar/r/day/2024/1/15");
        p.dom.element(p.dom.body(), "div", &[("role", "main")]);
        p.engine.init(&settings(true));
        let passes = p.engine.paint_passes();
        p.dom.set_location("https://calendar.google.com/calendar/r/day/2024/1/17");
        p.el.advance(500);
        assert_eq!(p.engine.paint_passes(), passes + 1);
        let css = p.engine.stylesheet_text().unwrap();
        assert!(css.contains("[data-date=\"20240117\"]"));
        assert!(css.contains("rgba(0, 0, 0, 0.5)"));
    }

    #[test]
    fn test_identical_settings_short_circuit() {
        let p = page();
        week_grid(&p.dom, 7);
        p.engine.init(&settings(true));
        let passes = p.engine.paint_passes();
        let mut same = settings(true);
        same["taskColoring"] = json!({"enabled": true});
        p.engine.on_settings_changed(&same);
        assert_eq!(p.engine.paint_passes(), passes);

        let mut changed = settings(true);
        changed["weekdayColors"]["2"] = json!("#ff0000");
        p.engine.on_settings_changed(&changed);
        assert_eq!(p.engine.paint_passes(), passes + 1);
    }

    #[test]
    fn test_teardown_is_idempotent_and_complete() {
        let p = page();
        week_grid(&p.dom, 7);
        p.engine.init(&settings(true));
        assert!(p.dom.observer_count() > 0);

        p.engine.on_settings_changed(&settings(false));
        p.engine.teardown();
        assert_eq!(p.engine.state(), EngineState::Disabled);
        assert_eq!(p.dom.observer_count(), 0);
        assert_eq!(p.el.pending(), 0);
        assert!(p.engine.stylesheet_text().is_none());
        let stamped = p
            .dom
            .query_all(p.dom.document_element(), "[data-column-index]");
        assert!(stamped.is_empty());
    }
}
