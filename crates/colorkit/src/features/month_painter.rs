//! Month view painter.
//!
//! Month cells have no reliable dates in every locale, so columns come from
//! geometry: the day squares are clustered by horizontal center and each
//! cluster takes the weekday of its position. Only squares this painter
//! marked are ever cleared.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use colorkit_core::Settings;
use colorkit_core::color::colors_match;
use colorkit_core::month_layout::{
    CellBox, GridCandidate, cluster_columns, month_weekdays, pick_month_grid,
};
use colorkit_core::selectors::{attr, class, role};
use colorkit_core::view::WeekStart;
use tracing::debug;

use super::{Host, set_attribute_if_changed};
use crate::dom::{DomEvent, EventKind, ListenerId, MutationRecord, NodeId, ObserveOptions};
use crate::observer::{Schedule, Subscription, subscribe};
use crate::timers::FrameCoalescer;

const BACKGROUND: &str = "background-color";

/// Attributes ColorKit itself writes; changes to them are ours, not the page's.
const OWN_ATTRIBUTES: [&str; 5] = [
    attr::PAINTED,
    attr::TASK_PAINTED,
    attr::COLUMN_INDEX,
    attr::DAY_PAINTED,
    attr::BLOCK_RANGE,
];

pub struct MonthPainter {
    host: Host,
    weak_self: Weak<Self>,
    /// `rgba(...)` per weekday, Sunday first.
    colors: RefCell<[Option<String>; 7]>,
    week_start: Cell<WeekStart>,
    active: Cell<bool>,
    frames: FrameCoalescer,
    grid_observer: RefCell<Option<(NodeId, Subscription)>>,
    resize_listener: Cell<Option<ListenerId>>,
    painted_cells: Cell<usize>,
}

impl MonthPainter {
    pub fn new(host: Host) -> Rc<Self> {
        let frames = FrameCoalescer::new(host.event_loop.clone());
        Rc::new_cyclic(|weak_self| Self {
            host,
            weak_self: weak_self.clone(),
            colors: RefCell::new(Default::default()),
            week_start: Cell::new(WeekStart::default()),
            active: Cell::new(false),
            frames,
            grid_observer: RefCell::new(None),
            resize_listener: Cell::new(None),
            painted_cells: Cell::new(0),
        })
    }

    /// Number of cell writes so far; a repaint over correct cells adds none.
    pub fn painted_cells(&self) -> usize {
        self.painted_cells.get()
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Color the month grid with these settings' weekday colors.
    ///
    /// The first paint waits two frames so the page's own transition frame
    /// settles first.
    pub fn apply_month_colors(&self, settings: &Settings) {
        *self.colors.borrow_mut() = settings.weekday_rgba();
        self.week_start.set(settings.week_start());
        self.active.set(true);
        self.ensure_resize_listener();
        let weak = self.weak_self.clone();
        self.frames.schedule_double(move || {
            if let Some(painter) = weak.upgrade() {
                painter.paint();
            }
        });
    }

    fn schedule_paint(&self) {
        let weak = self.weak_self.clone();
        self.frames.schedule(move || {
            if let Some(painter) = weak.upgrade() {
                painter.paint();
            }
        });
    }

    fn month_grid(&self) -> Option<NodeId> {
        let dom = &self.host.dom;
        let grids = dom.query_all(dom.document_element(), role::GRID);
        let candidates: Vec<GridCandidate> = grids
            .iter()
            .map(|&grid| GridCandidate {
                area: dom.bounding_rect(grid).area(),
                gridcell_count: dom.query_all(grid, role::GRIDCELL).len(),
            })
            .collect();
        pick_month_grid(&candidates).map(|i| grids[i])
    }

    /// Run one paint pass now.
    pub fn paint(&self) {
        if !self.active.get() {
            return;
        }
        let Some(grid) = self.month_grid() else {
            debug!("MonthPainter: no month grid");
            return;
        };
        self.ensure_grid_observer(grid);

        let dom = &self.host.dom;
        let squares = dom.query_all(grid, &format!(".{}", class::MONTH_DAY_SQUARE));
        let boxes: Vec<CellBox> = squares
            .iter()
            .map(|&square| {
                let rect = dom.bounding_rect(square);
                CellBox::new(rect.left, rect.top, rect.width, rect.height)
            })
            .collect();
        let columns = cluster_columns(&boxes);
        let weekdays = match month_weekdays(columns.len(), self.week_start.get()) {
            Ok(weekdays) => weekdays,
            Err(e) => {
                debug!("MonthPainter: {e}");
                return;
            }
        };

        let colors = self.colors.borrow().clone();
        let mut writes = 0;
        for (members, weekday) in columns.iter().zip(weekdays) {
            let rgba = colors[usize::from(weekday)].as_deref();
            for &index in members {
                if self.paint_square(squares[index], rgba) {
                    writes += 1;
                }
            }
        }
        if writes > 0 {
            debug!("MonthPainter: painted {writes} cells");
        }
    }

    /// Bring one square in line with `rgba`. Returns true if it was written.
    fn paint_square(&self, square: NodeId, rgba: Option<&str>) -> bool {
        let dom = &self.host.dom;
        let Some(rgba) = rgba else {
            if dom.attribute(square, attr::PAINTED).is_some() {
                self.unpaint(square);
                return true;
            }
            return false;
        };
        let marked = dom.attribute(square, attr::PAINTED).as_deref() == Some(rgba);
        let shown = dom
            .computed_style(square, BACKGROUND)
            .is_some_and(|current| colors_match(&current, rgba));
        if marked && shown {
            return false;
        }
        dom.set_inline_style(square, BACKGROUND, rgba, true);
        set_attribute_if_changed(dom.as_ref(), square, attr::PAINTED, rgba);
        self.painted_cells.set(self.painted_cells.get() + 1);
        true
    }

    fn unpaint(&self, square: NodeId) {
        let dom = &self.host.dom;
        dom.remove_inline_style(square, BACKGROUND);
        dom.remove_attribute(square, attr::PAINTED);
    }

    /// Frame-coalesced repaint on any page change inside the grid.
    fn ensure_grid_observer(&self, grid: NodeId) {
        if matches!(&*self.grid_observer.borrow(), Some((observed, _)) if *observed == grid) {
            return;
        }
        let dom = &self.host.dom;
        let weak = self.weak_self.clone();
        let classify = move |records: &[MutationRecord]| {
            let painter = weak.upgrade()?;
            records
                .iter()
                .any(|r| painter.is_page_change(r))
                .then_some(Schedule::NextFrame)
        };
        let weak = self.weak_self.clone();
        let subscription = subscribe(
            dom,
            &self.host.event_loop,
            grid,
            ObserveOptions::child_list_subtree().all_attributes(),
            classify,
            move || {
                if let Some(painter) = weak.upgrade() {
                    painter.paint();
                }
            },
        );
        // Replacing the old subscription drops it, which disconnects it.
        *self.grid_observer.borrow_mut() = Some((grid, subscription));
    }

    /// False for records produced by ColorKit's own writes, unless the page
    /// has since stomped a painted square's background.
    fn is_page_change(&self, record: &MutationRecord) -> bool {
        let Some(name) = record.attribute_name() else {
            return true;
        };
        if OWN_ATTRIBUTES.contains(&name) {
            return false;
        }
        if name != "style" {
            return true;
        }
        let dom = &self.host.dom;
        match dom.attribute(record.target, attr::PAINTED) {
            Some(expected) => !dom
                .computed_style(record.target, BACKGROUND)
                .is_some_and(|current| colors_match(&current, &expected)),
            None => false,
        }
    }

    fn ensure_resize_listener(&self) {
        if self.resize_listener.get().is_some() {
            return;
        }
        let weak = self.weak_self.clone();
        let id = self.host.dom.add_event_listener(
            EventKind::Resize,
            Rc::new(move |_: &DomEvent| {
                if let Some(painter) = weak.upgrade() {
                    painter.schedule_paint();
                }
            }),
        );
        self.resize_listener.set(Some(id));
    }

    /// Stop watching and strip every square this painter marked.
    pub fn clear(&self) {
        self.active.set(false);
        self.frames.cancel();
        if let Some((_, subscription)) = self.grid_observer.borrow_mut().take() {
            subscription.cancel();
        }
        if let Some(id) = self.resize_listener.take() {
            self.host.dom.remove_event_listener(id);
        }
        let dom = &self.host.dom;
        let painted = dom.query_all(dom.document_element(), &format!("[{}]", attr::PAINTED));
        for square in painted {
            self.unpaint(square);
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

    struct Month {
        dom: Rc<MemoryDom>,
        el: Rc<ManualEventLoop>,
        painter: Rc<MonthPainter>,
        /// Squares by `[week][column]`.
        squares: Vec<Vec<NodeId>>,
    }

    fn month(days: usize) -> Month {
        let dom = Rc::new(MemoryDom::new());
        let el = Rc::new(ManualEventLoop::new(
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        ));
        let d = dom.clone();
        el.set_idle_hook(Rc::new(move || {
            d.deliver_mutations();
        }));

        // A small unrelated grid (mini calendar) next to the month grid.
        let mini = dom.element(dom.body(), "div", &[("role", "grid")]);
        dom.set_rect(mini, Rect::new(0.0, 0.0, 200.0, 200.0));
        for _ in 0..42 {
            dom.element(mini, "div", &[("role", "gridcell")]);
        }

        let grid = dom.element(dom.body(), "div", &[("role", "grid")]);
        dom.set_rect(grid, Rect::new(300.0, 0.0, days as f64 * 104.0, 450.0));
        let mut squares = Vec::new();
        for week in 0..5 {
            let mut row = Vec::new();
            for day in 0..7 {
                let cell = dom.element(grid, "div", &[("role", "gridcell")]);
                if day >= days {
                    continue;
                }
                let square = dom.element(cell, "div", &[("class", "month-day-square")]);
                let jitter = if (week + day) % 2 == 0 { 0.3 } else { -0.2 };
                dom.set_rect(
                    square,
                    Rect::new(300.0 + day as f64 * 104.0 + jitter, week as f64 * 90.0, 100.0, 86.0),
                );
                row.push(square);
            }
            squares.push(row);
        }

        let host = Host::new(
            dom.clone(),
            el.clone(),
            Rc::new(MemorySettingsStore::new()),
            Config::default(),
        );
        let painter = MonthPainter::new(host);
        Month {
            dom,
            el,
            painter,
            squares,
        }
    }

    fn settings(week_start: i64) -> Settings {
        Settings::from_value(&json!({
            "weekdayColors": {"0": "#ff0000", "1": "#00ff00", "6": "#0000ff"},
            "weekdayOpacity": {"0": 50, "1": 50, "6": 50},
            "weekStart": week_start
        }))
        .unwrap()
    }

    fn background(dom: &MemoryDom, node: NodeId) -> Option<String> {
        dom.computed_style(node, BACKGROUND)
    }

    #[test]
    fn test_first_paint_waits_two_frames() {
        let m = month(7);
        m.painter.apply_month_colors(&settings(0));
        m.el.advance(16);
        assert_eq!(m.painter.painted_cells(), 0);
        m.el.advance(16);
        assert_eq!(m.painter.painted_cells(), 35);
    }

    #[test]
    fn test_columns_follow_week_start() {
        let m = month(7);
        m.painter.apply_month_colors(&settings(1));
        m.el.advance(32);
        // Monday start: column 0 is Monday, column 6 is Sunday.
        assert_eq!(
            background(&m.dom, m.squares[2][0]).as_deref(),
            Some("rgba(0, 255, 0, 0.5)")
        );
        assert_eq!(
            background(&m.dom, m.squares[4][6]).as_deref(),
            Some("rgba(255, 0, 0, 0.5)")
        );
        assert_eq!(
            m.dom.attribute(m.squares[0][5], attr::PAINTED).as_deref(),
            Some("rgba(0, 0, 255, 0.5)")
        );
    }

    #[test]
    fn test_weekends_hidden_is_monday_to_friday() {
        let m = month(5);
        m.painter.apply_month_colors(&settings(6));
        m.el.advance(32);
        assert_eq!(
            background(&m.dom, m.squares[0][0]).as_deref(),
            Some("rgba(0, 255, 0, 0.5)")
        );
    }

    #[test]
    fn test_repaint_skips_correct_cells() {
        let m = month(7);
        m.painter.apply_month_colors(&settings(0));
        m.el.advance(32);
        let writes = m.painter.painted_cells();
        m.painter.paint();
        m.el.advance(100);
        assert_eq!(m.painter.painted_cells(), writes);
    }

    #[test]
    fn test_stomped_cell_is_repainted_next_frame() {
        let m = month(7);
        m.painter.apply_month_colors(&settings(0));
        m.el.advance(32);
        let writes = m.painter.painted_cells();

        let square = m.squares[1][0];
        m.dom.set_attribute(square, "style", "background-color: white;");
        m.el.advance(16);
        assert_eq!(m.painter.painted_cells(), writes + 1);
        assert_eq!(
            background(&m.dom, square).as_deref(),
            Some("rgba(255, 0, 0, 0.5)")
        );
    }

    #[test]
    fn test_resize_repaints() {
        let m = month(7);
        m.painter.apply_month_colors(&settings(0));
        m.el.advance(32);
        // Reflow swaps the first two columns.
        for row in &m.squares {
            let a = m.dom.bounding_rect(row[0]);
            let b = m.dom.bounding_rect(row[1]);
            m.dom.set_rect(row[0], b);
            m.dom.set_rect(row[1], a);
        }
        m.dom.dispatch(DomEvent::Resize);
        m.el.advance(16);
        assert_eq!(
            background(&m.dom, m.squares[0][1]).as_deref(),
            Some("rgba(255, 0, 0, 0.5)")
        );
    }

    #[test]
    fn test_clear_only_touches_marked_cells() {
        let m = month(7);
        let foreign = m.squares[0][3];
        m.painter.apply_month_colors(&settings(0));
        m.el.advance(32);
        // Wednesday has a default color; strip our mark from one cell so it
        // looks like somebody else's paint.
        m.dom.remove_attribute(foreign, attr::PAINTED);
        m.painter.clear();
        assert!(background(&m.dom, m.squares[0][0]).is_none());
        assert!(background(&m.dom, foreign).is_some());
        assert_eq!(m.dom.observer_count(), 0);
        assert_eq!(m.dom.listener_count(), 0);
        m.el.advance(100);
        assert!(background(&m.dom, m.squares[0][0]).is_none());
    }
}
