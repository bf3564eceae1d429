//! End-to-end scenarios: the standard features booted through the registry
//! against an in-memory calendar page.

use std::rc::Rc;

use chrono::NaiveDate;
use colorkit::dom::{Dom, MemoryDom, NodeId, Rect};
use colorkit::event_loop::ManualEventLoop;
use colorkit::features::{
    DayColoringEngine, FeatureRegistry, Host, TIME_BLOCKING, TaskColorEngine, TimeBlockRenderer,
};
use colorkit::storage::{MemorySettingsStore, SettingsStore, StoredDocument};
use colorkit_core::{Config, date_key};
use serde_json::{Value, json};

const BACKGROUND: &str = "background-color";

struct Calendar {
    dom: Rc<MemoryDom>,
    el: Rc<ManualEventLoop>,
    store: Rc<MemorySettingsStore>,
    registry: Rc<FeatureRegistry>,
    day: Rc<DayColoringEngine>,
}

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
}

fn calendar(document: StoredDocument) -> Calendar {
    let dom = Rc::new(MemoryDom::new());
    let el = Rc::new(ManualEventLoop::new(monday()));
    let d = dom.clone();
    el.set_idle_hook(Rc::new(move || {
        d.deliver_mutations();
    }));
    let store = Rc::new(MemorySettingsStore::with_document(document));
    let host = Host::new(dom.clone(), el.clone(), store.clone(), Config::default());

    let registry = FeatureRegistry::new(host.clone());
    let day = DayColoringEngine::new(host.clone());
    registry.register(day.clone());
    registry.register(TaskColorEngine::new(host.clone()));
    registry.register(TimeBlockRenderer::new(host));
    Calendar {
        dom,
        el,
        store,
        registry,
        day,
    }
}

fn with_settings(settings: Value) -> StoredDocument {
    StoredDocument {
        settings: Some(settings),
        task_colors: None,
        subscription_active: Some(true),
    }
}

fn background(dom: &MemoryDom, node: NodeId) -> Option<String> {
    dom.computed_style(node, BACKGROUND)
}

fn day_container(dom: &MemoryDom, date: NaiveDate, height: f64) -> NodeId {
    let key = date_key::encode(date).unwrap().to_string();
    let node = dom.element(dom.body(), "div", &[("data-datekey", key.as_str())]);
    dom.set_rect(node, Rect::new(0.0, 0.0, 120.0, height));
    node
}

#[test]
fn test_day_view_colors_column_and_mini_calendar() {
    let c = calendar(with_settings(json!({
        "enabled": true,
        "weekdayColors": {"1": "#e8deff"},
        "weekdayOpacity": {"1": 30}
    })));
    c.dom
        .set_location("https://calendar.google.com/calendar/r/day/2024/1/15");
    c.dom.set_attribute(c.dom.body(), "data-viewkey", "DAY");
    let main = c.dom.element(c.dom.body(), "div", &[("role", "main")]);
    let column = c.dom.element(main, "div", &[("class", "day-view-column")]);
    let mini = c.dom.element(c.dom.body(), "div", &[("class", "mini-calendar")]);
    let cell = c.dom.element(mini, "div", &[("data-date", "20240115")]);

    c.registry.boot();

    assert!(c.registry.is_booted());
    assert_eq!(
        background(&c.dom, column).as_deref(),
        Some("rgba(232, 222, 255, 0.3)")
    );
    assert_eq!(
        background(&c.dom, cell).as_deref(),
        Some("rgba(232, 222, 255, 0.3)")
    );
    let css = c.day.stylesheet_text().unwrap();
    assert!(css.contains(".day-view-column"));
    assert!(css.contains(".mini-calendar [data-date=\"20240115\"]"));
}

#[test]
fn test_week_view_follows_store_changes() {
    let c = calendar(with_settings(json!({"enabled": true})));
    c.dom.set_attribute(c.dom.body(), "data-viewkey", "WEEK");
    let grid = c.dom.element(c.dom.body(), "div", &[("role", "grid")]);
    let row = c.dom.element(grid, "div", &[("role", "row")]);
    for _ in 0..7 {
        c.dom.element(row, "div", &[("role", "gridcell")]);
    }
    c.registry.boot();
    let css = c.day.stylesheet_text().unwrap();
    assert!(css.contains("rgba(232, 222, 255, 0.3)"));

    c.store
        .merge(json!({"weekdayColors": {"1": "#000000"}, "weekdayOpacity": {"1": 50}}))
        .unwrap();
    let css = c.day.stylesheet_text().unwrap();
    assert!(css.contains("rgba(0, 0, 0, 0.5)"));
    assert!(!css.contains("rgba(232, 222, 255, 0.3)"));
}

#[test]
fn test_month_view_paints_and_clears() {
    let c = calendar(with_settings(json!({"enabled": true})));
    c.dom.set_attribute(c.dom.body(), "data-viewkey", "MONTH");
    let grid = c.dom.element(c.dom.body(), "div", &[("role", "grid")]);
    c.dom.set_rect(grid, Rect::new(0.0, 0.0, 728.0, 450.0));
    let mut squares = Vec::new();
    for week in 0..5 {
        for day in 0..7 {
            let cell = c.dom.element(grid, "div", &[("role", "gridcell")]);
            let square = c.dom.element(cell, "div", &[("class", "month-day-square")]);
            c.dom.set_rect(
                square,
                Rect::new(day as f64 * 104.0, week as f64 * 90.0, 100.0, 86.0),
            );
            squares.push(square);
        }
    }

    c.registry.boot();
    c.el.advance(32);
    // Sunday start: the first column is Sunday, the second Monday.
    assert_eq!(
        background(&c.dom, squares[0]).as_deref(),
        Some("rgba(255, 213, 213, 0.3)")
    );
    assert_eq!(
        background(&c.dom, squares[8]).as_deref(),
        Some("rgba(232, 222, 255, 0.3)")
    );

    c.store.merge(json!({"enabled": false})).unwrap();
    assert!(squares.iter().all(|&s| background(&c.dom, s).is_none()));
}

#[test]
fn test_disabling_tasks_resets_to_neutral_and_keeps_colors() {
    let c = calendar(StoredDocument {
        settings: Some(json!({"taskColoring": {"enabled": true}})),
        task_colors: Some(
            [("abc123", "#ff0000"), ("def456", "#00ff00")]
                .into_iter()
                .map(|(id, hex)| (id.to_string(), hex.to_string()))
                .collect(),
        ),
        subscription_active: Some(true),
    });
    let mut buttons = Vec::new();
    for event_id in ["tasks_abc123", "tasks.abc123", "tasks_def456"] {
        let chip = c.dom.element(c.dom.body(), "div", &[("data-eventid", event_id)]);
        buttons.push(c.dom.element(chip, "div", &[("role", "button")]));
    }

    c.registry.boot();
    assert_eq!(background(&c.dom, buttons[0]).as_deref(), Some("#ff0000"));
    assert_eq!(background(&c.dom, buttons[1]).as_deref(), Some("#ff0000"));
    assert_eq!(background(&c.dom, buttons[2]).as_deref(), Some("#00ff00"));

    c.store
        .merge(json!({"taskColoring": {"enabled": false}}))
        .unwrap();
    for &button in &buttons {
        assert_eq!(background(&c.dom, button).as_deref(), Some("#4285f4"));
    }
    assert_eq!(c.store.task_colors().len(), 2);

    c.store
        .merge(json!({"taskColoring": {"enabled": true}}))
        .unwrap();
    assert_eq!(background(&c.dom, buttons[1]).as_deref(), Some("#ff0000"));
    assert_eq!(background(&c.dom, buttons[2]).as_deref(), Some("#00ff00"));
}

#[test]
fn test_time_block_geometry() {
    let c = calendar(with_settings(json!({
        "timeBlocking": {
            "enabled": true,
            "weeklySchedule": {
                "mon": [{"timeRange": ["09:00", "10:30"], "color": "#FFEB3B"}]
            }
        }
    })));
    let day = day_container(&c.dom, monday(), 960.0);
    c.registry.boot();

    let blocks = c.dom.query_all(day, ".colorkit-time-block");
    assert_eq!(blocks.len(), 1);
    assert_eq!(c.dom.inline_style(blocks[0], "top").as_deref(), Some("360px"));
    assert_eq!(c.dom.inline_style(blocks[0], "height").as_deref(), Some("60px"));

    c.registry
        .save_settings(
            TIME_BLOCKING,
            json!({"weeklySchedule": {"mon": [{"timeRange": ["13:00", "14:00"]}]}}),
        )
        .unwrap();
    let blocks = c.dom.query_all(day, ".colorkit-time-block");
    assert_eq!(blocks.len(), 1);
    assert_eq!(c.dom.inline_style(blocks[0], "top").as_deref(), Some("520px"));
    assert_eq!(c.registry.get_settings(TIME_BLOCKING)["enabled"], json!(true));
}

#[test]
fn test_subscription_gates_features() {
    let c = calendar(StoredDocument {
        settings: Some(json!({
            "timeBlocking": {
                "enabled": true,
                "weeklySchedule": {"mon": [{"timeRange": ["09:00", "10:00"]}]}
            }
        })),
        task_colors: None,
        subscription_active: Some(false),
    });
    let day = day_container(&c.dom, monday(), 960.0);

    c.registry.boot();
    assert!(!c.registry.is_booted());
    assert!(c.dom.query_all(day, ".colorkit-time-block").is_empty());

    c.store.set_subscription_active(true);
    assert!(c.registry.is_booted());
    assert_eq!(c.dom.query_all(day, ".colorkit-time-block").len(), 1);

    c.store.set_subscription_active(false);
    assert!(!c.registry.is_booted());
    assert!(c.dom.query_all(day, ".colorkit-time-block").is_empty());
    assert_eq!(c.dom.observer_count(), 0);
    assert_eq!(c.dom.listener_count(), 0);
}

#[test]
fn test_shutdown_leaves_no_timers() {
    let c = calendar(with_settings(json!({
        "enabled": true,
        "taskColoring": {"enabled": true},
        "timeBlocking": {"enabled": true}
    })));
    c.dom.element(c.dom.body(), "div", &[("role", "main")]);
    c.registry.boot();
    c.el.advance(1000);
    c.registry.shutdown();
    assert_eq!(c.el.pending(), 0);
    assert_eq!(c.dom.observer_count(), 0);
    assert_eq!(c.dom.listener_count(), 0);
}
