//! Calendar features and the registry that drives them.
//!
//! A feature is a self-contained engine with a four-call lifecycle:
//! `init` with its settings, `on_settings_changed` for every later update,
//! and an idempotent `teardown`. The [`FeatureRegistry`] owns the features,
//! boots them from the store once the subscription gate is open, and routes
//! store changes to them.
//!
//! Features receive their settings as raw JSON. `dayColoring` is the odd one
//! out: it gets the whole top-level settings object, every other feature gets
//! the sub-object stored under its id.

mod day_coloring;
mod month_painter;
mod task_coloring;
mod time_blocks;

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use chrono::NaiveDate;
use colorkit_core::selectors::{class, page_attr};
use colorkit_core::view::{ViewKind, parse_compact_or_iso_date};
use colorkit_core::{Config, Result, date_key};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::callbacks::CallbackId;
use crate::dom::{Dom, NodeId};
use crate::event_loop::EventLoop;
use crate::storage::{SettingsStore, StoreChange};
use crate::timers::TimerSet;

pub use day_coloring::{DayColoringEngine, EngineState};
pub use month_painter::MonthPainter;
pub use task_coloring::{TaskColorEngine, task_id_from_attributes};
pub use time_blocks::TimeBlockRenderer;

/// Feature id whose settings are the whole top-level object.
pub const DAY_COLORING: &str = "dayColoring";
pub const TASK_COLORING: &str = "taskColoring";
pub const TIME_BLOCKING: &str = "timeBlocking";

/// Everything an engine needs from its surroundings.
#[derive(Clone)]
pub struct Host {
    pub dom: Rc<dyn Dom>,
    pub event_loop: Rc<dyn EventLoop>,
    pub store: Rc<dyn SettingsStore>,
    pub config: Rc<Config>,
}

impl Host {
    pub fn new(
        dom: Rc<dyn Dom>,
        event_loop: Rc<dyn EventLoop>,
        store: Rc<dyn SettingsStore>,
        config: Config,
    ) -> Self {
        Self {
            dom,
            event_loop,
            store,
            config: Rc::new(config),
        }
    }

    /// The view the calendar says it is showing, falling back to the URL.
    pub fn current_view(&self) -> ViewKind {
        let dom = &self.dom;
        let body = dom.body();
        let key = dom.attribute(body, page_attr::VIEW_KEY).or_else(|| {
            let selector = format!("[{}]", page_attr::VIEW_KEY);
            dom.query(dom.document_element(), &selector)
                .and_then(|node| dom.attribute(node, page_attr::VIEW_KEY))
        });
        match key.map(|k| ViewKind::from_view_key(&k)) {
            Some(kind) if kind != ViewKind::Other => kind,
            _ => ViewKind::from_url(&dom.location_href()),
        }
    }

    /// Whether `node` belongs to the sidebar mini calendar.
    pub(crate) fn in_mini_calendar(&self, node: NodeId) -> bool {
        self.dom
            .closest(node, &format!(".{}", class::MINI_CALENDAR))
            .is_some()
    }
}

/// Set an attribute only when its value differs, so repeated passes don't
/// generate mutation records.
pub(crate) fn set_attribute_if_changed(dom: &dyn Dom, node: NodeId, name: &str, value: &str) {
    if dom.attribute(node, name).as_deref() != Some(value) {
        dom.set_attribute(node, name, value);
    }
}

/// Date a grid cell or day container carries, from whichever attribute the
/// page used: `data-date`, the packed `data-datekey`, or a nested `<time>`.
pub(crate) fn element_date(dom: &dyn Dom, node: NodeId) -> Option<NaiveDate> {
    if let Some(date) = dom
        .attribute(node, page_attr::DATE)
        .and_then(|v| parse_compact_or_iso_date(&v))
    {
        return Some(date);
    }
    if let Some(date) = dom
        .attribute(node, page_attr::DATE_KEY)
        .and_then(|v| date_key::parse(&v))
    {
        return Some(date);
    }
    let time = dom.query(node, &format!("time[{}]", page_attr::DATETIME))?;
    let value = dom.attribute(time, page_attr::DATETIME)?;
    parse_compact_or_iso_date(value.get(..10).unwrap_or(&value))
}

/// Deserialize one feature's settings section, falling back to defaults when
/// the section is missing or malformed.
pub(crate) fn parse_section<T: DeserializeOwned + Default>(feature: &str, value: &Value) -> T {
    try_parse_section(feature, value).unwrap_or_default()
}

/// Deserialize one feature's settings section. A missing section yields the
/// defaults; a malformed one is logged and yields `None`.
pub(crate) fn try_parse_section<T: DeserializeOwned + Default>(
    feature: &str,
    value: &Value,
) -> Option<T> {
    if value.is_null() {
        return Some(T::default());
    }
    serde_json::from_value(value.clone())
        .inspect_err(|e| warn!("{feature}: unreadable settings: {e}"))
        .ok()
}

/// A calendar feature managed by the [`FeatureRegistry`].
pub trait Feature {
    fn id(&self) -> &'static str;

    /// First call after boot.
    fn init(&self, settings: &Value);

    fn on_settings_changed(&self, settings: &Value);

    /// Release every observer, listener and timer and strip everything the
    /// feature painted. Safe to call at any time, any number of times.
    fn teardown(&self);
}

/// Host for the calendar features.
pub struct FeatureRegistry {
    host: Host,
    weak_self: Weak<Self>,
    features: RefCell<Vec<Rc<dyn Feature>>>,
    /// Last known top-level settings object.
    settings: RefCell<Value>,
    booted: Cell<bool>,
    listener: Cell<Option<CallbackId>>,
    timers: TimerSet,
}

impl FeatureRegistry {
    pub fn new(host: Host) -> Rc<Self> {
        let timers = TimerSet::new(host.event_loop.clone());
        Rc::new_cyclic(|weak_self| Self {
            host,
            weak_self: weak_self.clone(),
            features: RefCell::new(Vec::new()),
            settings: RefCell::new(Value::Null),
            booted: Cell::new(false),
            listener: Cell::new(None),
            timers,
        })
    }

    /// Registry with the three standard features registered.
    pub fn with_default_features(host: Host) -> Rc<Self> {
        let registry = Self::new(host.clone());
        registry.register(DayColoringEngine::new(host.clone()));
        registry.register(TaskColorEngine::new(host.clone()));
        registry.register(TimeBlockRenderer::new(host));
        registry
    }

    pub fn register(&self, feature: Rc<dyn Feature>) {
        debug!("FeatureRegistry: registered {}", feature.id());
        self.features.borrow_mut().push(feature);
    }

    pub fn feature(&self, id: &str) -> Option<Rc<dyn Feature>> {
        self.features.borrow().iter().find(|f| f.id() == id).cloned()
    }

    pub fn is_booted(&self) -> bool {
        self.booted.get()
    }

    /// Load settings and start every feature.
    ///
    /// Does nothing while the subscription is inactive; the registry boots
    /// by itself once the store reports it active. An empty store is re-read
    /// once after a short delay, then features start with whatever is there.
    pub fn boot(&self) {
        self.ensure_listener();
        if self.booted.get() {
            return;
        }
        if !self.host.store.subscription_active() {
            info!("FeatureRegistry: subscription inactive, features stay off");
            return;
        }
        self.load_and_start(true);
    }

    fn load_and_start(&self, allow_retry: bool) {
        if self.booted.get() || !self.host.store.subscription_active() {
            return;
        }
        let all = self.host.store.get_all();
        if is_empty_settings(&all) && allow_retry {
            let delay = self.host.config.registry.boot_retry_ms;
            debug!("FeatureRegistry: store empty, retrying in {delay}ms");
            let weak = self.weak_self.clone();
            self.timers.timeout(delay, move || {
                if let Some(registry) = weak.upgrade() {
                    registry.load_and_start(false);
                }
            });
            return;
        }

        *self.settings.borrow_mut() = all;
        self.booted.set(true);
        let features = self.features.borrow().clone();
        info!("FeatureRegistry: booting {} features", features.len());
        for feature in features {
            let settings = self.get_settings(feature.id());
            feature.init(&settings);
        }
    }

    fn ensure_listener(&self) {
        if self.listener.get().is_some() {
            return;
        }
        let weak = self.weak_self.clone();
        let id = self.host.store.on_change(Box::new(move |change| {
            if let Some(registry) = weak.upgrade() {
                registry.handle_store_change(change);
            }
        }));
        self.listener.set(Some(id));
    }

    fn handle_store_change(&self, change: &StoreChange) {
        match change {
            StoreChange::Settings(all) => {
                *self.settings.borrow_mut() = all.clone();
                if !self.booted.get() {
                    return;
                }
                let features = self.features.borrow().clone();
                for feature in features {
                    let settings = self.get_settings(feature.id());
                    feature.on_settings_changed(&settings);
                }
            }
            StoreChange::Subscription(false) => {
                info!("FeatureRegistry: subscription ended, tearing down");
                self.teardown_all();
            }
            StoreChange::Subscription(true) => {
                info!("FeatureRegistry: subscription active");
                self.boot();
            }
            // The task engine listens for its own map.
            StoreChange::TaskColors(_) => {}
        }
    }

    /// Push new settings to one feature.
    pub fn update_feature(&self, id: &str, settings: Value) {
        {
            let mut all = self.settings.borrow_mut();
            if id == DAY_COLORING {
                *all = settings.clone();
            } else {
                if !all.is_object() {
                    *all = Value::Object(Map::new());
                }
                if let Some(map) = all.as_object_mut() {
                    map.insert(id.to_string(), settings.clone());
                }
            }
        }
        match self.feature(id) {
            Some(feature) if self.booted.get() => feature.on_settings_changed(&settings),
            Some(_) => debug!("FeatureRegistry: {id} updated before boot"),
            None => warn!("FeatureRegistry: no feature named {id}"),
        }
    }

    /// Settings as the feature `id` sees them.
    pub fn get_settings(&self, id: &str) -> Value {
        let all = self.settings.borrow();
        if id == DAY_COLORING {
            all.clone()
        } else {
            all.get(id).cloned().unwrap_or(Value::Null)
        }
    }

    /// Persist a feature's settings. Features hear about it through the
    /// store's change notification.
    pub fn save_settings(&self, id: &str, settings: Value) -> Result<()> {
        if id == DAY_COLORING {
            self.host.store.merge(settings)
        } else {
            self.host.store.set(id, settings)
        }
    }

    /// Tear every feature down and cancel a pending boot retry.
    pub fn teardown_all(&self) {
        self.timers.clear();
        self.booted.set(false);
        let features = self.features.borrow().clone();
        for feature in features {
            feature.teardown();
        }
    }

    /// Tear down and stop listening to the store.
    pub fn shutdown(&self) {
        self.teardown_all();
        if let Some(id) = self.listener.take() {
            self.host.store.remove_listener(id);
        }
    }
}

fn is_empty_settings(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dom::MemoryDom;
    use crate::event_loop::ManualEventLoop;
    use crate::storage::{MemorySettingsStore, StoredDocument};

    /// Feature that records its lifecycle calls.
    struct Probe {
        id: &'static str,
        log: RefCell<Vec<String>>,
    }

    impl Probe {
        fn new(id: &'static str) -> Rc<Self> {
            Rc::new(Self {
                id,
                log: RefCell::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.log.borrow().clone()
        }
    }

    impl Feature for Probe {
        fn id(&self) -> &'static str {
            self.id
        }

        fn init(&self, settings: &Value) {
            self.log.borrow_mut().push(format!("init {settings}"));
        }

        fn on_settings_changed(&self, settings: &Value) {
            self.log.borrow_mut().push(format!("changed {settings}"));
        }

        fn teardown(&self) {
            self.log.borrow_mut().push("teardown".to_string());
        }
    }

    fn host(store: Rc<MemorySettingsStore>) -> (Host, Rc<ManualEventLoop>) {
        let event_loop = Rc::new(ManualEventLoop::new(
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        ));
        let host = Host::new(
            Rc::new(MemoryDom::new()),
            event_loop.clone(),
            store,
            Config::default(),
        );
        (host, event_loop)
    }

    #[test]
    fn test_day_coloring_gets_whole_object() {
        let store = Rc::new(MemorySettingsStore::with_settings(json!({
            "enabled": true,
            "taskColoring": {"enabled": true}
        })));
        let (host, _el) = host(store);
        let registry = FeatureRegistry::new(host);
        let day = Probe::new(DAY_COLORING);
        let tasks = Probe::new(TASK_COLORING);
        registry.register(day.clone());
        registry.register(tasks.clone());
        registry.boot();

        assert_eq!(
            day.calls(),
            vec![r#"init {"enabled":true,"taskColoring":{"enabled":true}}"#]
        );
        assert_eq!(tasks.calls(), vec![r#"init {"enabled":true}"#]);
        assert_eq!(registry.get_settings(TIME_BLOCKING), Value::Null);
    }

    #[test]
    fn test_boot_retries_once_when_store_empty() {
        let store = Rc::new(MemorySettingsStore::with_document(StoredDocument {
            subscription_active: Some(true),
            ..Default::default()
        }));
        let (host, el) = host(store.clone());
        let registry = FeatureRegistry::new(host);
        let probe = Probe::new(TIME_BLOCKING);
        registry.register(probe.clone());
        registry.boot();
        assert!(probe.calls().is_empty());
        assert!(!registry.is_booted());

        store.apply_external(StoredDocument {
            settings: Some(json!({"timeBlocking": {"enabled": true}})),
            ..Default::default()
        });
        el.advance(500);
        assert!(registry.is_booted());
        assert_eq!(probe.calls(), vec![r#"init {"enabled":true}"#]);
    }

    #[test]
    fn test_boot_proceeds_with_empty_store_after_retry() {
        let store = Rc::new(MemorySettingsStore::with_document(StoredDocument {
            subscription_active: Some(true),
            ..Default::default()
        }));
        let (host, el) = host(store);
        let registry = FeatureRegistry::new(host);
        let probe = Probe::new(DAY_COLORING);
        registry.register(probe.clone());
        registry.boot();
        el.advance(500);
        assert_eq!(probe.calls(), vec!["init null"]);
    }

    #[test]
    fn test_subscription_gate() {
        let store = Rc::new(MemorySettingsStore::with_document(StoredDocument {
            settings: Some(json!({"enabled": true})),
            task_colors: None,
            subscription_active: Some(false),
        }));
        let (host, _el) = host(store.clone());
        let registry = FeatureRegistry::new(host);
        let probe = Probe::new(DAY_COLORING);
        registry.register(probe.clone());

        registry.boot();
        assert!(probe.calls().is_empty());

        store.set_subscription_active(true);
        assert_eq!(probe.calls(), vec![r#"init {"enabled":true}"#]);

        store.set_subscription_active(false);
        assert_eq!(probe.calls().last().map(String::as_str), Some("teardown"));
        assert!(!registry.is_booted());
    }

    #[test]
    fn test_store_changes_reach_features() {
        let store = Rc::new(MemorySettingsStore::with_settings(json!({"enabled": true})));
        let (host, _el) = host(store.clone());
        let registry = FeatureRegistry::new(host);
        let probe = Probe::new(TIME_BLOCKING);
        registry.register(probe.clone());
        registry.boot();

        registry
            .save_settings(TIME_BLOCKING, json!({"enabled": false}))
            .unwrap();
        assert_eq!(
            store.get_all(),
            json!({"enabled": true, "timeBlocking": {"enabled": false}})
        );
        assert_eq!(probe.calls().last().unwrap(), r#"changed {"enabled":false}"#);
        assert_eq!(registry.get_settings(TIME_BLOCKING), json!({"enabled": false}));
    }

    #[test]
    fn test_update_feature_routes_by_id() {
        let store = Rc::new(MemorySettingsStore::with_settings(json!({"enabled": false})));
        let (host, _el) = host(store);
        let registry = FeatureRegistry::new(host);
        let day = Probe::new(DAY_COLORING);
        registry.register(day.clone());
        registry.boot();

        registry.update_feature(DAY_COLORING, json!({"enabled": true}));
        assert_eq!(day.calls().last().unwrap(), r#"changed {"enabled":true}"#);
        assert_eq!(registry.get_settings(DAY_COLORING), json!({"enabled": true}));

        // Unknown ids are logged and ignored.
        registry.update_feature("nope", json!({}));
        assert_eq!(day.calls().len(), 2);
    }

    #[test]
    fn test_shutdown_removes_listener() {
        let store = Rc::new(MemorySettingsStore::with_settings(json!({"enabled": true})));
        let (host, _el) = host(store.clone());
        let registry = FeatureRegistry::new(host);
        let probe = Probe::new(TIME_BLOCKING);
        registry.register(probe.clone());
        registry.boot();
        registry.shutdown();
        store.set("timeBlocking", json!({"enabled": true})).unwrap();
        assert_eq!(probe.calls(), vec!["init null", "teardown"]);
    }
}
