//! Time block overlays.
//!
//! Each day container with a date key gets one absolutely positioned overlay
//! per block scheduled for that date. Overlays record their time range, so a
//! pass over a container that already shows the right blocks writes nothing.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use chrono::NaiveDate;
use colorkit_core::css::time_block_background;
use colorkit_core::selectors::{attr, class, owned, page_attr};
use colorkit_core::time_block::{BlockGeometry, TimeBlock, layout, pixels_per_hour};
use colorkit_core::{TimeBlockingSettings, date_key};
use serde_json::Value;
use tracing::{debug, info};

use super::{Feature, Host, TIME_BLOCKING, try_parse_section};
use crate::dom::{Dom, MutationRecord, NodeId, ObserveOptions};
use crate::observer::{Schedule, Subscription, subscribe};

/// A block ready to draw.
struct Placed {
    block: TimeBlock,
    geometry: BlockGeometry,
}

pub struct TimeBlockRenderer {
    host: Host,
    weak_self: Weak<Self>,
    settings: RefCell<TimeBlockingSettings>,
    enabled: Cell<bool>,
    observer: RefCell<Option<Subscription>>,
    drawn: Cell<usize>,
}

impl TimeBlockRenderer {
    pub fn new(host: Host) -> Rc<Self> {
        Rc::new_cyclic(|weak_self| Self {
            host,
            weak_self: weak_self.clone(),
            settings: RefCell::new(TimeBlockingSettings::default()),
            enabled: Cell::new(false),
            observer: RefCell::new(None),
            drawn: Cell::new(0),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    /// Overlays created so far.
    pub fn blocks_drawn(&self) -> usize {
        self.drawn.get()
    }

    fn containers(&self) -> Vec<NodeId> {
        let dom = &self.host.dom;
        dom.query_all(dom.body(), &format!("[{}]", page_attr::DATE_KEY))
            .into_iter()
            .filter(|&node| !self.host.in_mini_calendar(node))
            .collect()
    }

    /// Draw the blocks of every day container on the page.
    pub fn render_all(&self, force: bool) -> usize {
        let containers = self.containers();
        self.render(&containers, force)
    }

    /// Redraw everything, even containers that already look right.
    pub fn force_render(&self) -> usize {
        self.render_all(true)
    }

    /// Draw blocks into `containers`. Returns the number of overlays created.
    pub fn render(&self, containers: &[NodeId], force: bool) -> usize {
        if !self.enabled.get() {
            return 0;
        }
        let mut created = 0;
        for &container in containers {
            created += self.render_container(container, force);
        }
        if created > 0 {
            debug!("TimeBlockRenderer: drew {created} blocks");
        }
        created
    }

    fn container_height(&self, container: NodeId) -> f64 {
        let dom = &self.host.dom;
        dom.query(container, &format!(".{}", class::TIME_GRID))
            .map(|grid| dom.bounding_rect(grid).height)
            .filter(|height| *height > 0.0)
            .unwrap_or_else(|| dom.bounding_rect(container).height)
    }

    fn placed_blocks(&self, date: NaiveDate, px_per_hour: f64) -> Vec<Placed> {
        let settings = self.settings.borrow();
        settings
            .blocks_for_date(date)
            .into_iter()
            .filter_map(|block| match layout(&block, px_per_hour) {
                Some(geometry) => Some(Placed { block, geometry }),
                None => {
                    debug!(
                        "TimeBlockRenderer: skipping {} on {date}, no height",
                        block.range_key()
                    );
                    None
                }
            })
            .collect()
    }

    fn existing_blocks(&self, container: NodeId) -> Vec<NodeId> {
        let dom = &self.host.dom;
        dom.children(container)
            .into_iter()
            .filter(|&child| dom.has_class(child, owned::TIME_BLOCK_CLASS))
            .collect()
    }

    fn render_container(&self, container: NodeId, force: bool) -> usize {
        let dom = &self.host.dom;
        let Some(date) = dom
            .attribute(container, page_attr::DATE_KEY)
            .and_then(|key| date_key::parse(&key))
        else {
            return 0;
        };
        let height = self.container_height(container);
        if height <= 0.0 {
            debug!("TimeBlockRenderer: container for {date} has no height yet");
            return 0;
        }

        let placed = self.placed_blocks(date, pixels_per_hour(height));
        let existing = self.existing_blocks(container);
        if !force && Self::up_to_date(dom.as_ref(), &existing, &placed) {
            return 0;
        }

        for block in existing {
            dom.remove(block);
        }
        let settings = self.settings.borrow();
        for Placed { block, geometry } in &placed {
            let overlay = dom.create_element("div");
            dom.set_attribute(overlay, "class", owned::TIME_BLOCK_CLASS);
            dom.set_attribute(overlay, attr::BLOCK_RANGE, &block.range_key());
            let title = block.label.clone().unwrap_or_else(|| block.range_key());
            dom.set_attribute(overlay, "title", &title);
            let style = format!(
                "position: absolute; left: 0; right: 0; top: {}px; height: {}px; pointer-events: none; {}",
                geometry.top,
                geometry.height,
                time_block_background(settings.block_color(block), settings.shading_style)
            );
            dom.set_attribute(overlay, "style", &style);
            dom.append_child(container, overlay);
        }
        self.drawn.set(self.drawn.get() + placed.len());
        placed.len()
    }

    fn up_to_date(dom: &dyn Dom, existing: &[NodeId], placed: &[Placed]) -> bool {
        existing.len() == placed.len()
            && existing.iter().zip(placed).all(|(&node, p)| {
                dom.attribute(node, attr::BLOCK_RANGE).as_deref() == Some(p.block.range_key().as_str())
            })
    }

    fn remove_all(&self) {
        let dom = &self.host.dom;
        let selector = format!(".{}", owned::TIME_BLOCK_CLASS);
        for overlay in dom.query_all(dom.document_element(), &selector) {
            dom.remove(overlay);
        }
    }

    fn ensure_observer(&self) {
        if self.observer.borrow().is_some() {
            return;
        }
        let dom = &self.host.dom;
        let debounce = self.host.config.time_blocks.debounce_ms;
        let page = Rc::downgrade(dom);
        let classify = move |records: &[MutationRecord]| {
            let page = page.upgrade()?;
            records
                .iter()
                .any(|r| !page.has_class(r.target, owned::TIME_BLOCK_CLASS))
                .then_some(Schedule::After(debounce))
        };
        let weak = self.weak_self.clone();
        let subscription = subscribe(
            dom,
            &self.host.event_loop,
            dom.body(),
            ObserveOptions::child_list_subtree().with_attributes(&[page_attr::DATE_KEY]),
            classify,
            move || {
                if let Some(renderer) = weak.upgrade() {
                    renderer.render_all(false);
                }
            },
        );
        *self.observer.borrow_mut() = Some(subscription);
    }

    fn apply(&self, settings: &Value) {
        let Some(parsed) = try_parse_section::<TimeBlockingSettings>(TIME_BLOCKING, settings)
        else {
            // Keep the blocks already on screen.
            return;
        };
        let enabled = parsed.enabled;
        *self.settings.borrow_mut() = parsed;
        if enabled {
            if !self.enabled.replace(true) {
                info!("TimeBlockRenderer: enabled");
            }
            self.ensure_observer();
            self.force_render();
        } else {
            self.teardown();
        }
    }
}

impl Feature for TimeBlockRenderer {
    fn id(&self) -> &'static str {
        TIME_BLOCKING
    }

    fn init(&self, settings: &Value) {
        self.apply(settings);
    }

    fn on_settings_changed(&self, settings: &Value) {
        self.apply(settings);
    }

    fn teardown(&self) {
        if let Some(subscription) = self.observer.borrow_mut().take() {
            subscription.cancel();
        }
        self.remove_all();
        if self.enabled.replace(false) {
            debug!("TimeBlockRenderer: torn down");
        }
    }
}
