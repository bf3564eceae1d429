//! colorkit - recoloring engines for the Google Calendar page.
//!
//! The engines in [`features`] run against a [`dom::Dom`] and an
//! [`event_loop::EventLoop`] rather than a browser, and read their settings
//! from a [`storage::SettingsStore`]. All of them are single-threaded and
//! driven by timers, animation frames and mutation callbacks.

pub mod callbacks;
pub mod dom;
pub mod event_loop;
pub mod features;
pub mod observer;
pub mod storage;
pub mod timers;

pub use dom::{Dom, MemoryDom};
pub use event_loop::{EventLoop, ManualEventLoop};
pub use features::{
    DayColoringEngine, Feature, FeatureRegistry, Host, MonthPainter, TaskColorEngine,
    TimeBlockRenderer,
};
pub use storage::{FileSettingsStore, MemorySettingsStore, SettingsStore, StoreChange};
