//! colorkit-core - DOM-free logic for the ColorKit calendar recoloring engine.
//!
//! Everything here is pure: color math, weekday/column inference over signals
//! already extracted from the page, month-grid clustering, CSS generation,
//! time-block geometry and the persisted settings model. The engines that talk
//! to a live document live in the `colorkit` crate.

pub mod color;
pub mod column_map;
pub mod config;
pub mod css;
pub mod date_key;
pub mod error;
pub mod logging;
pub mod month_layout;
pub mod selectors;
pub mod settings;
pub mod time_block;
pub mod view;

pub use color::{Rgb, contrasting_text_color, hex_to_rgb, hex_to_rgba, relative_luminance};
pub use column_map::{ColumnMapping, ColumnSignals, MappingSource, MappingUnavailable};
pub use config::{Config, DayColoringTiming, RegistryTiming, TaskTiming, TimeBlockTiming};
pub use error::{Error, Result};
pub use settings::{Settings, TaskColoringSettings, TimeBlockingSettings};
pub use time_block::{BlockType, ShadingStyle, TimeBlock};
pub use view::{ViewKind, WeekStart};
