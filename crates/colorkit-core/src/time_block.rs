//! Time blocks: shaded ranges drawn over the day columns of the time grid.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Minutes in a day; the grid always spans 24 hours.
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Whether a block recurs weekly or belongs to a single date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum BlockType {
    #[default]
    Weekly,
    DateSpecific,
}

/// How a block's color is filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShadingStyle {
    #[default]
    Solid,
    Hashed,
}

/// A single shaded range, stored as `["HH:MM", "HH:MM"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBlock {
    pub time_range: [String; 2],

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default)]
    pub block_type: BlockType,
}

impl TimeBlock {
    pub fn new(start: &str, end: &str, block_type: BlockType) -> Self {
        Self {
            time_range: [start.to_string(), end.to_string()],
            color: None,
            label: None,
            block_type,
        }
    }

    pub fn with_color(mut self, color: &str) -> Self {
        self.color = Some(color.to_string());
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    /// Start of the range in minutes since midnight.
    pub fn start_minutes(&self) -> Option<u32> {
        parse_hhmm(&self.time_range[0])
    }

    /// End of the range in minutes since midnight.
    pub fn end_minutes(&self) -> Option<u32> {
        parse_hhmm(&self.time_range[1])
    }

    /// The `HH:MM-HH:MM` key recorded on rendered overlays.
    pub fn range_key(&self) -> String {
        format!("{}-{}", self.time_range[0], self.time_range[1])
    }

    /// Check both ends parse and end is after start.
    pub fn validate(&self) -> Result<()> {
        let (Some(start), Some(end)) = (self.start_minutes(), self.end_minutes()) else {
            return Err(Error::InvalidTimeRange(format!(
                "'{}' must be HH:MM-HH:MM",
                self.range_key()
            )));
        };
        if end <= start {
            return Err(Error::InvalidTimeRange(format!(
                "'{}' ends before it starts",
                self.range_key()
            )));
        }
        Ok(())
    }
}

/// Parse `HH:MM` into minutes since midnight. `24:00` is accepted as end of day.
pub fn parse_hhmm(value: &str) -> Option<u32> {
    let (hour, minute) = value.trim().split_once(':')?;
    let hour = hour.parse::<u32>().ok()?;
    let minute = minute.parse::<u32>().ok()?;
    if minute > 59 || hour > 24 || (hour == 24 && minute != 0) {
        return None;
    }
    Some(hour * 60 + minute)
}

/// Sort blocks ascending by start minute. Unparseable blocks sink to the end.
pub fn sort_blocks(blocks: &mut [TimeBlock]) {
    blocks.sort_by_key(|b| b.start_minutes().unwrap_or(u32::MAX));
}

/// Pixel placement of a block inside a day container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockGeometry {
    pub top: f64,
    pub height: f64,
}

/// Pixels per hour for a container of the given rendered height.
pub fn pixels_per_hour(container_height: f64) -> f64 {
    container_height / 24.0
}

/// Compute where a block sits. None when the block has no positive height.
pub fn layout(block: &TimeBlock, px_per_hour: f64) -> Option<BlockGeometry> {
    let start = block.start_minutes()?;
    let end = block.end_minutes()?;
    let height = (f64::from(end) - f64::from(start)) / 60.0 * px_per_hour;
    if height <= 0.0 {
        return None;
    }
    Some(BlockGeometry {
        top: f64::from(start) / 60.0 * px_per_hour,
        height,
    })
}

/// Keys used for the weekly schedule, indexed by weekday (Sunday = 0).
pub const DAY_KEYS: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Schedule key for a weekday index.
pub fn day_key(weekday: u8) -> &'static str {
    DAY_KEYS[usize::from(weekday % 7)]
}
