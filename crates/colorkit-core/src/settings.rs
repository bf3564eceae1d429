//! Persisted user settings.
//!
//! Settings are stored as a JSON object keyed the way the settings UI writes
//! them (`weekdayColors`, `timeBlocking`, ...). The typed `Settings` struct is
//! always produced by merging the stored object over the built-in defaults,
//! so a partially populated store (fresh install, older version) still
//! yields a complete value.
//!
//! Updates are deep merges with one exception: the two schedule maps under
//! `timeBlocking` are replaced wholesale. Merging them key by key would
//! resurrect blocks the user just deleted.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::color::{hex_to_rgba, is_valid_hex};
use crate::error::{Error, Result};
use crate::time_block::{DAY_KEYS, TimeBlock, day_key, sort_blocks};
use crate::view::{WeekStart, weekday_index};

/// Keys whose values replace the base instead of merging into it.
pub const REPLACE_KEYS: &[&str] = &["weeklySchedule", "dateSpecificSchedule"];

/// Opacity used when a weekday has no stored opacity.
pub const DEFAULT_OPACITY: u8 = 30;

/// Known valid values for `weekStart`.
const VALID_WEEK_STARTS: &[i64] = &[0, 1, 6];

const DEFAULT_WEEKDAY_COLORS: [&str; 7] = [
    "#ffd5d5", "#e8deff", "#d5f5e3", "#ffe8d5", "#d5f0ff", "#fff5d5", "#f0d5ff",
];

const DEFAULT_PRESET_COLORS: &[&str] = &[
    "#4285f4", "#34a853", "#fbbc04", "#ea4335", "#ff6d01", "#46bdc6", "#7baaf7", "#f07b72",
    "#fcd04f", "#71c287", "#b39ddb", "#9e9e9e",
];

/// Root settings object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Master switch for day-column coloring.
    pub enabled: bool,

    /// Hex color per weekday, keyed `"0"` (Sunday) to `"6"`.
    pub weekday_colors: BTreeMap<String, String>,

    /// Opacity percentage per weekday, keyed like `weekday_colors`.
    pub weekday_opacity: BTreeMap<String, u8>,

    /// Per-date overrides keyed `YYYY-MM-DD`.
    pub date_colors: BTreeMap<String, String>,

    /// 0 = Sunday, 1 = Monday, 6 = Saturday.
    pub week_start: i64,

    pub task_coloring: TaskColoringSettings,

    pub time_blocking: TimeBlockingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: false,
            weekday_colors: DEFAULT_WEEKDAY_COLORS
                .iter()
                .enumerate()
                .map(|(i, c)| (i.to_string(), (*c).to_string()))
                .collect(),
            weekday_opacity: (0..7).map(|i| (i.to_string(), DEFAULT_OPACITY)).collect(),
            date_colors: BTreeMap::new(),
            week_start: 0,
            task_coloring: TaskColoringSettings::default(),
            time_blocking: TimeBlockingSettings::default(),
        }
    }
}

/// Per-task chip coloring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskColoringSettings {
    pub enabled: bool,
    /// Swatches offered in the task editor.
    pub preset_colors: Vec<String>,
    /// Recently used custom colors, shown in a second row.
    pub inline_colors: Vec<String>,
}

impl Default for TaskColoringSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            preset_colors: DEFAULT_PRESET_COLORS.iter().map(|c| c.to_string()).collect(),
            inline_colors: Vec::new(),
        }
    }
}

/// Shaded time ranges drawn over the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeBlockingSettings {
    pub enabled: bool,
    pub global_color: String,
    pub shading_style: crate::time_block::ShadingStyle,
    /// Recurring blocks keyed by day key (`"mon"`, `"tue"`, ...).
    #[serde(deserialize_with = "lenient_schedule")]
    pub weekly_schedule: BTreeMap<String, Vec<TimeBlock>>,
    /// One-off blocks keyed `YYYY-MM-DD`.
    #[serde(deserialize_with = "lenient_schedule")]
    pub date_specific_schedule: BTreeMap<String, Vec<TimeBlock>>,
}

/// Schedule map whose malformed blocks are dropped one by one, so a single
/// bad entry doesn't cost the rest of the schedule.
fn lenient_schedule<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, Vec<TimeBlock>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Vec<Value>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, blocks)| {
            let parsed = blocks
                .into_iter()
                .filter_map(|block| match serde_json::from_value::<TimeBlock>(block) {
                    Ok(block) => Some(block),
                    Err(e) => {
                        warn!("timeBlocking: dropping malformed block under {key}: {e}");
                        None
                    }
                })
                .collect();
            (key, parsed)
        })
        .collect())
}

impl Default for TimeBlockingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            global_color: "#FFEB3B".to_string(),
            shading_style: crate::time_block::ShadingStyle::Solid,
            weekly_schedule: BTreeMap::new(),
            date_specific_schedule: BTreeMap::new(),
        }
    }
}

impl TimeBlockingSettings {
    /// Blocks that apply to a date: the weekday's recurring blocks plus any
    /// date-specific ones. Both kinds render; neither overrides the other.
    pub fn blocks_for_date(&self, date: NaiveDate) -> Vec<TimeBlock> {
        let mut blocks: Vec<TimeBlock> = self
            .weekly_schedule
            .get(day_key(weekday_index(date)))
            .cloned()
            .unwrap_or_default();
        if let Some(specific) = self.date_specific_schedule.get(&date_iso(date)) {
            blocks.extend(specific.iter().cloned());
        }
        sort_blocks(&mut blocks);
        blocks
    }

    /// Color a block renders with.
    pub fn block_color<'a>(&'a self, block: &'a TimeBlock) -> &'a str {
        block
            .color
            .as_deref()
            .filter(|c| is_valid_hex(c))
            .unwrap_or(&self.global_color)
    }

    pub fn add_weekly_block(&mut self, day: &str, block: TimeBlock) {
        Self::insert_sorted(self.weekly_schedule.entry(day.to_string()).or_default(), block);
    }

    pub fn add_date_block(&mut self, date: NaiveDate, block: TimeBlock) {
        Self::insert_sorted(
            self.date_specific_schedule.entry(date_iso(date)).or_default(),
            block,
        );
    }

    /// Replace the block at `index` (in sorted order). Returns false if absent.
    pub fn update_weekly_block(&mut self, day: &str, index: usize, block: TimeBlock) -> bool {
        Self::replace_at(self.weekly_schedule.get_mut(day), index, block)
    }

    pub fn update_date_block(&mut self, date: NaiveDate, index: usize, block: TimeBlock) -> bool {
        Self::replace_at(
            self.date_specific_schedule.get_mut(&date_iso(date)),
            index,
            block,
        )
    }

    pub fn remove_weekly_block(&mut self, day: &str, index: usize) -> Option<TimeBlock> {
        let blocks = self.weekly_schedule.get_mut(day)?;
        (index < blocks.len()).then(|| blocks.remove(index))
    }

    /// Remove a date-specific block; the date entry goes away once empty.
    pub fn remove_date_block(&mut self, date: NaiveDate, index: usize) -> Option<TimeBlock> {
        let key = date_iso(date);
        let blocks = self.date_specific_schedule.get_mut(&key)?;
        let removed = (index < blocks.len()).then(|| blocks.remove(index));
        if blocks.is_empty() {
            self.date_specific_schedule.remove(&key);
        }
        removed
    }

    fn insert_sorted(blocks: &mut Vec<TimeBlock>, block: TimeBlock) {
        blocks.push(block);
        sort_blocks(blocks);
    }

    fn replace_at(blocks: Option<&mut Vec<TimeBlock>>, index: usize, block: TimeBlock) -> bool {
        let Some(blocks) = blocks else {
            return false;
        };
        let Some(slot) = blocks.get_mut(index) else {
            return false;
        };
        *slot = block;
        sort_blocks(blocks);
        true
    }
}

/// `YYYY-MM-DD` key for a date.
pub fn date_iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl Settings {
    /// Defaults as a JSON object, the base every stored object merges over.
    pub fn defaults_value() -> Value {
        serde_json::to_value(Settings::default()).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    /// Build typed settings from a stored JSON object.
    ///
    /// Missing keys fall back to defaults. A non-object value (e.g. `null`
    /// from an empty store) is treated as "all defaults".
    pub fn from_value(stored: &Value) -> Result<Self> {
        let mut base = Self::defaults_value();
        if stored.is_object() {
            merge_values(&mut base, stored.clone());
        }
        Ok(serde_json::from_value(base)?)
    }

    /// Apply a partial update and return the resulting settings.
    pub fn merged(&self, patch: Value) -> Result<Self> {
        let mut base = serde_json::to_value(self)?;
        merge_values(&mut base, patch);
        Ok(serde_json::from_value(base)?)
    }

    /// Effective week start, guarding against invalid stored values.
    pub fn week_start(&self) -> WeekStart {
        WeekStart::from_setting(self.week_start)
    }

    pub fn weekday_color(&self, weekday: u8) -> Option<&str> {
        self.weekday_colors
            .get(&weekday.to_string())
            .map(String::as_str)
            .filter(|c| !c.trim().is_empty())
    }

    pub fn weekday_opacity(&self, weekday: u8) -> u8 {
        self.weekday_opacity
            .get(&weekday.to_string())
            .copied()
            .unwrap_or(DEFAULT_OPACITY)
            .min(100)
    }

    /// Hex color for a specific day: a date override wins over the weekday.
    pub fn color_for_day(&self, weekday: u8, date: Option<NaiveDate>) -> Option<&str> {
        if let Some(date) = date
            && let Some(color) = self.date_colors.get(&date_iso(date))
            && !color.trim().is_empty()
        {
            return Some(color.as_str());
        }
        self.weekday_color(weekday)
    }

    /// `rgba(...)` background for a day, or None if the day has no color.
    pub fn rgba_for_day(&self, weekday: u8, date: Option<NaiveDate>) -> Option<String> {
        self.color_for_day(weekday, date)
            .map(|hex| hex_to_rgba(hex, self.weekday_opacity(weekday)))
    }

    /// Per-weekday `rgba(...)` backgrounds, Sunday first.
    pub fn weekday_rgba(&self) -> [Option<String>; 7] {
        std::array::from_fn(|i| self.rgba_for_day(i as u8, None))
    }

    /// True when the day-coloring view of these settings matches `other`.
    ///
    /// Used to drop redundant change notifications before they cause a repaint.
    pub fn same_day_coloring(&self, other: &Settings) -> bool {
        self.enabled == other.enabled
            && self.weekday_colors == other.weekday_colors
            && self.weekday_opacity == other.weekday_opacity
            && self.date_colors == other.date_colors
            && self.week_start == other.week_start
    }

    /// Validate the settings, returning every problem found.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        for (key, color) in &self.weekday_colors {
            if !matches!(key.parse::<u8>(), Ok(0..=6)) {
                errors.push(format!("weekdayColors.{key}: key must be 0-6"));
            }
            if !is_valid_hex(color) {
                errors.push(format!(
                    "weekdayColors.{key}: invalid value '{color}', expected a hex color like '#e8deff'"
                ));
            }
        }

        for (key, opacity) in &self.weekday_opacity {
            if !matches!(key.parse::<u8>(), Ok(0..=6)) {
                errors.push(format!("weekdayOpacity.{key}: key must be 0-6"));
            }
            if *opacity > 100 {
                errors.push(format!(
                    "weekdayOpacity.{key}: invalid value '{opacity}', must be between 0 and 100"
                ));
            }
        }

        for (date, color) in &self.date_colors {
            if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                errors.push(format!("dateColors.{date}: key must be YYYY-MM-DD"));
            }
            if !is_valid_hex(color) {
                errors.push(format!("dateColors.{date}: invalid color '{color}'"));
            }
        }

        if !VALID_WEEK_STARTS.contains(&self.week_start) {
            errors.push(format!(
                "weekStart: invalid value '{}', expected one of: 0, 1, 6",
                self.week_start
            ));
        }

        for color in self
            .task_coloring
            .preset_colors
            .iter()
            .chain(&self.task_coloring.inline_colors)
        {
            if !is_valid_hex(color) {
                errors.push(format!("taskColoring: invalid color '{color}'"));
            }
        }

        let blocking = &self.time_blocking;
        if !is_valid_hex(&blocking.global_color) {
            errors.push(format!(
                "timeBlocking.globalColor: invalid color '{}'",
                blocking.global_color
            ));
        }
        for (day, blocks) in &blocking.weekly_schedule {
            if !DAY_KEYS.contains(&day.as_str()) {
                errors.push(format!(
                    "timeBlocking.weeklySchedule.{day}: expected one of: {}",
                    DAY_KEYS.join(", ")
                ));
            }
            for block in blocks {
                if let Err(e) = block.validate() {
                    errors.push(format!("timeBlocking.weeklySchedule.{day}: {e}"));
                }
            }
        }
        for (date, blocks) in &blocking.date_specific_schedule {
            if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                errors.push(format!(
                    "timeBlocking.dateSpecificSchedule.{date}: key must be YYYY-MM-DD"
                ));
            }
            for block in blocks {
                if let Err(e) = block.validate() {
                    errors.push(format!("timeBlocking.dateSpecificSchedule.{date}: {e}"));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::SettingsValidation(errors))
        }
    }

    /// Human-readable summary.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        lines.push("Day coloring:".to_string());
        lines.push(format!("  enabled: {}", self.enabled));
        lines.push(format!("  week start: {:?}", self.week_start()));
        for weekday in 0..7u8 {
            let color = self.weekday_color(weekday).unwrap_or("-");
            lines.push(format!(
                "  {}: {} @ {}%",
                day_key(weekday),
                color,
                self.weekday_opacity(weekday)
            ));
        }
        if !self.date_colors.is_empty() {
            lines.push(format!("  date overrides: {}", self.date_colors.len()));
        }

        lines.push("Task coloring:".to_string());
        lines.push(format!("  enabled: {}", self.task_coloring.enabled));
        lines.push(format!(
            "  presets: {}",
            self.task_coloring.preset_colors.len()
        ));

        lines.push("Time blocking:".to_string());
        lines.push(format!("  enabled: {}", self.time_blocking.enabled));
        lines.push(format!(
            "  shading: {:?}, color: {}",
            self.time_blocking.shading_style, self.time_blocking.global_color
        ));
        let weekly: usize = self.time_blocking.weekly_schedule.values().map(Vec::len).sum();
        let dated: usize = self
            .time_blocking
            .date_specific_schedule
            .values()
            .map(Vec::len)
            .sum();
        lines.push(format!("  blocks: {weekly} weekly, {dated} date-specific"));

        lines.join("\n")
    }
}

/// Deep merge `patch` into `base`, with `patch` values taking precedence.
///
/// Objects merge recursively, except under the keys in [`REPLACE_KEYS`],
/// which are replaced wholesale. Arrays and scalars always replace.
pub fn merge_values(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                let replace = REPLACE_KEYS.contains(&key.as_str());
                if !replace
                    && patch_value.is_object()
                    && let Some(base_value) = base_map.get_mut(&key)
                    && base_value.is_object()
                {
                    merge_values(base_value, patch_value);
                    continue;
                }
                base_map.insert(key, patch_value);
            }
        }
        (base, patch) => *base = patch,
    }
}
