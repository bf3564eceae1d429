//! Stylesheet generation for day coloring and time blocks.
//!
//! Week columns are reachable through more than one targeting path because
//! the page's markup shifts under us. Each path is a [`TargetingStrategy`];
//! the stylesheet strategies produce selectors here, the inline strategy is
//! carried out by the engine directly on the elements.

use chrono::NaiveDate;

use crate::color::{hex_to_rgb, hex_to_rgba};
use crate::selectors::{attr, class, page_attr, role};
use crate::time_block::ShadingStyle;

/// Opacity of time block fills, percent.
pub const TIME_BLOCK_OPACITY: u8 = 30;

/// One way of reaching a week-view day column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetingStrategy {
    /// `nth-child` plus `nth-last-child`, once assuming no gutter column and
    /// once assuming one, so whichever layout is live only one rule matches.
    NthChildAnchored,
    /// The `data-column-index` attribute stamped on resolved columns.
    ColumnIndexAttribute,
    /// Inline `background-color` with `!important` on the element itself.
    InlineStyle,
}

/// Default strategies for week columns. Inline styling is opt-in there; the
/// day view always adds it.
pub const WEEK_STRATEGIES: &[TargetingStrategy] = &[
    TargetingStrategy::NthChildAnchored,
    TargetingStrategy::ColumnIndexAttribute,
];

impl TargetingStrategy {
    /// Selectors reaching `column` of a `column_count` wide grid. Empty for
    /// strategies that don't go through the stylesheet.
    pub fn selectors(self, column: usize, column_count: usize) -> Vec<String> {
        match self {
            Self::NthChildAnchored => {
                let from_end = column_count.saturating_sub(column);
                vec![
                    format!(
                        "{} {} > {}:nth-child({}):nth-last-child({})",
                        role::GRID,
                        role::ROW,
                        role::GRIDCELL,
                        column + 1,
                        from_end
                    ),
                    format!(
                        "{} {} > {}:nth-child({}):nth-last-child({})",
                        role::GRID,
                        role::ROW,
                        role::GRIDCELL,
                        column + 2,
                        from_end
                    ),
                ]
            }
            Self::ColumnIndexAttribute => {
                vec![format!(
                    "{} [{}=\"{}\"]",
                    role::GRID,
                    attr::COLUMN_INDEX,
                    column
                )]
            }
            Self::InlineStyle => Vec::new(),
        }
    }

    pub fn uses_stylesheet(self) -> bool {
        !matches!(self, Self::InlineStyle)
    }
}

/// Background for one visual column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPaint {
    pub column: usize,
    pub rgba: String,
}

fn rule(selectors: &[String], rgba: &str) -> String {
    format!(
        "{} {{\n    background-color: {rgba} !important;\n}}\n",
        selectors.join(",\n")
    )
}

/// Stylesheet for the week and custom-days grids.
pub fn week_view_css(
    paints: &[ColumnPaint],
    column_count: usize,
    strategies: &[TargetingStrategy],
) -> String {
    let mut css = String::from("/* ColorKit: week columns */\n");
    for paint in paints {
        let selectors: Vec<String> = strategies
            .iter()
            .flat_map(|s| s.selectors(paint.column, column_count))
            .collect();
        if selectors.is_empty() {
            continue;
        }
        css.push_str(&rule(&selectors, &paint.rgba));
    }
    css
}

/// Compact `YYYYMMDD` form the mini calendar uses.
pub fn compact_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Selector for the mini-calendar cell of `date`.
pub fn mini_calendar_cell(date: NaiveDate) -> String {
    format!(
        ".{} [{}=\"{}\"]",
        class::MINI_CALENDAR,
        page_attr::DATE,
        compact_date(date)
    )
}

/// Stylesheet for the single-day view: the event column and the matching
/// mini-calendar day.
pub fn day_view_css(rgba: &str, date: NaiveDate) -> String {
    let mut css = String::from("/* ColorKit: day column */\n");
    css.push_str(&rule(&[format!(".{}", class::DAY_VIEW_COLUMN)], rgba));
    css.push_str(&rule(&[mini_calendar_cell(date)], rgba));
    css
}

/// Diagonal hatch tile as an SVG data URI, stroked in `hex` at `alpha_percent`.
pub fn hashed_pattern_uri(hex: &str, alpha_percent: u8) -> String {
    let rgb = hex_to_rgb(Some(hex));
    let opacity = f64::from(alpha_percent.min(100)) / 100.0;
    let svg = format!(
        "<svg xmlns='http://www.w3.org/2000/svg' width='8' height='8'>\
         <path d='M-2,2 l4,-4 M0,8 l8,-8 M6,10 l4,-4' \
         stroke='{}' stroke-opacity='{opacity}' stroke-width='2'/></svg>",
        rgb.to_hex()
    );
    // Only `#`, `<` and `>` need escaping inside a quoted url().
    let encoded = svg
        .replace('#', "%23")
        .replace('<', "%3C")
        .replace('>', "%3E");
    format!("url(\"data:image/svg+xml,{encoded}\")")
}

/// Inline style declarations for a time block's fill.
pub fn time_block_background(hex: &str, style: ShadingStyle) -> String {
    match style {
        ShadingStyle::Solid => {
            format!("background-color: {};", hex_to_rgba(hex, TIME_BLOCK_OPACITY))
        }
        ShadingStyle::Hashed => format!(
            "background-image: {}; background-repeat: repeat;",
            hashed_pattern_uri(hex, TIME_BLOCK_OPACITY * 2)
        ),
    }
}
