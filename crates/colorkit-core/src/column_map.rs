//! Column to weekday inference for the week and custom-days grids.
//!
//! The calendar never says which weekday a visual column shows, and the
//! answer depends on locale, week start and whether weekends are hidden. The
//! engines extract whatever signals the page offers into [`ColumnSignals`]
//! and [`map_columns`] runs the strategies in priority order:
//!
//! 1. explicit dates on grid cells
//! 2. column header text, classified through a locale keyword table
//! 3. arithmetic from the configured week start
//!
//! A five column grid is weekends-hidden and always maps to Monday..Friday.
//! Any count other than five or seven is unmappable; callers skip the pass.

use chrono::NaiveDate;

use crate::view::{WeekStart, weekday_index};

/// A grid cell that carried an explicit date.
#[derive(Debug, Clone, PartialEq)]
pub struct DatedCell {
    /// Position among the cell's row siblings, gutter included.
    pub column: usize,
    /// The cell's row opens with a non-day gutter column.
    pub gutter: bool,
    pub date: NaiveDate,
}

/// A column header with its rendered horizontal center.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderCell {
    pub center_x: f64,
    pub text: String,
}

/// Everything the page told us about the current grid.
#[derive(Debug, Clone, Default)]
pub struct ColumnSignals {
    pub column_count: usize,
    pub dated_cells: Vec<DatedCell>,
    pub headers: Vec<HeaderCell>,
    pub week_start: WeekStart,
}

/// Which strategy produced a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingSource {
    WeekendsHidden,
    DateAttributes,
    HeaderText,
    Arithmetic,
}

/// The grid's column count can't be mapped; skip coloring for this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot map a {column_count}-column grid to weekdays")]
pub struct MappingUnavailable {
    pub column_count: usize,
}

/// Visual column index to weekday (Sunday = 0), plus the date each column
/// shows when the page exposed one.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    weekdays: Vec<u8>,
    dates: Vec<Option<NaiveDate>>,
    source: MappingSource,
}

impl ColumnMapping {
    fn new(weekdays: Vec<u8>, source: MappingSource) -> Self {
        let dates = vec![None; weekdays.len()];
        Self {
            weekdays,
            dates,
            source,
        }
    }

    pub fn len(&self) -> usize {
        self.weekdays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weekdays.is_empty()
    }

    pub fn source(&self) -> MappingSource {
        self.source
    }

    pub fn weekday(&self, column: usize) -> Option<u8> {
        self.weekdays.get(column).copied()
    }

    pub fn date(&self, column: usize) -> Option<NaiveDate> {
        self.dates.get(column).copied().flatten()
    }

    /// `(column, weekday)` pairs in visual order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u8)> + '_ {
        self.weekdays.iter().copied().enumerate()
    }

    /// Attach per-column dates that agree with the mapped weekday.
    ///
    /// Dates that contradict the mapping are dropped rather than trusted.
    fn with_dates(mut self, cells: &[DatedCell]) -> Self {
        for cell in cells {
            let Some(column) = visual_column(cell) else {
                continue;
            };
            if self.weekday(column) == Some(weekday_index(cell.date)) {
                self.dates[column] = Some(cell.date);
            }
        }
        self
    }
}

/// Column index with the gutter removed.
fn visual_column(cell: &DatedCell) -> Option<usize> {
    if cell.gutter {
        cell.column.checked_sub(1)
    } else {
        Some(cell.column)
    }
}

/// Whether a row of `cell_count` cells opens with the time-axis gutter.
///
/// A dated leading cell is a day. Otherwise one cell beyond a weekday layout
/// (five or seven days) is the gutter, and so is anything wider than seven.
pub fn has_leading_gutter(cell_count: usize, leading_cell_dated: bool) -> bool {
    !leading_cell_dated && (cell_count == 6 || cell_count > 7)
}

/// Map every visible column to a weekday, first successful strategy wins.
pub fn map_columns(signals: &ColumnSignals) -> Result<ColumnMapping, MappingUnavailable> {
    let count = signals.column_count;
    let mapping = match count {
        5 => weekends_hidden(),
        7 => from_date_attributes(signals)
            .or_else(|| from_header_text(signals))
            .unwrap_or_else(|| arithmetic(count, signals.week_start)),
        _ => {
            tracing::warn!("ColumnMapper: {count} columns, mapping unavailable");
            return Err(MappingUnavailable {
                column_count: count,
            });
        }
    };
    tracing::debug!(
        "ColumnMapper: {count} columns mapped via {:?}",
        mapping.source()
    );
    Ok(mapping.with_dates(&signals.dated_cells))
}

/// Monday..Friday in order, whatever the week start.
pub fn weekends_hidden() -> ColumnMapping {
    ColumnMapping::new(vec![1, 2, 3, 4, 5], MappingSource::WeekendsHidden)
}

/// Use explicit cell dates. Every column must be covered and no column may
/// carry two different weekdays, otherwise the strategy declines.
pub fn from_date_attributes(signals: &ColumnSignals) -> Option<ColumnMapping> {
    let count = signals.column_count;
    if signals.dated_cells.is_empty() {
        return None;
    }

    let mut weekdays: Vec<Option<u8>> = vec![None; count];
    for cell in &signals.dated_cells {
        let column = visual_column(cell)?;
        let slot = weekdays.get_mut(column)?;
        let weekday = weekday_index(cell.date);
        match slot {
            Some(existing) if *existing != weekday => {
                tracing::debug!("ColumnMapper: conflicting dates in column {column}");
                return None;
            }
            _ => *slot = Some(weekday),
        }
    }

    let weekdays: Option<Vec<u8>> = weekdays.into_iter().collect();
    weekdays.map(|w| ColumnMapping::new(w, MappingSource::DateAttributes))
}

/// Classify the column headers, ordered by their on-screen position.
///
/// Declines unless there is exactly one header per column and every one of
/// them classifies.
pub fn from_header_text(signals: &ColumnSignals) -> Option<ColumnMapping> {
    if signals.headers.len() != signals.column_count {
        return None;
    }
    let mut headers: Vec<&HeaderCell> = signals.headers.iter().collect();
    headers.sort_by(|a, b| a.center_x.total_cmp(&b.center_x));

    let mut weekdays = Vec::with_capacity(headers.len());
    for header in headers {
        match classify_day_label(&header.text) {
            Some(weekday) => weekdays.push(weekday),
            None => {
                tracing::debug!("ColumnMapper: unclassified header {:?}", header.text);
                return None;
            }
        }
    }
    Some(ColumnMapping::new(weekdays, MappingSource::HeaderText))
}

/// `weekday = (column + week_start) % 7`.
pub fn arithmetic(column_count: usize, week_start: WeekStart) -> ColumnMapping {
    let offset = usize::from(week_start.offset());
    let weekdays = (0..column_count).map(|c| ((c + offset) % 7) as u8).collect();
    ColumnMapping::new(weekdays, MappingSource::Arithmetic)
}

/// Day-name prefixes for English, Spanish, French and German.
const DAY_KEYWORDS: &[(&str, u8)] = &[
    // en
    ("sun", 0),
    ("mon", 1),
    ("tue", 2),
    ("wed", 3),
    ("thu", 4),
    ("fri", 5),
    ("sat", 6),
    // es
    ("dom", 0),
    ("lun", 1),
    ("mar", 2),
    ("mié", 3),
    ("mie", 3),
    ("jue", 4),
    ("vie", 5),
    ("sáb", 6),
    ("sab", 6),
    // fr
    ("dim", 0),
    ("mer", 3),
    ("jeu", 4),
    ("ven", 5),
    ("sam", 6),
    // de
    ("so", 0),
    ("mo", 1),
    ("di", 2),
    ("mi", 3),
    ("do", 4),
    ("fr", 5),
    ("sa", 6),
];

/// Single-character weekday markers used by Japanese and Chinese headers.
const CJK_DAYS: &[(char, u8)] = &[
    ('日', 0),
    ('天', 0),
    ('月', 1),
    ('火', 2),
    ('水', 3),
    ('木', 4),
    ('金', 5),
    ('土', 6),
    ('一', 1),
    ('二', 2),
    ('三', 3),
    ('四', 4),
    ('五', 5),
    ('六', 6),
];

/// Classify a header label such as `"MON 15"`, `"mié."` or `"星期一"`.
///
/// The first alphabetic token is matched against the keyword table, longest
/// keyword first so `dim` (French Sunday) beats `di` (German Tuesday).
pub fn classify_day_label(text: &str) -> Option<u8> {
    let token: String = text
        .trim()
        .chars()
        .skip_while(|c| !c.is_alphabetic())
        .take_while(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect();

    if !token.is_empty() {
        let best = DAY_KEYWORDS
            .iter()
            .filter(|(keyword, _)| token.starts_with(keyword))
            .max_by_key(|(keyword, _)| keyword.chars().count());
        if let Some((_, weekday)) = best {
            return Some(*weekday);
        }
    }

    text.chars()
        .find_map(|c| CJK_DAYS.iter().find(|(k, _)| *k == c).map(|(_, w)| *w))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn signals(count: usize, week_start: WeekStart) -> ColumnSignals {
        ColumnSignals {
            column_count: count,
            week_start,
            ..Default::default()
        }
    }

    #[test]
    fn test_arithmetic_fallback_for_every_week_start() {
        for week_start in [WeekStart::Sunday, WeekStart::Monday, WeekStart::Saturday] {
            let mapping = map_columns(&signals(7, week_start)).unwrap();
            assert_eq!(mapping.source(), MappingSource::Arithmetic);
            for c in 0..7 {
                let expected = ((c + usize::from(week_start.offset())) % 7) as u8;
                assert_eq!(mapping.weekday(c), Some(expected));
            }
        }
    }

    #[test]
    fn test_five_columns_ignore_week_start() {
        for week_start in [WeekStart::Sunday, WeekStart::Monday, WeekStart::Saturday] {
            let mapping = map_columns(&signals(5, week_start)).unwrap();
            assert_eq!(mapping.source(), MappingSource::WeekendsHidden);
            let weekdays: Vec<u8> = mapping.iter().map(|(_, w)| w).collect();
            assert_eq!(weekdays, vec![1, 2, 3, 4, 5]);
        }
    }

    #[test]
    fn test_other_column_counts_are_unavailable() {
        for count in [0, 1, 4, 6, 8] {
            let err = map_columns(&signals(count, WeekStart::Monday)).unwrap_err();
            assert_eq!(err.column_count, count);
        }
    }

    #[test]
    fn test_leading_gutter_detection() {
        // Weekends hidden and shown, each behind the time axis.
        assert!(has_leading_gutter(6, false));
        assert!(has_leading_gutter(8, false));
        assert!(!has_leading_gutter(5, false));
        assert!(!has_leading_gutter(7, false));
        // A dated first cell is a day, whatever the count.
        assert!(!has_leading_gutter(6, true));
        assert!(!has_leading_gutter(8, true));
    }

    #[test]
    fn test_date_attributes_win_over_week_start() {
        // Week of Sunday 2024-01-14, rows with a gutter (8 cells).
        let mut s = signals(7, WeekStart::Monday);
        s.dated_cells = (0..7)
            .map(|i| DatedCell {
                column: i + 1,
                gutter: true,
                date: date(2024, 1, 14 + i as u32),
            })
            .collect();
        let mapping = map_columns(&s).unwrap();
        assert_eq!(mapping.source(), MappingSource::DateAttributes);
        assert_eq!(mapping.weekday(0), Some(0));
        assert_eq!(mapping.weekday(6), Some(6));
        assert_eq!(mapping.date(1), Some(date(2024, 1, 15)));
    }

    #[test]
    fn test_partial_dates_fall_through() {
        let mut s = signals(7, WeekStart::Sunday);
        s.dated_cells = vec![DatedCell {
            column: 0,
            gutter: false,
            date: date(2024, 1, 15),
        }];
        let mapping = map_columns(&s).unwrap();
        assert_eq!(mapping.source(), MappingSource::Arithmetic);
        // Column 0 is Sunday by arithmetic, so the Monday date is not attached.
        assert_eq!(mapping.date(0), None);
    }

    #[test]
    fn test_conflicting_dates_decline() {
        let mut s = signals(7, WeekStart::Sunday);
        s.dated_cells = (0..7)
            .map(|i| DatedCell {
                column: i,
                gutter: false,
                date: date(2024, 1, 14 + i as u32),
            })
            .collect();
        s.dated_cells.push(DatedCell {
            column: 0,
            gutter: false,
            date: date(2024, 1, 15),
        });
        assert!(from_date_attributes(&s).is_none());
    }

    #[test]
    fn test_headers_sorted_by_position() {
        let mut s = signals(7, WeekStart::Sunday);
        let labels = ["lun.", "mar.", "mer.", "jeu.", "ven.", "sam.", "dim."];
        // Supplied in reverse DOM order; x position decides.
        s.headers = labels
            .iter()
            .enumerate()
            .rev()
            .map(|(i, text)| HeaderCell {
                center_x: 100.0 + i as f64 * 80.0,
                text: text.to_string(),
            })
            .collect();
        let mapping = map_columns(&s).unwrap();
        assert_eq!(mapping.source(), MappingSource::HeaderText);
        let weekdays: Vec<u8> = mapping.iter().map(|(_, w)| w).collect();
        assert_eq!(weekdays, vec![1, 2, 3, 4, 5, 6, 0]);
    }

    #[test]
    fn test_unclassified_header_aborts_header_strategy() {
        let mut s = signals(7, WeekStart::Saturday);
        s.headers = ["Mon", "Tue", "Wed", "???", "Fri", "Sat", "Sun"]
            .iter()
            .enumerate()
            .map(|(i, text)| HeaderCell {
                center_x: i as f64,
                text: text.to_string(),
            })
            .collect();
        let mapping = map_columns(&s).unwrap();
        assert_eq!(mapping.source(), MappingSource::Arithmetic);
        assert_eq!(mapping.weekday(0), Some(6));
    }

    #[test]
    fn test_classify_day_label() {
        assert_eq!(classify_day_label("MON 15"), Some(1));
        assert_eq!(classify_day_label("15 Tue"), Some(2));
        assert_eq!(classify_day_label("mié."), Some(3));
        assert_eq!(classify_day_label("Sáb"), Some(6));
        assert_eq!(classify_day_label("domingo"), Some(0));
        assert_eq!(classify_day_label("dimanche"), Some(0));
        assert_eq!(classify_day_label("Di."), Some(2));
        assert_eq!(classify_day_label("Donnerstag"), Some(4));
        assert_eq!(classify_day_label("月曜日"), Some(1));
        assert_eq!(classify_day_label("星期日"), Some(0));
        assert_eq!(classify_day_label("周三"), Some(3));
        assert_eq!(classify_day_label("42"), None);
        assert_eq!(classify_day_label(""), None);
    }
}
