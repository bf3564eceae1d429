//! Calendar view kinds, week-start handling and date extraction from URLs.
//!
//! Weekdays are `u8` indices with Sunday = 0, matching the keys used in the
//! persisted `weekdayColors` map.

use chrono::{Datelike, NaiveDate};

/// Which layout the host calendar is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    Day,
    Week,
    CustomDays,
    Month,
    /// Year, schedule, search results and anything we don't paint.
    Other,
}

impl ViewKind {
    /// Parse the calendar's own view-state attribute value.
    pub fn from_view_key(key: &str) -> Self {
        let key = key.trim().to_ascii_lowercase().replace('-', "_");
        match key.as_str() {
            "day" => Self::Day,
            "week" => Self::Week,
            "month" => Self::Month,
            "custom_days" | "customday" | "customdays" | "custom_week" | "customweek" => {
                Self::CustomDays
            }
            _ => Self::Other,
        }
    }

    /// Infer the view from a URL path like `/calendar/u/0/r/week/2024/1/15`.
    pub fn from_url(url: &str) -> Self {
        let path = url_path(url);
        for segment in path.split('/') {
            let kind = Self::from_view_key(segment);
            if kind != Self::Other {
                return kind;
            }
        }
        Self::Other
    }

    /// Views whose day columns live in a time grid.
    pub fn is_column_view(self) -> bool {
        matches!(self, Self::Week | Self::CustomDays)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::CustomDays => "custom-days",
            Self::Month => "month",
            Self::Other => "other",
        }
    }
}

/// First day of the week as configured by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WeekStart {
    Sunday,
    #[default]
    Monday,
    Saturday,
}

impl WeekStart {
    /// Interpret a stored `weekStart` value.
    ///
    /// Only 0, 1 and 6 are meaningful; anything else falls back to Monday.
    pub fn from_setting(value: i64) -> Self {
        match value {
            0 => Self::Sunday,
            1 => Self::Monday,
            6 => Self::Saturday,
            other => {
                tracing::debug!("invalid weekStart {other}, defaulting to Monday");
                Self::Monday
            }
        }
    }

    /// Weekday index of the first visual column.
    pub fn offset(self) -> u8 {
        match self {
            Self::Sunday => 0,
            Self::Monday => 1,
            Self::Saturday => 6,
        }
    }
}

/// Weekday index (Sunday = 0) of a date.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Strip scheme, host, query and fragment, leaving the path.
fn url_path(url: &str) -> &str {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path_start = if url.contains("://") {
        without_scheme.find('/').unwrap_or(without_scheme.len())
    } else {
        0
    };
    let path = &without_scheme[path_start..];
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

/// Extract the date a URL points at.
///
/// Recognizes `/day/YYYY/M/D` style path segments (any view name works, the
/// calendar uses the same shape for week and month URLs) and a `date=`
/// query parameter in either `YYYYMMDD` or `YYYY-MM-DD` form.
pub fn date_from_url(url: &str) -> Option<NaiveDate> {
    let path = url_path(url);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    for window in segments.windows(4) {
        if ViewKind::from_view_key(window[0]) == ViewKind::Other {
            continue;
        }
        let year = window[1].parse::<i32>().ok();
        let month = window[2].parse::<u32>().ok();
        let day = window[3].parse::<u32>().ok();
        if let (Some(y), Some(m), Some(d)) = (year, month, day)
            && let Some(date) = NaiveDate::from_ymd_opt(y, m, d)
        {
            return Some(date);
        }
    }

    let query = url.split_once('?').map(|(_, q)| q)?;
    let query = query.split('#').next().unwrap_or(query);
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "date")
        .and_then(|(_, value)| parse_compact_or_iso_date(value))
}

/// Parse `YYYYMMDD` or `YYYY-MM-DD`.
pub fn parse_compact_or_iso_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y%m%d"))
        .ok()
}
