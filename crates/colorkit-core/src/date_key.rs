//! Bit-packed date keys carried by day containers in the time grid.
//!
//! Layout: `((year - 1970) << 9) | ((month + 1) << 5) | day`, where `month`
//! is zero-based. Day uses the low five bits, month the next four.

use chrono::{Datelike, NaiveDate};

const EPOCH_YEAR: i32 = 1970;

/// Decode a date key. Returns None for keys that don't name a real date.
pub fn decode(key: u32) -> Option<NaiveDate> {
    let year = (key >> 9) as i32 + EPOCH_YEAR;
    let month_zero_based = ((key & 511) >> 5) as i32 - 1;
    let day = key & 31;
    if month_zero_based < 0 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month_zero_based as u32 + 1, day)
}

/// Encode a date into a key. Dates before 1970 cannot be represented.
pub fn encode(date: NaiveDate) -> Option<u32> {
    let years = date.year() - EPOCH_YEAR;
    if years < 0 {
        return None;
    }
    let month_zero_based = date.month0();
    Some(((years as u32) << 9) | ((month_zero_based + 1) << 5) | date.day())
}

/// Parse the attribute text form of a key.
pub fn parse(value: &str) -> Option<NaiveDate> {
    value.trim().parse::<u32>().ok().and_then(decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_key() {
        // 2024-01-15: (54 << 9) | (1 << 5) | 15, with the +1 month bias.
        let key = (54 << 9) | (1 << 5) | 15;
        assert_eq!(decode(key), NaiveDate::from_ymd_opt(2024, 1, 15));
    }

    #[test]
    fn test_encode_matches_decode_layout() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let key = encode(date).unwrap();
        assert_eq!(key >> 9, 54);
        assert_eq!(((key & 511) >> 5) - 1, 11);
        assert_eq!(key & 31, 31);
        assert_eq!(decode(key), Some(date));
    }

    #[test]
    fn test_decode_rejects_impossible_dates() {
        // Month bits of zero decode to month -1.
        assert_eq!(decode(54 << 9 | 15), None);
        // Day zero.
        assert_eq!(decode((54 << 9) | (1 << 5)), None);
        // February 30th.
        assert_eq!(decode((54 << 9) | (2 << 5) | 30), None);
    }

    #[test]
    fn test_parse_attribute_text() {
        assert_eq!(parse(" 27679 "), decode(27679));
        assert_eq!(parse("abc"), None);
    }

    #[test]
    fn test_encode_before_epoch() {
        let date = NaiveDate::from_ymd_opt(1969, 12, 31).unwrap();
        assert_eq!(encode(date), None);
    }
}
