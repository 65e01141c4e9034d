//! Date literal parsing and the date <-> serial number conversions used by
//! the value model.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use once_cell::sync::Lazy;

enum Pattern {
    Date(&'static str),
    DateTime(&'static str),
    Time(&'static str),
    Rfc3339,
}

/// Tried in order; the first pattern that matches wins.
static CASCADE: Lazy<Vec<Pattern>> = Lazy::new(|| {
    vec![
        Pattern::Date("%m/%d/%Y"),
        Pattern::Date("%Y-%m-%d"),
        Pattern::DateTime("%m/%d/%Y %I:%M:%S %p"),
        Pattern::DateTime("%m/%d/%Y %H:%M:%S"),
        Pattern::DateTime("%Y-%m-%d %H:%M:%S"),
        Pattern::Time("%I:%M:%S %p"),
        Pattern::Time("%H:%M:%S"),
        Pattern::Rfc3339,
    ]
});

/// Day zero of the serial date scale.
pub fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn try_pattern(pattern: &Pattern, text: &str) -> Result<NaiveDateTime, String> {
    match pattern {
        Pattern::Date(fmt) => NaiveDate::parse_from_str(text, fmt)
            .map(|d| d.and_time(NaiveTime::MIN))
            .map_err(|e| e.to_string()),
        Pattern::DateTime(fmt) => {
            NaiveDateTime::parse_from_str(text, fmt).map_err(|e| e.to_string())
        }
        Pattern::Time(fmt) => NaiveTime::parse_from_str(text, fmt)
            .map(|t| epoch().date().and_time(t))
            .map_err(|e| e.to_string()),
        Pattern::Rfc3339 => DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.naive_local())
            .map_err(|e| format!("rfc3339: {}", e)),
    }
}

/// Parse the inside of a `#...#` literal.
///
/// Surrounding whitespace is ignored. When no pattern matches, the error of the
/// last (RFC3339) attempt is returned.
pub fn parse_date_literal(raw: &str) -> Result<NaiveDateTime, String> {
    let text = raw.trim_matches(|c: char| c == ' ' || c == '\t');
    let mut last_err = String::from("empty date literal");
    for pattern in CASCADE.iter() {
        match try_pattern(pattern, text) {
            Ok(dt) => return Ok(dt),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

/// Lenient runtime parse used by `CDate`/`IsDate` and string comparisons.
pub fn parse_date_value(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = parse_date_literal(text) {
        return Some(dt);
    }
    for fmt in ["%m/%d/%Y %H:%M", "%m/%d/%Y %I:%M %p", "%Y-%m-%dT%H:%M:%S", "%B %d, %Y", "%d %B %Y"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return Some(d.and_time(NaiveTime::MIN));
        }
    }
    None
}

/// Days since 1899-12-30 with the time of day as the fraction.
pub fn to_serial(dt: &NaiveDateTime) -> f64 {
    let diff = *dt - epoch();
    diff.num_milliseconds() as f64 / 86_400_000.0
}

pub fn from_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial.abs() > 3_000_000.0 {
        return None;
    }
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch().checked_add_signed(Duration::milliseconds(millis))
}

/// Render a date the way `CStr` does.
pub fn format_date(dt: &NaiveDateTime) -> String {
    let has_time = dt.time() != NaiveTime::MIN;
    let date_part = format!("{}/{}/{}", dt.format("%-m"), dt.format("%-d"), dt.format("%Y"));
    if dt.date() == epoch().date() && has_time {
        return format_time(dt);
    }
    if has_time {
        format!("{} {}", date_part, format_time(dt))
    } else {
        date_part
    }
}

pub fn format_time(dt: &NaiveDateTime) -> String {
    let (pm, hour) = dt.hour12();
    format!(
        "{}:{:02}:{:02} {}",
        hour,
        dt.minute(),
        dt.second(),
        if pm { "PM" } else { "AM" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn ymd(dt: NaiveDateTime) -> (i32, u32, u32) {
        (dt.year(), dt.month(), dt.day())
    }

    #[test]
    fn test_equivalent_spellings_agree() {
        let spellings = ["1/19/2026", "01/19/2026", "2026-01-19", "2026-1-19", " 1/19/2026 ", "  2026-01-19\t"];
        for s in spellings {
            let dt = parse_date_literal(s).unwrap_or_else(|e| panic!("{}: {}", s, e));
            assert_eq!(ymd(dt), (2026, 1, 19), "spelling {:?}", s);
        }
    }

    #[test]
    fn test_cascade_patterns_are_distinct() {
        let key = |p: &Pattern| match p {
            Pattern::Date(f) => format!("d {}", f),
            Pattern::DateTime(f) => format!("dt {}", f),
            Pattern::Time(f) => format!("t {}", f),
            Pattern::Rfc3339 => "rfc3339".to_string(),
        };
        let mut seen = std::collections::HashSet::new();
        for pattern in CASCADE.iter() {
            assert!(seen.insert(key(pattern)), "repeated pattern {}", key(pattern));
        }
    }

    #[test]
    fn test_date_time_with_meridiem() {
        let dt = parse_date_literal("1/19/2026 3:04:05 PM").unwrap();
        assert_eq!(dt.hour(), 15);
        assert_eq!(dt.minute(), 4);
    }

    #[test]
    fn test_time_only_uses_epoch_day() {
        let dt = parse_date_literal("15:30:00").unwrap();
        assert_eq!(dt.date(), epoch().date());
        assert_eq!(format_date(&dt), "3:30:00 PM");
    }

    #[test]
    fn test_rfc3339() {
        let dt = parse_date_literal("2026-01-19T10:00:00Z").unwrap();
        assert_eq!(ymd(dt), (2026, 1, 19));
        let dt = parse_date_literal("2026-01-19T10:00:00.250+02:00").unwrap();
        assert_eq!(dt.hour(), 10);
    }

    #[test]
    fn test_no_match_reports_last_failure() {
        let err = parse_date_literal("not a date").unwrap_err();
        assert!(err.starts_with("rfc3339"));
    }

    #[test]
    fn test_serial_round_trip_and_format() {
        let dt = parse_date_literal("1/1/2000").unwrap();
        assert_eq!(to_serial(&dt), 36526.0);
        assert_eq!(from_serial(36526.5).map(|d| d.hour()), Some(12));
        assert_eq!(format_date(&dt), "1/1/2000");
    }
}
