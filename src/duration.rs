//! Telemetry duration parsing and formatting
//!
//! Incoming items carry durations as `[d.]hh:mm:ss.fffffff` text with up to
//! seven fractional digits. The pipeline keeps whole milliseconds, truncating
//! toward zero. Outbound documents render durations in ISO-8601 form.

/// Parse a `[d.]hh:mm:ss.fffffff` duration into whole milliseconds
///
/// Invalid input parses to zero; ingestion never fails on a bad duration.
#[must_use]
pub fn parse_duration_to_millis(text: &str) -> u64 {
    parse_millis(text).unwrap_or(0)
}

/// Fallible variant for callers that want to log malformed input
pub(crate) fn try_parse_duration_millis(text: &str) -> Option<u64> {
    parse_millis(text)
}

fn parse_millis(text: &str) -> Option<u64> {
    let mut parts = text.split(':');
    let first = parts.next()?;
    let minutes_text = parts.next()?;
    let seconds_text = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    // The day count, when present, is joined to the hours with a dot
    let (days, hours_text) = match first.split_once('.') {
        Some((days, hours)) => (parse_field(days)?, hours),
        None => (0, first),
    };
    let hours = parse_field(hours_text)?;
    let minutes = parse_field(minutes_text)?;

    let (seconds_text, fraction) = match seconds_text.split_once('.') {
        Some((seconds, fraction)) => (seconds, Some(fraction)),
        None => (seconds_text, None),
    };
    let seconds = parse_field(seconds_text)?;
    let millis = match fraction {
        Some(fraction) => fraction_to_millis(fraction)?,
        None => 0,
    };

    if hours >= 24 || minutes >= 60 || seconds >= 60 {
        return None;
    }

    Some((((days * 24 + hours) * 60 + minutes) * 60 + seconds) * 1000 + millis)
}

fn parse_field(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Truncate a fractional-second field to whole milliseconds
fn fraction_to_millis(fraction: &str) -> Option<u64> {
    if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let bytes = fraction.as_bytes();
    let mut millis = 0u64;
    for i in 0..3 {
        let digit = bytes.get(i).map_or(0, |b| u64::from(b - b'0'));
        millis = millis * 10 + digit;
    }
    Some(millis)
}

/// Render milliseconds as an ISO-8601 duration (`PT1M52.233S`)
#[must_use]
pub fn format_duration_iso8601(total_millis: u64) -> String {
    if total_millis == 0 {
        return "PT0S".to_string();
    }

    let hours = total_millis / 3_600_000;
    let minutes = (total_millis / 60_000) % 60;
    let seconds = (total_millis / 1000) % 60;
    let millis = total_millis % 1000;

    let mut out = String::from("PT");
    if hours > 0 {
        out.push_str(&format!("{hours}H"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}M"));
    }
    if millis > 0 {
        let fraction = format!("{millis:03}");
        let fraction = fraction.trim_end_matches('0');
        out.push_str(&format!("{seconds}.{fraction}S"));
    } else if seconds > 0 || (hours == 0 && minutes == 0) {
        out.push_str(&format!("{seconds}S"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sub_second() {
        assert_eq!(parse_duration_to_millis("00:00:00.123456"), 123);
        // Truncates toward zero, never rounds up
        assert_eq!(parse_duration_to_millis("00:00:00.123999"), 123);
        assert_eq!(parse_duration_to_millis("00:00:00.1"), 100);
        assert_eq!(parse_duration_to_millis("00:00:00.0000001"), 0);
    }

    #[test]
    fn test_parse_full_components() {
        assert_eq!(parse_duration_to_millis("00:00:01.123456"), 1_123);
        assert_eq!(parse_duration_to_millis("00:00:12.123456"), 12_123);
        assert_eq!(parse_duration_to_millis("00:01:23.123456"), 83_123);
        assert_eq!(parse_duration_to_millis("00:12:34.123456"), 754_123);
        assert_eq!(parse_duration_to_millis("01:23:45.123456"), 5_025_123);
        assert_eq!(parse_duration_to_millis("12:34:56.123456"), 45_296_123);
    }

    #[test]
    fn test_parse_with_days() {
        assert_eq!(parse_duration_to_millis("1.22:33:44.123456"), 167_624_123);
        assert_eq!(parse_duration_to_millis("11.22:33:44.123456"), 1_031_624_123);
        assert_eq!(
            parse_duration_to_millis("111.22:33:44.123456"),
            9_671_624_123
        );
        assert_eq!(
            parse_duration_to_millis("1111.22:33:44.123456"),
            96_071_624_123
        );
    }

    #[test]
    fn test_parse_without_fraction() {
        assert_eq!(parse_duration_to_millis("00:00:05"), 5_000);
        assert_eq!(parse_duration_to_millis("2.01:00:00"), 176_400_000);
    }

    #[test]
    fn test_parse_invalid_is_zero() {
        assert_eq!(parse_duration_to_millis("not a duration"), 0);
        assert_eq!(parse_duration_to_millis(""), 0);
        assert_eq!(parse_duration_to_millis("00:00"), 0);
        assert_eq!(parse_duration_to_millis("00:00:00:00"), 0);
        assert_eq!(parse_duration_to_millis("-00:00:01"), 0);
        assert_eq!(parse_duration_to_millis("00:99:00"), 0);
        assert_eq!(parse_duration_to_millis("00:00:00.abc"), 0);
    }

    #[test]
    fn test_format_iso8601() {
        assert_eq!(format_duration_iso8601(0), "PT0S");
        assert_eq!(format_duration_iso8601(500), "PT0.5S");
        assert_eq!(format_duration_iso8601(1_123), "PT1.123S");
        assert_eq!(format_duration_iso8601(60_000), "PT1M");
        assert_eq!(format_duration_iso8601(112_233), "PT1M52.233S");
        assert_eq!(format_duration_iso8601(3_600_000), "PT1H");
        assert_eq!(format_duration_iso8601(3_661_000), "PT1H1M1S");
        assert_eq!(format_duration_iso8601(90_061_100), "PT25H1M1.1S");
    }
}
