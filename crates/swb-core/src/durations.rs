use chrono::Duration;
use regex::Regex;

use crate::{errors::Error, Result};

static DURATION_RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();

/// Parse an operator duration like `30s`, `45m`, `2h`, `7d`.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let re =
        DURATION_RE.get_or_init(|| Regex::new(r"^(\d+)([smhd])$").expect("valid regex"));
    let lowered = s.trim().to_lowercase();
    let caps = re.captures(&lowered).ok_or_else(|| {
        Error::InvalidInput(format!(
            "invalid duration '{s}': use <number><s|m|h|d>, e.g. 30m"
        ))
    })?;

    let amount: i64 = caps[1]
        .parse()
        .map_err(|_| Error::InvalidInput(format!("duration '{s}' is too large")))?;

    let dur = match &caps[2] {
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        _ => Duration::try_days(amount),
    };
    dur.ok_or_else(|| Error::InvalidInput(format!("duration '{s}' is too large")))
}

/// Human form of remaining time: `2d 3h`, `3h 10m`, `45m`, `expired`.
pub fn format_time_left(left: Duration) -> String {
    let total = left.num_seconds();
    if total < 0 {
        return "expired".to_string();
    }

    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let mins = (total % 3_600) / 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if mins > 0 || parts.is_empty() {
        parts.push(format!("{mins}m"));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::seconds(30));
        assert_eq!(parse_duration("45m").unwrap(), Duration::minutes(45));
        assert_eq!(parse_duration("2h").unwrap(), Duration::hours(2));
        assert_eq!(parse_duration("7d").unwrap(), Duration::days(7));
        assert_eq!(parse_duration(" 1H ").unwrap(), Duration::hours(1));
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "h", "10", "10x", "ten minutes", "-5m", "5m5"] {
            assert!(parse_duration(bad).is_err(), "should reject {bad:?}");
        }
    }

    #[test]
    fn rejects_overflowing_amounts() {
        // Amounts past chrono's representable range must come back as a
        // typed rejection, not a panic in the duration constructors.
        for huge in [
            "1000000000000000000s",
            "9223372036854775807m",
            "99999999999999h",
            "99999999999999d",
        ] {
            assert!(
                matches!(parse_duration(huge), Err(Error::InvalidInput(_))),
                "should reject {huge:?}"
            );
        }
    }

    #[test]
    fn formats_time_left() {
        assert_eq!(format_time_left(Duration::seconds(-1)), "expired");
        assert_eq!(format_time_left(Duration::seconds(30)), "0m");
        assert_eq!(format_time_left(Duration::minutes(45)), "45m");
        assert_eq!(
            format_time_left(Duration::hours(3) + Duration::minutes(10)),
            "3h 10m"
        );
        assert_eq!(
            format_time_left(Duration::days(2) + Duration::hours(5)),
            "2d 5h"
        );
    }
}
