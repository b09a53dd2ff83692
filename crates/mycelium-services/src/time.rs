//! Duration parsing and formatting for scripts and the scheduler.

use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)(\d+)\s*([dhms])").expect("valid duration pattern"))
}

/// Parse strings such as `"1d 2h 30m"` or `"45s"` into seconds.
///
/// Unrecognized text is ignored, so `"soon"` parses to 0.
pub fn parse_duration(input: &str) -> i64 {
    duration_pattern()
        .captures_iter(input)
        .filter_map(|caps| {
            let amount: i64 = caps[1].parse().ok()?;
            let unit = match caps[2].to_ascii_lowercase().as_str() {
                "d" => DAY,
                "h" => HOUR,
                "m" => MINUTE,
                _ => 1,
            };
            amount.checked_mul(unit)
        })
        .fold(0i64, |total, secs| total.saturating_add(secs))
}

/// Render seconds as `"1 day, 2 hours, 3 minutes and 4 seconds"`
pub fn format_duration(seconds: i64) -> String {
    if seconds < 0 {
        return "invalid duration".to_string();
    }
    if seconds == 0 {
        return "0 seconds".to_string();
    }

    let parts: Vec<String> = [
        (seconds / DAY, "day"),
        ((seconds % DAY) / HOUR, "hour"),
        ((seconds % HOUR) / MINUTE, "minute"),
        (seconds % MINUTE, "second"),
    ]
    .into_iter()
    .filter(|(n, _)| *n > 0)
    .map(|(n, label)| {
        if n == 1 {
            format!("1 {label}")
        } else {
            format!("{n} {label}s")
        }
    })
    .collect();

    match parts.split_last() {
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} and {}", rest.join(", "), last),
        None => "0 seconds".to_string(),
    }
}

/// Time units accepted by the script scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn to_duration(self, amount: u64) -> Duration {
        match self {
            TimeUnit::Milliseconds => Duration::from_millis(amount),
            TimeUnit::Seconds => Duration::from_secs(amount),
            TimeUnit::Minutes => Duration::from_secs(amount.saturating_mul(MINUTE as u64)),
            TimeUnit::Hours => Duration::from_secs(amount.saturating_mul(HOUR as u64)),
            TimeUnit::Days => Duration::from_secs(amount.saturating_mul(DAY as u64)),
        }
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let singular = lower.strip_suffix('s').unwrap_or(&lower);
        match singular {
            "millisecond" => Ok(TimeUnit::Milliseconds),
            "second" => Ok(TimeUnit::Seconds),
            "minute" => Ok(TimeUnit::Minutes),
            "hour" => Ok(TimeUnit::Hours),
            "day" => Ok(TimeUnit::Days),
            _ => Err(format!("unknown time unit '{s}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1d 2h 3m 4s"), DAY + 2 * HOUR + 3 * MINUTE + 4);
        assert_eq!(parse_duration("90S"), 90);
        assert_eq!(parse_duration("2 h"), 2 * HOUR);
        assert_eq!(parse_duration("later"), 0);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0 seconds");
        assert_eq!(format_duration(-5), "invalid duration");
        assert_eq!(format_duration(1), "1 second");
        assert_eq!(format_duration(61), "1 minute and 1 second");
        assert_eq!(
            format_duration(DAY + 2 * HOUR + 3 * MINUTE + 4),
            "1 day, 2 hours, 3 minutes and 4 seconds"
        );
        assert_eq!(format_duration(2 * HOUR), "2 hours");
    }

    #[test]
    fn test_time_unit_parsing() {
        assert_eq!("SECONDS".parse::<TimeUnit>(), Ok(TimeUnit::Seconds));
        assert_eq!("minute".parse::<TimeUnit>(), Ok(TimeUnit::Minutes));
        assert_eq!("Milliseconds".parse::<TimeUnit>(), Ok(TimeUnit::Milliseconds));
        assert_eq!("days".parse::<TimeUnit>(), Ok(TimeUnit::Days));
        assert!("fortnights".parse::<TimeUnit>().is_err());
    }

    #[test]
    fn test_time_unit_to_duration() {
        assert_eq!(TimeUnit::Milliseconds.to_duration(250), Duration::from_millis(250));
        assert_eq!(TimeUnit::Hours.to_duration(2), Duration::from_secs(7200));
    }
}
