//! Scalar coercion helpers shared by the [`crate::Value`] wire encoding and
//! `edgekv`'s `Accessor`.
//!
//! Duration parsing follows Go's `time.ParseDuration` grammar
//! (`<number><unit>` pairs concatenated with no separator, e.g. `"1h30m"`)
//! rather than a general "humanized duration" crate's grammar, which
//! expects whitespace between segments and doesn't accept this exact
//! format. The grammar is small enough that a dedicated parser is clearer
//! than bending a general-purpose crate to fit it.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Parse a Go-style duration string such as `"1h30m"`, `"500ms"`, or
/// `"-1.5h"`. Negative durations are accepted for parsing symmetry with Go
/// but clamped to zero, since [`std::time::Duration`] cannot be negative.
pub fn parse_go_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (negative, rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if rest.is_empty() {
        return None;
    }

    let mut total = 0f64;
    let mut chars = rest.char_indices().peekable();
    let mut any = false;

    while let Some(&(start, c)) = chars.peek() {
        if !(c.is_ascii_digit() || c == '.') {
            return None;
        }
        let mut end = start;
        while let Some(&(idx, c)) = chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                end = idx + c.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let number: f64 = rest[start..end].parse().ok()?;

        let unit_start = end;
        let mut unit_end = unit_start;
        while let Some(&(idx, c)) = chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                break;
            }
            unit_end = idx + c.len_utf8();
            chars.next();
        }
        if unit_end == unit_start {
            return None;
        }
        let unit = &rest[unit_start..unit_end];
        let seconds_per_unit = match unit {
            "ns" => 1e-9,
            "us" | "\u{b5}s" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        total += number * seconds_per_unit;
        any = true;
    }

    if !any {
        return None;
    }
    if negative {
        return Some(Duration::ZERO);
    }
    Some(Duration::from_secs_f64(total.max(0.0)))
}

/// Format a [`Duration`] the way Go's `Duration.String` would, using the
/// largest unit that divides evenly, falling back to fractional seconds.
pub fn format_go_duration(d: Duration) -> String {
    let total_ns = d.as_nanos();
    if total_ns == 0 {
        return "0s".to_string();
    }
    let secs = d.as_secs_f64();
    if secs >= 3600.0 {
        format!("{}h", secs / 3600.0)
    } else if secs >= 60.0 {
        format!("{}m", secs / 60.0)
    } else if secs >= 1.0 {
        format!("{secs}s")
    } else if d.as_millis() >= 1 {
        format!("{}ms", d.as_secs_f64() * 1e3)
    } else if d.as_micros() >= 1 {
        format!("{}us", d.as_secs_f64() * 1e6)
    } else {
        format!("{total_ns}ns")
    }
}

/// Parse an RFC3339 timestamp, the only time format the coercion table
/// accepts (matching S4: `"2020-10-04T01:02:03.000000004Z"`).
pub fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_units() {
        assert_eq!(parse_go_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_go_duration("5s"), Some(Duration::from_secs(5)));
    }

    #[test]
    fn parses_compound_duration() {
        let d = parse_go_duration("1h30m").unwrap();
        assert_eq!(d, Duration::from_secs(90 * 60));
    }

    #[test]
    fn parses_fractional_unit() {
        let d = parse_go_duration("1.5h").unwrap();
        assert_eq!(d.as_secs(), 5400);
    }

    #[test]
    fn rejects_missing_unit() {
        assert_eq!(parse_go_duration("500"), None);
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(parse_go_duration(""), None);
    }

    #[test]
    fn scenario_s4_time_coercion() {
        let t = parse_rfc3339("2020-10-04T01:02:03.000000004Z").unwrap();
        assert_eq!(
            t.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
            "2020-10-04T01:02:03.000000004Z"
        );
    }
}
