//! Go-style duration string parsing (`"40s"`, `"1h20m"`, `"4h30m30s"`).

use std::time::Duration;

/// Parse a Go-style duration string into a [`Duration`]. Accepts a sequence
/// of `<number><unit>` pairs (`ns`, `us`/`µs`, `ms`, `s`, `m`, `h`), e.g.
/// `"40s"`, `"1h20m"`, `"4h30m30s"`. A bare leading `-` is rejected: the
/// executor's timeouts are never negative.
pub fn parse_go_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration string".to_string());
    }
    if let Some(stripped) = input.strip_prefix('-') {
        return Err(format!("negative durations are not supported: -{stripped}"));
    }

    let mut total = 0.0_f64;
    let mut rest = input;
    let mut consumed_any = false;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration `{input}`"))?;
        if digits_end == 0 {
            return Err(format!("expected a number in duration `{input}`"));
        }
        let (number_str, remainder) = rest.split_at(digits_end);
        let number: f64 = number_str
            .parse()
            .map_err(|_| format!("invalid number `{number_str}` in duration `{input}`"))?;

        let (unit, remainder) = split_unit(remainder).ok_or_else(|| format!("unknown unit in duration `{input}`"))?;
        let seconds_per_unit = match unit {
            "ns" => 1e-9,
            "us" | "\u{b5}s" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            other => return Err(format!("unknown unit `{other}` in duration `{input}`")),
        };
        total += number * seconds_per_unit;
        rest = remainder;
        consumed_any = true;
    }

    if !consumed_any {
        return Err(format!("no components parsed from duration `{input}`"));
    }
    Ok(Duration::from_secs_f64(total))
}

/// Split the longest known unit prefix off `input`, longest units first so
/// `"ms"` isn't mis-split as `"m"` + `"s"`.
fn split_unit(input: &str) -> Option<(&str, &str)> {
    const UNITS: &[&str] = &["ns", "us", "\u{b5}s", "ms", "s", "m", "h"];
    for unit in UNITS {
        if let Some(rest) = input.strip_prefix(unit) {
            return Some((unit, rest));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_seconds() {
        assert_eq!(parse_go_duration("40s").unwrap(), Duration::from_secs(40));
    }

    #[test]
    fn parses_combined_units() {
        let d = parse_go_duration("1h20m").unwrap();
        assert_eq!(d, Duration::from_secs(3600 + 20 * 60));
    }

    #[test]
    fn parses_three_units() {
        let d = parse_go_duration("4h30m30s").unwrap();
        assert_eq!(d, Duration::from_secs(4 * 3600 + 30 * 60 + 30));
    }

    #[test]
    fn parses_plain_hours() {
        assert_eq!(parse_go_duration("2h").unwrap(), Duration::from_secs(2 * 3600));
    }

    #[test]
    fn rejects_negative() {
        assert!(parse_go_duration("-5s").is_err());
    }

    #[test]
    fn rejects_missing_unit() {
        assert!(parse_go_duration("40").is_err());
    }
}
