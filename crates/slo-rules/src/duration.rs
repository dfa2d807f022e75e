//! Prometheus duration notation.
//!
//! Rule names, range selectors and the `for` clause of alerts all use the
//! compact Prometheus form (`5m`, `1h30m`, `4w`). Years and weeks are only
//! used when they divide the duration exactly, so 90 days prints as `90d`
//! rather than `12w6d`.

use std::time::Duration;

use crate::error::{Result, RuleError};

const MILLIS_PER_SECOND: u128 = 1_000;
const MILLIS_PER_MINUTE: u128 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: u128 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: u128 = 24 * MILLIS_PER_HOUR;
const MILLIS_PER_WEEK: u128 = 7 * MILLIS_PER_DAY;
const MILLIS_PER_YEAR: u128 = 365 * MILLIS_PER_DAY;

/// Units in the order they must appear, with their size in milliseconds and
/// whether they are only used for exact multiples.
const UNITS: [(&str, u128, bool); 7] = [
    ("y", MILLIS_PER_YEAR, true),
    ("w", MILLIS_PER_WEEK, true),
    ("d", MILLIS_PER_DAY, false),
    ("h", MILLIS_PER_HOUR, false),
    ("m", MILLIS_PER_MINUTE, false),
    ("s", MILLIS_PER_SECOND, false),
    ("ms", 1, false),
];

/// Formats a duration in Prometheus notation.
///
/// Precision below one millisecond is dropped.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let mut ms = duration.as_millis();
    if ms == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (unit, size, exact) in UNITS {
        if exact && ms % size != 0 {
            continue;
        }
        let count = ms / size;
        if count > 0 {
            out.push_str(&count.to_string());
            out.push_str(unit);
            ms -= count * size;
        }
    }
    out
}

/// Parses a duration in Prometheus notation, e.g. `30s`, `4w` or `1h30m`.
///
/// Units must appear from largest to smallest and at most once each. A bare
/// `0` is accepted as the zero duration.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = |reason: &str| RuleError::InvalidDuration {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    if input.is_empty() {
        return Err(invalid("empty duration"));
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }

    let mut rest = input;
    let mut next_unit = 0;
    let mut total: u128 = 0;

    while !rest.is_empty() {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return Err(invalid("expected a number"));
        }
        let value: u128 = rest[..digits]
            .parse()
            .map_err(|_| invalid("number out of range"))?;
        rest = &rest[digits..];

        let unit_len = rest
            .bytes()
            .take_while(u8::is_ascii_alphabetic)
            .count();
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let position = UNITS[next_unit..]
            .iter()
            .position(|(name, _, _)| *name == unit)
            .ok_or_else(|| {
                if UNITS.iter().any(|(name, _, _)| *name == unit) {
                    invalid("units out of order")
                } else {
                    invalid("unknown unit")
                }
            })?;
        let (_, size, _) = UNITS[next_unit + position];
        next_unit += position + 1;

        total = value
            .checked_mul(size)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| invalid("duration out of range"))?;
    }

    let millis = u64::try_from(total).map_err(|_| invalid("duration out of range"))?;
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    #[test_case(0, "0s" ; "zero")]
    #[test_case(5 * MINUTE, "5m" ; "five minutes")]
    #[test_case(HOUR + 30 * MINUTE, "1h30m" ; "combined units")]
    #[test_case(DAY, "1d" ; "one day")]
    #[test_case(4 * DAY, "4d" ; "four days")]
    #[test_case(7 * DAY, "1w" ; "one week")]
    #[test_case(28 * DAY, "4w" ; "four weeks")]
    #[test_case(90 * DAY, "90d" ; "days when weeks are inexact")]
    #[test_case(365 * DAY, "1y" ; "one year")]
    #[test_case(2 * MINUTE + 9, "2m9s" ; "minutes and seconds")]
    fn formats_seconds(secs: u64, expected: &str) {
        assert_eq!(format_duration(Duration::from_secs(secs)), expected);
    }

    #[test]
    fn formats_milliseconds() {
        assert_eq!(format_duration(Duration::from_millis(1_500)), "1s500ms");
        assert_eq!(format_duration(Duration::from_millis(7)), "7ms");
    }

    #[test]
    fn drops_sub_millisecond_precision() {
        assert_eq!(format_duration(Duration::from_nanos(999_999)), "0s");
    }

    #[test_case("30s", 30 ; "seconds")]
    #[test_case("5m", 5 * MINUTE ; "minutes")]
    #[test_case("1h30m", HOUR + 30 * MINUTE ; "combined")]
    #[test_case("4w", 28 * DAY ; "weeks")]
    #[test_case("1y", 365 * DAY ; "years")]
    #[test_case("0", 0 ; "bare zero")]
    fn parses(input: &str, secs: u64) {
        assert_eq!(parse_duration(input), Ok(Duration::from_secs(secs)));
    }

    #[test]
    fn parses_milliseconds() {
        assert_eq!(parse_duration("1s500ms"), Ok(Duration::from_millis(1_500)));
    }

    #[test_case("" ; "empty")]
    #[test_case("5" ; "missing unit")]
    #[test_case("5x" ; "unknown unit")]
    #[test_case("m" ; "missing number")]
    #[test_case("30m1h" ; "out of order")]
    #[test_case("1m1m" ; "repeated unit")]
    #[test_case("-5m" ; "negative")]
    fn rejects(input: &str) {
        assert!(matches!(
            parse_duration(input),
            Err(RuleError::InvalidDuration { .. })
        ));
    }

    proptest! {
        #[test]
        fn formatted_durations_parse_back(ms in 0u64..=20 * 365 * 24 * 3_600_000) {
            let duration = Duration::from_millis(ms);
            prop_assert_eq!(parse_duration(&format_duration(duration)), Ok(duration));
        }
    }
}
