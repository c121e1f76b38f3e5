// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use chrono::{Duration, Utc};

use crate::utils::error::SchedulingError;

/// Get the current time in milliseconds since the Unix epoch.
pub fn get_current_time_in_millis() -> i64 {
  Utc::now().timestamp_millis()
}

/// Convert a Unix timestamp in seconds to milliseconds. Zero means "now".
pub fn end_time_from_unix_seconds(unix_seconds: i64) -> i64 {
  if unix_seconds == 0 {
    get_current_time_in_millis()
  } else {
    unix_seconds.saturating_mul(1000)
  }
}

/// Parse a Prometheus-style duration string such as "15m", "2h" or "15d".
pub fn parse_duration(s: &str) -> Result<Duration, SchedulingError> {
  let s = s.trim();
  let units = s
    .chars()
    .last()
    .ok_or_else(|| SchedulingError::InvalidDuration(s.to_owned()))?;

  // "ms" is the only two-character unit.
  let (number, units) = if let Some(number) = s.strip_suffix("ms") {
    (number, "ms")
  } else {
    (&s[..s.len() - units.len_utf8()], &s[s.len() - units.len_utf8()..])
  };

  let value = number
    .parse::<i64>()
    .map_err(|_| SchedulingError::InvalidDuration(s.to_owned()))?;

  let duration = match units {
    "ms" => Duration::try_milliseconds(value),
    "s" => Duration::try_seconds(value),
    "m" => Duration::try_minutes(value),
    "h" => Duration::try_hours(value),
    "d" => Duration::try_days(value),
    "w" => Duration::try_weeks(value),
    _ => None,
  };
  duration.ok_or_else(|| SchedulingError::InvalidDuration(s.to_owned()))
}

#[cfg(test)]
mod tests {
  use super::*;

  use test_case::test_case;

  #[test_case("250ms", 250; "milliseconds")]
  #[test_case("30s", 30_000; "seconds")]
  #[test_case("15m", 900_000; "minutes")]
  #[test_case("2h", 7_200_000; "hours")]
  #[test_case("15d", 1_296_000_000; "days")]
  #[test_case("1w", 604_800_000; "weeks")]
  #[test_case("0s", 0; "zero")]
  fn test_parse_duration(input: &str, expected_millis: i64) {
    let duration = parse_duration(input).unwrap();
    assert_eq!(duration.num_milliseconds(), expected_millis);
  }

  #[test_case(""; "empty")]
  #[test_case("m"; "missing number")]
  #[test_case("15"; "missing unit")]
  #[test_case("15y"; "unknown unit")]
  #[test_case("1.5h"; "fractional")]
  #[test_case("999999999999999d"; "days out of range")]
  #[test_case("99999999999999w"; "weeks out of range")]
  #[test_case("9223372036854775807s"; "seconds out of range")]
  #[test_case("99999999999999999999ms"; "number out of range")]
  fn test_parse_invalid_duration(input: &str) {
    assert_eq!(
      parse_duration(input),
      Err(SchedulingError::InvalidDuration(input.to_owned()))
    );
  }

  #[test]
  fn test_end_time_from_unix_seconds() {
    assert_eq!(end_time_from_unix_seconds(1700000000), 1_700_000_000_000);

    let before = get_current_time_in_millis();
    let now = end_time_from_unix_seconds(0);
    assert!(now >= before);
  }
}
