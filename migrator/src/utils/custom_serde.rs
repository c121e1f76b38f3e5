// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

/// Custom serde serialize and deserialize implementation for Prometheus-style
/// duration strings, such as "15m" or "360h".
pub mod duration_serde {
  use chrono::Duration;
  use serde::de::{Deserializer, Error};
  use serde::ser::Serializer;
  use serde::Deserialize;

  use crate::utils::time::parse_duration;

  /// Serialize the duration as a number of milliseconds, e.g. "900000ms".
  #[allow(dead_code)]
  pub fn serialize<S>(val: &Duration, s: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    s.serialize_str(&format!("{}ms", val.num_milliseconds()))
  }

  /// Deserialize a duration string.
  pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
  where
    D: Deserializer<'de>,
  {
    let s = String::deserialize(d)?;
    parse_duration(&s).map_err(D::Error::custom)
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;
  use serde::{Deserialize, Serialize};

  #[derive(Debug, Deserialize, Serialize, PartialEq)]
  struct WithDuration {
    #[serde(with = "super::duration_serde")]
    step: Duration,
  }

  #[test]
  fn test_duration_serde() {
    let parsed: WithDuration = serde_json::from_str(r#"{"step": "15m"}"#).unwrap();
    assert_eq!(parsed.step, Duration::minutes(15));

    let serialized = serde_json::to_string(&parsed).unwrap();
    assert_eq!(serialized, r#"{"step":"900000ms"}"#);
    let reparsed: WithDuration = serde_json::from_str(&serialized).unwrap();
    assert_eq!(reparsed, parsed);

    assert!(serde_json::from_str::<WithDuration>(r#"{"step": "fifteen"}"#).is_err());
  }
}
