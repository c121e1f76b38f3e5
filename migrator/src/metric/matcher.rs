// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use std::fmt;

use regex::Regex;

use crate::metric::label::{LabelSet, Metric};
use crate::utils::error::MatcherError;

/// Represents a condition used by a label matcher.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MatchType {
  Equal,
  NotEqual,
  RegexMatch,
  RegexNoMatch,
}

impl fmt::Display for MatchType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let op = match self {
      MatchType::Equal => "=",
      MatchType::NotEqual => "!=",
      MatchType::RegexMatch => "=~",
      MatchType::RegexNoMatch => "!~",
    };
    write!(f, "{}", op)
  }
}

/// A predicate over the value of one label. A series that doesn't have the label
/// is treated as having the empty value, so `name=""` selects series without `name`.
#[derive(Clone, Debug)]
pub struct LabelMatcher {
  match_type: MatchType,
  name: String,
  value: String,

  /// Fully anchored regex, only for the regex match types.
  regex: Option<Regex>,
}

impl LabelMatcher {
  pub fn new(match_type: MatchType, name: &str, value: &str) -> Result<Self, MatcherError> {
    if name.is_empty() {
      return Err(MatcherError::EmptyLabelName);
    }

    let regex = match match_type {
      MatchType::RegexMatch | MatchType::RegexNoMatch => Some(
        Regex::new(&format!("^(?:{})$", value))
          .map_err(|e| MatcherError::InvalidRegex(value.to_owned(), e.to_string()))?,
      ),
      MatchType::Equal | MatchType::NotEqual => None,
    };

    Ok(LabelMatcher {
      match_type,
      name: name.to_owned(),
      value: value.to_owned(),
      regex,
    })
  }

  /// Shorthand for an equality matcher - the matcher used for shards.
  pub fn equal(name: &str, value: &str) -> Result<Self, MatcherError> {
    Self::new(MatchType::Equal, name, value)
  }

  pub fn get_match_type(&self) -> MatchType {
    self.match_type
  }

  pub fn get_name(&self) -> &str {
    &self.name
  }

  pub fn get_value(&self) -> &str {
    &self.value
  }

  /// Check whether the given label value satisfies this matcher.
  pub fn matches_value(&self, value: &str) -> bool {
    match self.match_type {
      MatchType::Equal => value == self.value,
      MatchType::NotEqual => value != self.value,
      MatchType::RegexMatch => self.regex.as_ref().is_some_and(|re| re.is_match(value)),
      MatchType::RegexNoMatch => !self.regex.as_ref().is_some_and(|re| re.is_match(value)),
    }
  }

  /// Check whether the given unordered labels satisfy this matcher.
  pub fn matches_metric(&self, metric: &Metric) -> bool {
    let value = metric.get(&self.name).map(String::as_str).unwrap_or("");
    self.matches_value(value)
  }

  /// Check whether the given label set satisfies this matcher.
  pub fn matches_label_set(&self, label_set: &LabelSet) -> bool {
    self.matches_value(label_set.get(&self.name).unwrap_or(""))
  }
}

impl PartialEq for LabelMatcher {
  fn eq(&self, other: &Self) -> bool {
    self.match_type == other.match_type && self.name == other.name && self.value == other.value
  }
}

impl Eq for LabelMatcher {}

impl fmt::Display for LabelMatcher {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{}{:?}", self.name, self.match_type, self.value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use test_case::test_case;

  fn metric(pairs: &[(&str, &str)]) -> Metric {
    pairs
      .iter()
      .map(|(name, value)| (name.to_string(), value.to_string()))
      .collect()
  }

  #[test_case(MatchType::Equal, "h1", true, false, false; "equal")]
  #[test_case(MatchType::NotEqual, "h1", false, true, true; "not equal")]
  #[test_case(MatchType::RegexMatch, "h.*", true, true, false; "regex match")]
  #[test_case(MatchType::RegexNoMatch, "h.*", false, false, true; "regex no match")]
  #[test_case(MatchType::Equal, "", false, false, true; "equal empty selects missing label")]
  fn test_matches(
    match_type: MatchType,
    value: &str,
    expect_h1: bool,
    expect_h2: bool,
    expect_missing: bool,
  ) {
    let matcher = LabelMatcher::new(match_type, "instance", value).unwrap();

    assert_eq!(
      matcher.matches_metric(&metric(&[("instance", "h1"), ("job", "a")])),
      expect_h1
    );
    assert_eq!(
      matcher.matches_metric(&metric(&[("instance", "h2"), ("job", "a")])),
      expect_h2
    );
    assert_eq!(
      matcher.matches_metric(&metric(&[("job", "a")])),
      expect_missing
    );

    let label_set = LabelSet::try_from_pairs(&[("instance", "h1"), ("job", "a")]).unwrap();
    assert_eq!(matcher.matches_label_set(&label_set), expect_h1);
  }

  #[test]
  fn test_regex_is_anchored() {
    let matcher = LabelMatcher::new(MatchType::RegexMatch, "job", "api").unwrap();
    assert!(matcher.matches_value("api"));
    assert!(!matcher.matches_value("api-server"));
    assert!(!matcher.matches_value("my-api"));
  }

  #[test]
  fn test_invalid_matchers() {
    assert_eq!(
      LabelMatcher::equal("", "x"),
      Err(MatcherError::EmptyLabelName)
    );
    assert!(matches!(
      LabelMatcher::new(MatchType::RegexMatch, "job", "(unclosed"),
      Err(MatcherError::InvalidRegex(_, _))
    ));
  }

  #[test]
  fn test_display() {
    let matcher = LabelMatcher::equal("instance", "h1:9090").unwrap();
    assert_eq!(matcher.to_string(), r#"instance="h1:9090""#);
  }
}
