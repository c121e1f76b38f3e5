// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::utils::error::StorageError;

lazy_static! {
  static ref LABEL_NAME_REGEX: Regex = Regex::new("^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap();
}

/// Unordered labels of a series, as the legacy source storage keeps them.
pub type Metric = HashMap<String, String>;

/// Check whether the given string is a valid label name.
pub fn is_valid_label_name(name: &str) -> bool {
  LABEL_NAME_REGEX.is_match(name)
}

/// A single label - name and value.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Label {
  name: String,
  value: String,
}

impl Label {
  pub fn new(name: &str, value: &str) -> Self {
    Label {
      name: name.to_owned(),
      value: value.to_owned(),
    }
  }

  pub fn get_name(&self) -> &str {
    &self.name
  }

  pub fn get_value(&self) -> &str {
    &self.value
  }
}

/// A set of labels identifying one series. The labels are always kept in canonical
/// form - sorted by name, with unique names - so two label sets with the same
/// name/value pairs compare, hash and serialize identically regardless of the order
/// in which they were built.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(try_from = "Vec<Label>", into = "Vec<Label>")]
pub struct LabelSet {
  labels: Vec<Label>,
}

impl LabelSet {
  /// Create an empty label set.
  pub fn new() -> Self {
    LabelSet { labels: Vec::new() }
  }

  /// Create a label set from an unordered metric. Names in a map are unique, so this can't fail.
  pub fn from_metric(metric: &Metric) -> Self {
    let labels = metric
      .iter()
      .map(|(name, value)| Label::new(name, value))
      .collect();
    let mut label_set = LabelSet { labels };
    label_set.canonicalize();
    label_set
  }

  /// Create a label set from a list of labels in any order. Fails if a name appears twice.
  pub fn try_from_labels(labels: Vec<Label>) -> Result<Self, StorageError> {
    let mut label_set = LabelSet { labels };
    label_set.canonicalize();

    for pair in label_set.labels.windows(2) {
      if pair[0].name == pair[1].name {
        return Err(StorageError::InvalidLabels(format!(
          "duplicate label name {:?}",
          pair[0].name
        )));
      }
    }

    Ok(label_set)
  }

  /// Create a label set from (name, value) pairs in any order. Fails if a name appears twice.
  pub fn try_from_pairs(pairs: &[(&str, &str)]) -> Result<Self, StorageError> {
    Self::try_from_labels(
      pairs
        .iter()
        .map(|(name, value)| Label::new(name, value))
        .collect(),
    )
  }

  /// Sort the labels by name. Canonicalizing a canonical label set leaves it unchanged.
  pub fn canonicalize(&mut self) {
    self.labels.sort_by(|a, b| a.name.cmp(&b.name));
  }

  /// Check whether the labels are sorted by name.
  pub fn is_canonical(&self) -> bool {
    self.labels.windows(2).all(|pair| pair[0].name <= pair[1].name)
  }

  /// Get the value of the label with the given name.
  pub fn get(&self, name: &str) -> Option<&str> {
    self
      .labels
      .binary_search_by(|label| label.name.as_str().cmp(name))
      .ok()
      .map(|pos| self.labels[pos].value.as_str())
  }

  pub fn iter(&self) -> impl Iterator<Item = &Label> {
    self.labels.iter()
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  /// Convert to the unordered representation.
  pub fn to_metric(&self) -> Metric {
    self
      .labels
      .iter()
      .map(|label| (label.name.clone(), label.value.clone()))
      .collect()
  }
}

impl TryFrom<Vec<Label>> for LabelSet {
  type Error = StorageError;

  fn try_from(labels: Vec<Label>) -> Result<Self, Self::Error> {
    LabelSet::try_from_labels(labels)
  }
}

impl From<LabelSet> for Vec<Label> {
  fn from(label_set: LabelSet) -> Self {
    label_set.labels
  }
}

impl fmt::Display for LabelSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{{")?;
    for (i, label) in self.labels.iter().enumerate() {
      if i > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{}={:?}", label.name, label.value)?;
    }
    write!(f, "}}")
  }
}
