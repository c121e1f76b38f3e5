// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use std::fmt;

use log::{info, warn};

use crate::metric::matcher::LabelMatcher;
use crate::source::SourceStore;
use crate::utils::error::{MatcherError, MigrationError};

/// A disjoint slice of the source's series: those whose partition label has one given value.
#[derive(Clone, Debug, PartialEq)]
pub struct Shard {
  matcher: LabelMatcher,
}

impl Shard {
  pub fn new(partition_label: &str, value: &str) -> Result<Self, MatcherError> {
    Ok(Shard {
      matcher: LabelMatcher::equal(partition_label, value)?,
    })
  }

  pub fn get_matcher(&self) -> &LabelMatcher {
    &self.matcher
  }

  pub fn get_value(&self) -> &str {
    self.matcher.get_value()
  }

  /// Whether this shard selects the series that don't have the partition label.
  pub fn is_catch_all(&self) -> bool {
    self.matcher.get_value().is_empty()
  }
}

impl fmt::Display for Shard {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.matcher)
  }
}

/// The shards of a migration, sorted by value. The catch-all shard, if any, is last.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShardSet {
  shards: Vec<Shard>,
}

impl ShardSet {
  pub fn new(shards: Vec<Shard>) -> Self {
    ShardSet { shards }
  }

  pub fn get_shards(&self) -> &[Shard] {
    &self.shards
  }

  pub fn iter(&self) -> impl Iterator<Item = &Shard> {
    self.shards.iter()
  }

  pub fn len(&self) -> usize {
    self.shards.len()
  }

  pub fn is_empty(&self) -> bool {
    self.shards.is_empty()
  }
}

/// Discovers the shards of a migration from the values of the partition label.
///
/// Enumeration happens once, before the first window. Series whose partition label value first
/// appears after that are not migrated.
#[derive(Clone, Debug)]
pub struct ShardEnumerator {
  partition_label: String,
  include_unlabeled: bool,
}

impl ShardEnumerator {
  pub fn new(partition_label: &str, include_unlabeled: bool) -> Self {
    ShardEnumerator {
      partition_label: partition_label.to_owned(),
      include_unlabeled,
    }
  }

  pub fn get_partition_label(&self) -> &str {
    &self.partition_label
  }

  pub fn get_include_unlabeled(&self) -> bool {
    self.include_unlabeled
  }

  /// Query the source for the partition label values and build one shard per value.
  pub fn enumerate(&self, source: &dyn SourceStore) -> Result<ShardSet, MigrationError> {
    let values = source
      .label_values_for_label_name(&self.partition_label)
      .map_err(MigrationError::ShardEnumeration)?;

    let mut values: Vec<String> = values.into_iter().filter(|v| !v.is_empty()).collect();
    values.sort();

    let mut shards = values
      .iter()
      .map(|value| Shard::new(&self.partition_label, value))
      .collect::<Result<Vec<Shard>, MatcherError>>()?;

    if self.include_unlabeled {
      shards.push(Shard::new(&self.partition_label, "")?);
    } else if shards.is_empty() {
      warn!(
        "No values found for partition label {:?}, nothing to migrate",
        self.partition_label
      );
    }

    info!(
      "Found {} shards for partition label {:?}",
      shards.len(),
      self.partition_label
    );
    Ok(ShardSet::new(shards))
  }
}
