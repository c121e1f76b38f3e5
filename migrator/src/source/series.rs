// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use crate::metric::label::{LabelSet, Metric};
use crate::metric::sample::Sample;

/// A series as returned by a source query: its unordered labels and its samples, sorted by time.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceSeries {
  metric: Metric,
  samples: Vec<Sample>,
}

impl SourceSeries {
  /// Create a series. The samples are sorted by timestamp if they aren't already.
  pub fn new(metric: Metric, mut samples: Vec<Sample>) -> Self {
    if !samples
      .windows(2)
      .all(|pair| pair[0].get_timestamp() <= pair[1].get_timestamp())
    {
      samples.sort();
    }
    SourceSeries { metric, samples }
  }

  pub fn metric(&self) -> &Metric {
    &self.metric
  }

  /// Get the labels of this series in canonical order.
  pub fn label_set(&self) -> LabelSet {
    LabelSet::from_metric(&self.metric)
  }

  pub fn get_samples(&self) -> &[Sample] {
    &self.samples
  }

  /// Get the samples with `oldest_inclusive <= timestamp <= newest_inclusive`.
  pub fn range_values(&self, oldest_inclusive: i64, newest_inclusive: i64) -> Vec<Sample> {
    if oldest_inclusive > newest_inclusive {
      return Vec::new();
    }
    let start = self
      .samples
      .partition_point(|sample| sample.get_timestamp() < oldest_inclusive);
    let end = self
      .samples
      .partition_point(|sample| sample.get_timestamp() <= newest_inclusive);
    self.samples[start..end].to_vec()
  }

  pub fn len(&self) -> usize {
    self.samples.len()
  }

  pub fn is_empty(&self) -> bool {
    self.samples.is_empty()
  }
}
