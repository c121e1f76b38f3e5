// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use approx::abs_diff_eq;
use serde::{Deserialize, Serialize};

/// Represents a sample in a time series.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct Sample {
  /// Milliseconds since the Unix epoch.
  timestamp: i64,

  /// Value for this sample.
  value: f64,
}

impl Sample {
  /// Create a new Sample from given timestamp and value.
  pub fn new(timestamp: i64, value: f64) -> Self {
    Sample { timestamp, value }
  }

  /// Create a new Sample from given tsz::DataPoint.
  pub(crate) fn new_from_tsz_data_point(tsz_data_point: tsz::DataPoint) -> Self {
    Sample {
      timestamp: tsz_data_point.get_time() as i64,
      value: tsz_data_point.get_value(),
    }
  }

  /// Get timestamp.
  pub fn get_timestamp(&self) -> i64 {
    self.timestamp
  }

  /// Get value.
  pub fn get_value(&self) -> f64 {
    self.value
  }

  /// Get tsz::DataPoint corresponding to this Sample. Only valid for non-negative timestamps,
  /// which both storage engines enforce on write.
  pub(crate) fn get_tsz_data_point(&self) -> tsz::DataPoint {
    tsz::DataPoint::new(self.timestamp as u64, self.value)
  }
}

impl PartialEq for Sample {
  #[inline]
  fn eq(&self, other: &Sample) -> bool {
    // Two samples are equal if their timestamps are equal, and their values are either equal or are NaN.
    if self.timestamp == other.timestamp {
      if self.value.is_nan() {
        return other.value.is_nan();
      } else {
        return abs_diff_eq!(self.value, other.value);
      }
    }
    false
  }
}

impl Eq for Sample {}

impl Ord for Sample {
  fn cmp(&self, other: &Self) -> Ordering {
    self.timestamp.cmp(&other.timestamp)
  }
}

impl PartialOrd for Sample {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Hash for Sample {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.timestamp.hash(state);
    self.value.to_bits().hash(state);
  }
}
