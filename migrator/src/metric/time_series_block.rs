// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use log::debug;
use serde::{Deserialize, Serialize};

use crate::metric::constants::BLOCK_SIZE_FOR_TIME_SERIES;
use crate::metric::metricutils::{decompress_sample_vector, is_encodable_delta};
use crate::metric::sample::Sample;
use crate::metric::time_series_block_compressed::TimeSeriesBlockCompressed;
use crate::utils::error::ChunkError;

/// Represents an uncompressed time series block.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TimeSeriesBlock {
  /// Vector of samples, sorted by timestamp.
  samples: Vec<Sample>,
}

impl TimeSeriesBlock {
  /// Create a new time series block.
  pub fn new() -> Self {
    // We allocate a fixed capacity at the beginning, so that the vector doesn't get dynamically reallocated during appends.
    Self {
      samples: Vec::with_capacity(BLOCK_SIZE_FOR_TIME_SERIES),
    }
  }

  /// Create a time series block from the given vector of samples.
  pub fn new_with_samples(samples: Vec<Sample>) -> Self {
    Self { samples }
  }

  /// Check whether this time series block is empty.
  pub fn is_empty(&self) -> bool {
    self.samples.is_empty()
  }

  pub fn get_samples(&self) -> &Vec<Sample> {
    &self.samples
  }

  /// Get the latest sample in this block.
  pub fn last(&self) -> Option<&Sample> {
    self.samples.last()
  }

  /// Whether a sample at the given timestamp can be added while keeping the block compressible.
  pub fn can_encode(&self, timestamp: i64) -> bool {
    match self.samples.as_slice() {
      [] => true,
      [last] if last.get_timestamp() <= timestamp => {
        is_encodable_delta(0, timestamp - last.get_timestamp())
      }
      [.., previous, last] if last.get_timestamp() <= timestamp => is_encodable_delta(
        last.get_timestamp() - previous.get_timestamp(),
        timestamp - last.get_timestamp(),
      ),
      _ => {
        let mut timestamps: Vec<i64> = self.samples.iter().map(|s| s.get_timestamp()).collect();
        let pos = timestamps.partition_point(|&t| t <= timestamp);
        timestamps.insert(pos, timestamp);

        let mut previous_delta = 0;
        for pair in timestamps.windows(2) {
          let delta = pair[1] - pair[0];
          if !is_encodable_delta(previous_delta, delta) {
            return false;
          }
          previous_delta = delta;
        }
        true
      }
    }
  }

  /// Append a new sample with given timestamp and value.
  pub fn append(&mut self, timestamp: i64, value: f64) -> Result<(), ChunkError> {
    if self.samples.len() >= BLOCK_SIZE_FOR_TIME_SERIES {
      debug!("Capacity full error while inserting timestamp/value {}/{}. Typically a new block will now be created.",
             timestamp, value);
      return Err(ChunkError::CapacityFull(BLOCK_SIZE_FOR_TIME_SERIES));
    }

    let sample = Sample::new(timestamp, value);

    // Always keep samples vector sorted (by timestamp), as the compression needs it to be sorted.
    match self.samples.last() {
      Some(last) if last >= &sample => {
        let pos = self.samples.binary_search(&sample).unwrap_or_else(|e| e);
        self.samples.insert(pos, sample);
      }
      _ => self.samples.push(sample),
    }

    Ok(())
  }

  /// Get the samples in the specified range (both range_start_time and range_end_time inclusive).
  pub fn get_samples_in_range(&self, range_start_time: i64, range_end_time: i64) -> Vec<Sample> {
    self
      .samples
      .iter()
      .filter(|sample| {
        let timestamp = sample.get_timestamp();
        timestamp >= range_start_time && timestamp <= range_end_time
      })
      .copied()
      .collect()
  }

  /// Get the number of samples in this time series block.
  pub fn len(&self) -> usize {
    self.samples.len()
  }
}

impl PartialEq for TimeSeriesBlock {
  fn eq(&self, other: &Self) -> bool {
    self.samples == other.samples
  }
}

impl Eq for TimeSeriesBlock {}

impl TryFrom<&TimeSeriesBlockCompressed> for TimeSeriesBlock {
  type Error = ChunkError;

  // Decompress a compressed time series block.
  fn try_from(
    time_series_block_compressed: &TimeSeriesBlockCompressed,
  ) -> Result<Self, Self::Error> {
    let samples_compressed = time_series_block_compressed.get_samples_compressed();
    let samples = decompress_sample_vector(samples_compressed)?;
    Ok(TimeSeriesBlock::new_with_samples(samples))
  }
}

impl Default for TimeSeriesBlock {
  fn default() -> Self {
    Self::new()
  }
}
