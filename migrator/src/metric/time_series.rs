// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use serde::{Deserialize, Serialize};

use crate::metric::constants::BLOCK_SIZE_FOR_TIME_SERIES;
use crate::metric::sample::Sample;
use crate::metric::time_series_block::TimeSeriesBlock;
use crate::metric::time_series_block_compressed::TimeSeriesBlockCompressed;
use crate::utils::error::ChunkError;
use crate::utils::range::is_overlap;

/// Approximate in-memory size of an uncompressed sample.
const UNCOMPRESSED_SAMPLE_SIZE_BYTES: usize = std::mem::size_of::<Sample>();

/// Represents a chunked time series. The time series consists of time series blocks, each containing
/// at most BLOCK_SIZE_FOR_TIME_SERIES samples. All but the last block are compressed. In order to quickly get
/// to the right block, a vector of initial timestamps in each block is also stored (also called 'skip
/// pointer' in literature).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TimeSeries {
  /// A list of compressed time series blocks.
  compressed_blocks: Vec<TimeSeriesBlockCompressed>,

  /// Blocks are compressed once they have BLOCK_SIZE_FOR_TIME_SERIES samples, or earlier when the
  /// next timestamp is too far away to be encoded with them. The last block is uncompressed.
  last_block: TimeSeriesBlock,

  /// The initial timestamps in the time series blocks. The length of the initial
  /// timestamps will be 1 plus length of the 'compressed_blocks'.
  /// (The additional 1 is to account for the uncompressed 'last' block)
  initial_times: Vec<i64>,

  /// Total number of samples in this time series.
  num_samples: usize,
}

impl TimeSeries {
  /// Create a new empty time series.
  pub fn new() -> Self {
    TimeSeries {
      compressed_blocks: Vec::new(),
      last_block: TimeSeriesBlock::new(),
      initial_times: Vec::new(),
      num_samples: 0,
    }
  }

  /// Create a time series from samples sorted by timestamp.
  pub fn from_samples(samples: &[Sample]) -> Result<Self, ChunkError> {
    let mut time_series = TimeSeries::new();
    for sample in samples {
      time_series.append(sample.get_timestamp(), sample.get_value())?;
    }
    Ok(time_series)
  }

  /// Append the given timestamp and value to the time series.
  pub fn append(&mut self, timestamp: i64, value: f64) -> Result<(), ChunkError> {
    // A gap the delta-of-delta encoding can't represent starts a new block.
    if !self.last_block.can_encode(timestamp) {
      self.compress_last_block()?;
    }

    // First insertion in this block?
    let mut is_initial = self.last_block.is_empty();

    match self.last_block.append(timestamp, value) {
      Ok(()) => {}
      Err(ChunkError::CapacityFull(_)) => {
        self.compress_last_block()?;
        self.last_block.append(timestamp, value)?;
        is_initial = true;
      }
      Err(err) => return Err(err),
    }

    if is_initial {
      self.initial_times.push(timestamp);
    }
    self.num_samples += 1;

    Ok(())
  }

  /// Compress the last block, push it to the compressed blocks and start an empty last block.
  fn compress_last_block(&mut self) -> Result<(), ChunkError> {
    let tsbc = TimeSeriesBlockCompressed::try_from(&self.last_block)?;
    self.compressed_blocks.push(tsbc);
    self.last_block = TimeSeriesBlock::new();
    Ok(())
  }

  /// Get the samples between given start and end time (both inclusive), sorted by timestamp.
  pub fn get_samples(
    &self,
    range_start_time: i64,
    range_end_time: i64,
  ) -> Result<Vec<Sample>, ChunkError> {
    let mut retval = Vec::new();

    // Get overlapping samples from the compressed blocks.
    for (i, compressed_block) in self.compressed_blocks.iter().enumerate() {
      let block_start = self.initial_times[i];

      // The maximum block end time would be one less than the start time of the next block.
      let block_end = self.initial_times[i + 1].saturating_sub(1);

      if is_overlap(block_start, block_end, range_start_time, range_end_time) {
        let block = TimeSeriesBlock::try_from(compressed_block)?;
        retval.extend(block.get_samples_in_range(range_start_time, range_end_time));
      }
    }

    // Get overlapping samples from the last block.
    retval.extend(
      self
        .last_block
        .get_samples_in_range(range_start_time, range_end_time),
    );

    Ok(retval)
  }

  /// Get the timestamp of the latest sample.
  pub fn last_timestamp(&self) -> Option<i64> {
    self.last_block.last().map(|sample| sample.get_timestamp())
  }

  /// Get the timestamp of the earliest sample.
  pub fn first_timestamp(&self) -> Option<i64> {
    self.initial_times.first().copied()
  }

  /// Get the number of samples in this time series.
  pub fn len(&self) -> usize {
    self.num_samples
  }

  pub fn is_empty(&self) -> bool {
    self.num_samples == 0
  }

  /// Estimate the memory held by this time series.
  pub fn get_size_bytes(&self) -> usize {
    let compressed: usize = self
      .compressed_blocks
      .iter()
      .map(|block| block.get_size_bytes())
      .sum();
    compressed
      + self.last_block.len() * UNCOMPRESSED_SAMPLE_SIZE_BYTES
      + self.initial_times.len() * std::mem::size_of::<i64>()
  }

  #[cfg(test)]
  pub fn get_compressed_blocks(&self) -> &Vec<TimeSeriesBlockCompressed> {
    &self.compressed_blocks
  }

  #[cfg(test)]
  pub fn get_initial_times(&self) -> &Vec<i64> {
    &self.initial_times
  }
}

impl Default for TimeSeries {
  fn default() -> Self {
    Self::new()
  }
}

impl PartialEq for TimeSeries {
  fn eq(&self, other: &Self) -> bool {
    self.compressed_blocks == other.compressed_blocks
      && self.initial_times == other.initial_times
      && self.last_block == other.last_block
  }
}

impl Eq for TimeSeries {}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::utils::sync::is_sync_send;

  #[test]
  fn test_new() {
    // Check that the time series implements sync.
    is_sync_send::<TimeSeries>();

    // Check that a new time series is empty.
    let ts = TimeSeries::new();
    assert_eq!(ts.compressed_blocks.len(), 0);
    assert_eq!(ts.last_block.len(), 0);
    assert_eq!(ts.initial_times.len(), 0);
    assert!(ts.is_empty());
    assert_eq!(ts.last_timestamp(), None);
    assert_eq!(ts, TimeSeries::default());
  }

  #[test]
  fn test_one_entry() {
    let mut ts = TimeSeries::new();
    ts.append(100, 200.0).unwrap();

    // The entry should get appended only to 'last' block.
    assert_eq!(ts.compressed_blocks.len(), 0);
    assert_eq!(ts.last_block.len(), 1);
    let sample = ts.last_block.get_samples().first().unwrap();
    assert_eq!(sample.get_timestamp(), 100);
    assert_eq!(sample.get_value(), 200.0);

    assert_eq!(ts.initial_times, vec![100]);
    assert_eq!(ts.first_timestamp(), Some(100));
    assert_eq!(ts.last_timestamp(), Some(100));
    assert_eq!(ts.len(), 1);
  }

  #[test]
  fn test_block_size_plus_one_entries() {
    let mut ts = TimeSeries::new();

    // Append block_size+1 entries, so that two blocks are created.
    for i in 0..BLOCK_SIZE_FOR_TIME_SERIES + 1 {
      ts.append(i as i64, i as f64).unwrap();
    }

    // We should have 1 compressed block with 128 entries, and a last block with 1 entry.
    assert_eq!(ts.get_compressed_blocks().len(), 1);
    assert_eq!(ts.last_block.len(), 1);
    assert_eq!(
      ts.get_initial_times(),
      &vec![0, BLOCK_SIZE_FOR_TIME_SERIES as i64]
    );
    assert_eq!(ts.len(), BLOCK_SIZE_FOR_TIME_SERIES + 1);

    let uncompressed = TimeSeriesBlock::try_from(ts.compressed_blocks.first().unwrap()).unwrap();
    assert_eq!(uncompressed.len(), BLOCK_SIZE_FOR_TIME_SERIES);
    for (i, sample) in uncompressed.get_samples().iter().enumerate() {
      assert_eq!(sample.get_timestamp(), i as i64);
      assert_eq!(sample.get_value(), i as f64);
    }
  }

  #[test]
  fn test_samples_in_range() {
    let num_blocks = 4;
    let mut ts = TimeSeries::new();
    let num_samples = num_blocks * BLOCK_SIZE_FOR_TIME_SERIES as i64;
    for i in 0..num_samples {
      ts.append(i, i as f64).unwrap();
    }

    assert_eq!(
      ts.get_samples(0, num_samples - 1).unwrap().len() as i64,
      num_samples
    );
    assert_eq!(
      ts.get_samples(0, num_samples + 1000).unwrap().len() as i64,
      num_samples
    );
    assert_eq!(
      ts.get_samples(0, BLOCK_SIZE_FOR_TIME_SERIES as i64)
        .unwrap()
        .len(),
      BLOCK_SIZE_FOR_TIME_SERIES + 1
    );

    let samples = ts
      .get_samples(
        BLOCK_SIZE_FOR_TIME_SERIES as i64,
        BLOCK_SIZE_FOR_TIME_SERIES as i64 + 10,
      )
      .unwrap();
    assert_eq!(samples.len(), 11);

    // Results are sorted by timestamp across block boundaries.
    let samples = ts.get_samples(100, 300).unwrap();
    assert_eq!(samples.len(), 201);
    assert!(samples
      .windows(2)
      .all(|pair| pair[0].get_timestamp() < pair[1].get_timestamp()));
  }

  #[test]
  fn test_month_gap_within_block() {
    const MINUTE: i64 = 60 * 1000;
    const GAP: i64 = 30 * 24 * 60 * MINUTE;

    // A series that stops for a month after 64 samples, then resumes.
    let expected: Vec<Sample> = (0..BLOCK_SIZE_FOR_TIME_SERIES as i64 + 1)
      .map(|i| {
        let timestamp = if i < 64 { i * MINUTE } else { GAP + i * MINUTE };
        Sample::new(timestamp, i as f64)
      })
      .collect();
    let ts = TimeSeries::from_samples(&expected).unwrap();

    // The block before the gap was compressed early.
    assert_eq!(ts.get_compressed_blocks().len(), 1);
    assert_eq!(ts.last_block.len(), 65);
    assert_eq!(
      ts.get_initial_times(),
      &vec![0, expected[64].get_timestamp()]
    );
    assert_eq!(ts.len(), expected.len());
    assert_eq!(ts.get_samples(0, i64::MAX).unwrap(), expected);

    // The last block, once full, still compresses and reads back.
    let mut ts = ts;
    for i in 0..BLOCK_SIZE_FOR_TIME_SERIES as i64 {
      ts.append(GAP + (200 + i) * MINUTE, 0.0).unwrap();
    }
    assert_eq!(ts.get_compressed_blocks().len(), 2);
    assert_eq!(
      &ts.get_samples(0, GAP + 128 * MINUTE).unwrap(),
      &expected
    );
  }

  #[test]
  fn test_sparse_series() {
    const DAY: i64 = 24 * 60 * 60 * 1000;

    // Samples a month apart each start a block of their own.
    let expected: Vec<Sample> = (0..10).map(|i| Sample::new(i * 30 * DAY, i as f64)).collect();
    let ts = TimeSeries::from_samples(&expected).unwrap();
    assert_eq!(ts.get_compressed_blocks().len(), 9);
    assert_eq!(ts.get_initial_times().len(), 10);
    assert_eq!(ts.get_samples(0, i64::MAX).unwrap(), expected);
    assert_eq!(
      ts.get_samples(30 * DAY, 60 * DAY).unwrap(),
      expected[1..3].to_vec()
    );
  }

  #[test]
  fn test_from_samples_and_size() {
    let samples: Vec<Sample> = (0..1000).map(|i| Sample::new(i * 1000, 1.0)).collect();
    let ts = TimeSeries::from_samples(&samples).unwrap();
    assert_eq!(ts.len(), 1000);
    assert_eq!(ts.get_samples(0, i64::MAX).unwrap(), samples);

    // Compressed storage is much smaller than the raw samples.
    assert!(ts.get_size_bytes() < 1000 * UNCOMPRESSED_SAMPLE_SIZE_BYTES);
  }
}
