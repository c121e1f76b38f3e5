// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use serde::{Deserialize, Serialize};

use crate::metric::metricutils::compress_sample_vector;
use crate::metric::time_series_block::TimeSeriesBlock;
use crate::utils::error::ChunkError;

/// Represents a delta-of-delta compressed time series block.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TimeSeriesBlockCompressed {
  samples_compressed: Vec<u8>,
}

impl TimeSeriesBlockCompressed {
  pub fn get_samples_compressed(&self) -> &[u8] {
    &self.samples_compressed
  }

  /// Number of bytes this block occupies in memory.
  pub fn get_size_bytes(&self) -> usize {
    self.samples_compressed.len()
  }
}

impl TryFrom<&TimeSeriesBlock> for TimeSeriesBlockCompressed {
  type Error = ChunkError;

  /// Compress the given time series block.
  fn try_from(time_series_block: &TimeSeriesBlock) -> Result<Self, Self::Error> {
    let samples_compressed = compress_sample_vector(time_series_block.get_samples())?;
    Ok(TimeSeriesBlockCompressed { samples_compressed })
  }
}
