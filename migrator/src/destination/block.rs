// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use std::fs;

use serde::{Deserialize, Serialize};

use crate::metric::label::LabelSet;
use crate::metric::time_series::TimeSeries;
use crate::utils::error::StorageError;
use crate::utils::io::{create_dir, get_joined_path};
use crate::utils::serialize;
use crate::utils::time::get_current_time_in_millis;

const META_FILE_NAME: &str = "meta.bin";
const SERIES_FILE_NAME: &str = "series.bin";

/// Suffix of a block directory that is still being written.
pub const TMP_BLOCK_SUFFIX: &str = ".tmp";

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
/// Metadata of an immutable block.
pub struct BlockMeta {
  /// Unique id, also the name of the block directory.
  id: String,

  /// Earliest sample timestamp in the block.
  min_time: i64,

  /// Latest sample timestamp in the block.
  max_time: i64,

  num_series: usize,
  num_samples: usize,

  /// Creation time in milliseconds since epoch.
  created_at: i64,
}

impl BlockMeta {
  pub fn get_id(&self) -> &str {
    &self.id
  }

  pub fn get_min_time(&self) -> i64 {
    self.min_time
  }

  pub fn get_max_time(&self) -> i64 {
    self.max_time
  }

  pub fn get_num_series(&self) -> usize {
    self.num_series
  }

  pub fn get_num_samples(&self) -> usize {
    self.num_samples
  }

  pub fn get_created_at(&self) -> i64 {
    self.created_at
  }
}

/// One series in a block.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BlockSeries {
  label_set: LabelSet,
  time_series: TimeSeries,
}

impl BlockSeries {
  pub fn new(label_set: LabelSet, time_series: TimeSeries) -> Self {
    BlockSeries {
      label_set,
      time_series,
    }
  }

  pub fn get_label_set(&self) -> &LabelSet {
    &self.label_set
  }

  pub fn get_time_series(&self) -> &TimeSeries {
    &self.time_series
  }
}

/// Write the given non-empty series as a block in `block_dir_path`, and return its metadata.
/// The series file is written before the metadata, so a block with metadata is complete.
pub fn write_block(
  block_dir_path: &str,
  id: &str,
  series: &[BlockSeries],
  sync_after_write: bool,
) -> Result<BlockMeta, StorageError> {
  let mut min_time = i64::MAX;
  let mut max_time = i64::MIN;
  let mut num_samples = 0;
  for block_series in series {
    let time_series = &block_series.time_series;
    if let (Some(first), Some(last)) = (time_series.first_timestamp(), time_series.last_timestamp())
    {
      min_time = min_time.min(first);
      max_time = max_time.max(last);
    }
    num_samples += time_series.len();
  }

  let meta = BlockMeta {
    id: id.to_owned(),
    min_time,
    max_time,
    num_series: series.len(),
    num_samples,
    created_at: get_current_time_in_millis(),
  };

  create_dir(block_dir_path)?;
  serialize::write(
    &series,
    &get_joined_path(block_dir_path, SERIES_FILE_NAME),
    sync_after_write,
  )?;
  serialize::write(
    &meta,
    &get_joined_path(block_dir_path, META_FILE_NAME),
    sync_after_write,
  )?;

  if sync_after_write {
    // Make the directory entries durable as well.
    fs::File::open(block_dir_path)?.sync_all()?;
  }

  Ok(meta)
}

/// Read the metadata of the block in the given directory.
pub fn read_block_meta(block_dir_path: &str) -> Result<BlockMeta, StorageError> {
  let (meta, _) = serialize::read(&get_joined_path(block_dir_path, META_FILE_NAME))?;
  Ok(meta)
}

/// Read the series of the block in the given directory.
pub fn read_block_series(block_dir_path: &str) -> Result<Vec<BlockSeries>, StorageError> {
  let (series, _) = serialize::read(&get_joined_path(block_dir_path, SERIES_FILE_NAME))?;
  Ok(series)
}
