// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use std::collections::{BTreeMap, HashMap};
use std::fs;

use crossbeam::atomic::AtomicCell;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::destination::block::{
  read_block_meta, read_block_series, write_block, BlockMeta, BlockSeries, TMP_BLOCK_SUFFIX,
};
use crate::destination::{Appender, CommitStats, DestinationStore, SeriesRef};
use crate::metric::label::{is_valid_label_name, LabelSet};
use crate::metric::matcher::LabelMatcher;
use crate::metric::sample::Sample;
use crate::metric::time_series::TimeSeries;
use crate::utils::error::{AppendError, CommitError, StorageError};
use crate::utils::io::{create_dir, get_joined_path};
use crate::utils::range::is_overlap;
use crate::utils::sync::{Mutex, RwLock};

const BLOCKS_DIR_NAME: &str = "blocks";

/// Options for opening the block store.
#[derive(Clone, Debug, Default)]
pub struct DestinationOptions {
  sync_after_commit: bool,
}

impl DestinationOptions {
  pub fn new(sync_after_commit: bool) -> Self {
    DestinationOptions { sync_after_commit }
  }

  pub fn get_sync_after_commit(&self) -> bool {
    self.sync_after_commit
  }
}

/// Committed state of one series.
#[derive(Debug)]
struct SeriesHead {
  series_ref: SeriesRef,

  /// Latest committed timestamp. New samples must be strictly newer.
  max_time: i64,
}

/// Everything committed so far.
#[derive(Debug, Default)]
struct Head {
  series: HashMap<LabelSet, SeriesHead>,
  blocks: Vec<BlockMeta>,
}

/// Immutable block store. Each committed transaction becomes one block directory.
#[derive(Debug)]
pub struct BlockStore {
  blocks_dir_path: String,
  options: DestinationOptions,
  open: AtomicCell<bool>,
  head: RwLock<Head>,
  next_series_ref: AtomicCell<SeriesRef>,

  // Only one commit at a time.
  commit_lock: Mutex<()>,
}

impl BlockStore {
  /// Open the store in the given directory, creating it if needed. Blocks left half-written by an
  /// earlier crash are removed.
  pub fn open(dir_path: &str, options: DestinationOptions) -> Result<Self, StorageError> {
    let blocks_dir_path = get_joined_path(dir_path, BLOCKS_DIR_NAME);
    create_dir(&blocks_dir_path)?;

    let mut head = Head::default();
    let mut next_series_ref: SeriesRef = 0;

    let entries = fs::read_dir(&blocks_dir_path)
      .map_err(|e| StorageError::CannotReadDirectory(format!("{}: {}", blocks_dir_path, e)))?;
    for entry in entries {
      let entry = entry?;
      let name = entry.file_name().to_string_lossy().into_owned();
      let block_dir_path = get_joined_path(&blocks_dir_path, &name);

      if name.ends_with(TMP_BLOCK_SUFFIX) {
        warn!("Removing incomplete block {}", block_dir_path);
        fs::remove_dir_all(&block_dir_path)?;
        continue;
      }

      let meta = read_block_meta(&block_dir_path)?;
      for block_series in read_block_series(&block_dir_path)? {
        let max_time = match block_series.get_time_series().last_timestamp() {
          Some(max_time) => max_time,
          None => continue,
        };
        let series_head = head
          .series
          .entry(block_series.get_label_set().clone())
          .or_insert_with(|| {
            next_series_ref += 1;
            SeriesHead {
              series_ref: next_series_ref,
              max_time,
            }
          });
        series_head.max_time = series_head.max_time.max(max_time);
      }
      head.blocks.push(meta);
    }
    head.blocks.sort_by_key(|meta| meta.get_min_time());

    info!(
      "Opened block store at {} with {} blocks and {} series",
      dir_path,
      head.blocks.len(),
      head.series.len()
    );

    Ok(BlockStore {
      blocks_dir_path,
      options,
      open: AtomicCell::new(true),
      head: RwLock::new(head),
      next_series_ref: AtomicCell::new(next_series_ref + 1),
      commit_lock: Mutex::new(()),
    })
  }

  /// Close the store, waiting for an in-flight commit. Later appends and commits fail.
  pub fn close(&self) -> Result<(), StorageError> {
    let _lock = self.commit_lock.lock();
    if !self.open.swap(false) {
      return Err(StorageError::Closed);
    }
    info!("Closed block store at {}", self.blocks_dir_path);
    Ok(())
  }

  pub fn is_open(&self) -> bool {
    self.open.load()
  }

  /// Get the metadata of all committed blocks, ordered by their earliest sample.
  pub fn blocks(&self) -> Vec<BlockMeta> {
    self.head.read().blocks.clone()
  }

  /// Get the number of committed samples.
  pub fn num_samples(&self) -> usize {
    self
      .head
      .read()
      .blocks
      .iter()
      .map(|meta| meta.get_num_samples())
      .sum()
  }

  /// Get the number of distinct committed series.
  pub fn num_series(&self) -> usize {
    self.head.read().series.len()
  }

  /// Get the committed samples in `[from, through]` (both inclusive) of the series matching
  /// `matcher`, ordered by label set. Samples of each series are ordered by time.
  pub fn query(
    &self,
    matcher: &LabelMatcher,
    from: i64,
    through: i64,
  ) -> Result<Vec<(LabelSet, Vec<Sample>)>, StorageError> {
    let mut merged: BTreeMap<LabelSet, Vec<Sample>> = BTreeMap::new();

    for meta in self.blocks() {
      if !is_overlap(meta.get_min_time(), meta.get_max_time(), from, through) {
        continue;
      }

      let block_dir_path = get_joined_path(&self.blocks_dir_path, meta.get_id());
      for block_series in read_block_series(&block_dir_path)? {
        if !matcher.matches_label_set(block_series.get_label_set()) {
          continue;
        }
        let samples = block_series.get_time_series().get_samples(from, through)?;
        if !samples.is_empty() {
          merged
            .entry(block_series.get_label_set().clone())
            .or_default()
            .extend(samples);
        }
      }
    }

    Ok(
      merged
        .into_iter()
        .map(|(label_set, mut samples)| {
          samples.sort();
          (label_set, samples)
        })
        .collect(),
    )
  }

  /// Check a sample against the committed state of its series.
  fn validate_against_head(
    &self,
    label_set: &LabelSet,
    timestamp: i64,
  ) -> Result<Option<SeriesRef>, AppendError> {
    let head = self.head.read();
    match head.series.get(label_set) {
      Some(series_head) => {
        check_order(label_set, timestamp, series_head.max_time)?;
        Ok(Some(series_head.series_ref))
      }
      None => Ok(None),
    }
  }

  fn commit_pending(
    &self,
    pending: BTreeMap<LabelSet, PendingSeries>,
  ) -> Result<CommitStats, CommitError> {
    let _lock = self.commit_lock.lock();
    if !self.open.load() {
      return Err(CommitError::StoreClosed);
    }

    // Another transaction may have committed the same series since the samples were added.
    for (label_set, pending_series) in pending.iter() {
      if let Some(first) = pending_series.samples.first() {
        self
          .validate_against_head(label_set, first.get_timestamp())
          .map_err(CommitError::Conflict)?;
      }
    }

    let id = Uuid::new_v4().to_string();
    let mut block_series = Vec::with_capacity(pending.len());
    for (label_set, pending_series) in pending.iter() {
      let time_series = TimeSeries::from_samples(&pending_series.samples)
        .map_err(|e| CommitError::CannotWriteBlock(id.clone(), e.to_string()))?;
      block_series.push(BlockSeries::new(label_set.clone(), time_series));
    }

    let tmp_dir_path = get_joined_path(
      &self.blocks_dir_path,
      &format!("{}{}", id, TMP_BLOCK_SUFFIX),
    );
    let block_dir_path = get_joined_path(&self.blocks_dir_path, &id);

    let written = write_block(
      &tmp_dir_path,
      &id,
      &block_series,
      self.options.get_sync_after_commit(),
    )
    .and_then(|meta| {
      fs::rename(&tmp_dir_path, &block_dir_path)?;
      Ok(meta)
    });

    let meta = match written {
      Ok(meta) => meta,
      Err(e) => {
        if let Err(remove_error) = fs::remove_dir_all(&tmp_dir_path) {
          warn!(
            "Could not remove incomplete block {}: {}",
            tmp_dir_path, remove_error
          );
        }
        return Err(CommitError::CannotWriteBlock(id, e.to_string()));
      }
    };

    let stats = CommitStats::new(
      Some(id),
      meta.get_num_series(),
      meta.get_num_samples(),
    );

    let mut head = self.head.write();
    for (label_set, pending_series) in pending {
      let max_time = match pending_series.samples.last() {
        Some(sample) => sample.get_timestamp(),
        None => continue,
      };
      let series_head = head.series.entry(label_set).or_insert(SeriesHead {
        series_ref: pending_series.series_ref,
        max_time,
      });
      series_head.max_time = series_head.max_time.max(max_time);
    }
    let position = head
      .blocks
      .partition_point(|existing| existing.get_min_time() <= meta.get_min_time());
    head.blocks.insert(position, meta);

    debug!(
      "Committed block {:?} with {} series and {} samples",
      stats.get_block_id(),
      stats.get_num_series(),
      stats.get_num_samples()
    );
    Ok(stats)
  }
}

impl DestinationStore for BlockStore {
  fn appender(&self) -> Box<dyn Appender + '_> {
    Box::new(BlockAppender {
      store: self,
      pending: BTreeMap::new(),
    })
  }
}

/// Check that `timestamp` is strictly newer than `latest`.
fn check_order(label_set: &LabelSet, timestamp: i64, latest: i64) -> Result<(), AppendError> {
  if timestamp == latest {
    return Err(AppendError::DuplicateSampleForTimestamp {
      series: label_set.to_string(),
      timestamp,
    });
  }
  if timestamp < latest {
    return Err(AppendError::OutOfOrderSample {
      series: label_set.to_string(),
      timestamp,
      latest,
    });
  }
  Ok(())
}

/// Samples added to one series of a transaction.
#[derive(Debug)]
struct PendingSeries {
  series_ref: SeriesRef,
  samples: Vec<Sample>,
}

/// A write transaction on a [`BlockStore`].
#[derive(Debug)]
pub struct BlockAppender<'a> {
  store: &'a BlockStore,
  pending: BTreeMap<LabelSet, PendingSeries>,
}

impl<'a> BlockAppender<'a> {
  fn validate_label_set(label_set: &LabelSet) -> Result<(), AppendError> {
    if label_set.is_empty() {
      return Err(AppendError::EmptyLabelSet);
    }
    match label_set
      .iter()
      .find(|label| !is_valid_label_name(label.get_name()))
    {
      Some(label) => Err(AppendError::InvalidLabelName(label.get_name().to_owned())),
      None => Ok(()),
    }
  }
}

impl<'a> Appender for BlockAppender<'a> {
  fn add(
    &mut self,
    label_set: &LabelSet,
    timestamp: i64,
    value: f64,
  ) -> Result<SeriesRef, AppendError> {
    if !self.store.is_open() {
      return Err(AppendError::StoreClosed);
    }
    Self::validate_label_set(label_set)?;
    if timestamp < 0 {
      return Err(AppendError::InvalidTimestamp(timestamp));
    }

    if let Some(pending_series) = self.pending.get_mut(label_set) {
      // Samples already added are newer than the committed ones.
      if let Some(last) = pending_series.samples.last() {
        check_order(label_set, timestamp, last.get_timestamp())?;
      }
      pending_series.samples.push(Sample::new(timestamp, value));
      return Ok(pending_series.series_ref);
    }

    let series_ref = match self.store.validate_against_head(label_set, timestamp)? {
      Some(series_ref) => series_ref,
      None => self.store.next_series_ref.fetch_add(1),
    };
    self.pending.insert(
      label_set.clone(),
      PendingSeries {
        series_ref,
        samples: vec![Sample::new(timestamp, value)],
      },
    );
    Ok(series_ref)
  }

  fn commit(self: Box<Self>) -> Result<CommitStats, CommitError> {
    let BlockAppender { store, pending } = *self;
    if pending.is_empty() {
      return Ok(CommitStats::default());
    }
    store.commit_pending(pending)
  }

  fn rollback(self: Box<Self>) {
    debug!("Rolled back transaction with {} series", self.pending.len());
  }
}
