// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crossbeam::atomic::AtomicCell;
use dashmap::DashMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::metric::constants::LABEL_SEPARATOR;
use crate::metric::label::{LabelSet, Metric};
use crate::metric::matcher::{LabelMatcher, MatchType};
use crate::metric::time_series::TimeSeries;
use crate::source::series::SourceSeries;
use crate::source::SourceStore;
use crate::utils::error::{SourceQueryError, StorageError};
use crate::utils::io::{check_path_exists, create_dir, get_joined_path};
use crate::utils::serialize;
use crate::utils::sync::Mutex;

const INDEX_FILE_NAME: &str = "index.bin";
const SERIES_DIR_NAME: &str = "series";

/// Options for opening the source storage.
#[derive(Clone, Debug)]
pub struct SourceOptions {
  storage_path: String,
  memory_budget_bytes: u64,
}

impl SourceOptions {
  pub fn new(storage_path: &str, memory_budget_bytes: u64) -> Self {
    SourceOptions {
      storage_path: storage_path.to_owned(),
      memory_budget_bytes,
    }
  }

  pub fn get_storage_path(&self) -> &str {
    &self.storage_path
  }

  pub fn get_memory_budget_bytes(&self) -> u64 {
    self.memory_budget_bytes
  }
}

/// The persisted series index: series id to its labels.
#[derive(Debug, Default, Deserialize, Serialize)]
struct SeriesIndex {
  next_series_id: u32,
  metrics: BTreeMap<u32, Metric>,
}

/// A series whose samples are loaded in memory.
#[derive(Debug)]
struct ResidentSeries {
  time_series: TimeSeries,

  /// Whether the series has samples not yet written by a checkpoint.
  dirty: bool,

  /// Logical clock value of the last access, for least-recently-used eviction.
  last_access: u64,
}

/// The legacy chunked sample store.
///
/// Labels of every series are always in memory, along with a postings map from label terms
/// ("name~value") to series ids. Samples are loaded per series on demand and evicted again,
/// least recently used first, whenever the resident samples exceed the memory budget.
#[derive(Debug)]
pub struct SourceStorage {
  options: SourceOptions,

  started: AtomicCell<bool>,

  /// Series id to the unordered labels of the series.
  metrics: DashMap<u32, Metric>,

  /// Canonical labels to series id.
  series_ids: DashMap<LabelSet, u32>,

  /// Label term to the ids of the series having that label.
  postings: DashMap<String, BTreeSet<u32>>,

  /// Series with samples in memory.
  resident: DashMap<u32, ResidentSeries>,

  next_series_id: AtomicCell<u32>,
  access_clock: AtomicCell<u64>,

  // Only one start, stop or checkpoint at a time.
  lifecycle_lock: Mutex<()>,
}

impl SourceStorage {
  /// Create a stopped storage for the given options. Nothing is read until `start()`.
  pub fn new(options: SourceOptions) -> Self {
    SourceStorage {
      options,
      started: AtomicCell::new(false),
      metrics: DashMap::new(),
      series_ids: DashMap::new(),
      postings: DashMap::new(),
      resident: DashMap::new(),
      next_series_id: AtomicCell::new(0),
      access_clock: AtomicCell::new(0),
      lifecycle_lock: Mutex::new(()),
    }
  }

  /// Load the series index from the storage path. An empty store is created if the path
  /// doesn't exist.
  pub fn start(&self) -> Result<(), StorageError> {
    let _lock = self.lifecycle_lock.lock();
    if self.started.load() {
      return Err(StorageError::AlreadyStarted);
    }

    let storage_path = self.options.get_storage_path();
    create_dir(&get_joined_path(storage_path, SERIES_DIR_NAME))?;

    let index_path = get_joined_path(storage_path, INDEX_FILE_NAME);
    let index = if check_path_exists(&index_path) {
      let (index, _): (SeriesIndex, u64) = serialize::read(&index_path)?;
      index
    } else {
      SeriesIndex::default()
    };

    for (series_id, metric) in index.metrics {
      self.add_to_postings(series_id, &metric);
      self.series_ids.insert(LabelSet::from_metric(&metric), series_id);
      self.metrics.insert(series_id, metric);
    }
    self.next_series_id.store(index.next_series_id);
    self.started.store(true);

    info!(
      "Started source storage at {} with {} series",
      storage_path,
      self.metrics.len()
    );
    Ok(())
  }

  /// Checkpoint and unload everything.
  pub fn stop(&self) -> Result<(), StorageError> {
    let _lock = self.lifecycle_lock.lock();
    if !self.started.load() {
      return Err(StorageError::NotStarted);
    }

    self.checkpoint_unlocked()?;

    self.started.store(false);
    self.resident.clear();
    self.postings.clear();
    self.series_ids.clear();
    self.metrics.clear();

    info!("Stopped source storage at {}", self.options.get_storage_path());
    Ok(())
  }

  /// Write all dirty series and the series index to disk.
  pub fn checkpoint(&self) -> Result<(), StorageError> {
    let _lock = self.lifecycle_lock.lock();
    if !self.started.load() {
      return Err(StorageError::NotStarted);
    }
    self.checkpoint_unlocked()?;
    self.shrink_to_fit();
    Ok(())
  }

  /// Append a sample to the series with the given labels, creating the series if needed.
  /// Samples of a series must be appended in increasing timestamp order.
  pub fn append(&self, metric: &Metric, timestamp: i64, value: f64) -> Result<(), StorageError> {
    if !self.started.load() {
      return Err(StorageError::NotStarted);
    }
    if timestamp < 0 {
      return Err(StorageError::InvalidTimestamp(timestamp));
    }
    if metric.is_empty() {
      return Err(StorageError::InvalidLabels("label set is empty".to_owned()));
    }

    let series_id = self.get_or_create_series_id(metric);
    let access = self.tick();

    let mut entry = self
      .resident
      .entry(series_id)
      .or_try_insert_with(|| self.load_series(series_id, access))?;
    let resident = entry.value_mut();

    if let Some(last) = resident.time_series.last_timestamp() {
      if timestamp <= last {
        return Err(StorageError::OutOfOrderSample(timestamp, last));
      }
    }

    resident.time_series.append(timestamp, value)?;
    resident.dirty = true;
    resident.last_access = access;

    Ok(())
  }

  /// Get the number of series in the store.
  pub fn get_num_series(&self) -> usize {
    self.metrics.len()
  }

  /// Get the number of series with samples in memory.
  pub fn get_num_resident_series(&self) -> usize {
    self.resident.len()
  }

  /// Get the estimated size of the samples held in memory.
  pub fn get_resident_size_bytes(&self) -> u64 {
    self
      .resident
      .iter()
      .map(|entry| entry.value().time_series.get_size_bytes() as u64)
      .sum()
  }

  fn tick(&self) -> u64 {
    self.access_clock.fetch_add(1)
  }

  fn get_label_term(name: &str, value: &str) -> String {
    format!("{}{}{}", name, LABEL_SEPARATOR, value)
  }

  fn add_to_postings(&self, series_id: u32, metric: &Metric) {
    for (name, value) in metric {
      self
        .postings
        .entry(Self::get_label_term(name, value))
        .or_default()
        .insert(series_id);
    }
  }

  fn get_or_create_series_id(&self, metric: &Metric) -> u32 {
    let label_set = LabelSet::from_metric(metric);

    // The entry holds the shard lock, so concurrent appends for a new series create it once.
    let entry = self.series_ids.entry(label_set).or_insert_with(|| {
      let series_id = self.next_series_id.fetch_add(1);
      self.metrics.insert(series_id, metric.clone());
      self.add_to_postings(series_id, metric);
      debug!("Created source series {} for {:?}", series_id, metric);
      series_id
    });
    *entry
  }

  fn get_series_path(&self, series_id: u32) -> String {
    let series_dir = get_joined_path(self.options.get_storage_path(), SERIES_DIR_NAME);
    get_joined_path(&series_dir, &format!("{}.bin", series_id))
  }

  /// Read the samples of a series from disk. A series that was never checkpointed is empty.
  fn load_series(&self, series_id: u32, access: u64) -> Result<ResidentSeries, StorageError> {
    let series_path = self.get_series_path(series_id);
    let time_series = if check_path_exists(&series_path) {
      let (time_series, _): (TimeSeries, u64) = serialize::read(&series_path)?;
      debug!("Loaded source series {} from {}", series_id, series_path);
      time_series
    } else {
      TimeSeries::new()
    };

    Ok(ResidentSeries {
      time_series,
      dirty: false,
      last_access: access,
    })
  }

  fn checkpoint_unlocked(&self) -> Result<(), StorageError> {
    let mut num_written = 0;
    for mut entry in self.resident.iter_mut() {
      if !entry.dirty {
        continue;
      }
      let series_path = self.get_series_path(*entry.key());
      serialize::write(&entry.time_series, &series_path, false)?;
      entry.dirty = false;
      num_written += 1;
    }

    let index = SeriesIndex {
      next_series_id: self.next_series_id.load(),
      metrics: self
        .metrics
        .iter()
        .map(|entry| (*entry.key(), entry.value().clone()))
        .collect(),
    };
    let index_path = get_joined_path(self.options.get_storage_path(), INDEX_FILE_NAME);
    serialize::write(&index, &index_path, true)?;

    info!(
      "Checkpointed {} series of {} to {}",
      num_written,
      index.metrics.len(),
      self.options.get_storage_path()
    );
    Ok(())
  }

  /// Possibly evict series from memory, so that the memory consumed is within the memory budget.
  /// Only series already persisted are evicted, least recently used first.
  fn shrink_to_fit(&self) {
    // Each resident series's id, size, last access and whether it can be evicted.
    let mut series_data: Vec<(u32, u64, u64, bool)> = Vec::new();
    let mut memory_consumed = 0;
    for entry in self.resident.iter() {
      let size = entry.time_series.get_size_bytes() as u64;
      series_data.push((*entry.key(), size, entry.last_access, !entry.dirty));
      memory_consumed += size;
    }

    let memory_budget = self.options.get_memory_budget_bytes();
    if memory_consumed <= memory_budget {
      return;
    }

    let memory_to_evict = memory_consumed - memory_budget;
    debug!("Evicting {} bytes of source series", memory_to_evict);

    series_data.sort_by_key(|&(_, _, last_access, _)| last_access);

    let mut memory_evicted_so_far = 0;
    for (series_id, size, _, evictable) in series_data {
      if memory_evicted_so_far >= memory_to_evict {
        break;
      }
      if !evictable {
        continue;
      }
      if self
        .resident
        .remove_if(&series_id, |_, resident| !resident.dirty)
        .is_some()
      {
        memory_evicted_so_far += size;
      }
    }
  }

  fn get_candidate_series_ids(&self, matcher: &LabelMatcher) -> Vec<u32> {
    let mut series_ids: Vec<u32> =
      if matcher.get_match_type() == MatchType::Equal && !matcher.get_value().is_empty() {
        // Label names may contain the term separator, so different labels can share a term.
        let term = Self::get_label_term(matcher.get_name(), matcher.get_value());
        self
          .postings
          .get(&term)
          .map(|ids| {
            ids
              .iter()
              .copied()
              .filter(|series_id| {
                self
                  .metrics
                  .get(series_id)
                  .map_or(false, |metric| matcher.matches_metric(metric.value()))
              })
              .collect()
          })
          .unwrap_or_default()
      } else {
        self
          .metrics
          .iter()
          .filter(|entry| matcher.matches_metric(entry.value()))
          .map(|entry| *entry.key())
          .collect()
      };

    series_ids.sort_unstable();
    series_ids
  }
}

impl SourceStore for SourceStorage {
  fn query_range(
    &self,
    matcher: &LabelMatcher,
    from: i64,
    through: i64,
  ) -> Result<Vec<SourceSeries>, SourceQueryError> {
    if !self.started.load() {
      return Err(SourceQueryError::NotStarted);
    }

    let mut retval = Vec::new();
    for series_id in self.get_candidate_series_ids(matcher) {
      let metric = match self.metrics.get(&series_id) {
        Some(metric) => metric.clone(),
        None => continue,
      };

      let access = self.tick();
      let samples = {
        let mut entry = self
          .resident
          .entry(series_id)
          .or_try_insert_with(|| self.load_series(series_id, access))
          .map_err(|e| SourceQueryError::CannotReadSeries(series_id, e.to_string()))?;
        entry.last_access = access;
        entry
          .time_series
          .get_samples(from, through)
          .map_err(|e| SourceQueryError::CannotReadSeries(series_id, e.to_string()))?
      };

      if !samples.is_empty() {
        retval.push(SourceSeries::new(metric, samples));
      }
    }

    self.shrink_to_fit();

    debug!(
      "Source query {} in [{}, {}] returned {} series",
      matcher,
      from,
      through,
      retval.len()
    );
    Ok(retval)
  }

  fn label_values_for_label_name(
    &self,
    label_name: &str,
  ) -> Result<HashSet<String>, SourceQueryError> {
    if !self.started.load() {
      return Err(SourceQueryError::NotStarted);
    }

    Ok(
      self
        .metrics
        .iter()
        .filter_map(|entry| entry.value().get(label_name).cloned())
        .collect(),
    )
  }
}
