// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

//! Instrumented stores for pipeline tests.

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use crossbeam::atomic::AtomicCell;
use tempdir::TempDir;

use crate::destination::store::BlockStore;
use crate::destination::{Appender, CommitStats, DestinationStore, SeriesRef};
use crate::metric::label::{LabelSet, Metric};
use crate::metric::matcher::LabelMatcher;
use crate::source::series::SourceSeries;
use crate::source::storage::{SourceOptions, SourceStorage};
use crate::source::SourceStore;
use crate::utils::error::{AppendError, CommitError, SourceQueryError};
use crate::utils::sync::{Arc, Mutex};

pub fn create_metric(pairs: &[(&str, &str)]) -> Metric {
  pairs
    .iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect()
}

/// Create a started source storage in the given directory holding the given series.
pub fn create_source(dir: &TempDir, series: &[(Metric, Vec<i64>)]) -> Arc<SourceStorage> {
  let storage_path = dir.path().to_str().unwrap();
  let source = SourceStorage::new(SourceOptions::new(storage_path, u64::MAX));
  source.start().unwrap();
  for (metric, timestamps) in series {
    for timestamp in timestamps {
      source.append(metric, *timestamp, *timestamp as f64).unwrap();
    }
  }
  Arc::new(source)
}

/// Counts concurrent operations and remembers the highest count.
#[derive(Default)]
struct InFlight {
  current: AtomicCell<usize>,
  max: Mutex<usize>,
}

impl InFlight {
  fn enter(&self) {
    let current = self.current.fetch_add(1) + 1;
    let mut max = self.max.lock();
    *max = (*max).max(current);
  }

  fn exit(&self) {
    self.current.fetch_sub(1);
  }

  fn get_max(&self) -> usize {
    *self.max.lock()
  }
}

/// A source that records the queries it answers and how many of them overlap.
pub struct CountingSource {
  inner: Arc<dyn SourceStore>,
  delay: Duration,
  in_flight: InFlight,
  queried_shards: Mutex<Vec<String>>,
  failing_shards: HashSet<String>,
}

impl CountingSource {
  pub fn new(inner: Arc<dyn SourceStore>, delay: Duration) -> Self {
    CountingSource {
      inner,
      delay,
      in_flight: InFlight::default(),
      queried_shards: Mutex::new(Vec::new()),
      failing_shards: HashSet::new(),
    }
  }

  /// Make queries for the given matcher values fail.
  pub fn with_failing_shards(mut self, values: &[&str]) -> Self {
    self.failing_shards = values.iter().map(|v| v.to_string()).collect();
    self
  }

  pub fn get_max_in_flight(&self) -> usize {
    self.in_flight.get_max()
  }

  /// Values of the matchers queried so far, in query order.
  pub fn get_queried_shards(&self) -> Vec<String> {
    self.queried_shards.lock().clone()
  }
}

impl SourceStore for CountingSource {
  fn query_range(
    &self,
    matcher: &LabelMatcher,
    from: i64,
    through: i64,
  ) -> Result<Vec<SourceSeries>, SourceQueryError> {
    self.in_flight.enter();
    self
      .queried_shards
      .lock()
      .push(matcher.get_value().to_owned());

    thread::sleep(self.delay);
    let result = if self.failing_shards.contains(matcher.get_value()) {
      Err(SourceQueryError::CannotReadSeries(0, "injected failure".to_owned()))
    } else {
      self.inner.query_range(matcher, from, through)
    };

    self.in_flight.exit();
    result
  }

  fn label_values_for_label_name(
    &self,
    label_name: &str,
  ) -> Result<HashSet<String>, SourceQueryError> {
    self.inner.label_values_for_label_name(label_name)
  }
}

/// Where a [`FaultyDestination`] fails.
#[derive(Debug)]
pub enum FailAt {
  /// Adding any sample of the given series.
  Add(LabelSet),

  /// Every commit of a non-empty transaction.
  Commit,
}

/// A block store that fails on demand.
pub struct FaultyDestination {
  inner: Arc<BlockStore>,
  fail_at: FailAt,
}

impl FaultyDestination {
  pub fn new(inner: Arc<BlockStore>, fail_at: FailAt) -> Self {
    FaultyDestination { inner, fail_at }
  }
}

impl DestinationStore for FaultyDestination {
  fn appender(&self) -> Box<dyn Appender + '_> {
    Box::new(FaultyAppender {
      inner: self.inner.appender(),
      fail_at: &self.fail_at,
      num_added: 0,
    })
  }
}

struct FaultyAppender<'a> {
  inner: Box<dyn Appender + 'a>,
  fail_at: &'a FailAt,
  num_added: usize,
}

impl<'a> Appender for FaultyAppender<'a> {
  fn add(
    &mut self,
    label_set: &LabelSet,
    timestamp: i64,
    value: f64,
  ) -> Result<SeriesRef, AppendError> {
    if let FailAt::Add(failing) = self.fail_at {
      if failing == label_set {
        return Err(AppendError::OutOfOrderSample {
          series: label_set.to_string(),
          timestamp,
          latest: i64::MAX,
        });
      }
    }
    self.num_added += 1;
    self.inner.add(label_set, timestamp, value)
  }

  fn commit(self: Box<Self>) -> Result<CommitStats, CommitError> {
    if matches!(self.fail_at, FailAt::Commit) && self.num_added > 0 {
      self.inner.rollback();
      return Err(CommitError::CannotWriteBlock(
        "injected".to_owned(),
        "injected failure".to_owned(),
      ));
    }
    self.inner.commit()
  }

  fn rollback(self: Box<Self>) {
    self.inner.rollback();
  }
}

/// A block store that records how many transactions are open at once. A transaction is open
/// from the creation of its appender until it is committed, rolled back or dropped.
pub struct CountingDestination {
  inner: Arc<BlockStore>,
  delay: Duration,
  open_transactions: InFlight,
}

impl CountingDestination {
  /// Each commit is delayed by `delay` before reaching the block store.
  pub fn new(inner: Arc<BlockStore>, delay: Duration) -> Self {
    CountingDestination {
      inner,
      delay,
      open_transactions: InFlight::default(),
    }
  }

  pub fn get_max_open_transactions(&self) -> usize {
    self.open_transactions.get_max()
  }

  pub fn get_open_transactions(&self) -> usize {
    self.open_transactions.current.load()
  }
}

impl DestinationStore for CountingDestination {
  fn appender(&self) -> Box<dyn Appender + '_> {
    self.open_transactions.enter();
    Box::new(CountingAppender {
      inner: self.inner.appender(),
      delay: self.delay,
      _open: OpenTransaction(&self.open_transactions),
    })
  }
}

/// Closes the transaction in the count when dropped.
struct OpenTransaction<'a>(&'a InFlight);

impl<'a> Drop for OpenTransaction<'a> {
  fn drop(&mut self) {
    self.0.exit();
  }
}

struct CountingAppender<'a> {
  inner: Box<dyn Appender + 'a>,
  delay: Duration,
  _open: OpenTransaction<'a>,
}

impl<'a> Appender for CountingAppender<'a> {
  fn add(
    &mut self,
    label_set: &LabelSet,
    timestamp: i64,
    value: f64,
  ) -> Result<SeriesRef, AppendError> {
    self.inner.add(label_set, timestamp, value)
  }

  fn commit(self: Box<Self>) -> Result<CommitStats, CommitError> {
    let CountingAppender { inner, delay, _open } = *self;
    thread::sleep(delay);
    inner.commit()
  }

  fn rollback(self: Box<Self>) {
    let CountingAppender { inner, _open, .. } = *self;
    inner.rollback();
  }
}
