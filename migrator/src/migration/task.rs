// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use std::ops::AddAssign;

use log::debug;

use crate::destination::DestinationStore;
use crate::migration::shard::Shard;
use crate::migration::window::TimeWindow;
use crate::source::SourceStore;
use crate::utils::error::TaskError;
use crate::utils::sync::Arc;

/// What one or more migration tasks appended and committed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TaskStats {
  series: usize,
  samples: usize,
}

impl TaskStats {
  pub fn new(series: usize, samples: usize) -> Self {
    TaskStats { series, samples }
  }

  pub fn get_series(&self) -> usize {
    self.series
  }

  pub fn get_samples(&self) -> usize {
    self.samples
  }
}

impl AddAssign for TaskStats {
  fn add_assign(&mut self, other: Self) {
    self.series += other.series;
    self.samples += other.samples;
  }
}

/// Migrates the samples of one shard in one window, in a single destination transaction.
pub struct MigrationTask {
  source: Arc<dyn SourceStore>,
  destination: Arc<dyn DestinationStore>,
  window: TimeWindow,
  shard: Shard,
}

impl MigrationTask {
  pub fn new(
    source: Arc<dyn SourceStore>,
    destination: Arc<dyn DestinationStore>,
    window: TimeWindow,
    shard: Shard,
  ) -> Self {
    MigrationTask {
      source,
      destination,
      window,
      shard,
    }
  }

  pub fn get_window(&self) -> &TimeWindow {
    &self.window
  }

  pub fn get_shard(&self) -> &Shard {
    &self.shard
  }

  /// Run the task. Either every sample of the shard in the window is committed, or none is.
  pub fn run(&self) -> Result<TaskStats, TaskError> {
    let from = self.window.get_from();
    let through = self.window.get_last_included();

    let series = self
      .source
      .query_range(self.shard.get_matcher(), from, through)?;

    let mut appender = self.destination.appender();
    let mut stats = TaskStats::default();

    for source_series in series {
      let samples = source_series.range_values(from, through);
      if samples.is_empty() {
        continue;
      }

      let label_set = source_series.label_set();
      for sample in samples.iter() {
        if let Err(error) = appender.add(&label_set, sample.get_timestamp(), sample.get_value()) {
          appender.rollback();
          return Err(error.into());
        }
      }

      stats += TaskStats::new(1, samples.len());
    }

    appender.commit()?;

    debug!(
      "Migrated {} samples of {} series for shard {} in window {}",
      stats.samples, stats.series, self.shard, self.window
    );
    Ok(stats)
  }
}
