// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use std::fmt;

use chrono::Duration;
use crossbeam::atomic::AtomicCell;
use log::{info, warn};

use crate::destination::DestinationStore;
use crate::metric::constants::INSTANCE_LABEL;
use crate::migration::executor::BoundedExecutor;
use crate::migration::progress::{ProgressReporter, SilentProgressReporter};
use crate::migration::shard::ShardEnumerator;
use crate::migration::task::TaskStats;
use crate::migration::window::TimeWindowScheduler;
use crate::source::SourceStore;
use crate::utils::config::MigrationSettings;
use crate::utils::error::MigrationError;
use crate::utils::sync::Arc;
use crate::utils::time::end_time_from_unix_seconds;

/// Parameters of one migration run.
#[derive(Clone, Debug)]
pub struct MigrationConfig {
  /// End of the migrated range, in milliseconds since epoch.
  end_time: i64,
  lookback: Duration,
  step: Duration,
  max_parallelism: usize,
  partition_label: String,
  include_unlabeled: bool,
}

impl MigrationConfig {
  /// Migrate `[end_time - lookback, end_time]` in windows of `step`, one shard per `instance`
  /// label value, one task at a time.
  pub fn new(end_time: i64, lookback: Duration, step: Duration) -> Self {
    MigrationConfig {
      end_time,
      lookback,
      step,
      max_parallelism: 1,
      partition_label: INSTANCE_LABEL.to_owned(),
      include_unlabeled: false,
    }
  }

  /// Create the config from settings. An end timestamp of 0 means now.
  pub fn from_settings(settings: &MigrationSettings) -> Self {
    MigrationConfig::new(
      end_time_from_unix_seconds(settings.get_end_timestamp()),
      settings.get_lookback(),
      settings.get_step(),
    )
    .with_max_parallelism(settings.get_max_parallelism())
    .with_partition_label(settings.get_partition_label())
    .with_include_unlabeled(settings.get_include_unlabeled())
  }

  pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
    self.max_parallelism = max_parallelism;
    self
  }

  pub fn with_partition_label(mut self, partition_label: &str) -> Self {
    self.partition_label = partition_label.to_owned();
    self
  }

  pub fn with_include_unlabeled(mut self, include_unlabeled: bool) -> Self {
    self.include_unlabeled = include_unlabeled;
    self
  }

  pub fn get_end_time(&self) -> i64 {
    self.end_time
  }

  pub fn get_lookback(&self) -> Duration {
    self.lookback
  }

  pub fn get_step(&self) -> Duration {
    self.step
  }

  pub fn get_max_parallelism(&self) -> usize {
    self.max_parallelism
  }

  pub fn get_partition_label(&self) -> &str {
    &self.partition_label
  }

  pub fn get_include_unlabeled(&self) -> bool {
    self.include_unlabeled
  }
}

/// Outcome of a successful migration.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MigrationSummary {
  num_shards: usize,
  num_windows: usize,
  windows_completed: usize,
  tasks_completed: usize,
  series_appended: usize,
  samples_migrated: usize,
}

impl MigrationSummary {
  fn new(num_shards: usize, num_windows: usize) -> Self {
    MigrationSummary {
      num_shards,
      num_windows,
      ..Default::default()
    }
  }

  fn add_window(&mut self, num_tasks: usize, stats: &TaskStats) {
    self.windows_completed += 1;
    self.tasks_completed += num_tasks;
    self.series_appended += stats.get_series();
    self.samples_migrated += stats.get_samples();
  }

  pub fn get_num_shards(&self) -> usize {
    self.num_shards
  }

  pub fn get_num_windows(&self) -> usize {
    self.num_windows
  }

  pub fn get_windows_completed(&self) -> usize {
    self.windows_completed
  }

  pub fn get_tasks_completed(&self) -> usize {
    self.tasks_completed
  }

  /// Number of (series, window) pairs with at least one migrated sample.
  pub fn get_series_appended(&self) -> usize {
    self.series_appended
  }

  pub fn get_samples_migrated(&self) -> usize {
    self.samples_migrated
  }
}

impl fmt::Display for MigrationSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} samples in {} series appends, {}/{} windows, {} shards, {} tasks",
      self.samples_migrated,
      self.series_appended,
      self.windows_completed,
      self.num_windows,
      self.num_shards,
      self.tasks_completed
    )
  }
}

/// Drives a migration: enumerates the shards once, then migrates the windows one after the
/// other, every shard of a window in parallel.
pub struct Migrator {
  source: Arc<dyn SourceStore>,
  destination: Arc<dyn DestinationStore>,
  scheduler: TimeWindowScheduler,
  enumerator: ShardEnumerator,
  executor: BoundedExecutor,
  progress: Box<dyn ProgressReporter>,
  shutdown: Arc<AtomicCell<bool>>,
}

impl Migrator {
  /// Create a migrator. Fails if the window or parallelism configuration is invalid.
  pub fn new(
    source: Arc<dyn SourceStore>,
    destination: Arc<dyn DestinationStore>,
    config: &MigrationConfig,
  ) -> Result<Self, MigrationError> {
    let scheduler =
      TimeWindowScheduler::new(config.get_end_time(), config.get_lookback(), config.get_step())?;
    let executor = BoundedExecutor::new(config.get_max_parallelism())?;
    let enumerator =
      ShardEnumerator::new(config.get_partition_label(), config.get_include_unlabeled());

    Ok(Migrator {
      source,
      destination,
      scheduler,
      enumerator,
      executor,
      progress: Box::new(SilentProgressReporter),
      shutdown: Arc::new(AtomicCell::new(false)),
    })
  }

  pub fn with_progress_reporter(mut self, progress: Box<dyn ProgressReporter>) -> Self {
    self.progress = progress;
    self
  }

  /// Use the given flag to stop the migration. It is checked before each window.
  pub fn with_shutdown_flag(mut self, shutdown: Arc<AtomicCell<bool>>) -> Self {
    self.shutdown = shutdown;
    self
  }

  pub fn get_scheduler(&self) -> &TimeWindowScheduler {
    &self.scheduler
  }

  /// Run the migration. Samples committed before a failure stay committed.
  pub async fn run(&self) -> Result<MigrationSummary, MigrationError> {
    let windows = self.scheduler.get_windows();
    let shards = self.enumerator.enumerate(self.source.as_ref())?;
    let mut summary = MigrationSummary::new(shards.len(), windows.len());

    info!(
      "Migrating {} windows of {}ms from {} to {} over {} shards, {} at a time",
      windows.len(),
      self.scheduler.get_step_millis(),
      self.scheduler.get_end() - self.scheduler.get_lookback_millis(),
      self.scheduler.get_end(),
      shards.len(),
      self.executor.get_max_parallelism()
    );

    if shards.is_empty() {
      self.progress.finish(&summary);
      return Ok(summary);
    }

    self.progress.start(windows.len(), shards.len());
    for window in windows {
      if self.shutdown.load() {
        warn!(
          "Shutdown requested, stopping before window {} after {} of {} windows",
          window,
          summary.get_windows_completed(),
          windows.len()
        );
        self.progress.abandon();
        return Err(MigrationError::Interrupted(summary.get_windows_completed()));
      }

      let result = self
        .executor
        .run_window(
          *window,
          &shards,
          self.source.clone(),
          self.destination.clone(),
        )
        .await;

      match result {
        Ok(stats) => {
          summary.add_window(shards.len(), &stats);
          self.progress.window_completed(window, &stats);
        }
        Err(error) => {
          self.progress.abandon();
          return Err(error);
        }
      }
    }

    self.progress.finish(&summary);
    info!("Migration completed: {}", summary);
    Ok(summary)
  }
}
