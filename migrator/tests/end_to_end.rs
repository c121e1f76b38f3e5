use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use crossbeam::atomic::AtomicCell;
use tempdir::TempDir;

use migrator::destination::store::{BlockStore, DestinationOptions};
use migrator::metric::matcher::{LabelMatcher, MatchType};
use migrator::migration::pipeline::{MigrationConfig, MigrationSummary, Migrator};
use migrator::migration::progress::ProgressReporter;
use migrator::migration::task::TaskStats;
use migrator::migration::window::TimeWindow;
use migrator::source::storage::{SourceOptions, SourceStorage};
use migrator::utils::error::MigrationError;

const MINUTE: i64 = 60 * 1000;

fn metric(pairs: &[(&str, &str)]) -> HashMap<String, String> {
  pairs
    .iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect()
}

/// A checkpointed source with a sample every minute of the first two hours, on four instances
/// and one series without an instance. Series are evicted as soon as they are persisted.
fn create_source(dir: &TempDir) -> Arc<SourceStorage> {
  let source = SourceStorage::new(SourceOptions::new(dir.path().to_str().unwrap(), 0));
  source.start().unwrap();
  let mut metrics: Vec<_> = ["h1", "h2", "h3", "h4"]
    .iter()
    .map(|instance| metric(&[("__name__", "up"), ("instance", instance)]))
    .collect();
  metrics.push(metric(&[("__name__", "build_info"), ("job", "node")]));

  for minute in 0..120 {
    for m in &metrics {
      source.append(m, minute * MINUTE, minute as f64).unwrap();
    }
  }
  source.checkpoint().unwrap();
  assert_eq!(source.get_num_resident_series(), 0);
  Arc::new(source)
}

fn open_destination(dir: &TempDir) -> Arc<BlockStore> {
  Arc::new(BlockStore::open(dir.path().to_str().unwrap(), DestinationOptions::default()).unwrap())
}

/// Requests a shutdown once the given number of windows completed.
struct StopAfter {
  windows: usize,
  completed: AtomicCell<usize>,
  shutdown: Arc<AtomicCell<bool>>,
}

impl ProgressReporter for StopAfter {
  fn start(&self, _num_windows: usize, _num_shards: usize) {}

  fn window_completed(&self, _window: &TimeWindow, _stats: &TaskStats) {
    if self.completed.fetch_add(1) + 1 == self.windows {
      self.shutdown.store(true);
    }
  }

  fn finish(&self, _summary: &MigrationSummary) {}

  fn abandon(&self) {}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_migrate_two_hours() {
  let source_dir = TempDir::new("end_to_end").unwrap();
  let dest_dir = TempDir::new("end_to_end").unwrap();
  let source = create_source(&source_dir);
  let destination = open_destination(&dest_dir);

  let config = MigrationConfig::new(120 * MINUTE, Duration::hours(2), Duration::minutes(30))
    .with_max_parallelism(3)
    .with_include_unlabeled(true);
  let summary = Migrator::new(source.clone(), destination.clone(), &config)
    .unwrap()
    .run()
    .await
    .unwrap();

  assert_eq!(summary.get_num_windows(), 4);
  assert_eq!(summary.get_num_shards(), 5);
  assert_eq!(summary.get_windows_completed(), 4);
  assert_eq!(summary.get_tasks_completed(), 20);
  assert_eq!(summary.get_samples_migrated(), 5 * 120);
  assert_eq!(destination.num_series(), 5);
  assert_eq!(destination.num_samples(), 5 * 120);

  // Blocks never overlap in time for the same series.
  let matcher = LabelMatcher::new(MatchType::Equal, "instance", "h3").unwrap();
  let result = destination.query(&matcher, 0, i64::MAX).unwrap();
  assert_eq!(result.len(), 1);
  let timestamps: Vec<i64> = result[0].1.iter().map(|s| s.get_timestamp()).collect();
  assert_eq!(timestamps, (0..120).map(|m| m * MINUTE).collect::<Vec<_>>());

  // The unlabeled series went to the catch-all shard.
  let matcher = LabelMatcher::new(MatchType::Equal, "job", "node").unwrap();
  assert_eq!(destination.query(&matcher, 0, i64::MAX).unwrap()[0].1.len(), 120);

  // Series loaded for the queries were evicted again.
  assert_eq!(source.get_num_resident_series(), 0);
  assert_eq!(source.get_num_series(), 5);
}

#[tokio::test]
async fn test_interrupted_migration_keeps_completed_windows() {
  let source_dir = TempDir::new("end_to_end").unwrap();
  let dest_dir = TempDir::new("end_to_end").unwrap();
  let source = create_source(&source_dir);
  let destination = open_destination(&dest_dir);

  let shutdown = Arc::new(AtomicCell::new(false));
  let reporter = StopAfter {
    windows: 1,
    completed: AtomicCell::new(0),
    shutdown: shutdown.clone(),
  };

  let config = MigrationConfig::new(120 * MINUTE, Duration::hours(2), Duration::hours(1))
    .with_max_parallelism(2);
  let result = Migrator::new(source, destination.clone(), &config)
    .unwrap()
    .with_progress_reporter(Box::new(reporter))
    .with_shutdown_flag(shutdown)
    .run()
    .await;

  assert!(matches!(result, Err(MigrationError::Interrupted(1))));

  // The first hour of the four labeled instances, nothing of the second.
  assert_eq!(destination.num_samples(), 4 * 60);
  assert!(destination
    .blocks()
    .iter()
    .all(|meta| meta.get_max_time() < 60 * MINUTE));
}

#[tokio::test]
async fn test_reopened_destination_rejects_remigration() {
  let source_dir = TempDir::new("end_to_end").unwrap();
  let dest_dir = TempDir::new("end_to_end").unwrap();
  let source = create_source(&source_dir);

  let config = MigrationConfig::new(120 * MINUTE, Duration::hours(2), Duration::hours(1));
  {
    let destination = open_destination(&dest_dir);
    Migrator::new(source.clone(), destination.clone(), &config)
      .unwrap()
      .run()
      .await
      .unwrap();
    destination.close().unwrap();
  }

  // Committed samples survive a reopen, and migrating them again is refused.
  let destination = open_destination(&dest_dir);
  assert_eq!(destination.num_samples(), 4 * 120);
  let result = Migrator::new(source, destination.clone(), &config)
    .unwrap()
    .run()
    .await;
  assert!(matches!(result, Err(MigrationError::Task { .. })));
  assert_eq!(destination.num_samples(), 4 * 120);
}
