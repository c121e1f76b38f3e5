// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use crossbeam::atomic::AtomicCell;
use log::{debug, error};
use tokio::task::JoinSet;

use crate::destination::DestinationStore;
use crate::migration::shard::{Shard, ShardSet};
use crate::migration::task::{MigrationTask, TaskStats};
use crate::migration::window::TimeWindow;
use crate::source::SourceStore;
use crate::utils::error::{MigrationError, SchedulingError, TaskError};
use crate::utils::sync::{Arc, Semaphore};

/// Marks the window as failed when a task doesn't finish successfully - including by panicking.
struct FailureGuard {
  failed: Arc<AtomicCell<bool>>,
  succeeded: bool,
}

impl Drop for FailureGuard {
  fn drop(&mut self) {
    if !self.succeeded {
      self.failed.store(true);
    }
  }
}

/// Runs the migration tasks of a window, at most `max_parallelism` at a time.
///
/// Tasks run on the blocking thread pool, each holding a semaphore permit for its whole run.
/// Once a task fails, no further shard of the window is started, but the tasks already
/// started always run to completion before the error is returned.
#[derive(Debug)]
pub struct BoundedExecutor {
  semaphore: Arc<Semaphore>,
  max_parallelism: usize,
}

impl BoundedExecutor {
  pub fn new(max_parallelism: usize) -> Result<Self, SchedulingError> {
    if max_parallelism == 0 {
      return Err(SchedulingError::InvalidParallelism(max_parallelism));
    }
    Ok(BoundedExecutor {
      semaphore: Arc::new(Semaphore::new(max_parallelism)),
      max_parallelism,
    })
  }

  pub fn get_max_parallelism(&self) -> usize {
    self.max_parallelism
  }

  /// Migrate every shard in the given window. Returns the combined stats of all tasks, or the
  /// first failure once every started task has finished.
  pub async fn run_window(
    &self,
    window: TimeWindow,
    shards: &ShardSet,
    source: Arc<dyn SourceStore>,
    destination: Arc<dyn DestinationStore>,
  ) -> Result<TaskStats, MigrationError> {
    let failed = Arc::new(AtomicCell::new(false));
    let mut join_set: JoinSet<(Shard, Result<TaskStats, TaskError>)> = JoinSet::new();

    for shard in shards.iter() {
      let permit = match self.semaphore.clone().acquire_owned().await {
        Ok(permit) => permit,
        // The semaphore is never closed.
        Err(_) => break,
      };

      // A task that failed while we waited for the permit stops the dispatch.
      if failed.load() {
        debug!(
          "Not starting shard {} in window {} after a failure",
          shard, window
        );
        break;
      }

      let task = MigrationTask::new(
        source.clone(),
        destination.clone(),
        window,
        shard.clone(),
      );
      let failed = failed.clone();
      join_set.spawn_blocking(move || {
        // Dropped in reverse order: the failure is flagged before the permit is released.
        let _permit = permit;
        let mut guard = FailureGuard {
          failed,
          succeeded: false,
        };

        let result = task.run();
        guard.succeeded = result.is_ok();
        (task.get_shard().clone(), result)
      });
    }

    let mut stats = TaskStats::default();
    let mut first_error: Option<MigrationError> = None;

    while let Some(joined) = join_set.join_next().await {
      match joined {
        Ok((_, Ok(task_stats))) => stats += task_stats,
        Ok((shard, Err(cause))) => {
          error!(
            "Migration of shard {} in window {} failed: {}",
            shard, window, cause
          );
          first_error.get_or_insert(MigrationError::Task {
            shard: shard.to_string(),
            window,
            cause,
          });
        }
        Err(join_error) => {
          error!("Migration task in window {} panicked: {}", window, join_error);
          first_error.get_or_insert(MigrationError::TaskPanicked(join_error.to_string()));
        }
      }
    }

    match first_error {
      Some(error) => Err(error),
      None => Ok(stats),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use std::time::Duration;

  use tempdir::TempDir;

  use crate::destination::store::{BlockStore, DestinationOptions};
  use crate::destination::{Appender, CommitStats, SeriesRef};
  use crate::metric::label::LabelSet;
  use crate::migration::test_utils::{
    create_metric, create_source, CountingDestination, CountingSource,
  };
  use crate::utils::error::{AppendError, CommitError, SourceQueryError};

  fn create_shards(values: &[&str]) -> ShardSet {
    ShardSet::new(
      values
        .iter()
        .map(|value| Shard::new("instance", value).unwrap())
        .collect(),
    )
  }

  fn five_instance_source(dir: &TempDir) -> Arc<dyn SourceStore> {
    let series: Vec<_> = ["h1", "h2", "h3", "h4", "h5"]
      .iter()
      .map(|instance| {
        (
          create_metric(&[("instance", instance), ("job", "node")]),
          vec![10, 20, 30],
        )
      })
      .collect();
    create_source(dir, &series)
  }

  fn open_destination(dir: &TempDir) -> Arc<BlockStore> {
    Arc::new(BlockStore::open(dir.path().to_str().unwrap(), DestinationOptions::default()).unwrap())
  }

  #[test]
  fn test_invalid_parallelism() {
    assert_eq!(
      BoundedExecutor::new(0).unwrap_err(),
      SchedulingError::InvalidParallelism(0)
    );
    assert_eq!(BoundedExecutor::new(3).unwrap().get_max_parallelism(), 3);
  }

  #[tokio::test]
  async fn test_bounded_parallelism() {
    let source_dir = TempDir::new("executor_test").unwrap();
    let dest_dir = TempDir::new("executor_test").unwrap();
    let source = Arc::new(CountingSource::new(
      five_instance_source(&source_dir),
      Duration::from_millis(50),
    ));
    let store = open_destination(&dest_dir);
    let destination = Arc::new(CountingDestination::new(
      store.clone(),
      Duration::from_millis(50),
    ));

    let executor = BoundedExecutor::new(2).unwrap();
    let stats = executor
      .run_window(
        TimeWindow::new(0, 100, true),
        &create_shards(&["h1", "h2", "h3", "h4", "h5"]),
        source.clone(),
        destination.clone(),
      )
      .await
      .unwrap();

    assert_eq!(stats, TaskStats::new(5, 15));
    assert_eq!(store.num_samples(), 15);

    // Neither the queries nor the transactions exceed the bound.
    assert_eq!(source.get_max_in_flight(), 2);
    assert_eq!(destination.get_max_open_transactions(), 2);
    assert_eq!(destination.get_open_transactions(), 0);
  }

  #[tokio::test]
  async fn test_failure_stops_dispatch_and_drains() {
    let source_dir = TempDir::new("executor_test").unwrap();
    let dest_dir = TempDir::new("executor_test").unwrap();
    let source = Arc::new(
      CountingSource::new(five_instance_source(&source_dir), Duration::from_millis(10))
        .with_failing_shards(&["h2"]),
    );
    let destination = open_destination(&dest_dir);

    let executor = BoundedExecutor::new(1).unwrap();
    let result = executor
      .run_window(
        TimeWindow::new(0, 100, true),
        &create_shards(&["h1", "h2", "h3", "h4", "h5"]),
        source.clone(),
        destination.clone(),
      )
      .await;

    match result {
      Err(MigrationError::Task {
        shard,
        window,
        cause,
      }) => {
        assert_eq!(shard, r#"instance="h2""#);
        assert_eq!(window, TimeWindow::new(0, 100, true));
        assert!(matches!(
          cause,
          TaskError::SourceQuery(SourceQueryError::CannotReadSeries(_, _))
        ));
      }
      other => panic!("unexpected result {:?}", other),
    }

    // The shard before the failure is committed, the ones after it never started.
    assert_eq!(source.get_queried_shards(), vec!["h1", "h2"]);
    assert_eq!(destination.num_samples(), 3);
  }

  #[tokio::test]
  async fn test_failure_waits_for_in_flight_tasks() {
    let source_dir = TempDir::new("executor_test").unwrap();
    let dest_dir = TempDir::new("executor_test").unwrap();
    let source = Arc::new(
      CountingSource::new(five_instance_source(&source_dir), Duration::from_millis(50))
        .with_failing_shards(&["h1"]),
    );
    let destination = open_destination(&dest_dir);

    let executor = BoundedExecutor::new(5).unwrap();
    let result = executor
      .run_window(
        TimeWindow::new(0, 100, true),
        &create_shards(&["h1", "h2", "h3", "h4", "h5"]),
        source.clone(),
        destination.clone(),
      )
      .await;
    assert!(matches!(result, Err(MigrationError::Task { .. })));

    // All five were dispatched before h1 failed; the other four completed their commits.
    assert_eq!(source.get_queried_shards().len(), 5);
    assert_eq!(destination.num_samples(), 12);
    assert_eq!(executor.semaphore.available_permits(), 5);
  }

  struct PanickingDestination;

  struct PanickingAppender;

  impl Appender for PanickingAppender {
    fn add(&mut self, _: &LabelSet, _: i64, _: f64) -> Result<SeriesRef, AppendError> {
      panic!("appender exploded");
    }

    fn commit(self: Box<Self>) -> Result<CommitStats, CommitError> {
      Ok(CommitStats::default())
    }

    fn rollback(self: Box<Self>) {}
  }

  impl DestinationStore for PanickingDestination {
    fn appender(&self) -> Box<dyn Appender + '_> {
      Box::new(PanickingAppender)
    }
  }

  #[tokio::test]
  async fn test_task_panic() {
    let source_dir = TempDir::new("executor_test").unwrap();
    let source = five_instance_source(&source_dir);

    let executor = BoundedExecutor::new(2).unwrap();
    let result = executor
      .run_window(
        TimeWindow::new(0, 100, true),
        &create_shards(&["h1", "h2", "h3"]),
        source,
        Arc::new(PanickingDestination),
      )
      .await;
    assert!(matches!(result, Err(MigrationError::TaskPanicked(_))));

    // Permits of panicked tasks are released.
    assert_eq!(executor.semaphore.available_permits(), 2);
  }

  #[tokio::test]
  async fn test_empty_shard_set() {
    let source_dir = TempDir::new("executor_test").unwrap();
    let dest_dir = TempDir::new("executor_test").unwrap();
    let executor = BoundedExecutor::new(2).unwrap();
    let stats = executor
      .run_window(
        TimeWindow::new(0, 100, true),
        &ShardSet::default(),
        five_instance_source(&source_dir),
        open_destination(&dest_dir),
      )
      .await
      .unwrap();
    assert_eq!(stats, TaskStats::default());
  }
}
