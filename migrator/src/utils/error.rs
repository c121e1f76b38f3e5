// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use thiserror::Error;

use crate::migration::window::TimeWindow;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
/// Errors while opening, starting, stopping or writing to one of the storage engines.
pub enum StorageError {
  #[error("Storage is not started.")]
  NotStarted,

  #[error("Storage is already started.")]
  AlreadyStarted,

  #[error("Storage is closed.")]
  Closed,

  #[error("Cannot read directory {0}.")]
  CannotReadDirectory(String),

  #[error("Invalid timestamp {0}. Timestamps must be non-negative milliseconds since epoch.")]
  InvalidTimestamp(i64),

  #[error("Out of order sample: timestamp {0} is not newer than {1}.")]
  OutOfOrderSample(i64, i64),

  #[error("Invalid labels. {0}")]
  InvalidLabels(String),

  #[error("Chunk error: {0}")]
  ChunkError(ChunkError),

  #[error("Serialization error: {0}")]
  SerializationError(String),

  #[error("IO Error: {0}")]
  IOError(String),
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
/// Errors in the chunked time series encoding shared by both storage engines.
pub enum ChunkError {
  #[error("Already at full capacity. Max capacity {0}.")]
  CapacityFull(usize),

  #[error("Time series block is empty - cannot be compressed.")]
  EmptyTimeSeriesBlock,

  #[error("Cannot decode time series. {0}")]
  CannotDecodeTimeSeries(String),

  #[error("Timestamp {1} is too far from {0} to be encoded in the same block.")]
  TimestampGapTooLarge(i64, i64),
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
/// Errors while querying the source store.
pub enum SourceQueryError {
  #[error("Source storage is not started.")]
  NotStarted,

  #[error("Cannot read series {0} from source storage. {1}")]
  CannotReadSeries(u32, String),

  #[error("Storage error: {0}")]
  StorageError(StorageError),
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
/// A sample could not be added to a destination transaction.
pub enum AppendError {
  #[error("Label set is empty.")]
  EmptyLabelSet,

  #[error("Invalid label name {0:?}.")]
  InvalidLabelName(String),

  #[error("Invalid timestamp {0}. Timestamps must be non-negative milliseconds since epoch.")]
  InvalidTimestamp(i64),

  #[error("Out of order sample for series {series}: timestamp {timestamp} is older than {latest}.")]
  OutOfOrderSample {
    series: String,
    timestamp: i64,
    latest: i64,
  },

  #[error("Duplicate sample for series {series} at timestamp {timestamp}.")]
  DuplicateSampleForTimestamp { series: String, timestamp: i64 },

  #[error("Destination storage is closed.")]
  StoreClosed,
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
/// A destination transaction could not be made durable. None of its samples are visible.
pub enum CommitError {
  #[error("Transaction conflicts with a concurrent commit. {0}")]
  Conflict(AppendError),

  #[error("Cannot write block {0}. {1}")]
  CannotWriteBlock(String, String),

  #[error("Destination storage is closed.")]
  StoreClosed,
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
/// Invalid window or step configuration.
pub enum SchedulingError {
  #[error("Step must be positive, received {0}ms.")]
  NonPositiveStep(i64),

  #[error("Lookback must not be negative, received {0}ms.")]
  NegativeLookback(i64),

  #[error("Time range overflows: end time {0}ms, lookback {1}ms.")]
  Overflow(i64, i64),

  #[error("Max parallelism must be at least 1, received {0}.")]
  InvalidParallelism(usize),

  #[error("Invalid duration {0:?}.")]
  InvalidDuration(String),
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
/// A label matcher could not be built.
pub enum MatcherError {
  #[error("Label name of a matcher must not be empty.")]
  EmptyLabelName,

  #[error("Invalid regex {0:?}. {1}")]
  InvalidRegex(String, String),
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
/// Failure of a single migration task. The task's transaction is never committed.
pub enum TaskError {
  #[error("Source query error: {0}")]
  SourceQuery(SourceQueryError),

  #[error("Append error: {0}")]
  Append(AppendError),

  #[error("Commit error: {0}")]
  Commit(CommitError),
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
/// Errors that terminate a migration.
pub enum MigrationError {
  #[error("Invalid scheduling configuration. {0}")]
  Scheduling(SchedulingError),

  #[error("Cannot enumerate shards. {0}")]
  ShardEnumeration(SourceQueryError),

  #[error("Invalid shard matcher. {0}")]
  Matcher(MatcherError),

  #[error("Migration of shard {shard} in window {window} failed. {cause}")]
  Task {
    shard: String,
    window: TimeWindow,
    cause: TaskError,
  },

  #[error("Migration task panicked: {0}")]
  TaskPanicked(String),

  #[error("Migration interrupted after {0} completed windows.")]
  Interrupted(usize),

  #[error("Invalid configuration. {0}")]
  InvalidConfiguration(String),

  #[error("Storage error: {0}")]
  Storage(StorageError),
}

impl From<std::io::Error> for StorageError {
  fn from(error: std::io::Error) -> Self {
    StorageError::IOError(error.to_string())
  }
}

impl From<serde_json::Error> for StorageError {
  fn from(error: serde_json::Error) -> Self {
    StorageError::SerializationError(error.to_string())
  }
}

impl From<ChunkError> for StorageError {
  fn from(error: ChunkError) -> Self {
    StorageError::ChunkError(error)
  }
}

impl From<StorageError> for SourceQueryError {
  fn from(error: StorageError) -> Self {
    match error {
      StorageError::NotStarted => SourceQueryError::NotStarted,
      other => SourceQueryError::StorageError(other),
    }
  }
}

impl From<SourceQueryError> for TaskError {
  fn from(error: SourceQueryError) -> Self {
    TaskError::SourceQuery(error)
  }
}

impl From<AppendError> for TaskError {
  fn from(error: AppendError) -> Self {
    TaskError::Append(error)
  }
}

impl From<CommitError> for TaskError {
  fn from(error: CommitError) -> Self {
    TaskError::Commit(error)
  }
}

impl From<SchedulingError> for MigrationError {
  fn from(error: SchedulingError) -> Self {
    MigrationError::Scheduling(error)
  }
}

impl From<StorageError> for MigrationError {
  fn from(error: StorageError) -> Self {
    MigrationError::Storage(error)
  }
}

impl From<MatcherError> for MigrationError {
  fn from(error: MatcherError) -> Self {
    MigrationError::Matcher(error)
  }
}
