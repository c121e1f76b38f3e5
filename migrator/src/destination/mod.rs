// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

//! The destination store: immutable blocks, each written by one committed transaction.
//!
//! Writers get an [`Appender`] from a [`DestinationStore`], add samples to it, and commit. A
//! commit either makes all of the appender's samples visible at once, or none of them.

pub mod block;
pub mod store;

use crate::metric::label::LabelSet;
use crate::utils::error::{AppendError, CommitError};

/// Identifier of a series in the destination store.
pub type SeriesRef = u64;

/// What a successful commit made visible.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommitStats {
  /// Id of the block written by the commit. None when there was nothing to commit.
  block_id: Option<String>,
  num_series: usize,
  num_samples: usize,
}

impl CommitStats {
  pub fn new(block_id: Option<String>, num_series: usize, num_samples: usize) -> Self {
    CommitStats {
      block_id,
      num_series,
      num_samples,
    }
  }

  pub fn get_block_id(&self) -> Option<&str> {
    self.block_id.as_deref()
  }

  pub fn get_num_series(&self) -> usize {
    self.num_series
  }

  pub fn get_num_samples(&self) -> usize {
    self.num_samples
  }
}

/// A write transaction. Samples added to it are invisible until `commit()` succeeds.
/// Dropping an appender without committing discards its samples.
pub trait Appender: Send {
  /// Add a sample to the transaction.
  fn add(&mut self, label_set: &LabelSet, timestamp: i64, value: f64)
    -> Result<SeriesRef, AppendError>;

  /// Atomically make every added sample visible.
  fn commit(self: Box<Self>) -> Result<CommitStats, CommitError>;

  /// Discard every added sample.
  fn rollback(self: Box<Self>);
}

/// A store accepting concurrent, independent write transactions.
pub trait DestinationStore: Send + Sync {
  fn appender(&self) -> Box<dyn Appender + '_>;
}
