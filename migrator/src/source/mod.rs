// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

//! The legacy source store: an in-memory, chunked sample store persisted as one file per series.
//!
//! The migration pipeline only sees the source through the [`SourceStore`] trait, so it can be
//! driven by [`storage::SourceStorage`] in production and by mocks in tests.

pub mod series;
pub mod storage;

use std::collections::HashSet;

use crate::metric::matcher::LabelMatcher;
use crate::source::series::SourceSeries;
use crate::utils::error::SourceQueryError;

/// Read access to the legacy store. Implementations must be safe for concurrent queries.
#[cfg_attr(test, mockall::automock)]
pub trait SourceStore: Send + Sync {
  /// Get the series matching `matcher` that have at least one sample in `[from, through]`
  /// (both inclusive). Each returned series holds at least its samples within that range.
  fn query_range(
    &self,
    matcher: &LabelMatcher,
    from: i64,
    through: i64,
  ) -> Result<Vec<SourceSeries>, SourceQueryError>;

  /// Get the distinct values of the given label across all series.
  fn label_values_for_label_name(
    &self,
    label_name: &str,
  ) -> Result<HashSet<String>, SourceQueryError>;
}
