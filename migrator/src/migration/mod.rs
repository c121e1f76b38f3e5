// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

//! The migration pipeline.
//!
//! The [scheduler](window::TimeWindowScheduler) splits the migrated time range into windows and
//! the [enumerator](shard::ShardEnumerator) splits the series into shards, one per value of a
//! partition label. Windows are migrated one after the other; within a window, the
//! [executor](executor::BoundedExecutor) runs one [task](task::MigrationTask) per shard with
//! bounded parallelism. Each task commits its samples in a single destination transaction.
//!
//! Shards are enumerated once, when the migration starts. Values of the partition label that
//! first appear in the source during a migration are not migrated by it.

pub mod executor;
pub mod pipeline;
pub mod progress;
pub mod shard;
pub mod task;
pub mod window;

#[cfg(test)]
pub(crate) mod test_utils;
