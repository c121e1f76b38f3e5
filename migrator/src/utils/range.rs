// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

/// Check whether the ranges [start1, end1] and [start2, end2] (all inclusive) overlap.
pub fn is_overlap(start1: i64, end1: i64, start2: i64, end2: i64) -> bool {
  start1 <= end2 && start2 <= end1
}
