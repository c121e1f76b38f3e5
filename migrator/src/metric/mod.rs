// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

//! Metric data model shared by the source and destination stores.
//!
//! A series is identified by a canonical [label set](label::LabelSet) and holds
//! samples in a chunked [time series](time_series::TimeSeries). Each chunk holds up to
//! 128 samples; full chunks are compressed with delta-of-delta encoding.

pub(crate) mod constants;
pub mod label;
pub mod matcher;
mod metricutils;
pub mod sample;
pub mod time_series;
pub mod time_series_block;
mod time_series_block_compressed;
