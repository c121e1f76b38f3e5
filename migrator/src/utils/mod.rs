// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

//! Utilities shared by the storage engines and the migration pipeline.

pub(crate) mod custom_serde;
pub(crate) mod range;
pub(crate) mod serialize;
pub(crate) mod sync;

pub mod config;
pub mod environment;
pub mod error;
pub mod io;
pub mod time;
