// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

pub(crate) use std::sync::Arc;

// parking_lot locks don't poison.
pub(crate) use parking_lot::{Mutex, RwLock};

// Bounds the number of in-flight migration tasks.
pub(crate) use tokio::sync::Semaphore;

// A call to this function will compile only if T is Send + Sync.
#[cfg(test)]
pub fn is_sync_send<T: Send + Sync>() {}

#[test]
fn test_is_sync_send() {
  is_sync_send::<u32>();
  is_sync_send::<Mutex<u32>>();
  is_sync_send::<RwLock<u32>>();
  is_sync_send::<Semaphore>();
}
