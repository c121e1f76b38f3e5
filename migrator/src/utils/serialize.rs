// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use std::fs::{self, File};
use std::io::Write;

use memmap2::Mmap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::utils::error::StorageError;

// Level for zstd compression. Higher level means higher compression ratio, at the expense of speed of compression and decompression.
pub const COMPRESSION_LEVEL: i32 = 15;

/// Suffix of the file a value is written to before it replaces the destination file.
const TMP_FILE_SUFFIX: &str = ".tmp";

/// Compress and write the given value to the given file. The file is replaced atomically:
/// readers see either the previous content or the new one. Returns the number of bytes
/// before and after compression.
pub fn write<T: Serialize>(
  to_write: &T,
  file_path: &str,
  sync_after_write: bool,
) -> Result<(u64, u64), StorageError> {
  let input = serde_json::to_string(&to_write)?;
  let input = input.as_bytes();
  let uncompressed_length = input.len() as u64;

  let mut output = Vec::new();
  zstd::stream::copy_encode(input, &mut output, COMPRESSION_LEVEL)?;

  let tmp_file_path = format!("{}{}", file_path, TMP_FILE_SUFFIX);
  let mut file = File::options()
    .create(true)
    .write(true)
    .truncate(true)
    .open(&tmp_file_path)?;

  file.write_all(output.as_slice())?;
  let compressed_length = output.len() as u64;

  if sync_after_write {
    // Forcibly sync the file contents without relying on the OS to do so.
    file.sync_all()?;
  }
  drop(file);

  fs::rename(&tmp_file_path, file_path)?;

  Ok((uncompressed_length, compressed_length))
}

/// Read a value from the given file. Returns the value and the number of bytes read after decompression.
pub fn read<T: DeserializeOwned>(file_path: &str) -> Result<(T, u64), StorageError> {
  let file = File::open(file_path)?;

  // Safety: `write` never modifies an existing file in place; it renames a new file over it.
  let mmap = unsafe { Mmap::map(&file)? };
  let data = zstd::decode_all(&mmap[..])?;
  let retval: T = serde_json::from_slice(&data)?;
  Ok((retval, data.len() as u64))
}
