// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use std::path::MAIN_SEPARATOR;

/// Join a directory path with file path. For example, if the
/// directory path is "a/b", separator is "/", and file path is "c",
/// this will return "a/b/c".
pub fn get_joined_path(dir_path: &str, file_path: &str) -> String {
  let joined_path = format!("{}{}{}", dir_path, MAIN_SEPARATOR, file_path);
  joined_path
}

/// Check whether the given path exists.
pub fn check_path_exists(path: &str) -> bool {
  std::path::Path::new(path).exists()
}

/// Create the directory (and its parents) if it doesn't exist yet.
pub fn create_dir(dir_path: &str) -> std::io::Result<()> {
  std::fs::create_dir_all(dir_path)
}
