// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use thiserror::Error;

use migrator::utils::error::MigrationError;

#[derive(Debug, Error)]
/// Errors that make tsmigrate exit with a non-zero code.
pub enum TsMigrateError {
  #[error("Invalid configuration. {0}")]
  InvalidConfiguration(String),

  #[error("{0}")]
  Migration(MigrationError),
}

impl From<MigrationError> for TsMigrateError {
  fn from(error: MigrationError) -> Self {
    TsMigrateError::Migration(error)
  }
}
