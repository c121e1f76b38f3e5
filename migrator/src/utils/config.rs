// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use std::env;

use chrono::Duration;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::utils::custom_serde::duration_serde;

const DEFAULT_CONFIG_FILE_NAME: &str = "default.toml";

#[derive(Debug, Deserialize)]
/// Settings for the legacy source storage.
pub struct SourceSettings {
  storage_path: String,
  memory_budget_bytes: u64,
}

impl SourceSettings {
  /// Get the directory where the source storage is persisted.
  pub fn get_storage_path(&self) -> &str {
    self.storage_path.as_str()
  }

  /// Get the memory budget for series loaded from the source storage.
  pub fn get_memory_budget_bytes(&self) -> u64 {
    self.memory_budget_bytes
  }
}

#[derive(Debug, Deserialize)]
/// Settings for the destination block storage.
pub struct DestinationSettings {
  storage_path: String,
  sync_after_commit: bool,
}

impl DestinationSettings {
  /// Get the directory where destination blocks are written.
  pub fn get_storage_path(&self) -> &str {
    self.storage_path.as_str()
  }

  /// Whether each committed block is fsync-ed before it becomes visible.
  pub fn get_sync_after_commit(&self) -> bool {
    self.sync_after_commit
  }
}

#[derive(Debug, Deserialize)]
/// Settings for the migration pipeline.
pub struct MigrationSettings {
  #[serde(with = "duration_serde")]
  lookback: Duration,

  #[serde(with = "duration_serde")]
  step: Duration,

  /// Unix timestamp in seconds of the end of the migrated range. 0 means now.
  end_timestamp: i64,

  max_parallelism: usize,
  partition_label: String,
  include_unlabeled: bool,
}

impl MigrationSettings {
  pub fn get_lookback(&self) -> Duration {
    self.lookback
  }

  pub fn get_step(&self) -> Duration {
    self.step
  }

  pub fn get_end_timestamp(&self) -> i64 {
    self.end_timestamp
  }

  pub fn get_max_parallelism(&self) -> usize {
    self.max_parallelism
  }

  pub fn get_partition_label(&self) -> &str {
    self.partition_label.as_str()
  }

  pub fn get_include_unlabeled(&self) -> bool {
    self.include_unlabeled
  }
}

#[derive(Debug, Deserialize)]
/// Settings for tsmigrate, read from config file.
pub struct Settings {
  source: SourceSettings,
  destination: DestinationSettings,
  migration: MigrationSettings,
}

impl Settings {
  /// Create Settings from given configuration directory path.
  pub fn new(config_dir_path: &str) -> Result<Self, ConfigError> {
    Self::new_with_overrides(config_dir_path, &[])
  }

  /// Create Settings from given configuration directory path, with the given (key, value)
  /// pairs taking precedence over every other source. Keys are dotted, e.g. "migration.step".
  pub fn new_with_overrides(
    config_dir_path: &str,
    overrides: &[(&str, String)],
  ) -> Result<Self, ConfigError> {
    let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
    let config_default_file_name = format!("{}/{}", config_dir_path, DEFAULT_CONFIG_FILE_NAME);
    let config_environment_file_name = format!("{}/{}.toml", config_dir_path, run_mode);

    let mut builder = Config::builder()
      // Built-in defaults, so that the tool works without any config file.
      .set_default("source.storage_path", "./data-v1")?
      .set_default("source.memory_budget_bytes", 2_000_000_000_i64)?
      .set_default("destination.storage_path", "./data-v2")?
      .set_default("destination.sync_after_commit", false)?
      .set_default("migration.lookback", "15d")?
      .set_default("migration.step", "15m")?
      .set_default("migration.end_timestamp", 0_i64)?
      .set_default("migration.max_parallelism", 1_i64)?
      .set_default("migration.partition_label", "instance")?
      .set_default("migration.include_unlabeled", false)?
      // Merge in the "default" configuration file, if present.
      .add_source(File::with_name(&config_default_file_name).required(false))
      // Add in the current environment file. Defaults to 'development' env.
      .add_source(File::with_name(&config_environment_file_name).required(false))
      // Add in settings from the environment (with a prefix of TSMIGRATE)
      // Eg.. `TSMIGRATE_MIGRATION__STEP=5m` would set the `migration.step` key
      .add_source(
        Environment::with_prefix("tsmigrate")
          .prefix_separator("_")
          .separator("__"),
      );

    for (key, value) in overrides {
      builder = builder.set_override(*key, value.as_str())?;
    }

    builder.build()?.try_deserialize()
  }

  /// Get source settings.
  pub fn get_source_settings(&self) -> &SourceSettings {
    &self.source
  }

  /// Get destination settings.
  pub fn get_destination_settings(&self) -> &DestinationSettings {
    &self.destination
  }

  /// Get migration settings.
  pub fn get_migration_settings(&self) -> &MigrationSettings {
    &self.migration
  }

  pub fn get_default_config_file_name() -> &'static str {
    DEFAULT_CONFIG_FILE_NAME
  }
}
