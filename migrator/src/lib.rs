// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

//! Migrate time series from the legacy chunked store to the immutable block store.
//!
//! The [`TsMigrate`] facade opens both stores from [settings](utils::config::Settings) and runs
//! the [migration pipeline](migration). The stores and the pipeline can also be used directly.

pub mod destination;
pub mod metric;
pub mod migration;
pub mod source;
pub mod utils;

use crossbeam::atomic::AtomicCell;
use log::{error, info};

use crate::destination::store::{BlockStore, DestinationOptions};
use crate::migration::pipeline::{MigrationConfig, MigrationSummary, Migrator};
use crate::migration::progress::ProgressReporter;
use crate::source::storage::{SourceOptions, SourceStorage};
use crate::utils::config::Settings;
use crate::utils::error::MigrationError;
use crate::utils::sync::Arc;

/// A source and a destination store, opened from settings and ready to migrate.
pub struct TsMigrate {
  settings: Settings,
  source: Arc<SourceStorage>,
  destination: Arc<BlockStore>,
}

impl TsMigrate {
  /// Read the settings from the given config directory and open both stores.
  pub fn new(config_dir_path: &str) -> Result<Self, MigrationError> {
    let settings = Settings::new(config_dir_path)
      .map_err(|e| MigrationError::InvalidConfiguration(e.to_string()))?;
    Self::new_with_settings(settings)
  }

  /// Start the source store and open the destination store.
  pub fn new_with_settings(settings: Settings) -> Result<Self, MigrationError> {
    let source_settings = settings.get_source_settings();
    let source = SourceStorage::new(SourceOptions::new(
      source_settings.get_storage_path(),
      source_settings.get_memory_budget_bytes(),
    ));
    source.start()?;

    let destination_settings = settings.get_destination_settings();
    let destination = match BlockStore::open(
      destination_settings.get_storage_path(),
      DestinationOptions::new(destination_settings.get_sync_after_commit()),
    ) {
      Ok(destination) => destination,
      Err(e) => {
        if let Err(stop_error) = source.stop() {
          error!("Could not stop source storage: {}", stop_error);
        }
        return Err(e.into());
      }
    };

    info!(
      "Opened source {} and destination {}",
      source_settings.get_storage_path(),
      destination_settings.get_storage_path()
    );

    Ok(TsMigrate {
      settings,
      source: Arc::new(source),
      destination: Arc::new(destination),
    })
  }

  /// Run the migration configured in the settings.
  pub async fn migrate(
    &self,
    progress: Box<dyn ProgressReporter>,
    shutdown: Arc<AtomicCell<bool>>,
  ) -> Result<MigrationSummary, MigrationError> {
    let config = MigrationConfig::from_settings(self.settings.get_migration_settings());
    let migrator = Migrator::new(self.source.clone(), self.destination.clone(), &config)?
      .with_progress_reporter(progress)
      .with_shutdown_flag(shutdown);
    migrator.run().await
  }

  /// Stop the source store and close the destination store. Both are attempted even if the
  /// first fails.
  pub fn close(&self) -> Result<(), MigrationError> {
    let source_result = self.source.stop();
    let destination_result = self.destination.close();
    source_result?;
    destination_result?;
    Ok(())
  }

  pub fn get_settings(&self) -> &Settings {
    &self.settings
  }

  pub fn get_source(&self) -> &SourceStorage {
    &self.source
  }

  pub fn get_destination(&self) -> &BlockStore {
    &self.destination
  }
}
