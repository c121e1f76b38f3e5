// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

//! The tsmigrate command line tool.
//!
//! Migrates the last `--lookback` of time series from a legacy chunked store directory into a
//! block store directory, one time window at a time and one shard (a value of the partition
//! label) per task. Flags override the settings read from `$TSMIGRATE_CONFIG_DIR_PATH`
//! (default: `config`), which in turn override the built-in defaults.
//!
//! Ctrl-C or SIGTERM stops the migration after the current window; blocks committed so far
//! remain valid.

mod utils;

use std::env;
use std::io::IsTerminal;
use std::process;
use std::sync::Arc;

use clap::{arg, ArgMatches, Command};
use crossbeam::atomic::AtomicCell;
use lazy_static::lazy_static;
use log::{error, info};
use tracing_subscriber::EnvFilter;

use migrator::migration::pipeline::MigrationSummary;
use migrator::migration::progress::{BarProgressReporter, LogProgressReporter, ProgressReporter};
use migrator::utils::config::Settings;
use migrator::utils::environment::load_env;
use migrator::TsMigrate;

use crate::utils::error::TsMigrateError;
use crate::utils::shutdown::shutdown_signal;

const CONFIG_DIR_PATH_ENV: &str = "TSMIGRATE_CONFIG_DIR_PATH";
const DEFAULT_CONFIG_DIR_PATH: &str = "config";

lazy_static! {
  static ref IS_SHUTDOWN: Arc<AtomicCell<bool>> = Arc::new(AtomicCell::new(false));
}

fn get_command() -> Command {
  Command::new("tsmigrate")
    .version("0.1.0")
    .about("Migrate time series from the legacy chunked store to the block store")
    .arg(arg!(--"source-dir" <DIR> "Directory of the legacy source store").required(false))
    .arg(arg!(--"dest-dir" <DIR> "Directory of the destination block store").required(false))
    .arg(arg!(--lookback <DURATION> "How far back from the end time to migrate, e.g. 15d").required(false))
    .arg(
      arg!(--"end-timestamp" <SECONDS> "End of the migrated range in Unix seconds, 0 for now")
        .required(false)
        .value_parser(clap::value_parser!(i64)),
    )
    .arg(arg!(--step <DURATION> "Width of each time window, e.g. 15m").required(false))
    .arg(
      arg!(--"source-memory-budget" <BYTES> "Memory budget for series loaded from the source")
        .required(false)
        .value_parser(clap::value_parser!(u64)),
    )
    .arg(
      arg!(--"max-parallelism" <N> "Maximum number of shards migrated concurrently")
        .required(false)
        .value_parser(clap::value_parser!(usize)),
    )
    .arg(arg!(--"partition-label" <LABEL> "Label whose values partition series into shards").required(false))
    .arg(arg!(--"include-unlabeled" "Also migrate series without the partition label"))
    .arg(arg!(--"sync-after-commit" "Fsync every block before it becomes visible"))
    .arg(arg!(--"no-progress" "Log progress lines instead of drawing a progress bar"))
}

/// Translate the given flags to settings overrides.
fn get_overrides(matches: &ArgMatches) -> Vec<(&'static str, String)> {
  let mut overrides = Vec::new();

  let string_flags = [
    ("source-dir", "source.storage_path"),
    ("dest-dir", "destination.storage_path"),
    ("lookback", "migration.lookback"),
    ("step", "migration.step"),
    ("partition-label", "migration.partition_label"),
  ];
  for (flag, key) in string_flags {
    if let Some(value) = matches.get_one::<String>(flag) {
      overrides.push((key, value.to_owned()));
    }
  }

  if let Some(end_timestamp) = matches.get_one::<i64>("end-timestamp") {
    overrides.push(("migration.end_timestamp", end_timestamp.to_string()));
  }
  if let Some(budget) = matches.get_one::<u64>("source-memory-budget") {
    overrides.push(("source.memory_budget_bytes", budget.to_string()));
  }
  if let Some(max_parallelism) = matches.get_one::<usize>("max-parallelism") {
    overrides.push(("migration.max_parallelism", max_parallelism.to_string()));
  }
  if matches.get_flag("include-unlabeled") {
    overrides.push(("migration.include_unlabeled", "true".to_owned()));
  }
  if matches.get_flag("sync-after-commit") {
    overrides.push(("destination.sync_after_commit", "true".to_owned()));
  }

  overrides
}

async fn run(
  config_dir_path: &str,
  overrides: &[(&str, String)],
  show_progress_bar: bool,
) -> Result<MigrationSummary, TsMigrateError> {
  let settings = Settings::new_with_overrides(config_dir_path, overrides)
    .map_err(|e| TsMigrateError::InvalidConfiguration(e.to_string()))?;
  let tsmigrate = TsMigrate::new_with_settings(settings)?;

  tokio::spawn(async {
    shutdown_signal().await;
    info!("Stopping the migration after the current window");
    IS_SHUTDOWN.store(true);
  });

  let progress: Box<dyn ProgressReporter> = if show_progress_bar {
    Box::new(BarProgressReporter::new())
  } else {
    Box::new(LogProgressReporter::new())
  };

  let result = tsmigrate.migrate(progress, IS_SHUTDOWN.clone()).await;
  let close_result = tsmigrate.close();

  let summary = result?;
  close_result?;
  Ok(summary)
}

fn main() {
  load_env();

  // If log level isn't set, set it to info.
  if env::var("RUST_LOG").is_err() {
    env::set_var("RUST_LOG", "info")
  }

  // Diagnostics go to stderr, next to the progress bar.
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .init();

  let matches = get_command().get_matches();
  let overrides = get_overrides(&matches);
  let show_progress_bar = !matches.get_flag("no-progress") && std::io::stderr().is_terminal();
  let config_dir_path =
    env::var(CONFIG_DIR_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_DIR_PATH.to_owned());

  let num_threads = std::cmp::max(1, num_cpus::get().saturating_sub(1));
  let runtime = match tokio::runtime::Builder::new_multi_thread()
    .worker_threads(num_threads)
    .enable_all()
    .build()
  {
    Ok(runtime) => runtime,
    Err(e) => {
      error!("Could not start the runtime: {}", e);
      process::exit(1);
    }
  };

  match runtime.block_on(run(&config_dir_path, &overrides, show_progress_bar)) {
    Ok(summary) => {
      info!("Migration complete: {}", summary);
    }
    Err(e) => {
      error!("Migration failed: {}", e);
      process::exit(1);
    }
  }
}
