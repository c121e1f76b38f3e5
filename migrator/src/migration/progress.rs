// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use crossbeam::atomic::AtomicCell;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

use crate::migration::pipeline::MigrationSummary;
use crate::migration::task::TaskStats;
use crate::migration::window::TimeWindow;

const PROGRESS_TEMPLATE: &str =
  "{spinner:.cyan} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} windows ({percent:>3}%) | {msg}";

/// Receives the progress of a migration, one completed window at a time.
pub trait ProgressReporter: Send + Sync {
  fn start(&self, num_windows: usize, num_shards: usize);

  fn window_completed(&self, window: &TimeWindow, stats: &TaskStats);

  fn finish(&self, summary: &MigrationSummary);

  /// The migration stopped before completing every window.
  fn abandon(&self);
}

/// Draws a progress bar on the standard error stream.
pub struct BarProgressReporter {
  bar: ProgressBar,
  samples: AtomicCell<usize>,
}

impl BarProgressReporter {
  pub fn new() -> Self {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template(PROGRESS_TEMPLATE)
      .unwrap_or_else(|_| ProgressStyle::default_bar())
      .progress_chars("=> ");
    bar.set_style(style);

    BarProgressReporter {
      bar,
      samples: AtomicCell::new(0),
    }
  }
}

impl Default for BarProgressReporter {
  fn default() -> Self {
    Self::new()
  }
}

impl ProgressReporter for BarProgressReporter {
  fn start(&self, num_windows: usize, _num_shards: usize) {
    self.bar.set_length(num_windows as u64);
    self.bar.set_position(0);
  }

  fn window_completed(&self, _window: &TimeWindow, stats: &TaskStats) {
    let samples = self.samples.fetch_add(stats.get_samples()) + stats.get_samples();
    self.bar.set_message(format!("{} samples", samples));
    self.bar.inc(1);
  }

  fn finish(&self, summary: &MigrationSummary) {
    self
      .bar
      .finish_with_message(format!("{} samples", summary.get_samples_migrated()));
  }

  fn abandon(&self) {
    self.bar.abandon();
  }
}

/// Logs a line for each completed window. Used when the output isn't a terminal.
#[derive(Default)]
pub struct LogProgressReporter {
  num_windows: AtomicCell<usize>,
  windows_completed: AtomicCell<usize>,
}

impl LogProgressReporter {
  pub fn new() -> Self {
    Self::default()
  }
}

impl ProgressReporter for LogProgressReporter {
  fn start(&self, num_windows: usize, num_shards: usize) {
    self.num_windows.store(num_windows);
    info!(
      "Migrating {} windows of {} shards each",
      num_windows, num_shards
    );
  }

  fn window_completed(&self, window: &TimeWindow, stats: &TaskStats) {
    let completed = self.windows_completed.fetch_add(1) + 1;
    info!(
      "Window {} done ({}/{}): {} samples of {} series",
      window,
      completed,
      self.num_windows.load(),
      stats.get_samples(),
      stats.get_series()
    );
  }

  fn finish(&self, summary: &MigrationSummary) {
    info!("Migration finished: {}", summary);
  }

  fn abandon(&self) {
    info!(
      "Migration stopped after {}/{} windows",
      self.windows_completed.load(),
      self.num_windows.load()
    );
  }
}

/// Reports nothing.
#[derive(Default)]
pub struct SilentProgressReporter;

impl ProgressReporter for SilentProgressReporter {
  fn start(&self, _num_windows: usize, _num_shards: usize) {}

  fn window_completed(&self, _window: &TimeWindow, _stats: &TaskStats) {}

  fn finish(&self, _summary: &MigrationSummary) {}

  fn abandon(&self) {}
}
