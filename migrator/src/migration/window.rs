// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

use std::fmt;

use chrono::Duration;

use crate::utils::error::SchedulingError;

/// A time range migrated in one unit of work. Windows are half-open `[from, through)`, except the
/// last window of a schedule, which is closed `[from, through]`. Adjacent windows therefore never
/// both contain the sample at their shared boundary.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TimeWindow {
  from: i64,
  through: i64,
  closed: bool,
}

impl TimeWindow {
  pub fn new(from: i64, through: i64, closed: bool) -> Self {
    TimeWindow {
      from,
      through,
      closed,
    }
  }

  pub fn get_from(&self) -> i64 {
    self.from
  }

  pub fn get_through(&self) -> i64 {
    self.through
  }

  pub fn is_closed(&self) -> bool {
    self.closed
  }

  /// Get the latest timestamp included in this window.
  pub fn get_last_included(&self) -> i64 {
    if self.closed {
      self.through
    } else {
      self.through - 1
    }
  }

  pub fn contains(&self, timestamp: i64) -> bool {
    timestamp >= self.from && timestamp <= self.get_last_included()
  }
}

impl fmt::Display for TimeWindow {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let close = if self.closed { ']' } else { ')' };
    write!(f, "[{}, {}{}", self.from, self.through, close)
  }
}

/// Splits `[end - lookback, end]` into consecutive windows of `step` each.
///
/// There are `ceil(lookback / step)` windows. When the step doesn't divide the lookback, the last
/// window extends past `end` by less than one step.
#[derive(Clone, Debug)]
pub struct TimeWindowScheduler {
  end: i64,
  lookback: i64,
  step: i64,
  windows: Vec<TimeWindow>,
}

impl TimeWindowScheduler {
  /// Create a scheduler for the given end time in milliseconds since epoch.
  pub fn new(end: i64, lookback: Duration, step: Duration) -> Result<Self, SchedulingError> {
    let step = step.num_milliseconds();
    let lookback = lookback.num_milliseconds();
    if step <= 0 {
      return Err(SchedulingError::NonPositiveStep(step));
    }
    if lookback < 0 {
      return Err(SchedulingError::NegativeLookback(lookback));
    }

    let start = end
      .checked_sub(lookback)
      .ok_or(SchedulingError::Overflow(end, lookback))?;

    // ceil(lookback / step) without overflowing on lookback + step.
    let num_windows = lookback / step + i64::from(lookback % step != 0);

    // The last window ends at start + num_windows * step, which may be past the end time.
    num_windows
      .checked_mul(step)
      .and_then(|span| start.checked_add(span))
      .ok_or(SchedulingError::Overflow(end, lookback))?;

    let windows = (0..num_windows)
      .map(|i| {
        let from = start + i * step;
        TimeWindow::new(from, from + step, i == num_windows - 1)
      })
      .collect();

    Ok(TimeWindowScheduler {
      end,
      lookback,
      step,
      windows,
    })
  }

  pub fn get_end(&self) -> i64 {
    self.end
  }

  pub fn get_lookback_millis(&self) -> i64 {
    self.lookback
  }

  pub fn get_step_millis(&self) -> i64 {
    self.step
  }

  /// Get the windows in increasing time order.
  pub fn get_windows(&self) -> &[TimeWindow] {
    &self.windows
  }

  pub fn get_num_windows(&self) -> usize {
    self.windows.len()
  }
}
