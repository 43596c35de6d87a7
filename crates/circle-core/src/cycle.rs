use chrono::{
  Duration,
  NaiveDate
};
use serde::Serialize;
use thiserror::Error;

use crate::phase::{
  CyclePhase,
  phase_of
};

pub const DEFAULT_CYCLE_LENGTH: u32 = 28;
pub const DEFAULT_PERIOD_LENGTH: u32 = 5;
pub const MIN_CYCLE_LENGTH: u32 = 21;
pub const MAX_CYCLE_LENGTH: u32 = 45;

/// Days between ovulation and the start
/// of the next period.
const LUTEAL_SPAN: i64 = 14;

/// Half-width of the fertile window
/// around ovulation.
const FERTILE_RADIUS: i64 = 2;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CycleConfigError {
  #[error("cycle length must be at least 1 day")]
  ZeroCycleLength,

  #[error("period length must be at least 1 day")]
  ZeroPeriodLength,

  #[error(
    "period length {period_length} exceeds cycle length {cycle_length}"
  )]
  PeriodExceedsCycle {
    period_length: u32,
    cycle_length:  u32
  }
}

/// Anchor date and lengths every cycle
/// computation runs against.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct CycleConfig {
  last_period_date: NaiveDate,
  cycle_length:     u32,
  period_length:    u32
}

impl CycleConfig {
  pub fn new(
    last_period_date: NaiveDate,
    cycle_length: u32,
    period_length: u32
  ) -> Result<Self, CycleConfigError> {
    if cycle_length == 0 {
      return Err(
        CycleConfigError::ZeroCycleLength
      );
    }
    if period_length == 0 {
      return Err(
        CycleConfigError::ZeroPeriodLength
      );
    }
    if period_length > cycle_length {
      return Err(
        CycleConfigError::PeriodExceedsCycle {
          period_length,
          cycle_length
        }
      );
    }

    Ok(Self {
      last_period_date,
      cycle_length,
      period_length
    })
  }

  pub fn with_default_period(
    last_period_date: NaiveDate,
    cycle_length: u32
  ) -> Result<Self, CycleConfigError> {
    Self::new(
      last_period_date,
      cycle_length,
      DEFAULT_PERIOD_LENGTH
    )
  }

  #[must_use]
  pub fn last_period_date(
    &self
  ) -> NaiveDate {
    self.last_period_date
  }

  #[must_use]
  pub fn cycle_length(&self) -> u32 {
    self.cycle_length
  }

  #[must_use]
  pub fn period_length(&self) -> u32 {
    self.period_length
  }

  #[must_use]
  pub fn cycle_day(
    &self,
    today: NaiveDate
  ) -> i64 {
    cycle_day_of(
      today,
      self.last_period_date,
      self.cycle_length
    )
  }

  #[must_use]
  pub fn phase(
    &self,
    today: NaiveDate
  ) -> CyclePhase {
    phase_of(
      self.cycle_day(today),
      self.cycle_length
    )
  }

  #[must_use]
  pub fn days_until_period(
    &self,
    today: NaiveDate
  ) -> i64 {
    days_until_period(
      self.cycle_day(today),
      self.cycle_length
    )
  }

  #[must_use]
  pub fn progress_percent(
    &self,
    today: NaiveDate
  ) -> i64 {
    progress_percent(
      self.cycle_day(today),
      self.cycle_length
    )
  }

  #[must_use]
  pub fn ovulation_day(&self) -> i64 {
    ovulation_day(self.cycle_length)
  }

  /// Position of `date` inside its cycle,
  /// or `None` when it precedes the
  /// anchor.
  #[must_use]
  pub fn day_in_cycle(
    &self,
    date: NaiveDate
  ) -> Option<i64> {
    let elapsed = days_elapsed(
      date,
      self.last_period_date
    );
    if elapsed < 0 {
      return None;
    }
    Some(
      elapsed
        % i64::from(self.cycle_length)
        + 1
    )
  }

  #[must_use]
  pub fn is_period_day(
    &self,
    date: NaiveDate
  ) -> bool {
    self.day_in_cycle(date).is_some_and(
      |day| {
        day
          <= i64::from(
            self.period_length
          )
      }
    )
  }

  #[must_use]
  pub fn is_fertile_day(
    &self,
    date: NaiveDate
  ) -> bool {
    let ovulation = self.ovulation_day();
    self.day_in_cycle(date).is_some_and(
      |day| {
        (ovulation - FERTILE_RADIUS
          ..=ovulation + FERTILE_RADIUS)
          .contains(&day)
      }
    )
  }

  #[must_use]
  pub fn is_ovulation_day(
    &self,
    date: NaiveDate
  ) -> bool {
    self.day_in_cycle(date)
      == Some(self.ovulation_day())
  }

  /// A period day that has not happened
  /// yet relative to `today`.
  #[must_use]
  pub fn is_predicted_period(
    &self,
    date: NaiveDate,
    today: NaiveDate
  ) -> bool {
    date > today
      && self.is_period_day(date)
  }

  /// First day of the next cycle, or
  /// `None` past the end of the
  /// representable calendar.
  #[must_use]
  pub fn next_period_start(
    &self,
    today: NaiveDate
  ) -> Option<NaiveDate> {
    let ahead =
      self.days_until_period(today) + 1;
    today.checked_add_signed(
      Duration::days(ahead)
    )
  }

  #[must_use]
  pub fn status(
    &self,
    today: NaiveDate
  ) -> CycleStatus {
    let cycle_day =
      self.cycle_day(today);
    CycleStatus {
      today,
      cycle_day,
      cycle_length: self.cycle_length,
      phase: phase_of(
        cycle_day,
        self.cycle_length
      ),
      days_until_period:
        days_until_period(
          cycle_day,
          self.cycle_length
        ),
      progress_percent:
        progress_percent(
          cycle_day,
          self.cycle_length
        ),
      next_period_start: self
        .next_period_start(today)
    }
  }
}

/// Everything the home and partner
/// views show about "today".
#[derive(
  Debug, Clone, Serialize, PartialEq, Eq,
)]
pub struct CycleStatus {
  pub today:             NaiveDate,
  pub cycle_day:         i64,
  pub cycle_length:      u32,
  pub phase:             CyclePhase,
  pub days_until_period: i64,
  pub progress_percent:  i64,
  pub next_period_start:
    Option<NaiveDate>
}

/// Whole calendar days from `from` to
/// `to`; negative when `to` is earlier.
#[must_use]
pub fn days_elapsed(
  to: NaiveDate,
  from: NaiveDate
) -> i64 {
  to.signed_duration_since(from)
    .num_days()
}

/// 1-based day of the cycle containing
/// `today`.
///
/// Uses a non-negative modulo, so an
/// anchor in the future wraps backwards:
/// the day before the anchor is the last
/// day of the previous cycle. A zero
/// length is treated as a one-day cycle.
#[must_use]
pub fn cycle_day_of(
  today: NaiveDate,
  last_period_date: NaiveDate,
  cycle_length: u32
) -> i64 {
  let length =
    i64::from(cycle_length.max(1));
  days_elapsed(today, last_period_date)
    .rem_euclid(length)
    + 1
}

#[must_use]
pub fn days_until_period(
  cycle_day: i64,
  cycle_length: u32
) -> i64 {
  i64::from(cycle_length) - cycle_day
}

/// Rounded percentage of the cycle
/// completed; halves round away from
/// zero.
#[must_use]
pub fn progress_percent(
  cycle_day: i64,
  cycle_length: u32
) -> i64 {
  let length =
    f64::from(cycle_length.max(1));
  #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
  let pct = (cycle_day as f64 / length
    * 100.0)
    .round() as i64;
  pct
}

/// Predicted ovulation day; zero or
/// negative for cycles of 14 days or
/// fewer.
#[must_use]
pub fn ovulation_day(
  cycle_length: u32
) -> i64 {
  i64::from(cycle_length) - LUTEAL_SPAN
}
