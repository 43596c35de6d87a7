use chrono::{
  Datelike,
  Duration,
  NaiveDate
};
use serde::Serialize;

use crate::cycle::CycleConfig;

/// Layout facts for a 7-column month
/// view.
#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  PartialEq,
  Eq,
)]
pub struct MonthGrid {
  /// Weekday of the 1st, 0 = Sunday.
  pub first_weekday_offset: u32,
  pub days_in_month:        u32
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum WeekStart {
  Sunday,
  Monday
}

impl WeekStart {
  pub fn parse(
    raw: &str
  ) -> anyhow::Result<Self> {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "sunday" | "sun" => {
        Ok(WeekStart::Sunday)
      }
      | "monday" | "mon" => {
        Ok(WeekStart::Monday)
      }
      | other => Err(anyhow::anyhow!(
        "invalid week start: {other}"
      ))
    }
  }
}

impl MonthGrid {
  /// Empty cells before the 1st when
  /// weeks begin on `start`.
  #[must_use]
  pub fn leading_blanks(
    &self,
    start: WeekStart
  ) -> u32 {
    match start {
      | WeekStart::Sunday => {
        self.first_weekday_offset
      }
      | WeekStart::Monday => {
        (self.first_weekday_offset + 6)
          % 7
      }
    }
  }
}

/// A `(year, month, day)` triple with a
/// 0-based month, as produced by calendar
/// widgets.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct CalendarQuery {
  pub year:  i32,
  pub month: i32,
  pub day:   i32
}

impl CalendarQuery {
  #[must_use]
  pub fn new(
    year: i32,
    month: i32,
    day: i32
  ) -> Self {
    Self { year, month, day }
  }

  /// Resolves the triple to a date.
  ///
  /// Months outside 0..=11 carry into
  /// the year and days outside the month
  /// carry into neighbouring months, so
  /// day 0 is the last day of the
  /// previous month.
  #[must_use]
  pub fn date(&self) -> Option<NaiveDate> {
    first_of_month(self.year, self.month)?
      .checked_add_signed(Duration::days(
        i64::from(self.day) - 1
      ))
  }
}

fn first_of_month(
  year: i32,
  month: i32
) -> Option<NaiveDate> {
  let year =
    year.checked_add(month.div_euclid(12))?;
  let month0 =
    u32::try_from(month.rem_euclid(12))
      .ok()?;
  NaiveDate::from_ymd_opt(
    year,
    month0 + 1,
    1
  )
}

/// Weekday offset of the 1st and the
/// number of days for a 0-based month.
///
/// `None` only for years chrono cannot
/// represent.
#[must_use]
pub fn month_grid(
  year: i32,
  month: i32
) -> Option<MonthGrid> {
  let first =
    first_of_month(year, month)?;
  let last = first_of_month(
    year,
    month.checked_add(1)?
  )?
  .pred_opt()?;

  Some(MonthGrid {
    first_weekday_offset: first
      .weekday()
      .num_days_from_sunday(),
    days_in_month:        last.day()
  })
}

pub fn is_period_day(
  config: &CycleConfig,
  query: CalendarQuery
) -> bool {
  query
    .date()
    .is_some_and(|d| config.is_period_day(d))
}

pub fn is_fertile_day(
  config: &CycleConfig,
  query: CalendarQuery
) -> bool {
  query
    .date()
    .is_some_and(|d| config.is_fertile_day(d))
}

pub fn is_ovulation_day(
  config: &CycleConfig,
  query: CalendarQuery
) -> bool {
  query.date().is_some_and(|d| {
    config.is_ovulation_day(d)
  })
}

pub fn is_predicted_period(
  config: &CycleConfig,
  query: CalendarQuery,
  today: NaiveDate
) -> bool {
  query.date().is_some_and(|d| {
    config.is_predicted_period(d, today)
  })
}

/// How a calendar cell should be drawn.
#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "snake_case")]
pub enum DayKind {
  Predicted,
  Period,
  Ovulation,
  Fertile,
  Today,
  Plain
}

/// Raw predicates for one date. Several
/// can hold at once; `kind` picks the
/// one to draw.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  Serialize,
  PartialEq,
  Eq,
)]
pub struct DayFlags {
  pub period:    bool,
  pub predicted: bool,
  pub fertile:   bool,
  pub ovulation: bool,
  pub today:     bool
}

impl DayFlags {
  #[must_use]
  pub fn compute(
    config: &CycleConfig,
    date: NaiveDate,
    today: NaiveDate
  ) -> Self {
    Self {
      period:    config
        .is_period_day(date),
      predicted: config
        .is_predicted_period(
          date, today
        ),
      fertile:   config
        .is_fertile_day(date),
      ovulation: config
        .is_ovulation_day(date),
      today:     date == today
    }
  }

  #[must_use]
  pub fn kind(&self) -> DayKind {
    if self.predicted {
      DayKind::Predicted
    } else if self.period {
      DayKind::Period
    } else if self.ovulation {
      DayKind::Ovulation
    } else if self.fertile {
      DayKind::Fertile
    } else if self.today {
      DayKind::Today
    } else {
      DayKind::Plain
    }
  }
}

#[must_use]
pub fn classify_day(
  config: &CycleConfig,
  date: NaiveDate,
  today: NaiveDate
) -> DayKind {
  DayFlags::compute(config, date, today)
    .kind()
}

#[derive(
  Debug, Clone, Serialize, PartialEq, Eq,
)]
pub struct CalendarCell {
  pub day:   u32,
  pub date:  NaiveDate,
  pub kind:  DayKind,
  pub flags: DayFlags
}

#[derive(
  Debug, Clone, Serialize, PartialEq, Eq,
)]
pub struct MonthView {
  pub year:  i32,
  /// 1-based calendar month.
  pub month: u32,
  pub grid:  MonthGrid,
  pub cells: Vec<CalendarCell>
}

/// Classifies every day of a 0-based
/// month in one pass.
#[must_use]
pub fn month_cells(
  config: &CycleConfig,
  year: i32,
  month: i32,
  today: NaiveDate
) -> Option<MonthView> {
  let first =
    first_of_month(year, month)?;
  let grid = month_grid(year, month)?;

  let mut cells = Vec::with_capacity(
    grid.days_in_month as usize
  );
  for date in first
    .iter_days()
    .take(grid.days_in_month as usize)
  {
    let flags = DayFlags::compute(
      config, date, today
    );
    cells.push(CalendarCell {
      day: date.day(),
      date,
      kind: flags.kind(),
      flags
    });
  }

  Some(MonthView {
    year: first.year(),
    month: first.month(),
    grid,
    cells
  })
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::{
    CalendarQuery,
    DayKind,
    WeekStart,
    classify_day,
    is_fertile_day,
    is_period_day,
    is_predicted_period,
    month_cells,
    month_grid
  };
  use crate::cycle::CycleConfig;

  fn ymd(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  fn config() -> CycleConfig {
    CycleConfig::with_default_period(
      ymd(2024, 1, 1),
      28
    )
    .expect("valid config")
  }

  #[test]
  fn february_leap_years() {
    assert_eq!(
      month_grid(2024, 1)
        .expect("grid")
        .days_in_month,
      29
    );
    assert_eq!(
      month_grid(2023, 1)
        .expect("grid")
        .days_in_month,
      28
    );
    assert_eq!(
      month_grid(1900, 1)
        .expect("grid")
        .days_in_month,
      28
    );
    assert_eq!(
      month_grid(2000, 1)
        .expect("grid")
        .days_in_month,
      29
    );
  }

  #[test]
  fn first_weekday_offsets() {
    // 2024-01-01 was a Monday
    let jan = month_grid(2024, 0)
      .expect("grid");
    assert_eq!(
      jan.first_weekday_offset,
      1
    );
    assert_eq!(jan.days_in_month, 31);
    assert_eq!(
      jan.leading_blanks(
        WeekStart::Monday
      ),
      0
    );

    // 2023-10-01 was a Sunday
    let oct = month_grid(2023, 9)
      .expect("grid");
    assert_eq!(
      oct.first_weekday_offset,
      0
    );
    assert_eq!(
      oct.leading_blanks(
        WeekStart::Monday
      ),
      6
    );
  }

  #[test]
  fn month_index_carries_into_year() {
    assert_eq!(
      month_grid(2023, 12),
      month_grid(2024, 0)
    );
    assert_eq!(
      month_grid(2024, -1),
      month_grid(2023, 11)
    );
  }

  #[test]
  fn every_month_matches_the_gregorian_calendar()
   {
    for year in 1990..=2030 {
      for month in 0..12 {
        let grid = month_grid(year, month)
          .expect("grid");
        let month1 = month as u32 + 1;
        let expected = (28..=31)
          .rev()
          .find(|d| {
            NaiveDate::from_ymd_opt(
              year, month1, *d
            )
            .is_some()
          })
          .expect("some length");
        assert_eq!(
          grid.days_in_month,
          expected
        );
      }
    }
  }

  #[test]
  fn query_day_overflow_rolls_over() {
    assert_eq!(
      CalendarQuery::new(2024, 0, 32)
        .date(),
      Some(ymd(2024, 2, 1))
    );
    assert_eq!(
      CalendarQuery::new(2024, 2, 0)
        .date(),
      Some(ymd(2024, 2, 29))
    );
  }

  #[test]
  fn query_predicates() {
    let cfg = config();
    assert!(is_period_day(
      &cfg,
      CalendarQuery::new(2024, 0, 3)
    ));
    assert!(!is_period_day(
      &cfg,
      CalendarQuery::new(2024, 0, 6)
    ));
    assert!(is_fertile_day(
      &cfg,
      CalendarQuery::new(2024, 0, 12)
    ));
    assert!(!is_fertile_day(
      &cfg,
      CalendarQuery::new(2024, 0, 11)
    ));
    assert!(!is_fertile_day(
      &cfg,
      CalendarQuery::new(2024, 0, 17)
    ));
    assert!(is_predicted_period(
      &cfg,
      CalendarQuery::new(2024, 1, 26),
      ymd(2024, 1, 10)
    ));
    assert!(!is_period_day(
      &cfg,
      CalendarQuery::new(2023, 11, 31)
    ));
  }

  #[test]
  fn classification_precedence() {
    let cfg = config();
    let today = ymd(2024, 1, 13);
    assert_eq!(
      classify_day(
        &cfg,
        ymd(2024, 1, 2),
        today
      ),
      DayKind::Period
    );
    assert_eq!(
      classify_day(
        &cfg,
        ymd(2024, 1, 14),
        today
      ),
      DayKind::Ovulation
    );
    assert_eq!(
      classify_day(
        &cfg,
        ymd(2024, 1, 12),
        today
      ),
      DayKind::Fertile
    );
    assert_eq!(
      classify_day(&cfg, today, today),
      DayKind::Fertile
    );
    assert_eq!(
      classify_day(
        &cfg,
        ymd(2024, 1, 8),
        ymd(2024, 1, 8)
      ),
      DayKind::Today
    );
    assert_eq!(
      classify_day(
        &cfg,
        ymd(2024, 1, 30),
        today
      ),
      DayKind::Predicted
    );
    assert_eq!(
      classify_day(
        &cfg,
        ymd(2024, 1, 20),
        today
      ),
      DayKind::Plain
    );
  }

  #[test]
  fn month_view_classifies_each_day() {
    let cfg = config();
    let view = month_cells(
      &cfg,
      2024,
      1,
      ymd(2024, 2, 10)
    )
    .expect("view");
    assert_eq!(view.month, 2);
    assert_eq!(view.cells.len(), 29);

    let kinds: Vec<DayKind> = view
      .cells
      .iter()
      .map(|c| c.kind)
      .collect();
    // Jan 29 starts cycle two, so Feb
    // 1..=2 are past period days.
    assert_eq!(kinds[0], DayKind::Period);
    assert_eq!(kinds[1], DayKind::Period);
    assert_eq!(kinds[9], DayKind::Fertile);
    assert!(view.cells[9].flags.today);
    // Feb 26 starts cycle three.
    assert_eq!(
      kinds[25],
      DayKind::Predicted
    );
    assert_eq!(kinds[28], DayKind::Predicted);
  }
}
