use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  Local,
  Months,
  NaiveDate,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

use crate::config::Config;

const TIMEZONE_CONFIG_FILE: &str =
  "circle-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "CIRCLE_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "CIRCLE_TIME_CONFIG";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Picks the zone "today" is read in.
///
/// `None` means the host's local zone.
#[tracing::instrument(skip(cfg))]
pub fn resolve_timezone(
  cfg: &Config,
  data_dir: &Path
) -> Option<Tz> {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return Some(tz);
  }

  let path =
    timezone_config_path(data_dir);
  if let Some(tz) =
    load_timezone_from_file(&path)
  {
    return Some(tz);
  }

  cfg.get("timezone").and_then(|raw| {
    parse_timezone(&raw, "rc.timezone")
  })
}

/// The current calendar date, read once
/// at the outermost call site.
#[must_use]
pub fn today(tz: Option<&Tz>) -> NaiveDate {
  let now = Utc::now();
  match tz {
    | Some(tz) => {
      now.with_timezone(tz).date_naive()
    }
    | None => now
      .with_timezone(&Local)
      .date_naive()
  }
}

fn timezone_config_path(
  data_dir: &Path
) -> PathBuf {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return PathBuf::from(trimmed);
    }
  }
  data_dir.join(TIMEZONE_CONFIG_FILE)
}

fn load_timezone_from_file(
  path: &Path
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Parses a user-supplied calendar date
/// relative to `today`.
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" => return Ok(today),
    | "yesterday" => {
      return today.pred_opt().ok_or_else(
        || anyhow!("date out of range")
      );
    }
    | "tomorrow" => {
      return today.succ_opt().ok_or_else(
        || anyhow!("date out of range")
      );
    }
    | _ => {}
  }

  if let Some(target) =
    parse_weekday_name(&lower)
  {
    return Ok(previous_weekday_date(
      today, target
    ));
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dw])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let sign = caps
      .name("sign")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative sign")
      })?;
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let unit = caps
      .name("unit")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative unit")
      })?;

    let duration = match unit {
      | "d" => Duration::try_days(num),
      | "w" => Duration::try_weeks(num),
      | _ => {
        return Err(anyhow!(
          "unknown relative unit: \
           {unit}"
        ));
      }
    }
    .ok_or_else(|| {
      anyhow!(
        "relative offset too large: \
         {token}"
      )
    })?;

    let shifted = if sign == "-" {
      today.checked_sub_signed(duration)
    } else {
      today.checked_add_signed(duration)
    };
    return shifted.ok_or_else(|| {
      anyhow!(
        "relative date out of range: \
         {token}"
      )
    });
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(date);
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y%m%d"
    )
  {
    return Ok(date);
  }

  // Timestamps keep the calendar date
  // of their own offset.
  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.date_naive());
  }

  Err(anyhow!(
    "unrecognized date expression: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: \
     today/yesterday/tomorrow, weekday \
     names (e.g. monday), +Nd/-Nd, \
     +Nw/-Nw, YYYY-MM-DD, YYYYMMDD, \
     RFC3339"
  })
}

/// Parses a month selector into a year
/// and 1-based month.
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_month_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<(i32, u32)> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let this_month = today
    .with_day(1)
    .ok_or_else(|| {
      anyhow!("failed to find month start")
    })?;

  let offset: Option<i64> =
    match lower.as_str() {
      | "" | "this" | "now" => Some(0),
      | "next" => Some(1),
      | "prev" | "previous" | "last" => {
        Some(-1)
      }
      | _ => {
        if lower.starts_with('+')
          || lower.starts_with('-')
        {
          Some(lower.parse::<i64>().with_context(|| {
            format!("invalid month offset: {token}")
          })?)
        } else {
          None
        }
      }
    };

  if let Some(offset) = offset {
    let months = Months::new(
      u32::try_from(offset.unsigned_abs())
        .context("month offset too large")?
    );
    let shifted = if offset < 0 {
      this_month.checked_sub_months(months)
    } else {
      this_month.checked_add_months(months)
    }
    .ok_or_else(|| {
      anyhow!(
        "month offset out of range: \
         {token}"
      )
    })?;
    return Ok((
      shifted.year(),
      shifted.month()
    ));
  }

  if let Some(month) =
    parse_month_name(&lower)
  {
    return Ok((today.year(), month));
  }

  if let Some((y, m)) =
    token.split_once('-')
    && let (Ok(year), Ok(month)) =
      (y.parse::<i32>(), m.parse::<u32>())
  {
    if !(1..=12).contains(&month) {
      return Err(anyhow!(
        "month must be 1-12: {token}"
      ));
    }
    return Ok((year, month));
  }

  Err(anyhow!(
    "unrecognized month expression: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: this/next/prev, \
     +N/-N, month names (e.g. march), \
     YYYY-MM"
  })
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

/// Most recent `target` strictly before
/// `from`.
fn previous_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + from_idx - target_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_sub_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}

fn parse_month_name(
  token: &str
) -> Option<u32> {
  match token.trim() {
    | "january" | "jan" => Some(1),
    | "february" | "feb" => Some(2),
    | "march" | "mar" => Some(3),
    | "april" | "apr" => Some(4),
    | "may" => Some(5),
    | "june" | "jun" => Some(6),
    | "july" | "jul" => Some(7),
    | "august" | "aug" => Some(8),
    | "september" | "sep" | "sept" => {
      Some(9)
    }
    | "october" | "oct" => Some(10),
    | "november" | "nov" => Some(11),
    | "december" | "dec" => Some(12),
    | _ => None
  }
}

#[must_use]
pub fn month_name(
  month: u32
) -> &'static str {
  match month {
    | 1 => "January",
    | 2 => "February",
    | 3 => "March",
    | 4 => "April",
    | 5 => "May",
    | 6 => "June",
    | 7 => "July",
    | 8 => "August",
    | 9 => "September",
    | 10 => "October",
    | 11 => "November",
    | 12 => "December",
    | _ => "?"
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::{
    iso_date_serde,
    parse_date_expr,
    parse_month_expr
  };

  fn ymd(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn parses_keywords_and_offsets() {
    let today = ymd(2026, 2, 17);
    assert_eq!(
      parse_date_expr("today", today)
        .expect("today"),
      today
    );
    assert_eq!(
      parse_date_expr("Yesterday", today)
        .expect("yesterday"),
      ymd(2026, 2, 16)
    );
    assert_eq!(
      parse_date_expr("-12d", today)
        .expect("-12d"),
      ymd(2026, 2, 5)
    );
    assert_eq!(
      parse_date_expr("+2w", today)
        .expect("+2w"),
      ymd(2026, 3, 3)
    );
  }

  #[test]
  fn weekday_name_looks_backwards() {
    // 2026-02-17 is a Tuesday
    let today = ymd(2026, 2, 17);
    assert_eq!(
      parse_date_expr("monday", today)
        .expect("monday"),
      ymd(2026, 2, 16)
    );
    assert_eq!(
      parse_date_expr("tue", today)
        .expect("tue"),
      ymd(2026, 2, 10)
    );
  }

  #[test]
  fn parses_absolute_dates() {
    let today = ymd(2026, 2, 17);
    assert_eq!(
      parse_date_expr(
        "2024-01-01",
        today
      )
      .expect("iso"),
      ymd(2024, 1, 1)
    );
    assert_eq!(
      parse_date_expr("20240229", today)
        .expect("compact"),
      ymd(2024, 2, 29)
    );
    assert_eq!(
      parse_date_expr(
        "2024-01-01T23:30:00-05:00",
        today
      )
      .expect("rfc3339"),
      ymd(2024, 1, 1)
    );
    assert!(
      parse_date_expr("soon", today)
        .is_err()
    );
  }

  #[test]
  fn parses_month_selectors() {
    let today = ymd(2026, 1, 20);
    assert_eq!(
      parse_month_expr("", today)
        .expect("this"),
      (2026, 1)
    );
    assert_eq!(
      parse_month_expr("prev", today)
        .expect("prev"),
      (2025, 12)
    );
    assert_eq!(
      parse_month_expr("+13", today)
        .expect("+13"),
      (2027, 2)
    );
    assert_eq!(
      parse_month_expr("march", today)
        .expect("march"),
      (2026, 3)
    );
    assert_eq!(
      parse_month_expr("2024-02", today)
        .expect("2024-02"),
      (2024, 2)
    );
    assert!(
      parse_month_expr("2024-13", today)
        .is_err()
    );
  }

  #[derive(
    Debug,
    serde::Serialize,
    serde::Deserialize,
  )]
  struct Holder {
    #[serde(
      default,
      with = "iso_date_serde::option"
    )]
    date: Option<NaiveDate>
  }

  #[test]
  fn iso_dates_truncate_timestamps() {
    let parsed: Holder =
      serde_json::from_str(
        r#"{"date":"2024-03-05T18:00:00.000Z"}"#
      )
      .expect("timestamp");
    assert_eq!(
      parsed.date,
      Some(ymd(2024, 3, 5))
    );

    let parsed: Holder =
      serde_json::from_str(
        r#"{"date":null}"#
      )
      .expect("null");
    assert_eq!(parsed.date, None);

    let out = serde_json::to_string(
      &Holder {
        date: Some(ymd(2024, 3, 5))
      }
    )
    .expect("serialize");
    assert_eq!(
      out,
      r#"{"date":"2024-03-05"}"#
    );
  }
}

pub mod iso_date_serde {
  use chrono::{
    DateTime,
    NaiveDate
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  const FORMAT: &str = "%Y-%m-%d";

  pub(super) fn parse(
    raw: &str
  ) -> Result<NaiveDate, String> {
    let trimmed = raw.trim();
    if let Ok(date) =
      NaiveDate::parse_from_str(
        trimmed, FORMAT
      )
    {
      return Ok(date);
    }
    DateTime::parse_from_rfc3339(trimmed)
      .map(|dt| dt.date_naive())
      .map_err(|err| {
        format!(
          "invalid date {trimmed:?}: \
           {err}"
        )
      })
  }

  pub fn serialize<S>(
    date: &NaiveDate,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &date.format(FORMAT).to_string()
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveDate, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    parse(&raw)
      .map_err(serde::de::Error::custom)
  }

  pub mod option {
    use chrono::NaiveDate;
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    pub fn serialize<S>(
      date: &Option<NaiveDate>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match date {
        | Some(value) => {
          super::serialize(
            value, serializer
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<NaiveDate>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      let opt =
        Option::<String>::deserialize(
          deserializer
        )?;
      match opt {
        | Some(raw) => super::parse(&raw)
          .map(Some)
          .map_err(
            serde::de::Error::custom
          ),
        | None => Ok(None)
      }
    }
  }
}
