use std::io::{self, IsTerminal, Write};

use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::calendar::{DayFlags, DayKind, MonthView, WeekStart};
use crate::config::Config;
use crate::cycle::CycleStatus;
use crate::datetime::month_name;
use crate::phase::CyclePhase;
use crate::state::DailyLog;

const PROGRESS_SLOTS: i64 = 20;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        let color = cfg.get_bool("color").unwrap_or(true);
        Self {
            color: color && io::stdout().is_terminal(),
        }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip_all)]
    pub fn print_status(
        &self,
        status: &CycleStatus,
        user_name: Option<&str>,
        today_log: Option<&DailyLog>,
    ) -> anyhow::Result<()> {
        self.write_status(io::stdout().lock(), status, user_name, today_log)
    }

    pub fn write_status<W: Write>(
        &self,
        mut out: W,
        status: &CycleStatus,
        user_name: Option<&str>,
        today_log: Option<&DailyLog>,
    ) -> anyhow::Result<()> {
        if let Some(name) = user_name {
            writeln!(out, "Hello, {name}")?;
            writeln!(out)?;
        }

        let heading = status.phase.label().to_uppercase();
        writeln!(out, "{}", self.paint(&heading, phase_code(status.phase)))?;
        writeln!(
            out,
            "Day {} of {}, period in {} {}",
            status.cycle_day,
            status.cycle_length,
            status.days_until_period,
            plural_days(status.days_until_period)
        )?;
        writeln!(
            out,
            "Cycle progress  {} {}%",
            progress_bar(status.progress_percent),
            status.progress_percent
        )?;
        if let Some(next) = status.next_period_start {
            writeln!(out, "Next period     {}", next.format("%Y-%m-%d"))?;
        }
        writeln!(out)?;
        writeln!(out, "{}", status.phase.insight())?;

        if let Some(log) = today_log {
            writeln!(out)?;
            writeln!(out, "Logged today: {}", summarize_log(log))?;
        }

        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_calendar(
        &self,
        view: &MonthView,
        week_start: WeekStart,
        phase: CyclePhase,
    ) -> anyhow::Result<()> {
        self.write_calendar(io::stdout().lock(), view, week_start, phase)
    }

    pub fn write_calendar<W: Write>(
        &self,
        mut out: W,
        view: &MonthView,
        week_start: WeekStart,
        phase: CyclePhase,
    ) -> anyhow::Result<()> {
        writeln!(out, "{} {}", month_name(view.month), view.year)?;

        let weekdays = match week_start {
            WeekStart::Sunday => ["Su", "Mo", "Tu", "We", "Th", "Fr", "Sa"],
            WeekStart::Monday => ["Mo", "Tu", "We", "Th", "Fr", "Sa", "Su"],
        };
        for name in weekdays {
            write!(out, " {name} ")?;
        }
        writeln!(out)?;

        let blanks = view.grid.leading_blanks(week_start) as usize;
        let mut column = 0usize;
        for _ in 0..blanks {
            write!(out, "    ")?;
            column += 1;
        }

        for cell in &view.cells {
            let text = format!("{:>3}", format!("{}{}", kind_marker(cell.kind), cell.day).trim());
            write!(out, "{} ", self.paint(&text, kind_code(cell.kind)))?;
            column += 1;
            if column % 7 == 0 {
                writeln!(out)?;
            }
        }
        if column % 7 != 0 {
            writeln!(out)?;
        }

        writeln!(out)?;
        writeln!(
            out,
            "*period  ~predicted  +fertile  @ovulation  >today"
        )?;
        writeln!(out, "Current phase: {}", phase.label())?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_insights(&self, status: &CycleStatus) -> anyhow::Result<()> {
        self.write_insights(io::stdout().lock(), status)
    }

    pub fn write_insights<W: Write>(&self, mut out: W, status: &CycleStatus) -> anyhow::Result<()> {
        writeln!(
            out,
            "Insights for day {} of {}",
            status.cycle_day, status.cycle_length
        )?;
        writeln!(out)?;

        for phase in CyclePhase::ALL {
            let current = phase == status.phase;
            let label = if current {
                format!("> {}", phase.label())
            } else {
                format!("  {}", phase.label())
            };
            let label = if current {
                self.paint(&label, phase_code(phase))
            } else {
                label
            };
            writeln!(out, "{label}")?;
            writeln!(out, "    {}", phase.insight())?;
        }

        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_day(
        &self,
        date: NaiveDate,
        day_in_cycle: Option<i64>,
        phase: Option<CyclePhase>,
        flags: DayFlags,
    ) -> anyhow::Result<()> {
        self.write_day(io::stdout().lock(), date, day_in_cycle, phase, flags)
    }

    pub fn write_day<W: Write>(
        &self,
        mut out: W,
        date: NaiveDate,
        day_in_cycle: Option<i64>,
        phase: Option<CyclePhase>,
        flags: DayFlags,
    ) -> anyhow::Result<()> {
        writeln!(out, "date       {}", date.format("%Y-%m-%d"))?;
        match (day_in_cycle, phase) {
            (Some(day), Some(phase)) => {
                writeln!(out, "cycle day  {day}")?;
                writeln!(out, "phase      {}", phase.label())?;
            }
            _ => writeln!(out, "cycle day  - (before last period)")?,
        }
        writeln!(out, "kind       {}", kind_name(flags.kind()))?;
        writeln!(out, "period     {}", yes_no(flags.period))?;
        writeln!(out, "predicted  {}", yes_no(flags.predicted))?;
        writeln!(out, "fertile    {}", yes_no(flags.fertile))?;
        writeln!(out, "ovulation  {}", yes_no(flags.ovulation))?;
        Ok(())
    }

    #[tracing::instrument(skip(self, logs))]
    pub fn print_history(&self, logs: &[DailyLog]) -> anyhow::Result<()> {
        let out = io::stdout().lock();

        let headers = vec![
            "Date".to_string(),
            "Mood".to_string(),
            "Flow".to_string(),
            "Symptoms".to_string(),
            "Notes".to_string(),
        ];

        let mut rows = Vec::with_capacity(logs.len());
        for log in logs {
            let mood = log.mood.map(|m| m.to_string()).unwrap_or_default();
            let symptoms = log
                .symptoms
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            rows.push(vec![
                self.paint(&log.date.format("%Y-%m-%d").to_string(), "33"),
                mood,
                log.flow.to_string(),
                symptoms,
                log.notes.clone(),
            ]);
        }

        write_table(out, headers, rows)?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || code.is_empty() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn phase_code(phase: CyclePhase) -> &'static str {
    match phase {
        CyclePhase::Menstrual => "1;31",
        CyclePhase::Follicular => "1;32",
        CyclePhase::Ovulation => "1;36",
        CyclePhase::Luteal => "1;33",
        CyclePhase::LateLuteal => "1;35",
    }
}

fn kind_code(kind: DayKind) -> &'static str {
    match kind {
        DayKind::Predicted => "35",
        DayKind::Period => "31",
        DayKind::Ovulation => "1;36",
        DayKind::Fertile => "36",
        DayKind::Today => "7",
        DayKind::Plain => "",
    }
}

fn kind_marker(kind: DayKind) -> char {
    match kind {
        DayKind::Predicted => '~',
        DayKind::Period => '*',
        DayKind::Ovulation => '@',
        DayKind::Fertile => '+',
        DayKind::Today => '>',
        DayKind::Plain => ' ',
    }
}

fn kind_name(kind: DayKind) -> &'static str {
    match kind {
        DayKind::Predicted => "predicted period",
        DayKind::Period => "period",
        DayKind::Ovulation => "ovulation",
        DayKind::Fertile => "fertile",
        DayKind::Today => "today",
        DayKind::Plain => "plain",
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn plural_days(n: i64) -> &'static str {
    if n == 1 { "day" } else { "days" }
}

fn progress_bar(percent: i64) -> String {
    let filled = (percent.clamp(0, 100) * PROGRESS_SLOTS / 100) as usize;
    let empty = PROGRESS_SLOTS as usize - filled;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(empty))
}

fn summarize_log(log: &DailyLog) -> String {
    let mut parts = Vec::new();
    if let Some(mood) = log.mood {
        parts.push(format!("mood {mood}"));
    }
    parts.push(format!("flow {}", log.flow));
    if !log.symptoms.is_empty() {
        let names: Vec<String> = log.symptoms.iter().map(|s| s.to_string()).collect();
        parts.push(names.join(", "));
    }
    parts.join("; ")
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use std::io::{self, IsTerminal};

    use super::{Renderer, progress_bar, strip_ansi, write_table};
    use crate::calendar::{WeekStart, month_cells};
    use crate::config::Config;
    use crate::cycle::CycleConfig;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> anyhow::Result<()>,
    {
        let mut buf = Vec::new();
        f(&mut buf).expect("render");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn color_setting_uses_config_booleans() {
        let mut cfg = Config::default();
        cfg.apply_overrides([("color".to_string(), "n".to_string())]);
        assert!(!Renderer::new(&cfg).color);

        cfg.apply_overrides([("color".to_string(), "y".to_string())]);
        assert_eq!(Renderer::new(&cfg).color, io::stdout().is_terminal());
    }

    #[test]
    fn progress_bar_fills_proportionally() {
        assert_eq!(progress_bar(0), format!("[{}]", "-".repeat(20)));
        assert_eq!(progress_bar(50), format!("[{}{}]", "#".repeat(10), "-".repeat(10)));
        assert_eq!(progress_bar(100), format!("[{}]", "#".repeat(20)));
    }

    #[test]
    fn status_card_mentions_day_and_phase() {
        let cfg = CycleConfig::with_default_period(ymd(2024, 1, 1), 28).expect("config");
        let status = cfg.status(ymd(2024, 1, 15));
        let text = render(|buf| Renderer::plain().write_status(buf, &status, Some("Sarah"), None));
        assert!(text.contains("Hello, Sarah"));
        assert!(text.contains("OVULATION"));
        assert!(text.contains("Day 15 of 28, period in 13 days"));
        assert!(text.contains("54%"));
        assert!(text.contains("Next period     2024-01-29"));
    }

    #[test]
    fn calendar_grid_places_first_day_under_its_weekday() {
        let cfg = CycleConfig::with_default_period(ymd(2024, 1, 1), 28).expect("config");
        let today = ymd(2024, 1, 10);
        let view = month_cells(&cfg, 2024, 0, today).expect("view");
        let phase = cfg.phase(today);
        let text = render(|buf| Renderer::plain().write_calendar(buf, &view, WeekStart::Sunday, phase));

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "January 2024");
        assert_eq!(lines[1].trim_end(), " Su  Mo  Tu  We  Th  Fr  Sa");
        // Jan 1 2024 is a Monday: one blank cell, then period days.
        assert!(lines[2].starts_with("     *1  *2  *3  *4  *5   6 "));
        assert!(text.contains(">10"));
        assert!(text.contains("@14"));
        assert!(text.contains("+12"));
        assert!(text.contains("~30"));
    }

    #[test]
    fn table_pads_by_visible_width() {
        let text = render(|buf| {
            write_table(
                buf,
                vec!["A".to_string(), "B".to_string()],
                vec![vec!["\x1b[33mxyz\x1b[0m".to_string(), "1".to_string()]],
            )
        });
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "A   B ");
        assert_eq!(strip_ansi(lines[2]), "xyz 1 ");
    }
}
