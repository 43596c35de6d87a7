use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::calendar::{DayFlags, DayKind, month_cells};
use crate::cli::Invocation;
use crate::config::Config;
use crate::cycle::{CycleConfig, MAX_CYCLE_LENGTH, MIN_CYCLE_LENGTH};
use crate::datetime::{parse_date_expr, parse_month_expr};
use crate::phase::{CyclePhase, phase_of};
use crate::render::Renderer;
use crate::state::{AppState, DailyLog, FlowIntensity, Goal, Mood, OnboardingPatch, StateStore, Symptom};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "status", "calendar", "insights", "day", "setup", "log", "history", "show", "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &str, known: &[&'a str]) -> Option<&'a str> {
    if let Some(exact) = known.iter().copied().find(|name| *name == token) {
        return Some(exact);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Everything a command needs, resolved once per run.
#[derive(Debug)]
pub struct Session<'a> {
    pub store: &'a StateStore,
    pub cfg: &'a Config,
    pub renderer: &'a Renderer,
    pub today: NaiveDate,
    pub json: bool,
}

#[instrument(skip(session, inv), fields(today = %session.today))]
pub fn dispatch(session: &Session<'_>, inv: Invocation) -> anyhow::Result<()> {
    let command = inv.command.as_str();
    let args = inv.command_args.as_slice();
    debug!(command, args = ?args, "dispatching command");

    match command {
        "status" => cmd_status(session),
        "calendar" => cmd_calendar(session, args),
        "insights" => cmd_insights(session),
        "day" => cmd_day(session, args),
        "setup" => cmd_setup(session, args),
        "log" => cmd_log(session, args),
        "history" => cmd_history(session),
        "show" => cmd_show(session.cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn load_cycle(session: &Session<'_>) -> anyhow::Result<(AppState, CycleConfig)> {
    let state = session.store.load()?;
    if !state.onboarding_complete {
        warn!("cycle not set up yet; run `circle setup last:<date> length:<days>`");
    }
    let period_length = session.cfg.period_length()?;
    let config = state.cycle_config(session.today, period_length)?;
    Ok((state, config))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[instrument(skip(session))]
fn cmd_status(session: &Session<'_>) -> anyhow::Result<()> {
    info!("command status");

    let (state, config) = load_cycle(session)?;
    let status = config.status(session.today);
    if session.json {
        return print_json(&status);
    }

    session.renderer.print_status(
        &status,
        state.user_name.as_deref(),
        state.log_for(session.today),
    )
}

#[instrument(skip(session, args))]
fn cmd_calendar(session: &Session<'_>, args: &[String]) -> anyhow::Result<()> {
    info!("command calendar");

    let (_, config) = load_cycle(session)?;
    let (year, month) = parse_month_expr(&args.join(" "), session.today)?;
    let month0 = i32::try_from(month).context("month out of range")? - 1;
    let view = month_cells(&config, year, month0, session.today)
        .ok_or_else(|| anyhow!("cannot build calendar for {year}-{month:02}"))?;
    debug!(year, month, cells = view.cells.len(), "built month view");

    if session.json {
        return print_json(&view);
    }
    session
        .renderer
        .print_calendar(&view, session.cfg.week_start()?, config.phase(session.today))
}

#[instrument(skip(session))]
fn cmd_insights(session: &Session<'_>) -> anyhow::Result<()> {
    info!("command insights");

    let (_, config) = load_cycle(session)?;
    let status = config.status(session.today);
    if session.json {
        #[derive(Serialize)]
        struct PhaseInsight {
            phase: CyclePhase,
            label: &'static str,
            insight: &'static str,
            current: bool,
        }
        let report: Vec<PhaseInsight> = CyclePhase::ALL
            .iter()
            .map(|&phase| PhaseInsight {
                phase,
                label: phase.label(),
                insight: phase.insight(),
                current: phase == status.phase,
            })
            .collect();
        return print_json(&report);
    }
    session.renderer.print_insights(&status)
}

#[derive(Debug, Serialize)]
struct DayReport {
    date: NaiveDate,
    day_in_cycle: Option<i64>,
    phase: Option<CyclePhase>,
    kind: DayKind,
    flags: DayFlags,
}

#[instrument(skip(session, args))]
fn cmd_day(session: &Session<'_>, args: &[String]) -> anyhow::Result<()> {
    info!("command day");

    if args.is_empty() {
        return Err(anyhow!("day requires a date argument"));
    }
    let date = parse_date_expr(&args.join(" "), session.today)?;
    let (_, config) = load_cycle(session)?;

    let flags = DayFlags::compute(&config, date, session.today);
    let day_in_cycle = config.day_in_cycle(date);
    let phase = day_in_cycle.map(|day| phase_of(day, config.cycle_length()));

    if session.json {
        return print_json(&DayReport {
            date,
            day_in_cycle,
            phase,
            kind: flags.kind(),
            flags,
        });
    }
    session.renderer.print_day(date, day_in_cycle, phase, flags)
}

#[derive(Debug, Default)]
struct SetupArgs {
    patch: OnboardingPatch,
    name: Option<String>,
}

fn split_key_value(tok: &str) -> Option<(String, &str)> {
    let (key, value) = tok.split_once(':')?;
    Some((key.trim().to_ascii_lowercase(), value.trim()))
}

fn parse_setup_args(args: &[String], today: NaiveDate) -> anyhow::Result<SetupArgs> {
    let mut out = SetupArgs::default();

    for arg in args {
        let Some((key, value)) = split_key_value(arg) else {
            return Err(anyhow!("setup expects key:value arguments, got: {arg}"));
        };

        match key.as_str() {
            "last" | "last-period" | "since" => {
                out.patch.last_period_date = Some(parse_date_expr(value, today)?);
            }
            "length" | "cycle-length" => {
                let length = value
                    .parse::<u32>()
                    .with_context(|| format!("invalid cycle length: {value}"))?;
                out.patch.cycle_length = Some(length);
            }
            "goal" => out.patch.goal = Some(value.parse::<Goal>()?),
            "notifications" | "notify" => {
                out.patch.notifications_enabled = Some(parse_switch(value)?);
            }
            "name" => {
                out.name = Some(value.to_string()).filter(|v| !v.is_empty());
            }
            other => return Err(anyhow!("unknown setup key: {other}")),
        }
    }

    Ok(out)
}

fn parse_switch(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "yes" | "true" | "1" => Ok(true),
        "off" | "no" | "false" | "0" => Ok(false),
        other => Err(anyhow!("expected on/off, got: {other}")),
    }
}

#[instrument(skip(session, args))]
fn cmd_setup(session: &Session<'_>, args: &[String]) -> anyhow::Result<()> {
    info!("command setup");

    let parsed = parse_setup_args(args, session.today)?;
    if parsed.patch.is_empty() && parsed.name.is_none() {
        let state = session.store.load()?;
        if session.json {
            return print_json(&state.onboarding_data);
        }
        let data = &state.onboarding_data;
        println!(
            "last period    {}",
            data.last_period_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".to_string())
        );
        println!("cycle length   {}", data.cycle_length);
        println!(
            "goal           {}",
            data.goal.map_or("-", Goal::id)
        );
        println!(
            "notifications  {}",
            if data.notifications_enabled { "on" } else { "off" }
        );
        return Ok(());
    }

    if let Some(length) = parsed.patch.cycle_length
        && !(MIN_CYCLE_LENGTH..=MAX_CYCLE_LENGTH).contains(&length)
    {
        warn!(
            length,
            "cycle length outside the typical {MIN_CYCLE_LENGTH}-{MAX_CYCLE_LENGTH} day range"
        );
    }

    let period_length = session.cfg.period_length()?;
    let today = session.today;
    let config = session.store.update(|state| {
        state.set_onboarding(parsed.patch);
        if let Some(name) = parsed.name {
            state.user_name = Some(name);
        }
        state.complete_onboarding(today);
        state.cycle_config(today, period_length)
    })?;

    println!(
        "Saved: last period {}, {}-day cycle.",
        config.last_period_date().format("%Y-%m-%d"),
        config.cycle_length()
    );
    Ok(())
}

fn parse_log_args(args: &[String], today: NaiveDate, base: impl Fn(NaiveDate) -> DailyLog) -> anyhow::Result<DailyLog> {
    let date = args
        .iter()
        .filter_map(|arg| split_key_value(arg))
        .find(|(key, _)| key == "date")
        .map(|(_, value)| parse_date_expr(value, today))
        .transpose()?
        .unwrap_or(today);

    let mut log = base(date);
    let mut note_words = Vec::new();
    let mut notes_given = false;

    for arg in args {
        if let Some(symptom) = arg.strip_prefix('+') {
            let symptom = symptom.parse::<Symptom>()?;
            if !log.symptoms.contains(&symptom) {
                log.symptoms.push(symptom);
            }
            continue;
        }

        let Some((key, value)) = split_key_value(arg) else {
            note_words.push(arg.as_str());
            continue;
        };

        match key.as_str() {
            "date" => {}
            "mood" => log.mood = Some(value.parse::<Mood>()?),
            "flow" => {
                log.flow = match value.parse::<u8>() {
                    Ok(level) if level <= 100 => FlowIntensity::from_level(level),
                    Ok(level) => return Err(anyhow!("flow level must be 0-100, got {level}")),
                    Err(_) => value.parse::<FlowIntensity>()?,
                };
            }
            "symptoms" => {
                log.symptoms = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::parse::<Symptom>)
                    .collect::<anyhow::Result<Vec<_>>>()?;
            }
            "notes" => {
                notes_given = true;
                if !value.is_empty() {
                    note_words.push(value);
                }
            }
            "water" => {
                log.water_intake = value
                    .parse()
                    .with_context(|| format!("invalid water intake: {value}"))?;
            }
            "sleep" => {
                let hours: f32 = value
                    .parse()
                    .with_context(|| format!("invalid sleep hours: {value}"))?;
                if !hours.is_finite() || hours < 0.0 {
                    return Err(anyhow!("sleep hours must be a non-negative number, got {value}"));
                }
                log.sleep_hours = hours;
            }
            _ => {
                warn!(arg = %arg, "unrecognized log field treated as note text");
                note_words.push(arg.as_str());
            }
        }
    }

    if notes_given || !note_words.is_empty() {
        log.notes = note_words.join(" ");
    }

    Ok(log)
}

#[instrument(skip(session, args))]
fn cmd_log(session: &Session<'_>, args: &[String]) -> anyhow::Result<()> {
    info!("command log");

    let existing = session.store.load()?;
    let log = parse_log_args(args, session.today, |date| {
        existing
            .log_for(date)
            .cloned()
            .unwrap_or_else(|| DailyLog::empty(date))
    })?;
    let date = log.date;

    session.store.update(|state| {
        state.save_daily_log(log);
        Ok(())
    })?;

    println!("Logged {}.", date.format("%Y-%m-%d"));
    Ok(())
}

#[instrument(skip(session))]
fn cmd_history(session: &Session<'_>) -> anyhow::Result<()> {
    info!("command history");

    let state = session.store.load()?;
    if session.json {
        return print_json(&state.daily_logs);
    }
    if state.daily_logs.is_empty() {
        println!("No entries logged.");
        return Ok(());
    }
    session.renderer.print_history(&state.daily_logs)
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    for file in &cfg.loaded_files {
        println!("# loaded {}", file.display());
    }
    for (key, value) in cfg.iter() {
        println!("{key}={value}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "\
usage: circle [options] [command] [args]

commands:
  status                     today's cycle day, phase and progress
  calendar [MONTH]           month view (YYYY-MM, month name, next, prev, +N)
  insights                   advice for every phase, current one marked
  day DATE                   classify a single date
  setup [key:value ...]      last:DATE length:DAYS goal:GOAL notifications:on|off name:NAME
  log [key:value ...]        date: mood: flow:0-100|NAME symptoms:a,b +symptom notes: water: sleep:
  history                    list logged days
  show                       effective configuration
  help | version

options:
  --today DATE   --json   --data DIR   --circlerc FILE   --rc KEY=VALUE   -v/-q"
    );
    Ok(())
}
