use std::ffi::OsString;
use std::fs;

use chrono::NaiveDate;
use circle_core::calendar::{DayKind, month_cells};
use circle_core::phase::CyclePhase;
use circle_core::state::{DailyLog, FlowIntensity, Mood, OnboardingPatch, StateStore};
use tempfile::tempdir;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

#[test]
fn state_roundtrip_drives_cycle_views() {
    let temp = tempdir().expect("tempdir");
    let store = StateStore::open(temp.path()).expect("open store");
    let today = ymd(2024, 1, 15);

    let mut state = store.load().expect("load defaults");
    assert!(!state.onboarding_complete);
    state.set_onboarding(OnboardingPatch {
        last_period_date: Some(ymd(2024, 1, 1)),
        cycle_length: Some(28),
        ..OnboardingPatch::default()
    });
    state.complete_onboarding(today);

    let mut log = DailyLog::empty(today);
    log.mood = Some(Mood::Happy);
    log.flow = FlowIntensity::from_level(10);
    state.save_daily_log(log);
    store.save(&state).expect("save state");

    let raw = fs::read_to_string(temp.path().join("state.json")).expect("read state file");
    assert!(raw.contains("\"lastPeriodDate\": \"2024-01-01\""));
    assert!(raw.contains("\"cycleLength\": 28"));

    let reloaded = store.load().expect("reload");
    assert_eq!(reloaded, state);

    let config = reloaded.cycle_config(today, 5).expect("cycle config");
    let status = config.status(today);
    assert_eq!(status.cycle_day, 15);
    assert_eq!(status.phase, CyclePhase::Ovulation);
    assert_eq!(status.days_until_period, 13);

    let view = month_cells(&config, 2024, 0, today).expect("month view");
    let period_days: Vec<u32> = view
        .cells
        .iter()
        .filter(|c| c.kind == DayKind::Period)
        .map(|c| c.day)
        .collect();
    assert_eq!(period_days, vec![1, 2, 3, 4, 5]);
    let predicted: Vec<u32> = view
        .cells
        .iter()
        .filter(|c| c.kind == DayKind::Predicted)
        .map(|c| c.day)
        .collect();
    assert_eq!(predicted, vec![29, 30, 31]);
}

#[test]
fn malformed_state_file_is_reported() {
    let temp = tempdir().expect("tempdir");
    fs::write(temp.path().join("state.json"), "{ not json").expect("write junk");
    let store = StateStore::open(temp.path()).expect("open store");
    let err = store.load().expect_err("junk must not parse");
    assert!(format!("{err:#}").contains("state.json"));
}

#[test]
fn setup_command_persists_onboarding() {
    let temp = tempdir().expect("tempdir");
    let rc = temp.path().join("circlerc");
    fs::write(&rc, "color=off\n").expect("write rc");

    let args: Vec<OsString> = [
        "circle",
        "--circlerc",
        rc.to_str().expect("utf8 path"),
        "--data",
        temp.path().to_str().expect("utf8 path"),
        "--today",
        "2024-01-15",
        "setup",
        "last:2024-01-01",
        "length:30",
        "goal:track_cycle",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    circle_core::run(args).expect("setup runs");

    let state = StateStore::open(temp.path())
        .expect("open store")
        .load()
        .expect("load state");
    assert!(state.onboarding_complete);
    assert_eq!(state.onboarding_data.last_period_date, Some(ymd(2024, 1, 1)));
    assert_eq!(state.onboarding_data.cycle_length, 30);
}
