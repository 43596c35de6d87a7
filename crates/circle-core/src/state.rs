use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, anyhow};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::cycle::{CycleConfig, DEFAULT_CYCLE_LENGTH};
use crate::datetime::iso_date_serde;

const STATE_FILE: &str = "state.json";

/// Days before "today" assumed for the last period when onboarding
/// finishes without one.
const ONBOARDING_FALLBACK_DAYS: i64 = 12;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    TrackCycle,
    PlanPregnancy,
    HealthInsights,
}

impl Goal {
    pub fn id(self) -> &'static str {
        match self {
            Goal::TrackCycle => "track_cycle",
            Goal::PlanPregnancy => "plan_pregnancy",
            Goal::HealthInsights => "health_insights",
        }
    }
}

impl FromStr for Goal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "track_cycle" | "track" => Ok(Goal::TrackCycle),
            "plan_pregnancy" | "pregnancy" => Ok(Goal::PlanPregnancy),
            "health_insights" | "health" => Ok(Goal::HealthInsights),
            other => Err(anyhow!("unknown goal: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingData {
    #[serde(default)]
    pub goal: Option<Goal>,

    #[serde(default, with = "iso_date_serde::option")]
    pub last_period_date: Option<NaiveDate>,

    #[serde(default = "default_cycle_length")]
    pub cycle_length: u32,

    #[serde(default)]
    pub notifications_enabled: bool,
}

fn default_cycle_length() -> u32 {
    DEFAULT_CYCLE_LENGTH
}

impl Default for OnboardingData {
    fn default() -> Self {
        Self {
            goal: None,
            last_period_date: None,
            cycle_length: DEFAULT_CYCLE_LENGTH,
            notifications_enabled: false,
        }
    }
}

/// Partial update applied by the setup flow; `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct OnboardingPatch {
    pub goal: Option<Goal>,
    pub last_period_date: Option<NaiveDate>,
    pub cycle_length: Option<u32>,
    pub notifications_enabled: Option<bool>,
}

impl OnboardingPatch {
    pub fn is_empty(&self) -> bool {
        self.goal.is_none()
            && self.last_period_date.is_none()
            && self.cycle_length.is_none()
            && self.notifications_enabled.is_none()
    }
}

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $id:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn id(self) -> &'static str {
                match self {
                    $($name::$variant => $id),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.id())
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().to_ascii_lowercase();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.id() == wanted)
                    .ok_or_else(|| {
                        anyhow!(
                            "unknown {}: {} (expected one of: {})",
                            stringify!($name).to_ascii_lowercase(),
                            s,
                            Self::ALL.iter().map(|v| v.id()).collect::<Vec<_>>().join(", ")
                        )
                    })
            }
        }
    };
}

string_enum!(Mood {
    Happy => "happy",
    Sensitive => "sensitive",
    Tired => "tired",
    Anxious => "anxious",
    Calm => "calm",
    Other => "other",
});

string_enum!(Symptom {
    Bloating => "bloating",
    Headache => "headache",
    Acne => "acne",
    Cramps => "cramps",
    Backache => "backache",
    Spotting => "spotting",
});

string_enum!(FlowIntensity {
    None => "none",
    Light => "light",
    Medium => "medium",
    Heavy => "heavy",
});

impl FlowIntensity {
    /// Buckets a 0-100 slider level.
    pub fn from_level(level: u8) -> Self {
        match level {
            0..=15 => FlowIntensity::None,
            16..=45 => FlowIntensity::Light,
            46..=75 => FlowIntensity::Medium,
            _ => FlowIntensity::Heavy,
        }
    }
}

impl Default for FlowIntensity {
    fn default() -> Self {
        FlowIntensity::None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyLog {
    #[serde(with = "iso_date_serde")]
    pub date: NaiveDate,

    #[serde(default)]
    pub mood: Option<Mood>,

    #[serde(default)]
    pub flow: FlowIntensity,

    #[serde(default)]
    pub symptoms: Vec<Symptom>,

    #[serde(default)]
    pub notes: String,

    #[serde(default)]
    pub water_intake: u32,

    #[serde(default)]
    pub sleep_hours: f32,
}

impl DailyLog {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            mood: None,
            flow: FlowIntensity::None,
            symptoms: vec![],
            notes: String::new(),
            water_intake: 0,
            sleep_hours: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default)]
    pub onboarding_complete: bool,

    #[serde(default)]
    pub onboarding_data: OnboardingData,

    #[serde(default)]
    pub daily_logs: Vec<DailyLog>,

    #[serde(default)]
    pub user_name: Option<String>,

    /// Top-level keys this tool does not model (`cravings`, `partners`, ...),
    /// written back untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AppState {
    pub fn set_onboarding(&mut self, patch: OnboardingPatch) {
        let data = &mut self.onboarding_data;
        if let Some(goal) = patch.goal {
            data.goal = Some(goal);
        }
        if let Some(date) = patch.last_period_date {
            data.last_period_date = Some(date);
        }
        if let Some(length) = patch.cycle_length {
            data.cycle_length = length;
        }
        if let Some(enabled) = patch.notifications_enabled {
            data.notifications_enabled = enabled;
        }
    }

    pub fn complete_onboarding(&mut self, today: NaiveDate) {
        self.onboarding_complete = true;
        if self.onboarding_data.last_period_date.is_none() {
            let fallback = today
                .checked_sub_signed(Duration::days(ONBOARDING_FALLBACK_DAYS))
                .unwrap_or(today);
            debug!(%fallback, "no last period date given; using fallback");
            self.onboarding_data.last_period_date = Some(fallback);
        }
    }

    /// Inserts `log`, replacing any entry for the same date.
    pub fn save_daily_log(&mut self, log: DailyLog) {
        match self.daily_logs.iter_mut().find(|l| l.date == log.date) {
            Some(existing) => *existing = log,
            None => {
                self.daily_logs.push(log);
                self.daily_logs.sort_by_key(|l| l.date);
            }
        }
    }

    pub fn log_for(&self, date: NaiveDate) -> Option<&DailyLog> {
        self.daily_logs.iter().find(|l| l.date == date)
    }

    /// Builds the cycle configuration the views compute against.
    ///
    /// A missing last period date falls back to `today` and a zero cycle
    /// length to the default, before validation.
    pub fn cycle_config(&self, today: NaiveDate, period_length: u32) -> anyhow::Result<CycleConfig> {
        let data = &self.onboarding_data;
        let last = data.last_period_date.unwrap_or(today);
        let cycle_length = if data.cycle_length == 0 {
            DEFAULT_CYCLE_LENGTH
        } else {
            data.cycle_length
        };

        CycleConfig::new(last, cycle_length, period_length).with_context(|| {
            format!("invalid cycle settings (cycle length {cycle_length}, period length {period_length})")
        })
    }
}

#[derive(Debug)]
pub struct StateStore {
    pub data_dir: PathBuf,
    pub state_path: PathBuf,
}

impl StateStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let state_path = data_dir.join(STATE_FILE);

        info!(
            data_dir = %data_dir.display(),
            state = %state_path.display(),
            "opened state store"
        );

        Ok(Self {
            data_dir,
            state_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> anyhow::Result<AppState> {
        if !self.state_path.exists() {
            debug!(file = %self.state_path.display(), "no state file; using defaults");
            return Ok(AppState::default());
        }

        let raw = fs::read_to_string(&self.state_path)
            .with_context(|| format!("failed reading {}", self.state_path.display()))?;
        if raw.trim().is_empty() {
            return Ok(AppState::default());
        }

        let state: AppState = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing {}", self.state_path.display()))?;
        debug!(logs = state.daily_logs.len(), "loaded app state");
        Ok(state)
    }

    #[tracing::instrument(skip(self, state))]
    pub fn save(&self, state: &AppState) -> anyhow::Result<()> {
        debug!(file = %self.state_path.display(), "saving state atomically");

        let dir = self.state_path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut temp, state)?;
        writeln!(temp)?;
        temp.flush()?;

        temp.persist(&self.state_path)
            .map_err(|err| anyhow!("failed to persist {}: {}", self.state_path.display(), err))?;

        Ok(())
    }

    /// Loads, applies `f`, and saves the result.
    pub fn update<T>(&self, f: impl FnOnce(&mut AppState) -> anyhow::Result<T>) -> anyhow::Result<T> {
        let mut state = self.load()?;
        let out = f(&mut state)?;
        self.save(&state)?;
        Ok(out)
    }
}
