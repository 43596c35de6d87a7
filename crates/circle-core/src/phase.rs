use std::fmt;

use serde::{
  Deserialize,
  Serialize
};

/// Named segment of a menstrual cycle,
/// derived from the cycle day.
#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
  Menstrual,
  Follicular,
  Ovulation,
  Luteal,
  LateLuteal
}

impl CyclePhase {
  pub const ALL: [CyclePhase; 5] = [
    CyclePhase::Menstrual,
    CyclePhase::Follicular,
    CyclePhase::Ovulation,
    CyclePhase::Luteal,
    CyclePhase::LateLuteal
  ];

  #[must_use]
  pub fn id(self) -> &'static str {
    match self {
      | CyclePhase::Menstrual => {
        "menstrual"
      }
      | CyclePhase::Follicular => {
        "follicular"
      }
      | CyclePhase::Ovulation => {
        "ovulation"
      }
      | CyclePhase::Luteal => "luteal",
      | CyclePhase::LateLuteal => {
        "late_luteal"
      }
    }
  }

  #[must_use]
  pub fn label(self) -> &'static str {
    match self {
      | CyclePhase::Menstrual => {
        "Menstrual Phase"
      }
      | CyclePhase::Follicular => {
        "Follicular Phase"
      }
      | CyclePhase::Ovulation => {
        "Ovulation"
      }
      | CyclePhase::Luteal => {
        "Luteal Phase"
      }
      | CyclePhase::LateLuteal => {
        "Late Luteal"
      }
    }
  }

  #[must_use]
  pub fn insight(self) -> &'static str {
    match self {
      | CyclePhase::Menstrual => {
        "Take it easy today. Your body \
         is doing important work. Rest \
         and hydrate!"
      }
      | CyclePhase::Follicular => {
        "Estrogen levels are rising. \
         You might notice a boost in \
         energy and clearer skin today!"
      }
      | CyclePhase::Ovulation => {
        "You're at peak energy and \
         fertility. Great time for \
         social activities!"
      }
      | CyclePhase::Luteal => {
        "Progesterone is rising. You \
         might start craving comfort \
         foods."
      }
      | CyclePhase::LateLuteal => {
        "Your period is approaching. Be \
         gentle with yourself and \
         prioritize self-care."
      }
    }
  }
}

impl fmt::Display for CyclePhase {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.id())
  }
}

/// Maps a cycle day onto its phase.
///
/// Bands use absolute day numbers; only
/// the luteal/late-luteal boundary moves
/// with `cycle_length`. The first
/// matching band wins, so short cycles
/// can leave the luteal band empty.
#[must_use]
pub fn phase_of(
  cycle_day: i64,
  cycle_length: u32
) -> CyclePhase {
  let late_luteal_start =
    i64::from(cycle_length) - 3;
  if cycle_day <= 5 {
    CyclePhase::Menstrual
  } else if cycle_day <= 13 {
    CyclePhase::Follicular
  } else if cycle_day <= 16 {
    CyclePhase::Ovulation
  } else if cycle_day
    <= late_luteal_start
  {
    CyclePhase::Luteal
  } else {
    CyclePhase::LateLuteal
  }
}

#[must_use]
pub fn phase_label(
  phase: CyclePhase
) -> &'static str {
  phase.label()
}

#[must_use]
pub fn phase_insight(
  phase: CyclePhase
) -> &'static str {
  phase.insight()
}
