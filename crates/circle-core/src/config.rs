use std::collections::{
  BTreeMap,
  HashSet
};
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::calendar::WeekStart;
use crate::cycle::DEFAULT_PERIOD_LENGTH;

const RC_ENV_VAR: &str = "CIRCLERC";
const RC_FILE_NAME: &str = ".circlerc";

/// Flat `key=value` settings layered
/// from defaults, an rc file and
/// command-line overrides.
#[derive(Debug, Clone)]
pub struct Config {
  map:              BTreeMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = BTreeMap::new();
    for (key, value) in [
      ("data.location", "~/.circle"),
      ("default.command", "status"),
      ("color", "on"),
      ("calendar.weekstart", "sunday")
    ] {
      map.insert(
        key.to_string(),
        value.to_string()
      );
    }
    map.insert(
      "period.length".to_string(),
      DEFAULT_PERIOD_LENGTH.to_string()
    );

    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading circlerc");
      cfg.load_file(
        &path,
        &mut HashSet::new()
      )?;
    } else {
      debug!(
        "no circlerc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn get_u32(
    &self,
    key: &str
  ) -> anyhow::Result<Option<u32>> {
    self
      .map
      .get(key)
      .map(|raw| {
        raw.trim().parse::<u32>().with_context(
          || {
            format!(
              "config {key} must be a \
               whole number, got {raw:?}"
            )
          }
        )
      })
      .transpose()
  }

  pub fn period_length(
    &self
  ) -> anyhow::Result<u32> {
    Ok(
      self
        .get_u32("period.length")?
        .unwrap_or(DEFAULT_PERIOD_LENGTH)
    )
  }

  pub fn week_start(
    &self
  ) -> anyhow::Result<WeekStart> {
    match self.map.get("calendar.weekstart")
    {
      | Some(raw) => WeekStart::parse(raw),
      | None => Ok(WeekStart::Sunday)
    }
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  #[tracing::instrument(skip(self))]
  /// `active` holds the canonical paths
  /// of files currently being read, so
  /// an include chain that loops back is
  /// an error.
  fn load_file(
    &mut self,
    path: &Path,
    active: &mut HashSet<PathBuf>
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let canonical =
      fs::canonicalize(&path)
        .with_context(|| {
          format!(
            "failed to resolve {}",
            path.display()
          )
        })?;
    if !active.insert(canonical.clone())
    {
      return Err(anyhow!(
        "include cycle at {}",
        path.display()
      ));
    }

    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let line = raw_line
        .split_once('#')
        .map_or(raw_line, |(before, _)| {
          before
        })
        .trim();
      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self.load_file(
            &include_path,
            active
          )?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    active.remove(&canonical);
    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir() else {
    warn!(
      "cannot determine home \
       directory; skipping circlerc"
    );
    return Ok(None);
  };
  let candidate = home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".circle"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let expanded =
    expand_tilde(Path::new(include));
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::Config;
  use crate::calendar::WeekStart;

  #[test]
  fn defaults_without_rc_file() {
    let cfg = Config::default();
    assert_eq!(
      cfg.get("default.command")
        .as_deref(),
      Some("status")
    );
    assert_eq!(
      cfg.period_length()
        .expect("period length"),
      5
    );
    assert_eq!(
      cfg.week_start()
        .expect("week start"),
      WeekStart::Sunday
    );
    assert_eq!(
      cfg.get_bool("color"),
      Some(true)
    );
  }

  #[test]
  fn loads_rc_file_with_includes() {
    let temp = tempdir().expect("tempdir");
    let extra = temp.path().join("extra.rc");
    fs::write(
      &extra,
      "calendar.weekstart=monday\n"
    )
    .expect("write include");
    let rc = temp.path().join("circlerc");
    fs::write(
      &rc,
      "# personal settings\n\
       period.length = 4  # shorter\n\
       include extra.rc\n\
       color=off\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(rc.as_path()))
      .expect("load config");
    assert_eq!(cfg.loaded_files.len(), 2);
    assert_eq!(
      cfg.period_length()
        .expect("period length"),
      4
    );
    assert_eq!(
      cfg.week_start()
        .expect("week start"),
      WeekStart::Monday
    );
    assert_eq!(
      cfg.get_bool("color"),
      Some(false)
    );
  }

  #[test]
  fn overrides_win_and_bad_numbers_error()
  {
    let mut cfg = Config::default();
    cfg.apply_overrides([(
      "rc.period.length".to_string(),
      "seven".to_string()
    )]);
    assert!(cfg.period_length().is_err());

    cfg.apply_overrides([(
      "period.length".to_string(),
      "7".to_string()
    )]);
    assert_eq!(
      cfg.period_length()
        .expect("period length"),
      7
    );
  }

  #[test]
  fn include_cycles_are_errors() {
    let temp = tempdir().expect("tempdir");
    let rc = temp.path().join("circlerc");
    fs::write(&rc, "include circlerc\n")
      .expect("write rc");
    let err =
      Config::load(Some(rc.as_path()))
        .expect_err("self include");
    assert!(
      format!("{err:#}")
        .contains("include cycle")
    );

    let a = temp.path().join("a.rc");
    let b = temp.path().join("b.rc");
    fs::write(&a, "color=off\ninclude b.rc\n")
      .expect("write a");
    fs::write(&b, "include a.rc\n")
      .expect("write b");
    assert!(
      Config::load(Some(a.as_path()))
        .is_err()
    );
  }

  #[test]
  fn shared_include_is_not_a_cycle() {
    let temp = tempdir().expect("tempdir");
    let common =
      temp.path().join("common.rc");
    fs::write(&common, "period.length=6\n")
      .expect("write common");
    let first =
      temp.path().join("first.rc");
    fs::write(&first, "include common.rc\n")
      .expect("write first");
    let rc = temp.path().join("circlerc");
    fs::write(
      &rc,
      "include first.rc\ninclude common.rc\n"
    )
    .expect("write rc");

    let cfg =
      Config::load(Some(rc.as_path()))
        .expect("load config");
    assert_eq!(cfg.loaded_files.len(), 4);
    assert_eq!(
      cfg.period_length()
        .expect("period length"),
      6
    );
  }

  #[test]
  fn rejects_lines_without_equals() {
    let temp = tempdir().expect("tempdir");
    let rc = temp.path().join("circlerc");
    fs::write(&rc, "color on\n")
      .expect("write rc");
    assert!(Config::load(Some(rc.as_path())).is_err());
  }
}
