pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod cycle;
pub mod datetime;
pub mod phase;
pub mod render;
pub mod state;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use calendar::{
  CalendarQuery,
  DayKind,
  MonthGrid,
  classify_day,
  month_grid
};
pub use cycle::{
  CycleConfig,
  CycleConfigError,
  CycleStatus,
  cycle_day_of,
  days_until_period,
  progress_percent
};
pub use phase::{
  CyclePhase,
  phase_insight,
  phase_label,
  phase_of
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting circle CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.circlerc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store =
    state::StateStore::open(&data_dir)
      .with_context(|| {
        format!(
          "failed to open state store \
           at {}",
          data_dir.display()
        )
      })?;

  let tz = datetime::resolve_timezone(
    &cfg, &data_dir
  );
  let clock_today =
    datetime::today(tz.as_ref());
  let today = match cli.today.as_deref()
  {
    | Some(expr) => {
      datetime::parse_date_expr(
        expr,
        clock_today
      )
      .context("invalid --today value")?
    }
    | None => clock_today
  };
  debug!(%today, "resolved today");

  let renderer =
    render::Renderer::new(&cfg);
  let inv = cli::Invocation::parse(
    &cfg, cli.rest
  )?;

  let session = commands::Session {
    store: &store,
    cfg: &cfg,
    renderer: &renderer,
    today,
    json: cli.json
  };
  commands::dispatch(&session, inv)?;

  info!("done");
  Ok(())
}
