pub mod aggregate;
pub mod api;
pub mod board;
pub mod categories;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod model;
pub mod realtime;
pub mod reconcile;
pub mod remote;
pub mod render;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::info;

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let cli = cli::GlobalCli::parse_from(raw_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(verbose = cli.verbose, quiet = cli.quiet, "starting tempo CLI");

    let mut cfg = config::Config::load(cli.config.as_deref())?;
    cfg.apply_overrides(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value)));

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let state = datastore::StateDir::open(&data_dir).with_context(|| {
        format!("failed to open state directory at {}", data_dir.display())
    })?;

    let mut renderer = render::Renderer::new(&cfg)?;

    commands::dispatch(&cfg, &state, &mut renderer, cli.command)?;

    info!("done");
    Ok(())
}
