mod app;
mod cache;
mod commands;
mod config;
mod event;
mod logging;
mod net;
mod worker;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "swcache")]
#[command(about = "Offline cache worker: cache-first requests, push notifications and background sync")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/swcache/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Debug logging (RUST_LOG overrides)
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.logging, args.verbose)?;

  // One worker per process start
  let app = app::App::new(&config)?;
  app.run(args.command).await?;

  Ok(())
}
