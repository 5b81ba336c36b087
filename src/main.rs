mod commands;
mod config;
mod event;
mod logging;
mod remote;
mod store;
mod sync;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use tracing::debug;

use remote::HttpBackend;
use store::SqliteStore;
use sync::SyncEngine;

#[derive(Parser, Debug)]
#[command(name = "shiftsync")]
#[command(about = "Offline-first attendance and shift requests")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/shiftsync/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Do not contact the backend; writes go straight to the queue
  #[arg(long, global = true)]
  offline: bool,

  /// Log debug output to stderr
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init(args.verbose);

  let config = config::Config::load(args.config.as_deref())?;

  let store = match &config.storage.path {
    Some(path) => SqliteStore::at_path(path.clone()),
    None => SqliteStore::open_default(),
  };
  debug!(path = ?store.path(), "Using local store");

  let backend = HttpBackend::new(&config)?;
  let engine = SyncEngine::new(store, backend, config.sync.settings());

  commands::run(&engine, args.command, args.offline).await
}
