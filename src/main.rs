use anyhow::{Context, Result};
use clap::Parser;
use std::io;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use slotplug::config::Config;
use slotplug::plugins::{NativeLibraries, PluginSlotTable};
use slotplug::repl::{self, Host};

/// Slotplug - load shared-library plugins into slots and run them
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Refuse to load into an occupied slot instead of leaking its module
    #[arg(long)]
    strict_overwrite: bool,

    /// Plugins to load into the next free slots at start-up
    preload: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the driver's own output
    let log_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    let mut config = if let Some(config_path) = &args.config {
        Config::load_from_file(config_path)?
    } else {
        Config::load_default()?
    };
    if args.strict_overwrite {
        config.slots.leak_on_overwrite = false;
    }
    config.validate()?;

    let table = PluginSlotTable::new(NativeLibraries::new(), config.slots.capacity)
        .with_leak_on_overwrite(config.slots.leak_on_overwrite);
    let mut host = Host::new(table, config.unload_on_exit);
    info!(
        "Plugin host ready with {} slots (leak on overwrite: {})",
        config.slots.capacity, config.slots.leak_on_overwrite
    );

    let mut stdout = io::stdout();
    for entry in &config.autoload {
        host.load_into(&entry.path, entry.slot, &mut stdout)?;
    }
    for path in &args.preload {
        host.load_into(path, None, &mut stdout)?;
    }

    repl::run_interactive(&mut host, &config.repl)
}
