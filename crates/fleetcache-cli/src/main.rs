//! fleetcache - command-line front end for the fleet-maintenance API.
//!
//! Lists are served from the network when reachable and from the local
//! cache otherwise. Records created or edited while offline are queued and
//! uploaded by `fleetcache sync`.

mod commands;

use std::io;
use std::path::Path;

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fleetcache_core::Config;

const USAGE: &str = "\
Usage: fleetcache <command> [args]

Commands:
  list <collection> [--page N] [--limit N]   contacts, vehicules, interventions, users, paramappli
  pending [collection]                      show queued records
  new-intervention <json>                   queue a new intervention
  edit <collection> <json>                  queue an edit (JSON must carry the record id)
  discard <collection> <local-id>           drop a queued record
  sync                                      upload queued records
  status                                    connectivity, queue and storage summary
  chat <intervention-id> [message]          show or post chat messages
  instructions <intervention-id>            show the instruction checklist
  params                                    show application parameters
  offline on|off                            force offline mode";

/// Log file prefix inside `<cache_dir>/logs`
const LOG_FILE_PREFIX: &str = "fleetcache.log";

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG to control the level (e.g., RUST_LOG=fleetcache_core=debug).
/// Besides stderr, events go to a daily log file; the returned guard
/// flushes it on drop.
fn init_tracing(cache_dir: &Path) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_dir = cache_dir.join("logs");
    let (file_layer, guard) = match std::fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: could not read config ({}), using defaults", e);
            Config::default()
        }
    };
    let cache_dir = config.cache_dir()?;
    let _guard = init_tracing(&cache_dir);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };
    if command == "-h" || command == "--help" || command == "help" {
        println!("{}", USAGE);
        return Ok(());
    }

    info!(command = %command, api = %config.api_base_url, "fleetcache starting");
    commands::run(config, &cache_dir, command, &args[1..]).await
}
