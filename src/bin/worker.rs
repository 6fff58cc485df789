//! Feedstash worker: drains the pending account queue.
//!
//! Claims one `Pending` account at a time, runs the configured downloader
//! for its handle, files the staged images into the shared folder, records
//! per-image metadata, and marks the account `Done` or `Failed`. Exits when
//! nothing is left to process.
//!
//! ## Usage
//!
//! ```bash
//! feedstash-worker           # Drain the queue, sleeping between accounts
//! feedstash-worker --once    # Process a single account and exit
//! ```

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use feedstash::config::Config;
use feedstash::db::Database;
use feedstash::fetch::CommandFetcher;
use feedstash::logging;
use feedstash::worker::{Worker, WorkerSettings};

struct Args {
    once: bool,
    interval: Option<u64>,
    config_path: Option<PathBuf>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut once = false;
    let mut interval = None;
    let mut config_path = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--once" | "-1" => {
                once = true;
            }
            "--interval" | "-i" => {
                if i + 1 < args.len() {
                    if let Ok(secs) = args[i + 1].parse() {
                        interval = Some(secs);
                    }
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--version" | "-V" => {
                println!("feedstash-worker {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    Args { once, interval, config_path }
}

fn print_help() {
    println!(
        r#"feedstash-worker - process pending accounts from the store

USAGE:
    feedstash-worker [OPTIONS]

OPTIONS:
    --once, -1          Process at most one account and exit
    --interval, -i N    Delay between accounts in seconds (default: 300)
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    FEEDSTASH_CONFIG    Path to config file (overrides default location)
    FEEDSTASH_LOG       Log level (trace, debug, info, warn, error)

For each claimed account the worker runs the configured downloader, copies
the staged images into the shared folder, appends metadata rows, and marks
the account Done or Failed. Failed accounts are not retried."#
    );
}

fn main() -> Result<()> {
    let args = parse_args();

    let _ = logging::init(Some(Config::config_dir().join("logs")));

    let config = match args.config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    // Store-initialization failure is the one fatal path.
    let db = Database::open(&config.db_path)?;
    db.initialize()?;
    info!("account store opened at {:?}", config.db_path);

    let fetcher = CommandFetcher::new(&config.fetch);

    let mut settings = WorkerSettings::from_config(&config);
    settings.once = args.once;
    if let Some(secs) = args.interval {
        settings.delay = Duration::from_secs(secs);
    }

    Worker::new(db, fetcher, settings).run()
}
