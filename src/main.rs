use anyhow::Result;
use std::path::PathBuf;

use feedstash::config::Config;
use feedstash::db::Database;
use feedstash::{importer, logging};

struct Args {
    csv_path: PathBuf,
    config_path: Option<PathBuf>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut csv_path = PathBuf::from("usernames.csv");
    let mut config_path = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("feedstash {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            other if !other.starts_with('-') => {
                csv_path = PathBuf::from(other);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    Args { csv_path, config_path }
}

fn print_help() {
    println!(
        r#"feedstash - import account handles from a CSV into the local store

USAGE:
    feedstash [OPTIONS] [CSV_PATH]

ARGS:
    CSV_PATH            Input CSV with 'Name' and 'username' columns
                        (default: usernames.csv)

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    FEEDSTASH_CONFIG    Path to config file (overrides default location)
    FEEDSTASH_LOG       Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/feedstash/config.toml

See also: feedstash-worker --help"#
    );
}

fn main() -> Result<()> {
    let args = parse_args();

    let _ = logging::init(Some(Config::config_dir().join("logs")));

    let config = match args.config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    let db = Database::open(&config.db_path)?;
    db.initialize()?;

    let summary = importer::import_csv(&db, &args.csv_path)?;
    println!(
        "{} new accounts added ({} duplicates skipped, {} empty handles skipped)",
        summary.added, summary.skipped_duplicates, summary.skipped_empty
    );

    Ok(())
}
