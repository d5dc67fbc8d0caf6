//! statewatch replay tool
//!
//! Loads a set of filters, replays a JSON-lines file of state-change events
//! through the engine and prints one JSON line per match.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::Duration;

use statewatch::{EngineConfig, FilterSpec, Logger, StateChangeEvent, WatchEngine};
use tracing_subscriber::EnvFilter;

/// Replay configuration
struct Config {
    /// JSON array of filters
    filters: PathBuf,
    /// JSON-lines event file
    events: PathBuf,
    /// Optional engine configuration file
    engine: Option<PathBuf>,
}

fn usage() {
    println!("statewatch-replay - replay state-change events against filters");
    println!();
    println!("USAGE:");
    println!("    statewatch-replay --filters <FILE> --events <FILE> [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -f, --filters <FILE>      JSON array of filter objects");
    println!("    -e, --events <FILE>       One state-change event per line");
    println!("    -c, --config <FILE>       Engine configuration (JSON)");
    println!("    -h, --help                Print help information");
    println!();
    println!("Diagnostics go to stderr; set RUST_LOG to adjust (default: warn).");
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut filters = None;
    let mut events = None;
    let mut engine = None;

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--filters" | "-f" | "--events" | "-e" | "--config" | "-c" => {
                let Some(value) = args.get(i + 1) else {
                    eprintln!("error: {flag} requires a value");
                    std::process::exit(1);
                };
                let path = Some(PathBuf::from(value));
                match flag {
                    "--filters" | "-f" => filters = path,
                    "--events" | "-e" => events = path,
                    _ => engine = path,
                }
                i += 2;
            }
            "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                std::process::exit(1);
            }
        }
    }

    match (filters, events) {
        (Some(filters), Some(events)) => Config { filters, events, engine },
        _ => {
            eprintln!("error: --filters and --events are required (see --help)");
            std::process::exit(1);
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = parse_args();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .finish();
    let logger = Logger::from_subscriber(subscriber);

    let engine_config = match &config.engine {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let engine = WatchEngine::with_logger(engine_config, logger);

    let raw: Vec<serde_json::Value> = serde_json::from_reader(BufReader::new(File::open(&config.filters)?))?;
    for (idx, value) in raw.into_iter().enumerate() {
        let filter = FilterSpec::from_json(value).map_err(|e| format!("filter #{idx}: {e}"))?;
        engine.subscribe(filter, |event, ctx| {
            let line = serde_json::json!({
                "subscription": ctx.subscription_id().get(),
                "id": event.id,
            });
            println!("{line}");
            Ok(())
        });
    }

    let reader = BufReader::new(File::open(&config.events)?);
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: StateChangeEvent =
            serde_json::from_str(&line).map_err(|e| format!("events line {}: {e}", lineno + 1))?;
        // Offline replay: dispatch inline so no event is dropped at intake.
        engine.dispatch(&event);
    }

    if !engine.wait_idle(Duration::from_secs(30)) {
        eprintln!("warning: handlers still busy after 30s");
    }

    let stats = engine.stats();
    eprintln!("{}", serde_json::to_string(&stats)?);
    Ok(())
}
