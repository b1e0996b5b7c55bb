//! Venue console: logs into a venue through the host surface and streams quote
//! topics to the log until Ctrl+C.
//!
//! Usage example (CLI):
//! ```bash
//! venue_cli --topics ./entities.txt --field BidPrice1 --orders-demo
//! ```
//!
//! The entity file holds one `EXCHANGE,COMMODITY,CONTRACT` (or `EXCHANGE,INSTRUMENT`)
//! per line; blank lines and `#` comments are skipped. Without `--config` the
//! embedded simulated venue is used.
#![warn(missing_docs)]
mod args;
mod sim;

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Local;
use clap::Parser;
use crossbeam_channel::{Receiver, Select};
use log::{error, info, warn};
use venue_common::config::{load_config, load_default_config};
use venue_common::instruments::{EntityKey, EntityParser, PositionEffect};
use venue_common::{Result, VenueConfig, VenueError};
use venue_session::quotes::TopicUpdate;
use venue_session::sink::JsonLinesSink;
use venue_session::{Alert, HostSurface, HostValue, SessionController};

use crate::args::Args;
use crate::sim::SimConnector;

const DEFAULT_ENTITIES: [&str; 2] = ["CME,ES,2412", "CME,NQ,2412"];

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("Ctrl+C received. Shutting down...");
            shutdown.store(true, Ordering::SeqCst);
        })
        .expect("Error setting Ctrl+C handler");
    }

    let config = read_config(&args)?;
    let entities = read_entities(&args)?;
    info!("Venue: {} ({})", config.name, config.host.address());
    info!("Entities: {:?}", entities.iter().map(ToString::to_string).collect::<Vec<_>>());

    let connector = Arc::new(SimConnector::new(config.position_policy, config.market_depth));
    let session = match &args.journal {
        Some(path) => {
            let sink = Arc::new(JsonLinesSink::open(normalize_path(path))?);
            SessionController::with_sink(config, connector, sink, Local::now().date_naive())?
        }
        None => SessionController::new(config, connector)?,
    };
    let session = Arc::new(session);
    let alerts = session.alerts();
    let host = HostSurface::new(Arc::clone(&session));

    match host.login() {
        Ok(value) => info!("{}", render(&value)),
        Err(message) => {
            error!("{}", message);
            return Err(VenueError::Login(message));
        }
    }

    let mut topics: Vec<Receiver<TopicUpdate>> = Vec::new();
    for entity in &entities {
        match host.quote_details(&entity.to_string(), &args.field) {
            Ok(subscription) => {
                if let Some(initial) = &subscription.initial {
                    info!("QUOTE: {} {}={} (cached)", entity, args.field, initial);
                }
                topics.push(subscription.updates);
            }
            Err(message) => warn!("{}: {}", entity, message),
        }
    }

    if args.orders_demo {
        run_orders_demo(&host, &entities);
    }

    info!("Streaming {} topics. Press Ctrl+C to exit.", topics.len());
    stream_until_shutdown(&topics, &alerts, &shutdown);

    match host.logout() {
        Ok(value) => info!("{}", render(&value)),
        Err(message) => warn!("{}", message),
    }
    Ok(())
}

fn read_config(args: &Args) -> Result<VenueConfig> {
    match &args.config {
        Some(raw) => {
            let path = normalize_path(raw);
            if !is_file_exist(&path) {
                return Err(VenueError::Config(format!("config file {} not found", path.display())));
            }
            load_config(path)
        }
        None => load_default_config(),
    }
}

fn read_entities(args: &Args) -> Result<Vec<EntityKey>> {
    match &args.topics {
        Some(raw) => {
            let path = normalize_path(raw);
            if !is_file_exist(&path) {
                return Err(VenueError::Config(format!("entity file {} not found", path.display())));
            }
            EntityKey::parse_from_reader(BufReader::new(File::open(path)?))
        }
        None => DEFAULT_ENTITIES.iter().map(|e| e.parse()).collect(),
    }
}

fn run_orders_demo(host: &HostSurface, entities: &[EntityKey]) {
    let Some(entity) = entities.first() else {
        return;
    };
    let code = entity.to_string();
    report("send order", host.send_order(&code, true, true, 0.0, 2, PositionEffect::Open));
    report("send order", host.send_order(&code, true, false, 0.0, 1, PositionEffect::Cover));
    report("cancel order", host.cancel_order("SIM000000"));
    // Give the simulated venue a moment to push fills and positions.
    std::thread::sleep(Duration::from_millis(200));
    report("orders", host.query_orders());
    report("fills", host.query_fills());
    report("positions", host.position_summary());
    report("funds", host.fund_summary());
}

fn report(what: &str, result: std::result::Result<HostValue, String>) {
    match result {
        Ok(value) => info!("{}: {}", what, render(&value)),
        Err(message) => warn!("{}: {}", what, message),
    }
}

fn render(value: &HostValue) -> String {
    match value {
        HostValue::Text(text) => text.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|e| format!("<unprintable: {}>", e)),
    }
}

fn stream_until_shutdown(topics: &[Receiver<TopicUpdate>], alerts: &Receiver<Alert>, shutdown: &AtomicBool) {
    let mut live: Vec<&Receiver<TopicUpdate>> = topics.iter().collect();

    while !shutdown.load(Ordering::Relaxed) {
        let mut select = Select::new();
        for rx in live.iter().copied() {
            select.recv(rx);
        }
        let alert_index = select.recv(alerts);

        let operation = match select.select_timeout(Duration::from_millis(500)) {
            Ok(operation) => operation,
            Err(_) => continue,
        };
        let index = operation.index();
        if index == alert_index {
            match operation.recv(alerts) {
                Ok(alert) => warn!("{}", alert),
                Err(_) => {
                    error!("Alert channel closed");
                    break;
                }
            }
            continue;
        }
        match operation.recv(live[index]) {
            Ok(update) => info!("QUOTE: {} {}={}", update.entity, update.field, update.value),
            Err(_) => {
                warn!("Topic stream closed");
                live.remove(index);
            }
        }
    }
    info!("Streaming loop stopping...");
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

/// Normalize a CLI-provided path string by trimming whitespace and matching quotes.
///
/// This allows passing Windows paths in quotes without breaking parsing.
fn normalize_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    let no_quotes = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    PathBuf::from(no_quotes)
}

/// Returns `true` if the provided path exists and is a regular file.
fn is_file_exist(path: &PathBuf) -> bool {
    path.exists() && path.is_file()
}
