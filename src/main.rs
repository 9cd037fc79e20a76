use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sensorwatch::data::duration::{format_duration, parse_duration};
use sensorwatch::ingest::format_summary_line;
use sensorwatch::server::{self, ServerState};
use sensorwatch::{
    App, Ingestor, Poller, QueryService, Settings, SqliteStore, SqliteWriter, StatusFeed,
};

#[derive(Parser, Debug)]
#[command(name = "sensorwatch")]
#[command(about = "Live sensor dashboard backend: MQTT status merged with polled SQLite history")]
struct Args {
    /// Path to a TOML settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the SQLite reading store (overrides store.path)
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the store, follow the status feed and serve the HTTP API (default)
    Serve {
        /// Address to listen on (e.g., "0.0.0.0:3000")
        #[arg(short, long)]
        bind: Option<String>,

        /// Poll interval (e.g., "2s", "500ms")
        #[arg(short, long)]
        interval: Option<String>,

        /// History window (e.g., "24h", "90m")
        #[arg(short, long)]
        window: Option<String>,
    },

    /// Run one query and print the result as JSON
    Query {
        /// History window (e.g., "24h", "90m")
        #[arg(short, long)]
        window: Option<String>,

        /// Write the JSON to this file instead of stdout
        #[arg(short, long)]
        export: Option<PathBuf>,
    },

    /// Print per-sensor reading counts and value ranges
    Summary,

    /// Record readings from the broker into the store
    Ingest,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref()).context("loading settings")?;
    if let Some(store) = args.store {
        settings.store.path = store;
    }

    init_tracing(&settings.logging.level);

    let command = args.command.unwrap_or(Command::Serve {
        bind: None,
        interval: None,
        window: None,
    });

    match command {
        Command::Serve {
            bind,
            interval,
            window,
        } => {
            if let Some(interval) = interval {
                let interval = parse_duration(&interval)?;
                anyhow::ensure!(!interval.is_zero(), "poll interval must be positive");
                settings.poller.interval_ms = (interval.as_millis() as u64).max(1);
            }
            let window = window.as_deref().map(parse_duration).transpose()?;
            if let Some(bind) = bind {
                settings.server.bind = bind;
            }
            run_server(settings, window).await
        }
        Command::Query { window, export } => {
            let window = window.as_deref().map(parse_duration).transpose()?;
            run_query(&settings, window, export.as_deref()).await
        }
        Command::Summary => run_summary(&settings).await,
        Command::Ingest => run_ingest(&settings).await,
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn query_service(settings: &Settings, window: Option<Duration>) -> QueryService {
    let mut options = settings.query_options();
    if let Some(window) = window {
        options.window = window;
    }
    QueryService::new(Arc::new(SqliteStore::new(&settings.store.path)), options)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

/// Serve the API until Ctrl+C, then stop the poller and close the feed.
async fn run_server(settings: Settings, window: Option<Duration>) -> Result<()> {
    settings.log_summary();

    let service = query_service(&settings, window);
    let poller = Poller::new(service.clone(), settings.poll_interval()).start();

    let feed_config = settings.feed_config();
    let feed = StatusFeed::connect(&feed_config);
    if let Ok(feed) = &feed {
        if let Err(e) = feed.wait_connected(feed_config.connect_timeout).await {
            tracing::warn!("Status feed not connected yet ({}); retrying in background", e);
        }
    }

    let app = Arc::new(App::new(feed, poller, settings.query.last_update));
    let state = ServerState {
        query: service,
        app: Arc::clone(&app),
    };

    let served = server::serve(&settings.server.bind, state, shutdown_signal()).await;
    app.shutdown().await;
    served.with_context(|| format!("serving on {}", settings.server.bind))
}

/// One-shot query, printed or exported as JSON.
async fn run_query(settings: &Settings, window: Option<Duration>, export: Option<&Path>) -> Result<()> {
    let service = query_service(settings, window);
    let response = service.query().await?;
    let json = serde_json::to_string_pretty(&response)?;

    match export {
        Some(path) => {
            std::fs::write(path, json)?;
            eprintln!(
                "Exported {} sensors ({} window) to {}",
                response.sensors.len(),
                format_duration(service.options().window),
                path.display()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn run_summary(settings: &Settings) -> Result<()> {
    let rows = query_service(settings, None).summary().await?;
    if rows.is_empty() {
        println!("No readings stored");
    }
    for row in &rows {
        println!("{}", format_summary_line(row));
    }
    Ok(())
}

/// Subscribe to reading topics and record them until Ctrl+C.
async fn run_ingest(settings: &Settings) -> Result<()> {
    settings.log_summary();

    let writer = Arc::new(SqliteWriter::create(&settings.store.path).await?);
    let reader = Arc::new(SqliteStore::new(&settings.store.path));

    let stored = Ingestor::new(writer.clone())
        .with_summary(reader)
        .run(
            &settings.feed_config(),
            settings.summary_interval(),
            shutdown_signal(),
        )
        .await?;

    writer.close().await;
    tracing::info!("Ingest finished, {} readings stored", stored);
    Ok(())
}
