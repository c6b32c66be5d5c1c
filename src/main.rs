//! turnline - demo turn driver
//!
//! Usage:
//!   turnline                         → read lines from stdin, print one JSON turn per line
//!   turnline --config turnline.toml  → load [queue] and [driver] settings
//!   turnline --events                → also print every queue event to stderr
//!
//! Input lines: `/approve <text>`, `/overlay <text>`, `/notify <text>`,
//! `/paste <text>`, `/clear`; anything else is a user message.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turnline::{Settings, Turn, TurnDriver};
use turnline_queue::{BroadcastObserver, FanoutObserver, QueueRuntime, TracingObserver};

#[derive(Parser)]
#[command(
    name = "turnline",
    about = "Bounded turn queue demo - batches stdin input into agent turns",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Soft queue limit (overrides config)
    #[arg(long)]
    max_items: Option<usize>,

    /// Hard queue ceiling (overrides config)
    #[arg(long)]
    hard_max_items: Option<usize>,

    /// Simulated turn length in milliseconds (overrides config)
    #[arg(long)]
    turn_ms: Option<u64>,

    /// Print every queue event as JSON to stderr
    #[arg(long, default_value_t = false)]
    events: bool,

    /// Write logs to a file (in addition to stderr)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print the effective config as TOML and exit
    #[arg(long, default_value_t = false)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_deref())?;

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(max_items) = cli.max_items {
        settings.queue.max_items = max_items;
    }
    if let Some(hard_max_items) = cli.hard_max_items {
        settings.queue.hard_max_items = Some(hard_max_items);
    }
    if let Some(turn_ms) = cli.turn_ms {
        settings.driver.turn_ms = turn_ms;
    }

    if cli.print_config {
        print!("{}", settings.to_toml());
        return Ok(());
    }

    let (broadcast, _events_tx) = BroadcastObserver::new(256);
    if cli.events {
        let mut events = broadcast.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(json) => eprintln!("{}", json),
                        Err(e) => tracing::warn!("Failed to encode queue event: {}", e),
                    },
                    Err(RecvError::Lagged(n)) => tracing::warn!("Event printer lagged by {}", n),
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    let observer = FanoutObserver::new().with(TracingObserver).with(broadcast);
    let runtime = QueueRuntime::try_new(settings.queue.clone(), observer)?;
    tracing::info!(
        "turnline started: max_items={}, hard_max_items={}, turn_ms={}",
        runtime.max_items(),
        runtime.hard_max_items(),
        settings.driver.turn_ms
    );

    run(TurnDriver::new(runtime), &settings).await
}

async fn run(mut driver: TurnDriver, settings: &Settings) -> anyhow::Result<()> {
    let turn_length = Duration::from_millis(settings.driver.turn_ms);
    let mut ticker = tokio::time::interval(Duration::from_millis(settings.driver.poll_ms.max(1)));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut turn_ends: Option<Instant> = None;

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    driver.submit(&line);
                }
                None => break,
            },
            _ = ticker.tick() => {
                if turn_ends.is_some_and(|end| Instant::now() >= end) {
                    driver.finish_turn();
                    turn_ends = None;
                }
                if let Some(turn) = driver.poll() {
                    emit(&turn)?;
                    turn_ends = Some(Instant::now() + turn_length);
                }
            }
        }
    }

    tracing::info!("Input closed, flushing {} queued item(s)", driver.runtime().len());
    for turn in driver.shutdown() {
        emit(&turn)?;
    }
    Ok(())
}

fn emit(turn: &Turn) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(turn)?);
    Ok(())
}

fn init_tracing(log_file: Option<&std::path::Path>) -> anyhow::Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("log file path has no file name: {}", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, name);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(appender),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "turnline=info,turnline_queue=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}
