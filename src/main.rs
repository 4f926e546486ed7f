//! SmartSync inference CLI
//!
//! Runs schedule predictions and anomaly scans against a local dataset.

use anyhow::Context;
use clap::{Parser, Subcommand};
use smartsync_inference::{config::Config, Pipeline, VERSION};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "smartsync-inference")]
#[command(author = "SmartSync")]
#[command(version = VERSION)]
#[command(about = "Schedule prediction and anomaly alerts for SmartSync homes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict fan and light schedules for a user
    Predict {
        /// User to predict for
        #[arg(long, short)]
        user: String,

        /// Print the suggestions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check whether a user's sensor history is fit for prediction
    Validate {
        /// User to validate
        #[arg(long, short)]
        user: String,
    },

    /// Run one anomaly scan over active users
    Scan {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run anomaly scans on the configured interval until Ctrl+C
    Watch {
        /// Override the scan interval in seconds
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Serve the prediction entrypoint over HTTP (requires server feature)
    Serve {
        /// Port to bind (defaults to the configured port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show pipeline statistics
    Stats,

    /// Show configuration
    Config,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Predict { user, json } => cmd_predict(&user, json).await,
        Commands::Validate { user } => cmd_validate(&user).await,
        Commands::Scan { json } => cmd_scan(json).await,
        Commands::Watch { interval } => cmd_watch(interval).await,
        Commands::Serve { port } => cmd_serve(port).await,
        Commands::Stats => cmd_stats(),
        Commands::Config => cmd_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn load_pipeline() -> anyhow::Result<Pipeline> {
    let config = Config::load().context("loading configuration")?;
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    Pipeline::from_config(config)
}

async fn cmd_predict(user: &str, json: bool) -> anyhow::Result<()> {
    let pipeline = load_pipeline()?;
    let result = pipeline.inference.predict(user).await;
    pipeline.persist()?;

    let suggestions = match result {
        Ok(suggestions) => suggestions,
        Err(e) => anyhow::bail!("{} ({})", e, e.code()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&suggestions)?);
        return Ok(());
    }

    println!("Schedule suggestions for {user}");
    println!("==============================");
    for s in &suggestions {
        println!(
            "  {:<28} {:>3}%  at {:02}:{:02}  (confidence {:.2}, disabled)",
            s.name, s.value, s.hour, s.minute, s.confidence
        );
    }
    Ok(())
}

async fn cmd_validate(user: &str) -> anyhow::Result<()> {
    let pipeline = load_pipeline()?;
    let result = pipeline.inference.validate_user(user).await?;

    if result.valid {
        println!("Sensor history for {user} is valid for prediction.");
    } else {
        println!(
            "Sensor history for {user} is not usable: {}",
            result.reason.as_deref().unwrap_or("unknown reason")
        );
    }
    Ok(())
}

async fn cmd_scan(json: bool) -> anyhow::Result<()> {
    let pipeline = load_pipeline()?;
    let report = pipeline.scans.run_scan().await?;
    pipeline.persist()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Anomaly Scan");
    println!("============");
    println!("  Users scanned: {}", report.users_scanned);
    println!("  Failures: {}", report.failures);
    println!("  Anomalies: {}", report.anomalies.len());
    for anomaly in &report.anomalies {
        let kind = anomaly
            .verdict
            .anomaly_type
            .map(|t| t.as_str())
            .unwrap_or("unknown");
        println!("    {} - {}: {}", anomaly.user_id, kind, anomaly.verdict.description);
        if let Some(dispatch) = &anomaly.dispatch {
            println!(
                "      alert {} delivered to {}, {} failed, {} tokens removed",
                dispatch.alert_id, dispatch.delivered, dispatch.failed, dispatch.tokens_removed
            );
        }
    }
    Ok(())
}

async fn cmd_watch(interval: Option<u64>) -> anyhow::Result<()> {
    let pipeline = load_pipeline()?;
    let interval = interval
        .map(Duration::from_secs)
        .unwrap_or(pipeline.config.anomaly.scan_interval);

    println!("SmartSync Inference v{VERSION}");
    println!("Scanning every {}s. Press Ctrl+C to stop.", interval.as_secs());
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) {
        match pipeline.scans.run_scan().await {
            Ok(report) => println!(
                "[{}] scanned {} users, {} anomalies, {} failures",
                report.finished_at.format("%Y-%m-%d %H:%M:%S"),
                report.users_scanned,
                report.anomalies.len(),
                report.failures
            ),
            Err(e) => tracing::error!("Anomaly scan failed: {e}"),
        }
        if let Err(e) = pipeline.persist() {
            tracing::warn!("Failed to persist state: {e:#}");
        }

        let next = Instant::now() + interval;
        while running.load(Ordering::SeqCst) && Instant::now() < next {
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    println!();
    println!("Stopping...");
    pipeline.persist()?;
    println!("{}", pipeline.stats.summary());
    Ok(())
}

#[cfg(feature = "server")]
async fn cmd_serve(port: Option<u16>) -> anyhow::Result<()> {
    use smartsync_inference::server::{run, ServerConfig, ServerState};

    let pipeline = load_pipeline()?;
    let port = port.unwrap_or(pipeline.config.server_port);
    let state = ServerState::new(pipeline.inference.clone(), pipeline.stats.clone());
    let (addr, shutdown) = run(ServerConfig::new(port), state).await?;

    println!("SmartSync Inference v{VERSION}");
    println!("Listening on http://{addr}. Press Ctrl+C to stop.");

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;
    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    let _ = shutdown.send(());
    pipeline.persist()?;
    println!("{}", pipeline.stats.summary());
    Ok(())
}

#[cfg(not(feature = "server"))]
async fn cmd_serve(_port: Option<u16>) -> anyhow::Result<()> {
    anyhow::bail!("server support not compiled in; rebuild with --features server")
}

fn cmd_stats() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();
    let stats_path = config.data_path.join(smartsync_inference::pipeline::STATS_FILE);

    if !stats_path.exists() {
        println!("No previous pipeline statistics found.");
        return Ok(());
    }
    let stats = smartsync_inference::PipelineStats::with_persistence(stats_path);
    println!("{}", stats.summary());
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("setting Ctrl+C handler")
}
