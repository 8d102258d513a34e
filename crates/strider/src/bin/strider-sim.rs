//! Run a predicted client against an authoritative server in one process.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use strider::{run_realtime, run_session, Scenario, SessionConfig};
use strider_movement::MovementConfig;
use strider_network::{CompressionAlgorithm, LinkConditions};
use strider_state::{CombineConfig, PredictorConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Strider movement prediction simulator")]
struct Args {
    /// Scripted scenario to play
    #[arg(short, long, value_enum, default_value = "walk")]
    scenario: Scenario,

    /// Simulation ticks per second
    #[arg(long, default_value = "60")]
    tick_rate: u32,

    /// Step batches sent per second
    #[arg(long, default_value = "30")]
    send_rate: u32,

    /// Number of ticks to run
    #[arg(short, long, default_value = "600")]
    ticks: u32,

    /// Packet loss probability on both directions (0.0 to 1.0)
    #[arg(long, default_value = "0.0")]
    loss: f64,

    /// One-way latency in milliseconds
    #[arg(long, default_value = "0")]
    latency: u64,

    /// Random extra delay up to this many milliseconds
    #[arg(long, default_value = "0")]
    jitter: u64,

    /// Seed for the simulated links
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Force one compression algorithm instead of choosing by size
    #[arg(long, value_enum)]
    compression: Option<CompressionAlgorithm>,

    /// Never merge consecutive steps
    #[arg(long)]
    no_combine: bool,

    /// Run the server on a tokio task against the wall clock
    #[arg(long)]
    realtime: bool,

    /// JSON file overriding movement tunables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,
}

fn load_movement(path: Option<&PathBuf>) -> Result<MovementConfig> {
    let Some(path) = path else {
        return Ok(MovementConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: MovementConfig = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid movement configuration in {}", path.display()))?;
    Ok(config)
}

fn session_config(args: &Args) -> Result<SessionConfig> {
    let link = LinkConditions {
        packet_loss: args.loss,
        latency_ms: args.latency,
        jitter_ms: args.jitter,
        duplicate_probability: 0.0,
    };
    Ok(SessionConfig {
        movement: load_movement(args.config.as_ref())?,
        predictor: PredictorConfig {
            combine: if args.no_combine {
                CombineConfig::disabled()
            } else {
                CombineConfig::default()
            },
            send_interval: 1.0 / args.send_rate.max(1) as f32,
            ..PredictorConfig::default()
        },
        tick_rate: args.tick_rate,
        ticks: args.ticks,
        scenario: args.scenario,
        uplink: link.clone(),
        downlink: link,
        seed: args.seed,
        compression: args.compression,
        ..SessionConfig::default()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(args.log_level.as_filter())),
        )
        .init();

    info!("Simulator args: {:?}", args);
    let config = session_config(&args)?;

    let report = if args.realtime {
        run_realtime(config).await?
    } else {
        run_session(&config)?
    };
    println!("{report}");
    Ok(())
}
