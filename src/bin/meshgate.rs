//! Meshgate daemon binary
//!
//! Loads configuration and sessions, then either replays captured frames
//! through the authenticator or runs the control-plane housekeeping loop.

use clap::Parser;
use meshgate::control::now_secs;
use meshgate::{
    Authenticator, Config, ControlPlane, GateStats, RejectionMonitor, SessionFile, SessionStore,
    StatsSnapshot,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Mesh fast-path authenticator
#[derive(Parser, Debug)]
#[command(name = "meshgate", version, about)]
struct Args {
    /// Path to configuration file (overrides default search paths)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// YAML file of session records to install at startup
    #[arg(short, long, value_name = "FILE")]
    sessions: Option<PathBuf>,

    /// Replay hex-encoded frames (one per line) and print stats
    #[arg(short, long, value_name = "FILE")]
    frames: Option<PathBuf>,

    /// Worker contexts for replay (defaults to the configured shard count)
    #[arg(short, long)]
    workers: Option<usize>,
}

/// Errors from replaying a frame file.
#[derive(Debug, Error)]
enum ReplayError {
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path}:{line}: invalid hex: {source}")]
    InvalidHex {
        path: PathBuf,
        line: usize,
        source: hex::FromHexError,
    },

    #[error("worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// Replay report printed as YAML.
#[derive(Serialize)]
struct Report {
    frames: usize,
    stats: StatsSnapshot,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse();

    let (config, loaded_paths) = if let Some(config_path) = &args.config {
        match Config::load_file(config_path) {
            Ok(config) => (config, vec![config_path.clone()]),
            Err(e) => {
                error!("Failed to load configuration from {}: {}", config_path.display(), e);
                std::process::exit(1);
            }
        }
    } else {
        match Config::load() {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                std::process::exit(1);
            }
        }
    };

    if loaded_paths.is_empty() {
        info!("No config files found, using defaults");
    } else {
        for path in &loaded_paths {
            info!(path = %path.display(), "Loaded config file");
        }
    }

    let store = Arc::new(match config.gate.max_sessions {
        Some(max) => SessionStore::with_max_sessions(max),
        None => SessionStore::new(),
    });
    let control = ControlPlane::new(Arc::clone(&store), &config.gate);

    if let Some(path) = &args.sessions {
        let file = match SessionFile::load(path) {
            Ok(file) => file,
            Err(e) => {
                error!("Failed to load sessions: {}", e);
                std::process::exit(1);
            }
        };
        if let Err(e) = control.install_all(&file.sessions) {
            error!("Failed to install sessions: {}", e);
            std::process::exit(1);
        }
    }

    let status = control.status();
    info!(
        mesh_port = config.gate.mesh_port(),
        ttl_secs = config.gate.session_ttl_secs(),
        sessions = status.active_sessions,
        verified = status.verified_sessions,
        "Meshgate ready"
    );

    let workers = args.workers.unwrap_or_else(|| config.gate.shard_count()).max(1);
    let stats = Arc::new(GateStats::new(workers));
    let gate = Authenticator::new(store, stats, &config.gate);

    match &args.frames {
        Some(path) => {
            if let Err(e) = replay(gate, path, workers).await {
                error!("Replay failed: {}", e);
                std::process::exit(1);
            }
        }
        None => run_daemon(gate, control, &config).await,
    }
}

/// Read hex frames from `path` and process them on `workers` contexts.
async fn replay(gate: Authenticator, path: &Path, workers: usize) -> Result<(), ReplayError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ReplayError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut frames = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let frame = hex::decode(line).map_err(|e| ReplayError::InvalidHex {
            path: path.to_path_buf(),
            line: lineno + 1,
            source: e,
        })?;
        frames.push(frame);
    }
    let frames = Arc::new(frames);
    let now = now_secs();

    info!(frames = frames.len(), workers, "Replaying frames");

    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let gate = gate.clone();
        let frames = Arc::clone(&frames);
        handles.push(tokio::task::spawn_blocking(move || {
            for frame in frames.iter().skip(worker).step_by(workers) {
                gate.process(frame, now, worker);
            }
        }));
    }
    for handle in handles {
        handle.await?;
    }

    let report = Report {
        frames: frames.len(),
        stats: gate.stats().snapshot(),
    };
    let yaml = serde_yaml::to_string(&report)?;
    print!("{}", yaml);
    Ok(())
}

/// Run the sweeper and the periodic stats report until Ctrl+C.
async fn run_daemon(gate: Authenticator, control: ControlPlane, config: &Config) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep_period = Duration::from_secs(config.control.sweep_interval_secs().max(1));
    let sweeper = tokio::spawn(control.clone().run_sweeper(sweep_period, shutdown_rx));

    let mut monitor =
        RejectionMonitor::with_baseline(config.control.monitor.clone(), gate.stats().snapshot());
    let mut report = tokio::time::interval(Duration::from_secs(
        config.control.stats_interval_secs().max(1),
    ));

    info!("Meshgate running, press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = report.tick() => {
                let snapshot = gate.stats().snapshot();
                let status = control.status();
                debug!(
                    total = snapshot.total,
                    admitted = snapshot.admitted,
                    rejected = snapshot.rejected(),
                    sessions = status.active_sessions,
                    "Stats"
                );
                monitor.observe(&snapshot);
            }
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("Shutdown signal received"),
                    Err(e) => error!("Failed to listen for shutdown signal: {}", e),
                }
                break;
            }
        }
    }

    if shutdown_tx.send(true).is_err() {
        warn!("Sweeper already stopped");
    }
    if let Err(e) = sweeper.await {
        warn!("Error during shutdown: {}", e);
    }

    info!("Meshgate shutdown complete");
}
