//! Quorum CLI
//!
//! Headless driver for the arbitration engine. Reads one query per line from
//! stdin, runs a full round against the configured backends, and prints the
//! selected answer to stdout.
//!
//! # Usage
//!
//! ```bash
//! # With the default config path (~/.config/quorum/quorum.toml)
//! quorum-cli
//!
//! # With a custom config file
//! QUORUM_CONFIG=/tmp/quorum.toml quorum-cli
//!
//! # With verbose logging
//! RUST_LOG=debug quorum-cli
//! ```
//!
//! # Environment Variables
//!
//! - `QUORUM_CONFIG`: Custom config file path
//! - `QUORUM_STATS_PATH`: Custom statistics snapshot path
//! - `QUORUM_CALL_TIMEOUT_MS`: Per-call timeout override
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)
//!
//! # Files
//!
//! - Config: `~/.config/quorum/quorum.toml`
//! - Stats snapshot: `~/.local/share/quorum/backend-stats.json`, restored at
//!   startup and saved at shutdown
//!
//! # Signals
//!
//! - SIGINT (Ctrl-C): Graceful shutdown, saving the statistics snapshot

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

use quorum_core::{
    default_stats_path, load_config_from_path, CapabilityRegistry, Engine, GenerationBackend,
    HttpBackend, FALLBACK_BACKEND_ID,
};

/// Resolve the config file path from the environment or the default location
fn config_path() -> Option<PathBuf> {
    std::env::var("QUORUM_CONFIG")
        .ok()
        .map(PathBuf::from)
        .or_else(quorum_core::default_config_path)
}

/// Save the statistics snapshot, logging rather than failing on errors
fn save_stats(registry: &Arc<CapabilityRegistry>, path: Option<&PathBuf>) {
    let Some(path) = path else {
        warn!("No statistics path available, skipping snapshot save");
        return;
    };
    if let Err(e) = registry.save_stats(path) {
        error!(error = %e, "Failed to save statistics snapshot");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config_from_path(config_path())?;
    let stats_path = config
        .registry
        .stats_path
        .clone()
        .or_else(default_stats_path);

    let mut engine = Engine::new(config.clone());
    for entry in &config.backends {
        let backend = HttpBackend::new(&entry.id, &entry.base_url, &entry.model);
        if !backend.health_check().await {
            warn!(backend = %entry.id, url = %entry.base_url, "Backend unreachable at startup");
        }
        engine.register_backend(Arc::new(backend), entry.capabilities)?;
    }

    if engine.backend_ids().is_empty() {
        warn!("No backends configured; every query will fail with a configuration error");
    }

    if let Some(ref path) = stats_path {
        engine.registry().load_stats(path)?;
    }

    info!(
        backends = engine.backend_ids().len(),
        "Quorum engine ready, reading queries from stdin"
    );

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(query)) => {
                        let query = query.trim();
                        if query.is_empty() {
                            continue;
                        }
                        match engine.process(query, None).await {
                            Ok(result) => {
                                if result.backend_id == FALLBACK_BACKEND_ID {
                                    println!("[degraded] {}", result.text);
                                } else {
                                    println!("[{}] {}", result.backend_id, result.text);
                                }
                            }
                            Err(e) => error!(error = %e, "Round failed"),
                        }
                    }
                    Ok(None) => {
                        info!("Stdin closed, shutting down");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to read stdin");
                        break;
                    }
                }
            }
            _ = signal::ctrl_c() => {
                info!("Received interrupt, shutting down");
                break;
            }
        }
    }

    save_stats(engine.registry(), stats_path.as_ref());
    Ok(())
}
