//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p scene_server -- [--config server.json] [--addr 0.0.0.0:8765] [--tick-hz 30] [--mode push|command]
//!
//! Flags override values read from `--config`.

use std::{env, net::SocketAddr, path::Path};

use anyhow::Context;
use scene_server::SceneServer;
use scene_shared::{config::ServerConfig, net::FrameListener};
use tracing::info;

fn parse_args() -> anyhow::Result<ServerConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => ServerConfig::load(Path::new(&args[i + 1]))?,
        _ => ServerConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => i += 2,
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1]
                    .parse()
                    .with_context(|| format!("invalid --tick-hz '{}'", args[i + 1]))?;
                i += 2;
            }
            "--mode" if i + 1 < args.len() => {
                cfg.sync_mode = args[i + 1]
                    .parse()
                    .with_context(|| format!("invalid --mode '{}'", args[i + 1]))?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(
        addr = %cfg.server_addr,
        tick_hz = cfg.tick_hz,
        mode = cfg.sync_mode.as_str(),
        "Starting server"
    );

    let addr: SocketAddr = cfg
        .server_addr
        .parse()
        .with_context(|| format!("invalid server address '{}'", cfg.server_addr))?;
    let listener = FrameListener::bind(addr).await?;

    tokio::select! {
        res = scene_server::run(SceneServer::new(cfg), listener) => res,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
