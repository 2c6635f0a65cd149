//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p arena_server -- [--addr 127.0.0.1:4000] [--tick-hz 20]
//!
//! The server listens for client connections, runs a fixed timestep
//! simulation per room, and streams short/long sync payloads to players.

use std::env;

use anyhow::Context;
use arena_server::GameServer;
use arena_shared::config::GameConfig;
use tracing::info;

fn parse_args() -> GameConfig {
    let mut cfg = GameConfig::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.listen_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().unwrap_or(20);
                i += 2;
            }
            "--slow-every" if i + 1 < args.len() => {
                cfg.slow_every = args[i + 1].parse().unwrap_or(20);
                i += 2;
            }
            _ => i += 1,
        }
    }
    cfg
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args();
    info!(addr = %cfg.listen_addr, tick_hz = cfg.tick_hz, slow_every = cfg.slow_every, "Starting server");

    let server = GameServer::new(cfg).await.context("create server")?;
    let local = server.local_addr()?;
    info!(%local, "Server listening");

    server.run().await
}
