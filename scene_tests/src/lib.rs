//! Shared helpers for the integration tests.

use std::{net::SocketAddr, time::Duration};

use scene_client::SceneClient;
use scene_shared::{
    config::ServerConfig,
    protocol::{Dialect, Envelope, MessageType},
};

/// Upper bound for any single expected message.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait before concluding that nothing is coming.
pub const QUIET: Duration = Duration::from_millis(200);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

pub fn push_mode() -> ServerConfig {
    ServerConfig {
        tick_hz: 60,
        ..Default::default()
    }
}

pub fn command_mode() -> ServerConfig {
    ServerConfig {
        sync_mode: Dialect::Command,
        ..Default::default()
    }
}

/// Starts a server on an ephemeral port.
pub async fn start(cfg: ServerConfig) -> anyhow::Result<SocketAddr> {
    let (addr, _handle) = scene_server::spawn_ephemeral(cfg).await?;
    Ok(addr)
}

/// Connects and consumes the greeting. Returns the client and the catch-up
/// snapshot that follows it.
pub async fn join(addr: SocketAddr) -> anyhow::Result<(SceneClient, Envelope)> {
    let mut client = SceneClient::connect(addr).await?;
    let hello = next(&mut client).await?;
    anyhow::ensure!(
        hello.msg_type == MessageType::Hello,
        "expected hello first, got {}",
        hello.msg_type
    );
    let snapshot = next(&mut client).await?;
    Ok((client, snapshot))
}

/// Next message, failing on timeout or close.
pub async fn next(client: &mut SceneClient) -> anyhow::Result<Envelope> {
    client
        .recv_timeout(STEP_TIMEOUT)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no message within {STEP_TIMEOUT:?}"))
}
