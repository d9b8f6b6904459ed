//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p scene_client -- [--addr 127.0.0.1:8765] [--entity test_cube_1]
//!
//! Runs a scripted session against a running server: spawn a cube, move it,
//! recolor it, then ping. Every message received is printed.

use std::{env, net::SocketAddr, time::Duration};

use anyhow::Context;
use scene_client::SceneClient;
use scene_shared::protocol::{Envelope, MessageType};
use serde_json::json;
use tracing::info;

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

struct Args {
    addr: String,
    entity: String,
}

fn parse_args() -> Args {
    let mut out = Args {
        addr: "127.0.0.1:8765".to_string(),
        entity: "test_cube_1".to_string(),
    };
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                out.addr = args[i + 1].clone();
                i += 2;
            }
            "--entity" if i + 1 < args.len() => {
                out.entity = args[i + 1].clone();
                i += 2;
            }
            _ => i += 1,
        }
    }
    out
}

fn print_envelope(label: &str, env: &Envelope) {
    println!("{label} {}: {}", env.msg_type, serde_json::Value::Object(env.payload.clone()));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args();
    let addr: SocketAddr = args
        .addr
        .parse()
        .with_context(|| format!("invalid server address '{}'", args.addr))?;

    let mut client = SceneClient::connect(addr).await.context("connect")?;
    let hello = client.recv_type(MessageType::Hello, STEP_TIMEOUT).await?;
    print_envelope("Received", &hello);
    info!(session_id = ?client.replica.session_id(), "Connected to server");

    let id = args.entity.as_str();
    let steps = [
        (
            "spawn_entity",
            json!({"entity_id": id, "type": "cube", "position": [0, 1, 0], "color": [1, 0, 0, 1]}),
        ),
        ("move_entity", json!({"entity_id": id, "position": [2, 1, 0]})),
        ("set_color", json!({"entity_id": id, "color": [0, 1, 0, 1]})),
    ];

    for (name, params) in steps {
        println!("Sending {name}...");
        client.send_command(name, params).await?;
        let reply = client.recv_type(MessageType::Event, STEP_TIMEOUT).await?;
        print_envelope("Received", &reply);
    }

    client.ping().await?;
    let pong = client.recv_type(MessageType::Pong, STEP_TIMEOUT).await?;
    print_envelope("Received", &pong);

    if let Some(e) = client.replica.get(id) {
        println!(
            "Replica: {} at {:?} color {:?} ({} entities)",
            e.entity_id,
            e.position,
            e.color,
            client.replica.len()
        );
    }
    println!("Session complete.");
    Ok(())
}
