//! Full socket-based integration tests for client ↔ server communication.

use scene_shared::protocol::MessageType;
use scene_tests::{command_mode, init_tracing, join, next, push_mode, start, QUIET, STEP_TIMEOUT};
use serde_json::{json, Map, Value};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn greeting_precedes_snapshot() -> anyhow::Result<()> {
    init_tracing();
    let addr = start(command_mode()).await?;
    let (client, snapshot) = join(addr).await?;
    assert_eq!(client.server_peer()?, addr);
    assert_eq!(snapshot.msg_type, MessageType::State);
    assert!(snapshot.payload["entities"].get("cube_0").is_some());
    assert!(client.replica.session_id().is_some());
    Ok(())
}

/// Two clients; a spawn from one reaches both, and a late joiner sees it in
/// its catch-up snapshot.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn spawn_fans_out_to_every_session() -> anyhow::Result<()> {
    init_tracing();
    let addr = start(command_mode()).await?;
    let (mut a, _) = join(addr).await?;
    let (mut b, _) = join(addr).await?;

    a.send_command(
        "spawn_entity",
        json!({"entity_id": "cube_1", "type": "cube", "position": [0, 1, 0]}),
    )
    .await?;

    for client in [&mut a, &mut b] {
        let ev = next(client).await?;
        assert_eq!(ev.msg_type, MessageType::Event);
        assert_eq!(ev.payload["event_type"], "entity_spawned");
        assert_eq!(ev.payload["data"]["entity_id"], "cube_1");
        assert_eq!(ev.payload["data"]["position"], json!([0.0, 1.0, 0.0]));
        assert!(client.replica.get("cube_1").is_some());
    }

    let (_c, snapshot) = join(addr).await?;
    assert!(snapshot.payload["entities"].get("cube_1").is_some());
    Ok(())
}

/// A command on a missing entity changes nothing and sends nothing.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_entity_is_silent() -> anyhow::Result<()> {
    init_tracing();
    let addr = start(command_mode()).await?;
    let (mut a, _) = join(addr).await?;
    let (mut b, _) = join(addr).await?;

    a.send_command(
        "move_entity",
        json!({"entity_id": "does_not_exist", "position": [0, 0, 0]}),
    )
    .await?;
    a.ping().await?;

    assert_eq!(next(&mut a).await?.msg_type, MessageType::Pong);
    assert!(b.recv_timeout(QUIET).await?.is_none());
    Ok(())
}

/// Bad input earns an error reply and the session stays usable.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn errors_are_replied_and_session_survives() -> anyhow::Result<()> {
    init_tracing();
    let addr = start(command_mode()).await?;
    let (mut a, _) = join(addr).await?;

    a.send_raw("not valid json").await?;
    let err = next(&mut a).await?;
    assert_eq!(err.msg_type, MessageType::CommandError);

    a.send_command("invalid_command", json!({})).await?;
    let err = next(&mut a).await?;
    assert_eq!(err.msg_type, MessageType::CommandError);
    assert!(err.payload["message"]
        .as_str()
        .is_some_and(|m| m.contains("invalid_command")));

    a.send_command("set_color", json!({"entity_id": "cube_0", "color": [1, 0]}))
        .await?;
    assert_eq!(next(&mut a).await?.msg_type, MessageType::CommandError);

    a.send_command("delete_entity", json!({"entity_id": "cube_0"}))
        .await?;
    let ev = next(&mut a).await?;
    assert_eq!(ev.payload["event_type"], "entity_deleted");
    assert!(a.replica.is_empty());
    Ok(())
}

/// Push dialect: input is applied silently and shows up in a later snapshot.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_input_lands_in_world_state() -> anyhow::Result<()> {
    init_tracing();
    let addr = start(push_mode()).await?;
    let (mut a, _) = join(addr).await?;

    let mut input = Map::new();
    input.insert("action".into(), Value::from("spawn_cube"));
    input.insert("id".into(), Value::from("c_input"));
    input.insert("position".into(), json!([3, 0, 0]));
    a.send_input(input).await?;

    let deadline = tokio::time::Instant::now() + STEP_TIMEOUT;
    loop {
        let snap = a.recv_type(MessageType::WorldState, STEP_TIMEOUT).await?;
        if snap.payload["entities"].get("c_input").is_some() {
            break;
        }
        anyhow::ensure!(tokio::time::Instant::now() < deadline, "input never applied");
    }
    assert!(a.replica.get("c_input").is_some());
    Ok(())
}

/// A client that goes away does not disturb the others.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_leaves_others_served() -> anyhow::Result<()> {
    init_tracing();
    let addr = start(command_mode()).await?;
    let (a, _) = join(addr).await?;
    let (mut b, _) = join(addr).await?;
    drop(a);

    b.send_command("set_color", json!({"entity_id": "cube_0", "color": [0, 0, 1, 1]}))
        .await?;
    let ev = next(&mut b).await?;
    assert_eq!(ev.payload["event_type"], "entity_updated");
    assert_eq!(ev.payload["data"]["color"], json!([0.0, 0.0, 1.0, 1.0]));
    Ok(())
}
