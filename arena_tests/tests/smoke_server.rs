//! Socket-level smoke tests for the game server loop.

use std::time::Duration;

use arena_server::server::bind_ephemeral;
use arena_shared::net::{
    ClientMsg, CreateRoomRequest, FramedConn, ServerMsg, PROTOCOL_VERSION,
};

/// Smoke test: server can run a few ticks without panicking.
#[tokio::test]
async fn server_runs_few_ticks() -> anyhow::Result<()> {
    let (mut server, _cfg) = bind_ephemeral(64).await?;
    server.run_for_ticks(3).await?;
    Ok(())
}

/// Full integration: connect a client, create a room, receive sync payloads.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_creates_room_and_receives_syncs() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();

    let (server, cfg) = bind_ephemeral(64).await?;
    let addr = cfg.listen_addr.parse()?;
    let server_task = tokio::spawn(server.run());

    let mut conn = FramedConn::connect(addr).await?;
    conn.send(&ClientMsg::Hello { protocol: PROTOCOL_VERSION }).await?;

    let welcome: ServerMsg = conn.recv().await?;
    let ServerMsg::Welcome { player_id } = welcome else {
        anyhow::bail!("expected Welcome, got {welcome:?}");
    };
    assert_eq!(player_id, "p1");

    conn.send(&ClientMsg::CreateRoom(CreateRoomRequest {
        name: "smoke room".to_string(),
        private: false,
    }))
    .await?;

    // The room reply plus at least one short and one long sync should show
    // up within the timeout.
    let mut got_room = false;
    let mut got_short = false;
    let mut got_long = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !(got_room && got_short && got_long) {
        let msg = tokio::time::timeout_at(deadline, conn.recv::<ServerMsg>()).await??;
        match msg {
            ServerMsg::RoomCreated { room } => {
                assert_eq!(room.id, "room0");
                assert_eq!(room.players, vec!["p1".to_string()]);
                got_room = true;
            }
            ServerMsg::ShortSync(payload) => {
                if !payload.updates.is_empty() {
                    got_short = true;
                }
            }
            ServerMsg::LongSync(payload) => {
                if !payload.updates.is_empty() {
                    got_long = true;
                }
            }
            other => anyhow::bail!("unexpected message: {other:?}"),
        }
    }

    server_task.abort();
    Ok(())
}

/// Joining an unknown room surfaces the declared error payload.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn join_unknown_room_returns_error_payload() -> anyhow::Result<()> {
    let (server, cfg) = bind_ephemeral(64).await?;
    let addr = cfg.listen_addr.parse()?;
    let server_task = tokio::spawn(server.run());

    let mut conn = FramedConn::connect(addr).await?;
    conn.send(&ClientMsg::Hello { protocol: PROTOCOL_VERSION }).await?;
    let _welcome: ServerMsg = conn.recv().await?;

    conn.send(&ClientMsg::JoinRoom(arena_shared::net::JoinRoomRequest {
        room_id: "nonexistent".to_string(),
    }))
    .await?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let msg = tokio::time::timeout_at(deadline, conn.recv::<ServerMsg>()).await??;
        if let ServerMsg::Error(payload) = msg {
            assert!(payload.error);
            assert_eq!(payload.code, 404);
            assert_eq!(payload.message, "Room does not exist");
            break;
        }
    }

    server_task.abort();
    Ok(())
}
