//! Server implementation.
//!
//! Authoritative fixed-timestep loop plus the thin glue that maps transport
//! events to game calls:
//! - one `select!` loop owns the [`Game`]; ticks and inbound requests are
//!   interleaved on it and never run in parallel,
//! - per-connection tasks only do socket IO and forward typed messages,
//! - request errors are mapped to error payloads at this boundary; tick
//!   errors propagate and stop the loop, since a crashing system is a logic
//!   bug that must not silently desync state.
//!
//! Determinism notes:
//! - Keep simulation in a fixed timestep.
//! - Use stable ordering when iterating collections.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context as _;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use arena_shared::config::GameConfig;
use arena_shared::net::{
    ClientMsg, ErrorPayload, FramedConn, FramedListener, ServerMsg, PROTOCOL_VERSION,
};

use crate::game::{Game, GameError};
use crate::systems::default_systems;

/// Fallback code for unexpected errors surfaced to a client.
const INTERNAL_ERROR_CODE: u16 = 500;

/// Events forwarded from connection tasks into the owner loop.
enum ClientEvent {
    Request { player_id: String, msg: ClientMsg },
    Disconnected { player_id: String },
}

/// Game server: room registry, connected clients, tick loop.
pub struct GameServer {
    pub cfg: GameConfig,
    game: Game,
    listener: FramedListener,
    clients: HashMap<String, mpsc::UnboundedSender<ServerMsg>>,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    events_rx: mpsc::UnboundedReceiver<ClientEvent>,
    next_player: u64,
    tick: u64,
}

impl GameServer {
    /// Binds the listener and prepares the game registry.
    pub async fn new(cfg: GameConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.listen_addr.parse().context("parse listen_addr")?;
        let listener = FramedListener::bind(addr).await?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            game: Game::new(default_systems, &cfg),
            cfg,
            listener,
            clients: HashMap::new(),
            events_tx,
            events_rx,
            next_player: 1,
            tick: 0,
        })
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the server until a tick error occurs.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let dt = Duration::from_secs_f32(1.0 / self.cfg.tick_hz as f32);
        let mut next_tick = tokio::time::Instant::now() + dt;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(next_tick) => {
                    next_tick += dt;
                    self.step(dt.as_secs_f32())?;
                }
                accepted = self.listener.accept() => {
                    let (conn, peer) = accepted?;
                    self.admit(conn, peer);
                }
                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event);
                }
            }
        }
    }

    /// Executes one fast tick; every Nth tick additionally runs the slow path.
    pub fn step(&mut self, dt_sec: f32) -> anyhow::Result<()> {
        for (room_id, payload) in self.game.tick_fast(dt_sec)? {
            self.broadcast(&room_id, ServerMsg::ShortSync(payload));
        }
        self.tick += 1;
        if self.tick % self.cfg.slow_every as u64 == 0 {
            for (room_id, payload) in self.game.tick_slow()? {
                self.broadcast(&room_id, ServerMsg::LongSync(payload));
            }
        }
        Ok(())
    }

    /// Steps the simulation a fixed number of ticks (tests, tooling).
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = Duration::from_secs_f32(1.0 / self.cfg.tick_hz as f32);
        let mut next = tokio::time::Instant::now();
        for _ in 0..ticks {
            next += dt;
            self.step(dt.as_secs_f32())?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    fn admit(&mut self, conn: FramedConn, peer: SocketAddr) {
        let player_id = format!("p{}", self.next_player);
        self.next_player += 1;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        self.clients.insert(player_id.clone(), out_tx);
        tokio::spawn(client_task(conn, player_id.clone(), out_rx, self.events_tx.clone()));

        info!(player_id = %player_id, %peer, "Client connected");
    }

    fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Request { player_id, msg } => {
                if let Err(err) = self.handle_request(&player_id, msg) {
                    let payload = error_payload(&err);
                    warn!(player_id = %player_id, code = payload.code, error = %err, "Request failed");
                    self.send_to(&player_id, ServerMsg::Error(payload));
                }
            }
            ClientEvent::Disconnected { player_id } => {
                self.clients.remove(&player_id);
                if let Some(room_id) = self.game.room_of(&player_id).map(String::from) {
                    if let Err(err) = self.game.leave_room(&player_id, &room_id) {
                        warn!(player_id = %player_id, error = %err, "Leave on disconnect failed");
                    }
                }
                info!(player_id = %player_id, "Client disconnected");
            }
        }
    }

    fn handle_request(&mut self, player_id: &str, msg: ClientMsg) -> anyhow::Result<()> {
        match msg {
            ClientMsg::Hello { protocol } => {
                debug!(player_id = %player_id, protocol, "Late hello ignored");
            }
            ClientMsg::CreateRoom(request) => {
                let room = self.game.create_room(player_id, &request)?;
                self.send_to(player_id, ServerMsg::RoomCreated { room });
            }
            ClientMsg::JoinRoom(request) => {
                let (room, snapshot) = self.game.join_room(player_id, &request.room_id)?;
                self.send_to(player_id, ServerMsg::RoomJoined { room });
                // Full state goes to the joining player only.
                self.send_to(player_id, ServerMsg::LongSync(snapshot));
            }
            ClientMsg::GetRooms => {
                let rooms = self.game.list_rooms();
                self.send_to(player_id, ServerMsg::Rooms { rooms });
            }
            ClientMsg::Input(input) => {
                let Some(room_id) = self.game.room_of(player_id).map(String::from) else {
                    debug!(player_id = %player_id, "Input from player outside any room");
                    return Ok(());
                };
                self.game.input(player_id, &room_id, &input)?;
            }
        }
        Ok(())
    }

    fn broadcast(&self, room_id: &str, msg: ServerMsg) {
        for player_id in self.game.players_in(room_id) {
            self.send_to(&player_id, msg.clone());
        }
    }

    fn send_to(&self, player_id: &str, msg: ServerMsg) {
        if let Some(tx) = self.clients.get(player_id) {
            // A full/closed channel means the client task is going away; the
            // disconnect event will clean up.
            let _ = tx.send(msg);
        }
    }
}

/// Maps an error to the client-facing payload: domain errors keep their
/// declared code, anything unexpected becomes a generic internal error.
fn error_payload(err: &anyhow::Error) -> ErrorPayload {
    match err.downcast_ref::<GameError>() {
        Some(game_err) => ErrorPayload {
            error: true,
            code: game_err.code(),
            message: game_err.to_string(),
        },
        None => ErrorPayload {
            error: true,
            code: INTERNAL_ERROR_CODE,
            message: "Internal server error".to_string(),
        },
    }
}

/// Per-connection task: handshake, then pump inbound requests and outbound
/// payloads until either side drops.
async fn client_task(
    conn: FramedConn,
    player_id: String,
    mut out_rx: mpsc::UnboundedReceiver<ServerMsg>,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
) {
    let (mut reader, mut writer) = conn.split();

    match reader.recv::<ClientMsg>().await {
        Ok(ClientMsg::Hello { protocol }) if protocol == PROTOCOL_VERSION => {
            let welcome = ServerMsg::Welcome { player_id: player_id.clone() };
            if writer.send(&welcome).await.is_err() {
                let _ = events_tx.send(ClientEvent::Disconnected { player_id });
                return;
            }
        }
        other => {
            debug!(player_id = %player_id, ?other, "Handshake failed");
            let _ = events_tx.send(ClientEvent::Disconnected { player_id });
            return;
        }
    }

    let writer_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if writer.send(&msg).await.is_err() {
                break;
            }
        }
    });

    loop {
        match reader.recv::<ClientMsg>().await {
            Ok(msg) => {
                let request = ClientEvent::Request { player_id: player_id.clone(), msg };
                if events_tx.send(request).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }

    let _ = events_tx.send(ClientEvent::Disconnected { player_id });
    writer_task.abort();
}

/// Helper for tests: bind to an ephemeral port.
pub async fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<(GameServer, GameConfig)> {
    let cfg = GameConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        tick_hz,
        ..Default::default()
    };

    let server = GameServer::new(cfg).await?;
    let mut cfg = server.cfg.clone();
    cfg.listen_addr = server.local_addr()?.to_string();
    Ok((server, cfg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_keep_their_codes() {
        let err = anyhow::Error::from(GameError::RoomFull);
        let payload = error_payload(&err);
        assert_eq!(payload.code, 409);
        assert_eq!(payload.message, "Room is full");
        assert!(payload.error);
    }

    #[test]
    fn unexpected_errors_become_internal() {
        let err = anyhow::anyhow!("subsystem exploded");
        let payload = error_payload(&err);
        assert_eq!(payload.code, INTERNAL_ERROR_CODE);
        assert_eq!(payload.message, "Internal server error");
    }
}
