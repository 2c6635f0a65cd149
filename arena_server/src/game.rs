//! Room orchestration.
//!
//! The [`Game`] registry owns every room: one entity store and one
//! dependency-resolved system set per room, fully isolated from every other
//! room. It enforces the membership invariant (a player sits in at most one
//! room) and drives per-tick dispatch plus sync payload production.

use std::collections::HashMap;

use anyhow::Result;
use tracing::info;

use arena_shared::config::GameConfig;
use arena_shared::context::{Context, Repository};
use arena_shared::net::{CreateRoomRequest, LongSync, PlayerInput, RoomMeta, ShortSync};
use arena_shared::sync;
use arena_shared::system::{GameEvent, System, SystemSet};

/// Domain errors surfaced to players, each with a stable code for client
/// display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameError {
    RoomNotFound,
    RoomFull,
    AlreadyInThisRoom,
    AlreadyInAnotherRoom,
}

impl GameError {
    pub fn code(self) -> u16 {
        match self {
            GameError::RoomNotFound => 404,
            GameError::RoomFull => 409,
            GameError::AlreadyInThisRoom => 400,
            GameError::AlreadyInAnotherRoom => 403,
        }
    }
}

impl std::fmt::Display for GameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            GameError::RoomNotFound => "Room does not exist",
            GameError::RoomFull => "Room is full",
            GameError::AlreadyInThisRoom => "You are already in this room",
            GameError::AlreadyInAnotherRoom => "You are already in a room",
        };
        f.write_str(message)
    }
}

impl std::error::Error for GameError {}

/// Builds the system list instantiated for every new room.
pub type SystemFactory = fn() -> Vec<Box<dyn System>>;

/// One isolated simulation session.
pub struct Room {
    pub meta: RoomMeta,
    pub context: Context,
    pub systems: SystemSet,
}

/// Process-wide room registry; alive for the process lifetime.
pub struct Game {
    rooms: HashMap<String, Room>,
    system_factory: SystemFactory,
    max_players: u32,
    level: String,
}

impl Game {
    pub fn new(system_factory: SystemFactory, cfg: &GameConfig) -> Self {
        Self {
            rooms: HashMap::new(),
            system_factory,
            max_players: cfg.max_players,
            level: cfg.level.clone(),
        }
    }

    /// Creates a room with the requester as its first player: fresh entity
    /// store, resolved system list, `init` dispatched, then `player_join`.
    pub fn create_room(&mut self, player_id: &str, request: &CreateRoomRequest) -> Result<RoomMeta> {
        if self.is_in_a_room(player_id) {
            return Err(GameError::AlreadyInAnotherRoom.into());
        }

        let room_id = format!("room{}", self.rooms.len());
        let meta = RoomMeta {
            id: room_id.clone(),
            name: request.name.clone(),
            players: vec![player_id.to_string()],
            max_players: self.max_players,
            private: request.private,
            level: self.level.clone(),
        };

        let context = Context::new(Repository::full());
        let systems = SystemSet::resolve((self.system_factory)())?;
        self.rooms.insert(
            room_id.clone(),
            Room { meta: meta.clone(), context, systems },
        );

        let room = self.rooms.get_mut(&room_id).expect("room just inserted");
        room.systems
            .dispatch(&mut room.context, GameEvent::Init(&meta))?;
        room.systems
            .dispatch(&mut room.context, GameEvent::PlayerJoin { player_id })?;

        info!(room_id = %room_id, player_id = %player_id, "Room created");
        Ok(meta)
    }

    /// Adds the requester to a room and returns the room meta together with
    /// the full-state snapshot owed to the joining player only.
    pub fn join_room(&mut self, player_id: &str, room_id: &str) -> Result<(RoomMeta, LongSync)> {
        let seated = self.is_in_a_room(player_id);
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or(GameError::RoomNotFound)?;

        if room.meta.players.len() >= room.meta.max_players as usize {
            return Err(GameError::RoomFull.into());
        }
        if room.meta.players.iter().any(|p| p == player_id) {
            return Err(GameError::AlreadyInThisRoom.into());
        }
        if seated {
            return Err(GameError::AlreadyInAnotherRoom.into());
        }

        room.meta.players.push(player_id.to_string());
        room.systems
            .dispatch(&mut room.context, GameEvent::PlayerJoin { player_id })?;
        let snapshot = sync::full_sync(&room.context, false)?;

        info!(room_id = %room_id, player_id = %player_id, "Player joined");
        Ok((room.meta.clone(), snapshot))
    }

    /// Removes a player from a room, dispatching `player_leave` before the
    /// player's entity is purged from the store.
    pub fn leave_room(&mut self, player_id: &str, room_id: &str) -> Result<()> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or(GameError::RoomNotFound)?;

        room.meta.players.retain(|p| p != player_id);
        room.systems
            .dispatch(&mut room.context, GameEvent::PlayerLeave { player_id })?;
        room.context.remove(player_id);

        info!(room_id = %room_id, player_id = %player_id, "Player left");
        Ok(())
    }

    /// Routes one player's input event into their room's systems.
    pub fn input(&mut self, player_id: &str, room_id: &str, input: &PlayerInput) -> Result<()> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or(GameError::RoomNotFound)?;
        room.systems
            .dispatch(&mut room.context, GameEvent::Input { player_id, input })
    }

    /// All non-private rooms.
    pub fn list_rooms(&self) -> Vec<RoomMeta> {
        let mut rooms: Vec<RoomMeta> = self
            .rooms
            .values()
            .filter(|room| !room.meta.private)
            .map(|room| room.meta.clone())
            .collect();
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        rooms
    }

    /// Room currently seating the player, if any.
    pub fn room_of(&self, player_id: &str) -> Option<&str> {
        self.rooms
            .values()
            .find(|room| room.meta.players.iter().any(|p| p == player_id))
            .map(|room| room.meta.id.as_str())
    }

    /// Roster snapshot for payload fan-out.
    pub fn players_in(&self, room_id: &str) -> Vec<String> {
        self.rooms
            .get(room_id)
            .map(|room| room.meta.players.clone())
            .unwrap_or_default()
    }

    /// Fast tick: dispatches `update_frame` to every room, then produces its
    /// short-sync payload.
    pub fn tick_fast(&mut self, dt: f32) -> Result<Vec<(String, ShortSync)>> {
        let mut payloads = Vec::with_capacity(self.rooms.len());
        for room_id in self.room_ids() {
            let room = self.rooms.get_mut(&room_id).expect("room id just listed");
            room.systems
                .dispatch(&mut room.context, GameEvent::UpdateFrame { dt })?;
            let payload = sync::short_sync(&mut room.context, false)?;
            payloads.push((room_id, payload));
        }
        Ok(payloads)
    }

    /// Slow tick: dispatches `update` to every room, then produces its
    /// long-sync payload.
    pub fn tick_slow(&mut self) -> Result<Vec<(String, LongSync)>> {
        let mut payloads = Vec::with_capacity(self.rooms.len());
        for room_id in self.room_ids() {
            let room = self.rooms.get_mut(&room_id).expect("room id just listed");
            room.systems
                .dispatch(&mut room.context, GameEvent::Update)?;
            let payload = sync::long_sync(&mut room.context, false)?;
            payloads.push((room_id, payload));
        }
        Ok(payloads)
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_mut(&mut self, room_id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(room_id)
    }

    fn room_ids(&self) -> Vec<String> {
        // Stable ordering when iterating collections.
        let mut ids: Vec<String> = self.rooms.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn is_in_a_room(&self, player_id: &str) -> bool {
        self.rooms
            .values()
            .any(|room| room.meta.players.iter().any(|p| p == player_id))
    }
}
