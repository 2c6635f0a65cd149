//! `arena_server`
//!
//! Server-side systems:
//! - Room orchestration and membership invariants
//! - Gameplay systems (player, physics, contact, level, match)
//! - Fixed timestep loop with short/long sync emission
//!
//! Networking model:
//! - One framed TCP connection per client
//! - Requests and ticks interleave on a single owner loop

pub mod game;
pub mod server;
pub mod systems;

pub use game::Game;
pub use server::GameServer;
