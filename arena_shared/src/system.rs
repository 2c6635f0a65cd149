//! System lifecycle.
//!
//! A system is a stateless-between-ticks logic unit driven by lifecycle
//! events. Hooks default to no-ops, so a system only implements the events
//! it cares about — "not implemented" is skipped silently, while an error
//! from an implemented hook propagates to the caller.

use anyhow::Result;

use crate::context::Context;
use crate::dependency::{resolve_dependency_order, DependencyError, SystemDecl};
use crate::net::{PlayerInput, RoomMeta};

/// Lifecycle events dispatched to every system of a room, in resolved order.
#[derive(Debug, Clone, Copy)]
pub enum GameEvent<'a> {
    /// Room construction; runs once before any player joins.
    Init(&'a RoomMeta),
    /// Inbound input from one player.
    Input { player_id: &'a str, input: &'a PlayerInput },
    /// Slow/logic tick.
    Update,
    /// Fast/physics tick.
    UpdateFrame { dt: f32 },
    PlayerJoin { player_id: &'a str },
    PlayerLeave { player_id: &'a str },
}

/// A simulation system.
///
/// `requires` declares the system kinds this one must run after; the names
/// refer to other systems' [`System::name`] values.
pub trait System: Send {
    fn name(&self) -> &'static str;

    fn requires(&self) -> &'static [&'static str] {
        &[]
    }

    fn on_init(&mut self, _ctx: &mut Context, _room: &RoomMeta) -> Result<()> {
        Ok(())
    }

    fn on_input(&mut self, _ctx: &mut Context, _player_id: &str, _input: &PlayerInput) -> Result<()> {
        Ok(())
    }

    fn on_update(&mut self, _ctx: &mut Context) -> Result<()> {
        Ok(())
    }

    fn on_update_frame(&mut self, _ctx: &mut Context, _dt: f32) -> Result<()> {
        Ok(())
    }

    fn on_player_join(&mut self, _ctx: &mut Context, _player_id: &str) -> Result<()> {
        Ok(())
    }

    fn on_player_leave(&mut self, _ctx: &mut Context, _player_id: &str) -> Result<()> {
        Ok(())
    }
}

/// A room's systems in dependency-resolved execution order.
pub struct SystemSet {
    systems: Vec<Box<dyn System>>,
}

impl SystemSet {
    /// Orders the given systems by their declared prerequisites.
    pub fn resolve(systems: Vec<Box<dyn System>>) -> Result<Self, DependencyError> {
        let decls: Vec<SystemDecl> = systems
            .iter()
            .map(|system| SystemDecl {
                name: system.name(),
                requires: system.requires(),
            })
            .collect();
        let order = resolve_dependency_order(&decls)?;

        let mut slots: Vec<Option<Box<dyn System>>> = systems.into_iter().map(Some).collect();
        let systems = order
            .into_iter()
            .map(|index| slots[index].take().expect("resolver returned a permutation"))
            .collect();
        Ok(Self { systems })
    }

    /// System names in execution order.
    pub fn names(&self) -> Vec<&'static str> {
        self.systems.iter().map(|system| system.name()).collect()
    }

    /// Invokes the event's hook on every system in resolved order.
    pub fn dispatch(&mut self, ctx: &mut Context, event: GameEvent<'_>) -> Result<()> {
        for system in &mut self.systems {
            match event {
                GameEvent::Init(room) => system.on_init(ctx, room)?,
                GameEvent::Input { player_id, input } => system.on_input(ctx, player_id, input)?,
                GameEvent::Update => system.on_update(ctx)?,
                GameEvent::UpdateFrame { dt } => system.on_update_frame(ctx, dt)?,
                GameEvent::PlayerJoin { player_id } => system.on_player_join(ctx, player_id)?,
                GameEvent::PlayerLeave { player_id } => system.on_player_leave(ctx, player_id)?,
            }
        }
        Ok(())
    }
}
