//! Level furniture system.
//!
//! Spawns the level's stack of dynamic boxes on room init and resets their
//! poses when a player hits the restart key.

use anyhow::Result;
use tracing::info;

use arena_shared::component::{BodyRef, Collidable, ComponentData, Position, Velocity, KEY_RESTART};
use arena_shared::context::Context;
use arena_shared::math::Vec2;
use arena_shared::net::{PlayerInput, RoomMeta};
use arena_shared::physics::{PhysicsWorld, RigidBodyHandle};
use arena_shared::system::System;

const BOX_COUNT: usize = 4;

fn box_spawn_position(index: usize) -> Vec2 {
    Vec2::new(4.0, -(index as f32))
}

#[derive(Default)]
pub struct LevelSystem {
    boxes: Vec<RigidBodyHandle>,
}

impl LevelSystem {
    pub fn new() -> Self {
        Self::default()
    }
}

impl System for LevelSystem {
    fn name(&self) -> &'static str {
        "level"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["physics"]
    }

    fn on_init(&mut self, ctx: &mut Context, _room: &RoomMeta) -> Result<()> {
        let mut world: PhysicsWorld = ctx.take_singleton()?;
        let mut spawned = Vec::with_capacity(BOX_COUNT);
        for index in 0..BOX_COUNT {
            let position = box_spawn_position(index);
            let handle = world.create_dynamic_body(position);
            world.attach_cuboid(handle, 0.5, 0.5, 0.2, 0.3, 0.0);
            spawned.push((format!("box{index}"), handle, position));
        }
        ctx.put_singleton(world)?;

        for (entity_id, handle, position) in spawned {
            ctx.upsert(
                &entity_id,
                vec![
                    BodyRef { handle }.into_component(),
                    Position::at(position).into_component(),
                    Velocity::still().into_component(),
                    Collidable::default().into_component(),
                ],
            )?;
            self.boxes.push(handle);
        }
        Ok(())
    }

    fn on_input(&mut self, ctx: &mut Context, _player_id: &str, input: &PlayerInput) -> Result<()> {
        let restart = input
            .keys_released
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .any(|key| key == KEY_RESTART);
        if !restart {
            return Ok(());
        }

        info!("restart");
        let mut world: PhysicsWorld = ctx.take_singleton()?;
        for (index, handle) in self.boxes.iter().enumerate() {
            world.reset_pose(*handle, box_spawn_position(index));
        }
        ctx.put_singleton(world)?;
        Ok(())
    }
}
