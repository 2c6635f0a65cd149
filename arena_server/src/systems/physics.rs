//! Physics stepping system.
//!
//! Owns the room's physics world singleton and the suppressed static floor.
//! After each step the pose of every awake body is copied back into its
//! entity's position/velocity components and flagged dirty, which is what
//! feeds physics-driven motion into the short sync path.

use anyhow::Result;

use arena_shared::component::{BodyRef, ComponentData, ComponentKind, Position, Velocity};
use arena_shared::context::{Context, MatchMode};
use arena_shared::math::Vec2;
use arena_shared::net::RoomMeta;
use arena_shared::physics::PhysicsWorld;
use arena_shared::system::System;

pub const FLOOR_ID: &str = "floor";

const GRAVITY: Vec2 = Vec2::new(0.0, -10.0);
const FLOOR_LEFT: Vec2 = Vec2::new(-20.0, -4.0);
const FLOOR_RIGHT: Vec2 = Vec2::new(20.0, -4.0);

pub struct PhysicsSystem;

impl System for PhysicsSystem {
    fn name(&self) -> &'static str {
        "physics"
    }

    fn on_init(&mut self, ctx: &mut Context, _room: &RoomMeta) -> Result<()> {
        let mut world = PhysicsWorld::new(GRAVITY);
        let floor = world.create_fixed_body(Vec2::ZERO);
        world.attach_segment(floor, FLOOR_LEFT, FLOOR_RIGHT);

        // Static geometry exists but never syncs.
        ctx.suppress(ComponentKind::PhysicsWorld.name());
        ctx.suppress(FLOOR_ID);
        ctx.upsert_singleton(world.into_component())?;
        ctx.upsert(FLOOR_ID, vec![BodyRef { handle: floor }.into_component()])?;
        Ok(())
    }

    fn on_update_frame(&mut self, ctx: &mut Context, dt: f32) -> Result<()> {
        let mut world: PhysicsWorld = ctx.take_singleton()?;
        world.step(dt);

        for entity_id in ctx.entities_with(&[ComponentKind::Body], MatchMode::All) {
            let Some(body_ref) = ctx.get::<BodyRef>(&entity_id)? else {
                continue;
            };
            let handle = body_ref.handle;
            if !world.body_is_awake(handle) {
                continue;
            }
            let (Some(position), Some(velocity)) =
                (world.body_position(handle), world.body_velocity(handle))
            else {
                continue;
            };

            let mut dirtied = Vec::new();
            if let Some(component) = ctx.get_mut::<Position>(&entity_id)? {
                component.position = position;
                dirtied.push(ComponentKind::Position);
            }
            if let Some(component) = ctx.get_mut::<Velocity>(&entity_id)? {
                component.velocity = velocity;
                dirtied.push(ComponentKind::Velocity);
            }
            if !dirtied.is_empty() {
                ctx.mark_dirty(&entity_id, &dirtied);
            }
        }

        ctx.put_singleton(world)?;
        Ok(())
    }
}
