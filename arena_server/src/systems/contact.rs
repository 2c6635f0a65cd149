//! Contact tracking system.
//!
//! Runs after the physics step and folds the world's begin/end contact
//! events into each collidable entity's `collides_with` set.

use anyhow::Result;

use arena_shared::component::{Collidable, ComponentKind};
use arena_shared::context::{Context, MatchMode};
use arena_shared::physics::PhysicsWorld;
use arena_shared::system::System;

pub struct ContactSystem;

impl System for ContactSystem {
    fn name(&self) -> &'static str {
        "contact"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["physics"]
    }

    fn on_update_frame(&mut self, ctx: &mut Context, _dt: f32) -> Result<()> {
        let mut world: PhysicsWorld = ctx.take_singleton()?;
        let events = world.drain_contact_events();
        ctx.put_singleton(world)?;
        if events.is_empty() {
            return Ok(());
        }

        let tracked =
            ctx.entities_with(&[ComponentKind::Body, ComponentKind::Collidable], MatchMode::All);
        for event in events {
            let pairs = [
                (&event.entity_a, &event.entity_b),
                (&event.entity_b, &event.entity_a),
            ];
            for (entity_id, other) in pairs {
                if !tracked.contains(entity_id.as_str()) {
                    continue;
                }
                if let Some(collidable) = ctx.get_mut::<Collidable>(entity_id)? {
                    if event.started {
                        collidable.collides_with.insert(other.clone());
                    } else {
                        collidable.collides_with.remove(other.as_str());
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::physics::PhysicsSystem;
    use crate::systems::testutil::test_room;
    use arena_shared::component::{BodyRef, ComponentData};
    use arena_shared::context::Repository;
    use arena_shared::math::Vec2;

    #[test]
    fn contacts_update_collides_with_sets() {
        let mut ctx = Context::new(Repository::full());
        PhysicsSystem.on_init(&mut ctx, &test_room()).unwrap();

        let mut world: PhysicsWorld = ctx.take_singleton().unwrap();
        let falling = world.create_dynamic_body(Vec2::new(0.0, 0.0));
        world.attach_ball(falling, 0.5, 0.5, 0.5, 0.0);
        let resting = world.create_fixed_body(Vec2::new(0.0, -1.5));
        world.attach_cuboid(resting, 2.0, 0.5, 1.0, 0.3, 0.0);
        ctx.put_singleton(world).unwrap();

        ctx.upsert(
            "drop",
            vec![
                BodyRef { handle: falling }.into_component(),
                Collidable::default().into_component(),
            ],
        )
        .unwrap();
        ctx.upsert(
            "ledge",
            vec![
                BodyRef { handle: resting }.into_component(),
                Collidable::default().into_component(),
            ],
        )
        .unwrap();

        let mut physics = PhysicsSystem;
        let mut contact = ContactSystem;
        for _ in 0..120 {
            physics.on_update_frame(&mut ctx, 1.0 / 60.0).unwrap();
            contact.on_update_frame(&mut ctx, 1.0 / 60.0).unwrap();
        }

        let collidable = ctx.get_required::<Collidable>("drop").unwrap();
        assert!(collidable.collides_with.contains("ledge"));
    }
}
