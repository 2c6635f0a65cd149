//! Match rules system.
//!
//! Creates the match singleton and the ball on room init, and flips the
//! match phase once the first player arrives.

use anyhow::Result;

use arena_shared::component::{
    Ball, BodyRef, Collidable, ComponentData, MatchPhase, MatchState, Position, Velocity,
};
use arena_shared::context::Context;
use arena_shared::math::Vec2;
use arena_shared::net::RoomMeta;
use arena_shared::physics::PhysicsWorld;
use arena_shared::system::System;

pub const BALL_ID: &str = "ball";

const BALL_SPAWN: Vec2 = Vec2::new(2.0, 0.0);

pub struct MatchSystem;

impl System for MatchSystem {
    fn name(&self) -> &'static str {
        "match"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["player"]
    }

    fn on_init(&mut self, ctx: &mut Context, _room: &RoomMeta) -> Result<()> {
        ctx.upsert_singleton(MatchState::default().into_component())?;
        self.spawn_ball(ctx)?;
        Ok(())
    }

    fn on_player_join(&mut self, ctx: &mut Context, _player_id: &str) -> Result<()> {
        let match_state = ctx.singleton_mut::<MatchState>()?;
        if match_state.phase == MatchPhase::NotStarted {
            match_state.phase = MatchPhase::Started;
        }
        Ok(())
    }
}

impl MatchSystem {
    fn spawn_ball(&self, ctx: &mut Context) -> Result<()> {
        let mut world: PhysicsWorld = ctx.take_singleton()?;
        let handle = world.create_dynamic_body(BALL_SPAWN);
        world.attach_ball(handle, 0.5, 0.5, 0.5, 0.5);
        ctx.put_singleton(world)?;

        ctx.upsert(
            BALL_ID,
            vec![
                BodyRef { handle }.into_component(),
                Position::at(BALL_SPAWN).into_component(),
                Velocity::still().into_component(),
                Ball.into_component(),
                Collidable::default().into_component(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::testutil::init_room;
    use arena_shared::system::GameEvent;

    #[test]
    fn init_creates_match_singleton_and_ball() {
        let (ctx, _systems) = init_room();

        let match_state = ctx.singleton::<MatchState>().unwrap();
        assert_eq!(match_state.phase, MatchPhase::NotStarted);
        assert_eq!(match_state.teams, vec![0, 1]);
        assert!(ctx.get::<BodyRef>(BALL_ID).unwrap().is_some());
        assert!(ctx.get::<Ball>(BALL_ID).unwrap().is_some());
    }

    #[test]
    fn first_join_starts_the_match() {
        let (mut ctx, mut systems) = init_room();
        systems
            .dispatch(&mut ctx, GameEvent::PlayerJoin { player_id: "p1" })
            .unwrap();

        assert_eq!(ctx.singleton::<MatchState>().unwrap().phase, MatchPhase::Started);
    }
}
