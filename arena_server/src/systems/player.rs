//! Player avatar system.
//!
//! Spawns a dynamic body per joining player, balances team assignment, feeds
//! movement input into the physics world, and frees the body on leave.

use std::collections::HashMap;

use anyhow::Result;

use arena_shared::component::{
    BodyRef, Buttons, ComponentData, ComponentKind, InputState, MatchState, Player, Position,
    Team, Velocity,
};
use arena_shared::context::{Context, MatchMode};
use arena_shared::math::Vec2;
use arena_shared::net::PlayerInput;
use arena_shared::physics::PhysicsWorld;
use arena_shared::system::System;

const MOVE_FORCE: f32 = 30.0;
const JUMP_IMPULSE: f32 = 10.0;

pub struct PlayerSystem;

impl System for PlayerSystem {
    fn name(&self) -> &'static str {
        "player"
    }

    fn on_player_join(&mut self, ctx: &mut Context, player_id: &str) -> Result<()> {
        self.spawn_player(ctx, player_id)?;
        self.assign_team(ctx, player_id)?;
        Ok(())
    }

    fn on_input(&mut self, ctx: &mut Context, player_id: &str, input: &PlayerInput) -> Result<()> {
        let held = Buttons::from_keys(&input.keys_down);
        let pressed = Buttons::from_keys(input.keys_pressed.as_deref().unwrap_or(&[]));
        ctx.upsert(
            player_id,
            vec![InputState { buttons: held }.into_component()],
        )?;

        let Some(body_ref) = ctx.get::<BodyRef>(player_id)? else {
            return Ok(());
        };
        let handle = body_ref.handle;

        let mut world: PhysicsWorld = ctx.take_singleton()?;
        if held.contains(Buttons::LEFT) {
            world.apply_force(handle, Vec2::new(-MOVE_FORCE, 0.0));
        }
        if held.contains(Buttons::RIGHT) {
            world.apply_force(handle, Vec2::new(MOVE_FORCE, 0.0));
        }
        if pressed.contains(Buttons::UP) {
            world.apply_impulse(handle, Vec2::new(0.0, JUMP_IMPULSE));
        }
        ctx.put_singleton(world)?;
        Ok(())
    }

    fn on_player_leave(&mut self, ctx: &mut Context, player_id: &str) -> Result<()> {
        let Some(body_ref) = ctx.get::<BodyRef>(player_id)? else {
            return Ok(());
        };
        let handle = body_ref.handle;

        let mut world: PhysicsWorld = ctx.take_singleton()?;
        world.remove_body(handle);
        ctx.put_singleton(world)?;
        Ok(())
    }
}

impl PlayerSystem {
    fn spawn_player(&self, ctx: &mut Context, player_id: &str) -> Result<()> {
        let mut world: PhysicsWorld = ctx.take_singleton()?;
        let handle = world.create_dynamic_body(Vec2::ZERO);
        world.attach_cuboid(handle, 1.0, 1.0, 1.0, 0.3, 0.0);
        ctx.put_singleton(world)?;

        ctx.upsert(
            player_id,
            vec![
                BodyRef { handle }.into_component(),
                Position::origin().into_component(),
                Velocity::still().into_component(),
                Player.into_component(),
            ],
        )?;
        Ok(())
    }

    /// Seats the player on the team with the fewest members; declared team
    /// order breaks ties.
    fn assign_team(&self, ctx: &mut Context, player_id: &str) -> Result<()> {
        let teams = ctx.singleton::<MatchState>()?.teams.clone();

        let mut player_count: HashMap<u32, usize> =
            teams.iter().map(|team| (*team, 0)).collect();
        for entity_id in
            ctx.entities_with(&[ComponentKind::Team, ComponentKind::Player], MatchMode::All)
        {
            let team = ctx.get_required::<Team>(&entity_id)?;
            *player_count.entry(team.index).or_insert(0) += 1;
        }

        let mut chosen: Option<(u32, usize)> = None;
        for team in teams {
            let count = player_count.get(&team).copied().unwrap_or(0);
            match chosen {
                Some((_, best)) if count >= best => {}
                _ => chosen = Some((team, count)),
            }
        }
        let index = chosen.map(|(team, _)| team).unwrap_or(0);

        ctx.upsert(player_id, vec![Team { index }.into_component()])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::testutil::init_room;
    use arena_shared::component::KEY_RIGHT;
    use arena_shared::system::GameEvent;

    #[test]
    fn join_spawns_body_position_velocity_and_team() {
        let (mut ctx, mut systems) = init_room();
        systems
            .dispatch(&mut ctx, GameEvent::PlayerJoin { player_id: "p1" })
            .unwrap();

        assert!(ctx.get::<BodyRef>("p1").unwrap().is_some());
        assert!(ctx.get::<Position>("p1").unwrap().is_some());
        assert!(ctx.get::<Velocity>("p1").unwrap().is_some());
        assert!(ctx.get::<Player>("p1").unwrap().is_some());
        assert!(ctx.get::<Team>("p1").unwrap().is_some());
    }

    #[test]
    fn teams_balance_across_joins() {
        let (mut ctx, mut systems) = init_room();
        for player in ["p1", "p2"] {
            systems
                .dispatch(&mut ctx, GameEvent::PlayerJoin { player_id: player })
                .unwrap();
        }

        let first = ctx.get_required::<Team>("p1").unwrap().index;
        let second = ctx.get_required::<Team>("p2").unwrap().index;
        assert_ne!(first, second);
    }

    #[test]
    fn input_stores_button_state() {
        let (mut ctx, mut systems) = init_room();
        systems
            .dispatch(&mut ctx, GameEvent::PlayerJoin { player_id: "p1" })
            .unwrap();

        let input = PlayerInput {
            keys_down: vec![KEY_RIGHT.to_string()],
            keys_pressed: None,
            keys_released: None,
        };
        systems
            .dispatch(&mut ctx, GameEvent::Input { player_id: "p1", input: &input })
            .unwrap();

        let state = ctx.get_required::<InputState>("p1").unwrap();
        assert_eq!(state.buttons, Buttons::RIGHT);
    }

    #[test]
    fn leave_frees_the_player_body() {
        let (mut ctx, mut systems) = init_room();
        systems
            .dispatch(&mut ctx, GameEvent::PlayerJoin { player_id: "p1" })
            .unwrap();
        let handle = ctx.get::<BodyRef>("p1").unwrap().unwrap().handle;

        systems
            .dispatch(&mut ctx, GameEvent::PlayerLeave { player_id: "p1" })
            .unwrap();

        let world = ctx.singleton::<PhysicsWorld>().unwrap();
        assert!(world.body(handle).is_none());
        assert_eq!(world.body_entity(handle), None);
    }
}
