//! State synchronization serializer.
//!
//! Converts a tick's dirty-entity sets into wire payloads:
//! - short sync: the fast path, position/velocity deltas only.
//! - long sync: the slow path, adding derived shape geometry and team color.
//! - full sync: a complete snapshot for a freshly joined player.
//!
//! The incremental variants consume the dirty sets they read, so each change
//! is reported exactly once per sync class. Removals ride along on whichever
//! sync runs first after the removal.

use crate::component::{BodyRef, ComponentKind, EntityId, Position, SyncClass, Team, Velocity};
use crate::context::{Context, EcsError, MatchMode};
use crate::net::{EntityData, LongSync, ShortEntityData, ShortSync};
use crate::physics::PhysicsWorld;

/// Fast-path delta over short-class kinds. Consumes their dirty sets.
///
/// `sort` orders entities by id for reproducible output; otherwise iteration
/// order is unspecified.
pub fn short_sync(ctx: &mut Context, sort: bool) -> Result<ShortSync, EcsError> {
    let kinds = ComponentKind::with_class(SyncClass::Short);
    let ids = collect(ctx.dirty_entities_for(&kinds, true), sort);

    let mut updates = Vec::with_capacity(ids.len());
    for id in &ids {
        updates.push(short_entity(ctx, id)?);
    }
    let remove = collect(ctx.removed_entities(true), sort);
    Ok(ShortSync { updates, remove })
}

/// Slow-path delta over long-class kinds. Consumes their dirty sets.
pub fn long_sync(ctx: &mut Context, sort: bool) -> Result<LongSync, EcsError> {
    let kinds = ComponentKind::with_class(SyncClass::Long);
    let ids = collect(ctx.dirty_entities_for(&kinds, true), sort);

    let mut updates = Vec::with_capacity(ids.len());
    for id in &ids {
        updates.push(long_entity(ctx, id)?);
    }
    let remove = collect(ctx.removed_entities(true), sort);
    Ok(LongSync { updates, remove })
}

/// Complete snapshot of every entity holding at least one synchronized kind,
/// suppressed entities excluded. Resets nothing; sent to a player once on
/// join.
pub fn full_sync(ctx: &Context, sort: bool) -> Result<LongSync, EcsError> {
    let mut kinds = ComponentKind::with_class(SyncClass::Short);
    kinds.extend(ComponentKind::with_class(SyncClass::Long));
    let ids = collect(
        ctx.entities_with(&kinds, MatchMode::Any)
            .into_iter()
            .filter(|id| !ctx.is_suppressed(id))
            .collect(),
        sort,
    );

    let mut updates = Vec::with_capacity(ids.len());
    for id in &ids {
        updates.push(long_entity(ctx, id)?);
    }
    Ok(LongSync { updates, remove: Vec::new() })
}

fn short_entity(ctx: &Context, id: &str) -> Result<ShortEntityData, EcsError> {
    Ok(ShortEntityData {
        id: id.to_string(),
        position: ctx.get::<Position>(id)?.map(|p| p.position),
        velocity: ctx.get::<Velocity>(id)?.map(|v| v.velocity),
    })
}

fn long_entity(ctx: &Context, id: &str) -> Result<EntityData, EcsError> {
    let shape = match ctx.get::<BodyRef>(id)? {
        Some(body) => ctx
            .singleton::<PhysicsWorld>()
            .ok()
            .and_then(|world| world.shape_of(body.handle)),
        None => None,
    };
    let color = ctx.get::<Team>(id)?.map(|team| team.color());

    Ok(EntityData {
        id: id.to_string(),
        position: ctx.get::<Position>(id)?.map(|p| p.position),
        velocity: ctx.get::<Velocity>(id)?.map(|v| v.velocity),
        shape,
        color,
    })
}

fn collect(ids: std::collections::HashSet<EntityId>, sort: bool) -> Vec<EntityId> {
    let mut ids: Vec<EntityId> = ids.into_iter().collect();
    if sort {
        ids.sort();
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentData, Team};
    use crate::context::Repository;
    use crate::math::Vec2;
    use crate::net::ShapeData;

    fn ctx() -> Context {
        Context::new(Repository::full())
    }

    #[test]
    fn short_sync_reports_each_change_once() {
        let mut ctx = ctx();
        ctx.upsert(
            "p1",
            vec![
                Position::origin().into_component(),
                Velocity::still().into_component(),
            ],
        )
        .unwrap();

        let sync = short_sync(&mut ctx, true).unwrap();
        assert_eq!(
            sync.updates,
            vec![ShortEntityData {
                id: "p1".to_string(),
                position: Some(Vec2::ZERO),
                velocity: Some(Vec2::ZERO),
            }]
        );

        // Idempotent until the next mutation.
        let again = short_sync(&mut ctx, true).unwrap();
        assert!(again.updates.is_empty());
        assert!(again.remove.is_empty());
    }

    #[test]
    fn short_sync_nulls_absent_components() {
        let mut ctx = ctx();
        ctx.upsert("p1", vec![Position::at(Vec2::new(1.0, 2.0)).into_component()])
            .unwrap();

        let sync = short_sync(&mut ctx, true).unwrap();
        assert_eq!(sync.updates.len(), 1);
        assert_eq!(sync.updates[0].position, Some(Vec2::new(1.0, 2.0)));
        assert_eq!(sync.updates[0].velocity, None);
    }

    #[test]
    fn short_sync_leaves_long_dirty_state_alone() {
        let mut ctx = ctx();
        ctx.upsert(
            "p1",
            vec![
                Position::origin().into_component(),
                Team { index: 0 }.into_component(),
            ],
        )
        .unwrap();

        short_sync(&mut ctx, true).unwrap();

        let long = long_sync(&mut ctx, true).unwrap();
        assert_eq!(long.updates.len(), 1);
        assert_eq!(long.updates[0].id, "p1");
        assert_eq!(long.updates[0].color, Some(Team { index: 0 }.color()));
    }

    #[test]
    fn long_sync_resolves_shape_from_body() {
        let mut ctx = ctx();
        let mut world = PhysicsWorld::new(Vec2::new(0.0, -10.0));
        let handle = world.create_dynamic_body(Vec2::ZERO);
        world.attach_ball(handle, 0.5, 0.5, 0.5, 0.5);
        ctx.suppress(ComponentKind::PhysicsWorld.name());
        ctx.spawn_singleton(world.into_component()).unwrap();

        ctx.upsert("ball", vec![BodyRef { handle }.into_component()])
            .unwrap();

        let sync = long_sync(&mut ctx, true).unwrap();
        assert_eq!(sync.updates.len(), 1);
        assert_eq!(sync.updates[0].shape, Some(ShapeData::circle(0.0, 0.0, 0.5)));
    }

    #[test]
    fn removed_entities_ride_the_first_sync() {
        let mut ctx = ctx();
        ctx.upsert("p1", vec![Position::origin().into_component()])
            .unwrap();
        short_sync(&mut ctx, true).unwrap();

        ctx.remove("p1");

        let sync = short_sync(&mut ctx, true).unwrap();
        assert!(sync.updates.is_empty());
        assert_eq!(sync.remove, vec!["p1".to_string()]);

        let long = long_sync(&mut ctx, true).unwrap();
        assert!(long.remove.is_empty());
    }

    #[test]
    fn full_sync_covers_clean_entities_and_resets_nothing() {
        let mut ctx = ctx();
        ctx.upsert("p1", vec![Position::origin().into_component()])
            .unwrap();
        ctx.upsert("p2", vec![Team { index: 1 }.into_component()])
            .unwrap();
        ctx.suppress("floor");
        ctx.upsert("floor", vec![Position::origin().into_component()])
            .unwrap();

        let snapshot = full_sync(&ctx, true).unwrap();
        let ids: Vec<&str> = snapshot.updates.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, ["p1", "p2"]);

        // Dirty sets were not consumed.
        let sync = short_sync(&mut ctx, true).unwrap();
        assert_eq!(sync.updates.len(), 1);
    }
}
