//! Physics world wrapper.
//!
//! Thin ownership layer over the rapier2d rigid-body engine. The simulation
//! core never reaches into rapier directly: it stores body handles as
//! components and goes through this wrapper for stepping, body bookkeeping,
//! contact events, and shape extraction. Bodies are tagged with the entity id
//! that owns them so contact pairs resolve back to entities.

use std::collections::HashMap;
use std::sync::Mutex;

use rapier2d::prelude::*;

use crate::math::Vec2;
use crate::net::ShapeData;

pub use rapier2d::prelude::RigidBodyHandle;

/// Begin/end of contact between two tagged bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactEvent {
    pub entity_a: String,
    pub entity_b: String,
    pub started: bool,
}

/// The rigid-body world owned by one room.
pub struct PhysicsWorld {
    gravity: Vector<f32>,
    integration_parameters: IntegrationParameters,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    /// Body -> owning entity, maintained via [`PhysicsWorld::bind_entity`].
    entity_by_body: HashMap<RigidBodyHandle, String>,
    /// Contact events accumulated by the last steps, until drained.
    contact_events: Vec<ContactEvent>,
}

impl std::fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("bodies", &self.bodies.len())
            .field("colliders", &self.colliders.len())
            .field("tagged", &self.entity_by_body.len())
            .finish()
    }
}

impl PhysicsWorld {
    pub fn new(gravity: Vec2) -> Self {
        Self {
            gravity: vector![gravity.x, gravity.y],
            integration_parameters: IntegrationParameters::default(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            entity_by_body: HashMap::new(),
            contact_events: Vec::new(),
        }
    }

    /// Advances the simulation by `dt` seconds, collects contact events, and
    /// clears accumulated forces.
    pub fn step(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;

        let collector = EventCollector::default();
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &collector,
        );

        for event in collector.drain() {
            let (a, b, started) = match event {
                CollisionEvent::Started(a, b, _) => (a, b, true),
                CollisionEvent::Stopped(a, b, _) => (a, b, false),
            };
            let entity_a = self.collider_entity(a).map(str::to_string);
            let entity_b = self.collider_entity(b).map(str::to_string);
            if let (Some(entity_a), Some(entity_b)) = (entity_a, entity_b) {
                self.contact_events
                    .push(ContactEvent { entity_a, entity_b, started });
            }
        }

        for (_, body) in self.bodies.iter_mut() {
            body.reset_forces(false);
        }
    }

    pub fn create_dynamic_body(&mut self, position: Vec2) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(vector![position.x, position.y])
            .build();
        self.bodies.insert(body)
    }

    pub fn create_fixed_body(&mut self, position: Vec2) -> RigidBodyHandle {
        let body = RigidBodyBuilder::fixed()
            .translation(vector![position.x, position.y])
            .build();
        self.bodies.insert(body)
    }

    /// Attaches a box collider (half extents) to a body.
    pub fn attach_cuboid(
        &mut self,
        handle: RigidBodyHandle,
        half_x: f32,
        half_y: f32,
        density: f32,
        friction: f32,
        restitution: f32,
    ) {
        let collider = ColliderBuilder::cuboid(half_x, half_y)
            .density(density)
            .friction(friction)
            .restitution(restitution)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
    }

    /// Attaches a circle collider to a body.
    pub fn attach_ball(
        &mut self,
        handle: RigidBodyHandle,
        radius: f32,
        density: f32,
        friction: f32,
        restitution: f32,
    ) {
        let collider = ColliderBuilder::ball(radius)
            .density(density)
            .friction(friction)
            .restitution(restitution)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
    }

    /// Attaches an edge collider (level floor and walls).
    pub fn attach_segment(&mut self, handle: RigidBodyHandle, a: Vec2, b: Vec2) {
        let collider = ColliderBuilder::segment(point![a.x, a.y], point![b.x, b.y])
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
    }

    /// Tags a body with its owning entity id.
    pub fn bind_entity(&mut self, handle: RigidBodyHandle, entity_id: &str) {
        self.entity_by_body.insert(handle, entity_id.to_string());
    }

    /// Frees a body, its colliders, and its entity tag.
    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        self.entity_by_body.remove(&handle);
    }

    pub fn body(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    pub fn body_position(&self, handle: RigidBodyHandle) -> Option<Vec2> {
        let t = self.bodies.get(handle)?.translation();
        Some(Vec2::new(t.x, t.y))
    }

    pub fn body_velocity(&self, handle: RigidBodyHandle) -> Option<Vec2> {
        let v = self.bodies.get(handle)?.linvel();
        Some(Vec2::new(v.x, v.y))
    }

    pub fn body_is_awake(&self, handle: RigidBodyHandle) -> bool {
        self.bodies
            .get(handle)
            .map_or(false, |body| !body.is_sleeping())
    }

    /// Applies a continuous force until the next step clears it.
    pub fn apply_force(&mut self, handle: RigidBodyHandle, force: Vec2) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.add_force(vector![force.x, force.y], true);
        }
    }

    pub fn apply_impulse(&mut self, handle: RigidBodyHandle, impulse: Vec2) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.apply_impulse(vector![impulse.x, impulse.y], true);
        }
    }

    /// Wakes a body and teleports it to an upright pose at `position`.
    pub fn reset_pose(&mut self, handle: RigidBodyHandle, position: Vec2) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.wake_up(true);
            body.set_rotation(Rotation::identity(), true);
            body.set_translation(vector![position.x, position.y], true);
            body.set_linvel(vector![0.0, 0.0], true);
            body.set_angvel(0.0, true);
        }
    }

    /// Entity owning the given body, if tagged.
    pub fn body_entity(&self, handle: RigidBodyHandle) -> Option<&str> {
        self.entity_by_body.get(&handle).map(String::as_str)
    }

    fn collider_entity(&self, handle: ColliderHandle) -> Option<&str> {
        let parent = self.colliders.get(handle)?.parent()?;
        self.body_entity(parent)
    }

    /// Takes the contact events accumulated since the last drain.
    pub fn drain_contact_events(&mut self) -> Vec<ContactEvent> {
        std::mem::take(&mut self.contact_events)
    }

    /// Wire-ready descriptor of the body's first collider shape, offset in
    /// body-local coordinates. `None` for bodies without a collider or with
    /// a shape the wire format cannot carry.
    pub fn shape_of(&self, handle: RigidBodyHandle) -> Option<ShapeData> {
        let collider_handle = self.bodies.get(handle)?.colliders().first()?;
        let collider = self.colliders.get(*collider_handle)?;
        let offset = collider
            .position_wrt_parent()
            .map(|iso| iso.translation.vector)
            .unwrap_or_else(|| vector![0.0, 0.0]);

        match collider.shape().as_typed_shape() {
            TypedShape::Ball(ball) => Some(ShapeData::circle(offset.x, offset.y, ball.radius)),
            TypedShape::Cuboid(cuboid) => {
                let half = cuboid.half_extents;
                Some(ShapeData::rect(
                    offset.x - half.x,
                    offset.y - half.y,
                    half.x * 2.0,
                    half.y * 2.0,
                ))
            }
            TypedShape::ConvexPolygon(polygon) => Some(ShapeData::polygon(
                offset.x,
                offset.y,
                polygon.points().iter().map(|p| (p.x, p.y)).collect(),
            )),
            _ => None,
        }
    }
}

/// Collects rapier collision events during a step.
#[derive(Default)]
struct EventCollector {
    collisions: Mutex<Vec<CollisionEvent>>,
}

impl EventCollector {
    fn drain(&self) -> Vec<CollisionEvent> {
        std::mem::take(&mut *self.collisions.lock().expect("event collector poisoned"))
    }
}

impl EventHandler for EventCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        self.collisions
            .lock()
            .expect("event collector poisoned")
            .push(event);
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_body_falls_under_gravity() {
        let mut world = PhysicsWorld::new(Vec2::new(0.0, -10.0));
        let handle = world.create_dynamic_body(Vec2::new(0.0, 10.0));
        world.attach_cuboid(handle, 0.5, 0.5, 1.0, 0.3, 0.0);

        for _ in 0..30 {
            world.step(1.0 / 60.0);
        }

        let body = world.body(handle).unwrap();
        assert!(body.translation().y < 10.0);
        assert!(body.linvel().y < 0.0);
    }

    #[test]
    fn contact_events_resolve_to_tagged_entities() {
        let mut world = PhysicsWorld::new(Vec2::new(0.0, -10.0));

        let floor = world.create_fixed_body(Vec2::ZERO);
        world.attach_segment(floor, Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0));
        world.bind_entity(floor, "floor");

        let faller = world.create_dynamic_body(Vec2::new(0.0, 2.0));
        world.attach_ball(faller, 0.5, 0.5, 0.5, 0.0);
        world.bind_entity(faller, "ball");

        for _ in 0..240 {
            world.step(1.0 / 60.0);
        }

        let events = world.drain_contact_events();
        assert!(events.iter().any(|event| {
            event.started
                && ((event.entity_a == "floor" && event.entity_b == "ball")
                    || (event.entity_a == "ball" && event.entity_b == "floor"))
        }));
    }

    #[test]
    fn shape_of_reports_collider_geometry() {
        let mut world = PhysicsWorld::new(Vec2::ZERO);

        let boxy = world.create_dynamic_body(Vec2::ZERO);
        world.attach_cuboid(boxy, 0.5, 1.0, 1.0, 0.3, 0.0);
        assert_eq!(world.shape_of(boxy), Some(ShapeData::rect(-0.5, -1.0, 1.0, 2.0)));

        let round = world.create_dynamic_body(Vec2::ZERO);
        world.attach_ball(round, 0.5, 0.5, 0.5, 0.5);
        assert_eq!(world.shape_of(round), Some(ShapeData::circle(0.0, 0.0, 0.5)));

        let bare = world.create_dynamic_body(Vec2::ZERO);
        assert_eq!(world.shape_of(bare), None);
    }

    #[test]
    fn remove_body_clears_tag() {
        let mut world = PhysicsWorld::new(Vec2::ZERO);
        let handle = world.create_dynamic_body(Vec2::ZERO);
        world.bind_entity(handle, "gone");

        world.remove_body(handle);

        assert!(world.body(handle).is_none());
        assert_eq!(world.body_entity(handle), None);
    }
}
