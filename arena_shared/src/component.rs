//! Component catalog.
//!
//! Every component kind the simulation knows about is declared here, together
//! with its synchronization class. The catalog is a static, compile-time
//! table: the per-kind dirty sets and the sync serializer are both keyed by
//! [`ComponentKind`], so kinds are a closed enum rather than open types.

use bitflags::bitflags;
use rapier2d::prelude::RigidBodyHandle;
use std::collections::HashSet;

use crate::math::Vec2;
use crate::physics::PhysicsWorld;

/// Opaque entity id. Auto-generated ids are a string-formatted counter;
/// player entities reuse the player id; singleton entities use their
/// component kind name.
pub type EntityId = String;

/// How a component kind participates in state synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncClass {
    /// Sent on every fast tick (position/velocity).
    Short,
    /// Sent on slow ticks (structural data: body, team, markers).
    Long,
    /// Never serialized (engine handles, raw input, rule state).
    NoSync,
}

/// Static catalog of component kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Position,
    Velocity,
    Body,
    Player,
    Team,
    Ball,
    Collidable,
    Input,
    Match,
    PhysicsWorld,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 10] = [
        ComponentKind::Position,
        ComponentKind::Velocity,
        ComponentKind::Body,
        ComponentKind::Player,
        ComponentKind::Team,
        ComponentKind::Ball,
        ComponentKind::Collidable,
        ComponentKind::Input,
        ComponentKind::Match,
        ComponentKind::PhysicsWorld,
    ];

    /// Stable kind name; doubles as the singleton entity id.
    pub fn name(self) -> &'static str {
        match self {
            ComponentKind::Position => "position",
            ComponentKind::Velocity => "velocity",
            ComponentKind::Body => "body",
            ComponentKind::Player => "player",
            ComponentKind::Team => "team",
            ComponentKind::Ball => "ball",
            ComponentKind::Collidable => "collidable",
            ComponentKind::Input => "input",
            ComponentKind::Match => "match",
            ComponentKind::PhysicsWorld => "physics_world",
        }
    }

    pub fn sync_class(self) -> SyncClass {
        match self {
            ComponentKind::Position | ComponentKind::Velocity => SyncClass::Short,
            ComponentKind::Body
            | ComponentKind::Player
            | ComponentKind::Team
            | ComponentKind::Ball => SyncClass::Long,
            ComponentKind::Collidable
            | ComponentKind::Input
            | ComponentKind::Match
            | ComponentKind::PhysicsWorld => SyncClass::NoSync,
        }
    }

    /// All kinds of a given sync class, in catalog order.
    pub fn with_class(class: SyncClass) -> Vec<ComponentKind> {
        Self::ALL
            .iter()
            .copied()
            .filter(|kind| kind.sync_class() == class)
            .collect()
    }
}

/// A component instance attached to exactly one entity under its kind.
#[derive(Debug)]
pub enum Component {
    Position(Position),
    Velocity(Velocity),
    Body(BodyRef),
    Player(Player),
    Team(Team),
    Ball(Ball),
    Collidable(Collidable),
    Input(InputState),
    Match(MatchState),
    PhysicsWorld(PhysicsWorld),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::Position(_) => ComponentKind::Position,
            Component::Velocity(_) => ComponentKind::Velocity,
            Component::Body(_) => ComponentKind::Body,
            Component::Player(_) => ComponentKind::Player,
            Component::Team(_) => ComponentKind::Team,
            Component::Ball(_) => ComponentKind::Ball,
            Component::Collidable(_) => ComponentKind::Collidable,
            Component::Input(_) => ComponentKind::Input,
            Component::Match(_) => ComponentKind::Match,
            Component::PhysicsWorld(_) => ComponentKind::PhysicsWorld,
        }
    }
}

/// Links a typed payload to its kind for generic store access.
pub trait ComponentData: Sized {
    const KIND: ComponentKind;

    fn into_component(self) -> Component;
    fn from_component(component: &Component) -> Option<&Self>;
    fn from_component_mut(component: &mut Component) -> Option<&mut Self>;
    fn from_component_owned(component: Component) -> Option<Self>;
}

macro_rules! component_data {
    ($ty:ty, $variant:ident) => {
        impl ComponentData for $ty {
            const KIND: ComponentKind = ComponentKind::$variant;

            fn into_component(self) -> Component {
                Component::$variant(self)
            }

            fn from_component(component: &Component) -> Option<&Self> {
                match component {
                    Component::$variant(value) => Some(value),
                    _ => None,
                }
            }

            fn from_component_mut(component: &mut Component) -> Option<&mut Self> {
                match component {
                    Component::$variant(value) => Some(value),
                    _ => None,
                }
            }

            fn from_component_owned(component: Component) -> Option<Self> {
                match component {
                    Component::$variant(value) => Some(value),
                    _ => None,
                }
            }
        }
    };
}

component_data!(Position, Position);
component_data!(Velocity, Velocity);
component_data!(BodyRef, Body);
component_data!(Player, Player);
component_data!(Team, Team);
component_data!(Ball, Ball);
component_data!(Collidable, Collidable);
component_data!(InputState, Input);
component_data!(MatchState, Match);
component_data!(PhysicsWorld, PhysicsWorld);

/// World-space position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub position: Vec2,
}

impl Position {
    pub fn origin() -> Self {
        Self { position: Vec2::ZERO }
    }

    pub fn at(position: Vec2) -> Self {
        Self { position }
    }
}

/// Linear velocity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity {
    pub velocity: Vec2,
}

impl Velocity {
    pub fn still() -> Self {
        Self { velocity: Vec2::ZERO }
    }
}

/// Handle into the physics world's rigid-body set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyRef {
    pub handle: RigidBodyHandle,
}

/// Marks an entity as a connected player's avatar.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Player;

/// Team colors, indexed by team.
pub const TEAM_COLORS: [u32; 4] = [0x00e7_4c3c, 0x0034_98db, 0x002e_cc71, 0x00f1_c40f];

/// Team membership.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Team {
    pub index: u32,
}

impl Team {
    /// Display color for this team.
    pub fn color(&self) -> u32 {
        TEAM_COLORS[self.index as usize % TEAM_COLORS.len()]
    }
}

/// Marks the match ball.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Ball;

/// Tracks which entities this one is currently touching.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Collidable {
    pub collides_with: HashSet<EntityId>,
}

bitflags! {
    /// Movement buttons decoded from the client's key lists.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Buttons: u8 {
        const LEFT = 1 << 0;
        const RIGHT = 1 << 1;
        const UP = 1 << 2;
    }
}

impl Default for Buttons {
    fn default() -> Self {
        Buttons::empty()
    }
}

pub const KEY_LEFT: &str = "ArrowLeft";
pub const KEY_RIGHT: &str = "ArrowRight";
pub const KEY_UP: &str = "ArrowUp";
pub const KEY_RESTART: &str = "Enter";

impl Buttons {
    /// Decodes browser key names into button flags; unknown keys are ignored.
    pub fn from_keys<S: AsRef<str>>(keys: &[S]) -> Self {
        let mut buttons = Buttons::empty();
        for key in keys {
            match key.as_ref() {
                KEY_LEFT => buttons |= Buttons::LEFT,
                KEY_RIGHT => buttons |= Buttons::RIGHT,
                KEY_UP => buttons |= Buttons::UP,
                _ => {}
            }
        }
        buttons
    }
}

/// Raw per-player input state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputState {
    pub buttons: Buttons,
}

/// Match phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    NotStarted,
    Started,
    Paused,
    Ended,
}

/// Match rules singleton.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchState {
    pub phase: MatchPhase,
    pub teams: Vec<u32>,
}

impl Default for MatchState {
    fn default() -> Self {
        Self {
            phase: MatchPhase::NotStarted,
            teams: vec![0, 1],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_classes_partition_the_catalog() {
        let short = ComponentKind::with_class(SyncClass::Short);
        let long = ComponentKind::with_class(SyncClass::Long);
        let unsynced = ComponentKind::with_class(SyncClass::NoSync);
        assert_eq!(short.len() + long.len() + unsynced.len(), ComponentKind::ALL.len());
        assert!(short.contains(&ComponentKind::Position));
        assert!(long.contains(&ComponentKind::Body));
        assert!(unsynced.contains(&ComponentKind::PhysicsWorld));
    }

    #[test]
    fn buttons_decode_known_keys() {
        let buttons = Buttons::from_keys(&[KEY_LEFT, KEY_UP, "KeyQ"]);
        assert_eq!(buttons, Buttons::LEFT | Buttons::UP);
    }

    #[test]
    fn team_color_wraps_palette() {
        assert_eq!(Team { index: 0 }.color(), TEAM_COLORS[0]);
        assert_eq!(Team { index: 5 }.color(), TEAM_COLORS[1]);
    }
}
