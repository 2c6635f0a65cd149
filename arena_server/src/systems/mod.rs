//! Gameplay systems.
//!
//! Each room instantiates these through [`default_systems`]; the dependency
//! resolver orders them from their declared prerequisites.

pub mod contact;
pub mod level;
pub mod match_system;
pub mod physics;
pub mod player;

use arena_shared::system::System;

pub use contact::ContactSystem;
pub use level::LevelSystem;
pub use match_system::MatchSystem;
pub use physics::PhysicsSystem;
pub use player::PlayerSystem;

/// The system list instantiated for every new room.
pub fn default_systems() -> Vec<Box<dyn System>> {
    vec![
        Box::new(PlayerSystem),
        Box::new(PhysicsSystem),
        Box::new(ContactSystem),
        Box::new(LevelSystem::new()),
        Box::new(MatchSystem),
    ]
}

#[cfg(test)]
pub(crate) mod testutil {
    use arena_shared::context::{Context, Repository};
    use arena_shared::net::RoomMeta;
    use arena_shared::system::{GameEvent, SystemSet};

    pub fn test_room() -> RoomMeta {
        RoomMeta {
            id: "room0".to_string(),
            name: "test room".to_string(),
            players: Vec::new(),
            max_players: 4,
            private: false,
            level: "beach".to_string(),
        }
    }

    /// A fully initialized room context plus its resolved system set.
    pub fn init_room() -> (Context, SystemSet) {
        let mut ctx = Context::new(Repository::full());
        let mut systems = SystemSet::resolve(super::default_systems()).unwrap();
        systems
            .dispatch(&mut ctx, GameEvent::Init(&test_room()))
            .unwrap();
        (ctx, systems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::system::SystemSet;

    #[test]
    fn default_systems_resolve_with_physics_before_consumers() {
        let set = SystemSet::resolve(default_systems()).unwrap();
        assert_eq!(set.names(), ["player", "physics", "contact", "level", "match"]);
    }
}
