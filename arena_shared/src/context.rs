//! Entity store.
//!
//! The [`Context`] is the per-room associative store of components keyed by
//! entity id and component kind. On top of plain storage it tracks, per kind,
//! which entities changed since the dirty set was last consumed, plus a
//! global removed set — the raw material for the sync serializer.
//!
//! One context is exclusively owned by one room; contexts are never shared.

use std::collections::{HashMap, HashSet};

use rapier2d::prelude::RigidBodyHandle;

use crate::component::{Component, ComponentData, ComponentKind, EntityId};
use crate::physics::PhysicsWorld;

/// Entity-store errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// The repository schema has no table for this kind. Programmer error,
    /// always fatal to the call.
    UnknownComponentKind(ComponentKind),
    /// A required component lookup came up empty.
    NotFound { entity: EntityId, kind: ComponentKind },
}

impl std::fmt::Display for EcsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EcsError::UnknownComponentKind(kind) => {
                write!(f, "repository does not have a table for `{}`", kind.name())
            }
            EcsError::NotFound { entity, kind } => {
                write!(f, "entity `{}` has no `{}` component", entity, kind.name())
            }
        }
    }
}

impl std::error::Error for EcsError {}

/// Component tables, kind -> (entity id -> component instance).
///
/// Built from an explicit kind list; operations referencing a kind outside
/// that list fail with [`EcsError::UnknownComponentKind`].
#[derive(Debug, Default)]
pub struct Repository {
    tables: HashMap<ComponentKind, HashMap<EntityId, Component>>,
}

impl Repository {
    /// Repository with a table for every cataloged kind.
    pub fn full() -> Self {
        Self::with_kinds(&ComponentKind::ALL)
    }

    /// Repository restricted to the given kinds.
    pub fn with_kinds(kinds: &[ComponentKind]) -> Self {
        Self {
            tables: kinds.iter().map(|kind| (*kind, HashMap::new())).collect(),
        }
    }

    pub fn kinds(&self) -> impl Iterator<Item = ComponentKind> + '_ {
        self.tables.keys().copied()
    }

    fn table(&self, kind: ComponentKind) -> Result<&HashMap<EntityId, Component>, EcsError> {
        self.tables.get(&kind).ok_or(EcsError::UnknownComponentKind(kind))
    }

    fn table_mut(
        &mut self,
        kind: ComponentKind,
    ) -> Result<&mut HashMap<EntityId, Component>, EcsError> {
        self.tables
            .get_mut(&kind)
            .ok_or(EcsError::UnknownComponentKind(kind))
    }
}

/// Index-set matching mode for [`Context::entities_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Intersection of the kinds' index sets.
    All,
    /// Union of the kinds' index sets.
    Any,
}

/// One row returned by [`Context::all`].
#[derive(Debug)]
pub struct EntityRow<'a> {
    pub entity_id: EntityId,
    /// Components for the required kinds, in argument order.
    pub required: Vec<&'a Component>,
    /// Components for the optional kinds; `None` where absent.
    pub optional: Vec<Option<&'a Component>>,
}

/// Per-room entity store with change tracking.
pub struct Context {
    repository: Repository,
    /// Kind -> entities currently holding that kind.
    entities: HashMap<ComponentKind, HashSet<EntityId>>,
    /// Kind -> entities changed since last consumed.
    dirty: HashMap<ComponentKind, HashSet<EntityId>>,
    /// Entities removed since last consumed.
    removed: HashSet<EntityId>,
    /// Entities whose changes are never recorded.
    suppressed: HashSet<EntityId>,
    counter: u64,
}

impl Context {
    pub fn new(repository: Repository) -> Self {
        let mut entities: HashMap<ComponentKind, HashSet<EntityId>> = HashMap::new();
        for (kind, table) in &repository.tables {
            entities.insert(*kind, table.keys().cloned().collect());
        }
        Self {
            repository,
            entities,
            dirty: HashMap::new(),
            removed: HashSet::new(),
            suppressed: HashSet::new(),
            counter: 0,
        }
    }

    /// Creates a new entity with a fresh auto-generated id.
    pub fn spawn(&mut self, components: Vec<Component>) -> Result<EntityId, EcsError> {
        let entity_id = self.next_id();
        self.upsert(&entity_id, components)?;
        Ok(entity_id)
    }

    /// Creates or updates the singleton entity named after the component kind.
    pub fn spawn_singleton(&mut self, component: Component) -> Result<EntityId, EcsError> {
        self.upsert_singleton(component)
    }

    /// Creates or updates the singleton entity named after the component kind.
    pub fn upsert_singleton(&mut self, component: Component) -> Result<EntityId, EcsError> {
        let entity_id = component.kind().name().to_string();
        self.upsert(&entity_id, vec![component])?;
        Ok(entity_id)
    }

    /// Inserts or overwrites the given components for `entity_id`.
    ///
    /// Atomic over the whole call: every kind is validated against the
    /// repository schema before any table is touched, so an unknown kind
    /// rejects the call without partial mutation. Marks each kind dirty for
    /// the entity unless the entity is suppressed.
    pub fn upsert(&mut self, entity_id: &str, components: Vec<Component>) -> Result<(), EcsError> {
        for component in &components {
            self.repository.table(component.kind())?;
        }

        let suppressed = self.suppressed.contains(entity_id);
        let mut body_handles = Vec::new();
        for component in components {
            let kind = component.kind();
            if let Component::Body(body) = &component {
                body_handles.push(body.handle);
            }
            self.repository
                .table_mut(kind)
                .expect("kind validated above")
                .insert(entity_id.to_string(), component);
            self.entities
                .entry(kind)
                .or_default()
                .insert(entity_id.to_string());
            if !suppressed {
                self.dirty
                    .entry(kind)
                    .or_default()
                    .insert(entity_id.to_string());
            }
        }

        for handle in body_handles {
            self.register_body_entity(entity_id, handle);
        }
        Ok(())
    }

    /// Optional lookup: `Ok(None)` when the entity lacks the component,
    /// `Err` only when the kind itself is outside the repository schema.
    pub fn get<T: ComponentData>(&self, entity_id: &str) -> Result<Option<&T>, EcsError> {
        let table = self.repository.table(T::KIND)?;
        Ok(table.get(entity_id).and_then(T::from_component))
    }

    /// Mutable variant of [`Context::get`]. Does not mark anything dirty;
    /// callers that mutate in place follow up with [`Context::mark_dirty`].
    pub fn get_mut<T: ComponentData>(&mut self, entity_id: &str) -> Result<Option<&mut T>, EcsError> {
        let table = self.repository.table_mut(T::KIND)?;
        Ok(table.get_mut(entity_id).and_then(T::from_component_mut))
    }

    /// Required lookup: fails with [`EcsError::NotFound`] when absent.
    pub fn get_required<T: ComponentData>(&self, entity_id: &str) -> Result<&T, EcsError> {
        self.get::<T>(entity_id)?.ok_or_else(|| EcsError::NotFound {
            entity: entity_id.to_string(),
            kind: T::KIND,
        })
    }

    /// Returns the singleton component of type `T`.
    pub fn singleton<T: ComponentData>(&self) -> Result<&T, EcsError> {
        self.get_required::<T>(T::KIND.name())
    }

    /// Mutable singleton access.
    pub fn singleton_mut<T: ComponentData>(&mut self) -> Result<&mut T, EcsError> {
        let name = T::KIND.name();
        self.get_mut::<T>(name)?.ok_or(EcsError::NotFound {
            entity: name.to_string(),
            kind: T::KIND,
        })
    }

    /// Detaches a singleton component by value so it can be mutated alongside
    /// the rest of the store. Pair with [`Context::put_singleton`].
    pub fn take_singleton<T: ComponentData>(&mut self) -> Result<T, EcsError> {
        let name = T::KIND.name();
        let table = self.repository.table_mut(T::KIND)?;
        let component = table.remove(name).ok_or(EcsError::NotFound {
            entity: name.to_string(),
            kind: T::KIND,
        })?;
        T::from_component_owned(component).ok_or(EcsError::NotFound {
            entity: name.to_string(),
            kind: T::KIND,
        })
    }

    /// Re-attaches a singleton taken with [`Context::take_singleton`].
    /// Does not mark the entity dirty.
    pub fn put_singleton<T: ComponentData>(&mut self, value: T) -> Result<(), EcsError> {
        let name = T::KIND.name().to_string();
        self.repository
            .table_mut(T::KIND)?
            .insert(name.clone(), value.into_component());
        self.entities.entry(T::KIND).or_default().insert(name);
        Ok(())
    }

    /// Ids of entities holding the given kinds (intersection or union).
    /// Kinds with no index set contribute nothing.
    pub fn entities_with(&self, kinds: &[ComponentKind], mode: MatchMode) -> HashSet<EntityId> {
        match mode {
            MatchMode::All => {
                let mut iter = kinds.iter();
                let Some(first) = iter.next() else {
                    return HashSet::new();
                };
                let mut result = self.entities.get(first).cloned().unwrap_or_default();
                for kind in iter {
                    match self.entities.get(kind) {
                        Some(set) => result.retain(|id| set.contains(id)),
                        None => return HashSet::new(),
                    }
                }
                result
            }
            MatchMode::Any => {
                let mut result = HashSet::new();
                for kind in kinds {
                    if let Some(set) = self.entities.get(kind) {
                        result.extend(set.iter().cloned());
                    }
                }
                result
            }
        }
    }

    /// For every entity holding all `required` kinds, one row of components,
    /// with `optional` kinds resolved to `None` where absent.
    pub fn all(
        &self,
        required: &[ComponentKind],
        optional: &[ComponentKind],
    ) -> Result<Vec<EntityRow<'_>>, EcsError> {
        for kind in required.iter().chain(optional) {
            self.repository.table(*kind)?;
        }

        let mut rows = Vec::new();
        for entity_id in self.entities_with(required, MatchMode::All) {
            let mut req = Vec::with_capacity(required.len());
            for kind in required {
                let component = self
                    .repository
                    .table(*kind)?
                    .get(&entity_id)
                    .ok_or_else(|| EcsError::NotFound {
                        entity: entity_id.clone(),
                        kind: *kind,
                    })?;
                req.push(component);
            }
            let opt = optional
                .iter()
                .map(|kind| {
                    self.repository
                        .table(*kind)
                        .ok()
                        .and_then(|table| table.get(&entity_id))
                })
                .collect();
            rows.push(EntityRow {
                entity_id,
                required: req,
                optional: opt,
            });
        }
        Ok(rows)
    }

    /// Union of all per-kind dirty sets; clears them all when `reset`.
    pub fn dirty_entities(&mut self, reset: bool) -> HashSet<EntityId> {
        let mut updated = HashSet::new();
        for set in self.dirty.values() {
            updated.extend(set.iter().cloned());
        }
        if reset {
            self.dirty.clear();
        }
        updated
    }

    /// Union of the dirty sets for the given kinds. When `reset`, only the
    /// returned ids are removed, and only from those kinds' sets — other
    /// kinds' dirty state is untouched.
    pub fn dirty_entities_for(
        &mut self,
        kinds: &[ComponentKind],
        reset: bool,
    ) -> HashSet<EntityId> {
        let mut updated = HashSet::new();
        for kind in kinds {
            if let Some(set) = self.dirty.get(kind) {
                updated.extend(set.iter().cloned());
            }
        }
        if reset {
            for kind in kinds {
                if let Some(set) = self.dirty.get_mut(kind) {
                    set.retain(|id| !updated.contains(id));
                }
            }
        }
        updated
    }

    /// For each kind, the entity's component when currently flagged dirty
    /// for that kind, else `None`. When `reset`, clears just those
    /// (entity, kind) flags.
    pub fn dirty_components(
        &mut self,
        entity_id: &str,
        kinds: &[ComponentKind],
        reset: bool,
    ) -> Result<Vec<Option<&Component>>, EcsError> {
        for kind in kinds {
            self.repository.table(*kind)?;
        }

        let flagged: Vec<bool> = kinds
            .iter()
            .map(|kind| {
                self.dirty
                    .get(kind)
                    .map_or(false, |set| set.contains(entity_id))
            })
            .collect();
        if reset {
            for kind in kinds {
                if let Some(set) = self.dirty.get_mut(kind) {
                    set.remove(entity_id);
                }
            }
        }

        let mut out = Vec::with_capacity(kinds.len());
        for (kind, was_dirty) in kinds.iter().zip(flagged) {
            out.push(if was_dirty {
                self.repository.table(*kind)?.get(entity_id)
            } else {
                None
            });
        }
        Ok(out)
    }

    /// Manually flags dirty state, for components mutated in place
    /// (physics-driven motion). No-op for suppressed entities.
    pub fn mark_dirty(&mut self, entity_id: &str, kinds: &[ComponentKind]) {
        if self.suppressed.contains(entity_id) {
            return;
        }
        for kind in kinds {
            self.dirty
                .entry(*kind)
                .or_default()
                .insert(entity_id.to_string());
        }
    }

    /// The entity's future changes never populate the dirty/removed sets.
    /// One-way.
    pub fn suppress(&mut self, entity_id: &str) {
        self.suppressed.insert(entity_id.to_string());
    }

    pub fn is_suppressed(&self, entity_id: &str) -> bool {
        self.suppressed.contains(entity_id)
    }

    /// Purges the entity from every table, index set, and dirty set, and
    /// records it in the removed set unless suppressed.
    pub fn remove(&mut self, entity_id: &str) {
        let kinds: Vec<ComponentKind> = self.repository.kinds().collect();
        for kind in kinds {
            if let Some(set) = self.dirty.get_mut(&kind) {
                set.remove(entity_id);
            }
            if let Some(set) = self.entities.get_mut(&kind) {
                set.remove(entity_id);
            }
            if let Ok(table) = self.repository.table_mut(kind) {
                table.remove(entity_id);
            }
        }
        if !self.suppressed.contains(entity_id) {
            self.removed.insert(entity_id.to_string());
        }
    }

    /// Snapshot of the removed set; clears it when `reset`.
    pub fn removed_entities(&mut self, reset: bool) -> HashSet<EntityId> {
        if reset {
            std::mem::take(&mut self.removed)
        } else {
            self.removed.clone()
        }
    }

    fn next_id(&mut self) -> EntityId {
        let entity_id = self.counter.to_string();
        self.counter += 1;
        entity_id
    }

    /// Entity-registration hook: a freshly attached body component gets its
    /// entity id recorded in the physics world's body table, so contact
    /// events can be resolved back to entities.
    fn register_body_entity(&mut self, entity_id: &str, handle: RigidBodyHandle) {
        let world_id = ComponentKind::PhysicsWorld.name();
        if let Ok(table) = self.repository.table_mut(ComponentKind::PhysicsWorld) {
            if let Some(Component::PhysicsWorld(world)) = table.get_mut(world_id) {
                world.bind_entity(handle, entity_id);
            }
        }
    }
}
