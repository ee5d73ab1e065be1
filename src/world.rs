// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The world: owns every entity, archetype, and the registries/services
//! (components, validation, rng, events, command buffers, singletons) that
//! operate on them.

use std::any::{Any, TypeId};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use crate::archetype::{Archetype, ArchetypeId, Row};
use crate::archetype_manager::ArchetypeManager;
use crate::command::{CommandBuffer, CommandBufferPool, EntityMap};
use crate::component::{Bundle, Component};
use crate::entity::{EntityId, EntityLocation};
use crate::error::{EcsError, Result};
use crate::event::{ArchetypeCreated, ComponentAdded, ComponentChanged, ComponentRemoved, EntityCreated, EntityDestroyed};
use crate::event_bus::EventBus;
use crate::registry::{ComponentId, ComponentRegistry};
use crate::query::QueryCache;
use crate::rng::WorldRng;
use crate::system::SystemId;
use crate::validation::ValidationManager;

#[cfg(feature = "profiling")]
use tracing::{debug, warn};

struct EntityMeta {
    location: EntityLocation,
    name: Option<String>,
}

/// Owns all entities and component storage for one simulation.
///
/// Firing order for lifecycle events: [`EntityCreated`] fires once an
/// entity's initial components are fully written; [`EntityDestroyed`]
/// fires before the entity's row is physically removed, while it is
/// still alive and readable; [`ComponentAdded`] fires whenever
/// [`add_component`](World::add_component) causes a type to newly appear
/// (not on overwrite of an already-present component) and once per
/// component written by [`spawn_bundle`](World::spawn_bundle), mirroring
/// what the entity builder's deferred `with` does through
/// [`add_component`](World::add_component); [`ComponentRemoved`] fires only
/// when [`remove_component`](World::remove_component) actually removed
/// something; [`ComponentChanged`] fires only from
/// [`set_component`](World::set_component); [`ArchetypeCreated`] fires once
/// per new component-set shape, before any entity occupies it.
///
/// Dropping a `World` clears its event bus and singleton table so handlers
/// registered by long-lived external subscribers are released; call
/// [`dispose`](World::dispose) to do the same thing earlier, idempotently,
/// while keeping the `World` itself usable afterward (empty, but alive).
pub struct World {
    entities: SlotMap<EntityId, EntityMeta>,
    archetype_manager: ArchetypeManager,
    registry: ComponentRegistry,
    validation: ValidationManager,
    rng: WorldRng,
    events: EventBus,
    names: FxHashMap<String, EntityId>,
    singletons: FxHashMap<TypeId, Box<dyn Any + Send + Sync>>,
    command_pool: Mutex<CommandBufferPool>,
    query_cache: Arc<Mutex<QueryCache>>,
    entities_allocated: u64,
}

/// Point-in-time counters for introspection/diagnostics, independent of the
/// archetype store itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    /// Entities currently alive.
    pub entities_active: usize,
    /// Entities ever spawned in this world's lifetime, including despawned
    /// ones whose ids have since been recycled.
    pub entities_allocated: u64,
    pub archetype_count: usize,
    pub component_type_count: usize,
}

/// Construction-time tunables for a [`World`], mirroring the donor's pattern
/// of plain constructor parameters and `const`s rather than an external
/// config file or environment variables.
#[derive(Debug, Clone)]
pub struct WorldConfig {
    pub chunk_capacity: usize,
    pub initial_archetype_capacity: usize,
    pub rng_seed: Option<u64>,
    pub validation_mode: crate::validation::ValidationMode,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: crate::archetype::DEFAULT_CHUNK_SIZE,
            initial_archetype_capacity: 16,
            rng_seed: None,
            validation_mode: crate::validation::ValidationMode::default(),
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl World {
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// A world whose [`WorldRng`] is seeded deterministically.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_config(WorldConfig {
            rng_seed: Some(seed),
            ..WorldConfig::default()
        })
    }

    pub fn with_config(config: WorldConfig) -> Self {
        let events = EventBus::new();
        let query_cache = Arc::new(Mutex::new(QueryCache::default()));
        {
            let cache = Arc::clone(&query_cache);
            events.subscribe::<ArchetypeCreated, _>(move |created: &ArchetypeCreated| {
                cache.lock().notify_new_archetype(created.index, &created.component_ids);
            });
        }
        Self {
            entities: SlotMap::with_key(),
            archetype_manager: ArchetypeManager::new(config.chunk_capacity, config.initial_archetype_capacity),
            registry: ComponentRegistry::new(),
            validation: ValidationManager::new(config.validation_mode),
            rng: match config.rng_seed {
                Some(seed) => WorldRng::from_seed(seed),
                None => WorldRng::new(),
            },
            events,
            names: FxHashMap::default(),
            singletons: FxHashMap::default(),
            command_pool: Mutex::new(CommandBufferPool::new()),
            query_cache,
            entities_allocated: 0,
        }
    }

    /// Release the event bus's handlers and the singleton table early.
    /// Idempotent: calling this more than once, or letting `Drop` call it
    /// again, is a no-op after the first call. The `World` remains usable
    /// afterward — entities and archetypes are untouched — but nothing
    /// subscribed before this call will hear about anything that happens
    /// next, and singletons must be re-inserted before they can be read
    /// again.
    pub fn dispose(&mut self) {
        self.events.clear();
        self.singletons.clear();
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.registry
    }

    pub fn validation(&self) -> &ValidationManager {
        &self.validation
    }

    pub fn validation_mut(&mut self) -> &mut ValidationManager {
        &mut self.validation
    }

    pub fn rng_mut(&mut self) -> &mut WorldRng {
        &mut self.rng
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn archetype_count(&self) -> usize {
        self.archetype_manager.len()
    }

    pub fn archetypes(&self) -> &[Archetype] {
        self.archetype_manager.all()
    }

    pub(crate) fn archetype_ptr(&self, index: usize) -> Option<std::ptr::NonNull<Archetype>> {
        self.archetype_manager.ptr(index)
    }

    pub(crate) fn archetype_ptr_mut(&mut self, index: usize) -> Option<std::ptr::NonNull<Archetype>> {
        self.archetype_manager.ptr_mut(index)
    }

    /// Resolve the archetype indices matching `descriptor`, building and
    /// caching the list on first use and keeping it current incrementally
    /// as new archetypes are created (see [`archetype_index_for`]).
    pub(crate) fn query_matches(&self, descriptor: &crate::query::QueryDescriptor) -> Vec<usize> {
        self.query_cache.lock().get_or_build(descriptor, self.archetype_manager.all())
    }

    /// Cache hit/miss counters accumulated across every query compiled
    /// against this world so far.
    pub fn query_cache_stats(&self) -> crate::query::QueryCacheStats {
        self.query_cache.lock().stats()
    }

    // -- entity lifecycle -------------------------------------------------

    pub fn spawn(&mut self) -> Result<EntityId> {
        self.spawn_named(None)
    }

    pub fn spawn_named(&mut self, name: Option<String>) -> Result<EntityId> {
        self.reserve_name(&name)?;
        let idx = self.archetype_index_for(&ArchetypeId::empty())?;
        let entity = self.insert_into(idx, name.clone());
        self.finish_spawn(entity, name);
        Ok(entity)
    }

    pub fn spawn_bundle<B: Bundle>(&mut self, bundle: B) -> Result<EntityId> {
        self.spawn_bundle_named(None, bundle)
    }

    /// Spawn an entity with `bundle`'s components already attached,
    /// running the same `requires`/`conflicts`/custom-predicate checks
    /// [`add_component`](Self::add_component) would against the shape the
    /// entity is about to occupy, and firing [`ComponentAdded`] once per
    /// component on success. If validation rejects the bundle, the entity
    /// is never observable: its row is removed before this returns.
    pub fn spawn_bundle_named<B: Bundle>(&mut self, name: Option<String>, bundle: B) -> Result<EntityId> {
        self.reserve_name(&name)?;
        let infos = B::register_components(&mut self.registry);
        let archetype_id = ArchetypeId::from_unsorted(infos.iter().map(|i| i.id).collect());
        let idx = self.archetype_index_for(&archetype_id)?;
        let entity = self.insert_into(idx, name.clone());

        if let Err(err) = bundle.check_constraints(self, entity, &archetype_id) {
            self.rollback_spawn(entity, idx);
            return Err(err);
        }

        let loc = self.entities[entity].location;
        bundle.write(&mut self.archetype_manager[idx], Row { chunk: loc.chunk, slot: loc.slot }, &infos, &self.events, entity)?;
        self.finish_spawn(entity, name);
        Ok(entity)
    }

    /// Undo [`insert_into`](Self::insert_into) for a bundle spawn that
    /// failed validation before any component was written: swap-remove the
    /// reserved row and drop the entity's metadata, exactly as
    /// [`despawn`](Self::despawn) does but without firing
    /// [`EntityDestroyed`] — the entity was never observable.
    fn rollback_spawn(&mut self, entity: EntityId, archetype_idx: usize) {
        if let Some(meta) = self.entities.get(entity) {
            let row = Row { chunk: meta.location.chunk, slot: meta.location.slot };
            let name = meta.name.clone();
            let moved = self.archetype_manager[archetype_idx].remove_row(row);
            if let Some(moved_entity) = moved {
                if let Some(m) = self.entities.get_mut(moved_entity) {
                    m.location = EntityLocation { archetype_index: archetype_idx, chunk: row.chunk, slot: row.slot };
                }
            }
            if let Some(name) = &name {
                self.names.remove(name);
            }
        }
        self.entities.remove(entity);
    }

    fn reserve_name(&self, name: &Option<String>) -> Result<()> {
        if let Some(n) = name {
            if self.names.contains_key(n) {
                return Err(EcsError::InvalidArgument(format!("entity name `{n}` already in use")));
            }
        }
        Ok(())
    }

    fn insert_into(&mut self, archetype_idx: usize, name: Option<String>) -> EntityId {
        let placeholder = EntityLocation { archetype_index: archetype_idx, chunk: 0, slot: 0 };
        let entity = self.entities.insert(EntityMeta { location: placeholder, name });
        let row = self.archetype_manager[archetype_idx].allocate_row(entity);
        self.entities[entity].location = EntityLocation { archetype_index: archetype_idx, chunk: row.chunk, slot: row.slot };
        entity
    }

    fn finish_spawn(&mut self, entity: EntityId, name: Option<String>) {
        if let Some(n) = &name {
            self.names.insert(n.clone(), entity);
        }
        self.entities_allocated += 1;
        #[cfg(feature = "profiling")]
        debug!(entity = ?entity, "entity spawned");
        self.events.publish(&EntityCreated { entity, name });
    }

    /// Snapshot of entity/archetype/component-type counters, independent of
    /// any single archetype.
    pub fn memory_stats(&self) -> MemoryStats {
        MemoryStats {
            entities_active: self.entities.len(),
            entities_allocated: self.entities_allocated,
            archetype_count: self.archetype_manager.len(),
            component_type_count: self.registry.len(),
        }
    }

    pub fn despawn(&mut self, entity: EntityId) -> Result<()> {
        let loc = self.entities.get(entity).ok_or(EcsError::NotAlive(entity))?.location;
        let name = self.entities[entity].name.clone();

        #[cfg(feature = "profiling")]
        debug!(entity = ?entity, "entity despawned");
        self.events.publish(&EntityDestroyed { entity });

        let row = Row { chunk: loc.chunk, slot: loc.slot };
        let moved = self.archetype_manager[loc.archetype_index].remove_row(row);
        if let Some(moved_entity) = moved {
            if let Some(meta) = self.entities.get_mut(moved_entity) {
                meta.location = EntityLocation { archetype_index: loc.archetype_index, chunk: row.chunk, slot: row.slot };
            }
        }

        if let Some(n) = name {
            self.names.remove(&n);
        }
        self.entities.remove(entity);
        Ok(())
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.contains_key(entity)
    }

    pub fn entity_by_name(&self, name: &str) -> Option<EntityId> {
        self.names.get(name).copied()
    }

    /// `Ok(None)` both when `entity` is alive and unnamed, and when it is
    /// stale or never existed — the same "no name to report" answer either
    /// way, since a dead entity cannot have a name to look up.
    pub fn entity_name(&self, entity: EntityId) -> Result<Option<&str>> {
        Ok(self.entities.get(entity).and_then(|meta| meta.name.as_deref()))
    }

    /// Rename `entity`, or clear its name if `name` is `None`. Fails with
    /// `InvalidArgument` if another alive entity already holds that name.
    pub fn set_name(&mut self, entity: EntityId, name: Option<String>) -> Result<()> {
        if !self.entities.contains_key(entity) {
            return Err(EcsError::NotAlive(entity));
        }
        if let Some(n) = &name {
            if self.names.get(n).is_some_and(|&holder| holder != entity) {
                return Err(EcsError::InvalidArgument(format!("entity name `{n}` already in use")));
            }
        }
        let old_name = self.entities[entity].name.take();
        if let Some(old) = old_name {
            self.names.remove(&old);
        }
        if let Some(n) = &name {
            self.names.insert(n.clone(), entity);
        }
        self.entities[entity].name = name;
        Ok(())
    }

    /// Every currently alive entity, in slot-map iteration order (not the
    /// spawn order once despawns have happened).
    pub fn get_all_entities(&self) -> Vec<EntityId> {
        self.entities.keys().collect()
    }

    // -- components ---------------------------------------------------------

    pub fn has_component<T: Component>(&self, entity: EntityId) -> Result<bool> {
        let loc = self.entities.get(entity).ok_or(EcsError::NotAlive(entity))?.location;
        Ok(match self.registry.get_by_type::<T>() {
            Some(info) => self.archetype_manager[loc.archetype_index].has(info.id),
            None => false,
        })
    }

    pub fn get_component<T: Component>(&self, entity: EntityId) -> Result<&T> {
        let loc = self.entities.get(entity).ok_or(EcsError::NotAlive(entity))?.location;
        let info = self.registry.require::<T>()?;
        self.archetype_manager[loc.archetype_index].get::<T>(Row { chunk: loc.chunk, slot: loc.slot }, info.id)
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> Result<&mut T> {
        let loc = self.entities.get(entity).ok_or(EcsError::NotAlive(entity))?.location;
        let info = self.registry.require::<T>()?;
        self.archetype_manager[loc.archetype_index].get_mut::<T>(Row { chunk: loc.chunk, slot: loc.slot }, info.id)
    }

    /// Attach `T` to `entity`, migrating it to a new archetype if it does
    /// not already carry `T`. Fires [`ComponentAdded`] only on that new
    /// appearance; re-adding an already-present type overwrites the value
    /// in place and fires nothing.
    pub fn add_component<T: Component + Clone>(&mut self, entity: EntityId, value: T) -> Result<()> {
        let loc = self.entities.get(entity).ok_or(EcsError::NotAlive(entity))?.location;
        let info = self.registry.get_or_register::<T>();
        let old_id = self.archetype_manager[loc.archetype_index].id().clone();

        self.check_constraints(entity, &value)?;

        if old_id.contains(info.id) {
            let row = Row { chunk: loc.chunk, slot: loc.slot };
            let slot = self.archetype_manager[loc.archetype_index].get_mut::<T>(row, info.id)?;
            *slot = value;
            return Ok(());
        }

        let new_id = old_id.with(info.id);
        let row = self.migrate_entity(entity, new_id)?;
        let new_idx = self.entities[entity].location.archetype_index;
        self.archetype_manager[new_idx].set_component(row, info.id, value.clone())?;
        self.events.publish(&ComponentAdded { entity, value });
        Ok(())
    }

    /// Overwrite an already-present component, firing [`ComponentChanged`].
    /// Fails with `NotFound` if `entity` does not carry `T` yet — use
    /// [`add_component`](Self::add_component) for that.
    pub fn set_component<T: Component + Clone>(&mut self, entity: EntityId, value: T) -> Result<()> {
        let loc = self.entities.get(entity).ok_or(EcsError::NotAlive(entity))?.location;
        let info = self
            .registry
            .get_by_type::<T>()
            .ok_or_else(|| EcsError::NotFound(format!("component `{}` on entity", std::any::type_name::<T>())))?;
        if !self.archetype_manager[loc.archetype_index].has(info.id) {
            return Err(EcsError::NotFound(format!(
                "component `{}` not present on entity",
                std::any::type_name::<T>()
            )));
        }

        self.check_constraints(entity, &value)?;

        let row = Row { chunk: loc.chunk, slot: loc.slot };
        let slot = self.archetype_manager[loc.archetype_index].get_mut::<T>(row, info.id)?;
        let old = slot.clone();
        *slot = value.clone();
        self.events.publish(&ComponentChanged { entity, old, new: value });
        Ok(())
    }

    /// Remove `T` from `entity`, migrating it to a smaller archetype.
    /// Returns whether the component was actually present; fires
    /// [`ComponentRemoved`] only when it was.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> Result<bool> {
        let loc = self.entities.get(entity).ok_or(EcsError::NotAlive(entity))?.location;
        let Some(info) = self.registry.get_by_type::<T>() else {
            return Ok(false);
        };
        if !self.archetype_manager[loc.archetype_index].has(info.id) {
            return Ok(false);
        }

        let old_id = self.archetype_manager[loc.archetype_index].id().clone();
        let new_id = old_id.without(info.id);
        self.migrate_entity(entity, new_id)?;
        self.events.publish(&ComponentRemoved::<T> { entity, _marker: std::marker::PhantomData });
        Ok(true)
    }

    fn check_constraints<T: Component>(&self, entity: EntityId, value: &T) -> Result<()> {
        let loc = self.entities.get(entity).ok_or(EcsError::NotAlive(entity))?.location;
        let archetype = &self.archetype_manager[loc.archetype_index];
        self.validation.validate::<T>(self, entity, value, std::any::type_name::<T>(), |type_id| {
            self.registry.iter().any(|info| info.type_id == type_id && archetype.has(info.id))
        })
    }

    /// Like [`check_constraints`](Self::check_constraints), but evaluated
    /// against an [`ArchetypeId`] the entity is about to occupy rather than
    /// an archetype it already sits in — the shape
    /// [`spawn_bundle_named`](Self::spawn_bundle_named) reserves a row in
    /// before any column is written, so every component of the bundle can
    /// already see its siblings when constraints run.
    pub(crate) fn check_bundle_constraint<T: Component>(&self, value: &T, entity: EntityId, archetype_id: &ArchetypeId) -> Result<()> {
        self.validation.validate::<T>(self, entity, value, std::any::type_name::<T>(), |type_id| {
            self.registry.iter().any(|info| info.type_id == type_id && archetype_id.contains(info.id))
        })
    }

    /// Move `entity` from its current archetype to the one described by
    /// `new_id`, copying every shared column and dropping only the
    /// components that do not survive the move. Returns the entity's new
    /// row.
    fn migrate_entity(&mut self, entity: EntityId, new_id: ArchetypeId) -> Result<Row> {
        let old_loc = self.entities.get(entity).ok_or(EcsError::NotAlive(entity))?.location;
        let old_idx = old_loc.archetype_index;
        let old_row = Row { chunk: old_loc.chunk, slot: old_loc.slot };
        let old_id = self.archetype_manager[old_idx].id().clone();
        let preserved: Vec<ComponentId> = old_id.component_ids().iter().filter(|c| new_id.contains(**c)).copied().collect();

        let new_idx = self.archetype_index_for(&new_id)?;
        let new_row = self.archetype_manager[new_idx].allocate_row(entity);

        {
            let (src, dst) = self.archetype_manager.pair_mut(old_idx, new_idx);
            src.copy_shared_columns_to(old_row, dst, new_row);
        }

        let moved = self.archetype_manager[old_idx].remove_row_excluding(old_row, &preserved);
        if let Some(moved_entity) = moved {
            if let Some(meta) = self.entities.get_mut(moved_entity) {
                meta.location = EntityLocation { archetype_index: old_idx, chunk: old_row.chunk, slot: old_row.slot };
            }
        }

        if let Some(meta) = self.entities.get_mut(entity) {
            meta.location = EntityLocation { archetype_index: new_idx, chunk: new_row.chunk, slot: new_row.slot };
        }

        Ok(new_row)
    }

    /// Resolve `id` to its archetype index, creating the archetype (and
    /// publishing [`ArchetypeCreated`]) the first time this shape is seen.
    fn archetype_index_for(&mut self, id: &ArchetypeId) -> Result<usize> {
        let (idx, created) = match self.archetype_manager.index_for(id, &self.registry) {
            Ok(pair) => pair,
            Err(err) => {
                #[cfg(feature = "profiling")]
                warn!(limit = crate::archetype_manager::MAX_ARCHETYPES, "archetype cap exceeded");
                return Err(err);
            }
        };
        if created {
            #[cfg(feature = "profiling")]
            debug!(archetype = idx, components = id.component_ids().len(), "archetype created");
            self.events.publish(&ArchetypeCreated {
                index: idx,
                component_ids: id.component_ids().to_vec(),
            });
        }
        Ok(idx)
    }

    // -- singletons -----------------------------------------------------------

    pub fn set_singleton<T: Send + Sync + 'static>(&mut self, value: T) {
        self.singletons.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get_singleton<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.singletons.get(&TypeId::of::<T>()).and_then(|b| b.downcast_ref::<T>())
    }

    pub fn get_singleton_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.singletons.get_mut(&TypeId::of::<T>()).and_then(|b| b.downcast_mut::<T>())
    }

    pub fn try_get_singleton<T: Send + Sync + 'static>(&self) -> Result<&T> {
        self.get_singleton::<T>()
            .ok_or_else(|| EcsError::NotFound(format!("singleton `{}`", std::any::type_name::<T>())))
    }

    pub fn has_singleton<T: Send + Sync + 'static>(&self) -> bool {
        self.singletons.contains_key(&TypeId::of::<T>())
    }

    pub fn remove_singleton<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.singletons.remove(&TypeId::of::<T>()).and_then(|b| b.downcast::<T>().ok()).map(|b| *b)
    }

    // -- command buffers --------------------------------------------------

    /// Rent `system_id`'s command buffer for the duration of `f`, then
    /// return it to the pool without flushing. Safe to call more than once
    /// per tick from the same system.
    pub fn with_commands<R>(&self, system_id: SystemId, f: impl FnOnce(&mut CommandBuffer) -> R) -> Result<R> {
        let mut pool = self.command_pool.lock();
        let buffer = pool.rent(system_id.0)?;
        let result = f(buffer);
        pool.return_buffer(system_id.0);
        Ok(result)
    }

    /// Apply every command recorded by every system since the last flush,
    /// in ascending system-id order, and clear the pool for the next cycle.
    pub fn flush_commands(&mut self) -> Result<EntityMap> {
        let mut pool = std::mem::take(&mut *self.command_pool.lock());
        let result = pool.flush_all(self);
        *self.command_pool.lock() = pool;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        x: f32,
    }

    #[test]
    fn spawn_and_despawn_round_trip() {
        let mut world = World::new();
        let e = world.spawn().unwrap();
        assert!(world.is_alive(e));
        world.despawn(e).unwrap();
        assert!(!world.is_alive(e));
    }

    #[test]
    fn spawn_bundle_writes_every_component() {
        let mut world = World::new();
        let e = world.spawn_bundle((Position { x: 1.0 }, Velocity { x: 2.0 })).unwrap();
        assert_eq!(*world.get_component::<Position>(e).unwrap(), Position { x: 1.0 });
        assert_eq!(*world.get_component::<Velocity>(e).unwrap(), Velocity { x: 2.0 });
    }

    #[test]
    fn add_component_migrates_and_preserves_existing_values() {
        let mut world = World::new();
        let e = world.spawn_bundle((Position { x: 1.0 },)).unwrap();
        world.add_component(e, Velocity { x: 5.0 }).unwrap();
        assert_eq!(*world.get_component::<Position>(e).unwrap(), Position { x: 1.0 });
        assert_eq!(*world.get_component::<Velocity>(e).unwrap(), Velocity { x: 5.0 });
    }

    #[test]
    fn remove_component_drops_it_and_keeps_the_rest() {
        let mut world = World::new();
        let e = world.spawn_bundle((Position { x: 1.0 }, Velocity { x: 2.0 })).unwrap();
        assert!(world.remove_component::<Velocity>(e).unwrap());
        assert!(world.get_component::<Velocity>(e).is_err());
        assert_eq!(*world.get_component::<Position>(e).unwrap(), Position { x: 1.0 });
        assert!(!world.remove_component::<Velocity>(e).unwrap());
    }

    #[test]
    fn set_component_requires_prior_presence() {
        let mut world = World::new();
        let e = world.spawn().unwrap();
        assert!(world.set_component(e, Position { x: 1.0 }).is_err());
        world.add_component(e, Position { x: 1.0 }).unwrap();
        world.set_component(e, Position { x: 2.0 }).unwrap();
        assert_eq!(*world.get_component::<Position>(e).unwrap(), Position { x: 2.0 });
    }

    #[test]
    fn swap_back_on_despawn_updates_the_moved_entity() {
        let mut world = World::new();
        let e0 = world.spawn_bundle((Position { x: 0.0 },)).unwrap();
        let e1 = world.spawn_bundle((Position { x: 1.0 },)).unwrap();
        world.despawn(e0).unwrap();
        assert_eq!(*world.get_component::<Position>(e1).unwrap(), Position { x: 1.0 });
    }

    #[test]
    fn duplicate_entity_names_are_rejected() {
        let mut world = World::new();
        world.spawn_named(Some("hero".into())).unwrap();
        assert!(world.spawn_named(Some("hero".into())).is_err());
    }

    #[test]
    fn with_config_applies_chunk_capacity() {
        let mut world = World::with_config(WorldConfig {
            chunk_capacity: 2,
            ..WorldConfig::default()
        });
        for _ in 0..5 {
            world.spawn_bundle((Position { x: 0.0 },)).unwrap();
        }
        assert_eq!(world.archetypes()[0].chunk_count(), 3);
    }

    #[test]
    fn with_seed_is_equivalent_to_config_with_rng_seed() {
        let mut a = World::with_seed(7);
        let mut b = World::with_config(WorldConfig {
            rng_seed: Some(7),
            ..WorldConfig::default()
        });
        let seq_a: Vec<i64> = (0..5).map(|_| a.rng_mut().next_int(1000)).collect();
        let seq_b: Vec<i64> = (0..5).map(|_| b.rng_mut().next_int(1000)).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn set_name_moves_and_clears_the_name_index() {
        let mut world = World::new();
        let e = world.spawn_named(Some("a".into())).unwrap();
        world.set_name(e, Some("b".into())).unwrap();
        assert_eq!(world.entity_by_name("a"), None);
        assert_eq!(world.entity_by_name("b"), Some(e));
        world.set_name(e, None).unwrap();
        assert_eq!(world.entity_by_name("b"), None);
        assert_eq!(world.entity_name(e).unwrap(), None);
    }

    #[test]
    fn set_name_rejects_a_name_held_by_another_entity() {
        let mut world = World::new();
        world.spawn_named(Some("taken".into())).unwrap();
        let e = world.spawn().unwrap();
        assert!(world.set_name(e, Some("taken".into())).is_err());
    }

    #[test]
    fn get_all_entities_reflects_spawns_and_despawns() {
        let mut world = World::new();
        let e0 = world.spawn().unwrap();
        let e1 = world.spawn().unwrap();
        let mut all = world.get_all_entities();
        all.sort_by_key(|e| e.id());
        let mut expected = [e0, e1];
        expected.sort_by_key(|e| e.id());
        assert_eq!(all, expected);
        world.despawn(e0).unwrap();
        assert_eq!(world.get_all_entities(), vec![e1]);
    }

    #[test]
    fn memory_stats_tracks_allocations_independent_of_despawns() {
        let mut world = World::new();
        let e0 = world.spawn_bundle((Position { x: 0.0 },)).unwrap();
        world.spawn_bundle((Position { x: 0.0 }, Velocity { x: 0.0 })).unwrap();
        world.despawn(e0).unwrap();
        let stats = world.memory_stats();
        assert_eq!(stats.entities_active, 1);
        assert_eq!(stats.entities_allocated, 2);
        assert_eq!(stats.archetype_count, 2);
        assert_eq!(stats.component_type_count, 2);
    }

    #[test]
    fn singleton_round_trip() {
        let mut world = World::new();
        world.set_singleton(42u32);
        assert_eq!(*world.get_singleton::<u32>().unwrap(), 42);
        assert_eq!(world.remove_singleton::<u32>(), Some(42));
        assert!(!world.has_singleton::<u32>());
    }

    #[test]
    fn command_buffer_spawn_with_resolves_through_flush() {
        let mut world = World::new();
        world
            .with_commands(SystemId(0), |cmd| {
                let placeholder = cmd.spawn(Some("spawned".into()));
                cmd.with(placeholder, Position { x: 9.0 });
            })
            .unwrap();
        let map = world.flush_commands().unwrap();
        assert_eq!(map.len(), 1);
        let entity = world.entity_by_name("spawned").unwrap();
        assert_eq!(*world.get_component::<Position>(entity).unwrap(), Position { x: 9.0 });
    }

    #[test]
    fn validation_blocks_add_when_requirement_missing() {
        let mut world = World::new();
        world.validation_mut().set_mode(crate::validation::ValidationMode::Enabled);
        world.validation_mut().requires::<Velocity, Position>("Position");
        let e = world.spawn().unwrap();
        assert!(world.add_component(e, Velocity { x: 1.0 }).is_err());
        world.add_component(e, Position { x: 0.0 }).unwrap();
        assert!(world.add_component(e, Velocity { x: 1.0 }).is_ok());
    }

    #[test]
    fn spawn_bundle_rejects_a_constraint_violation_and_leaves_no_trace() {
        let mut world = World::new();
        world.validation_mut().set_mode(crate::validation::ValidationMode::Enabled);
        world.validation_mut().conflicts_with::<Velocity, Position>("Position");

        let before = world.entity_count();
        let err = world.spawn_bundle((Position { x: 1.0 }, Velocity { x: 2.0 })).unwrap_err();
        assert!(matches!(err, EcsError::Validation { .. }));
        assert_eq!(world.entity_count(), before);
        assert_eq!(world.memory_stats().entities_allocated, 0);
    }

    #[test]
    fn entity_name_reports_none_for_a_stale_entity_instead_of_erroring() {
        let mut world = World::new();
        let e = world.spawn_named(Some("ghost".into())).unwrap();
        world.despawn(e).unwrap();
        assert_eq!(world.entity_name(e).unwrap(), None);
    }

    #[test]
    fn dispose_clears_singletons_and_event_subscribers() {
        let mut world = World::new();
        world.set_singleton(7u32);
        let count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let c = count.clone();
        world.events().subscribe::<EntityCreated, _>(move |_| {
            c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        world.dispose();
        assert!(!world.has_singleton::<u32>());

        world.spawn().unwrap();
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
