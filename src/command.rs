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

//! Deferred command buffers and the pool that flushes them deterministically.
//!
//! A buffer records operations against a world without touching it; a pool
//! hands out exactly one buffer per system id per cycle and flushes every
//! buffer's operations in ascending system-id order, so the result of a
//! flush never depends on the order systems happened to rent their buffers.

use rustc_hash::FxHashMap;

use crate::component::Component;
use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::world::World;

#[cfg(feature = "profiling")]
use tracing::debug;

/// Safety cap on the total number of commands flushed in one call. Matches
/// the `BatchTooLarge` message in [`EcsError`].
const MAX_BATCH_SIZE: usize = 10_000_000;

type Writer = Box<dyn FnOnce(&mut World, EntityId) -> Result<()> + Send>;

/// A reference to an entity recorded in a command, which may not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    /// An entity that already exists.
    Real(EntityId),
    /// A global placeholder id, resolved at flush time.
    Placeholder(i64),
}

impl From<EntityId> for EntityRef {
    fn from(entity: EntityId) -> Self {
        EntityRef::Real(entity)
    }
}

enum Command {
    Spawn { global_id: i64, name: Option<String> },
    With { target: EntityRef, write: Writer },
    Add { target: EntityRef, write: Writer },
    Set { target: EntityRef, write: Writer },
    Remove { target: EntityRef, write: Writer },
    Despawn { target: EntityRef },
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Spawn { global_id, name } => f
                .debug_struct("Spawn")
                .field("global_id", global_id)
                .field("name", name)
                .finish(),
            Command::With { target, .. } => f.debug_struct("With").field("target", target).finish(),
            Command::Add { target, .. } => f.debug_struct("Add").field("target", target).finish(),
            Command::Set { target, .. } => f.debug_struct("Set").field("target", target).finish(),
            Command::Remove { target, .. } => f.debug_struct("Remove").field("target", target).finish(),
            Command::Despawn { target } => f.debug_struct("Despawn").field("target", target).finish(),
        }
    }
}

/// Encode `(buffer_id, local_id)` into a single lossless global placeholder
/// id. `local_id` must be negative, matching the ids `CommandBuffer::spawn`
/// hands back.
fn encode_placeholder(buffer_id: u32, local_id: i64) -> i64 {
    debug_assert!(local_id < 0);
    let magnitude = (-local_id) as i64;
    -(((buffer_id as i64) << 31) | magnitude)
}

fn decode_placeholder(global_id: i64) -> (u32, i64) {
    let magnitude = -global_id;
    let buffer_id = (magnitude >> 31) as u32;
    let local = magnitude & 0x7FFF_FFFF;
    (buffer_id, -local)
}

/// A deferred recorder of world-mutating operations belonging to one system.
pub struct CommandBuffer {
    system_id: u32,
    buffer_id: u32,
    next_local_id: i64,
    commands: Vec<Command>,
}

impl CommandBuffer {
    fn new(system_id: u32, buffer_id: u32) -> Self {
        Self {
            system_id,
            buffer_id,
            next_local_id: -1,
            commands: Vec::new(),
        }
    }

    pub fn system_id(&self) -> u32 {
        self.system_id
    }

    /// This buffer's global id for one of its own local placeholder ids, as
    /// returned by `spawn`. Pass the result to another buffer's `add`/`set`/
    /// `remove`/`despawn` to reference the entity across buffers.
    pub fn global_id(&self, local_id: i64) -> i64 {
        encode_placeholder(self.buffer_id, local_id)
    }

    /// Record a spawn. Returns a negative placeholder id, unique within this
    /// buffer, that may be passed to `with` (same buffer) or globalized via
    /// `global_id` for other buffers to reference.
    pub fn spawn(&mut self, name: Option<String>) -> i64 {
        let local_id = self.next_local_id;
        self.next_local_id -= 1;
        let global_id = self.global_id(local_id);
        self.commands.push(Command::Spawn { global_id, name });
        local_id
    }

    /// Attach an initial component to a placeholder returned by `spawn`.
    pub fn with<T: Component + Clone>(&mut self, placeholder: i64, value: T) {
        let target = EntityRef::Placeholder(self.global_id(placeholder));
        self.commands.push(Command::With {
            target,
            write: Box::new(move |world, entity| world.add_component(entity, value)),
        });
    }

    pub fn add<T: Component + Clone>(&mut self, target: impl Into<EntityRef>, value: T) {
        self.commands.push(Command::Add {
            target: target.into(),
            write: Box::new(move |world, entity| world.add_component(entity, value)),
        });
    }

    pub fn set<T: Component + Clone>(&mut self, target: impl Into<EntityRef>, value: T) {
        self.commands.push(Command::Set {
            target: target.into(),
            write: Box::new(move |world, entity| world.set_component(entity, value)),
        });
    }

    pub fn remove<T: Component>(&mut self, target: impl Into<EntityRef>) {
        self.commands.push(Command::Remove {
            target: target.into(),
            write: Box::new(move |world, entity| world.remove_component::<T>(entity).map(|_| ())),
        });
    }

    pub fn despawn(&mut self, target: impl Into<EntityRef>) {
        self.commands.push(Command::Despawn {
            target: target.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    fn clear(&mut self) {
        self.commands.clear();
        self.next_local_id = -1;
    }
}

/// Accumulated placeholder -> real entity map, shared across batches within
/// a flush.
pub type EntityMap = FxHashMap<i64, EntityId>;

fn resolve(target: EntityRef, map: &EntityMap) -> Result<EntityId> {
    match target {
        EntityRef::Real(entity) => Ok(entity),
        EntityRef::Placeholder(id) => map
            .get(&id)
            .copied()
            .ok_or(EcsError::UnresolvedPlaceholder(id)),
    }
}

/// Hands out exactly one [`CommandBuffer`] per system id per cycle and
/// flushes every rented buffer's operations deterministically.
#[derive(Default)]
pub struct CommandBufferPool {
    buffer_ids: FxHashMap<u32, u32>,
    next_buffer_id: u32,
    buffers: FxHashMap<u32, CommandBuffer>,
    rented: FxHashMap<u32, bool>,
}

impl CommandBufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rent the buffer for `system_id`. Fails if it is already rented and
    /// has not been returned or flushed.
    pub fn rent(&mut self, system_id: u32) -> Result<&mut CommandBuffer> {
        if *self.rented.get(&system_id).unwrap_or(&false) {
            return Err(EcsError::Invariant(format!(
                "system {system_id} rented its command buffer twice in one cycle"
            )));
        }
        let buffer_id = *self.buffer_ids.entry(system_id).or_insert_with(|| {
            let id = self.next_buffer_id;
            self.next_buffer_id += 1;
            id
        });
        self.rented.insert(system_id, true);
        #[cfg(feature = "profiling")]
        debug!(system_id, "command buffer rented");
        Ok(self
            .buffers
            .entry(system_id)
            .or_insert_with(|| CommandBuffer::new(system_id, buffer_id)))
    }

    /// Release `system_id`'s buffer back to the pool without flushing it.
    pub fn return_buffer(&mut self, system_id: u32) {
        self.rented.insert(system_id, false);
        #[cfg(feature = "profiling")]
        debug!(system_id, "command buffer returned");
    }

    /// Flush every buffer currently held by the pool, in a single batch
    /// ordered by ascending system id.
    pub fn flush_all(&mut self, world: &mut World) -> Result<EntityMap> {
        let ids: Vec<u32> = self.buffers.keys().copied().collect();
        self.flush_batches(world, &[ids])
    }

    /// Flush explicitly batched system ids. Within a batch, all spawns are
    /// materialised first (ascending system id), then every other command
    /// runs (ascending system id), resolving placeholder references against
    /// the map accumulated so far. Flushed buffers are cleared and released.
    pub fn flush_batches(&mut self, world: &mut World, batches: &[Vec<u32>]) -> Result<EntityMap> {
        let total_commands: usize = batches
            .iter()
            .flatten()
            .filter_map(|id| self.buffers.get(id))
            .map(|b| b.len())
            .sum();
        if total_commands > MAX_BATCH_SIZE {
            return Err(EcsError::BatchTooLarge);
        }

        let mut map = EntityMap::default();
        for batch in batches {
            let mut ids: Vec<u32> = batch.clone();
            ids.sort_unstable();

            for &system_id in &ids {
                let Some(buffer) = self.buffers.get(&system_id) else {
                    continue;
                };
                for command in &buffer.commands {
                    if let Command::Spawn { global_id, name } = command {
                        let entity = world.spawn_named(name.clone())?;
                        map.insert(*global_id, entity);
                    }
                }
            }

            for &system_id in &ids {
                let Some(buffer) = self.buffers.get_mut(&system_id) else {
                    continue;
                };
                for command in std::mem::take(&mut buffer.commands) {
                    match command {
                        Command::Spawn { .. } => {}
                        Command::With { target, write } | Command::Add { target, write } => {
                            let entity = resolve(target, &map)?;
                            write(world, entity)?;
                        }
                        Command::Set { target, write } => {
                            let entity = resolve(target, &map)?;
                            write(world, entity)?;
                        }
                        Command::Remove { target, write } => {
                            let entity = resolve(target, &map)?;
                            write(world, entity)?;
                        }
                        Command::Despawn { target } => {
                            let entity = resolve(target, &map)?;
                            world.despawn(entity)?;
                        }
                    }
                }
            }
        }

        for ids in batches {
            for system_id in ids {
                if let Some(buffer) = self.buffers.get_mut(system_id) {
                    buffer.clear();
                }
                self.rented.insert(*system_id, false);
            }
        }
        #[cfg(feature = "profiling")]
        debug!(systems = batches.iter().map(Vec::len).sum::<usize>(), entities = map.len(), "command buffers flushed");
        Ok(map)
    }

    /// Drop every buffer and reset buffer-id assignment. After this call the
    /// next `rent` for any system id starts a fresh buffer id.
    pub fn clear(&mut self) {
        self.buffer_ids.clear();
        self.next_buffer_id = 0;
        self.buffers.clear();
        self.rented.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_roundtrips_through_encode_decode() {
        for buffer_id in [0u32, 1, 255, 70_000] {
            for local_id in [-1i64, -2, -1000] {
                let global = encode_placeholder(buffer_id, local_id);
                assert_eq!(decode_placeholder(global), (buffer_id, local_id));
            }
        }
    }

    #[test]
    fn rent_twice_without_return_is_an_invariant_error() {
        let mut pool = CommandBufferPool::new();
        pool.rent(1).unwrap();
        assert!(pool.rent(1).is_err());
    }

    #[test]
    fn return_then_rent_reuses_the_same_buffer_id() {
        let mut pool = CommandBufferPool::new();
        let id_first = pool.rent(1).unwrap().global_id(-1);
        pool.return_buffer(1);
        let id_second = pool.rent(1).unwrap().global_id(-1);
        assert_eq!(id_first, id_second);
    }

    #[test]
    fn flush_rejects_a_batch_over_the_size_cap() {
        let mut pool = CommandBufferPool::new();
        {
            let buffer = pool.rent(1).unwrap();
            for _ in 0..(MAX_BATCH_SIZE + 1) {
                buffer.despawn(EntityId::NULL);
            }
        }
        let mut world = World::new();
        let err = pool.flush_all(&mut world).unwrap_err();
        assert!(matches!(err, EcsError::BatchTooLarge));
    }

    #[test]
    fn spawn_returns_distinct_negative_local_ids() {
        let mut pool = CommandBufferPool::new();
        let buffer = pool.rent(1).unwrap();
        let a = buffer.spawn(None);
        let b = buffer.spawn(None);
        assert!(a < 0 && b < 0);
        assert_ne!(a, b);
    }
}
