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

//! Archetype storage: chunked, struct-of-arrays columns with swap-back
//! removal.

use rustc_hash::FxHashMap;

use crate::component::Component;
use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::registry::{ComponentId, ComponentInfo};

#[cfg(feature = "profiling")]
use tracing::trace;

/// Default fixed capacity of a chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Canonical, order-independent identifier for a set of component types.
/// Two archetypes with the same component set compare equal and hash equal
/// regardless of the order components were added in, because the id is
/// always built from a sorted vector of [`ComponentId`]s.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchetypeId(Vec<ComponentId>);

impl ArchetypeId {
    pub fn from_unsorted(mut ids: Vec<ComponentId>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        Self(ids)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn component_ids(&self) -> &[ComponentId] {
        &self.0
    }

    /// New id describing this set plus `component`.
    pub fn with(&self, component: ComponentId) -> Self {
        let mut ids = self.0.clone();
        ids.push(component);
        Self::from_unsorted(ids)
    }

    /// New id describing this set minus `component`.
    pub fn without(&self, component: ComponentId) -> Self {
        let ids = self.0.iter().copied().filter(|&c| c != component).collect();
        Self(ids)
    }

    pub fn contains(&self, component: ComponentId) -> bool {
        self.0.binary_search(&component).is_ok()
    }
}

/// Type-erased, fixed-capacity column of one component type within one
/// chunk.
pub struct ComponentColumn {
    data: Vec<u8>,
    item_size: usize,
    drop_fn: Option<unsafe fn(*mut u8)>,
    capacity: usize,
}

impl ComponentColumn {
    fn new(info: ComponentInfo, capacity: usize) -> Self {
        Self {
            data: vec![0u8; info.size * capacity],
            item_size: info.size,
            drop_fn: info.drop_fn,
            capacity,
        }
    }

    fn ptr_mut(&mut self, index: usize) -> *mut u8 {
        debug_assert!(index < self.capacity);
        unsafe { self.data.as_mut_ptr().add(index * self.item_size) }
    }

    fn ptr(&self, index: usize) -> *const u8 {
        debug_assert!(index < self.capacity);
        unsafe { self.data.as_ptr().add(index * self.item_size) }
    }

    /// Write `value` into `index`, overwriting (not dropping) whatever
    /// uninitialised bytes were there.
    ///
    /// # Safety
    /// `index < capacity` and the slot must not already hold a live `T`.
    pub unsafe fn write<T: Component>(&mut self, index: usize, value: T) {
        std::ptr::write(self.ptr_mut(index) as *mut T, value);
    }

    /// # Safety
    /// `index < count` for the owning chunk.
    pub unsafe fn get<T: Component>(&self, index: usize) -> &T {
        &*(self.ptr(index) as *const T)
    }

    /// # Safety
    /// `index < count` for the owning chunk.
    pub unsafe fn get_mut<T: Component>(&mut self, index: usize) -> &mut T {
        &mut *(self.ptr_mut(index) as *mut T)
    }

    /// Move the value at `src` into `dst`, dropping whatever was
    /// previously occupying `dst` is the caller's responsibility.
    ///
    /// # Safety
    /// Both indices must be valid, occupied slots, and `self`/`other` must
    /// describe the same component type (callers are expected to have
    /// checked this; see [`copy_to`](Self::copy_to) for a checked version).
    pub unsafe fn move_raw(&mut self, src: usize, other: &mut ComponentColumn, dst: usize) {
        std::ptr::copy_nonoverlapping(self.ptr(src), other.ptr_mut(dst), self.item_size);
    }

    /// Move the value at `src` to `dst` within the same column. `src` and
    /// `dst` address disjoint byte ranges (fixed-stride slots), so this is
    /// a safe non-overlapping copy even though both indices come from one
    /// buffer.
    fn move_within(&mut self, src: usize, dst: usize) {
        if src == dst {
            return;
        }
        let base = self.data.as_mut_ptr();
        unsafe {
            let src_ptr = base.add(src * self.item_size);
            let dst_ptr = base.add(dst * self.item_size);
            std::ptr::copy_nonoverlapping(src_ptr, dst_ptr, self.item_size);
        }
    }

    /// Drop the value at `index` in place, if the type needs dropping.
    ///
    /// # Safety
    /// `index` must hold a live, not-yet-dropped value.
    pub unsafe fn drop_at(&mut self, index: usize) {
        if let Some(drop_fn) = self.drop_fn {
            drop_fn(self.ptr_mut(index));
        }
    }

    pub fn copy_to(&self, src: usize, dest: &mut ComponentColumn, dst: usize) -> Result<()> {
        if self.item_size != dest.item_size {
            return Err(EcsError::type_mismatch("<dest column type>", "<src column type>"));
        }
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr(src), dest.ptr_mut(dst), self.item_size);
        }
        Ok(())
    }
}

/// A fixed-capacity slice of an archetype's storage: one entity-id slot and
/// one component slot per column, up to [`DEFAULT_CHUNK_SIZE`] entities.
pub struct Chunk {
    capacity: usize,
    count: usize,
    entity_ids: Vec<EntityId>,
    columns: Vec<ComponentColumn>,
}

impl Chunk {
    fn new(infos: &[ComponentInfo], capacity: usize) -> Self {
        Self {
            capacity,
            count: 0,
            entity_ids: Vec::with_capacity(capacity),
            columns: infos.iter().map(|info| ComponentColumn::new(*info, capacity)).collect(),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.count >= self.capacity
    }

    pub fn entity_ids(&self) -> &[EntityId] {
        &self.entity_ids[..self.count]
    }

    pub fn column(&self, index: usize) -> &ComponentColumn {
        &self.columns[index]
    }

    pub fn column_mut(&mut self, index: usize) -> &mut ComponentColumn {
        &mut self.columns[index]
    }

    /// Typed, bounds-checked read-only view over `[0, count)`.
    pub fn as_slice<T: Component>(&self, column_index: usize) -> &[T] {
        let col = &self.columns[column_index];
        debug_assert_eq!(col.item_size, std::mem::size_of::<T>());
        unsafe { std::slice::from_raw_parts(col.data.as_ptr() as *const T, self.count) }
    }

    /// Typed, bounds-checked mutable view over `[0, count)`.
    pub fn as_mut_slice<T: Component>(&mut self, column_index: usize) -> &mut [T] {
        let col = &mut self.columns[column_index];
        debug_assert_eq!(col.item_size, std::mem::size_of::<T>());
        unsafe { std::slice::from_raw_parts_mut(col.data.as_mut_ptr() as *mut T, self.count) }
    }
}

/// One-per-component-set container: parallel chunks, one per component
/// type, plus an entity-id column.
pub struct Archetype {
    id: ArchetypeId,
    infos: Vec<ComponentInfo>,
    column_index: FxHashMap<ComponentId, usize>,
    chunk_capacity: usize,
    chunks: Vec<Chunk>,
    total_count: usize,
}

/// Row address of an entity within an archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Row {
    pub chunk: usize,
    pub slot: usize,
}

impl Archetype {
    pub fn new(id: ArchetypeId, mut infos: Vec<ComponentInfo>) -> Self {
        infos.sort_by_key(|info| info.id);
        let column_index = infos
            .iter()
            .enumerate()
            .map(|(i, info)| (info.id, i))
            .collect();
        Self {
            id,
            infos,
            column_index,
            chunk_capacity: DEFAULT_CHUNK_SIZE,
            chunks: Vec::new(),
            total_count: 0,
        }
    }

    pub fn with_chunk_capacity(mut self, capacity: usize) -> Self {
        self.chunk_capacity = capacity.max(1);
        self
    }

    pub fn id(&self) -> &ArchetypeId {
        &self.id
    }

    pub fn component_infos(&self) -> &[ComponentInfo] {
        &self.infos
    }

    pub fn has(&self, component: ComponentId) -> bool {
        self.column_index.contains_key(&component)
    }

    pub fn column_index_of(&self, component: ComponentId) -> Option<usize> {
        self.column_index.get(&component).copied()
    }

    pub fn count(&self) -> usize {
        self.total_count
    }

    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk_mut(&mut self, index: usize) -> &mut Chunk {
        &mut self.chunks[index]
    }

    /// Allocate a new row for `entity` in the last non-full chunk, creating
    /// one if necessary. Returns the row address; caller must then write
    /// every column before the archetype is considered consistent.
    pub fn allocate_row(&mut self, entity: EntityId) -> Row {
        if self.chunks.last().map_or(true, |c| c.is_full()) {
            #[cfg(feature = "profiling")]
            trace!(archetype = ?self.id, chunk = self.chunks.len(), "chunk allocated");
            self.chunks.push(Chunk::new(&self.infos, self.chunk_capacity));
        }
        let chunk_idx = self.chunks.len() - 1;
        let chunk = &mut self.chunks[chunk_idx];
        let slot = chunk.count;
        chunk.entity_ids.push(entity);
        chunk.count += 1;
        self.total_count += 1;
        Row { chunk: chunk_idx, slot }
    }

    /// Write `value` into the component column for `T` at `row`.
    pub fn set_component<T: Component>(&mut self, row: Row, component: ComponentId, value: T) -> Result<()> {
        let col_idx = self
            .column_index_of(component)
            .ok_or(EcsError::TypeMismatch(
                "component not present in archetype".into(),
            ))?;
        let chunk = &mut self.chunks[row.chunk];
        unsafe { chunk.columns[col_idx].write(row.slot, value) };
        Ok(())
    }

    pub fn get<T: Component>(&self, row: Row, component: ComponentId) -> Result<&T> {
        let col_idx = self
            .column_index_of(component)
            .ok_or(EcsError::TypeMismatch(
                "component not present in archetype".into(),
            ))?;
        if row.slot >= self.chunks[row.chunk].count {
            return Err(EcsError::OutOfRange {
                index: row.slot,
                len: self.chunks[row.chunk].count,
            });
        }
        Ok(unsafe { self.chunks[row.chunk].columns[col_idx].get(row.slot) })
    }

    pub fn get_mut<T: Component>(&mut self, row: Row, component: ComponentId) -> Result<&mut T> {
        let col_idx = self
            .column_index_of(component)
            .ok_or(EcsError::TypeMismatch(
                "component not present in archetype".into(),
            ))?;
        let count = self.chunks[row.chunk].count;
        if row.slot >= count {
            return Err(EcsError::OutOfRange { index: row.slot, len: count });
        }
        Ok(unsafe { self.chunks[row.chunk].columns[col_idx].get_mut(row.slot) })
    }

    /// Remove the entity at `row` via swap-back within its chunk.
    /// Returns the entity that was moved into `row`'s slot, if any.
    ///
    /// When the vacated slot was in a *non-last* chunk and that chunk
    /// becomes empty, the chunk is left in place (sparse) rather than
    /// compacted; only a trailing empty chunk is popped. This avoids
    /// cascading location-table fix-ups across shifted
    /// chunk indices while still preserving that `count` always bounds
    /// occupied slots and the `chunk_count` invariant for the common case.
    pub fn remove_row(&mut self, row: Row) -> Option<EntityId> {
        self.remove_row_excluding(row, &[])
    }

    /// Same as [`remove_row`](Self::remove_row), but does not drop the
    /// columns named in `preserve`. Used during archetype migration: those
    /// columns' bytes have already been moved into the destination
    /// archetype via [`copy_shared_columns_to`](Self::copy_shared_columns_to),
    /// so dropping them here would double-free the moved value.
    pub fn remove_row_excluding(&mut self, row: Row, preserve: &[ComponentId]) -> Option<EntityId> {
        let preserve_idx: Vec<usize> = preserve
            .iter()
            .filter_map(|c| self.column_index_of(*c))
            .collect();
        let chunk = &mut self.chunks[row.chunk];
        let last = chunk.count - 1;

        let moved = if row.slot != last {
            for (i, col) in chunk.columns.iter_mut().enumerate() {
                if !preserve_idx.contains(&i) {
                    unsafe { col.drop_at(row.slot) };
                }
                col.move_within(last, row.slot);
            }
            chunk.entity_ids.swap(row.slot, last);
            let moved_entity = chunk.entity_ids[row.slot];
            chunk.count -= 1;
            self.total_count -= 1;
            Some(moved_entity)
        } else {
            for (i, col) in chunk.columns.iter_mut().enumerate() {
                if !preserve_idx.contains(&i) {
                    unsafe { col.drop_at(row.slot) };
                }
            }
            chunk.count -= 1;
            self.total_count -= 1;
            None
        };

        if chunk.count == 0 && row.chunk == self.chunks.len() - 1 {
            #[cfg(feature = "profiling")]
            trace!(archetype = ?self.id, chunk = row.chunk, "chunk released");
            self.chunks.pop();
        }

        moved
    }

    /// Copy every column shared between `self` (at `src_row`) and `dest`
    /// (at `dest_row`), for use during archetype migration.
    pub fn copy_shared_columns_to(&self, src_row: Row, dest: &mut Archetype, dest_row: Row) {
        let src_chunk = &self.chunks[src_row.chunk];
        for (component, &src_col_idx) in &self.column_index {
            if let Some(&dest_col_idx) = dest.column_index.get(component) {
                let dest_chunk = &mut dest.chunks[dest_row.chunk];
                unsafe {
                    let src_ptr = src_chunk.columns[src_col_idx].ptr(src_row.slot);
                    let dest_col = &mut dest_chunk.columns[dest_col_idx];
                    std::ptr::copy_nonoverlapping(src_ptr, dest_col.ptr_mut(dest_row.slot), dest_col.item_size);
                }
            }
        }
    }
}

impl Drop for Archetype {
    fn drop(&mut self) {
        for chunk in &mut self.chunks {
            let count = chunk.count;
            for col in &mut chunk.columns {
                for i in 0..count {
                    unsafe { col.drop_at(i) };
                }
            }
        }
    }
}
