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

//! Archetype storage and lookup.
//!
//! `World` owns one [`ArchetypeManager`]; the manager owns the archetype
//! vector and the `ArchetypeId -> index` lookup, and is the only thing that
//! ever creates or indexes an `Archetype`. `World` itself only ever goes
//! through here for archetype access, the way the entity location table and
//! the archetype vector are a single unit in the donor's `World` but
//! addressed through one name instead of two fields.

use std::ops::{Index, IndexMut};

use rustc_hash::FxHashMap;

use crate::archetype::{Archetype, ArchetypeId};
use crate::error::{EcsError, Result};
use crate::registry::ComponentRegistry;

/// Safety cap on the number of distinct archetypes a world will create.
/// Tripping it almost always means component values are being used as ad
/// hoc archetype keys (e.g. a counter stored as a marker component), which
/// produces one archetype per entity instead of one per shape.
pub(crate) const MAX_ARCHETYPES: usize = 65_536;

pub(crate) struct ArchetypeManager {
    archetypes: Vec<Archetype>,
    lookup: FxHashMap<ArchetypeId, usize>,
    chunk_capacity: usize,
}

impl ArchetypeManager {
    pub(crate) fn new(chunk_capacity: usize, initial_capacity: usize) -> Self {
        Self {
            archetypes: Vec::with_capacity(initial_capacity),
            lookup: FxHashMap::default(),
            chunk_capacity,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.archetypes.len()
    }

    pub(crate) fn all(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub(crate) fn ptr(&self, index: usize) -> Option<std::ptr::NonNull<Archetype>> {
        self.archetypes.get(index).map(std::ptr::NonNull::from)
    }

    pub(crate) fn ptr_mut(&mut self, index: usize) -> Option<std::ptr::NonNull<Archetype>> {
        self.archetypes.get_mut(index).map(std::ptr::NonNull::from)
    }

    pub(crate) fn pair_mut(&mut self, a: usize, b: usize) -> (&mut Archetype, &mut Archetype) {
        assert_ne!(a, b, "migration always changes archetype");
        if a < b {
            let (left, right) = self.archetypes.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.archetypes.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }

    /// Resolve `id` to an archetype index, creating the archetype if no
    /// existing one matches. The returned `bool` is `true` exactly when a
    /// new archetype was created, so the caller can publish
    /// `ArchetypeCreated` exactly once per new shape instead of per lookup.
    pub(crate) fn index_for(&mut self, id: &ArchetypeId, registry: &ComponentRegistry) -> Result<(usize, bool)> {
        if let Some(&idx) = self.lookup.get(id) {
            return Ok((idx, false));
        }
        if self.archetypes.len() >= MAX_ARCHETYPES {
            return Err(EcsError::Invariant(format!("archetype cap of {MAX_ARCHETYPES} exceeded")));
        }
        let infos = id
            .component_ids()
            .iter()
            .map(|cid| {
                registry
                    .get_by_id(*cid)
                    .ok_or_else(|| EcsError::Invariant(format!("component id {cid:?} used before registration")))
            })
            .collect::<Result<Vec<_>>>()?;
        let archetype = Archetype::new(id.clone(), infos).with_chunk_capacity(self.chunk_capacity);
        let idx = self.archetypes.len();
        self.archetypes.push(archetype);
        self.lookup.insert(id.clone(), idx);
        Ok((idx, true))
    }
}

impl Index<usize> for ArchetypeManager {
    type Output = Archetype;

    fn index(&self, index: usize) -> &Archetype {
        &self.archetypes[index]
    }
}

impl IndexMut<usize> for ArchetypeManager {
    fn index_mut(&mut self, index: usize) -> &mut Archetype {
        &mut self.archetypes[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ComponentRegistry;

    #[derive(Debug, Clone, Copy)]
    struct Position;

    #[test]
    fn index_for_reuses_the_same_index_for_an_equal_id() {
        let mut registry = ComponentRegistry::new();
        let info = registry.get_or_register::<Position>();
        let id = ArchetypeId::from_unsorted(vec![info.id]);

        let mut mgr = ArchetypeManager::new(4096, 4);
        let (idx1, created1) = mgr.index_for(&id, &registry).unwrap();
        let (idx2, created2) = mgr.index_for(&id, &registry).unwrap();
        assert_eq!(idx1, idx2);
        assert!(created1);
        assert!(!created2);
    }

    #[test]
    fn archetype_cap_is_enforced() {
        let registry = ComponentRegistry::new();
        let mut mgr = ArchetypeManager::new(4096, 4);
        for i in 0..MAX_ARCHETYPES {
            mgr.archetypes.push(Archetype::new(ArchetypeId::from_unsorted(vec![]), vec![]));
            mgr.lookup.insert(ArchetypeId::from_unsorted(vec![crate::registry::ComponentId(i as u32 + 1)]), i);
        }
        let over = ArchetypeId::from_unsorted(vec![crate::registry::ComponentId(u32::MAX)]);
        assert!(mgr.index_for(&over, &registry).is_err());
    }
}
