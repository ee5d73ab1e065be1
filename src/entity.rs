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

//! Entity identifiers and location metadata.
//!
//! `EntityId` is a `(id, version)` value handle. Rather than hand-rolling a
//! free-list allocator, it is backed by `slotmap`'s generational key type,
//! which already implements exactly this algorithm (recycle freed slots,
//! bump a generation counter on reuse) and is an existing dependency of
//! this crate.

use slotmap::{Key, KeyData};

slotmap::new_key_type! {
    /// Unique entity identifier backed by slotmap's generational keys.
    pub struct EntityId;
}

impl EntityId {
    /// The null entity: never alive. Built from `idx = u32::MAX`, the same
    /// out-of-range slot `slotmap::KeyData::null()` reserves for its own
    /// default key, so it can never be bit-identical to a real, freshly
    /// allocated slot (those start at `idx = 0`).
    pub const NULL: EntityId = EntityId(KeyData::from_ffi((1u64 << 32) | u32::MAX as u64));

    /// 32-bit slot index component of the handle.
    pub fn id(self) -> u32 {
        (self.data().as_ffi() & 0xFFFF_FFFF) as u32
    }

    /// 32-bit generation/version component of the handle. Incremented
    /// every time the slot is recycled.
    pub fn version(self) -> u32 {
        (self.data().as_ffi() >> 32) as u32
    }

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

/// Entity location in archetype storage: which archetype, which chunk,
/// which slot within the chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype_index: usize,
    pub chunk: usize,
    pub slot: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn null_entity_never_collides_with_a_real_slot() {
        assert_eq!(EntityId::NULL.id(), u32::MAX);
        assert!(EntityId::NULL.is_null());

        let mut map: SlotMap<EntityId, ()> = SlotMap::with_key();
        let first = map.insert(());
        assert_ne!(first, EntityId::NULL);
        assert!(!first.is_null());
    }

    #[test]
    fn recycled_slot_gets_a_larger_version() {
        let mut map: SlotMap<EntityId, ()> = SlotMap::with_key();
        let e1 = map.insert(());
        map.remove(e1);
        let e2 = map.insert(());
        assert_eq!(e1.id(), e2.id(), "slot should be recycled");
        assert!(e2.version() > e1.version());
    }
}
