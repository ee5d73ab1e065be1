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

//! Component and Bundle traits
//!
//! Components are data attached to entities.
//! Bundles group multiple components for spawning.

use std::any::TypeId;

use smallvec::{smallvec, SmallVec};

use crate::archetype::{Archetype, ArchetypeId, Row};
use crate::entity::EntityId;
use crate::error::Result;
use crate::event::ComponentAdded;
use crate::event_bus::EventBus;
use crate::registry::{ComponentInfo, ComponentRegistry};
use crate::world::World;

/// Maximum number of components supported by Bundle implementations
pub const MAX_BUNDLE_COMPONENTS: usize = 8;

/// Marker trait for components
///
/// Components must be 'static (no borrowed data)
pub trait Component: 'static + Send + Sync {}

/// Automatically implement Component for all valid types
impl<T: 'static + Send + Sync> Component for T {}

/// Bundle of components
///
/// Allows spawning entities with multiple components at once.
pub trait Bundle: Send + Sync + 'static {
    /// Get type IDs of all components in bundle
    fn type_ids() -> SmallVec<[TypeId; MAX_BUNDLE_COMPONENTS]>
    where
        Self: Sized;

    /// Register every component type in the bundle, returning its
    /// [`ComponentInfo`] in the same order `write` expects.
    fn register_components(registry: &mut ComponentRegistry) -> SmallVec<[ComponentInfo; MAX_BUNDLE_COMPONENTS]>
    where
        Self: Sized;

    /// Run every component's `requires`/`conflicts`/custom-predicate
    /// constraints against `archetype_id` (the shape the bundle is about to
    /// occupy), the same check `add` runs before it migrates an entity.
    fn check_constraints(&self, world: &World, entity: EntityId, archetype_id: &ArchetypeId) -> Result<()>
    where
        Self: Sized;

    /// Write each component into `archetype` at `row`, using `infos` (as
    /// produced by `register_components`) to locate each column, and fire
    /// [`ComponentAdded`] for each one exactly as `add` would.
    fn write(self, archetype: &mut Archetype, row: Row, infos: &[ComponentInfo], events: &EventBus, entity: EntityId) -> Result<()>
    where
        Self: Sized;
}

// Macro for tuple Bundle implementations
macro_rules! impl_bundle {
    ($count:expr; $($T:ident),*) => {
        #[allow(non_snake_case)]
        impl<$($T: Component + Clone),*> Bundle for ($($T,)*) {
            fn type_ids() -> SmallVec<[TypeId; MAX_BUNDLE_COMPONENTS]> {
                smallvec![$(TypeId::of::<$T>()),*]
            }

            fn register_components(registry: &mut ComponentRegistry) -> SmallVec<[ComponentInfo; MAX_BUNDLE_COMPONENTS]> {
                smallvec![$(registry.get_or_register::<$T>()),*]
            }

            fn check_constraints(&self, world: &World, entity: EntityId, archetype_id: &ArchetypeId) -> Result<()> {
                let ($($T,)*) = self;
                $(
                    world.check_bundle_constraint($T, entity, archetype_id)?;
                )*
                Ok(())
            }

            fn write(self, archetype: &mut Archetype, row: Row, infos: &[ComponentInfo], events: &EventBus, entity: EntityId) -> Result<()> {
                let ($($T,)*) = self;
                let mut i = 0;
                $(
                    archetype.set_component(row, infos[i].id, $T.clone())?;
                    events.publish(&ComponentAdded { entity, value: $T });
                    i += 1;
                )*
                let _ = i;
                Ok(())
            }
        }
    };
}

impl_bundle!(1; A);
impl_bundle!(2; A, B);
impl_bundle!(3; A, B, C);
impl_bundle!(4; A, B, C, D);
impl_bundle!(5; A, B, C, D, E);
impl_bundle!(6; A, B, C, D, E, F);
impl_bundle!(7; A, B, C, D, E, F, G);
impl_bundle!(8; A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    #![allow(dead_code)]
    use super::*;

    #[derive(Debug, Clone, Copy)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy)]
    struct Velocity {
        x: f32,
    }

    #[test]
    fn test_single_component() {
        let type_ids = <(Position,)>::type_ids();
        assert_eq!(type_ids.len(), 1);
        assert_eq!(type_ids[0], TypeId::of::<Position>());
    }

    #[test]
    fn test_multiple_components() {
        let type_ids = <(Position, Velocity)>::type_ids();
        assert_eq!(type_ids.len(), 2);
    }

    #[test]
    fn register_components_matches_type_ids_order() {
        let mut registry = ComponentRegistry::new();
        let infos = <(Position, Velocity)>::register_components(&mut registry);
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].type_id, TypeId::of::<Position>());
        assert_eq!(infos[1].type_id, TypeId::of::<Velocity>());
    }
}
