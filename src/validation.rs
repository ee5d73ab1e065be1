//! Component validation manager: requires/conflicts/custom-predicate
//! constraints, checked before every `add`.

use std::any::TypeId;

use rustc_hash::FxHashMap;

use crate::component::Component;
use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::world::World;

/// When validation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Enabled,
    /// Enabled only in debug builds (`cfg!(debug_assertions)`).
    DebugOnly,
    Disabled,
}

impl Default for ValidationMode {
    fn default() -> Self {
        ValidationMode::DebugOnly
    }
}

type Predicate = Box<dyn Fn(&World, EntityId, &dyn std::any::Any) -> bool + Send + Sync>;

/// Resolved constraints for one component type.
#[derive(Default)]
struct Constraints {
    requires: Vec<TypeId>,
    requires_names: Vec<&'static str>,
    conflicts: Vec<TypeId>,
    conflicts_names: Vec<&'static str>,
    predicate: Option<Predicate>,
}

/// A constraint provider supplies `(requires, conflicts)` for a type
/// without the manager having to perform reflection; it is registered once
/// per component type, typically by generated code external to this crate.
pub type ConstraintProvider = Box<dyn Fn() -> (Vec<TypeId>, Vec<&'static str>, Vec<TypeId>, Vec<&'static str>) + Send + Sync>;

#[derive(Default)]
pub struct ValidationManager {
    mode: ValidationMode,
    resolved: FxHashMap<TypeId, Constraints>,
}

impl ValidationManager {
    pub fn new(mode: ValidationMode) -> Self {
        Self {
            mode,
            resolved: FxHashMap::default(),
        }
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ValidationMode) {
        self.mode = mode;
    }

    fn is_active(&self) -> bool {
        match self.mode {
            ValidationMode::Enabled => true,
            ValidationMode::DebugOnly => cfg!(debug_assertions),
            ValidationMode::Disabled => false,
        }
    }

    /// Declare that `T` requires `U` to already be present on the entity.
    pub fn requires<T: Component, U: Component>(&mut self, required_name: &'static str) {
        let entry = self.resolved.entry(TypeId::of::<T>()).or_default();
        entry.requires.push(TypeId::of::<U>());
        entry.requires_names.push(required_name);
    }

    /// Declare that `T` conflicts with `U`.
    pub fn conflicts_with<T: Component, U: Component>(&mut self, conflicting_name: &'static str) {
        let entry = self.resolved.entry(TypeId::of::<T>()).or_default();
        entry.conflicts.push(TypeId::of::<U>());
        entry.conflicts_names.push(conflicting_name);
    }

    /// Resolve `T`'s constraints via an externally-supplied
    /// [`ConstraintProvider`] instead of calling `requires`/`conflicts_with`
    /// by hand — the usual path when a reflection-based scanner outside
    /// this crate discovers `requires(...)`/`conflicts_with(...)`
    /// attributes and hands the manager a closure instead of runtime
    /// reflection. The provider runs exactly once, at registration; the
    /// result is cached in `resolved` like any other entry.
    pub fn register_provider<T: Component>(&mut self, provider: ConstraintProvider) {
        let (requires, requires_names, conflicts, conflicts_names) = provider();
        let entry = self.resolved.entry(TypeId::of::<T>()).or_default();
        entry.requires.extend(requires);
        entry.requires_names.extend(requires_names);
        entry.conflicts.extend(conflicts);
        entry.conflicts_names.extend(conflicts_names);
    }

    /// Attach a custom predicate for `T`, evaluated with the world, the
    /// target entity, and the candidate value.
    pub fn set_predicate<T, F>(&mut self, predicate: F)
    where
        T: Component,
        F: Fn(&World, EntityId, &T) -> bool + Send + Sync + 'static,
    {
        let entry = self.resolved.entry(TypeId::of::<T>()).or_default();
        entry.predicate = Some(Box::new(move |world, entity, value| {
            match value.downcast_ref::<T>() {
                Some(v) => predicate(world, entity, v),
                None => true,
            }
        }));
    }

    /// Check all constraints declared for `T` against `entity`'s current
    /// component set plus `value`. No-op (`Ok(())`) when validation is not
    /// active for the current mode.
    pub fn validate<T: Component>(
        &self,
        world: &World,
        entity: EntityId,
        value: &T,
        type_name: &'static str,
        has_component: impl Fn(TypeId) -> bool,
    ) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        let Some(constraints) = self.resolved.get(&TypeId::of::<T>()) else {
            return Ok(());
        };

        for (required, name) in constraints.requires.iter().zip(&constraints.requires_names) {
            if !has_component(*required) {
                return Err(EcsError::Validation {
                    component: type_name,
                    entity,
                    reason: format!("requires {name}"),
                });
            }
        }
        for (conflicting, name) in constraints.conflicts.iter().zip(&constraints.conflicts_names) {
            if has_component(*conflicting) {
                return Err(EcsError::Validation {
                    component: type_name,
                    entity,
                    reason: format!("conflicts with {name}"),
                });
            }
        }
        if let Some(predicate) = &constraints.predicate {
            if !predicate(world, entity, value) {
                return Err(EcsError::Validation {
                    component: type_name,
                    entity,
                    reason: "custom validation failed".into(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::World;

    #[derive(Debug, Clone, Copy)]
    struct Transform;
    #[derive(Debug, Clone, Copy)]
    struct Renderable;
    #[derive(Debug, Clone, Copy)]
    struct Frozen;
    #[derive(Debug, Clone, Copy)]
    struct Moving;

    #[test]
    fn requires_blocks_add_without_dependency() {
        let mut mgr = ValidationManager::new(ValidationMode::Enabled);
        mgr.requires::<Renderable, Transform>("Transform");

        let world = World::new();
        let entity = EntityId::NULL;
        let err = mgr
            .validate(&world, entity, &Renderable, "Renderable", |_| false)
            .unwrap_err();
        assert!(matches!(err, EcsError::Validation { .. }));
    }

    #[test]
    fn requires_passes_with_dependency_present() {
        let mut mgr = ValidationManager::new(ValidationMode::Enabled);
        mgr.requires::<Renderable, Transform>("Transform");

        let world = World::new();
        let entity = EntityId::NULL;
        assert!(mgr
            .validate(&world, entity, &Renderable, "Renderable", |_| true)
            .is_ok());
    }

    #[test]
    fn conflicts_with_blocks_add() {
        let mut mgr = ValidationManager::new(ValidationMode::Enabled);
        mgr.conflicts_with::<Moving, Frozen>("Frozen");

        let world = World::new();
        let entity = EntityId::NULL;
        assert!(mgr
            .validate(&world, entity, &Moving, "Moving", |_| true)
            .is_err());
    }

    #[test]
    fn disabled_mode_always_passes() {
        let mut mgr = ValidationManager::new(ValidationMode::Disabled);
        mgr.requires::<Renderable, Transform>("Transform");

        let world = World::new();
        let entity = EntityId::NULL;
        assert!(mgr
            .validate(&world, entity, &Renderable, "Renderable", |_| false)
            .is_ok());
    }
}
