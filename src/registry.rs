//! Component registry: stable integer ids for component types.

use std::any::{type_name, TypeId};

use rustc_hash::FxHashMap;

use crate::component::Component;
use crate::error::{EcsError, Result};

/// Stable integer id assigned to a component type on first registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub u32);

impl ComponentId {
    /// A stable id derived directly from `TypeId`, independent of any
    /// particular [`ComponentRegistry`] instance. `SystemAccess` conflict
    /// checks only need equal types to compare equal and distinct types to
    /// compare distinct; they don't need the small, densely-packed ids a
    /// registry hands out, so they use this instead of threading a
    /// `&ComponentRegistry` through every system declaration.
    pub fn of<T: Component>() -> Self {
        use std::hash::{Hash, Hasher};
        let mut hasher = rustc_hash::FxHasher::default();
        TypeId::of::<T>().hash(&mut hasher);
        ComponentId(hasher.finish() as u32)
    }
}

/// Metadata recorded for a registered component type.
#[derive(Debug, Clone, Copy)]
pub struct ComponentInfo {
    pub id: ComponentId,
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub size: usize,
    pub alignment: usize,
    pub is_tag: bool,
    pub drop_fn: Option<unsafe fn(*mut u8)>,
}

/// Assigns and records [`ComponentInfo`] for every component type used by a
/// world. Re-registration is idempotent.
#[derive(Default)]
pub struct ComponentRegistry {
    infos: Vec<ComponentInfo>,
    by_type: FxHashMap<TypeId, ComponentId>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T`, or return its existing [`ComponentInfo`] if already
    /// registered. `is_tag` marks a zero-size marker component.
    pub fn register<T: Component>(&mut self, is_tag: bool) -> ComponentInfo {
        let type_id = TypeId::of::<T>();
        if let Some(&id) = self.by_type.get(&type_id) {
            return self.infos[id.0 as usize];
        }

        let id = ComponentId(self.infos.len() as u32);
        let info = ComponentInfo {
            id,
            type_id,
            type_name: type_name::<T>(),
            size: std::mem::size_of::<T>(),
            alignment: std::mem::align_of::<T>().max(1),
            is_tag: is_tag || std::mem::size_of::<T>() == 0,
            drop_fn: if std::mem::needs_drop::<T>() {
                Some(|ptr| unsafe { std::ptr::drop_in_place(ptr as *mut T) })
            } else {
                None
            },
        };
        self.infos.push(info);
        self.by_type.insert(type_id, id);
        info
    }

    /// Same as [`register`](Self::register) with `is_tag = false`.
    pub fn get_or_register<T: Component>(&mut self) -> ComponentInfo {
        self.register::<T>(false)
    }

    pub fn get_by_type<T: Component>(&self) -> Option<ComponentInfo> {
        self.by_type
            .get(&TypeId::of::<T>())
            .map(|&id| self.infos[id.0 as usize])
    }

    pub fn get_by_id(&self, id: ComponentId) -> Option<ComponentInfo> {
        self.infos.get(id.0 as usize).copied()
    }

    pub fn is_registered<T: Component>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }

    pub fn require<T: Component>(&self) -> Result<ComponentInfo> {
        self.get_by_type::<T>()
            .ok_or(EcsError::UnregisteredType(type_name::<T>()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.infos.iter()
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    struct Velocity;
    struct Marker;

    #[test]
    fn register_assigns_incrementing_ids() {
        let mut reg = ComponentRegistry::new();
        let p = reg.register::<Position>(false);
        let v = reg.register::<Velocity>(false);
        assert_eq!(p.id.0, 0);
        assert_eq!(v.id.0, 1);
    }

    #[test]
    fn reregistration_is_idempotent() {
        let mut reg = ComponentRegistry::new();
        let first = reg.register::<Position>(false);
        let second = reg.register::<Position>(false);
        assert_eq!(first.id, second.id);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn zero_sized_types_are_tags() {
        let mut reg = ComponentRegistry::new();
        let info = reg.register::<Marker>(false);
        assert!(info.is_tag);
        assert_eq!(info.size, 0);
    }

    #[test]
    fn unregistered_lookup_fails() {
        let reg = ComponentRegistry::new();
        assert!(reg.require::<Position>().is_err());
    }
}
