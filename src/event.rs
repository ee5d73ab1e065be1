//! Lifecycle event payloads published on a world's [`EventBus`](crate::event_bus::EventBus).
//! Each struct is just the payload; firing order and timing relative
//! to the mutation that caused it are documented on [`crate::World`].

use crate::component::Component;
use crate::entity::EntityId;
use crate::registry::ComponentId;

/// Fired after a new entity is fully populated with its initial
/// components.
#[derive(Debug, Clone)]
pub struct EntityCreated {
    pub entity: EntityId,
    pub name: Option<String>,
}

/// Fired before the entity is physically removed; the entity still reports
/// alive and its components are still readable when handlers run.
#[derive(Debug, Clone, Copy)]
pub struct EntityDestroyed {
    pub entity: EntityId,
}

/// Fired when `add::<T>` (or the entity-builder's initial-components path)
/// causes `T` to newly appear on `entity`.
#[derive(Debug, Clone)]
pub struct ComponentAdded<T: Component + Clone> {
    pub entity: EntityId,
    pub value: T,
}

/// Fired when `remove::<T>` actually removed a component (i.e. it
/// returned `true`).
#[derive(Debug, Clone, Copy)]
pub struct ComponentRemoved<T: Component> {
    pub entity: EntityId,
    pub _marker: std::marker::PhantomData<T>,
}

/// Fired by `set::<T>` only — never by `add::<T>`.
#[derive(Debug, Clone)]
pub struct ComponentChanged<T: Component + Clone> {
    pub entity: EntityId,
    pub old: T,
    pub new: T,
}

/// Fired by the archetype manager the first time a given component-set
/// shape is created, before any entity occupies it. The query cache
/// subscribes to this to extend its cached match lists incrementally
/// instead of rebuilding them from scratch on every lookup.
#[derive(Debug, Clone)]
pub struct ArchetypeCreated {
    pub index: usize,
    pub component_ids: Vec<ComponentId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::EventBus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
    }

    #[test]
    fn component_changed_carries_old_and_new() {
        let bus = EventBus::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        bus.subscribe::<ComponentChanged<Position>, _>(move |e| {
            seen2.lock().unwrap().push((e.old.x, e.new.x));
        });

        bus.publish(&ComponentChanged {
            entity: EntityId::NULL,
            old: Position { x: 1.0 },
            new: Position { x: 2.0 },
        });
        bus.publish(&ComponentChanged {
            entity: EntityId::NULL,
            old: Position { x: 2.0 },
            new: Position { x: 3.0 },
        });

        assert_eq!(*seen.lock().unwrap(), vec![(1.0, 2.0), (2.0, 3.0)]);
    }

    #[test]
    fn component_removed_not_fired_for_missing_component() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe::<ComponentRemoved<Position>, _>(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        // Simulates World::remove returning false: no publish call is made.
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
