//! Synchronous event bus with disposable subscriptions.
//!
//! Unlike a deferred publish/process queue, `publish` invokes every
//! subscribed handler immediately, on the calling thread, in subscription
//! order. Handler storage is type-erased the same way a per-event-type
//! queue would be (one boxed, downcastable container per `TypeId`), but it
//! holds a handler list instead of buffered events.

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

#[cfg(feature = "profiling")]
use tracing::trace;

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

trait HandlerStorage: Send + Sync {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn len(&self) -> usize;
    fn remove(&mut self, id: u64) -> bool;
}

struct TypedHandlers<E> {
    next_id: u64,
    handlers: Vec<(u64, Handler<E>)>,
}

impl<E> TypedHandlers<E> {
    fn new() -> Self {
        Self {
            next_id: 0,
            handlers: Vec::new(),
        }
    }
}

impl<E: 'static> HandlerStorage for TypedHandlers<E> {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn len(&self) -> usize {
        self.handlers.len()
    }

    fn remove(&mut self, id: u64) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(hid, _)| *hid != id);
        self.handlers.len() != before
    }
}

#[derive(Default)]
struct Inner {
    storage: FxHashMap<TypeId, Box<dyn HandlerStorage>>,
}

/// A subscribe/publish bus. Cheap to clone: all clones share the same
/// underlying handler tables, so subscriptions outlive any single
/// reference to the bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Inner>>,
}

/// A disposable handle returned by [`EventBus::subscribe`]. Disposal is
/// idempotent and safe to call from inside the handler it guards.
pub struct Subscription {
    bus: Arc<Mutex<Inner>>,
    type_id: TypeId,
    id: u64,
    disposed: AtomicBool,
}

impl Subscription {
    /// Remove the handler. Calling this more than once, including from
    /// inside the handler's own body during a publish, is a no-op after
    /// the first call.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut inner = self.bus.lock();
        if let Some(storage) = inner.storage.get_mut(&self.type_id) {
            storage.remove(self.id);
        }
        #[cfg(feature = "profiling")]
        trace!(handler_id = self.id, "subscription disposed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Subscriptions are explicit: dropping the handle does not
        // auto-unsubscribe. Callers keep it alive exactly as long as they
        // want the handler installed; use `dispose` or `clear` to remove it.
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler for events of type `E`. Handlers fire in
    /// subscription order.
    pub fn subscribe<E, F>(&self, handler: F) -> Arc<Subscription>
    where
        E: 'static,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<E>();
        let mut inner = self.inner.lock();
        let storage = inner
            .storage
            .entry(type_id)
            .or_insert_with(|| Box::new(TypedHandlers::<E>::new()));
        let typed = storage
            .as_any_mut()
            .downcast_mut::<TypedHandlers<E>>()
            .expect("handler storage type mismatch");
        let id = typed.next_id;
        typed.next_id += 1;
        typed.handlers.push((id, Arc::new(handler)));

        #[cfg(feature = "profiling")]
        trace!(event = std::any::type_name::<E>(), handler_id = id, "handler subscribed");

        Arc::new(Subscription {
            bus: Arc::clone(&self.inner),
            type_id,
            id,
            disposed: AtomicBool::new(false),
        })
    }

    /// Invoke every handler subscribed to `E`, in subscription order, on
    /// the calling thread. A handler snapshot is taken before invocation so
    /// a handler may dispose itself (or subscribe a new handler) safely:
    /// self-disposal doesn't skip handlers already in this publish's
    /// snapshot, and newly-subscribed handlers are not invoked until the
    /// next `publish`.
    pub fn publish<E: 'static>(&self, value: &E) {
        let snapshot: Vec<Handler<E>> = {
            let mut inner = self.inner.lock();
            match inner
                .storage
                .get_mut(&TypeId::of::<E>())
                .and_then(|s| s.as_any_mut().downcast_mut::<TypedHandlers<E>>())
            {
                Some(typed) => typed.handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return,
            }
        };
        #[cfg(feature = "profiling")]
        trace!(event = std::any::type_name::<E>(), handlers = snapshot.len(), "event published");
        for handler in snapshot {
            handler(value);
        }
    }

    pub fn has_handlers<E: 'static>(&self) -> bool {
        self.handler_count::<E>() > 0
    }

    pub fn handler_count<E: 'static>(&self) -> usize {
        let inner = self.inner.lock();
        inner
            .storage
            .get(&TypeId::of::<E>())
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Drop every handler for every event type. Called on world disposal so
    /// long-lived external subscribers do not keep the world's state alive
    /// and are never invoked again.
    pub fn clear(&self) {
        self.inner.lock().storage.clear();
    }
}

static _ASSERT_SEND_SYNC: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<EventBus>();
    assert::<AtomicU64>();
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct Ping(u32);

    #[test]
    fn publish_invokes_handlers_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        bus.subscribe::<Ping, _>(move |p| o1.lock().push((1, p.0)));
        bus.subscribe::<Ping, _>(move |p| o2.lock().push((2, p.0)));
        bus.publish(&Ping(42));
        assert_eq!(*order.lock(), vec![(1, 42), (2, 42)]);
    }

    #[test]
    fn dispose_is_idempotent_and_stops_future_invocations() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let sub = bus.subscribe::<Ping, _>(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(&Ping(1));
        assert_eq!(bus.handler_count::<Ping>(), 1);
        sub.dispose();
        sub.dispose(); // idempotent
        assert_eq!(bus.handler_count::<Ping>(), 0);
        bus.publish(&Ping(2));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_may_dispose_itself_mid_publish() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let sub: Arc<Mutex<Option<Arc<Subscription>>>> = Arc::new(Mutex::new(None));
        let sub_for_handler = sub.clone();
        let handle = bus.subscribe::<Ping, _>(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            if let Some(s) = sub_for_handler.lock().as_ref() {
                s.dispose();
            }
        });
        *sub.lock() = Some(handle);

        bus.publish(&Ping(1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        bus.publish(&Ping(2));
        assert_eq!(count.load(Ordering::SeqCst), 1, "handler removed itself");
    }

    #[test]
    fn clear_removes_every_handler() {
        let bus = EventBus::new();
        bus.subscribe::<Ping, _>(|_| {});
        bus.subscribe::<Ping, _>(|_| {});
        assert_eq!(bus.handler_count::<Ping>(), 2);
        bus.clear();
        assert_eq!(bus.handler_count::<Ping>(), 0);
    }
}
