use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use crate::error::{KatonaError, Result};

/// Identifier returned by every registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Shared handler cell. The `RefCell` lets `emit` detect a handler that
/// re-enters itself through a nested emission.
pub type Handler<K, S, P> = Rc<RefCell<dyn FnMut(&mut S, &EventBus<K, S, P>, &P) -> Result<()>>>;

struct Registration<K, S, P> {
    id: HandlerId,
    handler: Handler<K, S, P>,
    once: bool,
}

struct Registry<K, S, P> {
    handlers: HashMap<K, Vec<Registration<K, S, P>>>,
    /// Keyed by the expiry event: handlers to drop once it has been emitted.
    expirations: HashMap<K, Vec<(K, HandlerId)>>,
    next_id: u64,
}

impl<K, S, P> Registry<K, S, P>
where
    K: Copy + Eq + Hash + fmt::Display,
{
    fn ensure_known(&self, kind: K) -> Result<()> {
        if self.handlers.contains_key(&kind) {
            Ok(())
        } else {
            Err(KatonaError::UnknownEvent(kind.to_string()))
        }
    }

    fn remove(&mut self, kind: K, id: HandlerId) -> bool {
        let Some(list) = self.handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|registration| registration.id != id);
        before != list.len()
    }

    fn contains(&self, kind: K, id: HandlerId) -> bool {
        self.handlers
            .get(&kind)
            .is_some_and(|list| list.iter().any(|registration| registration.id == id))
    }
}

/// Event bus over a closed set of event kinds `K`, handing `&mut S` and a
/// payload `P` to each handler.
///
/// Dispatch is synchronous and single-threaded. `emit` iterates over a
/// snapshot of the handler list: handlers registered while an emission is
/// running are not called for it, and handlers removed while it is running
/// are skipped. Expiring registrations are dropped after every handler of
/// their expiry event has run.
pub struct EventBus<K, S, P> {
    registry: RefCell<Registry<K, S, P>>,
}

impl<K, S, P> EventBus<K, S, P>
where
    K: Copy + Eq + Hash + fmt::Display,
{
    /// Create a bus that accepts exactly the given event kinds.
    pub fn new(kinds: impl IntoIterator<Item = K>) -> Self {
        let mut handlers = HashMap::new();
        let mut expirations = HashMap::new();
        for kind in kinds {
            handlers.insert(kind, Vec::new());
            expirations.insert(kind, Vec::new());
        }
        Self {
            registry: RefCell::new(Registry {
                handlers,
                expirations,
                next_id: 0,
            }),
        }
    }

    pub fn on<F>(&self, kind: K, handler: F) -> Result<HandlerId>
    where
        F: FnMut(&mut S, &EventBus<K, S, P>, &P) -> Result<()> + 'static,
    {
        self.register(kind, Rc::new(RefCell::new(handler)), false, None)
    }

    /// Register a handler that runs at most once.
    pub fn once<F>(&self, kind: K, handler: F) -> Result<HandlerId>
    where
        F: FnMut(&mut S, &EventBus<K, S, P>, &P) -> Result<()> + 'static,
    {
        self.register(kind, Rc::new(RefCell::new(handler)), true, None)
    }

    /// Register a handler that is dropped the next time `expiry` is emitted.
    pub fn on_until<F>(&self, kind: K, handler: F, expiry: K) -> Result<HandlerId>
    where
        F: FnMut(&mut S, &EventBus<K, S, P>, &P) -> Result<()> + 'static,
    {
        self.register(kind, Rc::new(RefCell::new(handler)), false, Some(expiry))
    }

    fn register(
        &self,
        kind: K,
        handler: Handler<K, S, P>,
        once: bool,
        expiry: Option<K>,
    ) -> Result<HandlerId> {
        let mut registry = self.registry.borrow_mut();
        registry.ensure_known(kind)?;
        if let Some(expiry) = expiry {
            registry.ensure_known(expiry)?;
        }

        let id = HandlerId(registry.next_id);
        registry.next_id += 1;

        if let Some(list) = registry.handlers.get_mut(&kind) {
            list.push(Registration { id, handler, once });
        }
        if let Some(expiry) = expiry {
            if let Some(pending) = registry.expirations.get_mut(&expiry) {
                pending.push((kind, id));
            }
        }
        Ok(id)
    }

    /// Remove a registration. Returns whether it was still present.
    pub fn off(&self, kind: K, id: HandlerId) -> Result<bool> {
        let mut registry = self.registry.borrow_mut();
        registry.ensure_known(kind)?;
        let removed = registry.remove(kind, id);
        for pending in registry.expirations.values_mut() {
            pending.retain(|(pending_kind, pending_id)| !(*pending_kind == kind && *pending_id == id));
        }
        Ok(removed)
    }

    /// Run every handler registered for `kind`, in registration order, then
    /// drop the registrations that expire on `kind`.
    ///
    /// The first handler error aborts the emission and is returned as is.
    pub fn emit(&self, state: &mut S, kind: K, payload: &P) -> Result<()> {
        let snapshot: Vec<(HandlerId, Handler<K, S, P>, bool)> = {
            let mut registry = self.registry.borrow_mut();
            registry.ensure_known(kind)?;
            match registry.handlers.get_mut(&kind) {
                Some(list) => {
                    let snapshot: Vec<_> = list
                        .iter()
                        .map(|registration| {
                            (registration.id, Rc::clone(&registration.handler), registration.once)
                        })
                        .collect();
                    list.retain(|registration| !registration.once);
                    snapshot
                }
                None => Vec::new(),
            }
        };

        for (id, handler, once) in snapshot {
            if !once && !self.registry.borrow().contains(kind, id) {
                continue;
            }
            let mut callback = handler
                .try_borrow_mut()
                .map_err(|_| KatonaError::ReentrantHandler(id.raw()))?;
            (&mut *callback)(state, self, payload)?;
        }

        self.expire(kind);
        Ok(())
    }

    fn expire(&self, kind: K) {
        let mut registry = self.registry.borrow_mut();
        let pending = registry
            .expirations
            .get_mut(&kind)
            .map(std::mem::take)
            .unwrap_or_default();
        for (handler_kind, id) in pending {
            registry.remove(handler_kind, id);
        }
    }

    /// Drop every registration that has a pending expiry, regardless of
    /// which event it waits for.
    pub fn remove_all_expiring(&self) {
        let mut registry = self.registry.borrow_mut();
        let pending: Vec<(K, HandlerId)> = registry
            .expirations
            .values_mut()
            .flat_map(std::mem::take)
            .collect();
        for (handler_kind, id) in pending {
            registry.remove(handler_kind, id);
        }
    }

    /// Number of live registrations for `kind`.
    pub fn registered(&self, kind: K) -> Result<usize> {
        let registry = self.registry.borrow();
        registry.ensure_known(kind)?;
        Ok(registry.handlers.get(&kind).map_or(0, Vec::len))
    }

    pub fn is_registered(&self, kind: K, id: HandlerId) -> bool {
        self.registry.borrow().contains(kind, id)
    }

    /// Every kind this bus accepts, in no particular order.
    pub fn kinds(&self) -> Vec<K> {
        self.registry.borrow().handlers.keys().copied().collect()
    }
}
