//! Observer bindings and the three shared polled timers (spec §4.5).

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use decof_value::Value;
use indexmap::IndexMap;

/// Identifies a client context for the purposes of observer bookkeeping.
/// Assigned once per context by [`crate::client_context::ContextCommon::new`].
pub type ContextId = u64;

struct ObserverSlot {
    context_id: ContextId,
    notify: Box<dyn Fn(&Value)>,
}

/// The set of live observers on one parameter. A context observing the
/// same URI twice replaces its own slot rather than duplicating it.
#[derive(Default)]
pub struct ObserverList {
    slots: RefCell<Vec<ObserverSlot>>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    pub fn add(&self, context_id: ContextId, notify: Box<dyn Fn(&Value)>) {
        let mut slots = self.slots.borrow_mut();
        slots.retain(|s| s.context_id != context_id);
        slots.push(ObserverSlot { context_id, notify });
    }

    /// Returns whether a slot for `context_id` existed and was removed.
    pub fn remove(&self, context_id: ContextId) -> bool {
        let mut slots = self.slots.borrow_mut();
        let before = slots.len();
        slots.retain(|s| s.context_id != context_id);
        slots.len() != before
    }

    pub fn notify_all(&self, value: &Value) {
        for slot in self.slots.borrow().iter() {
            (slot.notify)(value);
        }
    }
}

/// Which of the three shared polled timers an external-readonly parameter
/// registers with (spec §4.5 / glossary "fast/medium/slow timer").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Fast,
    Medium,
    Slow,
}

/// Three independent fan-out lists of tick callbacks, one per [`TimerKind`].
/// Owned by [`crate::dictionary::ObjectDictionary`]; the actual scheduling
/// (deciding *when* to call [`TimerHub::tick`]) is the host application's
/// job, kept out of this crate so it stays free of an async runtime
/// dependency.
#[derive(Default)]
pub struct TimerHub {
    fast: RefCell<IndexMap<u64, Rc<dyn Fn()>>>,
    medium: RefCell<IndexMap<u64, Rc<dyn Fn()>>>,
    slow: RefCell<IndexMap<u64, Rc<dyn Fn()>>>,
    next_id: Cell<u64>,
}

impl TimerHub {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn bucket(&self, kind: TimerKind) -> &RefCell<IndexMap<u64, Rc<dyn Fn()>>> {
        match kind {
            TimerKind::Fast => &self.fast,
            TimerKind::Medium => &self.medium,
            TimerKind::Slow => &self.slow,
        }
    }

    pub fn connect(&self, kind: TimerKind, tick: Rc<dyn Fn()>) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.bucket(kind).borrow_mut().insert(id, tick);
        id
    }

    pub fn disconnect(&self, kind: TimerKind, id: u64) {
        self.bucket(kind).borrow_mut().shift_remove(&id);
    }

    /// Fire every callback registered against `kind`. Called by the host
    /// application on whatever schedule it chooses (e.g. three
    /// `tokio::time::interval` loops in `demo-app`).
    pub fn tick(&self, kind: TimerKind) {
        let callbacks: Vec<_> = self.bucket(kind).borrow().values().cloned().collect();
        for cb in callbacks {
            cb();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell as StdCell;

    #[test]
    fn observer_replaces_same_context_slot() {
        let list = ObserverList::new();
        let count = Rc::new(StdCell::new(0));
        let c1 = count.clone();
        list.add(1, Box::new(move |_| c1.set(c1.get() + 1)));
        let c2 = count.clone();
        list.add(1, Box::new(move |_| c2.set(c2.get() + 10)));
        list.notify_all(&Value::Bool(true));
        assert_eq!(count.get(), 10);
    }

    #[test]
    fn timer_hub_disconnect_stops_future_ticks() {
        let hub = TimerHub::new();
        let count = Rc::new(StdCell::new(0));
        let c = count.clone();
        let id = hub.connect(TimerKind::Fast, Rc::new(move || c.set(c.get() + 1)));
        hub.tick(TimerKind::Fast);
        hub.disconnect(TimerKind::Fast, id);
        hub.tick(TimerKind::Fast);
        assert_eq!(count.get(), 1);
    }
}
