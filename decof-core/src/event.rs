//! Fire-and-forget events (spec §3/§4.4 "Signalling").

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::access::Userlevel;
use crate::error::{DecofError, NotImplementedSnafu};
use crate::object::{ObjectKind, ObjectNode};

type Handler = Box<dyn Fn() -> Result<(), DecofError>>;

struct EventInner {
    name: String,
    parent: RefCell<Option<Weak<dyn ObjectNode>>>,
    write_level: Userlevel,
    handler: RefCell<Option<Handler>>,
}

/// An object that is never read, and whose write carries no payload: it is
/// only ever signalled. Unreadable (`read_level` is always `Forbidden`);
/// `write_level` gates the signal.
#[derive(Clone)]
pub struct Event(Rc<EventInner>);

impl Event {
    pub fn new(name: impl Into<String>, write_level: Userlevel) -> Self {
        Event(Rc::new(EventInner {
            name: name.into(),
            parent: RefCell::new(None),
            write_level,
            handler: RefCell::new(None),
        }))
    }

    /// Registers the host callback run on `signal`. Until one is
    /// registered, signalling fails with `NotImplemented`.
    pub fn set_handler(&self, handler: impl Fn() -> Result<(), DecofError> + 'static) {
        *self.0.handler.borrow_mut() = Some(Box::new(handler));
    }

    pub fn as_dyn(&self) -> Rc<dyn ObjectNode> {
        self.0.clone() as Rc<dyn ObjectNode>
    }
}

impl ObjectNode for EventInner {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn parent(&self) -> Option<Rc<dyn ObjectNode>> {
        self.parent.borrow().as_ref().and_then(Weak::upgrade)
    }

    fn set_parent(&self, parent: Option<Weak<dyn ObjectNode>>) {
        *self.parent.borrow_mut() = parent;
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Event
    }

    fn read_level(&self) -> Userlevel {
        Userlevel::Forbidden
    }

    fn write_level(&self) -> Userlevel {
        self.write_level
    }

    fn signal(&self) -> Result<(), DecofError> {
        match self.handler.borrow().as_ref() {
            Some(handler) => handler(),
            None => NotImplementedSnafu.fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn signal_without_handler_is_not_implemented() {
        let ev = Event::new("reset", Userlevel::Normal);
        let err = ev.as_dyn().signal().unwrap_err();
        assert!(matches!(err, DecofError::NotImplemented));
    }

    #[test]
    fn signal_runs_registered_handler_exactly_once() {
        let ev = Event::new("reset", Userlevel::Normal);
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        ev.set_handler(move || {
            c.set(c.get() + 1);
            Ok(())
        });
        ev.as_dyn().signal().unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn event_is_never_readable() {
        let ev = Event::new("reset", Userlevel::Normal);
        assert!(!ev.as_dyn().readable());
    }
}
