//! The uniform client-context API every protocol front-end implements on
//! top of (spec §2/§5): `get`, `set`, `signal`, `observe`, `unobserve`,
//! `browse`, `tick`, and userlevel change. Access control is enforced
//! once here, centrally, before any [`ObjectNode`] capability method runs
//! (spec "access denial precedes type checks", §7).

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use decof_value::Value;

use crate::access::Userlevel;
use crate::dictionary::ObjectDictionary;
use crate::error::{AccessDeniedSnafu, DecofError};
use crate::object::ObjectNode;
use crate::observer::ContextId;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_context_id() -> ContextId {
    NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Fields every concrete client context (CLI request/response, CLI
/// pub/sub, SCGI) embeds and delegates to. Gives each context a stable
/// identity, the userlevel it is currently operating at, a weak
/// self-reference (the `enable_shared_from_this` pattern, needed because
/// the current-context guard and observer teardown both require an
/// `Rc<dyn ClientContextBase>` reachable from `&self`), and the set of
/// URIs it currently observes, used to unwind cleanly on disconnect (P5).
pub struct ContextCommon {
    context_id: ContextId,
    dictionary: Rc<ObjectDictionary>,
    userlevel: Cell<Userlevel>,
    self_weak: RefCell<Option<Weak<dyn ClientContextBase>>>,
    observations: RefCell<HashSet<String>>,
}

impl ContextCommon {
    pub fn new(dictionary: Rc<ObjectDictionary>, initial_userlevel: Userlevel) -> Self {
        ContextCommon {
            context_id: next_context_id(),
            dictionary,
            userlevel: Cell::new(initial_userlevel),
            self_weak: RefCell::new(None),
            observations: RefCell::new(HashSet::new()),
        }
    }

    /// Must be called exactly once, right after wrapping the concrete
    /// context in an `Rc`, before the context is used.
    pub fn install_self_rc(&self, self_rc: &Rc<dyn ClientContextBase>) {
        *self.self_weak.borrow_mut() = Some(Rc::downgrade(self_rc));
    }

    fn record_observation(&self, uri: &str) {
        self.observations.borrow_mut().insert(uri.to_string());
    }

    fn forget_observation(&self, uri: &str) {
        self.observations.borrow_mut().remove(uri);
    }

    fn observed_uris(&self) -> Vec<String> {
        self.observations.borrow().iter().cloned().collect()
    }
}

pub trait ClientContextBase {
    fn common(&self) -> &ContextCommon;

    fn context_id(&self) -> ContextId {
        self.common().context_id
    }

    fn dictionary(&self) -> &Rc<ObjectDictionary> {
        &self.common().dictionary
    }

    fn userlevel(&self) -> Userlevel {
        self.common().userlevel.get()
    }

    fn set_userlevel(&self, level: Userlevel) {
        self.common().userlevel.set(level);
    }

    fn self_rc(&self) -> Rc<dyn ClientContextBase> {
        self.common()
            .self_weak
            .borrow()
            .as_ref()
            .and_then(Weak::upgrade)
            .expect("ContextCommon::install_self_rc was not called")
    }

    fn get(&self, uri: &str) -> Result<Value, DecofError> {
        let _guard = self.dictionary().acquire_current_context(self.self_rc());
        let object = self.dictionary().resolve(uri)?;
        if !self.userlevel().can_read(object.read_level()) {
            log::warn!("context {} denied read of {uri}", self.context_id());
            return AccessDeniedSnafu.fail();
        }
        object.read()
    }

    fn set(&self, uri: &str, value: Value) -> Result<(), DecofError> {
        let _guard = self.dictionary().acquire_current_context(self.self_rc());
        let object = self.dictionary().resolve(uri)?;
        if !self.userlevel().can_write(object.write_level()) {
            log::warn!("context {} denied write of {uri}", self.context_id());
            return AccessDeniedSnafu.fail();
        }
        object.write(value)
    }

    fn signal(&self, uri: &str) -> Result<(), DecofError> {
        let _guard = self.dictionary().acquire_current_context(self.self_rc());
        let object = self.dictionary().resolve(uri)?;
        if !self.userlevel().can_write(object.write_level()) {
            return AccessDeniedSnafu.fail();
        }
        object.signal()
    }

    fn observe(&self, uri: &str, notify: Box<dyn Fn(&Value)>) -> Result<Value, DecofError> {
        let _guard = self.dictionary().acquire_current_context(self.self_rc());
        let object = self.dictionary().resolve(uri)?;
        if !self.userlevel().can_read(object.read_level()) {
            return AccessDeniedSnafu.fail();
        }
        let initial = object.observe(self.context_id(), notify)?;
        self.common().record_observation(uri);
        Ok(initial)
    }

    fn unobserve(&self, uri: &str) -> Result<(), DecofError> {
        let object = self.dictionary().resolve(uri)?;
        object.unobserve(self.context_id())?;
        self.common().forget_observation(uri);
        Ok(())
    }

    /// Resolves `uri` without an access check (the original CLI and SCGI
    /// browsers list whatever exists; filtering by access level is left
    /// to the read/write path). The protocol crate walks the returned
    /// object tree to render `browse`/`tree`/XML.
    fn browse(&self, uri: &str) -> Result<Rc<dyn ObjectNode>, DecofError> {
        self.dictionary().resolve(uri)
    }

    /// Forwards a host-driven tick. Most contexts have nothing to do here
    /// (the CLI and SCGI contexts are fully I/O-driven); it exists as a
    /// hook point for a protocol-specific idle action.
    fn tick(&self) {}

    fn change_userlevel(&self, requested: Userlevel, password: &str) -> Result<(), DecofError> {
        if !self.dictionary().authenticate(self, requested, password) {
            return AccessDeniedSnafu.fail();
        }
        self.set_userlevel(requested);
        Ok(())
    }

    /// Unsubscribes from every URI this context still observes. Call
    /// once, from the protocol layer's connection-teardown path (P5: no
    /// observer registration outlives its owning connection).
    fn teardown(&self) {
        for uri in self.common().observed_uris() {
            let _ = self.unobserve(&uri);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::Parameter;

    struct TestContext {
        common: ContextCommon,
    }

    impl TestContext {
        fn new(dictionary: Rc<ObjectDictionary>, level: Userlevel) -> Rc<Self> {
            let rc = Rc::new(TestContext {
                common: ContextCommon::new(dictionary, level),
            });
            let dyn_rc: Rc<dyn ClientContextBase> = rc.clone();
            rc.common.install_self_rc(&dyn_rc);
            rc
        }
    }

    impl ClientContextBase for TestContext {
        fn common(&self) -> &ContextCommon {
            &self.common
        }
    }

    fn fixture() -> (Rc<ObjectDictionary>, Parameter<i64>) {
        let dict = ObjectDictionary::new("root");
        let p = Parameter::managed_rw("x", Userlevel::Normal, Userlevel::Normal, 0i64, None);
        dict.root().add_child(p.as_dyn()).unwrap();
        (dict, p)
    }

    #[test]
    fn access_denied_precedes_read() {
        let (dict, p) = fixture();
        // Raise the object's read level above what a Normal client has.
        let restricted = Parameter::managed_ro("y", Userlevel::Service, 1i64);
        dict.root().add_child(restricted.as_dyn()).unwrap();
        let _ = p;

        let ctx = TestContext::new(dict.clone(), Userlevel::Normal);
        let err = ctx.get("root:y").unwrap_err();
        assert!(matches!(err, DecofError::AccessDenied));
    }

    #[test]
    fn readonly_client_can_read_but_not_write() {
        let (dict, _p) = fixture();
        let ctx = TestContext::new(dict, Userlevel::Readonly);
        assert!(ctx.get("root:x").is_ok());
        assert!(matches!(
            ctx.set("root:x", Value::Int(5)).unwrap_err(),
            DecofError::AccessDenied
        ));
    }

    #[test]
    fn teardown_unsubscribes_every_observed_uri() {
        let (dict, p) = fixture();
        let ctx = TestContext::new(dict, Userlevel::Normal);
        ctx.observe("root:x", Box::new(|_| {})).unwrap();
        assert!(p.as_dyn().observable());
        ctx.teardown();
        // After teardown a fresh write should not panic trying to notify
        // a dangling closure; more importantly, unobserve again now fails.
        assert!(p.as_dyn().unobserve(ctx.context_id()).is_err());
    }

    #[test]
    fn change_userlevel_rejected_by_default_authenticator() {
        let (dict, _p) = fixture();
        let ctx = TestContext::new(dict, Userlevel::Normal);
        assert!(ctx.change_userlevel(Userlevel::Internal, "whatever").is_err());
    }
}
