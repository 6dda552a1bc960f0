//! The object dictionary: root node, URI resolution, current-context
//! tracking and the shared timer hub (spec §3/§4.1).

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::access::Userlevel;
use crate::client_context::ClientContextBase;
use crate::error::{DecofError, InvalidParameterSnafu};
use crate::node::{Node, NodeInner};
use crate::object::ObjectNode;
use crate::observer::{TimerHub, TimerKind};

/// Authenticates a `change-ul` request: given the requesting context, the
/// userlevel it's asking for, and the password it supplied, returns
/// whether the change is allowed. Defaults to a closure that rejects
/// everything, forcing the host application to opt in explicitly (the
/// same shape as `zencan-node`'s callback-backed objects requiring
/// explicit host registration before they're functional).
pub type Authenticator = Box<dyn Fn(&dyn ClientContextBase, Userlevel, &str) -> bool>;

/// RAII guard returned by [`ObjectDictionary::acquire_current_context`].
/// Clears the current-context slot unconditionally on drop, including on
/// an error exit out of whatever installed it (spec §4.1 "guaranteed
/// release").
pub struct CurrentContextGuard<'a> {
    dictionary: &'a ObjectDictionary,
}

impl Drop for CurrentContextGuard<'_> {
    fn drop(&mut self) {
        *self.dictionary.current_context.borrow_mut() = None;
    }
}

pub struct ObjectDictionary {
    root: Node,
    separator: char,
    timers: Rc<TimerHub>,
    current_context: RefCell<Option<Rc<dyn ClientContextBase>>>,
    authenticator: RefCell<Authenticator>,
    contexts: RefCell<Vec<Weak<dyn ClientContextBase>>>,
}

impl ObjectDictionary {
    pub fn new(root_name: impl Into<String>) -> Rc<Self> {
        Self::with_separator(root_name, ':')
    }

    pub fn with_separator(root_name: impl Into<String>, separator: char) -> Rc<Self> {
        Rc::new(ObjectDictionary {
            root: Node::new(root_name),
            separator,
            timers: TimerHub::new(),
            current_context: RefCell::new(None),
            authenticator: RefCell::new(Box::new(|_, _, _| false)),
            contexts: RefCell::new(Vec::new()),
        })
    }

    /// Registers a newly created protocol context (spec §3 "owns the list
    /// of active contexts"). Protocol acceptors call this once, right
    /// after wrapping the context in an `Rc` and installing its self
    /// reference.
    pub fn register_context(&self, ctx: &Rc<dyn ClientContextBase>) {
        self.contexts.borrow_mut().push(Rc::downgrade(ctx));
    }

    /// Removes `ctx` from the active-context list (spec §4.7 "removed
    /// from the dictionary when the underlying transport closes"). Also
    /// prunes any other entries whose context has already been dropped.
    pub fn remove_context(&self, ctx: &Rc<dyn ClientContextBase>) {
        self.contexts.borrow_mut().retain(|weak| match weak.upgrade() {
            Some(live) => !Rc::ptr_eq(&live, ctx),
            None => false,
        });
    }

    pub fn contexts(&self) -> Vec<Rc<dyn ClientContextBase>> {
        self.contexts.borrow().iter().filter_map(Weak::upgrade).collect()
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    pub fn timers(&self) -> Rc<TimerHub> {
        self.timers.clone()
    }

    /// Forwards a tick from whatever schedule the host application runs
    /// (see [`TimerHub::tick`]).
    pub fn tick(&self, kind: TimerKind) {
        self.timers.tick(kind);
    }

    pub fn set_authenticator(&self, authenticator: Authenticator) {
        *self.authenticator.borrow_mut() = authenticator;
    }

    pub fn authenticate(&self, ctx: &dyn ClientContextBase, requested: Userlevel, password: &str) -> bool {
        (self.authenticator.borrow())(ctx, requested, password)
    }

    /// Resolves a `<separator>`-joined URI starting with the root name
    /// (e.g. `root:a:b`) to the object it names.
    pub fn resolve(&self, uri: &str) -> Result<Rc<dyn ObjectNode>, DecofError> {
        let uri = uri.trim();
        let uri = uri.strip_prefix(self.separator).unwrap_or(uri);
        let mut segments = uri.split(self.separator);
        let first = segments.next().filter(|s| !s.is_empty()).ok_or_else(|| {
            DecofError::InvalidParameter {
                reason: "empty uri".to_string(),
            }
        })?;
        if first != self.root.name() {
            log::debug!("resolve: {uri:?} does not start with root name {:?}", self.root.name());
            return InvalidParameterSnafu {
                reason: format!("uri does not start with root name {:?}", self.root.name()),
            }
            .fail();
        }
        let mut current: Rc<dyn ObjectNode> = self.root.as_dyn();
        for segment in segments {
            if segment.is_empty() {
                continue;
            }
            let node = current
                .as_any()
                .downcast_ref::<NodeInner>()
                .ok_or_else(|| DecofError::InvalidParameter {
                    reason: format!("{:?} has no children", current.name()),
                })?;
            current = node.get_child(segment).ok_or_else(|| DecofError::InvalidParameter {
                reason: format!("no such object {segment:?}"),
            })?;
        }
        Ok(current)
    }

    /// Installs `ctx` as the dictionary-wide current context for the
    /// duration of the returned guard (spec §4.1). Nested installation is
    /// a programming error, not a runtime condition: calling this while a
    /// guard from an earlier call is still alive indicates re-entrant
    /// dispatch, which the single-strand executor model is supposed to
    /// rule out.
    pub fn acquire_current_context(&self, ctx: Rc<dyn ClientContextBase>) -> CurrentContextGuard<'_> {
        let mut slot = self.current_context.borrow_mut();
        debug_assert!(slot.is_none(), "nested current-context installation");
        *slot = Some(ctx);
        drop(slot);
        CurrentContextGuard { dictionary: self }
    }

    pub fn current_context(&self) -> Option<Rc<dyn ClientContextBase>> {
        self.current_context.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::Parameter;

    #[test]
    fn resolve_walks_nested_nodes() {
        let dict = ObjectDictionary::new("root");
        let sub = Node::new("sub");
        dict.root().add_child(sub.as_dyn()).unwrap();
        let p = Parameter::managed_ro("leaf", Userlevel::Normal, 42i64);
        sub.add_child(p.as_dyn()).unwrap();

        let found = dict.resolve("root:sub:leaf").unwrap();
        assert_eq!(found.name(), "leaf");
    }

    #[test]
    fn resolve_rejects_wrong_root_name() {
        let dict = ObjectDictionary::new("root");
        assert!(dict.resolve("other:leaf").is_err());
    }

    #[test]
    fn resolve_rejects_unknown_child() {
        let dict = ObjectDictionary::new("root");
        assert!(dict.resolve("root:missing").is_err());
    }

    #[test]
    fn current_context_guard_clears_on_drop() {
        let dict = ObjectDictionary::new("root");
        assert!(dict.current_context().is_none());
    }
}
