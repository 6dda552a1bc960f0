//! Plain container nodes (spec §3 "Node").

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use decof_value::Value;
use indexmap::IndexMap;

use crate::access::Userlevel;
use crate::error::{DecofError, InvalidParameterSnafu};
use crate::object::{ObjectKind, ObjectNode};

pub(crate) struct NodeInner {
    name: String,
    parent: RefCell<Option<Weak<dyn ObjectNode>>>,
    read_level: Userlevel,
    children: RefCell<IndexMap<String, Rc<dyn ObjectNode>>>,
}

impl NodeInner {
    pub(crate) fn get_child(&self, name: &str) -> Option<Rc<dyn ObjectNode>> {
        self.children.borrow().get(name).cloned()
    }
}

/// A handle to a dictionary node. Cheap to clone (an `Rc` underneath);
/// children are owned by an insertion-ordered map so that `browse`/`tree`
/// walks and the implicit read value (the sequence of child names) list
/// them in declaration order.
#[derive(Clone)]
pub struct Node(Rc<NodeInner>);

impl Node {
    /// Nodes are readable by anyone by default (`Internal`, the most
    /// permissive level); use [`Node::with_read_level`] to restrict.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_read_level(name, Userlevel::Internal)
    }

    pub fn with_read_level(name: impl Into<String>, read_level: Userlevel) -> Self {
        Node(Rc::new(NodeInner {
            name: name.into(),
            parent: RefCell::new(None),
            read_level,
            children: RefCell::new(IndexMap::new()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn as_dyn(&self) -> Rc<dyn ObjectNode> {
        self.0.clone() as Rc<dyn ObjectNode>
    }

    pub fn get_child(&self, name: &str) -> Option<Rc<dyn ObjectNode>> {
        self.0.children.borrow().get(name).cloned()
    }

    pub fn child_names(&self) -> Vec<String> {
        self.0.children.borrow().keys().cloned().collect()
    }

    pub fn children(&self) -> Vec<Rc<dyn ObjectNode>> {
        self.0.children.borrow().values().cloned().collect()
    }

    /// Attach `child` under this node, reparenting it if it was previously
    /// attached elsewhere (spec §4.2 "re-parenting is allowed").
    pub fn add_child(&self, child: Rc<dyn ObjectNode>) -> Result<(), DecofError> {
        if child.name().is_empty() {
            return InvalidParameterSnafu {
                reason: "object name must not be empty".to_string(),
            }
            .fail();
        }
        if self.0.children.borrow().contains_key(child.name()) {
            return InvalidParameterSnafu {
                reason: format!("duplicate child name {:?}", child.name()),
            }
            .fail();
        }
        if let Some(old_parent) = child.parent() {
            if let Some(old_node) = old_parent.as_any().downcast_ref::<NodeInner>() {
                old_node.children.borrow_mut().shift_remove(child.name());
            }
        }
        child.set_parent(Some(Rc::downgrade(&self.0) as Weak<dyn ObjectNode>));
        self.0
            .children
            .borrow_mut()
            .insert(child.name().to_string(), child);
        Ok(())
    }

    pub fn remove_child(&self, name: &str) -> Option<Rc<dyn ObjectNode>> {
        let removed = self.0.children.borrow_mut().shift_remove(name);
        if let Some(child) = &removed {
            child.set_parent(None);
        }
        removed
    }
}

impl ObjectNode for NodeInner {
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
        ObjectKind::Node
    }

    fn read_level(&self) -> Userlevel {
        self.read_level
    }

    fn write_level(&self) -> Userlevel {
        Userlevel::Forbidden
    }

    fn read(&self) -> Result<Value, DecofError> {
        Ok(Value::StrSeq(
            self.children.borrow().keys().cloned().collect(),
        ))
    }

    fn children(&self) -> Option<Vec<Rc<dyn ObjectNode>>> {
        Some(self.children.borrow().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    #[test]
    fn node_read_lists_children_in_insertion_order() {
        let root = Node::new("root");
        root.add_child(Event::new("b", Userlevel::Normal).as_dyn()).unwrap();
        root.add_child(Event::new("a", Userlevel::Normal).as_dyn()).unwrap();
        let value = root.as_dyn().read().unwrap();
        assert_eq!(value, Value::StrSeq(vec!["b".to_string(), "a".to_string()]));
    }

    #[test]
    fn duplicate_child_name_rejected() {
        let root = Node::new("root");
        root.add_child(Event::new("x", Userlevel::Normal).as_dyn()).unwrap();
        let err = root
            .add_child(Event::new("x", Userlevel::Normal).as_dyn())
            .unwrap_err();
        assert!(matches!(err, DecofError::InvalidParameter { .. }));
    }

    #[test]
    fn reparenting_moves_child_between_nodes() {
        let a = Node::new("a");
        let b = Node::new("b");
        let ev = Event::new("e", Userlevel::Normal).as_dyn();
        a.add_child(ev.clone()).unwrap();
        assert_eq!(a.child_names(), vec!["e".to_string()]);
        b.add_child(ev.clone()).unwrap();
        assert!(a.child_names().is_empty());
        assert_eq!(b.child_names(), vec!["e".to_string()]);
        assert_eq!(ev.parent().unwrap().name(), "b");
    }
}
