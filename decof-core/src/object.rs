//! The uniform object trait every node/parameter/event implements (spec §3).
//!
//! Per the design note in spec §9, the object model itself stays a plain
//! virtual-dispatch trait; rendering (`browse`/`tree`/XML) is kept out of
//! it entirely and lives in the protocol crates, matched against
//! [`ObjectKind`] instead.

use std::any::Any;
use std::rc::{Rc, Weak};

use decof_value::{Value, ValueTag};

use crate::access::Userlevel;
use crate::error::{DecofError, InvalidParameterSnafu, NotSubscribedSnafu};
use crate::observer::ContextId;

/// The kind of an object, independent of its concrete Rust type. Used by
/// renderers (`browse`, `tree`, SCGI XML) to decide how to format an
/// object without downcasting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Node,
    Event,
    Param(ParamKind),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Bool,
    Int,
    Real,
    Str,
    Binary,
    BoolSeq,
    IntSeq,
    RealSeq,
    StrSeq,
    Tuple,
}

impl ParamKind {
    pub fn as_tag(self) -> ValueTag {
        match self {
            ParamKind::Bool => ValueTag::Bool,
            ParamKind::Int => ValueTag::Int,
            ParamKind::Real => ValueTag::Real,
            ParamKind::Str => ValueTag::Str,
            ParamKind::Binary => ValueTag::Binary,
            ParamKind::BoolSeq => ValueTag::BoolSeq,
            ParamKind::IntSeq => ValueTag::IntSeq,
            ParamKind::RealSeq => ValueTag::RealSeq,
            ParamKind::StrSeq => ValueTag::StrSeq,
            ParamKind::Tuple => ValueTag::Tuple,
        }
    }
}

/// Every node in the dictionary tree: plain nodes, events and parameters
/// of every kind all implement this through their respective `*Inner`
/// types, reached as `Rc<dyn ObjectNode>`.
///
/// Capability methods (`read`/`write`/`signal`/`observe`/`unobserve`) come
/// with defaults that reject with the appropriate [`DecofError`]; concrete
/// types override only the capabilities they actually have. Access control
/// is *not* checked here — it is checked once, centrally, by
/// [`crate::client_context::ClientContextBase`] before any of these are
/// called.
pub trait ObjectNode: Any {
    fn as_any(&self) -> &dyn Any;

    fn name(&self) -> &str;
    fn parent(&self) -> Option<Rc<dyn ObjectNode>>;
    fn set_parent(&self, parent: Option<Weak<dyn ObjectNode>>);

    fn kind(&self) -> ObjectKind;
    fn read_level(&self) -> Userlevel;
    fn write_level(&self) -> Userlevel;

    /// The colon-(or configured-separator-)joined path from the root,
    /// computed on demand by ascending parent links (spec I4).
    fn fqn(&self, sep: char) -> String {
        let mut parts = vec![self.name().to_string()];
        let mut cur = self.parent();
        while let Some(p) = cur {
            parts.push(p.name().to_string());
            cur = p.parent();
        }
        parts.reverse();
        parts.join(&sep.to_string())
    }

    fn readable(&self) -> bool {
        self.read_level() != Userlevel::Forbidden
    }

    fn writable(&self) -> bool {
        self.write_level() != Userlevel::Forbidden
    }

    fn observable(&self) -> bool {
        false
    }

    fn read(&self) -> Result<Value, DecofError> {
        InvalidParameterSnafu {
            reason: format!("{} is not readable", self.name()),
        }
        .fail()
    }

    fn write(&self, _value: Value) -> Result<(), DecofError> {
        InvalidParameterSnafu {
            reason: format!("{} is not writable", self.name()),
        }
        .fail()
    }

    fn signal(&self) -> Result<(), DecofError> {
        InvalidParameterSnafu {
            reason: format!("{} is not an event", self.name()),
        }
        .fail()
    }

    fn observe(&self, _context_id: ContextId, _notify: Box<dyn Fn(&Value)>) -> Result<Value, DecofError> {
        InvalidParameterSnafu {
            reason: format!("{} is not observable", self.name()),
        }
        .fail()
    }

    fn unobserve(&self, _context_id: ContextId) -> Result<(), DecofError> {
        NotSubscribedSnafu.fail()
    }

    /// `Some` only for [`crate::node::Node`].
    fn children(&self) -> Option<Vec<Rc<dyn ObjectNode>>> {
        None
    }
}
