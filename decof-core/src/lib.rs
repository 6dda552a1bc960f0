//! The object model, dictionary and client-context framework shared by
//! every DeCoF protocol front-end.
//!
//! A dictionary is a tree of [`object::ObjectNode`]s rooted at
//! [`dictionary::ObjectDictionary::root`]: [`node::Node`]s are plain
//! containers, [`parameter::Parameter`] holds a typed, observable value in
//! one of five access modes, and [`event::Event`] is a fire-and-forget
//! signal. Every externally originated operation goes through a
//! [`client_context::ClientContextBase`] implementation, which enforces
//! access control once, centrally, before dispatching to the object.

pub mod access;
pub mod client_context;
pub mod dictionary;
pub mod error;
pub mod event;
pub mod node;
pub mod object;
pub mod observer;
pub mod parameter;

pub use access::Userlevel;
pub use client_context::{ClientContextBase, ContextCommon};
pub use dictionary::{Authenticator, ObjectDictionary};
pub use error::DecofError;
pub use event::Event;
pub use node::Node;
pub use object::{ObjectKind, ObjectNode, ParamKind};
pub use observer::{ContextId, TimerHub, TimerKind};
pub use parameter::{Parameter, TupleValue, TypedValue};

pub use decof_value::{ConversionError, FromValue, IntoValue, Value, ValueTag};
