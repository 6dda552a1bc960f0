//! Typed parameters (spec §3/§4.3): managed read-only, managed read-write,
//! external read-only, external read-write, and write-only.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use decof_value::{ConversionError, FromValue, IntoValue, Value, ValueTag};

use crate::access::Userlevel;
use crate::error::{DecofError, InvalidParameterSnafu};
use crate::object::{ObjectKind, ObjectNode, ParamKind};
use crate::observer::{ContextId, ObserverList, TimerHub, TimerKind};

/// A native type that can back a [`Parameter`]. Blanket-implemented for
/// every scalar/sequence type the value universe supports plus
/// [`TupleValue`]; `kind()` is the static [`ParamKind`] used for
/// rendering without touching a live value.
pub trait TypedValue: Clone + PartialEq + IntoValue + FromValue + 'static {
    fn kind() -> ParamKind;
}

macro_rules! impl_typed_value {
    ($t:ty, $kind:ident) => {
        impl TypedValue for $t {
            fn kind() -> ParamKind {
                ParamKind::$kind
            }
        }
    };
}

impl_typed_value!(bool, Bool);
impl_typed_value!(i64, Int);
impl_typed_value!(f64, Real);
impl_typed_value!(String, Str);
impl_typed_value!(Vec<u8>, Binary);
impl_typed_value!(Vec<bool>, BoolSeq);
impl_typed_value!(Vec<i64>, IntSeq);
impl_typed_value!(Vec<f64>, RealSeq);
impl_typed_value!(Vec<String>, StrSeq);

/// The native form of a tuple parameter. Tuples are heterogeneous, so
/// unlike every other [`TypedValue`] this one is just a thin wrapper
/// around [`Value::Tuple`] rather than a distinct Rust type.
#[derive(Clone, Debug, PartialEq)]
pub struct TupleValue(pub Vec<Value>);

impl IntoValue for TupleValue {
    fn into_value(self) -> Value {
        Value::Tuple(self.0)
    }
}

impl FromValue for TupleValue {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Tuple(elems) => Ok(TupleValue(elems.clone())),
            other => Err(ConversionError::wrong_type(ValueTag::Tuple, other)),
        }
    }
}

impl_typed_value!(TupleValue, Tuple);

enum ParamMode<T> {
    ManagedRo,
    ManagedRw {
        verify: Option<Box<dyn Fn(&T) -> Result<(), DecofError>>>,
    },
    ExternalRo {
        timers: Rc<TimerHub>,
        timer_kind: TimerKind,
        timer_slot: Cell<Option<u64>>,
        getter: Box<dyn Fn() -> T>,
    },
    ExternalRw {
        getter: Box<dyn Fn() -> T>,
        setter: Box<dyn Fn(T) -> Result<(), DecofError>>,
    },
    WriteOnly {
        setter: Box<dyn Fn(T)>,
    },
}

struct ParamInner<T: TypedValue> {
    name: String,
    parent: RefCell<Option<Weak<dyn ObjectNode>>>,
    read_level: Userlevel,
    write_level: Userlevel,
    /// Last known value. Authoritative for managed parameters; a polled
    /// snapshot (used for change detection) for external-readonly ones;
    /// unused for external-readwrite and write-only.
    value: RefCell<T>,
    observers: ObserverList,
    self_weak: RefCell<Weak<ParamInner<T>>>,
    mode: ParamMode<T>,
}

/// A handle to a typed parameter. Cheap to clone. The host application
/// uses [`Parameter::get`]/[`Parameter::set`] (or the external-callback
/// closures passed at construction) to drive the value; clients reach it
/// only through [`ObjectNode::read`]/[`ObjectNode::write`].
#[derive(Clone)]
pub struct Parameter<T: TypedValue>(Rc<ParamInner<T>>);

impl<T: TypedValue> Parameter<T> {
    fn finish(inner: ParamInner<T>) -> Self {
        let rc = Rc::new(inner);
        *rc.self_weak.borrow_mut() = Rc::downgrade(&rc);
        Parameter(rc)
    }

    pub fn managed_ro(name: impl Into<String>, read_level: Userlevel, initial: T) -> Self {
        Self::finish(ParamInner {
            name: name.into(),
            parent: RefCell::new(None),
            read_level,
            write_level: Userlevel::Forbidden,
            value: RefCell::new(initial),
            observers: ObserverList::new(),
            self_weak: RefCell::new(Weak::new()),
            mode: ParamMode::ManagedRo,
        })
    }

    pub fn managed_rw(
        name: impl Into<String>,
        read_level: Userlevel,
        write_level: Userlevel,
        initial: T,
        verify: Option<Box<dyn Fn(&T) -> Result<(), DecofError>>>,
    ) -> Self {
        Self::finish(ParamInner {
            name: name.into(),
            parent: RefCell::new(None),
            read_level,
            write_level,
            value: RefCell::new(initial),
            observers: ObserverList::new(),
            self_weak: RefCell::new(Weak::new()),
            mode: ParamMode::ManagedRw { verify },
        })
    }

    pub fn external_ro(
        name: impl Into<String>,
        read_level: Userlevel,
        timers: Rc<TimerHub>,
        timer_kind: TimerKind,
        getter: impl Fn() -> T + 'static,
        initial: T,
    ) -> Self {
        Self::finish(ParamInner {
            name: name.into(),
            parent: RefCell::new(None),
            read_level,
            write_level: Userlevel::Forbidden,
            value: RefCell::new(initial),
            observers: ObserverList::new(),
            self_weak: RefCell::new(Weak::new()),
            mode: ParamMode::ExternalRo {
                timers,
                timer_kind,
                timer_slot: Cell::new(None),
                getter: Box::new(getter),
            },
        })
    }

    pub fn external_rw(
        name: impl Into<String>,
        read_level: Userlevel,
        write_level: Userlevel,
        getter: impl Fn() -> T + 'static,
        setter: impl Fn(T) -> Result<(), DecofError> + 'static,
    ) -> Self {
        Self::finish(ParamInner {
            name: name.into(),
            parent: RefCell::new(None),
            read_level,
            write_level,
            // Never consulted for this mode; a default isn't available
            // generically, so the first real read seeds it.
            value: RefCell::new(getter()),
            observers: ObserverList::new(),
            self_weak: RefCell::new(Weak::new()),
            mode: ParamMode::ExternalRw {
                getter: Box::new(getter),
                setter: Box::new(setter),
            },
        })
    }

    pub fn write_only(
        name: impl Into<String>,
        write_level: Userlevel,
        initial: T,
        setter: impl Fn(T) + 'static,
    ) -> Self {
        Self::finish(ParamInner {
            name: name.into(),
            parent: RefCell::new(None),
            read_level: Userlevel::Forbidden,
            write_level,
            value: RefCell::new(initial),
            observers: ObserverList::new(),
            self_weak: RefCell::new(Weak::new()),
            mode: ParamMode::WriteOnly {
                setter: Box::new(setter),
            },
        })
    }

    pub fn as_dyn(&self) -> Rc<dyn ObjectNode> {
        self.0.clone() as Rc<dyn ObjectNode>
    }

    /// Host-side accessor for the current value. For `ManagedRo`/`ManagedRw`
    /// this is the authoritative stored value; for every other mode it is
    /// the last polled/observed snapshot and may be stale.
    pub fn get(&self) -> T {
        self.0.value.borrow().clone()
    }

    /// Host-side mutation of a managed parameter, notifying observers on
    /// change exactly as a client-originated `set` would.
    pub fn set(&self, new_value: T) {
        if matches!(self.0.mode, ParamMode::ManagedRo | ParamMode::ManagedRw { .. }) {
            let mut current = self.0.value.borrow_mut();
            if *current == new_value {
                return;
            }
            *current = new_value.clone();
            drop(current);
            self.0.observers.notify_all(&new_value.into_value());
        }
    }
}

impl<T: TypedValue> ParamInner<T> {
    fn poll_tick(&self) {
        if let ParamMode::ExternalRo { getter, .. } = &self.mode {
            let new_value = getter();
            let mut snapshot = self.value.borrow_mut();
            if *snapshot != new_value {
                log::trace!("{} changed on poll, notifying observers", self.name);
                *snapshot = new_value.clone();
                drop(snapshot);
                self.observers.notify_all(&new_value.into_value());
            }
        }
    }
}

impl<T: TypedValue> ObjectNode for ParamInner<T> {
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
        ObjectKind::Param(T::kind())
    }

    fn read_level(&self) -> Userlevel {
        self.read_level
    }

    fn write_level(&self) -> Userlevel {
        self.write_level
    }

    fn observable(&self) -> bool {
        !matches!(self.mode, ParamMode::WriteOnly { .. })
    }

    fn read(&self) -> Result<Value, DecofError> {
        match &self.mode {
            ParamMode::WriteOnly { .. } => InvalidParameterSnafu {
                reason: format!("{} is write-only", self.name),
            }
            .fail(),
            ParamMode::ExternalRo { getter, .. } => {
                let value = getter();
                *self.value.borrow_mut() = value.clone();
                Ok(value.into_value())
            }
            ParamMode::ExternalRw { getter, .. } => Ok(getter().into_value()),
            ParamMode::ManagedRo | ParamMode::ManagedRw { .. } => {
                Ok(self.value.borrow().clone().into_value())
            }
        }
    }

    fn write(&self, value: Value) -> Result<(), DecofError> {
        let typed = T::from_value(&value)?;
        match &self.mode {
            ParamMode::ManagedRo => InvalidParameterSnafu {
                reason: format!("{} is read-only", self.name),
            }
            .fail(),
            ParamMode::ExternalRo { .. } => InvalidParameterSnafu {
                reason: format!("{} is read-only", self.name),
            }
            .fail(),
            ParamMode::ManagedRw { verify } => {
                let mut current = self.value.borrow_mut();
                if *current == typed {
                    return Ok(());
                }
                if let Some(verify) = verify {
                    verify(&typed)?;
                }
                *current = typed.clone();
                drop(current);
                self.observers.notify_all(&typed.into_value());
                Ok(())
            }
            ParamMode::ExternalRw { setter, .. } => {
                setter(typed.clone())?;
                self.observers.notify_all(&typed.into_value());
                Ok(())
            }
            ParamMode::WriteOnly { setter } => {
                setter(typed);
                Ok(())
            }
        }
    }

    fn observe(&self, context_id: ContextId, notify: Box<dyn Fn(&Value)>) -> Result<Value, DecofError> {
        if matches!(self.mode, ParamMode::WriteOnly { .. }) {
            return InvalidParameterSnafu {
                reason: format!("{} is write-only", self.name),
            }
            .fail();
        }
        let was_empty = self.observers.is_empty();
        let current = self.read()?;
        self.observers.add(context_id, notify);
        if was_empty {
            if let ParamMode::ExternalRo {
                timers,
                timer_kind,
                timer_slot,
                ..
            } = &self.mode
            {
                let weak_self = self.self_weak.borrow().clone();
                let tick: Rc<dyn Fn()> = Rc::new(move || {
                    if let Some(inner) = weak_self.upgrade() {
                        inner.poll_tick();
                    }
                });
                timer_slot.set(Some(timers.connect(*timer_kind, tick)));
            }
        }
        Ok(current)
    }

    fn unobserve(&self, context_id: ContextId) -> Result<(), DecofError> {
        if !self.observers.remove(context_id) {
            return crate::error::NotSubscribedSnafu.fail();
        }
        if self.observers.is_empty() {
            if let ParamMode::ExternalRo {
                timers,
                timer_kind,
                timer_slot,
                ..
            } = &self.mode
            {
                if let Some(id) = timer_slot.take() {
                    timers.disconnect(*timer_kind, id);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell as StdCell;

    #[test]
    fn managed_rw_no_op_write_does_not_notify() {
        let p = Parameter::managed_rw("x", Userlevel::Normal, Userlevel::Normal, 1i64, None);
        let calls = Rc::new(StdCell::new(0));
        let c = calls.clone();
        p.as_dyn()
            .observe(1, Box::new(move |_| c.set(c.get() + 1)))
            .unwrap();
        p.as_dyn().write(Value::Int(1)).unwrap();
        assert_eq!(calls.get(), 0);
        p.as_dyn().write(Value::Int(2)).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn managed_ro_rejects_write() {
        let p = Parameter::managed_ro("x", Userlevel::Normal, 1i64);
        let err = p.as_dyn().write(Value::Int(2)).unwrap_err();
        assert!(matches!(err, DecofError::InvalidParameter { .. }));
    }

    #[test]
    fn verify_hook_can_reject_value() {
        let p = Parameter::managed_rw(
            "x",
            Userlevel::Normal,
            Userlevel::Normal,
            1i64,
            Some(Box::new(|v: &i64| {
                if *v < 0 {
                    crate::error::InvalidValueSnafu {
                        reason: "must be non-negative".to_string(),
                    }
                    .fail()
                } else {
                    Ok(())
                }
            })),
        );
        assert!(p.as_dyn().write(Value::Int(-1)).is_err());
        assert_eq!(p.get(), 1);
        assert!(p.as_dyn().write(Value::Int(5)).is_ok());
        assert_eq!(p.get(), 5);
    }

    #[test]
    fn write_only_is_never_readable_or_observable() {
        let received = Rc::new(RefCell::new(None));
        let r = received.clone();
        let p = Parameter::write_only("x", Userlevel::Normal, 0i64, move |v| {
            *r.borrow_mut() = Some(v);
        });
        assert!(!p.as_dyn().observable());
        assert!(p.as_dyn().read().is_err());
        p.as_dyn().write(Value::Int(7)).unwrap();
        assert_eq!(*received.borrow(), Some(7));
    }

    #[test]
    fn external_ro_stops_polling_after_last_unobserve() {
        let timers = TimerHub::new();
        let backing = Rc::new(StdCell::new(1i64));
        let b = backing.clone();
        let p = Parameter::external_ro(
            "x",
            Userlevel::Normal,
            timers.clone(),
            TimerKind::Fast,
            move || b.get(),
            1,
        );
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        p.as_dyn()
            .observe(1, Box::new(move |v| s.borrow_mut().push(v.clone())))
            .unwrap();
        backing.set(2);
        timers.tick(TimerKind::Fast);
        assert_eq!(seen.borrow().last(), Some(&Value::Int(2)));

        p.as_dyn().unobserve(1).unwrap();
        backing.set(3);
        timers.tick(TimerKind::Fast);
        assert_eq!(seen.borrow().len(), 1, "no tick delivered after unobserve");
    }

    #[test]
    fn tuple_parameter_round_trips() {
        let p = Parameter::managed_rw(
            "t",
            Userlevel::Normal,
            Userlevel::Normal,
            TupleValue(vec![Value::Bool(true), Value::Int(3)]),
            None,
        );
        let read = p.as_dyn().read().unwrap();
        assert_eq!(
            read,
            Value::Tuple(vec![Value::Bool(true), Value::Int(3)])
        );
    }
}
