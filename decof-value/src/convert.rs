//! Dynamic/static conversion layer (spec invariant I2).
//!
//! `IntoValue` is total: every supported native type has exactly one
//! lossless `Value` representation. `FromValue` is fallible: narrowing
//! conversions are checked for exact representability rather than silently
//! truncated.

use crate::{ConversionError, InvalidValueSnafu, Value, ValueTag};

/// Convert a native type into its `Value` representation. Always succeeds:
/// every native type this is implemented for has a lossless `Value` form.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

/// Recover a native type from a `Value`. Fails with [`ConversionError`] if
/// the value's tag is wrong, or (for numeric narrowing) if the value can't
/// be represented in the target type without loss.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, ConversionError>;
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(ConversionError::wrong_type(ValueTag::Bool, other)),
        }
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Str(self)
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Str(s) => Ok(s.clone()),
            other => Err(ConversionError::wrong_type(ValueTag::Str, other)),
        }
    }
}

impl IntoValue for Vec<u8> {
    fn into_value(self) -> Value {
        Value::Binary(self)
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Binary(b) => Ok(b.clone()),
            other => Err(ConversionError::wrong_type(ValueTag::Binary, other)),
        }
    }
}

/// Implements lossless `IntoValue` and range-checked `FromValue` for an
/// integer type that widens into `i64` without loss (i.e. everything up to
/// 64 bits wide, signed or unsigned).
macro_rules! impl_integer {
    ($t:ty) => {
        impl IntoValue for $t {
            fn into_value(self) -> Value {
                Value::Int(self as i64)
            }
        }

        impl FromValue for $t {
            fn from_value(value: &Value) -> Result<Self, ConversionError> {
                match value {
                    Value::Int(i) => <$t>::try_from(*i).map_err(|_| {
                        InvalidValueSnafu {
                            reason: format!(
                                "{} does not fit in {}",
                                i,
                                std::any::type_name::<$t>()
                            ),
                        }
                        .build()
                    }),
                    Value::Real(r) => real_to_exact_integer(*r),
                    other => Err(ConversionError::wrong_type(ValueTag::Int, other)),
                }
            }
        }
    };
}

impl_integer!(i8);
impl_integer!(i16);
impl_integer!(i32);
impl_integer!(i64);
impl_integer!(u8);
impl_integer!(u16);
impl_integer!(u32);
impl_integer!(u64);

/// Converts a `Value::Real` to an exactly-representable integer, or fails
/// with `InvalidValue` if the real is not integral or is out of range for
/// the target type. Used by the integer `FromValue` impls so that a real
/// read against an integer parameter still succeeds when it carries no
/// fractional part (e.g. `2.0` converts to `2`), per I2.
fn real_to_exact_integer<T>(r: f64) -> Result<T, ConversionError>
where
    T: TryFrom<i64>,
{
    if r.fract() != 0.0 || !r.is_finite() {
        return InvalidValueSnafu {
            reason: format!("{r} is not an integral value"),
        }
        .fail();
    }
    if r < i64::MIN as f64 || r > i64::MAX as f64 {
        return InvalidValueSnafu {
            reason: format!("{r} is out of i64 range"),
        }
        .fail();
    }
    T::try_from(r as i64).map_err(|_| {
        InvalidValueSnafu {
            reason: format!("{r} does not fit in the target integer type"),
        }
        .build()
    })
}

/// The largest magnitude integer exactly representable in an `f64`
/// (53 significant bits: 52 explicit mantissa bits plus the implicit
/// leading one).
const MAX_EXACT_F64_INT: i64 = 1 << 53;

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Real(self)
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Real(r) => Ok(*r),
            Value::Int(i) => {
                if i.unsigned_abs() > MAX_EXACT_F64_INT as u64 {
                    InvalidValueSnafu {
                        reason: format!("{i} is not exactly representable as a real"),
                    }
                    .fail()
                } else {
                    Ok(*i as f64)
                }
            }
            other => Err(ConversionError::wrong_type(ValueTag::Real, other)),
        }
    }
}

impl IntoValue for f32 {
    fn into_value(self) -> Value {
        Value::Real(self as f64)
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        let r = f64::from_value(value)?;
        let narrowed = r as f32;
        if narrowed as f64 != r {
            return InvalidValueSnafu {
                reason: format!("{r} is not exactly representable as a 32-bit real"),
            }
            .fail();
        }
        Ok(narrowed)
    }
}

macro_rules! impl_sequence {
    ($t:ty, $variant:ident, $tag:ident) => {
        impl IntoValue for Vec<$t> {
            fn into_value(self) -> Value {
                Value::$variant(self)
            }
        }

        impl FromValue for Vec<$t> {
            fn from_value(value: &Value) -> Result<Self, ConversionError> {
                match value {
                    Value::$variant(v) => Ok(v.clone()),
                    other => Err(ConversionError::wrong_type(ValueTag::$tag, other)),
                }
            }
        }
    };
}

impl_sequence!(bool, BoolSeq, BoolSeq);
impl_sequence!(i64, IntSeq, IntSeq);
impl_sequence!(f64, RealSeq, RealSeq);
impl_sequence!(String, StrSeq, StrSeq);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_widens_into_real_exactly() {
        assert_eq!(f64::from_value(&Value::Int(42)).unwrap(), 42.0);
    }

    #[test]
    fn large_integer_does_not_fit_in_f64_exactly() {
        let big = (1i64 << 53) + 1;
        assert!(f64::from_value(&Value::Int(big)).is_err());
    }

    #[test]
    fn real_with_fraction_rejected_as_integer() {
        assert!(i32::from_value(&Value::Real(1.5)).is_err());
    }

    #[test]
    fn integral_real_accepted_as_integer() {
        assert_eq!(i32::from_value(&Value::Real(4.0)).unwrap(), 4);
    }

    #[test]
    fn narrowing_out_of_range_integer_rejected() {
        assert!(u8::from_value(&Value::Int(256)).is_err());
        assert!(i8::from_value(&Value::Int(-200)).is_err());
    }

    #[test]
    fn wrong_category_conversion_rejected() {
        let err = String::from_value(&Value::Int(1)).unwrap_err();
        assert!(matches!(err, ConversionError::WrongType { .. }));
    }

    #[test]
    fn round_trip_sequence() {
        let v = vec![1i64, 2, 3].into_value();
        assert_eq!(Vec::<i64>::from_value(&v).unwrap(), vec![1, 2, 3]);
    }
}
