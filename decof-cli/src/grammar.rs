//! The CLI textual value grammar (spec §4.10).
//!
//! Scalars: `#t`/`#f` booleans, signed-64-bit integers, decimal reals
//! (optional exponent), double-quoted strings with backslash/hex escapes,
//! and `&`-prefixed base64 binaries. `[...]` is a homogeneous sequence of
//! any one scalar type the value universe has a sequence variant for
//! (boolean/integer/real/string — [`decof_value::Value`] has no binary
//! sequence, so `[&...]` is rejected rather than silently accepted). `{...}`
//! is a heterogeneous tuple of scalars.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use decof_core::error::{DecofError, ParseSnafu};
use decof_value::Value;
use snafu::ensure;

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str) -> Self {
        Cursor { bytes: s.as_bytes(), pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, b: u8) -> Result<(), DecofError> {
        if self.bump() == Some(b) {
            Ok(())
        } else {
            ParseSnafu {
                reason: format!("expected {:?}", b as char),
            }
            .fail()
        }
    }

    /// True once no value token can continue (used to find where a bare
    /// scalar token like an integer, real or base64 binary ends).
    fn at_token_end(&self) -> bool {
        matches!(
            self.peek(),
            None | Some(b',') | Some(b']') | Some(b'}') | Some(b' ') | Some(b'\t')
        )
    }

    fn parse_value(&mut self) -> Result<Value, DecofError> {
        self.skip_ws();
        match self.peek() {
            Some(b'#') => self.parse_bool(),
            Some(b'&') => self.parse_binary(),
            Some(b'"') => self.parse_string(),
            Some(b'[') => self.parse_sequence(),
            Some(b'{') => self.parse_tuple(),
            Some(b'-') | Some(b'0'..=b'9') => self.parse_number(),
            Some(b'n') | Some(b'i') => self.parse_non_finite(),
            _ => ParseSnafu {
                reason: "expected a value".to_string(),
            }
            .fail(),
        }
    }

    /// Consumes `lit` if it occurs at the cursor, returning whether it did.
    fn try_consume_literal(&mut self, lit: &str) -> bool {
        if self.bytes[self.pos..].starts_with(lit.as_bytes()) {
            self.pos += lit.len();
            true
        } else {
            false
        }
    }

    /// `nan`/`inf` (the non-finite reals [`encode_real`] emits; `-inf` is
    /// handled by [`Cursor::parse_number`] since it starts with `-`).
    fn parse_non_finite(&mut self) -> Result<Value, DecofError> {
        if self.try_consume_literal("nan") {
            Ok(Value::Real(f64::NAN))
        } else if self.try_consume_literal("inf") {
            Ok(Value::Real(f64::INFINITY))
        } else {
            ParseSnafu {
                reason: "expected a value".to_string(),
            }
            .fail()
        }
    }

    fn parse_bool(&mut self) -> Result<Value, DecofError> {
        self.expect(b'#')?;
        match self.bump() {
            Some(b't') => Ok(Value::Bool(true)),
            Some(b'f') => Ok(Value::Bool(false)),
            _ => ParseSnafu {
                reason: "expected #t or #f".to_string(),
            }
            .fail(),
        }
    }

    fn parse_binary(&mut self) -> Result<Value, DecofError> {
        self.expect(b'&')?;
        let start = self.pos;
        while !self.at_token_end() {
            self.pos += 1;
        }
        let token = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
        let bytes = BASE64.decode(token).map_err(|e| {
            DecofError::ParseError {
                reason: format!("invalid base64: {e}"),
            }
        })?;
        Ok(Value::Binary(bytes))
    }

    fn parse_number(&mut self) -> Result<Value, DecofError> {
        if self.try_consume_literal("-inf") {
            return Ok(Value::Real(f64::NEG_INFINITY));
        }
        let start = self.pos;
        let mut is_real = false;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' => self.pos += 1,
                b'.' | b'e' | b'E' | b'+' | b'-' if self.pos > start => {
                    is_real = true;
                    self.pos += 1;
                }
                _ => break,
            }
        }
        let token = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
        ensure!(
            !token.is_empty() && token != "-",
            ParseSnafu {
                reason: "empty numeric token".to_string()
            }
        );
        if is_real {
            token
                .parse::<f64>()
                .map(Value::Real)
                .map_err(|_| DecofError::ParseError {
                    reason: format!("{token:?} is not a valid real"),
                })
        } else {
            token
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| DecofError::ParseError {
                    reason: format!("{token:?} is not a valid integer"),
                })
        }
    }

    fn parse_string(&mut self) -> Result<Value, DecofError> {
        self.expect(b'"')?;
        let mut out = Vec::new();
        loop {
            let b = self.bump().ok_or_else(|| DecofError::ParseError {
                reason: "unterminated string".to_string(),
            })?;
            match b {
                b'"' => break,
                b'\\' => {
                    let esc = self.bump().ok_or_else(|| DecofError::ParseError {
                        reason: "unterminated escape".to_string(),
                    })?;
                    out.push(match esc {
                        b'a' => 0x07,
                        b'b' => 0x08,
                        b'f' => 0x0C,
                        b'n' => b'\n',
                        b'r' => b'\r',
                        b't' => b'\t',
                        b'v' => 0x0B,
                        b'\\' => b'\\',
                        b'\'' => b'\'',
                        b'"' => b'"',
                        b'?' => b'?',
                        b'x' => {
                            let hi = self.bump().ok_or_else(hex_err)?;
                            let lo = self.bump().ok_or_else(hex_err)?;
                            let s = [hi, lo];
                            let s = std::str::from_utf8(&s).map_err(|_| hex_err())?;
                            u8::from_str_radix(s, 16).map_err(|_| hex_err())?
                        }
                        other => {
                            return ParseSnafu {
                                reason: format!("unknown escape \\{}", other as char),
                            }
                            .fail()
                        }
                    });
                }
                0x20..=0x7F => out.push(b),
                other => {
                    return ParseSnafu {
                        reason: format!("unescaped byte {other:#04x} in string"),
                    }
                    .fail()
                }
            }
        }
        String::from_utf8(out)
            .map(Value::Str)
            .map_err(|_| DecofError::ParseError {
                reason: "string is not valid UTF-8".to_string(),
            })
    }

    fn parse_sequence(&mut self) -> Result<Value, DecofError> {
        self.expect(b'[')?;
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(Value::StrSeq(Vec::new()));
        }
        let mut elems = Vec::new();
        loop {
            elems.push(self.parse_value()?);
            self.skip_ws();
            match self.bump() {
                Some(b',') => {
                    self.skip_ws();
                    continue;
                }
                Some(b']') => break,
                _ => {
                    return ParseSnafu {
                        reason: "expected ',' or ']' in sequence".to_string(),
                    }
                    .fail()
                }
            }
        }
        homogeneous_sequence(elems)
    }

    fn parse_tuple(&mut self) -> Result<Value, DecofError> {
        self.expect(b'{')?;
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(Value::Tuple(Vec::new()));
        }
        let mut elems = Vec::new();
        loop {
            elems.push(self.parse_value()?);
            self.skip_ws();
            match self.bump() {
                Some(b',') => {
                    self.skip_ws();
                    continue;
                }
                Some(b'}') => break,
                _ => {
                    return ParseSnafu {
                        reason: "expected ',' or '}' in tuple".to_string(),
                    }
                    .fail()
                }
            }
        }
        Value::tuple(elems).map_err(DecofError::from)
    }
}

fn hex_err() -> DecofError {
    DecofError::ParseError {
        reason: "invalid \\xHH escape".to_string(),
    }
}

/// Builds the one homogeneous sequence [`Value`] variant whose element
/// type matches every parsed element, or fails if the elements don't
/// agree or the element type has no sequence variant (binary).
fn homogeneous_sequence(elems: Vec<Value>) -> Result<Value, DecofError> {
    let tag = elems[0].tag();
    for e in &elems {
        if e.tag() != tag {
            return ParseSnafu {
                reason: "sequence elements must share the same type".to_string(),
            }
            .fail();
        }
    }
    match tag {
        decof_value::ValueTag::Bool => Ok(Value::BoolSeq(
            elems.into_iter().map(|v| matches!(v, Value::Bool(true))).collect(),
        )),
        decof_value::ValueTag::Int => Ok(Value::IntSeq(
            elems
                .into_iter()
                .map(|v| match v {
                    Value::Int(i) => i,
                    _ => unreachable!(),
                })
                .collect(),
        )),
        decof_value::ValueTag::Real => Ok(Value::RealSeq(
            elems
                .into_iter()
                .map(|v| match v {
                    Value::Real(r) => r,
                    _ => unreachable!(),
                })
                .collect(),
        )),
        decof_value::ValueTag::Str => Ok(Value::StrSeq(
            elems
                .into_iter()
                .map(|v| match v {
                    Value::Str(s) => s,
                    _ => unreachable!(),
                })
                .collect(),
        )),
        other => ParseSnafu {
            reason: format!("{other} has no sequence form"),
        }
        .fail(),
    }
}

/// Parses one value from `s`, rejecting trailing garbage after it.
pub fn parse_value(s: &str) -> Result<Value, DecofError> {
    let mut cursor = Cursor::new(s.trim());
    let value = cursor.parse_value()?;
    cursor.skip_ws();
    if !cursor.eof() {
        return ParseSnafu {
            reason: "trailing characters after value".to_string(),
        }
        .fail();
    }
    Ok(value)
}

/// The inverse of [`parse_value`]: always produces a string `parse_value`
/// accepts and that decodes back to an equal value (spec P6).
pub fn encode_value(value: &Value) -> String {
    match value {
        Value::Bool(true) => "#t".to_string(),
        Value::Bool(false) => "#f".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Real(r) => encode_real(*r),
        Value::Str(s) => encode_string(s),
        Value::Binary(b) => format!("&{}", BASE64.encode(b)),
        Value::BoolSeq(v) => encode_seq(v.iter().map(|b| encode_value(&Value::Bool(*b)))),
        Value::IntSeq(v) => encode_seq(v.iter().map(|i| encode_value(&Value::Int(*i)))),
        Value::RealSeq(v) => encode_seq(v.iter().map(|r| encode_value(&Value::Real(*r)))),
        Value::StrSeq(v) => encode_seq(v.iter().map(|s| encode_value(&Value::Str(s.clone())))),
        Value::Tuple(elems) => {
            let inner = elems.iter().map(encode_value).collect::<Vec<_>>().join(",");
            format!("{{{inner}}}")
        }
    }
}

fn encode_seq(items: impl Iterator<Item = String>) -> String {
    format!("[{}]", items.collect::<Vec<_>>().join(","))
}

/// Rust's shortest-round-trip `f64` `Display` already satisfies the
/// spec's losslessness requirement without hand-rolling a 17-significant-
/// digit formatter; a trailing `.0` is forced on whole numbers so the
/// printed form always keeps its `REAL` tag on the way back in.
fn encode_real(r: f64) -> String {
    if r.is_nan() {
        return "nan".to_string();
    }
    if r.is_infinite() {
        return if r > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    let s = format!("{r}");
    if s.contains('.') || s.contains('e') || s.contains('E') {
        s
    } else {
        format!("{s}.0")
    }
}

fn encode_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for b in s.bytes() {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            0x07 => out.push_str("\\a"),
            0x08 => out.push_str("\\b"),
            0x0C => out.push_str("\\f"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x0B => out.push_str("\\v"),
            0x20..=0x7F => out.push(b as char),
            other => out.push_str(&format!("\\x{other:02X}")),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(v: Value) {
        let encoded = encode_value(&v);
        let decoded = parse_value(&encoded).unwrap_or_else(|e| panic!("{encoded:?}: {e}"));
        assert_eq!(decoded, v, "encoded form was {encoded:?}");
    }

    #[test]
    fn scalars_round_trip() {
        roundtrip(Value::Bool(true));
        roundtrip(Value::Bool(false));
        roundtrip(Value::Int(-42));
        roundtrip(Value::Int(0));
        roundtrip(Value::Real(-1.23));
        roundtrip(Value::Real(2.0));
        roundtrip(Value::Str("Hello, world!".to_string()));
        roundtrip(Value::Binary(b"decof".to_vec()));
        roundtrip(Value::Binary(vec![]));
    }

    #[test]
    fn non_finite_reals_round_trip() {
        roundtrip(Value::Real(f64::INFINITY));
        roundtrip(Value::Real(f64::NEG_INFINITY));
        // NaN != NaN under `PartialEq`, so `roundtrip`'s equality check
        // doesn't apply; just check the tag and the bit pattern survive.
        let encoded = encode_value(&Value::Real(f64::NAN));
        assert_eq!(encoded, "nan");
        match parse_value(&encoded).unwrap() {
            Value::Real(r) => assert!(r.is_nan()),
            other => panic!("expected a real, got {other:?}"),
        }
    }

    #[test]
    fn string_with_arbitrary_bytes_round_trips() {
        roundtrip(Value::Str("tab\there\nand \"quotes\" and \\slash\\".to_string()));
        roundtrip(Value::Str("bell\x07 del\x7f".to_string()));
    }

    #[test]
    fn sequences_round_trip() {
        roundtrip(Value::IntSeq(vec![1, -2, 3]));
        roundtrip(Value::BoolSeq(vec![true, false, true]));
        roundtrip(Value::RealSeq(vec![1.5, -2.25]));
        roundtrip(Value::StrSeq(vec!["a".into(), "b".into()]));
        roundtrip(Value::StrSeq(vec![]));
    }

    #[test]
    fn tuple_round_trips() {
        roundtrip(
            Value::tuple(vec![
                Value::Bool(true),
                Value::Int(-1),
                Value::Real(-1.23),
                Value::Str("Hello".to_string()),
                Value::Binary(b"World".to_vec()),
            ])
            .unwrap(),
        );
    }

    #[test]
    fn scenario_binary_base64() {
        assert_eq!(encode_value(&Value::Binary(b"decof".to_vec())), "&ZGVjb2Y=");
        assert_eq!(
            parse_value("&bm9wZQ==").unwrap(),
            Value::Binary(b"nope".to_vec())
        );
    }

    #[test]
    fn scenario_tuple_parse_and_encode() {
        let v = parse_value("{#t,-1,-1.23,\"Hello\",&V29ybGQ=}").unwrap();
        assert_eq!(
            v,
            Value::tuple(vec![
                Value::Bool(true),
                Value::Int(-1),
                Value::Real(-1.23),
                Value::Str("Hello".to_string()),
                Value::Binary(b"World".to_vec()),
            ])
            .unwrap()
        );
        assert_eq!(encode_value(&v), "{#t,-1,-1.23,\"Hello\",&V29ybGQ=}");
    }

    #[test]
    fn mismatched_sequence_types_rejected() {
        assert!(parse_value("[1,#t]").is_err());
    }

    #[test]
    fn binary_sequence_rejected_no_such_variant() {
        assert!(parse_value("[&AA==,&AQ==]").is_err());
    }

    #[test]
    fn trailing_garbage_rejected() {
        assert!(parse_value("#t garbage").is_err());
    }
}
