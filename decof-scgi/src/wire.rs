//! Typed value wire codec for SCGI `GET`/`PUT` bodies (spec §4.9).
//!
//! `GET` renders a value as human-readable plain text, ported from
//! `original_source/src/scgi/js_value_encoder.cpp` (booleans as
//! `true`/`false`, reals at 17 significant digits, sequence elements
//! newline-separated). `PUT` goes the other way, keyed by the
//! `vnd/com.toptica.decof.<type>` media type rather than sniffing the
//! body: scalars are a lexical form, integer/real sequences are
//! little-endian packed fixed-width elements, boolean sequences are one
//! octet per element, and string sequences are bencode strings
//! (`original_source/src/scgi/bencode_string_parser.cpp`).

use decof_core::error::{DecofError, InvalidValueSnafu, ParseSnafu};
use decof_value::{ConversionError, Value, ValueTag};
use snafu::ensure;

/// The human-readable `GET` encoding (spec §4.9 "typed JSON-value
/// encoder" — despite the name, plain text rather than JSON, matching
/// the original `js_value_encoder`).
pub fn encode_text_value(value: &Value) -> String {
    match value {
        Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        Value::Str(s) => s.clone(),
        Value::Binary(b) => String::from_utf8_lossy(b).into_owned(),
        Value::BoolSeq(xs) => xs
            .iter()
            .map(|b| if *b { "true" } else { "false" })
            .collect::<Vec<_>>()
            .join("\r\n"),
        Value::IntSeq(xs) => xs.iter().map(i64::to_string).collect::<Vec<_>>().join("\r\n"),
        Value::RealSeq(xs) => xs.iter().map(f64::to_string).collect::<Vec<_>>().join("\r\n"),
        Value::StrSeq(xs) => xs.join("\r\n"),
        Value::Tuple(xs) => xs
            .iter()
            .map(encode_text_value)
            .collect::<Vec<_>>()
            .join("\r\n"),
    }
}

/// Decodes a `PUT` body given its `vnd/com.toptica.decof.<type>` media
/// type. `content_type` is the bare suffix (`"integer"`, `"real_seq"`, …).
pub fn decode_put_body(content_type: &str, body: &[u8]) -> Result<Value, DecofError> {
    let text = || {
        std::str::from_utf8(body)
            .map(str::trim)
            .map_err(|_| ParseSnafu { reason: "body is not utf-8".to_string() }.build())
    };

    match content_type {
        "boolean" => match text()? {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => InvalidValueSnafu {
                reason: format!("{other:?} is not a valid boolean"),
            }
            .fail(),
        },
        "integer" => text()?
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| InvalidValueSnafu { reason: "not a valid integer".to_string() }.build()),
        "real" => text()?
            .parse::<f64>()
            .map(Value::Real)
            .map_err(|_| InvalidValueSnafu { reason: "not a valid real".to_string() }.build()),
        "string" => Ok(Value::Str(String::from_utf8_lossy(body).into_owned())),
        "boolean_seq" => Ok(Value::BoolSeq(body.iter().map(|&b| b != 0).collect())),
        "integer_seq" => {
            ensure!(
                body.len() % 4 == 0,
                InvalidValueSnafu {
                    reason: "integer_seq body length is not a multiple of 4"
                }
            );
            Ok(Value::IntSeq(
                body.chunks_exact(4)
                    .map(|c| i32::from_le_bytes(c.try_into().unwrap()) as i64)
                    .collect(),
            ))
        }
        "real_seq" => {
            ensure!(
                body.len() % 8 == 0,
                InvalidValueSnafu {
                    reason: "real_seq body length is not a multiple of 8"
                }
            );
            Ok(Value::RealSeq(
                body.chunks_exact(8)
                    .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
                    .collect(),
            ))
        }
        "string_seq" => decode_bencode_string_seq(body),
        "tuple" => Err(DecofError::NotImplemented),
        _ => Err(DecofError::WrongType {
            source: ConversionError::WrongType {
                expected: ValueTag::Str,
                actual: ValueTag::Str,
            },
        }),
    }
}

/// Bencode strings (`len:data`) back to back, matching
/// `bencode_string_parser.cpp`.
fn decode_bencode_string_seq(body: &[u8]) -> Result<Value, DecofError> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < body.len() {
        let colon = body[pos..]
            .iter()
            .position(|&b| b == b':')
            .ok_or_else(|| ParseSnafu { reason: "bencode string missing ':'".to_string() }.build())?;
        let len_str = std::str::from_utf8(&body[pos..pos + colon])
            .map_err(|_| ParseSnafu { reason: "bencode length is not utf-8".to_string() }.build())?;
        let len: usize = len_str
            .parse()
            .map_err(|_| ParseSnafu { reason: format!("{len_str:?} is not a valid bencode length") }.build())?;
        let data_start = pos + colon + 1;
        let data_end = data_start + len;
        ensure!(data_end <= body.len(), ParseSnafu { reason: "bencode string runs past end of body" });
        let s = std::str::from_utf8(&body[data_start..data_end])
            .map_err(|_| ParseSnafu { reason: "bencode string is not utf-8".to_string() }.build())?;
        out.push(s.to_string());
        pos = data_end;
        while body.get(pos) == Some(&b'\r') || body.get(pos) == Some(&b'\n') {
            pos += 1;
        }
    }
    Ok(Value::StrSeq(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_boolean_and_integer() {
        assert_eq!(encode_text_value(&Value::Bool(true)), "true");
        assert_eq!(encode_text_value(&Value::Int(-7)), "-7");
    }

    #[test]
    fn decodes_integer_seq_little_endian() {
        let body = [1i32, 2, 3]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect::<Vec<_>>();
        let value = decode_put_body("integer_seq", &body).unwrap();
        assert_eq!(value, Value::IntSeq(vec![1, 2, 3]));
    }

    #[test]
    fn decodes_bencode_string_seq() {
        let body = b"5:hello\r\n5:world";
        let value = decode_put_body("string_seq", body).unwrap();
        assert_eq!(
            value,
            Value::StrSeq(vec!["hello".to_string(), "world".to_string()])
        );
    }

    #[test]
    fn rejects_unknown_media_type() {
        assert!(decode_put_body("frobnicate", b"x").is_err());
    }

    #[test]
    fn tuple_put_is_not_implemented() {
        let err = decode_put_body("tuple", b"").unwrap_err();
        assert!(matches!(err, DecofError::NotImplemented));
    }
}
