//! The DeCoF error taxonomy (spec §7).
//!
//! Every externally observable failure collapses into one of these ten
//! variants. `code()` is the wire-level numeric code CLI responses and
//! SCGI error bodies carry; `http_status()` is the SCGI mapping onto
//! HTTP status lines. `Display` text is capitalized, matching
//! `original_source/exceptions.cpp`'s "Access denied error"/"Invalid
//! parameter error"/"Wrong type error"/"Invalid value error" convention
//! (the CLI wire form prepends its own "ERROR <code>: " prefix, so the
//! trailing "error" noun is dropped here but the capitalization is kept).

use decof_value::ConversionError;
use snafu::Snafu;

#[derive(Clone, Debug, PartialEq, Snafu)]
pub enum DecofError {
    #[snafu(display("Unknown error"))]
    Unknown,

    #[snafu(display("Parse error: {reason}"))]
    ParseError { reason: String },

    #[snafu(display("Access denied"))]
    AccessDenied,

    #[snafu(display("Invalid parameter: {reason}"))]
    InvalidParameter { reason: String },

    #[snafu(display("Wrong type: {source}"))]
    WrongType { source: ConversionError },

    #[snafu(display("Invalid value: {reason}"))]
    InvalidValue { reason: String },

    #[snafu(display("Unknown operation: {op}"))]
    UnknownOperation { op: String },

    #[snafu(display("Invalid userlevel: {level}"))]
    InvalidUserlevel { level: i64 },

    #[snafu(display("Not subscribed"))]
    NotSubscribed,

    #[snafu(display("Not implemented"))]
    NotImplemented,
}

impl DecofError {
    /// The ten-entry wire code from spec §7 (1-indexed, in taxonomy order).
    pub fn code(&self) -> u16 {
        match self {
            DecofError::Unknown => 1,
            DecofError::ParseError { .. } => 2,
            DecofError::AccessDenied => 3,
            DecofError::InvalidParameter { .. } => 4,
            DecofError::WrongType { .. } => 5,
            DecofError::InvalidValue { .. } => 6,
            DecofError::UnknownOperation { .. } => 7,
            DecofError::InvalidUserlevel { .. } => 8,
            DecofError::NotSubscribed => 9,
            DecofError::NotImplemented => 10,
        }
    }

    /// The HTTP status SCGI responses use for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            DecofError::Unknown => 500,
            DecofError::ParseError { .. } => 400,
            DecofError::AccessDenied => 401,
            DecofError::InvalidParameter { .. } => 404,
            DecofError::WrongType { .. } => 400,
            DecofError::InvalidValue { .. } => 400,
            DecofError::UnknownOperation { .. } => 400,
            DecofError::InvalidUserlevel { .. } => 400,
            DecofError::NotSubscribed => 400,
            DecofError::NotImplemented => 501,
        }
    }
}

impl From<ConversionError> for DecofError {
    fn from(source: ConversionError) -> Self {
        match source {
            ConversionError::WrongType { .. } => DecofError::WrongType { source },
            ConversionError::InvalidValue { reason } => DecofError::InvalidValue { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_taxonomy_order() {
        assert_eq!(DecofError::Unknown.code(), 1);
        assert_eq!(DecofError::NotImplemented.code(), 10);
    }

    #[test]
    fn conversion_wrong_type_maps_through() {
        let conv = ConversionError::WrongType {
            expected: decof_value::ValueTag::Int,
            actual: decof_value::ValueTag::Str,
        };
        let err: DecofError = conv.into();
        assert_eq!(err.code(), 5);
    }
}
