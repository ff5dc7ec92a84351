use snafu::{Location, Snafu};

/// Schema-violation errors: fatal, never retried, never
/// swallowed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CodecError {
    #[snafu(display("field `{path}` is required but was null/absent"))]
    UnexpectedNull {
        path: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("field `{path}` expected {expected}, got {got}"))]
    TypeMismatch {
        path: String,
        expected: &'static str,
        got: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("field `{path}` does not fit in 64 bits: {value}"))]
    IntegerOverflow {
        path: String,
        value: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("field `{path}` has invalid id-array length {len} (must be a multiple of 8)"))]
    InvalidIdArrayLength {
        path: String,
        len: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display(
        "field `{path}` has invalid permission-overwrite length {len} (must be a multiple of 25)"
    ))]
    InvalidPermissionOverwriteLength {
        path: String,
        len: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("field `{path}` has an invalid timestamp: {text}"))]
    InvalidTimestamp {
        path: String,
        text: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("field `{path}` has invalid base64: {source}"))]
    InvalidBase64 {
        path: String,
        source: base64::DecodeError,
        #[snafu(implicit)]
        location: Location,
    },
}

pub type CodecResult<T> = std::result::Result<T, CodecError>;
