use crate::schema::{FieldSpec, NullPolicy, ObjectSchema, ScalarType};

/// An attachment: never versioned, so every field is
/// effectively immutable — there is only ever one snapshot per id.
pub const ATTACHMENT_SCHEMA: ObjectSchema = &[
    FieldSpec::scalar("id", ScalarType::Int64AsString, NullPolicy::Absent, true),
    FieldSpec::scalar("filename", ScalarType::Str, NullPolicy::Absent, true),
    FieldSpec::scalar("size", ScalarType::Integer, NullPolicy::Absent, true),
    FieldSpec::scalar("url", ScalarType::Str, NullPolicy::Absent, true),
    FieldSpec::extra("content_type", NullPolicy::Null),
    FieldSpec::extra("height", NullPolicy::Null),
    FieldSpec::extra("width", NullPolicy::Null),
];
