use crate::schema::{FieldSpec, NullPolicy, ObjectSchema, ScalarType};

/// A custom server emoji definition.
/// `animated` never changes once uploaded. The uploader id (`user`) is
/// handled by a dedicated comparator at add-snapshot time: unknown on
/// either side is allowed, but if both sides name an uploader they must
/// match.
pub const SERVER_EMOJI_SCHEMA: ObjectSchema = &[
    FieldSpec::scalar("id", ScalarType::Int64AsString, NullPolicy::Absent, true),
    FieldSpec::scalar("animated", ScalarType::Bool { nullable: false }, NullPolicy::Absent, true),
    FieldSpec::scalar("uploaded_by", ScalarType::Int64AsString, NullPolicy::Null, true),
    FieldSpec::scalar("name", ScalarType::Str, NullPolicy::Absent, false),
    FieldSpec::scalar("available", ScalarType::Bool { nullable: false }, NullPolicy::Absent, false),
    FieldSpec::scalar("roles", ScalarType::IdArray, NullPolicy::EmptyArray, false),
    FieldSpec::extra("require_colons", NullPolicy::Absent),
    FieldSpec::extra("managed", NullPolicy::Absent),
];
