use crate::schema::{FieldSpec, NullPolicy, ObjectSchema, ScalarType};

/// A forum-channel tag definition.
pub const FORUM_TAG_SCHEMA: ObjectSchema = &[
    FieldSpec::scalar("id", ScalarType::Int64AsString, NullPolicy::Absent, true),
    FieldSpec::scalar("name", ScalarType::Str, NullPolicy::Absent, false),
    FieldSpec::scalar("moderated", ScalarType::Bool { nullable: false }, NullPolicy::Absent, false),
    FieldSpec::scalar("emoji", ScalarType::Emoji, NullPolicy::Null, false),
];
