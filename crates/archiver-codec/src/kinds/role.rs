use crate::schema::{FieldSpec, NullPolicy, ObjectSchema, ScalarType};

/// A server role. `managed` (bot-owned integration role) never
/// changes once created.
pub const ROLE_SCHEMA: ObjectSchema = &[
    FieldSpec::scalar("id", ScalarType::Int64AsString, NullPolicy::Absent, true),
    FieldSpec::scalar("managed", ScalarType::Bool { nullable: false }, NullPolicy::Absent, true),
    FieldSpec::scalar("name", ScalarType::Str, NullPolicy::Absent, false),
    FieldSpec::scalar("color", ScalarType::Integer, NullPolicy::Absent, false),
    FieldSpec::scalar("hoist", ScalarType::Bool { nullable: false }, NullPolicy::Absent, false),
    FieldSpec::scalar("position", ScalarType::Integer, NullPolicy::Absent, false),
    FieldSpec::scalar("permissions", ScalarType::Int64AsString, NullPolicy::Absent, false),
    FieldSpec::scalar("mentionable", ScalarType::Bool { nullable: false }, NullPolicy::Absent, false),
    FieldSpec::extra("icon", NullPolicy::Null),
    FieldSpec::extra("unicode_emoji", NullPolicy::Null),
];
