use crate::schema::{FieldSpec, NullPolicy, ObjectSchema, ScalarType};

/// A server channel. `type` never changes once a channel is
/// created.
pub const CHANNEL_SCHEMA: ObjectSchema = &[
    FieldSpec::scalar("id", ScalarType::Int64AsString, NullPolicy::Absent, true),
    FieldSpec::scalar("type", ScalarType::Integer, NullPolicy::Absent, true),
    FieldSpec::scalar("name", ScalarType::Str, NullPolicy::Null, false),
    FieldSpec::scalar("position", ScalarType::Integer, NullPolicy::Absent, false),
    FieldSpec::scalar(
        "permission_overwrites",
        ScalarType::PermissionOverwrites,
        NullPolicy::EmptyArray,
        false,
    ),
    FieldSpec::scalar("parent_id", ScalarType::Int64AsString, NullPolicy::Null, false),
    FieldSpec::extra("topic", NullPolicy::Null),
    FieldSpec::extra("nsfw", NullPolicy::Absent),
    FieldSpec::extra("rate_limit_per_user", NullPolicy::Absent),
    FieldSpec::extra("bitrate", NullPolicy::Absent),
];
