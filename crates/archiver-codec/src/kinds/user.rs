use crate::schema::{FieldSpec, NullPolicy, ObjectSchema, ScalarType};

/// A real (non-webhook) user. `id` and `bot` never change
/// across snapshots; everything else can.
pub const USER_SCHEMA: ObjectSchema = &[
    FieldSpec::scalar("id", ScalarType::Int64AsString, NullPolicy::Absent, true),
    FieldSpec::scalar("bot", ScalarType::Bool { nullable: false }, NullPolicy::Absent, true),
    FieldSpec::scalar("username", ScalarType::Str, NullPolicy::Absent, false),
    FieldSpec::scalar("discriminator", ScalarType::Str, NullPolicy::Absent, false),
    FieldSpec::scalar("global_name", ScalarType::Str, NullPolicy::Null, false),
    FieldSpec::scalar("avatar", ScalarType::ImageHash, NullPolicy::Null, false),
    FieldSpec::extra("system", NullPolicy::Absent),
    FieldSpec::extra("public_flags", NullPolicy::Absent),
    FieldSpec::extra("banner", NullPolicy::Absent),
    FieldSpec::extra("accent_color", NullPolicy::Absent),
];
