use crate::schema::{FieldSpec, NullPolicy, ObjectSchema, ScalarType};

/// A server/guild. Ownership can transfer, so `owner_id` is
/// mutable; only `id` is carved into the immutable partition.
pub const SERVER_SCHEMA: ObjectSchema = &[
    FieldSpec::scalar("id", ScalarType::Int64AsString, NullPolicy::Absent, true),
    FieldSpec::scalar("name", ScalarType::Str, NullPolicy::Absent, false),
    FieldSpec::scalar("icon", ScalarType::ImageHash, NullPolicy::Null, false),
    FieldSpec::scalar("owner_id", ScalarType::Int64AsString, NullPolicy::Absent, false),
    FieldSpec::extra("description", NullPolicy::Null),
    FieldSpec::extra("premium_tier", NullPolicy::Absent),
    FieldSpec::extra("preferred_locale", NullPolicy::Absent),
    FieldSpec::extra("features", NullPolicy::EmptyArray),
];
