use crate::schema::{FieldSpec, NullPolicy, ObjectSchema, ScalarType};

/// A thread: a channel-like object whose `parent_id` and
/// `owner_id` are fixed at creation.
pub const THREAD_SCHEMA: ObjectSchema = &[
    FieldSpec::scalar("id", ScalarType::Int64AsString, NullPolicy::Absent, true),
    FieldSpec::scalar("parent_id", ScalarType::Int64AsString, NullPolicy::Absent, true),
    FieldSpec::scalar("owner_id", ScalarType::Int64AsString, NullPolicy::Absent, true),
    FieldSpec::scalar("name", ScalarType::Str, NullPolicy::Absent, false),
    FieldSpec::scalar("archived", ScalarType::Bool { nullable: false }, NullPolicy::Absent, false),
    FieldSpec::scalar("locked", ScalarType::Bool { nullable: false }, NullPolicy::Absent, false),
    FieldSpec::extra("message_count", NullPolicy::Absent),
    FieldSpec::extra("member_count", NullPolicy::Absent),
    FieldSpec::extra("auto_archive_duration", NullPolicy::Absent),
    FieldSpec::extra("applied_tags", NullPolicy::EmptyArray),
];
