use crate::schema::{FieldSpec, NullPolicy, ObjectSchema, ScalarType};

/// Just enough of the author object to resolve a user vs. webhook snapshot
/// upstream of the codec; the
/// rest of the author payload is captured separately as a user snapshot.
const AUTHOR_SCHEMA: &[FieldSpec] = &[FieldSpec::scalar(
    "id",
    ScalarType::Int64AsString,
    NullPolicy::Absent,
    true,
)];

/// `message_reference.{channel_id, server_id}` use a compressed encoding:
/// `0` = same channel as this message, `1` = parent of this thread,
/// otherwise the explicit id. The compression/expansion
/// itself happens in `archiver-db`; the codec only carries the raw
/// integers through.
const MESSAGE_REFERENCE_SCHEMA: &[FieldSpec] = &[
    FieldSpec::scalar("message_id", ScalarType::Int64AsString, NullPolicy::Null, false),
    FieldSpec::scalar("channel_id", ScalarType::Int64AsString, NullPolicy::Absent, false),
    FieldSpec::scalar("server_id", ScalarType::Int64AsString, NullPolicy::Absent, false),
];

/// A message. `timestamp` must equal the timestamp
/// embedded in `id`'s snowflake bits — violation is fatal.
pub const MESSAGE_SCHEMA: ObjectSchema = &[
    FieldSpec::scalar("id", ScalarType::Int64AsString, NullPolicy::Absent, true),
    FieldSpec::scalar("channel_id", ScalarType::Int64AsString, NullPolicy::Absent, true),
    FieldSpec::scalar("type", ScalarType::Integer, NullPolicy::Absent, true),
    FieldSpec::scalar("tts", ScalarType::Bool { nullable: false }, NullPolicy::Absent, true),
    FieldSpec::scalar("timestamp", ScalarType::Timestamp, NullPolicy::Absent, true),
    FieldSpec::scalar("webhook_id", ScalarType::Int64AsString, NullPolicy::Null, true),
    FieldSpec::sub("author", AUTHOR_SCHEMA, NullPolicy::Null, true),
    FieldSpec::scalar("content", ScalarType::Str, NullPolicy::Absent, false),
    FieldSpec::scalar("edited_timestamp", ScalarType::Timestamp, NullPolicy::Null, false),
    FieldSpec::scalar("mention_everyone", ScalarType::Bool { nullable: false }, NullPolicy::Absent, false),
    FieldSpec::scalar("mentions", ScalarType::IdArray, NullPolicy::EmptyArray, false),
    FieldSpec::scalar("mention_roles", ScalarType::IdArray, NullPolicy::EmptyArray, false),
    FieldSpec::sub("message_reference", MESSAGE_REFERENCE_SCHEMA, NullPolicy::Null, false),
    FieldSpec::extra("pinned", NullPolicy::Absent),
    FieldSpec::extra("flags", NullPolicy::Absent),
    FieldSpec::extra("embeds", NullPolicy::EmptyArray),
    FieldSpec::extra("components", NullPolicy::EmptyArray),
    FieldSpec::extra("attachments", NullPolicy::EmptyArray),
    FieldSpec::extra("referenced_message", NullPolicy::Null),
];
