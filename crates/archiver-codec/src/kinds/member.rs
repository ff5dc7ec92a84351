use crate::schema::{FieldSpec, NullPolicy, ObjectSchema, ScalarType};

/// A server member. Composite-keyed by `(server_id,
/// user_id)`; the snapshot engine supplies the key from outside this
/// schema, so there is no `id`/`server_id` field here. `joined_at` absent
/// is the "member left" tombstone signal.
///
/// `deaf`/`mute` are the voice-only fields the partial-update mechanism
/// fills in from the previous snapshot when an observed update omits them
///.
pub const MEMBER_SCHEMA: ObjectSchema = &[
    FieldSpec::scalar("nick", ScalarType::Str, NullPolicy::Null, false),
    FieldSpec::scalar("avatar", ScalarType::ImageHash, NullPolicy::Null, false),
    FieldSpec::scalar("roles", ScalarType::IdArray, NullPolicy::EmptyArray, false),
    FieldSpec::scalar("joined_at", ScalarType::Timestamp, NullPolicy::Absent, false),
    FieldSpec::scalar("deaf", ScalarType::Bool { nullable: true }, NullPolicy::Absent, false),
    FieldSpec::scalar("mute", ScalarType::Bool { nullable: true }, NullPolicy::Absent, false),
    FieldSpec::extra("premium_since", NullPolicy::Null),
    FieldSpec::extra("pending", NullPolicy::Absent),
    FieldSpec::extra("communication_disabled_until", NullPolicy::Null),
];
