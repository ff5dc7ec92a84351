mod attachment;
mod channel;
mod forum_tag;
mod member;
mod message;
mod role;
mod server;
mod server_emoji;
mod thread;
mod user;

pub use attachment::ATTACHMENT_SCHEMA;
pub use channel::CHANNEL_SCHEMA;
pub use forum_tag::FORUM_TAG_SCHEMA;
pub use member::MEMBER_SCHEMA;
pub use message::MESSAGE_SCHEMA;
pub use role::ROLE_SCHEMA;
pub use server::SERVER_SCHEMA;
pub use server_emoji::SERVER_EMOJI_SCHEMA;
pub use thread::THREAD_SCHEMA;
pub use user::USER_SCHEMA;

use archiver_core::ObjectKind;

use crate::schema::ObjectSchema;

/// The static schema for a given object kind. `Member` has
/// no `id` field of its own in its schema — the snapshot engine supplies
/// the composite key from outside the codec.
pub const fn schema_for(kind: ObjectKind) -> ObjectSchema {
    match kind {
        ObjectKind::User => USER_SCHEMA,
        ObjectKind::Server => SERVER_SCHEMA,
        ObjectKind::Role => ROLE_SCHEMA,
        ObjectKind::Member => MEMBER_SCHEMA,
        ObjectKind::Channel => CHANNEL_SCHEMA,
        ObjectKind::Thread => THREAD_SCHEMA,
        ObjectKind::ForumTag => FORUM_TAG_SCHEMA,
        ObjectKind::Message => MESSAGE_SCHEMA,
        ObjectKind::Attachment => ATTACHMENT_SCHEMA,
        ObjectKind::ServerEmoji => SERVER_EMOJI_SCHEMA,
        // `ObjectKind` is `#[non_exhaustive]`; every variant that exists
        // today is handled above.
        _ => unreachable!("unhandled object kind"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_object_kind_has_a_schema_with_at_least_one_field() {
        for kind in ObjectKind::ALL {
            assert!(!schema_for(*kind).is_empty(), "{kind} has an empty schema");
        }
    }
}
