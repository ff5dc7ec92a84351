/// The object kinds tracked by the snapshot engine.
///
/// `Member` carries a composite key (server-id + user-id) and has no
/// `previous_*_snapshots` partition of its own — see `archiver-db`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum ObjectKind {
    User,
    Server,
    Role,
    Member,
    Channel,
    Thread,
    ForumTag,
    Message,
    Attachment,
    ServerEmoji,
}

impl ObjectKind {
    pub const ALL: &'static [ObjectKind] = &[
        ObjectKind::User,
        ObjectKind::Server,
        ObjectKind::Role,
        ObjectKind::Member,
        ObjectKind::Channel,
        ObjectKind::Thread,
        ObjectKind::ForumTag,
        ObjectKind::Message,
        ObjectKind::Attachment,
        ObjectKind::ServerEmoji,
    ];

    /// Short, stable, lowercase identifier used in SQL table names and in
    /// codec warning-dedup keys.
    pub const fn as_str(self) -> &'static str {
        match self {
            ObjectKind::User => "user",
            ObjectKind::Server => "server",
            ObjectKind::Role => "role",
            ObjectKind::Member => "member",
            ObjectKind::Channel => "channel",
            ObjectKind::Thread => "thread",
            ObjectKind::ForumTag => "forum_tag",
            ObjectKind::Message => "message",
            ObjectKind::Attachment => "attachment",
            ObjectKind::ServerEmoji => "server_emoji",
        }
    }

    /// Never versioned: stored once, immutable, as a child of its parent.
    pub const fn is_never_versioned(self) -> bool {
        matches!(self, ObjectKind::Attachment)
    }

    /// Has a composite `(parent_id, id)` key instead of a bare `id`.
    pub const fn is_composite_keyed(self) -> bool {
        matches!(self, ObjectKind::Member)
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
