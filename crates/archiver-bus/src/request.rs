//! Request/response vocabulary dispatched onto the worker thread.
//!
//! Each request is a concrete, owned struct naming its inputs and an
//! associated `Response` type, dispatched generically rather than through
//! RPC framing (there is no network between caller and worker — both live
//! in the same process, just different threads).

use archiver_codec::EncodedObject;
use archiver_core::{ObjectKind, Timing};
use archiver_db::{
    AddSnapshotOutcome, AuthorInfo, Database, DbResult, PlacementOutcome, ReactionEmoji, ReactionHistoryEntry, SearchHit, SnapshotRow,
};

/// A single unit of work the worker thread knows how to run against its
/// exclusively-owned `Database`. Mirrors `RpcRequest`'s shape: an owned,
/// `'static` request type paired with an associated response type.
pub trait BusRequest: Send + 'static {
    type Response: Send + 'static;

    fn run(self, db: &mut Database) -> Self::Response;
}

macro_rules! bus_request {
    ($name:ident { $($field:ident : $ty:ty),* $(,)? } -> $resp:ty => |$db:ident, $this:ident| $body:expr) => {
        pub struct $name {
            $(pub $field: $ty),*
        }

        impl BusRequest for $name {
            type Response = $resp;

            fn run($this, $db: &mut Database) -> Self::Response {
                $body
            }
        }
    };
}

bus_request!(AddSnapshot {
    kind: ObjectKind,
    id: String,
    parent_id: Option<String>,
    timing: Timing,
    encoded: EncodedObject,
} -> DbResult<AddSnapshotOutcome> => |db, self| {
    db.add_snapshot(self.kind, &self.id, self.parent_id.as_deref(), self.timing, &self.encoded)
});

bus_request!(MarkDeleted {
    kind: ObjectKind,
    id: String,
    timing: Timing,
} -> DbResult<bool> => |db, self| {
    db.mark_deleted(self.kind, &self.id, self.timing)
});

bus_request!(GetLatest {
    kind: ObjectKind,
    id: String,
} -> DbResult<Option<SnapshotRow>> => |db, self| {
    db.get_latest(self.kind, &self.id)
});

bus_request!(GetAt {
    kind: ObjectKind,
    id: String,
    at_ts_ms: i64,
} -> DbResult<Option<SnapshotRow>> => |db, self| {
    db.get_at(self.kind, &self.id, self.at_ts_ms)
});

bus_request!(ListLatestByParent {
    kind: ObjectKind,
    parent_id: String,
} -> DbResult<Vec<(String, SnapshotRow)>> => |db, self| {
    db.list_latest_by_parent(self.kind, &self.parent_id)
});

bus_request!(ListNotDeletedIdsByParent {
    kind: ObjectKind,
    parent_id: String,
} -> DbResult<Vec<String>> => |db, self| {
    db.list_not_deleted_ids_by_parent(self.kind, &self.parent_id)
});

bus_request!(AddServerEmojiSnapshot {
    id: String,
    server_id: String,
    timing: Timing,
    encoded: EncodedObject,
} -> DbResult<AddSnapshotOutcome> => |db, self| {
    db.add_server_emoji_snapshot(&self.id, &self.server_id, self.timing, self.encoded)
});

bus_request!(AddMemberSnapshot {
    server_id: String,
    user_id: String,
    timing: Timing,
    encoded: EncodedObject,
    partial_fields: Vec<String>,
} -> DbResult<AddSnapshotOutcome> => |db, self| {
    let fields: Vec<&str> = self.partial_fields.iter().map(String::as_str).collect();
    db.add_member_snapshot(&self.server_id, &self.user_id, self.timing, &self.encoded, &fields)
});

bus_request!(MarkMemberLeft {
    server_id: String,
    user_id: String,
    timing: Timing,
} -> DbResult<AddSnapshotOutcome> => |db, self| {
    db.mark_member_left(&self.server_id, &self.user_id, self.timing)
});

bus_request!(SyncMembers {
    server_id: String,
    present_user_ids: Vec<String>,
    timing: Timing,
} -> DbResult<usize> => |db, self| {
    db.sync_members(&self.server_id, &self.present_user_ids, self.timing)
});

/// Owned counterpart to `archiver_db::AuthorInfo<'_>`, which borrows —
/// a bus request must be `'static` to cross the worker-thread boundary.
pub struct OwnedAuthorInfo {
    pub webhook_id: Option<String>,
    pub real_user_id: i64,
    pub webhook_username: String,
    pub webhook_avatar_hash: Option<String>,
}

impl OwnedAuthorInfo {
    fn borrowed(&self) -> AuthorInfo<'_> {
        AuthorInfo {
            webhook_id: self.webhook_id.as_deref(),
            real_user_id: self.real_user_id,
            webhook_username: &self.webhook_username,
            webhook_avatar_hash: self.webhook_avatar_hash.as_deref(),
        }
    }
}

bus_request!(AddMessageSnapshot {
    message_id: String,
    channel_id: i64,
    server_id: Option<i64>,
    encoded: EncodedObject,
    author: OwnedAuthorInfo,
    application_id: Option<String>,
    timing: Timing,
} -> DbResult<AddSnapshotOutcome> => |db, self| {
    db.add_message_snapshot(
        &self.message_id,
        self.channel_id,
        self.server_id,
        self.encoded,
        &self.author.borrowed(),
        self.application_id.as_deref(),
        self.timing,
    )
});

bus_request!(AddMessageAttachments {
    message_id: String,
    attachments: Vec<(String, EncodedObject)>,
} -> DbResult<()> => |db, self| {
    db.add_message_attachments(&self.message_id, &self.attachments)
});

bus_request!(SearchMessages {
    query: String,
    channel_id: Option<String>,
    limit: u32,
} -> DbResult<Vec<SearchHit>> => |db, self| {
    db.search_messages(&self.query, self.channel_id.as_deref(), self.limit)
});

bus_request!(AddAttachment {
    message_id: String,
    id: String,
    encoded: EncodedObject,
} -> DbResult<bool> => |db, self| {
    db.add_attachment(&self.message_id, &self.id, &self.encoded)
});

bus_request!(ResolveWebhookUser {
    webhook_id: String,
    username: String,
    avatar_hash: Option<String>,
} -> DbResult<i64> => |db, self| {
    db.resolve_webhook_user(&self.webhook_id, &self.username, self.avatar_hash.as_deref())
});

bus_request!(AddInitialReactions {
    message_id: String,
    timing: Timing,
    placements: Vec<(ReactionEmoji, u8, String, EncodedObject)>,
} -> DbResult<()> => |db, self| {
    db.add_initial_reactions(&self.message_id, self.timing, &self.placements)
});

bus_request!(AddReactionPlacement {
    message_id: String,
    emoji: ReactionEmoji,
    reaction_type: u8,
    user_id: String,
    timing: Timing,
    user_snapshot: Option<EncodedObject>,
} -> DbResult<PlacementOutcome> => |db, self| {
    db.add_reaction_placement(&self.message_id, &self.emoji, self.reaction_type, &self.user_id, self.timing, self.user_snapshot.as_ref())
});

bus_request!(MarkReactionRemoved {
    message_id: String,
    emoji: ReactionEmoji,
    reaction_type: u8,
    user_id: String,
    timing: Timing,
} -> DbResult<bool> => |db, self| {
    db.mark_reaction_removed(&self.message_id, &self.emoji, self.reaction_type, &self.user_id, self.timing)
});

bus_request!(MarkReactionsRemovedBulk {
    message_id: String,
    emoji: Option<ReactionEmoji>,
    reaction_type: Option<u8>,
    timing: Timing,
} -> DbResult<usize> => |db, self| {
    db.mark_reactions_removed_bulk(&self.message_id, self.emoji.as_ref(), self.reaction_type, self.timing)
});

bus_request!(GetReactionHistory {
    message_id: String,
} -> DbResult<Vec<ReactionHistoryEntry>> => |db, self| {
    db.get_reaction_history(&self.message_id)
});

bus_request!(FileHash {
    url: String,
} -> DbResult<Option<Option<Vec<u8>>>> => |db, self| {
    db.file_hash(&self.url)
});

bus_request!(RecordFile {
    url: String,
    hash: Option<Vec<u8>>,
    error_code: Option<String>,
} -> DbResult<()> => |db, self| {
    db.record_file(&self.url, self.hash.as_deref(), self.error_code.as_deref())
});

bus_request!(IsHashReferenced {
    hash: Vec<u8>,
} -> DbResult<bool> => |db, self| {
    db.is_hash_referenced(&self.hash)
});

bus_request!(AllReferencedHashes {} -> DbResult<Vec<Vec<u8>>> => |db, self| {
    let _ = self;
    db.all_referenced_hashes()
});

bus_request!(Begin {} -> DbResult<()> => |db, self| {
    let _ = self;
    db.begin()
});

bus_request!(Commit {} -> DbResult<()> => |db, self| {
    let _ = self;
    db.commit()
});

bus_request!(Rollback {} -> DbResult<()> => |db, self| {
    let _ = self;
    db.rollback()
});
