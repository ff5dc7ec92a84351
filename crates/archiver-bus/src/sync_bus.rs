//! In-process, blocking binding onto the worker thread:
//! every call parks the calling thread on a `std::sync::mpsc` reply
//! channel until the worker has run it to completion.

use std::path::Path;
use std::sync::Mutex;
use std::sync::mpsc;

use archiver_codec::EncodedObject;
use archiver_core::{ObjectKind, Timing};
use archiver_db::{AddSnapshotOutcome, DbResult, PlacementOutcome, ReactionEmoji, ReactionHistoryEntry, SearchHit, SnapshotRow};
use snafu::ResultExt as _;

use crate::error::{BusResult, DbSnafu, WorkerGoneSnafu};
use crate::request::*;
use crate::worker::{Job, Worker};

/// A connection to the archive database, bound to its own dedicated
/// worker thread. Cloning is intentionally not supported — callers that
/// need to share a `SyncBus` across threads wrap it in an `Arc` instead.
pub struct SyncBus {
    worker: Worker,
    tx_guard: Mutex<()>,
}

impl SyncBus {
    pub fn open(path: impl AsRef<Path>) -> BusResult<Self> {
        let db = archiver_db::Database::open(path).context(DbSnafu)?;
        Ok(Self::from_database(db))
    }

    pub fn open_in_memory() -> BusResult<Self> {
        let db = archiver_db::Database::open_in_memory().context(DbSnafu)?;
        Ok(Self::from_database(db))
    }

    fn from_database(db: archiver_db::Database) -> Self {
        Self { worker: Worker::spawn(db), tx_guard: Mutex::new(()) }
    }

    /// Dispatches `req` to the worker and blocks for its reply, flattening
    /// worker-gone failures and the request's own `DbResult` into a single
    /// `BusResult`.
    pub fn call<R, T>(&self, req: R) -> BusResult<T>
    where
        R: BusRequest<Response = DbResult<T>>,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::channel();
        let job: Job = Box::new(move |db| {
            let _ = reply_tx.send(req.run(db));
        });
        self.worker.submit(job).map_err(|_| WorkerGoneSnafu.build())?;
        reply_rx.recv().map_err(|_| WorkerGoneSnafu.build())?.context(DbSnafu)
    }

    /// Runs `body` inside a single SQLite transaction that spans every
    /// bus call `body` makes. The mutex held for the
    /// duration is what gives the transaction atomicity against other
    /// `SyncBus` callers: the worker itself has no notion of "which
    /// transaction a message belongs to", so nothing may interleave
    /// messages from a second transaction while this one is open.
    pub fn transaction<T>(&self, body: impl FnOnce(&Self) -> BusResult<T>) -> BusResult<T> {
        let _permit = self.tx_guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.call(Begin {})?;
        match body(self) {
            Ok(value) => {
                self.call(Commit {})?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.call(Rollback {});
                Err(err)
            }
        }
    }

    // -- Files --

    pub fn file_hash(&self, url: &str) -> BusResult<Option<Option<Vec<u8>>>> {
        self.call(FileHash { url: url.to_owned() })
    }

    pub fn record_file(&self, url: &str, hash: Option<&[u8]>, error_code: Option<&str>) -> BusResult<()> {
        self.call(RecordFile {
            url: url.to_owned(),
            hash: hash.map(<[u8]>::to_vec),
            error_code: error_code.map(str::to_owned),
        })
    }

    pub fn is_hash_referenced(&self, hash: &[u8]) -> BusResult<bool> {
        self.call(IsHashReferenced { hash: hash.to_vec() })
    }

    pub fn all_referenced_hashes(&self) -> BusResult<Vec<Vec<u8>>> {
        self.call(AllReferencedHashes {})
    }

    // -- Generic snapshot engine --

    pub fn add_snapshot(
        &self,
        kind: ObjectKind,
        id: &str,
        parent_id: Option<&str>,
        timing: Timing,
        encoded: EncodedObject,
    ) -> BusResult<AddSnapshotOutcome> {
        self.call(AddSnapshot { kind, id: id.to_owned(), parent_id: parent_id.map(str::to_owned), timing, encoded })
    }

    pub fn mark_deleted(&self, kind: ObjectKind, id: &str, timing: Timing) -> BusResult<bool> {
        self.call(MarkDeleted { kind, id: id.to_owned(), timing })
    }

    pub fn get_latest(&self, kind: ObjectKind, id: &str) -> BusResult<Option<SnapshotRow>> {
        self.call(GetLatest { kind, id: id.to_owned() })
    }

    pub fn get_at(&self, kind: ObjectKind, id: &str, at_ts_ms: i64) -> BusResult<Option<SnapshotRow>> {
        self.call(GetAt { kind, id: id.to_owned(), at_ts_ms })
    }

    pub fn list_latest_by_parent(&self, kind: ObjectKind, parent_id: &str) -> BusResult<Vec<(String, SnapshotRow)>> {
        self.call(ListLatestByParent { kind, parent_id: parent_id.to_owned() })
    }

    pub fn list_not_deleted_ids_by_parent(&self, kind: ObjectKind, parent_id: &str) -> BusResult<Vec<String>> {
        self.call(ListNotDeletedIdsByParent { kind, parent_id: parent_id.to_owned() })
    }

    // -- Server emoji --

    pub fn add_server_emoji_snapshot(
        &self,
        id: &str,
        server_id: &str,
        timing: Timing,
        encoded: EncodedObject,
    ) -> BusResult<AddSnapshotOutcome> {
        self.call(AddServerEmojiSnapshot { id: id.to_owned(), server_id: server_id.to_owned(), timing, encoded })
    }

    // -- Members --

    pub fn add_member_snapshot(
        &self,
        server_id: &str,
        user_id: &str,
        timing: Timing,
        encoded: EncodedObject,
        partial_fields: &[&str],
    ) -> BusResult<AddSnapshotOutcome> {
        self.call(AddMemberSnapshot {
            server_id: server_id.to_owned(),
            user_id: user_id.to_owned(),
            timing,
            encoded,
            partial_fields: partial_fields.iter().map(|s| (*s).to_owned()).collect(),
        })
    }

    pub fn mark_member_left(&self, server_id: &str, user_id: &str, timing: Timing) -> BusResult<AddSnapshotOutcome> {
        self.call(MarkMemberLeft { server_id: server_id.to_owned(), user_id: user_id.to_owned(), timing })
    }

    pub fn sync_members(&self, server_id: &str, present_user_ids: &[String], timing: Timing) -> BusResult<usize> {
        self.call(SyncMembers { server_id: server_id.to_owned(), present_user_ids: present_user_ids.to_vec(), timing })
    }

    // -- Messages --

    #[allow(clippy::too_many_arguments)]
    pub fn add_message_snapshot(
        &self,
        message_id: &str,
        channel_id: i64,
        server_id: Option<i64>,
        encoded: EncodedObject,
        author: OwnedAuthorInfo,
        application_id: Option<&str>,
        timing: Timing,
    ) -> BusResult<AddSnapshotOutcome> {
        self.call(AddMessageSnapshot {
            message_id: message_id.to_owned(),
            channel_id,
            server_id,
            encoded,
            author,
            application_id: application_id.map(str::to_owned),
            timing,
        })
    }

    pub fn add_message_attachments(&self, message_id: &str, attachments: Vec<(String, EncodedObject)>) -> BusResult<()> {
        self.call(AddMessageAttachments { message_id: message_id.to_owned(), attachments })
    }

    pub fn search_messages(&self, query: &str, channel_id: Option<&str>, limit: u32) -> BusResult<Vec<SearchHit>> {
        self.call(SearchMessages { query: query.to_owned(), channel_id: channel_id.map(str::to_owned), limit })
    }

    // -- Attachments --

    pub fn add_attachment(&self, message_id: &str, id: &str, encoded: EncodedObject) -> BusResult<bool> {
        self.call(AddAttachment { message_id: message_id.to_owned(), id: id.to_owned(), encoded })
    }

    // -- Webhook users --

    pub fn resolve_webhook_user(&self, webhook_id: &str, username: &str, avatar_hash: Option<&str>) -> BusResult<i64> {
        self.call(ResolveWebhookUser {
            webhook_id: webhook_id.to_owned(),
            username: username.to_owned(),
            avatar_hash: avatar_hash.map(str::to_owned),
        })
    }

    // -- Reactions --

    pub fn add_initial_reactions(
        &self,
        message_id: &str,
        timing: Timing,
        placements: Vec<(ReactionEmoji, u8, String, EncodedObject)>,
    ) -> BusResult<()> {
        self.call(AddInitialReactions { message_id: message_id.to_owned(), timing, placements })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_reaction_placement(
        &self,
        message_id: &str,
        emoji: ReactionEmoji,
        reaction_type: u8,
        user_id: &str,
        timing: Timing,
        user_snapshot: Option<EncodedObject>,
    ) -> BusResult<PlacementOutcome> {
        self.call(AddReactionPlacement { message_id: message_id.to_owned(), emoji, reaction_type, user_id: user_id.to_owned(), timing, user_snapshot })
    }

    pub fn mark_reaction_removed(
        &self,
        message_id: &str,
        emoji: ReactionEmoji,
        reaction_type: u8,
        user_id: &str,
        timing: Timing,
    ) -> BusResult<bool> {
        self.call(MarkReactionRemoved { message_id: message_id.to_owned(), emoji, reaction_type, user_id: user_id.to_owned(), timing })
    }

    pub fn mark_reactions_removed_bulk(
        &self,
        message_id: &str,
        emoji: Option<ReactionEmoji>,
        reaction_type: Option<u8>,
        timing: Timing,
    ) -> BusResult<usize> {
        self.call(MarkReactionsRemovedBulk { message_id: message_id.to_owned(), emoji, reaction_type, timing })
    }

    pub fn get_reaction_history(&self, message_id: &str) -> BusResult<Vec<ReactionHistoryEntry>> {
        self.call(GetReactionHistory { message_id: message_id.to_owned() })
    }
}

#[cfg(test)]
mod tests {
    use archiver_core::ObjectKind;

    use super::*;

    #[test]
    fn round_trips_a_snapshot_through_the_worker_thread() {
        let bus = SyncBus::open_in_memory().unwrap();
        assert!(bus.get_latest(ObjectKind::User, "1").unwrap().is_none());
    }

    #[test]
    fn transaction_commits_on_ok_and_is_visible_after() {
        let bus = SyncBus::open_in_memory().unwrap();
        bus.transaction(|tx| {
            tx.mark_member_left("server", "user", Timing::ZERO)?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn transaction_rolls_back_on_err() {
        let bus = SyncBus::open_in_memory().unwrap();
        let result: BusResult<()> = bus.transaction(|_tx| Err(WorkerGoneSnafu.build()));
        assert!(result.is_err());
    }
}
