//! Tokio-facing binding onto the same worker thread `SyncBus` uses
//!: every call is handed to `spawn_blocking` so the
//! executor's worker threads are never stalled waiting on the single
//! database worker, and transactions are serialized with a
//! `tokio::sync::Mutex` rather than a `std::sync::Mutex` so holding the
//! permit across `.await` points never risks blocking a whole executor
//! thread.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use archiver_codec::EncodedObject;
use archiver_core::{ObjectKind, Timing};
use archiver_db::{AddSnapshotOutcome, DbResult, PlacementOutcome, ReactionEmoji, ReactionHistoryEntry, SearchHit, SnapshotRow};
use tokio::sync::Mutex;

use crate::error::{BusResult, WorkerGoneSnafu};
use crate::request::*;
use crate::sync_bus::SyncBus;

/// An `Arc`-shared handle onto the worker thread, safe to clone across
/// tasks. Each call hops onto a blocking-pool thread for the duration of
/// its round trip to the worker, then resumes the calling task.
#[derive(Clone)]
pub struct AsyncBus {
    inner: Arc<SyncBus>,
    tx_guard: Arc<Mutex<()>>,
}

impl AsyncBus {
    pub async fn open(path: impl AsRef<Path> + Send + 'static) -> BusResult<Self> {
        let inner = tokio::task::spawn_blocking(move || SyncBus::open(path))
            .await
            .map_err(|_| WorkerGoneSnafu.build())??;
        Ok(Self { inner: Arc::new(inner), tx_guard: Arc::new(Mutex::new(())) })
    }

    pub async fn open_in_memory() -> BusResult<Self> {
        let inner = tokio::task::spawn_blocking(SyncBus::open_in_memory).await.map_err(|_| WorkerGoneSnafu.build())??;
        Ok(Self { inner: Arc::new(inner), tx_guard: Arc::new(Mutex::new(())) })
    }

    /// Wraps an already-open `SyncBus`, letting a caller share the same
    /// worker thread between a `SyncBus`-typed consumer (e.g. a
    /// `FileRecordStore` bridge that must stay synchronous) and this
    /// `async`-facing handle.
    pub fn from_sync(inner: Arc<SyncBus>) -> Self {
        Self { inner, tx_guard: Arc::new(Mutex::new(())) }
    }

    pub async fn call<R, T>(&self, req: R) -> BusResult<T>
    where
        R: BusRequest<Response = DbResult<T>>,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.call(req)).await.map_err(|_| WorkerGoneSnafu.build())?
    }

    /// Runs `body` inside a single transaction spanning every bus call it
    /// makes, same semantics as `SyncBus::transaction` but
    /// holding the permit across `.await` rather than blocking a thread.
    pub async fn transaction<T, F, Fut>(&self, body: F) -> BusResult<T>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = BusResult<T>>,
    {
        let _permit = self.tx_guard.lock().await;
        self.call(Begin {}).await?;
        match body(self.clone()).await {
            Ok(value) => {
                self.call(Commit {}).await?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.call(Rollback {}).await;
                Err(err)
            }
        }
    }

    // -- Files --

    pub async fn file_hash(&self, url: &str) -> BusResult<Option<Option<Vec<u8>>>> {
        self.call(FileHash { url: url.to_owned() }).await
    }

    pub async fn record_file(&self, url: &str, hash: Option<&[u8]>, error_code: Option<&str>) -> BusResult<()> {
        self.call(RecordFile {
            url: url.to_owned(),
            hash: hash.map(<[u8]>::to_vec),
            error_code: error_code.map(str::to_owned),
        })
        .await
    }

    pub async fn is_hash_referenced(&self, hash: &[u8]) -> BusResult<bool> {
        self.call(IsHashReferenced { hash: hash.to_vec() }).await
    }

    pub async fn all_referenced_hashes(&self) -> BusResult<Vec<Vec<u8>>> {
        self.call(AllReferencedHashes {}).await
    }

    // -- Generic snapshot engine --

    pub async fn add_snapshot(
        &self,
        kind: ObjectKind,
        id: &str,
        parent_id: Option<&str>,
        timing: Timing,
        encoded: EncodedObject,
    ) -> BusResult<AddSnapshotOutcome> {
        self.call(AddSnapshot { kind, id: id.to_owned(), parent_id: parent_id.map(str::to_owned), timing, encoded }).await
    }

    pub async fn mark_deleted(&self, kind: ObjectKind, id: &str, timing: Timing) -> BusResult<bool> {
        self.call(MarkDeleted { kind, id: id.to_owned(), timing }).await
    }

    pub async fn get_latest(&self, kind: ObjectKind, id: &str) -> BusResult<Option<SnapshotRow>> {
        self.call(GetLatest { kind, id: id.to_owned() }).await
    }

    pub async fn get_at(&self, kind: ObjectKind, id: &str, at_ts_ms: i64) -> BusResult<Option<SnapshotRow>> {
        self.call(GetAt { kind, id: id.to_owned(), at_ts_ms }).await
    }

    pub async fn list_latest_by_parent(&self, kind: ObjectKind, parent_id: &str) -> BusResult<Vec<(String, SnapshotRow)>> {
        self.call(ListLatestByParent { kind, parent_id: parent_id.to_owned() }).await
    }

    pub async fn list_not_deleted_ids_by_parent(&self, kind: ObjectKind, parent_id: &str) -> BusResult<Vec<String>> {
        self.call(ListNotDeletedIdsByParent { kind, parent_id: parent_id.to_owned() }).await
    }

    // -- Server emoji --

    pub async fn add_server_emoji_snapshot(
        &self,
        id: &str,
        server_id: &str,
        timing: Timing,
        encoded: EncodedObject,
    ) -> BusResult<AddSnapshotOutcome> {
        self.call(AddServerEmojiSnapshot { id: id.to_owned(), server_id: server_id.to_owned(), timing, encoded }).await
    }

    // -- Members --

    pub async fn add_member_snapshot(
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
        .await
    }

    pub async fn mark_member_left(&self, server_id: &str, user_id: &str, timing: Timing) -> BusResult<AddSnapshotOutcome> {
        self.call(MarkMemberLeft { server_id: server_id.to_owned(), user_id: user_id.to_owned(), timing }).await
    }

    pub async fn sync_members(&self, server_id: &str, present_user_ids: &[String], timing: Timing) -> BusResult<usize> {
        self.call(SyncMembers { server_id: server_id.to_owned(), present_user_ids: present_user_ids.to_vec(), timing }).await
    }

    // -- Messages --

    #[allow(clippy::too_many_arguments)]
    pub async fn add_message_snapshot(
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
        .await
    }

    pub async fn add_message_attachments(&self, message_id: &str, attachments: Vec<(String, EncodedObject)>) -> BusResult<()> {
        self.call(AddMessageAttachments { message_id: message_id.to_owned(), attachments }).await
    }

    pub async fn search_messages(&self, query: &str, channel_id: Option<&str>, limit: u32) -> BusResult<Vec<SearchHit>> {
        self.call(SearchMessages { query: query.to_owned(), channel_id: channel_id.map(str::to_owned), limit }).await
    }

    // -- Attachments --

    pub async fn add_attachment(&self, message_id: &str, id: &str, encoded: EncodedObject) -> BusResult<bool> {
        self.call(AddAttachment { message_id: message_id.to_owned(), id: id.to_owned(), encoded }).await
    }

    // -- Webhook users --

    pub async fn resolve_webhook_user(&self, webhook_id: &str, username: &str, avatar_hash: Option<&str>) -> BusResult<i64> {
        self.call(ResolveWebhookUser {
            webhook_id: webhook_id.to_owned(),
            username: username.to_owned(),
            avatar_hash: avatar_hash.map(str::to_owned),
        })
        .await
    }

    // -- Reactions --

    pub async fn add_initial_reactions(
        &self,
        message_id: &str,
        timing: Timing,
        placements: Vec<(ReactionEmoji, u8, String, EncodedObject)>,
    ) -> BusResult<()> {
        self.call(AddInitialReactions { message_id: message_id.to_owned(), timing, placements }).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn add_reaction_placement(
        &self,
        message_id: &str,
        emoji: ReactionEmoji,
        reaction_type: u8,
        user_id: &str,
        timing: Timing,
        user_snapshot: Option<EncodedObject>,
    ) -> BusResult<PlacementOutcome> {
        self.call(AddReactionPlacement { message_id: message_id.to_owned(), emoji, reaction_type, user_id: user_id.to_owned(), timing, user_snapshot })
            .await
    }

    pub async fn mark_reaction_removed(
        &self,
        message_id: &str,
        emoji: ReactionEmoji,
        reaction_type: u8,
        user_id: &str,
        timing: Timing,
    ) -> BusResult<bool> {
        self.call(MarkReactionRemoved { message_id: message_id.to_owned(), emoji, reaction_type, user_id: user_id.to_owned(), timing }).await
    }

    pub async fn mark_reactions_removed_bulk(
        &self,
        message_id: &str,
        emoji: Option<ReactionEmoji>,
        reaction_type: Option<u8>,
        timing: Timing,
    ) -> BusResult<usize> {
        self.call(MarkReactionsRemovedBulk { message_id: message_id.to_owned(), emoji, reaction_type, timing }).await
    }

    pub async fn get_reaction_history(&self, message_id: &str) -> BusResult<Vec<ReactionHistoryEntry>> {
        self.call(GetReactionHistory { message_id: message_id.to_owned() }).await
    }
}

#[cfg(test)]
mod tests {
    use archiver_core::ObjectKind;

    use super::*;

    #[tokio::test]
    async fn round_trips_a_snapshot_through_spawn_blocking() {
        let bus = AsyncBus::open_in_memory().await.unwrap();
        assert!(bus.get_latest(ObjectKind::User, "1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_calls_do_not_deadlock_the_worker() {
        let bus = AsyncBus::open_in_memory().await.unwrap();
        let a = bus.clone();
        let b = bus.clone();
        let (ra, rb) = tokio::join!(
            a.mark_deleted(ObjectKind::User, "1", Timing::ZERO),
            b.mark_deleted(ObjectKind::User, "2", Timing::ZERO),
        );
        ra.unwrap();
        rb.unwrap();
    }

    #[tokio::test]
    async fn transaction_commits_across_an_await_point() {
        let bus = AsyncBus::open_in_memory().await.unwrap();
        bus.clone()
            .transaction(|tx| async move {
                tx.mark_member_left("server", "user", Timing::ZERO).await?;
                Ok(())
            })
            .await
            .unwrap();
    }
}
