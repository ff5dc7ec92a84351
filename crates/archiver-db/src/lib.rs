//! SQLite-backed snapshot engine: a `Database`
//! wraps a single `rusqlite::Connection` and exposes the operations the
//! request bus dispatches onto its single-writer worker.

mod attachment_ops;
mod equality;
pub mod error;
mod file_ops;
mod fts_ops;
mod member_ops;
mod message_ops;
mod reaction_ops;
mod schema;
mod server_emoji_ops;
mod snapshot_ops;
mod sql_value;
mod webhook_ops;

use std::path::Path;

use archiver_codec::EncodedObject;
use archiver_core::{ObjectKind, Timing};
use rusqlite::Connection;
use snafu::ResultExt as _;

pub use attachment_ops::list_attachments_by_message;
pub use error::{DbError, DbResult};
pub use fts_ops::SearchHit;
pub use member_ops::get_latest_member;
pub use message_ops::{AuthorInfo, expand_reference_channel, expand_reference_server};
pub use reaction_ops::{PlacementOutcome, ReactionEmoji, ReactionHistoryEntry};
pub use snapshot_ops::{AddSnapshotOutcome, SnapshotRow};

use error::{LOG_TARGET, SqliteSnafu};

/// A handle to the archive's SQLite database. Not `Sync`-safe by itself —
/// the request bus serializes all access onto a single worker thread,
/// the one writer allowed to touch the connection.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let conn = Connection::open(path).context(SqliteSnafu)?;
        schema::bootstrap(&conn)?;
        tracing::debug!(target: LOG_TARGET, "database opened");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory().context(SqliteSnafu)?;
        schema::bootstrap(&conn)?;
        Ok(Self { conn })
    }

    /// Run `body` inside a SQLite transaction, committing on success and
    /// rolling back on error — the single-connection analogue of the
    /// request bus's `transaction(body)`.
    pub fn transaction<T>(&mut self, body: impl FnOnce(&Connection) -> DbResult<T>) -> DbResult<T> {
        let tx = self.conn.transaction().context(SqliteSnafu)?;
        let result = body(&tx)?;
        tx.commit().context(SqliteSnafu)?;
        Ok(result)
    }

    /// Raw `BEGIN`/`COMMIT`/`ROLLBACK` used by the request bus's worker,
    /// which spans a single SQLite transaction across several separately
    /// queued messages rather than one Rust closure — the
    /// `rusqlite::Transaction` guard's borrow can't be held across that.
    pub fn begin(&self) -> DbResult<()> {
        self.conn.execute_batch("BEGIN").context(SqliteSnafu)?;
        Ok(())
    }

    pub fn commit(&self) -> DbResult<()> {
        self.conn.execute_batch("COMMIT").context(SqliteSnafu)?;
        Ok(())
    }

    pub fn rollback(&self) -> DbResult<()> {
        self.conn.execute_batch("ROLLBACK").context(SqliteSnafu)?;
        Ok(())
    }

    // -- Files --

    pub fn file_hash(&self, url: &str) -> DbResult<Option<Option<Vec<u8>>>> {
        file_ops::file_hash(&self.conn, url)
    }

    pub fn record_file(&self, url: &str, hash: Option<&[u8]>, error_code: Option<&str>) -> DbResult<()> {
        file_ops::record_file(&self.conn, url, hash, error_code)
    }

    pub fn all_referenced_hashes(&self) -> DbResult<Vec<Vec<u8>>> {
        file_ops::all_referenced_hashes(&self.conn)
    }

    pub fn is_hash_referenced(&self, hash: &[u8]) -> DbResult<bool> {
        file_ops::is_hash_referenced(&self.conn, hash)
    }

    // -- Generic snapshot engine (every kind but Member/Attachment) --

    pub fn add_snapshot(
        &self,
        kind: ObjectKind,
        id: &str,
        parent_id: Option<&str>,
        timing: Timing,
        encoded: &EncodedObject,
    ) -> DbResult<AddSnapshotOutcome> {
        snapshot_ops::add_snapshot(&self.conn, kind, id, parent_id, timing, encoded)
    }

    pub fn mark_deleted(&self, kind: ObjectKind, id: &str, timing: Timing) -> DbResult<bool> {
        snapshot_ops::mark_deleted(&self.conn, kind, id, timing)
    }

    pub fn get_latest(&self, kind: ObjectKind, id: &str) -> DbResult<Option<SnapshotRow>> {
        snapshot_ops::get_latest(&self.conn, kind, id)
    }

    pub fn get_at(&self, kind: ObjectKind, id: &str, at_ts_ms: i64) -> DbResult<Option<SnapshotRow>> {
        snapshot_ops::get_at(&self.conn, kind, id, at_ts_ms)
    }

    pub fn list_latest_by_parent(&self, kind: ObjectKind, parent_id: &str) -> DbResult<Vec<(String, SnapshotRow)>> {
        snapshot_ops::list_latest_by_parent(&self.conn, kind, parent_id)
    }

    pub fn list_not_deleted_ids_by_parent(&self, kind: ObjectKind, parent_id: &str) -> DbResult<Vec<String>> {
        snapshot_ops::list_not_deleted_ids_by_parent(&self.conn, kind, parent_id)
    }

    // -- Server emoji (relaxed uploader comparator) --

    pub fn add_server_emoji_snapshot(
        &self,
        id: &str,
        server_id: &str,
        timing: Timing,
        encoded: EncodedObject,
    ) -> DbResult<AddSnapshotOutcome> {
        server_emoji_ops::add_server_emoji_snapshot(&self.conn, id, server_id, timing, encoded)
    }

    // -- Members --

    pub fn add_member_snapshot(
        &self,
        server_id: &str,
        user_id: &str,
        timing: Timing,
        encoded: &EncodedObject,
        partial_fields: &[&str],
    ) -> DbResult<AddSnapshotOutcome> {
        member_ops::add_member_snapshot(&self.conn, server_id, user_id, timing, encoded, partial_fields)
    }

    pub fn mark_member_left(&self, server_id: &str, user_id: &str, timing: Timing) -> DbResult<AddSnapshotOutcome> {
        member_ops::mark_member_left(&self.conn, server_id, user_id, timing)
    }

    pub fn sync_members(&self, server_id: &str, present_user_ids: &[String], timing: Timing) -> DbResult<usize> {
        member_ops::sync_members(&self.conn, server_id, present_user_ids, timing)
    }

    // -- Messages --

    #[allow(clippy::too_many_arguments)]
    pub fn add_message_snapshot(
        &self,
        message_id: &str,
        channel_id: i64,
        server_id: Option<i64>,
        encoded: EncodedObject,
        author: &AuthorInfo<'_>,
        application_id: Option<&str>,
        timing: Timing,
    ) -> DbResult<AddSnapshotOutcome> {
        message_ops::add_message_snapshot(
            &self.conn,
            message_id,
            channel_id,
            server_id,
            encoded,
            author,
            application_id,
            timing,
        )
    }

    pub fn add_message_attachments(&self, message_id: &str, attachments: &[(String, EncodedObject)]) -> DbResult<()> {
        message_ops::add_message_attachments(&self.conn, message_id, attachments)
    }

    pub fn search_messages(&self, query: &str, channel_id: Option<&str>, limit: u32) -> DbResult<Vec<SearchHit>> {
        fts_ops::search_messages(&self.conn, query, channel_id, limit)
    }

    // -- Attachments --

    pub fn add_attachment(&self, message_id: &str, id: &str, encoded: &EncodedObject) -> DbResult<bool> {
        attachment_ops::add_attachment(&self.conn, message_id, id, encoded)
    }

    // -- Webhook users --

    pub fn resolve_webhook_user(&self, webhook_id: &str, username: &str, avatar_hash: Option<&str>) -> DbResult<i64> {
        webhook_ops::resolve_webhook_user(&self.conn, webhook_id, username, avatar_hash)
    }

    // -- Reactions --

    pub fn add_initial_reactions(
        &self,
        message_id: &str,
        timing: Timing,
        placements: &[(ReactionEmoji, u8, String, EncodedObject)],
    ) -> DbResult<()> {
        reaction_ops::add_initial_reactions(&self.conn, message_id, timing, placements)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_reaction_placement(
        &self,
        message_id: &str,
        emoji: &ReactionEmoji,
        reaction_type: u8,
        user_id: &str,
        timing: Timing,
        user_snapshot: Option<&EncodedObject>,
    ) -> DbResult<PlacementOutcome> {
        reaction_ops::add_reaction_placement(&self.conn, message_id, emoji, reaction_type, user_id, timing, user_snapshot)
    }

    pub fn mark_reaction_removed(
        &self,
        message_id: &str,
        emoji: &ReactionEmoji,
        reaction_type: u8,
        user_id: &str,
        timing: Timing,
    ) -> DbResult<bool> {
        reaction_ops::mark_reaction_removed(&self.conn, message_id, emoji, reaction_type, user_id, timing)
    }

    pub fn mark_reactions_removed_bulk(
        &self,
        message_id: &str,
        emoji: Option<&ReactionEmoji>,
        reaction_type: Option<u8>,
        timing: Timing,
    ) -> DbResult<usize> {
        reaction_ops::mark_reactions_removed_bulk(&self.conn, message_id, emoji, reaction_type, timing)
    }

    pub fn get_reaction_history(&self, message_id: &str) -> DbResult<Vec<ReactionHistoryEntry>> {
        reaction_ops::get_reaction_history(&self.conn, message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_and_bootstraps_an_in_memory_database() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_latest(ObjectKind::User, "1").unwrap().is_none());
    }

    #[test]
    fn reopening_an_existing_file_does_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.db");
        {
            let _db = Database::open(&path).unwrap();
        }
        let _db2 = Database::open(&path).unwrap();
    }
}
