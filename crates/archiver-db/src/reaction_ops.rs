//! Reaction placements: each `(message, emoji,
//! type, user)` combination is an interval — `start_timing` when first
//! observed, `end_timing` when observed removed. Re-adding after removal
//! opens a new interval rather than reusing the closed one.

use archiver_codec::EncodedObject;
use archiver_core::{ObjectKind, Timing};
use rusqlite::{Connection, OptionalExtension as _};
use snafu::ResultExt as _;

use crate::error::{DbResult, MissingMessageSnafu, MissingUserSnafu, SqliteSnafu};
use crate::snapshot_ops::{add_snapshot, get_latest};

/// A reaction emoji: either a custom server emoji (`id` set) or a unicode
/// emoji (`name` set, `id` absent).
#[derive(Debug, Clone)]
pub struct ReactionEmoji {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub animated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementOutcome {
    Inserted,
    AlreadyExists,
}

fn ensure_message_exists(conn: &Connection, message_id: &str) -> DbResult<()> {
    if get_latest(conn, ObjectKind::Message, message_id)?.is_none() {
        return MissingMessageSnafu { id: message_id }.fail();
    }
    Ok(())
}

/// `add_reaction_placement` requires the user to already have a snapshot
/// unless the caller hands one in to record now.
fn ensure_user(conn: &Connection, user_id: &str, timing: Timing, snapshot: Option<&EncodedObject>) -> DbResult<()> {
    if let Some(encoded) = snapshot {
        add_snapshot(conn, ObjectKind::User, user_id, None, timing, encoded)?;
        return Ok(());
    }
    if get_latest(conn, ObjectKind::User, user_id)?.is_none() {
        return MissingUserSnafu { id: user_id }.fail();
    }
    Ok(())
}

/// Bulk-insert placements Discord reports already present the first time
/// a message is snapshotted. Each user is recorded as a user snapshot
/// first; the emoji is registered in the side table when custom.
pub fn add_initial_reactions(
    conn: &Connection,
    message_id: &str,
    timing: Timing,
    placements: &[(ReactionEmoji, u8, String, EncodedObject)],
) -> DbResult<()> {
    ensure_message_exists(conn, message_id)?;
    for (emoji, reaction_type, user_id, user_snapshot) in placements {
        ensure_user(conn, user_id, timing, Some(user_snapshot))?;
        let emoji_id = resolve_emoji(conn, emoji)?;
        conn.execute(
            "INSERT OR IGNORE INTO reaction_placement
                (message_id, emoji_id, emoji_name, reaction_type, user_id, start_timing, end_timing)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
            rusqlite::params![message_id, emoji_id, emoji.name, reaction_type, user_id, timing.packed()],
        )
        .context(SqliteSnafu)?;
    }
    Ok(())
}

/// Open a placement interval. Idempotent: a duplicate gateway event for a
/// reaction already open reports `AlreadyExists` rather than erroring.
pub fn add_reaction_placement(
    conn: &Connection,
    message_id: &str,
    emoji: &ReactionEmoji,
    reaction_type: u8,
    user_id: &str,
    timing: Timing,
    user_snapshot: Option<&EncodedObject>,
) -> DbResult<PlacementOutcome> {
    ensure_message_exists(conn, message_id)?;
    ensure_user(conn, user_id, timing, user_snapshot)?;
    let emoji_id = resolve_emoji(conn, emoji)?;

    let already_open: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM reaction_placement
             WHERE message_id = ?1 AND emoji_id IS ?2 AND emoji_name IS ?3
               AND reaction_type = ?4 AND user_id = ?5 AND end_timing IS NULL",
            rusqlite::params![message_id, emoji_id, emoji.name, reaction_type, user_id],
            |row| row.get(0),
        )
        .optional()
        .context(SqliteSnafu)?;
    if already_open.is_some() {
        return Ok(PlacementOutcome::AlreadyExists);
    }

    conn.execute(
        "INSERT INTO reaction_placement
            (message_id, emoji_id, emoji_name, reaction_type, user_id, start_timing, end_timing)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
        rusqlite::params![message_id, emoji_id, emoji.name, reaction_type, user_id, timing.packed()],
    )
    .context(SqliteSnafu)?;
    Ok(PlacementOutcome::Inserted)
}

/// Close the open placement interval for a single `(message, emoji, type,
/// user)` tuple. Idempotent: a second call on an already-closed row
/// reports no change.
pub fn mark_reaction_removed(
    conn: &Connection,
    message_id: &str,
    emoji: &ReactionEmoji,
    reaction_type: u8,
    user_id: &str,
    timing: Timing,
) -> DbResult<bool> {
    let emoji_id = resolve_emoji(conn, emoji)?;
    let changed = conn
        .execute(
            "UPDATE reaction_placement SET end_timing = ?1
             WHERE message_id = ?2 AND emoji_id IS ?3 AND emoji_name IS ?4
               AND reaction_type = ?5 AND user_id = ?6 AND end_timing IS NULL",
            rusqlite::params![timing.packed(), message_id, emoji_id, emoji.name, reaction_type, user_id],
        )
        .context(SqliteSnafu)?;
    Ok(changed > 0)
}

/// Close every open placement for `(message, emoji_or_null, type)` — a
/// "remove all of this reaction" (or, with `emoji: None`, "remove all
/// reactions") gateway event.
pub fn mark_reactions_removed_bulk(
    conn: &Connection,
    message_id: &str,
    emoji: Option<&ReactionEmoji>,
    reaction_type: Option<u8>,
    timing: Timing,
) -> DbResult<usize> {
    let changed = match (emoji, reaction_type) {
        (Some(emoji), Some(reaction_type)) => {
            let emoji_id = resolve_emoji(conn, emoji)?;
            conn.execute(
                "UPDATE reaction_placement SET end_timing = ?1
                 WHERE message_id = ?2 AND emoji_id IS ?3 AND emoji_name IS ?4
                   AND reaction_type = ?5 AND end_timing IS NULL",
                rusqlite::params![timing.packed(), message_id, emoji_id, emoji.name, reaction_type],
            )
        }
        _ => conn.execute(
            "UPDATE reaction_placement SET end_timing = ?1
             WHERE message_id = ?2 AND end_timing IS NULL",
            rusqlite::params![timing.packed(), message_id],
        ),
    }
    .context(SqliteSnafu)?;
    Ok(changed)
}

pub struct ReactionHistoryEntry {
    pub user_id: String,
    pub reaction_type: u8,
    pub start: Timing,
    pub end: Option<Timing>,
}

/// Deterministically ordered by `(emoji_id, type, user_id, start)`.
pub fn get_reaction_history(conn: &Connection, message_id: &str) -> DbResult<Vec<ReactionHistoryEntry>> {
    let mut stmt = conn
        .prepare(
            "SELECT user_id, reaction_type, start_timing, end_timing
             FROM reaction_placement WHERE message_id = ?1
             ORDER BY emoji_id, emoji_name, reaction_type, user_id, start_timing",
        )
        .context(SqliteSnafu)?;
    let rows = stmt
        .query_map([message_id], |row| {
            Ok(ReactionHistoryEntry {
                user_id: row.get(0)?,
                reaction_type: row.get(1)?,
                start: Timing::from_packed(row.get(2)?),
                end: row.get::<_, Option<i64>>(3)?.map(Timing::from_packed),
            })
        })
        .context(SqliteSnafu)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context(SqliteSnafu)?);
    }
    Ok(out)
}

fn resolve_emoji(conn: &Connection, emoji: &ReactionEmoji) -> DbResult<Option<i64>> {
    let Some(id) = emoji.id else {
        return Ok(None);
    };
    let existing: Option<i64> = conn
        .query_row("SELECT id FROM reaction_emoji WHERE id = ?1", [id], |row| row.get(0))
        .optional()
        .context(SqliteSnafu)?;
    if existing.is_none() {
        conn.execute(
            "INSERT INTO reaction_emoji (id, name, animated) VALUES (?1, ?2, ?3)",
            rusqlite::params![id, emoji.name, emoji.animated],
        )
        .context(SqliteSnafu)?;
    }
    Ok(Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::bootstrap;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        bootstrap(&conn).unwrap();
        conn
    }

    fn empty_object() -> EncodedObject {
        EncodedObject {
            columns: Default::default(),
            extras: None,
        }
    }

    #[test]
    fn placement_without_message_is_missing_message() {
        let conn = open();
        let emoji = ReactionEmoji { id: None, name: Some("👍".into()), animated: false };
        let err = add_reaction_placement(&conn, "nonexistent", &emoji, 0, "user1", Timing::ZERO, Some(&empty_object()));
        assert!(matches!(err, Err(crate::error::DbError::MissingMessage { .. })));
    }

    #[test]
    fn repeated_placement_reports_already_exists() {
        let conn = open();
        add_snapshot(&conn, ObjectKind::Message, "msg1", Some("chan1"), Timing::ZERO, &empty_object()).unwrap();
        let emoji = ReactionEmoji { id: None, name: Some("👍".into()), animated: false };
        let first = add_reaction_placement(&conn, "msg1", &emoji, 0, "user1", Timing::ZERO, Some(&empty_object())).unwrap();
        let second = add_reaction_placement(&conn, "msg1", &emoji, 0, "user1", Timing::ZERO, None).unwrap();
        assert_eq!(first, PlacementOutcome::Inserted);
        assert_eq!(second, PlacementOutcome::AlreadyExists);
    }

    /// Full interval lifecycle for one emoji: an initial placement seen at
    /// snapshot time, a second user reacting later, the first user's
    /// reaction removed, a repeated removal being a no-op, then history
    /// ordered by user.
    #[test]
    fn reaction_lifecycle_reports_history_with_open_and_closed_intervals() {
        let conn = open();
        add_snapshot(&conn, ObjectKind::Message, "msg1", Some("chan1"), Timing::ZERO, &empty_object()).unwrap();
        let emoji = ReactionEmoji { id: None, name: Some("👍".into()), animated: false };

        add_initial_reactions(&conn, "msg1", Timing::new(0, true), &[(emoji.clone(), 0, "user1".to_string(), empty_object())]).unwrap();

        let placed = add_reaction_placement(&conn, "msg1", &emoji, 0, "user2", Timing::new(1, true), Some(&empty_object())).unwrap();
        assert_eq!(placed, PlacementOutcome::Inserted);

        let repeated = add_reaction_placement(&conn, "msg1", &emoji, 0, "user2", Timing::new(2, true), None).unwrap();
        assert_eq!(repeated, PlacementOutcome::AlreadyExists);

        let removed = mark_reaction_removed(&conn, "msg1", &emoji, 0, "user1", Timing::new(3, true)).unwrap();
        assert!(removed);
        let removed_again = mark_reaction_removed(&conn, "msg1", &emoji, 0, "user1", Timing::new(4, true)).unwrap();
        assert!(!removed_again);

        let history = get_reaction_history(&conn, "msg1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].user_id, "user1");
        assert_eq!(history[0].start, Timing::new(0, true));
        assert_eq!(history[0].end, Some(Timing::new(3, true)));
        assert_eq!(history[1].user_id, "user2");
        assert_eq!(history[1].start, Timing::new(1, true));
        assert_eq!(history[1].end, None);
    }

    #[test]
    fn removing_all_reactions_closes_every_open_interval() {
        let conn = open();
        add_snapshot(&conn, ObjectKind::Message, "msg1", Some("chan1"), Timing::ZERO, &empty_object()).unwrap();
        let thumbs = ReactionEmoji { id: None, name: Some("👍".into()), animated: false };
        let heart = ReactionEmoji { id: None, name: Some("❤".into()), animated: false };
        add_reaction_placement(&conn, "msg1", &thumbs, 0, "user1", Timing::new(0, true), Some(&empty_object())).unwrap();
        add_reaction_placement(&conn, "msg1", &heart, 0, "user2", Timing::new(1, true), Some(&empty_object())).unwrap();

        let closed = mark_reactions_removed_bulk(&conn, "msg1", None, None, Timing::new(2, true)).unwrap();
        assert_eq!(closed, 2);

        let history = get_reaction_history(&conn, "msg1").unwrap();
        assert!(history.iter().all(|entry| entry.end == Some(Timing::new(2, true))));
    }
}
