//! Message-specific snapshot wiring: author attribution, `message_reference` id compression, and
//! attachment insertion sit in front of the generic snapshot engine.
//!
//! `Int64AsString` columns (ids, snowflakes) are stored as plain `INTEGER`
//! (see `archiver-codec::scalar`); only the JSON boundary renders them as
//! decimal strings, so everything here works in `i64`.

use archiver_codec::{ColumnValue, EncodedObject};
use archiver_core::{ObjectKind, Snowflake, Timing};
use rusqlite::{Connection, OptionalExtension as _};
use snafu::ResultExt as _;

use crate::attachment_ops::add_attachment;
use crate::error::{DbResult, MessageSnowflakeSnafu, MissingParentChannelSnafu, SqliteSnafu, TimestampSnowflakeMismatchSnafu};
use crate::snapshot_ops::{AddSnapshotOutcome, add_snapshot};
use crate::webhook_ops::resolve_webhook_user;

/// What the caller observed about a message's author, before synthetic
/// webhook-id resolution.
pub struct AuthorInfo<'a> {
    pub webhook_id: Option<&'a str>,
    pub real_user_id: i64,
    pub webhook_username: &'a str,
    pub webhook_avatar_hash: Option<&'a str>,
}

/// Resolve the value `author__id` should carry: the real user id unless
/// this is a genuine webhook post, in which case a synthetic webhook-user
/// id is looked up or minted.
pub fn resolve_author_id(conn: &Connection, author: &AuthorInfo<'_>, application_id: Option<&str>) -> DbResult<i64> {
    let is_webhook = author.webhook_id.is_some_and(|id| Some(id) != application_id);
    if !is_webhook {
        return Ok(author.real_user_id);
    }
    let webhook_id = author.webhook_id.expect("is_webhook implies webhook_id is Some");
    resolve_webhook_user(conn, webhook_id, author.webhook_username, author.webhook_avatar_hash)
}

/// Compress a `message_reference.channel_id` for storage:
/// `0` if it names this message's own channel, `1` if it names the parent
/// channel of the thread this message lives in, else the explicit id.
pub fn compress_reference_channel(conn: &Connection, this_channel_id: i64, reference_channel_id: i64) -> DbResult<i64> {
    if reference_channel_id == this_channel_id {
        return Ok(0);
    }
    if let Some(parent) = thread_parent_id(conn, this_channel_id)? {
        if parent == reference_channel_id {
            return Ok(1);
        }
    }
    Ok(reference_channel_id)
}

/// Expand a stored `message_reference.channel_id` back to an explicit id.
pub fn expand_reference_channel(conn: &Connection, this_channel_id: i64, stored: i64) -> DbResult<i64> {
    match stored {
        0 => Ok(this_channel_id),
        1 => Ok(thread_parent_id(conn, this_channel_id)?.unwrap_or(this_channel_id)),
        explicit => Ok(explicit),
    }
}

/// Compress a `message_reference.guild_id` for storage: `0` if it names
/// this message's own server, else the explicit id.
pub fn compress_reference_server(this_server_id: i64, reference_server_id: i64) -> i64 {
    if reference_server_id == this_server_id { 0 } else { reference_server_id }
}

pub fn expand_reference_server(this_server_id: i64, stored: i64) -> i64 {
    if stored == 0 { this_server_id } else { stored }
}

fn thread_parent_id(conn: &Connection, channel_id: i64) -> DbResult<Option<i64>> {
    conn.query_row(
        "SELECT parent_id FROM thread_immutable WHERE id = ?1",
        [channel_id.to_string()],
        |row| row.get(0),
    )
    .optional()
    .context(SqliteSnafu)
}

/// No message may be recorded against a channel or thread that has never
/// itself been snapshotted.
fn ensure_parent_channel_exists(conn: &Connection, channel_id: i64) -> DbResult<()> {
    let id = channel_id.to_string();
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM channel_immutable WHERE id = ?1
             UNION ALL
             SELECT 1 FROM thread_immutable WHERE id = ?1",
            [&id],
            |row| row.get(0),
        )
        .optional()
        .context(SqliteSnafu)?;
    if exists.is_none() {
        return MissingParentChannelSnafu { id }.fail();
    }
    Ok(())
}

/// `timestamp` must equal the creation time embedded in `message_id`'s
/// snowflake bits; a mismatch means the two were never observed together
/// and is treated as fatal rather than silently stored.
fn ensure_timestamp_matches_snowflake(message_id: &str, encoded: &EncodedObject) -> DbResult<()> {
    let Some(ColumnValue::Integer(timestamp_ms)) = encoded.columns.get("timestamp") else {
        return Ok(());
    };
    let snowflake: Snowflake = message_id
        .parse()
        .context(MessageSnowflakeSnafu { id: message_id.to_string() })?;
    let snowflake_ms = snowflake.timestamp_ms();
    if *timestamp_ms != snowflake_ms {
        return TimestampSnowflakeMismatchSnafu {
            id: message_id.to_string(),
            timestamp_ms: *timestamp_ms,
            snowflake_ms,
        }
        .fail();
    }
    Ok(())
}

/// Record a message snapshot, applying author-id resolution and
/// `message_reference` compression to the already-encoded object before
/// delegating to the generic snapshot engine. `message_id` is the
/// snowflake as a decimal string — the primary-key representation every
/// other snapshot operation uses.
pub fn add_message_snapshot(
    conn: &Connection,
    message_id: &str,
    channel_id: i64,
    server_id: Option<i64>,
    mut encoded: EncodedObject,
    author: &AuthorInfo<'_>,
    application_id: Option<&str>,
    timing: Timing,
) -> DbResult<AddSnapshotOutcome> {
    ensure_parent_channel_exists(conn, channel_id)?;
    ensure_timestamp_matches_snowflake(message_id, &encoded)?;

    let resolved_author = resolve_author_id(conn, author, application_id)?;
    encoded.columns.insert("author__id".to_string(), ColumnValue::Integer(resolved_author));

    if let Some(ColumnValue::Integer(raw_channel)) = encoded.columns.get("message_reference__channel_id").cloned() {
        let compressed = compress_reference_channel(conn, channel_id, raw_channel)?;
        encoded
            .columns
            .insert("message_reference__channel_id".to_string(), ColumnValue::Integer(compressed));
        if let (Some(server_id), Some(ColumnValue::Integer(raw_server))) = (
            server_id,
            encoded.columns.get("message_reference__server_id").cloned(),
        ) {
            let compressed_server = compress_reference_server(server_id, raw_server);
            encoded
                .columns
                .insert("message_reference__server_id".to_string(), ColumnValue::Integer(compressed_server));
        }
    }

    add_snapshot(conn, ObjectKind::Message, message_id, Some(&channel_id.to_string()), timing, &encoded)
}

/// Record every attachment carried in a message's `extras.attachments`
/// array.
pub fn add_message_attachments(conn: &Connection, message_id: &str, attachments: &[(String, EncodedObject)]) -> DbResult<()> {
    for (attachment_id, encoded) in attachments {
        add_attachment(conn, message_id, attachment_id, encoded)?;
    }
    Ok(())
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

    #[test]
    fn non_webhook_author_keeps_the_real_user_id() {
        let conn = open();
        let author = AuthorInfo {
            webhook_id: None,
            real_user_id: 111,
            webhook_username: "",
            webhook_avatar_hash: None,
        };
        assert_eq!(resolve_author_id(&conn, &author, None).unwrap(), 111);
    }

    #[test]
    fn webhook_author_resolves_to_a_synthetic_id() {
        let conn = open();
        let author = AuthorInfo {
            webhook_id: Some("webhook1"),
            real_user_id: 0,
            webhook_username: "Relay Bot",
            webhook_avatar_hash: None,
        };
        let resolved = resolve_author_id(&conn, &author, None).unwrap();
        assert_ne!(resolved, 0);
    }

    #[test]
    fn application_owned_webhook_id_is_treated_as_a_real_user() {
        let conn = open();
        let author = AuthorInfo {
            webhook_id: Some("app1"),
            real_user_id: 222,
            webhook_username: "",
            webhook_avatar_hash: None,
        };
        assert_eq!(resolve_author_id(&conn, &author, Some("app1")).unwrap(), 222);
    }

    #[test]
    fn same_channel_reference_compresses_to_zero() {
        let conn = open();
        assert_eq!(compress_reference_channel(&conn, 1, 1).unwrap(), 0);
        assert_eq!(expand_reference_channel(&conn, 1, 0).unwrap(), 1);
    }

    /// A reply whose referenced message was itself posted by a webhook:
    /// both the referenced message and the reply get their own snapshots,
    /// and the webhook author resolves to the same synthetic user id both
    /// times so the two rows agree on who posted the original message.
    #[test]
    fn reply_to_a_webhook_message_records_both_snapshots_under_one_author() {
        let conn = open();
        let channel = EncodedObject {
            columns: std::collections::BTreeMap::from([("type".to_string(), ColumnValue::Integer(0))]),
            extras: None,
        };
        add_snapshot(&conn, ObjectKind::Channel, "5", None, Timing::new(1, true), &channel).unwrap();

        let webhook_author = AuthorInfo {
            webhook_id: Some("webhook1"),
            real_user_id: 0,
            webhook_username: "Relay Bot",
            webhook_avatar_hash: None,
        };

        let referenced = EncodedObject {
            columns: std::collections::BTreeMap::from([("content".to_string(), ColumnValue::Text("original".to_string()))]),
            extras: None,
        };
        add_message_snapshot(&conn, "100", 5, None, referenced, &webhook_author, None, Timing::new(1, true)).unwrap();

        let mut reply = EncodedObject {
            columns: std::collections::BTreeMap::from([("content".to_string(), ColumnValue::Text("replying".to_string()))]),
            extras: None,
        };
        reply.columns.insert("message_reference__channel_id".to_string(), ColumnValue::Integer(5));
        reply.columns.insert("message_reference__message_id".to_string(), ColumnValue::Integer(100));
        let regular_author = AuthorInfo { webhook_id: None, real_user_id: 222, webhook_username: "", webhook_avatar_hash: None };
        add_message_snapshot(&conn, "101", 5, None, reply, &regular_author, None, Timing::new(2, true)).unwrap();

        let referenced_row = crate::snapshot_ops::get_latest(&conn, ObjectKind::Message, "100").unwrap().unwrap();
        let reply_row = crate::snapshot_ops::get_latest(&conn, ObjectKind::Message, "101").unwrap().unwrap();

        let synthetic_author = resolve_author_id(&conn, &webhook_author, None).unwrap();
        assert_eq!(referenced_row.columns.get("author__id"), Some(&ColumnValue::Integer(synthetic_author)));
        assert_eq!(
            reply_row.columns.get("message_reference__channel_id"),
            Some(&ColumnValue::Integer(0)),
            "same-channel reference compresses to zero"
        );
        assert_eq!(expand_reference_channel(&conn, 5, 0).unwrap(), 5);
    }

    #[test]
    fn adding_a_message_for_an_unknown_channel_is_rejected() {
        let conn = open();
        let author = AuthorInfo { webhook_id: None, real_user_id: 1, webhook_username: "", webhook_avatar_hash: None };
        let encoded = EncodedObject { columns: std::collections::BTreeMap::new(), extras: None };
        let err = add_message_snapshot(&conn, "100", 999, None, encoded, &author, None, Timing::new(1, true));
        assert!(err.is_err(), "channel 999 has never itself been snapshotted");
    }

    #[test]
    fn timestamp_not_matching_the_snowflakes_embedded_time_is_fatal() {
        let conn = open();
        let channel = EncodedObject {
            columns: std::collections::BTreeMap::from([("type".to_string(), ColumnValue::Integer(0))]),
            extras: None,
        };
        add_snapshot(&conn, ObjectKind::Channel, "5", None, Timing::new(1, true), &channel).unwrap();

        let author = AuthorInfo { webhook_id: None, real_user_id: 1, webhook_username: "", webhook_avatar_hash: None };
        let mut encoded = EncodedObject { columns: std::collections::BTreeMap::new(), extras: None };
        encoded.columns.insert("timestamp".to_string(), ColumnValue::Integer(0));
        let err = add_message_snapshot(&conn, "100", 5, None, encoded, &author, None, Timing::new(1, true));
        assert!(err.is_err(), "snowflake 100 decodes to a non-zero epoch, not ms=0");
    }
}
