//! Synthetic identity for webhook-posted messages: webhook messages carry a `(webhook_id, username,
//! avatar_hash)` triple instead of a real user id, so we mint and reuse a
//! local synthetic id keyed on that triple.

use rusqlite::{Connection, OptionalExtension as _};
use snafu::ResultExt as _;

use crate::error::{DbResult, SqliteSnafu};

/// Look up or create the synthetic webhook-user id for this
/// `(webhook_id, username, avatar_hash)` triple.
pub fn resolve_webhook_user(
    conn: &Connection,
    webhook_id: &str,
    username: &str,
    avatar_hash: Option<&str>,
) -> DbResult<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM webhook_user WHERE webhook_id = ?1 AND username = ?2
             AND avatar_hash IS ?3",
            rusqlite::params![webhook_id, username, avatar_hash],
            |row| row.get(0),
        )
        .optional()
        .context(SqliteSnafu)?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO webhook_user (webhook_id, username, avatar_hash) VALUES (?1, ?2, ?3)",
        rusqlite::params![webhook_id, username, avatar_hash],
    )
    .context(SqliteSnafu)?;
    Ok(conn.last_insert_rowid())
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
    fn same_triple_reuses_the_same_id() {
        let conn = open();
        let a = resolve_webhook_user(&conn, "wh1", "Bot", Some("abc")).unwrap();
        let b = resolve_webhook_user(&conn, "wh1", "Bot", Some("abc")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_username_gets_a_different_id() {
        let conn = open();
        let a = resolve_webhook_user(&conn, "wh1", "Bot", None).unwrap();
        let b = resolve_webhook_user(&conn, "wh1", "OtherBot", None).unwrap();
        assert_ne!(a, b);
    }
}
