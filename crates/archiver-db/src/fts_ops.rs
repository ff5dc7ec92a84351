//! Full-text search over message content, backed by SQLite's FTS5 module — the same virtual
//! table approach as a plain external-content FTS5 index, kept in sync
//! with `message_latest` via triggers rather than application code.

use rusqlite::Connection;
use snafu::ResultExt as _;

use crate::error::{DbResult, SqliteSnafu};

pub(crate) fn create_fts_tables(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS message_fts_index USING fts5(
            content,
            content = 'message_latest',
            content_rowid = 'rowid'
        );
        CREATE TRIGGER IF NOT EXISTS message_fts_ai AFTER INSERT ON message_latest BEGIN
            INSERT INTO message_fts_index(rowid, content) VALUES (new.rowid, new.content);
        END;
        CREATE TRIGGER IF NOT EXISTS message_fts_ad AFTER DELETE ON message_latest BEGIN
            INSERT INTO message_fts_index(message_fts_index, rowid, content) VALUES ('delete', old.rowid, old.content);
        END;
        CREATE TRIGGER IF NOT EXISTS message_fts_au AFTER UPDATE ON message_latest BEGIN
            INSERT INTO message_fts_index(message_fts_index, rowid, content) VALUES ('delete', old.rowid, old.content);
            INSERT INTO message_fts_index(rowid, content) VALUES (new.rowid, new.content);
        END;",
    )
    .context(SqliteSnafu)?;
    Ok(())
}

pub struct SearchHit {
    pub message_id: String,
    pub channel_id: Option<String>,
}

/// Full-text search, optionally scoped to a channel. A channel scope must
/// also surface thread messages parented under it, so the join resolves a
/// thread's owning channel through `thread_immutable.parent_id` with a
/// `COALESCE` rather than running a second query per hit.
pub fn search_messages(conn: &Connection, query: &str, channel_id: Option<&str>, limit: u32) -> DbResult<Vec<SearchHit>> {
    let sql = "SELECT m.id, m.parent_id
         FROM message_fts_index f
         JOIN message_latest m ON m.rowid = f.rowid
         LEFT JOIN thread_immutable t ON t.id = m.parent_id
         WHERE message_fts_index MATCH ?1
           AND (?2 IS NULL OR COALESCE(t.parent_id, m.parent_id) = ?2)
         ORDER BY rank
         LIMIT ?3";
    let mut stmt = conn.prepare(sql).context(SqliteSnafu)?;
    let rows = stmt
        .query_map(rusqlite::params![query, channel_id, limit], |row| {
            Ok(SearchHit {
                message_id: row.get(0)?,
                channel_id: row.get(1)?,
            })
        })
        .context(SqliteSnafu)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context(SqliteSnafu)?);
    }
    Ok(out)
}
