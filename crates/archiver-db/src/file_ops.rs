//! The `files` auxiliary table: one row per acquired
//! URL, recording either its content hash or a permanent error code.

use rusqlite::{Connection, OptionalExtension as _};
use snafu::ResultExt as _;

use crate::error::{DbResult, SqliteSnafu};

pub fn file_hash(conn: &Connection, url: &str) -> DbResult<Option<Option<Vec<u8>>>> {
    conn.query_row("SELECT content_hash FROM file WHERE url = ?1", [url], |row| row.get(0))
        .optional()
        .context(SqliteSnafu)
}

/// Idempotently record the outcome of acquiring `url`: either a content
/// hash (successful download) or a permanent error code.
pub fn record_file(conn: &Connection, url: &str, hash: Option<&[u8]>, error_code: Option<&str>) -> DbResult<()> {
    conn.execute(
        "INSERT INTO file (url, content_hash, error_code) VALUES (?1, ?2, ?3)
         ON CONFLICT (url) DO UPDATE SET content_hash = excluded.content_hash, error_code = excluded.error_code",
        rusqlite::params![url, hash, error_code],
    )
    .context(SqliteSnafu)?;
    Ok(())
}

/// Whether any `file` row currently points at `hash` — used by the file
/// store's crash-reconciliation pass to decide whether an
/// orphaned pending download should be promoted or deleted.
pub fn is_hash_referenced(conn: &Connection, hash: &[u8]) -> DbResult<bool> {
    conn.query_row("SELECT 1 FROM file WHERE content_hash = ?1 LIMIT 1", [hash], |_| Ok(()))
        .optional()
        .context(SqliteSnafu)
        .map(|row| row.is_some())
}

/// Every content hash currently referenced by a `file` row, for the
/// consistency check that compares on-disk blobs against
/// the set of hashes the database actually points at.
pub fn all_referenced_hashes(conn: &Connection) -> DbResult<Vec<Vec<u8>>> {
    conn.prepare("SELECT content_hash FROM file WHERE content_hash IS NOT NULL")
        .context(SqliteSnafu)?
        .query_map([], |row| row.get::<_, Vec<u8>>(0))
        .context(SqliteSnafu)?
        .collect::<Result<Vec<_>, _>>()
        .context(SqliteSnafu)
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
    fn record_then_lookup_round_trips() {
        let conn = open();
        record_file(&conn, "https://cdn/a.png", Some(&[1, 2, 3]), None).unwrap();
        assert_eq!(file_hash(&conn, "https://cdn/a.png").unwrap(), Some(Some(vec![1, 2, 3])));
        assert_eq!(file_hash(&conn, "https://cdn/missing").unwrap(), None);
    }

    #[test]
    fn re_recording_overwrites() {
        let conn = open();
        record_file(&conn, "https://cdn/a.png", None, Some("404")).unwrap();
        record_file(&conn, "https://cdn/a.png", Some(&[9]), None).unwrap();
        assert_eq!(file_hash(&conn, "https://cdn/a.png").unwrap(), Some(Some(vec![9])));
    }

    #[test]
    fn referenced_hashes_excludes_error_only_rows() {
        let conn = open();
        record_file(&conn, "https://cdn/a.png", Some(&[1]), None).unwrap();
        record_file(&conn, "https://cdn/b.png", None, Some("404")).unwrap();
        assert_eq!(all_referenced_hashes(&conn).unwrap(), vec![vec![1]]);
    }
}
