//! Server emoji carries one relaxed immutable comparator: the uploader id may be unknown (null) on either side; a
//! mismatch is only fatal when both sides name an uploader and disagree.
//! Every other immutable column uses the generic strict check.

use archiver_codec::{ColumnValue, EncodedObject};
use archiver_core::{ObjectKind, Timing};
use rusqlite::{Connection, OptionalExtension as _};
use snafu::ResultExt as _;

use crate::error::{DbResult, EmojiUploaderMismatchSnafu, SqliteSnafu};
use crate::snapshot_ops::{AddSnapshotOutcome, add_snapshot};

pub fn add_server_emoji_snapshot(
    conn: &Connection,
    id: &str,
    parent_id: &str,
    timing: Timing,
    mut encoded: EncodedObject,
) -> DbResult<AddSnapshotOutcome> {
    let stored: Option<Option<i64>> = conn
        .query_row(
            "SELECT uploaded_by FROM server_emoji_immutable WHERE id = ?1",
            [id],
            |row| row.get(0),
        )
        .optional()
        .context(SqliteSnafu)?;

    if let Some(stored_uploader) = stored {
        let new_uploader = match encoded.columns.get("uploaded_by") {
            Some(ColumnValue::Integer(n)) => Some(*n),
            _ => None,
        };
        match (stored_uploader, new_uploader) {
            (Some(stored_id), Some(new_id)) if stored_id != new_id => {
                return EmojiUploaderMismatchSnafu {
                    id: id.to_string(),
                    stored: stored_id.to_string(),
                    new: new_id.to_string(),
                }
                .fail();
            }
            _ => {
                // One side (or both) unknown, or they agree: carry the
                // known value through so the generic strict check in
                // `add_snapshot` sees identical stored/new values.
                let resolved = stored_uploader.or(new_uploader);
                encoded.columns.insert(
                    "uploaded_by".to_string(),
                    resolved.map_or(ColumnValue::Null, ColumnValue::Integer),
                );
            }
        }
    }

    add_snapshot(conn, ObjectKind::ServerEmoji, id, Some(parent_id), timing, &encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::bootstrap;
    use std::collections::BTreeMap;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        bootstrap(&conn).unwrap();
        conn
    }

    fn encoded_with_uploader(uploader: Option<i64>) -> EncodedObject {
        let mut columns = BTreeMap::new();
        columns.insert(
            "uploaded_by".to_string(),
            uploader.map_or(ColumnValue::Null, ColumnValue::Integer),
        );
        columns.insert("animated".to_string(), ColumnValue::Integer(0));
        EncodedObject { columns, extras: None }
    }

    #[test]
    fn unknown_uploader_on_either_side_is_tolerated() {
        let conn = open();
        add_server_emoji_snapshot(&conn, "e1", "server1", Timing::new(1, true), encoded_with_uploader(Some(9))).unwrap();
        let outcome = add_server_emoji_snapshot(&conn, "e1", "server1", Timing::new(2, true), encoded_with_uploader(None)).unwrap();
        assert_eq!(outcome, AddSnapshotOutcome::SameAsLatest);
    }

    #[test]
    fn conflicting_known_uploaders_are_fatal() {
        let conn = open();
        add_server_emoji_snapshot(&conn, "e1", "server1", Timing::new(1, true), encoded_with_uploader(Some(9))).unwrap();
        let err = add_server_emoji_snapshot(&conn, "e1", "server1", Timing::new(2, true), encoded_with_uploader(Some(10)));
        assert!(matches!(err, Err(crate::error::DbError::EmojiUploaderMismatch { .. })));
    }
}
