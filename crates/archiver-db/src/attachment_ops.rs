//! Attachments are never versioned: one immutable row per
//! id, inserted at most once.

use archiver_codec::{EncodedObject, column_names, schema_for};
use archiver_core::ObjectKind;
use rusqlite::{Connection, params_from_iter};
use snafu::ResultExt as _;

use crate::error::{DbResult, SqliteSnafu};
use crate::schema::non_key_columns;
use crate::sql_value::to_sql;

/// Insert an attachment if it isn't already recorded. Returns `true` if a
/// new row was inserted, `false` if it was already present.
pub fn add_attachment(conn: &Connection, message_id: &str, id: &str, encoded: &EncodedObject) -> DbResult<bool> {
    let cols = non_key_columns(column_names(schema_for(ObjectKind::Attachment)));
    let mut all_cols = vec!["id".to_string(), "message_id".to_string()];
    all_cols.extend(cols.iter().cloned());
    all_cols.push("extras".to_string());
    let placeholders: Vec<String> = (1..=all_cols.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT OR IGNORE INTO attachment ({}) VALUES ({})",
        all_cols.join(", "),
        placeholders.join(", ")
    );

    let mut owned = vec![
        archiver_codec::ColumnValue::Text(id.to_string()),
        archiver_codec::ColumnValue::Text(message_id.to_string()),
    ];
    for col in &cols {
        owned.push(
            encoded
                .columns
                .get(col)
                .cloned()
                .unwrap_or(archiver_codec::ColumnValue::Null),
        );
    }
    owned.push(
        encoded
            .extras
            .as_ref()
            .map_or(archiver_codec::ColumnValue::Null, |v| {
                archiver_codec::ColumnValue::Text(v.to_string())
            }),
    );
    let params: Vec<_> = owned.iter().map(to_sql).collect();
    let changed = conn.execute(&sql, params_from_iter(params)).context(SqliteSnafu)?;
    Ok(changed > 0)
}

pub fn list_attachments_by_message(conn: &Connection, message_id: &str) -> DbResult<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT id FROM attachment WHERE message_id = ?1")
        .context(SqliteSnafu)?;
    let rows = stmt
        .query_map([message_id], |row| row.get::<_, String>(0))
        .context(SqliteSnafu)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context(SqliteSnafu)?);
    }
    Ok(out)
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
    fn second_insert_of_same_id_is_ignored() {
        let conn = open();
        let encoded = EncodedObject {
            columns: Default::default(),
            extras: None,
        };
        assert!(add_attachment(&conn, "msg1", "att1", &encoded).unwrap());
        assert!(!add_attachment(&conn, "msg1", "att1", &encoded).unwrap());
        assert_eq!(list_attachments_by_message(&conn, "msg1").unwrap(), vec!["att1"]);
    }
}
