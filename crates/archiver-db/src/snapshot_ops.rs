//! Generic snapshot engine for the eight object kinds keyed by a single
//! `TEXT` id column. `Member`
//! (composite key) and `Attachment` (never versioned) have their own
//! dedicated modules.

use std::collections::BTreeMap;

use archiver_codec::{ColumnValue, EncodedObject, immutable_column_names, mutable_column_names, schema_for};
use archiver_core::{ObjectKind, Timing};
use rusqlite::{Connection, OptionalExtension as _, params_from_iter};
use snafu::ResultExt as _;
use tracing::debug;

use crate::equality::normalize_extras_for_equality;
use crate::error::{DbResult, ImmutableViolationSnafu, NonMonotonicTimingSnafu, SqliteSnafu};
use crate::schema::{non_key_columns, table_names};
use crate::sql_value::{from_value_ref, to_sql};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddSnapshotOutcome {
    AddedFirstSnapshot,
    AddedAnotherSnapshot,
    SameAsLatest,
}

#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub timing: Timing,
    pub deleted_timing: Option<Timing>,
    pub columns: BTreeMap<String, ColumnValue>,
    pub extras: Option<serde_json::Value>,
}

/// Insert or update a snapshot for `id`, following the add-snapshot
/// algorithm. `parent_id` is the owning server/channel for
/// children listings; pass `None` for top-level kinds (user, server).
pub fn add_snapshot(
    conn: &Connection,
    kind: ObjectKind,
    id: &str,
    parent_id: Option<&str>,
    timing: Timing,
    encoded: &EncodedObject,
) -> DbResult<AddSnapshotOutcome> {
    let schema = schema_for(kind);
    let immutable_cols = non_key_columns(immutable_column_names(schema));
    let mutable_cols = mutable_column_names(schema);
    let (immutable_table, latest_table, previous_table) = table_names(kind);

    let existing_immutable = fetch_row(conn, &immutable_table, "id", id, &immutable_cols)?;

    let extras_text = encoded.extras.as_ref().map(|v| v.to_string());

    let Some(existing_immutable) = existing_immutable else {
        insert_row(conn, &immutable_table, "id", id, &immutable_cols, &encoded.columns)?;
        insert_latest(
            conn,
            &latest_table,
            id,
            parent_id,
            timing,
            &mutable_cols,
            &encoded.columns,
            extras_text.as_deref(),
        )?;
        debug!(target: crate::error::LOG_TARGET, %kind, id, "first snapshot");
        return Ok(AddSnapshotOutcome::AddedFirstSnapshot);
    };

    for col in &immutable_cols {
        let stored = &existing_immutable[col];
        let new = encoded.columns.get(col).unwrap_or(&ColumnValue::Null);
        if stored != new {
            return ImmutableViolationSnafu {
                kind: kind.as_str(),
                id: id.to_string(),
                column: col.clone(),
                stored: format!("{stored:?}"),
                new: format!("{new:?}"),
            }
            .fail();
        }
    }

    let Some(latest) = fetch_latest_row(conn, &latest_table, id, &mutable_cols)? else {
        // Immutable row exists with no latest row: shouldn't happen in
        // practice, treat as a fresh snapshot.
        insert_latest(
            conn,
            &latest_table,
            id,
            parent_id,
            timing,
            &mutable_cols,
            &encoded.columns,
            extras_text.as_deref(),
        )?;
        return Ok(AddSnapshotOutcome::AddedFirstSnapshot);
    };

    let same_mutable = mutable_cols
        .iter()
        .all(|c| latest.columns.get(c) == encoded.columns.get(c));
    let same_extras = normalize_extras_for_equality(kind, latest.extras.as_ref())
        == normalize_extras_for_equality(kind, encoded.extras.as_ref());

    if same_mutable && same_extras {
        return Ok(AddSnapshotOutcome::SameAsLatest);
    }

    if timing.packed() <= latest.timing.packed() {
        return NonMonotonicTimingSnafu {
            kind: kind.as_str(),
            id: id.to_string(),
            latest_packed: latest.timing.packed(),
            new_packed: timing.packed(),
        }
        .fail();
    }

    copy_latest_to_previous(conn, &previous_table, id, &latest, &mutable_cols)?;
    update_latest(
        conn,
        &latest_table,
        id,
        timing,
        &mutable_cols,
        &encoded.columns,
        extras_text.as_deref(),
    )?;
    Ok(AddSnapshotOutcome::AddedAnotherSnapshot)
}

/// Set the tombstone timing on the latest snapshot. Idempotent: returns
/// `false` if it was already deleted.
pub fn mark_deleted(conn: &Connection, kind: ObjectKind, id: &str, timing: Timing) -> DbResult<bool> {
    let (_, latest_table, _) = table_names(kind);
    let changed = conn
        .execute(
            &format!(
                "UPDATE {latest_table} SET deleted_timing = ?1 WHERE id = ?2 AND deleted_timing IS NULL"
            ),
            rusqlite::params![timing.packed(), id],
        )
        .context(SqliteSnafu)?;
    Ok(changed > 0)
}

pub fn get_latest(conn: &Connection, kind: ObjectKind, id: &str) -> DbResult<Option<SnapshotRow>> {
    let (_, latest_table, _) = table_names(kind);
    let mutable_cols = mutable_column_names(schema_for(kind));
    fetch_latest_row(conn, &latest_table, id, &mutable_cols)
}

/// Walk-back-in-history lookup.
pub fn get_at(conn: &Connection, kind: ObjectKind, id: &str, at_ts_ms: i64) -> DbResult<Option<SnapshotRow>> {
    let bound = Timing::upper_bound_at(at_ts_ms);
    let Some(latest) = get_latest(conn, kind, id)? else {
        return Ok(None);
    };
    if latest.timing.packed() <= bound {
        return Ok(Some(latest));
    }
    let (_, _, previous_table) = table_names(kind);
    let mutable_cols = mutable_column_names(schema_for(kind));
    fetch_previous_at_or_before(conn, &previous_table, id, bound, &mutable_cols)
}

pub fn list_latest_by_parent(conn: &Connection, kind: ObjectKind, parent_id: &str) -> DbResult<Vec<(String, SnapshotRow)>> {
    let (_, latest_table, _) = table_names(kind);
    let mutable_cols = mutable_column_names(schema_for(kind));
    let select_cols: Vec<String> = std::iter::once("id".to_string())
        .chain(std::iter::once("timing".to_string()))
        .chain(std::iter::once("deleted_timing".to_string()))
        .chain(mutable_cols.iter().cloned())
        .chain(std::iter::once("extras".to_string()))
        .collect();
    let sql = format!(
        "SELECT {} FROM {latest_table} WHERE parent_id = ?1",
        select_cols.join(", ")
    );
    let mut stmt = conn.prepare(&sql).context(SqliteSnafu)?;
    let rows = stmt
        .query_map([parent_id], |row| row_to_snapshot(row, &mutable_cols))
        .context(SqliteSnafu)?;
    let mut out = Vec::new();
    for row in rows {
        let (id, snap) = row.context(SqliteSnafu)?;
        out.push((id, snap));
    }
    Ok(out)
}

pub fn list_not_deleted_ids_by_parent(conn: &Connection, kind: ObjectKind, parent_id: &str) -> DbResult<Vec<String>> {
    let (_, latest_table, _) = table_names(kind);
    let mut stmt = conn
        .prepare(&format!(
            "SELECT id FROM {latest_table} WHERE parent_id = ?1 AND deleted_timing IS NULL"
        ))
        .context(SqliteSnafu)?;
    let rows = stmt
        .query_map([parent_id], |row| row.get::<_, String>(0))
        .context(SqliteSnafu)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context(SqliteSnafu)?);
    }
    Ok(out)
}

fn row_to_snapshot(row: &rusqlite::Row<'_>, mutable_cols: &[String]) -> rusqlite::Result<(String, SnapshotRow)> {
    let id: String = row.get("id")?;
    let timing = Timing::from_packed(row.get::<_, i64>("timing")?);
    let deleted_timing = row
        .get::<_, Option<i64>>("deleted_timing")?
        .map(Timing::from_packed);
    let mut columns = BTreeMap::new();
    for col in mutable_cols {
        columns.insert(col.clone(), from_value_ref(row.get_ref(col.as_str())?));
    }
    let extras: Option<String> = row.get("extras")?;
    let extras = extras.and_then(|s| serde_json::from_str(&s).ok());
    Ok((
        id,
        SnapshotRow {
            timing,
            deleted_timing,
            columns,
            extras,
        },
    ))
}

fn fetch_row(
    conn: &Connection,
    table: &str,
    key_col: &str,
    key: &str,
    columns: &[String],
) -> DbResult<Option<BTreeMap<String, ColumnValue>>> {
    if columns.is_empty() {
        // Still probe for existence when a kind has no immutable columns
        // beyond the key itself.
        let exists: Option<i64> = conn
            .query_row(
                &format!("SELECT 1 FROM {table} WHERE {key_col} = ?1"),
                [key],
                |row| row.get(0),
            )
            .optional()
            .context(SqliteSnafu)?;
        return Ok(exists.map(|_| BTreeMap::new()));
    }
    let sql = format!(
        "SELECT {} FROM {table} WHERE {key_col} = ?1",
        columns.join(", ")
    );
    let found = conn
        .query_row(&sql, [key], |row| {
            let mut out = BTreeMap::new();
            for (i, col) in columns.iter().enumerate() {
                out.insert(col.clone(), from_value_ref(row.get_ref(i)?));
            }
            Ok(out)
        })
        .optional()
        .context(SqliteSnafu)?;
    Ok(found)
}

fn fetch_latest_row(
    conn: &Connection,
    latest_table: &str,
    id: &str,
    mutable_cols: &[String],
) -> DbResult<Option<SnapshotRow>> {
    let select_cols: Vec<String> = std::iter::once("timing".to_string())
        .chain(std::iter::once("deleted_timing".to_string()))
        .chain(mutable_cols.iter().cloned())
        .chain(std::iter::once("extras".to_string()))
        .collect();
    let sql = format!("SELECT {} FROM {latest_table} WHERE id = ?1", select_cols.join(", "));
    conn.query_row(&sql, [id], |row| {
        let timing = Timing::from_packed(row.get::<_, i64>("timing")?);
        let deleted_timing = row
            .get::<_, Option<i64>>("deleted_timing")?
            .map(Timing::from_packed);
        let mut columns = BTreeMap::new();
        for col in mutable_cols {
            columns.insert(col.clone(), from_value_ref(row.get_ref(col.as_str())?));
        }
        let extras: Option<String> = row.get("extras")?;
        Ok(SnapshotRow {
            timing,
            deleted_timing,
            columns,
            extras: extras.and_then(|s| serde_json::from_str(&s).ok()),
        })
    })
    .optional()
    .context(SqliteSnafu)
}

fn fetch_previous_at_or_before(
    conn: &Connection,
    previous_table: &str,
    id: &str,
    bound: i64,
    mutable_cols: &[String],
) -> DbResult<Option<SnapshotRow>> {
    let select_cols: Vec<String> = std::iter::once("timing".to_string())
        .chain(mutable_cols.iter().cloned())
        .chain(std::iter::once("extras".to_string()))
        .collect();
    let sql = format!(
        "SELECT {} FROM {previous_table} WHERE id = ?1 AND timing <= ?2 ORDER BY timing DESC LIMIT 1",
        select_cols.join(", ")
    );
    conn.query_row(&sql, rusqlite::params![id, bound], |row| {
        let timing = Timing::from_packed(row.get::<_, i64>("timing")?);
        let mut columns = BTreeMap::new();
        for col in mutable_cols {
            columns.insert(col.clone(), from_value_ref(row.get_ref(col.as_str())?));
        }
        let extras: Option<String> = row.get("extras")?;
        Ok(SnapshotRow {
            timing,
            deleted_timing: None,
            columns,
            extras: extras.and_then(|s| serde_json::from_str(&s).ok()),
        })
    })
    .optional()
    .context(SqliteSnafu)
}

fn insert_row(
    conn: &Connection,
    table: &str,
    key_col: &str,
    key: &str,
    columns: &[String],
    values: &BTreeMap<String, ColumnValue>,
) -> DbResult<()> {
    let mut cols = vec![key_col.to_string()];
    cols.extend(columns.iter().cloned());
    let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        cols.join(", "),
        placeholders.join(", ")
    );
    let mut owned: Vec<ColumnValue> = vec![ColumnValue::Text(key.to_string())];
    for col in columns {
        owned.push(values.get(col).cloned().unwrap_or(ColumnValue::Null));
    }
    let params: Vec<_> = owned.iter().map(to_sql).collect();
    conn.execute(&sql, params_from_iter(params)).context(SqliteSnafu)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn insert_latest(
    conn: &Connection,
    latest_table: &str,
    id: &str,
    parent_id: Option<&str>,
    timing: Timing,
    mutable_cols: &[String],
    values: &BTreeMap<String, ColumnValue>,
    extras: Option<&str>,
) -> DbResult<()> {
    let mut cols = vec!["id".to_string(), "parent_id".to_string(), "timing".to_string()];
    cols.extend(mutable_cols.iter().cloned());
    cols.push("extras".to_string());
    let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {latest_table} ({}) VALUES ({})",
        cols.join(", "),
        placeholders.join(", ")
    );
    let parent_value = match parent_id {
        Some(p) => ColumnValue::Text(p.to_string()),
        None => ColumnValue::Null,
    };
    let extras_value = match extras {
        Some(s) => ColumnValue::Text(s.to_string()),
        None => ColumnValue::Null,
    };
    let mut owned: Vec<ColumnValue> = vec![
        ColumnValue::Text(id.to_string()),
        parent_value,
        ColumnValue::Integer(timing.packed()),
    ];
    for col in mutable_cols {
        owned.push(values.get(col).cloned().unwrap_or(ColumnValue::Null));
    }
    owned.push(extras_value);
    let params: Vec<_> = owned.iter().map(to_sql).collect();
    conn.execute(&sql, params_from_iter(params)).context(SqliteSnafu)?;
    Ok(())
}

fn copy_latest_to_previous(
    conn: &Connection,
    previous_table: &str,
    id: &str,
    latest: &SnapshotRow,
    mutable_cols: &[String],
) -> DbResult<()> {
    let mut cols = vec!["id".to_string(), "timing".to_string()];
    cols.extend(mutable_cols.iter().cloned());
    cols.push("extras".to_string());
    let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {previous_table} ({}) VALUES ({})",
        cols.join(", "),
        placeholders.join(", ")
    );
    let mut owned: Vec<ColumnValue> = vec![
        ColumnValue::Text(id.to_string()),
        ColumnValue::Integer(latest.timing.packed()),
    ];
    for col in mutable_cols {
        owned.push(latest.columns.get(col).cloned().unwrap_or(ColumnValue::Null));
    }
    owned.push(match &latest.extras {
        Some(v) => ColumnValue::Text(v.to_string()),
        None => ColumnValue::Null,
    });
    let params: Vec<_> = owned.iter().map(to_sql).collect();
    conn.execute(&sql, params_from_iter(params)).context(SqliteSnafu)?;
    Ok(())
}

fn update_latest(
    conn: &Connection,
    latest_table: &str,
    id: &str,
    timing: Timing,
    mutable_cols: &[String],
    values: &BTreeMap<String, ColumnValue>,
    extras: Option<&str>,
) -> DbResult<()> {
    let mut sets = vec!["timing = ?1".to_string()];
    let mut owned: Vec<ColumnValue> = vec![ColumnValue::Integer(timing.packed())];
    let mut idx = 2;
    for col in mutable_cols {
        sets.push(format!("{col} = ?{idx}"));
        owned.push(values.get(col).cloned().unwrap_or(ColumnValue::Null));
        idx += 1;
    }
    sets.push(format!("extras = ?{idx}"));
    owned.push(match extras {
        Some(s) => ColumnValue::Text(s.to_string()),
        None => ColumnValue::Null,
    });
    idx += 1;
    let sql = format!("UPDATE {latest_table} SET {} WHERE id = ?{idx}", sets.join(", "));
    owned.push(ColumnValue::Text(id.to_string()));
    let params: Vec<_> = owned.iter().map(to_sql).collect();
    conn.execute(&sql, params_from_iter(params)).context(SqliteSnafu)?;
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

    fn server_encoded(name: &str) -> EncodedObject {
        EncodedObject {
            columns: BTreeMap::from([
                ("name".to_string(), ColumnValue::Text(name.to_string())),
                ("owner_id".to_string(), ColumnValue::Text("1001".to_string())),
            ]),
            extras: None,
        }
    }

    #[test]
    fn first_server_snapshot_is_added_then_resending_is_a_no_op() {
        let conn = open();
        let encoded = server_encoded("Archiver Test Server");

        let outcome = add_snapshot(
            &conn,
            ObjectKind::Server,
            "1367557310418784356",
            None,
            Timing::new(1000, false),
            &encoded,
        )
        .unwrap();
        assert_eq!(outcome, AddSnapshotOutcome::AddedFirstSnapshot);

        let latest = get_latest(&conn, ObjectKind::Server, "1367557310418784356").unwrap().unwrap();
        assert_eq!(latest.columns.get("name"), Some(&ColumnValue::Text("Archiver Test Server".to_string())));

        let outcome = add_snapshot(
            &conn,
            ObjectKind::Server,
            "1367557310418784356",
            None,
            Timing::new(2000, false),
            &encoded,
        )
        .unwrap();
        assert_eq!(outcome, AddSnapshotOutcome::SameAsLatest);
    }

    #[test]
    fn changed_mutable_field_adds_another_snapshot_and_keeps_history() {
        let conn = open();
        add_snapshot(&conn, ObjectKind::Server, "1", None, Timing::new(1000, false), &server_encoded("Old Name")).unwrap();

        let outcome = add_snapshot(&conn, ObjectKind::Server, "1", None, Timing::new(2000, false), &server_encoded("New Name")).unwrap();
        assert_eq!(outcome, AddSnapshotOutcome::AddedAnotherSnapshot);

        let latest = get_latest(&conn, ObjectKind::Server, "1").unwrap().unwrap();
        assert_eq!(latest.columns.get("name"), Some(&ColumnValue::Text("New Name".to_string())));

        let at_first = get_at(&conn, ObjectKind::Server, "1", 1500).unwrap().unwrap();
        assert_eq!(at_first.columns.get("name"), Some(&ColumnValue::Text("Old Name".to_string())));
    }

    fn user_encoded(username: &str, bot: bool) -> EncodedObject {
        EncodedObject {
            columns: BTreeMap::from([
                ("bot".to_string(), ColumnValue::Integer(i64::from(bot))),
                ("username".to_string(), ColumnValue::Text(username.to_string())),
                ("discriminator".to_string(), ColumnValue::Text("0".to_string())),
            ]),
            extras: None,
        }
    }

    #[test]
    fn changing_an_immutable_column_is_rejected() {
        let conn = open();
        add_snapshot(&conn, ObjectKind::User, "1", None, Timing::new(1000, false), &user_encoded("alice", false)).unwrap();

        let err = add_snapshot(&conn, ObjectKind::User, "1", None, Timing::new(2000, false), &user_encoded("alice", true));
        assert!(err.is_err(), "bot is immutable on User; flipping it must be rejected");
    }

    #[test]
    fn mutable_username_change_does_not_trip_the_immutable_check() {
        let conn = open();
        add_snapshot(&conn, ObjectKind::User, "1", None, Timing::new(1000, false), &user_encoded("alice", false)).unwrap();

        let outcome = add_snapshot(&conn, ObjectKind::User, "1", None, Timing::new(2000, false), &user_encoded("alice2", false)).unwrap();
        assert_eq!(outcome, AddSnapshotOutcome::AddedAnotherSnapshot);
    }

    #[test]
    fn a_changed_snapshot_at_or_before_the_latest_timing_is_rejected() {
        let conn = open();
        add_snapshot(&conn, ObjectKind::Server, "1", None, Timing::new(2000, false), &server_encoded("Old Name")).unwrap();

        let err = add_snapshot(&conn, ObjectKind::Server, "1", None, Timing::new(2000, false), &server_encoded("New Name"));
        assert!(err.is_err(), "same timing with a changed mutable field must not silently overwrite history");

        let err = add_snapshot(&conn, ObjectKind::Server, "1", None, Timing::new(1000, false), &server_encoded("New Name"));
        assert!(err.is_err(), "a timing strictly before latest must not overwrite history");

        let latest = get_latest(&conn, ObjectKind::Server, "1").unwrap().unwrap();
        assert_eq!(latest.columns.get("name"), Some(&ColumnValue::Text("Old Name".to_string())));
    }

    #[test]
    fn mark_deleted_is_idempotent() {
        let conn = open();
        add_snapshot(&conn, ObjectKind::Server, "1", None, Timing::new(1000, false), &server_encoded("Name")).unwrap();

        assert!(mark_deleted(&conn, ObjectKind::Server, "1", Timing::new(2000, false)).unwrap());
        assert!(!mark_deleted(&conn, ObjectKind::Server, "1", Timing::new(3000, false)).unwrap());
    }
}
