//! Member snapshot operations:
//! composite-keyed by `(server_id, user_id)`, with partial-update support
//! for the voice-only `deaf`/`mute` fields. Unlike every other kind,
//! members have no previous-snapshots partition — the newest row always
//! wins and no history is kept.

use std::collections::BTreeMap;

use archiver_codec::{ColumnValue, EncodedObject, mutable_column_names, schema_for};
use archiver_core::{ObjectKind, Timing};
use rusqlite::{Connection, OptionalExtension as _, params_from_iter};
use snafu::ResultExt as _;

use crate::error::{DbResult, PartialNoSnapshotSnafu, SqliteSnafu};
use crate::snapshot_ops::{AddSnapshotOutcome, SnapshotRow};
use crate::sql_value::{from_value_ref, to_sql};

fn mutable_cols() -> Vec<String> {
    mutable_column_names(schema_for(ObjectKind::Member))
}

/// Fields a member snapshot may legitimately be missing even on its very
/// first observation: voice state Discord doesn't report until a member
/// actually joins a voice channel.
const OPTIONAL_ON_FIRST_SNAPSHOT: &[&str] = &["deaf", "mute"];

/// Add or update a member snapshot. `partial_fields` names the fields the
/// caller actually observed; everything else is filled in from the
/// previous snapshot — this is how `deaf`/`mute`
/// survive updates that don't carry voice state.
pub fn add_member_snapshot(
    conn: &Connection,
    server_id: &str,
    user_id: &str,
    timing: Timing,
    encoded: &EncodedObject,
    partial_fields: &[&str],
) -> DbResult<AddSnapshotOutcome> {
    let cols = mutable_cols();
    let previous = fetch_latest(conn, server_id, user_id, &cols)?;

    let mut merged = encoded.columns.clone();
    if let Some(previous) = &previous {
        for col in &cols {
            if !partial_fields.contains(&col.as_str()) {
                if let Some(v) = previous.columns.get(col) {
                    merged.insert(col.clone(), v.clone());
                }
            }
        }
    }

    let Some(previous) = previous else {
        for col in &cols {
            if !OPTIONAL_ON_FIRST_SNAPSHOT.contains(&col.as_str()) && merged.get(col).is_none_or(ColumnValue::is_null) {
                return PartialNoSnapshotSnafu {
                    kind: ObjectKind::Member.as_str(),
                    id: user_id.to_string(),
                    field: col.clone(),
                }
                .fail();
            }
        }
        upsert(conn, server_id, user_id, timing, &cols, &merged, encoded.extras.as_ref())?;
        return Ok(AddSnapshotOutcome::AddedFirstSnapshot);
    };

    let same = cols.iter().all(|c| previous.columns.get(c) == merged.get(c))
        && previous.extras == encoded.extras;
    if same {
        return Ok(AddSnapshotOutcome::SameAsLatest);
    }

    upsert(conn, server_id, user_id, timing, &cols, &merged, encoded.extras.as_ref())?;
    Ok(AddSnapshotOutcome::AddedAnotherSnapshot)
}

/// Overwrite with a null-member tombstone row: all mutable fields null,
/// including `joined_at`, which child-listing queries read as "this
/// member left." Idempotent like `add_member_snapshot`:
/// leaving twice in a row is `SameAsLatest`, not a second tombstone write.
pub fn mark_member_left(conn: &Connection, server_id: &str, user_id: &str, timing: Timing) -> DbResult<AddSnapshotOutcome> {
    let cols = mutable_cols();
    let previous = fetch_latest(conn, server_id, user_id, &cols)?;

    let already_gone = previous.as_ref().is_some_and(|p| cols.iter().all(|c| p.columns.get(c).is_none_or(ColumnValue::is_null)));
    if already_gone {
        return Ok(AddSnapshotOutcome::SameAsLatest);
    }

    let empty = BTreeMap::new();
    upsert(conn, server_id, user_id, timing, &cols, &empty, None)?;
    Ok(if previous.is_some() { AddSnapshotOutcome::AddedAnotherSnapshot } else { AddSnapshotOutcome::AddedFirstSnapshot })
}

/// For every member currently present in `server_id` but absent from
/// `present_user_ids`, overwrite with a left-tombstone.
pub fn sync_members(conn: &Connection, server_id: &str, present_user_ids: &[String], timing: Timing) -> DbResult<usize> {
    let mut stmt = conn
        .prepare("SELECT user_id FROM member_latest WHERE server_id = ?1 AND joined_at IS NOT NULL")
        .context(SqliteSnafu)?;
    let current: Vec<String> = stmt
        .query_map([server_id], |row| row.get(0))
        .context(SqliteSnafu)?
        .collect::<rusqlite::Result<_>>()
        .context(SqliteSnafu)?;
    drop(stmt);

    let present: std::collections::HashSet<&str> = present_user_ids.iter().map(String::as_str).collect();
    let mut left = 0;
    for user_id in current {
        if !present.contains(user_id.as_str()) {
            mark_member_left(conn, server_id, &user_id, timing)?;
            left += 1;
        }
    }
    Ok(left)
}

pub fn get_latest_member(conn: &Connection, server_id: &str, user_id: &str) -> DbResult<Option<SnapshotRow>> {
    fetch_latest(conn, server_id, user_id, &mutable_cols())
}

fn fetch_latest(
    conn: &Connection,
    server_id: &str,
    user_id: &str,
    cols: &[String],
) -> DbResult<Option<SnapshotRow>> {
    let select_cols: Vec<String> = std::iter::once("timing".to_string())
        .chain(std::iter::once("deleted_timing".to_string()))
        .chain(cols.iter().cloned())
        .chain(std::iter::once("extras".to_string()))
        .collect();
    let sql = format!(
        "SELECT {} FROM member_latest WHERE server_id = ?1 AND user_id = ?2",
        select_cols.join(", ")
    );
    conn.query_row(&sql, rusqlite::params![server_id, user_id], |row| {
        let timing = Timing::from_packed(row.get::<_, i64>("timing")?);
        let deleted_timing = row
            .get::<_, Option<i64>>("deleted_timing")?
            .map(Timing::from_packed);
        let mut columns = BTreeMap::new();
        for col in cols {
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

/// `INSERT ... ON CONFLICT (server_id, user_id) DO UPDATE`: the single
/// primitive member snapshots use in place of insert/copy-to-previous/
/// update, since there is no previous partition to maintain.
fn upsert(
    conn: &Connection,
    server_id: &str,
    user_id: &str,
    timing: Timing,
    cols: &[String],
    values: &BTreeMap<String, ColumnValue>,
    extras: Option<&serde_json::Value>,
) -> DbResult<()> {
    let mut all_cols = vec!["server_id".to_string(), "user_id".to_string(), "timing".to_string()];
    all_cols.extend(cols.iter().cloned());
    all_cols.push("extras".to_string());
    let placeholders: Vec<String> = (1..=all_cols.len()).map(|i| format!("?{i}")).collect();
    let update_assignments: Vec<String> = all_cols
        .iter()
        .filter(|c| *c != "server_id" && *c != "user_id")
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    let sql = format!(
        "INSERT INTO member_latest ({cols}) VALUES ({placeholders})
         ON CONFLICT (server_id, user_id) DO UPDATE SET {updates}",
        cols = all_cols.join(", "),
        placeholders = placeholders.join(", "),
        updates = update_assignments.join(", "),
    );
    let mut owned = vec![
        ColumnValue::Text(server_id.to_string()),
        ColumnValue::Text(user_id.to_string()),
        ColumnValue::Integer(timing.packed()),
    ];
    for col in cols {
        owned.push(values.get(col).cloned().unwrap_or(ColumnValue::Null));
    }
    owned.push(extras.map_or(ColumnValue::Null, |v| ColumnValue::Text(v.to_string())));
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

    fn encoded_with(pairs: &[(&str, ColumnValue)]) -> EncodedObject {
        EncodedObject {
            columns: pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            extras: None,
        }
    }

    /// A full member snapshot as the codec would actually hand it off:
    /// every non-voice scalar column present, null or not.
    fn full_member_encoded(joined_at_ms: i64) -> EncodedObject {
        encoded_with(&[
            ("nick", ColumnValue::Null),
            ("avatar", ColumnValue::Null),
            ("roles", ColumnValue::Blob(Vec::new())),
            ("joined_at", ColumnValue::Integer(joined_at_ms)),
        ])
    }

    #[test]
    fn first_snapshot_is_added() {
        let conn = open();
        let encoded = full_member_encoded(1000);
        let outcome = add_member_snapshot(&conn, "server1", "user1", Timing::new(1, true), &encoded, &[]).unwrap();
        assert_eq!(outcome, AddSnapshotOutcome::AddedFirstSnapshot);
        assert!(get_latest_member(&conn, "server1", "user1").unwrap().is_some());
    }

    #[test]
    fn partial_update_preserves_voice_fields() {
        let conn = open();
        let mut with_voice = full_member_encoded(1000);
        with_voice.columns.insert("deaf".to_string(), ColumnValue::Integer(1));
        add_member_snapshot(&conn, "server1", "user1", Timing::new(1, true), &with_voice, &[]).unwrap();

        let partial = encoded_with(&[("joined_at", ColumnValue::Integer(1000))]);
        add_member_snapshot(&conn, "server1", "user1", Timing::new(2, true), &partial, &["joined_at"]).unwrap();

        let latest = get_latest_member(&conn, "server1", "user1").unwrap().unwrap();
        assert_eq!(latest.columns.get("deaf"), Some(&ColumnValue::Integer(1)));
    }

    #[test]
    fn member_left_nulls_joined_at() {
        let conn = open();
        let encoded = full_member_encoded(1000);
        add_member_snapshot(&conn, "server1", "user1", Timing::new(1, true), &encoded, &[]).unwrap();
        let outcome = mark_member_left(&conn, "server1", "user1", Timing::new(2, true)).unwrap();
        assert_eq!(outcome, AddSnapshotOutcome::AddedAnotherSnapshot);
        let latest = get_latest_member(&conn, "server1", "user1").unwrap().unwrap();
        assert!(latest.columns.get("joined_at").map_or(true, ColumnValue::is_null));
    }

    #[test]
    fn leaving_twice_is_idempotent() {
        let conn = open();
        let encoded = full_member_encoded(1000);
        add_member_snapshot(&conn, "server1", "user1", Timing::new(1, true), &encoded, &[]).unwrap();
        mark_member_left(&conn, "server1", "user1", Timing::new(2, true)).unwrap();
        let outcome = mark_member_left(&conn, "server1", "user1", Timing::new(3, true)).unwrap();
        assert_eq!(outcome, AddSnapshotOutcome::SameAsLatest);
    }

    #[test]
    fn deaf_and_mute_may_be_absent_from_a_first_snapshot() {
        let conn = open();
        let encoded = full_member_encoded(1000);
        let outcome = add_member_snapshot(&conn, "server1", "user1", Timing::new(1, true), &encoded, &[]).unwrap();
        assert_eq!(outcome, AddSnapshotOutcome::AddedFirstSnapshot);
    }

    #[test]
    fn a_partial_update_with_no_prior_snapshot_is_rejected() {
        let conn = open();
        let partial = encoded_with(&[("joined_at", ColumnValue::Integer(1000))]);
        let err = add_member_snapshot(&conn, "server1", "user1", Timing::new(1, true), &partial, &["joined_at"]);
        assert!(err.is_err(), "nick/avatar/roles have no prior snapshot to inherit from");
    }
}
