//! Schema bootstrap: `PRAGMA user_version`-gated table creation. There is
//! currently a single schema generation, so the migration arm is a
//! placeholder for future incremental migrations.

use archiver_codec::{immutable_column_names, mutable_column_names, schema_for};
use archiver_core::ObjectKind;
use snafu::ResultExt as _;
use tracing::info;

use crate::error::{DbResult, SqliteSnafu, VersionTooHighSnafu};
use crate::error::LOG_TARGET;

/// Current schema version. Bump when the generated DDL changes shape.
const DB_VER: i64 = 1;

/// Kinds with a single `TEXT` id primary key handled by the generic
/// snapshot engine. `Member` (composite key) and `Attachment` (never
/// versioned) are bootstrapped separately.
const SINGLE_KEY_KINDS: &[ObjectKind] = &[
    ObjectKind::User,
    ObjectKind::Server,
    ObjectKind::Role,
    ObjectKind::Channel,
    ObjectKind::Thread,
    ObjectKind::ForumTag,
    ObjectKind::Message,
    ObjectKind::ServerEmoji,
];

/// Open (and if necessary initialize) the schema on a freshly-opened
/// connection.
pub(crate) fn bootstrap(conn: &rusqlite::Connection) -> DbResult<()> {
    conn.pragma_update(None, "foreign_keys", "ON").context(SqliteSnafu)?;
    conn.pragma_update(None, "journal_mode", "WAL").context(SqliteSnafu)?;
    conn.pragma_update(None, "busy_timeout", 5000).context(SqliteSnafu)?;

    let cur_ver: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context(SqliteSnafu)?;

    if cur_ver == 0 {
        info!(target: LOG_TARGET, "initializing new database");
        create_all_tables(conn)?;
        conn.pragma_update(None, "user_version", DB_VER).context(SqliteSnafu)?;
        return Ok(());
    }

    if cur_ver > DB_VER {
        return VersionTooHighSnafu {
            db_ver: cur_ver,
            code_ver: DB_VER,
        }
        .fail();
    }

    // Incremental migrations for cur_ver < DB_VER go here. None exist yet —
    // this is the only schema generation so far.

    Ok(())
}

fn create_all_tables(conn: &rusqlite::Connection) -> DbResult<()> {
    for &kind in SINGLE_KEY_KINDS {
        create_kind_tables(conn, kind)?;
    }
    create_member_tables(conn)?;
    create_attachment_table(conn)?;
    create_webhook_user_table(conn)?;
    create_reaction_tables(conn)?;
    create_file_table(conn)?;
    crate::fts_ops::create_fts_tables(conn)?;
    Ok(())
}

/// `BLOB` affinity on every generated column: SQLite's manifest typing
/// stores whatever `ColumnValue` variant the codec produced regardless of
/// the declared column type, so this is a formality rather than a
/// constraint.
fn column_defs(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| format!("{c} BLOB"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Every single-key kind schema declares `id` as an ordinary immutable
/// scalar field (so the codec encodes/decodes it like any other field);
/// the database layer treats it as the primary key column instead of a
/// regular data column, so it is filtered out of generated column lists.
pub(crate) fn non_key_columns(columns: Vec<String>) -> Vec<String> {
    columns.into_iter().filter(|c| c != "id").collect()
}

/// Table names for a single-key kind's three partitions.
pub(crate) fn table_names(kind: ObjectKind) -> (String, String, String) {
    let base = kind.as_str();
    (
        format!("{base}_immutable"),
        format!("{base}_latest"),
        format!("{base}_previous"),
    )
}

fn create_kind_tables(conn: &rusqlite::Connection, kind: ObjectKind) -> DbResult<()> {
    let schema = schema_for(kind);
    let immutable_cols = non_key_columns(immutable_column_names(schema));
    let mutable_cols = mutable_column_names(schema);
    let (immutable_table, latest_table, previous_table) = table_names(kind);

    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {immutable_table} (
            id TEXT PRIMARY KEY,
            {immutable_defs}
        );
        CREATE TABLE IF NOT EXISTS {latest_table} (
            id TEXT PRIMARY KEY,
            parent_id TEXT,
            timing INTEGER NOT NULL,
            deleted_timing INTEGER,
            {mutable_defs},
            extras TEXT
        );
        CREATE INDEX IF NOT EXISTS {latest_table}_parent_idx ON {latest_table}(parent_id);
        CREATE TABLE IF NOT EXISTS {previous_table} (
            id TEXT NOT NULL,
            timing INTEGER NOT NULL,
            {mutable_defs},
            extras TEXT,
            PRIMARY KEY (id, timing)
        );",
        immutable_defs = column_defs(&immutable_cols),
        mutable_defs = column_defs(&mutable_cols),
    ))
    .context(SqliteSnafu)?;
    Ok(())
}

/// Member has no previous-snapshots partition: a single
/// `member_latest`-equivalent table where the newest row always wins, no
/// history kept.
fn create_member_tables(conn: &rusqlite::Connection) -> DbResult<()> {
    let schema = schema_for(ObjectKind::Member);
    let mutable_cols = mutable_column_names(schema);
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS member_latest (
            server_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            timing INTEGER NOT NULL,
            deleted_timing INTEGER,
            {mutable_defs},
            extras TEXT,
            PRIMARY KEY (server_id, user_id)
        );",
        mutable_defs = column_defs(&mutable_cols),
    ))
    .context(SqliteSnafu)?;
    Ok(())
}

fn create_attachment_table(conn: &rusqlite::Connection) -> DbResult<()> {
    let schema = schema_for(ObjectKind::Attachment);
    let cols = non_key_columns(archiver_codec::column_names(schema));
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS attachment (
            id TEXT PRIMARY KEY,
            message_id TEXT NOT NULL,
            {col_defs},
            extras TEXT
        );
        CREATE INDEX IF NOT EXISTS attachment_message_idx ON attachment(message_id);",
        col_defs = column_defs(&cols),
    ))
    .context(SqliteSnafu)?;
    Ok(())
}

fn create_webhook_user_table(conn: &rusqlite::Connection) -> DbResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS webhook_user (
            id INTEGER PRIMARY KEY,
            webhook_id TEXT NOT NULL,
            username TEXT NOT NULL,
            avatar_hash TEXT,
            UNIQUE (webhook_id, username, avatar_hash)
        );",
    )
    .context(SqliteSnafu)?;
    Ok(())
}

fn create_reaction_tables(conn: &rusqlite::Connection) -> DbResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS reaction_emoji (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            animated INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS reaction_placement (
            message_id TEXT NOT NULL,
            emoji_id INTEGER,
            emoji_name TEXT,
            reaction_type INTEGER NOT NULL,
            user_id TEXT NOT NULL,
            start_timing INTEGER NOT NULL,
            end_timing INTEGER
        );
        CREATE INDEX IF NOT EXISTS reaction_placement_msg_idx
            ON reaction_placement(message_id);
        CREATE UNIQUE INDEX IF NOT EXISTS reaction_placement_open_idx
            ON reaction_placement(message_id, emoji_id, emoji_name, reaction_type, user_id)
            WHERE end_timing IS NULL;",
    )
    .context(SqliteSnafu)?;
    Ok(())
}

fn create_file_table(conn: &rusqlite::Connection) -> DbResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS file (
            url TEXT PRIMARY KEY,
            content_hash BLOB,
            error_code TEXT
        );",
    )
    .context(SqliteSnafu)?;
    Ok(())
}
