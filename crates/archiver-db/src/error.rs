use snafu::{Location, Snafu};

pub(crate) const LOG_TARGET: &str = "archiver::db";

/// Errors the snapshot engine can return.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DbError {
    #[snafu(display("sqlite error: {source}"))]
    Sqlite {
        source: rusqlite::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("codec error: {source}"))]
    Codec {
        source: archiver_codec::CodecError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display(
        "database schema version {db_ver} is newer than this build supports ({code_ver})"
    ))]
    VersionTooHigh { db_ver: i64, code_ver: i64 },
    #[snafu(display(
        "immutable column `{column}` of {kind} {id} changed: stored {stored}, new {new}"
    ))]
    ImmutableViolation {
        kind: &'static str,
        id: String,
        column: String,
        stored: String,
        new: String,
    },
    #[snafu(display(
        "non-monotonic timing for {kind} {id}: new snapshot at {new_packed} does not exceed latest at {latest_packed}"
    ))]
    NonMonotonicTiming {
        kind: &'static str,
        id: String,
        latest_packed: i64,
        new_packed: i64,
    },
    #[snafu(display("field `{field}` is required for a first snapshot of {kind} {id}"))]
    PartialNoSnapshot {
        kind: &'static str,
        id: String,
        field: String,
    },
    #[snafu(display("no message {id} recorded for reaction placement"))]
    MissingMessage { id: String },
    #[snafu(display("no user {id} recorded for reaction placement"))]
    MissingUser { id: String },
    #[snafu(display("no channel or thread snapshot recorded for id {id}"))]
    MissingParentChannel { id: String },
    #[snafu(display("invalid message snowflake {id}: {source}"))]
    MessageSnowflake {
        id: String,
        source: archiver_core::SnowflakeParseError,
    },
    #[snafu(display(
        "message {id} timestamp {timestamp_ms} does not match its snowflake-derived timestamp {snowflake_ms}"
    ))]
    TimestampSnowflakeMismatch {
        id: String,
        timestamp_ms: i64,
        snowflake_ms: i64,
    },
    #[snafu(display("uploader mismatch for server emoji {id}: stored {stored}, new {new}"))]
    EmojiUploaderMismatch { id: String, stored: String, new: String },
    #[snafu(display("{kind} snapshot is missing its required `{field}` column"))]
    MissingRequiredField { kind: &'static str, field: &'static str },
}

pub type DbResult<T> = std::result::Result<T, DbError>;
