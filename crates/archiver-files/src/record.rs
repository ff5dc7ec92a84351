//! The file store's only coupling to the database: a trait rather than a
//! dependency on `archiver-db` directly, so this crate stays ignorant of
//! the request bus that will eventually sit between the two. The bus (or anything else wrapping a `Database`)
//! implements this against its own connection.

use archiver_util_error::BoxedError;

pub trait FileRecordStore: Send + Sync {
    /// `Ok(None)` — no row for this URL. `Ok(Some(None))` — a row exists
    /// but records a permanent error, not a hash. `Ok(Some(Some(hash)))` —
    /// a row exists with a content hash.
    fn file_hash(&self, url: &str) -> Result<Option<Option<Vec<u8>>>, BoxedError>;

    fn record_file(&self, url: &str, hash: Option<&[u8]>, error_code: Option<&str>) -> Result<(), BoxedError>;

    fn is_hash_referenced(&self, hash: &[u8]) -> Result<bool, BoxedError>;
}
