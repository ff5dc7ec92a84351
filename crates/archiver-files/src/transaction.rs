//! `do_file_transaction`: run a caller-supplied
//! body alongside a set of already-acquired files, recording each one's
//! outcome and only promoting its blob into place once the body (and,
//! transitively, the caller's own database transaction) has finished —
//! success or failure. Files always settle; only the database write
//! the caller made inside `body` can be rolled back.

use crate::acquisition::{Acquisition, AcquireResult};
use crate::error::FileStoreResult;
use crate::record::FileRecordStore;

/// Record every acquisition's outcome in the database (idempotent
/// `(url, hash, error_code)` upsert), run `body`, then settle every
/// acquisition's blob regardless of whether `body` succeeded.
///
/// `body` is expected to be the caller's own database writes, run inside
/// whatever transaction the caller controls (the request bus wraps this
/// in a SQLite transaction via `Database::begin`/`commit`/`rollback`).
pub async fn do_file_transaction<T>(
    records: &dyn FileRecordStore,
    acquisitions: &[Acquisition],
    body: impl FnOnce() -> FileStoreResult<T>,
) -> FileStoreResult<T> {
    for acquisition in acquisitions {
        if let Ok(AcquireResult { hash, error_code, .. }) = acquisition.result() {
            records
                .record_file(acquisition.url(), hash.as_deref(), error_code.as_deref())
                .map_err(|source| crate::error::FileStoreError::Record {
                    source,
                    location: snafu::Location::new(file!(), line!(), column!()),
                })?;
        }
    }

    let body_result = body();

    for acquisition in acquisitions {
        if let Err(e) = acquisition.settle().await {
            tracing::warn!(target: crate::store::LOG_TARGET, url = acquisition.url(), error = %e, "failed to settle acquisition after file transaction");
        }
    }

    body_result
}

#[cfg(test)]
mod tests {
    // `do_file_transaction` is exercised end-to-end in
    // `acquisition::tests` alongside a real `AcquisitionCoordinator`,
    // since it needs a running coordinator task to settle against.
}
