//! The facade crate: wires `archiver-db` (via `archiver-bus`) and
//! `archiver-files` together behind one handle, and gives the
//! out-of-scope gateway collaborator a seam to integrate against — one
//! struct owning the database, the acquisition coordinator, and the
//! background tasks that tie them together.

pub mod config;
pub mod error;
pub mod gateway;
mod record_bridge;

use std::sync::Arc;

use archiver_bus::{AsyncBus, SyncBus};
use archiver_files::error::BodySnafu;
use archiver_files::{AcquireResult, AcquisitionCoordinator, FileRecordStore, FileStore, do_file_transaction};
use snafu::ResultExt as _;

pub use config::ArchiverConfig;
pub use error::{ArchiverError, ArchiverResult};
pub use record_bridge::BusFileRecordStore;

use error::{BusSnafu, DataDirSnafu, FileAcquisitionSnafu, FileStoreSnafu, LOG_TARGET};

/// Owns the database worker thread, the blob store, and the acquisition
/// coordinator for one archive directory.
pub struct Archiver {
    config: ArchiverConfig,
    bus: Arc<SyncBus>,
    files: Arc<FileStore>,
    acquisitions: AcquisitionCoordinator,
}

impl Archiver {
    pub async fn open(config: ArchiverConfig) -> ArchiverResult<Self> {
        std::fs::create_dir_all(&config.data_dir).context(DataDirSnafu { path: config.data_dir.clone() })?;

        let db_path = config.db_path();
        let bus = tokio::task::spawn_blocking(move || SyncBus::open(db_path))
            .await
            .expect("archiver-db-worker thread panicked while opening the database")
            .context(BusSnafu)?;
        let bus = Arc::new(bus);

        let records: Arc<dyn FileRecordStore> = Arc::new(BusFileRecordStore::new(Arc::clone(&bus)));
        let files_root = config.files_root();
        let records_for_open = Arc::clone(&records);
        let files = tokio::task::spawn_blocking(move || FileStore::open(files_root, records_for_open.as_ref()))
            .await
            .expect("file store open panicked")
            .context(FileStoreSnafu)?;
        let files = Arc::new(files);

        let http = reqwest::Client::new();
        let acquisitions = AcquisitionCoordinator::spawn(Arc::clone(&files), records, http, config.max_concurrent_downloads);

        tracing::info!(target: LOG_TARGET, data_dir = %config.data_dir.display(), "archiver opened");
        Ok(Self { config, bus, files, acquisitions })
    }

    pub fn config(&self) -> &ArchiverConfig {
        &self.config
    }

    /// The blocking bus handle, for callers (like the `FileRecordStore`
    /// bridge) that need a synchronous database call.
    pub fn sync_bus(&self) -> &SyncBus {
        &self.bus
    }

    /// An `async`-facing handle sharing the same worker thread as
    /// `sync_bus`.
    pub fn async_bus(&self) -> AsyncBus {
        AsyncBus::from_sync(Arc::clone(&self.bus))
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    /// Acquires `url`'s bytes (downloading if not already present),
    /// deduplicated against any other in-flight acquisition of the same
    /// URL.
    pub async fn acquire_file(&self, url: impl Into<String>) -> ArchiverResult<AcquireResult> {
        let acquisition = self.acquisitions.acquire_if_needed(url).await.context(FileStoreSnafu)?;
        match acquisition.result() {
            Ok(result) => Ok(result.clone()),
            Err(err) => FileAcquisitionSnafu { message: err.to_string() }.fail(),
        }
    }

    /// Runs `body` — the caller's own database writes — inside a single
    /// SQLite transaction, alongside acquiring every URL in `urls`
    ///: each acquisition's outcome is recorded
    /// before `body` runs, and every acquired file is settled onto disk
    /// after `body` finishes, whether or not the database transaction
    /// committed.
    pub async fn file_transaction<T, F>(&self, urls: &[String], body: F) -> ArchiverResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&SyncBus) -> archiver_bus::BusResult<T> + Send + 'static,
    {
        let mut acquisitions = Vec::with_capacity(urls.len());
        for url in urls {
            acquisitions.push(self.acquisitions.acquire_if_needed(url.clone()).await.context(FileStoreSnafu)?);
        }

        let records = BusFileRecordStore::new(Arc::clone(&self.bus));
        let bus = Arc::clone(&self.bus);
        do_file_transaction(&records, &acquisitions, move || {
            // `transaction` blocks on the worker thread for its whole
            // span; `block_in_place` keeps that off the runtime's async
            // scheduling path (requires a multi-threaded runtime).
            tokio::task::block_in_place(|| {
                bus.transaction(body).map_err(|err| Box::new(err) as archiver_util_error::BoxedError).context(BodySnafu)
            })
        })
        .await
        .context(FileStoreSnafu)
    }

    /// Flushes any in-flight acquisitions and shuts down the worker
    /// thread. Errors if acquisitions are still outstanding and not
    /// aborted.
    pub async fn close(self) -> ArchiverResult<()> {
        self.acquisitions.close().await.context(FileStoreSnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // `block_in_place` (used by the `FileRecordStore` bridge) panics on
    // a current-thread runtime, so this needs the multi-thread flavor.
    #[tokio::test(flavor = "multi_thread")]
    async fn opens_and_acquires_a_file_that_is_already_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let config = ArchiverConfig::builder(dir.path().to_owned()).build();
        let archiver = Archiver::open(config).await.unwrap();

        archiver.sync_bus().record_file("https://example.test/a.png", None, Some("not_found")).unwrap();
        let result = archiver.acquire_file("https://example.test/a.png").await.unwrap();
        assert_eq!(result.error_code.as_deref(), Some("not_found"));
        assert!(!result.created_file);
    }
}
