//! Bridges `archiver-bus`'s synchronous handle to `archiver-files`'s
//! `FileRecordStore` trait, the seam `archiver-files` was deliberately
//! built without a direct `archiver-bus`/`archiver-db` dependency to keep
//! (see `DESIGN.md`).

use std::sync::Arc;

use archiver_bus::SyncBus;
use archiver_files::FileRecordStore;
use archiver_util_error::BoxedError;

pub struct BusFileRecordStore {
    bus: Arc<SyncBus>,
}

impl BusFileRecordStore {
    pub fn new(bus: Arc<SyncBus>) -> Self {
        Self { bus }
    }
}

impl FileRecordStore for BusFileRecordStore {
    fn file_hash(&self, url: &str) -> Result<Option<Option<Vec<u8>>>, BoxedError> {
        // `FileRecordStore` is a synchronous trait so the acquisition
        // coordinator's actor task can call it directly; `block_in_place`
        // keeps that blocking round trip from starving the runtime's
        // other tasks. Requires a multi-threaded tokio runtime.
        tokio::task::block_in_place(|| self.bus.file_hash(url)).map_err(|err| Box::new(err) as BoxedError)
    }

    fn record_file(&self, url: &str, hash: Option<&[u8]>, error_code: Option<&str>) -> Result<(), BoxedError> {
        tokio::task::block_in_place(|| self.bus.record_file(url, hash, error_code)).map_err(|err| Box::new(err) as BoxedError)
    }

    fn is_hash_referenced(&self, hash: &[u8]) -> Result<bool, BoxedError> {
        tokio::task::block_in_place(|| self.bus.is_hash_referenced(hash)).map_err(|err| Box::new(err) as BoxedError)
    }
}
