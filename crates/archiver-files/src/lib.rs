//! Content-addressed blob store, acquisition coordinator, and download
//! engine: owns the filesystem side of "a URL was
//! referenced, make sure its bytes exist on disk exactly once."

mod acquisition;
mod download;
pub mod error;
mod record;
mod store;
mod transaction;

pub use acquisition::{AcquireResult, Acquisition, AcquisitionCoordinator};
pub use download::DownloadOutcome;
pub use error::{DownloadError, FileStoreError, FileStoreResult};
pub use record::FileRecordStore;
pub use store::{ConsistencyReport, FileStore, blob_name};
pub use transaction::do_file_transaction;
