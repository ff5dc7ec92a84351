//! `snafu` error types for the blob store and the download engine,
//! following the implicit-`Location` style used throughout this crate
//! family (e.g. `archiver-db::error`).

use std::path::PathBuf;

use snafu::{Location, Snafu};

pub(crate) const LOG_TARGET: &str = "archiver::files";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FileStoreError {
    #[snafu(display("io error at {path:?}"))]
    Io {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("record store lookup/update failed"))]
    Record {
        source: archiver_util_error::BoxedError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("file store is closing with outstanding non-aborting acquisitions"))]
    OutstandingAcquisitions {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("acquisition for {url} was already settled"))]
    AlreadySettled {
        url: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("download of {url} failed"))]
    Download {
        url: String,
        source: DownloadError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("pending file rename retries exhausted"))]
    RenameRetriesExhausted {
        path: PathBuf,
        #[snafu(implicit)]
        location: Location,
    },

    /// A caller's own transaction body (run alongside
    /// `do_file_transaction`'s acquisitions) failed. Kept generic and
    /// boxed so this crate doesn't need to know what the caller's body
    /// actually does (e.g. a `archiver-bus` database transaction).
    #[snafu(display("transaction body failed"))]
    Body {
        source: archiver_util_error::BoxedError,
        #[snafu(implicit)]
        location: Location,
    },
}

pub type FileStoreResult<T> = Result<T, FileStoreError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DownloadError {
    #[snafu(display("http request failed"))]
    Http {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("server returned permanent status {status}"))]
    PermanentStatus {
        status: u16,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("download was aborted"))]
    Aborted {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("range-resume response did not match the requested byte range"))]
    RangeMismatch {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("io error while writing pending file"))]
    #[snafu(context(suffix(Snafu2)))]
    Io {
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

pub type DownloadResult<T> = Result<T, DownloadError>;
