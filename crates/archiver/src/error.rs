//! Top-level error type for the facade crate, wrapping each subsystem's
//! own `snafu` error under one family of variants callers can match on
//! without reaching into `archiver-db`, `archiver-bus`, or
//! `archiver-files` directly.

use snafu::{Location, Snafu};

pub(crate) const LOG_TARGET: &str = "archiver";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ArchiverError {
    #[snafu(display("request bus error"))]
    Bus {
        source: archiver_bus::BusError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("file store error"))]
    FileStore {
        source: archiver_files::FileStoreError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("could not create data directory {path:?}"))]
    DataDir {
        path: std::path::PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// `archiver_files::FileStoreError` isn't `Clone` (it can wrap
    /// `std::io::Error`/`reqwest::Error`), so a failed acquisition's
    /// error can't be moved out of the shared `Acquisition` handle —
    /// this carries its rendered message instead.
    #[snafu(display("file acquisition failed: {message}"))]
    FileAcquisition {
        message: String,
        #[snafu(implicit)]
        location: Location,
    },
}

pub type ArchiverResult<T> = Result<T, ArchiverError>;
