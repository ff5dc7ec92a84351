//! `snafu` error types for the request bus, following the
//! implicit-`Location` style used throughout this crate family.

use snafu::{Location, Snafu};

pub(crate) const LOG_TARGET: &str = "archiver::bus";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BusError {
    #[snafu(display("database error"))]
    Db {
        source: archiver_db::DbError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("the worker thread is no longer running"))]
    WorkerGone {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("a request is already in flight on this connection"))]
    AlreadyInFlight {
        #[snafu(implicit)]
        location: Location,
    },
}

pub type BusResult<T> = Result<T, BusError>;
