//! Single-writer request bus in front of `archiver-db`:
//! every database operation is dispatched as an owned request onto a
//! dedicated worker thread that exclusively owns the `Database`, giving
//! the rest of the system a `Send + Sync` handle without needing a lock
//! inside the database layer itself.

mod async_bus;
pub mod error;
mod request;
mod sync_bus;
mod worker;

pub use async_bus::AsyncBus;
pub use error::{BusError, BusResult};
pub use request::{BusRequest, OwnedAuthorInfo};
pub use sync_bus::SyncBus;
