//! Shared scalar types for the archiver: ids, timing, and the generic
//! [`Snapshot`] envelope every object kind is stored in.
//!
//! This crate has no knowledge of SQL or of the wire shape of any particular
//! object kind — it only defines the vocabulary [`archiver-codec`] and
//! [`archiver-db`] build on.

pub mod bincode_cfg;
mod id;
mod kind;
mod timing;
mod webhook_user;

pub use id::{Snowflake, SnowflakeParseError, MIN_SNOWFLAKE};
pub use kind::ObjectKind;
pub use timing::Timing;
pub use webhook_user::WebhookUserId;

/// An immutable point-in-time record of an object with timing metadata.
///
/// `deleted_timing` is `None` until something tombstones the object; it
/// never reverts to `None` afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot<T> {
    pub timing: Timing,
    pub deleted_timing: Option<Timing>,
    pub data: T,
}

impl<T> Snapshot<T> {
    pub fn new(timing: Timing, data: T) -> Self {
        Self {
            timing,
            deleted_timing: None,
            data,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_timing.is_some()
    }
}
