use crate::id::MIN_SNOWFLAKE;

/// A synthetic internal user id assigned below the snowflake range,
/// representing a `(webhook_id, username, avatar_hash)` tuple.
///
/// Messages from webhooks attribute authorship to one of these instead of
/// polluting the users table with one-off webhook aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WebhookUserId(i64);

impl WebhookUserId {
    /// `row_id` must be the `AUTOINCREMENT` primary key of the
    /// `webhook_users` table, offset into the reserved low range so it can
    /// never collide with a real snowflake.
    pub fn from_row_id(row_id: i64) -> Self {
        debug_assert!(row_id >= 0);
        Self(-(row_id + 1))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<WebhookUserId> for i64 {
    fn from(value: WebhookUserId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_ids_never_collide_with_real_snowflakes() {
        for row_id in [0, 1, 1_000_000] {
            let id = WebhookUserId::from_row_id(row_id);
            assert!(id.get() < MIN_SNOWFLAKE);
            assert!(id.get() < 0);
        }
    }

    #[test]
    fn distinct_rows_yield_distinct_ids() {
        assert_ne!(
            WebhookUserId::from_row_id(1).get(),
            WebhookUserId::from_row_id(2).get()
        );
    }
}
