use std::fmt;
use std::str::FromStr;

use snafu::{ResultExt as _, Snafu};

/// Milliseconds from the Unix epoch to the platform's snowflake epoch
/// (2015-01-01T00:00:00.000Z), matching the chat platform this archiver
/// targets.
const SNOWFLAKE_EPOCH_MS: i64 = 1_420_070_400_000;

/// Number of low bits reserved for worker id + sequence in a snowflake.
const SNOWFLAKE_TIMESTAMP_SHIFT: u32 = 22;

/// The smallest value any real snowflake can take: a timestamp component of
/// `1` (one millisecond after the snowflake epoch) shifted into place. Real
/// snowflakes for existing objects are always orders of magnitude larger
/// than this in practice, which is what leaves [`WebhookUserId`](crate::WebhookUserId)
/// its low, disjoint id space.
pub const MIN_SNOWFLAKE: i64 = 1 << SNOWFLAKE_TIMESTAMP_SHIFT;

/// A platform-native 64-bit id with an embedded creation timestamp.
///
/// Stored in SQLite as `INTEGER`; decoded back to a decimal string at the
/// codec boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Snowflake(pub i64);

impl Snowflake {
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> i64 {
        self.0
    }

    /// The creation timestamp derivable from this id's embedded bits.
    ///
    /// Used to validate `message.timestamp == timestamp_from_id(message.id)`
    ///.
    pub fn timestamp_ms(self) -> i64 {
        (self.0 >> SNOWFLAKE_TIMESTAMP_SHIFT) + SNOWFLAKE_EPOCH_MS
    }
}

impl From<i64> for Snowflake {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Snowflake> for i64 {
    fn from(value: Snowflake) -> Self {
        value.0
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Snafu, Clone)]
pub enum SnowflakeParseError {
    #[snafu(display("invalid snowflake: {source}"))]
    NotAnInteger { source: std::num::ParseIntError },
}

impl FromStr for Snowflake {
    type Err = SnowflakeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>()
            .map(Snowflake)
            .context(NotAnIntegerSnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_roundtrips_through_display_and_parse() {
        let id: Snowflake = "1367557310418784356".parse().unwrap();
        assert_eq!(id.to_string(), "1367557310418784356");
    }

    #[test]
    fn timestamp_ms_is_derived_from_embedded_bits() {
        // A snowflake minted at exactly the platform epoch with zero
        // worker/sequence bits decodes back to the epoch.
        let id = Snowflake(0);
        assert_eq!(id.timestamp_ms(), SNOWFLAKE_EPOCH_MS);
    }

    #[test]
    fn min_snowflake_is_smaller_than_any_real_id_seen_in_practice() {
        let real_example = Snowflake(1367557310418784356);
        assert!(MIN_SNOWFLAKE < real_example.get());
    }
}
