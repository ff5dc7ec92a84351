/// `(timestamp_ms, realtime)` packed into a single 64-bit integer as
/// `timestamp << 1 | realtime`.
///
/// Zero is reserved to mean "creation-time, unknown precise moment" — it
/// still round-trips through [`Timing::from_packed`]/[`Timing::packed`],
/// callers just shouldn't expect `timestamp_ms() == 0` to mean anything more
/// precise than "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timing {
    packed: i64,
}

impl Timing {
    pub const ZERO: Timing = Timing { packed: 0 };

    pub fn new(timestamp_ms: i64, realtime: bool) -> Self {
        Self {
            packed: (timestamp_ms << 1) | (realtime as i64),
        }
    }

    pub fn from_packed(packed: i64) -> Self {
        Self { packed }
    }

    pub fn packed(self) -> i64 {
        self.packed
    }

    pub fn timestamp_ms(self) -> i64 {
        self.packed >> 1
    }

    pub fn realtime(self) -> bool {
        self.packed & 1 != 0
    }

    /// The packed upper bound used by [`get_at`]: the largest `Timing` whose
    /// `timestamp_ms` does not exceed `ts`, i.e. `(ts << 1) | 1`.
    ///
    /// [`get_at`]: archiver-db's snapshot engine
    pub fn upper_bound_at(ts: i64) -> Self {
        Self {
            packed: (ts << 1) | 1,
        }
    }
}

impl std::fmt::Display for Timing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}",
            self.timestamp_ms(),
            if self.realtime() { "r" } else { "b" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_and_unpacks() {
        let t = Timing::new(1_700_000_000_000, true);
        assert_eq!(t.timestamp_ms(), 1_700_000_000_000);
        assert!(t.realtime());

        let t = Timing::new(1_700_000_000_000, false);
        assert_eq!(t.timestamp_ms(), 1_700_000_000_000);
        assert!(!t.realtime());
    }

    #[test]
    fn orders_by_timestamp_first() {
        let earlier = Timing::new(100, true);
        let later_batch = Timing::new(101, false);
        assert!(earlier < later_batch);
    }

    #[test]
    fn upper_bound_includes_realtime_observations_at_ts() {
        let ts = 1_000;
        let bound = Timing::upper_bound_at(ts);
        assert!(Timing::new(ts, true) <= bound);
        assert!(Timing::new(ts, false) <= bound);
        assert!(bound < Timing::new(ts + 1, false));
    }
}
