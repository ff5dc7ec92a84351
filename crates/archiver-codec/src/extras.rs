use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

use archiver_core::ObjectKind;

const LOG_TARGET: &str = "archiver::codec";

/// Process-wide dedup for "unknown field" warnings: each
/// `(object_kind, path, key)` triple is logged only once per process
/// lifetime, no matter how many objects carry it.
fn seen_unknown_fields() -> &'static Mutex<HashSet<(ObjectKind, String, String)>> {
    static SEEN: OnceLock<Mutex<HashSet<(ObjectKind, String, String)>>> = OnceLock::new();
    SEEN.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Record an unknown key encountered while encoding `kind` at `path`; logs a
/// `tracing::warn!` the first time this exact triple is seen, stays silent
/// after that.
pub fn warn_unknown_field_once(kind: ObjectKind, path: &str, key: &str) {
    let mut seen = seen_unknown_fields().lock().expect("not poisoned");
    let triple = (kind, path.to_string(), key.to_string());
    if seen.insert(triple) {
        tracing::warn!(target: LOG_TARGET, %kind, path, key, "unrecognized field, preserved in extras");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_triple_recorded_only_once() {
        // Not a great test for the logging side-effect itself (tracing has
        // no queryable global state here), but it does exercise the dedup
        // set without panicking on repeated inserts.
        warn_unknown_field_once(ObjectKind::Message, "embeds.0", "mystery_field");
        warn_unknown_field_once(ObjectKind::Message, "embeds.0", "mystery_field");
        let seen = seen_unknown_fields().lock().unwrap();
        assert!(seen.contains(&(
            ObjectKind::Message,
            "embeds.0".to_string(),
            "mystery_field".to_string()
        )));
    }
}
