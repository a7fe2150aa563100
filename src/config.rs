//! Config store abstraction (component B).
//!
//! A read-only `(section, key) -> value` string lookup, re-read on
//! `EV_CONFIG_RELOAD`. The core only ever reads `("ppp", "mppe")`,
//! `("ppp", "mppe-128")`, `("ppp", "mppe-40")` and `("ppp", "accm")`; the
//! real backing store (a file, a database, whatever accel-ppp's daemon
//! wires up) is out of scope here.

use heapless::{FnvIndexMap, String};

/// Read-only config lookup, reloadable.
pub trait ConfigStore {
    /// Look up `key` within `section`. Returns `None` if unset.
    fn get(&self, section: &str, key: &str) -> Option<&str>;
}

const MAX_ENTRIES: usize = 16;

/// A fixed-capacity in-memory [`ConfigStore`], useful for tests and as a
/// reference implementation for embedders that don't need a real file-backed
/// store.
#[derive(Default)]
pub struct StaticConfig {
    entries: FnvIndexMap<String<48>, String<64>, MAX_ENTRIES>,
}

impl StaticConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `section.key = value`. Panics if the map's fixed capacity
    /// (16 entries) is exceeded; this is a test/reference helper, not a
    /// general-purpose config backend.
    pub fn set(&mut self, section: &str, key: &str, value: &str) -> &mut Self {
        let mut k = String::new();
        let _ = k.push_str(section);
        let _ = k.push('.');
        let _ = k.push_str(key);
        let v = String::try_from(value).expect("config value too long");
        self.entries
            .insert(k, v)
            .map_err(|_| "config capacity exceeded")
            .unwrap();
        self
    }
}

impl ConfigStore for StaticConfig {
    fn get(&self, section: &str, key: &str) -> Option<&str> {
        let mut k: String<48> = String::new();
        let _ = k.push_str(section);
        let _ = k.push('.');
        let _ = k.push_str(key);
        self.entries.get(&k).map(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_roundtrips_through_set() {
        let mut cfg = StaticConfig::new();
        cfg.set("ppp", "mppe", "require");
        assert_eq!(cfg.get("ppp", "mppe"), Some("require"));
        assert_eq!(cfg.get("ppp", "accm"), None);
    }
}
