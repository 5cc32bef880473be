//! Child container naming.
//!
//! A child is named `{parent-base}-{leaf}-{unix-seconds}{extension}`, e.g.
//! `master-Compressed_Data-1700000000.split`. The parent base keeps any
//! directory prefix of the parent's name, so children land next to it.
//! Names issued by one connector within the same second get `_1`, `_2`, ...
//! appended to the timestamp.

use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::SplitConfig;

/// Last non-empty `/`-separated segment of `path`.
///
/// `.` and `..` name a group relative to the path, not a new link, so a
/// path ending in one has no dataset name.
pub fn dataset_leaf_name(path: &str) -> Option<&str> {
    path.rsplit('/')
        .find(|s| !s.is_empty())
        .filter(|s| !matches!(*s, "." | ".."))
}

/// Parent base name: the parent's name minus a trailing suffix, or the
/// configured fallback when the name is unavailable or ends up empty.
pub fn parent_base_name<'a>(parent: Option<&'a str>, config: &'a SplitConfig) -> &'a str {
    let base = parent.map(|name| {
        if config.strip_suffix.is_empty() {
            name
        } else {
            name.strip_suffix(config.strip_suffix.as_str()).unwrap_or(name)
        }
    });
    match base {
        Some(b) if !b.is_empty() => b,
        _ => &config.fallback_base,
    }
}

/// Seconds since the Unix epoch; 0 if the clock is before it.
pub fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Issues child container names, one disambiguator sequence per connector.
pub struct NameSynthesizer {
    clock: fn() -> u64,
    /// Timestamp and sequence number of the last name issued.
    last: Mutex<Option<(u64, u32)>>,
}

impl NameSynthesizer {
    pub fn new() -> Self {
        Self::with_clock(unix_seconds)
    }

    /// Use `clock` instead of the system time.
    pub fn with_clock(clock: fn() -> u64) -> Self {
        Self {
            clock,
            last: Mutex::new(None),
        }
    }

    /// Name for the child container holding `leaf`.
    pub fn child_name(&self, parent_base: &str, leaf: &str, config: &SplitConfig) -> String {
        let (ts, seq) = if config.unique_suffix {
            self.next_stamp()
        } else {
            ((self.clock)(), 0)
        };
        if seq == 0 {
            format!("{parent_base}-{leaf}-{ts}{}", config.extension)
        } else {
            format!("{parent_base}-{leaf}-{ts}_{seq}{}", config.extension)
        }
    }

    fn next_stamp(&self) -> (u64, u32) {
        let now = (self.clock)();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let stamp = match *last {
            // A clock that steps backwards keeps counting in the newest second.
            Some((ts, seq)) if now <= ts => (ts, seq + 1),
            _ => (now, 0),
        };
        *last = Some(stamp);
        stamp
    }
}

impl Default for NameSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}
