//! Name-based advertisement filtering.
//!
//! The filter is the only component that constructs observations; anything
//! it rejects is silently dropped.

use crate::observation::Observation;
use std::time::SystemTime;

/// Default substring an advertised name must contain to be recorded.
pub const DEFAULT_MATCH: &str = "Co";

/// Case-sensitive substring predicate over advertised device names.
#[derive(Debug, Clone)]
pub struct NameFilter {
    pattern: String,
}

impl NameFilter {
    pub fn new(pattern: impl Into<String>) -> Self {
        NameFilter {
            pattern: pattern.into(),
        }
    }

    /// Whether an advertised name passes the filter.
    ///
    /// Empty names never match; the test is a plain substring search, not a
    /// prefix, suffix, or pattern match.
    pub fn matches(&self, name: &str) -> bool {
        !name.is_empty() && name.contains(&self.pattern)
    }

    /// Build an observation for a matching advertisement.
    ///
    /// The capture time is stamped here, at acceptance. Non-matching records
    /// yield `None`.
    pub fn observe(&self, name: &str, rssi: i16) -> Option<Observation> {
        self.matches(name).then(|| Observation {
            name: name.to_owned(),
            rssi,
            captured_at: SystemTime::now(),
        })
    }
}

impl Default for NameFilter {
    fn default() -> Self {
        NameFilter::new(DEFAULT_MATCH)
    }
}
