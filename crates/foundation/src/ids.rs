use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a record in an append-only log.
///
/// Assigned once at append time and never reused, so a consumer can detect
/// gaps and duplicates. It is not a correlation id for responses.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceId(pub u64);

impl SequenceId {
    pub fn new(n: u64) -> Self {
        SequenceId(n)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        SequenceId(self.0.wrapping_add(1))
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-instance generator for prefixed ids (`marker_0`, `point_1`, ...).
///
/// Each prefix counts independently. Two generators never share state, so two
/// sessions can hand out the same names without colliding inside either one.
#[derive(Debug, Default, Clone)]
pub struct IdCounter {
    next: BTreeMap<String, u64>,
}

impl IdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self, prefix: &str) -> String {
        let slot = self.next.entry(prefix.to_string()).or_insert(0);
        let id = format!("{prefix}_{slot}");
        *slot += 1;
        id
    }

    /// Number of ids handed out so far for `prefix`.
    pub fn issued(&self, prefix: &str) -> u64 {
        self.next.get(prefix).copied().unwrap_or(0)
    }
}
