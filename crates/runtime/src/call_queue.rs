//! Append-only, host-owned log of instruction records.
//!
//! Key properties:
//! - Sequence ids are assigned at append time from a per-queue counter and
//!   are never reused.
//! - Records are only ever appended; rotation drops a delivered prefix and
//!   never reorders what remains.
//! - Enqueueing never touches persisted map state. Callers that want an
//!   operation to survive a surface rebuild must also write it to the store.

use foundation::SequenceId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Props;

/// One instruction for the rendering surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: SequenceId,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Props,
}

impl CallRecord {
    pub fn arg(&self, idx: usize) -> Option<&Value> {
        self.args.get(idx)
    }

    pub fn arg_str(&self, idx: usize) -> Option<&str> {
        self.args.get(idx).and_then(Value::as_str)
    }
}

/// How a record id relates to the last one a consumer has seen.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Continuity {
    /// Exactly the next id (or the first id ever seen).
    Next,
    /// Already seen; the record must not be applied twice.
    Duplicate,
    /// One or more ids are missing between the two.
    Gap {
        expected: SequenceId,
        found: SequenceId,
    },
}

pub fn continuity(last_seen: Option<SequenceId>, id: SequenceId) -> Continuity {
    match last_seen {
        None => Continuity::Next,
        Some(last) if id <= last => Continuity::Duplicate,
        Some(last) if id == last.next() => Continuity::Next,
        Some(last) => Continuity::Gap {
            expected: last.next(),
            found: id,
        },
    }
}

#[derive(Debug, Default)]
pub struct CallQueue {
    next_id: u64,
    records: Vec<CallRecord>,
    delivered_through: Option<SequenceId>,
    max_retained: Option<usize>,
}

impl CallQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue that rotates delivered records out once more than `max_retained`
    /// are held. Undelivered records are never dropped.
    pub fn with_max_retained(max_retained: usize) -> Self {
        Self {
            max_retained: Some(max_retained),
            ..Self::default()
        }
    }

    pub fn max_retained(&self) -> Option<usize> {
        self.max_retained
    }

    pub fn enqueue(
        &mut self,
        method: impl Into<String>,
        args: Vec<Value>,
        kwargs: Props,
    ) -> SequenceId {
        let id = SequenceId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.records.push(CallRecord {
            id,
            method: method.into(),
            args,
            kwargs,
        });
        self.enforce_retention();
        id
    }

    /// Shorthand for a call with positional arguments only.
    pub fn call(&mut self, method: impl Into<String>, args: Vec<Value>) -> SequenceId {
        self.enqueue(method, args, Props::new())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every retained record, oldest first.
    pub fn records(&self) -> &[CallRecord] {
        &self.records
    }

    pub fn last_id(&self) -> Option<SequenceId> {
        self.records.last().map(|r| r.id)
    }

    pub fn delivered_through(&self) -> Option<SequenceId> {
        self.delivered_through
    }

    /// Records strictly after `after` (all retained records for `None`).
    pub fn since(&self, after: Option<SequenceId>) -> &[CallRecord] {
        match after {
            None => &self.records,
            Some(after) => {
                let start = self.records.partition_point(|r| r.id <= after);
                &self.records[start..]
            }
        }
    }

    /// Records not yet confirmed as delivered.
    pub fn pending(&self) -> &[CallRecord] {
        self.since(self.delivered_through)
    }

    /// Confirms delivery up to and including `through`. Older confirmations
    /// than the current boundary are ignored.
    pub fn mark_delivered(&mut self, through: SequenceId) {
        if self.delivered_through.is_none_or(|d| through > d) {
            self.delivered_through = Some(through);
        }
        self.enforce_retention();
    }

    /// Drops every delivered record. Returns how many were removed.
    pub fn truncate_delivered(&mut self) -> usize {
        let Some(through) = self.delivered_through else {
            return 0;
        };
        let cut = self.records.partition_point(|r| r.id <= through);
        self.records.drain(..cut);
        cut
    }

    fn enforce_retention(&mut self) {
        let Some(max) = self.max_retained else {
            return;
        };
        if self.records.len() <= max {
            return;
        }
        let Some(through) = self.delivered_through else {
            return;
        };
        let delivered = self.records.partition_point(|r| r.id <= through);
        let excess = self.records.len() - max;
        let cut = excess.min(delivered);
        self.records.drain(..cut);
    }
}
