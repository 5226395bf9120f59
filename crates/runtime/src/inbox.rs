use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::Props;
use crate::metrics::Metrics;

/// Occurrence reported by the rendering surface (click, zoom end, draw edit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub payload: Props,
}

impl EventRecord {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Props::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = Result<(), HandlerError>;

type Handler = Box<dyn FnMut(&EventRecord) -> HandlerResult>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    handler: Handler,
}

/// A handler that returned an error or panicked while a batch was drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub subscription: SubscriptionId,
    pub event_type: String,
    pub message: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub events: usize,
    pub handler_calls: usize,
    pub failures: Vec<HandlerFailure>,
}

/// Surface-to-host event log plus the host's handler registry.
///
/// `publish` is the only write path from the surface side. `drain` hands
/// every pending event, in arrival order, to every handler registered for its
/// type, in registration order. A failing handler never stops the others.
#[derive(Default)]
pub struct EventInbox {
    pending: Vec<EventRecord>,
    subscriptions: IndexMap<String, Vec<Subscription>>,
    next_subscription: u64,
    metrics: Metrics,
}

impl fmt::Debug for EventInbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers: Vec<(&str, usize)> = self
            .subscriptions
            .iter()
            .map(|(k, v)| (k.as_str(), v.len()))
            .collect();
        f.debug_struct("EventInbox")
            .field("pending", &self.pending)
            .field("handlers", &handlers)
            .field("metrics", &self.metrics)
            .finish()
    }
}

impl EventInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, event: EventRecord) {
        self.pending.push(event);
    }

    pub fn publish_all(&mut self, events: impl IntoIterator<Item = EventRecord>) {
        self.pending.extend(events);
    }

    pub fn pending(&self) -> &[EventRecord] {
        &self.pending
    }

    pub fn subscribe(
        &mut self,
        event_type: impl Into<String>,
        handler: impl FnMut(&EventRecord) -> HandlerResult + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscriptions
            .entry(event_type.into())
            .or_default()
            .push(Subscription {
                id,
                handler: Box::new(handler),
            });
        id
    }

    /// Removes a handler. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        for subs in self.subscriptions.values_mut() {
            if let Some(pos) = subs.iter().position(|s| s.id == id) {
                subs.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.subscriptions.get(event_type).map_or(0, Vec::len)
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Dispatches and consumes every pending event.
    pub fn drain(&mut self) -> DrainReport {
        let batch = std::mem::take(&mut self.pending);
        let mut report = DrainReport::default();

        for event in &batch {
            report.events += 1;
            let Some(subs) = self.subscriptions.get_mut(&event.kind) else {
                debug!("no handler for event type {}", event.kind);
                continue;
            };
            for sub in subs.iter_mut() {
                report.handler_calls += 1;
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| (sub.handler)(event)));
                let message = match outcome {
                    Ok(Ok(())) => continue,
                    Ok(Err(err)) => err.to_string(),
                    Err(payload) => panic_message(payload.as_ref()),
                };
                warn!("handler for {} failed: {message}", event.kind);
                report.failures.push(HandlerFailure {
                    subscription: sub.id,
                    event_type: event.kind.clone(),
                    message,
                });
            }
        }

        self.metrics.inc_by("events.dispatched", report.events as u64);
        self.metrics.inc_by("handlers.called", report.handler_calls as u64);
        self.metrics.inc_by("handlers.failed", report.failures.len() as u64);
        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
