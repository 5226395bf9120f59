//! Wire envelopes between the host and the rendering surface.
//!
//! The transport only promises that a replaced value is eventually seen by
//! the other side, so every envelope is self-contained: a batch of call
//! records, a full rebuild, or a batch of surface reports.

use foundation::SequenceId;
use runtime::{CallRecord, EventRecord};
use scene::MapSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Event type the surface uses to answer `getDrawData`; payload key `data`.
pub const DRAW_DATA_EVENT: &str = "draw_data";

/// Fallback answer when the surface has no drawn features to report.
pub fn empty_feature_collection() -> Value {
    json!({"type": "FeatureCollection", "features": []})
}

/// Host → surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// New records, in sequence order.
    Calls { calls: Vec<CallRecord> },
    /// Rebuild the surface from persisted state, then replay setters.
    /// `through` is the last record id the snapshot already accounts for.
    Snapshot {
        snapshot: Box<MapSnapshot>,
        #[serde(default)]
        replay: Vec<CallRecord>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        through: Option<SequenceId>,
    },
}

/// Surface → host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SurfaceMessage {
    /// Occurrences in arrival order.
    Events { events: Vec<EventRecord> },
    /// The backend can accept mutations.
    Ready,
    /// Every record up to and including `through` has been handled.
    Delivered { through: SequenceId },
    /// A record or snapshot definition could not be applied.
    ApplyFailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<SequenceId>,
        target: String,
        message: String,
    },
}

impl HostMessage {
    pub fn calls(calls: &[CallRecord]) -> Self {
        HostMessage::Calls {
            calls: calls.to_vec(),
        }
    }

    pub fn snapshot(
        snapshot: MapSnapshot,
        replay: Vec<CallRecord>,
        through: Option<SequenceId>,
    ) -> Self {
        HostMessage::Snapshot {
            snapshot: Box::new(snapshot),
            replay,
            through,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{HostMessage, SurfaceMessage};
    use foundation::SequenceId;
    use pretty_assertions::assert_eq;
    use runtime::{CallQueue, EventRecord};
    use scene::{BackendKind, MapSnapshot};
    use serde_json::json;

    #[test]
    fn calls_envelope_is_tagged() {
        let mut queue = CallQueue::new();
        queue.call("flyTo", vec![json!({"center": [51.5, -0.1], "zoom": 14})]);
        let msg = HostMessage::calls(queue.records());
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "calls",
                "calls": [{
                    "id": 0,
                    "method": "flyTo",
                    "args": [{"center": [51.5, -0.1], "zoom": 14}],
                    "kwargs": {}
                }]
            })
        );
    }

    #[test]
    fn snapshot_envelope_defaults_to_no_replay() {
        let snapshot = MapSnapshot::empty(BackendKind::Leaflet);
        let message = HostMessage::snapshot(snapshot, vec![], None);
        let mut value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], json!("snapshot"));
        assert!(value.get("through").is_none());

        value.as_object_mut().unwrap().remove("replay");
        let back: HostMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn surface_messages_parse_from_wire() {
        let msgs: Vec<SurfaceMessage> = serde_json::from_value(json!([
            {"type": "ready"},
            {"type": "events", "events": [{"type": "click", "lngLat": [1, 2]}]},
            {"type": "delivered", "through": 4},
            {"type": "apply_failed", "target": "roads", "message": "unknown source"}
        ]))
        .unwrap();
        assert_eq!(
            msgs,
            vec![
                SurfaceMessage::Ready,
                SurfaceMessage::Events {
                    events: vec![EventRecord::new("click").with("lngLat", json!([1, 2]))]
                },
                SurfaceMessage::Delivered {
                    through: SequenceId(4)
                },
                SurfaceMessage::ApplyFailed {
                    id: None,
                    target: "roads".into(),
                    message: "unknown source".into()
                },
            ]
        );
    }
}
