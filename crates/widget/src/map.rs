//! Host-side session: one store, one call queue, one event inbox, and
//! optionally a surface on the other end of a [`Bridge`].
//!
//! Persisted operations write the store and enqueue a record; transient
//! ones only enqueue. Nothing reaches the surface until the session is
//! flushed, which happens after every mutation while a surface is attached
//! (once per [`MapWidget::batch`]) and on [`MapWidget::sync`].

use std::path::Path;
use std::time::Duration;

use foundation::{IdCounter, SequenceId};
use formats::{ExportTarget, export, export_to_file};
use runtime::{
    CallQueue, CallRecord, DrainReport, EventInbox, EventRecord, HandlerResult, Props, PullPolicy,
    Pulled, SubscriptionId, pull,
};
use scene::{BackendKind, ChangeSet, Channel, ControlDef, ControlKind, MapSnapshot, StateStore};
use serde_json::{Value, json};
use streaming::{
    Bridge, DRAW_DATA_EVENT, HostMessage, Method, SurfaceMessage, SyncConfig,
    empty_feature_collection, replayable_setters, resolve_access_token,
};
use tracing::{debug, info, warn};

use crate::error::WidgetError;

/// A record or definition the surface could not apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFailure {
    pub id: Option<SequenceId>,
    pub target: String,
    pub message: String,
}

/// What one [`MapWidget::sync`] did.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Call records handed to the bridge.
    pub sent: usize,
    /// Store channels published since the previous sync.
    pub changes: ChangeSet,
    pub events: DrainReport,
    pub failures: Vec<RemoteFailure>,
}

pub struct MapWidget {
    pub(crate) store: StateStore,
    pub(crate) queue: CallQueue,
    pub(crate) ids: IdCounter,
    inbox: EventInbox,
    config: SyncConfig,
    bridge: Option<Box<dyn Bridge>>,
    sent_through: Option<SequenceId>,
    surface_ready: bool,
    batch_depth: usize,
    changes: ChangeSet,
    failures: Vec<RemoteFailure>,
    draw_reply: Option<Value>,
}

impl std::fmt::Debug for MapWidget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapWidget")
            .field("backend", &self.store.backend())
            .field("queued", &self.queue.len())
            .field("connected", &self.bridge.is_some())
            .field("surface_ready", &self.surface_ready)
            .finish()
    }
}

impl MapWidget {
    /// New session configured from the environment.
    pub fn new(backend: BackendKind) -> Self {
        Self::with_config(backend, SyncConfig::from_env())
    }

    pub fn with_config(backend: BackendKind, config: SyncConfig) -> Self {
        let mut store = StateStore::new(backend);
        if backend.requires_token() {
            match resolve_access_token(backend) {
                Some(token) => store.set_access_token(Some(token)),
                None => warn!(
                    "no access token found for {backend} (tried {:?})",
                    backend.token_env_vars()
                ),
            }
        }
        let queue = match config.max_retained_calls {
            Some(max) => CallQueue::with_max_retained(max),
            None => CallQueue::new(),
        };
        Self {
            store,
            queue,
            ids: IdCounter::new(),
            inbox: EventInbox::new(),
            config,
            bridge: None,
            sent_through: None,
            surface_ready: false,
            batch_depth: 0,
            changes: ChangeSet::default(),
            failures: Vec::new(),
            draw_reply: None,
        }
    }

    /// Restores a session from a saved snapshot. The queue starts empty.
    pub fn from_snapshot(snapshot: MapSnapshot, config: SyncConfig) -> Self {
        let mut widget = Self::with_config(snapshot.backend, config);
        widget.store = StateStore::from_snapshot(snapshot);
        widget
    }

    pub fn backend(&self) -> BackendKind {
        self.store.backend()
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn queue(&self) -> &CallQueue {
        &self.queue
    }

    pub fn inbox(&self) -> &EventInbox {
        &self.inbox
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn snapshot(&self) -> MapSnapshot {
        self.store.snapshot()
    }

    pub fn is_connected(&self) -> bool {
        self.bridge.is_some()
    }

    pub fn surface_ready(&self) -> bool {
        self.surface_ready
    }

    /// Sets the access token for token-gated backends.
    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.store.set_access_token(Some(token.into()));
        self.after_mutation();
    }

    /// Queues an arbitrary method for the surface.
    pub fn call(&mut self, method: &str, args: Vec<Value>, kwargs: Props) -> SequenceId {
        let id = self.queue.enqueue(method, args, kwargs);
        self.after_mutation();
        id
    }

    /// Runs `f` with flushing suspended, then flushes once.
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.batch_depth += 1;
        let out = f(self);
        self.batch_depth -= 1;
        self.after_mutation();
        out
    }

    /// Registers a handler for surface events of one type.
    pub fn on_map_event(
        &mut self,
        event_type: &str,
        handler: impl FnMut(&EventRecord) -> HandlerResult + 'static,
    ) -> SubscriptionId {
        self.inbox.subscribe(event_type, handler)
    }

    pub fn off_map_event(&mut self, id: SubscriptionId) -> bool {
        self.inbox.unsubscribe(id)
    }

    /// Attaches a surface and rebuilds it from the current state.
    pub fn connect(&mut self, bridge: impl Bridge + 'static) {
        self.bridge = Some(Box::new(bridge));
        self.send_snapshot();
    }

    /// Detaches the surface. Queued records stay in the queue.
    pub fn disconnect(&mut self) -> Option<Box<dyn Bridge>> {
        self.surface_ready = false;
        self.sent_through = None;
        self.bridge.take()
    }

    /// Rebuilds the attached surface from a snapshot plus replayable setters.
    pub fn reconnect(&mut self) -> Result<(), WidgetError> {
        if self.bridge.is_none() {
            return Err(WidgetError::NotConnected);
        }
        self.send_snapshot();
        Ok(())
    }

    /// Delivers pending records, collects surface replies and runs event
    /// handlers.
    pub fn sync(&mut self) -> SyncReport {
        let sent = self.flush();
        self.collect();
        let events = self.inbox.drain();
        SyncReport {
            sent,
            changes: std::mem::take(&mut self.changes),
            events,
            failures: std::mem::take(&mut self.failures),
        }
    }

    /// Current drawn features, waiting up to the configured pull timeout.
    pub fn get_draw_data(&mut self) -> Value {
        self.get_draw_data_with_timeout(self.config.pull_timeout)
            .into_inner()
    }

    /// Asks the surface for its drawn features and waits up to `timeout`.
    ///
    /// On timeout the last known draw data (or an empty feature collection)
    /// comes back as [`Pulled::TimedOut`].
    pub fn get_draw_data_with_timeout(&mut self, timeout: Duration) -> Pulled<Value> {
        let policy = PullPolicy {
            timeout,
            ..self.config.pull_policy()
        };
        let fallback = self
            .store
            .draw_data()
            .cloned()
            .unwrap_or_else(empty_feature_collection);

        if self.bridge.is_none() {
            debug!("no surface attached; answering getDrawData from the store");
            return Pulled::TimedOut(fallback);
        }
        self.draw_reply = None;
        self.queue.call(Method::GetDrawData.name(), Vec::new());
        self.flush();

        let pulled = pull(
            policy,
            || {
                self.collect();
                self.draw_reply.take()
            },
            || fallback,
        );
        match &pulled {
            Pulled::Fresh(data) => self.store.set_draw_data(Some(data.clone())),
            Pulled::TimedOut(_) => warn!("surface did not report draw data within {timeout:?}"),
        }
        pulled
    }

    pub fn to_html(&self, target: &ExportTarget) -> Result<String, WidgetError> {
        Ok(export(&self.store.snapshot(), target)?)
    }

    pub fn save_html(
        &self,
        path: impl AsRef<Path>,
        target: &ExportTarget,
    ) -> Result<(), WidgetError> {
        Ok(export_to_file(&self.store.snapshot(), target, path)?)
    }

    pub(crate) fn after_mutation(&mut self) {
        if self.batch_depth == 0 && self.bridge.is_some() {
            self.flush();
        }
    }

    /// Publishes store changes and sends every record the surface has not
    /// been handed yet. Returns how many were sent.
    fn flush(&mut self) -> usize {
        self.publish_changes();
        let Some(bridge) = self.bridge.as_mut() else {
            return 0;
        };
        let calls = self.queue.since(self.sent_through);
        let Some(last) = calls.last() else {
            return 0;
        };
        self.sent_through = Some(last.id);
        let sent = calls.len();
        debug!("sending {sent} calls through {}", last.id);
        bridge.send(HostMessage::calls(calls));
        sent
    }

    fn publish_changes(&mut self) {
        let changes = self.store.notify();
        if changes.contains(Channel::LayerStates) {
            self.refresh_layer_controls();
        }
        for channel in changes.channels {
            if !self.changes.contains(channel) {
                self.changes.channels.push(channel);
            }
        }
    }

    /// Re-sends every layer control with its recomputed layer states.
    fn refresh_layer_controls(&mut self) {
        let controls: Vec<ControlDef> = self
            .store
            .controls()
            .values()
            .filter(|def| def.kind == ControlKind::LayerControl)
            .cloned()
            .collect();
        for def in controls {
            self.queue.call(
                Method::RemoveControl.name(),
                vec![json!(def.kind.as_str()), json!(def.position.as_str())],
            );
            self.queue.call(Method::AddControl.name(), control_args(&def));
        }
    }

    fn send_snapshot(&mut self) {
        self.publish_changes();
        let Some(bridge) = self.bridge.as_mut() else {
            return;
        };
        let snapshot = self.store.snapshot();
        let replay: Vec<CallRecord> = replayable_setters(&snapshot, self.queue.records())
            .into_iter()
            .cloned()
            .collect();
        let through = self.queue.last_id();
        info!(
            "rebuilding {} surface: {} layers, {} setters to replay",
            snapshot.backend,
            snapshot.layers.len(),
            replay.len()
        );
        bridge.send(HostMessage::snapshot(snapshot, replay, through));

        self.surface_ready = false;
        self.sent_through = through;
        if let Some(through) = through {
            self.queue.mark_delivered(through);
        }
    }

    fn collect(&mut self) {
        let Some(bridge) = self.bridge.as_mut() else {
            return;
        };
        for message in bridge.receive() {
            match message {
                SurfaceMessage::Events { events } => {
                    if let Some(reply) = events.iter().rev().find(|e| e.kind == DRAW_DATA_EVENT) {
                        self.draw_reply = Some(
                            reply
                                .get("data")
                                .cloned()
                                .unwrap_or_else(empty_feature_collection),
                        );
                    }
                    self.inbox.publish_all(events);
                }
                SurfaceMessage::Ready => {
                    debug!("surface ready");
                    self.surface_ready = true;
                }
                SurfaceMessage::Delivered { through } => self.queue.mark_delivered(through),
                SurfaceMessage::ApplyFailed {
                    id,
                    target,
                    message,
                } => {
                    warn!("surface failed to apply {target}: {message}");
                    self.failures.push(RemoteFailure {
                        id,
                        target,
                        message,
                    });
                }
            }
        }
    }
}

/// `[type, {position, ...options}]`, the argument layout of `addControl`.
pub(crate) fn control_args(def: &ControlDef) -> Vec<Value> {
    let mut options = def.options.clone();
    options.insert("position".to_string(), json!(def.position.as_str()));
    vec![json!(def.kind.as_str()), Value::Object(options)]
}

#[cfg(test)]
mod tests {
    use super::MapWidget;
    use crate::producers::LayerOptions;
    use foundation::{LatLng, SequenceId};
    use formats::ExportTarget;
    use pretty_assertions::assert_eq;
    use runtime::{EventRecord, Props, Pulled};
    use scene::{BackendKind, Channel, ControlKind, ControlPosition, LayerDef, SourceDef, StyleRef};
    use serde_json::{Value, json};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;
    use streaming::{HostMessage, MemoryBridge, SyncConfig};
    use surface::{LocalBridge, RecordingBackend};

    type Surface = Rc<RefCell<LocalBridge<RecordingBackend>>>;

    fn surface() -> Surface {
        Rc::new(RefCell::new(LocalBridge::new(RecordingBackend::new())))
    }

    fn connected() -> (MapWidget, Surface) {
        let mut widget = MapWidget::with_config(BackendKind::MapLibre, SyncConfig::default());
        let surface = surface();
        widget.connect(surface.clone());
        (widget, surface)
    }

    fn points() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [-0.1, 51.5]},
                "properties": {}
            }]
        })
    }

    fn methods(widget: &MapWidget) -> Vec<&str> {
        widget
            .queue()
            .records()
            .iter()
            .map(|r| r.method.as_str())
            .collect()
    }

    #[test]
    fn fly_to_only_queues_a_record() {
        let mut widget = MapWidget::with_config(BackendKind::MapLibre, SyncConfig::default());
        let before = *widget.store().viewport();

        widget.fly_to(LatLng::new(51.5, -0.1), Some(14.0));

        let records = widget.queue().records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].method, "flyTo");
        assert_eq!(records[0].args, vec![json!({"center": [-0.1, 51.5], "zoom": 14.0})]);
        assert_eq!(*widget.store().viewport(), before);
    }

    #[test]
    fn layer_control_shows_new_layer_without_explicit_refresh() {
        let mut widget = MapWidget::with_config(BackendKind::MapLibre, SyncConfig::default());
        widget.add_layer_control(ControlPosition::TopRight, None);
        let options = LayerOptions::default().opacity(0.5);
        widget
            .add_layer("x", LayerDef::new("x", "background"), options)
            .unwrap();

        let control = widget
            .store()
            .controls()
            .values()
            .find(|c| c.kind == ControlKind::LayerControl)
            .unwrap();
        assert_eq!(control.options["layerStates"]["x"]["opacity"], json!(0.5));
        assert_eq!(control.options["layerStates"]["x"]["visible"], json!(true));
    }

    #[test]
    fn mutations_reach_an_attached_surface_immediately() {
        let (mut widget, surface) = connected();
        widget
            .add_geojson_layer("dots", points(), "circle", Props::new())
            .unwrap();

        let bridge = surface.borrow();
        let view = bridge.backend().view();
        assert_eq!(view.source_ids(), vec!["dots_source"]);
        assert_eq!(view.layer_ids(), vec!["dots"]);
        assert_eq!(
            bridge.backend().ops(),
            &["addSource dots_source".to_string(), "addLayer dots".to_string()]
        );
    }

    #[test]
    fn batch_sends_one_envelope() {
        let mut widget = MapWidget::with_config(BackendKind::MapLibre, SyncConfig::default());
        let bridge = Rc::new(RefCell::new(MemoryBridge::new()));
        widget.connect(bridge.clone());

        widget.batch(|w| {
            w.add_source("s", SourceDef::geojson(points())).unwrap();
            let def = LayerDef::new("a", "circle").with_source("s");
            w.add_layer("a", def, LayerOptions::default()).unwrap();
            w.set_zoom(4.0);
        });

        let bridge = bridge.borrow();
        let sent = &bridge.sent;
        assert_eq!(sent.len(), 2);
        assert!(matches!(sent[0], HostMessage::Snapshot { .. }));
        let HostMessage::Calls { calls } = &sent[1] else {
            panic!("expected a calls envelope");
        };
        let names: Vec<&str> = calls.iter().map(|c| c.method.as_str()).collect();
        assert_eq!(names, vec!["addSource", "addLayer", "jumpTo"]);
    }

    #[test]
    fn reconnect_rebuilds_the_same_map() {
        let (mut widget, first) = connected();
        widget
            .add_geojson_layer("dots", points(), "circle", Props::new())
            .unwrap();
        widget
            .add_layer(
                "bg",
                LayerDef::new("bg", "background"),
                LayerOptions::default().before("dots"),
            )
            .unwrap();
        widget.set_paint_property("dots", "circle-color", json!("#f00"));
        widget.set_opacity("dots", 0.4);
        widget.set_visibility("bg", false);
        widget.add_control(ControlKind::Navigation, ControlPosition::TopLeft, Props::new());
        widget.sync();

        let second = surface();
        widget.disconnect();
        widget.connect(second.clone());

        let a = first.borrow();
        let b = second.borrow();
        assert_eq!(b.backend().view().layer_ids(), vec!["bg", "dots"]);
        assert_eq!(a.backend().view().layers, b.backend().view().layers);
        assert_eq!(a.backend().view().sources, b.backend().view().sources);
        assert_eq!(a.backend().view().controls, b.backend().view().controls);
        assert_eq!(a.backend().view().map_properties, b.backend().view().map_properties);
    }

    #[test]
    fn reconnect_after_superseding_writes_matches_the_live_map() {
        let (mut widget, first) = connected();
        widget.set_style(StyleRef::Url("https://a/style.json".into()));
        widget.set_style(StyleRef::Url("https://b/style.json".into()));
        widget.set_terrain(Some(json!({"source": "dem"})));
        widget.set_terrain(None);
        widget.set_fog(Some(json!({"range": [1, 10]})));

        widget.add_source("s", SourceDef::geojson(points())).unwrap();
        let red = LayerDef::new("a", "circle")
            .with_source("s")
            .with_paint("circle-color", json!("red"));
        widget.add_layer("a", red, LayerOptions::default()).unwrap();
        widget.set_paint_property("a", "circle-color", json!("blue"));
        let green = LayerDef::new("a", "circle")
            .with_source("s")
            .with_paint("circle-color", json!("green"));
        widget.add_layer("a", green, LayerOptions::default()).unwrap();
        widget.set_opacity("a", 0.3);
        widget.add_marker(LatLng::new(51.5, -0.1), Some("here")).unwrap();
        assert!(widget.sync().failures.is_empty());

        let second = surface();
        widget.disconnect();
        widget.connect(second.clone());
        assert!(widget.sync().failures.is_empty());

        let live = first.borrow();
        let rebuilt = second.borrow();
        let (a, b) = (live.backend().view(), rebuilt.backend().view());
        assert_eq!(b.layer("a").unwrap().paint["circle-color"], json!("green"));
        assert_eq!(b.map_properties["style"], json!("https://b/style.json"));
        assert!(!b.map_properties.contains_key("terrain"));
        assert_eq!(a.layers, b.layers);
        assert_eq!(a.sources, b.sources);
        assert_eq!(a.map_properties, b.map_properties);
        assert_eq!(a.markers, b.markers);
    }

    #[test]
    fn reconnect_needs_a_surface() {
        let mut widget = MapWidget::with_config(BackendKind::MapLibre, SyncConfig::default());
        assert!(widget.reconnect().is_err());
    }

    #[test]
    fn records_covered_by_a_rebuild_are_not_applied_again() {
        let (mut widget, surface) = connected();
        widget
            .add_geojson_layer("dots", points(), "circle", Props::new())
            .unwrap();
        widget.reconnect().unwrap();
        let report = widget.sync();

        assert!(report.failures.is_empty());
        assert_eq!(surface.borrow().backend().instances(), 2);
        assert_eq!(surface.borrow().backend().view().layer_ids(), vec!["dots"]);
        assert!(widget.surface_ready());
    }

    #[test]
    fn sync_acknowledges_delivery_and_reports_changes() {
        let (mut widget, _surface) = connected();
        widget
            .add_layer("a", LayerDef::new("a", "background"), LayerOptions::default())
            .unwrap();
        let report = widget.sync();

        assert_eq!(widget.queue().delivered_through(), Some(SequenceId(0)));
        assert!(report.changes.contains(Channel::Layers));
        assert!(report.changes.contains(Channel::LayerStates));
        assert!(widget.sync().changes.is_empty());
    }

    #[test]
    fn surface_failures_come_back_in_the_sync_report() {
        let (mut widget, _surface) = connected();
        widget
            .add_layer(
                "orphan",
                LayerDef::new("orphan", "circle").with_source("missing"),
                LayerOptions::default(),
            )
            .unwrap();
        widget
            .add_layer("ok", LayerDef::new("ok", "background"), LayerOptions::default())
            .unwrap();

        let report = widget.sync();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, Some(SequenceId(0)));
    }

    #[test]
    fn surface_events_reach_handlers_in_order() {
        let (mut widget, surface) = connected();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let first = seen.clone();
        widget.on_map_event("click", move |_| {
            first.borrow_mut().push("first");
            Ok(())
        });
        let second = seen.clone();
        widget.on_map_event("click", move |_| {
            second.borrow_mut().push("second");
            Ok(())
        });

        surface
            .borrow_mut()
            .backend_mut()
            .push_event(EventRecord::new("click").with("lngLat", json!([-0.1, 51.5])));
        let report = widget.sync();

        assert_eq!(report.events.events, 1);
        assert_eq!(*seen.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn draw_data_is_pulled_from_the_surface() {
        let (mut widget, _surface) = connected();
        widget.add_draw_control(ControlPosition::TopLeft, Props::new());
        widget.load_draw_data(points());

        let pulled = widget.get_draw_data_with_timeout(Duration::from_millis(50));
        assert_eq!(pulled, Pulled::Fresh(points()));

        widget.clear_draw_data();
        assert_eq!(widget.get_draw_data()["features"], json!([]));
    }

    #[test]
    fn draw_data_without_surface_falls_back_to_the_store() {
        let mut widget = MapWidget::with_config(BackendKind::MapLibre, SyncConfig::default());
        let empty = widget.get_draw_data_with_timeout(Duration::from_millis(10));
        assert_eq!(
            empty,
            Pulled::TimedOut(json!({"type": "FeatureCollection", "features": []}))
        );

        widget.load_draw_data(points());
        assert_eq!(widget.get_draw_data(), points());
        assert_eq!(methods(&widget), vec!["loadDrawData"]);
    }

    #[test]
    fn html_export_embeds_current_state() {
        let mut widget = MapWidget::with_config(BackendKind::MapLibre, SyncConfig::default());
        widget
            .add_geojson_layer("dots", points(), "circle", Props::new())
            .unwrap();
        let html = widget
            .to_html(&ExportTarget::default().with_title("Dots"))
            .unwrap();
        assert!(html.contains("<title>Dots</title>"));
        assert!(html.contains("dots_source"));
    }

    #[test]
    fn restored_session_keeps_layers() {
        let mut widget = MapWidget::with_config(BackendKind::MapLibre, SyncConfig::default());
        widget
            .add_layer("a", LayerDef::new("a", "background"), LayerOptions::default())
            .unwrap();
        let restored = MapWidget::from_snapshot(widget.snapshot(), SyncConfig::default());
        assert_eq!(restored.snapshot(), widget.snapshot());
        assert!(restored.queue().is_empty());
    }
}
