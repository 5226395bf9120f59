use foundation::{LatLng, Viewport, ViewportUpdate};
use indexmap::IndexMap;
use runtime::Synced;
use serde_json::Value;
use tracing::debug;

use crate::backend_kind::{BackendKind, MapScalars, StyleRef};
use crate::control::{ControlDef, ControlKey, ControlKind};
use crate::layer::{LayerDef, LayerEntry};
use crate::layer_control::{LayerControlPhase, LayerState, layer_states, refresh_options};
use crate::snapshot::MapSnapshot;
use crate::source::SourceDef;

/// Synchronized channels of the store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Viewport,
    Scalars,
    Layers,
    Sources,
    Controls,
    LayerStates,
    DrawData,
}

/// Channels whose version moved in one `notify`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub channels: Vec<Channel>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn contains(&self, channel: Channel) -> bool {
        self.channels.contains(&channel)
    }
}

/// Declarative, persistent description of one map session.
///
/// Every mutator is total: removing something that is not there is a no-op.
/// Writes only mark channels dirty; [`StateStore::notify`] publishes them in
/// one step so a run of mutations costs a single resync.
#[derive(Debug)]
pub struct StateStore {
    backend: BackendKind,
    viewport: Synced<Viewport>,
    scalars: Synced<MapScalars>,
    layers: Synced<IndexMap<String, LayerEntry>>,
    sources: Synced<IndexMap<String, SourceDef>>,
    controls: Synced<IndexMap<ControlKey, ControlDef>>,
    layer_states: Synced<IndexMap<String, LayerState>>,
    draw_data: Synced<Option<Value>>,
    phase: LayerControlPhase,
}

impl StateStore {
    pub fn new(backend: BackendKind) -> Self {
        Self::from_snapshot(MapSnapshot::empty(backend))
    }

    /// Rebuilds a store from a snapshot. All channels start clean.
    pub fn from_snapshot(snapshot: MapSnapshot) -> Self {
        let phase = if snapshot
            .controls
            .values()
            .any(|c| c.kind == ControlKind::LayerControl)
        {
            LayerControlPhase::Created
        } else {
            LayerControlPhase::Uncreated
        };
        let states = layer_states(&snapshot.layers, None);
        Self {
            backend: snapshot.backend,
            viewport: Synced::new(snapshot.viewport),
            scalars: Synced::new(snapshot.scalars),
            layers: Synced::new(snapshot.layers),
            sources: Synced::new(snapshot.sources),
            controls: Synced::new(snapshot.controls),
            layer_states: Synced::new(states),
            draw_data: Synced::new(snapshot.draw_data),
            phase,
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn viewport(&self) -> &Viewport {
        self.viewport.get()
    }

    /// Applies a partial viewport change under the backend's limits.
    /// Returns true when anything changed.
    pub fn set_viewport(&mut self, update: ViewportUpdate) -> bool {
        let mut next = *self.viewport.get();
        if !next.apply(update, self.backend.pitch_limit()) {
            return false;
        }
        self.viewport.set(next);
        true
    }

    pub fn set_center(&mut self, center: LatLng) -> bool {
        self.set_viewport(ViewportUpdate::center(center))
    }

    pub fn set_zoom(&mut self, zoom: f64) -> bool {
        self.set_viewport(ViewportUpdate::zoom(zoom))
    }

    pub fn scalars(&self) -> &MapScalars {
        self.scalars.get()
    }

    pub fn set_scalars(&mut self, scalars: MapScalars) {
        self.scalars.set_if_changed(scalars);
    }

    pub fn set_style(&mut self, style: StyleRef) {
        self.scalars.edit(|s| s.style = Some(style));
    }

    pub fn set_access_token(&mut self, token: Option<String>) {
        self.scalars.edit(|s| s.access_token = token);
    }

    pub fn set_antialias(&mut self, antialias: bool) {
        self.scalars.edit(|s| s.antialias = antialias);
    }

    pub fn set_projection(&mut self, projection: Option<Value>) {
        self.scalars.edit(|s| s.projection = projection);
    }

    pub fn set_terrain(&mut self, terrain: Option<Value>) {
        self.scalars.edit(|s| s.terrain = terrain);
    }

    /// Backend-specific scalar without a typed field. `Value::Null` removes it.
    pub fn set_scalar(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.scalars.edit(|s| {
            if value.is_null() {
                s.extra.remove(&key);
            } else {
                s.extra.insert(key, value);
            }
        });
    }

    pub fn layer(&self, id: &str) -> Option<&LayerEntry> {
        self.layers.get().get(id)
    }

    pub fn layers(&self) -> &IndexMap<String, LayerEntry> {
        self.layers.get()
    }

    pub fn layer_ids(&self) -> Vec<&str> {
        self.layers.get().keys().map(String::as_str).collect()
    }

    /// Inserts or replaces a layer. A known id keeps its z-order position.
    pub fn upsert_layer(&mut self, id: &str, def: LayerDef) {
        self.upsert_layer_entry(id, LayerEntry::from_def(def));
    }

    pub fn upsert_layer_entry(&mut self, id: &str, mut entry: LayerEntry) {
        if entry.def.id != id {
            debug!("layer definition id {} stored under {id}", entry.def.id);
            entry.def.id = id.to_string();
        }
        let replaced = self
            .layers
            .edit(|layers| layers.insert(id.to_string(), entry))
            .is_some();
        if replaced {
            debug!("replaced layer {id} in place");
        }
        self.layers_changed();
    }

    /// Removes a layer, keeping the order of the rest. False if unknown.
    pub fn remove_layer(&mut self, id: &str) -> bool {
        if !self.layers.get().contains_key(id) {
            return false;
        }
        self.layers.edit(|layers| layers.shift_remove(id));
        self.layers_changed();
        true
    }

    pub fn set_layer_visibility(&mut self, id: &str, visible: bool) -> bool {
        self.edit_layer(id, |entry| entry.set_visible(visible))
    }

    pub fn set_layer_opacity(&mut self, id: &str, opacity: f64) -> bool {
        self.edit_layer(id, |entry| entry.set_opacity(opacity))
    }

    /// Edits a stored definition in place (paint, layout, filter). False if
    /// the layer is unknown.
    pub fn edit_layer_def(&mut self, id: &str, f: impl FnOnce(&mut LayerDef)) -> bool {
        self.edit_layer(id, |entry| f(&mut entry.def))
    }

    fn edit_layer(&mut self, id: &str, f: impl FnOnce(&mut LayerEntry)) -> bool {
        if !self.layers.get().contains_key(id) {
            return false;
        }
        self.layers.edit(|layers| {
            if let Some(entry) = layers.get_mut(id) {
                f(entry);
            }
        });
        self.layers_changed();
        true
    }

    pub fn clear_layers(&mut self) {
        if self.layers.get().is_empty() {
            return;
        }
        self.layers.edit(IndexMap::clear);
        self.layers_changed();
    }

    pub fn source(&self, id: &str) -> Option<&SourceDef> {
        self.sources.get().get(id)
    }

    pub fn sources(&self) -> &IndexMap<String, SourceDef> {
        self.sources.get()
    }

    pub fn upsert_source(&mut self, id: &str, def: SourceDef) {
        self.sources.edit(|sources| sources.insert(id.to_string(), def));
    }

    /// Removes a source. Layers that reference it are left alone.
    pub fn remove_source(&mut self, id: &str) -> bool {
        if !self.sources.get().contains_key(id) {
            return false;
        }
        self.sources.edit(|sources| sources.shift_remove(id));
        true
    }

    pub fn clear_sources(&mut self) {
        if !self.sources.get().is_empty() {
            self.sources.edit(IndexMap::clear);
        }
    }

    pub fn control(&self, key: &ControlKey) -> Option<&ControlDef> {
        self.controls.get().get(key)
    }

    pub fn controls(&self) -> &IndexMap<ControlKey, ControlDef> {
        self.controls.get()
    }

    /// Inserts or replaces the control at `key`. The key wins over the
    /// definition's own type and position.
    pub fn upsert_control(&mut self, key: ControlKey, mut def: ControlDef) {
        def.kind = key.kind.clone();
        def.position = key.position;
        if def.kind == ControlKind::LayerControl {
            refresh_options(&mut def.options, self.layers.get());
            if self.phase == LayerControlPhase::Uncreated {
                self.phase = LayerControlPhase::Created;
            }
        }
        self.controls.edit(|controls| controls.insert(key, def));
    }

    pub fn remove_control(&mut self, key: &ControlKey) -> bool {
        if !self.controls.get().contains_key(key) {
            return false;
        }
        self.controls.edit(|controls| controls.shift_remove(key));
        if !self.has_layer_control() {
            self.phase = LayerControlPhase::Uncreated;
        }
        true
    }

    pub fn layer_control_phase(&self) -> LayerControlPhase {
        self.phase
    }

    /// Derived visible/opacity/name rows for every layer, background first.
    pub fn layer_states(&self) -> &IndexMap<String, LayerState> {
        self.layer_states.get()
    }

    pub fn draw_data(&self) -> Option<&Value> {
        self.draw_data.get().as_ref()
    }

    pub fn set_draw_data(&mut self, data: Option<Value>) {
        self.draw_data.set_if_changed(data);
    }

    /// Deep copy of the current state.
    pub fn snapshot(&self) -> MapSnapshot {
        MapSnapshot {
            backend: self.backend,
            viewport: *self.viewport.get(),
            scalars: self.scalars.get().clone(),
            layers: self.layers.get().clone(),
            sources: self.sources.get().clone(),
            controls: self.controls.get().clone(),
            draw_data: self.draw_data.get().clone(),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.viewport.is_dirty()
            || self.scalars.is_dirty()
            || self.layers.is_dirty()
            || self.sources.is_dirty()
            || self.controls.is_dirty()
            || self.layer_states.is_dirty()
            || self.draw_data.is_dirty()
    }

    /// Publishes every dirty channel.
    pub fn notify(&mut self) -> ChangeSet {
        let mut channels = Vec::new();
        let mut publish = |changed: bool, channel| {
            if changed {
                channels.push(channel);
            }
        };
        publish(self.viewport.notify(), Channel::Viewport);
        publish(self.scalars.notify(), Channel::Scalars);
        publish(self.layers.notify(), Channel::Layers);
        publish(self.sources.notify(), Channel::Sources);
        publish(self.controls.notify(), Channel::Controls);
        publish(self.layer_states.notify(), Channel::LayerStates);
        publish(self.draw_data.notify(), Channel::DrawData);
        if !channels.is_empty() {
            debug!("store notify: {channels:?}");
        }
        ChangeSet { channels }
    }

    pub fn version(&self, channel: Channel) -> u64 {
        match channel {
            Channel::Viewport => self.viewport.version(),
            Channel::Scalars => self.scalars.version(),
            Channel::Layers => self.layers.version(),
            Channel::Sources => self.sources.version(),
            Channel::Controls => self.controls.version(),
            Channel::LayerStates => self.layer_states.version(),
            Channel::DrawData => self.draw_data.version(),
        }
    }

    fn has_layer_control(&self) -> bool {
        self.controls
            .get()
            .values()
            .any(|c| c.kind == ControlKind::LayerControl)
    }

    /// Runs after every layer mutation, before the mutator returns.
    fn layers_changed(&mut self) {
        self.layer_states
            .set(layer_states(self.layers.get(), None));
        if self.phase == LayerControlPhase::Uncreated {
            return;
        }
        self.phase = LayerControlPhase::Stale;
        let layers = self.layers.get();
        self.controls.edit(|controls| {
            for def in controls.values_mut() {
                if def.kind == ControlKind::LayerControl {
                    refresh_options(&mut def.options, layers);
                }
            }
        });
        self.phase = LayerControlPhase::Refreshed;
    }
}

#[cfg(test)]
mod tests {
    use super::{Channel, StateStore};
    use crate::backend_kind::{BackendKind, StyleRef};
    use crate::control::{ControlDef, ControlKey, ControlKind, ControlPosition};
    use crate::layer::LayerDef;
    use crate::layer_control::{BACKGROUND_LAYER, LayerControlPhase};
    use crate::source::SourceDef;
    use foundation::{LatLng, ViewportUpdate};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn layer_control_key() -> ControlKey {
        ControlKey::new(ControlKind::LayerControl, ControlPosition::TopRight)
    }

    fn add_layer_control(store: &mut StateStore) {
        let def = ControlDef::new(ControlKind::LayerControl, ControlPosition::TopRight);
        store.upsert_control(layer_control_key(), def);
    }

    #[test]
    fn removing_a_layer_keeps_its_source() {
        let mut store = StateStore::new(BackendKind::MapLibre);
        store.upsert_layer("a", LayerDef::new("a", "circle").with_source("s"));
        store.upsert_source("s", SourceDef::geojson(json!({"type": "FeatureCollection", "features": []})));
        store.remove_layer("a");

        let snap = store.snapshot();
        assert!(snap.layers.is_empty());
        assert!(snap.sources.contains_key("s"));
    }

    #[test]
    fn snapshot_holds_last_definition_of_each_live_id() {
        let mut store = StateStore::new(BackendKind::MapLibre);
        store.upsert_layer("a", LayerDef::new("a", "fill"));
        store.upsert_layer("b", LayerDef::new("b", "line"));
        store.upsert_layer("c", LayerDef::new("c", "circle"));
        store.upsert_layer("a", LayerDef::new("a", "heatmap"));
        store.remove_layer("b");
        assert!(!store.remove_layer("b"));

        let snap = store.snapshot();
        assert_eq!(snap.layer_ids(), vec!["a", "c"]);
        assert_eq!(snap.layers["a"].def.kind, "heatmap");
    }

    #[test]
    fn definition_id_follows_the_store_key() {
        let mut store = StateStore::new(BackendKind::MapLibre);
        store.upsert_layer("real", LayerDef::new("stale", "fill"));
        assert_eq!(store.layer("real").map(|l| l.def.id.as_str()), Some("real"));
    }

    #[test]
    fn edit_layer_def_changes_only_known_layers() {
        let mut store = StateStore::new(BackendKind::MapLibre);
        store.upsert_layer("a", LayerDef::new("a", "fill"));
        assert!(store.edit_layer_def("a", |def| {
            def.paint.insert("fill-color".to_string(), json!("#f00"));
        }));
        assert!(!store.edit_layer_def("missing", |_| {}));
        assert_eq!(store.layer("a").unwrap().def.paint["fill-color"], json!("#f00"));
    }

    #[test]
    fn snapshot_is_isolated_from_later_writes() {
        let mut store = StateStore::new(BackendKind::MapLibre);
        store.upsert_layer("a", LayerDef::new("a", "fill"));
        let snap = store.snapshot();
        store.upsert_layer("b", LayerDef::new("b", "fill"));
        store.set_layer_opacity("a", 0.1);

        assert_eq!(snap.layer_ids(), vec!["a"]);
        assert_eq!(snap.layers["a"].opacity, 1.0);
    }

    #[test]
    fn viewport_respects_backend_limits() {
        let mut store = StateStore::new(BackendKind::MapLibre);
        store.set_viewport(ViewportUpdate {
            center: Some(LatLng::new(51.5, -0.1)),
            zoom: Some(-3.0),
            bearing: Some(-90.0),
            pitch: Some(75.0),
        });
        let v = store.viewport();
        assert_eq!(v.center, LatLng::new(51.5, -0.1));
        assert_eq!((v.zoom, v.bearing, v.pitch), (0.0, 270.0, 60.0));

        assert!(!store.set_zoom(f64::NAN));
    }

    #[test]
    fn layer_control_refreshes_with_every_layer_mutation() {
        let mut store = StateStore::new(BackendKind::MapLibre);
        assert_eq!(store.layer_control_phase(), LayerControlPhase::Uncreated);
        add_layer_control(&mut store);
        assert_eq!(store.layer_control_phase(), LayerControlPhase::Created);

        store.upsert_layer(
            "x",
            LayerDef::new("x", "fill")
                .with_source("s")
                .with_extra("opacity", json!(0.5)),
        );
        assert_eq!(store.layer_control_phase(), LayerControlPhase::Refreshed);
        let states = &store.control(&layer_control_key()).unwrap().options["layerStates"];
        assert_eq!(states["x"], json!({"visible": true, "opacity": 0.5, "name": "x"}));
        assert_eq!(states[BACKGROUND_LAYER]["name"], json!(BACKGROUND_LAYER));

        store.set_layer_visibility("x", false);
        let states = &store.control(&layer_control_key()).unwrap().options["layerStates"];
        assert_eq!(states["x"]["visible"], json!(false));

        store.remove_layer("x");
        let states = &store.control(&layer_control_key()).unwrap().options["layerStates"];
        assert!(states.get("x").is_none());

        store.remove_control(&layer_control_key());
        assert_eq!(store.layer_control_phase(), LayerControlPhase::Uncreated);
    }

    #[test]
    fn layer_control_created_late_sees_existing_layers() {
        let mut store = StateStore::new(BackendKind::MapLibre);
        store.upsert_layer("a", LayerDef::new("a", "line"));
        add_layer_control(&mut store);
        let states = &store.control(&layer_control_key()).unwrap().options["layerStates"];
        assert_eq!(states["a"]["opacity"], json!(1.0));
    }

    #[test]
    fn control_key_overrides_definition_placement() {
        let mut store = StateStore::new(BackendKind::MapLibre);
        let key = ControlKey::new(ControlKind::Scale, ControlPosition::BottomLeft);
        store.upsert_control(key.clone(), ControlDef::new(ControlKind::Navigation, ControlPosition::TopRight));
        let def = store.control(&key).unwrap();
        assert_eq!((def.kind.clone(), def.position), (ControlKind::Scale, ControlPosition::BottomLeft));
        assert!(!store.remove_control(&ControlKey::new(ControlKind::Scale, ControlPosition::TopLeft)));
    }

    #[test]
    fn notify_coalesces_writes_per_channel() {
        let mut store = StateStore::new(BackendKind::MapLibre);
        store.set_zoom(3.0);
        store.set_zoom(4.0);
        store.upsert_layer("a", LayerDef::new("a", "fill"));
        store.upsert_layer("b", LayerDef::new("b", "fill"));
        store.set_style(StyleRef::Url("https://s/style.json".into()));
        assert!(store.is_dirty());

        let changes = store.notify();
        assert_eq!(
            changes.channels,
            vec![Channel::Viewport, Channel::Scalars, Channel::Layers, Channel::LayerStates]
        );
        assert_eq!(store.version(Channel::Layers), 1);
        assert!(store.notify().is_empty());
        assert!(!store.is_dirty());
    }

    #[test]
    fn no_op_removals_stay_clean() {
        let mut store = StateStore::new(BackendKind::MapLibre);
        assert!(!store.remove_source("nope"));
        assert!(!store.set_layer_opacity("nope", 0.3));
        store.clear_layers();
        store.clear_sources();
        assert!(store.notify().is_empty());
    }

    #[test]
    fn from_snapshot_restores_the_same_state() {
        let mut store = StateStore::new(BackendKind::Mapbox);
        store.set_access_token(Some("pk.test".into()));
        store.upsert_source("s", SourceDef::vector("https://tiles.json"));
        store.upsert_layer("a", LayerDef::new("a", "line").with_source("s"));
        add_layer_control(&mut store);

        let restored = StateStore::from_snapshot(store.snapshot());
        assert_eq!(restored.snapshot(), store.snapshot());
        assert_eq!(restored.layer_control_phase(), LayerControlPhase::Created);
    }
}
