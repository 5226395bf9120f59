use std::collections::BTreeMap;

use foundation::Viewport;
use indexmap::IndexMap;
use runtime::{EventRecord, Props};
use scene::{ControlDef, ControlKey, LayerDef, MapScalars, SourceDef};
use serde_json::Value;
use streaming::{DRAW_DATA_EVENT, empty_feature_collection};
use tracing::debug;

use crate::backend::{Backend, PropertyTarget, Readiness};
use crate::error::BackendError;

/// A call that went through [`Backend::invoke`].
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub method: String,
    pub args: Vec<Value>,
    pub kwargs: Props,
}

/// Everything a user could see on a live instance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SurfaceView {
    pub sources: IndexMap<String, SourceDef>,
    /// Bottom to top.
    pub layers: Vec<LayerDef>,
    pub controls: IndexMap<ControlKey, ControlDef>,
    pub map_properties: BTreeMap<String, Value>,
    pub markers: IndexMap<String, Value>,
    pub draw_data: Option<Value>,
}

impl SurfaceView {
    pub fn layer(&self, id: &str) -> Option<&LayerDef> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_ids(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.id.as_str()).collect()
    }

    pub fn source_ids(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }
}

/// In-memory backend that behaves like a GL style map library.
///
/// It rejects what a real library rejects (duplicate ids, layers on missing
/// sources, setters on unknown layers) and keeps a log of every primitive
/// call, so ordering and replay can be checked without a browser.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    deferred_ready: bool,
    instances: usize,
    viewport: Option<Viewport>,
    scalars: Option<MapScalars>,
    view: SurfaceView,
    invocations: Vec<Invocation>,
    ops: Vec<String>,
    events: Vec<EventRecord>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// New instances report `Pending` until the dispatcher is told they are
    /// ready.
    pub fn with_deferred_ready() -> Self {
        Self {
            deferred_ready: true,
            ..Self::default()
        }
    }

    pub fn instances(&self) -> usize {
        self.instances
    }

    pub fn viewport(&self) -> Option<&Viewport> {
        self.viewport.as_ref()
    }

    pub fn scalars(&self) -> Option<&MapScalars> {
        self.scalars.as_ref()
    }

    pub fn view(&self) -> &SurfaceView {
        &self.view
    }

    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    /// Primitive calls since the last instance was created, e.g.
    /// `"addSource s"` or `"addLayer a"`.
    pub fn ops(&self) -> &[String] {
        &self.ops
    }

    /// Queues an occurrence as if the user had interacted with the map.
    pub fn push_event(&mut self, event: EventRecord) {
        self.events.push(event);
    }

    fn ensure_created(&self) -> Result<(), BackendError> {
        if self.instances == 0 {
            return Err(BackendError::NotCreated);
        }
        Ok(())
    }

    fn layer_mut(&mut self, id: &str) -> Result<&mut LayerDef, BackendError> {
        self.view
            .layers
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| BackendError::UnknownLayer(id.to_string()))
    }
}

/// Map-wide properties a new instance starts with.
fn initial_properties(scalars: &MapScalars) -> BTreeMap<String, Value> {
    let mut properties: BTreeMap<String, Value> = scalars
        .extra
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if let Some(style) = &scalars.style {
        properties.insert("style".to_string(), style.to_value());
    }
    if let Some(terrain) = &scalars.terrain {
        properties.insert("terrain".to_string(), terrain.clone());
    }
    if let Some(projection) = &scalars.projection {
        properties.insert("projection".to_string(), projection.clone());
    }
    properties
}

impl Backend for RecordingBackend {
    fn create_instance(
        &mut self,
        viewport: &Viewport,
        scalars: &MapScalars,
    ) -> Result<Readiness, BackendError> {
        self.instances += 1;
        self.viewport = Some(*viewport);
        self.scalars = Some(scalars.clone());
        self.view = SurfaceView {
            map_properties: initial_properties(scalars),
            ..SurfaceView::default()
        };
        self.ops.clear();
        if self.deferred_ready {
            Ok(Readiness::Pending)
        } else {
            Ok(Readiness::Ready)
        }
    }

    fn add_source(&mut self, id: &str, def: &SourceDef) -> Result<(), BackendError> {
        self.ensure_created()?;
        def.validate(id)?;
        if self.view.sources.contains_key(id) {
            return Err(BackendError::DuplicateId(id.to_string()));
        }
        self.view.sources.insert(id.to_string(), def.clone());
        self.ops.push(format!("addSource {id}"));
        Ok(())
    }

    fn add_layer(&mut self, def: &LayerDef, before_id: Option<&str>) -> Result<(), BackendError> {
        self.ensure_created()?;
        def.validate()?;
        if self.view.layer(&def.id).is_some() {
            return Err(BackendError::DuplicateId(def.id.clone()));
        }
        if let Some(source) = &def.source
            && !self.view.sources.contains_key(source)
        {
            return Err(BackendError::DanglingSource {
                layer: def.id.clone(),
                source: source.clone(),
            });
        }
        let at = before_id.and_then(|before| self.view.layers.iter().position(|l| l.id == before));
        match at {
            Some(idx) => self.view.layers.insert(idx, def.clone()),
            None => {
                if let Some(before) = before_id {
                    debug!("before layer {before} not found; appending {}", def.id);
                }
                self.view.layers.push(def.clone());
            }
        }
        self.ops.push(format!("addLayer {}", def.id));
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), BackendError> {
        self.ensure_created()?;
        self.view.layers.retain(|l| l.id != id);
        self.ops.push(format!("removeLayer {id}"));
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<(), BackendError> {
        self.ensure_created()?;
        self.view.sources.shift_remove(id);
        self.ops.push(format!("removeSource {id}"));
        Ok(())
    }

    fn set_property(
        &mut self,
        target: PropertyTarget<'_>,
        key: &str,
        value: &Value,
    ) -> Result<(), BackendError> {
        self.ensure_created()?;
        match target {
            PropertyTarget::Paint(id) => {
                self.layer_mut(id)?.paint.insert(key.to_string(), value.clone());
            }
            PropertyTarget::Layout(id) => {
                self.layer_mut(id)?.layout.insert(key.to_string(), value.clone());
            }
            PropertyTarget::Filter(id) => {
                let layer = self.layer_mut(id)?;
                if value.is_null() {
                    layer.extra.remove(key);
                } else {
                    layer.extra.insert(key.to_string(), value.clone());
                }
            }
            PropertyTarget::Map => {
                if value.is_null() {
                    self.view.map_properties.remove(key);
                } else {
                    self.view.map_properties.insert(key.to_string(), value.clone());
                }
            }
        }
        self.ops.push(format!("setProperty {key}"));
        Ok(())
    }

    fn add_control(&mut self, def: &ControlDef) -> Result<(), BackendError> {
        self.ensure_created()?;
        let key = def.key();
        self.ops.push(format!("addControl {key}"));
        self.view.controls.insert(key, def.clone());
        Ok(())
    }

    fn remove_control(&mut self, key: &ControlKey) -> Result<(), BackendError> {
        self.ensure_created()?;
        self.view.controls.shift_remove(key);
        self.ops.push(format!("removeControl {key}"));
        Ok(())
    }

    fn invoke(&mut self, method: &str, args: &[Value], kwargs: &Props) -> Result<(), BackendError> {
        self.ensure_created()?;
        match method {
            "getDrawData" => {
                let data = self
                    .view
                    .draw_data
                    .clone()
                    .unwrap_or_else(empty_feature_collection);
                self.events
                    .push(EventRecord::new(DRAW_DATA_EVENT).with("data", data));
            }
            "loadDrawData" => self.view.draw_data = args.first().cloned(),
            "clearDrawData" => self.view.draw_data = None,
            "deleteDrawFeatures" => {
                let ids: Vec<&Value> = args
                    .first()
                    .and_then(Value::as_array)
                    .map(|ids| ids.iter().collect())
                    .unwrap_or_default();
                if let Some(features) = self
                    .view
                    .draw_data
                    .as_mut()
                    .and_then(|data| data.get_mut("features"))
                    .and_then(Value::as_array_mut)
                {
                    features.retain(|f| f.get("id").is_none_or(|id| !ids.contains(&id)));
                }
            }
            "addMarker" => {
                let marker = args.first().cloned().unwrap_or(Value::Null);
                let id = marker
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("marker_{}", self.view.markers.len()));
                self.view.markers.insert(id, marker);
            }
            _ => {}
        }
        self.ops.push(format!("invoke {method}"));
        self.invocations.push(Invocation {
            method: method.to_string(),
            args: args.to_vec(),
            kwargs: kwargs.clone(),
        });
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::RecordingBackend;
    use crate::backend::{Backend, PropertyTarget, Readiness};
    use crate::error::BackendError;
    use foundation::Viewport;
    use pretty_assertions::assert_eq;
    use runtime::Props;
    use scene::{LayerDef, MapScalars, SourceDef};
    use serde_json::json;

    fn created() -> RecordingBackend {
        let mut backend = RecordingBackend::new();
        let ready = backend
            .create_instance(&Viewport::default(), &MapScalars::default())
            .unwrap();
        assert_eq!(ready, Readiness::Ready);
        backend
    }

    #[test]
    fn rejects_layers_on_missing_sources() {
        let mut backend = created();
        let err = backend
            .add_layer(&LayerDef::new("a", "circle").with_source("s"), None)
            .unwrap_err();
        assert_eq!(
            err,
            BackendError::DanglingSource {
                layer: "a".into(),
                source: "s".into()
            }
        );
        assert!(backend.view().layers.is_empty());
    }

    #[test]
    fn before_id_inserts_below_the_named_layer() {
        let mut backend = created();
        backend.add_layer(&LayerDef::new("top", "background"), None).unwrap();
        backend
            .add_layer(&LayerDef::new("under", "background"), Some("top"))
            .unwrap();
        backend
            .add_layer(&LayerDef::new("last", "background"), Some("basemap-label"))
            .unwrap();
        assert_eq!(backend.view().layer_ids(), vec!["under", "top", "last"]);
    }

    #[test]
    fn duplicate_ids_are_refused() {
        let mut backend = created();
        let src = SourceDef::vector("https://tiles.json");
        backend.add_source("v", &src).unwrap();
        assert_eq!(
            backend.add_source("v", &src),
            Err(BackendError::DuplicateId("v".into()))
        );
    }

    #[test]
    fn nothing_is_accepted_before_creation() {
        let mut backend = RecordingBackend::new();
        assert_eq!(
            backend.invoke("flyTo", &[], &Props::new()),
            Err(BackendError::NotCreated)
        );
    }

    #[test]
    fn draw_data_request_is_answered_with_an_event() {
        let mut backend = created();
        backend.invoke("getDrawData", &[], &Props::new()).unwrap();
        let events = backend.poll_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "draw_data");
        assert_eq!(events[0].get("data").unwrap()["features"], json!([]));
        assert!(backend.poll_events().is_empty());
    }

    #[test]
    fn setters_need_a_live_layer() {
        let mut backend = created();
        let err = backend
            .set_property(PropertyTarget::Paint("ghost"), "fill-color", &json!("#000"))
            .unwrap_err();
        assert_eq!(err, BackendError::UnknownLayer("ghost".into()));
    }
}
