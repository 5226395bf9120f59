use foundation::Viewport;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend_kind::{BackendKind, MapScalars};
use crate::control::{ControlDef, ControlKey};
use crate::layer::LayerEntry;
use crate::source::SourceDef;

/// Immutable copy of everything a surface needs to rebuild itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSnapshot {
    pub backend: BackendKind,
    pub viewport: Viewport,
    pub scalars: MapScalars,
    #[serde(default)]
    pub layers: IndexMap<String, LayerEntry>,
    #[serde(default)]
    pub sources: IndexMap<String, SourceDef>,
    #[serde(default)]
    pub controls: IndexMap<ControlKey, ControlDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw_data: Option<Value>,
}

impl MapSnapshot {
    pub fn empty(backend: BackendKind) -> Self {
        Self {
            backend,
            viewport: Viewport::default(),
            scalars: MapScalars::for_backend(backend),
            layers: IndexMap::new(),
            sources: IndexMap::new(),
            controls: IndexMap::new(),
            draw_data: None,
        }
    }

    pub fn layer_ids(&self) -> Vec<&str> {
        self.layers.keys().map(String::as_str).collect()
    }

    /// `(layer, source)` pairs where the layer names a source that is not
    /// in the snapshot.
    pub fn dangling_references(&self) -> Vec<(&str, &str)> {
        self.layers
            .values()
            .filter_map(|entry| {
                let source = entry.def.source.as_deref()?;
                (!self.sources.contains_key(source)).then_some((entry.id(), source))
            })
            .collect()
    }

    pub fn missing_token(&self) -> bool {
        self.scalars.missing_token(self.backend)
    }
}

#[cfg(test)]
mod tests {
    use super::MapSnapshot;
    use crate::backend_kind::BackendKind;
    use crate::control::{ControlDef, ControlKind, ControlPosition};
    use crate::layer::{LayerDef, LayerEntry};
    use crate::source::SourceDef;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn reports_layers_with_missing_sources() {
        let mut snap = MapSnapshot::empty(BackendKind::MapLibre);
        snap.sources
            .insert("s".into(), SourceDef::geojson(json!({"type": "FeatureCollection", "features": []})));
        for (id, source) in [("ok", "s"), ("bad", "nope")] {
            snap.layers.insert(
                id.into(),
                LayerEntry::from_def(LayerDef::new(id, "circle").with_source(source)),
            );
        }
        snap.layers
            .insert("bg".into(), LayerEntry::from_def(LayerDef::new("bg", "background")));

        assert_eq!(snap.dangling_references(), vec![("bad", "nope")]);
    }

    #[test]
    fn controls_are_keyed_by_string_on_the_wire() {
        let mut snap = MapSnapshot::empty(BackendKind::MapLibre);
        let def = ControlDef::new(ControlKind::Navigation, ControlPosition::TopLeft);
        snap.controls.insert(def.key(), def);

        let value = serde_json::to_value(&snap).unwrap();
        assert_eq!(
            value["controls"],
            json!({"navigation_top-left": {"type": "navigation", "position": "top-left", "options": {}}})
        );
        let back: MapSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(back, snap);
    }
}
