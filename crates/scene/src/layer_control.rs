use indexmap::IndexMap;
use runtime::Props;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::layer::LayerEntry;

/// Pseudo-layer standing for the basemap style's own layers.
pub const BACKGROUND_LAYER: &str = "Background";

/// Option key holding a layer control's per-layer state.
pub const LAYER_STATES_KEY: &str = "layerStates";

/// One row of a layer control panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerState {
    pub visible: bool,
    pub opacity: f64,
    pub name: String,
}

impl LayerState {
    pub fn of(entry: &LayerEntry) -> Self {
        Self {
            visible: entry.visible,
            opacity: entry.opacity,
            name: entry.id().to_string(),
        }
    }

    fn background() -> Self {
        Self {
            visible: true,
            opacity: 1.0,
            name: BACKGROUND_LAYER.to_string(),
        }
    }
}

/// Lifecycle of the layer controls' derived state.
///
/// `Created` on the first layer control, `Stale` after any layer mutation,
/// `Refreshed` once `layerStates` has been recomputed. Removing the last
/// layer control goes back to `Uncreated`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum LayerControlPhase {
    #[default]
    Uncreated,
    Created,
    Stale,
    Refreshed,
}

/// Layer ids a control lists, from its `layers` option. `None` means all.
pub fn layer_filter(options: &Props) -> Option<Vec<String>> {
    options.get("layers").and_then(Value::as_array).map(|ids| {
        ids.iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

/// Derives the per-layer rows a control shows.
///
/// Without a filter every layer is listed in insertion order; with one, the
/// filter's order wins and unknown ids are skipped. The background row comes
/// first whenever the filter is absent or names it.
pub fn layer_states(
    layers: &IndexMap<String, LayerEntry>,
    filter: Option<&[String]>,
) -> IndexMap<String, LayerState> {
    let mut states = IndexMap::new();
    if filter.is_none_or(|f| f.iter().any(|id| id == BACKGROUND_LAYER)) {
        states.insert(BACKGROUND_LAYER.to_string(), LayerState::background());
    }

    let targets: Vec<&str> = match filter {
        Some(ids) => ids.iter().map(String::as_str).collect(),
        None => layers.keys().map(String::as_str).collect(),
    };
    for id in targets {
        if id == BACKGROUND_LAYER {
            continue;
        }
        if let Some(entry) = layers.get(id) {
            states.insert(id.to_string(), LayerState::of(entry));
        }
    }
    states
}

/// Writes fresh `layerStates` into a layer control's options.
pub fn refresh_options(options: &mut Props, layers: &IndexMap<String, LayerEntry>) {
    let filter = layer_filter(options);
    let states = layer_states(layers, filter.as_deref());
    let value = serde_json::to_value(&states).unwrap_or(Value::Null);
    options.insert(LAYER_STATES_KEY.to_string(), value);
}
