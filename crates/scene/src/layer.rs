use runtime::Props;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DefinitionError;

/// Layer definition in GL style document form.
///
/// The well-known keys are typed; everything else a backend understands
/// (`filter`, `minzoom`, `metadata`, ...) rides along in `extra` and is
/// serialized back at the top level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDef {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(
        rename = "source-layer",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_layer: Option<String>,
    #[serde(default, skip_serializing_if = "Props::is_empty")]
    pub paint: Props,
    #[serde(default, skip_serializing_if = "Props::is_empty")]
    pub layout: Props,
    #[serde(flatten)]
    pub extra: Props,
}

impl LayerDef {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            source: None,
            source_layer: None,
            paint: Props::new(),
            layout: Props::new(),
            extra: Props::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_source_layer(mut self, source_layer: impl Into<String>) -> Self {
        self.source_layer = Some(source_layer.into());
        self
    }

    pub fn with_paint(mut self, key: impl Into<String>, value: Value) -> Self {
        self.paint.insert(key.into(), value);
        self
    }

    pub fn with_layout(mut self, key: impl Into<String>, value: Value) -> Self {
        self.layout.insert(key.into(), value);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Paint properties that carry this layer's opacity.
    ///
    /// Symbol layers have two (icon and text); every other type uses
    /// `<type>-opacity`.
    pub fn opacity_properties(&self) -> Vec<String> {
        match self.kind.as_str() {
            "symbol" => vec!["icon-opacity".to_string(), "text-opacity".to_string()],
            kind => vec![format!("{kind}-opacity")],
        }
    }

    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.id.trim().is_empty() {
            return Err(DefinitionError::EmptyId);
        }
        if self.kind.trim().is_empty() {
            return Err(DefinitionError::EmptyType {
                id: self.id.clone(),
            });
        }
        Ok(())
    }
}

/// A layer as the store holds it: the definition plus the host-side
/// attributes the layer control reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerEntry {
    pub def: LayerDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_id: Option<String>,
    pub visible: bool,
    pub opacity: f64,
}

impl LayerEntry {
    /// Wraps a definition, lifting `visible` / `opacity` hints out of it.
    ///
    /// Top-level `opacity` and `visible` keys are host attributes, not style
    /// properties, so they are removed from `extra`. Without them the paint
    /// opacity and layout visibility are used, defaulting to a fully opaque,
    /// visible layer.
    pub fn from_def(mut def: LayerDef) -> Self {
        let hinted_opacity = def.extra.remove("opacity").and_then(|v| v.as_f64());
        let hinted_visible = def.extra.remove("visible").and_then(|v| v.as_bool());

        let opacity = hinted_opacity
            .or_else(|| {
                def.opacity_properties()
                    .iter()
                    .find_map(|p| def.paint.get(p).and_then(Value::as_f64))
            })
            .map_or(1.0, clamp_opacity);
        let visible = hinted_visible.unwrap_or_else(|| {
            def.layout.get("visibility").and_then(Value::as_str) != Some("none")
        });

        let mut entry = Self {
            def,
            before_id: None,
            visible: true,
            opacity: 1.0,
        };
        if hinted_visible.is_some() {
            entry.set_visible(visible);
        } else {
            entry.visible = visible;
        }
        if hinted_opacity.is_some() {
            entry.set_opacity(opacity);
        } else {
            entry.opacity = opacity;
        }
        entry
    }

    /// Updates visibility and mirrors it into the layout, so the definition
    /// alone reproduces the layer.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        let value = if visible { "visible" } else { "none" };
        self.def
            .layout
            .insert("visibility".to_string(), Value::from(value));
    }

    /// Updates opacity and mirrors it into every opacity paint property.
    pub fn set_opacity(&mut self, opacity: f64) {
        self.opacity = clamp_opacity(opacity);
        for prop in self.def.opacity_properties() {
            self.def.paint.insert(prop, Value::from(self.opacity));
        }
    }

    pub fn with_before(mut self, before_id: Option<String>) -> Self {
        self.before_id = before_id;
        self
    }

    pub fn id(&self) -> &str {
        &self.def.id
    }
}

/// Opacity is kept in `[0, 1]`; NaN falls back to fully opaque.
pub fn clamp_opacity(opacity: f64) -> f64 {
    if opacity.is_nan() {
        1.0
    } else {
        opacity.clamp(0.0, 1.0)
    }
}
