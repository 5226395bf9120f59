use std::fmt;

use foundation::PitchLimit;
use runtime::Props;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rendering library a widget session targets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    MapLibre,
    Mapbox,
    Leaflet,
    DeckGl,
    Cesium,
    Potree,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::MapLibre => "maplibre",
            BackendKind::Mapbox => "mapbox",
            BackendKind::Leaflet => "leaflet",
            BackendKind::DeckGl => "deckgl",
            BackendKind::Cesium => "cesium",
            BackendKind::Potree => "potree",
        }
    }

    pub fn pitch_limit(self) -> PitchLimit {
        match self {
            BackendKind::MapLibre | BackendKind::Mapbox => PitchLimit::Bounded { max: 60.0 },
            // Leaflet is strictly top-down.
            BackendKind::Leaflet => PitchLimit::Bounded { max: 0.0 },
            BackendKind::DeckGl | BackendKind::Cesium | BackendKind::Potree => {
                PitchLimit::Unrestricted
            }
        }
    }

    pub fn requires_token(self) -> bool {
        matches!(self, BackendKind::Mapbox | BackendKind::Cesium)
    }

    /// Environment variables searched, in order, for an access token.
    pub fn token_env_vars(self) -> &'static [&'static str] {
        match self {
            BackendKind::Mapbox => &["MAPBOX_TOKEN", "MAPBOX_ACCESS_TOKEN"],
            BackendKind::Cesium => &["CESIUM_TOKEN", "CESIUM_ACCESS_TOKEN"],
            _ => &[],
        }
    }

    pub fn default_style(self) -> Option<StyleRef> {
        let url = match self {
            BackendKind::MapLibre => "https://demotiles.maplibre.org/style.json",
            BackendKind::Mapbox => "mapbox://styles/mapbox/streets-v12",
            BackendKind::Leaflet => "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
            BackendKind::DeckGl | BackendKind::Cesium | BackendKind::Potree => return None,
        };
        Some(StyleRef::Url(url.to_string()))
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Basemap style: a URL the surface fetches, or an inline style document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StyleRef {
    Url(String),
    Inline(Value),
}

impl StyleRef {
    pub fn to_value(&self) -> Value {
        match self {
            StyleRef::Url(url) => Value::String(url.clone()),
            StyleRef::Inline(doc) => doc.clone(),
        }
    }
}

/// Backend-specific scalar properties of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapScalars {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default = "default_antialias")]
    pub antialias: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terrain: Option<Value>,
    #[serde(flatten)]
    pub extra: Props,
}

fn default_antialias() -> bool {
    true
}

impl Default for MapScalars {
    fn default() -> Self {
        Self {
            style: None,
            access_token: None,
            antialias: default_antialias(),
            projection: None,
            terrain: None,
            extra: Props::new(),
        }
    }
}

impl MapScalars {
    pub fn for_backend(kind: BackendKind) -> Self {
        Self {
            style: kind.default_style(),
            ..Self::default()
        }
    }

    /// True when the backend needs a token and none is set.
    pub fn missing_token(&self, kind: BackendKind) -> bool {
        kind.requires_token() && self.access_token.as_deref().is_none_or(|t| t.trim().is_empty())
    }
}
