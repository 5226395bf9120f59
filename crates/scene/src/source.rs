use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use runtime::Props;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DefinitionError;

/// Default raster tile edge in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceKind {
    GeoJson,
    Raster,
    RasterDem,
    Vector,
    Image,
    Video,
    Other(String),
}

impl SourceKind {
    pub fn as_str(&self) -> &str {
        match self {
            SourceKind::GeoJson => "geojson",
            SourceKind::Raster => "raster",
            SourceKind::RasterDem => "raster-dem",
            SourceKind::Vector => "vector",
            SourceKind::Image => "image",
            SourceKind::Video => "video",
            SourceKind::Other(s) => s,
        }
    }
}

impl From<String> for SourceKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "geojson" => SourceKind::GeoJson,
            "raster" => SourceKind::Raster,
            "raster-dem" => SourceKind::RasterDem,
            "vector" => SourceKind::Vector,
            "image" => SourceKind::Image,
            "video" => SourceKind::Video,
            _ => SourceKind::Other(s),
        }
    }
}

impl From<SourceKind> for String {
    fn from(kind: SourceKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source definition in GL style document form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDef {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiles: Option<Vec<String>>,
    #[serde(rename = "tileSize", default, skip_serializing_if = "Option::is_none")]
    pub tile_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Image/video corners, `[lng, lat]`, clockwise from top-left.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Vec<[f64; 2]>>,
    #[serde(flatten)]
    pub extra: Props,
}

impl SourceDef {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            data: None,
            tiles: None,
            tile_size: None,
            url: None,
            coordinates: None,
            extra: Props::new(),
        }
    }

    /// Inline GeoJSON, or a URL string the surface fetches itself.
    pub fn geojson(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::new(SourceKind::GeoJson)
        }
    }

    pub fn raster(tiles: Vec<String>, tile_size: u32) -> Self {
        Self {
            tiles: Some(tiles),
            tile_size: Some(tile_size),
            ..Self::new(SourceKind::Raster)
        }
    }

    /// Vector tiles from a TileJSON url.
    pub fn vector(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::new(SourceKind::Vector)
        }
    }

    pub fn image(url: impl Into<String>, coordinates: [[f64; 2]; 4]) -> Self {
        Self {
            url: Some(url.into()),
            coordinates: Some(coordinates.to_vec()),
            ..Self::new(SourceKind::Image)
        }
    }

    /// Image source carrying its own pixels as a base64 data URI.
    pub fn image_bytes(bytes: &[u8], mime: &str, coordinates: [[f64; 2]; 4]) -> Self {
        let url = format!("data:{mime};base64,{}", STANDARD.encode(bytes));
        Self::image(url, coordinates)
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn validate(&self, id: &str) -> Result<(), DefinitionError> {
        if id.trim().is_empty() {
            return Err(DefinitionError::EmptyId);
        }
        let missing = |field: &'static str| DefinitionError::MissingField {
            id: id.to_string(),
            field,
        };
        match self.kind {
            SourceKind::GeoJson if self.data.is_none() => Err(missing("data")),
            SourceKind::Raster | SourceKind::RasterDem | SourceKind::Vector => {
                let has_tiles = self.tiles.as_ref().is_some_and(|t| !t.is_empty());
                if has_tiles || self.url.is_some() {
                    Ok(())
                } else {
                    Err(missing("tiles"))
                }
            }
            SourceKind::Image | SourceKind::Video => {
                if self.kind == SourceKind::Image && self.url.is_none() {
                    return Err(missing("url"));
                }
                match &self.coordinates {
                    None => Err(missing("coordinates")),
                    Some(c) if c.len() != 4 => Err(DefinitionError::InvalidField {
                        id: id.to_string(),
                        field: "coordinates",
                        reason: format!("expected 4 corners, got {}", c.len()),
                    }),
                    Some(_) => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }
}
