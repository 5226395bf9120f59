use std::fmt;
use std::str::FromStr;

use runtime::Props;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ControlKind {
    Navigation,
    Scale,
    Fullscreen,
    Geolocate,
    Attribution,
    Globe,
    Draw,
    TerraDraw,
    LayerControl,
    Other(String),
}

impl ControlKind {
    pub fn as_str(&self) -> &str {
        match self {
            ControlKind::Navigation => "navigation",
            ControlKind::Scale => "scale",
            ControlKind::Fullscreen => "fullscreen",
            ControlKind::Geolocate => "geolocate",
            ControlKind::Attribution => "attribution",
            ControlKind::Globe => "globe",
            ControlKind::Draw => "draw",
            ControlKind::TerraDraw => "terra_draw",
            ControlKind::LayerControl => "layer_control",
            ControlKind::Other(s) => s,
        }
    }
}

impl From<String> for ControlKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "navigation" => ControlKind::Navigation,
            "scale" => ControlKind::Scale,
            "fullscreen" => ControlKind::Fullscreen,
            "geolocate" => ControlKind::Geolocate,
            "attribution" => ControlKind::Attribution,
            "globe" => ControlKind::Globe,
            "draw" => ControlKind::Draw,
            "terra_draw" => ControlKind::TerraDraw,
            "layer_control" => ControlKind::LayerControl,
            _ => ControlKind::Other(s),
        }
    }
}

impl From<ControlKind> for String {
    fn from(kind: ControlKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlPosition {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
}

impl ControlPosition {
    pub const ALL: [ControlPosition; 4] = [
        ControlPosition::TopLeft,
        ControlPosition::TopRight,
        ControlPosition::BottomLeft,
        ControlPosition::BottomRight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ControlPosition::TopLeft => "top-left",
            ControlPosition::TopRight => "top-right",
            ControlPosition::BottomLeft => "bottom-left",
            ControlPosition::BottomRight => "bottom-right",
        }
    }
}

impl fmt::Display for ControlPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlPosition {
    type Err = ControlKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ControlKeyError(s.to_string()))
    }
}

/// Store key for a control: `"{type}_{position}"`.
///
/// At most one control of a given type sits at a given corner; adding the
/// same pair again replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ControlKey {
    pub kind: ControlKind,
    pub position: ControlPosition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlKeyError(pub String);

impl fmt::Display for ControlKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid control key: {}", self.0)
    }
}

impl std::error::Error for ControlKeyError {}

impl ControlKey {
    pub fn new(kind: ControlKind, position: ControlPosition) -> Self {
        Self { kind, position }
    }
}

impl fmt::Display for ControlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind, self.position)
    }
}

impl FromStr for ControlKey {
    type Err = ControlKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Types may contain underscores (`layer_control`); positions never do.
        let (kind, position) = s
            .rsplit_once('_')
            .ok_or_else(|| ControlKeyError(s.to_string()))?;
        if kind.is_empty() {
            return Err(ControlKeyError(s.to_string()));
        }
        let position = position
            .parse()
            .map_err(|_| ControlKeyError(s.to_string()))?;
        Ok(Self {
            kind: ControlKind::from(kind.to_string()),
            position,
        })
    }
}

impl TryFrom<String> for ControlKey {
    type Error = ControlKeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ControlKey> for String {
    fn from(key: ControlKey) -> Self {
        key.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlDef {
    #[serde(rename = "type")]
    pub kind: ControlKind,
    #[serde(default)]
    pub position: ControlPosition,
    #[serde(default)]
    pub options: Props,
}

impl ControlDef {
    pub fn new(kind: ControlKind, position: ControlPosition) -> Self {
        Self {
            kind,
            position,
            options: Props::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn key(&self) -> ControlKey {
        ControlKey::new(self.kind.clone(), self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::{ControlDef, ControlKey, ControlKind, ControlPosition};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn key_format_is_type_then_position() {
        let key = ControlKey::new(ControlKind::Navigation, ControlPosition::TopRight);
        assert_eq!(key.to_string(), "navigation_top-right");
        assert_eq!(
            ControlKey::new(ControlKind::LayerControl, ControlPosition::BottomLeft).to_string(),
            "layer_control_bottom-left"
        );
    }

    #[test]
    fn keys_parse_back_even_with_underscored_types() {
        let key: ControlKey = "layer_control_top-left".parse().unwrap();
        assert_eq!(key.kind, ControlKind::LayerControl);
        assert_eq!(key.position, ControlPosition::TopLeft);

        let custom: ControlKey = "my_widget_bottom-right".parse().unwrap();
        assert_eq!(custom.kind, ControlKind::Other("my_widget".into()));

        assert!("navigation".parse::<ControlKey>().is_err());
        assert!("navigation_middle".parse::<ControlKey>().is_err());
        assert!("_top-left".parse::<ControlKey>().is_err());
    }

    #[test]
    fn control_def_wire_shape() {
        let def = ControlDef::new(ControlKind::Scale, ControlPosition::BottomLeft)
            .with_option("unit", json!("metric"));
        assert_eq!(
            serde_json::to_value(&def).unwrap(),
            json!({"type": "scale", "position": "bottom-left", "options": {"unit": "metric"}})
        );
        assert_eq!(def.key().to_string(), "scale_bottom-left");
    }
}
