//! Standalone HTML rendition of a [`MapSnapshot`].
//!
//! The document embeds the snapshot as JSON and rebuilds the map from it in
//! the browser, so it works without the host process.

use std::fmt;
use std::fs;
use std::path::Path;

use scene::{BackendKind, MapSnapshot};
use tracing::{debug, warn};

use crate::snapshot_file::snapshot_hash;
use crate::templates::{DEFAULT_STYLE_PLACEHOLDER, LIB_PLACEHOLDER, template_for};

/// Page-level settings for an export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTarget {
    pub title: String,
    /// CSS width of the map container.
    pub width: String,
    /// CSS height of the map container.
    pub height: String,
}

impl Default for ExportTarget {
    fn default() -> Self {
        Self {
            title: "Map".to_string(),
            width: "100%".to_string(),
            height: "600px".to_string(),
        }
    }
}

impl ExportTarget {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_size(mut self, width: impl Into<String>, height: impl Into<String>) -> Self {
        self.width = width.into();
        self.height = height.into();
        self
    }
}

#[derive(Debug)]
pub enum ExportError {
    Io(std::io::Error),
    Serialize(serde_json::Error),
    UnsupportedBackend(BackendKind),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Io(err) => write!(f, "I/O error: {err}"),
            ExportError::Serialize(err) => write!(f, "Snapshot serialization error: {err}"),
            ExportError::UnsupportedBackend(kind) => {
                write!(f, "No standalone template for backend: {kind}")
            }
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Io(err) => Some(err),
            ExportError::Serialize(err) => Some(err),
            ExportError::UnsupportedBackend(_) => None,
        }
    }
}

const TOKEN_WARNING: &str = r#"<div class="access-token-warning">
        <strong>Warning:</strong> No access token was provided. The map may not load correctly.
        Set the token on the map before exporting.
    </div>"#;

/// Renders `snapshot` into a self-contained HTML document.
///
/// Embedding is pure: the same snapshot and target always produce the same
/// bytes.
pub fn export(snapshot: &MapSnapshot, target: &ExportTarget) -> Result<String, ExportError> {
    let template =
        template_for(snapshot.backend).ok_or(ExportError::UnsupportedBackend(snapshot.backend))?;

    let state = serde_json::to_string(snapshot).map_err(ExportError::Serialize)?;
    let hash = snapshot_hash(snapshot).map_err(ExportError::Serialize)?;

    let mut bootstrap = template.bootstrap.to_string();
    if let Some(library) = template.library {
        let default_style = snapshot
            .backend
            .default_style()
            .map(|style| style.to_value())
            .unwrap_or_default();
        let default_style = serde_json::to_string(&default_style).map_err(ExportError::Serialize)?;
        bootstrap = bootstrap
            .replace(LIB_PLACEHOLDER, library)
            .replace(DEFAULT_STYLE_PLACEHOLDER, &default_style);
    }

    for (layer, source) in snapshot.dangling_references() {
        warn!("exported layer {layer} refers to missing source {source}");
    }

    let warning = if snapshot.missing_token() {
        warn!("exporting {} map without an access token", snapshot.backend);
        TOKEN_WARNING
    } else {
        ""
    };

    let title = escape_html(&target.title);
    let width = escape_html(&target.width);
    let height = escape_html(&target.height);

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <meta name="anymap-snapshot" content="{hash}">
    <title>{title}</title>
    {assets}
    <style>
        body {{
            margin: 0;
            padding: 20px;
            font-family: Arial, sans-serif;
        }}
        #map {{
            width: {width};
            height: {height};
            border: 1px solid #ccc;
        }}
        h1 {{
            margin-top: 0;
            color: #333;
        }}
        .access-token-warning {{
            background-color: #fff3cd;
            border: 1px solid #ffeaa7;
            color: #856404;
            padding: 10px;
            margin-bottom: 20px;
            border-radius: 4px;
        }}
        .layer-control {{
            background: #fff;
            padding: 6px 10px;
            font-size: 13px;
        }}
        .layer-control label {{
            display: block;
        }}
    </style>
</head>
<body>
    <h1>{title}</h1>
    {warning}
    <div id="map"></div>
    <script id="map-state" type="application/json">{state}</script>
    <script>
        const mapState = JSON.parse(document.getElementById('map-state').textContent);
        {prelude}
        {bootstrap}
    </script>
</body>
</html>
"#,
        assets = template.assets,
        prelude = template.prelude,
        state = script_safe(&state),
    );

    debug!(
        "exported {} snapshot {hash} ({} layers, {} bytes)",
        snapshot.backend,
        snapshot.layers.len(),
        html.len()
    );
    Ok(html)
}

pub fn export_to_file(
    snapshot: &MapSnapshot,
    target: &ExportTarget,
    path: impl AsRef<Path>,
) -> Result<(), ExportError> {
    let html = export(snapshot, target)?;
    fs::write(path.as_ref(), html).map_err(ExportError::Io)
}

/// Escapes JSON so it cannot close or confuse the surrounding `<script>`.
fn script_safe(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{ExportError, ExportTarget, export, export_to_file, script_safe};
    use crate::snapshot_file::snapshot_hash;
    use pretty_assertions::assert_eq;
    use scene::{
        BackendKind, ControlDef, ControlKind, ControlPosition, LayerDef, LayerEntry, MapSnapshot,
        SourceDef,
    };
    use serde_json::json;
    use std::fs;
    use std::path::PathBuf;

    fn temp_dir(label: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        let id = format!("anymap_export_{label}_{}", std::process::id());
        dir.push(id);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    fn embedded_state(html: &str) -> serde_json::Value {
        let open = r#"<script id="map-state" type="application/json">"#;
        let start = html.find(open).expect("state script") + open.len();
        let end = start + html[start..].find("</script>").expect("state end");
        serde_json::from_str(&html[start..end]).expect("state json")
    }

    fn points_snapshot() -> MapSnapshot {
        let mut snapshot = MapSnapshot::empty(BackendKind::MapLibre);
        snapshot.sources.insert(
            "pts".to_string(),
            SourceDef::geojson(json!({"type": "FeatureCollection", "features": []})),
        );
        snapshot.layers.insert(
            "dots".to_string(),
            LayerEntry::from_def(LayerDef::new("dots", "circle").with_source("pts")),
        );
        let nav = ControlDef::new(ControlKind::Navigation, ControlPosition::TopLeft);
        snapshot.controls.insert(nav.key(), nav);
        snapshot
    }

    #[test]
    fn embeds_snapshot_that_parses_back() {
        let snapshot = points_snapshot();
        let html = export(&snapshot, &ExportTarget::default()).expect("export");

        let state = embedded_state(&html);
        let back: MapSnapshot = serde_json::from_value(state).expect("snapshot");
        assert_eq!(back, snapshot);
        assert!(html.contains("maplibre-gl@5.6.1"));
        assert!(html.contains("const lib = maplibregl;"));
        assert!(!html.contains("__LIB__"));
    }

    #[test]
    fn export_is_deterministic_and_tagged_with_hash() {
        let snapshot = points_snapshot();
        let target = ExportTarget::default().with_title("Points");
        let a = export(&snapshot, &target).expect("export");
        let b = export(&snapshot, &target).expect("export");
        assert_eq!(a, b);

        let hash = snapshot_hash(&snapshot).expect("hash");
        assert!(a.contains(&format!(r#"<meta name="anymap-snapshot" content="{hash}">"#)));
    }

    #[test]
    fn hostile_strings_cannot_break_out_of_the_state_script() {
        let mut snapshot = MapSnapshot::empty(BackendKind::MapLibre);
        let def = LayerDef::new("evil", "symbol")
            .with_layout("text-field", json!("</script><script>alert(1)</script>"));
        snapshot
            .layers
            .insert("evil".to_string(), LayerEntry::from_def(def));

        let html = export(&snapshot, &ExportTarget::default()).expect("export");
        assert!(!html.contains("alert(1)</script>"));
        assert_eq!(
            embedded_state(&html)["layers"]["evil"]["def"]["layout"]["text-field"],
            json!("</script><script>alert(1)</script>")
        );
    }

    #[test]
    fn title_and_size_are_escaped() {
        let target = ExportTarget::default()
            .with_title("A <b>&</b> map")
            .with_size("800px", "50vh");
        let html = export(&MapSnapshot::empty(BackendKind::Leaflet), &target).expect("export");
        assert!(html.contains("<title>A &lt;b&gt;&amp;&lt;/b&gt; map</title>"));
        assert!(html.contains("width: 800px;"));
        assert!(html.contains("height: 50vh;"));
        assert!(html.contains("leaflet@1.9.4"));
    }

    #[test]
    fn mapbox_without_token_shows_warning() {
        let snapshot = MapSnapshot::empty(BackendKind::Mapbox);
        let html = export(&snapshot, &ExportTarget::default()).expect("export");
        assert!(html.contains(r#"<div class="access-token-warning">"#));
        assert!(html.contains("mapboxgl.accessToken"));

        let mut with_token = MapSnapshot::empty(BackendKind::Mapbox);
        with_token.scalars.access_token = Some("pk.test".to_string());
        let html = export(&with_token, &ExportTarget::default()).expect("export");
        assert!(!html.contains(r#"<div class="access-token-warning">"#));
    }

    #[test]
    fn backends_without_template_are_rejected() {
        let err = export(&MapSnapshot::empty(BackendKind::Cesium), &ExportTarget::default())
            .expect_err("no template");
        assert!(matches!(err, ExportError::UnsupportedBackend(BackendKind::Cesium)));
    }

    #[test]
    fn export_to_file_writes_document() {
        let root = temp_dir("file");
        let path = root.join("map.html");
        export_to_file(&points_snapshot(), &ExportTarget::default(), &path).expect("write");
        let html = fs::read_to_string(&path).expect("read");
        assert!(html.starts_with("<!DOCTYPE html>"));

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn script_safe_escapes_markup_characters() {
        assert_eq!(
            script_safe(r#"{"a":"<&>"}"#),
            r#"{"a":"\u003c\u0026\u003e"}"#
        );
    }
}
