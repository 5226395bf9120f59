//! Per-backend pieces of the standalone document.
//!
//! Each bootstrap script reads `mapState` (a serialized `MapSnapshot`),
//! creates the map, waits for its ready signal and only then adds sources,
//! layers and controls, each inside its own try/catch.

use scene::BackendKind;

/// Placeholder for the library's global object in [`GL_BOOTSTRAP`].
pub const LIB_PLACEHOLDER: &str = "__LIB__";
/// Placeholder for the JSON-encoded fallback style.
pub const DEFAULT_STYLE_PLACEHOLDER: &str = "__DEFAULT_STYLE__";

#[derive(Debug, Clone, Copy)]
pub struct Template {
    /// `<script>` / `<link>` tags for the library.
    pub assets: &'static str,
    /// Global the bootstrap calls into, when it is shared between libraries.
    pub library: Option<&'static str>,
    /// Runs before the map is constructed.
    pub prelude: &'static str,
    pub bootstrap: &'static str,
}

pub fn template_for(kind: BackendKind) -> Option<Template> {
    match kind {
        BackendKind::MapLibre => Some(Template {
            assets: MAPLIBRE_ASSETS,
            library: Some("maplibregl"),
            prelude: "",
            bootstrap: GL_BOOTSTRAP,
        }),
        BackendKind::Mapbox => Some(Template {
            assets: MAPBOX_ASSETS,
            library: Some("mapboxgl"),
            prelude: MAPBOX_PRELUDE,
            bootstrap: GL_BOOTSTRAP,
        }),
        BackendKind::Leaflet => Some(Template {
            assets: LEAFLET_ASSETS,
            library: None,
            prelude: "",
            bootstrap: LEAFLET_BOOTSTRAP,
        }),
        BackendKind::DeckGl | BackendKind::Cesium | BackendKind::Potree => None,
    }
}

const MAPLIBRE_ASSETS: &str = r#"<script src="https://unpkg.com/maplibre-gl@5.6.1/dist/maplibre-gl.js"></script>
    <link href="https://unpkg.com/maplibre-gl@5.6.1/dist/maplibre-gl.css" rel="stylesheet">
    <script src="https://www.unpkg.com/@mapbox/mapbox-gl-draw@1.5.0/dist/mapbox-gl-draw.js"></script>
    <link href="https://www.unpkg.com/@mapbox/mapbox-gl-draw@1.5.0/dist/mapbox-gl-draw.css" rel="stylesheet">"#;

const MAPBOX_ASSETS: &str = r#"<script src="https://api.mapbox.com/mapbox-gl-js/v3.13.0/mapbox-gl.js"></script>
    <link href="https://api.mapbox.com/mapbox-gl-js/v3.13.0/mapbox-gl.css" rel="stylesheet">
    <script src="https://www.unpkg.com/@mapbox/mapbox-gl-draw@1.5.0/dist/mapbox-gl-draw.js"></script>
    <link href="https://www.unpkg.com/@mapbox/mapbox-gl-draw@1.5.0/dist/mapbox-gl-draw.css" rel="stylesheet">"#;

const LEAFLET_ASSETS: &str = r#"<link href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" rel="stylesheet">
    <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>"#;

/// Shared by the two GL style libraries.
pub const GL_BOOTSTRAP: &str = r#"const lib = __LIB__;
        const viewport = mapState.viewport;
        const scalars = mapState.scalars || {};
        const map = new lib.Map({
            container: 'map',
            style: scalars.style || __DEFAULT_STYLE__,
            center: [viewport.center[1], viewport.center[0]],
            zoom: viewport.zoom,
            bearing: viewport.bearing || 0,
            pitch: viewport.pitch || 0,
            antialias: scalars.antialias !== false
        });
        let draw = null;

        function layerControl(options) {
            const container = document.createElement('div');
            container.className = 'maplibregl-ctrl mapboxgl-ctrl layer-control';
            Object.entries(options.layerStates || {}).forEach(([id, state]) => {
                if (id === 'Background') return;
                const row = document.createElement('label');
                const box = document.createElement('input');
                box.type = 'checkbox';
                box.checked = state.visible;
                box.addEventListener('change', () => {
                    if (map.getLayer(id)) {
                        map.setLayoutProperty(id, 'visibility', box.checked ? 'visible' : 'none');
                    }
                });
                row.appendChild(box);
                row.appendChild(document.createTextNode(' ' + state.name));
                container.appendChild(row);
            });
            return {
                onAdd: () => container,
                onRemove: () => container.remove()
            };
        }

        function buildControl(control) {
            const options = control.options || {};
            switch (control.type) {
                case 'navigation': return new lib.NavigationControl(options);
                case 'scale': return new lib.ScaleControl(options);
                case 'fullscreen': return new lib.FullscreenControl(options);
                case 'geolocate': return new lib.GeolocateControl(options);
                case 'attribution': return new lib.AttributionControl(options);
                case 'globe': return lib.GlobeControl ? new lib.GlobeControl(options) : null;
                case 'layer_control': return layerControl(options);
                case 'draw':
                    if (typeof MapboxDraw === 'undefined') return null;
                    draw = new MapboxDraw(options);
                    return draw;
                default: return null;
            }
        }

        map.on('load', function () {
            Object.entries(mapState.sources || {}).forEach(([id, source]) => {
                try {
                    map.addSource(id, source);
                } catch (error) {
                    console.warn(`Failed to add source ${id}:`, error);
                }
            });

            Object.entries(mapState.layers || {}).forEach(([id, entry]) => {
                try {
                    const before = entry.before_id && map.getLayer(entry.before_id) ? entry.before_id : undefined;
                    map.addLayer(entry.def, before);
                } catch (error) {
                    console.warn(`Failed to add layer ${id}:`, error);
                }
            });

            try {
                if (scalars.terrain) map.setTerrain(scalars.terrain);
                if (scalars.projection && map.setProjection) map.setProjection(scalars.projection);
                if (scalars.fog && map.setFog) map.setFog(scalars.fog);
            } catch (error) {
                console.warn('Failed to apply map properties:', error);
            }

            Object.entries(mapState.controls || {}).forEach(([key, control]) => {
                try {
                    const built = buildControl(control);
                    if (built) {
                        map.addControl(built, control.position);
                    } else {
                        console.warn(`Unsupported control ${key}`);
                    }
                } catch (error) {
                    console.warn(`Failed to add control ${key}:`, error);
                }
            });

            if (draw && mapState.draw_data) {
                try {
                    draw.set(mapState.draw_data);
                } catch (error) {
                    console.warn('Failed to load draw data:', error);
                }
            }
        });

        map.on('error', function (e) {
            console.error('Map error:', e);
        });"#;

const MAPBOX_PRELUDE: &str =
    "mapboxgl.accessToken = (mapState.scalars && mapState.scalars.access_token) || '';";

const LEAFLET_BOOTSTRAP: &str = r#"const viewport = mapState.viewport;
        const scalars = mapState.scalars || {};
        const sources = mapState.sources || {};
        const map = L.map('map', {
            center: viewport.center,
            zoom: viewport.zoom
        });

        function corner(position) {
            return (position || 'top-right').replace('-', '');
        }

        function buildLayer(def) {
            const source = def.source ? sources[def.source] || {} : {};
            const opacity = def.opacity !== undefined ? def.opacity : 1.0;
            switch (def.type) {
                case 'tile':
                case 'raster':
                    return L.tileLayer(def.url || (source.tiles || [])[0], {
                        attribution: def.attribution || '',
                        opacity: opacity
                    });
                case 'marker': {
                    const marker = L.marker(def.latlng, { draggable: def.draggable || false });
                    if (def.popup) marker.bindPopup(def.popup);
                    if (def.tooltip) marker.bindTooltip(def.tooltip);
                    return marker;
                }
                case 'circle':
                    return L.circle(def.latlng, {
                        radius: def.radius,
                        color: def.color || 'blue',
                        fillColor: def.fillColor || 'blue',
                        fillOpacity: def.fillOpacity || 0.2
                    });
                case 'polygon':
                    return L.polygon(def.latlngs, { color: def.color || 'blue' });
                case 'polyline':
                    return L.polyline(def.latlngs, { color: def.color || 'blue', weight: def.weight || 3 });
                case 'geojson':
                    return L.geoJSON(def.data || source.data, def.style || {});
                default:
                    return null;
            }
        }

        map.whenReady(function () {
            if (typeof scalars.style === 'string') {
                L.tileLayer(scalars.style, {
                    attribution: '&copy; OpenStreetMap contributors'
                }).addTo(map);
            }

            Object.entries(mapState.layers || {}).forEach(([id, entry]) => {
                try {
                    const layer = buildLayer(Object.assign({}, entry.def, { opacity: entry.opacity }));
                    if (!layer) {
                        console.warn(`Unsupported layer type ${entry.def.type} for ${id}`);
                    } else if (entry.visible !== false) {
                        layer.addTo(map);
                    }
                } catch (error) {
                    console.warn(`Failed to add layer ${id}:`, error);
                }
            });

            Object.entries(mapState.controls || {}).forEach(([key, control]) => {
                try {
                    const options = Object.assign({}, control.options || {}, { position: corner(control.position) });
                    if (control.type === 'scale') {
                        L.control.scale(options).addTo(map);
                    } else if (control.type === 'zoom' || control.type === 'navigation') {
                        map.zoomControl.setPosition(options.position);
                    } else if (control.type === 'attribution') {
                        map.attributionControl.setPosition(options.position);
                    } else {
                        console.warn(`Unsupported control ${key}`);
                    }
                } catch (error) {
                    console.warn(`Failed to add control ${key}:`, error);
                }
            });
        });"#;
