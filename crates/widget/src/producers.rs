use foundation::{LatLng, LatLngBounds, SequenceId, ViewportUpdate};
use runtime::Props;
use scene::{
    BackendKind, ControlDef, ControlKey, ControlKind, ControlPosition, DEFAULT_TILE_SIZE, LayerDef,
    LayerEntry, SourceDef, StyleRef,
};
use serde_json::{Value, json};
use streaming::Method;
use tracing::{debug, warn};

use crate::error::WidgetError;
use crate::map::{MapWidget, control_args};

/// Placement and initial look of a new layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerOptions {
    pub before_id: Option<String>,
    pub opacity: Option<f64>,
    pub visible: Option<bool>,
}

impl LayerOptions {
    pub fn before(mut self, id: impl Into<String>) -> Self {
        self.before_id = Some(id.into());
        self
    }

    pub fn opacity(mut self, opacity: f64) -> Self {
        self.opacity = Some(opacity);
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = Some(visible);
        self
    }
}

/// Id of the source the single-call layer helpers create for `layer_id`.
pub fn helper_source_id(layer_id: &str) -> String {
    format!("{layer_id}_source")
}

// Viewport
impl MapWidget {
    pub fn set_center(&mut self, center: LatLng) {
        self.move_camera(ViewportUpdate::center(center));
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.move_camera(ViewportUpdate::zoom(zoom));
    }

    pub fn set_bearing(&mut self, bearing: f64) {
        self.move_camera(ViewportUpdate {
            bearing: Some(bearing),
            ..ViewportUpdate::default()
        });
    }

    pub fn set_pitch(&mut self, pitch: f64) {
        self.move_camera(ViewportUpdate {
            pitch: Some(pitch),
            ..ViewportUpdate::default()
        });
    }

    /// Stores the new viewport and moves the live camera without animation.
    pub fn set_view(&mut self, update: ViewportUpdate) {
        self.move_camera(update);
    }

    fn move_camera(&mut self, update: ViewportUpdate) {
        if !self.store.set_viewport(update) {
            return;
        }
        let v = *self.store.viewport();
        self.queue.call(
            Method::JumpTo.name(),
            vec![json!({
                "center": v.center.to_lng_lat(),
                "zoom": v.zoom,
                "bearing": v.bearing,
                "pitch": v.pitch,
            })],
        );
        self.after_mutation();
    }

    /// Animated camera move. Only the live surface moves; the stored
    /// viewport is left alone.
    pub fn fly_to(&mut self, center: LatLng, zoom: Option<f64>) -> SequenceId {
        let mut target = json!({ "center": center.to_lng_lat() });
        if let Some(zoom) = zoom {
            target["zoom"] = json!(zoom);
        }
        self.call(Method::FlyTo.name(), vec![target], Props::new())
    }

    pub fn fit_bounds(&mut self, bounds: LatLngBounds, padding: Option<f64>) -> SequenceId {
        let mut kwargs = Props::new();
        if let Some(padding) = padding {
            kwargs.insert("padding".to_string(), json!(padding));
        }
        self.call(
            Method::FitBounds.name(),
            vec![json!(bounds.to_lng_lat_pairs())],
            kwargs,
        )
    }
}

// Map-wide properties
impl MapWidget {
    pub fn set_style(&mut self, style: StyleRef) {
        let value = style.to_value();
        self.store.set_style(style);
        self.queue.call(Method::SetStyle.name(), vec![value]);
        self.after_mutation();
    }

    /// `None` turns terrain off.
    pub fn set_terrain(&mut self, terrain: Option<Value>) {
        self.store.set_terrain(terrain.clone());
        self.queue
            .call(Method::SetTerrain.name(), vec![terrain.unwrap_or(Value::Null)]);
        self.after_mutation();
    }

    pub fn set_projection(&mut self, projection: Value) {
        self.store.set_projection(Some(projection.clone()));
        self.queue.call(Method::SetProjection.name(), vec![projection]);
        self.after_mutation();
    }

    /// Atmospheric fog; `None` removes it.
    pub fn set_fog(&mut self, fog: Option<Value>) {
        let fog = fog.unwrap_or(Value::Null);
        self.store.set_scalar("fog", fog.clone());
        self.queue.call(Method::SetFog.name(), vec![fog]);
        self.after_mutation();
    }

    /// Creation-time option: takes effect on the next surface and in exports.
    pub fn set_antialias(&mut self, antialias: bool) {
        self.store.set_antialias(antialias);
        self.after_mutation();
    }
}

// Layers and sources
impl MapWidget {
    /// Adds or replaces a layer.
    ///
    /// Replacing keeps the layer's position: the surface gets a remove and an
    /// add anchored on whatever layer followed it.
    pub fn add_layer(
        &mut self,
        id: &str,
        mut def: LayerDef,
        options: LayerOptions,
    ) -> Result<(), WidgetError> {
        def.id = id.to_string();
        def.validate()?;

        let mut entry = LayerEntry::from_def(def).with_before(options.before_id);
        if let Some(opacity) = options.opacity {
            entry.set_opacity(opacity);
        }
        if let Some(visible) = options.visible {
            entry.set_visible(visible);
        }

        let replaced = self.store.layer(id).is_some();
        self.store.upsert_layer_entry(id, entry.clone());

        let before = if replaced {
            self.queue.call(Method::RemoveLayer.name(), vec![json!(id)]);
            self.next_layer_id(id).or(entry.before_id)
        } else {
            entry.before_id
        };
        let mut kwargs = Props::new();
        if let Some(before) = before {
            kwargs.insert("beforeId".to_string(), json!(before));
        }
        self.queue
            .enqueue(Method::AddLayer.name(), vec![json!(entry.def)], kwargs);
        debug!("{} layer {id}", if replaced { "replaced" } else { "added" });
        self.after_mutation();
        Ok(())
    }

    fn next_layer_id(&self, id: &str) -> Option<String> {
        let layers = self.store.layers();
        let idx = layers.get_index_of(id)?;
        layers.get_index(idx + 1).map(|(next, _)| next.clone())
    }

    /// False when no such layer exists.
    pub fn remove_layer(&mut self, id: &str) -> bool {
        if !self.store.remove_layer(id) {
            debug!("remove_layer: no layer {id}");
            return false;
        }
        self.queue.call(Method::RemoveLayer.name(), vec![json!(id)]);
        self.after_mutation();
        true
    }

    pub fn add_source(&mut self, id: &str, def: SourceDef) -> Result<(), WidgetError> {
        def.validate(id)?;
        self.store.upsert_source(id, def.clone());
        self.queue
            .call(Method::AddSource.name(), vec![json!(id), json!(def)]);
        self.after_mutation();
        Ok(())
    }

    /// Layers that still use the source are left alone.
    pub fn remove_source(&mut self, id: &str) -> bool {
        if !self.store.remove_source(id) {
            debug!("remove_source: no source {id}");
            return false;
        }
        self.queue.call(Method::RemoveSource.name(), vec![json!(id)]);
        self.after_mutation();
        true
    }

    pub fn clear_layers(&mut self) {
        let ids: Vec<String> = self.store.layer_ids().into_iter().map(str::to_string).collect();
        self.batch(|w| {
            for id in &ids {
                w.remove_layer(id);
            }
        });
    }

    pub fn clear_sources(&mut self) {
        let ids: Vec<String> = self.store.sources().keys().cloned().collect();
        self.batch(|w| {
            for id in &ids {
                w.remove_source(id);
            }
        });
    }

    /// Layers first, so no layer outlives its source on the surface.
    pub fn clear_all(&mut self) {
        self.batch(|w| {
            w.clear_layers();
            w.clear_sources();
        });
    }

    /// GeoJSON source `{id}_source` plus one layer drawing it.
    pub fn add_geojson_layer(
        &mut self,
        id: &str,
        data: Value,
        kind: &str,
        paint: Props,
    ) -> Result<(), WidgetError> {
        let source = helper_source_id(id);
        let mut def = LayerDef::new(id, kind).with_source(source.as_str());
        def.paint = paint;
        self.batch(|w| {
            w.add_source(&source, SourceDef::geojson(data))?;
            w.add_layer(id, def, LayerOptions::default())
        })
    }

    pub fn add_raster_layer(
        &mut self,
        id: &str,
        tiles_url: &str,
        paint: Props,
    ) -> Result<(), WidgetError> {
        let source = helper_source_id(id);
        let mut def = LayerDef::new(id, "raster").with_source(source.as_str());
        def.paint = paint;
        self.batch(|w| {
            w.add_source(
                &source,
                SourceDef::raster(vec![tiles_url.to_string()], DEFAULT_TILE_SIZE),
            )?;
            w.add_layer(id, def, LayerOptions::default())
        })
    }

    pub fn add_vector_layer(
        &mut self,
        id: &str,
        url: &str,
        source_layer: &str,
        kind: &str,
        paint: Props,
    ) -> Result<(), WidgetError> {
        let source = helper_source_id(id);
        let mut def = LayerDef::new(id, kind)
            .with_source(source.as_str())
            .with_source_layer(source_layer);
        def.paint = paint;
        self.batch(|w| {
            w.add_source(&source, SourceDef::vector(url))?;
            w.add_layer(id, def, LayerOptions::default())
        })
    }

    /// Georeferenced image; `corners` go top-left, top-right, bottom-right,
    /// bottom-left.
    pub fn add_image_layer(
        &mut self,
        id: &str,
        url: &str,
        corners: [LatLng; 4],
    ) -> Result<(), WidgetError> {
        let source = helper_source_id(id);
        let coordinates = corners.map(LatLng::to_lng_lat);
        let def = LayerDef::new(id, "raster").with_source(source.as_str());
        self.batch(|w| {
            w.add_source(&source, SourceDef::image(url, coordinates))?;
            w.add_layer(id, def, LayerOptions::default())
        })
    }

    /// XYZ tile overlay. Leaflet draws tiles as a layer of its own; the
    /// GL backends go through a raster source.
    pub fn add_tile_layer(
        &mut self,
        id: &str,
        url: &str,
        attribution: &str,
    ) -> Result<(), WidgetError> {
        if self.store.backend() == BackendKind::Leaflet {
            let def = LayerDef::new(id, "tile")
                .with_extra("url", json!(url))
                .with_extra("attribution", json!(attribution));
            return self.add_layer(id, def, LayerOptions::default());
        }
        let source = helper_source_id(id);
        let def = LayerDef::new(id, "raster").with_source(source.as_str());
        self.batch(|w| {
            w.add_source(
                &source,
                SourceDef::raster(vec![url.to_string()], DEFAULT_TILE_SIZE)
                    .with_extra("attribution", json!(attribution)),
            )?;
            w.add_layer(id, def, LayerOptions::default())
        })
    }

    /// Adds a marker and returns its generated id (`marker_0`, `marker_1`,
    /// ...). Leaflet keeps markers as layers; elsewhere they are replayed
    /// setters.
    pub fn add_marker(
        &mut self,
        position: LatLng,
        popup: Option<&str>,
    ) -> Result<String, WidgetError> {
        let id = self.ids.next_id("marker");
        if self.store.backend() == BackendKind::Leaflet {
            let mut def = LayerDef::new(id.as_str(), "marker").with_extra("latlng", json!(position));
            if let Some(popup) = popup {
                def = def.with_extra("popup", json!(popup));
            }
            self.add_layer(&id, def, LayerOptions::default())?;
            return Ok(id);
        }
        let mut marker = json!({ "id": id, "coordinates": position.to_lng_lat() });
        if let Some(popup) = popup {
            marker["popup"] = json!(popup);
        }
        self.call(Method::AddMarker.name(), vec![marker], Props::new());
        Ok(id)
    }
}

// Leaflet vector shapes. Each one is a layer of its own, so it survives a
// rebuild like any other layer.
impl MapWidget {
    /// Circle of `radius` meters. Returns the generated id (`circle_{n}`).
    pub fn add_circle(
        &mut self,
        center: LatLng,
        radius: f64,
        style: Props,
    ) -> Result<String, WidgetError> {
        let mut fields = style;
        fields.insert("latlng".to_string(), json!(center));
        fields.insert("radius".to_string(), json!(radius));
        self.add_shape("add_circle", "circle", fields)
    }

    pub fn add_polygon(
        &mut self,
        latlngs: &[LatLng],
        style: Props,
    ) -> Result<String, WidgetError> {
        let mut fields = style;
        fields.insert("latlngs".to_string(), json!(latlngs));
        self.add_shape("add_polygon", "polygon", fields)
    }

    pub fn add_polyline(
        &mut self,
        latlngs: &[LatLng],
        style: Props,
    ) -> Result<String, WidgetError> {
        let mut fields = style;
        fields.insert("latlngs".to_string(), json!(latlngs));
        self.add_shape("add_polyline", "polyline", fields)
    }

    /// Inline GeoJSON drawn by Leaflet itself, without a source.
    pub fn add_geojson(
        &mut self,
        data: Value,
        style: Option<Value>,
    ) -> Result<String, WidgetError> {
        let mut fields = Props::new();
        fields.insert("data".to_string(), data);
        if let Some(style) = style {
            fields.insert("style".to_string(), style);
        }
        self.add_shape("add_geojson", "geojson", fields)
    }

    fn add_shape(
        &mut self,
        operation: &'static str,
        kind: &str,
        fields: Props,
    ) -> Result<String, WidgetError> {
        let backend = self.store.backend();
        if backend != BackendKind::Leaflet {
            return Err(WidgetError::Unsupported { operation, backend });
        }
        let id = self.ids.next_id(kind);
        let mut def = LayerDef::new(id.as_str(), kind);
        def.extra = fields;
        self.add_layer(&id, def, LayerOptions::default())?;
        Ok(id)
    }
}

// Layer properties
impl MapWidget {
    /// False when no such layer exists.
    pub fn set_visibility(&mut self, id: &str, visible: bool) -> bool {
        if !self.store.set_layer_visibility(id, visible) {
            warn!("set_visibility: no layer {id}");
            return false;
        }
        let value = if visible { "visible" } else { "none" };
        self.queue.call(
            Method::SetLayoutProperty.name(),
            vec![json!(id), json!("visibility"), json!(value)],
        );
        self.after_mutation();
        true
    }

    /// Clamps to `[0, 1]` and writes every opacity paint property the layer
    /// type has. False when no such layer exists.
    pub fn set_opacity(&mut self, id: &str, opacity: f64) -> bool {
        if !self.store.set_layer_opacity(id, opacity) {
            warn!("set_opacity: no layer {id}");
            return false;
        }
        let Some(entry) = self.store.layer(id) else {
            return false;
        };
        let clamped = entry.opacity;
        let properties = entry.def.opacity_properties();
        for property in properties {
            self.queue.call(
                Method::SetPaintProperty.name(),
                vec![json!(id), json!(property), json!(clamped)],
            );
        }
        self.after_mutation();
        true
    }

    pub fn set_paint_property(&mut self, id: &str, name: &str, value: Value) -> bool {
        let known = self.store.edit_layer_def(id, |def| {
            def.paint.insert(name.to_string(), value.clone());
        });
        if !known {
            warn!("set_paint_property: no layer {id}");
            return false;
        }
        self.queue.call(
            Method::SetPaintProperty.name(),
            vec![json!(id), json!(name), value],
        );
        self.after_mutation();
        true
    }

    /// `visibility` goes through [`MapWidget::set_visibility`] so the
    /// layer's visible flag stays in step.
    pub fn set_layout_property(&mut self, id: &str, name: &str, value: Value) -> bool {
        if name == "visibility"
            && let Some(v) = value.as_str()
        {
            return self.set_visibility(id, v != "none");
        }
        let known = self.store.edit_layer_def(id, |def| {
            def.layout.insert(name.to_string(), value.clone());
        });
        if !known {
            warn!("set_layout_property: no layer {id}");
            return false;
        }
        self.queue.call(
            Method::SetLayoutProperty.name(),
            vec![json!(id), json!(name), value],
        );
        self.after_mutation();
        true
    }

    /// `Value::Null` clears the filter.
    pub fn set_filter(&mut self, id: &str, filter: Value) -> bool {
        let known = self.store.edit_layer_def(id, |def| {
            if filter.is_null() {
                def.extra.remove("filter");
            } else {
                def.extra.insert("filter".to_string(), filter.clone());
            }
        });
        if !known {
            warn!("set_filter: no layer {id}");
            return false;
        }
        self.queue
            .call(Method::SetFilter.name(), vec![json!(id), filter]);
        self.after_mutation();
        true
    }
}

// Controls and drawing
impl MapWidget {
    pub fn add_control(&mut self, kind: ControlKind, position: ControlPosition, options: Props) {
        let key = ControlKey::new(kind.clone(), position);
        let mut def = ControlDef::new(kind, position);
        def.options = options;
        self.store.upsert_control(key.clone(), def);
        if let Some(stored) = self.store.control(&key) {
            let args = control_args(stored);
            self.queue.call(Method::AddControl.name(), args);
        }
        self.after_mutation();
    }

    /// False when nothing sits at that key.
    pub fn remove_control(&mut self, kind: ControlKind, position: ControlPosition) -> bool {
        let key = ControlKey::new(kind, position);
        if !self.store.remove_control(&key) {
            debug!("remove_control: no control {key}");
            return false;
        }
        self.queue.call(
            Method::RemoveControl.name(),
            vec![json!(key.kind.as_str()), json!(position.as_str())],
        );
        self.after_mutation();
        true
    }

    /// Visibility toggles for the map's layers. `layers` limits and orders
    /// the rows; `None` lists every layer behind a background row.
    pub fn add_layer_control(&mut self, position: ControlPosition, layers: Option<Vec<String>>) {
        let mut options = Props::new();
        if let Some(layers) = layers {
            options.insert("layers".to_string(), json!(layers));
        }
        self.add_control(ControlKind::LayerControl, position, options);
    }

    pub fn add_draw_control(&mut self, position: ControlPosition, options: Props) {
        let key = ControlKey::new(ControlKind::Draw, position);
        let mut def = ControlDef::new(ControlKind::Draw, position);
        def.options = options;
        self.store.upsert_control(key.clone(), def);
        if let Some(stored) = self.store.control(&key) {
            let mut arg = stored.options.clone();
            arg.insert("position".to_string(), json!(position.as_str()));
            self.queue
                .call(Method::AddDrawControl.name(), vec![Value::Object(arg)]);
        }
        self.after_mutation();
    }

    pub fn load_draw_data(&mut self, geojson: Value) {
        self.store.set_draw_data(Some(geojson.clone()));
        self.queue.call(Method::LoadDrawData.name(), vec![geojson]);
        self.after_mutation();
    }

    pub fn clear_draw_data(&mut self) {
        self.store.set_draw_data(None);
        self.queue.call(Method::ClearDrawData.name(), Vec::new());
        self.after_mutation();
    }

    /// Switches the draw control's mode, e.g. `draw_polygon` or
    /// `simple_select`.
    pub fn set_draw_mode(&mut self, mode: &str) -> SequenceId {
        self.call(Method::SetDrawMode.name(), vec![json!(mode)], Props::new())
    }

    /// Deletes drawn features by id. The stored draw data catches up on the
    /// next [`MapWidget::get_draw_data`].
    pub fn delete_draw_features(&mut self, ids: &[&str]) -> SequenceId {
        self.call(Method::DeleteDrawFeatures.name(), vec![json!(ids)], Props::new())
    }
}
