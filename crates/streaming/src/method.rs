//! Classification of call-queue methods.
//!
//! Argument layout per method, as produced by the host widget:
//! - `addLayer [layerDef]`, kwargs `{beforeId?}`
//! - `addSource [id, sourceDef]`, `removeLayer [id]`, `removeSource [id]`
//! - `addControl [type, {position, ...options}]`, `removeControl [type, position]`
//! - `setPaintProperty` / `setLayoutProperty [layerId, name, value]`
//! - `setFilter [layerId, filter]`
//! - `setStyle` / `setTerrain` / `setFog` / `setProjection [value]`
//! - `addMarker [{id, coordinates, popup?}]`
//! - camera moves (`flyTo`, `jumpTo`, `fitBounds`) carry their options verbatim

use std::collections::HashMap;
use std::fmt;

use runtime::CallRecord;
use scene::MapSnapshot;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    AddLayer,
    RemoveLayer,
    AddSource,
    RemoveSource,
    AddControl,
    RemoveControl,
    AddDrawControl,
    LoadDrawData,
    ClearDrawData,
    SetPaintProperty,
    SetLayoutProperty,
    SetFilter,
    SetStyle,
    SetTerrain,
    SetFog,
    SetProjection,
    AddMarker,
    FlyTo,
    JumpTo,
    FitBounds,
    TakeScreenshot,
    GetDrawData,
    SetDrawMode,
    DeleteDrawFeatures,
    Other(String),
}

/// What happens to a record when the surface is rebuilt from a snapshot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReplayClass {
    /// Its effect lives in the store; the snapshot already carries it.
    Persisted,
    /// Idempotent setter, replayed after the snapshot (last write per target).
    PropertySetter,
    /// One-shot; never replayed.
    Transient,
}

const NAMES: &[(Method, &str)] = &[
    (Method::AddLayer, "addLayer"),
    (Method::RemoveLayer, "removeLayer"),
    (Method::AddSource, "addSource"),
    (Method::RemoveSource, "removeSource"),
    (Method::AddControl, "addControl"),
    (Method::RemoveControl, "removeControl"),
    (Method::AddDrawControl, "addDrawControl"),
    (Method::LoadDrawData, "loadDrawData"),
    (Method::ClearDrawData, "clearDrawData"),
    (Method::SetPaintProperty, "setPaintProperty"),
    (Method::SetLayoutProperty, "setLayoutProperty"),
    (Method::SetFilter, "setFilter"),
    (Method::SetStyle, "setStyle"),
    (Method::SetTerrain, "setTerrain"),
    (Method::SetFog, "setFog"),
    (Method::SetProjection, "setProjection"),
    (Method::AddMarker, "addMarker"),
    (Method::FlyTo, "flyTo"),
    (Method::JumpTo, "jumpTo"),
    (Method::FitBounds, "fitBounds"),
    (Method::TakeScreenshot, "takeScreenshot"),
    (Method::GetDrawData, "getDrawData"),
    (Method::SetDrawMode, "setDrawMode"),
    (Method::DeleteDrawFeatures, "deleteDrawFeatures"),
];

impl Method {
    pub fn parse(name: &str) -> Self {
        NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(m, _)| m.clone())
            .unwrap_or_else(|| Method::Other(name.to_string()))
    }

    pub fn name(&self) -> &str {
        match self {
            Method::Other(name) => name,
            known => NAMES
                .iter()
                .find(|(m, _)| m == known)
                .map_or("", |(_, n)| *n),
        }
    }

    pub fn replay_class(&self) -> ReplayClass {
        match self {
            Method::AddLayer
            | Method::RemoveLayer
            | Method::AddSource
            | Method::RemoveSource
            | Method::AddControl
            | Method::RemoveControl
            | Method::AddDrawControl
            | Method::LoadDrawData
            | Method::ClearDrawData => ReplayClass::Persisted,
            Method::SetPaintProperty
            | Method::SetLayoutProperty
            | Method::SetFilter
            | Method::SetStyle
            | Method::SetTerrain
            | Method::SetFog
            | Method::SetProjection
            | Method::AddMarker => ReplayClass::PropertySetter,
            Method::FlyTo
            | Method::JumpTo
            | Method::FitBounds
            | Method::TakeScreenshot
            | Method::GetDrawData
            | Method::SetDrawMode
            | Method::DeleteDrawFeatures
            | Method::Other(_) => ReplayClass::Transient,
        }
    }

    /// Layer a setter record applies to, if any.
    pub fn target_layer<'a>(&self, record: &'a CallRecord) -> Option<&'a str> {
        match self {
            Method::SetPaintProperty | Method::SetLayoutProperty | Method::SetFilter => {
                record.arg_str(0)
            }
            _ => None,
        }
    }

    /// Map-wide setters whose value the session scalars hold. A new
    /// instance is created with those scalars, so these are never replayed.
    pub fn held_in_scalars(&self) -> bool {
        matches!(
            self,
            Method::SetStyle | Method::SetTerrain | Method::SetFog | Method::SetProjection
        )
    }

    /// Layer whose whole definition the record replaces or drops.
    pub fn redefined_layer<'a>(&self, record: &'a CallRecord) -> Option<&'a str> {
        match self {
            Method::AddLayer => record.arg(0)?.get("id")?.as_str(),
            Method::RemoveLayer => record.arg_str(0),
            _ => None,
        }
    }

    /// Key under which later setter records supersede earlier ones.
    /// `None` for records that are never coalesced.
    pub fn coalesce_key(&self, record: &CallRecord) -> Option<String> {
        match self {
            Method::SetPaintProperty | Method::SetLayoutProperty => Some(format!(
                "{}:{}:{}",
                self.name(),
                record.arg_str(0)?,
                record.arg_str(1)?
            )),
            Method::SetFilter => Some(format!("setFilter:{}", record.arg_str(0)?)),
            Method::SetStyle | Method::SetTerrain | Method::SetFog | Method::SetProjection => {
                Some(self.name().to_string())
            }
            Method::AddMarker => {
                let id = record.arg(0)?.get("id").and_then(Value::as_str)?;
                Some(format!("addMarker:{id}"))
            }
            _ => None,
        }
    }
}

/// Property setters worth replaying on top of `snapshot`, in record order.
///
/// Only the last write per target survives, and only while no later record
/// redefines or removes its layer: the stored definition already holds
/// everything written before that. Setters aimed at layers the snapshot no
/// longer has are dropped, and so are map-wide setters.
pub fn replayable_setters<'a>(
    snapshot: &MapSnapshot,
    records: &'a [CallRecord],
) -> Vec<&'a CallRecord> {
    let mut latest: HashMap<String, usize> = HashMap::new();
    let mut keep = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        let method = Method::from(record);
        if let Some(layer) = method.redefined_layer(record) {
            let targets_layer = |i: &usize| {
                let earlier = &records[*i];
                Method::from(earlier).target_layer(earlier) == Some(layer)
            };
            latest.retain(|_, i| !targets_layer(&*i));
            keep.retain(|i| !targets_layer(i));
            continue;
        }
        if method.replay_class() != ReplayClass::PropertySetter || method.held_in_scalars() {
            continue;
        }
        if let Some(layer) = method.target_layer(record)
            && !snapshot.layers.contains_key(layer)
        {
            continue;
        }
        match method.coalesce_key(record) {
            Some(key) => {
                latest.insert(key, idx);
            }
            None => keep.push(idx),
        }
    }
    keep.extend(latest.into_values());
    keep.sort_unstable();
    keep.into_iter().map(|idx| &records[idx]).collect()
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&CallRecord> for Method {
    fn from(record: &CallRecord) -> Self {
        Method::parse(&record.method)
    }
}
