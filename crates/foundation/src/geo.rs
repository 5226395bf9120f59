use serde::{Deserialize, Serialize};

/// Geographic position in degrees.
///
/// Serialized as `[lat, lng]`, the order the host side uses. Backends that
/// want `[lng, lat]` go through [`LatLng::to_lng_lat`].
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn to_lng_lat(self) -> [f64; 2] {
        [self.lng, self.lat]
    }

    pub fn is_finite(self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

impl From<[f64; 2]> for LatLng {
    fn from([lat, lng]: [f64; 2]) -> Self {
        Self { lat, lng }
    }
}

impl From<LatLng> for [f64; 2] {
    fn from(p: LatLng) -> Self {
        [p.lat, p.lng]
    }
}

/// How far a backend lets the camera tilt.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PitchLimit {
    /// Pitch is clamped into `[0, max]` degrees.
    Bounded { max: f64 },
    /// Free camera: any finite pitch is kept as-is.
    Unrestricted,
}

impl PitchLimit {
    pub fn clamp(self, pitch: f64) -> f64 {
        match self {
            PitchLimit::Bounded { max } => pitch.clamp(0.0, max),
            PitchLimit::Unrestricted => pitch,
        }
    }
}

/// Folds any finite bearing into `[0, 360)`.
pub fn normalize_bearing(deg: f64) -> f64 {
    let b = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if b >= 360.0 { 0.0 } else { b }
}

/// Host-authoritative camera state.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center: LatLng,
    pub zoom: f64,
    #[serde(default)]
    pub bearing: f64,
    #[serde(default)]
    pub pitch: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            center: LatLng::new(0.0, 0.0),
            zoom: 2.0,
            bearing: 0.0,
            pitch: 0.0,
        }
    }
}

/// Partial viewport change; `None` fields keep their current value.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct ViewportUpdate {
    pub center: Option<LatLng>,
    pub zoom: Option<f64>,
    pub bearing: Option<f64>,
    pub pitch: Option<f64>,
}

impl ViewportUpdate {
    pub fn center(center: LatLng) -> Self {
        Self {
            center: Some(center),
            ..Self::default()
        }
    }

    pub fn zoom(zoom: f64) -> Self {
        Self {
            zoom: Some(zoom),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.center.is_none() && self.zoom.is_none() && self.bearing.is_none() && self.pitch.is_none()
    }
}

impl Viewport {
    pub fn new(center: LatLng, zoom: f64) -> Self {
        let mut v = Self::default();
        v.apply(
            ViewportUpdate {
                center: Some(center),
                zoom: Some(zoom),
                ..ViewportUpdate::default()
            },
            PitchLimit::Unrestricted,
        );
        v
    }

    /// Applies `update` while keeping the viewport invariants.
    ///
    /// Non-finite inputs are ignored field by field; zoom never drops below 0,
    /// bearing is folded into `[0, 360)` and pitch goes through `limit`.
    /// Returns true when any field actually changed.
    pub fn apply(&mut self, update: ViewportUpdate, limit: PitchLimit) -> bool {
        let before = *self;

        if let Some(center) = update.center
            && center.is_finite()
        {
            self.center = center;
        }
        if let Some(zoom) = update.zoom
            && zoom.is_finite()
        {
            self.zoom = zoom.max(0.0);
        }
        if let Some(bearing) = update.bearing
            && bearing.is_finite()
        {
            self.bearing = normalize_bearing(bearing);
        }
        if let Some(pitch) = update.pitch
            && pitch.is_finite()
        {
            self.pitch = limit.clamp(pitch);
        }

        *self != before
    }
}

#[cfg(test)]
mod tests {
    use super::{LatLng, PitchLimit, Viewport, ViewportUpdate, normalize_bearing};

    #[test]
    fn latlng_serializes_as_lat_lng_pair() {
        let p = LatLng::new(51.5, -0.1);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "[51.5,-0.1]");
        let back: LatLng = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
        assert_eq!(p.to_lng_lat(), [-0.1, 51.5]);
    }

    #[test]
    fn bearing_is_folded_into_range() {
        assert_eq!(normalize_bearing(370.0), 10.0);
        assert_eq!(normalize_bearing(-90.0), 270.0);
        assert_eq!(normalize_bearing(360.0), 0.0);
        let tiny = normalize_bearing(-1e-20);
        assert!((0.0..360.0).contains(&tiny));
    }

    #[test]
    fn apply_enforces_invariants() {
        let mut v = Viewport::default();
        let changed = v.apply(
            ViewportUpdate {
                zoom: Some(-3.0),
                bearing: Some(725.0),
                pitch: Some(80.0),
                ..ViewportUpdate::default()
            },
            PitchLimit::Bounded { max: 60.0 },
        );
        assert!(changed);
        assert_eq!(v.zoom, 0.0);
        assert_eq!(v.bearing, 5.0);
        assert_eq!(v.pitch, 60.0);
    }

    #[test]
    fn unrestricted_pitch_is_kept() {
        let mut v = Viewport::default();
        v.apply(
            ViewportUpdate {
                pitch: Some(85.0),
                ..ViewportUpdate::default()
            },
            PitchLimit::Unrestricted,
        );
        assert_eq!(v.pitch, 85.0);
    }

    #[test]
    fn non_finite_fields_are_ignored() {
        let mut v = Viewport::new(LatLng::new(10.0, 20.0), 4.0);
        let changed = v.apply(
            ViewportUpdate {
                center: Some(LatLng::new(f64::NAN, 0.0)),
                zoom: Some(f64::INFINITY),
                ..ViewportUpdate::default()
            },
            PitchLimit::Unrestricted,
        );
        assert!(!changed);
        assert_eq!(v.center, LatLng::new(10.0, 20.0));
        assert_eq!(v.zoom, 4.0);
    }

    #[test]
    fn empty_update_is_a_no_op() {
        let mut v = Viewport::default();
        assert!(ViewportUpdate::default().is_empty());
        assert!(!v.apply(ViewportUpdate::default(), PitchLimit::Unrestricted));
    }
}
