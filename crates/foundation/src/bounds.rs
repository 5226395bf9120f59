use serde::{Deserialize, Serialize};

use crate::geo::LatLng;

/// Geographic bounding box given by its south-west and north-east corners.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl LatLngBounds {
    /// Builds bounds from any two opposite corners.
    pub fn from_corners(a: LatLng, b: LatLng) -> Self {
        LatLngBounds {
            south_west: LatLng::new(a.lat.min(b.lat), a.lng.min(b.lng)),
            north_east: LatLng::new(a.lat.max(b.lat), a.lng.max(b.lng)),
        }
    }

    /// `[[west, south], [east, north]]`, the layout GL renderers expect.
    pub fn to_lng_lat_pairs(&self) -> [[f64; 2]; 2] {
        [self.south_west.to_lng_lat(), self.north_east.to_lng_lat()]
    }
}

#[cfg(test)]
mod tests {
    use super::LatLngBounds;
    use crate::geo::LatLng;

    #[test]
    fn corners_are_normalized() {
        let b = LatLngBounds::from_corners(LatLng::new(50.0, 10.0), LatLng::new(40.0, -5.0));
        assert_eq!(b.south_west, LatLng::new(40.0, -5.0));
        assert_eq!(b.north_east, LatLng::new(50.0, 10.0));
        assert_eq!(b.to_lng_lat_pairs(), [[-5.0, 40.0], [10.0, 50.0]]);
    }
}
