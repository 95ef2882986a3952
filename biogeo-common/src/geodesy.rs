//! Geodesy utilities: coordinates, great-circle distance, bounding boxes
//!
//! Pure functions only; no I/O. Distances use a fixed mean Earth radius so
//! results are reproducible run to run.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers (IUGG mean radius)
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A validated geographic coordinate.
///
/// Both fields are always present; a record without a complete lat/lon pair
/// carries no `Coordinate` at all (no partial coordinates).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in decimal degrees, [-90, 90]
    pub latitude: f64,
    /// Longitude in decimal degrees, [-180, 180]
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate, rejecting out-of-range or non-finite values.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::InvalidInput(format!(
                "latitude out of range: {latitude}"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidInput(format!(
                "longitude out of range: {longitude}"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6},{:.6}", self.latitude, self.longitude)
    }
}

/// Geographic bounding box in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// Great-circle (haversine) distance between two coordinates in kilometers.
///
/// Symmetric; zero for identical points.
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().asin();
    EARTH_RADIUS_KM * c
}

/// Bounding box around `center` covering `radius_m` meters in every direction.
///
/// Latitude is clamped at the poles. Longitude wraps at the antimeridian:
/// when the box crosses +/-180, west and east are wrapped into [-180, 180]
/// (so west > east for a crossing box). A box wider than the globe spans the
/// full longitude range.
pub fn bounding_box(center: Coordinate, radius_m: f64) -> BoundingBox {
    let radius_km = radius_m / 1000.0;
    let dlat = (radius_km / EARTH_RADIUS_KM).to_degrees();

    let south = (center.latitude - dlat).max(-90.0);
    let north = (center.latitude + dlat).min(90.0);

    // Longitude degrees shrink with latitude; near the poles the box spans
    // all longitudes.
    let cos_lat = center.latitude.to_radians().cos();
    let dlon = if cos_lat < 1e-9 {
        180.0
    } else {
        (dlat / cos_lat).min(180.0)
    };

    let (west, east) = if dlon >= 180.0 {
        (-180.0, 180.0)
    } else {
        (
            wrap_longitude(center.longitude - dlon),
            wrap_longitude(center.longitude + dlon),
        )
    };

    BoundingBox {
        west,
        south,
        east,
        north,
    }
}

fn wrap_longitude(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else if lon < -180.0 {
        lon + 360.0
    } else {
        lon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
        assert!(Coordinate::new(90.1, 0.0).is_err());
        assert!(Coordinate::new(0.0, -180.1).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = coord(35.9758, -84.2743);
        let b = coord(36.5, -85.0);
        assert_eq!(distance_km(a, b), distance_km(b, a));
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let a = coord(35.9758, -84.2743);
        assert_eq!(distance_km(a, a), 0.0);
    }

    #[test]
    fn test_distance_nearby_points() {
        // ~40 m apart in Oak Ridge, TN
        let a = coord(35.9758, -84.2743);
        let b = coord(35.9761, -84.2745);
        let d = distance_km(a, b);
        assert!(d > 0.03 && d < 0.05, "expected ~0.04 km, got {d}");
    }

    #[test]
    fn test_distance_distant_points() {
        // 0.585 degrees of latitude at constant longitude is ~65 km
        let a = coord(35.0, -84.0);
        let b = coord(35.585, -84.0);
        let d = distance_km(a, b);
        assert!(d > 60.0 && d < 70.0, "expected ~65 km, got {d}");
    }

    #[test]
    fn test_bounding_box_contains_center() {
        let c = coord(35.9758, -84.2743);
        let bbox = bounding_box(c, 1000.0);
        assert!(bbox.south < c.latitude && c.latitude < bbox.north);
        assert!(bbox.west < c.longitude && c.longitude < bbox.east);
        // 1 km box is roughly 0.009 degrees of latitude each way
        assert!((bbox.north - bbox.south) > 0.015 && (bbox.north - bbox.south) < 0.025);
    }

    #[test]
    fn test_bounding_box_clamps_at_pole() {
        let c = coord(89.999, 0.0);
        let bbox = bounding_box(c, 10_000.0);
        assert_eq!(bbox.north, 90.0);
        assert_eq!(bbox.west, -180.0);
        assert_eq!(bbox.east, 180.0);
    }

    #[test]
    fn test_bounding_box_wraps_antimeridian() {
        let c = coord(0.0, 179.999);
        let bbox = bounding_box(c, 5000.0);
        // Crossing box: east wraps into the western hemisphere
        assert!(bbox.west > 0.0);
        assert!(bbox.east < 0.0);
    }
}
