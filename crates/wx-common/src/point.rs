//! Fixed-point geographic coordinates.
//!
//! Latitude and longitude are stored as `i32` angle units where 2³¹
//! corresponds to 180°. The longitude circle is therefore exactly 2³² units
//! wide and longitude arithmetic wraps with the machine integer; latitude
//! never wraps and is clamped to ±90° on construction.

use serde::{Deserialize, Serialize};

/// Raw angle unit: `i32` with 2³¹ = 180°.
pub type AngleUnit = i32;

/// Angle units per degree (2³² / 360).
pub const UNITS_PER_DEG: f64 = 4_294_967_296.0 / 360.0;

/// Degrees per angle unit.
pub const DEG_PER_UNIT: f64 = 360.0 / 4_294_967_296.0;

/// Kilometres to nautical miles.
pub const KM_TO_NMI: f64 = 0.539_956_803;

/// Metres to feet.
pub const M_TO_FT: f64 = 3.280_839_895;

/// Feet to metres.
pub const FT_TO_M: f64 = 0.3048;

/// Mean Earth radius in nautical miles.
const EARTH_RADIUS_NMI: f64 = 3440.069;

/// A geographic point in fixed-point angle units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    lat: AngleUnit,
    lon: AngleUnit,
}

impl Point {
    /// Create a point from raw angle units.
    pub fn new(lat: AngleUnit, lon: AngleUnit) -> Self {
        Self { lat, lon }
    }

    /// Create a point from degrees. Latitude is clamped to ±90°, longitude
    /// wraps onto the circle.
    pub fn from_deg(lat_deg: f64, lon_deg: f64) -> Self {
        Self {
            lat: lat_units_from_deg(lat_deg),
            lon: lon_units_from_deg(lon_deg),
        }
    }

    pub fn lat(&self) -> AngleUnit {
        self.lat
    }

    pub fn lon(&self) -> AngleUnit {
        self.lon
    }

    pub fn lat_deg(&self) -> f64 {
        self.lat as f64 * DEG_PER_UNIT
    }

    pub fn lon_deg(&self) -> f64 {
        self.lon as f64 * DEG_PER_UNIT
    }

    pub fn lat_rad(&self) -> f64 {
        self.lat_deg().to_radians()
    }

    pub fn lon_rad(&self) -> f64 {
        self.lon_deg().to_radians()
    }

    /// Component-wise wrapping difference `self - other`.
    pub fn wrapping_sub(&self, other: &Point) -> Point {
        Point {
            lat: self.lat.wrapping_sub(other.lat),
            lon: self.lon.wrapping_sub(other.lon),
        }
    }

    /// Component-wise wrapping sum.
    pub fn wrapping_add(&self, other: &Point) -> Point {
        Point {
            lat: self.lat.wrapping_add(other.lat),
            lon: self.lon.wrapping_add(other.lon),
        }
    }

    /// Great-circle distance to `other` in nautical miles (haversine).
    pub fn spheric_distance_nmi(&self, other: &Point) -> f64 {
        let lat1 = self.lat_rad();
        let lat2 = other.lat_rad();
        let dlat = lat2 - lat1;
        // wrap-aware longitude difference
        let dlon = (other.lon.wrapping_sub(self.lon) as f64 * DEG_PER_UNIT).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * a.sqrt().min(1.0).asin() * EARTH_RADIUS_NMI
    }

    /// Project a point `dist_nmi` away along the initial course
    /// `course_deg` (degrees clockwise from true north).
    pub fn spheric_course_distance_nmi(&self, course_deg: f64, dist_nmi: f64) -> Point {
        let d = dist_nmi / EARTH_RADIUS_NMI;
        let crs = course_deg.to_radians();
        let lat1 = self.lat_rad();
        let lat2 = (lat1.sin() * d.cos() + lat1.cos() * d.sin() * crs.cos()).asin();
        let dlon = (crs.sin() * d.sin() * lat1.cos()).atan2(d.cos() - lat1.sin() * lat2.sin());
        Point {
            lat: lat_units_from_deg(lat2.to_degrees()),
            lon: self
                .lon
                .wrapping_add(angle_units_from_deg(dlon.to_degrees())),
        }
    }
}

/// Convert degrees to wrapped angle units.
pub fn angle_units_from_deg(deg: f64) -> AngleUnit {
    let raw = (deg * UNITS_PER_DEG).round() as i64;
    (raw as u64 & 0xffff_ffff) as u32 as i32
}

fn lat_units_from_deg(deg: f64) -> AngleUnit {
    (deg.clamp(-90.0, 90.0) * UNITS_PER_DEG).round() as AngleUnit
}

fn lon_units_from_deg(deg: f64) -> AngleUnit {
    angle_units_from_deg(deg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degree_round_trip() {
        let pt = Point::from_deg(47.5, 8.5);
        assert!((pt.lat_deg() - 47.5).abs() < 1e-6);
        assert!((pt.lon_deg() - 8.5).abs() < 1e-6);
    }

    #[test]
    fn test_longitude_wraps() {
        let east = Point::from_deg(0.0, 179.5);
        let west = Point::from_deg(0.0, -179.5);
        // crossing the antimeridian is a 1° step, not 359°
        let diff = west.lon().wrapping_sub(east.lon());
        assert!((diff as f64 * DEG_PER_UNIT - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_latitude_clamps() {
        let pt = Point::from_deg(95.0, 0.0);
        assert!((pt.lat_deg() - 90.0).abs() < 1e-6);
        let pt = Point::from_deg(-123.0, 0.0);
        assert!((pt.lat_deg() + 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_spheric_distance() {
        // one degree of latitude is 60 nmi
        let a = Point::from_deg(0.0, 0.0);
        let b = Point::from_deg(1.0, 0.0);
        let d = a.spheric_distance_nmi(&b);
        assert!((d - 60.0).abs() < 0.2, "distance {d}");
    }

    #[test]
    fn test_distance_across_antimeridian() {
        let a = Point::from_deg(0.0, 179.5);
        let b = Point::from_deg(0.0, -179.5);
        let d = a.spheric_distance_nmi(&b);
        assert!((d - 60.0).abs() < 0.2, "distance {d}");
    }

    #[test]
    fn test_course_distance() {
        let a = Point::from_deg(45.0, 10.0);
        let b = a.spheric_course_distance_nmi(90.0, 50.0);
        let d = a.spheric_distance_nmi(&b);
        assert!((d - 50.0).abs() < 0.5, "distance {d}");
        assert!(b.lon_deg() > a.lon_deg());
    }
}
