//! Geographic rectangles with wrap-aware longitude extent.

use serde::{Deserialize, Serialize};

use crate::point::{angle_units_from_deg, AngleUnit, Point, DEG_PER_UNIT};

/// A latitude/longitude rectangle described by its south-west and north-east
/// corners. The east edge may lie west of the west edge in raw units when the
/// rectangle spans the antimeridian; the width is always computed modulo the
/// longitude circle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    southwest: Point,
    northeast: Point,
}

impl Rect {
    pub fn new(southwest: Point, northeast: Point) -> Self {
        Self {
            southwest,
            northeast,
        }
    }

    /// Build a rectangle from corner coordinates in degrees.
    pub fn from_deg(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            southwest: Point::from_deg(south, west),
            northeast: Point::from_deg(north, east),
        }
    }

    pub fn southwest(&self) -> Point {
        self.southwest
    }

    pub fn northeast(&self) -> Point {
        self.northeast
    }

    pub fn south(&self) -> AngleUnit {
        self.southwest.lat()
    }

    pub fn north(&self) -> AngleUnit {
        self.northeast.lat()
    }

    pub fn west(&self) -> AngleUnit {
        self.southwest.lon()
    }

    pub fn east(&self) -> AngleUnit {
        self.northeast.lon()
    }

    pub fn set_north(&mut self, lat: AngleUnit) {
        self.northeast = Point::new(lat, self.northeast.lon());
    }

    pub fn set_east(&mut self, lon: AngleUnit) {
        self.northeast = Point::new(self.northeast.lat(), lon);
    }

    /// Longitudinal width in angle units, modulo the circle.
    pub fn width_lon(&self) -> u32 {
        self.east().wrapping_sub(self.west()) as u32
    }

    /// Latitudinal height in angle units.
    pub fn height_lat(&self) -> u32 {
        self.north().wrapping_sub(self.south()) as u32
    }

    /// Whether `pt` lies inside the rectangle (wrap-aware in longitude).
    pub fn contains(&self, pt: &Point) -> bool {
        if pt.lat() < self.south() || pt.lat() > self.north() {
            return false;
        }
        let w = self.width_lon();
        let off = pt.lon().wrapping_sub(self.west()) as u32;
        off <= w
    }

    /// Grow the rectangle by `dist_nmi` nautical miles on every side.
    /// Longitude padding uses the cosine of the most polar covered latitude;
    /// near the poles the rectangle saturates to the full circle.
    pub fn oversize_nmi(&self, dist_nmi: f64) -> Rect {
        let dlat_deg = dist_nmi / 60.0;
        let maxlat = self.north().abs().max(self.south().abs()) as f64 * DEG_PER_UNIT;
        let coslat = maxlat.min(89.0).to_radians().cos();
        let dlon_deg = (dist_nmi / (60.0 * coslat)).min(179.0);
        let dlat = angle_units_from_deg(dlat_deg);
        let dlon = angle_units_from_deg(dlon_deg);
        let south = self.south().saturating_sub(dlat);
        let north = self.north().saturating_add(dlat);
        let width = self.width_lon() as u64 + 2 * dlon as u64;
        if width >= 1 << 32 {
            // full circle
            let west = self.west();
            return Rect::new(
                Point::new(south, west),
                Point::new(north, west.wrapping_sub(1)),
            );
        }
        let west = self.west().wrapping_sub(dlon);
        let east = self.east().wrapping_add(dlon);
        Rect::new(Point::new(south, west), Point::new(north, east))
    }

    /// Smallest rectangle covering both `self` and `pt` (longitude grows
    /// towards the nearer side).
    pub fn extend(&self, pt: &Point) -> Rect {
        let south = self.south().min(pt.lat());
        let north = self.north().max(pt.lat());
        let mut west = self.west();
        let mut east = self.east();
        let w = self.width_lon();
        let off = pt.lon().wrapping_sub(west) as u32;
        if off > w {
            // outside: extend on whichever side is closer
            let east_ext = off - w;
            let west_ext = 0u32.wrapping_sub(off);
            if east_ext <= west_ext {
                east = pt.lon();
            } else {
                west = pt.lon();
            }
        }
        Rect::new(Point::new(south, west), Point::new(north, east))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_across_antimeridian() {
        let r = Rect::from_deg(-10.0, 179.0, 10.0, -179.0);
        let w_deg = r.width_lon() as f64 * DEG_PER_UNIT;
        assert!((w_deg - 2.0).abs() < 1e-6, "width {w_deg}");
    }

    #[test]
    fn test_contains_wraps() {
        let r = Rect::from_deg(-10.0, 179.0, 10.0, -179.0);
        assert!(r.contains(&Point::from_deg(0.0, 180.0)));
        assert!(r.contains(&Point::from_deg(0.0, 179.5)));
        assert!(!r.contains(&Point::from_deg(0.0, 0.0)));
        assert!(!r.contains(&Point::from_deg(20.0, 180.0)));
    }

    #[test]
    fn test_oversize() {
        let r = Rect::from_deg(40.0, 5.0, 50.0, 15.0);
        let big = r.oversize_nmi(100.0);
        assert!(big.contains(&Point::from_deg(40.0, 5.0)));
        assert!(big.contains(&Point::from_deg(51.0, 15.0)));
        assert!(big.contains(&Point::from_deg(39.0, 4.0)));
    }

    #[test]
    fn test_extend() {
        let r = Rect::from_deg(0.0, 0.0, 10.0, 10.0);
        let r = r.extend(&Point::from_deg(-5.0, 12.0));
        assert!(r.contains(&Point::from_deg(-5.0, 12.0)));
        assert!(r.contains(&Point::from_deg(0.0, 0.0)));
    }
}
