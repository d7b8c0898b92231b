//! Planned flight route consumed by the weather profile extractor.

use serde::{Deserialize, Serialize};

use crate::point::Point;
use crate::rect::Rect;

/// One waypoint of a planned route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Geographic position.
    pub coord: Point,
    /// Planned altitude, feet.
    pub altitude_ft: i32,
    /// Planned elapsed flight time from departure, seconds.
    pub flight_time_s: i64,
}

impl Waypoint {
    pub fn new(coord: Point, altitude_ft: i32, flight_time_s: i64) -> Self {
        Self {
            coord,
            altitude_ft,
            flight_time_s,
        }
    }
}

/// A planned flight route: departure time plus an ordered waypoint sequence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlightRoute {
    /// Off-block / departure time, Unix seconds.
    pub departure_time: i64,
    waypoints: Vec<Waypoint>,
}

impl FlightRoute {
    pub fn new(departure_time: i64) -> Self {
        Self {
            departure_time,
            waypoints: Vec::new(),
        }
    }

    pub fn push(&mut self, wpt: Waypoint) {
        self.waypoints.push(wpt);
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn waypoint(&self, idx: usize) -> Option<&Waypoint> {
        self.waypoints.get(idx)
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    /// Bounding rectangle over all waypoints; `None` for an empty route.
    pub fn bbox(&self) -> Option<Rect> {
        let first = self.waypoints.first()?;
        let mut rect = Rect::new(first.coord, first.coord);
        for wpt in &self.waypoints[1..] {
            rect = rect.extend(&wpt.coord);
        }
        Some(rect)
    }
}
