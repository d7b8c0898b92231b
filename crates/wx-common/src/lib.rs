//! Shared types for the weather-route workspace.
//!
//! This crate carries the pieces every other crate needs: the fixed-point
//! geographic coordinate model with its wrapping longitude arithmetic, the
//! rectangle type used for region queries, the ICAO standard atmosphere,
//! sunrise/sunset computation and the flight-route model sampled by the
//! profile extractor.

pub mod atmosphere;
pub mod point;
pub mod rect;
pub mod route;
pub mod sun;

pub use point::Point;
pub use rect::Rect;
pub use route::{FlightRoute, Waypoint};
