//! Weather query engine over decoded GRIB2 layers.
//!
//! The engine keeps the layers emitted by `grib2-decoder` in an ordered,
//! concurrent [`LayerRegistry`], decodes payload grids on demand behind a
//! per-layer TTL cache, projects bounding boxes onto grid windows, fits
//! layer stacks in (time, surface value) by least squares, and samples the
//! fitted fields along flight routes into weather profiles.
//!
//! # Example
//!
//! ```ignore
//! use wx_engine::{EngineConfig, LayerRegistry};
//!
//! let registry = LayerRegistry::new(EngineConfig::default())?;
//! registry.parse_path("/var/cache/gfs")?;
//! registry.remove_obsolete_layers();
//! let profile = registry.weather_profile(&route);
//! ```

pub mod config;
pub mod diskcache;
pub mod error;
mod expiry;
pub mod interpolate;
pub mod layer;
pub mod profile;
pub mod registry;
pub mod result;
pub mod stability;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use interpolate::{interpolate, interpolate_time, Interpolator};
pub use layer::Layer;
pub use profile::{SurfaceSample, WeatherProfile, WeatherProfilePoint};
pub use registry::LayerRegistry;
pub use result::{InterpIndex, LayerInterpolateResult, LayerResult, LinInterp};
pub use stability::{SoundingLevel, Stability};
