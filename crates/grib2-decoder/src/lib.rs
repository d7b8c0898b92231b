//! GRIB2 decoder (WMO FM 92 GRIB Edition 2).
//!
//! This crate reads GRIB2 gridded-binary files and turns each data section
//! into a [`LayerDescriptor`]: immutable metadata (parameter, surfaces,
//! reference and effective time, grid geometry, packing parameters) plus a
//! locator for the still-encoded payload in the source file. Decoding the
//! payload into a dense `f32` grid is demand-driven and lives in
//! [`unpacking`].
//!
//! # Overview
//!
//! GRIB2 files contain one or more messages; each message consists of 8
//! sections:
//!
//! - Section 0: Indicator (16 bytes) - magic, discipline, total length
//! - Section 1: Identification - centre, reference time
//! - Section 2: Local Use (optional, skipped)
//! - Section 3: Grid Definition - lat/lon grid geometry
//! - Section 4: Product Definition - parameter, surfaces, forecast lead
//! - Section 5: Data Representation - packing method and scale factors
//! - Section 6: Bitmap (optional) - per-cell presence bits
//! - Section 7: Data - the encoded payload
//! - Section 8: End - "7777" terminator
//!
//! Sections 3..7 may repeat within a message; every section 7 yields one
//! layer.
//!
//! # Example
//!
//! ```ignore
//! use grib2_decoder::Grib2Scanner;
//!
//! let mut scanner = Grib2Scanner::open("gfs.grib2")?;
//! for layer in scanner.scan() {
//!     println!("{} {:?}", layer.parameter.abbrev, layer.surface1);
//! }
//! ```

pub mod bitreader;
pub mod grid;
pub mod params;
pub mod sections;
pub mod tables;
pub mod testdata;
pub mod unpacking;

pub use bitreader::BitReader;
pub use grid::Grid;
pub use params::{
    ComplexPackingParams, Jpeg2000Params, PackingParams, PackingScale, SimplePackingParams,
    SpatialDiffParams,
};
pub use sections::{BitmapSource, Grib2Scanner, LayerDescriptor, PayloadSource, Surface};

use thiserror::Error;

/// Result type for GRIB2 decoder operations.
pub type Grib2Result<T> = Result<T, Grib2Error>;

/// Error types for GRIB2 decoding.
#[derive(Error, Debug)]
pub enum Grib2Error {
    /// Invalid GRIB2 message framing
    #[error("Invalid GRIB2 format: {0}")]
    InvalidFormat(String),

    /// Bytes ran out before the declared section length
    #[error("Unexpected end of data")]
    UnexpectedEnd,

    /// Malformed section content
    #[error("Invalid section {section}: {reason}")]
    InvalidSection { section: u8, reason: String },

    /// Template this decoder does not implement
    #[error("Unsupported template {template}: {reason}")]
    UnsupportedTemplate { template: u16, reason: String },

    /// Payload decoding failed
    #[error("Data unpacking failed: {0}")]
    UnpackingError(String),

    /// I/O failure on the source file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
