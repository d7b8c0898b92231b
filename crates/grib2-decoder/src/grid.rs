//! Equirectangular latitude/longitude grid geometry.

use wx_common::point::{AngleUnit, Point};

/// Descriptor of an equirectangular grid (grid definition template 0).
///
/// `(u, v)` always runs west→east / south→north regardless of the file's
/// scanning order; the section-3 parser folds the scanning-mode flags into
/// `scale_u`, `scale_v` and `offset`, which map `(u, v)` to the linear index
/// of the cell in storage order:
///
/// ```text
/// index(u, v) = offset + u * scale_u + v * scale_v
/// ```
///
/// `origin` is the centre of cell `(0, 0)` (the south-west corner cell) and
/// `point_size` the per-cell step. Longitudes wrap modulo the 2³² circle;
/// latitudes clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    origin: Point,
    point_size: Point,
    ucount: u32,
    vcount: u32,
    scale_u: i32,
    scale_v: i32,
    offset: i32,
}

impl Grid {
    pub fn new(
        origin: Point,
        point_size: Point,
        ucount: u32,
        vcount: u32,
        scale_u: i32,
        scale_v: i32,
        offset: i32,
    ) -> Self {
        Self {
            origin,
            point_size,
            ucount,
            vcount,
            scale_u,
            scale_v,
            offset,
        }
    }

    pub fn origin(&self) -> Point {
        self.origin
    }

    pub fn point_size(&self) -> Point {
        self.point_size
    }

    /// Number of columns (west→east).
    pub fn ucount(&self) -> u32 {
        self.ucount
    }

    /// Number of rows (south→north).
    pub fn vcount(&self) -> u32 {
        self.vcount
    }

    /// Total number of cells.
    pub fn cell_count(&self) -> usize {
        self.ucount as usize * self.vcount as usize
    }

    /// Linear storage index of cell `(u, v)`; coordinates clamp to the grid.
    pub fn index(&self, u: i32, v: i32) -> usize {
        let u = u.clamp(0, self.ucount as i32 - 1);
        let v = v.clamp(0, self.vcount as i32 - 1);
        (self.offset + u * self.scale_u + v * self.scale_v) as usize
    }

    /// Geographic centre of cell `(u, v)`; coordinates clamp to the grid.
    pub fn center(&self, u: i32, v: i32) -> Point {
        let u = u.clamp(0, self.ucount as i32 - 1);
        let v = v.clamp(0, self.vcount as i32 - 1);
        Point::new(
            self.origin
                .lat()
                .wrapping_add(v.wrapping_mul(self.point_size.lat())),
            self.origin
                .lon()
                .wrapping_add((u as AngleUnit).wrapping_mul(self.point_size.lon())),
        )
    }

    /// Rewrite grid-axis vector components to true east/north using the
    /// signs of the storage scales.
    pub fn transform_axes(&self, ue: f32, vn: f32) -> (f32, f32) {
        let east = match self.scale_u.signum() {
            1 => ue,
            -1 => -ue,
            _ => 0.0,
        };
        let north = match self.scale_v.signum() {
            1 => vn,
            -1 => -vn,
            _ => 0.0,
        };
        (east, north)
    }
}
