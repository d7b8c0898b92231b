//! Materialized query results.
//!
//! [`LayerResult`] is a dense `f32` sub-grid cut out of one layer;
//! [`LayerInterpolateResult`] holds a bilinear polynomial per pixel fitted
//! over up to four layers in (time, surface value). Both are immutable once
//! built and shared by `Arc`.

use std::sync::Arc;

use wx_common::point::Point;
use wx_common::rect::Rect;

use crate::layer::Layer;

/// A dense rectangular cut-out of a decoded layer.
///
/// `bbox` is the exact geographic extent of the returned cells; pixels the
/// source could not cover are `NaN`.
#[derive(Debug)]
pub struct LayerResult {
    layer: Arc<Layer>,
    bbox: Rect,
    width: u32,
    height: u32,
    efftime: i64,
    min_reftime: i64,
    max_reftime: i64,
    surface1_value: f64,
    data: Vec<f32>,
}

impl LayerResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        layer: Arc<Layer>,
        bbox: Rect,
        width: u32,
        height: u32,
        efftime: i64,
        min_reftime: i64,
        max_reftime: i64,
        surface1_value: f64,
        data: Vec<f32>,
    ) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        Self {
            layer,
            bbox,
            width,
            height,
            efftime,
            min_reftime,
            max_reftime,
            surface1_value,
            data,
        }
    }

    pub fn layer(&self) -> &Arc<Layer> {
        &self.layer
    }

    pub fn bbox(&self) -> &Rect {
        &self.bbox
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn efftime(&self) -> i64 {
        self.efftime
    }

    pub fn min_reftime(&self) -> i64 {
        self.min_reftime
    }

    pub fn max_reftime(&self) -> i64 {
        self.max_reftime
    }

    pub fn surface1_value(&self) -> f64 {
        self.surface1_value
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Pixel value at `(x, y)`; `NaN` outside the result.
    pub fn get(&self, x: u32, y: u32) -> f32 {
        if x < self.width && y < self.height {
            self.data[(x + y * self.width) as usize]
        } else {
            f32::NAN
        }
    }

    /// Pixel value by linear index; `NaN` outside the result.
    pub fn at(&self, idx: usize) -> f32 {
        self.data.get(idx).copied().unwrap_or(f32::NAN)
    }

    /// Size of one pixel in angle units.
    pub fn pixel_size(&self) -> Point {
        if self.width == 0 || self.height == 0 {
            return Point::new(0, 0);
        }
        Point::new(
            (self.bbox.height_lat() / self.height) as i32,
            (self.bbox.width_lon() / self.width) as i32,
        )
    }

    /// Geographic centre of pixel `(x, y)`.
    pub fn center(&self, x: u32, y: u32) -> Point {
        let ptsz = self.pixel_size();
        let off = Point::new(
            ptsz.lat() / 2 + (y as i32).wrapping_mul(ptsz.lat()),
            ptsz.lon() / 2 + (x as i32).wrapping_mul(ptsz.lon()),
        );
        self.bbox.southwest().wrapping_add(&off)
    }

    /// Bilinear point sample with `NaN`-neighbour repair: a missing corner
    /// is copied from its in-quadrant partner when the dominant fractional
    /// weight lies on the opposite side; if a required corner stays `NaN`,
    /// the sample is `NaN`.
    pub fn sample(&self, pt: &Point) -> f32 {
        let ptsz = self.pixel_size();
        if ptsz.lat() <= 0 || ptsz.lon() <= 0 {
            return f32::NAN;
        }
        let latd = pt.lat().wrapping_sub(self.bbox.south()) as u32;
        let lond = pt.lon().wrapping_sub(self.bbox.west()) as u32;
        let x = lond / ptsz.lon() as u32;
        let y = latd / ptsz.lat() as u32;
        let fx = (lond - x * ptsz.lon() as u32) as f64 / ptsz.lon() as f64;
        let fy = (latd - y * ptsz.lat() as u32) as f64 / ptsz.lat() as f64;
        let mut v = [[f32::NAN; 2]; 2];
        for (dx, col) in v.iter_mut().enumerate() {
            let xx = x as u64 + dx as u64;
            if xx >= self.width as u64 {
                continue;
            }
            for (dy, cell) in col.iter_mut().enumerate() {
                let yy = y as u64 + dy as u64;
                if yy < self.height as u64 {
                    *cell = self.get(xx as u32, yy as u32);
                }
            }
        }
        let mx = [1.0 - fx, fx];
        let my = [1.0 - fy, fy];
        for xx in 0..2 {
            if mx[xx] < 0.5 {
                continue;
            }
            for yy in 0..2 {
                if v[1 - xx][yy].is_nan() {
                    v[1 - xx][yy] = v[xx][yy];
                }
            }
        }
        for yy in 0..2 {
            if my[yy] < 0.5 {
                continue;
            }
            for xx in 0..2 {
                if v[xx][1 - yy].is_nan() {
                    v[xx][1 - yy] = v[xx][yy];
                }
            }
        }
        let mut z = 0.0f64;
        for xx in 0..2 {
            for yy in 0..2 {
                if v[xx][yy].is_nan() {
                    return f32::NAN;
                }
                z += v[xx][yy] as f64 * mx[xx] * my[yy];
            }
        }
        z as f32
    }
}

/// A 4-term bilinear polynomial `p0 + p1*t + p2*s + p3*t*s` over normalized
/// (time, surface value) indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinInterp {
    p: [f32; 4],
}

impl LinInterp {
    pub const NAN: LinInterp = LinInterp {
        p: [f32::NAN, f32::NAN, f32::NAN, f32::NAN],
    };

    pub fn new(p0: f32, p1: f32, p2: f32, p3: f32) -> Self {
        Self { p: [p0, p1, p2, p3] }
    }

    pub const ZERO: LinInterp = LinInterp { p: [0.0; 4] };

    pub fn coeff(&self, idx: usize) -> f32 {
        self.p.get(idx).copied().unwrap_or(0.0)
    }

    pub fn eval(&self, idx: &InterpIndex) -> f32 {
        self.p[0] + self.p[1] * idx.time + self.p[2] * idx.surface
            + self.p[3] * idx.time * idx.surface
    }

    pub fn is_nan(&self) -> bool {
        self.p.iter().any(|c| c.is_nan())
    }

    fn add_scaled(&mut self, other: &LinInterp, weight: f32) {
        for (a, b) in self.p.iter_mut().zip(other.p.iter()) {
            *a += b * weight;
        }
    }
}

/// Normalized interpolation coordinates inside a layer envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpIndex {
    pub time: f32,
    pub surface: f32,
}

/// Per-pixel interpolation polynomials over a (time, surface value)
/// rectangle, plus the envelope they were fitted in.
#[derive(Debug)]
pub struct LayerInterpolateResult {
    layer: Arc<Layer>,
    bbox: Rect,
    width: u32,
    height: u32,
    min_efftime: i64,
    max_efftime: i64,
    min_reftime: i64,
    max_reftime: i64,
    efftime_mul: f64,
    min_surface1_value: f64,
    max_surface1_value: f64,
    surface1_value_mul: f64,
    data: Vec<LinInterp>,
}

impl LayerInterpolateResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        layer: Arc<Layer>,
        bbox: Rect,
        width: u32,
        height: u32,
        min_efftime: i64,
        max_efftime: i64,
        min_reftime: i64,
        max_reftime: i64,
        min_surface1_value: f64,
        max_surface1_value: f64,
        data: Vec<LinInterp>,
    ) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        let efftime_mul = if max_efftime > min_efftime {
            1.0 / (max_efftime - min_efftime) as f64
        } else {
            0.0
        };
        let spread = max_surface1_value - min_surface1_value;
        let surface1_value_mul = if spread > 0.0 && !spread.is_nan() {
            1.0 / spread
        } else {
            0.0
        };
        Self {
            layer,
            bbox,
            width,
            height,
            min_efftime,
            max_efftime,
            min_reftime,
            max_reftime,
            efftime_mul,
            min_surface1_value,
            max_surface1_value,
            surface1_value_mul,
            data,
        }
    }

    pub fn layer(&self) -> &Arc<Layer> {
        &self.layer
    }

    pub fn bbox(&self) -> &Rect {
        &self.bbox
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn min_efftime(&self) -> i64 {
        self.min_efftime
    }

    pub fn max_efftime(&self) -> i64 {
        self.max_efftime
    }

    pub fn min_reftime(&self) -> i64 {
        self.min_reftime
    }

    pub fn max_reftime(&self) -> i64 {
        self.max_reftime
    }

    pub fn min_surface1_value(&self) -> f64 {
        self.min_surface1_value
    }

    pub fn max_surface1_value(&self) -> f64 {
        self.max_surface1_value
    }

    /// Clamp the query coordinates into the envelope and normalize.
    pub fn index(&self, efftime: i64, surface1_value: f64) -> InterpIndex {
        let t = efftime.clamp(self.min_efftime, self.max_efftime) - self.min_efftime;
        let mut s = surface1_value.clamp(self.min_surface1_value, self.max_surface1_value)
            - self.min_surface1_value;
        if s.is_nan() {
            s = 0.0;
        }
        InterpIndex {
            time: (t as f64 * self.efftime_mul) as f32,
            surface: (s * self.surface1_value_mul) as f32,
        }
    }

    pub fn index_efftime(&self, efftime: i64) -> InterpIndex {
        let t = efftime.clamp(self.min_efftime, self.max_efftime) - self.min_efftime;
        InterpIndex {
            time: (t as f64 * self.efftime_mul) as f32,
            surface: 0.0,
        }
    }

    /// Polynomial at pixel `(x, y)`; the all-NaN polynomial outside.
    pub fn get(&self, x: u32, y: u32) -> LinInterp {
        if x < self.width && y < self.height {
            self.data[(x + y * self.width) as usize]
        } else {
            LinInterp::NAN
        }
    }

    /// Evaluate pixel `(x, y)` at clamped query coordinates.
    pub fn eval_at(&self, x: u32, y: u32, efftime: i64, surface1_value: f64) -> f32 {
        self.get(x, y).eval(&self.index(efftime, surface1_value))
    }

    pub fn pixel_size(&self) -> Point {
        if self.width == 0 || self.height == 0 {
            return Point::new(0, 0);
        }
        Point::new(
            (self.bbox.height_lat() / self.height) as i32,
            (self.bbox.width_lon() / self.width) as i32,
        )
    }

    pub fn center(&self, x: u32, y: u32) -> Point {
        let ptsz = self.pixel_size();
        let off = Point::new(
            ptsz.lat() / 2 + (y as i32).wrapping_mul(ptsz.lat()),
            ptsz.lon() / 2 + (x as i32).wrapping_mul(ptsz.lon()),
        );
        self.bbox.southwest().wrapping_add(&off)
    }

    /// Bilinear point sample of the polynomial field, with the same
    /// `NaN`-neighbour repair as [`LayerResult::sample`].
    pub fn sample(&self, pt: &Point) -> LinInterp {
        let ptsz = self.pixel_size();
        if ptsz.lat() <= 0 || ptsz.lon() <= 0 {
            return LinInterp::NAN;
        }
        let latd = pt.lat().wrapping_sub(self.bbox.south()) as u32;
        let lond = pt.lon().wrapping_sub(self.bbox.west()) as u32;
        let x = lond / ptsz.lon() as u32;
        let y = latd / ptsz.lat() as u32;
        let fx = (lond - x * ptsz.lon() as u32) as f64 / ptsz.lon() as f64;
        let fy = (latd - y * ptsz.lat() as u32) as f64 / ptsz.lat() as f64;
        let mut v = [[LinInterp::NAN; 2]; 2];
        for (dx, col) in v.iter_mut().enumerate() {
            let xx = x as u64 + dx as u64;
            if xx >= self.width as u64 {
                continue;
            }
            for (dy, cell) in col.iter_mut().enumerate() {
                let yy = y as u64 + dy as u64;
                if yy < self.height as u64 {
                    *cell = self.get(xx as u32, yy as u32);
                }
            }
        }
        let mx = [1.0 - fx, fx];
        let my = [1.0 - fy, fy];
        for xx in 0..2 {
            if mx[xx] < 0.5 {
                continue;
            }
            for yy in 0..2 {
                if v[1 - xx][yy].is_nan() {
                    v[1 - xx][yy] = v[xx][yy];
                }
            }
        }
        for yy in 0..2 {
            if my[yy] < 0.5 {
                continue;
            }
            for xx in 0..2 {
                if v[xx][1 - yy].is_nan() {
                    v[xx][1 - yy] = v[xx][yy];
                }
            }
        }
        let mut z = LinInterp::ZERO;
        for xx in 0..2 {
            for yy in 0..2 {
                if v[xx][yy].is_nan() {
                    return LinInterp::NAN;
                }
                z.add_scaled(&v[xx][yy], (mx[xx] * my[yy]) as f32);
            }
        }
        z
    }

    /// Evaluate a point sample at clamped query coordinates.
    pub fn eval_point(&self, pt: &Point, efftime: i64, surface1_value: f64) -> f32 {
        self.sample(pt).eval(&self.index(efftime, surface1_value))
    }

    /// Collapse the polynomial field into a plain [`LayerResult`] at fixed
    /// query coordinates.
    pub fn materialize(&self, efftime: i64, surface1_value: f64) -> LayerResult {
        let efftime = efftime.clamp(self.min_efftime, self.max_efftime);
        let surface1_value =
            surface1_value.clamp(self.min_surface1_value, self.max_surface1_value);
        let idx = self.index(efftime, surface1_value);
        let data = self.data.iter().map(|p| p.eval(&idx)).collect();
        LayerResult::new(
            self.layer.clone(),
            self.bbox,
            self.width,
            self.height,
            efftime,
            self.min_reftime,
            self.max_reftime,
            surface1_value,
            data,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Layer;
    use crate::testsupport::simple_layer;

    fn result_with(data: Vec<f32>, width: u32, height: u32) -> LayerResult {
        let layer: Arc<Layer> = simple_layer();
        // 1° pixels starting at (0°, 0°)
        let bbox = Rect::from_deg(0.0, 0.0, height as f64, width as f64);
        LayerResult::new(layer, bbox, width, height, 0, 0, 0, 0.0, data)
    }

    #[test]
    fn test_get_bounds() {
        let r = result_with(vec![1.0, 2.0, 3.0, 4.0], 2, 2);
        assert_eq!(r.get(0, 0), 1.0);
        assert_eq!(r.get(1, 1), 4.0);
        assert!(r.get(2, 0).is_nan());
        assert!(r.get(0, 2).is_nan());
    }

    #[test]
    fn test_sample_at_pixel_anchor() {
        let r = result_with(vec![1.0, 2.0, 3.0, 4.0], 2, 2);
        // the sampler anchors pixel values at their south-west corner
        let v = r.sample(&Point::from_deg(0.0, 0.0));
        assert!((v - 1.0).abs() < 1e-5, "{v}");
        let v = r.sample(&Point::from_deg(0.0, 1.0));
        assert!((v - 2.0).abs() < 1e-5, "{v}");
    }

    #[test]
    fn test_sample_interpolates_between_cells() {
        let r = result_with(vec![1.0, 3.0, 1.0, 3.0], 2, 2);
        // halfway between the two columns
        let v = r.sample(&Point::from_deg(0.0, 0.5));
        assert!((v - 2.0).abs() < 1e-5, "{v}");
    }

    #[test]
    fn test_sample_repairs_nan_neighbour() {
        let r = result_with(vec![1.0, f32::NAN, 1.0, f32::NAN], 2, 2);
        // dominant weight on the valid left column: the NaN right column is
        // repaired from it
        let v = r.sample(&Point::from_deg(0.0, 0.4));
        assert!((v - 1.0).abs() < 1e-5, "{v}");
        // dominant weight on the NaN column cannot be repaired
        assert!(r.sample(&Point::from_deg(0.0, 0.6)).is_nan());
    }

    #[test]
    fn test_sample_nan_when_unrepairable() {
        let r = result_with(vec![f32::NAN, f32::NAN, f32::NAN, f32::NAN], 2, 2);
        assert!(r.sample(&Point::from_deg(0.5, 0.5)).is_nan());
    }

    #[test]
    fn test_lininterp_eval() {
        let p = LinInterp::new(1.0, 2.0, 3.0, 4.0);
        let idx = InterpIndex {
            time: 0.5,
            surface: 0.25,
        };
        // 1 + 2*0.5 + 3*0.25 + 4*0.125
        assert!((p.eval(&idx) - 3.25).abs() < 1e-6);
        assert!(!p.is_nan());
        assert!(LinInterp::new(1.0, f32::NAN, 0.0, 0.0).is_nan());
    }

    #[test]
    fn test_interpolate_result_index_clamps() {
        let layer = simple_layer();
        let bbox = Rect::from_deg(0.0, 0.0, 1.0, 1.0);
        let r = LayerInterpolateResult::new(
            layer,
            bbox,
            1,
            1,
            1000,
            2000,
            0,
            0,
            100.0,
            200.0,
            vec![LinInterp::new(1.0, 1.0, 1.0, 1.0)],
        );
        let idx = r.index(500, 50.0);
        assert_eq!(idx.time, 0.0);
        assert_eq!(idx.surface, 0.0);
        let idx = r.index(3000, 500.0);
        assert_eq!(idx.time, 1.0);
        assert_eq!(idx.surface, 1.0);
        let idx = r.index(1500, 150.0);
        assert!((idx.time - 0.5).abs() < 1e-6);
        assert!((idx.surface - 0.5).abs() < 1e-6);
    }
}
