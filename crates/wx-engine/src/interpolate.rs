//! Least-squares fitting of layer stacks in (time, surface value).
//!
//! Up to four layers (the registry's below/above × below/above envelope)
//! are materialized over a bounding box and fitted per pixel with a
//! `(1, t, s, t·s)` design via the normal-equation pseudoinverse
//! `(AᵀA)⁻¹Aᵀ`. Degenerate axes collapse to a two-column design; fewer than
//! four layers drop the interaction column.

use std::sync::Arc;

use nalgebra::DMatrix;
use tracing::debug;

use wx_common::rect::Rect;

use crate::layer::Layer;
use crate::result::{LayerInterpolateResult, LayerResult, LinInterp};

/// Materialized layer stack ready for fitting.
pub struct Interpolator {
    results: Vec<Arc<LayerResult>>,
    efftimes: Vec<i64>,
    surface1_values: Vec<f64>,
    min_efftime: i64,
    max_efftime: i64,
    min_reftime: i64,
    max_reftime: i64,
    min_surface1: f64,
    max_surface1: f64,
    same_size: bool,
}

impl Interpolator {
    /// Materialize every loadable layer over `bbox`.
    pub fn new(bbox: &Rect, layers: &[Arc<Layer>]) -> Self {
        let mut interp = Self {
            results: Vec::new(),
            efftimes: Vec::new(),
            surface1_values: Vec::new(),
            min_efftime: i64::MAX,
            max_efftime: i64::MIN,
            min_reftime: i64::MAX,
            max_reftime: i64::MIN,
            min_surface1: f64::MAX,
            max_surface1: f64::MIN,
            same_size: true,
        };
        for layer in layers {
            let Some(result) = layer.get_results(bbox) else {
                debug!(layer = ?layer, "layer did not materialize");
                continue;
            };
            interp.min_efftime = interp.min_efftime.min(result.efftime());
            interp.max_efftime = interp.max_efftime.max(result.efftime());
            interp.min_reftime = interp.min_reftime.min(result.min_reftime());
            interp.max_reftime = interp.max_reftime.max(result.max_reftime());
            interp.min_surface1 = interp.min_surface1.min(result.surface1_value());
            interp.max_surface1 = interp.max_surface1.max(result.surface1_value());
            interp.efftimes.push(result.efftime());
            interp.surface1_values.push(result.surface1_value());
            if let Some(first) = interp.results.first() {
                interp.same_size = interp.same_size
                    && first.width() == result.width()
                    && first.height() == result.height()
                    && first.bbox() == result.bbox();
            }
            interp.results.push(result);
        }
        interp
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Wrap a single materialized layer as a constant polynomial field.
    fn nointerp(&self, idx: usize) -> Option<Arc<LayerInterpolateResult>> {
        let result = self.results.get(idx)?;
        let layer = result.layer().clone();
        let efftime = layer.efftime();
        let reftime = layer.reftime();
        let surface1 = layer.surface1().value;
        let data = (0..result.len())
            .map(|i| LinInterp::new(result.at(i), 0.0, 0.0, 0.0))
            .collect();
        Some(Arc::new(LayerInterpolateResult::new(
            layer,
            *result.bbox(),
            result.width(),
            result.height(),
            efftime,
            efftime,
            reftime,
            reftime,
            surface1,
            surface1,
            data,
        )))
    }

    /// Evaluate the fitted polynomial stack. `columns` maps the design
    /// columns onto the four polynomial coefficients.
    fn assemble(
        &self,
        design: DMatrix<f64>,
        columns: &[usize],
        min_efftime: i64,
        max_efftime: i64,
        min_surface1: f64,
        max_surface1: f64,
    ) -> Option<Arc<LayerInterpolateResult>> {
        let n = self.results.len();
        let pseudo = {
            let t = design.transpose();
            let ata = &t * &design;
            let inv = ata.try_inverse()?;
            inv * t
        };
        let first = &self.results[0];
        let width = first.width();
        let height = first.height();
        let mut data = vec![LinInterp::ZERO; (width as usize) * (height as usize)];
        if self.same_size {
            for (i, poly) in data.iter_mut().enumerate() {
                let mut p = [0.0f32; 4];
                for j in 0..n {
                    let y = self.results[j].at(i);
                    for (row, coeff) in columns.iter().enumerate() {
                        p[*coeff] += (pseudo[(row, j)] as f32) * y;
                    }
                }
                *poly = LinInterp::new(p[0], p[1], p[2], p[3]);
            }
        } else {
            // the first layer is authoritative for the output geometry; the
            // others are point-sampled at each output cell centre
            for y in 0..height {
                for x in 0..width {
                    let mut p = [0.0f32; 4];
                    {
                        let v = first.get(x, y);
                        for (row, coeff) in columns.iter().enumerate() {
                            p[*coeff] += (pseudo[(row, 0)] as f32) * v;
                        }
                    }
                    let pt = first.center(x, y);
                    for j in 1..n {
                        let v = self.results[j].sample(&pt);
                        for (row, coeff) in columns.iter().enumerate() {
                            p[*coeff] += (pseudo[(row, j)] as f32) * v;
                        }
                    }
                    data[(x + y * width) as usize] = LinInterp::new(p[0], p[1], p[2], p[3]);
                }
            }
        }
        Some(Arc::new(LayerInterpolateResult::new(
            first.layer().clone(),
            *first.bbox(),
            width,
            height,
            min_efftime,
            max_efftime,
            self.min_reftime,
            self.max_reftime,
            min_surface1,
            max_surface1,
            data,
        )))
    }

    /// Fit along effective time only.
    pub fn fit_time(&self) -> Option<Arc<LayerInterpolateResult>> {
        if self.results.is_empty() {
            return None;
        }
        if self.results.len() == 1 || self.min_efftime >= self.max_efftime {
            return self.nointerp(0);
        }
        let mul = 1.0 / (self.max_efftime - self.min_efftime) as f64;
        let n = self.results.len();
        let design = DMatrix::from_fn(n, 2, |j, c| match c {
            0 => 1.0,
            _ => (self.efftimes[j] - self.min_efftime) as f64 * mul,
        });
        let surface1 = self.surface1_values[0];
        self.assemble(
            design,
            &[0, 1],
            self.min_efftime,
            self.max_efftime,
            surface1,
            surface1,
        )
        .or_else(|| self.nointerp(0))
    }

    /// Fit along the first-surface value only.
    pub fn fit_surface(&self) -> Option<Arc<LayerInterpolateResult>> {
        if self.results.is_empty() {
            return None;
        }
        let spread = self.max_surface1 - self.min_surface1;
        if self.results.len() == 1 || spread <= 0.0 || spread < 1e-100 {
            return self.nointerp(0);
        }
        let mul = 1.0 / spread;
        let n = self.results.len();
        let design = DMatrix::from_fn(n, 2, |j, c| match c {
            0 => 1.0,
            _ => (self.surface1_values[j] - self.min_surface1) * mul,
        });
        let efftime = self.efftimes[0];
        self.assemble(
            design,
            &[0, 2],
            efftime,
            efftime,
            self.min_surface1,
            self.max_surface1,
        )
        .or_else(|| self.nointerp(0))
    }

    /// Fit in both time and surface value; degenerate axes fall back to the
    /// one-dimensional fits.
    pub fn fit(&self) -> Option<Arc<LayerInterpolateResult>> {
        if self.results.is_empty() {
            return None;
        }
        if self.results.len() == 1 {
            return self.nointerp(0);
        }
        if self.min_efftime >= self.max_efftime {
            return self.fit_surface();
        }
        let spread = self.max_surface1 - self.min_surface1;
        if spread <= 0.0 || spread < 1e-100 {
            return self.fit_time();
        }
        let tmul = 1.0 / (self.max_efftime - self.min_efftime) as f64;
        let smul = 1.0 / spread;
        let n = self.results.len();
        // with fewer than four layers the interaction column is dropped
        let with_interaction = n >= 4;
        let cols = if with_interaction { 4 } else { 3 };
        let design = DMatrix::from_fn(n, cols, |j, c| {
            let t = (self.efftimes[j] - self.min_efftime) as f64 * tmul;
            let s = (self.surface1_values[j] - self.min_surface1) * smul;
            match c {
                0 => 1.0,
                1 => t,
                2 => s,
                _ => t * s,
            }
        });
        let columns: &[usize] = if with_interaction {
            &[0, 1, 2, 3]
        } else {
            &[0, 1, 2]
        };
        self.assemble(
            design,
            columns,
            self.min_efftime,
            self.max_efftime,
            self.min_surface1,
            self.max_surface1,
        )
        .or_else(|| self.nointerp(0))
    }
}

/// Materialize and fit a layer stack along effective time.
pub fn interpolate_time(bbox: &Rect, layers: &[Arc<Layer>]) -> Option<Arc<LayerInterpolateResult>> {
    Interpolator::new(bbox, layers).fit_time()
}

/// Materialize and fit a layer stack in time and surface value.
pub fn interpolate(bbox: &Rect, layers: &[Arc<Layer>]) -> Option<Arc<LayerInterpolateResult>> {
    Interpolator::new(bbox, layers).fit()
}
