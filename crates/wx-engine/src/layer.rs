//! A registered layer and its demand-driven payload cache.
//!
//! The descriptor from the decoder crate stays immutable; decoded data lives
//! behind a mutex and is dropped again by the eviction timer. A failed load
//! leaves the cache negatively marked (`cache_time = i64::MAX`) so repeated
//! queries do not hammer a broken payload; `expire_now` clears that state.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use grib2_decoder::sections::{LayerDescriptor, Surface};
use grib2_decoder::tables::Parameter;
use grib2_decoder::unpacking::{
    decode_codestream, scale_jpeg2000, unpack_complex, unpack_complex_spatial_diff, unpack_simple,
};
use grib2_decoder::{Grid, PackingParams};
use wx_common::point::Point;
use wx_common::rect::Rect;

use crate::diskcache::{self, CacheKey};
use crate::error::EngineResult;
use crate::expiry::{lock, unix_now, ExpiryQueue};
use crate::result::LayerResult;

#[derive(Debug, Default)]
struct CacheState {
    data: Option<Arc<Vec<f32>>>,
    /// Positive-cache expiry when data is present; `i64::MAX` marks a
    /// recently failed load (negative cache).
    cache_time: i64,
}

/// One registered layer: immutable metadata plus cached decoded data.
pub struct Layer {
    descriptor: LayerDescriptor,
    ttl_secs: i64,
    eviction_delay_secs: i64,
    cache_dir: Option<PathBuf>,
    expiry: Arc<ExpiryQueue>,
    state: Mutex<CacheState>,
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("parameter", &self.descriptor.parameter.abbrev)
            .field("surface1", &self.descriptor.surface1)
            .field("efftime", &self.descriptor.efftime)
            .field("reftime", &self.descriptor.reftime)
            .finish()
    }
}

impl Layer {
    pub(crate) fn new(
        descriptor: LayerDescriptor,
        ttl_secs: i64,
        eviction_delay_secs: i64,
        cache_dir: Option<PathBuf>,
        expiry: Arc<ExpiryQueue>,
    ) -> Self {
        Self {
            descriptor,
            ttl_secs,
            eviction_delay_secs,
            cache_dir,
            expiry,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn descriptor(&self) -> &LayerDescriptor {
        &self.descriptor
    }

    pub fn parameter(&self) -> &'static Parameter {
        self.descriptor.parameter
    }

    pub fn grid(&self) -> &Arc<Grid> {
        &self.descriptor.grid
    }

    pub fn reftime(&self) -> i64 {
        self.descriptor.reftime
    }

    pub fn efftime(&self) -> i64 {
        self.descriptor.efftime
    }

    pub fn surface1(&self) -> Surface {
        self.descriptor.surface1
    }

    pub fn surface2(&self) -> Surface {
        self.descriptor.surface2
    }

    /// Whether a later load can be expected to succeed: parameter sanity
    /// for the representation plus an existing, regular source file.
    pub fn check_load(&self) -> bool {
        if self.descriptor.payload.len == 0 {
            return false;
        }
        let params_ok = match &self.descriptor.packing {
            PackingParams::Simple(p) => p.nbits > 0,
            PackingParams::Complex(c) => c.is_general_group_split() && c.ngroups > 0,
            PackingParams::ComplexSpatialDiff(s) => {
                s.complex.is_general_group_split()
                    && s.complex.ngroups > 0
                    && (1..=2).contains(&s.order)
                    && s.extra_descriptor_octets > 0
            }
            PackingParams::Jpeg2000(_) => true,
        };
        params_ok && self.descriptor.payload.path.is_file()
    }

    /// Decode (or serve from cache) and project the window covered by
    /// `bbox`. `None` when the layer cannot be loaded.
    pub fn get_results(self: &Arc<Self>, bbox: &Rect) -> Option<Arc<LayerResult>> {
        let data = {
            let mut state = lock(&self.state);
            if state.data.is_none() {
                self.load_locked(&mut state);
            }
            let data = state.data.clone()?;
            let now = unix_now();
            state.cache_time = now + self.ttl_secs;
            self.expiry
                .schedule(now + self.eviction_delay_secs, Arc::downgrade(self));
            data
        };
        Some(Arc::new(self.project_window(&data, bbox)))
    }

    /// Clear decoded data once the deadline passed and no later use
    /// refreshed the cache time.
    pub(crate) fn expire_if_due(&self, now: i64) {
        let mut state = lock(&self.state);
        if now < state.cache_time {
            return;
        }
        state.data = None;
        state.cache_time = 0;
    }

    /// Drop decoded data and any negative-cache mark immediately.
    pub fn expire_now(&self) {
        let mut state = lock(&self.state);
        state.data = None;
        state.cache_time = 0;
    }

    /// Whether decoded data is currently held (test hook).
    pub fn is_cached(&self) -> bool {
        lock(&self.state).data.is_some()
    }

    fn load_locked(&self, state: &mut CacheState) {
        let now = unix_now();
        if state.cache_time > now {
            debug!(layer = ?self, "negative cache refuses load");
            return;
        }
        state.cache_time = i64::MAX;
        match self.decode_payload() {
            Ok(values) => {
                if values.len() == self.descriptor.grid.cell_count() {
                    state.data = Some(Arc::new(values));
                } else {
                    warn!(
                        layer = ?self,
                        decoded = values.len(),
                        expected = self.descriptor.grid.cell_count(),
                        "decoded grid has wrong size"
                    );
                }
            }
            Err(err) => {
                warn!(layer = ?self, %err, "cannot load layer");
            }
        }
    }

    fn decode_payload(&self) -> EngineResult<Vec<f32>> {
        let grid = &self.descriptor.grid;
        let cell_count = grid.cell_count();
        let mut file = File::open(&self.descriptor.payload.path)?;
        let bitmap = match &self.descriptor.bitmap {
            Some(bm) => {
                let mut bits = vec![0u8; cell_count.div_ceil(8)];
                file.seek(SeekFrom::Start(bm.offset))?;
                file.read_exact(&mut bits)?;
                Some(bits)
            }
            None => None,
        };
        let mut payload = vec![0u8; self.descriptor.payload.len as usize];
        file.seek(SeekFrom::Start(self.descriptor.payload.offset))?;
        file.read_exact(&mut payload)?;
        let bitmap = bitmap.as_deref();
        let values = match &self.descriptor.packing {
            PackingParams::Simple(p) => unpack_simple(&payload, bitmap, cell_count, p),
            PackingParams::Complex(c) => unpack_complex(&payload, bitmap, cell_count, c)?,
            PackingParams::ComplexSpatialDiff(s) => {
                unpack_complex_spatial_diff(&payload, bitmap, cell_count, s)?
            }
            PackingParams::Jpeg2000(j) => {
                let key = CacheKey::for_payload(&payload);
                let cached = self
                    .cache_dir
                    .as_deref()
                    .and_then(|dir| diskcache::load(dir, &key));
                let samples = match cached {
                    Some(samples) => samples,
                    None => {
                        let image = decode_codestream(&payload)?;
                        if let Some(dir) = self.cache_dir.as_deref() {
                            diskcache::store(dir, &key, &image.samples);
                        }
                        image.samples
                    }
                };
                scale_jpeg2000(&samples, bitmap, cell_count, j)
            }
        };
        Ok(values)
    }

    /// Cut the grid window covered by `bbox` out of the decoded data.
    ///
    /// Cells are included when their centres lie within the box expanded by
    /// half a cell. For grids short of global coverage both the unwrapped
    /// and the +360°-shifted overlap are considered and the larger one wins;
    /// the window wraps across the east edge of the grid when stepping.
    fn project_window(self: &Arc<Self>, data: &[f32], bbox: &Rect) -> LayerResult {
        const CIRCLE: i64 = 1 << 32;
        let grid = &self.descriptor.grid;
        let ptsz = grid.point_size();
        let half = Point::new(ptsz.lat() / 2, ptsz.lon() / 2);
        let origin = grid.center(0, 0);
        let ucount = grid.ucount() as i64;
        let vcount = grid.vcount() as i64;
        let ptlat = ptsz.lat() as i64;
        let ptlon = ptsz.lon() as i64;

        let (vmin, vmax) = {
            let south_edge = origin.lat().wrapping_sub(half.lat());
            let by1 = bbox.south().wrapping_sub(south_edge) as i64;
            let by2 = by1 + (bbox.north() as i64 - bbox.south() as i64);
            let mut vmin = by1 / ptlat;
            let mut vmax = (by2 + ptlat - 1) / ptlat;
            vmin = vmin.clamp(0, vcount - 1);
            if vmax >= vcount {
                vmax = vcount - 1;
            } else if vmax < vmin {
                vmax = vmin;
            }
            (vmin, vmax)
        };

        let (umin, uspan) = {
            let west_edge = origin.lon().wrapping_sub(half.lon());
            let mut bx1 = bbox.west().wrapping_sub(west_edge) as i64;
            if bx1 < 0 {
                bx1 += CIRCLE;
            }
            let bx2 = bx1 + bbox.width_lon() as i64;
            let grid_width = ptlon * ucount;
            let (cx1, cx2) = if grid_width >= CIRCLE {
                (bx1, bx2)
            } else {
                // unwrapped overlap vs the +360° shifted overlap
                let c = (bx1, bx2.min(grid_width));
                let d = (bx1.max(CIRCLE), bx2.min(CIRCLE + grid_width));
                if (d.1 - d.0) > (c.1 - c.0) {
                    d
                } else {
                    c
                }
            };
            let umin = (cx1 / ptlon).clamp(0, ucount - 1);
            let uspan = ((cx2 - cx1 + ptlon - 1) / ptlon).clamp(0, ucount - 1);
            (umin, uspan)
        };

        let width = (uspan + 1) as u32;
        let height = (vmax + 1 - vmin) as u32;
        let mut result_bbox = {
            let sw = grid
                .center(umin as i32, vmin as i32)
                .wrapping_sub(&half);
            Rect::new(sw, sw)
        };
        result_bbox.set_north(
            result_bbox
                .south()
                .wrapping_add(((vmax + 1 - vmin) * ptlat) as i32),
        );
        result_bbox.set_east(
            result_bbox
                .west()
                .wrapping_add((ptlon * (uspan + 1)).min(CIRCLE - 1) as i32),
        );

        let mut values = vec![f32::NAN; (width * height) as usize];
        for (vv, v) in (vmin..=vmax).enumerate() {
            for uu in 0..width as i64 {
                let mut u = umin + uu;
                if u >= ucount {
                    u -= ucount;
                }
                values[uu as usize + vv * width as usize] =
                    data[grid.index(u as i32, v as i32)];
            }
        }
        LayerResult::new(
            self.clone(),
            result_bbox,
            width,
            height,
            self.descriptor.efftime,
            self.descriptor.reftime,
            self.descriptor.reftime,
            self.descriptor.surface1.value,
            values,
        )
    }
}
