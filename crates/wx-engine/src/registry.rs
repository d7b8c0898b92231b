//! Concurrent ordered layer registry.
//!
//! Layers are kept in a `BTreeMap` ordered by `(parameter, surface1 type,
//! surface1 value, surface2 type, surface2 value, effective time, reference
//! time)`. A single registry mutex serializes structural changes; decoding
//! happens outside that lock on the individual layer's mutex.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, info};

use grib2_decoder::sections::LayerDescriptor;
use grib2_decoder::tables::Parameter;
use grib2_decoder::Grib2Scanner;

use crate::config::EngineConfig;
use crate::diskcache;
use crate::error::{EngineError, EngineResult};
use crate::expiry::{lock, ExpiryQueue};
use crate::layer::Layer;

/// Total registry ordering key.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LayerKey {
    parameter: (u8, u8, u8),
    surface1_type: u8,
    surface1_value: f64,
    surface2_type: u8,
    surface2_value: f64,
    efftime: i64,
    reftime: i64,
}

impl LayerKey {
    fn of(descriptor: &LayerDescriptor) -> Self {
        Self {
            parameter: descriptor.parameter.id_tuple(),
            surface1_type: descriptor.surface1.kind,
            surface1_value: descriptor.surface1.value,
            surface2_type: descriptor.surface2.kind,
            surface2_value: descriptor.surface2.value,
            efftime: descriptor.efftime,
            reftime: descriptor.reftime,
        }
    }

    /// Smallest key of a parameter's range.
    fn range_start(parameter: (u8, u8, u8)) -> Self {
        Self {
            parameter,
            surface1_type: 0,
            surface1_value: f64::NEG_INFINITY,
            surface2_type: 0,
            surface2_value: f64::NEG_INFINITY,
            efftime: i64::MIN,
            reftime: i64::MIN,
        }
    }

    /// Whether every component except the reference time matches.
    fn same_slot(&self, other: &Self) -> bool {
        self.parameter == other.parameter
            && self.surface1_type == other.surface1_type
            && self.surface1_value == other.surface1_value
            && self.surface2_type == other.surface2_type
            && self.surface2_value == other.surface2_value
            && self.efftime == other.efftime
    }
}

impl Eq for LayerKey {}

impl Ord for LayerKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.parameter
            .cmp(&other.parameter)
            .then(self.surface1_type.cmp(&other.surface1_type))
            .then(self.surface1_value.total_cmp(&other.surface1_value))
            .then(self.surface2_type.cmp(&other.surface2_type))
            .then(self.surface2_value.total_cmp(&other.surface2_value))
            .then(self.efftime.cmp(&other.efftime))
            .then(self.reftime.cmp(&other.reftime))
    }
}

impl PartialOrd for LayerKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Surface-identity key used by the per-surface searches.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SurfaceKey {
    surface1_type: u8,
    surface1_value: f64,
    surface2_type: u8,
    surface2_value: f64,
}

impl SurfaceKey {
    fn of(layer: &Layer) -> Self {
        let d = layer.descriptor();
        Self {
            surface1_type: d.surface1.kind,
            surface1_value: d.surface1.value,
            surface2_type: d.surface2.kind,
            surface2_value: d.surface2.value,
        }
    }
}

impl Eq for SurfaceKey {}

impl Ord for SurfaceKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.surface1_type
            .cmp(&other.surface1_type)
            .then(self.surface1_value.total_cmp(&other.surface1_value))
            .then(self.surface2_type.cmp(&other.surface2_type))
            .then(self.surface2_value.total_cmp(&other.surface2_value))
    }
}

impl PartialOrd for SurfaceKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// The layer registry: parses files, deduplicates and serves searches.
pub struct LayerRegistry {
    layers: Mutex<BTreeMap<LayerKey, Arc<Layer>>>,
    config: EngineConfig,
    cache_dir: Option<PathBuf>,
    expiry: Arc<ExpiryQueue>,
    expiry_thread: Option<JoinHandle<()>>,
}

impl LayerRegistry {
    /// Create a registry; resolves (and creates) the disk cache directory.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate().map_err(EngineError::InvalidConfig)?;
        let cache_dir = config.resolve_cache_dir();
        if cache_dir.is_none() {
            debug!("disk cache disabled");
        }
        let (expiry, expiry_thread) = ExpiryQueue::start();
        Ok(Self {
            layers: Mutex::new(BTreeMap::new()),
            config,
            cache_dir,
            expiry,
            expiry_thread: Some(expiry_thread),
        })
    }

    /// Directory of the decoded-value disk cache, if enabled.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// Insert a layer. Duplicate keys (including the reference time) are
    /// rejected.
    pub fn add_layer(&self, layer: Arc<Layer>) -> bool {
        let key = LayerKey::of(layer.descriptor());
        let mut layers = lock(&self.layers);
        if layers.contains_key(&key) {
            debug!(layer = ?layer, "duplicate layer not inserted");
            return false;
        }
        layers.insert(key, layer);
        true
    }

    pub fn len(&self) -> usize {
        lock(&self.layers).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.layers).is_empty()
    }

    fn wrap(&self, descriptor: LayerDescriptor) -> Arc<Layer> {
        Arc::new(Layer::new(
            descriptor,
            self.config.positive_ttl_secs,
            self.config.eviction_delay_secs,
            self.cache_dir.clone(),
            self.expiry.clone(),
        ))
    }

    /// Parse one GRIB2 file and register its layers. Returns the number of
    /// layers added.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> EngineResult<usize> {
        let mut scanner = Grib2Scanner::open(path.as_ref())?;
        let mut added = 0usize;
        for descriptor in scanner.scan() {
            if self.add_layer(self.wrap(descriptor)) {
                added += 1;
            }
        }
        info!(path = %path.as_ref().display(), added, "parsed GRIB2 file");
        Ok(added)
    }

    /// Parse a file or recurse into a directory.
    pub fn parse_path(&self, path: impl AsRef<Path>) -> EngineResult<usize> {
        let path = path.as_ref();
        if path.is_file() {
            return self.parse_file(path);
        }
        if !path.is_dir() {
            return Err(EngineError::InvalidPath(path.to_path_buf()));
        }
        let mut added = 0usize;
        let mut last_err = None;
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            match self.parse_path(entry.path()) {
                Ok(n) => added += n,
                Err(err) => {
                    last_err = Some(err);
                }
            }
        }
        match (added, last_err) {
            (0, Some(err)) => Err(err),
            (added, _) => Ok(added),
        }
    }

    /// All layers in registry order.
    pub fn find_layers(&self) -> Vec<Arc<Layer>> {
        lock(&self.layers).values().cloned().collect()
    }

    /// Drop layers whose source files are gone or whose descriptors fail
    /// the pre-flight check. Returns the number removed.
    pub fn remove_missing_layers(&self) -> usize {
        let mut layers = lock(&self.layers);
        let before = layers.len();
        layers.retain(|_, layer| layer.check_load());
        before - layers.len()
    }

    /// For adjacent entries equal in everything but the reference time,
    /// drop the older one. Returns the number removed.
    pub fn remove_obsolete_layers(&self) -> usize {
        let mut layers = lock(&self.layers);
        let mut obsolete: Vec<LayerKey> = Vec::new();
        let mut iter = layers.keys();
        let mut prev = match iter.next() {
            Some(k) => *k,
            None => return 0,
        };
        for key in iter {
            if prev.same_slot(key) {
                // ordering puts the older reftime first
                obsolete.push(prev);
            }
            prev = *key;
        }
        for key in &obsolete {
            layers.remove(key);
        }
        obsolete.len()
    }

    /// Nearest effective times below and above `efftime`, with the full
    /// surface set at each; the newest reference time wins per surface.
    pub fn find_layers_at(
        &self,
        parameter: &'static Parameter,
        efftime: i64,
    ) -> Vec<Arc<Layer>> {
        let layers = lock(&self.layers);
        let mut eff_below = i64::MIN;
        let mut eff_above = i64::MAX;
        let mut below: BTreeMap<SurfaceKey, Arc<Layer>> = BTreeMap::new();
        let mut above: BTreeMap<SurfaceKey, Arc<Layer>> = BTreeMap::new();
        let start = LayerKey::range_start(parameter.id_tuple());
        for (key, layer) in layers.range(start..) {
            if key.parameter != parameter.id_tuple() {
                break;
            }
            let (slot, slot_eff) = if key.efftime < efftime {
                (&mut below, &mut eff_below)
            } else {
                (&mut above, &mut eff_above)
            };
            let better = if key.efftime < efftime {
                key.efftime > *slot_eff
            } else {
                key.efftime < *slot_eff
            };
            if better {
                slot.clear();
                *slot_eff = key.efftime;
            } else if key.efftime != *slot_eff {
                continue;
            }
            let skey = SurfaceKey::of(layer);
            match slot.get(&skey) {
                Some(existing) if existing.reftime() >= layer.reftime() => {}
                _ => {
                    slot.insert(skey, layer.clone());
                }
            }
        }
        below.into_values().chain(above.into_values()).collect()
    }

    /// The up-to-four layer envelope around `(efftime, surface1_value)`:
    /// nearest below/above in effective time crossed with nearest
    /// below/above in surface value, newest reference time breaking ties.
    pub fn find_layers_around(
        &self,
        parameter: &'static Parameter,
        efftime: i64,
        surface1_type: u8,
        surface1_value: f64,
    ) -> Vec<Arc<Layer>> {
        let layers = lock(&self.layers);
        let mut best: [Option<Arc<Layer>>; 4] = [None, None, None, None];
        let mut best_eff = [0i64, 0, i64::MAX, i64::MAX];
        let start = LayerKey::range_start(parameter.id_tuple());
        for (key, layer) in layers.range(start..) {
            if key.parameter != parameter.id_tuple() {
                break;
            }
            if key.surface1_type != surface1_type {
                continue;
            }
            let time_after = key.efftime >= efftime;
            let value_above = key.surface1_value >= surface1_value;
            let slot = (time_after as usize) * 2 + (value_above as usize);
            let replace = match &best[slot] {
                None => true,
                Some(current) => {
                    let closer_eff = if time_after {
                        key.efftime < best_eff[slot]
                    } else {
                        key.efftime > best_eff[slot]
                    };
                    closer_eff
                        || (key.efftime == best_eff[slot]
                            && (key.reftime > current.reftime()
                                || (key.reftime == current.reftime()
                                    && if value_above {
                                        key.surface1_value < current.surface1().value
                                    } else {
                                        key.surface1_value > current.surface1().value
                                    })))
                }
            };
            if replace {
                best_eff[slot] = key.efftime;
                best[slot] = Some(layer.clone());
            }
        }
        best.into_iter().flatten().collect()
    }

    /// Expire old disk-cache entries with the configured limits.
    pub fn expire_cache(&self) -> EngineResult<usize> {
        let Some(dir) = self.cache_dir.as_deref() else {
            return Ok(0);
        };
        Ok(diskcache::expire(
            dir,
            self.config.cache_max_days,
            self.config.cache_max_bytes,
        )?)
    }
}

impl Drop for LayerRegistry {
    fn drop(&mut self) {
        self.expiry.shutdown();
        if let Some(handle) = self.expiry_thread.take() {
            let _ = handle.join();
        }
    }
}
