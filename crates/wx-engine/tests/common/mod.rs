//! Shared helpers for wx-engine integration tests.

use std::path::{Path, PathBuf};

use wx_engine::{EngineConfig, LayerRegistry};

/// Write concatenated GRIB2 messages into `dir`.
pub fn write_grib(dir: &Path, name: &str, messages: &[Vec<u8>]) -> PathBuf {
    let path = dir.join(name);
    let mut file = Vec::new();
    for msg in messages {
        file.extend_from_slice(msg);
    }
    std::fs::write(&path, file).expect("write grib file");
    path
}

/// Registry with its disk cache confined to `dir`.
pub fn registry_in(dir: &Path) -> LayerRegistry {
    let config = EngineConfig {
        cache_dir: Some(dir.join("gfscache")),
        ..Default::default()
    };
    LayerRegistry::new(config).expect("registry")
}
