//! Configuration for the weather engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the layer registry and its caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory for the on-disk decoded-value cache. `None` resolves the
    /// per-user data directory plus `gfscache` at startup; an empty
    /// resolution disables the disk cache.
    pub cache_dir: Option<PathBuf>,

    /// How long a decoded grid stays served from memory after its last use,
    /// seconds.
    pub positive_ttl_secs: i64,

    /// Delay until the eviction timer clears an unused decoded grid,
    /// seconds. Slightly longer than the TTL so a refreshed deadline wins.
    pub eviction_delay_secs: i64,

    /// Disk cache: delete entries not accessed for this many days.
    pub cache_max_days: u32,

    /// Disk cache: squeeze to this many bytes after the age sweep.
    pub cache_max_bytes: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            positive_ttl_secs: 60,
            eviction_delay_secs: 65,
            cache_max_days: 30,
            cache_max_bytes: 256 * 1024 * 1024,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("WX_CACHE_DIR") {
            if !val.is_empty() {
                config.cache_dir = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = std::env::var("WX_CACHE_TTL_SECS") {
            if let Ok(secs) = val.parse() {
                config.positive_ttl_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("WX_CACHE_MAX_DAYS") {
            if let Ok(days) = val.parse() {
                config.cache_max_days = days;
            }
        }

        if let Ok(val) = std::env::var("WX_CACHE_MAX_BYTES") {
            if let Ok(bytes) = val.parse() {
                config.cache_max_bytes = bytes;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.positive_ttl_secs <= 0 {
            return Err("positive_ttl_secs must be > 0".to_string());
        }
        if self.eviction_delay_secs < self.positive_ttl_secs {
            return Err("eviction_delay_secs must be >= positive_ttl_secs".to_string());
        }
        Ok(())
    }

    /// Resolve the cache directory, creating it when needed. Returns `None`
    /// (disk cache disabled) when no directory can be provided.
    pub fn resolve_cache_dir(&self) -> Option<PathBuf> {
        let dir = match &self.cache_dir {
            Some(dir) => dir.clone(),
            None => directories::BaseDirs::new()?.data_dir().join("gfscache"),
        };
        if !dir.exists() && std::fs::create_dir_all(&dir).is_err() {
            return None;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755));
        }
        dir.is_dir().then_some(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.positive_ttl_secs, 60);
        assert_eq!(config.eviction_delay_secs, 65);
    }

    #[test]
    fn test_validation_rejects_short_eviction() {
        let config = EngineConfig {
            positive_ttl_secs: 60,
            eviction_delay_secs: 30,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_explicit_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            cache_dir: Some(tmp.path().join("sub").join("gfscache")),
            ..Default::default()
        };
        let dir = config.resolve_cache_dir().unwrap();
        assert!(dir.is_dir());
    }
}
