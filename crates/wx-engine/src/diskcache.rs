//! On-disk cache of decoded JPEG-2000 integer streams.
//!
//! Entropy-decoding a template-40 payload is by far the most expensive part
//! of serving a layer, so the decoded integer samples are kept in a flat
//! directory of files named `jpeg2000.<32-hex-MD4-of-payload>`. Entries are
//! fixed-width little-endian integers; writes are open-exclusive so two
//! processes never interleave into one file, and a short write unlinks.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use md4::{Digest, Md4};
use tracing::{debug, warn};

/// Largest cache entry read back, guarding against stray files.
const MAX_ENTRY_BYTES: u64 = 128 * 1024 * 1024;

/// Bytes per stored sample.
const SAMPLE_WIDTH: usize = 4;

/// Content-derived cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheKey([u8; 16]);

impl CacheKey {
    /// Key for a payload; the all-zero key of an empty payload never maps to
    /// a file.
    pub fn for_payload(payload: &[u8]) -> Self {
        if payload.is_empty() {
            return Self([0; 16]);
        }
        let mut hasher = Md4::new();
        hasher.update(payload);
        Self(hasher.finalize().into())
    }

    /// File name of the entry, or `None` for the null key.
    pub fn file_name(&self) -> Option<String> {
        if self.0.iter().all(|b| *b == 0) {
            return None;
        }
        let mut name = String::with_capacity(9 + 32);
        name.push_str("jpeg2000.");
        for b in &self.0 {
            use std::fmt::Write as _;
            let _ = write!(name, "{b:02x}");
        }
        Some(name)
    }

    fn path(&self, dir: &Path) -> Option<PathBuf> {
        Some(dir.join(self.file_name()?))
    }
}

/// Load a cached integer stream. Any irregularity is a miss.
pub fn load(dir: &Path, key: &CacheKey) -> Option<Vec<i32>> {
    let path = key.path(dir)?;
    let mut file = File::open(&path).ok()?;
    let len = file.metadata().ok()?.len();
    if len == 0 || len > MAX_ENTRY_BYTES || len % SAMPLE_WIDTH as u64 != 0 {
        return None;
    }
    let mut raw = Vec::with_capacity(len as usize);
    file.read_to_end(&mut raw).ok()?;
    if raw.len() as u64 != len {
        return None;
    }
    let samples = raw
        .chunks_exact(SAMPLE_WIDTH)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    debug!(path = %path.display(), "disk cache hit");
    Some(samples)
}

/// Store an integer stream under its key. Failures only cost a re-decode
/// later, so they are logged and swallowed.
pub fn store(dir: &Path, key: &CacheKey, samples: &[i32]) {
    if samples.is_empty() {
        return;
    }
    let Some(path) = key.path(dir) else {
        return;
    };
    let mut open_options = OpenOptions::new();
    open_options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        open_options.mode(0o755);
    }
    let mut file = match open_options.open(&path) {
        Ok(f) => f,
        // already present (another thread won the race) or not writable
        Err(_) => return,
    };
    let mut raw = Vec::with_capacity(samples.len() * SAMPLE_WIDTH);
    for s in samples {
        raw.extend_from_slice(&s.to_le_bytes());
    }
    if file.write_all(&raw).is_err() {
        drop(file);
        let _ = std::fs::remove_file(&path);
        warn!(path = %path.display(), "partial cache write removed");
    }
}

/// Delete entries last accessed more than `max_days` ago, then delete
/// least-recently-used entries until the directory holds at most
/// `max_bytes`. Returns the number of files removed by the age sweep.
pub fn expire(dir: &Path, max_days: u32, max_bytes: u64) -> std::io::Result<usize> {
    let cutoff = SystemTime::now() - Duration::from_secs(max_days as u64 * 24 * 60 * 60);
    let mut removed = 0usize;
    let mut kept: Vec<(SystemTime, PathBuf, u64)> = Vec::new();
    let mut total: u64 = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();
        let meta = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        let accessed = meta.accessed().or_else(|_| meta.modified());
        let accessed = match accessed {
            Ok(t) => t,
            Err(_) => continue,
        };
        if accessed < cutoff {
            if std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
            continue;
        }
        total += meta.len();
        kept.push((accessed, path, meta.len()));
    }
    kept.sort_by_key(|(t, _, _)| *t);
    let mut lru = kept.into_iter();
    while total > max_bytes {
        let Some((_, path, size)) = lru.next() else {
            break;
        };
        let _ = std::fs::remove_file(&path);
        total = total.saturating_sub(size);
    }
    Ok(removed)
}
