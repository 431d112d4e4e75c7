// config.rs — compile-time constants and environment-derived configuration.
//
// Governs native-store growth and mapped-chunk geometry. The split between
// "const" (compile time) and env-overridable (runtime, read once via
// OnceLock) mirrors how compression-level and thread-count defaults are
// usually laid out.

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::error::{BytesError, Result};

/// Growth factor applied to a native elastic store on overflow: new
/// capacity is `max(requested, GROWTH_FACTOR * current)`.
pub const GROWTH_FACTOR: usize = 2;

/// Platform maximum capacity for a single store (≈ 2 GiB − 4 KiB). Growth
/// requests are capped at this value.
pub const MAX_CAPACITY: usize = i32::MAX as usize - 4096;

/// Default chunk size for a mapped-chunk store (page-aligned, 256 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Default overlap window, `chunk_size / 4`.
pub const DEFAULT_OVERLAP: usize = DEFAULT_CHUNK_SIZE / 4;

/// 8-byte canary pattern bracketing guarded native allocations.
pub const GUARD_PATTERN: [u8; 8] = 0xDEAD_BEEF_CAFE_BABEu64.to_be_bytes();

/// Environment variable overriding the unique-time provider's shared-file
/// directory. Falls back to the platform temp dir.
pub const ENV_TMPDIR: &str = "BYTES_TMPDIR";

/// Environment variable forcing guarded native allocations on at runtime.
pub const ENV_GUARDED: &str = "BYTES_GUARDED";

fn env_flag_set(name: &str) -> bool {
    match env::var(name) {
        Ok(v) => v == "1" || v.eq_ignore_ascii_case("true"),
        Err(_) => false,
    }
}

/// Directory used for the unique-time provider's shared memory-mapped file.
///
/// Reads `BYTES_TMPDIR` once and caches it; falls back to
/// [`std::env::temp_dir`] when unset.
pub fn tmp_dir() -> &'static PathBuf {
    static DIR: OnceLock<PathBuf> = OnceLock::new();
    DIR.get_or_init(|| match env::var(ENV_TMPDIR) {
        Ok(v) if !v.is_empty() => PathBuf::from(v),
        _ => env::temp_dir(),
    })
}

/// Whether guarded (canary-bracketed) native allocations are active.
///
/// True when the crate was built with the `guarded` feature, or when
/// `BYTES_GUARDED` is set at runtime. Reading the variable when the
/// feature is compiled out is still observed (and logged once) — it has
/// no effect in that case, but the crate does not pretend the variable
/// doesn't exist.
pub fn guarded_enabled() -> bool {
    static WARNED: OnceLock<()> = OnceLock::new();
    if cfg!(feature = "guarded") {
        return true;
    }
    if env_flag_set(ENV_GUARDED) {
        WARNED.get_or_init(|| {
            log::warn!(
                "{} is set but the `guarded` feature was not compiled in; ignoring",
                ENV_GUARDED
            );
        });
    }
    false
}

/// Chunk geometry for a mapped-chunk store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        ChunkConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl ChunkConfig {
    /// Builds a validated chunk configuration. `chunk_size` must be a
    /// non-zero multiple of the OS page size; `overlap` must be non-zero
    /// and page-aligned.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        let page = page_size();
        if chunk_size == 0 || chunk_size % page != 0 {
            return Err(BytesError::InvalidArgument(
                "chunk_size must be a non-zero multiple of the page size",
            ));
        }
        if overlap == 0 || overlap % page != 0 {
            return Err(BytesError::InvalidArgument(
                "overlap must be a non-zero multiple of the page size",
            ));
        }
        Ok(ChunkConfig {
            chunk_size,
            overlap,
        })
    }

    /// The window of a chunk usable for non-straddling access.
    pub fn safe_capacity(&self) -> usize {
        self.chunk_size
    }

    /// The full mapped span of a chunk, including the overlap region.
    pub fn mapped_span(&self) -> usize {
        self.chunk_size + self.overlap
    }
}

/// Returns the OS page size, cached after the first call.
pub fn page_size() -> usize {
    static PAGE: OnceLock<usize> = OnceLock::new();
    *PAGE.get_or_init(|| {
        #[cfg(unix)]
        {
            let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
            if n > 0 {
                n as usize
            } else {
                4096
            }
        }
        #[cfg(not(unix))]
        {
            4096
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chunk_config_is_page_aligned() {
        let cfg = ChunkConfig::default();
        assert_eq!(cfg.chunk_size % page_size(), 0);
        assert_eq!(cfg.overlap % page_size(), 0);
        assert_eq!(cfg.overlap, cfg.chunk_size / 4);
    }

    #[test]
    fn rejects_non_aligned_sizes() {
        assert!(ChunkConfig::new(page_size() + 1, page_size()).is_err());
        assert!(ChunkConfig::new(page_size(), 0).is_err());
    }

    #[test]
    fn mapped_span_is_chunk_plus_overlap() {
        let cfg = ChunkConfig::new(page_size() * 4, page_size()).unwrap();
        assert_eq!(cfg.mapped_span(), cfg.chunk_size + cfg.overlap);
        assert_eq!(cfg.safe_capacity(), cfg.chunk_size);
    }
}
