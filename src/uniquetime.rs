//! Host-wide unique timestamps.
//!
//! A single 8-byte cell in a small memory-mapped file, one per host, holds
//! the last timestamp issued. Each call folds a host identifier into the
//! low bits of the cell (so two hosts can never return the same value even
//! if their clocks agree to the nanosecond) and CASes the cell forward by
//! at least one stride, retrying on contention — the same
//! read-compute-CAS-retry shape [`crate::store::native`] uses for its own
//! `compare_and_swap_long`, just applied to a shared file instead of a
//! process-local allocation.
//!
//! The nanosecond form reserves its low 5 bits for the host id; the
//! microsecond form reserves its low decimal digit. Both share one
//! backing file — nanosecond and microsecond calls interleave safely
//! because both only ever move the cell forward.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use memmap2::MmapMut;

use crate::config;
use crate::error::Result;
use crate::mem::native;

/// Low bits of a nanosecond-mode timestamp reserved for the host id.
const NANO_HOST_BITS: u32 = 5;
/// Name of the shared file under the platform/`BYTES_TMPDIR` temp directory.
const SHARED_FILE_NAME: &str = "bytes-core-unique-time.dat";

struct SharedRegion {
    // Kept alive for the process lifetime so the mapping stays valid;
    // never read through directly.
    _file: std::fs::File,
    mmap: MmapMut,
}

// The mapped cell is only ever touched through atomic CAS; the raw pointer
// derived from `mmap` is safe to share across threads on that basis.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    fn cell_ptr(&self) -> *mut u8 {
        self.mmap.as_ptr() as *mut u8
    }
}

fn shared_path() -> PathBuf {
    config::tmp_dir().join(SHARED_FILE_NAME)
}

fn open_shared_region() -> Result<SharedRegion> {
    let path = shared_path();
    let is_new = !path.exists();
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(&path)?;
    if file.metadata()?.len() < 8 {
        file.set_len(8)?;
    }
    let mmap = unsafe { MmapMut::map_mut(&file)? };
    let region = SharedRegion { _file: file, mmap };
    if is_new {
        // The file was just created by this process; initialize the cell
        // to 0 before anyone else can observe it.
        unsafe { native::write_u64(region.cell_ptr(), 0) };
        log::debug!("initialized unique-time shared file at {}", path.display());
    }
    Ok(region)
}

fn shared_region() -> &'static SharedRegion {
    static REGION: OnceLock<SharedRegion> = OnceLock::new();
    REGION.get_or_init(|| {
        open_shared_region().unwrap_or_else(|e| {
            panic!("failed to open unique-time shared file {:?}: {e}", shared_path())
        })
    })
}

fn host_id() -> u64 {
    static ID: OnceLock<u64> = OnceLock::new();
    *ID.get_or_init(|| {
        let name = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .unwrap_or_else(|_| "localhost".to_string());
        // FNV-1a over the hostname — any stable, host-distinguishing hash
        // works; the algorithm only needs low bits to differ across hosts,
        // not cryptographic properties.
        let mut hash: u64 = 0xcbf29ce484222325;
        for b in name.as_bytes() {
            hash ^= *b as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
        }
        hash
    })
}

fn now_nanos_since_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as u64
}

fn cas_forward(region: &SharedRegion, next_component: impl Fn(u64) -> u64, encode: impl Fn(u64) -> u64) -> u64 {
    let ptr = region.cell_ptr();
    loop {
        let observed = unsafe { native::read_volatile_u64(ptr) }
            .expect("unique-time cell is 8-byte aligned by construction");
        let component = next_component(observed);
        let candidate = encode(component);
        match unsafe { native::compare_and_swap_i64(ptr, observed as i64, candidate as i64) } {
            Ok(true) => return candidate,
            Ok(false) => {
                log::trace!("unique-time CAS contention, retrying");
                continue;
            }
            Err(_) => continue,
        }
    }
}

/// Returns a strictly increasing, host-wide unique nanosecond timestamp.
///
/// The low 5 bits carry a host identifier; the remaining bits carry a
/// monotonically increasing nanosecond-resolution clock reading advancing
/// by at least `1 << 5` per call.
pub fn unique_nanos() -> u64 {
    let region = shared_region();
    let host = host_id() & ((1 << NANO_HOST_BITS) - 1);
    cas_forward(
        region,
        |observed| {
            let observed_component = observed >> NANO_HOST_BITS;
            let now_component = now_nanos_since_epoch() >> NANO_HOST_BITS;
            now_component.max(observed_component + 1)
        },
        |component| (component << NANO_HOST_BITS) | host,
    )
}

/// Returns a strictly increasing, host-wide unique microsecond timestamp.
///
/// The low decimal digit carries a host identifier; the remaining digits
/// carry a monotonically increasing microsecond-resolution clock reading
/// advancing by at least `1` per call.
pub fn unique_micros() -> u64 {
    let region = shared_region();
    let digit = host_id() % 10;
    cas_forward(
        region,
        |observed| {
            let observed_component = observed / 10;
            let now_component = (now_nanos_since_epoch() / 1000) / 10;
            now_component.max(observed_component + 1)
        },
        |component| component * 10 + digit,
    )
}

/// Converts a value returned by [`unique_nanos`] to its microsecond form.
///
/// Strips the nanosecond-mode host tag, rescales to microseconds, and
/// re-applies this host's microsecond-mode digit tag — the inverse of the
/// encoding [`unique_micros`] performs on the way out.
pub fn to_micros(nanos_value: u64) -> u64 {
    let nanos = (nanos_value >> NANO_HOST_BITS) << NANO_HOST_BITS;
    let micros = nanos / 1000;
    let digit = host_id() % 10;
    (micros / 10) * 10 + digit
}
