//! Chunked memory-mapped file store.
//!
//! The file is never mapped in one piece. Instead it is divided into
//! fixed-size chunks, each mapped with an extra overlap window past its
//! nominal end so that an access straddling a chunk boundary usually
//! doesn't need to promote to the next chunk. Chunks are faulted in (and
//! the file extended to cover them) on first touch and cached for reuse;
//! releasing the last reference drops every resident chunk eagerly rather
//! than waiting on the mapping's own `Drop` glue, so `lsof`/`pmap` stop
//! showing the file the moment the store's refcount reaches zero.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use memmap2::MmapMut;

use crate::config::ChunkConfig;
use crate::error::{BytesError, Result};
use crate::mapped::file_lock::FileLock;
use crate::mem::heap;
use crate::refcount::ReferenceOwner;
use crate::store::{BytesStore, StoreHandle};

/// Controls how aggressively [`ChunkedFileStore::sync_up_to`] pushes
/// dirty pages back to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Never sync explicitly; rely on the OS page cache writeback.
    None,
    /// Request an asynchronous flush (returns before the data hits disk).
    Async,
    /// Block until the flush completes.
    Sync,
}

type Chunk = Arc<Mutex<MmapMut>>;
type ChunkTable = Arc<Mutex<HashMap<u64, Chunk>>>;

struct Inner {
    file: Mutex<File>,
    chunks: ChunkTable,
    file_len: AtomicU64,
    lock: FileLock,
    config: ChunkConfig,
    sync_mode: SyncMode,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("len", &self.file_len.load(Ordering::Acquire))
            .field("chunk_size", &self.config.chunk_size)
            .finish()
    }
}

/// A `BytesStore` view over a chunked, memory-mapped file.
#[derive(Debug)]
pub struct ChunkedFileStore {
    handle: StoreHandle<Inner>,
    path: PathBuf,
}

impl ChunkedFileStore {
    pub fn open(path: impl AsRef<Path>, config: ChunkConfig, sync_mode: SyncMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let file_len = file.metadata()?.len();

        let lock_path = {
            let mut p = path.clone();
            let ext = p
                .extension()
                .map(|e| format!("{}.lock", e.to_string_lossy()))
                .unwrap_or_else(|| "lock".to_string());
            p.set_extension(ext);
            p
        };
        let lock = FileLock::open(&lock_path)?;

        let chunks: ChunkTable = Arc::new(Mutex::new(HashMap::new()));
        let on_release_chunks = chunks.clone();
        let creator = ReferenceOwner::new("mapped-chunk-store");
        let inner = Inner {
            file: Mutex::new(file),
            chunks,
            file_len: AtomicU64::new(file_len),
            lock,
            config,
            sync_mode,
        };
        let handle = StoreHandle::new(inner, creator, move || {
            let mut table = on_release_chunks.lock().unwrap();
            log::debug!("unmapping {} resident chunk(s) on release", table.len());
            table.clear();
        });
        Ok(ChunkedFileStore { handle, path })
    }

    pub fn reserve_handle(&self, owner: ReferenceOwner) -> Result<Self> {
        Ok(ChunkedFileStore {
            handle: self.handle.reserve_handle(owner)?,
            path: self.path.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn inner(&self) -> &Inner {
        self.handle.data()
    }

    /// Resolves an absolute offset/width pair to a (chunk index, local
    /// offset) pair within the chunk that `offset` nominally belongs to.
    ///
    /// Only serves accesses that fit inside that one chunk's mapped span
    /// (`chunk_size + overlap`) — the overlap window absorbs small
    /// straddles past the nominal chunk boundary, but an access wider
    /// than that can't be serviced by "promoting" to the next chunk:
    /// the next chunk's mapping starts at `(k+1)*chunk_size`, which is
    /// past `offset`, so it doesn't cover the bytes being asked for.
    /// Callers whose width may exceed a single chunk use
    /// [`ChunkedFileStore::for_each_span`] to split the access instead.
    fn resolve(&self, offset: usize, width: usize) -> Result<(u64, usize)> {
        let chunk_size = self.inner().config.chunk_size;
        let k = (offset / chunk_size) as u64;
        let local = offset - (k as usize) * chunk_size;
        if local + width > self.inner().config.mapped_span() {
            return Err(BytesError::InvalidArgument(
                "access width exceeds a single chunk's mapped span",
            ));
        }
        Ok((k, local))
    }

    /// Walks `[offset, offset+len)` one chunk at a time, handing each
    /// piece's mapped slice and local offset to `f` along with how far
    /// into the logical range the piece starts. Used by the bulk
    /// read/write paths so a single call spanning several chunks never
    /// asks `resolve` to serve more than one chunk's worth at once.
    fn for_each_span(
        &self,
        offset: usize,
        len: usize,
        mut f: impl FnMut(&mut [u8], usize, usize, usize) -> Result<()>,
    ) -> Result<()> {
        let chunk_size = self.inner().config.chunk_size;
        let mut done = 0;
        while done < len {
            let pos = offset + done;
            let k = (pos / chunk_size) as u64;
            let local = pos - (k as usize) * chunk_size;
            let piece = (chunk_size - local).min(len - done);
            let chunk = self.fault_in(k)?;
            let mut mmap = chunk.lock().unwrap();
            f(&mut mmap[..], local, done, piece)?;
            drop(mmap);
            done += piece;
        }
        Ok(())
    }

    /// Ensures chunk `k` is resident, extending the file if needed, and
    /// returns a handle to its mapping.
    fn fault_in(&self, k: u64) -> Result<Chunk> {
        if let Some(chunk) = self.inner().chunks.lock().unwrap().get(&k) {
            return Ok(chunk.clone());
        }

        self.inner().lock.lock()?;
        let result = (|| {
            if let Some(chunk) = self.inner().chunks.lock().unwrap().get(&k) {
                return Ok(chunk.clone());
            }
            let chunk_size = self.inner().config.chunk_size as u64;
            let span = self.inner().config.mapped_span() as u64;
            let needed = k * chunk_size + span;

            let mut file = self.inner().file.lock().unwrap();
            let current = self.inner().file_len.load(Ordering::Acquire);
            if needed > current {
                file.set_len(needed)?;
                self.inner().file_len.store(needed, Ordering::Release);
            }
            let mmap = unsafe {
                memmap2::MmapOptions::new()
                    .offset(k * chunk_size)
                    .len(span as usize)
                    .map_mut(&*file)?
            };
            drop(file);
            let chunk: Chunk = Arc::new(Mutex::new(mmap));
            self.inner().chunks.lock().unwrap().insert(k, chunk.clone());
            log::debug!("faulted in chunk {k} ({span} bytes mapped)");
            Ok(chunk)
        })();
        self.inner().lock.unlock()?;
        result
    }

    /// Flushes every resident chunk whose range starts before `offset`.
    pub fn sync_up_to(&self, offset: usize) -> Result<()> {
        if self.inner().sync_mode == SyncMode::None {
            return Ok(());
        }
        let chunk_size = self.inner().config.chunk_size;
        let chunks = self.inner().chunks.lock().unwrap();
        for (&k, chunk) in chunks.iter() {
            if (k as usize) * chunk_size >= offset {
                continue;
            }
            let mmap = chunk.lock().unwrap();
            match self.inner().sync_mode {
                SyncMode::Sync => mmap.flush()?,
                SyncMode::Async => mmap.flush_async()?,
                SyncMode::None => {}
            }
        }
        Ok(())
    }

    pub fn start(&self) -> usize {
        0
    }
    pub fn capacity(&self) -> usize {
        crate::config::MAX_CAPACITY
    }
    pub fn real_capacity(&self) -> usize {
        self.inner().file_len.load(Ordering::Acquire) as usize
    }
    pub fn is_direct(&self) -> bool {
        true
    }
    pub fn is_elastic(&self) -> bool {
        true
    }
    pub fn ensure_capacity(&self, required: usize) -> Result<()> {
        if required > crate::config::MAX_CAPACITY {
            return Err(BytesError::WriteOverflow {
                position: required,
                requested: required,
                limit: crate::config::MAX_CAPACITY,
            });
        }
        // Faulting in the chunk that covers `required` extends the file
        // as a side effect; a bare byte read does that cheaply.
        let (k, _) = self.resolve(required.saturating_sub(1), 1)?;
        self.fault_in(k).map(|_| ())
    }

    fn with_chunk<R>(&self, offset: usize, width: usize, f: impl FnOnce(&mut [u8], usize) -> Result<R>) -> Result<R> {
        let (k, local) = self.resolve(offset, width)?;
        let chunk = self.fault_in(k)?;
        let mut mmap = chunk.lock().unwrap();
        f(&mut mmap[..], local)
    }

    pub fn read_byte(&self, offset: usize) -> Result<u8> {
        self.with_chunk(offset, 1, |s, l| heap::read_u8(s, l))
    }
    pub fn read_short(&self, offset: usize) -> Result<i16> {
        self.with_chunk(offset, 2, |s, l| heap::read_i16(s, l))
    }
    pub fn read_int(&self, offset: usize) -> Result<i32> {
        self.with_chunk(offset, 4, |s, l| heap::read_i32(s, l))
    }
    pub fn read_long(&self, offset: usize) -> Result<i64> {
        self.with_chunk(offset, 8, |s, l| heap::read_i64(s, l))
    }
    pub fn read_float(&self, offset: usize) -> Result<f32> {
        self.with_chunk(offset, 4, |s, l| heap::read_f32(s, l))
    }
    pub fn read_double(&self, offset: usize) -> Result<f64> {
        self.with_chunk(offset, 8, |s, l| heap::read_f64(s, l))
    }

    pub fn write_byte(&self, offset: usize, value: u8) -> Result<()> {
        self.with_chunk(offset, 1, |s, l| heap::write_u8(s, l, value))
    }
    pub fn write_short(&self, offset: usize, value: i16) -> Result<()> {
        self.with_chunk(offset, 2, |s, l| heap::write_i16(s, l, value))
    }
    pub fn write_int(&self, offset: usize, value: i32) -> Result<()> {
        self.with_chunk(offset, 4, |s, l| heap::write_i32(s, l, value))
    }
    pub fn write_long(&self, offset: usize, value: i64) -> Result<()> {
        self.with_chunk(offset, 8, |s, l| heap::write_i64(s, l, value))
    }
    pub fn write_float(&self, offset: usize, value: f32) -> Result<()> {
        self.with_chunk(offset, 4, |s, l| heap::write_f32(s, l, value))
    }
    pub fn write_double(&self, offset: usize, value: f64) -> Result<()> {
        self.with_chunk(offset, 8, |s, l| heap::write_f64(s, l, value))
    }

    pub fn read(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        self.for_each_span(offset, dst.len(), |mmap, local, done, piece| {
            dst[done..done + piece].copy_from_slice(&mmap[local..local + piece]);
            Ok(())
        })
    }
    pub fn write(&self, offset: usize, src: &[u8], src_off: usize, len: usize) -> Result<()> {
        self.for_each_span(offset, len, |mmap, local, done, piece| {
            mmap[local..local + piece].copy_from_slice(&src[src_off + done..src_off + done + piece]);
            Ok(())
        })
    }

    pub fn copy_to(&self, dst: &dyn BytesStore) -> Result<()> {
        let len = self.real_capacity();
        let mut buf = vec![0u8; len];
        self.read(0, &mut buf)?;
        dst.write(dst.start(), &buf, 0, len)
    }

    pub fn move_bytes(&self, from: usize, to: usize, len: usize) -> Result<()> {
        let mut buf = vec![0u8; len];
        self.read(from, &mut buf)?;
        self.write(to, &buf, 0, len)
    }

    pub fn compare_and_swap_int(&self, offset: usize, expected: i32, new: i32) -> Result<bool> {
        self.with_chunk(offset, 4, |s, l| {
            let current = heap::read_i32(s, l)?;
            if current == expected {
                heap::write_i32(s, l, new)?;
                Ok(true)
            } else {
                Ok(false)
            }
        })
    }
    pub fn compare_and_swap_long(&self, offset: usize, expected: i64, new: i64) -> Result<bool> {
        self.with_chunk(offset, 8, |s, l| {
            let current = heap::read_i64(s, l)?;
            if current == expected {
                heap::write_i64(s, l, new)?;
                Ok(true)
            } else {
                Ok(false)
            }
        })
    }

    pub fn address_for_read(&self, offset: usize) -> Result<*const u8> {
        let (k, local) = self.resolve(offset, 1)?;
        let chunk = self.fault_in(k)?;
        let mmap = chunk.lock().unwrap();
        Ok(unsafe { mmap.as_ptr().add(local) })
    }
    pub fn address_for_write(&self, offset: usize) -> Result<*mut u8> {
        let (k, local) = self.resolve(offset, 1)?;
        let chunk = self.fault_in(k)?;
        let mut mmap = chunk.lock().unwrap();
        Ok(unsafe { mmap.as_mut_ptr().add(local) })
    }

    pub fn reserve(&self, owner: ReferenceOwner) -> Result<()> {
        self.handle.raw_reserve(owner)
    }
    pub fn release(&self, owner: ReferenceOwner) -> Result<()> {
        self.handle.raw_release(owner)
    }
    pub fn release_last(&self, creator: ReferenceOwner) -> Result<()> {
        self.handle.raw_release_last(creator)
    }
    pub fn ref_count(&self) -> usize {
        self.handle.ref_count()
    }
}
