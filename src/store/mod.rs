//! `BytesStore` — the backing allocation a [`crate::bytes::Bytes`] cursor
//! reads and writes through.
//!
//! A store owns (or borrows) a byte range and exposes absolute-offset
//! primitive access plus the reference-counted lifetime from
//! [`crate::refcount`]. Six concrete backings exist: native fixed, native
//! elastic, heap, a wrapped caller buffer, a raw pointer, and the chunked
//! memory-mapped file in [`crate::mapped`]. `Store` is the tagged union a
//! `Bytes` cursor actually holds; callers normally go through one of the
//! `Store::native_fixed` / `Store::heap` / … constructors rather than naming
//! a variant type directly.

pub mod heap;
pub mod native;
pub mod pointer;
pub mod wrapped;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{BytesError, Result};
use crate::mapped::ChunkedFileStore;
use crate::refcount::{ReferenceOwner, RefCount};

pub use heap::HeapStore;
pub use native::{NativeElasticStore, NativeFixedStore};
pub use pointer::PointerStore;
pub use wrapped::WrappedStore;

/// Absolute-offset primitive access plus lifetime management common to
/// every backing.
///
/// All offsets are absolute, i.e. relative to the store's own `start()`,
/// not to any cursor's read/write position — `Bytes` adds its own position
/// bookkeeping on top.
pub trait BytesStore: std::fmt::Debug {
    /// Start offset of this store's addressable range (always 0 for
    /// in-process backings; meaningful for a view over a wider mapping).
    fn start(&self) -> usize;
    /// The logical capacity a cursor may grow into (native elastic only;
    /// equal to `real_capacity` for every other backing).
    fn capacity(&self) -> usize;
    /// Bytes currently backed by real storage.
    fn real_capacity(&self) -> usize;
    /// `true` if this store has a stable native address (native, pointer,
    /// mapped); `false` for heap, where `address_for_*` always fails.
    fn is_direct(&self) -> bool;

    fn read_byte(&self, offset: usize) -> Result<u8>;
    fn read_short(&self, offset: usize) -> Result<i16>;
    fn read_int(&self, offset: usize) -> Result<i32>;
    fn read_long(&self, offset: usize) -> Result<i64>;
    fn read_float(&self, offset: usize) -> Result<f32>;
    fn read_double(&self, offset: usize) -> Result<f64>;

    fn write_byte(&self, offset: usize, value: u8) -> Result<()>;
    fn write_short(&self, offset: usize, value: i16) -> Result<()>;
    fn write_int(&self, offset: usize, value: i32) -> Result<()>;
    fn write_long(&self, offset: usize, value: i64) -> Result<()>;
    fn write_float(&self, offset: usize, value: f32) -> Result<()>;
    fn write_double(&self, offset: usize, value: f64) -> Result<()>;

    /// Bulk read of `dst.len()` bytes starting at `offset`.
    fn read(&self, offset: usize, dst: &mut [u8]) -> Result<()>;
    /// `write(offset, src, srcOff, len)` — writes `&src[src_off..src_off+len]`
    /// at `offset`.
    fn write(&self, offset: usize, src: &[u8], src_off: usize, len: usize) -> Result<()>;

    /// Copies `self.real_capacity()` bytes, starting at `self.start()`, into
    /// `dst` starting at `dst.start()`.
    fn copy_to(&self, dst: &dyn BytesStore) -> Result<()>;
    /// `move(from, to, len)` within this store — memmove semantics.
    fn move_bytes(&self, from: usize, to: usize, len: usize) -> Result<()>;

    fn compare_and_swap_int(&self, offset: usize, expected: i32, new: i32) -> Result<bool>;
    fn compare_and_swap_long(&self, offset: usize, expected: i64, new: i64) -> Result<bool>;

    /// Native read address at `offset`. Fails for heap-backed stores.
    fn address_for_read(&self, offset: usize) -> Result<*const u8>;
    /// Native write address at `offset`. Fails for heap-backed or
    /// read-only-wrapped stores.
    fn address_for_write(&self, offset: usize) -> Result<*mut u8>;

    /// Grows an elastic store so that `required` bytes are addressable.
    /// Fixed-size backings reject this with [`BytesError::WriteOverflow`].
    fn ensure_capacity(&self, required: usize) -> Result<()> {
        let cap = self.capacity();
        if required <= cap {
            Ok(())
        } else {
            Err(BytesError::WriteOverflow {
                position: required,
                requested: required,
                limit: cap,
            })
        }
    }
    fn is_elastic(&self) -> bool {
        false
    }

    fn reserve(&self, owner: ReferenceOwner) -> Result<()>;
    fn release(&self, owner: ReferenceOwner) -> Result<()>;
    fn release_last(&self, creator: ReferenceOwner) -> Result<()>;
    fn ref_count(&self) -> usize;
}

/// Shared bookkeeping every concrete store wraps: the backing data behind
/// an `Arc` (so additional handles are cheap to mint), the shared
/// [`RefCount`], and the [`ReferenceOwner`] this particular handle was
/// reserved under.
///
/// A second handle to the same underlying data is created with
/// [`StoreHandle::reserve`], not `Clone` — minting one always registers a
/// named reservation, so the accounting in `RefCount` stays truthful.
pub struct StoreHandle<T> {
    data: Arc<T>,
    refcount: Arc<RefCount>,
    owner: ReferenceOwner,
    released_here: AtomicBool,
}

impl<T> StoreHandle<T> {
    pub fn new(data: T, creator: ReferenceOwner, on_release: impl FnOnce() + Send + 'static) -> Self {
        StoreHandle {
            data: Arc::new(data),
            refcount: Arc::new(RefCount::new(creator.clone(), on_release)),
            owner: creator,
            released_here: AtomicBool::new(false),
        }
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn ref_count(&self) -> usize {
        self.refcount.ref_count()
    }

    /// Mints a new handle onto the same data, reserved under `owner`.
    pub fn reserve_handle(&self, owner: ReferenceOwner) -> Result<Self> {
        self.refcount.reserve(owner.clone())?;
        Ok(StoreHandle {
            data: self.data.clone(),
            refcount: self.refcount.clone(),
            owner,
            released_here: AtomicBool::new(false),
        })
    }

    /// Registers an additional reservation for `owner` without minting a
    /// new handle value.
    pub fn raw_reserve(&self, owner: ReferenceOwner) -> Result<()> {
        self.refcount.reserve(owner)
    }
    pub fn raw_release(&self, owner: ReferenceOwner) -> Result<()> {
        self.refcount.release(owner)
    }
    pub fn raw_release_last(&self, creator: ReferenceOwner) -> Result<()> {
        self.refcount.release_last(creator)
    }

    /// Releases this handle's own reservation early, without waiting for
    /// `Drop`. Idempotent: a second call (or the eventual `Drop`) finds the
    /// reservation already gone and is a no-op.
    pub fn release_now(&self) -> Result<()> {
        if self.released_here.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.refcount.release(self.owner.clone())
    }
}

impl<T> Drop for StoreHandle<T> {
    fn drop(&mut self) {
        if !self.released_here.swap(true, Ordering::AcqRel) && !self.refcount.is_released() {
            if let Err(e) = self.refcount.release(self.owner.clone()) {
                log::warn!("store handle dropped without explicit release: {e}");
            }
        }
    }
}

impl<T> std::fmt::Debug for StoreHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("owner", &self.owner)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

/// Tagged union over every backing a `Bytes` cursor can hold. Dispatch is
/// a `match` rather than a trait object so that growth (native elastic
/// only) can replace `self` in place.
#[derive(Debug)]
pub enum Store {
    NativeFixed(NativeFixedStore),
    NativeElastic(NativeElasticStore),
    Heap(HeapStore),
    Wrapped(WrappedStore),
    Pointer(PointerStore),
    Mapped(ChunkedFileStore),
}

macro_rules! dispatch {
    ($self:expr, $variant:ident => $call:expr) => {
        match $self {
            Store::NativeFixed($variant) => $call,
            Store::NativeElastic($variant) => $call,
            Store::Heap($variant) => $call,
            Store::Wrapped($variant) => $call,
            Store::Pointer($variant) => $call,
            Store::Mapped($variant) => $call,
        }
    };
}

impl BytesStore for Store {
    fn start(&self) -> usize {
        dispatch!(self, s => s.start())
    }
    fn capacity(&self) -> usize {
        dispatch!(self, s => s.capacity())
    }
    fn real_capacity(&self) -> usize {
        dispatch!(self, s => s.real_capacity())
    }
    fn is_direct(&self) -> bool {
        dispatch!(self, s => s.is_direct())
    }
    fn read_byte(&self, offset: usize) -> Result<u8> {
        dispatch!(self, s => s.read_byte(offset))
    }
    fn read_short(&self, offset: usize) -> Result<i16> {
        dispatch!(self, s => s.read_short(offset))
    }
    fn read_int(&self, offset: usize) -> Result<i32> {
        dispatch!(self, s => s.read_int(offset))
    }
    fn read_long(&self, offset: usize) -> Result<i64> {
        dispatch!(self, s => s.read_long(offset))
    }
    fn read_float(&self, offset: usize) -> Result<f32> {
        dispatch!(self, s => s.read_float(offset))
    }
    fn read_double(&self, offset: usize) -> Result<f64> {
        dispatch!(self, s => s.read_double(offset))
    }
    fn write_byte(&self, offset: usize, value: u8) -> Result<()> {
        dispatch!(self, s => s.write_byte(offset, value))
    }
    fn write_short(&self, offset: usize, value: i16) -> Result<()> {
        dispatch!(self, s => s.write_short(offset, value))
    }
    fn write_int(&self, offset: usize, value: i32) -> Result<()> {
        dispatch!(self, s => s.write_int(offset, value))
    }
    fn write_long(&self, offset: usize, value: i64) -> Result<()> {
        dispatch!(self, s => s.write_long(offset, value))
    }
    fn write_float(&self, offset: usize, value: f32) -> Result<()> {
        dispatch!(self, s => s.write_float(offset, value))
    }
    fn write_double(&self, offset: usize, value: f64) -> Result<()> {
        dispatch!(self, s => s.write_double(offset, value))
    }
    fn read(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        dispatch!(self, s => s.read(offset, dst))
    }
    fn write(&self, offset: usize, src: &[u8], src_off: usize, len: usize) -> Result<()> {
        dispatch!(self, s => s.write(offset, src, src_off, len))
    }
    fn copy_to(&self, dst: &dyn BytesStore) -> Result<()> {
        dispatch!(self, s => s.copy_to(dst))
    }
    fn move_bytes(&self, from: usize, to: usize, len: usize) -> Result<()> {
        dispatch!(self, s => s.move_bytes(from, to, len))
    }
    fn compare_and_swap_int(&self, offset: usize, expected: i32, new: i32) -> Result<bool> {
        dispatch!(self, s => s.compare_and_swap_int(offset, expected, new))
    }
    fn compare_and_swap_long(&self, offset: usize, expected: i64, new: i64) -> Result<bool> {
        dispatch!(self, s => s.compare_and_swap_long(offset, expected, new))
    }
    fn address_for_read(&self, offset: usize) -> Result<*const u8> {
        dispatch!(self, s => s.address_for_read(offset))
    }
    fn address_for_write(&self, offset: usize) -> Result<*mut u8> {
        dispatch!(self, s => s.address_for_write(offset))
    }
    fn ensure_capacity(&self, required: usize) -> Result<()> {
        dispatch!(self, s => s.ensure_capacity(required))
    }
    fn is_elastic(&self) -> bool {
        dispatch!(self, s => s.is_elastic())
    }
    fn reserve(&self, owner: ReferenceOwner) -> Result<()> {
        dispatch!(self, s => s.reserve(owner))
    }
    fn release(&self, owner: ReferenceOwner) -> Result<()> {
        dispatch!(self, s => s.release(owner))
    }
    fn release_last(&self, creator: ReferenceOwner) -> Result<()> {
        dispatch!(self, s => s.release_last(creator))
    }
    fn ref_count(&self) -> usize {
        dispatch!(self, s => s.ref_count())
    }
}

impl Store {
    /// Mints a new handle onto the same backing, reserved under `owner`.
    /// Fails if this store kind cannot be shared this way (mapped-chunk
    /// handles reserve per-chunk instead; see [`crate::mapped`]).
    pub fn reserve_handle(&self, owner: ReferenceOwner) -> Result<Store> {
        match self {
            Store::NativeFixed(s) => Ok(Store::NativeFixed(s.reserve_handle(owner)?)),
            Store::NativeElastic(s) => Ok(Store::NativeElastic(s.reserve_handle(owner)?)),
            Store::Heap(s) => Ok(Store::Heap(s.reserve_handle(owner)?)),
            Store::Wrapped(s) => Ok(Store::Wrapped(s.reserve_handle(owner)?)),
            Store::Pointer(s) => Ok(Store::Pointer(s.reserve_handle(owner)?)),
            Store::Mapped(s) => Ok(Store::Mapped(s.reserve_handle(owner)?)),
        }
    }
}
