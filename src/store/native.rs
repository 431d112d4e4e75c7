//! Off-heap backings: a fixed-size native allocation, and an elastic one
//! that grows by replacement.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::config::{self, GROWTH_FACTOR, MAX_CAPACITY};
use crate::error::{BytesError, Result};
use crate::mem::native;
use crate::refcount::ReferenceOwner;
use crate::store::{BytesStore, StoreHandle};

/// Plain pointer+length pair. No `Drop` of its own — freeing happens from
/// the `RefCount` release callback, which is what actually governs when
/// the last logical holder has gone away (not Rust's `Arc` strong count,
/// which just tracks how many `StoreHandle`s currently exist for minting
/// cheaply).
struct NativeAlloc {
    addr: usize,
    len: usize,
}

unsafe impl Send for NativeAlloc {}
unsafe impl Sync for NativeAlloc {}

impl NativeAlloc {
    fn ptr(&self) -> *mut u8 {
        self.addr as *mut u8
    }
}

fn release_closure(addr: usize, len: usize) -> impl FnOnce() + Send + 'static {
    move || unsafe { native::dealloc_native(addr as *mut u8, len) }
}

fn guard_check(ptr: *const u8, len: usize) -> Result<()> {
    if !config::guarded_enabled() || len < config::GUARD_PATTERN.len() * 2 {
        return Ok(());
    }
    unsafe {
        let head = std::slice::from_raw_parts(ptr, config::GUARD_PATTERN.len());
        let tail = std::slice::from_raw_parts(
            ptr.add(len - config::GUARD_PATTERN.len()),
            config::GUARD_PATTERN.len(),
        );
        if head != config::GUARD_PATTERN || tail != config::GUARD_PATTERN {
            return Err(BytesError::InvalidArgument(
                "guarded allocation canary corrupted — buffer overrun detected",
            ));
        }
    }
    Ok(())
}

fn write_guards(ptr: *mut u8, len: usize) {
    if !config::guarded_enabled() || len < config::GUARD_PATTERN.len() * 2 {
        return;
    }
    unsafe {
        std::ptr::copy_nonoverlapping(config::GUARD_PATTERN.as_ptr(), ptr, config::GUARD_PATTERN.len());
        std::ptr::copy_nonoverlapping(
            config::GUARD_PATTERN.as_ptr(),
            ptr.add(len - config::GUARD_PATTERN.len()),
            config::GUARD_PATTERN.len(),
        );
    }
}

fn data_range(guarded: bool, len: usize) -> (usize, usize) {
    if guarded && len >= config::GUARD_PATTERN.len() * 2 {
        (config::GUARD_PATTERN.len(), len - config::GUARD_PATTERN.len() * 2)
    } else {
        (0, len)
    }
}

/// A fixed-capacity native allocation. `capacity() == real_capacity()`
/// always; writes past the end fail rather than growing.
#[derive(Debug)]
pub struct NativeFixedStore {
    handle: StoreHandle<NativeAlloc>,
    data_offset: usize,
    data_len: usize,
    guarded: bool,
}

impl NativeFixedStore {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity > MAX_CAPACITY {
            return Err(BytesError::InvalidArgument("capacity exceeds MAX_CAPACITY"));
        }
        let guarded = config::guarded_enabled();
        let pad = if guarded { config::GUARD_PATTERN.len() * 2 } else { 0 };
        let alloc_len = capacity + pad;
        let ptr = unsafe { native::alloc_native(alloc_len)? };
        write_guards(ptr, alloc_len);
        let (data_offset, data_len) = data_range(guarded, alloc_len);
        let addr = ptr as usize;
        let creator = ReferenceOwner::new("native-fixed");
        let handle = StoreHandle::new(
            NativeAlloc { addr, len: alloc_len },
            creator,
            release_closure(addr, alloc_len),
        );
        Ok(NativeFixedStore {
            handle,
            data_offset,
            data_len,
            guarded,
        })
    }

    fn ptr(&self, offset: usize) -> Result<*mut u8> {
        self.bounds_check(offset, 1)?;
        Ok(unsafe { self.handle.data().ptr().add(self.data_offset + offset) })
    }

    fn bounds_check(&self, offset: usize, width: usize) -> Result<()> {
        if offset.checked_add(width).map_or(true, |end| end > self.real_capacity()) {
            return Err(BytesError::OffsetOutOfRange {
                offset,
                start: 0,
                real_capacity: self.real_capacity(),
            });
        }
        if self.guarded {
            guard_check(self.handle.data().ptr(), self.handle.data().len)?;
        }
        Ok(())
    }

    pub fn reserve_handle(&self, owner: ReferenceOwner) -> Result<Self> {
        Ok(NativeFixedStore {
            handle: self.handle.reserve_handle(owner)?,
            data_offset: self.data_offset,
            data_len: self.data_len,
            guarded: self.guarded,
        })
    }

    pub fn start(&self) -> usize {
        0
    }
    pub fn capacity(&self) -> usize {
        self.data_len
    }
    pub fn real_capacity(&self) -> usize {
        self.data_len
    }
    pub fn is_direct(&self) -> bool {
        true
    }

    pub fn read_byte(&self, offset: usize) -> Result<u8> {
        unsafe { Ok(native::read_u8(self.ptr(offset)?)) }
    }
    pub fn read_short(&self, offset: usize) -> Result<i16> {
        self.bounds_check(offset, 2)?;
        unsafe { Ok(native::read_i16(self.ptr(offset)?)) }
    }
    pub fn read_int(&self, offset: usize) -> Result<i32> {
        self.bounds_check(offset, 4)?;
        unsafe { Ok(native::read_i32(self.ptr(offset)?)) }
    }
    pub fn read_long(&self, offset: usize) -> Result<i64> {
        self.bounds_check(offset, 8)?;
        unsafe { Ok(native::read_i64(self.ptr(offset)?)) }
    }
    pub fn read_float(&self, offset: usize) -> Result<f32> {
        self.bounds_check(offset, 4)?;
        unsafe { Ok(native::read_f32(self.ptr(offset)?)) }
    }
    pub fn read_double(&self, offset: usize) -> Result<f64> {
        self.bounds_check(offset, 8)?;
        unsafe { Ok(native::read_f64(self.ptr(offset)?)) }
    }

    pub fn write_byte(&self, offset: usize, value: u8) -> Result<()> {
        let p = self.ptr(offset)?;
        unsafe { native::write_u8(p, value) };
        Ok(())
    }
    pub fn write_short(&self, offset: usize, value: i16) -> Result<()> {
        self.bounds_check(offset, 2)?;
        unsafe { native::write_i16(self.ptr(offset)?, value) };
        Ok(())
    }
    pub fn write_int(&self, offset: usize, value: i32) -> Result<()> {
        self.bounds_check(offset, 4)?;
        unsafe { native::write_i32(self.ptr(offset)?, value) };
        Ok(())
    }
    pub fn write_long(&self, offset: usize, value: i64) -> Result<()> {
        self.bounds_check(offset, 8)?;
        unsafe { native::write_i64(self.ptr(offset)?, value) };
        Ok(())
    }
    pub fn write_float(&self, offset: usize, value: f32) -> Result<()> {
        self.bounds_check(offset, 4)?;
        unsafe { native::write_f32(self.ptr(offset)?, value) };
        Ok(())
    }
    pub fn write_double(&self, offset: usize, value: f64) -> Result<()> {
        self.bounds_check(offset, 8)?;
        unsafe { native::write_f64(self.ptr(offset)?, value) };
        Ok(())
    }

    pub fn read(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        self.bounds_check(offset, dst.len())?;
        let p = self.ptr(offset)?;
        unsafe { native::copy(p, dst.as_mut_ptr(), dst.len()) };
        Ok(())
    }
    pub fn write(&self, offset: usize, src: &[u8], src_off: usize, len: usize) -> Result<()> {
        self.bounds_check(offset, len)?;
        let p = self.ptr(offset)?;
        unsafe { native::copy(src[src_off..src_off + len].as_ptr(), p, len) };
        Ok(())
    }

    pub fn copy_to(&self, dst: &dyn BytesStore) -> Result<()> {
        let len = self.real_capacity();
        let mut buf = vec![0u8; len];
        self.read(0, &mut buf)?;
        dst.write(dst.start(), &buf, 0, len)
    }
    pub fn move_bytes(&self, from: usize, to: usize, len: usize) -> Result<()> {
        self.bounds_check(from, len)?;
        self.bounds_check(to, len)?;
        let base = self.ptr(0)?;
        unsafe { native::copy(base.add(from), base.add(to), len) };
        Ok(())
    }

    pub fn compare_and_swap_int(&self, offset: usize, expected: i32, new: i32) -> Result<bool> {
        self.bounds_check(offset, 4)?;
        unsafe { native::compare_and_swap_i32(self.ptr(offset)?, expected, new) }
    }
    pub fn compare_and_swap_long(&self, offset: usize, expected: i64, new: i64) -> Result<bool> {
        self.bounds_check(offset, 8)?;
        unsafe { native::compare_and_swap_i64(self.ptr(offset)?, expected, new) }
    }

    pub fn address_for_read(&self, offset: usize) -> Result<*const u8> {
        Ok(self.ptr(offset)? as *const u8)
    }
    pub fn address_for_write(&self, offset: usize) -> Result<*mut u8> {
        self.ptr(offset)
    }

    pub fn ensure_capacity(&self, required: usize) -> Result<()> {
        if required <= self.capacity() {
            Ok(())
        } else {
            Err(BytesError::WriteOverflow {
                position: required,
                requested: required,
                limit: self.capacity(),
            })
        }
    }
    pub fn is_elastic(&self) -> bool {
        false
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

/// An elastic native allocation. Growth reallocates the backing storage
/// in place under a lock: new capacity is `max(requested, GROWTH_FACTOR *
/// current)`, capped at `MAX_CAPACITY`. Callers are expected to hold an
/// exclusive `&mut` or otherwise serialize writers the way a `Bytes`
/// cursor already requires (cursors are not safe to share across threads
/// without external synchronization), so growth does not attempt to keep
/// a stale allocation alive for unsynchronized concurrent readers.
#[derive(Debug)]
pub struct NativeElasticStore {
    handle: StoreHandle<Mutex<NativeAlloc>>,
    real_capacity: std::sync::Arc<AtomicUsize>,
}

impl NativeElasticStore {
    pub fn new(initial_capacity: usize) -> Result<Self> {
        let initial_capacity = initial_capacity.max(16);
        let ptr = unsafe { native::alloc_native(initial_capacity)? };
        let addr = ptr as usize;
        let creator = ReferenceOwner::new("native-elastic");
        let handle = StoreHandle::new(
            Mutex::new(NativeAlloc { addr, len: initial_capacity }),
            creator,
            release_closure(addr, initial_capacity),
        );
        Ok(NativeElasticStore {
            handle,
            real_capacity: std::sync::Arc::new(AtomicUsize::new(initial_capacity)),
        })
    }

    pub fn reserve_handle(&self, owner: ReferenceOwner) -> Result<Self> {
        Ok(NativeElasticStore {
            handle: self.handle.reserve_handle(owner)?,
            real_capacity: self.real_capacity.clone(),
        })
    }

    fn ptr(&self, offset: usize, width: usize) -> Result<*mut u8> {
        self.bounds_check(offset, width)?;
        let alloc = self.handle.data().lock().unwrap();
        Ok(unsafe { alloc.ptr().add(offset) })
    }

    fn bounds_check(&self, offset: usize, width: usize) -> Result<()> {
        if offset.checked_add(width).map_or(true, |end| end > self.real_capacity()) {
            Err(BytesError::OffsetOutOfRange {
                offset,
                start: 0,
                real_capacity: self.real_capacity(),
            })
        } else {
            Ok(())
        }
    }

    pub fn start(&self) -> usize {
        0
    }
    pub fn capacity(&self) -> usize {
        MAX_CAPACITY
    }
    pub fn real_capacity(&self) -> usize {
        self.real_capacity.load(Ordering::Acquire)
    }
    pub fn is_direct(&self) -> bool {
        true
    }
    pub fn is_elastic(&self) -> bool {
        true
    }

    pub fn ensure_capacity(&self, required: usize) -> Result<()> {
        if required <= self.real_capacity() {
            return Ok(());
        }
        if required > MAX_CAPACITY {
            return Err(BytesError::WriteOverflow {
                position: required,
                requested: required,
                limit: MAX_CAPACITY,
            });
        }
        let mut alloc = self.handle.data().lock().unwrap();
        let new_len = (required.max(alloc.len * GROWTH_FACTOR)).min(MAX_CAPACITY);
        if self.handle.ref_count() > 1 {
            log::warn!(
                "growing native elastic store with {} outstanding reservations; readers holding \
                 an older handle will not observe the grown bytes",
                self.handle.ref_count() - 1
            );
        }
        let new_ptr = unsafe { native::realloc_native(alloc.ptr(), alloc.len, new_len)? };
        alloc.addr = new_ptr as usize;
        alloc.len = new_len;
        self.real_capacity.store(new_len, Ordering::Release);
        log::debug!("native elastic store grew to {new_len} bytes");
        Ok(())
    }

    pub fn read_byte(&self, offset: usize) -> Result<u8> {
        unsafe { Ok(native::read_u8(self.ptr(offset, 1)?)) }
    }
    pub fn read_short(&self, offset: usize) -> Result<i16> {
        unsafe { Ok(native::read_i16(self.ptr(offset, 2)?)) }
    }
    pub fn read_int(&self, offset: usize) -> Result<i32> {
        unsafe { Ok(native::read_i32(self.ptr(offset, 4)?)) }
    }
    pub fn read_long(&self, offset: usize) -> Result<i64> {
        unsafe { Ok(native::read_i64(self.ptr(offset, 8)?)) }
    }
    pub fn read_float(&self, offset: usize) -> Result<f32> {
        unsafe { Ok(native::read_f32(self.ptr(offset, 4)?)) }
    }
    pub fn read_double(&self, offset: usize) -> Result<f64> {
        unsafe { Ok(native::read_f64(self.ptr(offset, 8)?)) }
    }

    pub fn write_byte(&self, offset: usize, value: u8) -> Result<()> {
        self.ensure_capacity(offset + 1)?;
        unsafe { native::write_u8(self.ptr(offset, 1)?, value) };
        Ok(())
    }
    pub fn write_short(&self, offset: usize, value: i16) -> Result<()> {
        self.ensure_capacity(offset + 2)?;
        unsafe { native::write_i16(self.ptr(offset, 2)?, value) };
        Ok(())
    }
    pub fn write_int(&self, offset: usize, value: i32) -> Result<()> {
        self.ensure_capacity(offset + 4)?;
        unsafe { native::write_i32(self.ptr(offset, 4)?, value) };
        Ok(())
    }
    pub fn write_long(&self, offset: usize, value: i64) -> Result<()> {
        self.ensure_capacity(offset + 8)?;
        unsafe { native::write_i64(self.ptr(offset, 8)?, value) };
        Ok(())
    }
    pub fn write_float(&self, offset: usize, value: f32) -> Result<()> {
        self.ensure_capacity(offset + 4)?;
        unsafe { native::write_f32(self.ptr(offset, 4)?, value) };
        Ok(())
    }
    pub fn write_double(&self, offset: usize, value: f64) -> Result<()> {
        self.ensure_capacity(offset + 8)?;
        unsafe { native::write_f64(self.ptr(offset, 8)?, value) };
        Ok(())
    }

    pub fn read(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        let p = self.ptr(offset, dst.len())?;
        unsafe { native::copy(p, dst.as_mut_ptr(), dst.len()) };
        Ok(())
    }
    pub fn write(&self, offset: usize, src: &[u8], src_off: usize, len: usize) -> Result<()> {
        self.ensure_capacity(offset + len)?;
        let p = self.ptr(offset, len)?;
        unsafe { native::copy(src[src_off..src_off + len].as_ptr(), p, len) };
        Ok(())
    }

    pub fn copy_to(&self, dst: &dyn BytesStore) -> Result<()> {
        let len = self.real_capacity();
        let mut buf = vec![0u8; len];
        self.read(0, &mut buf)?;
        dst.write(dst.start(), &buf, 0, len)
    }
    pub fn move_bytes(&self, from: usize, to: usize, len: usize) -> Result<()> {
        self.bounds_check(from, len)?;
        self.bounds_check(to, len)?;
        let alloc = self.handle.data().lock().unwrap();
        unsafe { native::copy(alloc.ptr().add(from), alloc.ptr().add(to), len) };
        Ok(())
    }

    pub fn compare_and_swap_int(&self, offset: usize, expected: i32, new: i32) -> Result<bool> {
        unsafe { native::compare_and_swap_i32(self.ptr(offset, 4)?, expected, new) }
    }
    pub fn compare_and_swap_long(&self, offset: usize, expected: i64, new: i64) -> Result<bool> {
        unsafe { native::compare_and_swap_i64(self.ptr(offset, 8)?, expected, new) }
    }

    pub fn address_for_read(&self, offset: usize) -> Result<*const u8> {
        Ok(self.ptr(offset, 1)? as *const u8)
    }
    pub fn address_for_write(&self, offset: usize) -> Result<*mut u8> {
        self.ptr(offset, 1)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_store_round_trips_and_rejects_overflow() {
        let store = NativeFixedStore::new(16).unwrap();
        store.write_long(0, 42).unwrap();
        assert_eq!(store.read_long(0).unwrap(), 42);
        assert!(matches!(
            store.write_long(12, 1),
            Err(BytesError::OffsetOutOfRange { .. })
        ));
    }

    #[test]
    fn elastic_store_grows_on_overflow_and_preserves_data() {
        let store = NativeElasticStore::new(16).unwrap();
        store.write_long(0, 0x1122_3344_5566_7788).unwrap();
        store.write_long(64, 99).unwrap();
        assert!(store.real_capacity() >= 72);
        assert_eq!(store.read_long(0).unwrap(), 0x1122_3344_5566_7788);
        assert_eq!(store.read_long(64).unwrap(), 99);
    }

    #[test]
    fn elastic_store_caps_growth_at_max_capacity() {
        let store = NativeElasticStore::new(16).unwrap();
        assert!(store.ensure_capacity(MAX_CAPACITY + 1).is_err());
    }

    #[test]
    fn reserve_handle_shares_same_underlying_bytes() {
        let store = NativeFixedStore::new(8).unwrap();
        store.write_byte(0, 7).unwrap();
        let other_owner = ReferenceOwner::new("reader");
        let handle = store.reserve_handle(other_owner.clone()).unwrap();
        assert_eq!(handle.read_byte(0).unwrap(), 7);
        assert_eq!(store.ref_count(), 2);
        handle.release(other_owner).unwrap();
        assert_eq!(store.ref_count(), 1);
    }
}
