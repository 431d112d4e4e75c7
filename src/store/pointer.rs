//! A store over a caller-supplied native address. The caller, not this
//! store, owns the memory's lifetime — no allocation happens here and
//! none is freed on release.

use crate::error::{BytesError, Result};
use crate::mem::native;
use crate::refcount::ReferenceOwner;
use crate::store::{BytesStore, StoreHandle};

struct PointerRange {
    addr: usize,
    len: usize,
}

unsafe impl Send for PointerRange {}
unsafe impl Sync for PointerRange {}

impl PointerRange {
    fn ptr(&self) -> *mut u8 {
        self.addr as *mut u8
    }
}

/// A view over `len` bytes starting at `addr`.
///
/// # Safety
/// The caller must guarantee `addr..addr+len` stays valid for at least as
/// long as any `PointerStore` (and any handle reserved from it) is alive.
/// A pointer store must not be used over a source whose address can
/// change (e.g. the backing of an elastic store across a grow) — `new`
/// logs a warning for the construction patterns that most often indicate
/// that mistake.
#[derive(Debug)]
pub struct PointerStore {
    handle: StoreHandle<PointerRange>,
    len: usize,
}

impl PointerStore {
    /// # Safety
    /// See the struct docs.
    pub unsafe fn new(addr: *mut u8, len: usize) -> Self {
        if len == 0 {
            log::warn!(
                "pointer store constructed with zero length; this pattern often indicates the \
                 address source is elastic and may move — pointer stores must not be used over \
                 an elastic source"
            );
        }
        let creator = ReferenceOwner::new("pointer");
        let handle = StoreHandle::new(
            PointerRange {
                addr: addr as usize,
                len,
            },
            creator,
            || {},
        );
        PointerStore { handle, len }
    }

    fn ptr(&self, offset: usize, width: usize) -> Result<*mut u8> {
        self.bounds_check(offset, width)?;
        Ok(unsafe { self.handle.data().ptr().add(offset) })
    }

    fn bounds_check(&self, offset: usize, width: usize) -> Result<()> {
        if offset.checked_add(width).map_or(true, |end| end > self.len) {
            Err(BytesError::OffsetOutOfRange {
                offset,
                start: 0,
                real_capacity: self.len,
            })
        } else {
            Ok(())
        }
    }

    pub fn reserve_handle(&self, owner: ReferenceOwner) -> Result<Self> {
        Ok(PointerStore {
            handle: self.handle.reserve_handle(owner)?,
            len: self.len,
        })
    }

    pub fn start(&self) -> usize {
        0
    }
    pub fn capacity(&self) -> usize {
        self.len
    }
    pub fn real_capacity(&self) -> usize {
        self.len
    }
    pub fn is_direct(&self) -> bool {
        true
    }
    pub fn is_elastic(&self) -> bool {
        false
    }
    pub fn ensure_capacity(&self, required: usize) -> Result<()> {
        if required <= self.len {
            Ok(())
        } else {
            Err(BytesError::WriteOverflow {
                position: required,
                requested: required,
                limit: self.len,
            })
        }
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
        unsafe { native::write_u8(self.ptr(offset, 1)?, value) };
        Ok(())
    }
    pub fn write_short(&self, offset: usize, value: i16) -> Result<()> {
        unsafe { native::write_i16(self.ptr(offset, 2)?, value) };
        Ok(())
    }
    pub fn write_int(&self, offset: usize, value: i32) -> Result<()> {
        unsafe { native::write_i32(self.ptr(offset, 4)?, value) };
        Ok(())
    }
    pub fn write_long(&self, offset: usize, value: i64) -> Result<()> {
        unsafe { native::write_i64(self.ptr(offset, 8)?, value) };
        Ok(())
    }
    pub fn write_float(&self, offset: usize, value: f32) -> Result<()> {
        unsafe { native::write_f32(self.ptr(offset, 4)?, value) };
        Ok(())
    }
    pub fn write_double(&self, offset: usize, value: f64) -> Result<()> {
        unsafe { native::write_f64(self.ptr(offset, 8)?, value) };
        Ok(())
    }

    pub fn read(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        let p = self.ptr(offset, dst.len())?;
        unsafe { native::copy(p, dst.as_mut_ptr(), dst.len()) };
        Ok(())
    }
    pub fn write(&self, offset: usize, src: &[u8], src_off: usize, len: usize) -> Result<()> {
        let p = self.ptr(offset, len)?;
        unsafe { native::copy(src[src_off..src_off + len].as_ptr(), p, len) };
        Ok(())
    }

    pub fn copy_to(&self, dst: &dyn BytesStore) -> Result<()> {
        let mut buf = vec![0u8; self.len];
        self.read(0, &mut buf)?;
        dst.write(dst.start(), &buf, 0, self.len)
    }
    pub fn move_bytes(&self, from: usize, to: usize, len: usize) -> Result<()> {
        self.bounds_check(from, len)?;
        self.bounds_check(to, len)?;
        let base = self.handle.data().ptr();
        unsafe { native::copy(base.add(from), base.add(to), len) };
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
    fn round_trips_over_caller_buffer() {
        let mut buf = [0u8; 16];
        unsafe {
            let store = PointerStore::new(buf.as_mut_ptr(), buf.len());
            store.write_int(0, 77).unwrap();
            assert_eq!(store.read_int(0).unwrap(), 77);
        }
        assert_eq!(i32::from_le_bytes(buf[0..4].try_into().unwrap()), 77);
    }

    #[test]
    fn dropping_the_store_does_not_free_caller_memory() {
        let mut buf = [1u8; 8];
        unsafe {
            let store = PointerStore::new(buf.as_mut_ptr(), buf.len());
            drop(store);
        }
        assert_eq!(buf[0], 1);
    }
}
