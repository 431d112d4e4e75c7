//! A store wrapping a caller-supplied buffer rather than allocating its
//! own. A buffer wrapped read-only rejects every write attempt.

use std::sync::Mutex;

use crate::error::{BytesError, Result};
use crate::mem::heap;
use crate::refcount::ReferenceOwner;
use crate::store::{BytesStore, StoreHandle};

#[derive(Debug)]
pub struct WrappedStore {
    handle: StoreHandle<Mutex<Vec<u8>>>,
    capacity: usize,
    read_only: bool,
}

impl WrappedStore {
    /// Wraps `buf` for read/write access.
    pub fn wrap(buf: Vec<u8>) -> Self {
        let capacity = buf.len();
        let creator = ReferenceOwner::new("wrapped");
        let handle = StoreHandle::new(Mutex::new(buf), creator, || {});
        WrappedStore {
            handle,
            capacity,
            read_only: false,
        }
    }

    /// Wraps `buf` for read-only access. Any write operation fails with
    /// [`BytesError::InvalidArgument`].
    pub fn wrap_read_only(buf: Vec<u8>) -> Self {
        let mut store = Self::wrap(buf);
        store.read_only = true;
        store
    }

    /// Attempts to open `buf` for write access; fails if it was wrapped
    /// read-only.
    pub fn for_write(self) -> Result<Self> {
        if self.read_only {
            Err(BytesError::InvalidArgument(
                "cannot open a read-only wrapped buffer for write",
            ))
        } else {
            Ok(self)
        }
    }

    pub fn reserve_handle(&self, owner: ReferenceOwner) -> Result<Self> {
        Ok(WrappedStore {
            handle: self.handle.reserve_handle(owner)?,
            capacity: self.capacity,
            read_only: self.read_only,
        })
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            Err(BytesError::InvalidArgument(
                "wrapped buffer is read-only",
            ))
        } else {
            Ok(())
        }
    }

    pub fn start(&self) -> usize {
        0
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn real_capacity(&self) -> usize {
        self.capacity
    }
    pub fn is_direct(&self) -> bool {
        false
    }
    pub fn is_elastic(&self) -> bool {
        false
    }
    pub fn ensure_capacity(&self, required: usize) -> Result<()> {
        if required <= self.capacity {
            Ok(())
        } else {
            Err(BytesError::WriteOverflow {
                position: required,
                requested: required,
                limit: self.capacity,
            })
        }
    }

    pub fn read_byte(&self, offset: usize) -> Result<u8> {
        heap::read_u8(&self.handle.data().lock().unwrap(), offset)
    }
    pub fn read_short(&self, offset: usize) -> Result<i16> {
        heap::read_i16(&self.handle.data().lock().unwrap(), offset)
    }
    pub fn read_int(&self, offset: usize) -> Result<i32> {
        heap::read_i32(&self.handle.data().lock().unwrap(), offset)
    }
    pub fn read_long(&self, offset: usize) -> Result<i64> {
        heap::read_i64(&self.handle.data().lock().unwrap(), offset)
    }
    pub fn read_float(&self, offset: usize) -> Result<f32> {
        heap::read_f32(&self.handle.data().lock().unwrap(), offset)
    }
    pub fn read_double(&self, offset: usize) -> Result<f64> {
        heap::read_f64(&self.handle.data().lock().unwrap(), offset)
    }

    pub fn write_byte(&self, offset: usize, value: u8) -> Result<()> {
        self.check_writable()?;
        heap::write_u8(&mut self.handle.data().lock().unwrap(), offset, value)
    }
    pub fn write_short(&self, offset: usize, value: i16) -> Result<()> {
        self.check_writable()?;
        heap::write_i16(&mut self.handle.data().lock().unwrap(), offset, value)
    }
    pub fn write_int(&self, offset: usize, value: i32) -> Result<()> {
        self.check_writable()?;
        heap::write_i32(&mut self.handle.data().lock().unwrap(), offset, value)
    }
    pub fn write_long(&self, offset: usize, value: i64) -> Result<()> {
        self.check_writable()?;
        heap::write_i64(&mut self.handle.data().lock().unwrap(), offset, value)
    }
    pub fn write_float(&self, offset: usize, value: f32) -> Result<()> {
        self.check_writable()?;
        heap::write_f32(&mut self.handle.data().lock().unwrap(), offset, value)
    }
    pub fn write_double(&self, offset: usize, value: f64) -> Result<()> {
        self.check_writable()?;
        heap::write_f64(&mut self.handle.data().lock().unwrap(), offset, value)
    }

    pub fn read(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        heap::copy(&self.handle.data().lock().unwrap(), offset, dst, 0, dst.len())
    }
    pub fn write(&self, offset: usize, src: &[u8], src_off: usize, len: usize) -> Result<()> {
        self.check_writable()?;
        heap::copy(src, src_off, &mut self.handle.data().lock().unwrap(), offset, len)
    }

    pub fn copy_to(&self, dst: &dyn BytesStore) -> Result<()> {
        let data = self.handle.data().lock().unwrap();
        dst.write(dst.start(), &data, 0, data.len())
    }
    pub fn move_bytes(&self, from: usize, to: usize, len: usize) -> Result<()> {
        self.check_writable()?;
        heap::move_within(&mut self.handle.data().lock().unwrap(), from, to, len)
    }

    pub fn compare_and_swap_int(&self, offset: usize, expected: i32, new: i32) -> Result<bool> {
        self.check_writable()?;
        let mut data = self.handle.data().lock().unwrap();
        let current = heap::read_i32(&data, offset)?;
        if current == expected {
            heap::write_i32(&mut data, offset, new)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
    pub fn compare_and_swap_long(&self, offset: usize, expected: i64, new: i64) -> Result<bool> {
        self.check_writable()?;
        let mut data = self.handle.data().lock().unwrap();
        let current = heap::read_i64(&data, offset)?;
        if current == expected {
            heap::write_i64(&mut data, offset, new)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn address_for_read(&self, offset: usize) -> Result<*const u8> {
        let _ = offset;
        Err(BytesError::InvalidArgument(
            "wrapped heap buffer has no stable native address",
        ))
    }
    pub fn address_for_write(&self, offset: usize) -> Result<*mut u8> {
        let _ = offset;
        Err(BytesError::InvalidArgument(
            "wrapped heap buffer has no stable native address",
        ))
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
    fn read_only_wrap_rejects_writes() {
        let store = WrappedStore::wrap_read_only(vec![1, 2, 3, 4]);
        assert!(matches!(
            store.write_byte(0, 9),
            Err(BytesError::InvalidArgument(_))
        ));
        assert_eq!(store.read_byte(0).unwrap(), 1);
    }

    #[test]
    fn for_write_rejects_read_only_source() {
        let store = WrappedStore::wrap_read_only(vec![0; 4]);
        assert!(store.for_write().is_err());
    }

    #[test]
    fn writable_wrap_round_trips() {
        let store = WrappedStore::wrap(vec![0; 8]);
        store.write_int(0, 123).unwrap();
        assert_eq!(store.read_int(0).unwrap(), 123);
    }
}
