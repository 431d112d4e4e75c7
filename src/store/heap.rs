//! A `BytesStore` backed by a plain `Vec<u8>` living on the Rust heap.
//! Fixed capacity; `address_for_*` always fails here since there is no
//! native address to hand out.

use std::sync::Mutex;

use crate::error::{BytesError, Result};
use crate::mem::heap;
use crate::refcount::ReferenceOwner;
use crate::store::{BytesStore, StoreHandle};

#[derive(Debug)]
pub struct HeapStore {
    handle: StoreHandle<Mutex<Vec<u8>>>,
    capacity: usize,
}

impl HeapStore {
    pub fn new(capacity: usize) -> Self {
        let creator = ReferenceOwner::new("heap");
        let handle = StoreHandle::new(Mutex::new(vec![0u8; capacity]), creator, || {});
        HeapStore { handle, capacity }
    }

    /// Takes ownership of an existing buffer rather than allocating a
    /// fresh zeroed one.
    pub fn from_vec(buf: Vec<u8>) -> Self {
        let capacity = buf.len();
        let creator = ReferenceOwner::new("heap");
        let handle = StoreHandle::new(Mutex::new(buf), creator, || {});
        HeapStore { handle, capacity }
    }

    pub fn reserve_handle(&self, owner: ReferenceOwner) -> Result<Self> {
        Ok(HeapStore {
            handle: self.handle.reserve_handle(owner)?,
            capacity: self.capacity,
        })
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
        heap::write_u8(&mut self.handle.data().lock().unwrap(), offset, value)
    }
    pub fn write_short(&self, offset: usize, value: i16) -> Result<()> {
        heap::write_i16(&mut self.handle.data().lock().unwrap(), offset, value)
    }
    pub fn write_int(&self, offset: usize, value: i32) -> Result<()> {
        heap::write_i32(&mut self.handle.data().lock().unwrap(), offset, value)
    }
    pub fn write_long(&self, offset: usize, value: i64) -> Result<()> {
        heap::write_i64(&mut self.handle.data().lock().unwrap(), offset, value)
    }
    pub fn write_float(&self, offset: usize, value: f32) -> Result<()> {
        heap::write_f32(&mut self.handle.data().lock().unwrap(), offset, value)
    }
    pub fn write_double(&self, offset: usize, value: f64) -> Result<()> {
        heap::write_f64(&mut self.handle.data().lock().unwrap(), offset, value)
    }

    pub fn read(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        heap::copy(&self.handle.data().lock().unwrap(), offset, dst, 0, dst.len())
    }
    pub fn write(&self, offset: usize, src: &[u8], src_off: usize, len: usize) -> Result<()> {
        heap::copy(src, src_off, &mut self.handle.data().lock().unwrap(), offset, len)
    }

    pub fn copy_to(&self, dst: &dyn BytesStore) -> Result<()> {
        let data = self.handle.data().lock().unwrap();
        dst.write(dst.start(), &data, 0, data.len())
    }
    pub fn move_bytes(&self, from: usize, to: usize, len: usize) -> Result<()> {
        heap::move_within(&mut self.handle.data().lock().unwrap(), from, to, len)
    }

    pub fn compare_and_swap_int(&self, offset: usize, expected: i32, new: i32) -> Result<bool> {
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
            "heap store has no stable native address",
        ))
    }
    pub fn address_for_write(&self, offset: usize) -> Result<*mut u8> {
        let _ = offset;
        Err(BytesError::InvalidArgument(
            "heap store has no stable native address",
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
    fn round_trips_and_rejects_address_for() {
        let store = HeapStore::new(32);
        store.write_int(4, -7).unwrap();
        assert_eq!(store.read_int(4).unwrap(), -7);
        assert!(store.address_for_read(0).is_err());
        assert!(store.address_for_write(0).is_err());
    }

    #[test]
    fn compare_and_swap_matches_native_semantics() {
        let store = HeapStore::new(16);
        store.write_long(0, 10).unwrap();
        assert!(store.compare_and_swap_long(0, 10, 20).unwrap());
        assert!(!store.compare_and_swap_long(0, 10, 30).unwrap());
        assert_eq!(store.read_long(0).unwrap(), 20);
    }
}
