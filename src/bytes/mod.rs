//! `Bytes` — the dual-cursor view over a single [`crate::store::BytesStore`].
//!
//! Four positions track progress through the backing store:
//! `read_position <= write_position <= read_limit`, with `write_limit`
//! bounding how far a write may advance before either growing (elastic)
//! or failing (fixed). A cursor is not safe to share across threads
//! without external synchronization — the positions are plain fields, not
//! atomics, exactly like the store's own absolute-offset API is safe to
//! call concurrently but a single cursor's bookkeeping is not.

use std::path::Path;

use crate::config::ChunkConfig;
use crate::error::{BytesError, Result};
use crate::mapped::{ChunkedFileStore, SyncMode};
use crate::refcount::ReferenceOwner;
use crate::store::{
    BytesStore, HeapStore, NativeElasticStore, NativeFixedStore, PointerStore, Store, WrappedStore,
};

macro_rules! primitive_io {
    ($read:ident, $write:ident, $store_read:ident, $store_write:ident, $ty:ty, $width:expr, $sentinel:expr) => {
        pub fn $read(&mut self) -> Result<$ty> {
            if !self.check_read($width)? {
                return Ok($sentinel);
            }
            let v = self.store.$store_read(self.start + self.read_position)?;
            self.read_position += $width;
            Ok(v)
        }

        pub fn $write(&mut self, value: $ty) -> Result<()> {
            self.check_write($width)?;
            self.store.$store_write(self.start + self.write_position, value)?;
            self.advance_write($width);
            Ok(())
        }
    };
}

/// The read/write cursor over a [`Store`].
pub struct Bytes {
    store: Store,
    start: usize,
    read_position: usize,
    write_position: usize,
    read_limit: usize,
    write_limit: usize,
    elastic: bool,
    lenient: bool,
    unchecked: bool,
    prewrite_budget: usize,
}

impl Bytes {
    /// Wraps an already-constructed store. `start` is almost always 0;
    /// non-zero only when the store is shared and this cursor is meant to
    /// view a sub-range of it.
    pub fn from_store(store: Store) -> Self {
        let elastic = store.is_elastic();
        let write_limit = store.capacity();
        Bytes {
            store,
            start: 0,
            read_position: 0,
            write_position: 0,
            read_limit: 0,
            write_limit,
            elastic,
            lenient: false,
            unchecked: false,
            prewrite_budget: 0,
        }
    }

    pub fn native_fixed(capacity: usize) -> Result<Self> {
        Ok(Self::from_store(Store::NativeFixed(NativeFixedStore::new(capacity)?)))
    }

    pub fn native_elastic(initial_capacity: usize) -> Result<Self> {
        Ok(Self::from_store(Store::NativeElastic(NativeElasticStore::new(
            initial_capacity,
        )?)))
    }

    pub fn heap(capacity: usize) -> Self {
        Self::from_store(Store::Heap(HeapStore::new(capacity)))
    }

    /// Wraps a caller-supplied buffer for read/write access.
    pub fn wrapped(buf: Vec<u8>) -> Self {
        Self::from_store(Store::Wrapped(WrappedStore::wrap(buf)))
    }

    /// Wraps a caller-supplied buffer for read-only access; any write
    /// through the resulting cursor fails.
    pub fn wrapped_read_only(buf: Vec<u8>) -> Self {
        Self::from_store(Store::Wrapped(WrappedStore::wrap_read_only(buf)))
    }

    /// Views `len` bytes starting at a caller-supplied native address.
    ///
    /// # Safety
    /// See [`PointerStore::new`]: `addr..addr+len` must stay valid for the
    /// lifetime of this cursor and any handle reserved from it.
    pub unsafe fn pointer(addr: *mut u8, len: usize) -> Self {
        Self::from_store(Store::Pointer(PointerStore::new(addr, len)))
    }

    /// Opens a chunked memory-mapped file store at `path`.
    pub fn mapped(path: impl AsRef<Path>, config: ChunkConfig, sync_mode: SyncMode) -> Result<Self> {
        Ok(Self::from_store(Store::Mapped(ChunkedFileStore::open(
            path, config, sync_mode,
        )?)))
    }

    /// Marks this cursor unchecked: bounds checks on the hot primitive
    /// read/write paths are skipped. Only safe when the caller has
    /// already established the access is in range.
    pub fn into_unchecked(mut self) -> Self {
        self.unchecked = true;
        self
    }

    /// Marks this cursor lenient: reads past `read_limit` return a zero
    /// sentinel instead of failing.
    pub fn into_lenient(mut self) -> Self {
        self.lenient = true;
        self
    }

    /// Marks this cursor elastic: writes past `write_limit` grow the
    /// backing store instead of failing. Only meaningful over a store
    /// that actually supports growth.
    pub fn into_elastic(mut self) -> Self {
        self.elastic = true;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
    pub fn read_position(&self) -> usize {
        self.read_position
    }
    pub fn write_position(&self) -> usize {
        self.write_position
    }
    pub fn read_limit(&self) -> usize {
        self.read_limit
    }
    pub fn write_limit(&self) -> usize {
        self.write_limit
    }
    pub fn remaining(&self) -> usize {
        self.write_position.saturating_sub(self.read_position)
    }
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Repositions the read cursor directly — used by the codecs in
    /// [`crate::codec`] to back up one byte of lookahead while parsing a
    /// number or string.
    pub fn set_read_position(&mut self, pos: usize) -> Result<()> {
        if pos > self.write_position {
            return Err(BytesError::ReadUnderflow {
                position: pos,
                requested: 0,
                limit: self.write_position,
            });
        }
        self.read_position = pos;
        Ok(())
    }

    /// Resets all four positions: `read_position = write_position =
    /// read_limit = start`, `write_limit = store.capacity()`.
    pub fn clear(&mut self) {
        self.read_position = self.start;
        self.write_position = self.start;
        self.read_limit = self.start;
        self.write_limit = self.store.capacity();
        self.prewrite_budget = 0;
    }

    /// Clears the cursor and reserves `padding` bytes of headroom before
    /// `write_position` for later [`Bytes::prewrite_byte`]-family calls.
    pub fn clear_and_pad(&mut self, padding: usize) -> Result<()> {
        self.clear();
        let end = self.start + padding;
        if end > self.write_limit {
            return Err(BytesError::WriteOverflow {
                position: self.write_position,
                requested: padding,
                limit: self.write_limit,
            });
        }
        self.write_position = end;
        self.read_position = end;
        self.read_limit = end;
        self.prewrite_budget = padding;
        Ok(())
    }

    /// Returns the current read position, first rounding it up to the
    /// next 4-byte boundary if `skip_padding` is set — the usual way a
    /// length-prefixed frame header is located after `clear_and_pad`.
    pub fn read_position_for_header(&mut self, skip_padding: bool) -> usize {
        if skip_padding {
            let aligned = (self.read_position + 3) & !3;
            self.read_position = aligned.min(self.write_position);
        }
        self.read_position
    }

    fn check_read(&self, len: usize) -> Result<bool> {
        if self.unchecked {
            return Ok(true);
        }
        let end = self
            .read_position
            .checked_add(len)
            .ok_or(BytesError::ReadUnderflow {
                position: self.read_position,
                requested: len,
                limit: self.read_limit,
            })?;
        if end > self.read_limit {
            if self.lenient {
                return Ok(false);
            }
            return Err(BytesError::ReadUnderflow {
                position: self.read_position,
                requested: len,
                limit: self.read_limit,
            });
        }
        Ok(true)
    }

    fn check_write(&mut self, len: usize) -> Result<()> {
        let end = self
            .write_position
            .checked_add(len)
            .ok_or(BytesError::WriteOverflow {
                position: self.write_position,
                requested: len,
                limit: self.write_limit,
            })?;
        if self.unchecked || end <= self.write_limit {
            return Ok(());
        }
        if self.elastic {
            self.store.ensure_capacity(end)?;
            self.write_limit = self.store.capacity();
            Ok(())
        } else {
            Err(BytesError::WriteOverflow {
                position: self.write_position,
                requested: len,
                limit: self.write_limit,
            })
        }
    }

    fn advance_write(&mut self, len: usize) {
        self.write_position += len;
        if self.write_position > self.read_limit {
            self.read_limit = self.write_position;
        }
    }

    primitive_io!(read_byte, write_byte, read_byte, write_byte, u8, 1, 0);
    primitive_io!(read_short, write_short, read_short, write_short, i16, 2, 0);
    primitive_io!(read_int, write_int, read_int, write_int, i32, 4, 0);
    primitive_io!(read_long, write_long, read_long, write_long, i64, 8, 0);
    primitive_io!(read_float, write_float, read_float, write_float, f32, 4, 0.0);
    primitive_io!(read_double, write_double, read_double, write_double, f64, 8, 0.0);

    /// Bulk read of `dst.len()` bytes from the current read position.
    pub fn read_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        if !self.check_read(dst.len())? {
            dst.fill(0);
            return Ok(());
        }
        self.store.read(self.start + self.read_position, dst)?;
        self.read_position += dst.len();
        Ok(())
    }

    /// Bulk write of `src` at the current write position.
    pub fn write_bytes(&mut self, src: &[u8]) -> Result<()> {
        self.check_write(src.len())?;
        self.store
            .write(self.start + self.write_position, src, 0, src.len())?;
        self.advance_write(src.len());
        Ok(())
    }

    // ── Absolute-offset writes: writePosition = max(writePosition, offset+width) ──

    pub fn write_byte_at(&mut self, offset: usize, value: u8) -> Result<()> {
        self.write_at(offset, 1, |s| s.write_byte(offset, value))
    }
    pub fn write_short_at(&mut self, offset: usize, value: i16) -> Result<()> {
        self.write_at(offset, 2, |s| s.write_short(offset, value))
    }
    pub fn write_int_at(&mut self, offset: usize, value: i32) -> Result<()> {
        self.write_at(offset, 4, |s| s.write_int(offset, value))
    }
    pub fn write_long_at(&mut self, offset: usize, value: i64) -> Result<()> {
        self.write_at(offset, 8, |s| s.write_long(offset, value))
    }

    fn write_at(&mut self, offset: usize, width: usize, f: impl FnOnce(&Store) -> Result<()>) -> Result<()> {
        let end = offset + width;
        if end > self.write_limit {
            if self.elastic {
                self.store.ensure_capacity(end)?;
                self.write_limit = self.store.capacity();
            } else {
                return Err(BytesError::WriteOverflow {
                    position: offset,
                    requested: width,
                    limit: self.write_limit,
                });
            }
        }
        f(&self.store)?;
        if end > self.write_position {
            self.write_position = end;
        }
        if end > self.read_limit {
            self.read_limit = end;
        }
        Ok(())
    }

    pub fn read_byte_at(&self, offset: usize) -> Result<u8> {
        self.store.read_byte(self.start + offset)
    }
    pub fn read_short_at(&self, offset: usize) -> Result<i16> {
        self.store.read_short(self.start + offset)
    }
    pub fn read_int_at(&self, offset: usize) -> Result<i32> {
        self.store.read_int(self.start + offset)
    }
    pub fn read_long_at(&self, offset: usize) -> Result<i64> {
        self.store.read_long(self.start + offset)
    }

    pub fn compare_and_swap_int(&self, offset: usize, expected: i32, new: i32) -> Result<bool> {
        self.store.compare_and_swap_int(self.start + offset, expected, new)
    }
    pub fn compare_and_swap_long(&self, offset: usize, expected: i64, new: i64) -> Result<bool> {
        self.store.compare_and_swap_long(self.start + offset, expected, new)
    }

    // ── prewrite: decrements read_position, little-endian, into padding
    // reserved by clear_and_pad ───────────────────────────────────────────

    fn take_prewrite_budget(&mut self, width: usize) -> Result<()> {
        if self.prewrite_budget < width {
            return Err(BytesError::WriteOverflow {
                position: self.read_position,
                requested: width,
                limit: self.prewrite_budget,
            });
        }
        self.prewrite_budget -= width;
        self.read_position -= width;
        Ok(())
    }

    pub fn prewrite_byte(&mut self, value: u8) -> Result<()> {
        self.take_prewrite_budget(1)?;
        self.store.write_byte(self.start + self.read_position, value)
    }
    pub fn prewrite_short(&mut self, value: i16) -> Result<()> {
        self.take_prewrite_budget(2)?;
        self.store.write_short(self.start + self.read_position, value)
    }
    pub fn prewrite_int(&mut self, value: i32) -> Result<()> {
        self.take_prewrite_budget(4)?;
        self.store.write_int(self.start + self.read_position, value)
    }
    pub fn prewrite_long(&mut self, value: i64) -> Result<()> {
        self.take_prewrite_budget(8)?;
        self.store.write_long(self.start + self.read_position, value)
    }
    /// Writes a length-prefixed 8-bit string backwards, ending with a
    /// one-byte length prefix immediately before the original
    /// `read_position` — so the whole thing reads forwards normally once
    /// written.
    pub fn prewrite_short_string(&mut self, s: &str) -> Result<()> {
        if s.len() > u8::MAX as usize {
            return Err(BytesError::InvalidArgument("prewrite_short_string: string too long for an 8-bit length prefix"));
        }
        for &b in s.as_bytes().iter().rev() {
            self.prewrite_byte(b)?;
        }
        self.prewrite_byte(s.len() as u8)
    }

    /// Copies `self`'s remaining readable bytes into `dst.real_capacity()`
    /// starting at `dst`'s own start — a whole-store copy, not limited to
    /// the cursor's current window.
    pub fn copy_to(&self, dst: &dyn BytesStore) -> Result<()> {
        self.store.copy_to(dst)
    }

    /// Copies the remaining readable bytes `[read_position, write_position)`
    /// into `dst`, advancing `dst`'s write position but not this cursor's
    /// read position.
    pub fn peek_into(&self, dst: &mut Bytes) -> Result<()> {
        let len = self.remaining();
        let mut buf = vec![0u8; len];
        self.store.read(self.start + self.read_position, &mut buf)?;
        dst.write_bytes(&buf)
    }

    /// `move(from, to, len)` within the backing store.
    pub fn move_bytes(&self, from: usize, to: usize, len: usize) -> Result<()> {
        self.store.move_bytes(from, to, len)
    }

    /// Finds `needle` within `[read_position, write_position)`. Returns
    /// the absolute index (relative to `start`), not a cursor-relative one.
    pub fn index_of(&self, needle: &[u8]) -> Option<usize> {
        if needle.is_empty() {
            return Some(self.read_position);
        }
        let hay_len = self.remaining();
        if needle.len() > hay_len {
            return None;
        }
        'outer: for i in 0..=(hay_len - needle.len()) {
            for (j, &want) in needle.iter().enumerate() {
                match self.store.read_byte(self.start + self.read_position + i + j) {
                    Ok(b) if b == want => continue,
                    _ => continue 'outer,
                }
            }
            return Some(self.read_position + i);
        }
        None
    }

    /// Byte-for-byte comparison of the two cursors' remaining readable
    /// regions.
    pub fn content_equals(&self, other: &Bytes) -> bool {
        let len = self.remaining();
        if len != other.remaining() {
            return false;
        }
        for i in 0..len {
            let a = self.store.read_byte(self.start + self.read_position + i);
            let b = other.store.read_byte(other.start + other.read_position + i);
            match (a, b) {
                (Ok(a), Ok(b)) if a == b => continue,
                _ => return false,
            }
        }
        true
    }

    /// Mints a second cursor sharing this one's backing store, reserved
    /// under `owner`. The new cursor starts with its own independent
    /// positions (`clear`ed).
    pub fn reserve_handle(&self, owner: ReferenceOwner) -> Result<Bytes> {
        let store = self.store.reserve_handle(owner)?;
        let mut bytes = Bytes::from_store(store);
        bytes.elastic = self.elastic;
        bytes.lenient = self.lenient;
        bytes.unchecked = self.unchecked;
        Ok(bytes)
    }

    /// Hex rendering of the remaining readable bytes, for buffers small
    /// enough that the renderer doesn't need to be a real hex-dump tool
    /// (that's an external collaborator's job, not this crate's). Longer
    /// buffers are truncated with a `"... (N bytes)"` suffix.
    pub fn to_hex_string(&self) -> String {
        const PREVIEW_LIMIT: usize = 1024;
        let len = self.remaining().min(PREVIEW_LIMIT);
        let mut out = String::with_capacity(len * 2);
        for i in 0..len {
            if let Ok(b) = self.store.read_byte(self.start + self.read_position + i) {
                out.push_str(&format!("{b:02x}"));
            }
        }
        if self.remaining() > PREVIEW_LIMIT {
            out.push_str(&format!("... ({} bytes)", self.remaining()));
        }
        out
    }
}

impl std::fmt::Debug for Bytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bytes")
            .field("read_position", &self.read_position)
            .field("write_position", &self.write_position)
            .field("read_limit", &self.read_limit)
            .field("write_limit", &self.write_limit)
            .field("hex", &self.to_hex_string())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips_in_order() {
        let mut b = Bytes::heap(64);
        b.write_int(7).unwrap();
        b.write_long(-9).unwrap();
        assert_eq!(b.read_int().unwrap(), 7);
        assert_eq!(b.read_long().unwrap(), -9);
    }

    #[test]
    fn fixed_cursor_rejects_write_past_limit() {
        let mut b = Bytes::native_fixed(4).unwrap();
        assert!(b.write_long(1).is_err());
    }

    #[test]
    fn elastic_cursor_grows_past_initial_capacity() {
        let mut b = Bytes::native_elastic(4).unwrap().into_elastic();
        for i in 0..100 {
            b.write_long(i).unwrap();
        }
        for i in 0..100 {
            assert_eq!(b.read_long().unwrap(), i);
        }
    }

    #[test]
    fn lenient_read_past_limit_returns_sentinel() {
        let mut b = Bytes::heap(16).into_lenient();
        b.write_byte(9).unwrap();
        assert_eq!(b.read_byte().unwrap(), 9);
        assert_eq!(b.read_byte().unwrap(), 0);
    }

    #[test]
    fn clear_resets_all_positions() {
        let mut b = Bytes::heap(16);
        b.write_int(1).unwrap();
        b.read_int().unwrap();
        b.clear();
        assert_eq!(b.read_position(), 0);
        assert_eq!(b.write_position(), 0);
        assert_eq!(b.read_limit(), 0);
    }

    #[test]
    fn absolute_write_extends_write_position() {
        let mut b = Bytes::heap(32);
        b.write_int_at(16, 42).unwrap();
        assert_eq!(b.write_position(), 20);
        assert_eq!(b.read_int_at(16).unwrap(), 42);
    }

    #[test]
    fn prewrite_requires_padding_reserved_up_front() {
        let mut b = Bytes::heap(32);
        b.clear_and_pad(8).unwrap();
        b.write_int(0xAABB).unwrap();
        b.prewrite_int(7).unwrap();
        assert_eq!(b.read_int().unwrap(), 7);
        assert_eq!(b.read_int().unwrap(), 0xAABB);
    }

    #[test]
    fn prewrite_beyond_budget_fails() {
        let mut b = Bytes::heap(32);
        b.clear_and_pad(2).unwrap();
        assert!(b.prewrite_int(1).is_err());
    }

    #[test]
    fn index_of_finds_and_misses() {
        let mut b = Bytes::heap(16);
        b.write_bytes(b"hello world").unwrap();
        assert_eq!(b.index_of(b"world"), Some(6));
        assert_eq!(b.index_of(b"xyz"), None);
        assert_eq!(b.index_of(b""), Some(0));
    }

    #[test]
    fn content_equals_compares_remaining_bytes_only() {
        let mut a = Bytes::heap(16);
        a.write_bytes(b"abcdef").unwrap();
        let mut b = Bytes::heap(16);
        b.write_bytes(b"xxabcdef").unwrap();
        b.read_bytes(&mut [0u8; 2]).unwrap();
        assert!(a.content_equals(&b));
    }

    #[test]
    fn reserve_handle_shares_the_same_backing_store() {
        let mut a = Bytes::native_fixed(16).unwrap();
        a.write_long(123).unwrap();
        let owner = ReferenceOwner::new("second-cursor");
        let b = a.reserve_handle(owner).unwrap();
        assert_eq!(b.read_long_at(0).unwrap(), 123);
    }

    #[test]
    fn wrapped_read_only_rejects_writes() {
        let mut b = Bytes::wrapped_read_only(vec![1, 2, 3, 4]);
        assert!(b.write_byte(9).is_err());
    }

    #[test]
    fn wrapped_round_trips() {
        let mut b = Bytes::wrapped(vec![0; 8]);
        b.write_int(42).unwrap();
        assert_eq!(b.read_int().unwrap(), 42);
    }

    #[test]
    fn pointer_cursor_views_caller_buffer() {
        let mut buf = [0u8; 8];
        let mut b = unsafe { Bytes::pointer(buf.as_mut_ptr(), buf.len()) };
        b.write_int(99).unwrap();
        drop(b);
        assert_eq!(i32::from_le_bytes(buf[0..4].try_into().unwrap()), 99);
    }

    #[test]
    fn mapped_cursor_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let config = crate::config::ChunkConfig::default();
        let mut b = Bytes::mapped(&path, config, crate::mapped::SyncMode::None).unwrap();
        b.write_long(0xABCD).unwrap();
        assert_eq!(b.read_long().unwrap(), 0xABCD);
    }

    #[test]
    fn to_hex_string_renders_remaining_bytes() {
        let mut b = Bytes::heap(8);
        b.write_bytes(&[0xDE, 0xAD]).unwrap();
        assert_eq!(b.to_hex_string(), "dead");
    }
}
