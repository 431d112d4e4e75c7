//! Raw loads/stores at native (off-heap) addresses.
//!
//! This is the `unsafe` boundary the rest of the crate is built around: every
//! function here takes a raw pointer and trusts the caller to have validated
//! bounds and lifetime; [`crate::store`] and [`crate::bytes`] are the safe
//! layers that perform those checks before calling down into here.
//!
//! Endianness: native reads/writes are little-endian by default; `*_be`
//! variants produce the byte-swapped form and must be bit-identical to
//! swapping the little-endian result.

use std::alloc::{alloc, alloc_zeroed, dealloc, realloc, Layout};
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU32, AtomicU64, Ordering};

use crate::error::{BytesError, Result};

/// Allocates `len` bytes of zeroed native memory, aligned to 8 bytes.
///
/// # Safety
/// The caller must eventually pass the returned pointer and `len` to
/// [`dealloc_native`] exactly once.
pub unsafe fn alloc_native(len: usize) -> Result<*mut u8> {
    if len == 0 {
        return Ok(std::ptr::NonNull::dangling().as_ptr());
    }
    let layout = layout_for(len);
    let ptr = alloc_zeroed(layout);
    if ptr.is_null() {
        return Err(BytesError::Io(std::io::Error::new(
            std::io::ErrorKind::OutOfMemory,
            "native allocation failed",
        )));
    }
    Ok(ptr)
}

/// Frees memory previously returned by [`alloc_native`] or [`realloc_native`].
///
/// # Safety
/// `ptr`/`len` must be the most recent pointer/length pair for this
/// allocation; calling this twice for the same allocation is a double free.
pub unsafe fn dealloc_native(ptr: *mut u8, len: usize) {
    if len == 0 {
        return;
    }
    dealloc(ptr, layout_for(len));
}

/// Grows (or shrinks) a native allocation in place when possible, or
/// relocates it; returns the new pointer. Newly grown bytes are
/// uninitialized — callers copy live data themselves.
///
/// # Safety
/// `ptr`/`old_len` must describe a live allocation from [`alloc_native`].
pub unsafe fn realloc_native(ptr: *mut u8, old_len: usize, new_len: usize) -> Result<*mut u8> {
    if old_len == 0 {
        return alloc_native(new_len);
    }
    let old_layout = layout_for(old_len);
    let new_ptr = realloc(ptr, old_layout, new_len.max(1));
    if new_ptr.is_null() {
        return Err(BytesError::Io(std::io::Error::new(
            std::io::ErrorKind::OutOfMemory,
            "native reallocation failed",
        )));
    }
    Ok(new_ptr)
}

fn layout_for(len: usize) -> Layout {
    Layout::from_size_align(len.max(1), 8).expect("native allocation layout")
}

/// `true` if `address` is naturally aligned for a `width`-byte access.
#[inline]
pub fn is_aligned(address: usize, width: usize) -> bool {
    address % width == 0
}

fn check_aligned(address: *const u8, width: usize) -> Result<()> {
    let addr = address as usize;
    if is_aligned(addr, width) {
        Ok(())
    } else {
        Err(BytesError::Unaligned {
            address: addr,
            width,
        })
    }
}

// ── Plain little-endian loads/stores ────────────────────────────────────────

macro_rules! native_accessors {
    ($ty:ty, $read:ident, $write:ident, $read_be:ident, $write_be:ident) => {
        /// # Safety
        /// `addr` must point to at least `size_of::<$ty>()` valid, readable bytes.
        #[inline]
        pub unsafe fn $read(addr: *const u8) -> $ty {
            let mut buf = [0u8; core::mem::size_of::<$ty>()];
            std::ptr::copy_nonoverlapping(addr, buf.as_mut_ptr(), buf.len());
            <$ty>::from_le_bytes(buf)
        }

        /// # Safety
        /// `addr` must point to at least `size_of::<$ty>()` valid, writable bytes.
        #[inline]
        pub unsafe fn $write(addr: *mut u8, value: $ty) {
            let buf = value.to_le_bytes();
            std::ptr::copy_nonoverlapping(buf.as_ptr(), addr, buf.len());
        }

        /// Big-endian counterpart of [`$read`].
        ///
        /// # Safety
        /// Same as [`$read`].
        #[inline]
        pub unsafe fn $read_be(addr: *const u8) -> $ty {
            let mut buf = [0u8; core::mem::size_of::<$ty>()];
            std::ptr::copy_nonoverlapping(addr, buf.as_mut_ptr(), buf.len());
            <$ty>::from_be_bytes(buf)
        }

        /// Big-endian counterpart of [`$write`].
        ///
        /// # Safety
        /// Same as [`$write`].
        #[inline]
        pub unsafe fn $write_be(addr: *mut u8, value: $ty) {
            let buf = value.to_be_bytes();
            std::ptr::copy_nonoverlapping(buf.as_ptr(), addr, buf.len());
        }
    };
}

native_accessors!(u8, read_u8, write_u8, read_u8_be, write_u8_be);
native_accessors!(i8, read_i8, write_i8, read_i8_be, write_i8_be);
native_accessors!(u16, read_u16, write_u16, read_u16_be, write_u16_be);
native_accessors!(i16, read_i16, write_i16, read_i16_be, write_i16_be);
native_accessors!(u32, read_u32, write_u32, read_u32_be, write_u32_be);
native_accessors!(i32, read_i32, write_i32, read_i32_be, write_i32_be);
native_accessors!(u64, read_u64, write_u64, read_u64_be, write_u64_be);
native_accessors!(i64, read_i64, write_i64, read_i64_be, write_i64_be);

/// # Safety
/// `addr` must point to 4 valid, readable bytes.
#[inline]
pub unsafe fn read_f32(addr: *const u8) -> f32 {
    f32::from_bits(read_u32(addr))
}

/// # Safety
/// `addr` must point to 4 valid, writable bytes.
#[inline]
pub unsafe fn write_f32(addr: *mut u8, value: f32) {
    write_u32(addr, value.to_bits())
}

/// # Safety
/// `addr` must point to 8 valid, readable bytes.
#[inline]
pub unsafe fn read_f64(addr: *const u8) -> f64 {
    f64::from_bits(read_u64(addr))
}

/// # Safety
/// `addr` must point to 8 valid, writable bytes.
#[inline]
pub unsafe fn write_f64(addr: *mut u8, value: f64) {
    write_u64(addr, value.to_bits())
}

// ── Volatile / ordered / CAS ────────────────────────────────────────────────

/// Acquire load. Fails with [`BytesError::Unaligned`] if `addr` is not
/// naturally aligned for a 32-bit access.
///
/// # Safety
/// `addr` must point to a live, readable `u32`-sized region for the
/// duration of the call.
pub unsafe fn read_volatile_u32(addr: *const u8) -> Result<u32> {
    check_aligned(addr, 4)?;
    let atomic = &*(addr as *const AtomicU32);
    Ok(atomic.load(Ordering::Acquire))
}

/// # Safety
/// See [`read_volatile_u32`].
pub unsafe fn read_volatile_u64(addr: *const u8) -> Result<u64> {
    check_aligned(addr, 8)?;
    let atomic = &*(addr as *const AtomicU64);
    Ok(atomic.load(Ordering::Acquire))
}

/// Release store.
///
/// # Safety
/// See [`read_volatile_u32`].
pub unsafe fn write_volatile_u32(addr: *mut u8, value: u32) -> Result<()> {
    check_aligned(addr, 4)?;
    let atomic = &*(addr as *const AtomicU32);
    atomic.store(value, Ordering::Release);
    Ok(())
}

/// # Safety
/// See [`read_volatile_u32`].
pub unsafe fn write_volatile_u64(addr: *mut u8, value: u64) -> Result<()> {
    check_aligned(addr, 8)?;
    let atomic = &*(addr as *const AtomicU64);
    atomic.store(value, Ordering::Release);
    Ok(())
}

/// A release store, identical ordering to [`write_volatile_u32`] but kept
/// as a distinct name to mirror the two call sites that reach for it for
/// different reasons — one a plain volatile write, the other an
/// ordered publish of a value other threads will read.
///
/// # Safety
/// See [`read_volatile_u32`].
pub unsafe fn write_ordered_u32(addr: *mut u8, value: u32) -> Result<()> {
    write_volatile_u32(addr, value)
}

/// # Safety
/// See [`read_volatile_u32`].
pub unsafe fn write_ordered_u64(addr: *mut u8, value: u64) -> Result<()> {
    write_volatile_u64(addr, value)
}

/// Sequentially-consistent CAS on a naturally aligned 32-bit address.
///
/// # Safety
/// `addr` must point to a live, writable `i32`-sized region.
pub unsafe fn compare_and_swap_i32(addr: *mut u8, expected: i32, new: i32) -> Result<bool> {
    check_aligned(addr, 4)?;
    let atomic = &*(addr as *const AtomicI32);
    Ok(atomic
        .compare_exchange(expected, new, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok())
}

/// # Safety
/// See [`compare_and_swap_i32`].
pub unsafe fn compare_and_swap_i64(addr: *mut u8, expected: i64, new: i64) -> Result<bool> {
    check_aligned(addr, 8)?;
    let atomic = &*(addr as *const AtomicI64);
    Ok(atomic
        .compare_exchange(expected, new, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok())
}

/// `copy(src, srcOff, dst, dstOff, len)` — memmove semantics: correct for
/// overlapping ranges.
///
/// # Safety
/// `src`/`dst` must each point to at least `len` valid bytes (readable for
/// `src`, writable for `dst`).
pub unsafe fn copy(src: *const u8, dst: *mut u8, len: usize) {
    std::ptr::copy(src, dst, len);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_widths() {
        unsafe {
            let ptr = alloc_native(8).unwrap();
            write_u8(ptr, 0xAB);
            assert_eq!(read_u8(ptr), 0xAB);
            write_u16(ptr, 0x1234);
            assert_eq!(read_u16(ptr), 0x1234);
            write_u32(ptr, 0xDEAD_BEEF);
            assert_eq!(read_u32(ptr), 0xDEAD_BEEF);
            write_u64(ptr, 0x0123_4567_89AB_CDEF);
            assert_eq!(read_u64(ptr), 0x0123_4567_89AB_CDEF);
            write_f32(ptr, 3.5f32);
            assert_eq!(read_f32(ptr), 3.5f32);
            write_f64(ptr, 2.25f64);
            assert_eq!(read_f64(ptr), 2.25f64);
            dealloc_native(ptr, 8);
        }
    }

    #[test]
    fn big_endian_is_byte_swap_of_little_endian() {
        unsafe {
            let ptr = alloc_native(8).unwrap();
            write_u32(ptr, 0x0102_0304);
            let le = read_u32(ptr);
            write_u32_be(ptr, 0x0102_0304);
            let be = read_u32(ptr);
            assert_eq!(be, le.swap_bytes());
            dealloc_native(ptr, 8);
        }
    }

    #[test]
    fn volatile_round_trip() {
        unsafe {
            let ptr = alloc_native(8).unwrap();
            write_volatile_u32(ptr, 42).unwrap();
            assert_eq!(read_volatile_u32(ptr).unwrap(), 42);
            write_volatile_u64(ptr, 99).unwrap();
            assert_eq!(read_volatile_u64(ptr).unwrap(), 99);
            dealloc_native(ptr, 8);
        }
    }

    #[test]
    fn unaligned_volatile_fails() {
        unsafe {
            let ptr = alloc_native(16).unwrap();
            let unaligned = ptr.add(1);
            assert!(matches!(
                read_volatile_u32(unaligned),
                Err(BytesError::Unaligned { .. })
            ));
            dealloc_native(ptr, 16);
        }
    }

    #[test]
    fn cas_succeeds_on_match_and_fails_on_mismatch() {
        unsafe {
            let ptr = alloc_native(8).unwrap();
            write_i32(ptr, 10);
            assert!(compare_and_swap_i32(ptr, 10, 20).unwrap());
            assert_eq!(read_i32(ptr), 20);
            assert!(!compare_and_swap_i32(ptr, 10, 30).unwrap());
            assert_eq!(read_i32(ptr), 20);
            dealloc_native(ptr, 8);
        }
    }

    #[test]
    fn copy_handles_overlap_like_memmove() {
        unsafe {
            let ptr = alloc_native(16).unwrap();
            for i in 0..16u8 {
                write_u8(ptr.add(i as usize), i);
            }
            // Shift [0..12) forward into [4..16) — overlapping ranges.
            copy(ptr, ptr.add(4), 12);
            let mut out = [0u8; 16];
            for i in 0..16 {
                out[i] = read_u8(ptr.add(i));
            }
            assert_eq!(&out[4..16], &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
            dealloc_native(ptr, 16);
        }
    }

    #[test]
    fn realloc_preserves_prefix() {
        unsafe {
            let ptr = alloc_native(4).unwrap();
            write_u32(ptr, 0xAABBCCDD);
            let ptr = realloc_native(ptr, 4, 16).unwrap();
            assert_eq!(read_u32(ptr), 0xAABBCCDD);
            dealloc_native(ptr, 16);
        }
    }
}
