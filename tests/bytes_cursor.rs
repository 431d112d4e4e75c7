//! End-to-end exercises of the `Bytes` dual-cursor over every backing.

use bytes_core::Bytes;

#[test]
fn heap_cursor_round_trips_mixed_primitives() {
    let mut b = Bytes::heap(64);
    b.write_byte(1).unwrap();
    b.write_short(-2).unwrap();
    b.write_int(3).unwrap();
    b.write_long(-4).unwrap();
    b.write_float(5.5).unwrap();
    b.write_double(-6.25).unwrap();

    assert_eq!(b.read_byte().unwrap(), 1);
    assert_eq!(b.read_short().unwrap(), -2);
    assert_eq!(b.read_int().unwrap(), 3);
    assert_eq!(b.read_long().unwrap(), -4);
    assert_eq!(b.read_float().unwrap(), 5.5);
    assert_eq!(b.read_double().unwrap(), -6.25);
    assert!(b.is_empty());
}

#[test]
fn native_fixed_cursor_rejects_overflow_but_elastic_grows() {
    let mut fixed = Bytes::native_fixed(8).unwrap();
    fixed.write_long(1).unwrap();
    assert!(fixed.write_byte(2).is_err());

    let mut elastic = Bytes::native_elastic(8).unwrap().into_elastic();
    for i in 0..500i64 {
        elastic.write_long(i).unwrap();
    }
    for i in 0..500i64 {
        assert_eq!(elastic.read_long().unwrap(), i);
    }
}

#[test]
fn wrapped_buffer_cursor_shares_the_caller_vec() {
    let mut b = Bytes::wrapped(vec![0u8; 16]);
    b.write_int(0x1122_3344).unwrap();
    assert_eq!(b.read_int().unwrap(), 0x1122_3344);

    let mut read_only = Bytes::wrapped_read_only(vec![9; 4]);
    assert!(read_only.write_byte(1).is_err());
    assert_eq!(read_only.read_byte().unwrap(), 9);
}

#[test]
fn pointer_cursor_views_caller_owned_memory_without_freeing_it() {
    let mut backing = [0u8; 16];
    {
        let mut b = unsafe { Bytes::pointer(backing.as_mut_ptr(), backing.len()) };
        b.write_long(77).unwrap();
        assert_eq!(b.read_long().unwrap(), 77);
    }
    assert_eq!(i64::from_le_bytes(backing[0..8].try_into().unwrap()), 77);
}

#[test]
fn mapped_cursor_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cursor.bin");
    let config = bytes_core::ChunkConfig::default();

    {
        let mut b = Bytes::mapped(&path, config, bytes_core::SyncMode::Sync).unwrap();
        b.write_int_at(0, 123).unwrap();
    }
    {
        let b = Bytes::mapped(&path, config, bytes_core::SyncMode::None).unwrap();
        assert_eq!(b.read_int_at(0).unwrap(), 123);
    }
}

#[test]
fn lenient_cursor_returns_sentinel_values_past_the_limit() {
    let mut b = Bytes::heap(16).into_lenient();
    b.write_int(42).unwrap();
    assert_eq!(b.read_int().unwrap(), 42);
    assert_eq!(b.read_int().unwrap(), 0);
    assert_eq!(b.read_byte().unwrap(), 0);
}

#[test]
fn clear_and_pad_then_prewrite_produces_a_forward_readable_header() {
    let mut b = Bytes::heap(32);
    b.clear_and_pad(4).unwrap();
    b.write_bytes(b"payload").unwrap();
    b.prewrite_int(7).unwrap();

    assert_eq!(b.read_int().unwrap(), 7);
    let mut payload = [0u8; 7];
    b.read_bytes(&mut payload).unwrap();
    assert_eq!(&payload, b"payload");
}
