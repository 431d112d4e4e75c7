//! End-to-end round trips for the stop-bit varint and string codecs.

use bytes_core::{read_8bit, read_decimal, read_signed, read_unsigned, read_utf8};
use bytes_core::{write_8bit, write_decimal, write_signed, write_unsigned, write_utf8};
use bytes_core::Bytes;

#[test]
fn unsigned_stop_bit_round_trips_across_the_byte_width_boundaries() {
    let mut b = Bytes::heap(256);
    let values: [u64; 6] = [0, 1, 127, 128, u32::MAX as u64, u64::MAX];
    for &v in &values {
        write_unsigned(&mut b, v).unwrap();
    }
    for &v in &values {
        assert_eq!(read_unsigned(&mut b).unwrap(), v);
    }
}

#[test]
fn signed_stop_bit_round_trips_negative_and_positive() {
    let mut b = Bytes::heap(256);
    let values: [i64; 5] = [0, -1, 1, i64::MIN, i64::MAX];
    for &v in &values {
        write_signed(&mut b, v).unwrap();
    }
    for &v in &values {
        assert_eq!(read_signed(&mut b).unwrap(), v);
    }
}

#[test]
fn stop_bit_decimal_round_trips_mantissa_and_scale() {
    let mut b = Bytes::heap(64);
    write_decimal(&mut b, 12345, 2).unwrap();
    write_decimal(&mut b, -7, 0).unwrap();
    assert_eq!(read_decimal(&mut b).unwrap(), (12345, 2));
    assert_eq!(read_decimal(&mut b).unwrap(), (-7, 0));
}

#[test]
fn length_prefixed_strings_round_trip_present_absent_and_empty() {
    let mut b = Bytes::heap(256);
    write_8bit(&mut b, Some("latin1 ok")).unwrap();
    write_8bit(&mut b, None).unwrap();
    write_utf8(&mut b, Some("héllo 🎉")).unwrap();
    write_utf8(&mut b, None).unwrap();

    assert_eq!(read_8bit(&mut b, false).unwrap(), Some("latin1 ok".to_string()));
    assert_eq!(read_8bit(&mut b, false).unwrap(), None);
    assert_eq!(read_utf8(&mut b, false).unwrap(), Some("héllo 🎉".to_string()));
    assert_eq!(read_utf8(&mut b, false).unwrap(), None);
}

#[test]
fn lenient_eight_bit_read_treats_absent_as_the_empty_string() {
    let mut b = Bytes::heap(32);
    write_8bit(&mut b, None).unwrap();
    assert_eq!(read_8bit(&mut b, true).unwrap(), Some(String::new()));
}

proptest::proptest! {
    #[test]
    fn unsigned_stop_bit_round_trips_over_random_values(v: u64) {
        let mut b = Bytes::heap(16);
        write_unsigned(&mut b, v).unwrap();
        proptest::prop_assert_eq!(read_unsigned(&mut b).unwrap(), v);
    }

    #[test]
    fn signed_stop_bit_round_trips_over_random_values(v: i64) {
        let mut b = Bytes::heap(16);
        write_signed(&mut b, v).unwrap();
        proptest::prop_assert_eq!(read_signed(&mut b).unwrap(), v);
    }

    #[test]
    fn utf8_round_trips_over_random_strings(s in "\\PC*") {
        let mut b = Bytes::heap(s.len() * 4 + 16);
        write_utf8(&mut b, Some(&s)).unwrap();
        proptest::prop_assert_eq!(read_utf8(&mut b, false).unwrap(), Some(s));
    }
}
