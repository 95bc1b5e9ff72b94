// Path: crates/tree/src/path/tests.rs

use super::NibblePath;
use arbor_types::{TreeError, ZERO_HASH};

#[test]
fn push_packs_high_nibble_first() {
    let mut path = NibblePath::new();
    path.push(0xA).unwrap();
    assert_eq!(path.bytes(), &[0xA0]);
    path.push(0xB).unwrap();
    assert_eq!(path.bytes(), &[0xAB]);
    path.push(0x1).unwrap();
    assert_eq!(path.bytes(), &[0xAB, 0x10]);
    assert_eq!(path.len(), 3);
}

#[test]
fn push_rejects_wide_values() {
    let mut path = NibblePath::new();
    assert!(matches!(path.push(16), Err(TreeError::InvalidInput(_))));
    assert!(path.is_empty());
}

#[test]
fn get_reads_back_in_order() {
    let mut path = NibblePath::new();
    for nib in [0x1, 0xF, 0x0, 0x7] {
        path.push(nib).unwrap();
    }
    assert_eq!(path.get(0).unwrap(), 0x1);
    assert_eq!(path.get(1).unwrap(), 0xF);
    assert_eq!(path.get(2).unwrap(), 0x0);
    assert_eq!(path.get(3).unwrap(), 0x7);
    assert!(matches!(path.get(4), Err(TreeError::InvalidInput(_))));
}

#[test]
fn pop_even_to_odd_rezeroes_padding() {
    // Length 2 -> 1: the popped digit lived in the low bits and must not
    // linger in the canonical buffer.
    let mut path = NibblePath::new();
    path.push(0xA).unwrap();
    path.push(0xB).unwrap();
    path.pop();
    assert_eq!(path.len(), 1);
    assert_eq!(path.bytes(), &[0xA0]);

    // A fresh push after the pop must not be corrupted by stale bits.
    path.push(0xC).unwrap();
    assert_eq!(path.bytes(), &[0xAC]);
}

#[test]
fn pop_odd_to_even_drops_the_byte() {
    let mut path = NibblePath::new();
    path.push(0xA).unwrap();
    path.push(0xB).unwrap();
    path.push(0xC).unwrap();
    assert_eq!(path.bytes(), &[0xAB, 0xC0]);
    path.pop();
    assert_eq!(path.len(), 2);
    assert_eq!(path.bytes(), &[0xAB]);
}

#[test]
fn pop_on_empty_is_noop() {
    let mut path = NibblePath::new();
    path.pop();
    assert!(path.is_empty());
    assert!(path.bytes().is_empty());
}

#[test]
fn push_pop_round_trips_to_identical_bytes() {
    let mut path = NibblePath::new();
    path.push(0x3).unwrap();
    let snapshot = (path.bytes().to_vec(), path.len());

    path.push(0x9).unwrap();
    path.push(0x1).unwrap();
    path.pop();
    path.pop();
    assert_eq!((path.bytes().to_vec(), path.len()), snapshot);
}

#[test]
fn from_bytes_truncates_overlong_and_zeroes_padding() {
    let path = NibblePath::from_bytes(&[0xAB, 0xCF, 0xFF, 0xFF], 3).unwrap();
    assert_eq!(path.len(), 3);
    // Third nibble is 0xC; the 0xF padding must be zeroed.
    assert_eq!(path.bytes(), &[0xAB, 0xC0]);
    assert_eq!(path.get(2).unwrap(), 0xC);
}

#[test]
fn from_bytes_rejects_short_buffers() {
    assert!(matches!(
        NibblePath::from_bytes(&[0xAB], 3),
        Err(TreeError::InvalidInput(_))
    ));
}

#[test]
fn from_key_covers_the_full_width() {
    let mut key = ZERO_HASH;
    key[0] = 0x12;
    key[63] = 0x34;
    let path = NibblePath::from_key(&key);
    assert_eq!(path.len(), 128);
    assert_eq!(path.get(0).unwrap(), 0x1);
    assert_eq!(path.get(1).unwrap(), 0x2);
    assert_eq!(path.get(126).unwrap(), 0x3);
    assert_eq!(path.get(127).unwrap(), 0x4);
}

#[test]
fn ordering_is_length_first_then_lexicographic() {
    let mut short = NibblePath::new();
    short.push(0xF).unwrap();

    let mut long = NibblePath::new();
    long.push(0x0).unwrap();
    long.push(0x0).unwrap();

    assert!(short < long);

    let mut a = NibblePath::new();
    a.push(0x1).unwrap();
    a.push(0x2).unwrap();
    let mut b = NibblePath::new();
    b.push(0x1).unwrap();
    b.push(0x3).unwrap();
    assert!(a < b);
    assert_eq!(a.cmp(&a), std::cmp::Ordering::Equal);
}

#[test]
fn to_hex_renders_each_nibble() {
    let mut path = NibblePath::new();
    path.push(0xA).unwrap();
    path.push(0x0).unwrap();
    path.push(0xF).unwrap();
    assert_eq!(path.to_hex(), "a0f");
}
