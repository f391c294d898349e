use crate::buffer::{contains, find, find_range, Accumulator};
use crate::error::Error;

#[test]
fn test_append_correct_result() {
    let mut buffer: Accumulator<32> = Accumulator::new();

    buffer.append(b"correct ").unwrap();
    buffer.append(b"test ").unwrap();
    buffer.append(b"result").unwrap();

    assert_eq!(b"correct test result", buffer.as_slice());
    assert_eq!(19, buffer.len());
    assert_eq!(13, buffer.space());
}

#[test]
fn test_append_not_enough_space() {
    let mut buffer: Accumulator<16> = Accumulator::new();
    buffer.append(b"0123456789").unwrap();

    assert_eq!(Error::BufferOverflow, buffer.append(b"0123456").unwrap_err());

    // Buffer is left untouched
    assert_eq!(b"0123456789", buffer.as_slice());

    buffer.append(b"012345").unwrap();
    assert!(buffer.is_full());
}

#[test]
fn test_append_partial() {
    let mut buffer: Accumulator<16> = Accumulator::new();
    buffer.append(b"0123456789").unwrap();

    assert_eq!(4, buffer.append_partial(b"abcdefghij"));
    assert_eq!(b"0123456789abcdef", buffer.as_slice());
    assert!(buffer.is_full());

    assert_eq!(3, buffer.append_partial(b"xyz"));
    assert_eq!(16, buffer.len());
}

#[test]
fn test_append_partial_fits() {
    let mut buffer: Accumulator<16> = Accumulator::new();

    assert_eq!(0, buffer.append_partial(b"OK\r\n"));
    assert_eq!(b"OK\r\n", buffer.as_slice());
}

#[test]
fn test_append_partial_full_buffer() {
    let mut buffer: Accumulator<4> = Accumulator::new();
    buffer.append(b"0123").unwrap();

    assert_eq!(0, buffer.append_partial(b""));
    assert_eq!(2, buffer.append_partial(b"45"));
    assert_eq!(b"0123", buffer.as_slice());

    buffer.consume(1);
    assert_eq!(1, buffer.append_partial(b"45"));
    assert_eq!(b"1234", buffer.as_slice());
}

#[test]
fn test_consume() {
    let mut buffer: Accumulator<16> = Accumulator::new();
    buffer.append(b"first second").unwrap();

    buffer.consume(6);
    assert_eq!(b"second", buffer.as_slice());
    assert_eq!(10, buffer.space());

    buffer.consume(100);
    assert!(buffer.is_empty());
}

#[test]
fn test_clear() {
    let mut buffer: Accumulator<8> = Accumulator::new();
    buffer.append(b"data").unwrap();
    buffer.clear();

    assert!(buffer.is_empty());
    assert_eq!(8, buffer.capacity());
    assert_eq!(8, buffer.space());
}

#[test]
fn test_find() {
    assert_eq!(Some(4), find(b"\r\n\r\nOK\r\n", b"OK"));
    assert_eq!(Some(0), find(b"OK", b"OK"));
    assert_eq!(None, find(b"O", b"OK"));
    assert_eq!(None, find(b"", b"OK"));
    assert_eq!(Some(0), find(b"abc", b""));

    // First occurrence
    assert_eq!(Some(2), find(b"..SEND OK..SEND OK", b"SEND OK"));
}

#[test]
fn test_find_range() {
    assert_eq!(Some(4..6), find_range(b"\r\n\r\nOK\r\n", b"OK"));
    assert_eq!(Some(1..3), find_range(&[0x00, 0xD0, 0x00], &[0xD0, 0x00]));
    assert_eq!(None, find_range(b"ERROR", b"OK"));
}

#[test]
fn test_contains() {
    assert!(contains(b"\r\nWIFI GOT IP\r\n", b"WIFI GOT IP"));
    assert!(!contains(b"\r\nWIFI CONNECTED\r\n", b"WIFI GOT IP"));
}
