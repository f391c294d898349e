//! # `+IPD` frame reassembly
//!
//! In single connection mode, ESP-AT forwards received TCP data as `+IPD,<len>:<payload>`. The
//! serial stream may split a frame at any byte, so incoming data is accumulated until the declared
//! payload length is complete.
//!
//! ````
//! # use esp_at_mqtt::ipd::IpdReassembler;
//! let mut rx: IpdReassembler<64> = IpdReassembler::new();
//!
//! rx.push(b"\r\n+IPD,5:AB").unwrap();
//! assert_eq!(None, rx.poll_once());
//!
//! rx.push(b"CDE").unwrap();
//! assert_eq!(Some(&b"ABCDE"[..]), rx.poll_once());
//! assert_eq!(None, rx.poll_once());
//! assert!(rx.is_empty());
//! ````
use crate::buffer::{find, find_range, Accumulator};
use crate::error::Error;
use core::ops::Range;

/// Start of each frame header
const MARKER: &[u8] = b"+IPD,";

/// Max. number of decimal digits of the declared length
const MAX_LENGTH_DIGITS: usize = 5;

/// Bytes kept by [IpdReassembler::discard_noise] if no marker is buffered. Covers a partially
/// received marker or status line.
const NOISE_TAIL: usize = 7;

/// Parsed `+IPD,<len>:` header
enum Header {
    /// Length field not terminated yet
    Incomplete,

    /// Invalid length field
    Malformed,

    /// Payload offset and declared length
    Complete { start: usize, length: usize },
}

/// Result of scanning the buffer for a frame
enum Scan {
    /// No frame header present
    NoMarker,

    /// Header or payload not received completely yet
    Incomplete,

    /// Header at the given offset has an invalid length field
    Malformed(usize),

    /// Payload range of a complete frame
    Complete { start: usize, end: usize },
}

/// Extracts `+IPD` frames of the receive stream
///
/// N: Capacity of the accumulator. Frames declaring a larger length are dropped as malformed.
#[derive(Debug, Default)]
pub struct IpdReassembler<const N: usize> {
    buffer: Accumulator<N>,

    /// Length of the frame returned by the last [Self::poll_once] call, removed on the next call
    pending: usize,

    /// Set when received data was lost, reset by [Self::take_overflow]
    overflowed: bool,
}

impl<const N: usize> IpdReassembler<N> {
    pub fn new() -> Self {
        Self {
            buffer: Accumulator::new(),
            pending: 0,
            overflowed: false,
        }
    }

    /// Appends received data. On overflow all buffered data is discarded and
    /// [Error::BufferOverflow] is returned. The overflow stays flagged until [Self::take_overflow].
    pub fn push(&mut self, data: &[u8]) -> Result<(), Error> {
        self.settle();

        if let Err(error) = self.buffer.append(data) {
            self.buffer.clear();
            self.overflowed = true;
            return Err(error);
        }

        Ok(())
    }

    /// Returns the payload of the next complete frame
    ///
    /// Returns None if no complete frame is buffered, or after dropping a malformed frame header.
    /// Must be called repeatedly until None is returned.
    pub fn poll_once(&mut self) -> Option<&[u8]> {
        self.settle();

        match Self::scan(self.buffer.as_slice()) {
            Scan::NoMarker | Scan::Incomplete => None,
            Scan::Malformed(marker) => {
                self.buffer.consume(marker + 1);
                None
            }
            Scan::Complete { start, end } => {
                self.pending = end;
                Some(&self.buffer.as_slice()[start..end])
            }
        }
    }

    /// Drops buffered data which can not become part of a frame
    ///
    /// That is everything preceding the first frame header, or everything except a short tail if
    /// there is no header. Returns true if `watch` occurred in the dropped data.
    pub fn discard_noise(&mut self, watch: &[u8]) -> bool {
        self.settle();

        let data = self.buffer.as_slice();
        let (noise, marker) = match find(data, MARKER) {
            Some(marker) => (&data[..marker], true),
            None => (data, false),
        };

        let seen = !watch.is_empty() && find_range(noise, watch).is_some();
        let count = match (marker, seen) {
            (true, _) => noise.len(),
            (false, true) => data.len(),
            (false, false) => data.len().saturating_sub(NOISE_TAIL),
        };

        self.buffer.consume(count);
        seen
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.buffer.len() - self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.pending = 0;
        self.overflowed = false;
    }

    /// Returns true if data was dropped by an overflow since the last call
    pub fn take_overflow(&mut self) -> bool {
        core::mem::take(&mut self.overflowed)
    }

    /// Removes the frame returned by the last poll
    fn settle(&mut self) {
        if self.pending > 0 {
            self.buffer.consume(self.pending);
            self.pending = 0;
        }
    }

    fn scan(data: &[u8]) -> Scan {
        let marker = match find(data, MARKER) {
            Some(marker) => marker,
            None => return Scan::NoMarker,
        };

        match header(data, marker) {
            Header::Incomplete => Scan::Incomplete,
            Header::Complete { length, .. } if length > N => Scan::Malformed(marker),
            Header::Malformed => Scan::Malformed(marker),
            Header::Complete { start, length } => {
                if data.len() - start < length {
                    return Scan::Incomplete;
                }

                Scan::Complete {
                    start,
                    end: start + length,
                }
            }
        }
    }
}

/// Parses the frame header starting at the marker offset
fn header(data: &[u8], marker: usize) -> Header {
    let length_start = marker + MARKER.len();
    let mut length: usize = 0;
    let mut digits = 0;

    for (index, byte) in data[length_start.min(data.len())..].iter().enumerate() {
        match byte {
            b'0'..=b'9' if digits < MAX_LENGTH_DIGITS => {
                length = length * 10 + (byte - b'0') as usize;
                digits += 1;
            }
            b':' if digits > 0 => {
                return Header::Complete {
                    start: length_start + index + 1,
                    length,
                }
            }
            _ => return Header::Malformed,
        }
    }

    Header::Incomplete
}

/// Returns the first occurrence of `needle` outside of `+IPD` payloads
///
/// Modem status lines and TCP payloads share one stream, so a payload may contain text like
/// `ERROR` or `>`. Complete frames are skipped. Searching stops at a frame whose payload is not
/// received completely yet. A malformed header is treated as plain text.
pub fn find_unframed(haystack: &[u8], needle: &[u8]) -> Option<Range<usize>> {
    // Start of the text not searched yet and start of the next marker lookup
    let mut text = 0;
    let mut cursor = 0;

    loop {
        let marker = match find(&haystack[cursor..], MARKER) {
            Some(marker) => cursor + marker,
            None => return find_range(&haystack[text..], needle).map(|range| shift(range, text)),
        };

        let parsed = header(haystack, marker);
        if let Header::Malformed = parsed {
            cursor = marker + 1;
            continue;
        }

        if let Some(range) = find_range(&haystack[text..marker], needle) {
            return Some(shift(range, text));
        }

        match parsed {
            Header::Complete { start, length } if haystack.len() - start >= length => {
                text = start + length;
                cursor = text;
            }
            _ => return None,
        }
    }
}

fn shift(range: Range<usize>, offset: usize) -> Range<usize> {
    (range.start + offset)..(range.end + offset)
}
