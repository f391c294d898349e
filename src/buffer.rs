use crate::error::Error;
use core::ops::Range;
use heapless::Vec;

/// Bounded append-only byte buffer
///
/// Used as response buffer of the AT engine and as receive accumulator of the `+IPD` reassembly.
/// Consumed bytes are removed from the front by shifting the remaining data.
#[derive(Clone, Debug, Default)]
pub struct Accumulator<const N: usize> {
    data: Vec<u8, N>,
}

impl<const N: usize> Accumulator<N> {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Appends the whole slice. Returns [Error::BufferOverflow] and leaves the buffer untouched
    /// if the data does not fit in the remaining space.
    pub fn append(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.len() > self.space() {
            return Err(Error::BufferOverflow);
        }

        self.data.extend_from_slice(data).map_err(|_| Error::BufferOverflow)
    }

    /// Appends as much as fits and returns the number of dropped bytes
    pub fn append_partial(&mut self, data: &[u8]) -> usize {
        let length = data.len().min(self.space());

        match self.data.extend_from_slice(&data[..length]) {
            Ok(()) => data.len() - length,
            Err(()) => data.len(),
        }
    }

    /// Removes the first `count` bytes
    pub fn consume(&mut self, count: usize) {
        if count >= self.data.len() {
            self.data.clear();
            return;
        }

        let length = self.data.len();
        self.data.copy_within(count..length, 0);
        self.data.truncate(length - count);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn as_slice(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if no more data can be appended
    pub fn is_full(&self) -> bool {
        self.data.len() >= N
    }

    /// Remaining free space in bytes
    pub fn space(&self) -> usize {
        N - self.data.len()
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

/// Returns the offset of the first occurrence of `needle` in `haystack`
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }

    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Returns the byte range of the first occurrence of `needle` in `haystack`
pub fn find_range(haystack: &[u8], needle: &[u8]) -> Option<Range<usize>> {
    find(haystack, needle).map(|start| start..start + needle.len())
}

/// Returns true if `haystack` contains `needle`
pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}
