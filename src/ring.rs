//! # Circular DMA receive buffer
//!
//! The UART receiver writes continuously into a fixed circular buffer by DMA. The hardware owns the
//! write cursor, software only tracks its read cursor and never writes to the buffer. The write
//! position is derived from the DMA transfer counter ("bytes remaining until wrap").
//!
//! ````
//! # use esp_at_mqtt::ring::{DmaChannel, RingBufferReader};
//! # use core::cell::Cell;
//! struct Dma {
//!     buffer: [u8; 8],
//!     remaining: Cell<usize>,
//! }
//!
//! impl DmaChannel for Dma {
//!     fn capacity(&self) -> usize {
//!         self.buffer.len()
//!     }
//!
//!     fn remaining(&self) -> usize {
//!         self.remaining.get()
//!     }
//!
//!     fn read(&self, offset: usize, dest: &mut [u8]) {
//!         dest.copy_from_slice(&self.buffer[offset..offset + dest.len()]);
//!     }
//! }
//!
//! let dma = Dma { buffer: *b"OK\r\n....", remaining: Cell::new(8) };
//! let mut reader = RingBufferReader::new(dma).unwrap();
//!
//! // Four bytes received
//! reader.dma().remaining.set(4);
//!
//! let mut data = [0x0; 16];
//! assert_eq!(4, reader.poll(&mut data));
//! assert_eq!(b"OK\r\n", &data[..4]);
//! assert_eq!(0, reader.poll(&mut data));
//! ````
use crate::clock::{arm, expired};
use crate::error::Error;
use fugit::TimerDurationU32;
use fugit_timer::Timer;

/// Hardware side of the circular receive buffer
pub trait DmaChannel {
    /// Size of the circular buffer in bytes
    fn capacity(&self) -> usize;

    /// Bytes remaining until the DMA write cursor wraps, e.g. the NDTR register on STM32
    fn remaining(&self) -> usize;

    /// Copies `dest.len()` bytes starting at `offset`. Callers never cross the buffer end.
    fn read(&self, offset: usize, dest: &mut [u8]);
}

/// Read cursor into the circular DMA buffer
pub struct RingBufferReader<D: DmaChannel> {
    dma: D,

    /// Cached buffer size
    capacity: usize,

    /// Next index to read. Always smaller than capacity.
    last_read_pos: usize,
}

impl<D: DmaChannel> RingBufferReader<D> {
    /// Creates a new reader. Fails with [Error::InvalidParam] for zero sized buffers or buffers
    /// larger than the 16 bit DMA counter can address.
    pub fn new(dma: D) -> Result<Self, Error> {
        let capacity = dma.capacity();
        if capacity == 0 || capacity > u16::MAX as usize {
            return Err(Error::InvalidParam);
        }

        Ok(Self {
            dma,
            capacity,
            last_read_pos: 0,
        })
    }

    /// Copies newly received bytes to `dest` and returns the copied length. Never blocks.
    ///
    /// If more data is available than fits in `dest`, the surplus stays available for the next call.
    pub fn poll(&mut self, dest: &mut [u8]) -> usize {
        let write_pos = self.write_position();
        if write_pos == self.last_read_pos || dest.is_empty() {
            return 0;
        }

        let count = self.distance(write_pos).min(dest.len());

        // First segment up to the buffer end, second one from the start in case of wraparound
        let first = count.min(self.capacity - self.last_read_pos);
        self.dma.read(self.last_read_pos, &mut dest[..first]);

        if count > first {
            self.dma.read(0, &mut dest[first..count]);
        }

        self.last_read_pos = (self.last_read_pos + count) % self.capacity;
        count
    }

    /// Discards all buffered data once the line has been quiet for the given window
    ///
    /// The window restarts whenever the DMA write position moves.
    pub fn flush<T: Timer<TIMER_HZ>, const TIMER_HZ: u32>(
        &mut self,
        timer: &mut T,
        window: TimerDurationU32<TIMER_HZ>,
    ) -> Result<(), Error> {
        let mut write_pos = self.write_position();
        arm(timer, window)?;

        while !expired(timer)? {
            let current = self.write_position();
            if current != write_pos {
                write_pos = current;
                arm(timer, window)?;
            }
        }

        self.last_read_pos = write_pos;
        Ok(())
    }

    /// Number of bytes received but not read yet
    pub fn available(&self) -> usize {
        self.distance(self.write_position())
    }

    /// Current DMA write position
    pub fn write_position(&self) -> usize {
        let remaining = self.dma.remaining().min(self.capacity);
        (self.capacity - remaining) % self.capacity
    }

    /// Current read cursor
    pub fn read_position(&self) -> usize {
        self.last_read_pos
    }

    /// Access to the underlying DMA channel
    pub fn dma(&self) -> &D {
        &self.dma
    }

    /// Bytes between read cursor and the given write position
    fn distance(&self, write_pos: usize) -> usize {
        if write_pos >= self.last_read_pos {
            return write_pos - self.last_read_pos;
        }

        self.capacity - self.last_read_pos + write_pos
    }
}
