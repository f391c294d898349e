//! # AT request/response engine
//!
//! The single blocking primitive used for every AT command: flush stale input, transmit the command
//! line and accumulate the modem output until a pattern appears or the timeout elapses.
//!
//! Patterns are plain substrings, neither regular expressions nor line anchored. Waiting without
//! transmitting continues searching after the end of the previous match, so data received past one
//! match is still visible to the next wait.
//!
//! Deadlines are measured by starting the timer once and polling `wait()` without blocking. The
//! timer's `now()` is never used, so counters restarted by `start()` work as well.
use crate::buffer::{find_range, Accumulator};
use crate::clock::{arm, expired};
use crate::error::{Error, TransportError};
use crate::ring::{DmaChannel, RingBufferReader};
use core::ops::Range;
use embedded_io::Write;
use fugit::{ExtU32, TimerDurationU32};
use fugit_timer::Timer;
use log::{debug, warn};

/// Line terminator appended to each command
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Size of the stack buffer used for reading from the ring buffer
const READ_CHUNK_SIZE: usize = 64;

/// Synchronous command/response engine
///
/// RX_SIZE: Capacity of the response buffer. Output exceeding the capacity is dropped with a warning.
pub struct AtEngine<D: DmaChannel, S: Write, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, const RX_SIZE: usize> {
    /// Receive side
    pub(crate) reader: RingBufferReader<D>,

    /// Transmit side
    pub(crate) serial: S,

    /// Timer used for timeout measurement
    pub(crate) timer: T,

    /// Response of the current command
    response: Accumulator<RX_SIZE>,

    /// End of the last match within the response
    consumed: usize,

    /// Quiet window of the flush preceding each command
    pub(crate) flush_window: TimerDurationU32<TIMER_HZ>,
}

impl<D: DmaChannel, S: Write, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, const RX_SIZE: usize>
    AtEngine<D, S, T, TIMER_HZ, RX_SIZE>
{
    pub fn new(reader: RingBufferReader<D>, serial: S, timer: T) -> Self {
        Self {
            reader,
            serial,
            timer,
            response: Accumulator::new(),
            consumed: 0,
            flush_window: 20.millis(),
        }
    }

    /// Sends a command and waits until the response contains `expected_pattern`
    ///
    /// Without pattern, the call drains the response until the timeout elapses and returns
    /// [Error::Timeout]. The drained data is available by [Self::response].
    pub fn send_command(
        &mut self,
        command: &str,
        expected_pattern: Option<&str>,
        timeout: TimerDurationU32<TIMER_HZ>,
    ) -> Result<&[u8], Error> {
        let range = self.send_with(command, timeout, |response| match expected_pattern {
            Some(pattern) => find_range(response, pattern.as_bytes()),
            None => None,
        })?;

        Ok(&self.response.as_slice()[..range.end])
    }

    /// Sends a command and waits until the given matcher returns the range of a match
    pub fn send_with<F>(
        &mut self,
        command: &str,
        timeout: TimerDurationU32<TIMER_HZ>,
        matcher: F,
    ) -> Result<Range<usize>, Error>
    where
        F: FnMut(&[u8]) -> Option<Range<usize>>,
    {
        self.flush()?;
        self.clear_response();

        debug!("Sending command {}", command);
        self.write_raw(command.as_bytes())?;
        self.write_raw(LINE_TERMINATOR)?;

        self.wait_until(timeout, matcher)
    }

    /// Waits for the given pattern without transmitting, e.g. for `SEND OK` or `ready`
    pub fn wait_for_pattern(&mut self, pattern: &str, timeout: TimerDurationU32<TIMER_HZ>) -> Result<&[u8], Error> {
        self.wait_for_bytes(pattern.as_bytes(), timeout)
    }

    /// Waits for the given binary pattern without transmitting, e.g. for PINGRESP
    pub fn wait_for_bytes(&mut self, pattern: &[u8], timeout: TimerDurationU32<TIMER_HZ>) -> Result<&[u8], Error> {
        let range = self.wait_until(timeout, |response| find_range(response, pattern))?;
        Ok(&self.response.as_slice()[range])
    }

    /// Polls the receive buffer until the matcher succeeds or the timeout elapses
    ///
    /// The matcher is applied to the part of the response following the previous match. The
    /// returned range is relative to [Self::response].
    pub fn wait_until<F>(&mut self, timeout: TimerDurationU32<TIMER_HZ>, mut matcher: F) -> Result<Range<usize>, Error>
    where
        F: FnMut(&[u8]) -> Option<Range<usize>>,
    {
        arm(&mut self.timer, timeout)?;
        let mut chunk = [0x0; READ_CHUNK_SIZE];

        loop {
            if let Some(range) = matcher(&self.response.as_slice()[self.consumed..]) {
                let range = (self.consumed + range.start)..(self.consumed + range.end);
                self.consumed = range.end;
                return Ok(range);
            }

            if expired(&mut self.timer)? {
                return Err(Error::Timeout);
            }

            let length = self.reader.poll(&mut chunk);
            if length == 0 {
                core::hint::spin_loop();
                continue;
            }

            let dropped = self.response.append_partial(&chunk[..length]);
            if dropped > 0 {
                warn!("Response buffer full, dropped {} bytes", dropped);
            }
        }
    }

    /// Like [Self::wait_until], but the matcher is applied to the whole response first
    ///
    /// Used for acknowledgements which may arrive before the confirmation matched last, e.g. a
    /// CONNACK received ahead of `SEND OK`.
    pub fn wait_in_response<F>(
        &mut self,
        timeout: TimerDurationU32<TIMER_HZ>,
        mut matcher: F,
    ) -> Result<Range<usize>, Error>
    where
        F: FnMut(&[u8]) -> Option<Range<usize>>,
    {
        if let Some(range) = matcher(self.response.as_slice()) {
            self.consumed = self.consumed.max(range.end);
            return Ok(range);
        }

        self.wait_until(timeout, matcher)
    }

    /// Writes raw bytes to the serial port
    pub fn write_raw(&mut self, data: &[u8]) -> Result<(), Error> {
        self.serial
            .write_all(data)
            .map_err(|_| Error::Transport(TransportError::SerialWrite))?;
        self.serial
            .flush()
            .map_err(|_| Error::Transport(TransportError::SerialWrite))
    }

    /// Discards stale input once the line is quiet
    pub fn flush(&mut self) -> Result<(), Error> {
        self.reader.flush(&mut self.timer, self.flush_window)
    }

    /// Data collected since the last command was sent
    pub fn response(&self) -> &[u8] {
        self.response.as_slice()
    }

    /// Collected data following the last match
    pub fn remainder(&self) -> &[u8] {
        &self.response.as_slice()[self.consumed..]
    }

    pub fn clear_response(&mut self) {
        self.response.clear();
        self.consumed = 0;
    }

    /// Sets the quiet window of the flush preceding each command
    pub fn set_flush_window(&mut self, flush_window: TimerDurationU32<TIMER_HZ>) {
        self.flush_window = flush_window;
    }
}
