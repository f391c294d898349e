//! Mocks for doc examples
use crate::ring::DmaChannel;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use embedded_io::{ErrorKind, ErrorType, Write};
use fugit::{TimerDurationU32, TimerInstantU32};
use fugit_timer::Timer;
use numtoa::NumToA;

/// Size of the simulated DMA buffer
const BUFFER_SIZE: usize = 1024;

/// Message delivered after each SUBSCRIBE: `on` published to `commands/led`
const MESSAGE: &[u8] = b"\r\n+IPD,18:\x30\x10\x00\x0Ccommands/ledon";

struct ModemState {
    buffer: [u8; BUFFER_SIZE],
    write_pos: usize,

    /// Written data not answered yet
    line: Vec<u8>,

    /// Length of the packet announced by `AT+CIPSEND`
    raw_length: Option<usize>,
}

impl ModemState {
    fn store(&mut self, data: &[u8]) {
        for byte in data {
            self.buffer[self.write_pos] = *byte;
            self.write_pos = (self.write_pos + 1) % BUFFER_SIZE;
        }
    }

    fn store_number(&mut self, number: usize) {
        let mut buffer = [0x0; 20];
        self.store(number.numtoa(10, &mut buffer));
    }

    fn process(&mut self) {
        if let Some(length) = self.raw_length {
            if self.line.len() >= length {
                let packet: Vec<u8> = self.line.drain(..length).collect();
                self.raw_length = None;
                self.answer_packet(&packet);
            }

            return;
        }

        if self.line.ends_with(b"\r\n") {
            let line = core::mem::take(&mut self.line);
            self.answer_command(&line);
        }
    }

    fn answer_command(&mut self, line: &[u8]) {
        match line {
            b"AT\r\n" | b"ATE0\r\n" | b"AT+CWMODE=1\r\n" | b"AT+CIPMUX=0\r\n" => self.store(b"\r\nOK\r\n"),
            b"AT+CIFSR\r\n" => {
                self.store(b"+CIFSR:STAIP,\"10.0.0.181\"\r\n+CIFSR:STAMAC,\"10:fe:ed:05:ba:50\"\r\n\r\nOK\r\n")
            }
            b"AT+CIPCLOSE\r\n" => self.store(b"CLOSED\r\n\r\nOK\r\n"),
            b"AT+RST\r\n" => self.store(b"\r\nOK\r\n\r\nready\r\n"),
            _ if line.starts_with(b"AT+CWJAP=") => self.store(b"WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n"),
            _ if line.starts_with(b"AT+CIPSTART=") => self.store(b"CONNECT\r\n\r\nOK\r\n"),
            _ if line.starts_with(b"AT+CIPSEND=") => {
                let digits = &line[11..line.len() - 2];
                let length = digits.iter().fold(0, |length, digit| length * 10 + (digit - b'0') as usize);

                self.raw_length = Some(length);
                self.store(b"\r\nOK\r\n> ");
            }
            _ => self.store(b"\r\nERROR\r\n"),
        }
    }

    fn answer_packet(&mut self, packet: &[u8]) {
        self.store(b"\r\nRecv ");
        self.store_number(packet.len());
        self.store(b" bytes\r\n\r\nSEND OK\r\n");

        match packet[0] & 0xF0 {
            // CONNECT
            0x10 => self.store(b"\r\n+IPD,4:\x20\x02\x00\x00"),
            // QoS 1 PUBLISH
            0x30 if packet[0] & 0x06 == 0x02 => {
                let offset = 4 + u16::from_be_bytes([packet[2], packet[3]]) as usize;
                self.store(b"\r\n+IPD,4:\x40\x02");
                self.store(&packet[offset..offset + 2]);
            }
            // SUBSCRIBE
            0x80 => {
                self.store(b"\r\n+IPD,5:\x90\x03");
                self.store(&packet[2..4]);
                self.store(b"\x00");
                self.store(MESSAGE);
            }
            // PINGREQ
            0xC0 => self.store(b"\r\n+IPD,2:\xD0\x00"),
            _ => {}
        }
    }
}

/// ESP-AT modem mock answering the commands of the doc examples
#[derive(Clone)]
pub struct ExampleModem {
    state: Rc<RefCell<ModemState>>,
}

impl Default for ExampleModem {
    fn default() -> Self {
        Self {
            state: Rc::new(RefCell::new(ModemState {
                buffer: [0x0; BUFFER_SIZE],
                write_pos: 0,
                line: Vec::new(),
                raw_length: None,
            })),
        }
    }
}

impl ExampleModem {
    pub fn dma(&self) -> ExampleDma {
        ExampleDma { modem: self.clone() }
    }

    pub fn serial(&self) -> ExampleSerial {
        ExampleSerial { modem: self.clone() }
    }
}

/// Receive side of [ExampleModem]
pub struct ExampleDma {
    modem: ExampleModem,
}

impl DmaChannel for ExampleDma {
    fn capacity(&self) -> usize {
        BUFFER_SIZE
    }

    fn remaining(&self) -> usize {
        BUFFER_SIZE - self.modem.state.borrow().write_pos
    }

    fn read(&self, offset: usize, dest: &mut [u8]) {
        let state = self.modem.state.borrow();
        dest.copy_from_slice(&state.buffer[offset..offset + dest.len()]);
    }
}

/// Transmit side of [ExampleModem]
pub struct ExampleSerial {
    modem: ExampleModem,
}

impl ErrorType for ExampleSerial {
    type Error = ErrorKind;
}

impl Write for ExampleSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut state = self.modem.state.borrow_mut();
        state.line.extend_from_slice(buf);
        state.process();

        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Timer mock advancing by one millisecond on each wait
#[derive(Default)]
pub struct ExampleTimer {
    ticks: u32,
    started_at: u32,
    duration: u32,
}

impl Timer<1_000> for ExampleTimer {
    type Error = u32;

    fn now(&mut self) -> TimerInstantU32<1000> {
        TimerInstantU32::from_ticks(self.ticks)
    }

    fn start(&mut self, duration: TimerDurationU32<1000>) -> Result<(), Self::Error> {
        self.started_at = self.ticks;
        self.duration = duration.ticks();
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn wait(&mut self) -> nb::Result<(), Self::Error> {
        self.ticks = self.ticks.wrapping_add(1);

        if self.ticks.wrapping_sub(self.started_at) >= self.duration {
            return Ok(());
        }

        Err(nb::Error::WouldBlock)
    }
}
