//! # Timeout configuration
//!
//! Every wait loop of the crate is bounded by one of these durations. The individual AT commands pick one of the
//! three general classes (short, medium, long), MQTT acknowledgements use dedicated values.
//!
//! ````
//! # use esp_at_mqtt::config::Timeouts;
//! # use fugit::ExtU32;
//! let mut timeouts: Timeouts<1_000> = Timeouts::default();
//! timeouts.connack = 5_000.millis();
//!
//! assert_eq!(2_000, timeouts.short.ticks());
//! assert_eq!(5_000, timeouts.connack.ticks());
//! ````
use fugit::{ExtU32, TimerDurationU32};

/// Keep-alive interval announced in CONNECT if not configured otherwise
pub const DEFAULT_KEEP_ALIVE_S: u16 = 60;

/// Timeout class of an AT command
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimeoutClass {
    /// Simple configuration or query commands
    Short,

    /// Opening a TCP connection
    Medium,

    /// Joining a network or waiting for a module restart
    Long,
}

/// Timeouts used by the engine and the MQTT session
#[derive(Copy, Clone)]
pub struct Timeouts<const TIMER_HZ: u32> {
    /// Stability window of the receive buffer flush preceding each command
    pub flush: TimerDurationU32<TIMER_HZ>,

    /// Timeout of [TimeoutClass::Short] commands, the `>` prompt and `SEND OK`
    pub short: TimerDurationU32<TIMER_HZ>,

    /// Timeout of [TimeoutClass::Medium] commands
    pub medium: TimerDurationU32<TIMER_HZ>,

    /// Timeout of [TimeoutClass::Long] commands
    pub long: TimerDurationU32<TIMER_HZ>,

    /// Max. time to wait for CONNACK after CONNECT was transmitted
    pub connack: TimerDurationU32<TIMER_HZ>,

    /// Max. time to wait for best-effort acknowledgements (PUBACK, PINGRESP)
    pub ack: TimerDurationU32<TIMER_HZ>,
}

impl<const TIMER_HZ: u32> Default for Timeouts<TIMER_HZ> {
    fn default() -> Self {
        Self {
            flush: 20.millis(),
            short: 2_000.millis(),
            medium: 7_000.millis(),
            long: 15_000.millis(),
            connack: 10_000.millis(),
            ack: 2_000.millis(),
        }
    }
}

impl<const TIMER_HZ: u32> Timeouts<TIMER_HZ> {
    /// Returns the timeout of the given command class
    pub fn get(&self, class: TimeoutClass) -> TimerDurationU32<TIMER_HZ> {
        match class {
            TimeoutClass::Short => self.short,
            TimeoutClass::Medium => self.medium,
            TimeoutClass::Long => self.long,
        }
    }
}
