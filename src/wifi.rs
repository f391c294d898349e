//! # WIFI adapter
//!
//! Central type of the crate, owning the AT engine, the timeouts, the MQTT session and the
//! receive accumulator. Joining a network and obtaining address information is supported here,
//! the MQTT operations are implemented in [crate::mqtt].
//!
//! Note: If the connection was not successful or is lost, the ESP-AT will try independently from time
//! to time (by default every second) to establish connection to the network.
//!
//! ## Example
//!
//! ````
//! # use esp_at_mqtt::example::{ExampleModem, ExampleTimer};
//! # use esp_at_mqtt::wifi::{Adapter, WifiAdapter};
//! # let modem = ExampleModem::default();
//! # let (dma, serial, timer) = (modem.dma(), modem.serial(), ExampleTimer::default());
//! let mut adapter: Adapter<_, _, _, 1_000, 256, 512> = Adapter::new(dma, serial, timer).unwrap();
//! adapter.initialize().unwrap();
//!
//! // Setting target WIFI access point
//! let state = adapter.join("test_wifi", "secret").unwrap();
//! assert!(state.connected);
//! assert!(state.ip_assigned);
//!
//! let address = adapter.get_address().unwrap();
//! assert_eq!("10:fe:ed:05:ba:50", address.mac.unwrap().as_str());
//! ````
use crate::buffer::{contains, find};
use crate::commands::{
    failure, AccessPointConnectCommand, AtCommand, CommandErrorHandler, EchoOffCommand, ObtainLocalAddressCommand,
    RestartCommand, TestCommand, WifiModeCommand,
};
use crate::config::{Timeouts, DEFAULT_KEEP_ALIVE_S};
use crate::engine::AtEngine;
use crate::error::{Error, TransportError};
use crate::ipd::IpdReassembler;
use crate::mqtt::{MessageCallback, Session};
use crate::responses;
use crate::ring::{DmaChannel, RingBufferReader};
use core::fmt::Debug;
use core::str::FromStr;
use embedded_io::Write;
use core::net::{Ipv4Addr, Ipv6Addr};
use fugit_timer::Timer;
use heapless::String;
use log::{debug, info, warn};

/// Max. length of the SSID
const MAX_SSID_LENGTH: usize = 32;

/// Max. length of the WIFI password
const MAX_PASSWORD_LENGTH: usize = 63;

/// Start of a `+IPD` frame header
const IPD_MARKER: &[u8] = b"+IPD,";

/// Wifi network adapter trait
pub trait WifiAdapter {
    /// Error when joining a WIFI network
    type JoinError: Debug;

    /// Error when receiving local address information
    type AddressError: Debug;

    /// Connects to an WIFI access point and returns the connection state
    fn join(&mut self, ssid: &str, key: &str) -> Result<JoinState, Self::JoinError>;

    /// Returns local address information
    fn get_address(&mut self) -> Result<LocalAddress, Self::AddressError>;
}

/// Central client for network communication
///
/// TX_SIZE: Max. size of an encoded MQTT packet in bytes. Higher value allows larger payloads, but
/// introduces also higher stack memory footprint.
///
/// RX_SIZE: Capacity of the AT response buffer and of the `+IPD` receive accumulator. Must hold
/// the largest expected inbound frame including its header.
pub struct Adapter<
    D: DmaChannel,
    S: Write,
    T: Timer<TIMER_HZ>,
    const TIMER_HZ: u32,
    const TX_SIZE: usize,
    const RX_SIZE: usize,
> {
    /// Command/response engine
    pub(crate) engine: AtEngine<D, S, T, TIMER_HZ, RX_SIZE>,

    /// Configured timeouts
    pub(crate) timeouts: Timeouts<TIMER_HZ>,

    /// MQTT connection state
    pub(crate) session: Session,

    /// Received `+IPD` frames not processed yet
    pub(crate) rx: IpdReassembler<RX_SIZE>,

    /// Receiver of inbound PUBLISH messages
    pub(crate) callback: Option<MessageCallback>,
}

/// Possible errors when joining an access point
#[derive(Clone, Debug, PartialEq)]
pub enum JoinError {
    /// Error wile setting WIFI mode to station
    ModeError(Error),

    /// Error while setting WIFI credentials
    ConnectError(Error),

    /// Access point rejected the connection with the given `+CWJAP` code
    /// * 1: connection timeout
    /// * 2: wrong password
    /// * 3: cannot find the target AP
    /// * 4: connection failed
    Rejected(u8),

    /// Given SSD is longer then the max. size of 32 chars
    InvalidSSDLength,

    /// Given password is longer then the max. size of 63 chars
    InvalidPasswordLength,
}

/// Errors when receiving local address information
#[derive(Clone, Debug, PartialEq)]
pub enum AddressErrors {
    /// CIFSR command failed
    CommandError(Error),

    /// Error while parsing addresses
    AddressParseError,
}

/// Current WIFI connection state
#[derive(Copy, Clone, Debug)]
pub struct JoinState {
    /// True if connected to an WIFI access point
    pub connected: bool,

    /// True if an IP was assigned
    pub ip_assigned: bool,
}

impl<D: DmaChannel, S: Write, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, const TX_SIZE: usize, const RX_SIZE: usize>
    WifiAdapter for Adapter<D, S, T, TIMER_HZ, TX_SIZE, RX_SIZE>
{
    type JoinError = JoinError;
    type AddressError = AddressErrors;

    /// Connects to an WIFI access point and returns the connection state
    ///
    /// Note:
    /// If the connection was not successful or is lost, the ESP-AT will try independently from time
    /// to time (by default every second) to establish connection to the network.
    fn join(&mut self, ssid: &str, key: &str) -> Result<JoinState, JoinError> {
        if ssid.len() > MAX_SSID_LENGTH {
            return Err(JoinError::InvalidSSDLength);
        }

        if key.len() > MAX_PASSWORD_LENGTH {
            return Err(JoinError::InvalidPasswordLength);
        }

        self.send_command(&WifiModeCommand::station_mode())?;
        self.send_command(&AccessPointConnectCommand::new(ssid, key))?;

        let state = JoinState {
            connected: contains(self.engine.response(), b"WIFI CONNECTED"),
            ip_assigned: contains(self.engine.response(), b"WIFI GOT IP"),
        };

        info!("Joined WIFI network {} (IP assigned: {})", ssid, state.ip_assigned);
        Ok(state)
    }

    /// Returns local address information
    fn get_address(&mut self) -> Result<LocalAddress, AddressErrors> {
        self.send_command(&ObtainLocalAddressCommand)?;
        LocalAddress::from_response(self.engine.response())
    }
}

impl<D: DmaChannel, S: Write, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, const TX_SIZE: usize, const RX_SIZE: usize>
    Adapter<D, S, T, TIMER_HZ, TX_SIZE, RX_SIZE>
{
    /// Creates a new network adapter
    ///
    /// The DMA transfer into the circular buffer must be running already. Fails with
    /// [Error::InvalidParam] if the DMA buffer size is not supported.
    pub fn new(dma: D, serial: S, timer: T) -> Result<Self, Error> {
        let reader = RingBufferReader::new(dma)?;
        let timeouts = Timeouts::default();

        let mut engine = AtEngine::new(reader, serial, timer);
        engine.set_flush_window(timeouts.flush);

        Ok(Self {
            engine,
            timeouts,
            session: Session::new(DEFAULT_KEEP_ALIVE_S),
            rx: IpdReassembler::new(),
            callback: None,
        })
    }

    /// Checks if the modem is responsive and disables the command echo
    pub fn initialize(&mut self) -> Result<(), Error> {
        self.send_command(&TestCommand)?;
        self.send_command(&EchoOffCommand)?;

        debug!("ESP-AT modem initialized");
        Ok(())
    }

    /// Restarts the module and waits until it is ready again
    ///
    /// Any MQTT session is lost, as the TCP connection gets closed by the restart.
    pub fn restart(&mut self) -> Result<(), Error> {
        self.session.reset();
        self.session.single_connection_enabled = false;
        self.rx.clear();

        self.send_command(&RestartCommand)?;

        info!("ESP-AT modem restarted");
        Ok(())
    }

    /// Replaces the timeouts
    pub fn set_timeouts(&mut self, timeouts: Timeouts<TIMER_HZ>) {
        self.timeouts = timeouts;
        self.engine.set_flush_window(timeouts.flush);
    }

    /// Sets the keep alive interval announced in the next CONNECT
    pub fn set_keep_alive(&mut self, seconds: u16) {
        self.session.keep_alive_s = seconds;
    }

    /// Sends a command and maps the error if the command failed
    ///
    /// The command is terminated by its expected pattern, by an `ERROR`/`FAIL` indication or by its timeout.
    pub(crate) fn send_command<C: AtCommand + CommandErrorHandler>(&mut self, command: &C) -> Result<(), C::Error> {
        let line = command.render().map_err(|error| command.command_error(error, &[]))?;
        let timeout = self.timeouts.get(C::TIMEOUT);

        self.salvage();
        if let Err(error) = self.pump() {
            warn!("Received data discarded before command, reported by next poll: {:?}", error);
        }

        let mut failed = false;
        let result = self.engine.send_with(&line, timeout, |response| {
            if let Some(range) = command.matches(response) {
                return Some(range);
            }

            let range = failure(response)?;
            failed = true;
            Some(range)
        });

        let error = match result {
            Ok(_) if !failed => return Ok(()),
            Ok(_) => Error::Transport(TransportError::CommandFailed),
            Err(error) => error,
        };

        debug!("Command {} failed: {:?}", line.as_str(), error);
        Err(command.command_error(error, self.engine.response()))
    }

    /// Moves data of the active session, which has been received by the engine, to the `+IPD` accumulator
    pub(crate) fn salvage(&mut self) {
        if self.session.is_active() {
            let response = self.engine.response();

            if let Some(start) = find(response, IPD_MARKER) {
                if let Err(error) = self.rx.push(&response[start..]) {
                    warn!("Receive buffer overflow, reported by next poll: {:?}", error);
                }
            }
        }

        self.engine.clear_response();
    }
}

/// Local IP and MAC addresses
#[derive(Default, Clone, Debug)]
pub struct LocalAddress {
    /// Local IPv4 address if assigned
    pub ipv4: Option<Ipv4Addr>,

    /// Local MAC address
    pub mac: Option<String<17>>,

    /// Link local IPv6 address if assigned
    pub ipv6_link_local: Option<Ipv6Addr>,

    /// Global IPv6 address if assigned
    pub ipv6_global: Option<Ipv6Addr>,
}

impl LocalAddress {
    /// Parses the `+CIFSR` lines of the response
    pub(crate) fn from_response(response: &[u8]) -> Result<Self, AddressErrors> {
        let mut data = Self::default();

        for line in responses::lines(response).filter_map(responses::local_address) {
            match line.address_type {
                "STAIP" => {
                    data.ipv4 = Some(Ipv4Addr::from_str(line.address).map_err(|_| AddressErrors::AddressParseError)?)
                }
                "STAIP6LL" => {
                    data.ipv6_link_local =
                        Some(Ipv6Addr::from_str(line.address).map_err(|_| AddressErrors::AddressParseError)?)
                }
                "STAIP6GL" => {
                    data.ipv6_global =
                        Some(Ipv6Addr::from_str(line.address).map_err(|_| AddressErrors::AddressParseError)?)
                }
                "STAMAC" => {
                    data.mac = Some(String::try_from(line.address).map_err(|_| AddressErrors::AddressParseError)?);
                }
                _ => {}
            }
        }

        Ok(data)
    }
}
