//! # MQTT 3.1.1 client
//!
//! MQTT session on top of the single TCP connection of the ESP-AT modem. Packets are transmitted by
//! `AT+CIPSEND`, inbound packets arrive as `+IPD` frames and are processed by [Adapter::poll].
//!
//! Supported: clean sessions, QoS 0 and QoS 1 publishing, QoS 0 receiving, keep alive pings.
//! Acknowledgements of QoS 1 messages are awaited best-effort without retransmission.
//!
//! ## Example
//!
//! ````
//! # use esp_at_mqtt::codec::QoS;
//! # use esp_at_mqtt::example::{ExampleModem, ExampleTimer};
//! # use esp_at_mqtt::wifi::Adapter;
//! # let modem = ExampleModem::default();
//! # let mut adapter: Adapter<_, _, _, 1_000, 256, 512> =
//! #     Adapter::new(modem.dma(), modem.serial(), ExampleTimer::default()).unwrap();
//! adapter.connect("broker.local", 1883, "sensor-1", None, None).unwrap();
//!
//! adapter.set_message_callback(|topic, payload| {
//!     log::info!("{}: {} bytes", topic, payload.len());
//! });
//! adapter.subscribe("commands/#", QoS::AtMostOnce).unwrap();
//! adapter.publish("sensors/temperature", b"21.5", QoS::AtLeastOnce, false).unwrap();
//!
//! // Message published by the broker on commands/led
//! assert_eq!(1, adapter.poll().unwrap());
//!
//! adapter.disconnect().unwrap();
//! ````
use crate::buffer::{contains, find_range};
use crate::codec::{
    decode_connack, encode_connect, encode_disconnect, encode_pingreq, encode_publish, encode_subscribe, find_connack,
    find_puback, packet_len, ConnAck, Packet, QoS, PINGRESP,
};
use crate::commands::{CloseSocketCommand, ConnectCommand, SetSingleConnectionCommand, TransmissionPrepareCommand};
use crate::error::{Error, ProtocolError, TransportError};
use crate::hex::{preview, PREVIEW_LENGTH};
use crate::ipd::find_unframed;
use crate::responses;
use crate::ring::DmaChannel;
use crate::wifi::Adapter;
use alloc::boxed::Box;
use embedded_io::Write;
use fugit_timer::Timer;
use heapless::String;
use log::{debug, info, trace, warn};

/// Max. length of the broker host name
pub const MAX_HOST_LEN: usize = 64;

/// Max. length of the client identifier
pub const MAX_CLIENT_ID_LEN: usize = 32;

/// Size of the stack buffer used for draining the receive buffer
const READ_CHUNK_SIZE: usize = 64;

/// Receiver of inbound messages, called with topic and payload
pub type MessageCallback = Box<dyn FnMut(&str, &[u8])>;

/// State of the MQTT connection
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,

    /// TCP connection is being established or CONNACK is pending
    Connecting,

    /// CONNACK accepted the connection
    Connected,
}

/// MQTT session data
#[derive(Clone, Debug)]
pub(crate) struct Session {
    pub state: ConnectionState,
    pub broker_host: String<MAX_HOST_LEN>,
    pub broker_port: u16,
    pub client_id: String<MAX_CLIENT_ID_LEN>,
    pub keep_alive_s: u16,

    /// Identifier of the next QoS 1 PUBLISH or SUBSCRIBE. Never zero.
    pub next_packet_id: u16,

    /// True once `AT+CIPMUX=0` was acknowledged. Reset by a module restart.
    pub single_connection_enabled: bool,
}

impl Session {
    pub fn new(keep_alive_s: u16) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            broker_host: String::new(),
            broker_port: 0,
            client_id: String::new(),
            keep_alive_s,
            next_packet_id: 1,
            single_connection_enabled: false,
        }
    }

    /// Returns the next packet identifier, wrapping from 65535 to 1
    pub fn next_packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = if id == u16::MAX { 1 } else { id + 1 };
        id
    }

    /// Clears the connection data. Keep alive and modem configuration are kept.
    pub fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.broker_host.clear();
        self.broker_port = 0;
        self.client_id.clear();
        self.next_packet_id = 1;
    }

    /// True while connecting or connected
    pub fn is_active(&self) -> bool {
        self.state != ConnectionState::Disconnected
    }
}

impl<D: DmaChannel, S: Write, T: Timer<TIMER_HZ>, const TIMER_HZ: u32, const TX_SIZE: usize, const RX_SIZE: usize>
    Adapter<D, S, T, TIMER_HZ, TX_SIZE, RX_SIZE>
{
    /// Opens the TCP connection and performs the MQTT handshake with clean session
    ///
    /// An existing session is closed first. On failure the session stays disconnected, a refused
    /// connection is returned as [ProtocolError::ConnectionRefused] with the CONNACK return code.
    pub fn connect(
        &mut self,
        host: &str,
        port: u16,
        client_id: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), Error> {
        if host.is_empty() || host.len() > MAX_HOST_LEN {
            return Err(Error::InvalidParam);
        }

        if client_id.is_empty() || client_id.len() > MAX_CLIENT_ID_LEN {
            return Err(Error::InvalidParam);
        }

        let packet = encode_connect::<TX_SIZE>(client_id, username, password, self.session.keep_alive_s)?;

        if self.session.is_active() {
            debug!("Closing previous MQTT session");
            if let Err(error) = self.disconnect() {
                debug!("Closing previous session failed: {:?}", error);
            }
        }

        self.session.state = ConnectionState::Connecting;
        let result = self.open_session(host, port, &packet);
        self.salvage();

        if let Err(error) = result {
            warn!("MQTT connection to {}:{} failed: {:?}", host, port, error);
            self.session.reset();
            self.rx.clear();
            return Err(error);
        }

        self.session.broker_host = String::try_from(host).map_err(|_| Error::InvalidParam)?;
        self.session.client_id = String::try_from(client_id).map_err(|_| Error::InvalidParam)?;
        self.session.broker_port = port;
        self.session.state = ConnectionState::Connected;

        info!("MQTT connected to {}:{} as {}", host, port, client_id);
        Ok(())
    }

    /// Publishes a message. QoS 2 is not supported.
    ///
    /// For QoS 1 the PUBACK is awaited best-effort. A missing acknowledgement is logged, but not returned as error.
    pub fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Result<(), Error> {
        self.require_connected()?;

        if topic.is_empty() || topic.contains(|c: char| c == '+' || c == '#') || qos == QoS::ExactlyOnce {
            return Err(Error::InvalidParam);
        }

        let packet_id = match qos {
            QoS::AtMostOnce => None,
            _ => Some(self.session.next_packet_id()),
        };

        let packet = encode_publish::<TX_SIZE>(topic, payload, qos, retain, packet_id)?;
        let result = self.transmit(&packet);

        if let (Ok(()), Some(id)) = (result, packet_id) {
            self.await_puback(id);
        }

        self.salvage();
        if result.is_ok() {
            debug!("Published {} bytes to {}", payload.len(), topic);
        }

        result
    }

    /// Subscribes to the given topic filter
    ///
    /// SUBACK is not awaited, it is logged by [Self::poll] once received.
    pub fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Error> {
        self.require_connected()?;

        if topic.is_empty() {
            return Err(Error::InvalidParam);
        }

        let packet_id = self.session.next_packet_id();
        let packet = encode_subscribe::<TX_SIZE>(topic, qos, packet_id)?;
        let result = self.transmit(&packet);
        self.salvage();

        if result.is_ok() {
            debug!("Subscribed to {} (packet {})", topic, packet_id);
        }

        result
    }

    /// Sends PINGREQ and waits best-effort for PINGRESP
    pub fn ping(&mut self) -> Result<(), Error> {
        self.require_connected()?;

        let result = self.transmit(&encode_pingreq());
        if result.is_ok() {
            let pingresp = self
                .engine
                .wait_in_response(self.timeouts.ack, |response| find_range(response, &[PINGRESP, 0x00]));

            match pingresp {
                Ok(_) => debug!("PINGRESP received"),
                Err(error) => warn!("No PINGRESP received: {:?}", error),
            }
        }

        self.salvage();
        result
    }

    /// Sends DISCONNECT if connected and closes the TCP connection
    ///
    /// The session is cleared in any case. Fails if the modem did not acknowledge closing the socket.
    pub fn disconnect(&mut self) -> Result<(), Error> {
        if self.session.state == ConnectionState::Connected {
            if let Err(error) = self.transmit(&encode_disconnect()) {
                debug!("Sending DISCONNECT failed: {:?}", error);
            }
        }

        self.session.reset();
        self.rx.clear();

        let result = self.send_command(&CloseSocketCommand);
        self.engine.clear_response();

        info!("MQTT session closed");
        result
    }

    /// Sets the receiver of inbound messages
    pub fn set_message_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&str, &[u8]) + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    /// Processes received data without blocking
    ///
    /// Inbound PUBLISH messages are passed to the message callback. If the modem reports the
    /// connection as closed, the session is set to disconnected. Returns the number of delivered messages.
    ///
    /// Fails with [Error::BufferOverflow] once if received data was lost since the last call, also
    /// when the loss happened while another operation was running.
    pub fn poll(&mut self) -> Result<usize, Error> {
        self.require_connected()?;

        if self.rx.take_overflow() {
            warn!("Receive buffer overflowed, buffered frames were dropped");
            return Err(Error::BufferOverflow);
        }

        if let Err(error) = self.pump() {
            self.rx.take_overflow();
            return Err(error);
        }

        let mut delivered = 0;
        loop {
            let before = self.rx.len();

            if let Some(payload) = self.rx.poll_once() {
                delivered += dispatch(payload, &mut self.callback);
                continue;
            }

            // Loop continues after a malformed frame header was dropped
            if self.rx.len() == before {
                break;
            }
        }

        if self.rx.discard_noise(b"CLOSED") {
            warn!("MQTT connection closed by remote");
            self.session.reset();
            self.rx.clear();
        }

        Ok(delivered)
    }

    /// Returns the current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.session.state
    }

    pub fn is_connected(&self) -> bool {
        self.session.state == ConnectionState::Connected
    }

    /// Drains the receive buffer into the `+IPD` accumulator. Data lost by an overflow is flagged
    /// by the accumulator until the next [Self::poll].
    pub(crate) fn pump(&mut self) -> Result<(), Error> {
        if !self.session.is_active() {
            return Ok(());
        }

        let mut chunk = [0x0; READ_CHUNK_SIZE];
        loop {
            let length = self.engine.reader.poll(&mut chunk);
            if length == 0 {
                return Ok(());
            }

            let mut hex = [0x0; PREVIEW_LENGTH * 2];
            trace!("Received {} bytes: {}", length, preview(&chunk[..length], &mut hex));

            self.rx.push(&chunk[..length])?;
        }
    }

    /// Transmits a complete MQTT packet by `AT+CIPSEND`
    fn transmit(&mut self, packet: &[u8]) -> Result<(), Error> {
        if let Err(error) = self.send_command(&TransmissionPrepareCommand::new(packet.len())) {
            if contains(self.engine.response(), b"link is not valid") {
                warn!("TCP link is not valid anymore");
                self.session.reset();
            }

            return Err(error);
        }

        let mut hex = [0x0; PREVIEW_LENGTH * 2];
        trace!("Transmitting {} bytes: {}", packet.len(), preview(packet, &mut hex));
        self.engine.write_raw(packet)?;

        let range = self.engine.wait_until(self.timeouts.short, |response| {
            find_unframed(response, b"SEND OK").or_else(|| find_unframed(response, b"SEND FAIL"))
        });

        let response = self.engine.response();
        match range {
            Ok(range) if &response[range.clone()] == b"SEND FAIL" => {
                return Err(Error::Transport(TransportError::SendFailed));
            }
            Ok(_) => {}
            Err(Error::Timeout) if find_unframed(response, b"ERROR").is_some() => {
                return Err(Error::Transport(TransportError::SendFailed));
            }
            Err(error) => return Err(error),
        }

        match responses::receive_confirmation(response) {
            Some(count) if count != packet.len() => {
                warn!("ESP-AT confirmed {} of {} bytes", count, packet.len());
                Err(Error::Transport(TransportError::PartialSend))
            }
            _ => Ok(()),
        }
    }

    /// Opens the TCP connection, sends CONNECT and evaluates CONNACK
    fn open_session(&mut self, host: &str, port: u16, connect: &[u8]) -> Result<(), Error> {
        if !self.session.single_connection_enabled {
            self.send_command(&SetSingleConnectionCommand)?;
            self.session.single_connection_enabled = true;
        }

        self.send_command(&ConnectCommand::tcp(host, port))?;
        debug!("TCP connection to {}:{} established", host, port);

        let result = self.handshake(connect);
        if result.is_err() {
            self.salvage();
            if let Err(error) = self.send_command(&CloseSocketCommand) {
                debug!("Closing TCP connection failed: {:?}", error);
            }
        }

        result
    }

    fn handshake(&mut self, connect: &[u8]) -> Result<(), Error> {
        self.transmit(connect)?;

        // CONNACK may arrive ahead of SEND OK
        let range = self.engine.wait_in_response(self.timeouts.connack, find_connack)?;
        match decode_connack(&self.engine.response()[range])? {
            ConnAck::Accepted => Ok(()),
            ConnAck::Refused(code) => {
                warn!("Broker refused the connection with code {}", code);
                Err(Error::Protocol(ProtocolError::ConnectionRefused(code)))
            }
        }
    }

    fn await_puback(&mut self, packet_id: u16) {
        match self
            .engine
            .wait_in_response(self.timeouts.ack, |response| find_puback(response, packet_id))
        {
            Ok(_) => debug!("PUBACK received for packet {}", packet_id),
            Err(error) => warn!("No PUBACK received for packet {}: {:?}", packet_id, error),
        }
    }

    fn require_connected(&self) -> Result<(), Error> {
        if self.session.state != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }

        Ok(())
    }
}

/// Decodes all MQTT packets of a `+IPD` payload. Returns the number of messages passed to the callback.
fn dispatch(frame: &[u8], callback: &mut Option<MessageCallback>) -> usize {
    let mut delivered = 0;
    let mut rest = frame;

    while !rest.is_empty() {
        let length = match packet_len(rest) {
            Some(length) if length <= rest.len() => length,
            _ => {
                let mut hex = [0x0; PREVIEW_LENGTH * 2];
                warn!("Dropping truncated MQTT packet: {}", preview(rest, &mut hex));
                break;
            }
        };

        let (packet, tail) = rest.split_at(length);
        rest = tail;

        match Packet::decode(packet) {
            Ok(Packet::Publish { topic, payload, .. }) => {
                debug!("Received {} bytes on {}", payload.len(), topic);

                match callback {
                    Some(callback) => {
                        callback(topic, payload);
                        delivered += 1;
                    }
                    None => debug!("No message callback set, message dropped"),
                }
            }
            Ok(Packet::ConnAck { return_code, .. }) => debug!("CONNACK received (code {})", return_code),
            Ok(Packet::PubAck { packet_id }) => debug!("PUBACK received for packet {}", packet_id),
            Ok(Packet::SubAck { packet_id, return_code }) if return_code == 0x80 => {
                warn!("Subscription {} rejected by broker", packet_id)
            }
            Ok(Packet::SubAck { packet_id, return_code }) => {
                debug!("SUBACK received for packet {} (QoS {})", packet_id, return_code)
            }
            Ok(Packet::PingResp) => debug!("PINGRESP received"),
            Ok(_) => {}
            Err(error) => {
                let mut hex = [0x0; PREVIEW_LENGTH * 2];
                warn!("Dropping MQTT packet ({:?}): {}", error, preview(packet, &mut hex));
            }
        }
    }

    delivered
}
