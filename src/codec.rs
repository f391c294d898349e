//! # MQTT 3.1.1 packet codec
//!
//! Pure encode/decode functions without any I/O. Numbers are big-endian, strings are length
//! prefixed raw bytes. Encoders write to a [heapless::Vec] of the given capacity and fail with
//! [Error::BufferOverflow] if the packet does not fit.
//!
//! ````
//! # use esp_at_mqtt::codec::{encode_publish, decode_publish, QoS};
//! let packet = encode_publish::<64>("t/1", b"hello", QoS::AtMostOnce, false, None).unwrap();
//! assert_eq!(&[0x30, 0x0A, 0x00, 0x03, b't', b'/', b'1', b'h', b'e', b'l', b'l', b'o'], packet.as_slice());
//!
//! let (topic, payload) = decode_publish(&packet).unwrap();
//! assert_eq!("t/1", topic);
//! assert_eq!(b"hello", payload);
//! ````
use crate::buffer::{contains, find, find_range};
use crate::error::{Error, ProtocolError};
use core::ops::Range;
use heapless::Vec;

// MQTT Control Packet types
pub const CONNECT: u8 = 0x10;
pub const CONNACK: u8 = 0x20;
pub const PUBLISH: u8 = 0x30;
pub const PUBACK: u8 = 0x40;
pub const SUBSCRIBE: u8 = 0x82;
pub const SUBACK: u8 = 0x90;
pub const PINGREQ: u8 = 0xC0;
pub const PINGRESP: u8 = 0xD0;
pub const DISCONNECT: u8 = 0xE0;

// Protocol constants
const PROTOCOL_NAME: &[u8] = b"MQTT";
const PROTOCOL_LEVEL: u8 = 4; // MQTT 3.1.1

// Connect flags
const CLEAN_SESSION: u8 = 0x02;
const PASSWORD_FLAG: u8 = 0x40;
const USERNAME_FLAG: u8 = 0x80;

// Publish flags
const RETAIN_FLAG: u8 = 0x01;
const QOS_MASK: u8 = 0x06;

/// Longest topic accepted on the receive path
pub const MAX_TOPIC_LEN: usize = 64;

/// Largest value representable by the four byte remaining length
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Quality of Service levels for MQTT messages.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum QoS {
    /// At most once delivery.
    AtMostOnce = 0,
    /// At least once delivery.
    AtLeastOnce = 1,
    /// Exactly once delivery.
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(Error::InvalidParam),
        }
    }
}

/// Result of a CONNACK packet
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConnAck {
    /// Connection accepted (return code 0)
    Accepted,

    /// Connection refused with the given return code
    /// * 1: unacceptable protocol version
    /// * 2: identifier rejected
    /// * 3: server unavailable
    /// * 4: bad user name or password
    /// * 5: not authorized
    Refused(u8),
}

/// MQTT control packets handled by the client
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Packet<'a> {
    Connect {
        client_id: &'a str,
        username: Option<&'a str>,
        password: Option<&'a str>,
        keep_alive: u16,
    },
    Publish {
        topic: &'a str,
        payload: &'a [u8],
        qos: QoS,
        retain: bool,
        packet_id: Option<u16>,
    },
    Subscribe {
        topic: &'a str,
        qos: QoS,
        packet_id: u16,
    },
    PingReq,
    PingResp,
    ConnAck {
        session_present: bool,
        return_code: u8,
    },
    PubAck {
        packet_id: u16,
    },
    SubAck {
        packet_id: u16,
        return_code: u8,
    },
    Disconnect,
}

impl<'a> Packet<'a> {
    /// Serializes the packet
    pub fn encode<const N: usize>(&self) -> Result<Vec<u8, N>, Error> {
        match *self {
            Packet::Connect {
                client_id,
                username,
                password,
                keep_alive,
            } => encode_connect(client_id, username, password, keep_alive),
            Packet::Publish {
                topic,
                payload,
                qos,
                retain,
                packet_id,
            } => encode_publish(topic, payload, qos, retain, packet_id),
            Packet::Subscribe { topic, qos, packet_id } => encode_subscribe(topic, qos, packet_id),
            Packet::PingReq => fixed(&encode_pingreq()),
            Packet::PingResp => fixed(&[PINGRESP, 0x00]),
            Packet::ConnAck {
                session_present,
                return_code,
            } => fixed(&[CONNACK, 0x02, session_present as u8, return_code]),
            Packet::PubAck { packet_id } => {
                let id = packet_id.to_be_bytes();
                fixed(&[PUBACK, 0x02, id[0], id[1]])
            }
            Packet::SubAck { packet_id, return_code } => {
                let id = packet_id.to_be_bytes();
                fixed(&[SUBACK, 0x03, id[0], id[1], return_code])
            }
            Packet::Disconnect => fixed(&encode_disconnect()),
        }
    }

    /// Parses a single packet received from the broker
    ///
    /// Only packets a client receives are supported. Inbound PUBLISH is limited to QoS 0.
    pub fn decode(bytes: &'a [u8]) -> Result<Self, Error> {
        let malformed = Error::Protocol(ProtocolError::MalformedPacket);
        let first = *bytes.first().ok_or(malformed)?;

        match first & 0xF0 {
            CONNACK => {
                decode_connack(bytes)?;
                Ok(Packet::ConnAck {
                    session_present: bytes[2] & 0x01 == 0x01,
                    return_code: bytes[3],
                })
            }
            PUBLISH => {
                if first & QOS_MASK != 0 {
                    return Err(Error::Protocol(ProtocolError::UnexpectedPacket));
                }

                let (topic, payload) = decode_publish(bytes).ok_or(malformed)?;
                Ok(Packet::Publish {
                    topic,
                    payload,
                    qos: QoS::AtMostOnce,
                    retain: first & RETAIN_FLAG == RETAIN_FLAG,
                    packet_id: None,
                })
            }
            PUBACK => {
                if bytes.len() < 4 || bytes[1] != 0x02 {
                    return Err(malformed);
                }

                Ok(Packet::PubAck {
                    packet_id: u16::from_be_bytes([bytes[2], bytes[3]]),
                })
            }
            SUBACK => {
                if bytes.len() < 5 || bytes[1] < 0x03 {
                    return Err(malformed);
                }

                Ok(Packet::SubAck {
                    packet_id: u16::from_be_bytes([bytes[2], bytes[3]]),
                    return_code: bytes[4],
                })
            }
            PINGRESP => {
                if bytes.len() < 2 || bytes[1] != 0x00 {
                    return Err(malformed);
                }

                Ok(Packet::PingResp)
            }
            _ => Err(Error::Protocol(ProtocolError::UnexpectedPacket)),
        }
    }
}

/// Encodes a CONNECT packet with clean session flag
///
/// Username and password are only included if present and non-empty.
pub fn encode_connect<const N: usize>(
    client_id: &str,
    username: Option<&str>,
    password: Option<&str>,
    keep_alive_s: u16,
) -> Result<Vec<u8, N>, Error> {
    let username = username.filter(|username| !username.is_empty());
    let password = password.filter(|password| !password.is_empty());

    let mut flags = CLEAN_SESSION;
    let mut remaining = 2 + PROTOCOL_NAME.len() + 1 + 1 + 2 + 2 + client_id.len();

    if let Some(username) = username {
        flags |= USERNAME_FLAG;
        remaining += 2 + username.len();
    }

    if let Some(password) = password {
        flags |= PASSWORD_FLAG;
        remaining += 2 + password.len();
    }

    let mut writer: Writer<N> = Writer::new();
    writer.u8(CONNECT)?;
    writer.remaining_length(remaining)?;
    writer.string(PROTOCOL_NAME)?;
    writer.u8(PROTOCOL_LEVEL)?;
    writer.u8(flags)?;
    writer.u16(keep_alive_s)?;
    writer.string(client_id.as_bytes())?;

    if let Some(username) = username {
        writer.string(username.as_bytes())?;
    }

    if let Some(password) = password {
        writer.string(password.as_bytes())?;
    }

    Ok(writer.finish())
}

/// Parses a CONNACK packet
pub fn decode_connack(bytes: &[u8]) -> Result<ConnAck, Error> {
    if bytes.len() < 4 || bytes[0] != CONNACK || bytes[1] != 0x02 {
        return Err(Error::Protocol(ProtocolError::MalformedPacket));
    }

    match bytes[3] {
        0x00 => Ok(ConnAck::Accepted),
        code => Ok(ConnAck::Refused(code)),
    }
}

/// Encodes a PUBLISH packet
///
/// A packet identifier is required for QoS > 0 and ignored for QoS 0.
pub fn encode_publish<const N: usize>(
    topic: &str,
    payload: &[u8],
    qos: QoS,
    retain: bool,
    packet_id: Option<u16>,
) -> Result<Vec<u8, N>, Error> {
    if topic.is_empty() {
        return Err(Error::InvalidParam);
    }

    let packet_id = match (qos, packet_id) {
        (QoS::AtMostOnce, _) => None,
        (_, Some(id)) if id != 0 => Some(id),
        _ => return Err(Error::InvalidParam),
    };

    let header = PUBLISH | ((qos as u8) << 1) | retain as u8;
    let id_length = if packet_id.is_some() { 2 } else { 0 };
    let remaining = 2 + topic.len() + id_length + payload.len();

    let mut writer: Writer<N> = Writer::new();
    writer.u8(header)?;
    writer.remaining_length(remaining)?;
    writer.string(topic.as_bytes())?;

    if let Some(id) = packet_id {
        writer.u16(id)?;
    }

    writer.bytes(payload)?;
    Ok(writer.finish())
}

/// Parses an inbound QoS 0 PUBLISH packet. Returns None for malformed packets.
pub fn decode_publish(bytes: &[u8]) -> Option<(&str, &[u8])> {
    if bytes.len() < 4 || bytes[0] & !RETAIN_FLAG != PUBLISH {
        return None;
    }

    let (remaining, length_bytes) = decode_remaining_length(&bytes[1..])?;
    let header = 1 + length_bytes;
    let total = header.checked_add(remaining)?;
    if bytes.len() < total {
        return None;
    }

    let body = &bytes[header..total];
    if body.len() < 2 {
        return None;
    }

    let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
    if topic_len == 0 || topic_len > MAX_TOPIC_LEN || 2 + topic_len > body.len() {
        return None;
    }

    let topic = core::str::from_utf8(&body[2..2 + topic_len]).ok()?;
    Some((topic, &body[2 + topic_len..]))
}

/// Encodes a SUBSCRIBE packet for a single topic filter
pub fn encode_subscribe<const N: usize>(topic: &str, qos: QoS, packet_id: u16) -> Result<Vec<u8, N>, Error> {
    if topic.is_empty() || packet_id == 0 {
        return Err(Error::InvalidParam);
    }

    let mut writer: Writer<N> = Writer::new();
    writer.u8(SUBSCRIBE)?;
    writer.remaining_length(2 + 2 + topic.len() + 1)?;
    writer.u16(packet_id)?;
    writer.string(topic.as_bytes())?;
    writer.u8(qos as u8)?;
    Ok(writer.finish())
}

pub const fn encode_pingreq() -> [u8; 2] {
    [PINGREQ, 0x00]
}

pub const fn encode_disconnect() -> [u8; 2] {
    [DISCONNECT, 0x00]
}

/// Returns true if PINGRESP occurs anywhere in the window
pub fn find_pingresp(window: &[u8]) -> bool {
    contains(window, &[PINGRESP, 0x00])
}

/// Locates a complete CONNACK packet in the window, either raw or wrapped in a `+IPD` frame
pub fn find_connack(window: &[u8]) -> Option<Range<usize>> {
    let start = find(window, &[CONNACK, 0x02])?;
    if window.len() < start + 4 {
        return None;
    }

    Some(start..start + 4)
}

/// Locates the PUBACK of the given packet identifier in the window
pub fn find_puback(window: &[u8], packet_id: u16) -> Option<Range<usize>> {
    let id = packet_id.to_be_bytes();
    find_range(window, &[PUBACK, 0x02, id[0], id[1]])
}

/// Encodes the remaining length (1 to 4 bytes)
pub fn encode_remaining_length(length: usize) -> Result<Vec<u8, 4>, Error> {
    let mut writer: Writer<4> = Writer::new();
    writer.remaining_length(length)?;
    Ok(writer.finish())
}

/// Decodes the remaining length. Returns the value and the number of bytes used.
pub fn decode_remaining_length(bytes: &[u8]) -> Option<(usize, usize)> {
    let mut value = 0;
    let mut multiplier = 1;

    for (index, byte) in bytes.iter().take(4).enumerate() {
        value += (byte & 0x7F) as usize * multiplier;
        if byte & 0x80 == 0 {
            return Some((value, index + 1));
        }

        multiplier *= 128;
    }

    None
}

/// Total length of the packet starting at the first byte, None if the header is incomplete
pub fn packet_len(bytes: &[u8]) -> Option<usize> {
    if bytes.is_empty() {
        return None;
    }

    let (remaining, length_bytes) = decode_remaining_length(&bytes[1..])?;
    Some(1 + length_bytes + remaining)
}

/// Copies a fixed size packet
fn fixed<const N: usize>(bytes: &[u8]) -> Result<Vec<u8, N>, Error> {
    Vec::from_slice(bytes).map_err(|_| Error::BufferOverflow)
}

/// Bounds checked packet writer
struct Writer<const N: usize> {
    buffer: Vec<u8, N>,
}

impl<const N: usize> Writer<N> {
    fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    fn u8(&mut self, byte: u8) -> Result<(), Error> {
        self.buffer.push(byte).map_err(|_| Error::BufferOverflow)
    }

    fn u16(&mut self, value: u16) -> Result<(), Error> {
        self.bytes(&value.to_be_bytes())
    }

    fn bytes(&mut self, data: &[u8]) -> Result<(), Error> {
        self.buffer.extend_from_slice(data).map_err(|_| Error::BufferOverflow)
    }

    /// Length prefixed string
    fn string(&mut self, data: &[u8]) -> Result<(), Error> {
        let length = u16::try_from(data.len()).map_err(|_| Error::InvalidParam)?;
        self.u16(length)?;
        self.bytes(data)
    }

    fn remaining_length(&mut self, mut length: usize) -> Result<(), Error> {
        if length > MAX_REMAINING_LENGTH {
            return Err(Error::InvalidParam);
        }

        loop {
            let mut byte = (length % 128) as u8;
            length /= 128;

            if length > 0 {
                byte |= 0x80;
            }

            self.u8(byte)?;

            if length == 0 {
                return Ok(());
            }
        }
    }

    fn finish(self) -> Vec<u8, N> {
        self.buffer
    }
}
