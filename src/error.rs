//! Error types shared by all layers of the crate

/// Errors of the AT transport and the MQTT session
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Expected pattern or acknowledgement was not received within the deadline
    Timeout,

    /// Operation requires an established MQTT connection
    NotConnected,

    /// Malformed caller input, e.g. empty topic or a client id which is too long
    InvalidParam,

    /// Data does not fit in a fixed capacity buffer
    BufferOverflow,

    /// MQTT protocol violation or refusal
    Protocol(ProtocolError),

    /// Underlying AT command or serial transmission failed
    Transport(TransportError),

    /// Upstream timer error
    TimerError,
}

/// MQTT level errors
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    /// Broker refused the connection with the given CONNACK return code
    ConnectionRefused(u8),

    /// Packet header or body is not valid MQTT 3.1.1
    MalformedPacket,

    /// Valid packet, but not one a client expects to receive
    UnexpectedPacket,
}

/// Errors of the AT command layer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// TCP connect command (CIPSTART) failed
    OpenFailed,

    /// Preparing the transmission failed (CIPSEND command)
    SendPrepareFailed,

    /// Transmission of data failed
    SendFailed,

    /// ESP-AT confirmed receiving an unexpected byte count
    PartialSend,

    /// Socket close command failed
    CloseFailed,

    /// Writing to the serial port failed
    SerialWrite,

    /// Modem responded with ERROR
    CommandFailed,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Timeout => defmt::write!(f, "Error::Timeout"),
            Error::NotConnected => defmt::write!(f, "Error::NotConnected"),
            Error::InvalidParam => defmt::write!(f, "Error::InvalidParam"),
            Error::BufferOverflow => defmt::write!(f, "Error::BufferOverflow"),
            Error::Protocol(e) => defmt::write!(f, "Error::Protocol({})", e),
            Error::Transport(e) => defmt::write!(f, "Error::Transport({})", e),
            Error::TimerError => defmt::write!(f, "Error::TimerError"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ProtocolError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ProtocolError::ConnectionRefused(code) => defmt::write!(f, "ConnectionRefused({})", code),
            ProtocolError::MalformedPacket => defmt::write!(f, "MalformedPacket"),
            ProtocolError::UnexpectedPacket => defmt::write!(f, "UnexpectedPacket"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TransportError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            TransportError::OpenFailed => defmt::write!(f, "OpenFailed"),
            TransportError::SendPrepareFailed => defmt::write!(f, "SendPrepareFailed"),
            TransportError::SendFailed => defmt::write!(f, "SendFailed"),
            TransportError::PartialSend => defmt::write!(f, "PartialSend"),
            TransportError::CloseFailed => defmt::write!(f, "CloseFailed"),
            TransportError::SerialWrite => defmt::write!(f, "SerialWrite"),
            TransportError::CommandFailed => defmt::write!(f, "CommandFailed"),
        }
    }
}
