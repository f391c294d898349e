use crate::config::TimeoutClass;
use crate::error::{Error, TransportError};
use crate::ipd::find_unframed;
use crate::responses;
use crate::wifi::{AddressErrors, JoinError};
use core::ops::Range;
use heapless::String;
use numtoa::NumToA;

/// Max. length of a rendered command line
pub(crate) const COMMAND_SIZE: usize = 256;

/// Rendered command line without terminator
pub(crate) type CommandLine = String<COMMAND_SIZE>;

/// AT command processed by the engine
pub(crate) trait AtCommand {
    /// Substring terminating a successful response
    const EXPECTED: &'static str = "OK";

    /// Timeout class of the command
    const TIMEOUT: TimeoutClass = TimeoutClass::Short;

    /// Renders the command line
    fn render(&self) -> Result<CommandLine, Error>;

    /// Returns the range of the terminating match within the response. `+IPD` payloads are skipped.
    fn matches(&self, response: &[u8]) -> Option<Range<usize>> {
        find_unframed(response, Self::EXPECTED.as_bytes())
    }
}

/// Trait for mapping command errors
pub(crate) trait CommandErrorHandler {
    type Error;

    /// Maps an engine error, given the response received so far
    fn command_error(&self, error: Error, response: &[u8]) -> Self::Error;
}

/// Returns the range of the first failure indication, which terminates a command early
///
/// Indications inside `+IPD` payloads are TCP data and ignored.
pub(crate) fn failure(response: &[u8]) -> Option<Range<usize>> {
    let error = find_unframed(response, b"ERROR");
    let fail = find_unframed(response, b"FAIL");

    match (error, fail) {
        (Some(error), Some(fail)) if fail.start < error.start => Some(fail),
        (Some(error), _) => Some(error),
        (None, fail) => fail,
    }
}

/// True if the modem reported `needle` outside of `+IPD` payloads
fn reported(response: &[u8], needle: &[u8]) -> bool {
    find_unframed(response, needle).is_some()
}

/// True for errors caused by an unexpected or missing response
fn unanswered(error: Error) -> bool {
    matches!(error, Error::Timeout | Error::Transport(TransportError::CommandFailed))
}

/// Maps failed commands whose response contains an error indication to the given transport error
fn transport_error(error: Error, response: &[u8], kind: TransportError) -> Error {
    if unanswered(error) && (reported(response, b"ERROR") || reported(response, b"FAIL")) {
        return Error::Transport(kind);
    }

    error
}

/// Appends a decimal number
fn push_number(line: &mut CommandLine, number: u32) -> Result<(), Error> {
    let mut buffer = [0x0; 20];
    let digits = number.numtoa(10, &mut buffer);

    let digits = core::str::from_utf8(digits).map_err(|_| Error::InvalidParam)?;
    line.push_str(digits).map_err(|_| Error::BufferOverflow)
}

/// Appends a string
fn push(line: &mut CommandLine, value: &str) -> Result<(), Error> {
    line.push_str(value).map_err(|_| Error::BufferOverflow)
}

/// Appends a quoted string argument. Special characters are escaped by backslash as required by ESP-AT.
fn push_quoted(line: &mut CommandLine, value: &str) -> Result<(), Error> {
    push(line, "\"")?;

    for character in value.chars() {
        if matches!(character, '"' | ',' | '\\') {
            line.push('\\').map_err(|_| Error::BufferOverflow)?;
        }

        line.push(character).map_err(|_| Error::BufferOverflow)?;
    }

    push(line, "\"")
}

/// Renders a command without arguments
fn plain(command: &str) -> Result<CommandLine, Error> {
    let mut line = CommandLine::new();
    push(&mut line, command)?;
    Ok(line)
}

/// Tests if the modem is responsive
pub(crate) struct TestCommand;

impl AtCommand for TestCommand {
    fn render(&self) -> Result<CommandLine, Error> {
        plain("AT")
    }
}

impl CommandErrorHandler for TestCommand {
    type Error = Error;

    fn command_error(&self, error: Error, response: &[u8]) -> Self::Error {
        transport_error(error, response, TransportError::CommandFailed)
    }
}

/// Disables the command echo
pub(crate) struct EchoOffCommand;

impl AtCommand for EchoOffCommand {
    fn render(&self) -> Result<CommandLine, Error> {
        plain("ATE0")
    }
}

impl CommandErrorHandler for EchoOffCommand {
    type Error = Error;

    fn command_error(&self, error: Error, response: &[u8]) -> Self::Error {
        transport_error(error, response, TransportError::CommandFailed)
    }
}

/// Restarts the module and waits for the `ready` message
pub(crate) struct RestartCommand;

impl AtCommand for RestartCommand {
    const EXPECTED: &'static str = "ready";
    const TIMEOUT: TimeoutClass = TimeoutClass::Long;

    fn render(&self) -> Result<CommandLine, Error> {
        plain("AT+RST")
    }
}

impl CommandErrorHandler for RestartCommand {
    type Error = Error;

    fn command_error(&self, error: Error, response: &[u8]) -> Self::Error {
        transport_error(error, response, TransportError::CommandFailed)
    }
}

/// Sets the WIFI mode
pub(crate) struct WifiModeCommand {
    /// WIFI mode:
    ///     0: Null mode. Wi-Fi RF will be disabled.
    ///     1: Station mode.
    ///     2: SoftAP mode.
    ///     3: SoftAP+Station mode.
    mode: u32,
}

impl WifiModeCommand {
    pub fn station_mode() -> Self {
        Self { mode: 1 }
    }
}

impl AtCommand for WifiModeCommand {
    fn render(&self) -> Result<CommandLine, Error> {
        let mut line = plain("AT+CWMODE=")?;
        push_number(&mut line, self.mode)?;
        Ok(line)
    }
}

impl CommandErrorHandler for WifiModeCommand {
    type Error = JoinError;

    fn command_error(&self, error: Error, response: &[u8]) -> Self::Error {
        JoinError::ModeError(transport_error(error, response, TransportError::CommandFailed))
    }
}

/// Command for setting the target WIFI access point parameters
pub(crate) struct AccessPointConnectCommand<'a> {
    /// The SSID of the target access point
    ssid: &'a str,

    /// The password/key of the target access point
    password: &'a str,
}

impl<'a> AccessPointConnectCommand<'a> {
    pub fn new(ssid: &'a str, password: &'a str) -> Self {
        Self { ssid, password }
    }
}

impl AtCommand for AccessPointConnectCommand<'_> {
    const TIMEOUT: TimeoutClass = TimeoutClass::Long;

    fn render(&self) -> Result<CommandLine, Error> {
        let mut line = plain("AT+CWJAP=")?;
        push_quoted(&mut line, self.ssid)?;
        push(&mut line, ",")?;
        push_quoted(&mut line, self.password)?;
        Ok(line)
    }
}

impl CommandErrorHandler for AccessPointConnectCommand<'_> {
    type Error = JoinError;

    fn command_error(&self, error: Error, response: &[u8]) -> Self::Error {
        if let Some(code) = responses::join_failure_code(response) {
            return JoinError::Rejected(code);
        }

        JoinError::ConnectError(transport_error(error, response, TransportError::CommandFailed))
    }
}

/// Queries the local IP and MAC addresses
pub(crate) struct ObtainLocalAddressCommand;

impl AtCommand for ObtainLocalAddressCommand {
    fn render(&self) -> Result<CommandLine, Error> {
        plain("AT+CIFSR")
    }
}

impl CommandErrorHandler for ObtainLocalAddressCommand {
    type Error = AddressErrors;

    fn command_error(&self, error: Error, response: &[u8]) -> Self::Error {
        AddressErrors::CommandError(transport_error(error, response, TransportError::CommandFailed))
    }
}

/// Disables multiple connections, so `+IPD` frames carry no link id
pub(crate) struct SetSingleConnectionCommand;

impl AtCommand for SetSingleConnectionCommand {
    fn render(&self) -> Result<CommandLine, Error> {
        plain("AT+CIPMUX=0")
    }
}

impl CommandErrorHandler for SetSingleConnectionCommand {
    type Error = Error;

    fn command_error(&self, error: Error, response: &[u8]) -> Self::Error {
        transport_error(error, response, TransportError::CommandFailed)
    }
}

/// Establishes the TCP connection
pub(crate) struct ConnectCommand<'a> {
    /// Remote host name or IP address
    host: &'a str,

    /// Remote port
    port: u16,
}

impl<'a> ConnectCommand<'a> {
    pub fn tcp(host: &'a str, port: u16) -> Self {
        Self { host, port }
    }
}

impl AtCommand for ConnectCommand<'_> {
    const TIMEOUT: TimeoutClass = TimeoutClass::Medium;

    fn render(&self) -> Result<CommandLine, Error> {
        let mut line = plain("AT+CIPSTART=\"TCP\",")?;
        push_quoted(&mut line, self.host)?;
        push(&mut line, ",")?;
        push_number(&mut line, self.port as u32)?;
        Ok(line)
    }

    /// An open connection is reused
    fn matches(&self, response: &[u8]) -> Option<Range<usize>> {
        find_unframed(response, b"OK").or_else(|| find_unframed(response, b"ALREADY CONNECTED"))
    }
}

impl CommandErrorHandler for ConnectCommand<'_> {
    type Error = Error;

    fn command_error(&self, error: Error, response: &[u8]) -> Self::Error {
        if unanswered(error) && reported(response, b"CLOSED") {
            return Error::Transport(TransportError::OpenFailed);
        }

        transport_error(error, response, TransportError::OpenFailed)
    }
}

/// Announces the transmission of the given number of bytes. Responded by `OK` and the `>` prompt.
pub(crate) struct TransmissionPrepareCommand {
    length: usize,
}

impl TransmissionPrepareCommand {
    pub fn new(length: usize) -> Self {
        Self { length }
    }
}

impl AtCommand for TransmissionPrepareCommand {
    const EXPECTED: &'static str = ">";

    fn render(&self) -> Result<CommandLine, Error> {
        let length = u32::try_from(self.length).map_err(|_| Error::InvalidParam)?;

        let mut line = plain("AT+CIPSEND=")?;
        push_number(&mut line, length)?;
        Ok(line)
    }

    /// The prompt follows `OK` and optional blank lines
    fn matches(&self, response: &[u8]) -> Option<Range<usize>> {
        let ok = find_unframed(response, b"OK\r\n")?;
        let rest = &response[ok.end..];
        let blank = rest.iter().take_while(|byte| matches!(byte, b'\r' | b'\n')).count();

        match rest.get(blank) {
            Some(b'>') => Some(ok.start..ok.end + blank + 1),
            _ => None,
        }
    }
}

impl CommandErrorHandler for TransmissionPrepareCommand {
    type Error = Error;

    fn command_error(&self, error: Error, response: &[u8]) -> Self::Error {
        if unanswered(error) && reported(response, b"link is not valid") {
            return Error::Transport(TransportError::SendPrepareFailed);
        }

        transport_error(error, response, TransportError::SendPrepareFailed)
    }
}

/// Closes the TCP connection
pub(crate) struct CloseSocketCommand;

impl AtCommand for CloseSocketCommand {
    fn render(&self) -> Result<CommandLine, Error> {
        plain("AT+CIPCLOSE")
    }

    /// Close is also acknowledged by the CLOSED notification
    fn matches(&self, response: &[u8]) -> Option<Range<usize>> {
        find_unframed(response, b"OK").or_else(|| find_unframed(response, b"CLOSED"))
    }
}

impl CommandErrorHandler for CloseSocketCommand {
    type Error = Error;

    fn command_error(&self, error: Error, response: &[u8]) -> Self::Error {
        transport_error(error, response, TransportError::CloseFailed)
    }
}
