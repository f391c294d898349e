use crate::codec::{encode_connect, QoS};
use crate::error::{Error, ProtocolError, TransportError};
use crate::mqtt::{ConnectionState, Session};
use crate::tests::mock::{adapter, AdapterType, Clock, MockModem, MockedCommand};
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;

/// CONNECT of client c1 with 60s keep alive
const CONNECT: &[u8] = &[
    0x10, 0x0E, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x02, 0x00, 0x3C, 0x00, 0x02, b'c', b'1',
];

/// QoS 0 PUBLISH of `hello` to t/1
const PUBLISH: &[u8] = &[0x30, 0x0A, 0x00, 0x03, b't', b'/', b'1', b'h', b'e', b'l', b'l', b'o'];

const CONNACK_ACCEPTED: &[u8] = b"\r\n+IPD,4:\x20\x02\x00\x00";

type Messages = Rc<RefCell<Vec<(String, Vec<u8>)>>>;

/// Scripts the CIPSEND sequence of the given packet
fn expect_transmit(modem: &MockModem, packet: &[u8], response: &[&[u8]]) {
    let command = alloc::format!("AT+CIPSEND={}\r\n", packet.len());
    modem.expect(MockedCommand::new(command.as_bytes(), &[b"\r\nOK\r\n> "]));
    modem.expect(MockedCommand::new(packet, response));
}

/// Scripts a successful transmission confirmed by SEND OK
fn expect_send_ok(modem: &MockModem, packet: &[u8]) {
    let confirmation = alloc::format!("\r\nRecv {} bytes\r\n\r\nSEND OK\r\n", packet.len());
    expect_transmit(modem, packet, &[confirmation.as_bytes()]);
}

fn expect_connect(modem: &MockModem, connack: &[u8]) {
    modem.expect(MockedCommand::ok(b"AT+CIPMUX=0\r\n"));
    modem.expect(MockedCommand::new(
        b"AT+CIPSTART=\"TCP\",\"broker.local\",1883\r\n",
        &[b"CONNECT\r\n\r\nOK\r\n"],
    ));
    expect_transmit(modem, CONNECT, &[b"\r\nRecv 16 bytes\r\n\r\nSEND OK\r\n", connack]);
}

/// Adapter with an established MQTT session
fn connected() -> (AdapterType, MockModem, Clock) {
    let (mut adapter, modem, clock) = adapter();
    expect_connect(&modem, CONNACK_ACCEPTED);

    adapter.connect("broker.local", 1883, "c1", None, None).unwrap();
    modem.assert_all_cmds_sent();

    (adapter, modem, clock)
}

fn record_messages(adapter: &mut AdapterType) -> Messages {
    let messages: Messages = Rc::new(RefCell::new(Vec::new()));
    let sink = messages.clone();

    adapter.set_message_callback(move |topic, payload| {
        sink.borrow_mut().push((topic.to_string(), payload.to_vec()));
    });

    messages
}

#[test]
fn test_connect_correct_commands() {
    let (adapter, modem, _) = connected();

    assert_eq!(ConnectionState::Connected, adapter.connection_state());
    assert!(adapter.is_connected());
    assert_eq!("broker.local", adapter.session.broker_host.as_str());
    assert_eq!(1883, adapter.session.broker_port);
    assert_eq!("c1", adapter.session.client_id.as_str());
    assert!(modem.written().ends_with(CONNECT));
}

#[test]
fn test_connect_credentials_and_keep_alive() {
    let (mut adapter, modem, _) = adapter();
    adapter.set_keep_alive(30);

    let packet = encode_connect::<64>("c1", Some("user"), Some("pw"), 30).unwrap();
    modem.expect(MockedCommand::ok(b"AT+CIPMUX=0\r\n"));
    modem.expect(MockedCommand::ok(b"AT+CIPSTART=\"TCP\",\"broker.local\",1883\r\n"));
    expect_transmit(&modem, &packet, &[b"\r\nSEND OK\r\n", CONNACK_ACCEPTED]);

    adapter
        .connect("broker.local", 1883, "c1", Some("user"), Some("pw"))
        .unwrap();
    modem.assert_all_cmds_sent();
}

#[test]
fn test_connect_connack_split_frame() {
    let (mut adapter, modem, _) = adapter();
    modem.expect(MockedCommand::ok(b"AT+CIPMUX=0\r\n"));
    modem.expect(MockedCommand::ok(b"AT+CIPSTART=\"TCP\",\"broker.local\",1883\r\n"));
    expect_transmit(
        &modem,
        CONNECT,
        &[b"\r\nSEND OK\r\n", b"\r\n+IPD,4:\x20\x02", b"\x00\x00"],
    );

    adapter.connect("broker.local", 1883, "c1", None, None).unwrap();
    assert!(adapter.is_connected());
}

#[test]
fn test_connect_refused() {
    let (mut adapter, modem, _) = adapter();
    expect_connect(&modem, b"\r\n+IPD,4:\x20\x02\x00\x05");
    modem.expect(MockedCommand::new(b"AT+CIPCLOSE\r\n", &[b"CLOSED\r\n\r\nOK\r\n"]));

    let result = adapter.connect("broker.local", 1883, "c1", None, None);
    assert_eq!(Error::Protocol(ProtocolError::ConnectionRefused(5)), result.unwrap_err());
    assert_eq!(ConnectionState::Disconnected, adapter.connection_state());
    assert!(adapter.session.broker_host.is_empty());
    modem.assert_all_cmds_sent();
}

#[test]
fn test_connect_connack_timeout() {
    let (mut adapter, modem, clock) = adapter();
    expect_connect(&modem, b"");
    modem.expect(MockedCommand::new(b"AT+CIPCLOSE\r\n", &[b"CLOSED\r\n\r\nOK\r\n"]));

    let result = adapter.connect("broker.local", 1883, "c1", None, None);
    assert_eq!(Error::Timeout, result.unwrap_err());
    assert_eq!(ConnectionState::Disconnected, adapter.connection_state());
    assert!(clock.now() >= 10_000);
    modem.assert_all_cmds_sent();
}

#[test]
fn test_connect_tcp_open_failed() {
    let (mut adapter, modem, _) = adapter();
    modem.expect(MockedCommand::ok(b"AT+CIPMUX=0\r\n"));
    modem.expect(MockedCommand::new(
        b"AT+CIPSTART=\"TCP\",\"broker.local\",1883\r\n",
        &[b"\r\nERROR\r\nCLOSED\r\n"],
    ));

    let result = adapter.connect("broker.local", 1883, "c1", None, None);
    assert_eq!(Error::Transport(TransportError::OpenFailed), result.unwrap_err());
    assert_eq!(ConnectionState::Disconnected, adapter.connection_state());
}

#[test]
fn test_connect_single_connection_mode_error() {
    let (mut adapter, modem, _) = adapter();
    modem.expect(MockedCommand::error(b"AT+CIPMUX=0\r\n"));

    let result = adapter.connect("broker.local", 1883, "c1", None, None);
    assert_eq!(Error::Transport(TransportError::CommandFailed), result.unwrap_err());
    assert!(!adapter.session.single_connection_enabled);
}

#[test]
fn test_connect_already_connected_accepted() {
    let (mut adapter, modem, _) = adapter();
    modem.expect(MockedCommand::ok(b"AT+CIPMUX=0\r\n"));
    modem.expect(MockedCommand::new(
        b"AT+CIPSTART=\"TCP\",\"broker.local\",1883\r\n",
        &[b"ALREADY CONNECTED\r\n\r\nERROR\r\n"],
    ));
    expect_transmit(&modem, CONNECT, &[b"\r\nSEND OK\r\n", CONNACK_ACCEPTED]);

    adapter.connect("broker.local", 1883, "c1", None, None).unwrap();
    assert!(adapter.is_connected());
}

#[test]
fn test_connect_single_connection_mode_enabled_once() {
    let (mut adapter, modem, _) = connected();

    expect_send_ok(&modem, &[0xE0, 0x00]);
    modem.expect(MockedCommand::ok(b"AT+CIPCLOSE\r\n"));
    adapter.disconnect().unwrap();

    modem.expect(MockedCommand::ok(b"AT+CIPSTART=\"TCP\",\"broker.local\",1883\r\n"));
    expect_transmit(&modem, CONNECT, &[b"\r\nSEND OK\r\n", CONNACK_ACCEPTED]);

    adapter.connect("broker.local", 1883, "c1", None, None).unwrap();
    assert!(adapter.is_connected());
    assert_eq!(1, modem.written_string().matches("AT+CIPMUX=0").count());
}

#[test]
fn test_connect_closes_previous_session() {
    let (mut adapter, modem, _) = connected();

    expect_send_ok(&modem, &[0xE0, 0x00]);
    modem.expect(MockedCommand::ok(b"AT+CIPCLOSE\r\n"));
    modem.expect(MockedCommand::ok(b"AT+CIPSTART=\"TCP\",\"broker.local\",1883\r\n"));
    expect_transmit(&modem, CONNECT, &[b"\r\nSEND OK\r\n", CONNACK_ACCEPTED]);

    adapter.connect("broker.local", 1883, "c1", None, None).unwrap();
    assert!(adapter.is_connected());
    modem.assert_all_cmds_sent();
}

#[test]
fn test_connect_invalid_params() {
    let (mut adapter, modem, _) = adapter();
    let long_host: String = core::iter::repeat('h').take(65).collect();
    let long_id: String = core::iter::repeat('c').take(33).collect();

    assert_eq!(
        Error::InvalidParam,
        adapter.connect("", 1883, "c1", None, None).unwrap_err()
    );
    assert_eq!(
        Error::InvalidParam,
        adapter.connect(&long_host, 1883, "c1", None, None).unwrap_err()
    );
    assert_eq!(
        Error::InvalidParam,
        adapter.connect("broker.local", 1883, "", None, None).unwrap_err()
    );
    assert_eq!(
        Error::InvalidParam,
        adapter.connect("broker.local", 1883, &long_id, None, None).unwrap_err()
    );

    assert!(modem.written().is_empty());
}

#[test]
fn test_connect_packet_too_large() {
    let (mut adapter, modem, _) = adapter();
    let password: String = core::iter::repeat('p').take(300).collect();

    let result = adapter.connect("broker.local", 1883, "c1", None, Some(&password));
    assert_eq!(Error::BufferOverflow, result.unwrap_err());
    assert!(modem.written().is_empty());
}

#[test]
fn test_publish_qos0() {
    let (mut adapter, modem, _) = connected();
    expect_send_ok(&modem, PUBLISH);

    adapter.publish("t/1", b"hello", QoS::AtMostOnce, false).unwrap();
    assert!(modem.written().ends_with(PUBLISH));
    modem.assert_all_cmds_sent();
}

#[test]
fn test_publish_qos1_acknowledged() {
    let (mut adapter, modem, _) = connected();

    let first = [
        0x32, 0x0C, 0x00, 0x03, b't', b'/', b'1', 0x00, 0x01, b'h', b'e', b'l', b'l', b'o',
    ];
    expect_transmit(
        &modem,
        &first,
        &[b"\r\nRecv 14 bytes\r\n\r\nSEND OK\r\n", b"\r\n+IPD,4:\x40\x02\x00\x01"],
    );

    let second = [
        0x32, 0x0C, 0x00, 0x03, b't', b'/', b'1', 0x00, 0x02, b'h', b'e', b'l', b'l', b'o',
    ];
    expect_transmit(
        &modem,
        &second,
        &[b"\r\nRecv 14 bytes\r\n\r\nSEND OK\r\n", b"\r\n+IPD,4:\x40\x02\x00\x02"],
    );

    adapter.publish("t/1", b"hello", QoS::AtLeastOnce, false).unwrap();
    adapter.publish("t/1", b"hello", QoS::AtLeastOnce, false).unwrap();
    modem.assert_all_cmds_sent();

    // Acknowledgements are only logged by poll
    assert_eq!(0, adapter.poll().unwrap());
}

#[test]
fn test_publish_qos1_missing_puback() {
    let (mut adapter, modem, clock) = connected();

    let packet = [
        0x32, 0x0C, 0x00, 0x03, b't', b'/', b'1', 0x00, 0x01, b'h', b'e', b'l', b'l', b'o',
    ];
    expect_send_ok(&modem, &packet);

    let start = clock.now();
    adapter.publish("t/1", b"hello", QoS::AtLeastOnce, false).unwrap();
    assert!(clock.now() - start >= 2_000);
}

#[test]
fn test_publish_invalid_params() {
    let (mut adapter, modem, _) = connected();
    let written = modem.written().len();

    assert_eq!(
        Error::InvalidParam,
        adapter.publish("", b"x", QoS::AtMostOnce, false).unwrap_err()
    );
    assert_eq!(
        Error::InvalidParam,
        adapter.publish("a/+/c", b"x", QoS::AtMostOnce, false).unwrap_err()
    );
    assert_eq!(
        Error::InvalidParam,
        adapter.publish("a/#", b"x", QoS::AtMostOnce, false).unwrap_err()
    );
    assert_eq!(
        Error::InvalidParam,
        adapter.publish("t/1", b"x", QoS::ExactlyOnce, false).unwrap_err()
    );

    assert_eq!(written, modem.written().len());
}

#[test]
fn test_publish_payload_too_large() {
    let (mut adapter, _, _) = connected();

    let payload = [0x0; 300];
    let result = adapter.publish("t/1", &payload, QoS::AtMostOnce, false);
    assert_eq!(Error::BufferOverflow, result.unwrap_err());
}

#[test]
fn test_publish_send_fail() {
    let (mut adapter, modem, _) = connected();
    expect_transmit(&modem, PUBLISH, &[b"\r\nSEND FAIL\r\n"]);

    let result = adapter.publish("t/1", b"hello", QoS::AtMostOnce, false);
    assert_eq!(Error::Transport(TransportError::SendFailed), result.unwrap_err());
    assert!(adapter.is_connected());
}

#[test]
fn test_publish_send_error() {
    let (mut adapter, modem, _) = connected();
    expect_transmit(&modem, PUBLISH, &[b"\r\nERROR\r\n"]);

    let result = adapter.publish("t/1", b"hello", QoS::AtMostOnce, false);
    assert_eq!(Error::Transport(TransportError::SendFailed), result.unwrap_err());
}

#[test]
fn test_publish_send_timeout() {
    let (mut adapter, modem, _) = connected();
    expect_transmit(&modem, PUBLISH, &[]);

    let result = adapter.publish("t/1", b"hello", QoS::AtMostOnce, false);
    assert_eq!(Error::Timeout, result.unwrap_err());
}

#[test]
fn test_publish_partial_send() {
    let (mut adapter, modem, _) = connected();
    expect_transmit(&modem, PUBLISH, &[b"\r\nRecv 10 bytes\r\n\r\nSEND OK\r\n"]);

    let result = adapter.publish("t/1", b"hello", QoS::AtMostOnce, false);
    assert_eq!(Error::Transport(TransportError::PartialSend), result.unwrap_err());
}

#[test]
fn test_publish_link_not_valid() {
    let (mut adapter, modem, _) = connected();
    modem.expect(MockedCommand::new(
        b"AT+CIPSEND=12\r\n",
        &[b"link is not valid\r\n\r\nERROR\r\n"],
    ));

    let result = adapter.publish("t/1", b"hello", QoS::AtMostOnce, false);
    assert_eq!(Error::Transport(TransportError::SendPrepareFailed), result.unwrap_err());
    assert_eq!(ConnectionState::Disconnected, adapter.connection_state());
}

#[test]
fn test_operations_require_connection() {
    let (mut adapter, modem, _) = adapter();

    assert_eq!(
        Error::NotConnected,
        adapter.publish("t/1", b"x", QoS::AtMostOnce, false).unwrap_err()
    );
    assert_eq!(
        Error::NotConnected,
        adapter.subscribe("t/1", QoS::AtMostOnce).unwrap_err()
    );
    assert_eq!(Error::NotConnected, adapter.ping().unwrap_err());
    assert_eq!(Error::NotConnected, adapter.poll().unwrap_err());

    assert!(modem.written().is_empty());
}

#[test]
fn test_subscribe() {
    let (mut adapter, modem, _) = connected();
    let packet = [0x82, 0x08, 0x00, 0x01, 0x00, 0x03, b'a', b'/', b'b', 0x00];
    expect_send_ok(&modem, &packet);

    adapter.subscribe("a/b", QoS::AtMostOnce).unwrap();
    modem.assert_all_cmds_sent();

    modem.receive(b"\r\n+IPD,5:\x90\x03\x00\x01\x00");
    assert_eq!(0, adapter.poll().unwrap());
}

#[test]
fn test_subscribe_empty_topic() {
    let (mut adapter, _, _) = connected();
    assert_eq!(
        Error::InvalidParam,
        adapter.subscribe("", QoS::AtMostOnce).unwrap_err()
    );
}

#[test]
fn test_ping() {
    let (mut adapter, modem, _) = connected();
    expect_transmit(
        &modem,
        &[0xC0, 0x00],
        &[b"\r\nRecv 2 bytes\r\n\r\nSEND OK\r\n", b"\r\n+IPD,2:\xD0\x00"],
    );

    adapter.ping().unwrap();
    modem.assert_all_cmds_sent();
}

#[test]
fn test_ping_missing_pingresp() {
    let (mut adapter, modem, clock) = connected();
    expect_send_ok(&modem, &[0xC0, 0x00]);

    let start = clock.now();
    adapter.ping().unwrap();
    assert!(clock.now() - start >= 2_000);
}

#[test]
fn test_disconnect() {
    let (mut adapter, modem, _) = connected();
    expect_send_ok(&modem, &[0xE0, 0x00]);
    modem.expect(MockedCommand::new(b"AT+CIPCLOSE\r\n", &[b"CLOSED\r\n\r\nOK\r\n"]));

    adapter.disconnect().unwrap();
    assert_eq!(ConnectionState::Disconnected, adapter.connection_state());
    assert!(adapter.session.client_id.is_empty());
    modem.assert_all_cmds_sent();
}

#[test]
fn test_disconnect_acknowledged_by_closed() {
    let (mut adapter, modem, _) = connected();
    expect_send_ok(&modem, &[0xE0, 0x00]);
    modem.expect(MockedCommand::new(b"AT+CIPCLOSE\r\n", &[b"CLOSED\r\n"]));

    adapter.disconnect().unwrap();
    assert_eq!(ConnectionState::Disconnected, adapter.connection_state());
}

#[test]
fn test_disconnect_timeout() {
    let (mut adapter, modem, _) = connected();
    expect_send_ok(&modem, &[0xE0, 0x00]);
    modem.expect(MockedCommand::silent(b"AT+CIPCLOSE\r\n"));

    assert_eq!(Error::Timeout, adapter.disconnect().unwrap_err());
    assert_eq!(ConnectionState::Disconnected, adapter.connection_state());
}

#[test]
fn test_disconnect_close_error() {
    let (mut adapter, modem, _) = connected();
    expect_send_ok(&modem, &[0xE0, 0x00]);
    modem.expect(MockedCommand::error(b"AT+CIPCLOSE\r\n"));

    assert_eq!(
        Error::Transport(TransportError::CloseFailed),
        adapter.disconnect().unwrap_err()
    );
    assert_eq!(ConnectionState::Disconnected, adapter.connection_state());
}

#[test]
fn test_disconnect_without_session() {
    let (mut adapter, modem, _) = adapter();
    modem.expect(MockedCommand::ok(b"AT+CIPCLOSE\r\n"));

    adapter.disconnect().unwrap();
    assert_eq!("AT+CIPCLOSE\r\n", modem.written_string());
}

#[test]
fn test_poll_delivers_message() {
    let (mut adapter, modem, _) = connected();
    let messages = record_messages(&mut adapter);

    modem.receive(b"\r\n+IPD,12:\x30\x0A\x00\x03t/1hello");
    assert_eq!(1, adapter.poll().unwrap());

    let messages = messages.borrow();
    assert_eq!(1, messages.len());
    assert_eq!("t/1", messages[0].0);
    assert_eq!(b"hello", messages[0].1.as_slice());
}

#[test]
fn test_poll_nothing_received() {
    let (mut adapter, _, _) = connected();
    let messages = record_messages(&mut adapter);

    // CONNACK salvaged during connect is only logged
    assert_eq!(0, adapter.poll().unwrap());
    assert_eq!(0, adapter.poll().unwrap());
    assert!(messages.borrow().is_empty());
}

#[test]
fn test_poll_without_callback() {
    let (mut adapter, modem, _) = connected();

    modem.receive(b"\r\n+IPD,12:\x30\x0A\x00\x03t/1hello");
    assert_eq!(0, adapter.poll().unwrap());
}

#[test]
fn test_poll_frame_split_across_polls() {
    let (mut adapter, modem, _) = connected();
    let messages = record_messages(&mut adapter);

    modem.receive(b"\r\n+IPD,12:\x30\x0A\x00\x03t/");
    assert_eq!(0, adapter.poll().unwrap());

    modem.receive(b"1hello");
    assert_eq!(1, adapter.poll().unwrap());
    assert_eq!("t/1", messages.borrow()[0].0);
}

#[test]
fn test_poll_back_to_back_frames() {
    let (mut adapter, modem, _) = connected();
    let messages = record_messages(&mut adapter);

    modem.receive(b"\r\n+IPD,7:\x30\x05\x00\x01ax1\r\n+IPD,7:\x30\x05\x00\x01bx2");
    assert_eq!(2, adapter.poll().unwrap());

    let messages = messages.borrow();
    assert_eq!(("a".to_string(), b"x1".to_vec()), messages[0]);
    assert_eq!(("b".to_string(), b"x2".to_vec()), messages[1]);
}

#[test]
fn test_poll_multiple_packets_in_one_frame() {
    let (mut adapter, modem, _) = connected();
    let messages = record_messages(&mut adapter);

    modem.receive(b"\r\n+IPD,16:\x30\x05\x00\x01ax1\xD0\x00\x30\x05\x00\x01bx2");
    assert_eq!(2, adapter.poll().unwrap());
    assert_eq!(2, messages.borrow().len());
}

#[test]
fn test_poll_malformed_packet_dropped() {
    let (mut adapter, modem, _) = connected();
    let messages = record_messages(&mut adapter);

    modem.receive(b"\r\n+IPD,4:\x30\x02\x00\x00\r\n+IPD,7:\x30\x05\x00\x01ax1");
    assert_eq!(1, adapter.poll().unwrap());
    assert_eq!("a", messages.borrow()[0].0);
}

#[test]
fn test_poll_malformed_header_skipped() {
    let (mut adapter, modem, _) = connected();
    let messages = record_messages(&mut adapter);

    modem.receive(b"\r\n+IPD,x:\r\n+IPD,7:\x30\x05\x00\x01ax1");
    assert_eq!(1, adapter.poll().unwrap());
    assert_eq!(1, messages.borrow().len());
}

#[test]
fn test_poll_qos1_message_dropped() {
    let (mut adapter, modem, _) = connected();
    let messages = record_messages(&mut adapter);

    modem.receive(b"\r\n+IPD,9:\x32\x07\x00\x01a\x00\x01x1");
    assert_eq!(0, adapter.poll().unwrap());
    assert!(messages.borrow().is_empty());
}

#[test]
fn test_poll_remote_close() {
    let (mut adapter, modem, _) = connected();

    modem.receive(b"\r\nCLOSED\r\n");
    assert_eq!(0, adapter.poll().unwrap());
    assert_eq!(ConnectionState::Disconnected, adapter.connection_state());

    assert_eq!(
        Error::NotConnected,
        adapter.publish("t/1", b"hello", QoS::AtMostOnce, false).unwrap_err()
    );
}

#[test]
fn test_poll_message_before_remote_close() {
    let (mut adapter, modem, _) = connected();
    let messages = record_messages(&mut adapter);

    modem.receive(b"\r\n+IPD,7:\x30\x05\x00\x01ax1\r\nCLOSED\r\n");
    assert_eq!(1, adapter.poll().unwrap());
    assert_eq!(1, messages.borrow().len());
    assert!(!adapter.is_connected());
}

#[test]
fn test_poll_receive_overflow() {
    let (mut adapter, modem, _) = connected();

    modem.receive(&[b'x'; 600]);
    assert_eq!(Error::BufferOverflow, adapter.poll().unwrap_err());

    assert_eq!(0, adapter.poll().unwrap());
    assert!(adapter.is_connected());
}

#[test]
fn test_message_received_before_command_kept() {
    let (mut adapter, modem, _) = connected();
    let messages = record_messages(&mut adapter);

    modem.receive(b"\r\n+IPD,12:\x30\x0A\x00\x03t/1hello");
    expect_send_ok(&modem, PUBLISH);
    adapter.publish("t/1", b"hello", QoS::AtMostOnce, false).unwrap();

    assert_eq!(1, adapter.poll().unwrap());
    assert_eq!(b"hello", messages.borrow()[0].1.as_slice());
}

#[test]
fn test_message_received_during_command_kept() {
    let (mut adapter, modem, _) = connected();
    let messages = record_messages(&mut adapter);

    expect_transmit(
        &modem,
        PUBLISH,
        &[b"\r\nRecv 12 bytes\r\n\r\nSEND OK\r\n\r\n+IPD,7:\x30\x05\x00\x01ax1"],
    );
    adapter.publish("t/1", b"hello", QoS::AtMostOnce, false).unwrap();

    assert_eq!(1, adapter.poll().unwrap());
    assert_eq!("a", messages.borrow()[0].0);
}

#[test]
fn test_packet_id_wraps_to_one() {
    let mut session = Session::new(60);
    assert_eq!(1, session.next_packet_id());
    assert_eq!(2, session.next_packet_id());

    session.next_packet_id = u16::MAX;
    assert_eq!(u16::MAX, session.next_packet_id());
    assert_eq!(1, session.next_packet_id());
}

#[test]
fn test_session_reset_keeps_configuration() {
    let mut session = Session::new(30);
    session.state = ConnectionState::Connected;
    session.single_connection_enabled = true;
    session.next_packet_id = 17;

    session.reset();
    assert_eq!(ConnectionState::Disconnected, session.state);
    assert_eq!(1, session.next_packet_id);
    assert_eq!(30, session.keep_alive_s);
    assert!(session.single_connection_enabled);
}

#[test]
fn test_connect_connack_before_send_ok() {
    let (mut adapter, modem, _) = adapter();
    modem.expect(MockedCommand::ok(b"AT+CIPMUX=0\r\n"));
    modem.expect(MockedCommand::ok(b"AT+CIPSTART=\"TCP\",\"broker.local\",1883\r\n"));
    expect_transmit(
        &modem,
        CONNECT,
        &[b"\r\nRecv 16 bytes\r\n\r\n+IPD,4:\x20\x02\x00\x00\r\nSEND OK\r\n"],
    );

    adapter.connect("broker.local", 1883, "c1", None, None).unwrap();
    assert!(adapter.is_connected());
    modem.assert_all_cmds_sent();
}

#[test]
fn test_ping_pingresp_before_send_ok() {
    let (mut adapter, modem, clock) = connected();
    expect_transmit(
        &modem,
        &[0xC0, 0x00],
        &[b"\r\nRecv 2 bytes\r\n\r\n+IPD,2:\xD0\x00\r\nSEND OK\r\n"],
    );

    let start = clock.now();
    adapter.ping().unwrap();
    assert!(clock.now() - start < 2_000);
}

#[test]
fn test_publish_prompt_inside_received_payload() {
    let (mut adapter, modem, _) = connected();
    let messages = record_messages(&mut adapter);
    modem.expect(MockedCommand::new(
        b"AT+CIPSEND=12\r\n",
        &[b"\r\n+IPD,8:\x30\x06\x00\x01a>>>", b"\r\nERROR\r\n"],
    ));

    let result = adapter.publish("t/1", b"hello", QoS::AtMostOnce, false);
    assert_eq!(Error::Transport(TransportError::SendPrepareFailed), result.unwrap_err());
    assert!(modem.written_string().ends_with("AT+CIPSEND=12\r\n"));

    assert_eq!(1, adapter.poll().unwrap());
    assert_eq!(("a".to_string(), b">>>".to_vec()), messages.borrow()[0]);
}

#[test]
fn test_publish_error_inside_received_payload() {
    let (mut adapter, modem, _) = connected();
    let messages = record_messages(&mut adapter);
    modem.expect(MockedCommand::new(
        b"AT+CIPSEND=12\r\n",
        &[b"\r\n+IPD,10:\x30\x08\x00\x01aERROR", b"\r\nOK\r\n> "],
    ));
    modem.expect(MockedCommand::new(PUBLISH, &[b"\r\nRecv 12 bytes\r\n\r\nSEND OK\r\n"]));

    adapter.publish("t/1", b"hello", QoS::AtMostOnce, false).unwrap();
    assert!(modem.written().ends_with(PUBLISH));

    assert_eq!(1, adapter.poll().unwrap());
    assert_eq!(b"ERROR", messages.borrow()[0].1.as_slice());
}

#[test]
fn test_receive_overflow_during_publish_reported_by_poll() {
    let (mut adapter, modem, _) = connected();

    modem.receive(&[b'x'; 600]);
    expect_send_ok(&modem, PUBLISH);
    adapter.publish("t/1", b"hello", QoS::AtMostOnce, false).unwrap();

    assert_eq!(Error::BufferOverflow, adapter.poll().unwrap_err());
    assert_eq!(0, adapter.poll().unwrap());
    assert!(adapter.is_connected());
}
