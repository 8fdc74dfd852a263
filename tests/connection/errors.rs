//! Tests for stream-scoped versus connection-fatal errors

use spdy_sans_io::h2_codec::frame_type;
use spdy_sans_io::{
    Config, ConnectionState, ErrorCode, Event, Frame, FrameCodec, H2Codec, Role, Version,
};

use super::{drain, handshake, pair, pair_with, pump, raw_h2, request};

/// Parse what a server connection wrote, as its peer would.
fn frames_from_server(bytes: &[u8]) -> Vec<Frame> {
    let mut codec = H2Codec::new();
    codec.set_preface_received(true);
    codec.process(bytes).unwrap()
}

#[test]
fn test_stream_error_keeps_connection() {
    let (mut client, mut server) = pair(Version::Http2);
    handshake(&mut client, &mut server);
    client.open_stream(request("/"), false, None).unwrap();
    pump(&mut client, &mut server);
    drain(&mut server);

    // WINDOW_UPDATE with a zero increment on stream 1
    server.recv(&raw_h2(frame_type::WINDOW_UPDATE, 0, 1, &[0, 0, 0, 0])).unwrap();

    let err = server.poll_error().unwrap();
    assert_eq!(err.code, ErrorCode::ProtocolError);
    assert_eq!(err.stream_id, Some(1));
    assert!(server.poll_error().is_none());
    assert_eq!(server.state(), ConnectionState::Active);
    assert_eq!(drain(&mut server), vec![Event::StreamClosed { stream_id: 1 }]);

    assert_eq!(
        frames_from_server(&server.take_pending_send()),
        vec![Frame::RstStream {
            stream_id: 1,
            code: ErrorCode::ProtocolError
        }]
    );
}

#[test]
fn test_connection_error_sends_goaway_and_fails_streams() {
    let (mut client, mut server) = pair(Version::Http2);
    handshake(&mut client, &mut server);
    client.open_stream(request("/a"), false, None).unwrap();
    client.open_stream(request("/b"), false, None).unwrap();
    pump(&mut client, &mut server);
    drain(&mut server);

    // SETTINGS on a stream
    let err = server.recv(&raw_h2(frame_type::SETTINGS, 0, 1, &[])).unwrap_err();
    assert_eq!(err.code, ErrorCode::ProtocolError);
    assert!(err.message.contains("stream id"));
    assert!(server.is_closed());

    let errors: Vec<_> = std::iter::from_fn(|| server.poll_error()).collect();
    let scopes: Vec<Option<u32>> = errors.iter().map(|e| e.stream_id).collect();
    assert_eq!(scopes, vec![Some(1), Some(3), None]);
    assert!(errors.iter().all(|e| e.code == ErrorCode::ProtocolError));

    let frames = frames_from_server(&server.take_pending_send());
    match &frames[..] {
        [Frame::GoAway {
            last_stream_id,
            code,
            debug,
        }] => {
            assert_eq!(*last_stream_id, 3);
            assert_eq!(*code, ErrorCode::ProtocolError);
            assert!(String::from_utf8_lossy(debug).contains("stream id"));
        }
        other => panic!("Expected GOAWAY, got {:?}", other),
    }

    // Closed connections ignore input and refuse work.
    server.recv(b"anything").unwrap();
    assert!(server.send_data(1, "x", true).is_err());
}

#[test]
fn test_data_on_idle_stream_is_fatal() {
    let (mut client, mut server) = pair(Version::Http2);
    handshake(&mut client, &mut server);
    let err = server.recv(&raw_h2(frame_type::DATA, 0, 5, b"abc")).unwrap_err();
    assert_eq!(err.code, ErrorCode::ProtocolError);
    assert!(err.message.contains("idle"));
}

#[test]
fn test_late_frames_on_recently_closed_stream_ignored() {
    let (mut client, mut server) = pair(Version::Http2);
    handshake(&mut client, &mut server);
    client.open_stream(request("/"), false, None).unwrap();
    pump(&mut client, &mut server);
    client.reset_stream(1, ErrorCode::Cancel).unwrap();
    pump(&mut client, &mut server);
    drain(&mut server);

    server.recv(&raw_h2(frame_type::DATA, 0, 1, b"late")).unwrap();
    server.recv(&raw_h2(frame_type::WINDOW_UPDATE, 0, 1, &[0, 0, 1, 0])).unwrap();
    assert!(server.poll_error().is_none());
    assert!(drain(&mut server).is_empty());
}

#[test]
fn test_late_frames_beyond_grace_are_stream_errors() {
    let (mut client, mut server) = pair_with(
        Config::new(Version::Http2, Role::Client),
        Config::new(Version::Http2, Role::Server).with_closed_stream_grace(0),
    );
    handshake(&mut client, &mut server);
    client.open_stream(request("/"), false, None).unwrap();
    pump(&mut client, &mut server);
    client.reset_stream(1, ErrorCode::Cancel).unwrap();
    pump(&mut client, &mut server);
    server.take_pending_send();

    server.recv(&raw_h2(frame_type::DATA, 0, 1, b"late")).unwrap();
    let err = server.poll_error().unwrap();
    assert_eq!(err.code, ErrorCode::StreamClosed);
    assert_eq!(err.stream_id, Some(1));
    assert!(!server.is_closed());
    assert_eq!(
        frames_from_server(&server.take_pending_send()),
        vec![Frame::RstStream {
            stream_id: 1,
            code: ErrorCode::StreamClosed
        }]
    );
}

#[test]
fn test_spdy_data_on_idle_stream_is_fatal() {
    let (mut client, mut server) = pair(Version::Spdy3);
    handshake(&mut client, &mut server);
    client.open_stream(request("/"), false, None).unwrap();
    client.open_stream(request("/"), false, None).unwrap();
    pump(&mut client, &mut server);
    drain(&mut server);

    // DATA on stream 9, which the client has not opened yet
    let data = [0, 0, 0, 9, 0, 0, 0, 1, b'x'];
    let err = server.recv(&data).unwrap_err();
    assert_eq!(err.code, ErrorCode::ProtocolError);
    assert!(server.is_closed());
    assert_eq!(client.active_streams(), 2);
}

#[test]
fn test_invalid_preface_is_fatal() {
    let (_, mut server) = pair(Version::Http2);
    let err = server.recv(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap_err();
    assert_eq!(err.code, ErrorCode::ProtocolError);
    assert!(err.message.contains("preface"));
    assert!(server.is_closed());
}
