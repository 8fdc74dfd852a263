//! Tests for connection and stream flow control

use spdy_sans_io::h2_codec::frame_type;
use spdy_sans_io::{Config, ErrorCode, Event, Role, SettingId, Settings, Version};

use super::{drain, handshake, pair, pair_with, pump, raw_h2, request, response};

/// Serve a 100 000 byte body with trailers and collect what the client sees.
fn transfer(version: Version) -> Vec<Event> {
    let (mut client, mut server) = pair(version);
    handshake(&mut client, &mut server);
    client.open_stream(request("/large"), true, None).unwrap();
    pump(&mut client, &mut server);

    server.send_headers(1, response("200"), false).unwrap();
    server.send_data(1, vec![7u8; 100_000], false).unwrap();
    server
        .send_headers(1, spdy_sans_io::Headers::new().with("x-checksum", "abc"), true)
        .unwrap();

    // The first flush stops at the initial 65 535 byte window.
    let first = server.take_pending_send();
    assert_eq!(server.available_window(0), 0);
    assert_eq!(server.queued_bytes(1), 100_000 - 65_535);
    client.recv(&first).unwrap();

    let mut events = drain(&mut client);
    for _ in 0..4 {
        pump(&mut client, &mut server);
        pump(&mut server, &mut client);
        events.extend(drain(&mut client));
    }
    events
}

#[test]
fn test_body_larger_than_window_waits_for_updates() {
    for version in [Version::Http2, Version::Spdy3] {
        let events = transfer(version);
        let body: usize = events
            .iter()
            .map(|e| match e {
                Event::Data { data, .. } => data.len(),
                _ => 0,
            })
            .sum();
        assert_eq!(body, 100_000, "{:?}", version);

        let tail = &events[events.len() - 2..];
        match &tail[0] {
            Event::Headers(h) => {
                assert!(h.fin);
                assert_eq!(h.headers.get("x-checksum"), Some("abc"));
            }
            other => panic!("Expected trailers, got {:?}", other),
        }
        assert_eq!(tail[1], Event::StreamClosed { stream_id: 1 });
    }
}

#[test]
fn test_data_frames_respect_max_frame_size() {
    let (mut client, mut server) = pair(Version::Http2);
    handshake(&mut client, &mut server);
    client.open_stream(request("/"), true, None).unwrap();
    pump(&mut client, &mut server);
    server.send_headers(1, response("200"), false).unwrap();
    server.send_data(1, vec![0u8; 40_000], true).unwrap();
    pump(&mut server, &mut client);

    let sizes: Vec<usize> = drain(&mut client)
        .iter()
        .filter_map(|e| match e {
            Event::Data { data, .. } => Some(data.len()),
            _ => None,
        })
        .collect();
    assert_eq!(sizes, vec![16_384, 16_384, 7_232]);
}

#[test]
fn test_larger_initial_window_is_advertised() {
    let (mut client, mut server) = pair_with(
        Config::new(Version::Http2, Role::Client).with_initial_window_size(1 << 20),
        Config::new(Version::Http2, Role::Server),
    );
    handshake(&mut client, &mut server);
    assert_eq!(server.available_window(0), 1 << 20);

    client.open_stream(request("/"), true, None).unwrap();
    pump(&mut client, &mut server);
    assert_eq!(server.available_window(1), 1 << 20);
}

#[test]
fn test_settings_update_resizes_open_streams() {
    let (mut client, mut server) = pair(Version::Http2);
    handshake(&mut client, &mut server);
    client.open_stream(request("/"), false, None).unwrap();
    pump(&mut client, &mut server);
    drain(&mut server);
    assert_eq!(server.available_window(1), 65_535);

    let settings = Settings::new(Version::Http2).with(SettingId::InitialWindowSize, 100_000);
    client.update_settings(settings).unwrap();
    pump(&mut client, &mut server);
    assert_eq!(server.available_window(1), 100_000);

    let events = drain(&mut server);
    match &events[..] {
        [Event::Settings(s)] => assert_eq!(s.get(SettingId::InitialWindowSize), Some(100_000)),
        other => panic!("Expected settings, got {:?}", other),
    }
    pump(&mut server, &mut client);
    assert_eq!(drain(&mut client), vec![Event::SettingsAcknowledged]);
}

#[test]
fn test_smaller_window_applies_after_ack() {
    let (mut client, mut server) = pair(Version::Http2);
    handshake(&mut client, &mut server);
    client.open_stream(request("/"), true, None).unwrap();
    pump(&mut client, &mut server);
    drain(&mut server);

    server.send_headers(1, response("200"), false).unwrap();
    server.send_data(1, vec![1u8; 5_000], false).unwrap();
    let in_flight = server.take_pending_send();

    // The peer sent under the old window; the shrink must not reject it.
    client
        .update_settings(Settings::new(Version::Http2).with(SettingId::InitialWindowSize, 1_000))
        .unwrap();
    client.recv(&in_flight).unwrap();
    assert!(client.poll_error().is_none());
    assert!(drain(&mut client).contains(&Event::Data {
        stream_id: 1,
        data: vec![1u8; 5_000],
        fin: false
    }));

    pump(&mut client, &mut server);
    assert_eq!(server.available_window(1), 1_000 - 5_000);
    pump(&mut server, &mut client);
    assert!(drain(&mut client).contains(&Event::SettingsAcknowledged));
    assert!(client.poll_error().is_none());
}

#[test]
fn test_stream_window_overrun_resets_only_that_stream() {
    let (mut client, mut server) = pair_with(
        Config::new(Version::Http2, Role::Client),
        Config::new(Version::Http2, Role::Server).with_initial_window_size(16_384),
    );
    handshake(&mut client, &mut server);
    client.open_stream(request("/upload"), false, None).unwrap();
    pump(&mut client, &mut server);
    drain(&mut server);

    let mut bytes = raw_h2(frame_type::DATA, 0, 1, &[0u8; 16_384]);
    bytes.extend(raw_h2(frame_type::DATA, 0, 1, &[0u8; 1]));
    server.recv(&bytes).unwrap();

    let err = server.poll_error().unwrap();
    assert_eq!(err.code, ErrorCode::FlowControlError);
    assert_eq!(err.stream_id, Some(1));
    assert!(err.message.contains("flow control error"));
    assert!(!server.is_closed());
    assert_eq!(server.stream_state(1), None);

    pump(&mut server, &mut client);
    assert!(drain(&mut client).contains(&Event::StreamReset {
        stream_id: 1,
        code: ErrorCode::FlowControlError
    }));
}

#[test]
fn test_connection_window_overflow_is_fatal() {
    let (mut client, mut server) = pair(Version::Http2);
    handshake(&mut client, &mut server);

    let update = raw_h2(frame_type::WINDOW_UPDATE, 0, 0, &0x7FFF_FFFFu32.to_be_bytes());
    let err = server.recv(&update).unwrap_err();
    assert_eq!(err.code, ErrorCode::FlowControlError);
    assert!(err.message.contains("flow control error"));
    assert!(server.is_closed());
}

#[test]
fn test_window_updates_replenish_receiver() {
    let (mut client, mut server) = pair(Version::Http2);
    handshake(&mut client, &mut server);
    client.open_stream(request("/"), false, None).unwrap();
    pump(&mut client, &mut server);

    client.send_data(1, vec![1u8; 40_000], false).unwrap();
    pump(&mut client, &mut server);
    assert_eq!(client.available_window(0), 65_535 - 40_000);

    // Half the window was consumed, so the server returned the credit.
    pump(&mut server, &mut client);
    assert_eq!(client.available_window(0), 65_535);
    assert_eq!(client.available_window(1), 65_535);
}
