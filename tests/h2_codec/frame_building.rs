//! Tests for HTTP/2 frame serialization

use spdy_sans_io::h2_codec::{flags, frame_type};
use spdy_sans_io::{
    ErrorCode, Frame, FrameCodec, H2FrameHeader, Headers, HeadersFrame, HeadersKind, Priority, SettingId, Settings,
    Version,
};

use super::server;

fn encode(frame: &Frame) -> Vec<u8> {
    let mut out = Vec::new();
    server().serialize(frame, &mut out).unwrap();
    out
}

/// Serialize with one codec, parse with another.
fn through_wire(frame: &Frame) -> Vec<Frame> {
    let mut sender = server();
    let mut receiver = server();
    let mut out = Vec::new();
    sender.serialize(frame, &mut out).unwrap();
    receiver.process(&out).unwrap()
}

#[test]
fn test_create_rst_stream() {
    let frame = encode(&Frame::RstStream {
        stream_id: 1,
        code: ErrorCode::Http11Required,
    });
    assert_eq!(frame.len(), 13);
    assert_eq!(&frame[0..3], &[0, 0, 4]);
    assert_eq!(frame[3], frame_type::RST_STREAM);
    assert_eq!(&frame[9..], &[0, 0, 0, 0xd]);
}

#[test]
fn test_create_settings_ack() {
    let frame = encode(&Frame::AckSettings);
    assert_eq!(frame, vec![0, 0, 0, frame_type::SETTINGS, flags::ACK, 0, 0, 0, 0]);
}

#[test]
fn test_create_settings_with_window() {
    let settings = Settings::new(Version::Http2).with(SettingId::InitialWindowSize, 1_048_576);
    let frame = encode(&Frame::Settings(settings));
    assert_eq!(frame.len(), 15);
    assert_eq!(&frame[9..11], &[0, 4]);
    assert_eq!(&frame[11..], &1_048_576u32.to_be_bytes());
}

#[test]
fn test_spdy_only_setting_not_serialized() {
    let settings = Settings::new(Version::Http2).with(SettingId::RoundTripTime, 10);
    let err = server()
        .serialize(&Frame::Settings(settings), &mut Vec::new())
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InternalError);
}

#[test]
fn test_create_ping_ack() {
    let frame = encode(&Frame::Ping {
        opaque: vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88],
        ack: true,
    });
    assert_eq!(frame.len(), 17);
    assert_eq!(frame[3], frame_type::PING);
    assert_eq!(frame[4], flags::ACK);
}

#[test]
fn test_create_goaway_with_debug_data() {
    let frame = encode(&Frame::GoAway {
        last_stream_id: 5,
        code: ErrorCode::EnhanceYourCalm,
        debug: b"slow down".to_vec(),
    });
    let header = H2FrameHeader::parse(&frame).unwrap();
    assert_eq!(header.frame_type, frame_type::GOAWAY);
    assert_eq!(header.length, 17);
    assert_eq!(&frame[9..13], &[0, 0, 0, 5]);
    assert_eq!(&frame[13..17], &[0, 0, 0, 0xb]);
}

#[test]
fn test_control_frames_through_wire() {
    let frames = [
        Frame::RstStream {
            stream_id: 3,
            code: ErrorCode::Cancel,
        },
        Frame::WindowUpdate {
            stream_id: 7,
            delta: 32_768,
        },
        Frame::Priority {
            stream_id: 9,
            priority: Priority {
                weight: 42,
                parent: 3,
                exclusive: true,
            },
        },
        Frame::GoAway {
            last_stream_id: 11,
            code: ErrorCode::NoError,
            debug: Vec::new(),
        },
        Frame::Settings(
            Settings::new(Version::Http2)
                .with(SettingId::MaxConcurrentStreams, 100)
                .with(SettingId::EnablePush, 0),
        ),
    ];
    for frame in frames {
        assert_eq!(through_wire(&frame), vec![frame]);
    }
}

#[test]
fn test_headers_through_wire() {
    let headers = Headers::new()
        .with(":method", "POST")
        .with(":path", "/upload")
        .with("content-type", "application/octet-stream");
    let frame = Frame::Headers(HeadersFrame {
        priority: Some(Priority::new(100)),
        fin: true,
        ..HeadersFrame::new(HeadersKind::Headers, 5, headers)
    });
    assert_eq!(through_wire(&frame), vec![frame]);
}

#[test]
fn test_padded_data_through_wire() {
    let frame = Frame::Data {
        stream_id: 1,
        fin: false,
        data: b"payload".to_vec(),
        padding: Some(4),
    };
    let bytes = encode(&frame);
    let header = H2FrameHeader::parse(&bytes).unwrap();
    assert!(header.has_flag(flags::PADDED));
    assert_eq!(header.length, 1 + 7 + 4);
    assert_eq!(through_wire(&frame), vec![frame]);
}

#[test]
fn test_push_promise_through_wire() {
    let frame = Frame::PushPromise {
        stream_id: 1,
        promised_id: 2,
        headers: Headers::new().with(":method", "GET").with(":path", "/style.css"),
    };
    assert_eq!(through_wire(&frame), vec![frame]);
}

#[test]
fn test_large_header_block_uses_continuation() {
    let mut headers = Headers::new();
    for i in 0..64 {
        headers.push(format!("x-filler-{}", i), "v".repeat(512));
    }
    let frame = Frame::Headers(HeadersFrame::new(HeadersKind::Headers, 1, headers));
    let bytes = encode(&frame);

    let first = H2FrameHeader::parse(&bytes).unwrap();
    assert_eq!(first.frame_type, frame_type::HEADERS);
    assert!(!first.is_end_headers());
    let second = H2FrameHeader::parse(&bytes[first.total_size()..]).unwrap();
    assert_eq!(second.frame_type, frame_type::CONTINUATION);

    assert_eq!(through_wire(&frame), vec![frame]);
}
