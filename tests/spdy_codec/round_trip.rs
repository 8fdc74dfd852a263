//! Every SPDY frame shape survives serialize then parse

use spdy_sans_io::{
    ErrorCode, Frame, FrameCodec, Headers, HeadersFrame, HeadersKind, Priority, SettingId, Settings, Version,
};

use super::pair;

fn request(path: &str) -> Headers {
    Headers::new()
        .with(":method", "GET")
        .with(":path", path)
        .with(":version", "HTTP/1.1")
        .with(":host", "example.com")
        .with(":scheme", "https")
}

#[test]
fn test_every_frame_variant_round_trips() {
    let frames = vec![
        Frame::Headers(HeadersFrame {
            priority: Some(Priority::from_spdy(2)),
            ..HeadersFrame::new(HeadersKind::SynStream, 1, request("/a"))
        }),
        Frame::Headers(HeadersFrame {
            associated_id: 1,
            priority: Some(Priority::from_spdy(0)),
            fin: true,
            unidirectional: true,
            ..HeadersFrame::new(HeadersKind::SynStream, 3, request("/b"))
        }),
        Frame::Headers(HeadersFrame::new(
            HeadersKind::SynReply,
            1,
            Headers::new().with(":status", "200").with(":version", "HTTP/1.1"),
        )),
        Frame::Headers(HeadersFrame {
            fin: true,
            ..HeadersFrame::new(HeadersKind::Headers, 1, Headers::new().with("grpc-status", "0"))
        }),
        Frame::data(1, "payload", false),
        Frame::data(1, "", true),
        Frame::RstStream {
            stream_id: 3,
            code: ErrorCode::StreamAlreadyClosed,
        },
        Frame::Settings(
            Settings::new(Version::Spdy3)
                .with(SettingId::MaxConcurrentStreams, 100)
                .with(SettingId::InitialWindowSize, 1 << 20)
                .with(SettingId::RoundTripTime, 40),
        ),
        // Odd ids are the client's own pings, even ids are the server's
        // coming back.
        Frame::Ping {
            opaque: vec![0, 0, 0, 1],
            ack: false,
        },
        Frame::Ping {
            opaque: vec![0, 0, 0, 2],
            ack: true,
        },
        Frame::GoAway {
            last_stream_id: 3,
            code: ErrorCode::InternalError,
            debug: Vec::new(),
        },
        Frame::WindowUpdate {
            stream_id: 0,
            delta: 1 << 16,
        },
        Frame::WindowUpdate {
            stream_id: 1,
            delta: 512,
        },
    ];

    let (mut client, mut server) = pair();
    let mut out = Vec::new();
    for frame in &frames {
        client.serialize(frame, &mut out).unwrap();
    }
    assert_eq!(server.process(&out).unwrap(), frames);
}

#[test]
fn test_frames_spdy_cannot_carry_are_refused() {
    let (mut client, _) = pair();
    let refused = [
        Frame::AckSettings,
        Frame::Priority {
            stream_id: 1,
            priority: Priority::new(10),
        },
        Frame::PushPromise {
            stream_id: 1,
            promised_id: 2,
            headers: request("/"),
        },
        Frame::Data {
            stream_id: 1,
            fin: false,
            data: b"x".to_vec(),
            padding: Some(1),
        },
        Frame::Headers(HeadersFrame {
            priority: Some(Priority::from_spdy(1)),
            ..HeadersFrame::new(HeadersKind::SynReply, 1, request("/"))
        }),
        Frame::Headers(HeadersFrame {
            associated_id: 1,
            ..HeadersFrame::new(HeadersKind::Headers, 3, request("/"))
        }),
    ];
    for frame in refused {
        let err = client.serialize(&frame, &mut Vec::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InternalError, "{:?}", frame);
    }
}
