//! Tests for SPDY header-carrying frames and their zlib contexts

use spdy_sans_io::{ErrorCode, Frame, FrameCodec, Headers, HeadersFrame, HeadersKind, Priority};

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
fn test_pushed_syn_stream() {
    let (mut client, mut server) = pair();
    let frame = Frame::Headers(HeadersFrame {
        associated_id: 1,
        priority: Some(Priority::from_spdy(0)),
        unidirectional: true,
        ..HeadersFrame::new(HeadersKind::SynStream, 2, request("/app.js"))
    });
    let mut out = Vec::new();
    server.serialize(&frame, &mut out).unwrap();

    let parsed = client.process(&out).unwrap();
    let [Frame::Headers(h)] = parsed.as_slice() else {
        panic!("Expected one SYN_STREAM, got {:?}", parsed);
    };
    assert_eq!(h.kind, HeadersKind::SynStream);
    assert_eq!(h.associated_id, 1);
    assert!(h.unidirectional);
    assert_eq!(h.priority.map(|p| p.to_spdy()), Some(0));
    assert_eq!(h.path(), Some("/app.js"));
}

#[test]
fn test_many_blocks_share_one_stream() {
    let (mut client, mut server) = pair();
    let mut out = Vec::new();
    let mut sent = Vec::new();
    for id in (1..40).step_by(2) {
        let frame = Frame::Headers(HeadersFrame {
            priority: Some(Priority::from_spdy(3)),
            ..HeadersFrame::new(HeadersKind::SynStream, id, request(&format!("/item/{}", id)))
        });
        client.serialize(&frame, &mut out).unwrap();
        sent.push(frame);
    }
    // Split the wire bytes at an arbitrary point to cross frame boundaries.
    let (a, b) = out.split_at(out.len() / 3);
    let mut parsed = server.process(a).unwrap();
    parsed.extend(server.process(b).unwrap());
    assert_eq!(parsed, sent);
}

#[test]
fn test_multi_valued_headers_survive() {
    let (mut client, mut server) = pair();
    let headers = Headers::new()
        .with(":status", "200")
        .with("set-cookie", "a=1")
        .with("set-cookie", "b=2");
    let frame = Frame::Headers(HeadersFrame::new(HeadersKind::SynReply, 1, headers));
    let mut out = Vec::new();
    server.serialize(&frame, &mut out).unwrap();

    let parsed = client.process(&out).unwrap();
    let [Frame::Headers(h)] = parsed.as_slice() else {
        panic!("Expected one SYN_REPLY, got {:?}", parsed);
    };
    let cookies: Vec<&str> = h.headers.get_all("set-cookie").collect();
    assert_eq!(cookies, vec!["a=1", "b=2"]);
}

#[test]
fn test_corrupt_block_is_compression_error() {
    let (_, mut server) = pair();
    // SYN_STREAM, stream 1, garbage where the zlib stream should be
    let mut bytes = vec![0x80, 3, 0, 1, 0, 0, 0, 16, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0];
    bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef, 0xde, 0xad]);
    let err = server.process(&bytes).unwrap_err();
    assert_eq!(err.code, ErrorCode::CompressionError);
    assert!(err.is_connection_error());
}

#[test]
fn test_syn_stream_zero_id_rejected() {
    let (mut client, mut server) = pair();
    let frame = Frame::Headers(HeadersFrame::new(HeadersKind::SynStream, 0, request("/")));
    let mut out = Vec::new();
    client.serialize(&frame, &mut out).unwrap();
    let err = server.process(&out).unwrap_err();
    assert_eq!(err.code, ErrorCode::ProtocolError);
    assert!(err.message.contains("stream id"));
}

#[test]
fn test_released_context_cannot_encode() {
    let (mut client, _) = pair();
    assert!(client.take_compression().is_some());
    let frame = Frame::Headers(HeadersFrame::new(HeadersKind::SynStream, 1, request("/")));
    let err = client.serialize(&frame, &mut Vec::new()).unwrap_err();
    assert_eq!(err.code, ErrorCode::InternalError);
}
