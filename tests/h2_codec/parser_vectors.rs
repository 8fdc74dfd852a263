//! Tests for HTTP/2 frame parsing against captured wire bytes

use spdy_sans_io::{ErrorCode, Frame, FrameCodec, HeadersKind, Priority, ProtocolError, SettingId};

use super::{hex, server};

const HELLO: &str = "40849cb4507f84f07b2893";
const HOW: &str = "40839cfe3f871d8553d1edff3f";

fn pass(data: &str) -> Frame {
    let mut frames = server().process(&hex(data)).unwrap();
    assert_eq!(frames.len(), 1, "{:?}", frames);
    frames.remove(0)
}

fn fail(data: &str, code: ErrorCode, needle: &str) -> ProtocolError {
    let err = server().process(&hex(data)).unwrap_err();
    assert_eq!(err.code, code, "{}", err);
    assert!(
        err.message.to_lowercase().contains(needle),
        "{:?} does not mention {:?}",
        err.message,
        needle
    );
    err
}

#[test]
fn test_settings_regular_frame() {
    let frame = pass("00000c0400000000000003000003e8000400a00000");
    let Frame::Settings(settings) = frame else {
        panic!("Expected SETTINGS, got {:?}", frame);
    };
    assert_eq!(settings.len(), 2);
    assert_eq!(settings.get_code(3), Some(1000));
    assert_eq!(settings.get_code(4), Some(10_485_760));
    assert_eq!(settings.get(SettingId::MaxConcurrentStreams), Some(1000));
    assert_eq!(settings.get_name("initial_window_size"), Some(10_485_760));
}

#[test]
fn test_settings_ack() {
    assert_eq!(pass("000000040100000000"), Frame::AckSettings);
}

#[test]
fn test_settings_non_empty_ack() {
    fail("000001040100000000ff", ErrorCode::FrameSizeError, "non-zero");
}

#[test]
fn test_settings_non_aligned() {
    fail("000001040000000000ff", ErrorCode::FrameSizeError, "multiple");
}

#[test]
fn test_settings_on_stream() {
    fail("000000040000000001", ErrorCode::ProtocolError, "stream id");
}

#[test]
fn test_window_update_regular_frame() {
    assert_eq!(
        pass("000004080000000000009f0001"),
        Frame::WindowUpdate {
            stream_id: 0,
            delta: 10_420_225
        }
    );
}

#[test]
fn test_window_update_wrong_length() {
    fail("000005080000000000009f000102", ErrorCode::FrameSizeError, "length");
    fail("000003080000000000009f00", ErrorCode::FrameSizeError, "length");
}

#[test]
fn test_headers_browser_request() {
    let data = String::from("000155012500000001")
        + "00000000ff418a089d5c0b8170dc644c8b82848753b8497ca589d34d1f43ae"
        + "ba0c41a4c7a98f33a69a3fdf9a68fa1d75d0620d263d4c79a68fbed00177fe"
        + "8d48e62b1e0b1d7f5f2c7cfdf6800bbd508e9bd9abfa5242cb40d25fa51121"
        + "27519cb2d5b6f0fab2dfbed00177be8b52dc377df6800bb9f45abefb4005da"
        + "5887a47e561cc5801f60ac8a2b5348e07dc7df10190ae171e782ebe2684b85"
        + "a0bce36cbecb8b85a642eb8f81d12e1699640f819782bbbf60bb8a2b534fb8"
        + "1f71f7c40642b85a0bce36cbecb8b8570af6a69222c83fa90d61489feffe5a"
        + "9a484aa0fea43585227fbff96a69253241fd547a8bfdff4003646e7401317a"
        + "dcd07f66a281b0dae053fad0321aa49d13fda992a49685340c8a6adca7e281"
        + "0441044cff6a435d74179163cc64b0db2eaecb8a7f59b1efd19fe94a0dd4aa"
        + "62293a9ffb52f4f61e92b0d32b817132dbab844d29b8728ec330db2eaecb9f";

    let Frame::Headers(h) = pass(&data) else {
        panic!("Expected HEADERS");
    };
    assert_eq!(h.kind, HeadersKind::Headers);
    assert_eq!(h.stream_id, 1);
    assert_eq!(h.associated_id, 0);
    // Flags 0x25 carry END_STREAM.
    assert!(h.fin);
    assert!(!h.unidirectional);
    assert_eq!(
        h.priority,
        Some(Priority {
            weight: 255,
            parent: 0,
            exclusive: false
        })
    );
    assert_eq!(h.path(), Some("/"));

    let map = h.headers.to_map();
    assert_eq!(map.len(), 11);
    assert_eq!(map[":authority"], "127.0.0.1:3232");
    assert_eq!(map[":method"], "GET");
    assert_eq!(map[":scheme"], "https");
    assert_eq!(map["accept-encoding"], "gzip, deflate, sdch");
    assert_eq!(map["cache-control"], "max-age=0");
    assert_eq!(map["dnt"], "1");
    assert_eq!(
        map["cookie"],
        "__utmz=96992031.1418653936.1.1.utmcsr=(direct)|utmccn=(direct)|utmcmd=(none)"
    );
}

#[test]
fn test_headers_unpad() {
    let Frame::Headers(h) = pass(&format!("000011010c0000000105{}ABCDEF1234", HELLO)) else {
        panic!("Expected HEADERS");
    };
    assert_eq!(h.stream_id, 1);
    assert!(!h.fin);
    assert_eq!(h.priority, None);
    assert_eq!(h.path(), None);
    assert_eq!(h.headers.get("hello"), Some("world"));
    assert_eq!(h.headers.len(), 1);
}

#[test]
fn test_headers_with_continuation() {
    let data = format!("00000b010000000001{}00000d090400000001{}", HELLO, HOW);
    let Frame::Headers(h) = pass(&data) else {
        panic!("Expected HEADERS");
    };
    let map = h.headers.to_map();
    assert_eq!(map.len(), 2);
    assert_eq!(map["hello"], "world");
    assert_eq!(map["how"], "are you?");
}

#[test]
fn test_headers_split_matches_whole_block() {
    // The same two headers, sent as one block.
    let whole = format!("000018010400000001{}{}", HELLO, HOW);
    let split = format!("00000b010000000001{}00000d090400000001{}", HELLO, HOW);

    let Frame::Headers(a) = pass(&whole) else {
        panic!("Expected HEADERS");
    };
    let Frame::Headers(b) = pass(&split) else {
        panic!("Expected HEADERS");
    };
    assert_eq!(a.headers.to_map(), b.headers.to_map());
}

#[test]
fn test_headers_zero_stream_id() {
    fail("000000010000000000", ErrorCode::ProtocolError, "stream id");
}

#[test]
fn test_headers_padding_too_big() {
    fail(
        &format!("000011010c00000001ff{}ABCDEF1234", HELLO),
        ErrorCode::ProtocolError,
        "invalid padding",
    );
}

#[test]
fn test_headers_padding_no_space() {
    fail("000000010c00000001", ErrorCode::FrameSizeError, "not enough space");
}

#[test]
fn test_lone_continuation() {
    fail(
        &format!("00000d090400000001{}", HOW),
        ErrorCode::ProtocolError,
        "no matching stream",
    );
}

#[test]
fn test_way_too_many_continuations() {
    let mut data = format!("00000b010000000001{}", HELLO);
    let continuation = format!("00000d090000000001{}", HOW);
    for _ in 0..2_000 {
        data.push_str(&continuation);
    }
    let err = fail(&data, ErrorCode::ProtocolError, "list is too large");
    assert!(err.is_connection_error());
}

#[test]
fn test_fragmented_delivery_matches_single_write() {
    let bytes = hex(&format!("00000b010000000001{}00000d090400000001{}", HELLO, HOW));
    let mut codec = server();
    let mut frames = Vec::new();
    for chunk in bytes.chunks(3) {
        frames.extend(codec.process(chunk).unwrap());
    }
    assert_eq!(frames, server().process(&bytes).unwrap());
}
