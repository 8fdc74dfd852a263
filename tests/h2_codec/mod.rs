//! HTTP/2 wire codec tests

mod frame_building;
mod parser_vectors;

use spdy_sans_io::H2Codec;

/// Decode a hex fixture (case-insensitive, no separators).
pub fn hex(s: &str) -> Vec<u8> {
    assert!(s.len() % 2 == 0, "odd-length hex fixture");
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

/// A server-side codec that has already seen the connection preface.
pub fn server() -> H2Codec {
    let mut codec = H2Codec::new();
    codec.set_preface_received(true);
    codec
}
