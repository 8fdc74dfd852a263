//! SPDY/3.1 wire codec tests

mod header_blocks;
mod round_trip;

use spdy_sans_io::{Role, SpdyCodec};

/// A client codec and a server codec, each with its own zlib contexts.
pub fn pair() -> (SpdyCodec, SpdyCodec) {
    (SpdyCodec::new(Role::Client), SpdyCodec::new(Role::Server))
}
