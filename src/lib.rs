//! spdy-sans-io: A sans-I/O SPDY/3.1 and HTTP/2 framing and multiplexing engine
//!
//! This crate turns bytes received from a transport into stream events, and
//! application calls into bytes to write back. It never touches a socket, a
//! timer or an async runtime.
//!
//! # Features
//!
//! - **Sans-I/O Design**: `recv()` bytes in, `take_pending_send()` bytes out
//! - **Two wire formats**: HTTP/2 (RFC 7540) and SPDY/3.1 behind one
//!   [`FrameCodec`] trait and one logical [`Frame`] type
//! - **Header Compression**: HPACK via fluke-hpack, SPDY zlib with the
//!   SPDY/3 dictionary via flate2, pooled per connection
//! - **Flow Control**: connection and per-stream windows, automatic
//!   WINDOW_UPDATE, queued DATA that waits for credit instead of failing
//! - **CONTINUATION Assembly**: bounded header block reassembly
//! - **Stream Multiplexing**: stream lifecycle, priorities, server push,
//!   GOAWAY draining and stream-vs-connection error scoping
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use spdy_sans_io::{CompressionPool, Config, Connection, Event, Headers, Role, Version};
//!
//! let pool = Arc::new(CompressionPool::new(Version::Http2));
//! let mut client = Connection::new(Config::new(Version::Http2, Role::Client), pool.clone()).unwrap();
//! let mut server = Connection::new(Config::new(Version::Http2, Role::Server), pool).unwrap();
//!
//! let request = Headers::new()
//!     .with(":method", "GET")
//!     .with(":path", "/")
//!     .with(":scheme", "https")
//!     .with(":authority", "example.com");
//! let stream_id = client.open_stream(request, true, None).unwrap();
//!
//! // Move bytes across however your transport does it.
//! let bytes = client.take_pending_send();
//! server.recv(&bytes).unwrap();
//!
//! while let Some(event) = server.poll_event() {
//!     if let Event::Headers(headers) = event {
//!         assert_eq!(headers.stream_id, stream_id);
//!         assert_eq!(headers.path.as_deref(), Some("/"));
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`h2_codec`] / [`spdy_codec`]: wire formats (bytes ↔ [`Frame`])
//! - [`compression`]: per-connection header compression contexts and their pool
//! - [`window`]: flow control accounting
//! - [`connection`]: the stream multiplexer
//!
//! It does NOT provide:
//! - TCP transport or TLS (you provide the bytes)
//! - HTTP semantics beyond header blocks (no routing, no caching)
//! - Timers (ping timeouts and idle closes are the caller's policy)

pub mod codec;
pub mod compression;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod h2_codec;
pub mod handle;
pub mod headers;
pub mod hpack;
pub mod spdy_codec;
pub mod stream;
pub mod window;
pub mod zlib;

pub use codec::{new_codec, FrameCodec};
pub use compression::{CompressionPair, CompressionPool, Compressor, Decompressor};
pub use config::{CodecConfig, Config, Role, Version};
pub use connection::{Connection, ConnectionState, Event, StreamHeaders};
pub use error::{ErrorCode, ProtocolError};
pub use frame::{Frame, HeadersFrame, HeadersKind, Priority, SettingId, Settings};
pub use h2_codec::{H2Codec, H2FrameHeader, CONNECTION_PREFACE};
pub use handle::{Host, StreamHandle};
pub use headers::{Header, Headers};
pub use hpack::{HpackDecoder, HpackEncoder};
pub use spdy_codec::{SpdyCodec, SpdyFrameHeader};
pub use stream::StreamState;
pub use window::{Window, WindowManager};
