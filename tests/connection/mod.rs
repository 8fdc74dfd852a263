//! Stream multiplexer tests, driving a client and a server connection
//! against each other in memory.

mod errors;
mod flow_control;

use std::sync::Arc;

use spdy_sans_io::{CompressionPool, Config, Connection, Event, H2FrameHeader, Headers, Role, Version};

/// Install a test log writer once; set RUST_LOG to see output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn pair(version: Version) -> (Connection, Connection) {
    pair_with(Config::new(version, Role::Client), Config::new(version, Role::Server))
}

pub fn pair_with(client: Config, server: Config) -> (Connection, Connection) {
    init_tracing();
    let pool = Arc::new(CompressionPool::new(client.version));
    (
        Connection::new(client, pool.clone()).unwrap(),
        Connection::new(server, pool).unwrap(),
    )
}

/// Move everything `from` has to send into `to`.
pub fn pump(from: &mut Connection, to: &mut Connection) {
    let bytes = from.take_pending_send();
    to.recv(&bytes).unwrap();
}

/// Exchange the opening SETTINGS (and their ACKs) and discard the events.
pub fn handshake(client: &mut Connection, server: &mut Connection) {
    pump(client, server);
    pump(server, client);
    pump(client, server);
    drain(client);
    drain(server);
}

pub fn drain(conn: &mut Connection) -> Vec<Event> {
    std::iter::from_fn(|| conn.poll_event()).collect()
}

pub fn request(path: &str) -> Headers {
    Headers::new()
        .with(":method", "GET")
        .with(":path", path)
        .with(":scheme", "https")
        .with(":authority", "example.com")
}

pub fn response(status: &str) -> Headers {
    Headers::new().with(":status", status)
}

/// A raw HTTP/2 frame, for injecting what a well-behaved peer never sends.
pub fn raw_h2(frame_type: u8, flags: u8, stream_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    H2FrameHeader {
        length: payload.len() as u32,
        frame_type,
        flags,
        stream_id,
    }
    .write(&mut out);
    out.extend_from_slice(payload);
    out
}
