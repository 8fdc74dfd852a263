//! The boundary between a connection and the code that serves its streams.

use std::net::SocketAddr;

use crate::connection::Connection;
use crate::error::{ErrorCode, ProtocolError};
use crate::headers::Headers;
use crate::stream::StreamState;

/// Callbacks into whatever owns the transport.
pub trait Host {
    /// Remote address of the transport, if known.
    fn peer_name(&self) -> Option<SocketAddr>;

    /// A stream was retired. Called once per stream, after its
    /// `Event::StreamClosed` has been queued.
    fn close(&mut self, stream_id: u32);
}

/// A borrowed view of one stream.
#[derive(Debug)]
pub struct StreamHandle<'a> {
    conn: &'a mut Connection,
    stream_id: u32,
}

impl Connection {
    /// Borrow a handle for a live stream.
    pub fn stream(&mut self, stream_id: u32) -> Option<StreamHandle<'_>> {
        self.stream_state(stream_id)?;
        Some(StreamHandle { conn: self, stream_id })
    }
}

impl StreamHandle<'_> {
    pub fn id(&self) -> u32 {
        self.stream_id
    }

    /// `None` once the stream has been retired.
    pub fn state(&self) -> Option<StreamState> {
        self.conn.stream_state(self.stream_id)
    }

    pub fn send_headers(&mut self, headers: Headers, fin: bool) -> Result<(), ProtocolError> {
        self.conn.send_headers(self.stream_id, headers, fin)
    }

    pub fn send_data(&mut self, data: impl Into<Vec<u8>>, fin: bool) -> Result<(), ProtocolError> {
        self.conn.send_data(self.stream_id, data, fin)
    }

    /// Cancel the stream, then run `callback`.
    pub fn abort<F: FnOnce()>(self, callback: F) -> Result<(), ProtocolError> {
        self.conn.reset_stream(self.stream_id, ErrorCode::Cancel)?;
        callback();
        Ok(())
    }

    pub fn peer_name(&self) -> Option<SocketAddr> {
        self.conn.peer_name()
    }
}
