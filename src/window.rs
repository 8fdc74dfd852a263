//! Flow control window tracking (RFC 7540 Section 6.9, SPDY/3.1 Section 2.6.8).
//!
//! Connection and stream windows are tracked independently in both
//! directions. Every DATA frame decrements the connection window and its
//! stream's window; WINDOW_UPDATE increments the window it targets.

use std::collections::HashMap;

use tracing::trace;

use crate::config::{DEFAULT_WINDOW_SIZE, MAX_WINDOW_SIZE};
use crate::error::ProtocolError;

/// A send or receive flow control window.
#[derive(Debug, Clone)]
pub struct Window {
    size: i64,
}

impl Window {
    pub fn new(initial: u32) -> Self {
        Self {
            size: i64::from(initial),
        }
    }

    /// Current credit (may be negative after a SETTINGS change).
    pub fn available(&self) -> i64 {
        self.size
    }

    /// Consume `amount` bytes of credit. Fails without changing the window
    /// if it would go below zero.
    pub fn consume(&mut self, amount: u32) -> Result<(), ProtocolError> {
        let new = self.size - i64::from(amount);
        if new < 0 {
            return Err(ProtocolError::flow_control(format!(
                "flow control error: {} bytes exceed window of {}",
                amount, self.size
            )));
        }
        self.size = new;
        Ok(())
    }

    /// Add `increment` to the window (from WINDOW_UPDATE).
    /// Fails if the window would exceed 2^31 - 1.
    pub fn increase(&mut self, increment: u32) -> Result<(), ProtocolError> {
        self.adjust(i64::from(increment))
    }

    /// Adjust the window after a SETTINGS change to INITIAL_WINDOW_SIZE.
    /// `delta` is (new_initial - old_initial), which can be negative.
    pub fn adjust(&mut self, delta: i64) -> Result<(), ProtocolError> {
        let new = self.size + delta;
        if new > i64::from(MAX_WINDOW_SIZE) {
            return Err(ProtocolError::flow_control(format!(
                "flow control error: window of {} exceeds 2^31-1",
                new
            )));
        }
        self.size = new;
        Ok(())
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

#[derive(Debug)]
struct StreamWindows {
    send: Window,
    recv: Window,
    /// Received bytes not yet returned to the peer with WINDOW_UPDATE.
    recv_consumed: u32,
}

/// Per-connection flow control bookkeeping.
///
/// "Send" windows are credit the peer granted us; "receive" windows are
/// credit we granted the peer.
#[derive(Debug)]
pub struct WindowManager {
    conn_send: Window,
    conn_recv: Window,
    conn_recv_target: u32,
    conn_recv_consumed: u32,
    /// Initial receive window we advertise for streams.
    local_initial: u32,
    /// Initial send window the peer advertised for streams.
    peer_initial: u32,
    streams: HashMap<u32, StreamWindows>,
}

impl WindowManager {
    pub fn new(local_initial: u32) -> Self {
        Self {
            conn_send: Window::default(),
            conn_recv: Window::default(),
            conn_recv_target: DEFAULT_WINDOW_SIZE,
            conn_recv_consumed: 0,
            local_initial,
            peer_initial: DEFAULT_WINDOW_SIZE,
            streams: HashMap::new(),
        }
    }

    pub fn add_stream(&mut self, stream_id: u32) {
        self.streams.insert(
            stream_id,
            StreamWindows {
                send: Window::new(self.peer_initial),
                recv: Window::new(self.local_initial),
                recv_consumed: 0,
            },
        );
    }

    /// Release a stream's counters.
    pub fn remove_stream(&mut self, stream_id: u32) {
        self.streams.remove(&stream_id);
    }

    /// Initial receive window currently applied to streams.
    pub fn local_initial(&self) -> u32 {
        self.local_initial
    }

    /// Send credit for a stream, or for the connection when `stream_id` is 0.
    /// Unknown streams have none.
    pub fn available(&self, stream_id: u32) -> i64 {
        if stream_id == 0 {
            return self.conn_send.available();
        }
        self.streams
            .get(&stream_id)
            .map(|s| s.send.available())
            .unwrap_or(0)
    }

    /// Bytes that may be sent on `stream_id` right now.
    pub fn sendable(&self, stream_id: u32) -> usize {
        self.available(0).min(self.available(stream_id)).max(0) as usize
    }

    /// Charge an outbound DATA payload against both send windows.
    pub fn apply_outgoing_data(&mut self, stream_id: u32, size: u32) -> Result<(), ProtocolError> {
        if (self.sendable(stream_id) as u64) < u64::from(size) {
            return Err(ProtocolError::internal(format!(
                "flow control error: {} bytes exceed send window of stream {}",
                size, stream_id
            )));
        }
        self.conn_send.consume(size)?;
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.send.consume(size)?;
        }
        Ok(())
    }

    /// Charge an inbound DATA payload (padding included) against both receive
    /// windows. Overrunning the connection window is fatal; overrunning a
    /// stream window only fails that stream.
    pub fn apply_incoming_data(&mut self, stream_id: u32, size: u32) -> Result<(), ProtocolError> {
        self.conn_recv.consume(size)?;
        self.conn_recv_consumed = self.conn_recv_consumed.saturating_add(size);
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.recv.consume(size).map_err(|e| e.on_stream(stream_id))?;
            stream.recv_consumed = stream.recv_consumed.saturating_add(size);
        }
        Ok(())
    }

    /// Apply a WINDOW_UPDATE from the peer.
    pub fn apply_incoming_window_update(&mut self, stream_id: u32, delta: u32) -> Result<(), ProtocolError> {
        if stream_id == 0 {
            self.conn_send.increase(delta)?;
            trace!(delta, window = self.conn_send.available(), "connection send window updated");
            return Ok(());
        }
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.send.increase(delta).map_err(|e| e.on_stream(stream_id))?;
            trace!(stream_id, delta, window = stream.send.available(), "stream send window updated");
        }
        Ok(())
    }

    /// The peer changed SETTINGS_INITIAL_WINDOW_SIZE: shift every stream's
    /// send window by the difference. Overflow is a connection error.
    pub fn update_initial_send_window(&mut self, new_initial: u32) -> Result<(), ProtocolError> {
        let delta = i64::from(new_initial) - i64::from(self.peer_initial);
        for stream in self.streams.values_mut() {
            stream.send.adjust(delta)?;
        }
        self.peer_initial = new_initial;
        Ok(())
    }

    /// We changed our advertised initial window: shift every stream's
    /// receive window.
    pub fn update_initial_recv_window(&mut self, new_initial: u32) -> Result<(), ProtocolError> {
        let delta = i64::from(new_initial) - i64::from(self.local_initial);
        for stream in self.streams.values_mut() {
            stream.recv.adjust(delta)?;
        }
        self.local_initial = new_initial;
        Ok(())
    }

    /// Grow the connection receive window beyond the protocol default.
    /// Returns the WINDOW_UPDATE delta to announce, if any.
    pub fn expand_connection_recv(&mut self, target: u32) -> Result<Option<u32>, ProtocolError> {
        if target <= self.conn_recv_target {
            return Ok(None);
        }
        let delta = target - self.conn_recv_target;
        self.conn_recv.increase(delta)?;
        self.conn_recv_target = target;
        Ok(Some(delta))
    }

    /// WINDOW_UPDATEs due to the peer: a window is replenished once half of
    /// it has been consumed. Returns `(stream_id, delta)` pairs, connection
    /// (id 0) first.
    pub fn take_recv_updates(&mut self) -> Vec<(u32, u32)> {
        let mut updates = Vec::new();
        if self.conn_recv_consumed > 0 && self.conn_recv_consumed >= self.conn_recv_target / 2 {
            let delta = std::mem::take(&mut self.conn_recv_consumed);
            if self.conn_recv.increase(delta).is_ok() {
                updates.push((0, delta));
            }
        }
        let threshold = self.local_initial / 2;
        let mut ids: Vec<u32> = self
            .streams
            .iter()
            .filter(|(_, s)| s.recv_consumed > 0 && s.recv_consumed >= threshold)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        for id in ids {
            if let Some(stream) = self.streams.get_mut(&id) {
                let delta = std::mem::take(&mut stream.recv_consumed);
                if stream.recv.increase(delta).is_ok() {
                    updates.push((id, delta));
                }
            }
        }
        updates
    }
}
