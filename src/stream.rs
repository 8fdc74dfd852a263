//! Per-stream state: lifecycle, priority and the outbound queue.

use std::collections::VecDeque;

use crate::frame::Priority;
use crate::headers::Headers;

/// Stream lifecycle (RFC 7540 Section 5.1, without the reserved states).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Open,
    /// We sent FIN; the peer may still send.
    HalfClosedLocal,
    /// The peer sent FIN; we may still send.
    HalfClosedRemote,
    Closed,
}

impl StreamState {
    /// State after we send FIN.
    pub fn close_local(self) -> Self {
        match self {
            StreamState::Idle | StreamState::Open => StreamState::HalfClosedLocal,
            StreamState::HalfClosedRemote | StreamState::Closed => StreamState::Closed,
            StreamState::HalfClosedLocal => self,
        }
    }

    /// State after the peer sends FIN.
    pub fn close_remote(self) -> Self {
        match self {
            StreamState::Idle | StreamState::Open => StreamState::HalfClosedRemote,
            StreamState::HalfClosedLocal | StreamState::Closed => StreamState::Closed,
            StreamState::HalfClosedRemote => self,
        }
    }

    pub fn can_send(self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedRemote)
    }

    pub fn can_recv(self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedLocal)
    }
}

/// Something waiting to be written on a stream, in submission order.
#[derive(Debug)]
pub(crate) enum Outbound {
    Data { data: Vec<u8>, fin: bool },
    /// Trailers (or late headers) queued behind pending data.
    Headers { headers: Headers, fin: bool },
}

#[derive(Debug)]
pub(crate) struct Stream {
    pub id: u32,
    pub state: StreamState,
    pub priority: Priority,
    pub associated_id: u32,
    /// We opened it (by id parity).
    pub local: bool,
    pub headers_sent: bool,
    pub headers_received: bool,
    pub queue: VecDeque<Outbound>,
    /// The local side's FIN has been queued; nothing more may be submitted.
    pub fin_queued: bool,
}

impl Stream {
    pub fn new(id: u32, local: bool, priority: Priority) -> Self {
        Self {
            id,
            state: StreamState::Idle,
            priority,
            associated_id: 0,
            local,
            headers_sent: false,
            headers_received: false,
            queue: VecDeque::new(),
            fin_queued: false,
        }
    }

    pub fn queued_bytes(&self) -> usize {
        self.queue
            .iter()
            .map(|o| match o {
                Outbound::Data { data, .. } => data.len(),
                Outbound::Headers { .. } => 0,
            })
            .sum()
    }
}
