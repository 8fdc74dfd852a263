//! Stream multiplexer.
//!
//! `Connection` is sans-I/O: feed received bytes via `recv()`, pull bytes out
//! via `take_pending_send()`, drain events with `poll_event()` and errors with
//! `poll_error()`. It owns the frame codec (and through it the compression
//! context checked out of a shared pool), the flow control windows and every
//! stream of one connection.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::codec::{new_codec, FrameCodec};
use crate::compression::CompressionPool;
use crate::config::{Config, Role, Version, DEFAULT_MAX_FRAME_SIZE, DEFAULT_WINDOW_SIZE, MAX_WINDOW_SIZE};
use crate::error::{ErrorCode, ProtocolError};
use crate::frame::{Frame, HeadersFrame, HeadersKind, Priority, SettingId, Settings};
use crate::h2_codec::CONNECTION_PREFACE;
use crate::handle::Host;
use crate::headers::Headers;
use crate::stream::{Outbound, Stream, StreamState};
use crate::window::WindowManager;

/// Largest stream identifier (31 bits).
pub const MAX_STREAM_ID: u32 = 0x7FFF_FFFF;

/// A complete header block delivered on a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeaders {
    /// `SynStream` opens a stream (including pushed streams), `SynReply` is
    /// the first response to a stream we opened, `Headers` is anything later
    /// (trailers).
    pub kind: HeadersKind,
    pub stream_id: u32,
    pub associated_id: u32,
    pub fin: bool,
    pub priority: Priority,
    pub path: Option<String>,
    pub headers: Headers,
}

impl StreamHeaders {
    /// Lowercased name to value mapping.
    pub fn header_map(&self) -> BTreeMap<String, String> {
        self.headers.to_map()
    }
}

/// Events produced by the connection for the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Headers(StreamHeaders),
    Data {
        stream_id: u32,
        data: Vec<u8>,
        fin: bool,
    },
    /// The peer reset a stream, or it was refused by the peer's GOAWAY.
    StreamReset {
        stream_id: u32,
        code: ErrorCode,
    },
    /// A stream was retired; emitted exactly once per stream.
    StreamClosed {
        stream_id: u32,
    },
    /// Peer settings, already applied.
    Settings(Settings),
    /// Peer acknowledged our SETTINGS (HTTP/2).
    SettingsAcknowledged,
    /// Non-ack pings have already been answered.
    Ping {
        opaque: Vec<u8>,
        ack: bool,
    },
    GoAway {
        last_stream_id: u32,
        code: ErrorCode,
        debug: Vec<u8>,
    },
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Active,
    GoAwaySent,
    GoAwayReceived,
    /// GOAWAY went both ways; waiting for in-flight streams.
    Draining,
    Closed,
}

/// One multiplexed SPDY/3.1 or HTTP/2 connection.
pub struct Connection {
    config: Config,
    state: ConnectionState,
    codec: Box<dyn FrameCodec>,
    pool: Arc<CompressionPool>,
    windows: WindowManager,

    /// Per-stream state, keyed by stream ID.
    streams: HashMap<u32, Stream>,
    /// Recently retired ids whose late frames are silently absorbed.
    recently_closed: VecDeque<u32>,
    next_stream_id: u32,
    /// Highest stream id the peer has opened (or promised).
    last_remote_id: u32,

    peer_max_concurrent: Option<u32>,
    peer_enable_push: bool,
    goaway_sent: bool,
    goaway_received: Option<u32>,
    /// SETTINGS we sent and the peer has not acknowledged yet, each with
    /// the smaller stream receive window that takes effect on its ACK.
    pending_settings: VecDeque<Option<u32>>,
    next_ping: u32,

    /// Outgoing data buffer (drained by take_pending_send()).
    send_buf: Vec<u8>,
    events: VecDeque<Event>,
    errors: VecDeque<ProtocolError>,
    host: Option<Box<dyn Host + Send>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("version", &self.config.version)
            .field("role", &self.config.role)
            .field("state", &self.state)
            .field("streams", &self.streams.len())
            .field("pending_send", &self.send_buf.len())
            .finish()
    }
}

impl Connection {
    /// Create a connection and queue its opening frames: the client preface
    /// (HTTP/2 clients), our SETTINGS and, when the configured window is larger
    /// than the protocol default, a connection-level WINDOW_UPDATE.
    pub fn new(config: Config, pool: Arc<CompressionPool>) -> Result<Self, ProtocolError> {
        if pool.version() != config.version {
            return Err(ProtocolError::internal(format!(
                "compression pool serves {:?} but the connection speaks {:?}",
                pool.version(),
                config.version
            )));
        }
        let codec = new_codec(&config, pool.get());
        let mut conn = Self {
            state: ConnectionState::Active,
            codec,
            pool,
            windows: WindowManager::new(DEFAULT_WINDOW_SIZE),
            streams: HashMap::new(),
            recently_closed: VecDeque::new(),
            next_stream_id: config.role.first_stream_id(),
            last_remote_id: 0,
            peer_max_concurrent: None,
            peer_enable_push: true,
            goaway_sent: false,
            goaway_received: None,
            pending_settings: VecDeque::new(),
            next_ping: config.role.first_stream_id(),
            send_buf: Vec::new(),
            events: VecDeque::new(),
            errors: VecDeque::new(),
            host: None,
            config,
        };

        if conn.config.version == Version::Http2 && conn.config.role == Role::Client {
            conn.send_buf.extend_from_slice(CONNECTION_PREFACE);
        }
        let settings = conn.initial_settings();
        let deferred = conn.advertise_initial_window(conn.config.initial_window_size)?;
        conn.send_frame(&Frame::Settings(settings))?;
        if conn.config.version == Version::Http2 {
            conn.pending_settings.push_back(deferred);
        }
        if let Some(delta) = conn.windows.expand_connection_recv(conn.config.initial_window_size)? {
            conn.send_frame(&Frame::WindowUpdate { stream_id: 0, delta })?;
        }
        debug!(version = ?conn.config.version, role = ?conn.config.role, "connection created");
        Ok(conn)
    }

    fn initial_settings(&self) -> Settings {
        let mut settings = Settings::new(self.config.version);
        if let Some(max) = self.config.max_concurrent_streams {
            settings.set(SettingId::MaxConcurrentStreams, max);
        }
        if self.config.version == Version::Spdy3 || self.config.initial_window_size != DEFAULT_WINDOW_SIZE {
            settings.set(SettingId::InitialWindowSize, self.config.initial_window_size);
        }
        if self.config.version == Version::Http2 && self.config.codec.max_frame_size != DEFAULT_MAX_FRAME_SIZE {
            settings.set(SettingId::MaxFrameSize, self.config.codec.max_frame_size);
        }
        settings
    }

    pub fn version(&self) -> Version {
        self.config.version
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the connection is closed.
    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Install the host callbacks (peer-name lookup, stream close).
    pub fn set_host(&mut self, host: Box<dyn Host + Send>) {
        self.host = Some(host);
    }

    pub fn peer_name(&self) -> Option<SocketAddr> {
        self.host.as_ref().and_then(|h| h.peer_name())
    }

    pub fn stream_state(&self, stream_id: u32) -> Option<StreamState> {
        self.streams.get(&stream_id).map(|s| s.state)
    }

    /// DATA bytes submitted on a stream but not yet written.
    pub fn queued_bytes(&self, stream_id: u32) -> usize {
        self.streams.get(&stream_id).map(|s| s.queued_bytes()).unwrap_or(0)
    }

    /// Streams not yet retired.
    pub fn active_streams(&self) -> usize {
        self.streams.len()
    }

    /// Send credit for a stream, or for the connection when `stream_id` is 0.
    pub fn available_window(&self, stream_id: u32) -> i64 {
        self.windows.available(stream_id)
    }

    /// Poll the next event, if any.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Poll the next error. Stream errors have already reset their stream;
    /// a connection error has already closed the connection.
    pub fn poll_error(&mut self) -> Option<ProtocolError> {
        self.errors.pop_front()
    }

    /// Take all pending bytes to send to the transport, writing as much
    /// queued DATA as flow control allows.
    pub fn take_pending_send(&mut self) -> Vec<u8> {
        if self.state != ConnectionState::Closed {
            if let Err(err) = self.flush_streams() {
                self.fail(err);
            }
        }
        std::mem::take(&mut self.send_buf)
    }

    /// Whether there are bytes (or sendable stream data) pending.
    pub fn has_pending_send(&self) -> bool {
        !self.send_buf.is_empty() || self.streams.values().any(|s| self.is_ready(s))
    }

    /// Feed received bytes from the transport.
    ///
    /// Stream errors reset the affected stream and are reported through
    /// `poll_error()`; a connection error queues GOAWAY, fails every stream,
    /// closes the connection and is returned.
    pub fn recv(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        if self.state == ConnectionState::Closed {
            trace!(len = data.len(), "discarding bytes received after close");
            return Ok(());
        }
        self.codec.feed(data);
        while self.state != ConnectionState::Closed {
            let result = match self.codec.poll_frame() {
                Ok(Some(frame)) => self.handle_frame(frame),
                Ok(None) => break,
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                if err.is_connection_error() {
                    return Err(self.fail(err));
                }
                self.stream_error(err);
            }
        }
        if self.state != ConnectionState::Closed {
            if let Err(err) = self.queue_window_updates() {
                return Err(self.fail(err));
            }
        }
        Ok(())
    }

    // -- Outbound operations --

    /// Open a stream with `headers`. Returns the new stream id.
    pub fn open_stream(
        &mut self,
        headers: Headers,
        fin: bool,
        priority: Option<Priority>,
    ) -> Result<u32, ProtocolError> {
        self.ensure_open()?;
        if self.goaway_sent || self.goaway_received.is_some() {
            return Err(ProtocolError::new(ErrorCode::RefusedStream, "connection is going away"));
        }
        if let Some(max) = self.peer_max_concurrent {
            let open = self.streams.values().filter(|s| s.local).count();
            if open >= max as usize {
                return Err(ProtocolError::new(
                    ErrorCode::RefusedStream,
                    format!("peer allows at most {} concurrent streams", max),
                ));
            }
        }
        let stream_id = self.allocate_stream_id()?;
        let stream_priority = priority.unwrap_or_default();

        let frame = HeadersFrame {
            priority: match self.config.version {
                Version::Spdy3 => Some(stream_priority),
                Version::Http2 => priority,
            },
            fin,
            ..HeadersFrame::new(wire_kind(self.config.version, HeadersKind::SynStream), stream_id, headers)
        };
        if let Err(err) = self.send_frame(&Frame::Headers(frame)) {
            return Err(self.fail(err));
        }

        let mut stream = Stream::new(stream_id, true, stream_priority);
        stream.state = StreamState::Open;
        stream.headers_sent = true;
        if fin {
            stream.state = stream.state.close_local();
            stream.fin_queued = true;
        }
        self.streams.insert(stream_id, stream);
        self.windows.add_stream(stream_id);
        debug!(stream_id, fin, "stream opened");
        Ok(stream_id)
    }

    /// Push a stream associated with the peer-opened stream `parent`
    /// (servers only). `headers` describe the pushed request. Returns the
    /// promised stream id; its response goes out with `send_headers`.
    pub fn push_stream(&mut self, parent: u32, headers: Headers) -> Result<u32, ProtocolError> {
        self.ensure_open()?;
        if self.config.role != Role::Server {
            return Err(ProtocolError::protocol("only servers can push streams"));
        }
        if self.goaway_sent || self.goaway_received.is_some() {
            return Err(ProtocolError::new(ErrorCode::RefusedStream, "connection is going away"));
        }
        if self.config.version == Version::Http2 && !self.peer_enable_push {
            return Err(ProtocolError::new(ErrorCode::RefusedStream, "peer disabled server push"));
        }
        let priority = match self.streams.get(&parent) {
            Some(s) if !s.local && s.state.can_send() => s.priority,
            _ => return Err(not_writable(parent)),
        };
        let stream_id = self.allocate_stream_id()?;

        let frame = match self.config.version {
            Version::Http2 => Frame::PushPromise {
                stream_id: parent,
                promised_id: stream_id,
                headers,
            },
            Version::Spdy3 => Frame::Headers(HeadersFrame {
                associated_id: parent,
                priority: Some(priority),
                unidirectional: true,
                ..HeadersFrame::new(HeadersKind::SynStream, stream_id, headers)
            }),
        };
        if let Err(err) = self.send_frame(&frame) {
            return Err(self.fail(err));
        }

        let mut stream = Stream::new(stream_id, true, priority);
        stream.state = StreamState::HalfClosedRemote;
        stream.associated_id = parent;
        // SPDY's SYN_STREAM already carried the headers.
        stream.headers_sent = self.config.version == Version::Spdy3;
        self.streams.insert(stream_id, stream);
        self.windows.add_stream(stream_id);
        debug!(stream_id, parent, "stream pushed");
        Ok(stream_id)
    }

    /// Send headers on a stream: the reply to a peer-opened stream, or
    /// trailers. Trailers wait behind any queued DATA.
    pub fn send_headers(&mut self, stream_id: u32, headers: Headers, fin: bool) -> Result<(), ProtocolError> {
        self.ensure_open()?;
        let stream = match self.streams.get_mut(&stream_id) {
            Some(s) if s.state.can_send() && !s.fin_queued => s,
            _ => return Err(not_writable(stream_id)),
        };
        if fin {
            stream.fin_queued = true;
        }
        if !stream.queue.is_empty() {
            stream.queue.push_back(Outbound::Headers { headers, fin });
            return Ok(());
        }

        let kind = if stream.headers_sent {
            HeadersKind::Headers
        } else {
            HeadersKind::SynReply
        };
        stream.headers_sent = true;
        if fin {
            stream.state = stream.state.close_local();
        }
        let frame = Frame::Headers(HeadersFrame {
            fin,
            ..HeadersFrame::new(wire_kind(self.config.version, kind), stream_id, headers)
        });
        if let Err(err) = self.send_frame(&frame) {
            return Err(self.fail(err));
        }
        self.maybe_retire(stream_id);
        Ok(())
    }

    /// Queue DATA on a stream. Nothing is dropped: data beyond the current
    /// flow control credit waits for WINDOW_UPDATE and goes out through
    /// `take_pending_send()`.
    pub fn send_data(&mut self, stream_id: u32, data: impl Into<Vec<u8>>, fin: bool) -> Result<(), ProtocolError> {
        self.ensure_open()?;
        let stream = match self.streams.get_mut(&stream_id) {
            Some(s) if s.state.can_send() && !s.fin_queued => s,
            _ => return Err(not_writable(stream_id)),
        };
        if !stream.headers_sent {
            return Err(ProtocolError::protocol("headers must be sent before data").on_stream(stream_id));
        }
        stream.queue.push_back(Outbound::Data { data: data.into(), fin });
        if fin {
            stream.fin_queued = true;
        }
        Ok(())
    }

    /// Reset a stream with an error code, discarding its queued output.
    pub fn reset_stream(&mut self, stream_id: u32, code: ErrorCode) -> Result<(), ProtocolError> {
        self.ensure_open()?;
        if !self.streams.contains_key(&stream_id) {
            if self.is_idle(stream_id) {
                return Err(ProtocolError::protocol(format!("cannot reset idle stream {}", stream_id)));
            }
            return Ok(());
        }
        if let Err(err) = self.send_frame(&Frame::RstStream { stream_id, code }) {
            return Err(self.fail(err));
        }
        debug!(stream_id, %code, "stream reset");
        self.retire(stream_id);
        Ok(())
    }

    /// Send a PING. Returns the opaque payload the ack will carry.
    pub fn ping(&mut self) -> Result<Vec<u8>, ProtocolError> {
        self.ensure_open()?;
        let id = self.next_ping;
        // Keeps parity, which is how SPDY recognises replies.
        self.next_ping = self.next_ping.wrapping_add(2);
        let opaque = match self.config.version {
            Version::Http2 => u64::from(id).to_be_bytes().to_vec(),
            Version::Spdy3 => id.to_be_bytes().to_vec(),
        };
        if let Err(err) = self.send_frame(&Frame::Ping {
            opaque: opaque.clone(),
            ack: false,
        }) {
            return Err(self.fail(err));
        }
        Ok(opaque)
    }

    /// Announce that no new streams will be accepted. In-flight streams keep
    /// running; the connection closes once they are all retired.
    pub fn goaway(&mut self, code: ErrorCode) -> Result<(), ProtocolError> {
        self.ensure_open()?;
        if self.goaway_sent {
            return Ok(());
        }
        let frame = Frame::GoAway {
            last_stream_id: self.last_remote_id,
            code,
            debug: Vec::new(),
        };
        if let Err(err) = self.send_frame(&frame) {
            return Err(self.fail(err));
        }
        self.goaway_sent = true;
        self.state = match self.state {
            ConnectionState::Active => ConnectionState::GoAwaySent,
            ConnectionState::GoAwayReceived => ConnectionState::Draining,
            other => other,
        };
        debug!(last_stream_id = self.last_remote_id, %code, "GOAWAY sent");
        self.maybe_finish();
        Ok(())
    }

    /// Change our settings and advertise them to the peer.
    pub fn update_settings(&mut self, settings: Settings) -> Result<(), ProtocolError> {
        self.ensure_open()?;
        if settings.version() != self.config.version {
            return Err(ProtocolError::internal("settings are for the other protocol version"));
        }
        let mut deferred = None;
        for (id, value) in settings.iter() {
            match id {
                SettingId::InitialWindowSize => {
                    if value > MAX_WINDOW_SIZE {
                        return Err(ProtocolError::flow_control(format!(
                            "flow control error: initial window {} exceeds maximum",
                            value
                        )));
                    }
                    deferred = self.advertise_initial_window(value)?;
                    self.config.initial_window_size = value;
                }
                SettingId::MaxConcurrentStreams => self.config.max_concurrent_streams = Some(value),
                _ => {}
            }
        }
        if let Err(err) = self.send_frame(&Frame::Settings(settings)) {
            return Err(self.fail(err));
        }
        if self.config.version == Version::Http2 {
            self.pending_settings.push_back(deferred);
        }
        Ok(())
    }

    /// Apply a stream receive window we are about to advertise. Growing
    /// applies at once. Shrinking waits for the peer's SETTINGS ACK, since
    /// DATA already in flight was sent under the old window; the deferred
    /// value is returned. SPDY has no ACK and applies everything at once.
    fn advertise_initial_window(&mut self, window: u32) -> Result<Option<u32>, ProtocolError> {
        if self.config.version == Version::Http2 && window < self.windows.local_initial() {
            return Ok(Some(window));
        }
        self.windows.update_initial_recv_window(window)?;
        // A window applied now supersedes any shrink still waiting.
        for pending in self.pending_settings.iter_mut() {
            *pending = None;
        }
        Ok(None)
    }

    /// Tear the connection down now: GOAWAY (if not yet sent), CANCEL every
    /// remaining stream and return the compression context to its pool.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if !self.goaway_sent {
            if let Err(e) = self.goaway(ErrorCode::NoError) {
                warn!(error = %e, "failed to queue GOAWAY");
            }
        }
        for stream_id in self.sorted_stream_ids() {
            if let Err(e) = self.send_frame(&Frame::RstStream {
                stream_id,
                code: ErrorCode::Cancel,
            }) {
                warn!(stream_id, error = %e, "failed to queue RST_STREAM");
            }
            self.retire(stream_id);
        }
        if self.state != ConnectionState::Closed {
            self.shutdown();
        }
    }

    // -- Inbound frame handling --

    fn handle_frame(&mut self, frame: Frame) -> Result<(), ProtocolError> {
        trace!(frame = frame.name(), stream_id = frame.stream_id(), "recv");
        match frame {
            Frame::Data {
                stream_id,
                fin,
                data,
                padding,
            } => self.on_data(stream_id, fin, data, padding),
            Frame::Headers(headers) => self.on_headers(headers),
            Frame::PushPromise {
                stream_id,
                promised_id,
                headers,
            } => self.on_push_promise(stream_id, promised_id, headers),
            Frame::Priority { stream_id, priority } => {
                // Advisory; idle streams may be prioritized ahead of time but
                // are not tracked here.
                if let Some(stream) = self.streams.get_mut(&stream_id) {
                    stream.priority = priority;
                }
                Ok(())
            }
            Frame::RstStream { stream_id, code } => self.on_rst_stream(stream_id, code),
            Frame::Settings(settings) => self.on_settings(settings),
            Frame::AckSettings => {
                match self.pending_settings.pop_front() {
                    None => warn!("unsolicited SETTINGS acknowledgement"),
                    Some(Some(window)) => {
                        self.windows.update_initial_recv_window(window)?;
                        debug!(window, "stream receive window shrunk");
                    }
                    Some(None) => {}
                }
                self.events.push_back(Event::SettingsAcknowledged);
                Ok(())
            }
            Frame::Ping { opaque, ack } => {
                if !ack {
                    self.send_frame(&Frame::Ping {
                        opaque: opaque.clone(),
                        ack: true,
                    })?;
                }
                self.events.push_back(Event::Ping { opaque, ack });
                Ok(())
            }
            Frame::GoAway {
                last_stream_id,
                code,
                debug,
            } => {
                self.on_goaway(last_stream_id, code, debug);
                Ok(())
            }
            Frame::WindowUpdate { stream_id, delta } => {
                if stream_id == 0 || self.streams.contains_key(&stream_id) {
                    self.windows.apply_incoming_window_update(stream_id, delta)
                } else {
                    self.on_unknown_stream(stream_id, "WINDOW_UPDATE")
                }
            }
        }
    }

    fn on_data(&mut self, stream_id: u32, fin: bool, data: Vec<u8>, padding: Option<u8>) -> Result<(), ProtocolError> {
        // Padding counts against flow control.
        let size = data.len() as u32 + padding.map(|p| u32::from(p) + 1).unwrap_or(0);
        self.windows.apply_incoming_data(stream_id, size)?;

        match self.streams.get_mut(&stream_id) {
            Some(stream) if stream.state.can_recv() => {
                if fin {
                    stream.state = stream.state.close_remote();
                }
                self.events.push_back(Event::Data { stream_id, data, fin });
                self.maybe_retire(stream_id);
                Ok(())
            }
            Some(_) => Err(ProtocolError::new(
                ErrorCode::StreamClosed,
                format!("DATA frame on stream {} after FIN", stream_id),
            )
            .on_stream(stream_id)),
            None => self.on_unknown_stream(stream_id, "DATA"),
        }
    }

    fn on_headers(&mut self, frame: HeadersFrame) -> Result<(), ProtocolError> {
        let stream_id = frame.stream_id;
        let kind = match self.config.version {
            // HTTP/2 has one HEADERS frame; what it means depends on the stream.
            Version::Http2 => match self.streams.get(&stream_id) {
                Some(s) if !s.headers_received => HeadersKind::SynReply,
                Some(_) => HeadersKind::Headers,
                None if self.config.role.owns_stream(stream_id) || stream_id <= self.last_remote_id => {
                    return self.on_unknown_stream(stream_id, "HEADERS");
                }
                None => HeadersKind::SynStream,
            },
            Version::Spdy3 => frame.kind,
        };
        if kind == HeadersKind::SynStream {
            return self.open_remote_stream(frame);
        }

        let stream = match self.streams.get_mut(&stream_id) {
            Some(s) => s,
            None => return self.on_unknown_stream(stream_id, frame_name(kind)),
        };
        if kind == HeadersKind::SynReply {
            // Promised streams are peer-owned but still get a reply.
            if !stream.local && stream.associated_id == 0 {
                return Err(ProtocolError::protocol("SYN_REPLY for a stream the peer opened").on_stream(stream_id));
            }
            if stream.headers_received {
                return Err(
                    ProtocolError::new(ErrorCode::StreamInUse, "duplicate SYN_REPLY").on_stream(stream_id),
                );
            }
        }
        if !stream.state.can_recv() {
            return Err(ProtocolError::new(
                ErrorCode::StreamClosed,
                format!("{} on stream {} after FIN", frame_name(kind), stream_id),
            )
            .on_stream(stream_id));
        }
        stream.headers_received = true;
        if let Some(priority) = frame.priority {
            stream.priority = priority;
        }
        if frame.fin {
            stream.state = stream.state.close_remote();
        }
        let event = StreamHeaders {
            kind,
            stream_id,
            associated_id: stream.associated_id,
            fin: frame.fin,
            priority: stream.priority,
            path: frame.path().map(str::to_owned),
            headers: frame.headers,
        };
        self.events.push_back(Event::Headers(event));
        self.maybe_retire(stream_id);
        Ok(())
    }

    fn open_remote_stream(&mut self, frame: HeadersFrame) -> Result<(), ProtocolError> {
        let stream_id = frame.stream_id;
        self.accept_remote_id(stream_id)?;
        if self.refuse_new_stream(stream_id)? {
            return Ok(());
        }

        let mut stream = Stream::new(stream_id, false, frame.priority.unwrap_or_default());
        stream.state = StreamState::Open;
        stream.associated_id = frame.associated_id;
        stream.headers_received = true;
        if frame.unidirectional {
            stream.state = stream.state.close_local();
        }
        if frame.fin {
            stream.state = stream.state.close_remote();
        }
        let event = StreamHeaders {
            kind: HeadersKind::SynStream,
            stream_id,
            associated_id: frame.associated_id,
            fin: frame.fin,
            priority: stream.priority,
            path: frame.path().map(str::to_owned),
            headers: frame.headers,
        };
        self.streams.insert(stream_id, stream);
        self.windows.add_stream(stream_id);
        debug!(stream_id, "stream opened by peer");
        self.events.push_back(Event::Headers(event));
        self.maybe_retire(stream_id);
        Ok(())
    }

    fn on_push_promise(&mut self, parent: u32, promised_id: u32, headers: Headers) -> Result<(), ProtocolError> {
        if self.config.role == Role::Server {
            return Err(ProtocolError::protocol("PUSH_PROMISE received from a client"));
        }
        let priority = match self.streams.get(&parent) {
            Some(s) if s.state.can_recv() => s.priority,
            _ => {
                return Err(ProtocolError::protocol(format!(
                    "PUSH_PROMISE on stream {} which is not open",
                    parent
                )))
            }
        };
        self.accept_remote_id(promised_id)?;
        if self.refuse_new_stream(promised_id)? {
            return Ok(());
        }

        let mut stream = Stream::new(promised_id, false, priority);
        // Reserved (remote): only the peer sends.
        stream.state = StreamState::HalfClosedLocal;
        stream.associated_id = parent;
        let event = StreamHeaders {
            kind: HeadersKind::SynStream,
            stream_id: promised_id,
            associated_id: parent,
            fin: false,
            priority,
            path: headers.get(":path").map(str::to_owned),
            headers,
        };
        self.streams.insert(promised_id, stream);
        self.windows.add_stream(promised_id);
        debug!(stream_id = promised_id, parent, "stream promised by peer");
        self.events.push_back(Event::Headers(event));
        Ok(())
    }

    /// Check a peer-chosen id for a new stream: right parity, strictly
    /// increasing.
    fn accept_remote_id(&mut self, stream_id: u32) -> Result<(), ProtocolError> {
        if self.config.role.owns_stream(stream_id) {
            return Err(ProtocolError::protocol(format!(
                "invalid stream id {}: reserved for streams we open",
                stream_id
            )));
        }
        if stream_id <= self.last_remote_id {
            return Err(ProtocolError::protocol(format!(
                "invalid stream id {}: not greater than {}",
                stream_id, self.last_remote_id
            )));
        }
        self.last_remote_id = stream_id;
        Ok(())
    }

    /// Refuse a new peer stream after our GOAWAY or beyond our concurrency
    /// limit. Returns true when refused.
    fn refuse_new_stream(&mut self, stream_id: u32) -> Result<bool, ProtocolError> {
        let reason = if self.goaway_sent {
            "connection is going away"
        } else if self
            .config
            .max_concurrent_streams
            .is_some_and(|max| self.streams.values().filter(|s| !s.local).count() >= max as usize)
        {
            "too many concurrent streams"
        } else {
            return Ok(false);
        };
        debug!(stream_id, reason, "refusing stream");
        self.send_frame(&Frame::RstStream {
            stream_id,
            code: ErrorCode::RefusedStream,
        })?;
        // The peer may already have sent DATA on it.
        self.remember_closed(stream_id);
        Ok(true)
    }

    fn on_rst_stream(&mut self, stream_id: u32, code: ErrorCode) -> Result<(), ProtocolError> {
        if self.streams.contains_key(&stream_id) {
            debug!(stream_id, %code, "stream reset by peer");
            self.events.push_back(Event::StreamReset { stream_id, code });
            self.retire(stream_id);
            return Ok(());
        }
        match self.on_unknown_stream(stream_id, "RST_STREAM") {
            // Never answer RST_STREAM with RST_STREAM.
            Err(err) if !err.is_connection_error() => {
                self.errors.push_back(err);
                Ok(())
            }
            other => other,
        }
    }

    fn on_settings(&mut self, settings: Settings) -> Result<(), ProtocolError> {
        for (id, value) in settings.iter() {
            match id {
                SettingId::InitialWindowSize => self.windows.update_initial_send_window(value)?,
                SettingId::MaxFrameSize => self.codec.set_peer_max_frame_size(value),
                SettingId::HeaderTableSize => self.codec.set_peer_header_table_size(value),
                SettingId::MaxConcurrentStreams => self.peer_max_concurrent = Some(value),
                SettingId::EnablePush => self.peer_enable_push = value == 1,
                other => trace!(setting = ?other, value, "setting not applied"),
            }
        }
        debug!(count = settings.len(), "peer settings applied");
        if self.config.version == Version::Http2 {
            self.send_frame(&Frame::AckSettings)?;
        }
        self.events.push_back(Event::Settings(settings));
        Ok(())
    }

    fn on_goaway(&mut self, last_stream_id: u32, code: ErrorCode, debug: Vec<u8>) {
        if code == ErrorCode::NoError {
            debug!(last_stream_id, "GOAWAY received");
        } else {
            warn!(last_stream_id, %code, "GOAWAY received");
        }
        self.goaway_received = Some(last_stream_id);
        self.state = match self.state {
            ConnectionState::Active => ConnectionState::GoAwayReceived,
            ConnectionState::GoAwaySent => ConnectionState::Draining,
            other => other,
        };
        self.events.push_back(Event::GoAway {
            last_stream_id,
            code,
            debug,
        });

        // Streams we opened past the peer's last id were never processed.
        let role = self.config.role;
        let mut refused: Vec<u32> = self
            .streams
            .keys()
            .copied()
            .filter(|id| role.owns_stream(*id) && *id > last_stream_id)
            .collect();
        refused.sort_unstable();
        for stream_id in refused {
            self.events.push_back(Event::StreamReset {
                stream_id,
                code: ErrorCode::RefusedStream,
            });
            self.retire(stream_id);
        }
        self.maybe_finish();
    }

    /// A stream-level frame for a stream we do not track.
    fn on_unknown_stream(&mut self, stream_id: u32, frame: &str) -> Result<(), ProtocolError> {
        if self.is_idle(stream_id) {
            return Err(ProtocolError::protocol(format!(
                "{} frame on idle stream {}",
                frame, stream_id
            )));
        }
        if self.recently_closed.contains(&stream_id) {
            trace!(stream_id, frame, "ignoring frame on recently closed stream");
            return Ok(());
        }
        let code = match self.config.version {
            Version::Http2 => ErrorCode::StreamClosed,
            Version::Spdy3 => ErrorCode::InvalidStream,
        };
        Err(ProtocolError::new(code, format!("{} frame on closed stream {}", frame, stream_id)).on_stream(stream_id))
    }

    fn is_idle(&self, stream_id: u32) -> bool {
        if self.config.role.owns_stream(stream_id) {
            stream_id >= self.next_stream_id
        } else {
            stream_id > self.last_remote_id
        }
    }

    // -- Error handling --

    fn stream_error(&mut self, err: ProtocolError) {
        let Some(stream_id) = err.stream_id else {
            return;
        };
        warn!(stream_id, code = %err.code, message = %err.message, "stream error");
        if let Err(e) = self.send_frame(&Frame::RstStream {
            stream_id,
            code: err.code,
        }) {
            warn!(stream_id, error = %e, "failed to queue RST_STREAM");
        }
        self.retire(stream_id);
        self.errors.push_back(err);
    }

    /// Connection error: GOAWAY, fail every stream, release compression.
    fn fail(&mut self, err: ProtocolError) -> ProtocolError {
        warn!(code = %err.code, message = %err.message, "connection error");
        if !self.goaway_sent {
            let frame = Frame::GoAway {
                last_stream_id: self.last_remote_id,
                code: err.code,
                debug: err.message.clone().into_bytes(),
            };
            if let Err(e) = self.send_frame(&frame) {
                warn!(error = %e, "failed to queue GOAWAY");
            }
            self.goaway_sent = true;
        }
        for stream_id in self.sorted_stream_ids() {
            self.errors.push_back(
                ProtocolError::new(err.code, format!("connection error: {}", err.message)).on_stream(stream_id),
            );
            self.retire(stream_id);
        }
        self.errors.push_back(err.clone());
        self.shutdown();
        err
    }

    fn ensure_open(&self) -> Result<(), ProtocolError> {
        if self.state == ConnectionState::Closed {
            return Err(ProtocolError::internal("connection is closed"));
        }
        Ok(())
    }

    // -- Stream bookkeeping --

    fn allocate_stream_id(&mut self) -> Result<u32, ProtocolError> {
        let stream_id = self.next_stream_id;
        if stream_id > MAX_STREAM_ID {
            return Err(ProtocolError::protocol("stream ids exhausted"));
        }
        self.next_stream_id += 2;
        Ok(stream_id)
    }

    fn sorted_stream_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.streams.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn maybe_retire(&mut self, stream_id: u32) {
        let done = self
            .streams
            .get(&stream_id)
            .is_some_and(|s| s.state == StreamState::Closed && s.queue.is_empty());
        if done {
            self.retire(stream_id);
        }
    }

    /// Drop a stream's state and counters. Its id stays in the grace ring.
    fn retire(&mut self, stream_id: u32) {
        if self.streams.remove(&stream_id).is_none() {
            return;
        }
        self.windows.remove_stream(stream_id);
        self.remember_closed(stream_id);
        debug!(stream_id, "stream closed");
        self.events.push_back(Event::StreamClosed { stream_id });
        if let Some(host) = self.host.as_mut() {
            host.close(stream_id);
        }
        self.maybe_finish();
    }

    /// Keep `stream_id` in the grace ring so its late frames are absorbed.
    fn remember_closed(&mut self, stream_id: u32) {
        if self.config.closed_stream_grace == 0 {
            return;
        }
        if self.recently_closed.len() >= self.config.closed_stream_grace {
            self.recently_closed.pop_front();
        }
        self.recently_closed.push_back(stream_id);
    }

    /// After GOAWAY, close once the last stream is gone.
    fn maybe_finish(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if (self.goaway_sent || self.goaway_received.is_some()) && self.streams.is_empty() {
            self.shutdown();
        }
    }

    fn shutdown(&mut self) {
        self.state = ConnectionState::Closed;
        if let Some(pair) = self.codec.take_compression() {
            self.pool.put(pair);
        }
        debug!("connection closed");
    }

    // -- Output --

    fn send_frame(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        trace!(frame = frame.name(), stream_id = frame.stream_id(), "send");
        self.codec.serialize(frame, &mut self.send_buf)
    }

    fn queue_window_updates(&mut self) -> Result<(), ProtocolError> {
        for (stream_id, delta) in self.windows.take_recv_updates() {
            self.send_frame(&Frame::WindowUpdate { stream_id, delta })?;
        }
        Ok(())
    }

    fn is_ready(&self, stream: &Stream) -> bool {
        match stream.queue.front() {
            None => false,
            Some(Outbound::Headers { .. }) => true,
            Some(Outbound::Data { data, .. }) => data.is_empty() || self.windows.sendable(stream.id) > 0,
        }
    }

    /// Highest weight first, then lowest id.
    fn next_ready_stream(&self) -> Option<u32> {
        self.streams
            .values()
            .filter(|s| self.is_ready(s))
            .max_by(|a, b| a.priority.weight.cmp(&b.priority.weight).then(b.id.cmp(&a.id)))
            .map(|s| s.id)
    }

    fn flush_streams(&mut self) -> Result<(), ProtocolError> {
        while let Some(stream_id) = self.next_ready_stream() {
            self.write_next(stream_id)?;
        }
        Ok(())
    }

    /// Write the next queued item of a stream, at most one frame of DATA.
    fn write_next(&mut self, stream_id: u32) -> Result<(), ProtocolError> {
        let max_frame = self.codec.max_outbound_frame_size();
        let sendable = self.windows.sendable(stream_id);
        let version = self.config.version;
        let stream = match self.streams.get_mut(&stream_id) {
            Some(s) => s,
            None => return Ok(()),
        };
        let Some(item) = stream.queue.pop_front() else {
            return Ok(());
        };

        let (frame, fin) = match item {
            Outbound::Headers { headers, fin } => {
                let kind = if stream.headers_sent {
                    HeadersKind::Headers
                } else {
                    HeadersKind::SynReply
                };
                stream.headers_sent = true;
                let frame = HeadersFrame {
                    fin,
                    ..HeadersFrame::new(wire_kind(version, kind), stream_id, headers)
                };
                (Frame::Headers(frame), fin)
            }
            Outbound::Data { mut data, fin } => {
                let n = data.len().min(sendable).min(max_frame);
                let rest = data.split_off(n);
                let last = rest.is_empty();
                if !last {
                    stream.queue.push_front(Outbound::Data { data: rest, fin });
                }
                (Frame::data(stream_id, data, fin && last), fin && last)
            }
        };
        if fin {
            stream.state = stream.state.close_local();
        }
        if let Frame::Data { data, .. } = &frame {
            self.windows.apply_outgoing_data(stream_id, data.len() as u32)?;
        }
        self.send_frame(&frame)?;
        self.maybe_retire(stream_id);
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(pair) = self.codec.take_compression() {
            self.pool.put(pair);
        }
    }
}

fn not_writable(stream_id: u32) -> ProtocolError {
    ProtocolError::new(ErrorCode::StreamClosed, format!("stream {} is not writable", stream_id)).on_stream(stream_id)
}

/// HTTP/2 sends every header block as HEADERS.
fn wire_kind(version: Version, kind: HeadersKind) -> HeadersKind {
    match version {
        Version::Http2 => HeadersKind::Headers,
        Version::Spdy3 => kind,
    }
}

fn frame_name(kind: HeadersKind) -> &'static str {
    match kind {
        HeadersKind::SynStream => "SYN_STREAM",
        HeadersKind::SynReply => "SYN_REPLY",
        HeadersKind::Headers => "HEADERS",
    }
}
