//! HTTP/2 frame codec.
//!
//! Sans-I/O parser and serializer for RFC 7540 framing:
//! 1. Consumes the client connection preface (server side)
//! 2. Validates every frame header against its type's length and stream rules
//! 3. Reassembles HEADERS / PUSH_PROMISE + CONTINUATION into one header block
//!    and decompresses it with the connection's HPACK context
//! 4. Splits outbound header blocks into CONTINUATION frames by the peer's
//!    SETTINGS_MAX_FRAME_SIZE
//!
//! Reference: RFC 7540 (HTTP/2)

use tracing::trace;

use crate::codec::{missing_compression, read_u32, FrameCodec};
use crate::compression::CompressionPair;
use crate::config::{CodecConfig, Version, DEFAULT_MAX_FRAME_SIZE, MAX_FRAME_SIZE_LIMIT, MAX_WINDOW_SIZE};
use crate::error::{ErrorCode, ProtocolError};
use crate::frame::{Frame, HeadersFrame, HeadersKind, Priority, SettingId, Settings};
use crate::headers::Headers;

/// HTTP/2 frame types (RFC 7540 Section 6)
pub mod frame_type {
    pub const DATA: u8 = 0x0;
    pub const HEADERS: u8 = 0x1;
    pub const PRIORITY: u8 = 0x2;
    pub const RST_STREAM: u8 = 0x3;
    pub const SETTINGS: u8 = 0x4;
    pub const PUSH_PROMISE: u8 = 0x5;
    pub const PING: u8 = 0x6;
    pub const GOAWAY: u8 = 0x7;
    pub const WINDOW_UPDATE: u8 = 0x8;
    pub const CONTINUATION: u8 = 0x9;
}

/// HTTP/2 frame flags
pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    /// SETTINGS and PING
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// Size of the fixed frame header.
pub const FRAME_HEADER_SIZE: usize = 9;

/// A parsed HTTP/2 frame header (9 bytes)
#[derive(Debug, Clone)]
pub struct H2FrameHeader {
    pub length: u32, // 24 bits
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: u32, // 31 bits (high bit reserved)
}

impl H2FrameHeader {
    /// Parse a 9-byte frame header
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < FRAME_HEADER_SIZE {
            return None;
        }

        let length = ((data[0] as u32) << 16) | ((data[1] as u32) << 8) | (data[2] as u32);
        let frame_type = data[3];
        let flags = data[4];
        let stream_id = read_u32(&data[5..9]) & 0x7FFF_FFFF; // Clear reserved bit

        Some(Self {
            length,
            frame_type,
            flags,
            stream_id,
        })
    }

    /// Append the 9-byte encoding of this header.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.push((self.length >> 16) as u8);
        out.push((self.length >> 8) as u8);
        out.push(self.length as u8);
        out.push(self.frame_type);
        out.push(self.flags);
        out.extend_from_slice(&(self.stream_id & 0x7FFF_FFFF).to_be_bytes());
    }

    /// Total frame size including header
    pub fn total_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.length as usize
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    /// Check if END_STREAM flag is set
    pub fn is_end_stream(&self) -> bool {
        self.has_flag(flags::END_STREAM)
    }

    /// Check if END_HEADERS flag is set
    pub fn is_end_headers(&self) -> bool {
        self.has_flag(flags::END_HEADERS)
    }
}

/// The HTTP/2 connection preface (24 bytes)
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// What the open header block will become once END_HEADERS arrives.
#[derive(Debug)]
enum PendingKind {
    Headers { priority: Option<Priority>, fin: bool },
    PushPromise { promised_id: u32 },
}

/// A header block spread over HEADERS/PUSH_PROMISE + CONTINUATION frames.
#[derive(Debug)]
struct PendingBlock {
    stream_id: u32,
    kind: PendingKind,
    block: Vec<u8>,
    continuations: usize,
}

/// HTTP/2 frame codec.
///
/// Feed raw bytes in any chunking; complete logical frames come out with
/// their header blocks already decompressed.
#[derive(Debug)]
pub struct H2Codec {
    config: CodecConfig,
    /// Buffer for incomplete frames
    buffer: Vec<u8>,
    /// Connection preface received (for servers)
    preface_received: bool,
    /// Header block waiting for CONTINUATION + END_HEADERS
    pending: Option<PendingBlock>,
    /// Largest frame payload the peer accepts
    peer_max_frame_size: u32,
    compression: Option<CompressionPair>,
}

impl Default for H2Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl H2Codec {
    /// A server-side codec with default limits and a fresh HPACK context.
    pub fn new() -> Self {
        Self::with_compression(CodecConfig::default(), CompressionPair::new(Version::Http2))
    }

    pub fn with_compression(config: CodecConfig, compression: CompressionPair) -> Self {
        Self {
            config,
            buffer: Vec::new(),
            preface_received: false,
            pending: None,
            peer_max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            compression: Some(compression),
        }
    }

    pub fn preface_received(&self) -> bool {
        self.preface_received
    }

    /// Skip (or re-arm) the connection preface check. Clients never read a
    /// preface; servers behind an h2c upgrade have already consumed it.
    pub fn set_preface_received(&mut self, received: bool) {
        self.preface_received = received;
    }

    /// Consume the connection preface. Ok(false) means more bytes are needed.
    fn consume_preface(&mut self) -> Result<bool, ProtocolError> {
        let n = self.buffer.len().min(CONNECTION_PREFACE.len());
        if self.buffer[..n] != CONNECTION_PREFACE[..n] {
            return Err(ProtocolError::protocol("invalid connection preface"));
        }
        if n < CONNECTION_PREFACE.len() {
            return Ok(false);
        }
        self.buffer.drain(..CONNECTION_PREFACE.len());
        self.preface_received = true;
        trace!("connection preface received");
        Ok(true)
    }

    /// Parse a single frame. Ok(None) for frames that produce no logical
    /// frame (unknown types, non-final pieces of a header block).
    fn parse_frame(&mut self, header: &H2FrameHeader, payload: Vec<u8>) -> Result<Option<Frame>, ProtocolError> {
        if let Some(pending) = &self.pending {
            if header.frame_type != frame_type::CONTINUATION {
                return Err(ProtocolError::protocol(format!(
                    "expected CONTINUATION for stream {}, got frame type {:#x}",
                    pending.stream_id, header.frame_type
                )));
            }
        }

        match header.frame_type {
            frame_type::DATA => {
                require_stream(header, "DATA")?;
                let (data, padding) = strip_padding(header, payload, "DATA")?;
                Ok(Some(Frame::Data {
                    stream_id: header.stream_id,
                    fin: header.is_end_stream(),
                    data,
                    padding,
                }))
            }
            frame_type::HEADERS => {
                require_stream(header, "HEADERS")?;
                let (mut block, _) = strip_padding(header, payload, "HEADERS")?;
                let priority = if header.has_flag(flags::PRIORITY) {
                    if block.len() < 5 {
                        return Err(ProtocolError::frame_size("HEADERS frame: not enough space for priority"));
                    }
                    let priority = parse_priority(&block[..5]);
                    block.drain(..5);
                    Some(priority)
                } else {
                    None
                };
                let kind = PendingKind::Headers {
                    priority,
                    fin: header.is_end_stream(),
                };
                self.start_block(header, kind, block)
            }
            frame_type::PUSH_PROMISE => {
                require_stream(header, "PUSH_PROMISE")?;
                let (mut block, _) = strip_padding(header, payload, "PUSH_PROMISE")?;
                if block.len() < 4 {
                    return Err(ProtocolError::frame_size(
                        "PUSH_PROMISE frame: not enough space for promised stream id",
                    ));
                }
                let promised_id = read_u32(&block) & 0x7FFF_FFFF;
                block.drain(..4);
                if promised_id == 0 {
                    return Err(ProtocolError::protocol("PUSH_PROMISE frame has invalid promised stream id 0"));
                }
                self.start_block(header, PendingKind::PushPromise { promised_id }, block)
            }
            frame_type::CONTINUATION => self.continue_block(header, payload),
            frame_type::PRIORITY => {
                require_stream(header, "PRIORITY")?;
                if payload.len() != 5 {
                    return Err(ProtocolError::frame_size(format!(
                        "PRIORITY frame has unexpected length {}",
                        payload.len()
                    ))
                    .on_stream(header.stream_id));
                }
                let priority = parse_priority(&payload);
                if priority.parent == header.stream_id {
                    return Err(ProtocolError::protocol("stream cannot depend on itself").on_stream(header.stream_id));
                }
                Ok(Some(Frame::Priority {
                    stream_id: header.stream_id,
                    priority,
                }))
            }
            frame_type::RST_STREAM => {
                require_stream(header, "RST_STREAM")?;
                if payload.len() != 4 {
                    return Err(ProtocolError::frame_size(format!(
                        "RST_STREAM frame has unexpected length {}",
                        payload.len()
                    )));
                }
                Ok(Some(Frame::RstStream {
                    stream_id: header.stream_id,
                    code: ErrorCode::from_h2(read_u32(&payload)),
                }))
            }
            frame_type::SETTINGS => {
                require_connection(header, "SETTINGS")?;
                if header.has_flag(flags::ACK) {
                    if !payload.is_empty() {
                        return Err(ProtocolError::frame_size("ACK settings frame has non-zero body"));
                    }
                    return Ok(Some(Frame::AckSettings));
                }
                if payload.len() % 6 != 0 {
                    return Err(ProtocolError::frame_size(format!(
                        "SETTINGS payload length {} is not a multiple of 6",
                        payload.len()
                    )));
                }
                let mut settings = Settings::new(Version::Http2);
                for entry in payload.chunks_exact(6) {
                    let code = u16::from_be_bytes([entry[0], entry[1]]) as u32;
                    let value = read_u32(&entry[2..6]);
                    let id = SettingId::from_code(Version::Http2, code);
                    validate_setting(id, value)?;
                    settings.set(id, value);
                }
                Ok(Some(Frame::Settings(settings)))
            }
            frame_type::PING => {
                require_connection(header, "PING")?;
                if payload.len() != 8 {
                    return Err(ProtocolError::frame_size(format!(
                        "PING frame has unexpected length {}",
                        payload.len()
                    )));
                }
                Ok(Some(Frame::Ping {
                    opaque: payload,
                    ack: header.has_flag(flags::ACK),
                }))
            }
            frame_type::GOAWAY => {
                require_connection(header, "GOAWAY")?;
                if payload.len() < 8 {
                    return Err(ProtocolError::frame_size(format!(
                        "GOAWAY frame has unexpected length {}",
                        payload.len()
                    )));
                }
                Ok(Some(Frame::GoAway {
                    last_stream_id: read_u32(&payload) & 0x7FFF_FFFF,
                    code: ErrorCode::from_h2(read_u32(&payload[4..])),
                    debug: payload[8..].to_vec(),
                }))
            }
            frame_type::WINDOW_UPDATE => {
                if payload.len() != 4 {
                    return Err(ProtocolError::frame_size(format!(
                        "WINDOW_UPDATE frame has unexpected length {}",
                        payload.len()
                    )));
                }
                let delta = read_u32(&payload) & 0x7FFF_FFFF;
                if delta == 0 {
                    let err = ProtocolError::protocol("WINDOW_UPDATE with zero delta");
                    return Err(match header.stream_id {
                        0 => err,
                        id => err.on_stream(id),
                    });
                }
                Ok(Some(Frame::WindowUpdate {
                    stream_id: header.stream_id,
                    delta,
                }))
            }
            other => {
                trace!(frame_type = other, length = header.length, "ignoring unknown frame type");
                Ok(None)
            }
        }
    }

    fn start_block(
        &mut self,
        header: &H2FrameHeader,
        kind: PendingKind,
        block: Vec<u8>,
    ) -> Result<Option<Frame>, ProtocolError> {
        if block.len() > self.config.max_header_list_size {
            return Err(ProtocolError::protocol(format!(
                "header list is too large ({} bytes, max {})",
                block.len(),
                self.config.max_header_list_size
            )));
        }
        let pending = PendingBlock {
            stream_id: header.stream_id,
            kind,
            block,
            continuations: 0,
        };
        if header.is_end_headers() {
            return self.finish_block(pending).map(Some);
        }
        self.pending = Some(pending);
        Ok(None)
    }

    fn continue_block(&mut self, header: &H2FrameHeader, payload: Vec<u8>) -> Result<Option<Frame>, ProtocolError> {
        let mut pending = match self.pending.take() {
            Some(p) if p.stream_id == header.stream_id => p,
            Some(p) => {
                return Err(ProtocolError::protocol(format!(
                    "CONTINUATION frame for stream {} has no matching stream (pending header block on stream {})",
                    header.stream_id, p.stream_id
                )))
            }
            None => {
                return Err(ProtocolError::protocol(format!(
                    "CONTINUATION frame for stream {} has no matching stream",
                    header.stream_id
                )))
            }
        };

        pending.continuations += 1;
        if pending.continuations > self.config.max_continuation_frames {
            return Err(ProtocolError::protocol(format!(
                "header list is too large (more than {} CONTINUATION frames)",
                self.config.max_continuation_frames
            )));
        }
        // Guard against unbounded header block accumulation
        let new_size = pending.block.len() + payload.len();
        if new_size > self.config.max_header_list_size {
            return Err(ProtocolError::protocol(format!(
                "header list is too large ({} bytes, max {})",
                new_size, self.config.max_header_list_size
            )));
        }
        pending.block.extend_from_slice(&payload);

        if header.is_end_headers() {
            self.finish_block(pending).map(Some)
        } else {
            self.pending = Some(pending);
            Ok(None)
        }
    }

    fn finish_block(&mut self, pending: PendingBlock) -> Result<Frame, ProtocolError> {
        let pair = self.compression.as_mut().ok_or_else(missing_compression)?;
        let headers = pair
            .decompress
            .decode(&pending.block, self.config.max_header_list_size)?;
        trace!(
            stream_id = pending.stream_id,
            continuations = pending.continuations,
            count = headers.len(),
            "header block complete"
        );
        Ok(match pending.kind {
            // Checked after decoding so the HPACK context stays in sync.
            PendingKind::Headers {
                priority: Some(priority),
                ..
            } if priority.parent == pending.stream_id => {
                return Err(ProtocolError::protocol("stream cannot depend on itself").on_stream(pending.stream_id));
            }
            PendingKind::Headers { priority, fin } => Frame::Headers(HeadersFrame {
                priority,
                fin,
                ..HeadersFrame::new(HeadersKind::Headers, pending.stream_id, headers)
            }),
            PendingKind::PushPromise { promised_id } => Frame::PushPromise {
                stream_id: pending.stream_id,
                promised_id,
                headers,
            },
        })
    }

    /// Write a header block as one frame of `frame_type` followed by as many
    /// CONTINUATION frames as the peer's max frame size requires.
    fn write_header_block(
        &self,
        frame_type: u8,
        frame_flags: u8,
        stream_id: u32,
        prefix: &[u8],
        block: &[u8],
        out: &mut Vec<u8>,
    ) {
        let max = self.peer_max_frame_size as usize;
        let first_len = block.len().min(max.saturating_sub(prefix.len()));
        let (first, mut rest) = block.split_at(first_len);

        let mut first_flags = frame_flags;
        if rest.is_empty() {
            first_flags |= flags::END_HEADERS;
        }
        H2FrameHeader {
            length: (prefix.len() + first.len()) as u32,
            frame_type,
            flags: first_flags,
            stream_id,
        }
        .write(out);
        out.extend_from_slice(prefix);
        out.extend_from_slice(first);

        while !rest.is_empty() {
            let (chunk, tail) = rest.split_at(rest.len().min(max));
            rest = tail;
            H2FrameHeader {
                length: chunk.len() as u32,
                frame_type: frame_type::CONTINUATION,
                flags: if rest.is_empty() { flags::END_HEADERS } else { 0 },
                stream_id,
            }
            .write(out);
            out.extend_from_slice(chunk);
        }
    }

    fn encode_headers(&mut self, headers: &Headers) -> Result<Vec<u8>, ProtocolError> {
        let pair = self.compression.as_mut().ok_or_else(missing_compression)?;
        pair.compress.encode(headers)
    }
}

impl FrameCodec for H2Codec {
    fn version(&self) -> Version {
        Version::Http2
    }

    fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    fn poll_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        if !self.preface_received && !self.consume_preface()? {
            return Ok(None);
        }

        loop {
            let header = match H2FrameHeader::parse(&self.buffer) {
                Some(h) => h,
                None => return Ok(None),
            };
            if header.length > self.config.max_frame_size {
                return Err(ProtocolError::frame_size(format!(
                    "frame length {} exceeds maximum {}",
                    header.length, self.config.max_frame_size
                )));
            }

            // Check if we have the complete frame
            let total_size = header.total_size();
            if self.buffer.len() < total_size {
                return Ok(None);
            }

            // Extract frame payload: split buffer to avoid double copy
            let remainder = self.buffer.split_off(total_size);
            let mut payload = std::mem::replace(&mut self.buffer, remainder);
            payload.drain(..FRAME_HEADER_SIZE);

            if let Some(frame) = self.parse_frame(&header, payload)? {
                return Ok(Some(frame));
            }
        }
    }

    fn serialize(&mut self, frame: &Frame, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
        match frame {
            Frame::Data {
                stream_id,
                fin,
                data,
                padding,
            } => {
                let pad = padding.map(|p| 1 + p as usize).unwrap_or(0);
                let length = data.len() + pad;
                if length > self.peer_max_frame_size as usize {
                    return Err(ProtocolError::internal(format!(
                        "DATA frame of {} bytes exceeds peer max frame size {}",
                        length, self.peer_max_frame_size
                    )));
                }
                let mut frame_flags = 0;
                if *fin {
                    frame_flags |= flags::END_STREAM;
                }
                if padding.is_some() {
                    frame_flags |= flags::PADDED;
                }
                H2FrameHeader {
                    length: length as u32,
                    frame_type: frame_type::DATA,
                    flags: frame_flags,
                    stream_id: *stream_id,
                }
                .write(out);
                if let Some(p) = padding {
                    out.push(*p);
                }
                out.extend_from_slice(data);
                if let Some(p) = padding {
                    out.resize(out.len() + *p as usize, 0);
                }
            }
            Frame::Headers(h) => {
                // HTTP/2 has one HEADERS frame; its meaning comes from the
                // stream state, so nothing SPDY-specific can travel with it.
                if h.kind != HeadersKind::Headers || h.associated_id != 0 || h.unidirectional {
                    return Err(ProtocolError::internal(format!(
                        "{:?} header frame with associated id {} cannot be sent over HTTP/2",
                        h.kind, h.associated_id
                    )));
                }
                let block = self.encode_headers(&h.headers)?;
                let mut frame_flags = 0;
                if h.fin {
                    frame_flags |= flags::END_STREAM;
                }
                let mut prefix = Vec::new();
                if let Some(priority) = &h.priority {
                    frame_flags |= flags::PRIORITY;
                    write_priority(priority, &mut prefix);
                }
                self.write_header_block(frame_type::HEADERS, frame_flags, h.stream_id, &prefix, &block, out);
            }
            Frame::PushPromise {
                stream_id,
                promised_id,
                headers,
            } => {
                let block = self.encode_headers(headers)?;
                let prefix = (promised_id & 0x7FFF_FFFF).to_be_bytes();
                self.write_header_block(frame_type::PUSH_PROMISE, 0, *stream_id, &prefix, &block, out);
            }
            Frame::Priority { stream_id, priority } => {
                H2FrameHeader {
                    length: 5,
                    frame_type: frame_type::PRIORITY,
                    flags: 0,
                    stream_id: *stream_id,
                }
                .write(out);
                write_priority(priority, out);
            }
            Frame::RstStream { stream_id, code } => {
                H2FrameHeader {
                    length: 4,
                    frame_type: frame_type::RST_STREAM,
                    flags: 0,
                    stream_id: *stream_id,
                }
                .write(out);
                out.extend_from_slice(&code.to_h2().to_be_bytes());
            }
            Frame::Settings(settings) => {
                let mut payload = Vec::with_capacity(settings.len() * 6);
                for (id, value) in settings.iter() {
                    let code = id
                        .code(Version::Http2)
                        .filter(|code| *code <= u16::MAX as u32)
                        .ok_or_else(|| ProtocolError::internal(format!("{:?} is not an HTTP/2 setting", id)))?;
                    payload.extend_from_slice(&(code as u16).to_be_bytes());
                    payload.extend_from_slice(&value.to_be_bytes());
                }
                H2FrameHeader {
                    length: payload.len() as u32,
                    frame_type: frame_type::SETTINGS,
                    flags: 0,
                    stream_id: 0,
                }
                .write(out);
                out.extend_from_slice(&payload);
            }
            Frame::AckSettings => {
                H2FrameHeader {
                    length: 0,
                    frame_type: frame_type::SETTINGS,
                    flags: flags::ACK,
                    stream_id: 0,
                }
                .write(out);
            }
            Frame::Ping { opaque, ack } => {
                if opaque.len() != 8 {
                    return Err(ProtocolError::internal(format!(
                        "PING payload must be 8 bytes, got {}",
                        opaque.len()
                    )));
                }
                H2FrameHeader {
                    length: 8,
                    frame_type: frame_type::PING,
                    flags: if *ack { flags::ACK } else { 0 },
                    stream_id: 0,
                }
                .write(out);
                out.extend_from_slice(opaque);
            }
            Frame::GoAway {
                last_stream_id,
                code,
                debug,
            } => {
                H2FrameHeader {
                    length: (8 + debug.len()) as u32,
                    frame_type: frame_type::GOAWAY,
                    flags: 0,
                    stream_id: 0,
                }
                .write(out);
                out.extend_from_slice(&(last_stream_id & 0x7FFF_FFFF).to_be_bytes());
                out.extend_from_slice(&code.to_h2().to_be_bytes());
                out.extend_from_slice(debug);
            }
            Frame::WindowUpdate { stream_id, delta } => {
                H2FrameHeader {
                    length: 4,
                    frame_type: frame_type::WINDOW_UPDATE,
                    flags: 0,
                    stream_id: *stream_id,
                }
                .write(out);
                out.extend_from_slice(&(delta & 0x7FFF_FFFF).to_be_bytes());
            }
        }
        Ok(())
    }

    fn max_outbound_frame_size(&self) -> usize {
        self.peer_max_frame_size as usize
    }

    fn set_peer_max_frame_size(&mut self, size: u32) {
        self.peer_max_frame_size = size.clamp(DEFAULT_MAX_FRAME_SIZE, MAX_FRAME_SIZE_LIMIT);
    }

    fn set_peer_header_table_size(&mut self, size: u32) {
        if let Some(pair) = self.compression.as_mut() {
            pair.compress.set_max_table_size(size as usize);
        }
    }

    fn take_compression(&mut self) -> Option<CompressionPair> {
        self.compression.take()
    }
}

fn require_stream(header: &H2FrameHeader, name: &str) -> Result<(), ProtocolError> {
    if header.stream_id == 0 {
        return Err(ProtocolError::protocol(format!("{} frame has invalid stream id 0", name)));
    }
    Ok(())
}

fn require_connection(header: &H2FrameHeader, name: &str) -> Result<(), ProtocolError> {
    if header.stream_id != 0 {
        return Err(ProtocolError::protocol(format!(
            "{} frame requires zero stream id, got {}",
            name, header.stream_id
        )));
    }
    Ok(())
}

/// Remove the PADDED framing, returning the content and the pad length.
fn strip_padding(
    header: &H2FrameHeader,
    mut payload: Vec<u8>,
    name: &str,
) -> Result<(Vec<u8>, Option<u8>), ProtocolError> {
    if !header.has_flag(flags::PADDED) {
        return Ok((payload, None));
    }
    if payload.is_empty() {
        return Err(ProtocolError::frame_size(format!(
            "{} frame: not enough space for padding length",
            name
        )));
    }
    let pad_length = payload[0] as usize;
    if pad_length > payload.len() - 1 {
        return Err(ProtocolError::protocol(format!(
            "{} frame has invalid padding ({} bytes, {} available)",
            name,
            pad_length,
            payload.len() - 1
        )));
    }
    // Remove padding from end, then remove pad_length byte from start
    payload.truncate(payload.len() - pad_length);
    payload.remove(0);
    Ok((payload, Some(pad_length as u8)))
}

fn parse_priority(b: &[u8]) -> Priority {
    let dependency = read_u32(b);
    Priority {
        weight: b[4],
        parent: dependency & 0x7FFF_FFFF,
        exclusive: dependency & 0x8000_0000 != 0,
    }
}

fn write_priority(priority: &Priority, out: &mut Vec<u8>) {
    let mut dependency = priority.parent & 0x7FFF_FFFF;
    if priority.exclusive {
        dependency |= 0x8000_0000;
    }
    out.extend_from_slice(&dependency.to_be_bytes());
    out.push(priority.weight);
}

/// RFC 7540 Section 6.5.2 value checks.
fn validate_setting(id: SettingId, value: u32) -> Result<(), ProtocolError> {
    match id {
        SettingId::EnablePush if value > 1 => Err(ProtocolError::protocol(format!(
            "SETTINGS_ENABLE_PUSH must be 0 or 1, got {}",
            value
        ))),
        SettingId::InitialWindowSize if value > MAX_WINDOW_SIZE => Err(ProtocolError::flow_control(format!(
            "flow control error: SETTINGS_INITIAL_WINDOW_SIZE {} exceeds maximum",
            value
        ))),
        SettingId::MaxFrameSize if !(DEFAULT_MAX_FRAME_SIZE..=MAX_FRAME_SIZE_LIMIT).contains(&value) => {
            Err(ProtocolError::protocol(format!(
                "SETTINGS_MAX_FRAME_SIZE {} out of range",
                value
            )))
        }
        _ => Ok(()),
    }
}
