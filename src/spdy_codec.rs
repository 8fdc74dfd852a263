//! SPDY/3.1 frame codec.
//!
//! Same contract as the HTTP/2 codec: raw bytes in, decompressed logical
//! frames out. SPDY has no CONTINUATION, no padding and no SETTINGS ACK;
//! header blocks travel zlib-compressed inside SYN_STREAM, SYN_REPLY and
//! HEADERS frames.
//!
//! Reference: SPDY Protocol - Draft 3.1

use tracing::trace;

use crate::codec::{missing_compression, read_u32, FrameCodec};
use crate::compression::CompressionPair;
use crate::config::{CodecConfig, Role, Version, DEFAULT_MAX_FRAME_SIZE, MAX_FRAME_SIZE_LIMIT, MAX_WINDOW_SIZE};
use crate::error::{ErrorCode, ProtocolError};
use crate::frame::{Frame, HeadersFrame, HeadersKind, Priority, SettingId, Settings};
use crate::headers::Headers;

/// The only protocol version this codec speaks.
pub const SPDY_VERSION: u16 = 3;

/// SPDY control frame types
pub mod frame_type {
    pub const SYN_STREAM: u16 = 1;
    pub const SYN_REPLY: u16 = 2;
    pub const RST_STREAM: u16 = 3;
    pub const SETTINGS: u16 = 4;
    pub const NOOP: u16 = 5;
    pub const PING: u16 = 6;
    pub const GOAWAY: u16 = 7;
    pub const HEADERS: u16 = 8;
    pub const WINDOW_UPDATE: u16 = 9;
    pub const CREDENTIAL: u16 = 10;
}

/// SPDY frame flags
pub mod flags {
    pub const FIN: u8 = 0x1;
    pub const UNIDIRECTIONAL: u8 = 0x2;
    /// SETTINGS only
    pub const CLEAR_SETTINGS: u8 = 0x1;
}

pub const FRAME_HEADER_SIZE: usize = 8;

/// A parsed 8-byte SPDY frame header.
///
/// Control frames carry a version and type; data frames carry a stream id
/// in the same position.
#[derive(Debug, Clone)]
pub enum SpdyFrameHeader {
    Control { version: u16, frame_type: u16, flags: u8, length: u32 },
    Data { stream_id: u32, flags: u8, length: u32 },
}

impl SpdyFrameHeader {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < FRAME_HEADER_SIZE {
            return None;
        }
        let flags = data[4];
        let length = ((data[5] as u32) << 16) | ((data[6] as u32) << 8) | (data[7] as u32);
        Some(if data[0] & 0x80 != 0 {
            SpdyFrameHeader::Control {
                version: u16::from_be_bytes([data[0], data[1]]) & 0x7FFF,
                frame_type: u16::from_be_bytes([data[2], data[3]]),
                flags,
                length,
            }
        } else {
            SpdyFrameHeader::Data {
                stream_id: read_u32(data) & 0x7FFF_FFFF,
                flags,
                length,
            }
        })
    }

    pub fn length(&self) -> u32 {
        match self {
            SpdyFrameHeader::Control { length, .. } | SpdyFrameHeader::Data { length, .. } => *length,
        }
    }

    pub fn total_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.length() as usize
    }
}

fn write_control(frame_type: u16, flags: u8, payload: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&(0x8000 | SPDY_VERSION).to_be_bytes());
    out.extend_from_slice(&frame_type.to_be_bytes());
    write_flags_length(flags, payload.len(), out);
    out.extend_from_slice(payload);
}

fn write_flags_length(flags: u8, length: usize, out: &mut Vec<u8>) {
    out.push(flags);
    out.push((length >> 16) as u8);
    out.push((length >> 8) as u8);
    out.push(length as u8);
}

/// SPDY/3.1 frame codec.
#[derive(Debug)]
pub struct SpdyCodec {
    config: CodecConfig,
    role: Role,
    buffer: Vec<u8>,
    compression: Option<CompressionPair>,
}

impl SpdyCodec {
    pub fn new(role: Role) -> Self {
        Self::with_compression(CodecConfig::default(), role, CompressionPair::new(Version::Spdy3))
    }

    pub fn with_compression(config: CodecConfig, role: Role, compression: CompressionPair) -> Self {
        Self {
            config,
            role,
            buffer: Vec::new(),
            compression: Some(compression),
        }
    }

    fn parse_control(&mut self, ty: u16, frame_flags: u8, payload: Vec<u8>) -> Result<Option<Frame>, ProtocolError> {
        match ty {
            frame_type::SYN_STREAM => {
                if payload.len() < 10 {
                    return Err(ProtocolError::frame_size(format!(
                        "SYN_STREAM frame has unexpected length {}",
                        payload.len()
                    )));
                }
                let stream_id = require_stream(&payload, "SYN_STREAM")?;
                let associated_id = read_u32(&payload[4..]) & 0x7FFF_FFFF;
                let priority = payload[8] >> 5;
                let headers = self.decode_block(&payload[10..])?;
                Ok(Some(Frame::Headers(HeadersFrame {
                    associated_id,
                    priority: Some(Priority::from_spdy(priority)),
                    fin: frame_flags & flags::FIN != 0,
                    unidirectional: frame_flags & flags::UNIDIRECTIONAL != 0,
                    ..HeadersFrame::new(HeadersKind::SynStream, stream_id, headers)
                })))
            }
            frame_type::SYN_REPLY | frame_type::HEADERS => {
                let (kind, name) = if ty == frame_type::SYN_REPLY {
                    (HeadersKind::SynReply, "SYN_REPLY")
                } else {
                    (HeadersKind::Headers, "HEADERS")
                };
                if payload.len() < 4 {
                    return Err(ProtocolError::frame_size(format!(
                        "{} frame has unexpected length {}",
                        name,
                        payload.len()
                    )));
                }
                let stream_id = require_stream(&payload, name)?;
                let headers = self.decode_block(&payload[4..])?;
                Ok(Some(Frame::Headers(HeadersFrame {
                    fin: frame_flags & flags::FIN != 0,
                    ..HeadersFrame::new(kind, stream_id, headers)
                })))
            }
            frame_type::RST_STREAM => {
                expect_length(&payload, 8, "RST_STREAM")?;
                let stream_id = require_stream(&payload, "RST_STREAM")?;
                Ok(Some(Frame::RstStream {
                    stream_id,
                    code: ErrorCode::from_spdy_rst(read_u32(&payload[4..])),
                }))
            }
            frame_type::SETTINGS => {
                if payload.len() < 4 {
                    return Err(ProtocolError::frame_size(format!(
                        "SETTINGS frame has unexpected length {}",
                        payload.len()
                    )));
                }
                if (payload.len() - 4) % 8 != 0 {
                    return Err(ProtocolError::frame_size(format!(
                        "SETTINGS payload length {} is not a multiple of 8",
                        payload.len() - 4
                    )));
                }
                let count = read_u32(&payload) as usize;
                if count.checked_mul(8) != Some(payload.len() - 4) {
                    return Err(ProtocolError::frame_size(format!(
                        "SETTINGS frame has unexpected length {} for {} entries",
                        payload.len(),
                        count
                    )));
                }
                let mut settings = Settings::new(Version::Spdy3);
                for entry in payload[4..].chunks_exact(8) {
                    // entry[0] carries PERSIST flags, which are not honored
                    let code = read_u32(entry) & 0x00FF_FFFF;
                    let value = read_u32(&entry[4..]);
                    let id = SettingId::from_code(Version::Spdy3, code);
                    if id == SettingId::InitialWindowSize && value > MAX_WINDOW_SIZE {
                        return Err(ProtocolError::flow_control(format!(
                            "flow control error: SETTINGS_INITIAL_WINDOW_SIZE {} exceeds maximum",
                            value
                        )));
                    }
                    settings.set(id, value);
                }
                if frame_flags & flags::CLEAR_SETTINGS != 0 {
                    trace!("peer asked to clear persisted settings");
                }
                Ok(Some(Frame::Settings(settings)))
            }
            frame_type::PING => {
                expect_length(&payload, 4, "PING")?;
                let id = read_u32(&payload);
                // Our own pings come back with an id of our parity.
                Ok(Some(Frame::Ping {
                    opaque: payload,
                    ack: self.role.owns_stream(id),
                }))
            }
            frame_type::GOAWAY => {
                expect_length(&payload, 8, "GOAWAY")?;
                Ok(Some(Frame::GoAway {
                    last_stream_id: read_u32(&payload) & 0x7FFF_FFFF,
                    code: ErrorCode::from_spdy_goaway(read_u32(&payload[4..])),
                    debug: Vec::new(),
                }))
            }
            frame_type::WINDOW_UPDATE => {
                expect_length(&payload, 8, "WINDOW_UPDATE")?;
                let stream_id = read_u32(&payload) & 0x7FFF_FFFF;
                let delta = read_u32(&payload[4..]) & 0x7FFF_FFFF;
                if delta == 0 {
                    let err = ProtocolError::protocol("WINDOW_UPDATE with zero delta");
                    return Err(match stream_id {
                        0 => err,
                        id => err.on_stream(id),
                    });
                }
                Ok(Some(Frame::WindowUpdate { stream_id, delta }))
            }
            other => {
                trace!(frame_type = other, length = payload.len(), "ignoring SPDY control frame");
                Ok(None)
            }
        }
    }

    fn decode_block(&mut self, block: &[u8]) -> Result<Headers, ProtocolError> {
        let pair = self.compression.as_mut().ok_or_else(missing_compression)?;
        pair.decompress.decode(block, self.config.max_header_list_size)
    }

    fn encode_block(&mut self, headers: &Headers) -> Result<Vec<u8>, ProtocolError> {
        let pair = self.compression.as_mut().ok_or_else(missing_compression)?;
        pair.compress.encode(headers)
    }
}

impl FrameCodec for SpdyCodec {
    fn version(&self) -> Version {
        Version::Spdy3
    }

    fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    fn poll_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        loop {
            let header = match SpdyFrameHeader::parse(&self.buffer) {
                Some(h) => h,
                None => return Ok(None),
            };
            if let SpdyFrameHeader::Control { version, .. } = header {
                if version != SPDY_VERSION {
                    return Err(ProtocolError::new(
                        ErrorCode::UnsupportedVersion,
                        format!("unsupported SPDY version {}", version),
                    ));
                }
            }

            let total_size = header.total_size();
            if self.buffer.len() < total_size {
                return Ok(None);
            }
            let remainder = self.buffer.split_off(total_size);
            let mut payload = std::mem::replace(&mut self.buffer, remainder);
            payload.drain(..FRAME_HEADER_SIZE);

            let frame = match header {
                SpdyFrameHeader::Data {
                    stream_id,
                    flags: frame_flags,
                    ..
                } => {
                    if stream_id == 0 {
                        return Err(ProtocolError::protocol("DATA frame has invalid stream id 0"));
                    }
                    Some(Frame::Data {
                        stream_id,
                        fin: frame_flags & flags::FIN != 0,
                        data: payload,
                        padding: None,
                    })
                }
                SpdyFrameHeader::Control {
                    frame_type: ty,
                    flags: frame_flags,
                    ..
                } => self.parse_control(ty, frame_flags, payload)?,
            };
            if let Some(frame) = frame {
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
                if padding.is_some() {
                    return Err(ProtocolError::internal("SPDY DATA frames cannot be padded"));
                }
                if data.len() > MAX_FRAME_SIZE_LIMIT as usize {
                    return Err(ProtocolError::internal(format!(
                        "DATA frame of {} bytes exceeds the 24-bit length field",
                        data.len()
                    )));
                }
                out.extend_from_slice(&(stream_id & 0x7FFF_FFFF).to_be_bytes());
                write_flags_length(if *fin { flags::FIN } else { 0 }, data.len(), out);
                out.extend_from_slice(data);
            }
            Frame::Headers(h) => {
                if h.kind != HeadersKind::SynStream && (h.priority.is_some() || h.associated_id != 0 || h.unidirectional)
                {
                    return Err(ProtocolError::internal(format!(
                        "{} frames carry no priority, associated id or UNIDIRECTIONAL flag",
                        if h.kind == HeadersKind::SynReply { "SYN_REPLY" } else { "HEADERS" }
                    )));
                }
                let block = self.encode_block(&h.headers)?;
                let mut frame_flags = 0;
                if h.fin {
                    frame_flags |= flags::FIN;
                }
                let mut payload = Vec::with_capacity(10 + block.len());
                payload.extend_from_slice(&(h.stream_id & 0x7FFF_FFFF).to_be_bytes());
                let ty = match h.kind {
                    HeadersKind::SynStream => {
                        if h.unidirectional {
                            frame_flags |= flags::UNIDIRECTIONAL;
                        }
                        let priority = h.priority.unwrap_or_default().to_spdy();
                        payload.extend_from_slice(&(h.associated_id & 0x7FFF_FFFF).to_be_bytes());
                        payload.push(priority << 5);
                        payload.push(0); // credential slot
                        frame_type::SYN_STREAM
                    }
                    HeadersKind::SynReply => frame_type::SYN_REPLY,
                    HeadersKind::Headers => frame_type::HEADERS,
                };
                payload.extend_from_slice(&block);
                write_control(ty, frame_flags, &payload, out);
            }
            Frame::RstStream { stream_id, code } => {
                let mut payload = [0u8; 8];
                payload[..4].copy_from_slice(&(stream_id & 0x7FFF_FFFF).to_be_bytes());
                payload[4..].copy_from_slice(&code.to_spdy_rst().to_be_bytes());
                write_control(frame_type::RST_STREAM, 0, &payload, out);
            }
            Frame::Settings(settings) => {
                let mut payload = Vec::with_capacity(4 + settings.len() * 8);
                payload.extend_from_slice(&(settings.len() as u32).to_be_bytes());
                for (id, value) in settings.iter() {
                    let code = id
                        .code(Version::Spdy3)
                        .filter(|code| *code <= 0x00FF_FFFF)
                        .ok_or_else(|| ProtocolError::internal(format!("{:?} is not a SPDY setting", id)))?;
                    payload.extend_from_slice(&code.to_be_bytes()); // flags byte stays 0
                    payload.extend_from_slice(&value.to_be_bytes());
                }
                write_control(frame_type::SETTINGS, 0, &payload, out);
            }
            Frame::Ping { opaque, .. } => {
                if opaque.len() != 4 {
                    return Err(ProtocolError::internal(format!(
                        "SPDY PING id must be 4 bytes, got {}",
                        opaque.len()
                    )));
                }
                write_control(frame_type::PING, 0, opaque, out);
            }
            Frame::GoAway {
                last_stream_id,
                code,
                ..
            } => {
                let mut payload = [0u8; 8];
                payload[..4].copy_from_slice(&(last_stream_id & 0x7FFF_FFFF).to_be_bytes());
                payload[4..].copy_from_slice(&code.to_spdy_goaway().to_be_bytes());
                write_control(frame_type::GOAWAY, 0, &payload, out);
            }
            Frame::WindowUpdate { stream_id, delta } => {
                let mut payload = [0u8; 8];
                payload[..4].copy_from_slice(&(stream_id & 0x7FFF_FFFF).to_be_bytes());
                payload[4..].copy_from_slice(&(delta & 0x7FFF_FFFF).to_be_bytes());
                write_control(frame_type::WINDOW_UPDATE, 0, &payload, out);
            }
            Frame::PushPromise { .. } | Frame::Priority { .. } | Frame::AckSettings => {
                return Err(ProtocolError::internal(format!(
                    "{} frames do not exist in SPDY",
                    frame.name()
                )));
            }
        }
        Ok(())
    }

    fn max_outbound_frame_size(&self) -> usize {
        DEFAULT_MAX_FRAME_SIZE as usize
    }

    fn set_peer_max_frame_size(&mut self, _size: u32) {}

    fn set_peer_header_table_size(&mut self, _size: u32) {}

    fn take_compression(&mut self) -> Option<CompressionPair> {
        self.compression.take()
    }
}

fn expect_length(payload: &[u8], length: usize, name: &str) -> Result<(), ProtocolError> {
    if payload.len() != length {
        return Err(ProtocolError::frame_size(format!(
            "{} frame has unexpected length {}",
            name,
            payload.len()
        )));
    }
    Ok(())
}

fn require_stream(payload: &[u8], name: &str) -> Result<u32, ProtocolError> {
    match read_u32(payload) & 0x7FFF_FFFF {
        0 => Err(ProtocolError::protocol(format!("{} frame has invalid stream id 0", name))),
        id => Ok(id),
    }
}
