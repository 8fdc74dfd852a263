//! Canonical error codes and the structured protocol error.
//!
//! HTTP/2 (RFC 7540 Section 7) and SPDY/3 share most of their error
//! vocabulary; `ErrorCode` is the union of both with one canonical name per
//! meaning, plus conversions to each variant's wire numbering.

use std::fmt;

/// Error codes shared between the HTTP/2 and SPDY wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError,
    ProtocolError,
    InternalError,
    FlowControlError,
    SettingsTimeout,
    StreamClosed,
    FrameSizeError,
    RefusedStream,
    Cancel,
    CompressionError,
    ConnectError,
    EnhanceYourCalm,
    InadequateSecurity,
    Http11Required,
    /// SPDY only: frame received for a stream that is not active.
    InvalidStream,
    /// SPDY only.
    UnsupportedVersion,
    /// SPDY only: SYN_STREAM for an id that is already open.
    StreamInUse,
    /// SPDY only.
    StreamAlreadyClosed,
    /// SPDY only.
    InvalidCredentials,
}

impl ErrorCode {
    /// Canonical name, e.g. `PROTOCOL_ERROR`.
    pub fn name(self) -> &'static str {
        match self {
            Self::NoError => "NO_ERROR",
            Self::ProtocolError => "PROTOCOL_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
            Self::FlowControlError => "FLOW_CONTROL_ERROR",
            Self::SettingsTimeout => "SETTINGS_TIMEOUT",
            Self::StreamClosed => "STREAM_CLOSED",
            Self::FrameSizeError => "FRAME_SIZE_ERROR",
            Self::RefusedStream => "REFUSED_STREAM",
            Self::Cancel => "CANCEL",
            Self::CompressionError => "COMPRESSION_ERROR",
            Self::ConnectError => "CONNECT_ERROR",
            Self::EnhanceYourCalm => "ENHANCE_YOUR_CALM",
            Self::InadequateSecurity => "INADEQUATE_SECURITY",
            Self::Http11Required => "HTTP_1_1_REQUIRED",
            Self::InvalidStream => "INVALID_STREAM",
            Self::UnsupportedVersion => "UNSUPPORTED_VERSION",
            Self::StreamInUse => "STREAM_IN_USE",
            Self::StreamAlreadyClosed => "STREAM_ALREADY_CLOSED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
        }
    }

    /// Decode an HTTP/2 error code. Unknown codes are treated as
    /// INTERNAL_ERROR (RFC 7540 Section 7).
    pub fn from_h2(value: u32) -> Self {
        match value {
            0x0 => Self::NoError,
            0x1 => Self::ProtocolError,
            0x2 => Self::InternalError,
            0x3 => Self::FlowControlError,
            0x4 => Self::SettingsTimeout,
            0x5 => Self::StreamClosed,
            0x6 => Self::FrameSizeError,
            0x7 => Self::RefusedStream,
            0x8 => Self::Cancel,
            0x9 => Self::CompressionError,
            0xa => Self::ConnectError,
            0xb => Self::EnhanceYourCalm,
            0xc => Self::InadequateSecurity,
            0xd => Self::Http11Required,
            _ => Self::InternalError,
        }
    }

    /// HTTP/2 wire value. SPDY-only codes fold onto their nearest
    /// HTTP/2 equivalent.
    pub fn to_h2(self) -> u32 {
        match self {
            Self::NoError => 0x0,
            Self::ProtocolError | Self::UnsupportedVersion | Self::InvalidCredentials => 0x1,
            Self::InternalError => 0x2,
            Self::FlowControlError => 0x3,
            Self::SettingsTimeout => 0x4,
            Self::StreamClosed | Self::InvalidStream | Self::StreamAlreadyClosed => 0x5,
            Self::FrameSizeError => 0x6,
            Self::RefusedStream | Self::StreamInUse => 0x7,
            Self::Cancel => 0x8,
            Self::CompressionError => 0x9,
            Self::ConnectError => 0xa,
            Self::EnhanceYourCalm => 0xb,
            Self::InadequateSecurity => 0xc,
            Self::Http11Required => 0xd,
        }
    }

    /// Decode a SPDY/3 RST_STREAM status code.
    pub fn from_spdy_rst(value: u32) -> Self {
        match value {
            1 => Self::ProtocolError,
            2 => Self::InvalidStream,
            3 => Self::RefusedStream,
            4 => Self::UnsupportedVersion,
            5 => Self::Cancel,
            6 => Self::InternalError,
            7 => Self::FlowControlError,
            8 => Self::StreamInUse,
            9 => Self::StreamAlreadyClosed,
            10 => Self::InvalidCredentials,
            11 => Self::FrameSizeError,
            _ => Self::InternalError,
        }
    }

    /// SPDY/3 RST_STREAM status code. SPDY has no "no error" reset, so
    /// NO_ERROR resets are sent as CANCEL.
    pub fn to_spdy_rst(self) -> u32 {
        match self {
            Self::ProtocolError | Self::CompressionError | Self::ConnectError => 1,
            Self::InvalidStream | Self::StreamClosed => 2,
            Self::RefusedStream => 3,
            Self::UnsupportedVersion => 4,
            Self::Cancel | Self::NoError => 5,
            Self::InternalError
            | Self::SettingsTimeout
            | Self::EnhanceYourCalm
            | Self::InadequateSecurity
            | Self::Http11Required => 6,
            Self::FlowControlError => 7,
            Self::StreamInUse => 8,
            Self::StreamAlreadyClosed => 9,
            Self::InvalidCredentials => 10,
            Self::FrameSizeError => 11,
        }
    }

    /// Decode a SPDY/3 GOAWAY status code.
    pub fn from_spdy_goaway(value: u32) -> Self {
        match value {
            0 => Self::NoError,
            1 => Self::ProtocolError,
            _ => Self::InternalError,
        }
    }

    /// SPDY/3 GOAWAY status: OK, PROTOCOL_ERROR or INTERNAL_ERROR.
    pub fn to_spdy_goaway(self) -> u32 {
        match self {
            Self::NoError => 0,
            Self::InternalError => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A protocol violation detected by the codec, a compression context, the
/// window manager or the multiplexer.
///
/// `stream_id` is `Some` when the error is scoped to one stream (the stream
/// is reset, the connection survives) and `None` when it is fatal for the
/// whole connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ProtocolError {
    pub code: ErrorCode,
    pub message: String,
    pub stream_id: Option<u32>,
}

impl ProtocolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            stream_id: None,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProtocolError, message)
    }

    pub fn frame_size(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::FrameSizeError, message)
    }

    pub fn compression(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CompressionError, message)
    }

    pub fn flow_control(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::FlowControlError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Scope the error to a single stream.
    pub fn on_stream(mut self, stream_id: u32) -> Self {
        self.stream_id = Some(stream_id);
        self
    }

    /// Whether the error tears down the whole connection.
    pub fn is_connection_error(&self) -> bool {
        self.stream_id.is_none()
    }
}
