//! Logical frames shared by the HTTP/2 and SPDY codecs.
//!
//! A `Frame` is what the codecs produce after a complete wire frame (or a
//! HEADERS + CONTINUATION sequence) has been read and its header block
//! decompressed. CONTINUATION never appears here: it is a wire-level detail
//! the codecs absorb.

use crate::config::Version;
use crate::error::ErrorCode;
use crate::headers::Headers;

/// Stream priority.
///
/// Modeled on HTTP/2 (RFC 7540 Section 5.3): `weight` is the wire byte, so the
/// effective weight is `weight + 1`. Higher weights are scheduled first. SPDY's
/// 3-bit priority (0 = highest) maps onto the same scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Priority {
    pub weight: u8,
    pub parent: u32,
    pub exclusive: bool,
}

impl Default for Priority {
    fn default() -> Self {
        Self {
            weight: 15,
            parent: 0,
            exclusive: false,
        }
    }
}

impl Priority {
    pub fn new(weight: u8) -> Self {
        Self {
            weight,
            ..Default::default()
        }
    }

    /// Map a SPDY priority (0 highest, 7 lowest) onto the weight scale.
    pub fn from_spdy(priority: u8) -> Self {
        Self::new((7 - priority.min(7)) * 36 + 3)
    }

    /// The SPDY priority closest to this weight.
    pub fn to_spdy(&self) -> u8 {
        7 - (self.weight / 36).min(7)
    }
}

/// Which kind of header-carrying frame produced a header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadersKind {
    /// Opens a stream (SPDY SYN_STREAM, first HTTP/2 HEADERS on an id).
    SynStream,
    /// First headers in reply to a locally opened stream.
    SynReply,
    /// Any later header block on an open stream (e.g. trailers).
    Headers,
}

/// A complete, decompressed header block with its stream metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersFrame {
    pub kind: HeadersKind,
    pub stream_id: u32,
    /// Stream this one is associated with (server push), 0 if none.
    pub associated_id: u32,
    pub priority: Option<Priority>,
    pub fin: bool,
    /// SPDY UNIDIRECTIONAL flag: the receiver may not send on this stream.
    pub unidirectional: bool,
    pub headers: Headers,
}

impl HeadersFrame {
    pub fn new(kind: HeadersKind, stream_id: u32, headers: Headers) -> Self {
        Self {
            kind,
            stream_id,
            associated_id: 0,
            priority: None,
            fin: false,
            unidirectional: false,
            headers,
        }
    }

    pub fn path(&self) -> Option<&str> {
        self.headers.get(":path")
    }
}

/// Known SETTINGS parameters of both protocol variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingId {
    HeaderTableSize,
    EnablePush,
    MaxConcurrentStreams,
    InitialWindowSize,
    MaxFrameSize,
    MaxHeaderListSize,
    UploadBandwidth,
    DownloadBandwidth,
    RoundTripTime,
    CurrentCwnd,
    DownloadRetransRate,
    ClientCertificateVectorSize,
    /// An identifier this crate does not interpret.
    Unknown(u32),
}

impl SettingId {
    /// Resolve a wire identifier for the given protocol variant.
    pub fn from_code(version: Version, code: u32) -> Self {
        match (version, code) {
            (Version::Http2, 0x1) => Self::HeaderTableSize,
            (Version::Http2, 0x2) => Self::EnablePush,
            (Version::Http2, 0x3) => Self::MaxConcurrentStreams,
            (Version::Http2, 0x4) => Self::InitialWindowSize,
            (Version::Http2, 0x5) => Self::MaxFrameSize,
            (Version::Http2, 0x6) => Self::MaxHeaderListSize,
            (Version::Spdy3, 1) => Self::UploadBandwidth,
            (Version::Spdy3, 2) => Self::DownloadBandwidth,
            (Version::Spdy3, 3) => Self::RoundTripTime,
            (Version::Spdy3, 4) => Self::MaxConcurrentStreams,
            (Version::Spdy3, 5) => Self::CurrentCwnd,
            (Version::Spdy3, 6) => Self::DownloadRetransRate,
            (Version::Spdy3, 7) => Self::InitialWindowSize,
            (Version::Spdy3, 8) => Self::ClientCertificateVectorSize,
            (_, other) => Self::Unknown(other),
        }
    }

    /// Wire identifier in the given variant, if the parameter exists there.
    pub fn code(self, version: Version) -> Option<u32> {
        match (version, self) {
            (_, Self::Unknown(code)) => Some(code),
            (Version::Http2, Self::HeaderTableSize) => Some(0x1),
            (Version::Http2, Self::EnablePush) => Some(0x2),
            (Version::Http2, Self::MaxConcurrentStreams) => Some(0x3),
            (Version::Http2, Self::InitialWindowSize) => Some(0x4),
            (Version::Http2, Self::MaxFrameSize) => Some(0x5),
            (Version::Http2, Self::MaxHeaderListSize) => Some(0x6),
            (Version::Spdy3, Self::UploadBandwidth) => Some(1),
            (Version::Spdy3, Self::DownloadBandwidth) => Some(2),
            (Version::Spdy3, Self::RoundTripTime) => Some(3),
            (Version::Spdy3, Self::MaxConcurrentStreams) => Some(4),
            (Version::Spdy3, Self::CurrentCwnd) => Some(5),
            (Version::Spdy3, Self::DownloadRetransRate) => Some(6),
            (Version::Spdy3, Self::InitialWindowSize) => Some(7),
            (Version::Spdy3, Self::ClientCertificateVectorSize) => Some(8),
            _ => None,
        }
    }

    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::HeaderTableSize => "header_table_size",
            Self::EnablePush => "enable_push",
            Self::MaxConcurrentStreams => "max_concurrent_streams",
            Self::InitialWindowSize => "initial_window_size",
            Self::MaxFrameSize => "max_frame_size",
            Self::MaxHeaderListSize => "max_header_list_size",
            Self::UploadBandwidth => "upload_bandwidth",
            Self::DownloadBandwidth => "download_bandwidth",
            Self::RoundTripTime => "round_trip_time",
            Self::CurrentCwnd => "current_cwnd",
            Self::DownloadRetransRate => "download_retrans_rate",
            Self::ClientCertificateVectorSize => "client_certificate_vector_size",
            Self::Unknown(_) => return None,
        })
    }

    pub fn from_name(name: &str) -> Option<Self> {
        const KNOWN: [SettingId; 12] = [
            SettingId::HeaderTableSize,
            SettingId::EnablePush,
            SettingId::MaxConcurrentStreams,
            SettingId::InitialWindowSize,
            SettingId::MaxFrameSize,
            SettingId::MaxHeaderListSize,
            SettingId::UploadBandwidth,
            SettingId::DownloadBandwidth,
            SettingId::RoundTripTime,
            SettingId::CurrentCwnd,
            SettingId::DownloadRetransRate,
            SettingId::ClientCertificateVectorSize,
        ];
        KNOWN
            .into_iter()
            .find(|id| id.name().is_some_and(|n| n.eq_ignore_ascii_case(name)))
    }
}

/// The parameters carried by one SETTINGS frame, in wire order.
///
/// A parameter can be looked up by [`SettingId`], by its numeric wire code or
/// by its symbolic name; all three resolve to the same entry. When a
/// parameter repeats, the last value wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    version: Version,
    entries: Vec<(SettingId, u32)>,
}

impl Settings {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            entries: Vec::new(),
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set(&mut self, id: SettingId, value: u32) {
        self.entries.push((id, value));
    }

    /// Builder form of [`Settings::set`].
    pub fn with(mut self, id: SettingId, value: u32) -> Self {
        self.set(id, value);
        self
    }

    pub fn get(&self, id: SettingId) -> Option<u32> {
        self.entries
            .iter()
            .rev()
            .find(|(entry, _)| *entry == id)
            .map(|(_, value)| *value)
    }

    /// Look up by numeric identifier, as numbered by this frame's variant.
    pub fn get_code(&self, code: u32) -> Option<u32> {
        self.get(SettingId::from_code(self.version, code))
    }

    /// Look up by symbolic name, e.g. `"initial_window_size"`.
    pub fn get_name(&self, name: &str) -> Option<u32> {
        SettingId::from_name(name).and_then(|id| self.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (SettingId, u32)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A logical frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data {
        stream_id: u32,
        fin: bool,
        data: Vec<u8>,
        /// HTTP/2 pad length, if the frame was (or should be) padded.
        padding: Option<u8>,
    },
    Headers(HeadersFrame),
    /// HTTP/2 server push announcement.
    PushPromise {
        stream_id: u32,
        promised_id: u32,
        headers: Headers,
    },
    Priority {
        stream_id: u32,
        priority: Priority,
    },
    RstStream {
        stream_id: u32,
        code: ErrorCode,
    },
    Settings(Settings),
    AckSettings,
    /// Opaque payload is 8 bytes for HTTP/2 and a 4-byte id for SPDY.
    Ping {
        opaque: Vec<u8>,
        ack: bool,
    },
    GoAway {
        last_stream_id: u32,
        code: ErrorCode,
        debug: Vec<u8>,
    },
    WindowUpdate {
        stream_id: u32,
        delta: u32,
    },
}

impl Frame {
    pub fn data(stream_id: u32, data: impl Into<Vec<u8>>, fin: bool) -> Self {
        Frame::Data {
            stream_id,
            fin,
            data: data.into(),
            padding: None,
        }
    }

    /// Stream the frame applies to; 0 for connection-level frames.
    pub fn stream_id(&self) -> u32 {
        match self {
            Frame::Data { stream_id, .. }
            | Frame::PushPromise { stream_id, .. }
            | Frame::Priority { stream_id, .. }
            | Frame::RstStream { stream_id, .. }
            | Frame::WindowUpdate { stream_id, .. } => *stream_id,
            Frame::Headers(headers) => headers.stream_id,
            Frame::Settings(_) | Frame::AckSettings | Frame::Ping { .. } | Frame::GoAway { .. } => 0,
        }
    }

    /// Canonical frame type name.
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Data { .. } => "DATA",
            Frame::Headers(h) => match h.kind {
                HeadersKind::SynStream => "SYN_STREAM",
                HeadersKind::SynReply => "SYN_REPLY",
                HeadersKind::Headers => "HEADERS",
            },
            Frame::PushPromise { .. } => "PUSH_PROMISE",
            Frame::Priority { .. } => "PRIORITY",
            Frame::RstStream { .. } => "RST_STREAM",
            Frame::Settings(_) => "SETTINGS",
            Frame::AckSettings => "ACK_SETTINGS",
            Frame::Ping { .. } => "PING",
            Frame::GoAway { .. } => "GOAWAY",
            Frame::WindowUpdate { .. } => "WINDOW_UPDATE",
        }
    }
}
