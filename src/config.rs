//! Connection and codec configuration.

/// Wire protocol spoken on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    /// HTTP/2 (RFC 7540) with HPACK header compression.
    Http2,
    /// SPDY/3.1 with zlib header compression.
    Spdy3,
}

/// Which side of the connection we are. Clients open odd stream ids,
/// servers even ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    /// Whether `stream_id` belongs to the id space this role opens.
    pub fn owns_stream(self, stream_id: u32) -> bool {
        match self {
            Role::Client => stream_id % 2 == 1,
            Role::Server => stream_id != 0 && stream_id % 2 == 0,
        }
    }

    pub(crate) fn first_stream_id(self) -> u32 {
        match self {
            Role::Client => 1,
            Role::Server => 2,
        }
    }
}

/// Default SETTINGS_MAX_FRAME_SIZE (RFC 7540 Section 6.5.2).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;

/// Largest frame payload either wire format can describe (24-bit length).
pub const MAX_FRAME_SIZE_LIMIT: u32 = 16_777_215;

/// Default bound on CONTINUATION frames following one HEADERS frame.
pub const DEFAULT_MAX_CONTINUATION_FRAMES: usize = 1000;

/// Default bound on an accumulated or decompressed header list (256 KB).
/// Prevents unbounded memory growth from malicious/buggy CONTINUATION floods.
pub const DEFAULT_MAX_HEADER_LIST_SIZE: usize = 256 * 1024;

/// Default initial flow control window (RFC 7540 Section 6.9.2).
pub const DEFAULT_WINDOW_SIZE: u32 = 65_535;

/// Largest legal flow control window, 2^31 - 1.
pub const MAX_WINDOW_SIZE: u32 = 0x7fff_ffff;

/// Codec-level limits.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Largest inbound frame payload we accept (advertised as MAX_FRAME_SIZE).
    pub max_frame_size: u32,
    /// Largest number of CONTINUATION frames accepted for one header block.
    pub max_continuation_frames: usize,
    /// Largest compressed or decompressed header list, in bytes.
    pub max_header_list_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_continuation_frames: DEFAULT_MAX_CONTINUATION_FRAMES,
            max_header_list_size: DEFAULT_MAX_HEADER_LIST_SIZE,
        }
    }
}

/// Configuration for a multiplexed connection.
#[derive(Debug, Clone)]
pub struct Config {
    pub version: Version,
    pub role: Role,
    pub codec: CodecConfig,
    /// Initial receive window we advertise for every stream.
    pub initial_window_size: u32,
    /// Streams the peer may have open at once (advertised in SETTINGS).
    pub max_concurrent_streams: Option<u32>,
    /// How many recently closed stream ids absorb late DATA / WINDOW_UPDATE /
    /// RST_STREAM frames before such frames become stream errors.
    pub closed_stream_grace: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: Version::Http2,
            role: Role::Server,
            codec: CodecConfig::default(),
            initial_window_size: DEFAULT_WINDOW_SIZE,
            max_concurrent_streams: Some(100),
            closed_stream_grace: 64,
        }
    }
}

impl Config {
    pub fn new(version: Version, role: Role) -> Self {
        Self {
            version,
            role,
            ..Default::default()
        }
    }

    pub fn with_max_frame_size(mut self, size: u32) -> Self {
        self.codec.max_frame_size = size.clamp(DEFAULT_MAX_FRAME_SIZE, MAX_FRAME_SIZE_LIMIT);
        self
    }

    pub fn with_max_continuation_frames(mut self, frames: usize) -> Self {
        self.codec.max_continuation_frames = frames;
        self
    }

    pub fn with_max_header_list_size(mut self, bytes: usize) -> Self {
        self.codec.max_header_list_size = bytes;
        self
    }

    pub fn with_initial_window_size(mut self, size: u32) -> Self {
        self.initial_window_size = size.min(MAX_WINDOW_SIZE);
        self
    }

    pub fn with_max_concurrent_streams(mut self, streams: Option<u32>) -> Self {
        self.max_concurrent_streams = streams;
        self
    }

    pub fn with_closed_stream_grace(mut self, ids: usize) -> Self {
        self.closed_stream_grace = ids;
        self
    }
}
