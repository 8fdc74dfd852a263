//! The seam between the multiplexer and the two wire formats.

use std::fmt;

use crate::compression::CompressionPair;
use crate::config::{Config, Version};
use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::h2_codec::H2Codec;
use crate::spdy_codec::SpdyCodec;

/// Incremental parser and serializer for one wire format.
///
/// Parsing is pull-based: [`FrameCodec::feed`] buffers bytes of arbitrary
/// chunking and [`FrameCodec::poll_frame`] yields the next complete logical
/// frame, or `Ok(None)` when more bytes are needed. The codec owns the
/// connection's compression context for both directions.
pub trait FrameCodec: fmt::Debug + Send {
    fn version(&self) -> Version;

    /// Buffer bytes read from the transport.
    fn feed(&mut self, data: &[u8]);

    /// Parse the next logical frame out of the buffered bytes.
    fn poll_frame(&mut self) -> Result<Option<Frame>, ProtocolError>;

    /// Append the wire encoding of `frame` to `out`. Header blocks are
    /// compressed here, so frames must be serialized in wire order.
    fn serialize(&mut self, frame: &Frame, out: &mut Vec<u8>) -> Result<(), ProtocolError>;

    /// Largest DATA payload the peer accepts in one frame.
    fn max_outbound_frame_size(&self) -> usize;

    /// Apply the peer's advertised SETTINGS_MAX_FRAME_SIZE.
    fn set_peer_max_frame_size(&mut self, size: u32);

    /// Apply the peer's advertised SETTINGS_HEADER_TABLE_SIZE to our encoder.
    fn set_peer_header_table_size(&mut self, size: u32);

    /// Release the compression context, e.g. to return it to its pool.
    /// Header frames cannot be parsed or serialized afterwards.
    fn take_compression(&mut self) -> Option<CompressionPair>;

    /// Feed `data` and drain every complete frame.
    fn process(&mut self, data: &[u8]) -> Result<Vec<Frame>, ProtocolError> {
        self.feed(data);
        let mut frames = Vec::new();
        while let Some(frame) = self.poll_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }
}

/// Build the codec for `config.version` around a checked-out context.
pub fn new_codec(config: &Config, compression: CompressionPair) -> Box<dyn FrameCodec> {
    match config.version {
        Version::Http2 => {
            let mut codec = H2Codec::with_compression(config.codec.clone(), compression);
            // Only servers read the client connection preface.
            if config.role == crate::config::Role::Client {
                codec.set_preface_received(true);
            }
            Box::new(codec)
        }
        Version::Spdy3 => Box::new(SpdyCodec::with_compression(
            config.codec.clone(),
            config.role,
            compression,
        )),
    }
}

pub(crate) fn missing_compression() -> ProtocolError {
    ProtocolError::internal("compression context already released")
}

pub(crate) fn read_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}
