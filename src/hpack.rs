//! HPACK: Header Compression for HTTP/2 (RFC 7541)
//!
//! Thin wrapper around `fluke-hpack`. Each encoder/decoder owns one dynamic
//! table, so an instance must only ever see the header blocks of a single
//! connection direction, in wire order.

use crate::error::ProtocolError;
use crate::headers::Headers;

/// Dynamic table size both ends start with (RFC 7541 Section 4.2).
pub const DEFAULT_TABLE_SIZE: usize = 4096;

/// HPACK decoder for HTTP/2 header blocks.
pub struct HpackDecoder {
    inner: fluke_hpack::Decoder<'static>,
}

impl std::fmt::Debug for HpackDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HpackDecoder").finish()
    }
}

impl Default for HpackDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackDecoder {
    pub fn new() -> Self {
        Self {
            inner: fluke_hpack::Decoder::new(),
        }
    }

    /// Decode a complete header block.
    ///
    /// Any decode failure leaves the dynamic table in an unknown state, so it
    /// is reported as a connection-fatal COMPRESSION_ERROR.
    pub fn decode(&mut self, data: &[u8], max_list_size: usize) -> Result<Headers, ProtocolError> {
        let pairs = self
            .inner
            .decode(data)
            .map_err(|e| ProtocolError::compression(format!("HPACK decode error: {:?}", e)))?;
        let headers: Headers = pairs
            .into_iter()
            .map(|(name, value)| {
                (
                    String::from_utf8_lossy(&name).into_owned(),
                    String::from_utf8_lossy(&value).into_owned(),
                )
            })
            .collect();
        if headers.list_size() > max_list_size {
            return Err(ProtocolError::protocol(format!(
                "header list is too large ({} bytes, max {})",
                headers.list_size(),
                max_list_size
            )));
        }
        Ok(headers)
    }
}

/// HPACK encoder for HTTP/2 header blocks.
pub struct HpackEncoder {
    inner: fluke_hpack::Encoder<'static>,
    table_size: usize,
    /// Size change to announce at the start of the next block.
    size_update: Option<usize>,
}

impl std::fmt::Debug for HpackEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HpackEncoder").finish()
    }
}

impl Default for HpackEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackEncoder {
    pub fn new() -> Self {
        Self {
            inner: fluke_hpack::Encoder::new(),
            table_size: DEFAULT_TABLE_SIZE,
            size_update: None,
        }
    }

    pub fn table_size(&self) -> usize {
        self.table_size
    }

    /// Follow the peer's SETTINGS_HEADER_TABLE_SIZE. The table never grows
    /// past the default.
    pub fn set_max_table_size(&mut self, size: usize) {
        let size = size.min(DEFAULT_TABLE_SIZE);
        if size == self.table_size {
            return;
        }
        self.inner.set_max_table_size(size);
        self.table_size = size;
        self.size_update = Some(size);
    }

    /// Encode headers into an HPACK header block.
    pub fn encode(&mut self, headers: &Headers) -> Vec<u8> {
        let pairs: Vec<(&[u8], &[u8])> = headers
            .iter()
            .map(|h| (h.name.as_bytes(), h.value.as_bytes()))
            .collect();
        let mut block = Vec::new();
        if let Some(size) = self.size_update.take() {
            // Dynamic table size update: 001xxxxx
            let mut update = fluke_hpack::encoder::encode_integer(size, 5);
            update[0] |= 0x20;
            block.extend_from_slice(&update);
        }
        block.extend(self.inner.encode(pairs));
        block
    }
}
