//! SPDY/3 header compression.
//!
//! SPDY header blocks are a length-prefixed name/value list compressed with
//! zlib, primed with a fixed dictionary of common header tokens. The zlib
//! stream spans every header block of one direction of a connection, so like
//! HPACK the context is stateful and order-dependent.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use once_cell::sync::Lazy;

use crate::error::ProtocolError;
use crate::headers::Headers;

const DICTIONARY_WORDS: [&str; 65] = [
    "options", "head", "post", "put", "delete", "trace", "accept", "accept-charset",
    "accept-encoding", "accept-language", "accept-ranges", "age", "allow", "authorization",
    "cache-control", "connection", "content-base", "content-encoding", "content-language",
    "content-length", "content-location", "content-md5", "content-range", "content-type",
    "date", "etag", "expect", "expires", "from", "host", "if-match", "if-modified-since",
    "if-none-match", "if-range", "if-unmodified-since", "last-modified", "location",
    "max-forwards", "pragma", "proxy-authenticate", "proxy-authorization", "range", "referer",
    "retry-after", "server", "te", "trailer", "transfer-encoding", "upgrade", "user-agent",
    "vary", "via", "warning", "www-authenticate", "method", "get", "status", "200 OK",
    "version", "HTTP/1.1", "url", "public", "set-cookie", "keep-alive", "origin",
];

const DICTIONARY_TAIL: &str = concat!(
    "100101201202205206300302303304305306307402405406407408409410411412413414415416417",
    "502504505203 Non-Authoritative Information204 No Content301 Moved Permanently",
    "400 Bad Request401 Unauthorized403 Forbidden404 Not Found500 Internal Server Error",
    "501 Not Implemented503 Service UnavailableJan Feb Mar Apr May Jun Jul Aug Sept Oct",
    " Nov Dec 00:00:00 Mon, Tue, Wed, Thu, Fri, Sat, Sun, GMTchunked,text/html,image/png,",
    "image/jpg,image/gif,application/xml,application/xhtml+xml,text/plain,text/javascript,",
    "publicprivatemax-age=gzip,deflate,sdchcharset=utf-8charset=iso-8859-1,utf-,*,enq=0.",
);

/// The SPDY/3 zlib dictionary (1423 bytes), built once per process and
/// shared by every context.
pub static SPDY3_DICTIONARY: Lazy<Vec<u8>> = Lazy::new(|| {
    let mut dict = Vec::with_capacity(1423);
    for word in DICTIONARY_WORDS {
        dict.extend_from_slice(&(word.len() as u32).to_be_bytes());
        dict.extend_from_slice(word.as_bytes());
    }
    dict.extend_from_slice(DICTIONARY_TAIL.as_bytes());
    dict
});

/// Serialize headers as a SPDY/3 name/value block. Repeated names are merged
/// into one entry with NUL-separated values, as the format requires.
pub fn encode_name_value_block(headers: &Headers) -> Vec<u8> {
    let mut entries: Vec<(String, Vec<&str>)> = Vec::new();
    for header in headers {
        let name = header.name.to_ascii_lowercase();
        match entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, values)) => values.push(&header.value),
            None => entries.push((name, vec![&header.value])),
        }
    }

    let mut block = Vec::new();
    block.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    for (name, values) in &entries {
        let value = values.join("\0");
        block.extend_from_slice(&(name.len() as u32).to_be_bytes());
        block.extend_from_slice(name.as_bytes());
        block.extend_from_slice(&(value.len() as u32).to_be_bytes());
        block.extend_from_slice(value.as_bytes());
    }
    block
}

/// Parse an uncompressed SPDY/3 name/value block.
pub fn decode_name_value_block(block: &[u8]) -> Result<Headers, ProtocolError> {
    let mut reader = BlockReader { block, pos: 0 };
    let count = reader.read_u32()?;
    let mut headers = Headers::new();
    let mut seen: Vec<String> = Vec::new();
    for _ in 0..count {
        let name = reader.read_string()?;
        if name.is_empty() {
            return Err(ProtocolError::protocol("empty header name in header block"));
        }
        if seen.contains(&name) {
            return Err(ProtocolError::protocol(format!("duplicate header name {:?}", name)));
        }
        let value = reader.read_string()?;
        for part in value.split('\0') {
            headers.push(name.clone(), part);
        }
        seen.push(name);
    }
    if reader.pos != block.len() {
        return Err(ProtocolError::protocol("trailing bytes after header block"));
    }
    Ok(headers)
}

struct BlockReader<'a> {
    block: &'a [u8],
    pos: usize,
}

impl BlockReader<'_> {
    fn take(&mut self, len: usize) -> Result<&[u8], ProtocolError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.block.len())
            .ok_or_else(|| ProtocolError::protocol("truncated header block"))?;
        let bytes = &self.block[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Compressing half of a SPDY header compression context.
pub struct ZlibCompressor {
    inner: Compress,
    primed: bool,
}

impl std::fmt::Debug for ZlibCompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZlibCompressor")
            .field("total_in", &self.inner.total_in())
            .finish()
    }
}

impl Default for ZlibCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl ZlibCompressor {
    pub fn new() -> Self {
        Self {
            inner: Compress::new(Compression::default(), true),
            primed: false,
        }
    }

    /// Encode and compress one header block, sync-flushed so the peer can
    /// decode it without waiting for more input.
    pub fn encode(&mut self, headers: &Headers) -> Result<Vec<u8>, ProtocolError> {
        if !self.primed {
            self.inner
                .set_dictionary(&SPDY3_DICTIONARY)
                .map_err(|e| ProtocolError::internal(format!("zlib dictionary: {}", e)))?;
            self.primed = true;
        }

        let block = encode_name_value_block(headers);
        let start = self.inner.total_in();
        let mut out = Vec::with_capacity(block.len() / 2 + 64);
        loop {
            if out.capacity() - out.len() < 64 {
                out.reserve(1024);
            }
            let consumed = (self.inner.total_in() - start) as usize;
            self.inner
                .compress_vec(&block[consumed..], &mut out, FlushCompress::Sync)
                .map_err(|e| ProtocolError::internal(format!("zlib compress: {}", e)))?;
            let consumed = (self.inner.total_in() - start) as usize;
            // Output space left over means the flush completed.
            if consumed == block.len() && out.len() < out.capacity() {
                break;
            }
        }
        Ok(out)
    }

    /// Rewind to a fresh stream so the context can serve another connection.
    pub fn reset(&mut self) {
        self.inner.reset();
        self.primed = false;
    }
}

/// Decompressing half of a SPDY header compression context.
pub struct ZlibDecompressor {
    inner: Decompress,
}

impl std::fmt::Debug for ZlibDecompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZlibDecompressor")
            .field("total_in", &self.inner.total_in())
            .finish()
    }
}

impl Default for ZlibDecompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl ZlibDecompressor {
    pub fn new() -> Self {
        Self {
            inner: Decompress::new(true),
        }
    }

    /// Inflate and parse one header block. `max_list_size` bounds the
    /// inflated size.
    pub fn decode(&mut self, data: &[u8], max_list_size: usize) -> Result<Headers, ProtocolError> {
        let raw = self.inflate(data, max_list_size)?;
        decode_name_value_block(&raw)
    }

    fn inflate(&mut self, data: &[u8], max_list_size: usize) -> Result<Vec<u8>, ProtocolError> {
        let start = self.inner.total_in();
        let mut out = Vec::with_capacity(data.len() * 2 + 64);
        loop {
            if out.capacity() - out.len() < 64 {
                out.reserve(1024);
            }
            let consumed = (self.inner.total_in() - start) as usize;
            match self
                .inner
                .decompress_vec(&data[consumed..], &mut out, FlushDecompress::Sync)
            {
                Ok(Status::StreamEnd) => break,
                Ok(_) => {}
                Err(e) if e.needs_dictionary().is_some() => {
                    self.inner
                        .set_dictionary(&SPDY3_DICTIONARY)
                        .map_err(|e| ProtocolError::compression(format!("zlib dictionary: {}", e)))?;
                    continue;
                }
                Err(e) => {
                    return Err(ProtocolError::compression(format!("zlib inflate: {}", e)));
                }
            }
            if out.len() > max_list_size {
                return Err(ProtocolError::protocol(format!(
                    "header list is too large (more than {} bytes)",
                    max_list_size
                )));
            }
            let consumed = (self.inner.total_in() - start) as usize;
            if consumed == data.len() && out.len() < out.capacity() {
                break;
            }
        }
        Ok(out)
    }

    /// Rewind to a fresh stream so the context can serve another connection.
    pub fn reset(&mut self) {
        self.inner.reset(true);
    }
}
