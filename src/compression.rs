//! Header compression contexts and the pool that hands them out.
//!
//! A connection checks out one [`CompressionPair`] for its lifetime and gives
//! it back on teardown. The pool is the only structure shared between
//! connections: checkout and return are thread-safe, and every pair handed
//! out is exclusively owned by one connection until it comes back.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, trace};

use crate::config::Version;
use crate::error::ProtocolError;
use crate::headers::Headers;
use crate::hpack::{HpackDecoder, HpackEncoder};
use crate::zlib::{ZlibCompressor, ZlibDecompressor};

/// Outbound half of a compression context.
#[derive(Debug)]
pub enum Compressor {
    Hpack(HpackEncoder),
    Zlib(ZlibCompressor),
}

impl Compressor {
    pub fn new(version: Version) -> Self {
        match version {
            Version::Http2 => Compressor::Hpack(HpackEncoder::new()),
            Version::Spdy3 => Compressor::Zlib(ZlibCompressor::new()),
        }
    }

    /// Compress a header list. Mutates the context: blocks must reach the
    /// peer in the order they were encoded.
    pub fn encode(&mut self, headers: &Headers) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Compressor::Hpack(encoder) => Ok(encoder.encode(headers)),
            Compressor::Zlib(compressor) => compressor.encode(headers),
        }
    }

    /// Apply the peer's header table limit. zlib has no such limit.
    pub fn set_max_table_size(&mut self, size: usize) {
        if let Compressor::Hpack(encoder) = self {
            encoder.set_max_table_size(size);
        }
    }
}

/// Inbound half of a compression context.
#[derive(Debug)]
pub enum Decompressor {
    Hpack(HpackDecoder),
    Zlib(ZlibDecompressor),
}

impl Decompressor {
    pub fn new(version: Version) -> Self {
        match version {
            Version::Http2 => Decompressor::Hpack(HpackDecoder::new()),
            Version::Spdy3 => Decompressor::Zlib(ZlibDecompressor::new()),
        }
    }

    /// Decompress one complete header block. Must be called for every block
    /// in arrival order, including blocks of streams that will be refused.
    pub fn decode(&mut self, block: &[u8], max_list_size: usize) -> Result<Headers, ProtocolError> {
        match self {
            Decompressor::Hpack(decoder) => decoder.decode(block, max_list_size),
            Decompressor::Zlib(decompressor) => decompressor.decode(block, max_list_size),
        }
    }
}

/// The `{compress, decompress}` context of one connection.
#[derive(Debug)]
pub struct CompressionPair {
    pub compress: Compressor,
    pub decompress: Decompressor,
}

impl CompressionPair {
    pub fn new(version: Version) -> Self {
        Self {
            compress: Compressor::new(version),
            decompress: Decompressor::new(version),
        }
    }

    pub fn version(&self) -> Version {
        match self.compress {
            Compressor::Hpack(_) => Version::Http2,
            Compressor::Zlib(_) => Version::Spdy3,
        }
    }

    /// Rewind both halves to a fresh stream. Returns false when the context
    /// cannot be rewound and must be discarded instead.
    fn recycle(&mut self) -> bool {
        match (&mut self.compress, &mut self.decompress) {
            (Compressor::Zlib(c), Decompressor::Zlib(d)) => {
                c.reset();
                d.reset();
                true
            }
            // An HPACK dynamic table cannot be cleared in place.
            _ => false,
        }
    }
}

/// Default number of idle contexts kept for reuse.
pub const DEFAULT_POOL_CAPACITY: usize = 64;

/// Pool of compression contexts for one protocol variant.
///
/// SPDY zlib contexts are rewound and kept for reuse, saving the zlib state
/// allocation; HPACK contexts are dropped on return because a used dynamic
/// table must never reach another connection.
#[derive(Debug)]
pub struct CompressionPool {
    version: Version,
    idle_tx: Sender<CompressionPair>,
    idle_rx: Receiver<CompressionPair>,
    checked_out: AtomicUsize,
}

impl CompressionPool {
    pub fn new(version: Version) -> Self {
        Self::with_capacity(version, DEFAULT_POOL_CAPACITY)
    }

    pub fn with_capacity(version: Version, capacity: usize) -> Self {
        let (idle_tx, idle_rx) = crossbeam_channel::bounded(capacity.max(1));
        Self {
            version,
            idle_tx,
            idle_rx,
            checked_out: AtomicUsize::new(0),
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Check out a context pair, reusing an idle one when available.
    pub fn get(&self) -> CompressionPair {
        self.checked_out.fetch_add(1, Ordering::Relaxed);
        match self.idle_rx.try_recv() {
            Ok(pair) => {
                trace!(version = ?self.version, "reusing pooled compression context");
                pair
            }
            Err(_) => CompressionPair::new(self.version),
        }
    }

    /// Return a context pair checked out with [`CompressionPool::get`].
    pub fn put(&self, mut pair: CompressionPair) {
        let _ = self
            .checked_out
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)));
        if pair.version() != self.version || !pair.recycle() {
            return;
        }
        if let Err(TrySendError::Full(_)) = self.idle_tx.try_send(pair) {
            debug!(version = ?self.version, "compression pool full, dropping context");
        }
    }

    /// Contexts currently owned by connections.
    pub fn checked_out(&self) -> usize {
        self.checked_out.load(Ordering::Relaxed)
    }

    /// Contexts waiting for reuse.
    pub fn idle(&self) -> usize {
        self.idle_rx.len()
    }
}
