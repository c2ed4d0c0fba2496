//! Frame codec: zlib-compressed, CRLF-terminated protocol text.
//!
//! Every message on the wire is a complete zlib stream. One read from a
//! peer is treated as exactly one frame; there is no reassembly of frames
//! split across reads, nor splitting of frames coalesced into one read.

use crate::error::FrameError;
use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use std::io::Write;

/// Default zlib compression level.
pub const DEFAULT_LEVEL: u32 = 6;

/// Encodes outgoing and decodes incoming frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    level: Compression,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL)
    }
}

impl FrameCodec {
    /// Create a codec compressing at `level` (clamped to 0..=9).
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }

    /// Decompress a frame without interpreting it.
    ///
    /// The frame must hold one complete zlib stream; trailing bytes after
    /// the end of the stream are ignored.
    pub fn decompress(&self, raw: &[u8]) -> Result<Vec<u8>, FrameError> {
        let mut inflater = Decompress::new(true);
        let mut payload = Vec::with_capacity(raw.len().saturating_mul(4).max(64));

        loop {
            let consumed = inflater.total_in() as usize;
            let status =
                inflater.decompress_vec(&raw[consumed..], &mut payload, FlushDecompress::Finish)?;

            match status {
                Status::StreamEnd => return Ok(payload),
                Status::Ok | Status::BufError => {
                    if payload.len() < payload.capacity() {
                        // Output space left over, so the input ran dry
                        if inflater.total_in() as usize >= raw.len() {
                            return Err(FrameError::Truncated);
                        }
                    } else {
                        payload.reserve(payload.capacity());
                    }
                }
            }
        }
    }

    /// Decompress a frame and interpret it as ASCII protocol text.
    pub fn decode(&self, raw: &[u8]) -> Result<String, FrameError> {
        let payload = self.decompress(raw)?;
        if !payload.is_ascii() {
            return Err(FrameError::Encoding);
        }
        String::from_utf8(payload).map_err(|_| FrameError::Encoding)
    }

    /// Compress an arbitrary payload into one frame.
    pub fn compress(&self, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(payload.len()), self.level);
        encoder.write_all(payload).map_err(FrameError::Compress)?;
        encoder.finish().map_err(FrameError::Compress)
    }
}
