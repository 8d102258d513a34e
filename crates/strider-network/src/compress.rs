//! Optional compression of step batches
//!
//! Batches are usually a few dozen bytes, where compression only adds
//! overhead, so the adaptive compressor leaves small payloads alone.

use crate::protocol::MAX_FRAME_LEN;
use crate::NetworkError;
use std::io::{Read, Write};

/// Largest payload a compressed frame may expand to.
pub const MAX_DECOMPRESSED_LEN: usize = 4 * MAX_FRAME_LEN;

/// Compression applied to a payload. The wire id travels in the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum CompressionAlgorithm {
    /// Payload sent as is
    #[cfg_attr(feature = "clap", value(name = "none"))]
    None,
    /// LZ4 (fast, lower ratio)
    #[cfg_attr(feature = "clap", value(name = "lz4"))]
    Lz4,
    /// Zstandard (better ratio, slower)
    #[cfg_attr(feature = "clap", value(name = "zstd"))]
    Zstd,
}

impl CompressionAlgorithm {
    pub fn wire_id(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Lz4 => 1,
            Self::Zstd => 2,
        }
    }

    pub fn from_wire_id(id: u8) -> Result<Self, NetworkError> {
        match id {
            0 => Ok(Self::None),
            1 => Ok(Self::Lz4),
            2 => Ok(Self::Zstd),
            other => Err(NetworkError::CompressionError(format!(
                "Unknown compression id {other}"
            ))),
        }
    }
}

/// Single-algorithm compressor
#[derive(Debug)]
pub struct Compressor {
    algorithm: CompressionAlgorithm,
    level: i32,
    max_output: usize,
}

impl Compressor {
    pub fn new(algorithm: CompressionAlgorithm) -> Self {
        Self {
            algorithm,
            level: 3,
            max_output: MAX_DECOMPRESSED_LEN,
        }
    }

    /// Refuse to decompress anything that would grow past `max_output`.
    pub fn with_max_output(mut self, max_output: usize) -> Self {
        self.max_output = max_output;
        self
    }

    /// Zstd level; ignored by the other algorithms.
    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn algorithm(&self) -> CompressionAlgorithm {
        self.algorithm
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>, NetworkError> {
        match self.algorithm {
            CompressionAlgorithm::None => Ok(data.to_vec()),
            CompressionAlgorithm::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
            CompressionAlgorithm::Zstd => self.compress_zstd(data),
        }
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, NetworkError> {
        match self.algorithm {
            CompressionAlgorithm::None => Ok(data.to_vec()),
            CompressionAlgorithm::Lz4 => self.decompress_lz4(data),
            CompressionAlgorithm::Zstd => self.decompress_zstd(data),
        }
    }

    fn compress_zstd(&self, data: &[u8]) -> Result<Vec<u8>, NetworkError> {
        let mut encoder = zstd::Encoder::new(Vec::new(), self.level).map_err(|e| {
            NetworkError::CompressionError(format!("Failed to create zstd encoder: {e}"))
        })?;
        encoder.write_all(data).map_err(|e| {
            NetworkError::CompressionError(format!("Failed to write to zstd encoder: {e}"))
        })?;
        encoder.finish().map_err(|e| {
            NetworkError::CompressionError(format!("Failed to finish zstd encoding: {e}"))
        })
    }

    fn too_large(&self, len: usize) -> NetworkError {
        NetworkError::CompressionError(format!(
            "Decompressed size {len} exceeds limit {}",
            self.max_output
        ))
    }

    fn decompress_lz4(&self, data: &[u8]) -> Result<Vec<u8>, NetworkError> {
        // Little-endian size prefix written by compress_prepend_size
        let size = match data {
            [a, b, c, d, ..] => u32::from_le_bytes([*a, *b, *c, *d]) as usize,
            _ => {
                return Err(NetworkError::CompressionError(
                    "LZ4 payload shorter than its size prefix".to_string(),
                ))
            }
        };
        if size > self.max_output {
            return Err(self.too_large(size));
        }
        lz4_flex::decompress_size_prepended(data)
            .map_err(|e| NetworkError::CompressionError(format!("LZ4 decompression failed: {e}")))
    }

    fn decompress_zstd(&self, data: &[u8]) -> Result<Vec<u8>, NetworkError> {
        let decoder = zstd::Decoder::new(data).map_err(|e| {
            NetworkError::CompressionError(format!("Failed to create zstd decoder: {e}"))
        })?;
        // One byte past the limit is enough to tell an oversized payload.
        let mut out = Vec::new();
        decoder
            .take(self.max_output as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| {
                NetworkError::CompressionError(format!("Failed to decompress zstd data: {e}"))
            })?;
        if out.len() > self.max_output {
            return Err(self.too_large(out.len()));
        }
        Ok(out)
    }
}

/// Picks an algorithm per payload by size, or always the forced one.
pub struct AdaptiveCompressor {
    none: Compressor,
    lz4: Compressor,
    zstd: Compressor,
    /// Below this nothing is compressed.
    min_size: usize,
    /// Below this LZ4, above it Zstd.
    size_threshold: usize,
    forced: Option<CompressionAlgorithm>,
}

impl Default for AdaptiveCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptiveCompressor {
    pub fn new() -> Self {
        Self {
            none: Compressor::new(CompressionAlgorithm::None),
            lz4: Compressor::new(CompressionAlgorithm::Lz4),
            zstd: Compressor::new(CompressionAlgorithm::Zstd),
            min_size: 128,
            size_threshold: 1024,
            forced: None,
        }
    }

    /// Always use `algorithm`, whatever the payload size.
    pub fn fixed(algorithm: CompressionAlgorithm) -> Self {
        Self {
            forced: Some(algorithm),
            ..Self::new()
        }
    }

    fn compressor(&self, algorithm: CompressionAlgorithm) -> &Compressor {
        match algorithm {
            CompressionAlgorithm::None => &self.none,
            CompressionAlgorithm::Lz4 => &self.lz4,
            CompressionAlgorithm::Zstd => &self.zstd,
        }
    }

    pub fn choose(&self, len: usize) -> CompressionAlgorithm {
        match self.forced {
            Some(algorithm) => algorithm,
            None if len < self.min_size => CompressionAlgorithm::None,
            None if len < self.size_threshold => CompressionAlgorithm::Lz4,
            None => CompressionAlgorithm::Zstd,
        }
    }

    pub fn compress(&self, data: &[u8]) -> Result<(CompressionAlgorithm, Vec<u8>), NetworkError> {
        let algorithm = self.choose(data.len());
        self.compressor(algorithm)
            .compress(data)
            .map(|c| (algorithm, c))
    }

    pub fn decompress(
        &self,
        algorithm: CompressionAlgorithm,
        data: &[u8],
    ) -> Result<Vec<u8>, NetworkError> {
        self.compressor(algorithm).decompress(data)
    }
}
