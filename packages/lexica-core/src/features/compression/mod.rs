//! Pluggable payload compression for the L2 boundary.
//!
//! Each namespace declares an algorithm; a size policy overrides it so tiny
//! payloads stay raw and huge payloads fall back to gzip. Frames written to
//! disk are self-describing (one tag byte + payload) so decode never depends
//! on configuration state.

use std::io::Write;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payloads below this size are never compressed.
pub const MIN_COMPRESS_SIZE: usize = 1024;

/// Payloads above this size use gzip regardless of namespace algorithm.
pub const LARGE_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

const ZSTD_LEVEL: i32 = 3;
const GZIP_LEVEL: u32 = 6;

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Compression failed ({algorithm}): {detail}")]
    Encode { algorithm: &'static str, detail: String },

    #[error("Decompression failed ({algorithm}): {detail}")]
    Decode { algorithm: &'static str, detail: String },

    #[error("Unknown compression tag: {0:#04x}")]
    UnknownTag(u8),

    #[error("Truncated compression frame")]
    TruncatedFrame,
}

pub type CompressionResult<T> = Result<T, CompressionError>;

/// Compression algorithms selectable per namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Zstd,
    Lz4,
    Gzip,
    None,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::Zstd => "zstd",
            Compression::Lz4 => "lz4",
            Compression::Gzip => "gzip",
            Compression::None => "none",
        }
    }

    fn tag(&self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Zstd => 1,
            Compression::Lz4 => 2,
            Compression::Gzip => 3,
        }
    }

    fn from_tag(tag: u8) -> CompressionResult<Self> {
        match tag {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Zstd),
            2 => Ok(Compression::Lz4),
            3 => Ok(Compression::Gzip),
            other => Err(CompressionError::UnknownTag(other)),
        }
    }
}

/// Byte-level compressor.
pub trait Compressor: Send + Sync {
    fn encode(&self, data: &[u8]) -> CompressionResult<Vec<u8>>;
    fn decode(&self, data: &[u8]) -> CompressionResult<Vec<u8>>;
}

pub struct ZstdCompressor;

impl Compressor for ZstdCompressor {
    fn encode(&self, data: &[u8]) -> CompressionResult<Vec<u8>> {
        zstd::encode_all(data, ZSTD_LEVEL).map_err(|e| CompressionError::Encode {
            algorithm: "zstd",
            detail: e.to_string(),
        })
    }

    fn decode(&self, data: &[u8]) -> CompressionResult<Vec<u8>> {
        zstd::decode_all(data).map_err(|e| CompressionError::Decode {
            algorithm: "zstd",
            detail: e.to_string(),
        })
    }
}

pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn encode(&self, data: &[u8]) -> CompressionResult<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(data))
    }

    fn decode(&self, data: &[u8]) -> CompressionResult<Vec<u8>> {
        lz4_flex::decompress_size_prepended(data).map_err(|e| CompressionError::Decode {
            algorithm: "lz4",
            detail: e.to_string(),
        })
    }
}

pub struct GzipCompressor;

impl Compressor for GzipCompressor {
    fn encode(&self, data: &[u8]) -> CompressionResult<Vec<u8>> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::new(GZIP_LEVEL));
        encoder
            .write_all(data)
            .and_then(|_| encoder.finish())
            .map_err(|e| CompressionError::Encode {
                algorithm: "gzip",
                detail: e.to_string(),
            })
    }

    fn decode(&self, data: &[u8]) -> CompressionResult<Vec<u8>> {
        use std::io::Read;
        let mut decoder = flate2::read::GzDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CompressionError::Decode {
                algorithm: "gzip",
                detail: e.to_string(),
            })?;
        Ok(out)
    }
}

pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn encode(&self, data: &[u8]) -> CompressionResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decode(&self, data: &[u8]) -> CompressionResult<Vec<u8>> {
        Ok(data.to_vec())
    }
}

fn compressor_for(algorithm: Compression) -> &'static dyn Compressor {
    match algorithm {
        Compression::Zstd => &ZstdCompressor,
        Compression::Lz4 => &Lz4Compressor,
        Compression::Gzip => &GzipCompressor,
        Compression::None => &NoopCompressor,
    }
}

/// Resolve the algorithm actually used for a payload.
///
/// Size policy: < 1 KiB raw, > 10 MiB gzip. In between the namespace
/// algorithm wins (lz4 stays lz4 for latency-sensitive namespaces).
pub fn effective_algorithm(configured: Compression, payload_len: usize) -> Compression {
    if payload_len < MIN_COMPRESS_SIZE {
        Compression::None
    } else if payload_len > LARGE_PAYLOAD_SIZE {
        Compression::Gzip
    } else if configured == Compression::None {
        Compression::Zstd
    } else {
        configured
    }
}

/// Compress into a self-describing frame: `[tag byte][payload]`.
pub fn compress_frame(data: &[u8], configured: Compression) -> CompressionResult<Vec<u8>> {
    let algorithm = effective_algorithm(configured, data.len());
    let payload = compressor_for(algorithm).encode(data)?;

    let mut frame = Vec::with_capacity(payload.len() + 1);
    frame.push(algorithm.tag());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decompress a frame produced by [`compress_frame`].
pub fn decompress_frame(frame: &[u8]) -> CompressionResult<Vec<u8>> {
    let (&tag, payload) = frame.split_first().ok_or(CompressionError::TruncatedFrame)?;
    let algorithm = Compression::from_tag(tag)?;
    compressor_for(algorithm).decode(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_round_trip_all_algorithms() {
        let data = sample(4096);
        for algorithm in [
            Compression::Zstd,
            Compression::Lz4,
            Compression::Gzip,
            Compression::None,
        ] {
            let frame = compress_frame(&data, algorithm).unwrap();
            let decoded = decompress_frame(&frame).unwrap();
            assert_eq!(decoded, data, "round trip failed for {}", algorithm.as_str());
        }
    }

    #[test]
    fn test_small_payload_stays_raw() {
        let data = sample(100);
        let frame = compress_frame(&data, Compression::Zstd).unwrap();

        // Tag byte 0 = no compression
        assert_eq!(frame[0], 0);
        assert_eq!(&frame[1..], &data[..]);
    }

    #[test]
    fn test_medium_payload_uses_configured_algorithm() {
        let data = sample(64 * 1024);
        let frame = compress_frame(&data, Compression::Lz4).unwrap();
        assert_eq!(frame[0], Compression::Lz4.tag());
    }

    #[test]
    fn test_none_config_defaults_to_zstd_for_medium() {
        let data = sample(8 * 1024);
        let frame = compress_frame(&data, Compression::None).unwrap();
        assert_eq!(frame[0], Compression::Zstd.tag());
    }

    #[test]
    fn test_corrupt_frame_errors() {
        assert!(matches!(
            decompress_frame(&[]),
            Err(CompressionError::TruncatedFrame)
        ));
        assert!(matches!(
            decompress_frame(&[9, 1, 2, 3]),
            Err(CompressionError::UnknownTag(9))
        ));

        // Valid tag, garbage body
        let mut frame = vec![Compression::Zstd.tag()];
        frame.extend_from_slice(b"not a zstd stream");
        assert!(decompress_frame(&frame).is_err());
    }

    #[test]
    fn test_compression_reduces_repetitive_payload() {
        let data = vec![b'a'; 100 * 1024];
        let frame = compress_frame(&data, Compression::Zstd).unwrap();
        assert!(frame.len() < data.len() / 10);
    }
}
