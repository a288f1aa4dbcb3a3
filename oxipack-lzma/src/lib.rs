//! # OxiPack LZMA
//!
//! In-process LZMA block compressor.
//!
//! A block is compressed in one go: the whole input is known before encoding
//! starts, so the encoder writes no end marker and the caller records the
//! uncompressed length next to the payload. The decoder needs three things
//! back: the [`CoderProperties`] (5 bytes), that length, and the payload.
//!
//! ## Usage
//!
//! ```rust
//! use oxipack_lzma::{LzmaLevel, decode, encode};
//!
//! let data = b"Hello, LZMA! Hello, LZMA! Hello, LZMA!";
//! let mut payload = Vec::new();
//! let props = encode(data, LzmaLevel::DEFAULT, &mut payload).unwrap();
//!
//! let mut restored = Vec::new();
//! decode(&props, data.len() as u64, &payload[..], &mut restored).unwrap();
//! assert_eq!(restored, data);
//! ```
//!
//! ## Coder Properties
//!
//! The 5-byte properties block is laid out like the head of a `.lzma` file:
//! 1. Properties byte (lc, lp, pb encoded)
//! 2. Dictionary size (4 bytes, little-endian)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decoder;
pub mod encoder;
pub mod model;
pub mod range_coder;

// Re-exports
pub use decoder::LzmaDecoder;
pub use encoder::LzmaEncoder;
pub use model::{LzmaModel, LzmaProperties, State};
pub use range_coder::{RangeDecoder, RangeEncoder};

use oxipack_core::error::Result;
use std::io::{Read, Write};

/// LZMA compression level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzmaLevel(u8);

impl LzmaLevel {
    /// Fastest compression (level 0).
    pub const FAST: Self = Self(0);
    /// Default compression (level 6).
    pub const DEFAULT: Self = Self(6);
    /// Best compression (level 9).
    pub const BEST: Self = Self(9);

    /// Create a new compression level, clamped to 0..=9.
    pub fn new(level: u8) -> Self {
        Self(level.min(9))
    }

    /// Get the level value.
    pub fn level(&self) -> u8 {
        self.0
    }

    /// Get the dictionary size for this level.
    pub fn dict_size(&self) -> u32 {
        match self.0 {
            0 => 1 << 16, // 64 KB
            1 => 1 << 18, // 256 KB
            2 => 1 << 19, // 512 KB
            3 => 1 << 20, // 1 MB
            4 => 1 << 21, // 2 MB
            5 => 1 << 22, // 4 MB
            6 => 1 << 23, // 8 MB
            7 => 1 << 24, // 16 MB
            8 => 1 << 25, // 32 MB
            _ => 1 << 26, // 64 MB
        }
    }
}

impl Default for LzmaLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Size of the serialized [`CoderProperties`].
pub const PROPERTIES_SIZE: usize = 5;

/// Everything the decoder must know besides the length: context sizes and
/// the dictionary size the encoder used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoderProperties {
    /// Literal and position context sizes.
    pub props: LzmaProperties,
    /// Dictionary size in bytes.
    pub dict_size: u32,
}

impl CoderProperties {
    /// Serialize to the 5-byte on-disk form.
    pub fn to_bytes(&self) -> [u8; PROPERTIES_SIZE] {
        let mut bytes = [0u8; PROPERTIES_SIZE];
        bytes[0] = self.props.to_byte();
        bytes[1..].copy_from_slice(&self.dict_size.to_le_bytes());
        bytes
    }

    /// Parse the 5-byte on-disk form.
    pub fn from_bytes(bytes: &[u8; PROPERTIES_SIZE]) -> Result<Self> {
        let props = LzmaProperties::from_byte(bytes[0])?;
        let dict_size = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        Ok(Self { props, dict_size })
    }
}

/// Compress `data` into `out` and return the properties to store with it.
pub fn encode<W: Write>(data: &[u8], level: LzmaLevel, out: &mut W) -> Result<CoderProperties> {
    encode_with(&LzmaEncoder::new(level), data, out)
}

/// Compress with an explicitly configured encoder.
pub fn encode_with<W: Write>(
    encoder: &LzmaEncoder,
    data: &[u8],
    out: &mut W,
) -> Result<CoderProperties> {
    encoder.encode(data, out)?;
    Ok(CoderProperties {
        props: encoder.properties(),
        dict_size: encoder.dict_size_for(data.len()),
    })
}

/// Decompress exactly `length` bytes from `input` into `out`.
///
/// Returns the number of compressed bytes consumed. Bytes in `input` after
/// the payload are left unread.
pub fn decode<R: Read, W: Write>(
    props: &CoderProperties,
    length: u64,
    input: R,
    out: &mut W,
) -> Result<u64> {
    LzmaDecoder::new(input, props.props, props.dict_size, length)?.decode_to(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxipack_core::error::ArchiveError;
    use std::io::Cursor;

    fn roundtrip(data: &[u8], level: LzmaLevel) -> Vec<u8> {
        let mut payload = Vec::new();
        let props = encode(data, level, &mut payload).unwrap();
        let mut restored = Vec::new();
        let consumed = decode(&props, data.len() as u64, &payload[..], &mut restored).unwrap();
        assert_eq!(consumed, payload.len() as u64);
        restored
    }

    fn pseudo_random(len: usize, mut seed: u64) -> Vec<u8> {
        (0..len)
            .map(|_| {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
                (seed >> 33) as u8
            })
            .collect()
    }

    #[test]
    fn test_level() {
        assert_eq!(LzmaLevel::FAST.level(), 0);
        assert_eq!(LzmaLevel::DEFAULT.level(), 6);
        assert_eq!(LzmaLevel::BEST.level(), 9);
        assert_eq!(LzmaLevel::new(100).level(), 9);
    }

    #[test]
    fn test_dict_size() {
        assert_eq!(LzmaLevel::FAST.dict_size(), 1 << 16);
        assert_eq!(LzmaLevel::DEFAULT.dict_size(), 1 << 23);
        assert_eq!(LzmaLevel::BEST.dict_size(), 1 << 26);
    }

    #[test]
    fn test_coder_properties_bytes() {
        let props = CoderProperties {
            props: LzmaProperties::default(),
            dict_size: 1 << 23,
        };
        let bytes = props.to_bytes();
        assert_eq!(bytes, [0x5D, 0x00, 0x00, 0x80, 0x00]);
        assert_eq!(CoderProperties::from_bytes(&bytes).unwrap(), props);

        let err = CoderProperties::from_bytes(&[0xFF, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, ArchiveError::CorruptArchive { .. }));
    }

    #[test]
    fn test_roundtrip_empty() {
        assert!(roundtrip(b"", LzmaLevel::DEFAULT).is_empty());
    }

    #[test]
    fn test_roundtrip_single_byte() {
        assert_eq!(roundtrip(b"A", LzmaLevel::DEFAULT), b"A");
    }

    #[test]
    fn test_roundtrip_text() {
        let data = b"Hello, LZMA World! This is a test of compression and decompression.";
        assert_eq!(roundtrip(data, LzmaLevel::DEFAULT), data);
    }

    #[test]
    fn test_roundtrip_repeated() {
        let data = vec![b'A'; 100_000];
        let mut payload = Vec::new();
        encode(&data, LzmaLevel::DEFAULT, &mut payload).unwrap();
        assert!(payload.len() < 1000);
        assert_eq!(roundtrip(&data, LzmaLevel::DEFAULT), data);
    }

    #[test]
    fn test_roundtrip_all_levels() {
        let mut data = Vec::new();
        for i in 0..200 {
            data.extend_from_slice(b"The quick brown fox jumps over the lazy dog. ");
            data.extend_from_slice(format!("line {}\n", i).as_bytes());
        }
        for level in 0..=9 {
            assert_eq!(roundtrip(&data, LzmaLevel::new(level)), data, "level {}", level);
        }
    }

    #[test]
    fn test_roundtrip_incompressible() {
        let data = pseudo_random(50_000, 0x1234_5678);
        assert_eq!(roundtrip(&data, LzmaLevel::DEFAULT), data);
    }

    #[test]
    fn test_roundtrip_wraps_small_dictionary() {
        // Repeats further apart than the dictionary must not be referenced.
        let block = pseudo_random(6000, 42);
        let mut data = Vec::new();
        for _ in 0..4 {
            data.extend_from_slice(&block);
        }
        let encoder = LzmaEncoder::new(LzmaLevel::DEFAULT).with_dict_size(4096);
        let mut payload = Vec::new();
        let props = encode_with(&encoder, &data, &mut payload).unwrap();
        assert_eq!(props.dict_size, 4096);

        let mut restored = Vec::new();
        decode(&props, data.len() as u64, &payload[..], &mut restored).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn test_trailing_bytes_are_ignored() {
        let data = b"abcabcabcabcabc trailing test";
        let mut payload = Vec::new();
        let props = encode(data, LzmaLevel::DEFAULT, &mut payload).unwrap();
        let payload_len = payload.len() as u64;
        payload.extend_from_slice(b"garbage after the payload");

        let mut input = Cursor::new(payload);
        let mut restored = Vec::new();
        let consumed = decode(&props, data.len() as u64, &mut input, &mut restored).unwrap();
        assert_eq!(restored, data);
        assert_eq!(consumed, payload_len);
        assert_eq!(input.position(), payload_len);
    }

    #[test]
    fn test_every_truncation_is_detected() {
        let mut data = Vec::new();
        for i in 0..50u32 {
            data.extend_from_slice(&i.to_le_bytes());
            data.extend_from_slice(b"truncate me ");
        }
        let mut payload = Vec::new();
        let props = encode(&data, LzmaLevel::DEFAULT, &mut payload).unwrap();

        for cut in 0..payload.len() {
            let mut restored = Vec::new();
            let err = decode(&props, data.len() as u64, &payload[..cut], &mut restored)
                .expect_err("truncated payload must not decode");
            assert!(
                matches!(err, ArchiveError::CorruptArchive { .. }),
                "cut at {}: {}",
                cut,
                err
            );
        }
    }
}
