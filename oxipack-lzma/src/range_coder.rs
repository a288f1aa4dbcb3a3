//! Range coder for LZMA.
//!
//! The range coder is an entropy coding method similar to arithmetic coding.
//! LZMA uses a specific variant with:
//! - 32-bit range tracking
//! - Normalization when range drops below 2^24
//! - 11-bit probability model (2048 = 100%)
//!
//! The decoder normalizes lazily (before a bit), the encoder eagerly (after a
//! bit). [`RangeDecoder::finish`] performs the one normalization the decoder
//! still owes, after which every byte the encoder flushed has been read and
//! the code register of an intact stream is zero.

use oxipack_core::error::{ArchiveError, Result};
use std::io::{self, Read, Write};

/// Number of bits in probability model.
pub const PROB_BITS: u32 = 11;

/// Initial probability (50%).
pub const PROB_INIT: u16 = 1 << (PROB_BITS - 1);

/// Probability representing 100%.
const PROB_MAX: u32 = 1 << PROB_BITS;

/// Number of bits to shift for probability update.
const MOVE_BITS: u32 = 5;

/// Top value for range normalization.
const TOP_VALUE: u32 = 1 << 24;

/// Range decoder reading compressed bytes from `R`.
#[derive(Debug)]
pub struct RangeDecoder<R: Read> {
    reader: R,
    range: u32,
    code: u32,
    consumed: u64,
}

impl<R: Read> RangeDecoder<R> {
    /// Create a decoder, reading the 5-byte initialization sequence.
    pub fn new(reader: R) -> Result<Self> {
        let mut decoder = Self {
            reader,
            range: 0xFFFF_FFFF,
            code: 0,
            consumed: 0,
        };

        if decoder.next_byte()? != 0x00 {
            return Err(ArchiveError::corrupt(
                0,
                "range coder stream must start with a zero byte",
            ));
        }
        for _ in 0..4 {
            decoder.code = (decoder.code << 8) | decoder.next_byte()? as u32;
        }
        if decoder.code == decoder.range {
            return Err(ArchiveError::corrupt(4, "invalid range coder initial code"));
        }

        Ok(decoder)
    }

    /// Number of compressed bytes read so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    fn next_byte(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => {
                self.consumed += 1;
                Ok(buf[0])
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(ArchiveError::corrupt(
                self.consumed,
                "compressed payload ended before the declared length was decoded",
            )),
            Err(e) => Err(e.into()),
        }
    }

    fn normalize(&mut self) -> Result<()> {
        if self.range < TOP_VALUE {
            self.range <<= 8;
            self.code = (self.code << 8) | self.next_byte()? as u32;
        }
        Ok(())
    }

    /// Decode a single bit with the given probability.
    pub fn decode_bit(&mut self, prob: &mut u16) -> Result<u32> {
        self.normalize()?;

        let bound = (self.range >> PROB_BITS) * (*prob as u32);

        if self.code < bound {
            self.range = bound;
            *prob += ((PROB_MAX - *prob as u32) >> MOVE_BITS) as u16;
            Ok(0)
        } else {
            self.range -= bound;
            self.code -= bound;
            *prob -= *prob >> MOVE_BITS;
            Ok(1)
        }
    }

    /// Decode `count` bits with fixed 50% probability, most significant first.
    pub fn decode_direct_bits(&mut self, count: u32) -> Result<u32> {
        let mut result = 0u32;
        for _ in 0..count {
            self.normalize()?;
            self.range >>= 1;
            self.code = self.code.wrapping_sub(self.range);
            let bit = if (self.code as i32) < 0 {
                self.code = self.code.wrapping_add(self.range);
                0
            } else {
                1
            };
            result = (result << 1) | bit;
        }
        Ok(result)
    }

    /// Decode a bit tree, most significant bit first.
    ///
    /// Node `m` (starting at 1) uses `probs[m]`.
    pub fn decode_tree(&mut self, probs: &mut [u16], num_bits: u32) -> Result<u32> {
        let mut m = 1usize;
        for _ in 0..num_bits {
            m = (m << 1) | self.decode_bit(&mut probs[m])? as usize;
        }
        Ok((m as u32) - (1 << num_bits))
    }

    /// Decode a bit tree, least significant bit first.
    ///
    /// Node `m` (starting at 1) uses `probs[m - 1]`.
    pub fn decode_tree_reverse(&mut self, probs: &mut [u16], num_bits: u32) -> Result<u32> {
        let mut m = 1usize;
        let mut result = 0u32;
        for i in 0..num_bits {
            let bit = self.decode_bit(&mut probs[m - 1])?;
            m = (m << 1) | bit as usize;
            result |= bit << i;
        }
        Ok(result)
    }

    /// Finish decoding and verify the stream ended cleanly.
    ///
    /// Returns the total number of compressed bytes consumed. Bytes after
    /// that point are never read.
    pub fn finish(mut self) -> Result<u64> {
        self.normalize()?;
        if self.code != 0 {
            return Err(ArchiveError::corrupt(
                self.consumed,
                "range coder did not finish cleanly after the declared length",
            ));
        }
        Ok(self.consumed)
    }
}

/// Range encoder buffering its output until drained.
#[derive(Debug)]
pub struct RangeEncoder {
    buffer: Vec<u8>,
    range: u32,
    low: u64,
    cache: u8,
    cache_size: u64,
}

impl RangeEncoder {
    /// Create a new range encoder.
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            range: 0xFFFF_FFFF,
            low: 0,
            cache: 0,
            cache_size: 1,
        }
    }

    /// Emit the top byte of `low`, propagating a pending carry.
    fn shift_low(&mut self) {
        if self.low < 0xFF00_0000 || self.low > 0xFFFF_FFFF {
            let carry = (self.low >> 32) as u8;
            let mut byte = self.cache;
            loop {
                self.buffer.push(byte.wrapping_add(carry));
                byte = 0xFF;
                self.cache_size -= 1;
                if self.cache_size == 0 {
                    break;
                }
            }
            self.cache = (self.low >> 24) as u8;
        }
        self.cache_size += 1;
        self.low = (self.low << 8) & 0xFFFF_FFFF;
    }

    fn normalize(&mut self) {
        if self.range < TOP_VALUE {
            self.range <<= 8;
            self.shift_low();
        }
    }

    /// Encode a single bit with the given probability.
    pub fn encode_bit(&mut self, prob: &mut u16, bit: u32) {
        let bound = (self.range >> PROB_BITS) * (*prob as u32);

        if bit == 0 {
            self.range = bound;
            *prob += ((PROB_MAX - *prob as u32) >> MOVE_BITS) as u16;
        } else {
            self.low += bound as u64;
            self.range -= bound;
            *prob -= *prob >> MOVE_BITS;
        }

        self.normalize();
    }

    /// Encode the low `count` bits of `value` with fixed probability, most
    /// significant first.
    pub fn encode_direct_bits(&mut self, value: u32, count: u32) {
        for i in (0..count).rev() {
            self.range >>= 1;
            if (value >> i) & 1 != 0 {
                self.low += self.range as u64;
            }
            self.normalize();
        }
    }

    /// Encode a bit tree, most significant bit first (see
    /// [`RangeDecoder::decode_tree`]).
    pub fn encode_tree(&mut self, probs: &mut [u16], num_bits: u32, value: u32) {
        let mut m = 1usize;
        for i in (0..num_bits).rev() {
            let bit = (value >> i) & 1;
            self.encode_bit(&mut probs[m], bit);
            m = (m << 1) | bit as usize;
        }
    }

    /// Encode a bit tree, least significant bit first (see
    /// [`RangeDecoder::decode_tree_reverse`]).
    pub fn encode_tree_reverse(&mut self, probs: &mut [u16], num_bits: u32, value: u32) {
        let mut m = 1usize;
        for i in 0..num_bits {
            let bit = (value >> i) & 1;
            self.encode_bit(&mut probs[m - 1], bit);
            m = (m << 1) | bit as usize;
        }
    }

    /// Bytes buffered and ready to be drained.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Write buffered bytes to `out`, returning how many were written.
    ///
    /// Buffered bytes are final: a later carry only affects bytes that have
    /// not reached the buffer yet.
    pub fn drain_into<W: Write>(&mut self, out: &mut W) -> io::Result<u64> {
        out.write_all(&self.buffer)?;
        let written = self.buffer.len() as u64;
        self.buffer.clear();
        Ok(written)
    }

    /// Flush the remaining state into the buffer.
    pub fn flush(&mut self) {
        for _ in 0..5 {
            self.shift_low();
        }
    }
}

impl Default for RangeEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn finish(mut encoder: RangeEncoder) -> Vec<u8> {
        encoder.flush();
        let mut out = Vec::new();
        encoder.drain_into(&mut out).unwrap();
        out
    }

    #[test]
    fn test_prob_constants() {
        assert_eq!(PROB_INIT, 1024);
        assert_eq!(PROB_MAX, 2048);
    }

    #[test]
    fn test_empty_stream_is_five_zero_bytes() {
        let encoded = finish(RangeEncoder::new());
        assert_eq!(encoded, vec![0u8; 5]);

        let decoder = RangeDecoder::new(Cursor::new(encoded)).unwrap();
        assert_eq!(decoder.finish().unwrap(), 5);
    }

    #[test]
    fn test_encode_decode_bits() {
        let bits = [0u32, 1, 0, 1, 1, 1, 0, 0, 1, 0];
        let mut encoder = RangeEncoder::new();
        let mut prob = PROB_INIT;
        for &bit in &bits {
            encoder.encode_bit(&mut prob, bit);
        }
        let encoded = finish(encoder);
        let len = encoded.len() as u64;

        let mut decoder = RangeDecoder::new(Cursor::new(encoded)).unwrap();
        let mut prob = PROB_INIT;
        for &bit in &bits {
            assert_eq!(decoder.decode_bit(&mut prob).unwrap(), bit);
        }
        assert_eq!(decoder.finish().unwrap(), len);
    }

    #[test]
    fn test_trees_and_direct_bits() {
        let mut encoder = RangeEncoder::new();
        let mut tree = [PROB_INIT; 64];
        let mut reverse = [PROB_INIT; 16];
        encoder.encode_tree(&mut tree, 6, 45);
        encoder.encode_direct_bits(0x2A5, 10);
        encoder.encode_tree_reverse(&mut reverse, 4, 0b1011);
        let encoded = finish(encoder);

        let mut decoder = RangeDecoder::new(Cursor::new(encoded)).unwrap();
        let mut tree = [PROB_INIT; 64];
        let mut reverse = [PROB_INIT; 16];
        assert_eq!(decoder.decode_tree(&mut tree, 6).unwrap(), 45);
        assert_eq!(decoder.decode_direct_bits(10).unwrap(), 0x2A5);
        assert_eq!(decoder.decode_tree_reverse(&mut reverse, 4).unwrap(), 0b1011);
        decoder.finish().unwrap();
    }

    #[test]
    fn test_bad_start_byte_is_corrupt() {
        let err = RangeDecoder::new(Cursor::new(vec![1u8, 0, 0, 0, 0])).unwrap_err();
        assert!(matches!(err, ArchiveError::CorruptArchive { .. }));
    }

    #[test]
    fn test_short_init_is_corrupt() {
        let err = RangeDecoder::new(Cursor::new(vec![0u8, 0])).unwrap_err();
        assert!(matches!(err, ArchiveError::CorruptArchive { .. }));
    }
}
