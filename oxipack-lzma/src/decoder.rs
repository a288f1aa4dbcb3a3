//! LZMA decompression.
//!
//! The decoder streams: compressed bytes are pulled from a [`Read`] as the
//! range coder needs them and decoded bytes are pushed to a [`Write`] in
//! blocks. Only the dictionary window is kept in memory, and the window grows
//! with the output so a small payload never reserves a large dictionary.
//!
//! The uncompressed length is known up front. Decoding stops after exactly
//! that many bytes and then checks that the range coder landed on a clean
//! end; anything after the payload is never read.

use crate::model::{LzmaModel, LzmaProperties, State};
use crate::range_coder::RangeDecoder;
use oxipack_core::error::{ArchiveError, Result};
use std::io::{Read, Write};

/// Hand decoded bytes to the writer in blocks of this size.
const FLUSH_THRESHOLD: usize = 1 << 16;

/// Initial window reservation.
const INITIAL_WINDOW: usize = 1 << 16;

/// Sliding dictionary that grows up to its capacity, then wraps.
#[derive(Debug)]
struct Window {
    buf: Vec<u8>,
    capacity: usize,
    pos: usize,
}

impl Window {
    fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity.min(INITIAL_WINDOW)),
            capacity,
            pos: 0,
        }
    }

    /// Bytes available for back-references.
    fn filled(&self) -> usize {
        self.buf.len()
    }

    fn push(&mut self, byte: u8) {
        if self.buf.len() < self.capacity {
            self.buf.push(byte);
        } else {
            self.buf[self.pos] = byte;
        }
        self.pos += 1;
        if self.pos == self.capacity {
            self.pos = 0;
        }
    }

    /// Byte `dist + 1` positions back. Requires `dist < filled()`.
    fn get(&self, dist: usize) -> u8 {
        let len = self.buf.len();
        self.buf[(self.pos + len - dist - 1) % len]
    }
}

/// LZMA decoder for a payload of known uncompressed length.
pub struct LzmaDecoder<R: Read> {
    rc: RangeDecoder<R>,
    model: LzmaModel,
    window: Window,
    pending: Vec<u8>,
    state: State,
    reps: [u32; 4],
    length: u64,
    decoded: u64,
}

impl<R: Read> LzmaDecoder<R> {
    /// Create a decoder, reading the range coder initialization bytes.
    ///
    /// The window is capped by both the dictionary size and `length`, so a
    /// damaged header cannot make the decoder reserve more than it will
    /// ever produce.
    pub fn new(reader: R, props: LzmaProperties, dict_size: u32, length: u64) -> Result<Self> {
        let dict = dict_size.max(crate::encoder::MIN_DICT_SIZE) as u64;
        let capacity = dict.min(length).max(1) as usize;

        Ok(Self {
            rc: RangeDecoder::new(reader)?,
            model: LzmaModel::new(props),
            window: Window::new(capacity),
            pending: Vec::with_capacity(FLUSH_THRESHOLD),
            state: State::new(),
            reps: [0; 4],
            length,
            decoded: 0,
        })
    }

    /// Decode the whole payload into `out`.
    ///
    /// Returns the number of compressed bytes consumed.
    pub fn decode_to<W: Write>(self, out: &mut W) -> Result<u64> {
        self.decode_with_progress(out, |_| Ok(()))
    }

    /// Decode the whole payload into `out`, calling `on_progress` with the
    /// number of bytes decoded after each block is written. An error from
    /// the callback stops the decoder and is returned as is.
    pub fn decode_with_progress<W, F>(mut self, out: &mut W, mut on_progress: F) -> Result<u64>
    where
        W: Write,
        F: FnMut(u64) -> Result<()>,
    {
        while self.decoded < self.length {
            self.decode_packet()?;
            if self.pending.len() >= FLUSH_THRESHOLD {
                self.flush(out)?;
                on_progress(self.decoded)?;
            }
        }

        self.flush(out)?;
        let consumed = self.rc.finish()?;
        on_progress(self.length)?;
        Ok(consumed)
    }

    fn flush<W: Write>(&mut self, out: &mut W) -> Result<()> {
        out.write_all(&self.pending)?;
        self.pending.clear();
        Ok(())
    }

    fn emit(&mut self, byte: u8) {
        self.window.push(byte);
        self.pending.push(byte);
        self.decoded += 1;
    }

    fn check_distance(&self, dist: u32) -> Result<()> {
        if (dist as usize) < self.window.filled() {
            Ok(())
        } else if dist == u32::MAX {
            Err(ArchiveError::corrupt(
                self.decoded,
                "end marker before the declared length",
            ))
        } else {
            Err(ArchiveError::corrupt(
                self.decoded,
                format!(
                    "match distance {} reaches before the start of the window",
                    dist as u64 + 1
                ),
            ))
        }
    }

    fn decode_packet(&mut self) -> Result<()> {
        let pos_state = self.model.pos_state(self.decoded);
        let s = self.state.value();

        if self.rc.decode_bit(&mut self.model.is_match[s][pos_state])? == 0 {
            let prev_byte = if self.window.filled() > 0 {
                self.window.get(0)
            } else {
                0
            };
            let match_byte = if self.state.is_literal() {
                None
            } else if (self.reps[0] as usize) < self.window.filled() {
                Some(self.window.get(self.reps[0] as usize))
            } else {
                Some(0)
            };
            let byte = self
                .model
                .literal
                .decode(&mut self.rc, self.decoded, prev_byte, match_byte)?;
            self.emit(byte);
            self.state.update_literal();
            return Ok(());
        }

        let len = if self.rc.decode_bit(&mut self.model.is_rep[s])? == 0 {
            let len = self.model.match_len.decode(&mut self.rc, pos_state)?;
            let dist = self.model.distance.decode(&mut self.rc, len)?;
            self.reps = [dist, self.reps[0], self.reps[1], self.reps[2]];
            self.state.update_match();
            len
        } else {
            if self.rc.decode_bit(&mut self.model.is_rep0[s])? == 0 {
                if self.rc.decode_bit(&mut self.model.is_rep0_long[s][pos_state])? == 0 {
                    self.check_distance(self.reps[0])?;
                    let byte = self.window.get(self.reps[0] as usize);
                    self.emit(byte);
                    self.state.update_short_rep();
                    return Ok(());
                }
            } else {
                let index = if self.rc.decode_bit(&mut self.model.is_rep1[s])? == 0 {
                    1
                } else if self.rc.decode_bit(&mut self.model.is_rep2[s])? == 0 {
                    2
                } else {
                    3
                };
                let dist = self.reps[index];
                self.reps.copy_within(0..index, 1);
                self.reps[0] = dist;
            }
            let len = self.model.rep_len.decode(&mut self.rc, pos_state)?;
            self.state.update_long_rep();
            len
        };

        self.copy_match(len)
    }

    fn copy_match(&mut self, len: usize) -> Result<()> {
        let dist = self.reps[0];
        self.check_distance(dist)?;
        if self.decoded + len as u64 > self.length {
            return Err(ArchiveError::corrupt(
                self.decoded,
                format!("match of {} bytes runs past the declared length", len),
            ));
        }

        let dist = dist as usize;
        for _ in 0..len {
            let byte = self.window.get(dist);
            self.emit(byte);
        }
        Ok(())
    }
}
