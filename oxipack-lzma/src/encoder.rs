//! LZMA compression.
//!
//! Greedy parsing over hash chains. At each position the encoder weighs the
//! four rep distances against the longest match the chain walk finds, then
//! falls back to a one-byte rep0 or a literal. The stream carries no end
//! marker; the uncompressed length travels next to the payload instead.
//!
//! ## Compression Levels
//!
//! Levels trade chain depth and the "nice" length at which a search stops
//! early. The dictionary size comes from [`LzmaLevel::dict_size`] and is
//! shrunk to the input when the input is smaller.

use crate::LzmaLevel;
use crate::model::{LzmaModel, LzmaProperties, MATCH_LEN_MAX, MATCH_LEN_MIN, State};
use crate::range_coder::RangeEncoder;
use oxipack_core::error::Result;
use std::io::Write;

/// Smallest dictionary the encoder advertises.
pub const MIN_DICT_SIZE: u32 = 1 << 12;

/// Hash table size (64K entries).
const HASH_SIZE: usize = 1 << 16;

/// Empty chain link.
const NIL: usize = usize::MAX;

/// Shortest match worth a new distance.
const MIN_MAIN_LEN: usize = 3;

/// Drain the range coder once this many bytes are buffered.
const FLUSH_THRESHOLD: usize = 1 << 16;

/// Report progress every this many input bytes.
const PROGRESS_INTERVAL: usize = 1 << 20;

/// Maximum chain depth per compression level.
const CHAIN_DEPTH: [usize; 10] = [1, 4, 8, 16, 32, 64, 128, 256, 512, 1024];

/// Match length at which the chain walk stops, per compression level.
const NICE_LEN: [usize; 10] = [16, 32, 32, 32, 48, 64, 64, 128, MATCH_LEN_MAX, MATCH_LEN_MAX];

/// FNV-1a over three bytes.
fn hash3(bytes: &[u8]) -> usize {
    let mut h = 2166136261u32;
    for &b in &bytes[..3] {
        h ^= b as u32;
        h = h.wrapping_mul(16777619);
    }
    (h as usize) & (HASH_SIZE - 1)
}

/// Hash chains over a power-of-two ring of recent positions.
#[derive(Debug)]
struct MatchFinder {
    head: Vec<usize>,
    chain: Vec<usize>,
    mask: usize,
    max_dist: usize,
    depth: usize,
    nice_len: usize,
}

impl MatchFinder {
    fn new(dict_size: u32, input_len: usize, depth: usize, nice_len: usize) -> Self {
        let window = (dict_size as usize).min(input_len).max(1).next_power_of_two();
        Self {
            head: vec![NIL; HASH_SIZE],
            chain: vec![NIL; window],
            mask: window - 1,
            max_dist: (dict_size as usize).min(window - 1),
            depth,
            nice_len,
        }
    }

    fn insert(&mut self, data: &[u8], pos: usize) {
        if pos + MIN_MAIN_LEN > data.len() {
            return;
        }
        let h = hash3(&data[pos..]);
        self.chain[pos & self.mask] = self.head[h];
        self.head[h] = pos;
    }

    /// Longest match of at least [`MIN_MAIN_LEN`] bytes: (zero-based distance, length).
    fn find(&self, data: &[u8], pos: usize, max_len: usize) -> Option<(u32, usize)> {
        if max_len < MIN_MAIN_LEN {
            return None;
        }

        let mut candidate = self.head[hash3(&data[pos..])];
        let mut best_len = MIN_MAIN_LEN - 1;
        let mut best = None;

        for _ in 0..self.depth {
            if candidate == NIL || candidate >= pos {
                break;
            }
            let dist = pos - candidate;
            if dist > self.max_dist {
                break;
            }

            // best_len < max_len, so both indices are in bounds
            if data[candidate + best_len] == data[pos + best_len] {
                let len = common_prefix(data, candidate, pos, max_len);
                if len > best_len {
                    best_len = len;
                    best = Some(((dist - 1) as u32, len));
                    if len >= self.nice_len || len == max_len {
                        break;
                    }
                }
            }

            let next = self.chain[candidate & self.mask];
            if next == NIL || next >= candidate {
                break;
            }
            candidate = next;
        }

        best
    }
}

fn common_prefix(data: &[u8], earlier: usize, pos: usize, max_len: usize) -> usize {
    let mut len = 0;
    while len < max_len && data[earlier + len] == data[pos + len] {
        len += 1;
    }
    len
}

/// One coded unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Packet {
    Literal,
    ShortRep,
    Rep { index: usize, len: usize },
    Match { dist: u32, len: usize },
}

impl Packet {
    fn len(self) -> usize {
        match self {
            Packet::Literal | Packet::ShortRep => 1,
            Packet::Rep { len, .. } | Packet::Match { len, .. } => len,
        }
    }
}

/// LZMA encoder settings.
#[derive(Debug, Clone)]
pub struct LzmaEncoder {
    props: LzmaProperties,
    dict_size: u32,
    chain_depth: usize,
    nice_len: usize,
}

impl LzmaEncoder {
    /// Create an encoder for a compression level.
    pub fn new(level: LzmaLevel) -> Self {
        let idx = level.level() as usize;
        Self {
            props: LzmaProperties::default(),
            dict_size: level.dict_size(),
            chain_depth: CHAIN_DEPTH[idx],
            nice_len: NICE_LEN[idx],
        }
    }

    /// Override the dictionary size.
    pub fn with_dict_size(mut self, dict_size: u32) -> Self {
        self.dict_size = dict_size.max(MIN_DICT_SIZE);
        self
    }

    /// Literal and position context sizes.
    pub fn properties(&self) -> LzmaProperties {
        self.props
    }

    /// Configured dictionary size.
    pub fn dict_size(&self) -> u32 {
        self.dict_size
    }

    /// Dictionary size advertised for an input of `input_len` bytes.
    ///
    /// A dictionary larger than the input buys nothing and only makes the
    /// decoder reserve more memory.
    pub fn dict_size_for(&self, input_len: usize) -> u32 {
        let needed = (input_len as u64)
            .next_power_of_two()
            .max(MIN_DICT_SIZE as u64);
        if needed < self.dict_size as u64 {
            needed as u32
        } else {
            self.dict_size
        }
    }

    /// Compress `data` into `out`, returning the payload size.
    pub fn encode<W: Write>(&self, data: &[u8], out: &mut W) -> Result<u64> {
        self.encode_with_progress(data, out, |_| Ok(()))
    }

    /// Compress `data` into `out`, calling `on_progress` with the number of
    /// input bytes consumed every so often. An error from the callback stops
    /// the encoder and is returned as is.
    pub fn encode_with_progress<W, F>(&self, data: &[u8], out: &mut W, mut on_progress: F) -> Result<u64>
    where
        W: Write,
        F: FnMut(u64) -> Result<()>,
    {
        let dict_size = self.dict_size_for(data.len());
        let mut session = Session {
            data,
            rc: RangeEncoder::new(),
            model: LzmaModel::new(self.props),
            state: State::new(),
            reps: [0; 4],
            finder: MatchFinder::new(dict_size, data.len(), self.chain_depth, self.nice_len),
        };

        let mut written = 0u64;
        let mut pos = 0usize;
        let mut reported = 0usize;

        while pos < data.len() {
            let packet = session.choose(pos);
            session.encode_packet(pos, packet);

            let end = pos + packet.len();
            for p in pos..end {
                session.finder.insert(data, p);
            }
            pos = end;

            if session.rc.pending() >= FLUSH_THRESHOLD {
                written += session.rc.drain_into(out)?;
            }
            if pos - reported >= PROGRESS_INTERVAL {
                reported = pos;
                on_progress(pos as u64)?;
            }
        }

        session.rc.flush();
        written += session.rc.drain_into(out)?;
        on_progress(data.len() as u64)?;

        Ok(written)
    }
}

impl Default for LzmaEncoder {
    fn default() -> Self {
        Self::new(LzmaLevel::DEFAULT)
    }
}

struct Session<'a> {
    data: &'a [u8],
    rc: RangeEncoder,
    model: LzmaModel,
    state: State,
    reps: [u32; 4],
    finder: MatchFinder,
}

impl Session<'_> {
    fn rep_len(&self, pos: usize, index: usize, max_len: usize) -> usize {
        let dist = self.reps[index] as usize + 1;
        if dist > pos {
            return 0;
        }
        common_prefix(self.data, pos - dist, pos, max_len)
    }

    fn choose(&self, pos: usize) -> Packet {
        let max_len = (self.data.len() - pos).min(MATCH_LEN_MAX);

        let mut rep: Option<(usize, usize)> = None;
        if max_len >= MATCH_LEN_MIN {
            for index in 0..4 {
                let len = self.rep_len(pos, index, max_len);
                if len >= MATCH_LEN_MIN && rep.is_none_or(|(_, best)| len > best) {
                    rep = Some((index, len));
                }
            }
        }

        match (rep, self.finder.find(self.data, pos, max_len)) {
            (Some((index, len)), Some((_, main_len))) if len + 1 >= main_len => {
                Packet::Rep { index, len }
            }
            (_, Some((dist, len))) => Packet::Match { dist, len },
            (Some((index, len)), None) => Packet::Rep { index, len },
            (None, None) => {
                let dist = self.reps[0] as usize + 1;
                if dist <= pos && self.data[pos - dist] == self.data[pos] {
                    Packet::ShortRep
                } else {
                    Packet::Literal
                }
            }
        }
    }

    /// Byte at rep0, consulted by the literal coder right after a match.
    fn match_byte(&self, pos: usize) -> Option<u8> {
        if self.state.is_literal() {
            return None;
        }
        let dist = self.reps[0] as usize + 1;
        Some(if dist <= pos { self.data[pos - dist] } else { 0 })
    }

    fn encode_packet(&mut self, pos: usize, packet: Packet) {
        let pos_state = self.model.pos_state(pos as u64);
        let s = self.state.value();

        if packet == Packet::Literal {
            self.rc.encode_bit(&mut self.model.is_match[s][pos_state], 0);
            let prev_byte = if pos > 0 { self.data[pos - 1] } else { 0 };
            let match_byte = self.match_byte(pos);
            self.model
                .literal
                .encode(&mut self.rc, pos as u64, prev_byte, match_byte, self.data[pos]);
            self.state.update_literal();
            return;
        }

        self.rc.encode_bit(&mut self.model.is_match[s][pos_state], 1);

        match packet {
            Packet::Match { dist, len } => {
                self.rc.encode_bit(&mut self.model.is_rep[s], 0);
                self.model.match_len.encode(&mut self.rc, len, pos_state);
                self.model.distance.encode(&mut self.rc, dist, len);
                self.reps = [dist, self.reps[0], self.reps[1], self.reps[2]];
                self.state.update_match();
            }
            Packet::ShortRep => {
                self.rc.encode_bit(&mut self.model.is_rep[s], 1);
                self.rc.encode_bit(&mut self.model.is_rep0[s], 0);
                self.rc.encode_bit(&mut self.model.is_rep0_long[s][pos_state], 0);
                self.state.update_short_rep();
            }
            Packet::Rep { index, len } => {
                self.rc.encode_bit(&mut self.model.is_rep[s], 1);
                if index == 0 {
                    self.rc.encode_bit(&mut self.model.is_rep0[s], 0);
                    self.rc.encode_bit(&mut self.model.is_rep0_long[s][pos_state], 1);
                } else {
                    self.rc.encode_bit(&mut self.model.is_rep0[s], 1);
                    if index == 1 {
                        self.rc.encode_bit(&mut self.model.is_rep1[s], 0);
                    } else {
                        self.rc.encode_bit(&mut self.model.is_rep1[s], 1);
                        self.rc
                            .encode_bit(&mut self.model.is_rep2[s], (index == 3) as u32);
                    }
                    let dist = self.reps[index];
                    self.reps.copy_within(0..index, 1);
                    self.reps[0] = dist;
                }
                self.model.rep_len.encode(&mut self.rc, len, pos_state);
                self.state.update_long_rep();
            }
            Packet::Literal => {}
        }
    }
}
