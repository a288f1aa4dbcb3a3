//! LZMA probability models and the coder state machine.
//!
//! Every adaptive bit the coder emits has its own 11-bit probability. The
//! tables are grouped by what they model: literals, match lengths, distances
//! and the packet-kind flags driven by [`State`]. The encoder and decoder
//! build identical models from the same [`LzmaProperties`] and walk them in
//! lockstep.

use crate::range_coder::{PROB_INIT, RangeDecoder, RangeEncoder};
use oxipack_core::error::{ArchiveError, Result};
use std::io::Read;

/// Default literal context bits.
pub const LC_DEFAULT: u32 = 3;
/// Default literal position bits.
pub const LP_DEFAULT: u32 = 0;
/// Default position bits.
pub const PB_DEFAULT: u32 = 2;

/// Maximum number of position states (`pb` = 4).
pub const POS_STATES_MAX: usize = 1 << 4;

/// Number of states in the LZMA state machine.
pub const NUM_STATES: usize = 12;

const LEN_LOW_BITS: u32 = 3;
const LEN_MID_BITS: u32 = 3;
const LEN_HIGH_BITS: u32 = 8;
const LEN_LOW_SYMBOLS: usize = 1 << LEN_LOW_BITS;
const LEN_MID_SYMBOLS: usize = 1 << LEN_MID_BITS;
const LEN_HIGH_SYMBOLS: usize = 1 << LEN_HIGH_BITS;

/// Shortest match the format can express.
pub const MATCH_LEN_MIN: usize = 2;

/// Longest match the format can express.
pub const MATCH_LEN_MAX: usize = MATCH_LEN_MIN + LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS + LEN_HIGH_SYMBOLS - 1;

/// Number of length contexts used to pick a distance slot tree.
pub const DIST_STATES: usize = 4;

/// Bits in a distance slot.
pub const DIST_SLOT_BITS: u32 = 6;

/// Low distance bits coded with the shared alignment tree.
pub const DIST_ALIGN_BITS: u32 = 4;
const DIST_ALIGN_SIZE: usize = 1 << DIST_ALIGN_BITS;

/// First slot whose footer is split into direct and alignment bits.
pub const END_POS_MODEL_INDEX: u32 = 14;
const FULL_DISTANCES: usize = 1 << (END_POS_MODEL_INDEX >> 1);

/// LZMA state machine state.
///
/// States 0..=6 follow a literal, 7..=11 follow a match or a rep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct State(u8);

impl State {
    /// Initial state.
    pub const fn new() -> Self {
        Self(0)
    }

    /// State index for probability lookups.
    pub fn value(self) -> usize {
        self.0 as usize
    }

    /// Check if the previous packet was a literal.
    pub fn is_literal(self) -> bool {
        self.0 < 7
    }

    /// Update state after a literal.
    pub fn update_literal(&mut self) {
        self.0 = match self.0 {
            0..=3 => 0,
            4..=9 => self.0 - 3,
            _ => self.0 - 6,
        };
    }

    /// Update state after a match with a new distance.
    pub fn update_match(&mut self) {
        self.0 = if self.0 < 7 { 7 } else { 10 };
    }

    /// Update state after a one-byte rep0.
    pub fn update_short_rep(&mut self) {
        self.0 = if self.0 < 7 { 9 } else { 11 };
    }

    /// Update state after a rep match.
    pub fn update_long_rep(&mut self) {
        self.0 = if self.0 < 7 { 8 } else { 11 };
    }
}

/// Literal and position context sizes (lc, lp, pb).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzmaProperties {
    /// Literal context bits.
    pub lc: u32,
    /// Literal position bits.
    pub lp: u32,
    /// Position bits.
    pub pb: u32,
}

impl LzmaProperties {
    /// Create new properties.
    pub fn new(lc: u32, lp: u32, pb: u32) -> Self {
        Self { lc, lp, pb }
    }

    /// Parse the packed properties byte `(pb * 5 + lp) * 9 + lc`.
    pub fn from_byte(byte: u8) -> Result<Self> {
        let value = byte as u32;
        let lc = value % 9;
        let lp = (value / 9) % 5;
        let pb = value / 45;

        if pb > 4 {
            return Err(ArchiveError::corrupt(
                0,
                format!("invalid LZMA properties byte 0x{:02X}", byte),
            ));
        }

        Ok(Self { lc, lp, pb })
    }

    /// Pack into the properties byte.
    pub fn to_byte(self) -> u8 {
        ((self.pb * 5 + self.lp) * 9 + self.lc) as u8
    }

    /// Number of literal coder contexts.
    pub fn num_lit_states(self) -> usize {
        1 << (self.lc + self.lp)
    }

    /// Number of position states.
    pub fn num_pos_states(self) -> usize {
        1 << self.pb
    }
}

impl Default for LzmaProperties {
    fn default() -> Self {
        Self::new(LC_DEFAULT, LP_DEFAULT, PB_DEFAULT)
    }
}

/// Distance slot for a zero-based distance.
///
/// Slots 0..=3 are the distances themselves; above that the slot encodes the
/// position of the highest set bit and the bit right below it.
pub fn dist_slot(dist: u32) -> u32 {
    if dist < 4 {
        return dist;
    }
    let bits = 32 - dist.leading_zeros();
    ((bits - 1) << 1) | ((dist >> (bits - 2)) & 1)
}

/// Length coder shared by matches and reps (each has its own instance).
#[derive(Debug, Clone)]
pub struct LengthModel {
    choice: u16,
    choice2: u16,
    low: [[u16; LEN_LOW_SYMBOLS]; POS_STATES_MAX],
    mid: [[u16; LEN_MID_SYMBOLS]; POS_STATES_MAX],
    high: [u16; LEN_HIGH_SYMBOLS],
}

impl LengthModel {
    /// Create a length model with every probability at 50%.
    pub fn new() -> Self {
        Self {
            choice: PROB_INIT,
            choice2: PROB_INIT,
            low: [[PROB_INIT; LEN_LOW_SYMBOLS]; POS_STATES_MAX],
            mid: [[PROB_INIT; LEN_MID_SYMBOLS]; POS_STATES_MAX],
            high: [PROB_INIT; LEN_HIGH_SYMBOLS],
        }
    }

    /// Encode a match length in `MATCH_LEN_MIN..=MATCH_LEN_MAX`.
    pub fn encode(&mut self, rc: &mut RangeEncoder, len: usize, pos_state: usize) {
        let symbol = (len - MATCH_LEN_MIN) as u32;
        if symbol < LEN_LOW_SYMBOLS as u32 {
            rc.encode_bit(&mut self.choice, 0);
            rc.encode_tree(&mut self.low[pos_state], LEN_LOW_BITS, symbol);
        } else if symbol < (LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS) as u32 {
            rc.encode_bit(&mut self.choice, 1);
            rc.encode_bit(&mut self.choice2, 0);
            rc.encode_tree(
                &mut self.mid[pos_state],
                LEN_MID_BITS,
                symbol - LEN_LOW_SYMBOLS as u32,
            );
        } else {
            rc.encode_bit(&mut self.choice, 1);
            rc.encode_bit(&mut self.choice2, 1);
            rc.encode_tree(
                &mut self.high,
                LEN_HIGH_BITS,
                symbol - (LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS) as u32,
            );
        }
    }

    /// Decode a match length.
    pub fn decode<R: Read>(&mut self, rc: &mut RangeDecoder<R>, pos_state: usize) -> Result<usize> {
        let symbol = if rc.decode_bit(&mut self.choice)? == 0 {
            rc.decode_tree(&mut self.low[pos_state], LEN_LOW_BITS)? as usize
        } else if rc.decode_bit(&mut self.choice2)? == 0 {
            LEN_LOW_SYMBOLS + rc.decode_tree(&mut self.mid[pos_state], LEN_MID_BITS)? as usize
        } else {
            LEN_LOW_SYMBOLS
                + LEN_MID_SYMBOLS
                + rc.decode_tree(&mut self.high, LEN_HIGH_BITS)? as usize
        };
        Ok(symbol + MATCH_LEN_MIN)
    }
}

impl Default for LengthModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Literal coder tables.
///
/// Each context holds 0x300 probabilities: a plain 8-bit tree at 0x001..0x100
/// and two matched trees at 0x100..0x300, selected by the current bit of the
/// byte at rep0 until the first mismatch.
#[derive(Debug, Clone)]
pub struct LiteralModel {
    lc: u32,
    lp_mask: u64,
    probs: Vec<[u16; 0x300]>,
}

impl LiteralModel {
    /// Create the tables for the given properties.
    pub fn new(props: LzmaProperties) -> Self {
        Self {
            lc: props.lc,
            lp_mask: (1u64 << props.lp) - 1,
            probs: vec![[PROB_INIT; 0x300]; props.num_lit_states()],
        }
    }

    fn context(&self, pos: u64, prev_byte: u8) -> usize {
        let pos_bits = (pos & self.lp_mask) as usize;
        let prev_bits = if self.lc == 0 {
            0
        } else {
            (prev_byte as usize) >> (8 - self.lc)
        };
        (pos_bits << self.lc) + prev_bits
    }

    /// Encode `byte`; `match_byte` is the byte at rep0 when the previous
    /// packet was a match.
    pub fn encode(
        &mut self,
        rc: &mut RangeEncoder,
        pos: u64,
        prev_byte: u8,
        match_byte: Option<u8>,
        byte: u8,
    ) {
        let ctx = self.context(pos, prev_byte);
        let probs = &mut self.probs[ctx];
        let mut symbol = 1usize;
        let mut matched = match_byte.is_some();
        let match_byte = match_byte.unwrap_or(0);

        for i in (0..8).rev() {
            let bit = ((byte >> i) & 1) as usize;
            if matched {
                let match_bit = ((match_byte >> i) & 1) as usize;
                rc.encode_bit(&mut probs[0x100 + (match_bit << 8) + symbol], bit as u32);
                matched = bit == match_bit;
            } else {
                rc.encode_bit(&mut probs[symbol], bit as u32);
            }
            symbol = (symbol << 1) | bit;
        }
    }

    /// Decode one literal (see [`LiteralModel::encode`]).
    pub fn decode<R: Read>(
        &mut self,
        rc: &mut RangeDecoder<R>,
        pos: u64,
        prev_byte: u8,
        match_byte: Option<u8>,
    ) -> Result<u8> {
        let ctx = self.context(pos, prev_byte);
        let probs = &mut self.probs[ctx];
        let mut symbol = 1usize;
        let mut matched = match_byte.is_some();
        let match_byte = match_byte.unwrap_or(0);

        for i in (0..8).rev() {
            let bit = if matched {
                let match_bit = ((match_byte >> i) & 1) as usize;
                let bit = rc.decode_bit(&mut probs[0x100 + (match_bit << 8) + symbol])? as usize;
                matched = bit == match_bit;
                bit
            } else {
                rc.decode_bit(&mut probs[symbol])? as usize
            };
            symbol = (symbol << 1) | bit;
        }

        Ok((symbol & 0xFF) as u8)
    }
}

/// Distance coder tables.
#[derive(Debug, Clone)]
pub struct DistanceModel {
    slot: [[u16; 1 << DIST_SLOT_BITS]; DIST_STATES],
    special: [u16; FULL_DISTANCES - END_POS_MODEL_INDEX as usize],
    align: [u16; DIST_ALIGN_SIZE],
}

impl DistanceModel {
    /// Create a distance model with every probability at 50%.
    pub fn new() -> Self {
        Self {
            slot: [[PROB_INIT; 1 << DIST_SLOT_BITS]; DIST_STATES],
            special: [PROB_INIT; FULL_DISTANCES - END_POS_MODEL_INDEX as usize],
            align: [PROB_INIT; DIST_ALIGN_SIZE],
        }
    }

    fn len_state(len: usize) -> usize {
        (len - MATCH_LEN_MIN).min(DIST_STATES - 1)
    }

    /// Encode a zero-based distance for a match of length `len`.
    pub fn encode(&mut self, rc: &mut RangeEncoder, dist: u32, len: usize) {
        let slot = dist_slot(dist);
        rc.encode_tree(&mut self.slot[Self::len_state(len)], DIST_SLOT_BITS, slot);
        if slot < 4 {
            return;
        }

        let footer = (slot >> 1) - 1;
        let base = (2 | (slot & 1)) << footer;
        let reduced = dist - base;

        if slot < END_POS_MODEL_INDEX {
            rc.encode_tree_reverse(&mut self.special[(base - slot) as usize..], footer, reduced);
        } else {
            rc.encode_direct_bits(reduced >> DIST_ALIGN_BITS, footer - DIST_ALIGN_BITS);
            rc.encode_tree_reverse(
                &mut self.align,
                DIST_ALIGN_BITS,
                reduced & (DIST_ALIGN_SIZE as u32 - 1),
            );
        }
    }

    /// Decode a zero-based distance for a match of length `len`.
    pub fn decode<R: Read>(&mut self, rc: &mut RangeDecoder<R>, len: usize) -> Result<u32> {
        let slot = rc.decode_tree(&mut self.slot[Self::len_state(len)], DIST_SLOT_BITS)?;
        if slot < 4 {
            return Ok(slot);
        }

        let footer = (slot >> 1) - 1;
        let base = (2 | (slot & 1)) << footer;

        let reduced = if slot < END_POS_MODEL_INDEX {
            rc.decode_tree_reverse(&mut self.special[(base - slot) as usize..], footer)?
        } else {
            let direct = rc.decode_direct_bits(footer - DIST_ALIGN_BITS)?;
            let align = rc.decode_tree_reverse(&mut self.align, DIST_ALIGN_BITS)?;
            (direct << DIST_ALIGN_BITS) | align
        };

        Ok(base + reduced)
    }
}

impl Default for DistanceModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Complete set of probability tables for one stream.
#[derive(Debug, Clone)]
pub struct LzmaModel {
    /// Properties the tables were sized for.
    pub props: LzmaProperties,
    /// Literal (0) or match (1), per state and position state.
    pub is_match: [[u16; POS_STATES_MAX]; NUM_STATES],
    /// New distance (0) or rep (1).
    pub is_rep: [u16; NUM_STATES],
    /// rep0 (0) or rep1..=3 (1).
    pub is_rep0: [u16; NUM_STATES],
    /// rep1 (0) or rep2..=3 (1).
    pub is_rep1: [u16; NUM_STATES],
    /// rep2 (0) or rep3 (1).
    pub is_rep2: [u16; NUM_STATES],
    /// Short rep (0) or long rep0 (1).
    pub is_rep0_long: [[u16; POS_STATES_MAX]; NUM_STATES],
    /// Lengths of matches with a new distance.
    pub match_len: LengthModel,
    /// Lengths of rep matches.
    pub rep_len: LengthModel,
    /// Literal tables.
    pub literal: LiteralModel,
    /// Distance tables.
    pub distance: DistanceModel,
}

impl LzmaModel {
    /// Create a fresh model for the given properties.
    pub fn new(props: LzmaProperties) -> Self {
        Self {
            props,
            is_match: [[PROB_INIT; POS_STATES_MAX]; NUM_STATES],
            is_rep: [PROB_INIT; NUM_STATES],
            is_rep0: [PROB_INIT; NUM_STATES],
            is_rep1: [PROB_INIT; NUM_STATES],
            is_rep2: [PROB_INIT; NUM_STATES],
            is_rep0_long: [[PROB_INIT; POS_STATES_MAX]; NUM_STATES],
            match_len: LengthModel::new(),
            rep_len: LengthModel::new(),
            literal: LiteralModel::new(props),
            distance: DistanceModel::new(),
        }
    }

    /// Position state for an uncompressed offset.
    pub fn pos_state(&self, pos: u64) -> usize {
        (pos as usize) & (self.props.num_pos_states() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_state_transitions() {
        let mut state = State::new();
        assert!(state.is_literal());

        state.update_match();
        assert!(!state.is_literal());
        assert_eq!(state.value(), 7);

        state.update_literal();
        assert!(state.is_literal());
        assert_eq!(state.value(), 4);

        state.update_short_rep();
        assert_eq!(state.value(), 9);
        state.update_long_rep();
        assert_eq!(state.value(), 11);
        state.update_literal();
        assert_eq!(state.value(), 5);
    }

    #[test]
    fn test_properties_byte() {
        let props = LzmaProperties::default();
        assert_eq!(props.to_byte(), 0x5D);
        assert_eq!(LzmaProperties::from_byte(0x5D).unwrap(), props);
        assert_eq!(LzmaProperties::from_byte(0).unwrap(), LzmaProperties::new(0, 0, 0));
        assert!(LzmaProperties::from_byte(225).is_err());
    }

    #[test]
    fn test_dist_slot() {
        assert_eq!(dist_slot(0), 0);
        assert_eq!(dist_slot(3), 3);
        assert_eq!(dist_slot(4), 4);
        assert_eq!(dist_slot(5), 4);
        assert_eq!(dist_slot(6), 5);
        assert_eq!(dist_slot(8), 6);
        assert_eq!(dist_slot(127), 13);
        assert_eq!(dist_slot(128), 14);
        assert_eq!(dist_slot(u32::MAX), 63);
    }

    #[test]
    fn test_length_and_distance_coding() {
        let lengths = [2usize, 9, 10, 17, 18, 100, MATCH_LEN_MAX];
        let distances = [0u32, 3, 4, 77, 127, 128, 5000, 1 << 20, 0xFFFF_FFF0];

        let mut rc = RangeEncoder::new();
        let mut len_model = LengthModel::new();
        let mut dist_model = DistanceModel::new();
        for (i, &len) in lengths.iter().enumerate() {
            len_model.encode(&mut rc, len, i % 4);
            for &dist in &distances {
                dist_model.encode(&mut rc, dist, len);
            }
        }
        rc.flush();
        let mut encoded = Vec::new();
        rc.drain_into(&mut encoded).unwrap();

        let mut rc = RangeDecoder::new(Cursor::new(encoded)).unwrap();
        let mut len_model = LengthModel::new();
        let mut dist_model = DistanceModel::new();
        for (i, &len) in lengths.iter().enumerate() {
            assert_eq!(len_model.decode(&mut rc, i % 4).unwrap(), len);
            for &dist in &distances {
                assert_eq!(dist_model.decode(&mut rc, len).unwrap(), dist);
            }
        }
        rc.finish().unwrap();
    }

    #[test]
    fn test_literal_coding_with_match_byte() {
        let props = LzmaProperties::default();
        let input = [(b'a', None), (b'b', Some(b'b')), (b'c', Some(0xFF)), (0, None)];

        let mut rc = RangeEncoder::new();
        let mut model = LiteralModel::new(props);
        let mut prev = 0u8;
        for (pos, &(byte, match_byte)) in input.iter().enumerate() {
            model.encode(&mut rc, pos as u64, prev, match_byte, byte);
            prev = byte;
        }
        rc.flush();
        let mut encoded = Vec::new();
        rc.drain_into(&mut encoded).unwrap();

        let mut rc = RangeDecoder::new(Cursor::new(encoded)).unwrap();
        let mut model = LiteralModel::new(props);
        let mut prev = 0u8;
        for (pos, &(byte, match_byte)) in input.iter().enumerate() {
            let decoded = model.decode(&mut rc, pos as u64, prev, match_byte).unwrap();
            assert_eq!(decoded, byte);
            prev = decoded;
        }
        rc.finish().unwrap();
    }
}
