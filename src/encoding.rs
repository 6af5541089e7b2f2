//! Manchester encoding of sensor frames into line waveforms
//!
//! The receiver never encodes anything on air. The encoder exists to generate
//! exact transmitter waveforms for bench replay and for driving the decoder
//! deterministically in tests.

use crate::assembler::Frame;
use crate::core::{Level, Polarity};

/// Manchester encoder for the sensor's line code
#[derive(Debug, Clone, Copy)]
pub struct ManchesterEncoder {
    polarity: Polarity,
}

impl ManchesterEncoder {
    /// Create an encoder for the given polarity
    pub fn new(polarity: Polarity) -> Self {
        ManchesterEncoder { polarity }
    }

    /// Encode a single bit as its two half-bit levels
    pub fn encode_bit(&self, bit: bool) -> [Level; 2] {
        let (first, second) = self.polarity.cell(bit);
        [first, second]
    }

    /// Encode multiple bits into half-bit levels, two per bit
    pub fn encode_bits(&self, bits: &[bool]) -> Vec<Level> {
        bits.iter().flat_map(|&bit| self.encode_bit(bit)).collect()
    }

    /// Expand bytes into bits, most significant bit first
    pub fn bytes_to_bits(bytes: &[u8]) -> Vec<bool> {
        bytes
            .iter()
            .flat_map(|&byte| (0..8).rev().map(move |i| (byte >> i) & 1 != 0))
            .collect()
    }

    /// Encode a full transmission: `header_ones` training ones, then the frame.
    ///
    /// The first frame bit must be zero; it doubles as the header terminator.
    pub fn encode_transmission(&self, header_ones: usize, frame: &Frame) -> Vec<Level> {
        let mut bits = vec![true; header_ones];
        bits.extend(Self::bytes_to_bits(frame.as_bytes()));
        self.encode_bits(&bits)
    }
}

/// A line waveform built from half-bit levels, placed on a microsecond timeline
#[derive(Debug, Clone)]
pub struct Waveform {
    half_bits: Vec<Level>,
    half_bit_us: u32,
    start_us: u32,
    idle: Level,
}

impl Waveform {
    /// Place `half_bits` starting at `start_us`, each lasting `half_bit_us`.
    ///
    /// Outside the transmission the line sits at `idle`.
    pub fn new(half_bits: Vec<Level>, half_bit_us: u32, start_us: u32, idle: Level) -> Self {
        Waveform {
            half_bits,
            half_bit_us: half_bit_us.max(1),
            start_us,
            idle,
        }
    }

    /// First microsecond after the transmission
    pub fn end_us(&self) -> u32 {
        self.start_us + self.half_bits.len() as u32 * self.half_bit_us
    }

    /// Level of the line at time `t`
    pub fn level_at(&self, t: u32) -> Level {
        if t < self.start_us {
            return self.idle;
        }
        let slot = ((t - self.start_us) / self.half_bit_us) as usize;
        self.half_bits.get(slot).copied().unwrap_or(self.idle)
    }

    /// Timestamps of level changes in the half-open window `(from, to]`
    pub fn edges_between(&self, from: u32, to: u32) -> Vec<u32> {
        let mut edges = Vec::new();
        let mut previous = self.idle;
        let boundaries = (0..=self.half_bits.len()).map(|i| {
            let level = self.half_bits.get(i).copied().unwrap_or(self.idle);
            (self.start_us + i as u32 * self.half_bit_us, level)
        });
        for (at, level) in boundaries {
            if level != previous && at > from && at <= to {
                edges.push(at);
            }
            previous = level;
        }
        edges
    }
}
