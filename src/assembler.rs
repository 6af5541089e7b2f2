//! Training header detection and frame assembly

use crate::constants::{FRAME_BITS, FRAME_LENGTH, HEADER_BITS};

/// A complete 6-byte frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame([u8; FRAME_LENGTH]);

impl Frame {
    /// Wrap raw frame bytes
    pub fn new(bytes: [u8; FRAME_LENGTH]) -> Self {
        Frame(bytes)
    }

    /// Frame bytes in transmission order
    pub fn as_bytes(&self) -> &[u8; FRAME_LENGTH] {
        &self.0
    }

    /// Byte at `index`, `None` past the end of the frame
    pub fn byte(&self, index: usize) -> Option<u8> {
        self.0.get(index).copied()
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Payload bits packed MSB first, never more than one frame
#[derive(Debug, Clone, Default)]
pub struct BitBuffer {
    bytes: [u8; FRAME_LENGTH],
    bit_count: usize,
}

impl BitBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one bit, returning the frame once the last bit lands
    pub fn push(&mut self, bit: bool) -> Option<Frame> {
        let byte = self.bit_count / 8;
        let shift = 7 - (self.bit_count % 8);
        if bit {
            self.bytes[byte] |= 1 << shift;
        }
        self.bit_count += 1;

        if self.bit_count == FRAME_BITS {
            let frame = Frame(self.bytes);
            self.clear();
            Some(frame)
        } else {
            None
        }
    }

    /// Number of whole bytes collected so far
    pub fn byte_count(&self) -> usize {
        self.bit_count / 8
    }

    /// Number of bits collected so far
    pub fn bit_count(&self) -> usize {
        self.bit_count
    }

    /// Discard collected bits
    pub fn clear(&mut self) {
        self.bytes = [0; FRAME_LENGTH];
        self.bit_count = 0;
    }
}

/// Result of feeding one bit to the assembler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assembly {
    /// Bit consumed, nothing complete yet
    Pending,
    /// A zero arrived before the header was long enough; search restarts
    HeaderUnderrun {
        /// Header ones seen before the zero
        header_hits: u8,
    },
    /// A frame is complete; search restarts
    Frame(Frame),
}

/// Separates the training header from payload and packs payload bytes
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    header_bits: u8,
    header_hits: u8,
    seen_first_zero: bool,
    buffer: BitBuffer,
}

impl FrameAssembler {
    /// Create an assembler requiring `header_bits` consecutive ones
    pub fn new(header_bits: u8) -> Self {
        FrameAssembler {
            header_bits,
            header_hits: 0,
            seen_first_zero: false,
            buffer: BitBuffer::new(),
        }
    }

    /// Feed one resolved bit
    pub fn push(&mut self, bit: bool) -> Assembly {
        if !self.seen_first_zero {
            if bit {
                self.header_hits = self.header_hits.saturating_add(1);
                return Assembly::Pending;
            }
            if self.header_hits < self.header_bits {
                let header_hits = self.header_hits;
                self.reset();
                return Assembly::HeaderUnderrun { header_hits };
            }
            // The terminating zero is also the first payload bit
            self.seen_first_zero = true;
        }

        match self.buffer.push(bit) {
            Some(frame) => {
                self.reset();
                Assembly::Frame(frame)
            }
            None => Assembly::Pending,
        }
    }

    /// Return to header search
    pub fn reset(&mut self) {
        self.header_hits = 0;
        self.seen_first_zero = false;
        self.buffer.clear();
    }

    /// Header ones counted in the current attempt
    pub fn header_hits(&self) -> u8 {
        self.header_hits
    }

    /// Whether the header has been terminated and payload is being collected
    pub fn in_payload(&self) -> bool {
        self.seen_first_zero
    }

    /// Complete payload bytes collected so far
    pub fn byte_count(&self) -> usize {
        self.buffer.byte_count()
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new(HEADER_BITS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::ManchesterEncoder;

    fn feed(assembler: &mut FrameAssembler, bits: &[bool]) -> Vec<Assembly> {
        bits.iter()
            .map(|&bit| assembler.push(bit))
            .filter(|a| *a != Assembly::Pending)
            .collect()
    }

    #[test]
    fn test_header_then_payload_yields_frame() {
        let payload = [0x12, 0x45, 0x00, 0x44, 0x4B, 0x0B];
        for header in [10, 11, 25] {
            let mut bits = vec![true; header];
            bits.extend(ManchesterEncoder::bytes_to_bits(&payload));

            let mut assembler = FrameAssembler::default();
            let events = feed(&mut assembler, &bits);
            assert_eq!(events, vec![Assembly::Frame(Frame::new(payload))]);
            assert!(!assembler.in_payload());
        }
    }

    #[test]
    fn test_short_header_is_underrun() {
        let payload = [0x21, 0x45, 0x00, 0x13, 0xE8, 0x32];
        for header in 0..HEADER_BITS {
            let mut bits = vec![true; usize::from(header)];
            bits.push(false);
            bits.extend(vec![true; usize::from(HEADER_BITS)]);
            bits.extend(ManchesterEncoder::bytes_to_bits(&payload));

            let mut assembler = FrameAssembler::default();
            let events = feed(&mut assembler, &bits);
            assert_eq!(
                events,
                vec![
                    Assembly::HeaderUnderrun {
                        header_hits: header
                    },
                    Assembly::Frame(Frame::new(payload)),
                ],
                "header of {} ones",
                header
            );
            assert_eq!(assembler.header_hits(), 0);
        }
    }

    #[test]
    fn test_recovers_after_underrun() {
        let payload = [0x01, 0x45, 0xFF, 0x77, 0x10, 0x64];
        let mut bits = vec![true; 4];
        bits.push(false);
        bits.extend(vec![true; 10]);
        bits.extend(ManchesterEncoder::bytes_to_bits(&payload));

        let mut assembler = FrameAssembler::default();
        let events = feed(&mut assembler, &bits);
        assert_eq!(
            events,
            vec![
                Assembly::HeaderUnderrun { header_hits: 4 },
                Assembly::Frame(Frame::new(payload)),
            ]
        );
    }

    #[test]
    fn test_bit_buffer_packs_msb_first() {
        let mut buffer = BitBuffer::new();
        for bit in [true, false, false, false, false, false, false, true] {
            assert!(buffer.push(bit).is_none());
        }
        assert_eq!(buffer.byte_count(), 1);
        assert_eq!(buffer.bytes[0], 0x81);
    }

    #[test]
    fn test_frame_display() {
        let frame = Frame::new([0xAB, 0x45, 0, 1, 2, 3]);
        assert_eq!(frame.to_string(), "AB 45 00 01 02 03");
    }

    #[test]
    fn test_frame_byte_out_of_range() {
        let frame = Frame::new([0xAB, 0x45, 0, 1, 2, 3]);
        assert_eq!(frame.byte(1), Some(0x45));
        assert_eq!(frame.byte(FRAME_LENGTH - 1), Some(3));
        assert_eq!(frame.byte(FRAME_LENGTH), None);
        assert_eq!(frame.byte(usize::MAX), None);
    }
}
