//! Core types shared by the decoder stages

use crate::constants::CHANNEL_COUNT;
use crate::error::{DecodeError, Result};

/// Digital level of the monitored receiver line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Level {
    /// Line reads low
    Low,
    /// Line reads high
    High,
}

impl Level {
    /// Level read from a GPIO-style boolean
    pub fn from_bool(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }

    /// Whether the line is high
    pub fn is_high(&self) -> bool {
        matches!(self, Level::High)
    }

    /// The opposite level
    pub fn toggled(&self) -> Self {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Low => write!(f, "low"),
            Level::High => write!(f, "high"),
        }
    }
}

/// Which mid-cell transition direction carries a logical one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Polarity {
    /// High-to-low mid-cell transition is a one
    #[default]
    FallingIsOne,
    /// Low-to-high mid-cell transition is a one
    RisingIsOne,
}

impl Polarity {
    /// Level the line settles at after the mid-cell transition of a one.
    ///
    /// The synchronizer starts every frame attempt expecting this level.
    pub fn one_level(&self) -> Level {
        match self {
            Polarity::FallingIsOne => Level::Low,
            Polarity::RisingIsOne => Level::High,
        }
    }

    /// Logical bit represented by a cell whose second half sits at `level`
    pub fn resolve(&self, level: Level) -> bool {
        level == self.one_level()
    }

    /// Half-bit levels (first half, second half) of a cell carrying `bit`
    pub fn cell(&self, bit: bool) -> (Level, Level) {
        let second = if bit {
            self.one_level()
        } else {
            self.one_level().toggled()
        };
        (second.toggled(), second)
    }
}

/// Sensor channel id (0-7), selected by a switch on the transmitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Channel(u8);

impl Channel {
    /// Highest valid channel id
    pub const MAX: u8 = (CHANNEL_COUNT - 1) as u8;

    /// Create a channel, validating it's within range [0, 7]
    pub fn new(id: u8) -> Result<Self> {
        if id > Self::MAX {
            return Err(DecodeError::invalid_channel(format!(
                "Channel {} out of range [0, {}]",
                id,
                Self::MAX
            )));
        }
        Ok(Channel(id))
    }

    /// Zero-based channel id as transmitted
    pub fn id(&self) -> u8 {
        self.0
    }

    /// Index into the channel table
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// Channel number shown to users (1-8)
    pub fn number(&self) -> u8 {
        self.0 + 1
    }

    /// Iterate over every channel in id order
    pub fn all() -> impl Iterator<Item = Channel> {
        (0..=Self::MAX).map(Channel)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CH{}", self.number())
    }
}
