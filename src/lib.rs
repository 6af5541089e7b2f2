//! # Thermo-hygrometer Receiver
//!
//! Decodes Manchester-encoded radio packets from a remote temperature/humidity
//! sensor, filters implausible readings per channel and forwards accepted
//! readings to display or telemetry sinks.
//!
//! The only input is a digital line driven by a 433 MHz receiver module. This
//! library provides:
//!
//! - Edge timestamp mailbox safe to fill from an interrupt context
//! - Manchester bit synchronization from line level and timing alone
//! - Training header detection and frame assembly
//! - Packet field extraction and per-channel plausibility filtering
//! - Text-line and character-display sinks
//!
//! ## Features
//!
//! - `serde`: Enable serialization/deserialization support
//!
//! ## Example
//!
//! ```
//! use thermohygro_rx::{Level, ReceiverBuilder, TextLineSink};
//!
//! let sink = TextLineSink::new(Vec::<u8>::new());
//! let mut receiver = ReceiverBuilder::new().build(sink)?;
//!
//! // The interrupt handler owns a clone of the mailbox
//! let edges = receiver.edge_mailbox();
//! edges.notify(1_000);
//!
//! // The main loop feeds line level and time
//! let reading = receiver.step(Level::High, 1_010, 1);
//! assert!(reading.is_none());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod assembler;
pub mod core;
pub mod encoding;
pub mod error;
pub mod mailbox;
pub mod packet;
pub mod receiver;
pub mod sink;
pub mod sync;
pub mod validator;

pub use crate::core::{Channel, Level, Polarity};
pub use assembler::{Assembly, Frame, FrameAssembler};
pub use error::{DecodeError, Result};
pub use mailbox::{EdgeMailbox, MailboxPolicy};
pub use packet::SensorPacket;
pub use receiver::{Clock, LineInput, Receiver, ReceiverBuilder, ReceiverConfig, ReceiverStats};
pub use sink::{CharacterDisplay, ReadingSink, TextLineSink};
pub use sync::{BitSynchronizer, SyncEvent};
pub use validator::{ChannelTable, Reading};

/// Fixed protocol constants of the sensor link
pub mod constants {
    /// Frame length in bytes
    pub const FRAME_LENGTH: usize = 6;

    /// Frame length in bits
    pub const FRAME_BITS: usize = FRAME_LENGTH * 8;

    /// Number of logical channels
    pub const CHANNEL_COUNT: usize = 8;

    /// Consecutive header ones required before payload
    pub const HEADER_BITS: u8 = 10;

    /// Sensor tag carried in byte 1 of every frame from the supported sensor
    pub const SENSOR_TAG: u8 = 0x45;

    /// Highest physically valid relative humidity
    pub const MAX_HUMIDITY: u8 = 100;

    /// Raw temperature corresponding to 0 °C
    pub const TEMPERATURE_OFFSET: u16 = 720;

    /// Degrees Celsius per raw temperature step
    pub const TEMPERATURE_SCALE: f32 = 0.0556;

    /// Nominal Manchester bit period in microseconds
    pub const BIT_PERIOD_US: u32 = 1_000;

    /// Default sample delay after an edge (quarter bit)
    pub const SHORT_DELAY_US: u32 = BIT_PERIOD_US / 4;

    /// Default delay from the short sample to the bit decision (half bit)
    pub const LONG_DELAY_US: u32 = BIT_PERIOD_US / 2;

    /// Minimum spacing between forwarded readings of one channel
    pub const RATE_LIMIT_MS: u32 = 1_000;

    /// Largest raw temperature change accepted between readings (exclusive)
    pub const MAX_TEMPERATURE_DELTA: i32 = 20;

    /// Largest humidity change accepted between readings (exclusive)
    pub const MAX_HUMIDITY_DELTA: i32 = 5;
}
