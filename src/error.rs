//! Error types for sensor packet decoding

use thiserror::Error;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Reasons a signal, frame or reading is rejected on its way to a sink.
///
/// None of these are fatal. The receiver counts and logs them, then returns
/// to header search.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Line level did not hold for the short delay after an edge
    #[error("Timing contradiction: {0}")]
    TimingContradiction(String),

    /// A zero arrived before the training header was long enough
    #[error("Header underrun: {0}")]
    HeaderUnderrun(String),

    /// Frame carries another device's sensor tag
    #[error("Foreign sensor: {0}")]
    ForeignSensor(String),

    /// Humidity byte outside 0-100
    #[error("Humidity out of range: {0}")]
    HumidityOutOfRange(String),

    /// Channel id outside the channel table
    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    /// Reading jumped too far from the last accepted one
    #[error("Implausible reading: {0}")]
    ImplausibleJump(String),

    /// A reading sink failed to accept a reading
    #[error("Sink error: {0}")]
    Sink(String),

    /// Receiver configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DecodeError {
    /// Create a new TimingContradiction error
    pub fn timing_contradiction(msg: impl Into<String>) -> Self {
        DecodeError::TimingContradiction(msg.into())
    }

    /// Create a new HeaderUnderrun error
    pub fn header_underrun(msg: impl Into<String>) -> Self {
        DecodeError::HeaderUnderrun(msg.into())
    }

    /// Create a new ForeignSensor error
    pub fn foreign_sensor(msg: impl Into<String>) -> Self {
        DecodeError::ForeignSensor(msg.into())
    }

    /// Create a new HumidityOutOfRange error
    pub fn humidity_out_of_range(msg: impl Into<String>) -> Self {
        DecodeError::HumidityOutOfRange(msg.into())
    }

    /// Create a new InvalidChannel error
    pub fn invalid_channel(msg: impl Into<String>) -> Self {
        DecodeError::InvalidChannel(msg.into())
    }

    /// Create a new ImplausibleJump error
    pub fn implausible_jump(msg: impl Into<String>) -> Self {
        DecodeError::ImplausibleJump(msg.into())
    }

    /// Create a new Sink error
    pub fn sink(msg: impl Into<String>) -> Self {
        DecodeError::Sink(msg.into())
    }

    /// Create a new InvalidConfig error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        DecodeError::InvalidConfig(msg.into())
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(err: std::io::Error) -> Self {
        DecodeError::Sink(err.to_string())
    }
}
