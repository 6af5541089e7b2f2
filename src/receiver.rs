//! Receiver pipeline: edge mailbox, synchronizer, assembler, interpreter,
//! channel filter and sink

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, trace, warn};

use crate::assembler::{Assembly, Frame, FrameAssembler};
use crate::constants::{
    HEADER_BITS, LONG_DELAY_US, MAX_HUMIDITY_DELTA, MAX_TEMPERATURE_DELTA, RATE_LIMIT_MS,
    SENSOR_TAG, SHORT_DELAY_US,
};
use crate::core::{Level, Polarity};
use crate::error::{DecodeError, Result};
use crate::mailbox::{EdgeMailbox, MailboxPolicy};
use crate::packet::SensorPacket;
use crate::sink::ReadingSink;
use crate::sync::{BitSynchronizer, Sample, SyncEvent, SyncTiming};
use crate::validator::{ChannelTable, Outcome, PlausibilityLimits, Reading};

/// Synchronous read of the monitored input
pub trait LineInput {
    /// Current digital level
    fn level(&mut self) -> Level;
}

impl<F> LineInput for F
where
    F: FnMut() -> Level,
{
    fn level(&mut self) -> Level {
        self()
    }
}

/// Monotonic time source; both counters wrap at `u32::MAX`
pub trait Clock {
    /// Microseconds since an arbitrary origin
    fn micros(&self) -> u32;
    /// Milliseconds since the same origin
    fn millis(&self) -> u32;
}

/// Clock backed by [`std::time::Instant`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Start counting from now
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn micros(&self) -> u32 {
        self.origin.elapsed().as_micros() as u32
    }

    fn millis(&self) -> u32 {
        self.origin.elapsed().as_millis() as u32
    }
}

/// Receiver settings, fixed once built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReceiverConfig {
    /// Edge-to-confirmation delay, microseconds
    pub short_delay_us: u32,
    /// Confirmation-to-decision delay, microseconds
    pub long_delay_us: u32,
    /// Transition direction carrying a logical one
    pub polarity: Polarity,
    /// Header ones required before payload
    pub header_bits: u8,
    /// Sensor tag accepted in byte 1
    pub sensor_tag: u8,
    /// Exclusive bound on raw temperature change
    pub max_temperature_delta: i32,
    /// Exclusive bound on humidity change
    pub max_humidity_delta: i32,
    /// Minimum spacing of forwarded readings per channel, milliseconds
    pub rate_limit_ms: u32,
    /// Edge mailbox overflow behaviour
    pub mailbox_policy: MailboxPolicy,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            short_delay_us: SHORT_DELAY_US,
            long_delay_us: LONG_DELAY_US,
            polarity: Polarity::default(),
            header_bits: HEADER_BITS,
            sensor_tag: SENSOR_TAG,
            max_temperature_delta: MAX_TEMPERATURE_DELTA,
            max_humidity_delta: MAX_HUMIDITY_DELTA,
            rate_limit_ms: RATE_LIMIT_MS,
            mailbox_policy: MailboxPolicy::default(),
        }
    }
}

impl ReceiverConfig {
    /// Synchronizer timing
    pub fn timing(&self) -> SyncTiming {
        SyncTiming {
            short_delay_us: self.short_delay_us,
            long_delay_us: self.long_delay_us,
            polarity: self.polarity,
        }
    }

    /// Channel filter limits
    pub fn limits(&self) -> PlausibilityLimits {
        PlausibilityLimits {
            max_temperature_delta: self.max_temperature_delta,
            max_humidity_delta: self.max_humidity_delta,
            rate_limit_ms: self.rate_limit_ms,
        }
    }

    /// Reject settings the decoder cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.short_delay_us == 0 {
            return Err(DecodeError::invalid_config("short delay must be non-zero"));
        }
        if self.long_delay_us <= self.short_delay_us {
            return Err(DecodeError::invalid_config(format!(
                "long delay {}us must exceed short delay {}us",
                self.long_delay_us, self.short_delay_us
            )));
        }
        if self.header_bits == 0 {
            return Err(DecodeError::invalid_config("header needs at least one bit"));
        }
        if self.max_temperature_delta <= 0 || self.max_humidity_delta <= 0 {
            return Err(DecodeError::invalid_config("plausibility deltas must be positive"));
        }
        Ok(())
    }
}

/// Pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReceiverStats {
    /// Bits resolved by the synchronizer
    pub bits: u64,
    /// Complete frames assembled
    pub frames: u32,
    /// Frame attempts abandoned on timing contradictions
    pub timing_aborts: u32,
    /// Frame attempts abandoned on short headers
    pub header_underruns: u32,
    /// Frames carrying another sensor tag
    pub foreign_frames: u32,
    /// Frames with humidity above 100
    pub humidity_rejects: u32,
    /// Frames with an out-of-range channel
    pub invalid_channels: u32,
    /// Readings rejected as implausible jumps
    pub implausible: u32,
    /// Plausible readings held back by the rate limit
    pub rate_limited: u32,
    /// Readings forwarded to the sink
    pub forwarded: u32,
    /// Sink deliveries that failed
    pub sink_failures: u32,
    /// Edges dropped by the mailbox
    pub lost_edges: u32,
}

impl ReceiverStats {
    /// Serialize counters as JSON
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| DecodeError::sink(e.to_string()))
    }
}

/// Decodes the line into readings and hands them to a sink
pub struct Receiver<S: ReadingSink> {
    config: ReceiverConfig,
    sync: BitSynchronizer,
    assembler: FrameAssembler,
    channels: ChannelTable,
    mailbox: Arc<EdgeMailbox>,
    sink: S,
    stats: ReceiverStats,
}

impl<S: ReadingSink> Receiver<S> {
    /// Create a receiver; prefer [`ReceiverBuilder`] which validates `config`
    pub fn new(config: ReceiverConfig, sink: S) -> Self {
        Receiver {
            config,
            sync: BitSynchronizer::new(config.timing()),
            assembler: FrameAssembler::new(config.header_bits),
            channels: ChannelTable::new(config.limits()),
            mailbox: Arc::new(EdgeMailbox::new(config.mailbox_policy)),
            sink,
            stats: ReceiverStats::default(),
        }
    }

    /// Handle to the edge mailbox for the interrupt handler
    pub fn edge_mailbox(&self) -> Arc<EdgeMailbox> {
        Arc::clone(&self.mailbox)
    }

    /// Read the line and clock once and advance the pipeline
    pub fn poll<L: LineInput, C: Clock>(&mut self, line: &mut L, clock: &C) -> Option<Reading> {
        let level = line.level();
        self.step(level, clock.micros(), clock.millis())
    }

    /// Poll until `stop` returns true
    pub fn run_until<L, C, F>(&mut self, line: &mut L, clock: &C, mut stop: F)
    where
        L: LineInput,
        C: Clock,
        F: FnMut(&ReceiverStats) -> bool,
    {
        while !stop(&self.stats) {
            self.poll(line, clock);
        }
    }

    /// Advance the pipeline with one observation of the line.
    ///
    /// Returns the reading forwarded to the sink, if this step produced one.
    pub fn step(&mut self, level: Level, now_us: u32, now_ms: u32) -> Option<Reading> {
        let sample = Sample::new(level, now_us).with_edge(self.mailbox.take());
        match self.sync.step(sample)? {
            SyncEvent::TimingContradiction { .. } => {
                self.stats.timing_aborts = self.stats.timing_aborts.saturating_add(1);
                self.assembler.reset();
                None
            }
            SyncEvent::Bit(bit) => {
                self.stats.bits = self.stats.bits.saturating_add(1);
                self.handle_bit(bit, now_ms)
            }
        }
    }

    fn handle_bit(&mut self, bit: bool, now_ms: u32) -> Option<Reading> {
        match self.assembler.push(bit) {
            Assembly::Pending => None,
            Assembly::HeaderUnderrun { header_hits } => {
                trace!(header_hits, "header underrun, restarting");
                self.stats.header_underruns = self.stats.header_underruns.saturating_add(1);
                self.sync.reset();
                None
            }
            Assembly::Frame(frame) => {
                self.sync.reset();
                self.process_frame(&frame, now_ms)
            }
        }
    }

    /// Interpret, filter and forward an assembled frame
    pub fn process_frame(&mut self, frame: &Frame, now_ms: u32) -> Option<Reading> {
        self.stats.frames = self.stats.frames.saturating_add(1);
        match self.accept_frame(frame, now_ms) {
            Ok(Outcome::Forwarded(reading)) => {
                self.stats.forwarded = self.stats.forwarded.saturating_add(1);
                info!(
                    channel = reading.channel_number(),
                    temperature_c = reading.temperature_c,
                    humidity = reading.humidity,
                    "reading"
                );
                if let Err(err) = self.sink.deliver(&reading) {
                    self.stats.sink_failures = self.stats.sink_failures.saturating_add(1);
                    warn!(error = %err, "sink rejected reading");
                }
                Some(reading)
            }
            Ok(Outcome::RateLimited) => {
                self.stats.rate_limited = self.stats.rate_limited.saturating_add(1);
                None
            }
            Err(err) => {
                self.record_rejection(&err);
                debug!(%frame, error = %err, "frame discarded");
                None
            }
        }
    }

    fn accept_frame(&mut self, frame: &Frame, now_ms: u32) -> Result<Outcome> {
        let packet = SensorPacket::interpret(frame, self.config.sensor_tag)?;
        self.channels.submit(&packet, now_ms)
    }

    fn record_rejection(&mut self, err: &DecodeError) {
        let counter = match err {
            DecodeError::ForeignSensor(_) => &mut self.stats.foreign_frames,
            DecodeError::HumidityOutOfRange(_) => &mut self.stats.humidity_rejects,
            DecodeError::InvalidChannel(_) => &mut self.stats.invalid_channels,
            DecodeError::ImplausibleJump(_) => &mut self.stats.implausible,
            _ => return,
        };
        *counter = counter.saturating_add(1);
    }

    /// Abandon the current frame attempt
    pub fn restart(&mut self) {
        self.sync.reset();
        self.assembler.reset();
    }

    /// Pipeline counters
    pub fn stats(&self) -> ReceiverStats {
        ReceiverStats {
            lost_edges: self.mailbox.lost_edges(),
            ..self.stats
        }
    }

    /// Channel table
    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    /// Configuration in use
    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Borrow the sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutably borrow the sink
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Unwrap the sink
    pub fn into_sink(self) -> S {
        self.sink
    }
}

/// Builder for [`Receiver`]
#[derive(Debug, Clone, Default)]
pub struct ReceiverBuilder {
    config: ReceiverConfig,
}

impl ReceiverBuilder {
    /// Start from the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: ReceiverConfig) -> Self {
        ReceiverBuilder { config }
    }

    /// Set the synchronizer delays
    pub fn with_delays(mut self, short_delay_us: u32, long_delay_us: u32) -> Self {
        self.config.short_delay_us = short_delay_us;
        self.config.long_delay_us = long_delay_us;
        self
    }

    /// Derive quarter/half-bit delays from a bit period
    pub fn with_bit_period(self, bit_period_us: u32) -> Self {
        self.with_delays(bit_period_us / 4, bit_period_us / 2)
    }

    /// Set the polarity
    pub fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.config.polarity = polarity;
        self
    }

    /// Set the required header length
    pub fn with_header_bits(mut self, header_bits: u8) -> Self {
        self.config.header_bits = header_bits;
        self
    }

    /// Set the accepted sensor tag
    pub fn with_sensor_tag(mut self, sensor_tag: u8) -> Self {
        self.config.sensor_tag = sensor_tag;
        self
    }

    /// Set the plausibility deltas
    pub fn with_max_deltas(mut self, temperature: i32, humidity: i32) -> Self {
        self.config.max_temperature_delta = temperature;
        self.config.max_humidity_delta = humidity;
        self
    }

    /// Set the per-channel rate limit
    pub fn with_rate_limit_ms(mut self, rate_limit_ms: u32) -> Self {
        self.config.rate_limit_ms = rate_limit_ms;
        self
    }

    /// Set the edge mailbox policy
    pub fn with_mailbox_policy(mut self, policy: MailboxPolicy) -> Self {
        self.config.mailbox_policy = policy;
        self
    }

    /// Validate and build the receiver
    pub fn build<S: ReadingSink>(self, sink: S) -> Result<Receiver<S>> {
        self.config.validate()?;
        Ok(Receiver::new(self.config, sink))
    }
}
