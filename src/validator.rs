//! Per-channel plausibility filter and output rate limiting

use tracing::debug;

use crate::constants::{CHANNEL_COUNT, MAX_HUMIDITY_DELTA, MAX_TEMPERATURE_DELTA, RATE_LIMIT_MS};
use crate::core::Channel;
use crate::error::{DecodeError, Result};
use crate::packet::{raw_to_celsius, SensorPacket};

/// Bounds applied to consecutive readings of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlausibilityLimits {
    /// Raw temperature change must stay strictly inside ±this
    pub max_temperature_delta: i32,
    /// Humidity change must stay strictly inside ±this
    pub max_humidity_delta: i32,
    /// Minimum milliseconds between forwarded readings of a channel
    pub rate_limit_ms: u32,
}

impl Default for PlausibilityLimits {
    fn default() -> Self {
        PlausibilityLimits {
            max_temperature_delta: MAX_TEMPERATURE_DELTA,
            max_humidity_delta: MAX_HUMIDITY_DELTA,
            rate_limit_ms: RATE_LIMIT_MS,
        }
    }
}

/// Raw values of the last forwarded reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawReading {
    /// Raw 12-bit temperature
    pub temperature: u16,
    /// Relative humidity, percent
    pub humidity: u8,
}

/// An accepted reading, converted for display
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reading {
    /// Source channel
    pub channel: Channel,
    /// Temperature in degrees Celsius
    pub temperature_c: f32,
    /// Relative humidity, percent (0-100)
    pub humidity: u8,
    /// Raw temperature the conversion came from
    pub raw_temperature: u16,
    /// Time of forwarding, milliseconds
    pub timestamp_ms: u32,
}

impl Reading {
    /// Channel number shown to users (1-8)
    pub fn channel_number(&self) -> u8 {
        self.channel.number()
    }

    /// Temperature rounded to tenths of a degree
    pub fn temperature_tenths(&self) -> i32 {
        (self.temperature_c * 10.0).round() as i32
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{:.1}:{}",
            self.channel_number(),
            self.temperature_c,
            self.humidity
        )
    }
}

/// Counters kept per channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelStats {
    /// Readings that passed the plausibility check
    pub accepted: u32,
    /// Readings rejected as implausible jumps
    pub rejected: u32,
    /// Accepted readings held back by the rate limit
    pub rate_limited: u32,
    /// Readings forwarded to sinks
    pub forwarded: u32,
}

/// State of one channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelState {
    /// Last forwarded raw values, `None` until the first reading
    pub last: Option<RawReading>,
    /// Time of the last forward, milliseconds
    pub last_forward_ms: Option<u32>,
    /// Counters
    pub stats: ChannelStats,
}

impl ChannelState {
    /// Whether `candidate` is within the limits of the last forwarded reading
    fn is_plausible(&self, candidate: RawReading, limits: &PlausibilityLimits) -> bool {
        match self.last {
            None => true,
            Some(last) => {
                let delta_temp = i32::from(candidate.temperature) - i32::from(last.temperature);
                let delta_hum = i32::from(candidate.humidity) - i32::from(last.humidity);
                delta_temp.abs() < limits.max_temperature_delta
                    && delta_hum.abs() < limits.max_humidity_delta
            }
        }
    }

    /// Whether a forward is allowed at `now_ms`.
    ///
    /// A last-forward time ahead of `now_ms` means the millisecond clock
    /// wrapped, so the channel counts as due.
    fn is_due(&self, now_ms: u32, limits: &PlausibilityLimits) -> bool {
        match self.last_forward_ms {
            None => true,
            Some(last) => now_ms < last || now_ms - last >= limits.rate_limit_ms,
        }
    }
}

/// Result of submitting a plausible reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// Reading forwarded; channel state updated
    Forwarded(Reading),
    /// Reading plausible but too soon after the last forward
    RateLimited,
}

/// Fixed table of channel states, one per channel id
#[derive(Debug, Clone)]
pub struct ChannelTable {
    channels: [ChannelState; CHANNEL_COUNT],
    limits: PlausibilityLimits,
}

impl ChannelTable {
    /// Create a table where no channel has been heard yet
    pub fn new(limits: PlausibilityLimits) -> Self {
        ChannelTable {
            channels: [ChannelState::default(); CHANNEL_COUNT],
            limits,
        }
    }

    /// Judge a packet that passed the frame gate
    pub fn submit(&mut self, packet: &SensorPacket, now_ms: u32) -> Result<Outcome> {
        let channel = Channel::new(packet.channel_id)?;
        let candidate = RawReading {
            temperature: packet.raw_temperature,
            humidity: packet.raw_humidity,
        };
        let limits = self.limits;
        let state = &mut self.channels[channel.index()];

        if !state.is_plausible(candidate, &limits) {
            state.stats.rejected = state.stats.rejected.saturating_add(1);
            debug!(%channel, raw_temperature = candidate.temperature, humidity = candidate.humidity, "implausible jump");
            return Err(DecodeError::implausible_jump(format!(
                "{}: raw {}/{}% after {:?}",
                channel, candidate.temperature, candidate.humidity, state.last
            )));
        }
        state.stats.accepted = state.stats.accepted.saturating_add(1);

        if !state.is_due(now_ms, &limits) {
            state.stats.rate_limited = state.stats.rate_limited.saturating_add(1);
            return Ok(Outcome::RateLimited);
        }

        state.last = Some(candidate);
        state.last_forward_ms = Some(now_ms);
        state.stats.forwarded = state.stats.forwarded.saturating_add(1);

        Ok(Outcome::Forwarded(Reading {
            channel,
            temperature_c: raw_to_celsius(candidate.temperature),
            humidity: candidate.humidity,
            raw_temperature: candidate.temperature,
            timestamp_ms: now_ms,
        }))
    }

    /// State of a channel
    pub fn get(&self, channel: Channel) -> &ChannelState {
        &self.channels[channel.index()]
    }

    /// Counters of a channel
    pub fn stats(&self, channel: Channel) -> ChannelStats {
        self.get(channel).stats
    }

    /// Channels heard at least once, with their last raw values
    pub fn heard(&self) -> Vec<(Channel, RawReading)> {
        Channel::all()
            .filter_map(|ch| self.get(ch).last.map(|last| (ch, last)))
            .collect()
    }

    /// Limits in use
    pub fn limits(&self) -> &PlausibilityLimits {
        &self.limits
    }

    /// Forget every channel
    pub fn clear(&mut self) {
        self.channels = [ChannelState::default(); CHANNEL_COUNT];
    }
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self::new(PlausibilityLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(raw_temperature: u16, raw_humidity: u8) -> ChannelTable {
        let mut table = ChannelTable::default();
        let outcome = table
            .submit(&SensorPacket::new(0, raw_temperature, raw_humidity), 0)
            .unwrap();
        assert!(matches!(outcome, Outcome::Forwarded(_)));
        table
    }

    #[test]
    fn test_first_reading_always_accepted() -> Result<()> {
        for raw in [0u16, 720, 1000, 4095] {
            let mut table = ChannelTable::default();
            let outcome = table.submit(&SensorPacket::new(3, raw, 40), 5)?;
            assert!(matches!(outcome, Outcome::Forwarded(_)));
        }
        Ok(())
    }

    #[test]
    fn test_temperature_jump_bounds() -> Result<()> {
        let mut table = seeded(1000, 50);
        let result = table.submit(&SensorPacket::new(0, 1021, 52), 2_000);
        assert!(matches!(result, Err(DecodeError::ImplausibleJump(_))));

        let mut table = seeded(1000, 50);
        let outcome = table.submit(&SensorPacket::new(0, 1019, 52), 2_000)?;
        assert!(matches!(outcome, Outcome::Forwarded(_)));
        Ok(())
    }

    #[test]
    fn test_delta_bounds_are_exclusive() {
        let mut table = seeded(1000, 50);
        assert!(table.submit(&SensorPacket::new(0, 980, 50), 2_000).is_err());
        assert!(table.submit(&SensorPacket::new(0, 1000, 55), 2_000).is_err());
        assert!(table.submit(&SensorPacket::new(0, 1000, 45), 2_000).is_err());
        assert!(table.submit(&SensorPacket::new(0, 981, 46), 2_000).is_ok());
    }

    #[test]
    fn test_rejection_keeps_last_good_state() -> Result<()> {
        let mut table = seeded(1000, 50);
        let _ = table.submit(&SensorPacket::new(0, 1500, 50), 2_000);
        let channel = Channel::new(0)?;
        assert_eq!(
            table.get(channel).last,
            Some(RawReading {
                temperature: 1000,
                humidity: 50
            })
        );
        assert_eq!(table.stats(channel).rejected, 1);
        Ok(())
    }

    #[test]
    fn test_rate_limit() -> Result<()> {
        let mut table = ChannelTable::default();
        let packet = SensorPacket::new(1, 1000, 50);

        assert!(matches!(table.submit(&packet, 10_000)?, Outcome::Forwarded(_)));
        assert_eq!(table.submit(&packet, 10_400)?, Outcome::RateLimited);
        assert!(matches!(table.submit(&packet, 11_000)?, Outcome::Forwarded(_)));

        let stats = table.stats(Channel::new(1)?);
        assert_eq!(stats.forwarded, 2);
        assert_eq!(stats.rate_limited, 1);
        Ok(())
    }

    #[test]
    fn test_clock_wrap_counts_as_due() -> Result<()> {
        let mut table = ChannelTable::default();
        let packet = SensorPacket::new(1, 1000, 50);
        table.submit(&packet, u32::MAX - 10)?;
        assert!(matches!(table.submit(&packet, 5)?, Outcome::Forwarded(_)));
        Ok(())
    }

    #[test]
    fn test_channels_are_independent() -> Result<()> {
        let mut table = ChannelTable::default();
        table.submit(&SensorPacket::new(0, 1000, 50), 0)?;
        let outcome = table.submit(&SensorPacket::new(1, 2000, 90), 10)?;
        assert!(matches!(outcome, Outcome::Forwarded(_)));
        assert_eq!(table.heard().len(), 2);
        Ok(())
    }

    #[test]
    fn test_invalid_channel() {
        let mut table = ChannelTable::default();
        let result = table.submit(&SensorPacket::new(8, 1000, 50), 0);
        assert!(matches!(result, Err(DecodeError::InvalidChannel(_))));
    }

    #[test]
    fn test_reading_conversion() -> Result<()> {
        let mut table = ChannelTable::default();
        let Outcome::Forwarded(reading) = table.submit(&SensorPacket::new(0, 1099, 11), 0)? else {
            panic!("first reading must be forwarded");
        };
        assert_eq!(reading.channel_number(), 1);
        assert_eq!(reading.temperature_tenths(), 211);
        assert_eq!(reading.humidity, 11);
        assert_eq!(reading.to_string(), "1:21.1:11");
        Ok(())
    }

    #[test]
    fn test_channel_counters_saturate() -> Result<()> {
        let mut table = seeded(1000, 50);
        let channel = Channel::new(0)?;
        table.channels[channel.index()].stats = ChannelStats {
            accepted: u32::MAX,
            rejected: u32::MAX,
            rate_limited: u32::MAX,
            forwarded: u32::MAX,
        };

        assert!(table.submit(&SensorPacket::new(0, 1500, 50), 100).is_err());
        assert_eq!(table.submit(&SensorPacket::new(0, 1001, 50), 200)?, Outcome::RateLimited);
        assert!(matches!(
            table.submit(&SensorPacket::new(0, 1001, 50), 2_000)?,
            Outcome::Forwarded(_)
        ));
        assert_eq!(table.stats(channel).rejected, u32::MAX);
        assert_eq!(table.stats(channel).accepted, u32::MAX);
        assert_eq!(table.stats(channel).rate_limited, u32::MAX);
        assert_eq!(table.stats(channel).forwarded, u32::MAX);
        Ok(())
    }
}
