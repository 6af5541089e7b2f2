//! Manchester bit synchronization from line level and timing
//!
//! The synchronizer never measures pulse widths. It waits for the line to
//! reach the level it expects after a mid-cell transition, confirms the level
//! a quarter bit later, then samples again three quarters of a bit after the
//! transition. If the line has not moved by then there was no cell-boundary
//! transition, which means the next mid-cell transition runs the other way and
//! the expected level flips.
//!
//! ```text
//!          cell n           cell n+1
//!      |  ¯¯¯¯¯|_____  |  ¯¯¯¯¯|_____  |     FallingIsOne, bits 1 1
//!             ^  ^        ^
//!          edge  short    process (edge + short + long)
//! ```
//!
//! Every resolved bit describes the cell following the one whose edge was
//! caught.

use tracing::trace;

use crate::constants::{LONG_DELAY_US, SHORT_DELAY_US};
use crate::core::{Level, Polarity};

/// Timing references, fixed when the receiver is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SyncTiming {
    /// Delay from edge to confirmation sample (about a quarter bit)
    pub short_delay_us: u32,
    /// Delay from confirmation sample to bit decision (about half a bit)
    pub long_delay_us: u32,
    /// Transition direction carrying a logical one
    pub polarity: Polarity,
}

impl Default for SyncTiming {
    fn default() -> Self {
        SyncTiming {
            short_delay_us: SHORT_DELAY_US,
            long_delay_us: LONG_DELAY_US,
            polarity: Polarity::default(),
        }
    }
}

/// Position of the synchronizer within one bit cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SyncPhase {
    /// Start of a frame attempt
    Init,
    /// Busy-polling for the expected level
    WaitEdge,
    /// Waiting to confirm the level a quarter bit after the edge
    ShortDelay,
    /// Waiting for the decision point in the next half bit
    LongDelay,
    /// Decision sample pending
    ProcessBit,
}

/// Mutable state of the synchronizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncState {
    /// Current phase
    pub phase: SyncPhase,
    /// Level currently interpreted as the post-transition level of a one
    pub expected: Level,
    /// Absolute time of the next sample (microseconds, wrapping)
    pub deadline: u32,
}

/// One observation of the line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// Current line level
    pub level: Level,
    /// Current time in microseconds (wrapping)
    pub now_us: u32,
    /// Timestamp of the latest edge reported by the edge source, if any
    pub edge_us: Option<u32>,
}

impl Sample {
    /// Sample with no edge notification attached
    pub fn new(level: Level, now_us: u32) -> Self {
        Sample {
            level,
            now_us,
            edge_us: None,
        }
    }

    /// Attach an edge timestamp
    pub fn with_edge(mut self, edge_us: Option<u32>) -> Self {
        self.edge_us = edge_us;
        self
    }
}

/// Output of a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    /// A bit was resolved
    Bit(bool),
    /// The line changed before the short delay elapsed; frame attempt abandoned
    TimingContradiction {
        /// Time the contradiction was observed
        at_us: u32,
    },
}

/// `now` is strictly after `deadline` on a wrapping clock
fn is_past(now: u32, deadline: u32) -> bool {
    (now.wrapping_sub(deadline) as i32) > 0
}

impl SyncState {
    /// State at the start of a frame attempt
    pub fn initial(polarity: Polarity) -> Self {
        SyncState {
            phase: SyncPhase::Init,
            expected: polarity.one_level(),
            deadline: 0,
        }
    }

    /// Pure transition function: `(state, sample) -> (state, event)`.
    ///
    /// `Init` falls through to `WaitEdge` on the same sample.
    pub fn transition(self, timing: &SyncTiming, sample: Sample) -> (SyncState, Option<SyncEvent>) {
        let mut next = self;
        match self.phase {
            SyncPhase::Init | SyncPhase::WaitEdge => {
                if self.phase == SyncPhase::Init {
                    next = SyncState::initial(timing.polarity);
                }
                if sample.level == next.expected {
                    // A recent edge pins the deadline to the real transition time
                    let base = sample
                        .edge_us
                        .filter(|&edge| sample.now_us.wrapping_sub(edge) < timing.short_delay_us)
                        .unwrap_or(sample.now_us);
                    next.deadline = base.wrapping_add(timing.short_delay_us);
                    next.phase = SyncPhase::ShortDelay;
                } else {
                    next.phase = SyncPhase::WaitEdge;
                }
                (next, None)
            }
            SyncPhase::ShortDelay => {
                if !is_past(sample.now_us, self.deadline) {
                    return (next, None);
                }
                if sample.level != self.expected {
                    return (
                        SyncState::initial(timing.polarity),
                        Some(SyncEvent::TimingContradiction {
                            at_us: sample.now_us,
                        }),
                    );
                }
                next.deadline = self.deadline.wrapping_add(timing.long_delay_us);
                next.phase = SyncPhase::LongDelay;
                (next, None)
            }
            SyncPhase::LongDelay => {
                if is_past(sample.now_us, self.deadline) {
                    next.phase = SyncPhase::ProcessBit;
                }
                (next, None)
            }
            SyncPhase::ProcessBit => {
                if sample.level == self.expected {
                    next.expected = self.expected.toggled();
                }
                next.phase = SyncPhase::WaitEdge;
                let bit = timing.polarity.resolve(next.expected);
                (next, Some(SyncEvent::Bit(bit)))
            }
        }
    }
}

/// Stateful wrapper around [`SyncState::transition`]
#[derive(Debug, Clone)]
pub struct BitSynchronizer {
    timing: SyncTiming,
    state: SyncState,
}

impl BitSynchronizer {
    /// Create a synchronizer in the `Init` phase
    pub fn new(timing: SyncTiming) -> Self {
        BitSynchronizer {
            timing,
            state: SyncState::initial(timing.polarity),
        }
    }

    /// Feed one sample, returning a resolved bit or an abort
    pub fn step(&mut self, sample: Sample) -> Option<SyncEvent> {
        let (next, event) = self.state.transition(&self.timing, sample);
        if let Some(SyncEvent::TimingContradiction { at_us }) = event {
            trace!(at_us, expected = %self.state.expected, "timing contradiction, restarting");
        }
        self.state = next;
        event
    }

    /// Abandon the current frame attempt
    pub fn reset(&mut self) {
        self.state = SyncState::initial(self.timing.polarity);
    }

    /// Current state
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Timing references in use
    pub fn timing(&self) -> &SyncTiming {
        &self.timing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{ManchesterEncoder, Waveform};

    fn run(sync: &mut BitSynchronizer, wave: &Waveform, until: u32) -> Vec<bool> {
        let mut bits = Vec::new();
        let mut t = 0;
        while t < until {
            let edge = wave.edges_between(t.saturating_sub(10), t).last().copied();
            if let Some(SyncEvent::Bit(bit)) = sync.step(Sample::new(wave.level_at(t), t).with_edge(edge)) {
                bits.push(bit);
            }
            t += 10;
        }
        bits
    }

    #[test]
    fn test_initial_state() {
        let state = SyncState::initial(Polarity::FallingIsOne);
        assert_eq!(state.phase, SyncPhase::Init);
        assert_eq!(state.expected, Level::Low);
    }

    #[test]
    fn test_transition_is_pure() {
        let timing = SyncTiming::default();
        let state = SyncState::initial(timing.polarity);
        let sample = Sample::new(Level::Low, 100);
        assert_eq!(
            state.transition(&timing, sample),
            state.transition(&timing, sample)
        );
    }

    #[test]
    fn test_wait_edge_holds_on_wrong_level() {
        let timing = SyncTiming::default();
        let (state, event) = SyncState::initial(timing.polarity)
            .transition(&timing, Sample::new(Level::High, 0));
        assert_eq!(state.phase, SyncPhase::WaitEdge);
        assert!(event.is_none());
    }

    #[test]
    fn test_edge_seeds_deadline() {
        let timing = SyncTiming::default();
        let (state, _) = SyncState::initial(timing.polarity)
            .transition(&timing, Sample::new(Level::Low, 1_040).with_edge(Some(1_000)));
        assert_eq!(state.phase, SyncPhase::ShortDelay);
        assert_eq!(state.deadline, 1_000 + timing.short_delay_us);

        // a stale edge is ignored
        let (state, _) = SyncState::initial(timing.polarity)
            .transition(&timing, Sample::new(Level::Low, 5_000).with_edge(Some(1_000)));
        assert_eq!(state.deadline, 5_000 + timing.short_delay_us);
    }

    #[test]
    fn test_early_transition_is_contradiction() {
        let timing = SyncTiming::default();
        let state = SyncState::initial(timing.polarity);
        let (state, _) = state.transition(&timing, Sample::new(Level::Low, 0));
        let (state, event) = state.transition(&timing, Sample::new(Level::High, 100));
        assert_eq!(state.phase, SyncPhase::ShortDelay);
        assert!(event.is_none());

        let (state, event) = state.transition(&timing, Sample::new(Level::High, 260));
        assert_eq!(state.phase, SyncPhase::Init);
        assert_eq!(event, Some(SyncEvent::TimingContradiction { at_us: 260 }));
    }

    #[test]
    fn test_no_mid_transition_flips_expected() {
        let timing = SyncTiming::default();
        let mut state = SyncState::initial(timing.polarity);
        for t in [0, 260, 760] {
            state = state.transition(&timing, Sample::new(Level::Low, t)).0;
        }
        assert_eq!(state.phase, SyncPhase::ProcessBit);

        let (state, event) = state.transition(&timing, Sample::new(Level::Low, 770));
        assert_eq!(state.expected, Level::High);
        assert_eq!(event, Some(SyncEvent::Bit(false)));
    }

    #[test]
    fn test_deadline_across_clock_wrap() {
        let timing = SyncTiming::default();
        let start = u32::MAX - 100;
        let (state, _) =
            SyncState::initial(timing.polarity).transition(&timing, Sample::new(Level::Low, start));
        assert_eq!(state.deadline, start.wrapping_add(timing.short_delay_us));

        let (state, _) = state.transition(&timing, Sample::new(Level::Low, start + 50));
        assert_eq!(state.phase, SyncPhase::ShortDelay);

        let (state, _) = state.transition(&timing, Sample::new(Level::Low, 200));
        assert_eq!(state.phase, SyncPhase::LongDelay);
    }

    #[test]
    fn test_recovers_payload_bits() {
        for polarity in [Polarity::FallingIsOne, Polarity::RisingIsOne] {
            let timing = SyncTiming {
                polarity,
                ..SyncTiming::default()
            };
            let payload = [false, true, true, false, true, false, false, false, true, true];
            let mut bits = vec![true; 12];
            bits.extend_from_slice(&payload);

            let enc = ManchesterEncoder::new(polarity);
            let idle = polarity.one_level().toggled();
            let wave = Waveform::new(enc.encode_bits(&bits), 500, 2_000, idle);

            let mut sync = BitSynchronizer::new(timing);
            let decoded = run(&mut sync, &wave, wave.end_us());

            assert!(decoded.len() >= payload.len());
            assert_eq!(&decoded[decoded.len() - payload.len()..], &payload);
        }
    }
}
