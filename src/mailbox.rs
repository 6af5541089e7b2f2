//! Single-slot edge mailbox between the interrupt handler and the main loop
//!
//! The timestamp and its presence flag share one `AtomicU64`, so the main loop
//! never sees a timestamp from one edge paired with the flag of another.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

const PRESENT: u64 = 1 << 32;

/// What to do with a new edge while the previous one is unread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MailboxPolicy {
    /// Keep the unread edge and drop the new one
    #[default]
    KeepOldest,
    /// Replace the unread edge with the new one
    KeepNewest,
}

/// Lock-free single-producer/single-consumer edge slot
#[derive(Debug, Default)]
pub struct EdgeMailbox {
    slot: AtomicU64,
    lost: AtomicU32,
    policy: MailboxPolicy,
}

impl EdgeMailbox {
    /// Create an empty mailbox
    pub fn new(policy: MailboxPolicy) -> Self {
        EdgeMailbox {
            slot: AtomicU64::new(0),
            lost: AtomicU32::new(0),
            policy,
        }
    }

    /// Record an edge at `timestamp_us`. Never blocks.
    ///
    /// Returns `false` when an edge was lost, either this one or the unread
    /// one it replaced.
    pub fn notify(&self, timestamp_us: u32) -> bool {
        let packed = PRESENT | u64::from(timestamp_us);
        let delivered = match self.policy {
            MailboxPolicy::KeepOldest => self
                .slot
                .compare_exchange(0, packed, Ordering::AcqRel, Ordering::Acquire)
                .is_ok(),
            MailboxPolicy::KeepNewest => self.slot.swap(packed, Ordering::AcqRel) == 0,
        };
        if !delivered {
            self.lost.fetch_add(1, Ordering::Relaxed);
        }
        delivered
    }

    /// Consume the pending edge, if any
    pub fn take(&self) -> Option<u32> {
        let packed = self.slot.swap(0, Ordering::AcqRel);
        if packed & PRESENT != 0 {
            Some(packed as u32)
        } else {
            None
        }
    }

    /// Whether an edge is waiting
    pub fn is_pending(&self) -> bool {
        self.slot.load(Ordering::Acquire) & PRESENT != 0
    }

    /// Edges dropped or overwritten so far
    pub fn lost_edges(&self) -> u32 {
        self.lost.load(Ordering::Relaxed)
    }

    /// Policy in use
    pub fn policy(&self) -> MailboxPolicy {
        self.policy
    }
}
