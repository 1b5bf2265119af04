//! Per-core scheduler state
//!
//! The sporadic operations need three pieces of per-core state: the current
//! time, the kernel timing constants, and a flag telling the enclosing
//! scheduler that the timer must be reprogrammed. Rather than reading them
//! from globals, every operation takes the owning core's [`NodeState`].
//!
//! The kernel keeps one `NodeState` per core and updates `cur_time` once
//! per kernel entry.

use mcs_common::{KernelTiming, Ticks};

use crate::context::CoreId;
#[cfg(feature = "stats")]
use crate::stats::SchedStats;

/// Scheduling state of one core.
#[derive(Clone, Debug)]
pub struct NodeState {
    /// Core this state belongs to.
    core: CoreId,
    /// Time of the current kernel entry.
    cur_time: Ticks,
    /// The release timer must be recomputed before leaving the kernel.
    reprogram: bool,
    /// Kernel timing constants.
    timing: KernelTiming,
    /// Charging statistics.
    #[cfg(feature = "stats")]
    stats: SchedStats,
}

impl NodeState {
    /// Create the state for a core at time zero.
    #[must_use]
    pub const fn new(core: CoreId, timing: KernelTiming) -> Self {
        Self {
            core,
            cur_time: 0,
            reprogram: false,
            timing,
            #[cfg(feature = "stats")]
            stats: SchedStats::new(),
        }
    }

    /// Core this state belongs to.
    #[inline]
    #[must_use]
    pub fn core(&self) -> CoreId {
        self.core
    }

    /// Time of the current kernel entry.
    #[inline]
    #[must_use]
    pub fn now(&self) -> Ticks {
        self.cur_time
    }

    /// Kernel timing constants.
    #[inline]
    #[must_use]
    pub fn timing(&self) -> &KernelTiming {
        &self.timing
    }

    /// Kernel WCET in ticks.
    #[inline]
    #[must_use]
    pub fn wcet_ticks(&self) -> Ticks {
        self.timing.wcet_ticks()
    }

    /// Minimum refill amount in ticks.
    #[inline]
    #[must_use]
    pub fn min_budget(&self) -> Ticks {
        self.timing.min_budget()
    }

    /// Record the time of a new kernel entry.
    ///
    /// Time is monotonic; moving it backwards is a caller bug.
    #[inline]
    pub fn set_time(&mut self, now: Ticks) {
        debug_assert!(now >= self.cur_time, "time went backwards: {} -> {}", self.cur_time, now);
        self.cur_time = now;
    }

    /// Advance the current time by `ticks`.
    #[inline]
    pub fn advance(&mut self, ticks: Ticks) {
        self.cur_time += ticks;
    }

    /// Ask the scheduler to recompute the release timer.
    #[inline]
    pub fn request_reprogram(&mut self) {
        self.reprogram = true;
    }

    /// Check if a reprogram is pending without clearing.
    #[inline]
    #[must_use]
    pub fn reprogram_pending(&self) -> bool {
        self.reprogram
    }

    /// Check and clear the reprogram flag.
    #[inline]
    pub fn take_reprogram(&mut self) -> bool {
        core::mem::take(&mut self.reprogram)
    }

    /// Charging statistics for this core.
    #[cfg(feature = "stats")]
    #[inline]
    #[must_use]
    pub fn stats(&self) -> &SchedStats {
        &self.stats
    }

    #[cfg(feature = "stats")]
    #[inline]
    pub(crate) fn stats_mut(&mut self) -> &mut SchedStats {
        &mut self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time() {
        let mut node = NodeState::new(1, KernelTiming::from_ticks(3, 1));
        assert_eq!(node.core(), 1);
        assert_eq!(node.now(), 0);
        node.set_time(100);
        node.advance(25);
        assert_eq!(node.now(), 125);
        assert_eq!(node.wcet_ticks(), 3);
        assert_eq!(node.min_budget(), 6);
    }

    #[test]
    fn test_reprogram_flag() {
        let mut node = NodeState::new(0, KernelTiming::DEFAULT);
        assert!(!node.reprogram_pending());
        node.request_reprogram();
        assert!(node.reprogram_pending());
        assert!(node.take_reprogram());
        assert!(!node.take_reprogram());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "time went backwards")]
    fn test_time_is_monotonic() {
        let mut node = NodeState::new(0, KernelTiming::DEFAULT);
        node.set_time(10);
        node.set_time(5);
    }
}
