//! Charging statistics
//!
//! Feature-gated under the `stats` feature. Counters are kept per core in
//! [`NodeState`](crate::NodeState) and only ever increase.

/// Per-core sporadic-server statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedStats {
    /// Calls to either charge operation
    pub charges: u64,
    /// Charges that took the overrun path
    pub overruns: u64,
    /// Charges that consumed the head refill exactly
    pub exact_pops: u64,
    /// Head remnants too small to keep, folded forward
    pub remnant_merges: u64,
    /// Used refills grown by splitting the tail
    pub splits: u64,
    /// Used refills merged into the tail
    pub tail_merges: u64,
    /// Refills coalesced into the head on unblock
    pub unblock_merges: u64,
    /// Reconfigurations of active contexts
    pub updates: u64,
}

impl SchedStats {
    /// Create new empty statistics
    pub const fn new() -> Self {
        Self {
            charges: 0,
            overruns: 0,
            exact_pops: 0,
            remnant_merges: 0,
            splits: 0,
            tail_merges: 0,
            unblock_merges: 0,
            updates: 0,
        }
    }

    /// Overruns per thousand charges
    pub fn overrun_permille(&self) -> u64 {
        if self.charges == 0 {
            0
        } else {
            self.overruns * 1000 / self.charges
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Region, TIMING};
    use crate::NodeState;

    #[test]
    fn test_overrun_permille() {
        let mut stats = SchedStats::new();
        assert_eq!(stats.overrun_permille(), 0);
        stats.charges = 8;
        stats.overruns = 2;
        assert_eq!(stats.overrun_permille(), 250);
    }

    #[test]
    fn test_charge_paths_counted() {
        let mut region = Region::<256>::zeroed();
        let mut sc = region.sc();
        let mut node = NodeState::new(0, TIMING);
        sc.refill_new(100, 50, 4, &node);

        // partial, then overrun
        node.set_time(10);
        sc.charge(10, &mut node);
        node.set_time(100);
        sc.charge(90, &mut node);

        let stats = node.stats();
        assert_eq!(stats.charges, 2);
        assert_eq!(stats.overruns, 1);
    }
}
