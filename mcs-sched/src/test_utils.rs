//! Shared helpers for unit tests.

use mcs_common::KernelTiming;

use crate::context::SchedContext;
use crate::refill::Refill;

/// One tick of kernel WCET: minimum budget 2, minimum context budget 4.
pub const TIMING: KernelTiming = KernelTiming::from_ticks(1, 1);

/// Object-aligned backing memory for a scheduling context.
#[repr(C, align(64))]
pub struct Region<const N: usize>(pub [u8; N]);

impl<const N: usize> Region<N> {
    pub const fn zeroed() -> Self {
        Self([0; N])
    }

    pub fn sc(&mut self) -> SchedContext<'_> {
        SchedContext::from_region(&mut self.0).unwrap()
    }
}

/// Fixed-size copy of a ledger for comparing states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub refills: [Refill; 32],
    pub count: usize,
}

impl Snapshot {
    pub fn of(sc: &SchedContext<'_>) -> Self {
        let mut refills = [Refill::default(); 32];
        for (slot, refill) in refills.iter_mut().zip(sc.iter()) {
            *slot = *refill;
        }
        Self {
            refills,
            count: sc.refill_size(),
        }
    }

    pub fn refills(&self) -> &[Refill] {
        &self.refills[..self.count]
    }
}

/// Deterministic xorshift generator for randomised operation sequences.
pub struct XorShift(u64);

impl XorShift {
    pub const fn new(seed: u64) -> Self {
        Self(seed | 1)
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// Uniform-ish value in `0..bound` (0 if `bound` is 0).
    pub fn below(&mut self, bound: u64) -> u64 {
        if bound == 0 { 0 } else { self.next_u64() % bound }
    }

    /// Uniform-ish value in `lo..=hi`.
    pub fn range(&mut self, lo: u64, hi: u64) -> u64 {
        lo + self.below(hi - lo + 1)
    }
}
