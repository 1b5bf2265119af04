//! Scheduling context objects
//!
//! A scheduling context is a variable-size kernel object: a fixed
//! [`SchedContextHeader`] at the start of the object, followed by as many
//! [`Refill`] slots as fit in the rest of the region. The number of slots is
//! therefore a property of the object size, not a compile-time constant.
//!
//! The kernel never allocates here. It hands in the object's backing region
//! on each entry and [`SchedContext::from_region`] reinterprets it in place,
//! so all state lives in the object memory between kernel entries.
//!
//! # Zeroed Objects
//!
//! A freshly retyped object is zero-filled, which is a valid *inactive*
//! context (`refill_max == 0`). It becomes active once configured with
//! [`refill_new`](SchedContext::refill_new).

use core::fmt;
use core::mem::size_of;

use mcs_common::Ticks;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{SchedError, SchedResult};
use crate::refill::Refill;

/// Identifier of a processor core.
pub type CoreId = u32;

/// Minimum number of refill slots a configured context uses.
pub const MIN_REFILLS: usize = 2;

/// Minimum object size (128 bytes).
pub const MIN_SCHED_CONTEXT_BITS: u8 = 7;

/// Maximum object size (64 KB).
pub const MAX_SCHED_CONTEXT_BITS: u8 = 16;

/// Size of the header in bytes.
pub const HEADER_SIZE: usize = size_of::<SchedContextHeader>();

/// Size of one refill slot in bytes.
pub const REFILL_SIZE: usize = size_of::<Refill>();

/// Fixed-size header at the start of every scheduling context object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct SchedContextHeader {
    /// Replenishment period in ticks.
    pub period: Ticks,
    /// Total budget per period in ticks.
    pub budget: Ticks,
    /// Ticks charged since last read by [`SchedContext::take_consumed`].
    pub consumed: Ticks,
    /// Slot index of the earliest refill.
    pub refill_head: u32,
    /// Occupied slots.
    pub refill_count: u32,
    /// Configured slot limit (0 while inactive).
    pub refill_max: u32,
    /// Core whose clock this context is charged against.
    pub core: u32,
}

/// Maximum number of refills that fit in an object of `2^size_bits` bytes.
#[inline]
#[must_use]
pub const fn refill_absolute_max(size_bits: u8) -> usize {
    ((1usize << size_bits) - HEADER_SIZE) / REFILL_SIZE
}

/// Mutable view of one scheduling context object.
///
/// Borrowing the region for the lifetime of the view is what gives the
/// ledger operations exclusive access: only one core touches a context at a
/// time, and the borrow checker enforces it within that core.
pub struct SchedContext<'a> {
    pub(crate) header: &'a mut SchedContextHeader,
    pub(crate) refills: &'a mut [Refill],
}

impl<'a> SchedContext<'a> {
    /// View an object region as a scheduling context.
    ///
    /// The region must be 8-byte aligned and large enough for the header
    /// plus [`MIN_REFILLS`] slots. Trailing bytes that do not form a whole
    /// slot are ignored.
    ///
    /// # Errors
    ///
    /// - [`SchedError::RegionTooSmall`] if the region cannot hold the minimum
    /// - [`SchedError::RegionMisaligned`] if the region is misaligned
    /// - [`SchedError::CorruptHeader`] if the stored indices are inconsistent
    pub fn from_region(region: &'a mut [u8]) -> SchedResult<Self> {
        if region.len() < HEADER_SIZE + MIN_REFILLS * REFILL_SIZE {
            return Err(SchedError::RegionTooSmall);
        }

        let (header, rest) = SchedContextHeader::mut_from_prefix(region)
            .map_err(|_| SchedError::RegionMisaligned)?;
        let slots = rest.len() / REFILL_SIZE;
        let (refills, _) = <[Refill]>::mut_from_prefix_with_elems(rest, slots)
            .map_err(|_| SchedError::RegionMisaligned)?;

        Self::from_parts(header, refills)
    }

    /// Build a view from a header and refill array stored separately.
    ///
    /// # Errors
    ///
    /// - [`SchedError::RegionTooSmall`] if fewer than [`MIN_REFILLS`] slots
    /// - [`SchedError::CorruptHeader`] if the stored indices are inconsistent
    pub fn from_parts(
        header: &'a mut SchedContextHeader,
        refills: &'a mut [Refill],
    ) -> SchedResult<Self> {
        if refills.len() < MIN_REFILLS {
            return Err(SchedError::RegionTooSmall);
        }

        let max = header.refill_max as usize;
        let head = header.refill_head as usize;
        let count = header.refill_count as usize;
        let consistent = if max == 0 {
            head == 0 && count == 0
        } else {
            max >= MIN_REFILLS && max <= refills.len() && head < max && count >= 1 && count <= max
        };
        if !consistent {
            log::warn!(
                "corrupt sched context header: head {} count {} max {} slots {}",
                head,
                count,
                max,
                refills.len()
            );
            return Err(SchedError::CorruptHeader);
        }

        Ok(Self { header, refills })
    }

    /// Replenishment period in ticks.
    #[inline]
    #[must_use]
    pub fn period(&self) -> Ticks {
        self.header.period
    }

    /// Budget per period in ticks.
    #[inline]
    #[must_use]
    pub fn budget(&self) -> Ticks {
        self.header.budget
    }

    /// Core this context is charged on.
    #[inline]
    #[must_use]
    pub fn core(&self) -> CoreId {
        self.header.core
    }

    /// Configured refill limit.
    #[inline]
    #[must_use]
    pub fn refill_max(&self) -> usize {
        self.header.refill_max as usize
    }

    /// Number of refill slots the object can hold.
    #[inline]
    #[must_use]
    pub fn absolute_max(&self) -> usize {
        self.refills.len()
    }

    /// Whether the context has been configured.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.header.refill_max > 0
    }

    /// Whether the context is round robin (budget equals period).
    ///
    /// Round-robin contexts are always fully available and skip the
    /// sporadic bookkeeping.
    #[inline]
    #[must_use]
    pub fn is_round_robin(&self) -> bool {
        self.header.budget == self.header.period
    }

    /// Ticks charged since the last call.
    pub fn take_consumed(&mut self) -> Ticks {
        core::mem::take(&mut self.header.consumed)
    }

    /// Ticks charged since the last [`take_consumed`](Self::take_consumed).
    #[inline]
    #[must_use]
    pub fn consumed(&self) -> Ticks {
        self.header.consumed
    }

    /// Copy of the header.
    #[inline]
    #[must_use]
    pub fn header(&self) -> SchedContextHeader {
        *self.header
    }

    /// Return to the inactive state of a freshly zeroed object.
    pub(crate) fn deactivate(&mut self) {
        self.header.refill_head = 0;
        self.header.refill_count = 0;
        self.header.refill_max = 0;
    }
}

impl fmt::Display for SchedContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Head {} length {}", self.header.refill_head, self.header.refill_count)?;
        writeln!(f, "Budget {} Period {}", self.header.budget, self.header.period)?;
        for (index, refill) in self.slots() {
            writeln!(f, "index {}, amount {}, time {}", index, refill.amount, refill.time)?;
        }
        Ok(())
    }
}

impl fmt::Debug for SchedContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedContext")
            .field("header", &self.header)
            .field("refills", &RefillsDebug(self))
            .finish()
    }
}

struct RefillsDebug<'s, 'a>(&'s SchedContext<'a>);

impl fmt::Debug for RefillsDebug<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}
