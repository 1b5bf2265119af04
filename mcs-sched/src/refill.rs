//! Refill circular buffer
//!
//! Refills are appended at the tail and removed from the head. Below is an
//! example of a queue with 4 items and 8 slots (h = head, t = tail,
//! x = item, [] = slot):
//!
//! ```text
//! [][h][x][x][t][][][]
//! ```
//!
//! and one with 5 items that wraps around the end of the buffer:
//!
//! ```text
//! [x][t][][][][h][x][x]
//! ```
//!
//! Between operations the queue holds at least one item, so `h == t` is
//! possible. It is only empty transiently inside a charge.

use core::iter::FusedIterator;

use mcs_common::Ticks;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::context::SchedContext;

/// `amount` ticks of budget that become usable at `time`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct Refill {
    /// Budget in this refill.
    pub amount: Ticks,
    /// Earliest time the budget may be used.
    pub time: Ticks,
}

impl Refill {
    /// Create a new refill.
    #[inline]
    #[must_use]
    pub const fn new(amount: Ticks, time: Ticks) -> Self {
        Self { amount, time }
    }

    /// Time at which this refill would be used up if consumed from `time`.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> Ticks {
        self.time + self.amount
    }
}

impl SchedContext<'_> {
    #[inline]
    pub(crate) fn head_index(&self) -> usize {
        self.header.refill_head as usize
    }

    /// Index of the slot after `index`, wrapping at the configured limit.
    #[inline]
    pub(crate) fn refill_next(&self, index: usize) -> usize {
        if index == self.refill_max() - 1 { 0 } else { index + 1 }
    }

    /// Number of occupied slots.
    #[inline]
    #[must_use]
    pub fn refill_size(&self) -> usize {
        self.header.refill_count as usize
    }

    /// Whether every configured slot is occupied.
    #[inline]
    #[must_use]
    pub fn refill_full(&self) -> bool {
        self.header.refill_count == self.header.refill_max
    }

    /// Whether no slot is occupied.
    #[inline]
    #[must_use]
    pub fn refill_empty(&self) -> bool {
        self.header.refill_count == 0
    }

    pub(crate) fn tail_index(&self) -> usize {
        let max = self.refill_max();
        debug_assert!(self.head_index() < max);
        debug_assert!(self.refill_size() <= max);
        debug_assert!(self.refill_size() >= 1);

        let mut index = self.head_index() + self.refill_size() - 1;
        if index >= max {
            index -= max;
        }

        debug_assert!(index < max);
        index
    }

    /// Whether `index` refers to an occupied slot.
    #[must_use]
    pub fn index_valid(&self, index: usize) -> bool {
        let max = self.refill_max();
        let head = self.head_index();
        let end = head + self.refill_size();

        if index >= max {
            false
        } else if end > max {
            // Discontiguous: occupied from head to the end of the buffer,
            // then from slot 0 up to the tail
            index >= head || index < end - max
        } else {
            index >= head && index < end
        }
    }

    #[inline]
    fn refill_index(&self, index: usize) -> &Refill {
        debug_assert!(!self.refill_empty());
        debug_assert!(self.index_valid(index), "refill index {} not occupied", index);
        &self.refills[index]
    }

    #[inline]
    fn refill_index_mut(&mut self, index: usize) -> &mut Refill {
        debug_assert!(!self.refill_empty());
        debug_assert!(self.index_valid(index), "refill index {} not occupied", index);
        &mut self.refills[index]
    }

    /// The earliest refill.
    #[inline]
    #[must_use]
    pub fn head(&self) -> &Refill {
        self.refill_index(self.head_index())
    }

    #[inline]
    pub(crate) fn head_mut(&mut self) -> &mut Refill {
        self.refill_index_mut(self.head_index())
    }

    /// The latest refill.
    #[inline]
    #[must_use]
    pub fn tail(&self) -> &Refill {
        self.refill_index(self.tail_index())
    }

    #[inline]
    pub(crate) fn tail_mut(&mut self) -> &mut Refill {
        let index = self.tail_index();
        self.refill_index_mut(index)
    }

    /// The refill after the head, if any.
    #[inline]
    pub(crate) fn second(&self) -> Option<&Refill> {
        (self.refill_size() > 1).then(|| self.refill_index(self.refill_next(self.head_index())))
    }

    /// Remove and return the head refill.
    pub(crate) fn pop_head(&mut self) -> Refill {
        // queues cannot be smaller than 1
        debug_assert!(self.refill_size() > 0);

        let refill = *self.head();
        self.header.refill_head = self.refill_next(self.head_index()) as u32;
        self.header.refill_count -= 1;

        debug_assert!(self.head_index() < self.refill_max());
        refill
    }

    /// Append a refill after the current tail.
    pub(crate) fn add_tail(&mut self, refill: Refill) {
        // cannot add beyond queue size
        debug_assert!(self.refill_size() < self.refill_max());

        self.header.refill_count += 1;
        let index = self.tail_index();
        self.refills[index] = refill;
    }

    /// Occupied refills from head to tail.
    #[must_use]
    pub fn iter(&self) -> RefillIter<'_> {
        RefillIter {
            slots: &self.refills[..self.refill_max()],
            index: self.head_index(),
            remaining: self.refill_size(),
        }
    }

    /// Occupied refills from head to tail, with their slot indices.
    pub fn slots(&self) -> impl Iterator<Item = (usize, &Refill)> + '_ {
        let max = self.refill_max();
        let head = self.head_index();
        (0..self.refill_size()).map(move |offset| {
            let index = (head + offset) % max;
            (index, &self.refills[index])
        })
    }

    /// Sum of all refill amounts.
    #[must_use]
    pub fn refill_sum(&self) -> Ticks {
        self.iter().map(|refill| refill.amount).sum()
    }
}

/// Iterator over occupied refills in time order.
#[derive(Clone)]
pub struct RefillIter<'s> {
    slots: &'s [Refill],
    index: usize,
    remaining: usize,
}

impl<'s> Iterator for RefillIter<'s> {
    type Item = &'s Refill;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let refill = &self.slots[self.index];
        self.index += 1;
        if self.index == self.slots.len() {
            self.index = 0;
        }
        self.remaining -= 1;
        Some(refill)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for RefillIter<'_> {}

impl FusedIterator for RefillIter<'_> {}
