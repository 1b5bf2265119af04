//! Sporadic server budget operations
//!
//! Implements the sporadic server of Stanovich et al. ("Defects of the POSIX
//! Sporadic Server and How to Correct Them") without priority management.
//!
//! A scheduling context is a period and a queue of refills. No thread may
//! consume more than `budget` ticks in any window of `period` ticks. Every
//! time budget is consumed, that amount is scheduled for reuse one period
//! after the head refill it was taken from became available. When the queue
//! is full, or a refill would be smaller than the minimum budget, the new
//! refill is merged into the tail instead.
//!
//! # Invariants
//!
//! Between operations, for an active context:
//! 1. the queue holds at least one refill
//! 2. every refill holds at least [`min_budget`](KernelTiming::min_budget)
//! 3. refills are ordered and disjoint: `r[i].time + r[i].amount <= r[i+1].time`
//! 4. `tail.time + tail.amount - head.time <= period`
//! 5. the amounts sum to exactly `budget`
//!
//! # Time
//!
//! The current time and the reprogram flag come from the caller's
//! [`NodeState`]. Tick arithmetic assumes no wraparound within the lifetime
//! of the system (see [`mcs_common::time`]).

use mcs_common::{KernelTiming, Ticks};

use crate::context::{SchedContext, MIN_REFILLS};
use crate::node::NodeState;
use crate::refill::Refill;

macro_rules! stat_inc {
    ($node:expr, $field:ident) => {
        #[cfg(feature = "stats")]
        {
            $node.stats_mut().$field += 1;
        }
    };
}

impl SchedContext<'_> {
    // -- Queries

    /// Budget left in the head refill if `usage` is charged to it.
    #[inline]
    #[must_use]
    pub fn capacity(&self, usage: Ticks) -> Ticks {
        self.head().amount.saturating_sub(usage)
    }

    /// Whether the head refill can still cover a kernel entry and exit after
    /// `usage` is charged.
    #[inline]
    #[must_use]
    pub fn sufficient(&self, usage: Ticks, timing: &KernelTiming) -> bool {
        self.capacity(usage) >= timing.min_budget()
    }

    /// Whether the head refill may be used now.
    ///
    /// If not, the bound thread belongs in the release queue until
    /// `head().time`.
    #[inline]
    #[must_use]
    pub fn ready(&self, node: &NodeState) -> bool {
        self.head().time <= node.now() + node.wcet_ticks()
    }

    /// Whether the context is configured and its head refill is ready.
    #[inline]
    #[must_use]
    pub fn is_released(&self, node: &NodeState) -> bool {
        self.is_active() && self.ready(node)
    }

    // -- Configuration

    /// Configure an inactive context, or reset an active one.
    ///
    /// The full budget becomes available immediately. The context is bound
    /// to `node`'s core.
    ///
    /// # Parameters
    ///
    /// - `period`: Replenishment period in ticks (at least `budget`)
    /// - `budget`: Budget per period in ticks
    /// - `max_refills`: Refill slots to use, between [`MIN_REFILLS`] and
    ///   [`absolute_max`](Self::absolute_max)
    pub fn refill_new(&mut self, period: Ticks, budget: Ticks, max_refills: usize, node: &NodeState) {
        debug_assert!(budget > node.min_budget());
        debug_assert!(budget <= period);
        debug_assert!(max_refills >= MIN_REFILLS && max_refills <= self.absolute_max());

        self.header.period = period;
        self.header.budget = budget;
        self.header.refill_head = 0;
        self.header.refill_count = 1;
        self.header.refill_max = max_refills as u32;
        self.header.core = node.core();

        // full budget available from now
        *self.head_mut() = Refill::new(budget, node.now());

        self.sanity_check(node.timing(), budget);
    }

    /// Reconfigure a context that may be mid-schedule.
    ///
    /// The new budget is never exceeded within any window of the new period,
    /// even transiently: pending refills earned under the old parameters are
    /// dropped, excess head budget is forfeited, and any shortfall arrives
    /// one new period after the head.
    pub fn refill_update(
        &mut self,
        new_period: Ticks,
        new_budget: Ticks,
        new_max_refills: usize,
        node: &mut NodeState,
    ) {
        debug_assert!(self.is_active(), "refill_update on inactive context");
        debug_assert!(new_budget <= new_period);
        debug_assert!(new_max_refills >= MIN_REFILLS && new_max_refills <= self.absolute_max());
        let old_budget = self.budget();
        self.sanity_check(node.timing(), old_budget);

        // Move the head to slot 0 and truncate to it, so the ring stays
        // valid whatever the new limit is
        let head = *self.head();
        self.refills[0] = head;
        self.header.refill_head = 0;
        self.header.refill_count = 1;
        self.header.refill_max = new_max_refills as u32;
        self.header.period = new_period;
        self.header.budget = new_budget;

        if self.ready(node) {
            self.head_mut().time = node.now();
        }

        if self.is_round_robin() {
            // Full bandwidth, nothing to defer
            self.head_mut().amount = new_budget;
        } else if self.head().amount >= new_budget {
            // the excess is forfeited, not banked
            self.head_mut().amount = new_budget;
        } else {
            // schedule the rest so that it ends one new period after the head
            let head = *self.head();
            let unused = new_budget - head.amount;
            let refill = Refill::new(unused, head.time + (new_period - unused));
            self.schedule_used(refill, node);
        }

        log::trace!(
            "sc update: period {} budget {} max {} head {:?}",
            new_period,
            new_budget,
            new_max_refills,
            self.head()
        );
        stat_inc!(node, updates);

        self.sanity_check(node.timing(), new_budget);
    }

    // -- Charging

    /// Charge `usage` ticks to a sporadic context.
    ///
    /// Called once per kernel exit for the context that was running, after
    /// [`unblock_check`](Self::unblock_check) released it at its last kernel
    /// entry. The consumed amount becomes available again one period after
    /// the head refill started.
    ///
    /// Consuming more than the head refill, or running before it was ready,
    /// is a bandwidth overrun: the whole queue is replaced by a single refill
    /// of the full budget, delayed by the overrun.
    pub fn charge(&mut self, usage: Ticks, node: &mut NodeState) {
        debug_assert!(!self.is_round_robin());
        let budget = self.budget();
        self.sanity_check(node.timing(), budget);

        self.header.consumed += usage;
        stat_inc!(node, charges);

        let min_budget = node.min_budget();
        let last_entry = self.head().time;
        let mut used = Refill::new(usage, last_entry + self.period());

        if !self.ready(node) || self.head().amount < usage {
            log::debug!(
                "sc overrun: usage {} head {:?} ready {}, full budget at {}",
                usage,
                self.head(),
                self.ready(node),
                used.time + usage
            );
            self.header.refill_count = 0;
            used.time += usage;
            used.amount = budget;
            stat_inc!(node, overruns);
        } else if usage == self.head().amount {
            self.pop_head();
            stat_inc!(node, exact_pops);
        } else {
            let remnant = self.head().amount - usage;

            if remnant >= min_budget {
                // the head keeps what is left over
                let head = self.head_mut();
                head.amount = remnant;
                head.time += usage;
            } else {
                // too small to stand alone: fold it into the next refill
                self.pop_head();
                if self.refill_empty() {
                    // used becomes the new head
                    used.time -= remnant;
                    used.amount += remnant;
                } else {
                    let head = self.head_mut();
                    head.time -= remnant;
                    head.amount += remnant;
                }
                stat_inc!(node, remnant_merges);
            }
        }

        self.schedule_used(used, node);

        self.sanity_check(node.timing(), budget);
    }

    /// Charge `usage` ticks to a round-robin context.
    ///
    /// Round-robin contexts have `budget == period`, so consumed time is not
    /// delayed: it moves from the head to the tail of the same window. With
    /// the single refill such a context holds, the refill is unchanged.
    pub fn charge_round_robin(&mut self, usage: Ticks, node: &mut NodeState) {
        debug_assert!(self.is_round_robin());
        let budget = self.budget();
        self.sanity_check(node.timing(), budget);

        self.header.consumed += usage;
        stat_inc!(node, charges);

        let moved = usage.min(self.head().amount);
        self.head_mut().amount -= moved;
        self.tail_mut().amount += moved;

        self.sanity_check(node.timing(), budget);
    }

    /// Append a used refill to a queue, merging or splitting as needed.
    ///
    /// Keeps the refill count within `refill_max` and every refill at or
    /// above the minimum budget. In order of preference:
    /// 1. a small refill takes enough from the tail to reach the minimum,
    ///    if both halves stay at or above it and a slot is free
    /// 2. a small refill, or any refill when the queue is full, is merged
    ///    into the tail
    /// 3. otherwise it is appended
    fn schedule_used(&mut self, mut new: Refill, node: &mut NodeState) {
        let min_budget = node.min_budget();

        if self.refill_empty() {
            debug_assert!(new.amount >= min_budget);
            self.add_tail(new);
            return;
        }

        // Refills are disjoint, so merging makes the result start earlier
        debug_assert!(
            new.time >= self.tail().end(),
            "used refill {:?} overlaps tail {:?}",
            new,
            self.tail()
        );

        if new.amount < min_budget
            && !self.refill_full()
            && self.tail().amount + new.amount >= 2 * min_budget
        {
            // split the tail into two parts of at least the minimum
            let remainder = min_budget - new.amount;
            new.amount += remainder;
            new.time -= remainder;
            self.tail_mut().amount -= remainder;
            self.add_tail(new);
            stat_inc!(node, splits);
        } else if new.amount < min_budget || self.refill_full() {
            let tail = self.tail_mut();
            tail.time = new.time - tail.amount;
            tail.amount += new.amount;
            stat_inc!(node, tail_merges);
        } else {
            self.add_tail(new);
        }

        debug_assert!(!self.refill_empty());
    }

    // -- Unblocking

    /// Reconcile the queue when the bound thread becomes runnable.
    ///
    /// If the head refill is ready, it is moved to start now (a blocked
    /// thread could not have used it earlier) and every following refill
    /// that overlaps it is merged in. The reprogram flag is raised so the
    /// scheduler recomputes its release timer. Round-robin contexts are
    /// always available and are left alone.
    ///
    /// Calling this twice without an intervening charge leaves the same
    /// queue as calling it once.
    pub fn unblock_check(&mut self, node: &mut NodeState) {
        if self.is_round_robin() {
            return;
        }

        let budget = self.budget();
        self.sanity_check(node.timing(), budget);

        if self.ready(node) {
            node.request_reprogram();

            let release = node.now() + node.wcet_ticks();
            self.head_mut().time = release;

            // merge available replenishments
            while let Some(next) = self.second() {
                let amount = self.head().amount;
                if next.time > self.head().time + amount {
                    break;
                }

                self.pop_head();
                let head = self.head_mut();
                head.amount += amount;
                head.time = release;
                stat_inc!(node, unblock_merges);
            }

            log::trace!("sc unblock: head {:?} of {}", self.head(), self.refill_size());
            debug_assert!(self.ready(node));
            debug_assert!(self.sufficient(0, node.timing()));
        }

        self.sanity_check(node.timing(), budget);
    }

    /// Check every invariant, expecting the amounts to sum to `expected_sum`.
    ///
    /// Compiled out unless debug assertions or the `invariants` feature are
    /// enabled.
    #[inline]
    fn sanity_check(&self, timing: &KernelTiming, expected_sum: Ticks) {
        #[cfg(any(test, debug_assertions, feature = "invariants"))]
        crate::invariants::assert_invariants(self, timing, expected_sum);

        #[cfg(not(any(test, debug_assertions, feature = "invariants")))]
        let _ = (timing, expected_sum);
    }
}
