//! Refill invariant checks
//!
//! Each check inspects one property of an active context and reports the
//! first refill that breaks it. [`check`] runs them all.
//!
//! The ledger operations call these on entry and exit and halt on failure.
//! This module is compiled in tests, in builds with debug assertions, and
//! with the `invariants` feature.

use core::fmt;

use mcs_common::{KernelTiming, Ticks};

use crate::context::SchedContext;

/// A broken refill invariant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvariantViolation {
    /// The queue holds no refills.
    Empty,
    /// A refill is smaller than the minimum budget.
    BelowMinBudget {
        /// Slot index of the refill.
        index: usize,
        /// Its amount.
        amount: Ticks,
    },
    /// A refill ends after the next one starts.
    Overlap {
        /// Slot index of the earlier refill.
        index: usize,
    },
    /// The queue spans more than one period.
    ExceedsPeriod {
        /// Tail end minus head start.
        span: Ticks,
        /// Configured period.
        period: Ticks,
    },
    /// The amounts do not add up to the budget.
    SumMismatch {
        /// Sum of amounts.
        sum: Ticks,
        /// Expected sum.
        expected: Ticks,
    },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Empty => f.write_str("no refills"),
            Self::BelowMinBudget { index, amount } => {
                write!(f, "refill {} amount {} below minimum budget", index, amount)
            }
            Self::Overlap { index } => write!(f, "refill {} overlaps its successor", index),
            Self::ExceedsPeriod { span, period } => {
                write!(f, "refills span {} ticks, period is {}", span, period)
            }
            Self::SumMismatch { sum, expected } => {
                write!(f, "refills sum to {}, expected {}", sum, expected)
            }
        }
    }
}

/// At least one refill is present.
pub fn non_empty(sc: &SchedContext<'_>) -> Result<(), InvariantViolation> {
    if sc.refill_empty() {
        return Err(InvariantViolation::Empty);
    }
    Ok(())
}

/// Every refill holds at least the minimum budget.
pub fn at_least_min_budget(
    sc: &SchedContext<'_>,
    timing: &KernelTiming,
) -> Result<(), InvariantViolation> {
    match sc.slots().find(|(_, refill)| refill.amount < timing.min_budget()) {
        Some((index, refill)) => Err(InvariantViolation::BelowMinBudget {
            index,
            amount: refill.amount,
        }),
        None => Ok(()),
    }
}

/// Each refill ends no later than the next one starts.
pub fn ordered_disjoint(sc: &SchedContext<'_>) -> Result<(), InvariantViolation> {
    let mut prev = None;
    for (index, refill) in sc.slots() {
        if let Some((prev_index, prev_end)) = prev {
            if prev_end > refill.time {
                return Err(InvariantViolation::Overlap { index: prev_index });
            }
        }
        prev = Some((index, refill.end()));
    }
    Ok(())
}

/// The queue fits within one period from the head.
pub fn all_within_period(sc: &SchedContext<'_>) -> Result<(), InvariantViolation> {
    let span = sc.tail().end().saturating_sub(sc.head().time);
    if span > sc.period() {
        return Err(InvariantViolation::ExceedsPeriod {
            span,
            period: sc.period(),
        });
    }
    Ok(())
}

/// The amounts add up to the budget.
pub fn sum_to_budget(sc: &SchedContext<'_>) -> Result<(), InvariantViolation> {
    sum_equals(sc, sc.budget())
}

fn sum_equals(sc: &SchedContext<'_>, expected: Ticks) -> Result<(), InvariantViolation> {
    let sum = sc.refill_sum();
    if sum != expected {
        return Err(InvariantViolation::SumMismatch { sum, expected });
    }
    Ok(())
}

/// Check every invariant of an active context.
///
/// # Errors
///
/// Returns the first violation found.
pub fn check(sc: &SchedContext<'_>, timing: &KernelTiming) -> Result<(), InvariantViolation> {
    non_empty(sc)?;
    at_least_min_budget(sc, timing)?;
    ordered_disjoint(sc)?;
    all_within_period(sc)?;
    sum_to_budget(sc)
}

/// Halt if any invariant is broken or the amounts do not sum to
/// `expected_sum`.
pub(crate) fn assert_invariants(sc: &SchedContext<'_>, timing: &KernelTiming, expected_sum: Ticks) {
    let result = check(sc, timing).and_then(|()| sum_equals(sc, expected_sum));
    if let Err(violation) = result {
        log::error!("refill invariant violated: {}\n{}", violation, sc);
        panic!("refill invariant violated: {}", violation);
    }
}
