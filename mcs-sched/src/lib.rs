//! MCS Sporadic-Server Budget Enforcement
//!
//! This crate implements the per-scheduling-context budget ledger of a
//! mixed-criticality (MCS) microkernel scheduler, following the sporadic
//! server model: a scheduling context is a period and a queue of *refills*,
//! and no thread may consume more than its budget in any sliding window of
//! one period.
//!
//! # Overview
//!
//! A **refill** is `amount` ticks of budget that become usable at `time`.
//! Every time budget is consumed, the consumed amount is scheduled for reuse
//! exactly one period after the refill it came from started. The sum of all
//! refills always equals the context's budget.
//!
//! ```text
//! SchedContext object (2^size_bits bytes)
//! ┌────────────────────┬───────────────────────────────────────┐
//! │ SchedContextHeader │ [Refill; absolute_max] (circular)     │
//! └────────────────────┴───────────────────────────────────────┘
//!                        [x][t][ ][ ][ ][h][x][x]
//! ```
//!
//! # Core Types
//!
//! - [`Refill`]: one `{amount, time}` unit of future budget
//! - [`SchedContext`]: a view of a scheduling context object region
//! - [`NodeState`]: per-core current time, kernel timing and reprogram flag
//! - [`SchedControl`]: validation and admission for (re)configuration
//!
//! # Operations
//!
//! | Operation | When the kernel calls it |
//! |-----------|--------------------------|
//! | [`refill_new`](SchedContext::refill_new) | configuring an inactive context |
//! | [`refill_update`](SchedContext::refill_update) | reconfiguring a running context |
//! | [`charge`](SchedContext::charge) | kernel exit, sporadic context |
//! | [`charge_round_robin`](SchedContext::charge_round_robin) | kernel exit, round-robin context |
//! | [`unblock_check`](SchedContext::unblock_check) | thread becomes runnable |
//!
//! Queries used by the enclosing scheduler: [`ready`](SchedContext::ready),
//! [`sufficient`](SchedContext::sufficient) and
//! [`capacity`](SchedContext::capacity).
//!
//! # Assertions
//!
//! The ledger operations have no error returns. Their preconditions are
//! established by the configuration layer, so violations are programming
//! errors and are checked with `debug_assert!`. The full invariant checker
//! in [`invariants`] runs on entry and exit of every operation in debug
//! builds, or in any build with the `invariants` feature.
//!
//! # Optional Features
//!
//! - `invariants`: Run the invariant checker in release builds
//! - `stats`: Per-core charging statistics in [`NodeState`]

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod context;
pub mod control;
mod error;
#[cfg(any(test, debug_assertions, feature = "invariants"))]
pub mod invariants;
pub mod node;
mod refill;
mod sporadic;

#[cfg(feature = "stats")]
pub mod stats;

#[cfg(test)]
pub(crate) mod test_utils;

pub use context::{
    CoreId, SchedContext, SchedContextHeader, MAX_SCHED_CONTEXT_BITS, MIN_REFILLS,
    MIN_SCHED_CONTEXT_BITS, refill_absolute_max,
};
pub use control::{SchedControl, SchedParams};
pub use error::{SchedError, SchedResult};
pub use node::NodeState;
pub use refill::{Refill, RefillIter};

pub use mcs_common::{KernelTiming, Microseconds, Ticks};
