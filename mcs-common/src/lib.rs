//! # mcs-common
//!
//! Shared time types and timing configuration for the MCS scheduling core.
//!
//! This crate defines the units every other MCS crate agrees on:
//! - [`Ticks`]: raw counts of the monotonic system timer
//! - [`Microseconds`]: the unit user-level configuration is expressed in
//! - [`KernelTiming`](time::KernelTiming): timer frequency and kernel
//!   worst-case execution time, from which the minimum budget is derived
//!
//! # no_std
//!
//! This crate is `#![no_std]` and has zero dependencies, making it suitable
//! as a foundation crate that all other MCS crates can depend on.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod time;

// Re-export commonly used types
pub use time::{KernelTiming, Microseconds, Ticks};
