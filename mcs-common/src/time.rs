//! Time Units and Kernel Timing
//!
//! All scheduling arithmetic is done in [`Ticks`] of the per-core monotonic
//! timer. User-facing parameters arrive in [`Microseconds`] and are converted
//! once, at configuration time.
//!
//! # Overflow
//!
//! Tick arithmetic is plain unsigned `u64` arithmetic and is assumed never to
//! wrap: a 64-bit counter at 1 GHz runs for more than 580 years. Checked
//! builds trap on overflow; release builds trust the assumption.

use core::fmt;

/// Raw timer ticks.
pub type Ticks = u64;

/// Time in microseconds.
pub type Microseconds = u64;

const US_PER_SEC: u64 = 1_000_000;

/// Timing parameters of the running kernel.
///
/// The minimum budget a refill may carry is derived from the worst-case
/// execution time (WCET) of a kernel entry/exit: a thread must always hold
/// enough budget to enter the kernel and leave it again.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KernelTiming {
    /// Timer frequency in Hz.
    timer_freq_hz: u64,
    /// Worst-case kernel entry/exit latency in timer ticks.
    wcet_ticks: Ticks,
    /// Safety multiplier applied to the WCET.
    wcet_scale: u64,
}

impl KernelTiming {
    /// Default timing: 24 MHz generic timer, 10µs kernel WCET, scale 1.
    pub const DEFAULT: Self = Self::new(24_000_000, 10, 1);

    /// Create a timing configuration from a WCET in microseconds.
    ///
    /// # Parameters
    ///
    /// - `timer_freq_hz`: Frequency of the monotonic timer
    /// - `wcet_us`: Worst-case kernel entry/exit latency
    /// - `wcet_scale`: Safety multiplier for the WCET (at least 1)
    #[inline]
    #[must_use]
    pub const fn new(timer_freq_hz: u64, wcet_us: Microseconds, wcet_scale: u64) -> Self {
        let wcet_ticks = ((wcet_us as u128 * timer_freq_hz as u128) / US_PER_SEC as u128) as Ticks;
        Self {
            timer_freq_hz,
            // A sub-tick WCET still costs one tick.
            wcet_ticks: if wcet_ticks == 0 { 1 } else { wcet_ticks },
            wcet_scale: if wcet_scale == 0 { 1 } else { wcet_scale },
        }
    }

    /// Create a timing configuration directly in ticks.
    ///
    /// Assumes a 1 MHz timer, so one tick is one microsecond. Mostly useful
    /// for host-side simulation where ticks are abstract.
    #[inline]
    #[must_use]
    pub const fn from_ticks(wcet_ticks: Ticks, wcet_scale: u64) -> Self {
        Self {
            timer_freq_hz: US_PER_SEC,
            wcet_ticks,
            wcet_scale: if wcet_scale == 0 { 1 } else { wcet_scale },
        }
    }

    /// Timer frequency in Hz.
    #[inline]
    #[must_use]
    pub const fn timer_freq_hz(&self) -> u64 {
        self.timer_freq_hz
    }

    /// Kernel WCET in ticks.
    #[inline]
    #[must_use]
    pub const fn wcet_ticks(&self) -> Ticks {
        self.wcet_ticks
    }

    /// Kernel WCET in microseconds.
    #[inline]
    #[must_use]
    pub const fn wcet_us(&self) -> Microseconds {
        self.ticks_to_us(self.wcet_ticks)
    }

    /// WCET safety multiplier.
    #[inline]
    #[must_use]
    pub const fn wcet_scale(&self) -> u64 {
        self.wcet_scale
    }

    /// Smallest amount a single refill may hold.
    ///
    /// Enough to enter and exit the kernel once each, scaled.
    #[inline]
    #[must_use]
    pub const fn min_budget(&self) -> Ticks {
        2 * self.wcet_ticks * self.wcet_scale
    }

    /// Smallest budget a scheduling context may be configured with.
    #[inline]
    #[must_use]
    pub const fn min_sc_budget(&self) -> Ticks {
        2 * self.min_budget()
    }

    /// [`min_budget`](Self::min_budget) in microseconds.
    #[inline]
    #[must_use]
    pub const fn min_budget_us(&self) -> Microseconds {
        2 * self.wcet_us() * self.wcet_scale
    }

    /// [`min_sc_budget`](Self::min_sc_budget) in microseconds.
    #[inline]
    #[must_use]
    pub const fn min_sc_budget_us(&self) -> Microseconds {
        2 * self.min_budget_us()
    }

    /// Convert microseconds to ticks.
    ///
    /// Saturates at `Ticks::MAX` instead of wrapping.
    #[inline]
    #[must_use]
    pub const fn us_to_ticks(&self, us: Microseconds) -> Ticks {
        let ticks = (us as u128 * self.timer_freq_hz as u128) / US_PER_SEC as u128;
        if ticks > Ticks::MAX as u128 {
            Ticks::MAX
        } else {
            ticks as Ticks
        }
    }

    /// Convert ticks to microseconds.
    #[inline]
    #[must_use]
    pub const fn ticks_to_us(&self, ticks: Ticks) -> Microseconds {
        if self.timer_freq_hz == 0 {
            return 0;
        }
        // Same split as the timer driver to avoid overflowing the product
        let secs = ticks / self.timer_freq_hz;
        let frac = ticks % self.timer_freq_hz;
        secs * US_PER_SEC + (frac * US_PER_SEC) / self.timer_freq_hz
    }

    /// Largest microsecond value that converts to ticks without saturating.
    #[inline]
    #[must_use]
    pub const fn max_us_to_ticks(&self) -> Microseconds {
        self.ticks_to_us(Ticks::MAX)
    }

    /// Longest period a scheduling context may be configured with.
    ///
    /// Leaves headroom so that `time + period + usage` style sums cannot
    /// approach the top of the tick range.
    #[inline]
    #[must_use]
    pub const fn max_period_us(&self) -> Microseconds {
        self.max_us_to_ticks() / 8
    }
}

impl Default for KernelTiming {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Debug for KernelTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelTiming")
            .field("timer_freq_hz", &self.timer_freq_hz)
            .field("wcet_ticks", &self.wcet_ticks)
            .field("wcet_scale", &self.wcet_scale)
            .field("min_budget", &self.min_budget())
            .finish()
    }
}
