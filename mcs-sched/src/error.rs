//! Scheduling error types
//!
//! The ledger operations themselves never fail. Errors only arise at the
//! boundaries that accept caller-supplied input: viewing an object region
//! and configuring a context through [`SchedControl`](crate::SchedControl).

use core::fmt;

/// Errors returned by scheduling-context configuration and layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use = "scheduling errors must be handled"]
pub enum SchedError {
    /// The object region cannot hold a header and the minimum refills.
    RegionTooSmall,

    /// The object region is not aligned for the header.
    RegionMisaligned,

    /// The header's ring indices do not fit the region.
    ///
    /// The object was not zeroed on creation or has been overwritten.
    CorruptHeader,

    /// Budget is below the minimum or above the maximum period.
    BudgetOutOfRange,

    /// Period is below the minimum budget or above the maximum period.
    PeriodOutOfRange,

    /// Budget is larger than the period.
    BudgetExceedsPeriod,

    /// The requested refill count does not fit the object.
    TooManyRefills,

    /// Admitting the context would exceed the core's bandwidth limit.
    InsufficientBandwidth,

    /// The control authority belongs to a different core.
    WrongCore,
}

impl SchedError {
    /// Get a short description of the error.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RegionTooSmall => "object region too small",
            Self::RegionMisaligned => "object region misaligned",
            Self::CorruptHeader => "scheduling context header corrupt",
            Self::BudgetOutOfRange => "budget out of range",
            Self::PeriodOutOfRange => "period out of range",
            Self::BudgetExceedsPeriod => "budget exceeds period",
            Self::TooManyRefills => "too many refills for object size",
            Self::InsufficientBandwidth => "insufficient bandwidth on core",
            Self::WrongCore => "control authority is for another core",
        }
    }
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result type for scheduling configuration.
pub type SchedResult<T> = Result<T, SchedError>;
