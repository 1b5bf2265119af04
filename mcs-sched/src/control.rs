//! Scheduling context configuration
//!
//! [`SchedControl`] is the per-core authority that turns user parameters in
//! microseconds into a configured refill ledger. There is one per core,
//! handed to the root task at boot.
//!
//! Configuration validates the parameters against the kernel timing and the
//! object size, checks that the core's total bandwidth stays within its
//! limit, and then either resets the ledger or updates it in place.

use mcs_common::{KernelTiming, Microseconds, Ticks};

use crate::context::{CoreId, SchedContext, MIN_REFILLS};
use crate::error::{SchedError, SchedResult};
use crate::node::NodeState;

/// Parts per million of one core.
pub const PPM: u64 = 1_000_000;

/// Requested scheduling parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedParams {
    /// Budget in microseconds per period.
    pub budget_us: Microseconds,
    /// Period in microseconds.
    pub period_us: Microseconds,
    /// Refill slots beyond [`MIN_REFILLS`].
    ///
    /// More refills track fragmented usage more precisely. Ignored for
    /// round-robin parameters.
    pub extra_refills: usize,
}

impl SchedParams {
    /// Create sporadic parameters.
    #[inline]
    #[must_use]
    pub const fn new(budget_us: Microseconds, period_us: Microseconds, extra_refills: usize) -> Self {
        Self {
            budget_us,
            period_us,
            extra_refills,
        }
    }

    /// Create round-robin parameters with the given timeslice.
    #[inline]
    #[must_use]
    pub const fn round_robin(timeslice_us: Microseconds) -> Self {
        Self::new(timeslice_us, timeslice_us, 0)
    }

    /// Whether the parameters describe a round-robin context.
    #[inline]
    #[must_use]
    pub const fn is_round_robin(&self) -> bool {
        self.budget_us == self.period_us
    }
}

/// Share of a core, in parts per million, used by `budget` every `period`.
///
/// Round-robin contexts (`budget == period`) share the core by timeslicing
/// and are not counted against the admission limit.
#[inline]
#[must_use]
pub const fn utilisation_ppm(budget: Ticks, period: Ticks) -> u64 {
    if period == 0 || budget == period {
        return 0;
    }
    ((budget as u128 * PPM as u128) / period as u128) as u64
}

/// Per-core scheduling control authority.
#[derive(Clone, Debug)]
pub struct SchedControl {
    /// Core whose contexts this authority configures.
    core: CoreId,
    /// Admission limit in parts per million.
    max_utilisation: u64,
    /// Sum of the utilisation of every configured sporadic context.
    allocated: u64,
    /// Number of configured contexts.
    context_count: u32,
}

/// Validated parameters in ticks.
struct Plan {
    period: Ticks,
    budget: Ticks,
    max_refills: usize,
    /// Utilisation this context already holds on this core, if counted.
    previous: Option<u64>,
    utilisation: u64,
}

impl SchedControl {
    /// Create the control authority for a core.
    ///
    /// # Parameters
    ///
    /// - `core`: Core whose contexts this authority configures
    /// - `max_utilisation`: Admission limit in parts per million, [`PPM`]
    ///   for the whole core
    #[inline]
    #[must_use]
    pub const fn new(core: CoreId, max_utilisation: u64) -> Self {
        Self {
            core,
            max_utilisation,
            allocated: 0,
            context_count: 0,
        }
    }

    /// Core whose contexts this authority configures.
    #[inline]
    #[must_use]
    pub const fn core(&self) -> CoreId {
        self.core
    }

    /// Utilisation allocated to configured contexts, in parts per million.
    #[inline]
    #[must_use]
    pub const fn allocated_ppm(&self) -> u64 {
        self.allocated
    }

    /// Utilisation still available, in parts per million.
    #[inline]
    #[must_use]
    pub const fn remaining_ppm(&self) -> u64 {
        self.max_utilisation.saturating_sub(self.allocated)
    }

    /// Number of configured contexts.
    #[inline]
    #[must_use]
    pub const fn context_count(&self) -> u32 {
        self.context_count
    }

    /// Check if `utilisation` more parts per million fit under the limit.
    #[inline]
    #[must_use]
    pub const fn can_admit(&self, utilisation: u64) -> bool {
        self.allocated.saturating_add(utilisation) <= self.max_utilisation
    }

    /// Configure a scheduling context.
    ///
    /// If the context is already configured with a runnable bound thread, it is updated in place so that the new budget takes effect
    /// without granting the thread a fresh budget early. Otherwise the ledger
    /// is reset with the full budget available now, and the context is bound
    /// to this core.
    ///
    /// A context configured by another core must be released there first.
    ///
    /// # Parameters
    ///
    /// - `sc`: Context to configure
    /// - `params`: Requested parameters
    /// - `node`: State of this control's core
    /// - `bound_runnable`: Whether a runnable thread is bound to `sc`
    ///
    /// # Errors
    ///
    /// - [`SchedError::WrongCore`] if `node` belongs to another core, or
    ///   `sc` is active on another core
    /// - [`SchedError::BudgetOutOfRange`] or [`SchedError::PeriodOutOfRange`]
    ///   if a value is below the minimum context budget or above the
    ///   maximum period
    /// - [`SchedError::BudgetExceedsPeriod`] if the budget exceeds the period
    /// - [`SchedError::TooManyRefills`] if the refills do not fit the object
    /// - [`SchedError::InsufficientBandwidth`] if the core would be
    ///   over-committed
    pub fn configure(
        &mut self,
        sc: &mut SchedContext<'_>,
        params: &SchedParams,
        node: &mut NodeState,
        bound_runnable: bool,
    ) -> SchedResult<()> {
        let plan = self.plan(sc, params, node).inspect_err(|err| {
            log::warn!(
                "sched_control[{}]: rejecting budget {}us period {}us refills +{}: {}",
                self.core,
                params.budget_us,
                params.period_us,
                params.extra_refills,
                err
            );
        })?;

        if sc.is_active() && bound_runnable {
            sc.refill_update(plan.period, plan.budget, plan.max_refills, node);
        } else {
            sc.refill_new(plan.period, plan.budget, plan.max_refills, node);
        }

        let previous = match plan.previous {
            Some(previous) => previous,
            None => {
                self.context_count += 1;
                0
            }
        };
        self.allocated = self.allocated.saturating_sub(previous) + plan.utilisation;

        log::debug!(
            "sched_control[{}]: budget {} period {} refills {} ({} ppm, {} allocated)",
            self.core,
            plan.budget,
            plan.period,
            plan.max_refills,
            plan.utilisation,
            self.allocated
        );
        Ok(())
    }

    /// Return a context's bandwidth and leave it inactive.
    ///
    /// Called before the object is destroyed, or before another core's
    /// control configures it. Releasing an inactive context does nothing.
    ///
    /// # Errors
    ///
    /// - [`SchedError::WrongCore`] if `sc` is active on another core
    pub fn release(&mut self, sc: &mut SchedContext<'_>) -> SchedResult<()> {
        if !sc.is_active() {
            return Ok(());
        }
        if sc.core() != self.core {
            return Err(SchedError::WrongCore);
        }

        self.allocated = self.allocated.saturating_sub(utilisation_ppm(sc.budget(), sc.period()));
        self.context_count = self.context_count.saturating_sub(1);
        sc.deactivate();
        Ok(())
    }

    /// Utilisation `sc` currently holds on this core.
    fn held_by(&self, sc: &SchedContext<'_>) -> Option<u64> {
        (sc.is_active() && sc.core() == self.core)
            .then(|| utilisation_ppm(sc.budget(), sc.period()))
    }

    fn plan(&self, sc: &SchedContext<'_>, params: &SchedParams, node: &NodeState) -> SchedResult<Plan> {
        if node.core() != self.core || (sc.is_active() && sc.core() != self.core) {
            return Err(SchedError::WrongCore);
        }

        let timing = node.timing();
        let range = timing.min_sc_budget_us()..=timing.max_period_us();
        if !range.contains(&params.budget_us) {
            return Err(SchedError::BudgetOutOfRange);
        }
        if !range.contains(&params.period_us) {
            return Err(SchedError::PeriodOutOfRange);
        }
        if params.budget_us > params.period_us {
            return Err(SchedError::BudgetExceedsPeriod);
        }

        let (period, budget) = to_ticks(timing, params)?;

        let max_refills = if budget == period {
            MIN_REFILLS
        } else {
            params
                .extra_refills
                .checked_add(MIN_REFILLS)
                .ok_or(SchedError::TooManyRefills)?
        };
        if max_refills > sc.absolute_max() {
            return Err(SchedError::TooManyRefills);
        }

        let previous = self.held_by(sc);
        let utilisation = utilisation_ppm(budget, period);
        let others = self.allocated.saturating_sub(previous.unwrap_or(0));
        if others.saturating_add(utilisation) > self.max_utilisation {
            return Err(SchedError::InsufficientBandwidth);
        }

        Ok(Plan {
            period,
            budget,
            max_refills,
            previous,
            utilisation,
        })
    }
}

/// Convert validated parameters to ticks, rechecking the minimum budget
/// after rounding.
fn to_ticks(timing: &KernelTiming, params: &SchedParams) -> SchedResult<(Ticks, Ticks)> {
    let period = timing.us_to_ticks(params.period_us);
    let budget = timing.us_to_ticks(params.budget_us);
    if budget < timing.min_sc_budget() {
        return Err(SchedError::BudgetOutOfRange);
    }
    Ok((period, budget))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refill::Refill;
    use crate::test_utils::{Region, Snapshot};

    /// 1 MHz timer, 10µs WCET: minimum context budget 40µs.
    const TIMING: KernelTiming = KernelTiming::new(1_000_000, 10, 1);

    #[test]
    fn test_utilisation() {
        assert_eq!(utilisation_ppm(1000, 10_000), 100_000);
        assert_eq!(utilisation_ppm(5, 10), PPM / 2);
        assert_eq!(utilisation_ppm(5, 5), 0);
        assert_eq!(utilisation_ppm(1, 0), 0);
        assert!(SchedParams::round_robin(500).is_round_robin());
    }

    #[test]
    fn test_configure_new() {
        let mut region = Region::<512>::zeroed();
        let mut sc = region.sc();
        let mut node = NodeState::new(0, TIMING);
        let mut control = SchedControl::new(0, PPM);
        node.set_time(250);

        let params = SchedParams::new(1000, 10_000, 2);
        assert_eq!(control.configure(&mut sc, &params, &mut node, false), Ok(()));

        assert!(sc.is_active());
        assert_eq!(sc.budget(), 1000);
        assert_eq!(sc.period(), 10_000);
        assert_eq!(sc.refill_max(), 4);
        assert_eq!(*sc.head(), Refill::new(1000, 250));
        assert_eq!(control.allocated_ppm(), 100_000);
        assert_eq!(control.remaining_ppm(), 900_000);
        assert_eq!(control.context_count(), 1);
    }

    #[test]
    fn test_round_robin_uses_min_refills() {
        let mut region = Region::<512>::zeroed();
        let mut sc = region.sc();
        let mut node = NodeState::new(0, TIMING);
        let mut control = SchedControl::new(0, PPM);

        let params = SchedParams::new(5000, 5000, 10);
        assert_eq!(control.configure(&mut sc, &params, &mut node, false), Ok(()));
        assert!(sc.is_round_robin());
        assert_eq!(sc.refill_max(), MIN_REFILLS);
    }

    #[test]
    fn test_rejects_bad_params() {
        let mut region = Region::<512>::zeroed();
        let mut sc = region.sc();
        let mut node = NodeState::new(0, TIMING);
        let mut control = SchedControl::new(0, PPM);

        let cases = [
            (SchedParams::new(39, 10_000, 0), SchedError::BudgetOutOfRange),
            (SchedParams::new(1000, 39, 0), SchedError::PeriodOutOfRange),
            (SchedParams::new(1000, u64::MAX, 0), SchedError::PeriodOutOfRange),
            (SchedParams::new(2000, 1000, 0), SchedError::BudgetExceedsPeriod),
            (SchedParams::new(1000, 10_000, 28), SchedError::TooManyRefills),
            (SchedParams::new(1000, 10_000, usize::MAX), SchedError::TooManyRefills),
        ];
        for (params, err) in cases {
            assert_eq!(control.configure(&mut sc, &params, &mut node, false), Err(err));
        }

        assert!(!sc.is_active());
        assert_eq!(control.context_count(), 0);

        // 29 slots fit a 512-byte object
        let params = SchedParams::new(1000, 10_000, 27);
        assert_eq!(control.configure(&mut sc, &params, &mut node, false), Ok(()));
        assert_eq!(sc.refill_max(), 29);
    }

    #[test]
    fn test_admission() {
        let mut a = Region::<512>::zeroed();
        let mut b = Region::<512>::zeroed();
        let mut sc_a = a.sc();
        let mut sc_b = b.sc();
        let mut node = NodeState::new(0, TIMING);
        let mut control = SchedControl::new(0, PPM / 2);

        let ten = SchedParams::new(1000, 10_000, 0);
        let fifty = SchedParams::new(5000, 10_000, 0);
        assert_eq!(control.configure(&mut sc_a, &ten, &mut node, false), Ok(()));
        assert_eq!(
            control.configure(&mut sc_b, &fifty, &mut node, false),
            Err(SchedError::InsufficientBandwidth)
        );
        assert!(!sc_b.is_active());

        // reconfiguring replaces the context's own share
        assert_eq!(control.configure(&mut sc_a, &fifty, &mut node, false), Ok(()));
        assert_eq!(control.allocated_ppm(), 500_000);
        assert_eq!(control.context_count(), 1);
        assert!(!control.can_admit(1));
    }

    #[test]
    fn test_wrong_core() {
        let mut region = Region::<512>::zeroed();
        let mut sc = region.sc();
        let mut node = NodeState::new(0, TIMING);
        let mut control = SchedControl::new(1, PPM);

        let params = SchedParams::new(1000, 10_000, 0);
        assert_eq!(
            control.configure(&mut sc, &params, &mut node, false),
            Err(SchedError::WrongCore)
        );
    }

    #[test]
    fn test_update_when_bound_runnable() {
        let mut region = Region::<512>::zeroed();
        let mut sc = region.sc();
        let mut node = NodeState::new(0, TIMING);
        let mut control = SchedControl::new(0, PPM);
        let params = SchedParams::new(1000, 10_000, 2);
        assert_eq!(control.configure(&mut sc, &params, &mut node, true), Ok(()));

        node.set_time(400);
        sc.charge(400, &mut node);

        assert_eq!(control.configure(&mut sc, &params, &mut node, true), Ok(()));
        assert_eq!(
            Snapshot::of(&sc).refills(),
            &[Refill::new(600, 400), Refill::new(400, 10_000)]
        );
        assert_eq!(control.context_count(), 1);
        assert_eq!(control.allocated_ppm(), 100_000);
    }

    #[test]
    fn test_reset_when_not_runnable() {
        let mut region = Region::<512>::zeroed();
        let mut sc = region.sc();
        let mut node = NodeState::new(0, TIMING);
        let mut control = SchedControl::new(0, PPM);
        let params = SchedParams::new(1000, 10_000, 2);
        assert_eq!(control.configure(&mut sc, &params, &mut node, false), Ok(()));

        node.set_time(400);
        sc.charge(400, &mut node);

        assert_eq!(control.configure(&mut sc, &params, &mut node, false), Ok(()));
        assert_eq!(Snapshot::of(&sc).refills(), &[Refill::new(1000, 400)]);
    }

    #[test]
    fn test_release() {
        let mut region = Region::<512>::zeroed();
        let mut sc = region.sc();
        let mut node = NodeState::new(0, TIMING);
        let mut control = SchedControl::new(0, PPM);

        assert_eq!(control.release(&mut sc), Ok(()));
        assert_eq!(control.context_count(), 0);

        let params = SchedParams::new(2500, 10_000, 0);
        assert_eq!(control.configure(&mut sc, &params, &mut node, false), Ok(()));
        assert_eq!(control.allocated_ppm(), 250_000);

        assert_eq!(control.release(&mut sc), Ok(()));
        assert_eq!(control.allocated_ppm(), 0);
        assert_eq!(control.context_count(), 0);
        assert!(!sc.is_active());

        // a second release finds nothing to return
        assert_eq!(control.release(&mut sc), Ok(()));
        assert_eq!(control.context_count(), 0);
    }

    #[test]
    fn test_round_robin_not_admitted_against_limit() {
        let mut a = Region::<512>::zeroed();
        let mut b = Region::<512>::zeroed();
        let mut c = Region::<512>::zeroed();
        let mut sc_a = a.sc();
        let mut sc_b = b.sc();
        let mut sc_c = c.sc();
        let mut node = NodeState::new(0, TIMING);
        let mut control = SchedControl::new(0, PPM / 2);

        let timeslice = SchedParams::round_robin(5000);
        assert_eq!(control.configure(&mut sc_a, &timeslice, &mut node, false), Ok(()));
        assert_eq!(control.configure(&mut sc_b, &timeslice, &mut node, false), Ok(()));
        assert_eq!(control.allocated_ppm(), 0);
        assert_eq!(control.context_count(), 2);

        // sporadic contexts still see the full limit
        let half = SchedParams::new(5000, 10_000, 0);
        assert_eq!(control.configure(&mut sc_c, &half, &mut node, false), Ok(()));
        assert_eq!(control.allocated_ppm(), 500_000);

        // switching a round-robin context to sporadic must be admitted
        assert_eq!(
            control.configure(&mut sc_a, &SchedParams::new(1000, 10_000, 0), &mut node, false),
            Err(SchedError::InsufficientBandwidth)
        );
        assert!(sc_a.is_round_robin());

        assert_eq!(control.release(&mut sc_a), Ok(()));
        assert_eq!(control.release(&mut sc_b), Ok(()));
        assert_eq!(control.allocated_ppm(), 500_000);
        assert_eq!(control.context_count(), 1);
    }

    #[test]
    fn test_migration_requires_release() {
        let mut region = Region::<512>::zeroed();
        let mut sc = region.sc();
        let mut node0 = NodeState::new(0, TIMING);
        let mut node1 = NodeState::new(1, TIMING);
        let mut control0 = SchedControl::new(0, PPM);
        let mut control1 = SchedControl::new(1, PPM);
        let params = SchedParams::new(5000, 10_000, 0);

        assert_eq!(control0.configure(&mut sc, &params, &mut node0, false), Ok(()));
        assert_eq!(
            control1.configure(&mut sc, &params, &mut node1, false),
            Err(SchedError::WrongCore)
        );
        assert_eq!(control1.release(&mut sc), Err(SchedError::WrongCore));
        assert_eq!(sc.core(), 0);
        assert_eq!(control0.allocated_ppm(), 500_000);

        assert_eq!(control0.release(&mut sc), Ok(()));
        assert_eq!(control1.configure(&mut sc, &params, &mut node1, false), Ok(()));
        assert_eq!(sc.core(), 1);
        assert_eq!(control0.allocated_ppm(), 0);
        assert_eq!(control0.context_count(), 0);
        assert_eq!(control1.allocated_ppm(), 500_000);
        assert_eq!(control1.context_count(), 1);

        assert_eq!(control1.release(&mut sc), Ok(()));
        assert_eq!(control1.allocated_ppm(), 0);
        assert_eq!(control1.context_count(), 0);
    }
}
