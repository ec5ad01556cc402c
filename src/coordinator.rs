//! Combination of per-tier verdicts into one admission decision.
//!
//! Every tier judges the full increment with its own capacity and spacing
//! rules, so a request is denied whenever any tier on its own would deny it.
//! The mode only decides how much each tier records once the request is
//! admitted, and therefore how much capacity it reports as remaining.

use crate::{AdmissionResult, Mode, Tier, TierVerdict, WindowState};

impl Mode {
    /// Amount recorded on the tier at 0-based `position` for an admitted `increment`.
    ///
    /// The first tier always records the full increment, so every mode
    /// behaves identically when a single tier is configured.
    pub fn charge(self, increment: u64, position: usize) -> u64 {
        if position == 0 {
            return increment;
        }

        match self {
            Mode::Uniform => increment,
            Mode::Binary => 1,
            Mode::Nary => increment.div_ceil(position as u64 + 1),
        }
    }

    /// Fold tier verdicts (in tier order) into the aggregate result.
    ///
    /// The request is admitted only if every tier admits the increment. When
    /// admitted, each tier's remaining capacity is reduced by the charge this
    /// mode records on it; when denied nothing is recorded and the capacity
    /// is reported as-is. Both the remaining capacity and the wait describe
    /// the most constraining tier.
    pub fn combine(self, increment: u64, verdicts: &[TierVerdict]) -> AdmissionResult {
        let allowed = verdicts.iter().all(|v| v.allowed);

        let actions_remaining = verdicts
            .iter()
            .enumerate()
            .map(|(position, v)| {
                if allowed {
                    v.remaining.saturating_sub(self.charge(increment, position))
                } else {
                    v.remaining
                }
            })
            .min()
            .unwrap_or(0);

        let wait_micros = if allowed {
            0
        } else {
            verdicts.iter().map(|v| v.wait_micros).max().unwrap_or(0)
        };

        AdmissionResult {
            actions_remaining,
            actions_recorded: if allowed { increment } else { 0 },
            wait_micros,
        }
    }
}

/// Evaluate one request against the locked windows of every tier and commit
/// to all of them or to none.
///
/// `windows` must be in the same order as `tiers`.
pub(crate) fn admit(
    mode: Mode,
    tiers: &[Tier],
    windows: &mut [&mut WindowState],
    increment: u64,
    now_micros: u64,
) -> AdmissionResult {
    let verdicts: Vec<TierVerdict> = tiers
        .iter()
        .zip(windows.iter_mut())
        .map(|(tier, window)| window.evaluate(tier, increment, now_micros))
        .collect();

    let result = mode.combine(increment, &verdicts);

    if result.is_allowed() {
        for (position, (tier, window)) in tiers.iter().zip(windows.iter_mut()).enumerate() {
            window.commit(tier, mode.charge(increment, position), now_micros);
        }
    }

    result
}
