//! Cost/budget manager (spec §4.3): tracks spend against an optional
//! total budget, gates further spend in `Hard` mode, and allocates a
//! total across dayparts under `Equal`/`Dynamic`/`Weighted` strategies.

use crate::error::{Error, Result};
use std::sync::Mutex;
use wavelist_common::config::{AllocationStrategy, BudgetMode};
use wavelist_common::Usd;

/// A single daypart's share of the batch budget, plus whatever weight
/// the `Weighted` strategy used to compute it (spec §4.3: "weighted by
/// daypart duration and requested track count").
#[derive(Debug, Clone, Copy)]
pub struct Allocation {
    pub daypart_index: usize,
    pub amount: Usd,
}

/// Tracks cumulative spend against an optional ceiling. `reserve` is a
/// non-committing pre-flight check (refused in `Hard` mode once the
/// estimate would exceed the remaining budget); `record` is the actual
/// post-call ledger entry, always accepted. `Suggested` mode never
/// refuses a reservation but still lets overage show up once recorded.
pub struct BudgetManager {
    mode: BudgetMode,
    total: Option<Usd>,
    spent: Mutex<Usd>,
}

impl BudgetManager {
    pub fn new(mode: BudgetMode, total: Option<Usd>) -> Self {
        Self {
            mode,
            total,
            spent: Mutex::new(Usd::ZERO),
        }
    }

    pub fn mode(&self) -> BudgetMode {
        self.mode
    }

    pub fn total(&self) -> Option<Usd> {
        self.total
    }

    pub fn spent(&self) -> Usd {
        *self.spent.lock().unwrap()
    }

    /// Remaining budget, or `None` if unconstrained.
    pub fn remaining(&self) -> Option<Usd> {
        self.total
            .map(|t| t.checked_sub(self.spent()).unwrap_or(Usd::ZERO))
    }

    /// Check whether `amount` (an estimate of the call about to be made)
    /// can be afforded before making it. In `Hard` mode, an amount that
    /// would exceed the remaining budget is refused with
    /// `Error::BudgetExceeded`; no spend is committed either way. In
    /// `Suggested` mode the check always succeeds. Callers record the
    /// real cost with `record` once the call completes.
    pub fn reserve(&self, amount: Usd) -> Result<()> {
        if let Some(remaining) = self.remaining() {
            if self.mode == BudgetMode::Hard && amount > remaining {
                return Err(Error::BudgetExceeded {
                    requested: amount,
                    remaining,
                });
            }
        }
        Ok(())
    }

    /// Commit `amount` (the real, post-call cost) to cumulative spend.
    /// Always allowed, even in `Hard` mode and even past the total —
    /// `record` is pure accounting; `reserve` is the gate. `reason` is
    /// the caller's description of the charge (e.g. a turn kind), kept
    /// for callers that want to annotate their own logging and otherwise
    /// unused here.
    pub fn record(&self, amount: Usd, reason: &str) {
        let _ = reason;
        let mut spent = self.spent.lock().unwrap();
        *spent = spent.checked_add(amount).unwrap_or(*spent);
    }

    /// Split `self.total` across `n` dayparts per `strategy`. `weights`
    /// (e.g. requested-track-count per daypart) is required for
    /// `Weighted` and ignored otherwise. Returns `None` if unconstrained
    /// (callers should treat each daypart as unconstrained too).
    pub fn allocate(
        strategy: AllocationStrategy,
        total: Usd,
        weights: &[u32],
    ) -> Vec<Allocation> {
        let n = weights.len();
        if n == 0 {
            return Vec::new();
        }
        match strategy {
            AllocationStrategy::Equal | AllocationStrategy::Dynamic => {
                // Dynamic allocation starts from an equal split; batch
                // coordination re-allocates unspent remainder across
                // later dayparts as earlier ones complete (spec §4.3).
                let share = Usd::new(total.as_decimal() / rust_decimal::Decimal::from(n));
                (0..n)
                    .map(|i| Allocation {
                        daypart_index: i,
                        amount: share,
                    })
                    .collect()
            }
            AllocationStrategy::Weighted => {
                let total_weight: u64 = weights.iter().map(|w| *w as u64).sum();
                if total_weight == 0 {
                    return Self::allocate(AllocationStrategy::Equal, total, weights);
                }
                weights
                    .iter()
                    .enumerate()
                    .map(|(i, w)| {
                        let fraction = rust_decimal::Decimal::from(*w as u64)
                            / rust_decimal::Decimal::from(total_weight);
                        Allocation {
                            daypart_index: i,
                            amount: Usd::new(total.as_decimal() * fraction),
                        }
                    })
                    .collect()
            }
        }
    }

    /// Re-derive an allocation for the remaining dayparts once some have
    /// finished, spreading whatever is left of `total` across the rest
    /// (the "dynamic" part of `AllocationStrategy::Dynamic`).
    pub fn reallocate_remaining(
        &self,
        strategy: AllocationStrategy,
        remaining_weights: &[u32],
    ) -> Vec<Allocation> {
        let remaining = self.remaining().unwrap_or(Usd::ZERO);
        Self::allocate(strategy, remaining, remaining_weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_mode_refuses_overspend() {
        let mgr = BudgetManager::new(BudgetMode::Hard, Some(Usd::from_str_strict("1.0000").unwrap()));
        mgr.reserve(Usd::from_str_strict("0.6000").unwrap()).unwrap();
        mgr.record(Usd::from_str_strict("0.6000").unwrap(), "turn");
        let err = mgr.reserve(Usd::from_str_strict("0.6000").unwrap()).unwrap_err();
        assert_eq!(err.error_type(), "BudgetExceeded");
    }

    #[test]
    fn record_commits_regardless_of_hard_mode_gate() {
        let mgr = BudgetManager::new(BudgetMode::Hard, Some(Usd::from_str_strict("1.0000").unwrap()));
        // record is pure accounting: it never refuses, even though this
        // amount alone would have failed `reserve` in Hard mode.
        mgr.record(Usd::from_str_strict("5.0000").unwrap(), "turn");
        assert_eq!(mgr.spent().to_string(), "5.0000");
    }

    #[test]
    fn suggested_mode_allows_overspend() {
        let mgr =
            BudgetManager::new(BudgetMode::Suggested, Some(Usd::from_str_strict("1.0000").unwrap()));
        mgr.reserve(Usd::from_str_strict("0.6000").unwrap()).unwrap();
        mgr.record(Usd::from_str_strict("0.6000").unwrap(), "turn");
        mgr.reserve(Usd::from_str_strict("0.6000").unwrap()).unwrap();
        mgr.record(Usd::from_str_strict("0.6000").unwrap(), "turn");
        assert_eq!(mgr.spent().to_string(), "1.2000");
    }

    #[test]
    fn unconstrained_budget_never_refuses() {
        let mgr = BudgetManager::new(BudgetMode::Hard, None);
        mgr.reserve(Usd::from_str_strict("1000.0000").unwrap()).unwrap();
        mgr.record(Usd::from_str_strict("1000.0000").unwrap(), "turn");
        assert!(mgr.remaining().is_none());
    }

    #[test]
    fn equal_allocation_splits_evenly() {
        let allocs = BudgetManager::allocate(
            AllocationStrategy::Equal,
            Usd::from_str_strict("10.0000").unwrap(),
            &[1, 1, 1, 1],
        );
        assert_eq!(allocs.len(), 4);
        for a in &allocs {
            assert_eq!(a.amount.to_string(), "2.5000");
        }
    }

    #[test]
    fn weighted_allocation_follows_weights() {
        let allocs = BudgetManager::allocate(
            AllocationStrategy::Weighted,
            Usd::from_str_strict("10.0000").unwrap(),
            &[1, 3],
        );
        assert_eq!(allocs[0].amount.to_string(), "2.5000");
        assert_eq!(allocs[1].amount.to_string(), "7.5000");
    }
}
