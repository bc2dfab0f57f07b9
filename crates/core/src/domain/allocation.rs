use crate::domain::instrument::{Instrument, RiskTier, Strategy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub instruments: Vec<Instrument>,
    pub budget: f64,
    pub risk_tier: RiskTier,
    #[serde(default)]
    pub strategy: Strategy,
}

/// One selected instrument.
///
/// `weight` is a percentage. Greedy measures it against the nominal budget, knapsack against the
/// amount actually invested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub stock_id: Option<uuid::Uuid>,
    pub symbol: String,
    pub name: String,
    pub shares: u64,
    pub invested_amount: f64,
    pub expected_return: f64,
    pub weight: f64,
}

impl Allocation {
    pub(crate) fn for_instrument(
        instrument: &Instrument,
        shares: u64,
        invested_amount: f64,
        expected_return: f64,
    ) -> Self {
        Self {
            stock_id: instrument.id,
            symbol: instrument.symbol.clone(),
            name: instrument.name.clone(),
            shares,
            invested_amount,
            expected_return,
            weight: 0.0,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.invested_amount.is_finite()
            && self.expected_return.is_finite()
            && self.weight.is_finite()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    /// Selection order, not sorted.
    pub allocations: Vec<Allocation>,
    pub total_expected_return: f64,
    pub total_risk: f64,
    pub diversification_score: f64,
    pub used_budget: f64,
    pub remaining_budget: f64,
    /// Strategy that actually ran.
    pub strategy: Strategy,
}

impl AllocationResult {
    pub fn total_invested(&self) -> f64 {
        self.allocations.iter().map(|a| a.invested_amount).sum()
    }
}
