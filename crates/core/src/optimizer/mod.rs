//! Portfolio allocation engine.
//!
//! Pure and synchronous: given candidate instruments, a budget and a risk tier it picks share
//! counts with either a greedy ranking or a bounded knapsack. Inputs are never mutated and the
//! output is fully determined by input order and values.

pub mod diversification;
pub mod greedy;
pub mod knapsack;

use crate::domain::allocation::{AllocationRequest, AllocationResult};
use crate::domain::instrument::{Instrument, RiskTier, Strategy};
use std::fmt;

pub use diversification::diversification_score;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizeError {
    NoStocks,
    BudgetNotPositive,
    BudgetNotFinite,
    NoAffordableStocks,
}

impl fmt::Display for OptimizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizeError::NoStocks => f.write_str("no stocks provided for optimization"),
            OptimizeError::BudgetNotPositive => f.write_str("budget must be greater than 0"),
            OptimizeError::BudgetNotFinite => f.write_str("budget must be a finite number"),
            OptimizeError::NoAffordableStocks => f.write_str(
                "no affordable stocks with valid data for the given budget; \
                 ensure stocks have valid price, expected return, and volatility values",
            ),
        }
    }
}

impl std::error::Error for OptimizeError {}

/// Tunable caps shared by both strategies.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerPolicy {
    /// Greedy: max share of the original budget invested in one instrument.
    pub max_position_fraction: f64,
    /// Greedy: stop after this many allocations.
    pub max_positions: usize,
    /// Knapsack only runs at or below this budget; above it greedy is used.
    pub knapsack_budget_limit: f64,
    /// Budgets above this are discretized by `knapsack_scale_factor`.
    pub knapsack_scale_threshold: f64,
    pub knapsack_scale_factor: f64,
    /// Largest share bundle generated per instrument.
    pub knapsack_max_bundle_shares: u64,
    /// Knapsack falls back to greedy when bundles x (scaled budget + 1) exceeds this.
    pub knapsack_max_cells: usize,
}

impl Default for OptimizerPolicy {
    fn default() -> Self {
        Self {
            max_position_fraction: 0.3,
            max_positions: 10,
            knapsack_budget_limit: 100_000.0,
            knapsack_scale_threshold: 10_000.0,
            knapsack_scale_factor: 100.0,
            knapsack_max_bundle_shares: 10,
            knapsack_max_cells: 20_000_000,
        }
    }
}

impl OptimizerPolicy {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut out = Self::default();

        if let Some(v) = env_parse::<f64>("OPTIMIZER_MAX_POSITION_FRACTION") {
            out.max_position_fraction = v;
        }
        if let Some(v) = env_parse::<usize>("OPTIMIZER_MAX_POSITIONS") {
            out.max_positions = v;
        }
        if let Some(v) = env_parse::<f64>("OPTIMIZER_KNAPSACK_BUDGET_LIMIT") {
            out.knapsack_budget_limit = v;
        }
        if let Some(v) = env_parse::<f64>("OPTIMIZER_KNAPSACK_SCALE_THRESHOLD") {
            out.knapsack_scale_threshold = v;
        }
        if let Some(v) = env_parse::<f64>("OPTIMIZER_KNAPSACK_SCALE_FACTOR") {
            out.knapsack_scale_factor = v;
        }
        if let Some(v) = env_parse::<u64>("OPTIMIZER_KNAPSACK_MAX_BUNDLE_SHARES") {
            out.knapsack_max_bundle_shares = v;
        }
        if let Some(v) = env_parse::<usize>("OPTIMIZER_KNAPSACK_MAX_CELLS") {
            out.knapsack_max_cells = v;
        }

        out.validate()?;
        Ok(out)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.max_position_fraction > 0.0 && self.max_position_fraction <= 1.0,
            "max_position_fraction must be in (0, 1] (got {})",
            self.max_position_fraction
        );
        anyhow::ensure!(self.max_positions >= 1, "max_positions must be >= 1");
        anyhow::ensure!(
            self.knapsack_scale_factor >= 1.0,
            "knapsack_scale_factor must be >= 1 (got {})",
            self.knapsack_scale_factor
        );
        anyhow::ensure!(
            self.knapsack_max_bundle_shares >= 1,
            "knapsack_max_bundle_shares must be >= 1"
        );
        anyhow::ensure!(self.knapsack_max_cells >= 1, "knapsack_max_cells must be >= 1");
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

/// Risk-adjusted return; higher is better.
pub fn score(expected_return: f64, volatility: f64, risk_tier: RiskTier) -> f64 {
    expected_return / (1.0 + volatility * risk_tier.penalty() / 100.0)
}

#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    policy: OptimizerPolicy,
}

impl Optimizer {
    pub fn new(policy: OptimizerPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &OptimizerPolicy {
        &self.policy
    }

    pub fn optimize(&self, request: &AllocationRequest) -> Result<AllocationResult, OptimizeError> {
        self.run(
            &request.instruments,
            request.budget,
            request.risk_tier,
            request.strategy,
        )
    }

    pub fn run(
        &self,
        instruments: &[Instrument],
        budget: f64,
        risk_tier: RiskTier,
        strategy: Strategy,
    ) -> Result<AllocationResult, OptimizeError> {
        if instruments.is_empty() {
            return Err(OptimizeError::NoStocks);
        }
        if budget.is_nan() || budget <= 0.0 {
            return Err(OptimizeError::BudgetNotPositive);
        }
        if !budget.is_finite() {
            return Err(OptimizeError::BudgetNotFinite);
        }

        let affordable = affordable_instruments(instruments, budget);
        if affordable.is_empty() {
            return Err(OptimizeError::NoAffordableStocks);
        }

        let t0 = std::time::Instant::now();
        tracing::debug!(
            candidates = instruments.len(),
            affordable = affordable.len(),
            budget,
            %risk_tier,
            %strategy,
            "running portfolio optimization"
        );

        let use_knapsack =
            strategy == Strategy::Knapsack && budget <= self.policy.knapsack_budget_limit;
        let result = if use_knapsack {
            knapsack::optimize(&affordable, budget, risk_tier, &self.policy)
        } else {
            greedy::optimize(&affordable, budget, risk_tier, &self.policy)
        };

        tracing::debug!(
            selected = result.allocations.len(),
            used_budget = result.used_budget,
            strategy = %result.strategy,
            elapsed_ms = t0.elapsed().as_millis(),
            "portfolio optimization complete"
        );

        Ok(result)
    }
}

/// Runs one optimization under the default policy.
pub fn optimize(
    instruments: &[Instrument],
    budget: f64,
    risk_tier: RiskTier,
    strategy: Strategy,
) -> Result<AllocationResult, OptimizeError> {
    Optimizer::default().run(instruments, budget, risk_tier, strategy)
}

/// Valid and affordable candidates, in input order.
fn affordable_instruments(instruments: &[Instrument], budget: f64) -> Vec<Instrument> {
    instruments
        .iter()
        .filter(|s| s.has_valid_data() && s.price <= budget)
        .cloned()
        .collect()
}

pub(crate) fn zero_if_nan(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v
    }
}
