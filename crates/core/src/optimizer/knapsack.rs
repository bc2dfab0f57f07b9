use crate::domain::allocation::{Allocation, AllocationResult};
use crate::domain::instrument::{Instrument, RiskTier, Strategy};
use crate::optimizer::{diversification_score, greedy, score, zero_if_nan, OptimizerPolicy};

/// A fixed-size block of shares of one instrument, taken whole or not at all.
#[derive(Debug, Clone)]
struct Bundle<'a> {
    stock: &'a Instrument,
    shares: u64,
    weight: usize,
    value: f64,
    expected_return: f64,
}

/// 0/1 knapsack over share bundles on a discretized budget axis.
///
/// Falls back to greedy when the choice table would exceed `knapsack_max_cells`.
///
/// Weights are percent of the amount actually invested, so they sum to ~100 whenever anything
/// was bought.
pub fn optimize(
    stocks: &[Instrument],
    budget: f64,
    risk_tier: RiskTier,
    policy: &OptimizerPolicy,
) -> AllocationResult {
    let scale_factor = if budget > policy.knapsack_scale_threshold {
        policy.knapsack_scale_factor
    } else {
        1.0
    };
    let scaled_budget = (budget / scale_factor).floor() as usize;

    let bundles = build_bundles(stocks, scaled_budget, scale_factor, risk_tier, policy);

    tracing::debug!(
        stocks = stocks.len(),
        bundles = bundles.len(),
        budget,
        scale_factor,
        scaled_budget,
        "knapsack optimization"
    );

    let cells = table_cells(bundles.len(), scaled_budget);
    if cells > policy.knapsack_max_cells {
        tracing::warn!(
            cells,
            max_cells = policy.knapsack_max_cells,
            "knapsack table too large; falling back to greedy"
        );
        return greedy::optimize(stocks, budget, risk_tier, policy);
    }

    let picked = solve(&bundles, scaled_budget);

    // Merge bundles per symbol, first-seen order.
    let mut allocations: Vec<Allocation> = Vec::new();
    for idx in picked {
        let bundle = &bundles[idx];
        let invested_amount = bundle.stock.price * bundle.shares as f64;
        match allocations.iter_mut().find(|a| a.symbol == bundle.stock.symbol) {
            Some(existing) => {
                existing.shares += bundle.shares;
                existing.invested_amount += invested_amount;
                existing.expected_return += bundle.expected_return;
            }
            None => allocations.push(Allocation::for_instrument(
                bundle.stock,
                bundle.shares,
                invested_amount,
                bundle.expected_return,
            )),
        }
    }

    let mut total_expected_return = 0.0;
    let mut total_risk = 0.0;
    let mut used_budget = 0.0;
    for allocation in &allocations {
        total_expected_return += allocation.expected_return;
        used_budget += allocation.invested_amount;
        if let Some(stock) = stocks.iter().find(|s| s.symbol == allocation.symbol) {
            total_risk += stock.volatility * (allocation.invested_amount / budget);
        }
    }

    for allocation in &mut allocations {
        allocation.weight = allocation.invested_amount / used_budget * 100.0;
        tracing::debug!(
            symbol = %allocation.symbol,
            shares = allocation.shares,
            invested_amount = allocation.invested_amount,
            "knapsack selected"
        );
    }

    let diversification = diversification_score(&allocations, stocks);

    AllocationResult {
        allocations,
        total_expected_return: zero_if_nan(total_expected_return),
        total_risk: zero_if_nan(total_risk),
        diversification_score: zero_if_nan(diversification),
        used_budget,
        remaining_budget: budget - used_budget,
        strategy: Strategy::Knapsack,
    }
}

fn build_bundles<'a>(
    stocks: &'a [Instrument],
    scaled_budget: usize,
    scale_factor: f64,
    risk_tier: RiskTier,
    policy: &OptimizerPolicy,
) -> Vec<Bundle<'a>> {
    let mut bundles = Vec::new();
    for stock in stocks {
        let unit_score = score(stock.expected_return, stock.volatility, risk_tier);
        let unit_weight = (stock.price / scale_factor).ceil() as usize;
        if unit_weight == 0 {
            continue;
        }

        let max_shares = policy
            .knapsack_max_bundle_shares
            .min((scaled_budget / unit_weight) as u64);

        for shares in 1..=max_shares {
            bundles.push(Bundle {
                stock,
                shares,
                weight: unit_weight * shares as usize,
                value: unit_score * shares as f64,
                expected_return: stock.expected_return * stock.price * shares as f64 / 100.0,
            });
        }
    }
    bundles
}

/// Returns picked bundle indices in backtrack order (last bundle first).
///
/// The choice table has one bit per (bundle, capacity) cell: set when bundle `i` is taken to
/// reach the optimum of the first `i + 1` bundles at capacity `w`. Values only need the
/// previous row, so two rows are kept.
fn solve(bundles: &[Bundle<'_>], capacity: usize) -> Vec<usize> {
    let n = bundles.len();
    let width = capacity + 1;
    let mut choice = ChoiceTable::new(n, width);
    let mut prev = vec![0.0_f64; width];
    let mut cur = vec![0.0_f64; width];

    for (i, bundle) in bundles.iter().enumerate() {
        for w in 0..width {
            let exclude = prev[w];
            cur[w] = exclude;
            if bundle.weight <= w {
                let include = prev[w - bundle.weight] + bundle.value;
                if include > exclude {
                    cur[w] = include;
                    choice.set(i, w);
                }
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    let mut picked = Vec::new();
    let mut w = capacity;
    for i in (0..n).rev() {
        if w == 0 {
            break;
        }
        if choice.is_set(i, w) {
            picked.push(i);
            w -= bundles[i].weight;
        }
    }
    picked
}

/// Row-major bitset, `rows x width` cells.
struct ChoiceTable {
    bits: Vec<u64>,
    width: usize,
}

impl ChoiceTable {
    fn new(rows: usize, width: usize) -> Self {
        let cells = rows * width;
        Self {
            bits: vec![0; cells.div_ceil(64)],
            width,
        }
    }

    fn set(&mut self, row: usize, col: usize) {
        let idx = row * self.width + col;
        self.bits[idx / 64] |= 1u64 << (idx % 64);
    }

    fn is_set(&self, row: usize, col: usize) -> bool {
        let idx = row * self.width + col;
        self.bits[idx / 64] & (1u64 << (idx % 64)) != 0
    }
}

/// Cells in the choice table for `bundles` items at `capacity`.
fn table_cells(bundles: usize, capacity: usize) -> usize {
    bundles.saturating_mul(capacity.saturating_add(1))
}
