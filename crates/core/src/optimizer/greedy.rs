use crate::domain::allocation::{Allocation, AllocationResult};
use crate::domain::instrument::{Instrument, RiskTier, Strategy};
use crate::optimizer::{diversification_score, score, zero_if_nan, OptimizerPolicy};

/// Ranks by score and buys down the list.
///
/// Each instrument is capped at `max_position_fraction` of the original budget and selection
/// stops after `max_positions` allocations. Weights are percent of the nominal budget, so they
/// sum to less than 100 when budget is left over.
pub fn optimize(
    stocks: &[Instrument],
    budget: f64,
    risk_tier: RiskTier,
    policy: &OptimizerPolicy,
) -> AllocationResult {
    let mut ranked: Vec<(f64, &Instrument)> = stocks
        .iter()
        .map(|s| (score(s.expected_return, s.volatility, risk_tier), s))
        .collect();

    // Stable, so equal scores keep input order.
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    tracing::debug!(
        stocks = ranked.len(),
        budget,
        top = ?ranked.iter().take(3).map(|(_, s)| s.symbol.as_str()).collect::<Vec<_>>(),
        "greedy optimization"
    );

    let max_allowed_investment = budget * policy.max_position_fraction;
    let mut allocations: Vec<Allocation> = Vec::new();
    let mut remaining_budget = budget;
    let mut total_expected_return = 0.0;
    let mut total_risk = 0.0;

    for (_, stock) in ranked {
        if remaining_budget < stock.price {
            continue;
        }

        let max_shares = (remaining_budget / stock.price).floor();
        let capped_shares = (max_allowed_investment / stock.price).floor();
        let shares = max_shares.min(capped_shares);
        if shares < 1.0 {
            continue;
        }

        let invested_amount = shares * stock.price;
        let expected_return = invested_amount * stock.expected_return / 100.0;
        if invested_amount.is_nan() || expected_return.is_nan() {
            tracing::warn!(symbol = %stock.symbol, "skipping stock with invalid allocation math");
            continue;
        }

        tracing::debug!(
            symbol = %stock.symbol,
            shares,
            price = stock.price,
            invested_amount,
            "greedy selected"
        );

        allocations.push(Allocation::for_instrument(
            stock,
            shares as u64,
            invested_amount,
            expected_return,
        ));

        remaining_budget -= invested_amount;
        total_expected_return += expected_return;
        total_risk += stock.volatility * (invested_amount / budget);

        if allocations.len() >= policy.max_positions {
            break;
        }
    }

    for allocation in &mut allocations {
        allocation.weight = allocation.invested_amount / budget * 100.0;
    }

    let diversification = diversification_score(&allocations, stocks);

    AllocationResult {
        allocations,
        total_expected_return: zero_if_nan(total_expected_return),
        total_risk: zero_if_nan(total_risk),
        diversification_score: zero_if_nan(diversification),
        used_budget: budget - remaining_budget,
        remaining_budget,
        strategy: Strategy::Greedy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::test_support::{sample_pool, stock};

    const EPS: f64 = 1e-9;

    fn run(stocks: &[Instrument], budget: f64, tier: RiskTier) -> AllocationResult {
        optimize(stocks, budget, tier, &OptimizerPolicy::default())
    }

    #[test]
    fn single_stock_is_capped_at_thirty_percent() {
        let pool = vec![stock("AAPL", 100.0, 10.0, 20.0, "Technology")];
        let r = run(&pool, 1000.0, RiskTier::Medium);

        assert_eq!(r.allocations.len(), 1);
        let a = &r.allocations[0];
        assert_eq!(a.shares, 3);
        assert!((a.invested_amount - 300.0).abs() < EPS);
        assert!((a.expected_return - 30.0).abs() < EPS);
        assert!((a.weight - 30.0).abs() < EPS);
        assert!((r.used_budget - 300.0).abs() < EPS);
        assert!((r.remaining_budget - 700.0).abs() < EPS);
        assert!((r.total_risk - 6.0).abs() < EPS);
        assert_eq!(r.strategy, Strategy::Greedy);
    }

    #[test]
    fn picks_in_descending_score_order() {
        let pool = vec![
            stock("LOW", 10.0, 2.0, 10.0, "A"),
            stock("HIGH", 10.0, 20.0, 10.0, "B"),
            stock("MID", 10.0, 8.0, 10.0, "C"),
        ];
        let r = run(&pool, 1000.0, RiskTier::Medium);
        let order: Vec<&str> = r.allocations.iter().map(|a| a.symbol.as_str()).collect();
        assert_eq!(order, vec!["HIGH", "MID", "LOW"]);
    }

    #[test]
    fn equal_scores_keep_input_order() {
        let pool = vec![
            stock("FIRST", 10.0, 5.0, 10.0, "A"),
            stock("SECOND", 20.0, 5.0, 10.0, "B"),
            stock("THIRD", 30.0, 5.0, 10.0, "C"),
        ];
        let r = run(&pool, 1000.0, RiskTier::Low);
        let order: Vec<&str> = r.allocations.iter().map(|a| a.symbol.as_str()).collect();
        assert_eq!(order, vec!["FIRST", "SECOND", "THIRD"]);
    }

    #[test]
    fn nan_score_does_not_break_ranking() {
        let pool = vec![
            stock("LOW", 10.0, 2.0, 10.0, "A"),
            stock("NAN", 10.0, f64::NAN, 10.0, "B"),
            stock("HIGH", 10.0, 20.0, 10.0, "C"),
            stock("MID", 10.0, 8.0, 10.0, "D"),
        ];
        let r = run(&pool, 1000.0, RiskTier::Medium);
        let order: Vec<&str> = r
            .allocations
            .iter()
            .map(|a| a.symbol.as_str())
            .filter(|s| *s != "NAN")
            .collect();
        assert_eq!(order, vec!["HIGH", "MID", "LOW"]);
    }

    #[test]
    fn risk_tier_changes_ranking() {
        let pool = vec![
            stock("STEADY", 10.0, 10.0, 5.0, "A"),
            stock("WILD", 10.0, 14.0, 60.0, "B"),
        ];
        let low = run(&pool, 100.0, RiskTier::Low);
        assert_eq!(low.allocations[0].symbol, "STEADY");

        let high = run(&pool, 100.0, RiskTier::High);
        assert_eq!(high.allocations[0].symbol, "WILD");
    }

    #[test]
    fn skips_when_cap_allows_no_whole_share() {
        // 30% of 500 = 150 < 200, so nothing fits under the cap.
        let pool = vec![stock("BIG", 200.0, 10.0, 10.0, "A")];
        let r = run(&pool, 500.0, RiskTier::Medium);
        assert!(r.allocations.is_empty());
        assert_eq!(r.used_budget, 0.0);
        assert_eq!(r.remaining_budget, 500.0);
        assert_eq!(r.diversification_score, 0.0);
    }

    #[test]
    fn stops_at_ten_allocations() {
        let pool: Vec<Instrument> = (0..15)
            .map(|i| {
                stock(
                    &format!("S{i:02}"),
                    1.0,
                    10.0 + i as f64,
                    5.0,
                    &format!("Sector{i}"),
                )
            })
            .collect();
        // A 5% cap leaves room for every candidate, so only the position cap binds.
        let policy = OptimizerPolicy {
            max_position_fraction: 0.05,
            ..OptimizerPolicy::default()
        };
        let r = optimize(&pool, 1_000.0, RiskTier::Medium, &policy);
        assert_eq!(r.allocations.len(), 10);
        // Highest returns first.
        assert_eq!(r.allocations[0].symbol, "S14");
    }

    #[test]
    fn respects_budget_and_concentration_across_sample() {
        let pool = sample_pool();
        for budget in [200.0, 1_000.0, 10_000.0, 55_555.0, 500_000.0] {
            for tier in [RiskTier::Low, RiskTier::Medium, RiskTier::High] {
                let r = run(&pool, budget, tier);
                assert!(r.allocations.len() <= 10);
                assert!(r.total_invested() <= budget + EPS);
                for a in &r.allocations {
                    assert!(a.shares >= 1);
                    assert!(a.invested_amount <= 0.3 * budget + EPS);
                }
                assert!((r.used_budget + r.remaining_budget - budget).abs() < 1e-6);
                let weights: f64 = r.allocations.iter().map(|a| a.weight).sum();
                assert!(weights <= 100.0 + 1e-6);
                assert!((weights - r.used_budget / budget * 100.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn policy_overrides_change_caps() {
        let pool = sample_pool();
        let policy = OptimizerPolicy {
            max_position_fraction: 0.5,
            max_positions: 2,
            ..OptimizerPolicy::default()
        };
        let r = optimize(&pool, 10_000.0, RiskTier::Medium, &policy);
        assert_eq!(r.allocations.len(), 2);
        assert!(r.allocations.iter().any(|a| a.invested_amount > 0.3 * 10_000.0));
        for a in &r.allocations {
            assert!(a.invested_amount <= 0.5 * 10_000.0 + EPS);
        }
    }

    #[test]
    fn three_sectors_all_selected_scores_57() {
        let pool = vec![
            stock("A", 10.0, 10.0, 10.0, "Technology"),
            stock("B", 10.0, 9.0, 10.0, "Energy"),
            stock("C", 10.0, 8.0, 10.0, "Finance"),
        ];
        let r = run(&pool, 1000.0, RiskTier::Medium);
        assert_eq!(r.allocations.len(), 3);
        assert_eq!(r.diversification_score, 57.0);
    }
}
