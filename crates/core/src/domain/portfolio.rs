use crate::domain::allocation::{Allocation, AllocationResult};
use crate::domain::instrument::{RiskTier, Strategy};
use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_PORTFOLIO_NAME: &str = "My Portfolio";
const TOP_HOLDINGS: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortfolioStatus {
    #[default]
    Active,
    Archived,
}

impl PortfolioStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PortfolioStatus::Active => "active",
            PortfolioStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for PortfolioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PortfolioStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(PortfolioStatus::Active),
            "archived" => Ok(PortfolioStatus::Archived),
            other => bail!("invalid portfolio status (active, archived): {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub total_budget: f64,
    pub risk_tier: RiskTier,
    pub strategy: Strategy,
    pub allocations: Vec<Allocation>,
    pub total_expected_return: f64,
    pub total_risk: f64,
    pub diversification_score: f64,
    pub status: PortfolioStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A portfolio ready for insert. Only built through [`NewPortfolio::from_result`], which
/// enforces that every stored number is finite.
#[derive(Debug, Clone)]
pub struct NewPortfolio {
    pub user_id: Uuid,
    pub name: String,
    pub total_budget: f64,
    pub risk_tier: RiskTier,
    pub strategy: Strategy,
    pub allocations: Vec<Allocation>,
    pub total_expected_return: f64,
    pub total_risk: f64,
    pub diversification_score: f64,
}

impl NewPortfolio {
    pub fn from_result(
        user_id: Uuid,
        name: Option<&str>,
        total_budget: f64,
        risk_tier: RiskTier,
        result: AllocationResult,
    ) -> Self {
        let name = name
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_PORTFOLIO_NAME)
            .to_string();

        let allocations = result
            .allocations
            .into_iter()
            .filter(|a| {
                let ok = a.is_finite();
                if !ok {
                    tracing::warn!(symbol = %a.symbol, "removing invalid allocation");
                }
                ok
            })
            .collect();

        Self {
            user_id,
            name,
            total_budget,
            risk_tier,
            strategy: result.strategy,
            allocations,
            total_expected_return: finite_or_zero(result.total_expected_return),
            total_risk: finite_or_zero(result.total_risk),
            diversification_score: finite_or_zero(result.diversification_score).clamp(0.0, 100.0),
        }
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub name: String,
    pub weight: f64,
    pub invested_amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioStats {
    pub total_stocks: usize,
    pub total_invested: f64,
    pub average_expected_return: f64,
    pub risk_score: f64,
    pub diversification_score: f64,
    pub sector_distribution: BTreeMap<String, f64>,
    pub top_holdings: Vec<Holding>,
}

impl PortfolioStats {
    /// `sectors` maps symbol to catalogue sector; holdings without an entry are left out of the
    /// sector distribution.
    pub fn compute(portfolio: &Portfolio, sectors: &HashMap<String, String>) -> Self {
        let mut sector_distribution = BTreeMap::<String, f64>::new();
        for allocation in &portfolio.allocations {
            if let Some(sector) = sectors.get(&allocation.symbol).filter(|s| !s.is_empty()) {
                *sector_distribution.entry(sector.clone()).or_insert(0.0) += allocation.weight;
            }
        }

        let mut by_weight: Vec<&Allocation> = portfolio.allocations.iter().collect();
        by_weight.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let top_holdings = by_weight
            .into_iter()
            .take(TOP_HOLDINGS)
            .map(|a| Holding {
                symbol: a.symbol.clone(),
                name: a.name.clone(),
                weight: a.weight,
                invested_amount: a.invested_amount,
            })
            .collect();

        Self {
            total_stocks: portfolio.allocations.len(),
            total_invested: portfolio.allocations.iter().map(|a| a.invested_amount).sum(),
            average_expected_return: portfolio.total_expected_return,
            risk_score: portfolio.total_risk,
            diversification_score: portfolio.diversification_score,
            sector_distribution,
            top_holdings,
        }
    }
}
