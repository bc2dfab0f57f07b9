use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const UNKNOWN_SECTOR: &str = "Unknown";

fn default_sector() -> String {
    UNKNOWN_SECTOR.to_string()
}

/// A candidate stock as the engine sees it.
///
/// `expected_return` and `volatility` are percentages (e.g. `12.5` means 12.5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    #[serde(default)]
    pub id: Option<uuid::Uuid>,
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub expected_return: f64,
    pub volatility: f64,
    #[serde(default = "default_sector")]
    pub sector: String,
    #[serde(default)]
    pub market_cap: f64,
}

impl Instrument {
    pub fn new(
        symbol: impl Into<String>,
        name: impl Into<String>,
        price: f64,
        expected_return: f64,
        volatility: f64,
        sector: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            symbol: symbol.into(),
            name: name.into(),
            price,
            expected_return,
            volatility,
            sector: sector.into(),
            market_cap: 0.0,
        }
    }

    /// Price is positive, volatility is non-negative and every numeric input is finite.
    pub fn has_valid_data(&self) -> bool {
        self.price.is_finite()
            && self.price > 0.0
            && self.expected_return.is_finite()
            && self.volatility.is_finite()
            && self.volatility >= 0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskTier {
    /// Volatility penalty coefficient used by the scoring function.
    pub fn penalty(self) -> f64 {
        match self {
            RiskTier::Low => 2.0,
            RiskTier::Medium => 1.0,
            RiskTier::High => 0.5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskTier::Low),
            "medium" => Ok(RiskTier::Medium),
            "high" => Ok(RiskTier::High),
            other => anyhow::bail!("invalid risk level (low, medium, high): {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Greedy,
    Knapsack,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Greedy => "greedy",
            Strategy::Knapsack => "knapsack",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "greedy" => Ok(Strategy::Greedy),
            "knapsack" => Ok(Strategy::Knapsack),
            other => anyhow::bail!("invalid algorithm (greedy, knapsack): {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sector_defaults_to_unknown() {
        let v = json!({
            "symbol": "AAPL",
            "name": "Apple Inc.",
            "price": 175.5,
            "expected_return": 12.5,
            "volatility": 22.3,
        });
        let inst: Instrument = serde_json::from_value(v).unwrap();
        assert_eq!(inst.sector, UNKNOWN_SECTOR);
        assert_eq!(inst.id, None);
    }

    #[test]
    fn rejects_non_numeric_price_via_deserialize() {
        let v = json!({
            "symbol": "AAPL",
            "name": "Apple Inc.",
            "price": "175.5",
            "expected_return": 12.5,
            "volatility": 22.3,
        });
        assert!(serde_json::from_value::<Instrument>(v).is_err());
    }

    #[test]
    fn validity_requires_positive_price_and_finite_inputs() {
        let ok = Instrument::new("A", "A", 10.0, 5.0, 10.0, "Tech");
        assert!(ok.has_valid_data());

        let mut zero_price = ok.clone();
        zero_price.price = 0.0;
        assert!(!zero_price.has_valid_data());

        let mut nan_ret = ok.clone();
        nan_ret.expected_return = f64::NAN;
        assert!(!nan_ret.has_valid_data());

        let mut nan_vol = ok.clone();
        nan_vol.volatility = f64::NAN;
        assert!(!nan_vol.has_valid_data());

        let mut negative_vol = ok.clone();
        negative_vol.volatility = -150.0;
        assert!(!negative_vol.has_valid_data());

        let mut inf_ret = ok.clone();
        inf_ret.expected_return = f64::INFINITY;
        assert!(!inf_ret.has_valid_data());

        let mut inf_price = ok.clone();
        inf_price.price = f64::INFINITY;
        assert!(!inf_price.has_valid_data());

        let mut calm = ok;
        calm.volatility = 0.0;
        assert!(calm.has_valid_data());
    }

    #[test]
    fn parses_tiers_and_strategies() {
        assert_eq!("LOW".parse::<RiskTier>().unwrap(), RiskTier::Low);
        assert_eq!(" high ".parse::<RiskTier>().unwrap(), RiskTier::High);
        assert!("extreme".parse::<RiskTier>().is_err());

        assert_eq!("knapsack".parse::<Strategy>().unwrap(), Strategy::Knapsack);
        assert!("genetic".parse::<Strategy>().is_err());

        let tier: RiskTier = serde_json::from_value(json!("medium")).unwrap();
        assert_eq!(tier, RiskTier::Medium);
        assert_eq!(serde_json::to_value(Strategy::Greedy).unwrap(), json!("greedy"));
    }

    #[test]
    fn penalties_follow_tier() {
        assert_eq!(RiskTier::Low.penalty(), 2.0);
        assert_eq!(RiskTier::Medium.penalty(), 1.0);
        assert_eq!(RiskTier::High.penalty(), 0.5);
    }
}
