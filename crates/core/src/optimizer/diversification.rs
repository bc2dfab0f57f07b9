use crate::domain::allocation::Allocation;
use crate::domain::instrument::Instrument;
use std::collections::BTreeSet;

const POINTS_PER_SECTOR: f64 = 15.0;
const MAX_SECTOR_POINTS: f64 = 60.0;
const POINTS_PER_STOCK: f64 = 4.0;
const MAX_STOCK_POINTS: f64 = 40.0;
const MAX_SCORE: f64 = 100.0;

/// Rewards sector breadth and holding count, 0..=100.
///
/// Sectors are looked up in `pool` by symbol; holdings whose symbol is missing from the pool (or
/// whose sector is empty) still count as a stock but not as a sector.
pub fn diversification_score(allocations: &[Allocation], pool: &[Instrument]) -> f64 {
    if allocations.is_empty() {
        return 0.0;
    }

    let mut sectors = BTreeSet::<&str>::new();
    for allocation in allocations {
        let sector = pool
            .iter()
            .find(|s| s.symbol == allocation.symbol)
            .map(|s| s.sector.as_str())
            .filter(|s| !s.is_empty());
        if let Some(sector) = sector {
            sectors.insert(sector);
        }
    }

    let sector_points = (sectors.len() as f64 * POINTS_PER_SECTOR).min(MAX_SECTOR_POINTS);
    let stock_points = (allocations.len() as f64 * POINTS_PER_STOCK).min(MAX_STOCK_POINTS);
    (sector_points + stock_points).min(MAX_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding(symbol: &str) -> Allocation {
        Allocation {
            stock_id: None,
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            shares: 1,
            invested_amount: 10.0,
            expected_return: 1.0,
            weight: 0.0,
        }
    }

    #[test]
    fn empty_allocations_score_zero() {
        let pool = vec![Instrument::new("A", "A", 1.0, 1.0, 1.0, "Tech")];
        assert_eq!(diversification_score(&[], &pool), 0.0);
    }

    #[test]
    fn three_sectors_three_stocks() {
        let pool = vec![
            Instrument::new("A", "A", 1.0, 1.0, 1.0, "Tech"),
            Instrument::new("B", "B", 1.0, 1.0, 1.0, "Energy"),
            Instrument::new("C", "C", 1.0, 1.0, 1.0, "Finance"),
        ];
        let allocations = vec![holding("A"), holding("B"), holding("C")];
        assert_eq!(diversification_score(&allocations, &pool), 57.0);
    }

    #[test]
    fn shared_sector_counts_once() {
        let pool = vec![
            Instrument::new("A", "A", 1.0, 1.0, 1.0, "Tech"),
            Instrument::new("B", "B", 1.0, 1.0, 1.0, "Tech"),
        ];
        let allocations = vec![holding("A"), holding("B")];
        assert_eq!(diversification_score(&allocations, &pool), 15.0 + 8.0);
    }

    #[test]
    fn caps_at_one_hundred() {
        let pool: Vec<Instrument> = (0..12)
            .map(|i| Instrument::new(format!("S{i}"), "x", 1.0, 1.0, 1.0, format!("Sector{i}")))
            .collect();
        let allocations: Vec<Allocation> = (0..12).map(|i| holding(&format!("S{i}"))).collect();
        assert_eq!(diversification_score(&allocations, &pool), 100.0);
    }

    #[test]
    fn unknown_symbol_counts_as_stock_only() {
        let pool = vec![Instrument::new("A", "A", 1.0, 1.0, 1.0, "Tech")];
        let allocations = vec![holding("A"), holding("ZZZ")];
        assert_eq!(diversification_score(&allocations, &pool), 15.0 + 8.0);
    }
}
