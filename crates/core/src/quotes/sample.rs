use crate::domain::instrument::Instrument;
use crate::quotes::{Quote, QuoteProvider};
use anyhow::Result;

// (symbol, name, price, expected_return %, volatility %, sector, market_cap)
const SAMPLE_STOCKS: &[(&str, &str, f64, f64, f64, &str, f64)] = &[
    ("AAPL", "Apple Inc.", 175.50, 12.5, 22.3, "Technology", 2.80e12),
    ("MSFT", "Microsoft Corporation", 380.25, 11.8, 20.5, "Technology", 2.85e12),
    ("GOOGL", "Alphabet Inc.", 140.75, 13.2, 24.1, "Technology", 1.75e12),
    ("NVDA", "NVIDIA Corporation", 495.30, 18.5, 35.2, "Technology", 1.22e12),
    ("META", "Meta Platforms Inc.", 325.80, 14.7, 28.9, "Technology", 8.50e11),
    ("JPM", "JPMorgan Chase & Co.", 155.40, 9.5, 18.7, "Finance", 4.50e11),
    ("BAC", "Bank of America Corp.", 32.85, 8.9, 21.4, "Finance", 2.50e11),
    ("WFC", "Wells Fargo & Company", 48.20, 8.2, 19.8, "Finance", 1.80e11),
    ("GS", "Goldman Sachs Group Inc.", 385.90, 10.3, 23.5, "Finance", 1.30e11),
    ("JNJ", "Johnson & Johnson", 158.75, 7.8, 14.2, "Healthcare", 3.90e11),
    ("UNH", "UnitedHealth Group Inc.", 520.40, 10.5, 17.6, "Healthcare", 4.90e11),
    ("PFE", "Pfizer Inc.", 28.95, 6.5, 16.3, "Healthcare", 1.60e11),
    ("ABBV", "AbbVie Inc.", 165.30, 9.2, 15.8, "Healthcare", 2.90e11),
    ("AMZN", "Amazon.com Inc.", 145.60, 15.3, 26.7, "Consumer Goods", 1.50e12),
    ("TSLA", "Tesla Inc.", 245.80, 20.5, 42.8, "Consumer Goods", 7.80e11),
    ("WMT", "Walmart Inc.", 165.25, 7.2, 13.5, "Consumer Goods", 4.50e11),
    ("PG", "Procter & Gamble Co.", 155.90, 6.8, 12.9, "Consumer Goods", 3.70e11),
    ("XOM", "Exxon Mobil Corporation", 108.75, 8.5, 20.4, "Energy", 4.50e11),
    ("CVX", "Chevron Corporation", 152.30, 8.8, 19.7, "Energy", 2.90e11),
    ("BA", "Boeing Company", 185.40, 11.2, 31.5, "Industrial", 1.10e11),
    ("CAT", "Caterpillar Inc.", 295.60, 9.7, 22.8, "Industrial", 1.55e11),
    ("T", "AT&T Inc.", 16.45, 5.5, 15.2, "Telecommunications", 1.20e11),
    ("VZ", "Verizon Communications", 38.90, 6.2, 14.8, "Telecommunications", 1.60e11),
    ("AMT", "American Tower Corp.", 195.75, 8.9, 18.3, "Real Estate", 9.00e10),
    ("LIN", "Linde plc", 425.30, 9.4, 17.9, "Materials", 2.10e11),
];

/// The built-in catalogue, in table order.
pub fn sample_instruments() -> Vec<Instrument> {
    SAMPLE_STOCKS
        .iter()
        .map(|&(symbol, name, price, ret, vol, sector, market_cap)| Instrument {
            market_cap,
            ..Instrument::new(symbol, name, price, ret, vol, sector)
        })
        .collect()
}

/// Serves quotes from the built-in table. Used when no market data key is configured.
#[derive(Debug, Clone, Default)]
pub struct SampleQuoteProvider;

impl SampleQuoteProvider {
    pub fn quote(symbol: &str) -> Option<Quote> {
        let symbol = symbol.trim().to_ascii_uppercase();
        SAMPLE_STOCKS
            .iter()
            .find(|row| row.0 == symbol)
            .map(|&(symbol, name, price, ret, vol, sector, _)| Quote {
                symbol: symbol.to_string(),
                name: name.to_string(),
                price,
                expected_return: ret,
                volatility: vol,
                sector: sector.to_string(),
            })
    }
}

#[async_trait::async_trait]
impl QuoteProvider for SampleQuoteProvider {
    fn provider_name(&self) -> &'static str {
        "sample"
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Option<Quote>> {
        Ok(Self::quote(symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn sample_table_is_valid_and_unique() {
        let all = sample_instruments();
        assert_eq!(all.len(), 25);

        let symbols: BTreeSet<&str> = all.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols.len(), all.len());

        let sectors: BTreeSet<&str> = all.iter().map(|s| s.sector.as_str()).collect();
        assert_eq!(sectors.len(), 9);

        assert!(all.iter().all(|s| s.has_valid_data() && s.volatility >= 0.0));
    }

    #[tokio::test]
    async fn looks_up_case_insensitively() {
        let q = SampleQuoteProvider.fetch_quote(" aapl ").await.unwrap().unwrap();
        assert_eq!(q.symbol, "AAPL");
        assert_eq!(q.sector, "Technology");

        assert!(SampleQuoteProvider.fetch_quote("NOPE").await.unwrap().is_none());
    }
}
