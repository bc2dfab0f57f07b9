pub mod alpha_vantage;
pub mod sample;

use crate::config::Settings;
use crate::domain::instrument::UNKNOWN_SECTOR;
use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use alpha_vantage::AlphaVantageProvider;
pub use sample::SampleQuoteProvider;

/// Latest known figures for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub expected_return: f64,
    pub volatility: f64,
    #[serde(default = "unknown_sector")]
    pub sector: String,
}

fn unknown_sector() -> String {
    UNKNOWN_SECTOR.to_string()
}

#[async_trait::async_trait]
pub trait QuoteProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// `Ok(None)` when the provider has no data for the symbol.
    async fn fetch_quote(&self, symbol: &str) -> Result<Option<Quote>>;
}

/// Tries `primary` first and answers from the sample table when it errors or has nothing.
pub struct FallbackQuoteProvider<P> {
    primary: P,
    fallback: SampleQuoteProvider,
}

impl<P: QuoteProvider> FallbackQuoteProvider<P> {
    pub fn new(primary: P) -> Self {
        Self {
            primary,
            fallback: SampleQuoteProvider,
        }
    }
}

#[async_trait::async_trait]
impl<P: QuoteProvider> QuoteProvider for FallbackQuoteProvider<P> {
    fn provider_name(&self) -> &'static str {
        self.primary.provider_name()
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Option<Quote>> {
        match self.primary.fetch_quote(symbol).await {
            Ok(Some(quote)) => Ok(Some(quote)),
            Ok(None) => {
                tracing::warn!(%symbol, provider = self.primary.provider_name(), "no quote from provider; using sample data");
                self.fallback.fetch_quote(symbol).await
            }
            Err(err) => {
                tracing::warn!(%symbol, provider = self.primary.provider_name(), error = %err, "quote fetch failed; using sample data");
                self.fallback.fetch_quote(symbol).await
            }
        }
    }
}

pub fn provider_from_settings(settings: &Settings) -> Result<Box<dyn QuoteProvider>> {
    if settings.alpha_vantage_api_key.is_none() {
        tracing::info!("ALPHAVANTAGE_API_KEY not set; serving sample quotes");
        return Ok(Box::new(SampleQuoteProvider));
    }
    let primary = AlphaVantageProvider::from_settings(settings)?;
    Ok(Box::new(FallbackQuoteProvider::new(primary)))
}
