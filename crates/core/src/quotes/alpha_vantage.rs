use crate::config::Settings;
use crate::domain::instrument::UNKNOWN_SECTOR;
use crate::quotes::{Quote, QuoteProvider};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;
const MAX_RETRIES: u32 = 6;

// Derived metrics from a single daily change until historical data is wired in.
const RETURN_PER_CHANGE_PCT: f64 = 2.0;
const VOLATILITY_PER_CHANGE_PCT: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct AlphaVantageProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retries: u32,
}

#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote", default)]
    global_quote: Option<GlobalQuote>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "05. price")]
    price: Option<String>,
    #[serde(rename = "10. change percent")]
    change_percent: Option<String>,
}

impl AlphaVantageProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_alpha_vantage_api_key()?.to_string();
        let base_url = settings
            .alpha_vantage_base_url
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let timeout_secs = std::env::var("ALPHAVANTAGE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = retries_from(std::env::var("ALPHAVANTAGE_RETRIES").ok().as_deref());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build alpha vantage http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            retries,
        })
    }

    fn url(&self) -> String {
        format!("{}/query", self.base_url.trim_end_matches('/'))
    }

    async fn fetch_once(&self, symbol: &str) -> Result<Option<Quote>> {
        let res = self
            .http
            .get(self.url())
            .query(&[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .context("alpha vantage request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read alpha vantage response")?;
        let raw_json = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("alpha vantage response is not valid JSON: {text}"))?;

        if !status.is_success() {
            anyhow::bail!("alpha vantage HTTP {status}: {raw_json}");
        }

        parse_global_quote(symbol, raw_json)
    }
}

/// Attempt count from a raw env value, clamped to 1..=MAX_RETRIES.
fn retries_from(raw: Option<&str>) -> u32 {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .unwrap_or(DEFAULT_RETRIES)
        .clamp(1, MAX_RETRIES)
}

#[async_trait::async_trait]
impl QuoteProvider for AlphaVantageProvider {
    fn provider_name(&self) -> &'static str {
        "alpha_vantage"
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Option<Quote>> {
        let symbol = symbol.trim().to_ascii_uppercase();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(&symbol).await {
                Ok(quote) => return Ok(quote),
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(%symbol, attempt, ?backoff, error = %err, "alpha vantage fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

/// An empty `"Global Quote"` (unknown symbol) is `Ok(None)`; a present but unparsable one is
/// an error.
fn parse_global_quote(symbol: &str, raw: Value) -> Result<Option<Quote>> {
    let parsed = serde_json::from_value::<GlobalQuoteResponse>(raw)
        .context("failed to parse alpha vantage response into GlobalQuoteResponse")?;

    let Some(quote) = parsed.global_quote else {
        return Ok(None);
    };
    let Some(price) = quote.price.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    let price: f64 = price
        .parse()
        .with_context(|| format!("invalid price for {symbol}: {price}"))?;
    anyhow::ensure!(price.is_finite() && price > 0.0, "non-positive price for {symbol}: {price}");

    let change_pct = match quote.change_percent.as_deref() {
        Some(s) => {
            let s = s.trim().trim_end_matches('%');
            s.parse::<f64>()
                .with_context(|| format!("invalid change percent for {symbol}: {s}"))?
        }
        None => 0.0,
    };

    Ok(Some(Quote {
        symbol: symbol.to_string(),
        name: symbol.to_string(),
        price,
        expected_return: change_pct.abs() * RETURN_PER_CHANGE_PCT,
        volatility: change_pct.abs() * VOLATILITY_PER_CHANGE_PCT,
        sector: UNKNOWN_SECTOR.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_expected_shape() {
        let v = json!({
            "Global Quote": {
                "01. symbol": "IBM",
                "05. price": "190.2500",
                "10. change percent": "-1.2000%"
            }
        });
        let q = parse_global_quote("IBM", v).unwrap().unwrap();
        assert_eq!(q.symbol, "IBM");
        assert_eq!(q.name, "IBM");
        assert_eq!(q.price, 190.25);
        assert!((q.expected_return - 2.4).abs() < 1e-12);
        assert!((q.volatility - 1.8).abs() < 1e-12);
        assert_eq!(q.sector, UNKNOWN_SECTOR);
    }

    #[test]
    fn empty_quote_is_none() {
        assert!(parse_global_quote("NOPE", json!({"Global Quote": {}}))
            .unwrap()
            .is_none());
        assert!(parse_global_quote("NOPE", json!({"Note": "rate limited"}))
            .unwrap()
            .is_none());
    }

    #[test]
    fn rejects_garbage_price() {
        let v = json!({"Global Quote": {"05. price": "abc", "10. change percent": "1%"}});
        assert!(parse_global_quote("X", v).is_err());

        let v = json!({"Global Quote": {"05. price": "0", "10. change percent": "1%"}});
        assert!(parse_global_quote("X", v).is_err());
    }

    #[test]
    fn builds_query_url_from_settings() {
        let settings = Settings {
            alpha_vantage_api_key: Some("demo".to_string()),
            alpha_vantage_base_url: Some("http://localhost:8080/".to_string()),
            ..Settings::default()
        };
        let p = AlphaVantageProvider::from_settings(&settings).unwrap();
        assert_eq!(p.url(), "http://localhost:8080/query");
        assert!((1..=MAX_RETRIES).contains(&p.retries));
    }

    #[test]
    fn retries_are_clamped() {
        assert_eq!(retries_from(None), DEFAULT_RETRIES);
        assert_eq!(retries_from(Some("junk")), DEFAULT_RETRIES);
        assert_eq!(retries_from(Some("0")), 1);
        assert_eq!(retries_from(Some(" 4 ")), 4);
        assert_eq!(retries_from(Some("4294967295")), MAX_RETRIES);
    }
}
