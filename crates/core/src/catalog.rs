//! Stock catalogue backed by Postgres, refreshed from a quote provider when rows go stale.

use crate::domain::instrument::Instrument;
use crate::quotes::sample::sample_instruments;
use crate::quotes::QuoteProvider;
use crate::storage::stocks::{self, StoredStock};
use anyhow::Context;
use std::time::Duration;

pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

/// Returns the stored row while it is younger than `max_age`, otherwise refetches and upserts.
///
/// When the provider has nothing for the symbol a stale row is still returned; `None` means the
/// symbol is unknown everywhere.
pub async fn get_or_refresh_stock(
    pool: &sqlx::PgPool,
    provider: &dyn QuoteProvider,
    symbol: &str,
    max_age: Duration,
) -> anyhow::Result<Option<Instrument>> {
    let symbol = normalize_symbol(symbol);
    anyhow::ensure!(!symbol.is_empty(), "symbol must be non-empty");

    let existing = stocks::find_by_symbol(pool, &symbol).await?;
    if let Some(stored) = &existing {
        if stored.is_fresh(max_age, chrono::Utc::now()) {
            return Ok(Some(stored.instrument.clone()));
        }
    }

    refresh_symbol(pool, provider, &symbol, existing).await
}

async fn refresh_symbol(
    pool: &sqlx::PgPool,
    provider: &dyn QuoteProvider,
    symbol: &str,
    existing: Option<StoredStock>,
) -> anyhow::Result<Option<Instrument>> {
    let quote = provider
        .fetch_quote(symbol)
        .await
        .with_context(|| format!("failed to get stock data for {symbol}"))?;

    let Some(mut quote) = quote else {
        if existing.is_some() {
            tracing::warn!(%symbol, provider = provider.provider_name(), "no fresh quote; serving stale row");
        }
        return Ok(existing.map(|s| s.instrument));
    };

    // Providers that only know the price keep the richer catalogue fields.
    if let Some(stored) = &existing {
        if quote.name == quote.symbol && !stored.instrument.name.is_empty() {
            quote.name = stored.instrument.name.clone();
        }
        if quote.sector == crate::domain::instrument::UNKNOWN_SECTOR {
            quote.sector = stored.instrument.sector.clone();
        }
    }

    let stored = stocks::upsert_quote(pool, &quote).await?;
    tracing::debug!(%symbol, provider = provider.provider_name(), price = stored.instrument.price, "stock refreshed");
    Ok(Some(stored.instrument))
}

/// Best effort per symbol: failures and unknown symbols are logged and skipped.
pub async fn get_many(
    pool: &sqlx::PgPool,
    provider: &dyn QuoteProvider,
    symbols: &[String],
    max_age: Duration,
) -> Vec<Instrument> {
    let mut out = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        match get_or_refresh_stock(pool, provider, symbol, max_age).await {
            Ok(Some(stock)) => out.push(stock),
            Ok(None) => tracing::warn!(%symbol, "stock not found"),
            Err(err) => tracing::warn!(%symbol, error = %err, "stock fetch failed; skipping"),
        }
    }
    out
}

/// Refetches every listed symbol regardless of age. Returns (refreshed, failed).
pub async fn refresh_all(
    pool: &sqlx::PgPool,
    provider: &dyn QuoteProvider,
    symbols: &[String],
) -> (usize, usize) {
    let mut refreshed = 0;
    let mut failed = 0;
    for symbol in symbols {
        let symbol = normalize_symbol(symbol);
        let existing = match stocks::find_by_symbol(pool, &symbol).await {
            Ok(v) => v,
            Err(err) => {
                failed += 1;
                tracing::warn!(%symbol, error = %err, "stock lookup failed");
                continue;
            }
        };
        match refresh_symbol(pool, provider, &symbol, existing).await {
            Ok(Some(_)) => refreshed += 1,
            Ok(None) => {
                failed += 1;
                tracing::warn!(%symbol, "no quote available");
            }
            Err(err) => {
                failed += 1;
                tracing::warn!(%symbol, error = %err, "stock refresh failed");
            }
        }
    }
    (refreshed, failed)
}

pub async fn seed_sample_catalogue(pool: &sqlx::PgPool) -> anyhow::Result<u64> {
    let samples = sample_instruments();
    stocks::upsert_instruments(pool, &samples).await
}
