use anyhow::Context;
use stockfolio_core::catalog::{self, normalize_symbol};
use stockfolio_core::domain::allocation::AllocationResult;
use stockfolio_core::domain::instrument::{Instrument, RiskTier, Strategy};
use stockfolio_core::optimizer::{Optimizer, OptimizerPolicy};
use stockfolio_core::quotes::sample::sample_instruments;
use stockfolio_core::quotes::QuoteProvider;
use stockfolio_core::storage::stocks;

pub async fn seed(pool: &sqlx::PgPool) -> anyhow::Result<u64> {
    let n = catalog::seed_sample_catalogue(pool)
        .await
        .context("seed sample catalogue failed")?;
    tracing::info!(rows = n, "sample catalogue seeded");
    Ok(n)
}

/// Symbols to refresh: the explicit list, or every symbol already in the catalogue.
pub async fn refresh_targets(
    pool: &sqlx::PgPool,
    symbols: &[String],
) -> anyhow::Result<Vec<String>> {
    let explicit = normalize_all(symbols);
    if !explicit.is_empty() {
        return Ok(explicit);
    }
    let all = stocks::list_all(pool).await?;
    Ok(all.into_iter().map(|s| s.symbol).collect())
}

pub async fn refresh(
    pool: &sqlx::PgPool,
    provider: &dyn QuoteProvider,
    symbols: &[String],
) -> anyhow::Result<(usize, usize)> {
    anyhow::ensure!(!symbols.is_empty(), "catalogue is empty; run `seed` first");
    let (refreshed, failed) = catalog::refresh_all(pool, provider, symbols).await;
    tracing::info!(
        provider = provider.provider_name(),
        refreshed,
        failed,
        "catalogue refresh finished"
    );
    Ok((refreshed, failed))
}

/// Fetches without writing. Returns how many symbols produced a quote.
pub async fn refresh_dry_run(provider: &dyn QuoteProvider, symbols: &[String]) -> usize {
    let mut found = 0;
    for symbol in symbols {
        match provider.fetch_quote(symbol).await {
            Ok(Some(q)) => {
                found += 1;
                tracing::info!(%symbol, price = q.price, expected_return = q.expected_return, volatility = q.volatility, "quote (dry-run)");
            }
            Ok(None) => tracing::warn!(%symbol, "no quote (dry-run)"),
            Err(err) => tracing::warn!(%symbol, error = %err, "quote fetch failed (dry-run)"),
        }
    }
    found
}

pub fn sample_symbols() -> Vec<String> {
    sample_instruments().into_iter().map(|s| s.symbol).collect()
}

/// Runs the engine against the built-in sample table. No database involved.
pub fn optimize_sample(
    policy: OptimizerPolicy,
    budget: f64,
    risk_tier: RiskTier,
    strategy: Strategy,
    symbols: &[String],
) -> anyhow::Result<AllocationResult> {
    let candidates = select_sample(symbols)?;
    let result = Optimizer::new(policy).run(&candidates, budget, risk_tier, strategy)?;
    Ok(result)
}

fn select_sample(symbols: &[String]) -> anyhow::Result<Vec<Instrument>> {
    let wanted = normalize_all(symbols);
    let all = sample_instruments();
    if wanted.is_empty() {
        return Ok(all);
    }

    let unknown: Vec<&str> = wanted
        .iter()
        .filter(|w| !all.iter().any(|s| &s.symbol == *w))
        .map(String::as_str)
        .collect();
    anyhow::ensure!(
        unknown.is_empty(),
        "unknown sample symbols: {}",
        unknown.join(", ")
    );

    Ok(all
        .into_iter()
        .filter(|s| wanted.contains(&s.symbol))
        .collect())
}

fn normalize_all(symbols: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(symbols.len());
    for s in symbols {
        let s = normalize_symbol(s);
        if !s.is_empty() && !out.contains(&s) {
            out.push(s);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_requested_sample_symbols() {
        let picked = select_sample(&["msft".to_string(), "AAPL".to_string()]).unwrap();
        let symbols: Vec<&str> = picked.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols.len(), 2);
        assert!(symbols.contains(&"AAPL"));
        assert!(symbols.contains(&"MSFT"));

        assert_eq!(select_sample(&[]).unwrap().len(), sample_instruments().len());
    }

    #[test]
    fn unknown_sample_symbol_is_an_error() {
        let err = select_sample(&["AAPL".to_string(), "NOPE".to_string()]).unwrap_err();
        assert!(err.to_string().contains("NOPE"));
    }

    #[test]
    fn optimizes_sample_table_within_budget() {
        let r = optimize_sample(
            OptimizerPolicy::default(),
            10_000.0,
            RiskTier::Medium,
            Strategy::Greedy,
            &[],
        )
        .unwrap();
        assert!(!r.allocations.is_empty());
        assert!(r.used_budget <= 10_000.0 + 1e-9);
        assert_eq!(r.strategy, Strategy::Greedy);
    }

    #[test]
    fn engine_errors_surface() {
        let err = optimize_sample(
            OptimizerPolicy::default(),
            1.0,
            RiskTier::Low,
            Strategy::Greedy,
            &["UNH".to_string()],
        )
        .unwrap_err();
        assert!(err
            .downcast_ref::<stockfolio_core::optimizer::OptimizeError>()
            .is_some());
    }

    #[test]
    fn normalizes_and_dedupes() {
        let got = normalize_all(&[" jpm".to_string(), "JPM".to_string(), "".to_string()]);
        assert_eq!(got, vec!["JPM"]);
    }
}
