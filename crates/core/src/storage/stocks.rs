use crate::domain::instrument::Instrument;
use crate::quotes::Quote;
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;
const SEARCH_LIMIT: i64 = 20;

const STOCK_COLUMNS: &str =
    "id, symbol, name, price, expected_return, volatility, sector, market_cap, last_updated";

type StockRow = (Uuid, String, String, f64, f64, f64, String, f64, DateTime<Utc>);

/// A catalogue row: the engine's input plus when its quote was last refreshed.
#[derive(Debug, Clone)]
pub struct StoredStock {
    pub instrument: Instrument,
    pub last_updated: DateTime<Utc>,
}

impl StoredStock {
    pub fn is_fresh(&self, max_age: std::time::Duration, now: DateTime<Utc>) -> bool {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return true;
        };
        now.signed_duration_since(self.last_updated) < max_age
    }
}

fn into_stored(row: StockRow) -> StoredStock {
    let (id, symbol, name, price, expected_return, volatility, sector, market_cap, last_updated) =
        row;
    StoredStock {
        instrument: Instrument {
            id: Some(id),
            symbol,
            name,
            price,
            expected_return,
            volatility,
            sector,
            market_cap,
        },
        last_updated,
    }
}

#[derive(Debug, Clone, Default)]
pub struct StockFilter {
    pub sector: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub limit: Option<i64>,
}

impl StockFilter {
    fn effective_limit(&self) -> i64 {
        self.limit
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .min(MAX_LIST_LIMIT)
    }
}

pub async fn find_by_symbol(
    pool: &sqlx::PgPool,
    symbol: &str,
) -> anyhow::Result<Option<StoredStock>> {
    let row = sqlx::query_as::<_, StockRow>(&format!(
        "SELECT {STOCK_COLUMNS} FROM stocks WHERE symbol = $1"
    ))
    .bind(symbol)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("select stock {symbol} failed"))?;
    Ok(row.map(into_stored))
}

pub async fn find_by_symbols(
    pool: &sqlx::PgPool,
    symbols: &[String],
) -> anyhow::Result<Vec<Instrument>> {
    let rows = sqlx::query_as::<_, StockRow>(&format!(
        "SELECT {STOCK_COLUMNS} FROM stocks WHERE symbol = ANY($1) ORDER BY symbol ASC"
    ))
    .bind(symbols)
    .fetch_all(pool)
    .await
    .context("select stocks by symbols failed")?;
    Ok(rows.into_iter().map(|r| into_stored(r).instrument).collect())
}

pub async fn list_all(pool: &sqlx::PgPool) -> anyhow::Result<Vec<Instrument>> {
    let rows = sqlx::query_as::<_, StockRow>(&format!(
        "SELECT {STOCK_COLUMNS} FROM stocks ORDER BY symbol ASC"
    ))
    .fetch_all(pool)
    .await
    .context("select all stocks failed")?;
    Ok(rows.into_iter().map(|r| into_stored(r).instrument).collect())
}

pub async fn list_stocks(
    pool: &sqlx::PgPool,
    filter: &StockFilter,
) -> anyhow::Result<Vec<Instrument>> {
    let mut qb = sqlx::QueryBuilder::new(format!("SELECT {STOCK_COLUMNS} FROM stocks WHERE TRUE"));
    if let Some(sector) = &filter.sector {
        qb.push(" AND sector = ").push_bind(sector.clone());
    }
    if let Some(min) = filter.min_price {
        qb.push(" AND price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND price <= ").push_bind(max);
    }
    qb.push(" ORDER BY symbol ASC LIMIT ")
        .push_bind(filter.effective_limit());

    let rows = qb
        .build_query_as::<StockRow>()
        .fetch_all(pool)
        .await
        .context("list stocks failed")?;
    Ok(rows.into_iter().map(|r| into_stored(r).instrument).collect())
}

/// Case-insensitive substring match on symbol or name.
pub async fn search_stocks(pool: &sqlx::PgPool, query: &str) -> anyhow::Result<Vec<Instrument>> {
    let pattern = format!("%{}%", escape_like(query.trim()));
    let rows = sqlx::query_as::<_, StockRow>(&format!(
        "SELECT {STOCK_COLUMNS} FROM stocks \
         WHERE symbol ILIKE $1 OR name ILIKE $1 \
         ORDER BY symbol ASC LIMIT $2"
    ))
    .bind(pattern)
    .bind(SEARCH_LIMIT)
    .fetch_all(pool)
    .await
    .context("search stocks failed")?;
    Ok(rows.into_iter().map(|r| into_stored(r).instrument).collect())
}

pub async fn list_sectors(pool: &sqlx::PgPool) -> anyhow::Result<Vec<String>> {
    let sectors: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT sector FROM stocks \
         WHERE sector <> '' AND sector <> 'Unknown' \
         ORDER BY sector ASC",
    )
    .fetch_all(pool)
    .await
    .context("select distinct sectors failed")?;
    Ok(sectors)
}

/// Inserts or refreshes a stock from a provider quote and returns the stored row.
/// New rows start with a zero market cap. Refreshes keep the stored one.
pub async fn upsert_quote(pool: &sqlx::PgPool, quote: &Quote) -> anyhow::Result<StoredStock> {
    let symbol = checked_quote_symbol(quote)?;

    let row = sqlx::query_as::<_, StockRow>(&format!(
        "INSERT INTO stocks (id, symbol, name, price, expected_return, volatility, sector, market_cap, last_updated) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, 0, now()) \
         ON CONFLICT (symbol) DO UPDATE \
           SET name = EXCLUDED.name, price = EXCLUDED.price, expected_return = EXCLUDED.expected_return, \
               volatility = EXCLUDED.volatility, sector = EXCLUDED.sector, \
               last_updated = now(), updated_at = now() \
         RETURNING {STOCK_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(&symbol)
    .bind(quote.name.trim())
    .bind(quote.price)
    .bind(quote.expected_return)
    .bind(quote.volatility.clamp(0.0, 100.0))
    .bind(quote.sector.trim())
    .fetch_one(pool)
    .await
    .with_context(|| format!("upsert stock {symbol} failed"))?;

    Ok(into_stored(row))
}

/// Uppercased symbol of a quote that is fit to store.
fn checked_quote_symbol(quote: &Quote) -> anyhow::Result<String> {
    let symbol = quote.symbol.trim().to_ascii_uppercase();
    anyhow::ensure!(!symbol.is_empty(), "symbol must be non-empty");
    anyhow::ensure!(
        quote.price.is_finite() && quote.price >= 0.0,
        "price must be a non-negative number (symbol={symbol}, price={})",
        quote.price
    );
    Ok(symbol)
}

pub async fn upsert_instruments(
    pool: &sqlx::PgPool,
    instruments: &[Instrument],
) -> anyhow::Result<u64> {
    anyhow::ensure!(!instruments.is_empty(), "instruments must be non-empty");

    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let mut qb = sqlx::QueryBuilder::new(
        "INSERT INTO stocks (id, symbol, name, price, expected_return, volatility, sector, market_cap, last_updated) ",
    );
    qb.push_values(instruments, |mut b, s| {
        b.push_bind(s.id.unwrap_or_else(Uuid::new_v4))
            .push_bind(s.symbol.trim().to_ascii_uppercase())
            .push_bind(s.name.trim().to_string())
            .push_bind(s.price)
            .push_bind(s.expected_return)
            .push_bind(s.volatility)
            .push_bind(s.sector.trim().to_string())
            .push_bind(s.market_cap)
            .push("now()");
    });
    qb.push(
        " ON CONFLICT (symbol) DO UPDATE \
           SET name = EXCLUDED.name, price = EXCLUDED.price, expected_return = EXCLUDED.expected_return, \
               volatility = EXCLUDED.volatility, sector = EXCLUDED.sector, market_cap = EXCLUDED.market_cap, \
               last_updated = now(), updated_at = now()",
    );

    let res = qb
        .build()
        .persistent(false)
        .execute(&mut *tx)
        .await
        .context("batch upsert stocks failed")?;

    tx.commit().await.context("commit transaction failed")?;
    Ok(res.rows_affected())
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
