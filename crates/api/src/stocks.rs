use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use serde::{Deserialize, Serialize};
use stockfolio_core::catalog;
use stockfolio_core::domain::instrument::Instrument;
use stockfolio_core::storage::stocks::{self, StockFilter};

const MAX_BATCH_SYMBOLS: usize = 50;

#[derive(Debug, Serialize)]
pub struct StockList {
    count: usize,
    stocks: Vec<Instrument>,
}

impl From<Vec<Instrument>> for StockList {
    fn from(stocks: Vec<Instrument>) -> Self {
        Self {
            count: stocks.len(),
            stocks,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SectorList {
    count: usize,
    sectors: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    sector: Option<String>,
    min_price: Option<f64>,
    max_price: Option<f64>,
    limit: Option<i64>,
}

impl ListQuery {
    fn into_filter(self) -> StockFilter {
        StockFilter {
            sector: self
                .sector
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            min_price: self.min_price,
            max_price: self.max_price,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchBody {
    symbols: Vec<String>,
}

pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<StockList>> {
    let Query(query) = query?;
    let pool = state.db()?;
    let rows = stocks::list_stocks(pool, &query.into_filter()).await?;
    Ok(Json(rows.into()))
}

pub async fn sectors(State(state): State<AppState>) -> ApiResult<Json<SectorList>> {
    let pool = state.db()?;
    let sectors = stocks::list_sectors(pool).await?;
    Ok(Json(SectorList {
        count: sectors.len(),
        sectors,
    }))
}

pub async fn search(
    State(state): State<AppState>,
    Path(query): Path<String>,
) -> ApiResult<Json<StockList>> {
    if query.trim().is_empty() {
        return Err(ApiError::bad_request("search query must be non-empty"));
    }
    let pool = state.db()?;
    let rows = stocks::search_stocks(pool, &query).await?;
    Ok(Json(rows.into()))
}

pub async fn batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchBody>, JsonRejection>,
) -> ApiResult<Json<StockList>> {
    let Json(body) = payload?;
    let symbols = batch_symbols(body.symbols)?;
    let pool = state.db()?;
    let rows = catalog::get_many(pool, state.quotes.as_ref(), &symbols, state.cache_ttl).await;
    Ok(Json(rows.into()))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> ApiResult<Json<Instrument>> {
    if symbol.trim().is_empty() {
        return Err(ApiError::bad_request("symbol must be non-empty"));
    }
    let pool = state.db()?;
    catalog::get_or_refresh_stock(pool, state.quotes.as_ref(), &symbol, state.cache_ttl)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("stock not found"))
}

/// Normalized, de-duplicated in request order.
fn batch_symbols(raw: Vec<String>) -> ApiResult<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for s in raw {
        let s = catalog::normalize_symbol(&s);
        if !s.is_empty() && !out.contains(&s) {
            out.push(s);
        }
    }
    if out.is_empty() {
        return Err(ApiError::bad_request("please provide an array of symbols"));
    }
    if out.len() > MAX_BATCH_SYMBOLS {
        return Err(ApiError::bad_request(format!(
            "at most {MAX_BATCH_SYMBOLS} symbols per batch"
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_symbols_normalizes_and_dedupes() {
        let got = batch_symbols(vec![
            " aapl".to_string(),
            "MSFT".to_string(),
            "AAPL".to_string(),
            "".to_string(),
        ])
        .unwrap();
        assert_eq!(got, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn batch_symbols_rejects_empty_and_oversized() {
        assert!(batch_symbols(vec![]).is_err());
        assert!(batch_symbols(vec!["  ".to_string()]).is_err());

        let many = (0..=MAX_BATCH_SYMBOLS).map(|i| format!("S{i}")).collect();
        let err = batch_symbols(many).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn blank_sector_is_no_filter() {
        let q = ListQuery {
            sector: Some("  ".to_string()),
            limit: Some(5),
            ..ListQuery::default()
        };
        let f = q.into_filter();
        assert!(f.sector.is_none());
        assert_eq!(f.limit, Some(5));
    }
}
