use crate::auth::UserId;
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use stockfolio_core::catalog::normalize_symbol;
use stockfolio_core::domain::instrument::{RiskTier, Strategy};
use stockfolio_core::domain::portfolio::{NewPortfolio, Portfolio, PortfolioStats, PortfolioStatus};
use stockfolio_core::storage::{portfolios, stocks};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct OptimizeBody {
    #[serde(default)]
    name: Option<String>,
    total_budget: f64,
    risk_level: String,
    #[serde(default)]
    stock_symbols: Option<Vec<String>>,
    #[serde(default)]
    algorithm: Option<String>,
}

#[derive(Debug, PartialEq)]
struct OptimizeParams {
    total_budget: f64,
    risk_tier: RiskTier,
    strategy: Strategy,
    /// Empty means the whole catalogue.
    symbols: Vec<String>,
}

impl OptimizeBody {
    fn validate(&self) -> ApiResult<OptimizeParams> {
        if !self.total_budget.is_finite() || self.total_budget <= 0.0 {
            return Err(ApiError::bad_request("please provide a valid budget"));
        }
        let risk_tier: RiskTier = self.risk_level.parse().map_err(|_| {
            ApiError::bad_request("please provide a valid risk level (low, medium, high)")
        })?;
        let strategy: Strategy = match self.algorithm.as_deref().map(str::trim) {
            None | Some("") => Strategy::default(),
            Some(s) => s.parse().map_err(|_| {
                ApiError::bad_request("please provide a valid algorithm (greedy, knapsack)")
            })?,
        };

        let mut symbols: Vec<String> = Vec::new();
        for s in self.stock_symbols.iter().flatten() {
            let s = normalize_symbol(s);
            if !s.is_empty() && !symbols.contains(&s) {
                symbols.push(s);
            }
        }

        Ok(OptimizeParams {
            total_budget: self.total_budget,
            risk_tier,
            strategy,
            symbols,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct OptimizationSummary {
    used_budget: f64,
    remaining_budget: f64,
    algorithm: Strategy,
}

#[derive(Debug, Serialize)]
pub struct OptimizeResponse {
    portfolio: Portfolio,
    optimization: OptimizationSummary,
}

#[derive(Debug, Serialize)]
pub struct PortfolioList {
    count: usize,
    portfolios: Vec<Portfolio>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Message {
    message: &'static str,
}

fn parse_status(raw: Option<&str>) -> ApiResult<Option<PortfolioStatus>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(|_| {
            ApiError::bad_request("please provide a valid status (active, archived)")
        }),
    }
}

pub async fn optimize(
    user: UserId,
    State(state): State<AppState>,
    payload: Result<Json<OptimizeBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<OptimizeResponse>)> {
    let Json(body) = payload?;
    let params = body.validate()?;
    let pool = state.db()?;

    let candidates = if params.symbols.is_empty() {
        stocks::list_all(pool).await?
    } else {
        stocks::find_by_symbols(pool, &params.symbols).await?
    };
    if candidates.is_empty() {
        return Err(ApiError::bad_request("no stocks available for optimization"));
    }

    tracing::info!(
        stocks = candidates.len(),
        budget = params.total_budget,
        risk_tier = %params.risk_tier,
        strategy = %params.strategy,
        "optimizing portfolio"
    );
    let result = state.optimizer.run(
        &candidates,
        params.total_budget,
        params.risk_tier,
        params.strategy,
    )?;

    let optimization = OptimizationSummary {
        used_budget: result.used_budget,
        remaining_budget: result.remaining_budget,
        algorithm: result.strategy,
    };
    tracing::info!(
        selected = result.allocations.len(),
        used_budget = result.used_budget,
        "optimization complete"
    );

    let new = NewPortfolio::from_result(
        user.0,
        body.name.as_deref(),
        params.total_budget,
        params.risk_tier,
        result,
    );
    let portfolio = portfolios::insert_portfolio(pool, &new).await?;

    Ok((
        StatusCode::CREATED,
        Json(OptimizeResponse {
            portfolio,
            optimization,
        }),
    ))
}

pub async fn list(
    user: UserId,
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<PortfolioList>> {
    let Query(query) = query?;
    let status = parse_status(query.status.as_deref())?;
    let pool = state.db()?;
    let portfolios = portfolios::list_for_user(pool, user.0, status).await?;
    Ok(Json(PortfolioList {
        count: portfolios.len(),
        portfolios,
    }))
}

/// 404 when absent, 403 when it belongs to someone else.
async fn load_owned(pool: &PgPool, id: Uuid, user: UserId) -> ApiResult<Portfolio> {
    let portfolio = portfolios::get_portfolio(pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("portfolio not found"))?;
    if portfolio.user_id != user.0 {
        return Err(ApiError::forbidden("not authorized to access this portfolio"));
    }
    Ok(portfolio)
}

pub async fn get_one(
    user: UserId,
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Portfolio>> {
    let Path(id) = id?;
    let pool = state.db()?;
    Ok(Json(load_owned(pool, id, user).await?))
}

pub async fn update(
    user: UserId,
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateBody>, JsonRejection>,
) -> ApiResult<Json<Portfolio>> {
    let Path(id) = id?;
    let Json(body) = payload?;
    let status = parse_status(body.status.as_deref())?;
    let pool = state.db()?;

    load_owned(pool, id, user).await?;
    portfolios::update_portfolio(pool, id, body.name.as_deref(), status)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("portfolio not found"))
}

pub async fn delete(
    user: UserId,
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Message>> {
    let Path(id) = id?;
    let pool = state.db()?;

    load_owned(pool, id, user).await?;
    if !portfolios::delete_portfolio(pool, id).await? {
        return Err(ApiError::not_found("portfolio not found"));
    }
    Ok(Json(Message {
        message: "portfolio deleted",
    }))
}

pub async fn stats(
    user: UserId,
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<PortfolioStats>> {
    let Path(id) = id?;
    let pool = state.db()?;

    let portfolio = load_owned(pool, id, user).await?;
    let symbols: Vec<String> = portfolio
        .allocations
        .iter()
        .map(|a| a.symbol.clone())
        .collect();
    let sectors: HashMap<String, String> = stocks::find_by_symbols(pool, &symbols)
        .await?
        .into_iter()
        .map(|s| (s.symbol, s.sector))
        .collect();

    Ok(Json(PortfolioStats::compute(&portfolio, &sectors)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: serde_json::Value) -> OptimizeBody {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn validates_optimize_body() {
        let p = body(serde_json::json!({
            "total_budget": 5000.0,
            "risk_level": "High",
            "stock_symbols": ["aapl", " msft ", "AAPL", ""],
            "algorithm": "knapsack"
        }))
        .validate()
        .unwrap();
        assert_eq!(
            p,
            OptimizeParams {
                total_budget: 5000.0,
                risk_tier: RiskTier::High,
                strategy: Strategy::Knapsack,
                symbols: vec!["AAPL".to_string(), "MSFT".to_string()],
            }
        );
    }

    #[test]
    fn algorithm_and_symbols_are_optional() {
        let p = body(serde_json::json!({"total_budget": 1, "risk_level": "low"}))
            .validate()
            .unwrap();
        assert_eq!(p.strategy, Strategy::Greedy);
        assert!(p.symbols.is_empty());
    }

    #[test]
    fn rejects_bad_budget_risk_and_algorithm() {
        for budget in [0.0, -5.0] {
            let err = body(serde_json::json!({"total_budget": budget, "risk_level": "low"}))
                .validate()
                .unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST);
            assert_eq!(err.message, "please provide a valid budget");
        }

        let err = body(serde_json::json!({"total_budget": 10, "risk_level": "extreme"}))
            .validate()
            .unwrap_err();
        assert_eq!(err.message, "please provide a valid risk level (low, medium, high)");

        let err = body(serde_json::json!({
            "total_budget": 10,
            "risk_level": "low",
            "algorithm": "genetic"
        }))
        .validate()
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn status_filter_parsing() {
        assert_eq!(parse_status(None).unwrap(), None);
        assert_eq!(parse_status(Some(" ")).unwrap(), None);
        assert_eq!(
            parse_status(Some("archived")).unwrap(),
            Some(PortfolioStatus::Archived)
        );
        assert!(parse_status(Some("gone")).is_err());
    }
}
