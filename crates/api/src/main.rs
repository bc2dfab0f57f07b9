mod auth;
mod error;
mod portfolios;
mod stocks;

use axum::{routing::get, routing::post, Router};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use error::{ApiError, ApiResult};
use stockfolio_core::optimizer::{Optimizer, OptimizerPolicy};
use stockfolio_core::quotes::QuoteProvider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = stockfolio_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match stockfolio_core::storage::connect(db_url).await {
            Ok(pool) => match stockfolio_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let policy = OptimizerPolicy::from_env()?;
    tracing::info!(?policy, "optimizer policy loaded");

    let quotes = stockfolio_core::quotes::provider_from_settings(&settings)?;
    tracing::info!(provider = quotes.provider_name(), "quote provider ready");

    let state = AppState {
        pool,
        quotes: Arc::from(quotes),
        optimizer: Arc::new(Optimizer::new(policy)),
        cache_ttl: settings.stock_cache_ttl(),
    };

    let app = router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[derive(Clone)]
pub struct AppState {
    pool: Option<PgPool>,
    quotes: Arc<dyn QuoteProvider>,
    optimizer: Arc<Optimizer>,
    cache_ttl: Duration,
}

impl AppState {
    fn db(&self) -> ApiResult<&PgPool> {
        self.pool.as_ref().ok_or_else(ApiError::unavailable)
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/stocks", get(stocks::list))
        .route("/stocks/sectors", get(stocks::sectors))
        .route("/stocks/search/:query", get(stocks::search))
        .route("/stocks/batch", post(stocks::batch))
        .route("/stocks/:symbol", get(stocks::get_one))
        .route("/portfolios", get(portfolios::list))
        .route("/portfolios/optimize", post(portfolios::optimize))
        .route(
            "/portfolios/:id",
            get(portfolios::get_one)
                .put(portfolios::update)
                .delete(portfolios::delete),
        )
        .route("/portfolios/:id/stats", get(portfolios::stats))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &stockfolio_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
