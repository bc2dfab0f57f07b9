pub mod catalog;
pub mod domain;
pub mod optimizer;
pub mod quotes;
pub mod storage;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone, Default)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub alpha_vantage_api_key: Option<String>,
        pub alpha_vantage_base_url: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: non_empty_env("DATABASE_URL"),
                sentry_dsn: non_empty_env("SENTRY_DSN"),
                alpha_vantage_api_key: non_empty_env("ALPHAVANTAGE_API_KEY"),
                alpha_vantage_base_url: non_empty_env("ALPHAVANTAGE_BASE_URL"),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_alpha_vantage_api_key(&self) -> anyhow::Result<&str> {
            self.alpha_vantage_api_key
                .as_deref()
                .context("ALPHAVANTAGE_API_KEY is required")
        }

        /// Max age of a stored quote before it is refetched (`STOCK_CACHE_TTL_SECS`, default 1h).
        pub fn stock_cache_ttl(&self) -> std::time::Duration {
            let secs = std::env::var("STOCK_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(3600);
            std::time::Duration::from_secs(secs)
        }
    }

    // An empty value in .env means "unset".
    fn non_empty_env(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|s| !s.trim().is_empty())
    }
}
