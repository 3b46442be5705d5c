use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use holdwatch_core::{
    alerts::AlertSink,
    checkpoints::CheckpointStore,
    holdings::HoldingsStore,
    investors::InvestorDirectory,
    CollectionOrchestrator,
};
use holdwatch_filings::{
    ApiFilingSource, ClientCredentialsTokenProvider, CredentialCache, EdgarConfig,
    EdgarFilingSource, FilingSource, OpenFigiResolver, RateLimitConfig, RateLimiter,
    RetryingSource, TickerResolver, EDGAR_PROVIDER_ID,
};
use holdwatch_storage_sqlite::{
    db, CheckpointRepository, HoldingsRepository, InvestorRepository,
};

use crate::alerts::LogAlertSink;
use crate::config::{Config, FilingSourceKind, LogFormat};

pub struct AppState {
    pub orchestrator: Arc<CollectionOrchestrator>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub holdings: Arc<dyn HoldingsStore>,
    pub investors: Arc<dyn InvestorDirectory>,
    pub db_path: String,
}

pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init(),
    }
}

/// Builds the filing source chain: provider, then shared retry/backoff.
fn build_filing_source(
    config: &Config,
    rate_limiter: Arc<RateLimiter>,
) -> anyhow::Result<Arc<dyn FilingSource>> {
    let provider: Arc<dyn FilingSource> = match config.filing_source {
        FilingSourceKind::Edgar => {
            let user_agent = config
                .sec_user_agent
                .clone()
                .context("HW_SEC_USER_AGENT is required for the EDGAR source")?;
            rate_limiter.configure(
                EDGAR_PROVIDER_ID,
                RateLimitConfig::per_second(config.sec_requests_per_second),
            );
            let mut edgar = EdgarConfig::new(user_agent);
            edgar.timeout = config.request_timeout;
            tracing::info!(
                "Filing source: SEC EDGAR ({} req/s)",
                config.sec_requests_per_second
            );
            Arc::new(EdgarFilingSource::new(edgar, rate_limiter))
        }
        FilingSourceKind::Api => {
            let api = config
                .filing_api
                .clone()
                .context("HW_FILING_API_* settings are required for the API source")?;
            let tokens = Arc::new(ClientCredentialsTokenProvider::new(
                api.token_url,
                api.client_id,
                api.client_secret,
            ));
            tracing::info!("Filing source: API at {}", api.base_url);
            Arc::new(ApiFilingSource::new(
                api.base_url,
                Arc::new(CredentialCache::new(tokens)),
                rate_limiter,
                config.request_timeout,
            ))
        }
    };

    Ok(Arc::new(RetryingSource::new(
        provider,
        config.fetch_retry.clone(),
    )))
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let db_path = db::init(&config.db_path)?;
    tracing::info!("Database path in use: {}", db_path);

    let pool = db::create_pool(&db_path)?;
    db::run_migrations(&pool)?;
    let writer = db::spawn_writer((*pool).clone());

    let checkpoints = Arc::new(CheckpointRepository::new(pool.clone(), writer.clone()));
    let holdings = Arc::new(HoldingsRepository::new(pool.clone(), writer.clone()));
    let investors = Arc::new(InvestorRepository::new(pool.clone()));

    let rate_limiter = Arc::new(RateLimiter::new());
    let source = build_filing_source(config, rate_limiter.clone())?;
    let resolver: Arc<dyn TickerResolver> = Arc::new(OpenFigiResolver::new(
        config.openfigi_api_key.clone(),
        rate_limiter,
    ));
    let alerts: Arc<dyn AlertSink> = Arc::new(LogAlertSink::new());

    let orchestrator = Arc::new(CollectionOrchestrator::new(
        checkpoints.clone(),
        holdings.clone(),
        investors.clone(),
        source,
        resolver,
        alerts,
        config.collector.clone(),
    ));

    Ok(Arc::new(AppState {
        orchestrator,
        checkpoints,
        holdings,
        investors,
        db_path,
    }))
}
