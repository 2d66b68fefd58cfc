//! Billing reconciler service.
//!
//! Wires configuration, storage, the processor client and the HTTP surface
//! together, then serves until interrupted.

use std::error::Error;
use std::sync::Arc;

use secrecy::SecretString;
use tokio::time::interval;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use billing_reconciler::adapters::http::{app_router, BillingAppState};
use billing_reconciler::adapters::memory::{InMemoryBillingEventLog, InMemoryBillingRecordStore};
use billing_reconciler::adapters::postgres::{
    self, PostgresBillingEventLog, PostgresBillingRecordStore,
};
use billing_reconciler::adapters::processor::{
    HttpPaymentProcessor, HttpProcessorConfig, MockPaymentProcessor,
};
use billing_reconciler::application::handlers::{
    BillingQueries, EventRouter, ProcessWebhookHandler, RecordReconciler, SubscriptionOrchestrator,
};
use billing_reconciler::application::RetryPolicy;
use billing_reconciler::config::{load_plan_catalog, AppConfig, LoggingConfig, StorageBackend};
use billing_reconciler::domain::billing::{PlanCatalog, WebhookVerifier};
use billing_reconciler::domain::foundation::Timestamp;
use billing_reconciler::ports::{BillingEventLog, BillingRecordStore, PaymentProcessor};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config);
    config.validate()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        "Starting billing reconciler"
    );

    let catalog = Arc::new(load_plan_catalog()?);
    tracing::info!(plans = catalog.len(), "Plan catalog loaded");

    let (store, log) = storage(&config).await?;
    let processor = processor(&config, catalog.clone())?;
    let retry = RetryPolicy::new(
        config.retry.max_attempts,
        config.retry.base_delay(),
        log.clone(),
    );

    let reconciler = Arc::new(RecordReconciler::new(store.clone(), log.clone(), retry.clone()));
    let router = Arc::new(EventRouter::new(reconciler, log.clone()));
    let verifier = WebhookVerifier::new(config.processor.webhook_secret.clone());

    let state = BillingAppState {
        orchestrator: Arc::new(SubscriptionOrchestrator::new(
            processor.clone(),
            store.clone(),
            log.clone(),
            catalog.clone(),
            retry.clone(),
        )),
        queries: Arc::new(BillingQueries::new(store, log.clone(), processor, catalog, retry)),
        webhooks: Arc::new(ProcessWebhookHandler::new(verifier, router, log.clone())),
    };

    tokio::spawn(retention_sweep(log, config.logging.clone()));

    let app = app_router(state, config.server.request_timeout());
    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shut down");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.server.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if config.is_production() || config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn storage(
    config: &AppConfig,
) -> Result<(Arc<dyn BillingRecordStore>, Arc<dyn BillingEventLog>), Box<dyn Error>> {
    match config.database.backend() {
        StorageBackend::Postgres { url } => {
            tracing::info!("Connecting to database...");
            let pool = postgres::connect(url, &config.database).await?;
            tracing::info!("Database connection established");
            Ok((
                Arc::new(PostgresBillingRecordStore::new(pool.clone())),
                Arc::new(PostgresBillingEventLog::new(pool)),
            ))
        }
        StorageBackend::InMemory => {
            tracing::warn!("No database configured, billing records are kept in memory");
            Ok((
                Arc::new(InMemoryBillingRecordStore::new()),
                Arc::new(InMemoryBillingEventLog::new()),
            ))
        }
    }
}

fn processor(
    config: &AppConfig,
    catalog: Arc<PlanCatalog>,
) -> Result<Arc<dyn PaymentProcessor>, Box<dyn Error>> {
    let Some(base_url) = config.processor.base_url() else {
        tracing::warn!("No processor API configured, using the in-process mock processor");
        return Ok(Arc::new(MockPaymentProcessor::new(catalog)));
    };

    let token = config
        .processor
        .access_token
        .clone()
        .unwrap_or_else(|| SecretString::new(String::new()));
    let http_config = HttpProcessorConfig::new(base_url, token)
        .with_api_version(config.processor.api_version.clone())
        .with_timeout(config.processor.timeout());
    tracing::info!(base_url, "Using processor API");
    Ok(Arc::new(HttpPaymentProcessor::new(http_config, catalog)?))
}

/// Deletes billing log entries past retention, once per interval.
async fn retention_sweep(log: Arc<dyn BillingEventLog>, config: LoggingConfig) {
    let mut ticker = interval(config.sweep_interval());
    loop {
        ticker.tick().await;
        let cutoff = Timestamp::now().minus_days(i64::from(config.retention_days));
        match log.sweep_before(cutoff).await {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "Swept expired billing log entries"),
            Err(e) => tracing::error!(error = %e, "Billing log retention sweep failed"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
