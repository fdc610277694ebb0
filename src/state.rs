use std::{sync::Arc, time::Duration};

use moka::future::Cache;
use reqwest::Client;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    config::{AppConfig, LedgerBackend},
    db::create_pool,
    repository::{FinancialReport, LedgerStore, MemoryLedger, PgLedger},
    services::{
        jobs::{JobContext, JobQueue},
        notifications::{LogNotifier, Notifier, ResendNotifier},
        policy::FinancePolicy,
    },
    tenancy::BusinessId,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: Option<PgPool>,
    pub ledger: Arc<dyn LedgerStore>,
    pub notifier: Arc<dyn Notifier>,
    pub jobs: JobQueue,
    /// Stored reports never change, so reads can be served from memory.
    pub report_cache: Cache<(BusinessId, Uuid), FinancialReport>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        let db_pool = match config.ledger_backend {
            LedgerBackend::Postgres => create_pool(&config)?,
            LedgerBackend::Memory => None,
        };
        let ledger: Arc<dyn LedgerStore> = match &db_pool {
            Some(pool) => Arc::new(PgLedger::new(pool.clone())),
            None if config.is_production() => {
                return Err("an in-memory ledger is not allowed in production".into());
            }
            None => {
                tracing::warn!("No database configured, using the in-memory ledger");
                Arc::new(MemoryLedger::new())
            }
        };

        let notifier: Arc<dyn Notifier> = match config.resend_api_key.clone() {
            Some(api_key) => Arc::new(ResendNotifier::new(
                http_client,
                api_key,
                config.email_from_address.clone(),
            )),
            None => {
                tracing::warn!("RESEND_API_KEY is not set, notices are only logged");
                Arc::new(LogNotifier)
            }
        };

        Ok(Self::assemble(config, db_pool, ledger, notifier))
    }

    pub fn with_ledger(
        config: AppConfig,
        ledger: Arc<dyn LedgerStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::assemble(config, None, ledger, notifier)
    }

    fn assemble(
        config: AppConfig,
        db_pool: Option<PgPool>,
        ledger: Arc<dyn LedgerStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let jobs = JobQueue::start(
            JobContext {
                ledger: ledger.clone(),
                notifier: notifier.clone(),
                policy: Arc::new(config.policy.clone()),
                timezone: config.finance_timezone,
            },
            config.job_queue_capacity,
            config.job_status_max_entries,
        );
        let report_cache = Cache::builder()
            .max_capacity(config.report_cache_max_entries.max(1))
            .time_to_live(Duration::from_secs(config.report_cache_ttl_seconds.max(1)))
            .build();

        Self {
            config: Arc::new(config),
            db_pool,
            ledger,
            notifier,
            jobs,
            report_cache,
        }
    }

    pub fn policy(&self) -> &FinancePolicy {
        &self.config.policy
    }
}
