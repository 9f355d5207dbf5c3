//! Bazaar Wallet Server
//!
//! Wallet ledger, payout/refund workflow, listing moderation, scheduled jobs
//! and live event fan-out for a marketplace backend.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use bazaar_core::audit::{AuditSink, PgAuditSink, TracingAuditSink};
use bazaar_core::config::ConfigStore;
use bazaar_core::gateway::{GatewayClient, HttpGatewayClient};
use bazaar_core::ledger::LedgerEngine;
use bazaar_core::moderation::Moderation;
use bazaar_core::notify::{NotificationSender, OutboxNotifier};
use bazaar_core::outbox::{EventOutbox, OutboxDispatcher, outbox_wake_channel};
use bazaar_core::rate_limit::{PgCounterStore, RateLimiter};
use bazaar_core::scheduler::Scheduler;
use bazaar_core::scheduler::jobs::{
    ExpiryReminderJob, OutboxReplayJob, PayoutReconciliationJob, RateLimitResetJob,
};
use bazaar_core::store::{PgStore, Store};
use bazaar_core::transport::BroadcastHub;
use bazaar_core::workflow::{PayoutWorkflow, RefundWorkflow};
use clap::Parser;
use config::file::AuditSinkKind;
use config::{ConfigLoader, get_database_url};
use server::{build_router, run_server};
use shutdown::{shutdown_signal, spawn_config_reload_handler, spawn_rate_limit_watcher};
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Bazaar - marketplace wallet and moderation core
#[derive(Parser, Debug)]
#[command(name = "bazaar-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "BAZAAR_CONFIG", default_value = "./bazaar.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "BAZAAR_LOG_JSON", default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    tracing::info!("Starting bazaar-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);
    let core_config = loaded_config.core.clone();

    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(loaded_config.server.max_db_connections)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    // Core services
    let store: Arc<dyn Store> = Arc::new(PgStore::new(db_pool.clone()));
    let (wake_tx, wake_rx) = outbox_wake_channel();
    let outbox = EventOutbox::new(store.clone(), wake_tx);
    let audit: Arc<dyn AuditSink> = match loaded_config.server.audit_sink {
        AuditSinkKind::Database => Arc::new(PgAuditSink::new(db_pool.clone())),
        AuditSinkKind::Log => Arc::new(TracingAuditSink),
    };
    let ledger = LedgerEngine::new(store.clone(), outbox.clone(), audit);
    let notifier: Arc<dyn NotificationSender> = Arc::new(OutboxNotifier::new(outbox));
    let gateway: Arc<dyn GatewayClient> = Arc::new(HttpGatewayClient::new(
        &loaded_config.gateway.base_url,
        loaded_config.gateway.api_key.clone(),
        core_config.payouts.gateway_timeout,
    ));

    let payouts = PayoutWorkflow::new(
        ledger.clone(),
        store.clone(),
        gateway,
        notifier.clone(),
        core_config.payouts.clone(),
    );
    let refunds = RefundWorkflow::new(ledger.clone(), store.clone(), notifier.clone());
    let moderation = Moderation::new(
        ledger.clone(),
        store.clone(),
        notifier.clone(),
        core_config.listings.clone(),
    );

    let rate_limits = ConfigStore::new(core_config.rate_limits.clone());
    let limiter = RateLimiter::new(
        Arc::new(PgCounterStore::new(db_pool.clone())),
        rate_limits.clone(),
    );

    let hub = Arc::new(BroadcastHub::new(loaded_config.server.hub_capacity));
    let dispatcher = OutboxDispatcher::new(store.clone(), hub.clone(), core_config.outbox.clone());

    let jobs_config = &core_config.jobs;
    let scheduler = Scheduler::new()
        .with_job(
            Arc::new(ExpiryReminderJob::new(
                store.clone(),
                moderation.clone(),
                notifier,
                core_config.listings.batch_size,
            )),
            jobs_config.expiry_reminder,
        )
        .with_job(
            Arc::new(PayoutReconciliationJob::new(payouts.clone())),
            jobs_config.payout_reconciliation,
        )
        .with_job(
            Arc::new(OutboxReplayJob::new(dispatcher.clone())),
            jobs_config.outbox_replay,
        )
        .with_job(
            Arc::new(RateLimitResetJob::new(limiter.clone())),
            jobs_config.rate_limit_reset,
        );

    // Background tasks share one shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher_task = tokio::spawn(dispatcher.run(wake_rx, shutdown_rx.clone()));
    let jobs = scheduler.handle();
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx.clone()));
    spawn_config_reload_handler(config_loader, rate_limits.clone(), shutdown_rx.clone());
    spawn_rate_limit_watcher(&rate_limits, shutdown_rx);

    let state = AppState {
        ledger,
        payouts,
        refunds,
        moderation,
        limiter,
        rate_limits,
        hub,
        jobs,
    };

    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", loaded_config.server.listen);
    let result = run_server(router, loaded_config.server.listen, shutdown_signal()).await;

    // Stop the dispatcher, scheduler and reload handler, then wait for the
    // dispatcher and scheduler to finish their current round.
    let _ = shutdown_tx.send(true);
    for (name, task) in [("dispatcher", dispatcher_task), ("scheduler", scheduler_task)] {
        if let Err(e) = task.await {
            tracing::error!(task = name, error = %e, "Background task ended abnormally");
        }
    }

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
