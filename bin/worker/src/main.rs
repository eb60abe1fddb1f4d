//! Chain execution worker.
//!
//! Consumes inbound events and scheduled steps from NATS, walking flow
//! graphs against Postgres. Multiple workers can run side by side; the
//! work-queue streams hand each message to exactly one of them.

mod config;

use chatflow_engine::nats::{NatsConfig, NatsEngine};
use chatflow_engine::{
    ContactStore, ContinuationQueue, FlowStore, HttpWebhookDispatcher, MessageSender, NodeExecutor,
    Notifier, SystemClock, TriggerMatcher, WebhookDispatcher,
};
use chatflow_store::{ContactRepository, FlowRepository, MIGRATOR};
use config::WorkerConfig;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    let db_pool = PgPoolOptions::new()
        .max_connections(config.max_db_connections)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    tracing::info!("Running database migrations...");
    MIGRATOR
        .run(&db_pool)
        .await
        .expect("failed to run migrations");

    let mut nats_config = NatsConfig::new(config.nats.url.clone());
    nats_config.delivery_timeout_secs = config.nats.delivery_timeout_secs;
    let nats = Arc::new(
        NatsEngine::connect(nats_config)
            .await
            .expect("failed to connect to NATS"),
    );

    let flow_store: Arc<dyn FlowStore> = Arc::new(FlowRepository::new(db_pool.clone()));
    let contact_store: Arc<dyn ContactStore> = Arc::new(ContactRepository::new(db_pool.clone()));
    let queue: Arc<dyn ContinuationQueue> = Arc::new(nats.continuation_queue());
    let sender: Arc<dyn MessageSender> = Arc::new(nats.message_sender());
    let webhooks: Arc<dyn WebhookDispatcher> = Arc::new(HttpWebhookDispatcher::new());
    let notifier: Arc<dyn Notifier> = Arc::new(nats.notifier());

    let executor = Arc::new(NodeExecutor::new(
        Arc::clone(&flow_store),
        contact_store,
        sender,
        webhooks,
        notifier,
        Arc::clone(&queue),
        Arc::new(SystemClock),
    ));
    let matcher = Arc::new(TriggerMatcher::new(flow_store, queue));

    let step_engine = Arc::clone(&nats);
    let step_handle = tokio::spawn(async move {
        if let Err(e) = step_engine.run_step_consumer(executor).await {
            tracing::error!(error = %e, "step consumer exited");
        }
    });

    let event_engine = Arc::clone(&nats);
    let event_handle = tokio::spawn(async move {
        if let Err(e) = event_engine.run_event_consumer(matcher).await {
            tracing::error!(error = %e, "event consumer exited");
        }
    });

    tracing::info!("Worker running");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
        _ = step_handle => {
            tracing::error!("step consumer task ended unexpectedly");
        }
        _ = event_handle => {
            tracing::error!("event consumer task ended unexpectedly");
        }
    }
}
