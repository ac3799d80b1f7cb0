mod config;
mod transport;
mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use keybroker::{
    epoch_ms_now, KeyRegistry, KeyStore, MemoryStore, ReservationEngine, Sweeper, WaitQueue,
};

use crate::config::{Config, KeySpec};
use crate::transport::http::{AppState, HttpTransport};

/// How often elapsed 30 s windows are reset.
const WINDOW_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
/// How often elapsed day periods are reset and exhausted keys revived.
const DAY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from environment variables and CLI arguments
    let config = Config::from_env_and_args()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("keybroker={}", config.log_level).parse()?)
                .add_directive(format!("keybroker_server={}", config.log_level).parse()?),
        )
        .init();

    let store = MemoryStore::new();
    let registry = Arc::new(KeyRegistry::new(store.clone(), config.policy.clone()));
    let engine = Arc::new(ReservationEngine::new(store.clone()));

    preload_keys(&registry, &config.preload).await;

    spawn_sweepers(store);

    let queue = WaitQueue::spawn(engine.clone(), config.queue.wait_queue_config());

    let state = AppState {
        engine,
        registry,
        queue,
        wait_hint_ms: config.policy.wait_hint_ms(),
        request_timeout: config.queue.request_timeout(),
    };

    tracing::info!(
        "keybroker started: {} preloaded keys, queue concurrency {}",
        config.preload.len(),
        config.queue.concurrency
    );

    HttpTransport::new(&config.host, config.port).start(state).await
}

/// Register the configured keys. A key that fails to register is logged
/// and skipped; the server still starts with the rest of the pool.
async fn preload_keys<S: KeyStore>(registry: &KeyRegistry<S>, specs: &[KeySpec]) {
    for spec in specs {
        match registry.register(&spec.id, &spec.plan).await {
            Ok(_) => tracing::info!(id = %spec.id, plan = %spec.plan, "preloaded key"),
            Err(err) => tracing::warn!(id = %spec.id, error = %err, "failed to preload key"),
        }
    }
}

/// Start the periodic maintenance passes. Failures are logged and the
/// next tick retries; a sweep never takes the server down.
fn spawn_sweepers<S: KeyStore + Clone>(store: S) {
    let sweeper = Sweeper::new(store.clone());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(WINDOW_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(err) = sweeper.sweep_windows(epoch_ms_now()).await {
                tracing::warn!(error = %err, "window sweep failed");
            }
        }
    });

    let sweeper = Sweeper::new(store);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(DAY_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(err) = sweeper.sweep_days(epoch_ms_now()).await {
                tracing::warn!(error = %err, "day sweep failed");
            }
        }
    });
}
