use std::sync::Arc;

use anyhow::Context;
use relay_core::{EnqueueService, FileStore, Notifier, QueueStore};
use relay_server::app::{self, AppState};
use relay_server::auth::ApiAuth;
use relay_server::config::Config;
use relay_server::metrics;
use relay_worker::{HttpDownstream, LogNotifier, Scheduler, WebhookNotifier};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the real environment wins either way.
    let _ = dotenvy::dotenv();

    metrics::init_metrics();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "relay_server=info,relay_worker=info,relay_core=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::from_env().context("invalid configuration")?;

    let store: Arc<dyn QueueStore> = Arc::new(
        FileStore::open(&cfg.worker.store_path)
            .await
            .context("failed to open queue store")?,
    );

    let notifier: Arc<dyn Notifier> = match &cfg.worker.notify_webhook_url {
        Some(url) => Arc::new(
            WebhookNotifier::new(url.clone(), cfg.worker.request_timeout)
                .context("failed to build notify client")?,
        ),
        None => Arc::new(LogNotifier),
    };

    let downstream =
        HttpDownstream::from_config(&cfg.worker).context("failed to build downstream client")?;

    let scheduler = Arc::new(
        Scheduler::new(store.clone(), Arc::new(downstream), notifier.clone())
            .with_liveness_gate(cfg.worker.liveness_gate)
            .with_max_attempts(cfg.worker.max_attempts)
            .with_cycle_budget(cfg.worker.cycle_budget),
    );

    tracing::info!(
        store = %cfg.worker.store_path.display(),
        downstream = %cfg.worker.downstream_url,
        health = %cfg.worker.health_url(),
        liveness_gate = cfg.worker.liveness_gate,
        max_attempts = ?cfg.worker.max_attempts,
        "starting relay"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker = tokio::spawn(relay_worker::run_worker(
        scheduler.clone(),
        cfg.worker.poll_interval,
        shutdown_rx,
        metrics::record_drain,
    ));

    let state = AppState {
        store: store.clone(),
        enqueue: EnqueueService::new(store, notifier),
        scheduler,
    };
    let api_auth = ApiAuth {
        token: cfg.api_token.clone(),
    };

    let app = app::build_app(state, api_auth).layer(TraceLayer::new_for_http());

    tracing::info!("listening on {}", cfg.bind);

    let listener = tokio::net::TcpListener::bind(cfg.bind)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")?;

    // Stop ticking; a cycle already in flight runs to completion.
    let _ = shutdown_tx.send(true);
    worker.await.context("drain worker panicked")?;
    tracing::info!("bye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("SIGINT received, shutting down"),
        _ = terminate => tracing::info!("SIGTERM received, shutting down"),
    }
}
