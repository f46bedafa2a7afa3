use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use export_orchestrator::admission::AllowAll;
use export_orchestrator::api::{router, AppState};
use export_orchestrator::blob_store::{BlobStore, LocalBlobStore};
use export_orchestrator::config::{BackendMode, Config};
use export_orchestrator::drivers::annotate_extract::AnnotateExtractDriver;
use export_orchestrator::drivers::encoder::{Encoder, LocalEncoder};
use export_orchestrator::drivers::framing::FramingDriver;
use export_orchestrator::drivers::multi_clip::MultiClipDriver;
use export_orchestrator::drivers::overlay::OverlayDriver;
use export_orchestrator::drivers::DriverRegistry;
use export_orchestrator::gpu_client::{RemoteGpuClient, RemoteGpuEncoder};
use export_orchestrator::progress_hub::ProgressHub;
use export_orchestrator::recovery::Recovery;
use export_orchestrator::scheduler::Scheduler;
use export_orchestrator::store::{JobStore, SqliteJobStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("loading configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting export orchestrator");

    let store: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::connect(&config.database_url)
            .await
            .context("connecting to job store")?,
    );

    let blob_store: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(config.blob_store_root.clone()));

    let encoder: Arc<dyn Encoder> = match config.backend_mode {
        BackendMode::Local => Arc::new(LocalEncoder),
        BackendMode::RemoteGpu => {
            let base_url = config
                .remote_gpu_base_url
                .clone()
                .context("BACKEND_MODE=remote-gpu requires REMOTE_GPU_BASE_URL")?;
            let api_key = config.remote_gpu_api_key.clone().unwrap_or_default();
            let client = Arc::new(RemoteGpuClient::new(base_url, api_key));
            Arc::new(RemoteGpuEncoder::new(client, blob_store.clone()))
        }
    };

    let registry = Arc::new(DriverRegistry::new(
        Arc::new(FramingDriver::new(blob_store.clone(), encoder.clone())),
        Arc::new(OverlayDriver::new(blob_store.clone(), encoder.clone())),
        Arc::new(MultiClipDriver::new(blob_store.clone(), encoder.clone())),
        Arc::new(AnnotateExtractDriver::new(blob_store.clone(), encoder.clone())),
    ));

    let recovered = Recovery::new(store.clone())
        .run(config.startup_orphan_policy)
        .await
        .context("startup recovery")?;
    if recovered > 0 {
        tracing::warn!(count = recovered, "startup recovery reconciled orphaned jobs");
    }

    let hub = Arc::new(ProgressHub::new(config.subscriber_queue_capacity));

    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        hub.clone(),
        registry,
        config.worker_concurrency,
        config.claim_poll_interval,
        config.claim_poll_max,
    ));
    let worker_handles = scheduler.spawn_workers();

    let state = AppState {
        store,
        hub,
        blob_store,
        admission: Arc::new(AllowAll),
        websocket_keepalive: config.websocket_keepalive,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state).layer(TraceLayer::new_for_http()).layer(cors);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "listening");

    let shutdown = scheduler.shutdown_flag();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("server error")?;

    tracing::info!("awaiting in-flight workers to drain");
    for handle in worker_handles {
        let _ = handle.await;
    }
    tracing::info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal(shutdown: Arc<std::sync::atomic::AtomicBool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
    shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
    // Give in-flight drivers a moment to observe the flag and unwind before
    // axum stops accepting new connections; workers are awaited separately.
    tokio::time::sleep(Duration::from_millis(50)).await;
}
