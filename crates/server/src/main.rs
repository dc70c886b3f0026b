//! Call bridge server entry point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use callbridge_config::{load_settings, Settings};
use callbridge_persistence::{
    BillingService, CallRecordStore, HttpBillingService, InMemoryCallStore, InMemoryPromptStore,
    NoopBillingService, PromptStore,
};
use callbridge_pipeline::PipelineContext;
use callbridge_providers::{ChatClient, SynthesisClient, TranscriptionClient};
use callbridge_server::{create_router, init_metrics, AppState, SessionRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Priority: env vars > config/{env}.toml > config/default.toml > defaults
    let env = std::env::var("CALLBRIDGE_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing not yet initialized, use eprintln for early logging
            eprintln!("Warning: failed to load config: {}. Using defaults.", e);
            Settings::default()
        }
    };

    init_tracing(&settings);

    tracing::info!("Starting callbridge v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?settings.environment,
        config = env.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    let metrics_handle = if settings.observability.metrics_enabled {
        init_metrics()
    } else {
        None
    };

    let (store, prompts): (Arc<dyn CallRecordStore>, Arc<dyn PromptStore>) =
        if settings.persistence.enabled {
            match callbridge_persistence::init(settings.persistence.scylla.clone()).await {
                Ok(layer) => {
                    tracing::info!(
                        hosts = ?settings.persistence.scylla.hosts,
                        keyspace = %settings.persistence.scylla.keyspace,
                        "ScyllaDB persistence initialized"
                    );
                    (Arc::new(layer.calls), Arc::new(layer.prompts))
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to initialize ScyllaDB: {}. Falling back to in-memory stores.",
                        e
                    );
                    (Arc::new(InMemoryCallStore::new()), Arc::new(InMemoryPromptStore::new()))
                }
            }
        } else {
            tracing::info!("Persistence disabled, using in-memory stores");
            (Arc::new(InMemoryCallStore::new()), Arc::new(InMemoryPromptStore::new()))
        };

    let billing: Arc<dyn BillingService> = if settings.billing.enabled {
        tracing::info!(url = %settings.billing.service.url, "Billing deductions enabled");
        Arc::new(HttpBillingService::new(settings.billing.service.clone())?)
    } else {
        tracing::info!("Billing disabled, deductions are no-ops");
        Arc::new(NoopBillingService)
    };

    let pipeline = Arc::new(PipelineContext {
        stt: TranscriptionClient::new(settings.providers.stt.clone())?,
        chat: ChatClient::new(settings.providers.chat.clone())?,
        tts: SynthesisClient::new(settings.providers.tts.clone())?,
        store,
        billing,
        config: settings.pipeline.clone(),
    });

    let registry = Arc::new(SessionRegistry::new(
        settings.server.max_sessions,
        Duration::from_secs(settings.server.sweep_interval_secs),
        Duration::from_secs(settings.server.stale_after_secs),
    ));
    let sweep_shutdown = registry.start_sweep_task();

    let addr: SocketAddr =
        format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    let ws_path = settings.server.ws_path.clone();

    let state = AppState::new(Arc::new(settings), registry, pipeline, prompts)
        .with_metrics(metrics_handle);
    let app = create_router(state);

    tracing::info!(%addr, ws_path = %ws_path, "Listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = sweep_shutdown.send(true);
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Initialize tracing from CALLBRIDGE_LOG/RUST_LOG, falling back to the
/// configured level
fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_env("CALLBRIDGE_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| {
            let level = &settings.observability.log_level;
            format!("{},tower_http=info,hyper=warn", level).into()
        });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
