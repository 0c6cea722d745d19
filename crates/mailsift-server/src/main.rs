use std::sync::Arc;
use std::{env, net::SocketAddr};

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use mailsift_core::{
    Config, Database, Engine, EngineSettings, HttpClassifier, ImapGateway, Journal,
    SchedulerConfig, TrainingEmitter, init_logging, migrations, run_scheduler,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod api;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub db: Database,
    pub admin_api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config = Config::load(&config_path)?;

    init_logging(&config.app)?;

    let db = Database::open(&config.paths.database).await?;
    migrations::run_migrations(&db).await?;

    let classifier = HttpClassifier::load(
        &config.paths.model,
        config.classifier.url.clone(),
        reqwest::Client::new(),
    )?;
    let gateway = ImapGateway::new(config.imap.clone());

    let engine = Arc::new(Engine::new(
        Journal::new(db.clone()),
        Arc::new(gateway),
        Arc::new(classifier),
        TrainingEmitter::new(config.paths.training_data.clone()),
        EngineSettings {
            self_addresses: config.profile.self_addresses.clone(),
            verification_label: config.profile.verification_label.clone(),
        },
    ));

    let shutdown = CancellationToken::new();
    let scheduler_handle = tokio::spawn(run_scheduler(
        engine.clone(),
        SchedulerConfig::from(&config.jobs),
        shutdown.child_token(),
    ));

    let state = AppState {
        engine,
        db: db.clone(),
        admin_api_key: config.admin.api_key.clone(),
    };
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.app.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("mailsift listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(err) = scheduler_handle.await {
        warn!("scheduler task join error: {err}");
    }
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .merge(api::router(state.clone()))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    database: String,
}

async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db_status = match state.db.health_check().await {
        Ok(_) => "ok",
        Err(_) => "unhealthy",
    };

    let status = if db_status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if db_status == "ok" {
                "healthy".to_string()
            } else {
                "unhealthy".to_string()
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: db_status.to_string(),
        }),
    )
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("received ctrl+c, shutting down");
        }
        _ = terminate => {
            warn!("received terminate signal, shutting down");
        }
    }

    shutdown.cancel();
}
