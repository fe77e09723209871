//! Measure Datalog API Server
//!
//! Accepts readings posted by sensor nodes and serves the recent history to
//! the dashboard.

use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_governor::GovernorLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub mod error;
pub mod rate_limit;
pub mod routes;
pub mod settings;

pub use error::ApiError;
pub use settings::AppConfig;

use settings::LoggingConfig;
use storage::Repository;

/// Ingest and query path
pub const MEASUREMENTS_PATH: &str = "/api/v1/measurements";

/// Path the deployed firmware posts to
pub const LEGACY_INGEST_PATH: &str = "/Insertar2.php";

/// Path the deployed dashboard reads from
pub const LEGACY_QUERY_PATH: &str = "/obtener_datos.php";

/// Application state shared across handlers
pub struct AppState {
    /// Storage repository
    pub repository: Repository,
    /// Rows returned by the query handler
    pub query_limit: usize,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
    /// Prometheus handle when metrics are enabled
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new application state
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        Self {
            repository,
            query_limit: config.query.effective_limit(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Attach a Prometheus handle for `/metrics`
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub database: ComponentHealth,
}

/// Individual component health
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub measurement_count: Option<i64>,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>, config: &AppConfig) -> Result<Router, ApiError> {
    let ingest = match rate_limit::create_governor_config(&config.rate_limit)? {
        Some(governor) => {
            post(routes::measurements::ingest).layer(GovernorLayer { config: governor })
        }
        None => post(routes::measurements::ingest),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST]);

    let router = Router::new()
        .route(
            MEASUREMENTS_PATH,
            ingest.clone().get(routes::measurements::recent),
        )
        .route(LEGACY_INGEST_PATH, ingest)
        .route(LEGACY_QUERY_PATH, get(routes::measurements::recent))
        .route("/api/v1/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state);

    Ok(router)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = match state.repository.count().await {
        Ok(count) => ComponentHealth {
            status: "ok".to_string(),
            measurement_count: Some(count),
        },
        Err(e) => {
            warn!("Health check could not reach storage: {}", e);
            ComponentHealth {
                status: "unavailable".to_string(),
                measurement_count: None,
            }
        }
    };

    let status = if database.status == "ok" { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        database,
    })
}

/// Prometheus scrape handler
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Initialize logging; `RUST_LOG` takes precedence over the configured level
pub fn init_logging(config: &LoggingConfig) -> Result<(), ApiError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| ApiError::Logging(e.to_string()))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| ApiError::Logging(e.to_string()))
}

/// Install the global Prometheus recorder
pub fn install_metrics() -> Result<PrometheusHandle, ApiError> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ApiError::Metrics(e.to_string()))
}

/// Run the server until ctrl-c or SIGTERM
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let repository = Repository::connect_lazy(&config.database)?;

    // An unreachable database is reported per request, so startup carries on.
    if let Err(e) = repository.ensure_schema().await {
        warn!("Could not prepare table datos: {}", e);
    }

    let mut state = AppState::new(repository.clone(), &config);
    if config.metrics.enabled {
        state = state.with_metrics(install_metrics()?);
        info!("Prometheus metrics enabled at /metrics");
    }

    let app = create_router(Arc::new(state), &config)?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    info!("Starting API server on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    repository.close().await;
    info!("Server stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM.
///
/// The SIGTERM listener is registered before this returns, so a signal sent
/// right after the call is not lost.
fn shutdown_signal() -> impl std::future::Future<Output = ()> {
    #[cfg(unix)]
    let sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(sigterm) => Some(sigterm),
        Err(e) => {
            warn!("Failed to listen for SIGTERM: {}", e);
            None
        }
    };

    async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async move {
            match sigterm {
                Some(mut sigterm) => {
                    sigterm.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received ctrl-c, shutting down"),
            _ = terminate => info!("Received SIGTERM, shutting down"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_triggers_shutdown() {
        let shutdown = tokio::spawn(shutdown_signal());

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), shutdown)
            .await
            .expect("shutdown did not resolve after SIGTERM")
            .unwrap();
    }
}
