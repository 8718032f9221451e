//! # Authorization HTTP Server
//!
//! HTTP front end for the scoped authorization engine.
//!
//! ## Endpoints
//!
//! - `POST /authz/permissions/validate` - Batch permission validation for
//!   the calling subject
//! - `GET /health` - Health check
//!
//! ## Configuration
//!
//! Environment variables:
//! - `PORT` - HTTP server port (default: 8080)
//! - `RUST_LOG` - Log level (default: info)
//! - `POLICY_FILE` - JSON policy configuration; omitted, the built-in
//!   library-role catalog is used
//! - `SEED_FILE` - JSON list of assignments granted at startup
//! - `RELOAD_INTERVAL_SECS` - Periodic policy reload interval; `0`
//!   disables periodic reload (default: 30, effective only with a
//!   `POLICY_FILE`)
//!
//! Authentication is delegated to the fronting gateway, which injects the
//! verified caller identity as the `x-authz-subject` header. Requests
//! without it are rejected with `401`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    serve, Router,
};
use chrono::{DateTime, Utc};
use scoped_authz::{
    AllowListMatcher, AuthzError, BatchEntry, BatchResult, Engine, EngineConfig,
    FilePolicySource, PolicyConfig, PolicySource, SubjectId,
};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Header carrying the authenticated caller identity, injected by the
/// fronting gateway.
const SUBJECT_HEADER: &str = "x-authz-subject";

/// Shared application state
#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
    start_time: std::time::Instant,
}

/// Error response body
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

/// Application error type
#[derive(Debug)]
enum AppError {
    Unauthenticated,
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            AppError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                "caller identity is missing".to_string(),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg,
            ),
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<AuthzError> for AppError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Validation(msg) => AppError::BadRequest(msg),
            AuthzError::Unauthenticated => AppError::Unauthenticated,
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    uptime_seconds: u64,
    version: String,
}

/// Assignment granted at startup from `SEED_FILE`.
#[derive(Debug, Deserialize)]
struct SeedAssignment {
    subject: String,
    role: String,
    scope: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

fn subject_from_headers(headers: &HeaderMap) -> Result<SubjectId, AuthzError> {
    let value = headers
        .get(SUBJECT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(AuthzError::Unauthenticated)?;
    Ok(SubjectId::new(value))
}

/// POST /authz/permissions/validate - validate a batch of permissions for
/// the calling subject.
///
/// Returns `200` with a same-length, same-order result array; entries
/// with `allowed: false` are results, not errors. A structurally invalid
/// batch returns `400` for the whole request.
async fn validate_permissions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(entries): Json<Vec<BatchEntry>>,
) -> Result<Json<Vec<BatchResult>>, AppError> {
    let subject = subject_from_headers(&headers)?;

    info!(
        subject = %subject,
        entries = entries.len(),
        "permission validation request"
    );

    let results = state.engine.validate_batch(&subject, &entries).await?;
    Ok(Json(results))
}

/// GET /health - Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = state.start_time.elapsed().as_secs();

    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: uptime,
        version: scoped_authz::VERSION.to_string(),
    })
}

/// Create the HTTP router with all endpoints
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace = TraceLayer::new_for_http()
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/authz/permissions/validate", post(validate_permissions))
        .route("/health", get(health_check))
        .layer(ServiceBuilder::new().layer(trace).layer(cors))
        .with_state(state)
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }

    info!("Starting graceful shutdown");
}

/// Grant the assignments listed in the seed file.
async fn apply_seed(engine: &Engine, path: &str) -> anyhow::Result<usize> {
    let raw = std::fs::read_to_string(path)?;
    let seeds: Vec<SeedAssignment> = serde_json::from_str(&raw)?;

    let mut granted = 0;
    for seed in &seeds {
        engine
            .grant(&seed.subject, &seed.role, &seed.scope, seed.expires_at)
            .await?;
        granted += 1;
    }
    Ok(granted)
}

/// Main server entrypoint
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting authorization server v{}", scoped_authz::VERSION);

    // Load configuration from environment
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    let reload_interval_secs: u64 = std::env::var("RELOAD_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);

    let policy_file = std::env::var("POLICY_FILE").ok();
    let seed_file = std::env::var("SEED_FILE").ok();

    info!("Configuration:");
    info!("  Port: {}", port);
    info!("  Policy file: {}", policy_file.as_deref().unwrap_or("<built-in>"));
    info!("  Reload interval: {}s", reload_interval_secs);

    let policy_source = policy_file.as_deref().map(FilePolicySource::new);
    let config = match &policy_source {
        Some(source) => source.load().map_err(|e| {
            error!("Failed to load policy configuration: {}", e);
            anyhow::anyhow!(e)
        })?,
        None => PolicyConfig::builtin(),
    };

    let engine_config = EngineConfig {
        reload_interval: (reload_interval_secs > 0)
            .then(|| Duration::from_secs(reload_interval_secs)),
    };

    let engine = match Engine::new(config, Arc::new(AllowListMatcher::new()), engine_config) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!("Failed to initialize engine: {}", e);
            return Err(anyhow::anyhow!(e));
        }
    };

    info!("Authorization engine initialized successfully");

    if let Some(path) = &seed_file {
        let granted = apply_seed(&engine, path).await?;
        info!("Seeded {} assignments from {}", granted, path);
    }

    // Periodic policy reload only makes sense with an external policy file.
    if let Some(source) = policy_source {
        let source: Arc<dyn PolicySource> = Arc::new(source);
        if Arc::clone(&engine).spawn_reloader(source).is_some() {
            info!("Periodic policy reload task started");
        }
    }

    // Create shared state
    let state = AppState {
        engine,
        start_time: std::time::Instant::now(),
    };

    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("Starting HTTP server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind HTTP server: {}", e);
            return Err(e.into());
        }
    };

    serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!("HTTP server error: {}", e);
            anyhow::anyhow!(e)
        })?;

    info!("Server shut down gracefully");
    Ok(())
}
