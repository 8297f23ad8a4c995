mod config;
mod registry;
mod sessions;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use gs_api_types::{ErrorResponse, PortalConfigResponse};
use gs_portal_core::{PortalError, ProgramClient, WalletProvider};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::ServiceConfig;
use crate::registry::SessionRegistry;

#[derive(Debug, Serialize)]
struct HealthResponse {
    service: &'static str,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    service: &'static str,
    version: &'static str,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);
pub(crate) type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) client: Arc<ProgramClient>,
    pub(crate) wallet: Option<Arc<dyn WalletProvider>>,
    pub(crate) sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub(crate) fn new(
        client: Arc<ProgramClient>,
        wallet: Option<Arc<dyn WalletProvider>>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            client,
            wallet,
            sessions: Arc::new(SessionRegistry::new(session_ttl)),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServiceConfig::from_env()?;
    let secrets = gs_secrets::store_from_spec(&config.secret_store, config.secret_token.clone())?;
    let target = config.target(secrets.as_ref()).await?;
    let wallet = config.wallet().await?;

    let client = Arc::new(ProgramClient::new(
        config.ledger(),
        config.connection(),
        config.program_id,
        target,
        config.timeouts,
    ));
    info!(
        endpoint = %client.connection().endpoint_url,
        commitment = %client.connection().commitment,
        program_id = %client.program_id(),
        target = %client.target().address(),
        wallet = wallet.as_ref().map(|w| w.name()).unwrap_or("none"),
        "portal configured"
    );

    let state = AppState::new(client, wallet, config.session_ttl);
    let sweep_every = config.session_ttl.min(Duration::from_secs(60));
    tokio::spawn(registry::reap_idle(state.sessions.clone(), sweep_every));
    let app = app(state);

    info!("stash-service listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub(crate) fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/config", get(portal_config))
        .route("/sessions", post(sessions::create_session))
        .route(
            "/sessions/{id}",
            get(sessions::get_session).delete(sessions::close_session),
        )
        .route("/sessions/{id}/connect", post(sessions::connect))
        .route("/sessions/{id}/initialize", post(sessions::initialize))
        .route("/sessions/{id}/entries", post(sessions::submit_entry))
        .route("/sessions/{id}/refresh", post(sessions::refresh))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "stash-service",
        status: "ok",
    })
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        service: "stash-service",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn portal_config(State(state): State<AppState>) -> Json<PortalConfigResponse> {
    Json(PortalConfigResponse {
        connection: state.client.connection().clone(),
        program_id: state.client.program_id().to_string(),
        target_account: state.client.target().address().to_string(),
        can_initialize: state.client.target().can_initialize(),
    })
}

pub(crate) fn not_found(message: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.to_owned(),
            kind: "not_found".to_owned(),
        }),
    )
}

pub(crate) fn portal_error(err: PortalError) -> ApiError {
    let status = match &err {
        PortalError::CapabilityAbsent | PortalError::TargetKeyUnavailable => StatusCode::PRECONDITION_FAILED,
        PortalError::UserRejected => StatusCode::FORBIDDEN,
        PortalError::NotConnected => StatusCode::UNAUTHORIZED,
        PortalError::AlreadyInitialized | PortalError::OperationInFlight => StatusCode::CONFLICT,
        PortalError::RemoteRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PortalError::FetchFailed(_) | PortalError::SubmitFailed(_) => StatusCode::BAD_GATEWAY,
        PortalError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind: err.kind().to_owned(),
        }),
    )
}
