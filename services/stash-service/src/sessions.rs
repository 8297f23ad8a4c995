use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use gs_api_types::{SessionView, SubmitEntryRequest, UiMode};
use gs_portal_core::{InitializeOutcome, PortalSession};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{ApiError, ApiResult, AppState, not_found, portal_error};

#[derive(Debug, Serialize)]
pub(crate) struct InitializeResponse {
    pub(crate) outcome: &'static str,
    #[serde(flatten)]
    pub(crate) session: SessionView,
}

async fn lookup(state: &AppState, id: Uuid) -> Result<Arc<PortalSession>, ApiError> {
    state
        .sessions
        .touch(&id)
        .await
        .ok_or_else(|| not_found("session not found"))
}

pub(crate) async fn create_session(State(state): State<AppState>) -> ApiResult<SessionView> {
    let session = Arc::new(PortalSession::new(state.wallet.clone(), state.client.clone()));
    session.start().await;
    let view = session.view().await;

    state.sessions.insert(session).await;
    info!(session = %view.session_id, connected = view.signer.is_some(), "session opened");
    Ok(Json(view))
}

pub(crate) async fn get_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<SessionView> {
    let session = lookup(&state, id).await?;
    Ok(Json(session.view().await))
}

pub(crate) async fn connect(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<SessionView> {
    let session = lookup(&state, id).await?;
    match session.connect().await {
        Ok(_) => {
            info!(session = %id, "wallet connected");
            Ok(Json(session.view().await))
        }
        Err(err) => {
            warn!(session = %id, kind = err.kind(), "wallet connect failed: {}", err);
            Err(portal_error(err))
        }
    }
}

pub(crate) async fn initialize(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<InitializeResponse> {
    let session = lookup(&state, id).await?;
    let (outcome, _) = session.initialize().await.map_err(|err| {
        warn!(session = %id, kind = err.kind(), "initialize failed: {}", err);
        portal_error(err)
    })?;

    let outcome = match outcome {
        InitializeOutcome::Created => "created",
        InitializeOutcome::AlreadyInitialized => "already_initialized",
    };
    info!(session = %id, outcome, "target account initialized");
    Ok(Json(InitializeResponse {
        outcome,
        session: session.view().await,
    }))
}

pub(crate) async fn submit_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SubmitEntryRequest>,
) -> ApiResult<SessionView> {
    let session = lookup(&state, id).await?;
    session.submit_entry(&request.link).await.map_err(|err| {
        warn!(session = %id, kind = err.kind(), "entry submission failed: {}", err);
        portal_error(err)
    })?;
    info!(session = %id, link = %request.link, "entry submitted");
    Ok(Json(session.view().await))
}

pub(crate) async fn refresh(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<SessionView> {
    let session = lookup(&state, id).await?;
    match session.refresh().await {
        UiMode::Error { message } => warn!(session = %id, "refresh failed: {}", message),
        mode => info!(session = %id, ?mode, "account refreshed"),
    }
    Ok(Json(session.view().await))
}

pub(crate) async fn close_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    let session = state
        .sessions
        .remove(&id)
        .await
        .ok_or_else(|| not_found("session not found"))?;
    session.close().await;
    info!(session = %id, "session closed");
    Ok(StatusCode::NO_CONTENT)
}
