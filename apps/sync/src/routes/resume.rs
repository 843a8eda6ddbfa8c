use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use crate::errors::AppError;
use crate::messages::{Message, Reply};
use crate::models::resume::ProfileDocument;
use crate::relay::{RelayError, TabId};
use crate::state::AppState;

/// A failed write only reaches the caller when the relay runs in strict mode.
fn check_write(reply: Reply) -> Result<Reply, AppError> {
    match reply {
        Reply::Failed { error, .. } => Err(AppError::Storage(error)),
        other => Ok(other),
    }
}

/// GET /api/v1/resume
pub async fn handle_get_resume(State(state): State<AppState>) -> Result<Json<Reply>, AppError> {
    let reply = state.relay.request(Message::GetResumeData).await?;
    Ok(Json(reply))
}

/// PUT /api/v1/resume
pub async fn handle_save_resume(
    State(state): State<AppState>,
    Json(doc): Json<ProfileDocument>,
) -> Result<Json<Reply>, AppError> {
    let reply = state.relay.request(Message::SaveResumeData(doc)).await?;
    Ok(Json(check_write(reply)?))
}

/// POST /api/v1/messages
/// Dispatches any message to the relay. Messages the relay does not answer yield 204.
pub async fn handle_message(
    State(state): State<AppState>,
    Json(message): Json<Message>,
) -> Result<Response, AppError> {
    match state.relay.request(message).await {
        Ok(reply) => Ok(Json(check_write(reply)?).into_response()),
        Err(RelayError::NoReply) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(e) => Err(e.into()),
    }
}

/// GET /api/v1/pages/:tab/data
pub async fn handle_page_data(
    State(state): State<AppState>,
    Path(tab): Path<TabId>,
) -> Result<Json<Value>, AppError> {
    let data = state
        .relay
        .request_page_data(tab)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tab {tab} is not connected")))?;
    Ok(Json(data))
}
