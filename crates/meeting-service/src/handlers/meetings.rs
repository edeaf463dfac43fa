//! Meeting handlers.
//!
//! - `POST /v1/meetings` - Create a meeting
//! - `GET /v1/meetings/:token` - Redeem a token
//! - `DELETE /v1/meetings/:token` - Delete a meeting
//! - `POST /v1/meetings/:token/satisfaction` - Record the post-call survey answer
//!
//! # Security
//!
//! Tokens are path parameters and are never logged. Every token the cipher
//! rejects produces the same 401 body.

use crate::errors::MeetingError;
use crate::models::{CreateMeetingRequest, CreateMeetingResponse, MeetingView, SatisfactionRequest};
use crate::routes::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::instrument;

/// Handler for POST /v1/meetings
///
/// # Response
///
/// - 201 Created: `{ "id": "<token>", "url": "<base_path>/<token>" }`
/// - 400 Bad Request: empty title or base path
#[instrument(skip_all, name = "meeting.handlers.create", fields(domain_id = request.domain_id))]
pub async fn create_meeting(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateMeetingRequest>,
) -> Result<(StatusCode, Json<CreateMeetingResponse>), MeetingError> {
    let response = state
        .service
        .create_meeting(
            request.domain_id,
            &request.title,
            request.expire_sec,
            &request.base_path,
            request.variables,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Handler for GET /v1/meetings/:token
///
/// # Response
///
/// - 200 OK: meeting view
/// - 401 Unauthorized: token rejected
/// - 404 Not Found: no such meeting, or expired without a call
#[instrument(skip_all, name = "meeting.handlers.get")]
pub async fn get_meeting(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<MeetingView>, MeetingError> {
    state
        .service
        .get_meeting(&token)
        .await?
        .map(Json)
        .ok_or(MeetingError::NotFound)
}

/// Handler for DELETE /v1/meetings/:token
#[instrument(skip_all, name = "meeting.handlers.delete")]
pub async fn delete_meeting(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<StatusCode, MeetingError> {
    state.service.delete_meeting(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /v1/meetings/:token/satisfaction
///
/// # Response
///
/// - 204 No Content: answer recorded
/// - 403 Forbidden: no bridged call, or an answer already exists
/// - 503 Service Unavailable: call engine unreachable
#[instrument(skip_all, name = "meeting.handlers.satisfaction")]
pub async fn submit_satisfaction(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(request): Json<SatisfactionRequest>,
) -> Result<StatusCode, MeetingError> {
    state
        .service
        .submit_satisfaction(&token, &request.satisfaction)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
