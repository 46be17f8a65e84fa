// src/handlers/session.rs

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    catalog::CatalogDocument,
    error::AppError,
    models::session::{AdvanceRequest, AdvanceResponse, StartResponse, StatusQuery, StatusResponse},
    services::SessionService,
};

/// Returns the section order, per-section timing and total budget.
pub async fn get_config(State(sessions): State<SessionService>) -> impl IntoResponse {
    Json(CatalogDocument::from(sessions.catalog()))
}

/// Starts a new session positioned on the first question.
pub async fn start_session(
    State(sessions): State<SessionService>,
) -> Result<impl IntoResponse, AppError> {
    let record = sessions.create_session()?;

    Ok(Json(StartResponse::from_record(&record, sessions.catalog())))
}

/// Reports the session's position and the remaining section and total
/// seconds as of this request.
///
/// Returns 404 for unknown sessions, and when no `userId` is given.
pub async fn get_status(
    State(sessions): State<SessionService>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = query
        .user_id
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;
    let status = sessions.status(&user_id)?;
    let record = &status.record;

    Ok(Json(StatusResponse {
        now: status.now,
        section_key: record.section_key(sessions.catalog()).to_string(),
        section_remaining: status.remaining.section,
        total_remaining: status.remaining.total,
        section_started_at: record.section_started_at,
        question_index: record.question_index,
        completed: record.completed,
    }))
}

/// Moves the session to its next question, next section or completion.
///
/// * 404 if the session is unknown.
/// * 409 if it is already completed.
/// * A request naming a position the session already left is answered with
///   the current state and applies nothing.
pub async fn advance_session(
    State(sessions): State<SessionService>,
    Json(payload): Json<AdvanceRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let outcome = sessions.advance_session(&payload.user_id, &payload.expected_position())?;

    Ok(Json(AdvanceResponse::from_record(
        &outcome.record,
        sessions.catalog(),
    )))
}
