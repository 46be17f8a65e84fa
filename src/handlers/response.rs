// src/handlers/response.rs

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, State},
    response::IntoResponse,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::response::{ResponseAck, ResponseSubmission},
    store::ResponseStore,
    utils::filename::recording_file_name,
};

/// Stores one answer submission sent as `multipart/form-data`.
///
/// Text answers travel in `responseData`; spoken answers as an `audio` file,
/// which is written to the upload directory and referenced by file name.
/// Any number of calls per question is accepted.
pub async fn submit_response(
    State(responses): State<Arc<dyn ResponseStore>>,
    State(config): State<Config>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut submission = ResponseSubmission::default();
    let mut recording: Option<(Option<String>, Bytes)> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "audio" => {
                let file_name = field.file_name().map(str::to_string);
                recording = Some((file_name, field.bytes().await?));
            }
            "userId" => submission.user_id = field.text().await?,
            "section" => submission.section = field.text().await?,
            "questionId" => submission.question_id = field.text().await?,
            "responseType" => submission.response_type = field.text().await?,
            "responseData" => submission.response_data = Some(field.text().await?),
            "timeTaken" => submission.time_taken_ms = parse_millis(&field.text().await?),
            "autoSubmitted" => {
                submission.auto_submitted = field.text().await?.trim().eq_ignore_ascii_case("true")
            }
            other => tracing::debug!("Ignoring response form field '{}'", other),
        }
    }

    if recording.is_some() && submission.response_type.is_empty() {
        submission.response_type = "audio".to_string();
    }

    if let Err(validation_errors) = submission.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if let Some((original_name, data)) = recording {
        let file_name = recording_file_name(
            &submission.user_id,
            &submission.section,
            &submission.question_id,
            Utc::now().timestamp_millis(),
            original_name.as_deref(),
        );
        tokio::fs::create_dir_all(&config.upload_dir).await?;
        tokio::fs::write(config.upload_dir.join(&file_name), &data)
            .await
            .map_err(|e| {
                tracing::error!("Failed to write recording {}: {:?}", file_name, e);
                AppError::from(e)
            })?;
        submission.response_data = Some(file_name);
    }

    let id = responses.store(&submission).await?;

    Ok(Json(ResponseAck {
        ok: true,
        id,
        stored: submission.response_data,
    }))
}

/// Client timings arrive as form text and may be fractional.
fn parse_millis(raw: &str) -> Option<i64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|ms| ms.is_finite() && *ms >= 0.0)
        .map(|ms| ms.round() as i64)
}
