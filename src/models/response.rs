// src/models/response.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// One answer submission as received from the test page.
///
/// Typed answers may be submitted on every keystroke; spoken answers arrive
/// once, with the recording stored on disk and only its file name kept here.
#[derive(Debug, Clone, Default, Validate)]
pub struct ResponseSubmission {
    #[validate(length(min = 1, max = 64))]
    pub user_id: String,

    #[validate(length(min = 1, max = 32))]
    pub section: String,

    #[validate(length(min = 1, max = 64))]
    pub question_id: String,

    /// 'audio' or 'text'.
    #[validate(custom(function = validate_response_type))]
    pub response_type: String,

    /// Text answer, or the stored audio file name.
    #[validate(length(max = 100000))]
    pub response_data: Option<String>,

    /// Milliseconds between rendering the question and submitting.
    pub time_taken_ms: Option<i64>,

    pub auto_submitted: bool,
}

fn validate_response_type(response_type: &str) -> Result<(), validator::ValidationError> {
    match response_type {
        "audio" | "text" => Ok(()),
        _ => Err(validator::ValidationError::new("invalid_response_type")),
    }
}

/// Represents the 'responses' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StoredResponse {
    pub id: i64,
    pub user_id: String,
    pub section: String,
    pub question_id: String,
    pub response_type: String,
    pub response_data: Option<String>,
    pub time_taken_ms: Option<i64>,
    pub auto_submitted: bool,
    pub created_at: Option<chrono::NaiveDateTime>,
}

/// Acknowledgement of `POST /api/response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseAck {
    pub ok: bool,
    /// Row id of the stored response.
    pub id: i64,
    /// Stored file name for audio, the text otherwise.
    pub stored: Option<String>,
}
