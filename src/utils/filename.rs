// src/utils/filename.rs

use std::path::Path;

const DEFAULT_AUDIO_EXTENSION: &str = ".webm";

/// Keeps only `[A-Za-z0-9_-]`, so client-supplied ids cannot escape the
/// upload directory or collide with the `_` separators in unexpected ways.
pub fn sanitize_component(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(64)
        .collect();

    if cleaned.is_empty() {
        "anonymous".to_string()
    } else {
        cleaned
    }
}

/// Extension of the uploaded file name (with the leading dot), defaulting to
/// `.webm` for recordings sent without one.
pub fn upload_extension(original_name: Option<&str>) -> String {
    original_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_else(|| DEFAULT_AUDIO_EXTENSION.to_string())
}

/// `{user}_{section}_{question}_{millis}{ext}`
pub fn recording_file_name(
    user_id: &str,
    section: &str,
    question_id: &str,
    millis: i64,
    original_name: Option<&str>,
) -> String {
    format!(
        "{}_{}_{}_{}{}",
        sanitize_component(user_id),
        sanitize_component(section),
        sanitize_component(question_id),
        millis,
        upload_extension(original_name)
    )
}
