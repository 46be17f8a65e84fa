// src/engine/progression.rs

use chrono::{DateTime, Utc};

use crate::{catalog::Catalog, error::AppError, models::session::SessionRecord};

/// Which of the three transitions an advance applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    NextQuestion,
    NextSection,
    Completed,
}

/// Computes the record that follows `session`.
///
/// `now` is captured once by the caller and only stamps the new
/// `section_started_at` or `completed_at`. The input record is never
/// modified, so a failed call leaves the stored session untouched.
pub fn advance(
    session: &SessionRecord,
    catalog: &Catalog,
    now: DateTime<Utc>,
) -> Result<(SessionRecord, Transition), AppError> {
    if session.completed {
        return Err(AppError::InvalidState(
            "Session already completed".to_string(),
        ));
    }

    let section = catalog.section(session.section_index).ok_or_else(|| {
        AppError::InvalidState(format!(
            "Section index {} outside catalog of {} sections",
            session.section_index,
            catalog.len()
        ))
    })?;

    if session.question_index >= section.question_count() {
        return Err(AppError::InvalidState(format!(
            "Question index {} outside section '{}' of {} questions",
            session.question_index,
            section.key,
            section.question_count()
        )));
    }

    let mut next = session.clone();

    let transition = if session.question_index + 1 < section.question_count() {
        next.question_index += 1;
        Transition::NextQuestion
    } else if session.section_index + 1 < catalog.len() {
        next.section_index += 1;
        next.question_index = 0;
        // Anchors never move backwards, even if the wall clock does.
        next.section_started_at = now.max(session.section_started_at);
        Transition::NextSection
    } else {
        next.completed = true;
        next.completed_at = Some(now.max(session.section_started_at));
        Transition::Completed
    };

    Ok((next, transition))
}
