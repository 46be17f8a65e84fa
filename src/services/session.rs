// src/services/session.rs

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    catalog::Catalog,
    engine::{self, Remaining, Transition},
    error::AppError,
    models::session::{ExpectedPosition, SessionRecord},
    store::{SessionHandle, SessionStore, session_store::poisoned},
    utils::clock::Clock,
};

/// Snapshot returned by `SessionService::status`.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub record: SessionRecord,
    pub remaining: Remaining,
    pub now: DateTime<Utc>,
}

/// Result of `SessionService::advance_session`.
#[derive(Debug, Clone)]
pub struct AdvanceOutcome {
    pub record: SessionRecord,
    /// `None` when the request was a duplicate and nothing was applied.
    pub transition: Option<Transition>,
}

/// Creates sessions, serves their status and applies advances.
///
/// Every mutation of a stored record goes through `advance_session`, which
/// holds that record's write lock while computing and storing the next state.
#[derive(Debug, Clone)]
pub struct SessionService {
    store: Arc<SessionStore>,
    catalog: Arc<Catalog>,
    clock: Clock,
}

impl SessionService {
    pub fn new(store: Arc<SessionStore>, catalog: Arc<Catalog>, clock: Clock) -> Self {
        Self {
            store,
            catalog,
            clock,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn create_session(&self) -> Result<SessionRecord, AppError> {
        let record = SessionRecord::new(Uuid::new_v4(), self.clock.now());
        self.store.insert(record.clone())?;
        tracing::info!("Session {} started", record.id);
        Ok(record)
    }

    /// Pure read: remaining section and total seconds as of now.
    pub fn status(&self, id: &str) -> Result<SessionStatus, AppError> {
        let handle = self.lookup(id)?;
        let record = handle.read().map_err(poisoned)?.clone();
        let now = self.clock.now();
        let remaining = engine::deadline::remaining(&record, &self.catalog, now);

        Ok(SessionStatus {
            record,
            remaining,
            now,
        })
    }

    /// Applies at most one transition.
    ///
    /// A non-empty `expected` position that no longer matches the stored
    /// record marks the call as a duplicate of an advance that already
    /// happened; the current state is returned unchanged.
    pub fn advance_session(
        &self,
        id: &str,
        expected: &ExpectedPosition,
    ) -> Result<AdvanceOutcome, AppError> {
        let handle = self.lookup(id)?;
        let mut record = handle.write().map_err(poisoned)?;

        if record.completed {
            return Err(AppError::InvalidState(format!(
                "Session {} already completed",
                record.id
            )));
        }

        if !record.is_at(&self.catalog, expected) {
            tracing::warn!(
                "Duplicate advance for session {} from {:?}; now at {}/{}",
                record.id,
                expected,
                record.section_key(&self.catalog),
                record.question_index
            );
            return Ok(AdvanceOutcome {
                record: record.clone(),
                transition: None,
            });
        }

        let now = self.clock.now();
        let (next, transition) = engine::advance(&record, &self.catalog, now)?;
        *record = next;

        match transition {
            Transition::NextQuestion => tracing::debug!(
                "Session {} at {}/{}",
                record.id,
                record.section_key(&self.catalog),
                record.question_index
            ),
            Transition::NextSection => tracing::info!(
                "Session {} entered section {}",
                record.id,
                record.section_key(&self.catalog)
            ),
            Transition::Completed => tracing::info!("Session {} completed", record.id),
        }

        Ok(AdvanceOutcome {
            record: record.clone(),
            transition: Some(transition),
        })
    }

    /// Removes sessions that are finished (completed or out of total time)
    /// and have been for longer than `retention`.
    pub fn sweep(&self, retention: Duration) -> Result<usize, AppError> {
        let now = self.clock.now();
        let total = Duration::seconds(self.catalog.total_seconds().min(u64::from(u32::MAX)) as i64);

        let removed = self.store.remove_where(|record| {
            let finished_at = record
                .completed_at
                .unwrap_or(record.test_started_at + total);
            now - finished_at > retention
        })?;

        if removed > 0 {
            tracing::info!("Swept {} finished sessions", removed);
        }
        Ok(removed)
    }

    fn lookup(&self, id: &str) -> Result<SessionHandle, AppError> {
        let not_found = || AppError::NotFound("Session not found".to_string());
        let id = Uuid::parse_str(id.trim()).map_err(|_| not_found())?;
        self.store.get(&id)?.ok_or_else(not_found)
    }
}
