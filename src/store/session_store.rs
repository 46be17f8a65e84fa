// src/store/session_store.rs

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use uuid::Uuid;

use crate::{error::AppError, models::session::SessionRecord};

/// Handle to one stored session. Readers share it; an advance holds the
/// write half for its whole read-compute-write.
pub type SessionHandle = Arc<RwLock<SessionRecord>>;

/// In-memory session table keyed by session id.
///
/// The table lock only guards lookups, inserts and sweeps; each record has
/// its own lock so one test-taker's advance never blocks another's poll.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

pub(crate) fn poisoned<T>(_: PoisonError<T>) -> AppError {
    AppError::InternalServerError("session lock poisoned".to_string())
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: SessionRecord) -> Result<SessionHandle, AppError> {
        let id = record.id;
        let handle = Arc::new(RwLock::new(record));
        self.sessions
            .write()
            .map_err(poisoned)?
            .insert(id, Arc::clone(&handle));
        Ok(handle)
    }

    pub fn get(&self, id: &Uuid) -> Result<Option<SessionHandle>, AppError> {
        Ok(self.sessions.read().map_err(poisoned)?.get(id).cloned())
    }

    pub fn len(&self) -> Result<usize, AppError> {
        Ok(self.sessions.read().map_err(poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, AppError> {
        Ok(self.len()? == 0)
    }

    /// Drops every session for which `expired` returns true and returns how
    /// many were removed. Sessions whose own lock is poisoned are dropped too.
    pub fn remove_where<F>(&self, mut expired: F) -> Result<usize, AppError>
    where
        F: FnMut(&SessionRecord) -> bool,
    {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let before = sessions.len();
        sessions.retain(|_, handle| match handle.read() {
            Ok(record) => !expired(&record),
            Err(_) => false,
        });
        Ok(before - sessions.len())
    }
}
