use std::sync::Arc;

use axum::extract::FromRef;

use crate::{config::Config, services::SessionService, store::ResponseStore};

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionService,
    pub responses: Arc<dyn ResponseStore>,
    pub config: Config,
}

impl FromRef<AppState> for SessionService {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl FromRef<AppState> for Arc<dyn ResponseStore> {
    fn from_ref(state: &AppState) -> Self {
        state.responses.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
