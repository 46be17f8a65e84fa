// src/utils/clock.rs

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};

/// Source of "now" for the session service.
///
/// `Manual` clocks are shared between clones, so a test can hold one handle
/// and move time forward for a service that owns another.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    #[default]
    System,
    Manual(Arc<RwLock<DateTime<Utc>>>),
}

impl Clock {
    /// Returns a clock frozen at `at` until moved by `set` or `advance`.
    pub fn manual(at: DateTime<Utc>) -> Self {
        Self::Manual(Arc::new(RwLock::new(at)))
    }

    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Manual(at) => match at.read() {
                Ok(at) => *at,
                Err(poisoned) => *poisoned.into_inner(),
            },
        }
    }

    /// Has no effect on `Clock::System`.
    pub fn set(&self, to: DateTime<Utc>) {
        if let Clock::Manual(at) = self {
            match at.write() {
                Ok(mut at) => *at = to,
                Err(poisoned) => *poisoned.into_inner() = to,
            }
        }
    }

    /// Has no effect on `Clock::System`.
    pub fn advance(&self, delta: Duration) {
        let next = self.now() + delta;
        self.set(next);
    }
}
