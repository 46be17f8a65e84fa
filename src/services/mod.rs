// src/services/mod.rs

pub mod session;

pub use session::{AdvanceOutcome, SessionService, SessionStatus};
