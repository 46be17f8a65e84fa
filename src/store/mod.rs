// src/store/mod.rs

pub mod response_store;
pub mod session_store;

pub use response_store::{ResponseStore, SqliteResponseStore};
pub use session_store::{SessionHandle, SessionStore};
