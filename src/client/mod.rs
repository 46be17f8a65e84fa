// src/client/mod.rs

//! Test-taker side of the protocol: polls the server once a second, keeps a
//! local countdown in step with it and submits each question exactly once.

pub mod api;
pub mod reconciler;
pub mod timer;

pub use api::{ClientError, HttpSessionApi, SessionApi};
pub use reconciler::{ClientCommand, Reconciler, RunSummary};
pub use timer::{AdvanceReason, TimerView};
