// src/engine/mod.rs

//! Pure session timing logic: the progression state machine and the
//! deadline calculator. Nothing here reads the clock or touches storage.

pub mod deadline;
pub mod progression;

pub use deadline::Remaining;
pub use progression::{Transition, advance};
