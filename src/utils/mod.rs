// src/utils/mod.rs

pub mod clock;
pub mod filename;
