// src/handlers/mod.rs

pub mod response;
pub mod session;
