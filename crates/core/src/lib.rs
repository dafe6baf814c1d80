//! Rollcall Core — roster models, configuration, persisted caches and the
//! student-information roster source.

pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod roster;
