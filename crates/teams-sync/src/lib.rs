//! Rollcall Teams sync: mirrors roster sections into Microsoft Graph education
//! classes and keeps the faculty and student groups in step.
//!
//! The [`sync::ReconcileEngine`] drives a run against any [`directory::Directory`];
//! [`gateway::DirectoryGateway`] is the Graph-backed implementation.

pub mod anomaly;
pub mod auth;
pub mod client;
pub mod diff;
pub mod directory;
pub mod gateway;
pub mod identity;
pub mod models;
pub mod retry;
pub mod sync;
