//! Roster and directory records shared across crates.

pub mod class_group;
pub mod identity;
pub mod section;
