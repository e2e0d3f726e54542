//! Guided onboarding: a tutorial orchestration engine.
//!
//! A catalog of step-by-step tutorials, per-track sequencing, progressive
//! access control, route synchronization and persisted progress.

pub mod access;
pub mod config;
pub mod engine;
pub mod error;
pub mod persistence;
pub mod progress;
pub mod routes;
pub mod sync;
pub mod tutorial;
