//! Bulk matching job engine.
//!
//! Scores every (candidate, job posting) pair in a submitted selection
//! against an external scoring service, tracking progress and isolating
//! per-pair failures. Jobs move through a pending/processing lifecycle to a
//! terminal completed, failed or cancelled state, with an aggregate summary
//! attached at the end.

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod models;
pub mod notify;
pub mod scorer;
pub mod store;
