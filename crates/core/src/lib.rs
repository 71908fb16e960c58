//! Pure domain logic for script executions.
//!
//! Nothing in this crate touches the database, the cluster, or the clock
//! implicitly: callers pass `now` and configuration in explicitly.

pub mod error;
pub mod execution;
pub mod reconcile;
pub mod types;
pub mod validation;
