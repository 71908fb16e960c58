//! Kubernetes job backend.
//!
//! Provides the [`backend::JobBackend`] seam the execution engine talks to,
//! a thin REST client for the `batch/v1` Jobs API, and the manifest types
//! used to submit shell scripts as single-attempt Jobs.

pub mod api;
pub mod backend;
pub mod config;
pub mod manifest;
