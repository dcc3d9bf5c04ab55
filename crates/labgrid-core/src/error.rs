//! Typed errors at the public seams of the engine.
//!
//! Internal glue code (the worker loop, monitoring routines) uses
//! `anyhow::Result` with `.context(...)`; these types are reserved for the
//! handful of synchronous contracts callers are expected to match on.

use thiserror::Error;

/// Errors returned synchronously from [`crate::framework::Framework::run_experiment`].
#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error("experiment type '{0}' is not registered")]
    TypeUnknown(String),
    #[error("invalid experiment config: {0}")]
    ConfigInvalid(String),
    #[error("task queue is full")]
    QueueFull,
    #[error("framework has not been started")]
    NotStarted,
}
