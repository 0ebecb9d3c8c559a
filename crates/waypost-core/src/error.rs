//! Core error type for the Waypost engine.
//!
//! `EngineError` is used throughout the core domain (stores, resolver,
//! step executor, Pathfinder). Variants carry human-readable detail that
//! also ends up in persisted `status_msg` fields.

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
