//! Waypost Core — transport-agnostic domain logic for the Waypost
//! multi-agent execution platform.
//!
//! This crate contains the pathway model, the durable run state store
//! (the Pouch, over SQLite), capability resolution against local
//! practices and the Plaza agent directory, and the Pathfinder engine
//! that walks a pathway and checkpoints every step so a run survives a
//! crash and resumes where it left off.
//!
//! It has no HTTP framework dependency, making it suitable for use in
//! servers, CLI tools, or embedded agents.

pub mod db;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pathfinder;
pub mod plaza;
pub mod practice;
pub mod store;

// Convenience re-exports
pub use db::Database;
pub use error::EngineError;
pub use pathfinder::Pathfinder;
pub use store::Pouch;
