//! Error types for agentflow.
//!
//! Admission errors (`QueueFull`, `Closed`) are returned directly from
//! [`Engine::submit`]. Execution errors (`Invocation`, `DeliveryContended`,
//! `Abandoned`) are delivered on the engine's error stream.
//!
//! [`Engine::submit`]: crate::engine::Engine::submit

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The bounded request queue is full. The caller may retry later.
    #[error("request queue full")]
    QueueFull,

    /// The engine is draining or closed. Permanent; the caller must not retry.
    #[error("engine is closed")]
    Closed,

    /// The invocation unit returned an error.
    #[error("invocation failed: {0}")]
    Invocation(String),

    /// A successful result could not be placed on the full response stream.
    /// Degraded delivery, not a processing failure.
    #[error("response stream full, result dropped")]
    DeliveryContended,

    /// An execution observed cancellation before invoking and abandoned
    /// its work item without calling the invocation unit.
    #[error("execution abandoned: engine shutting down")]
    Abandoned,

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
