//! Core data model.
//!
//! A message is the unit of work: a user message goes in, an assistant
//! message comes out. Messages carry no identity — the engine tracks them
//! only by FIFO position in the request queue, and completion order is
//! unrelated to submission order.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        write!(f, "{s}")
    }
}

/// A single message flowing through the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,

    /// The message text. Opaque to the engine.
    pub content: String,

    /// Optional identifier of the producer (e.g., the invoker's name).
    /// Useful when multiple invokers feed the same consumer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    /// A user message — what callers submit.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            name: None,
        }
    }

    /// An assistant message — what invokers return.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Engine lifecycle state. Transitions are irreversible:
/// `Open -> Draining` on cancellation or close, `Draining -> Closed` once
/// the shutdown sequence completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Accepting submissions.
    Open,
    /// No new admissions; in-flight executions finishing.
    Draining,
    /// Shutdown complete. Terminal.
    Closed,
}

impl Lifecycle {
    /// Only `Open` admits new work.
    pub fn is_open(self) -> bool {
        matches!(self, Lifecycle::Open)
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Lifecycle::Open => "open",
            Lifecycle::Draining => "draining",
            Lifecycle::Closed => "closed",
        };
        write!(f, "{s}")
    }
}
