//! # agentflow
//!
//! Concurrent message-execution engine for LLM agents.
//!
//! Wraps a slow, fallible invocation (an LLM call via rig-core) into an
//! asynchronous many-in-flight engine: non-blocking bounded admission,
//! best-effort delivery over bounded response/error streams, and ordered,
//! idempotent shutdown.

pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod model;
pub mod telemetry;
