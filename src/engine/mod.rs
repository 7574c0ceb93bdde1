//! Concurrent execution engine: bounded admission, fan-out dispatch, ordered shutdown.

pub mod channel;
pub mod dispatch;

pub use channel::{Engine, EngineConfig};
