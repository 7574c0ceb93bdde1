//! Echo invoker for tests and development.
//!
//! Returns the request content unchanged, with predictable behavior and no
//! external dependencies. A `***FIXED_RESPONSE <text>` request pins the
//! reply for all subsequent invocations. An optional artificial delay
//! simulates model latency for concurrency tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;
use crate::llm::Invoker;
use crate::model::Message;

/// Prefix that pins a fixed response for all subsequent calls.
pub const FIXED_RESPONSE_PREFIX: &str = "***FIXED_RESPONSE";

/// Deterministic echo invoker.
pub struct Passthrough {
    name: String,
    delay: Duration,
    fixed_response: Mutex<Option<String>>,
}

impl Passthrough {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delay: Duration::ZERO,
            fixed_response: Mutex::new(None),
        }
    }

    /// Sleep this long before answering. Simulates model latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Invoker for Passthrough {
    async fn invoke(&self, _cancel: &CancellationToken, request: Message) -> Result<Message> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(rest) = request.content.strip_prefix(FIXED_RESPONSE_PREFIX) {
            let fixed = rest.trim().to_string();
            debug!(name = %self.name, response = %fixed, "fixed response set");
            let mut guard = self
                .fixed_response
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = Some(fixed.clone());
            return Ok(Message::assistant(fixed).named(&self.name));
        }

        let fixed = {
            let guard = self
                .fixed_response
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.clone()
        };

        let content = fixed.unwrap_or(request.content);
        Ok(Message::assistant(content).named(&self.name))
    }
}
