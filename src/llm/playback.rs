//! Scripted invoker for integration tests.
//!
//! Two modes, checked in order:
//! 1. Trigger matching — replies recorded via [`Playback::record`] are
//!    returned when the request content contains their trigger phrase.
//! 2. Sequential playback — replies loaded via [`Playback::load`] are
//!    returned in order. Once the sequence is exhausted, an exhaustion
//!    notice is returned that counts how far past the end the test ran.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;
use crate::llm::Invoker;
use crate::model::Message;

#[derive(Default)]
struct Script {
    /// Trigger phrase -> canned reply.
    responses: Vec<(String, String)>,
    /// Ordered reply sequence.
    queue: VecDeque<String>,
    /// Reads past the end of the sequence.
    overage: u32,
}

/// Scripted invoker that plays back recorded replies.
pub struct Playback {
    name: String,
    script: Mutex<Script>,
}

impl Playback {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(Script::default()),
        }
    }

    /// Record a trigger -> reply pair. Triggers match by substring.
    pub fn record(&self, trigger: impl Into<String>, reply: impl Into<String>) {
        let mut script = self.lock();
        script.responses.push((trigger.into(), reply.into()));
    }

    /// Load an ordered reply sequence, resetting playback position.
    pub fn load<I, S>(&self, replies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut script = self.lock();
        script.queue = replies.into_iter().map(Into::into).collect();
        script.overage = 0;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Invoker for Playback {
    async fn invoke(&self, _cancel: &CancellationToken, request: Message) -> Result<Message> {
        let mut script = self.lock();

        // Trigger match takes priority over sequential playback.
        if let Some((trigger, reply)) = script
            .responses
            .iter()
            .find(|(trigger, _)| request.content.contains(trigger))
        {
            debug!(name = %self.name, %trigger, "trigger matched");
            let reply = reply.clone();
            return Ok(Message::assistant(reply).named(&self.name));
        }

        match script.queue.pop_front() {
            Some(reply) => Ok(Message::assistant(reply).named(&self.name)),
            None => {
                script.overage += 1;
                debug!(name = %self.name, overage = script.overage, "playback exhausted");
                Ok(Message::assistant(format!(
                    "MESSAGES EXHAUSTED ({} overage)",
                    script.overage
                ))
                .named(&self.name))
            }
        }
    }
}
