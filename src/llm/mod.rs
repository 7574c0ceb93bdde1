//! Invocation units: the synchronous, fallible calls the engine wraps.
//!
//! The [`Invoker`] trait is the engine's only view of an LLM. The production
//! implementation ([`AnthropicInvoker`]) goes through rig-core; the
//! [`passthrough`] and [`playback`] invokers provide deterministic behavior
//! for tests and development without API calls.

pub mod passthrough;
pub mod playback;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::model::Message;

/// A single request-to-response invocation, typically a remote model call.
///
/// Implementations must honor `cancel` on a best-effort basis and may take
/// arbitrary wall-clock time. They must not spawn background work that
/// outlives the call.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, cancel: &CancellationToken, request: Message) -> Result<Message>;
}

/// Create an Anthropic client from a secret API key.
///
/// # Errors
/// Returns an error if the underlying HTTP client cannot be constructed.
pub fn anthropic_client(
    api_key: &SecretString,
) -> std::result::Result<rig::providers::anthropic::Client, rig::http_client::Error> {
    rig::providers::anthropic::Client::new(api_key.expose_secret())
}

/// Production invoker: a rig agent over an Anthropic completion model.
pub struct AnthropicInvoker {
    agent: rig::agent::Agent<rig::providers::anthropic::completion::CompletionModel>,
}

impl AnthropicInvoker {
    /// Build an invoker for `model` with `instruction` as the system preamble.
    pub fn new(
        client: &rig::providers::anthropic::Client,
        model: &str,
        instruction: &str,
    ) -> Self {
        let agent = client.agent(model).preamble(instruction).build();
        Self { agent }
    }
}

#[async_trait]
impl Invoker for AnthropicInvoker {
    async fn invoke(&self, cancel: &CancellationToken, request: Message) -> Result<Message> {
        // Cancellation races the completion. rig has no first-class abort,
        // so a cancelled call is dropped mid-flight rather than interrupted.
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Abandoned),
            reply = self.agent.prompt(request.content) => match reply {
                Ok(text) => Ok(Message::assistant(text)),
                Err(e) => Err(Error::Invocation(e.to_string())),
            },
        }
    }
}
