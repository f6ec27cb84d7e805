use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;

use crate::error::Result;
use crate::message::AgentMessage;
use crate::options::AgentOptions;

/// Stream of messages produced by one invocation.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<AgentMessage>> + Send>>;

/// One-shot query transport: each call is a complete invocation.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn query(&self, prompt: String, options: AgentOptions) -> Result<MessageStream>;
}

/// Bidirectional session transport driven by [`SessionClient`].
///
/// `send_query` submits a prompt on the open session; the matching
/// response arrives through the next `receive_response` stream.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn connect(&mut self) -> Result<()>;
    async fn send_query(&mut self, prompt: String, options: &AgentOptions) -> Result<()>;
    async fn receive_response(&mut self) -> Result<MessageStream>;
    async fn disconnect(&mut self) -> Result<()>;
}

/// Multi-turn client owning a session transport and the options every
/// turn is sent with.
pub struct SessionClient {
    transport: Box<dyn SessionTransport>,
    options: AgentOptions,
}

impl SessionClient {
    pub fn new(transport: Box<dyn SessionTransport>, options: AgentOptions) -> Self {
        Self { transport, options }
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut AgentOptions {
        &mut self.options
    }

    pub async fn connect(&mut self) -> Result<()> {
        self.transport.connect().await
    }

    pub async fn query(&mut self, prompt: impl Into<String> + Send) -> Result<()> {
        self.transport.send_query(prompt.into(), &self.options).await
    }

    pub async fn receive_response(&mut self) -> Result<MessageStream> {
        self.transport.receive_response().await
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        self.transport.disconnect().await
    }
}
