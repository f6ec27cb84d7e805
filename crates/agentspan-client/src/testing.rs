//! Scripted in-memory transports for exercising the client surface
//! without a backend.
//!
//! A script is an ordered list of [`ScriptStep`]s: messages to emit,
//! errors to surface, and hook events to fire through whatever hooks
//! the caller registered in its options.

use async_stream::stream;
use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::hooks::{HookEvent, HookMap, HookPayload, dispatch_hooks};
use crate::message::AgentMessage;
use crate::options::AgentOptions;
use crate::transport::{AgentTransport, MessageStream, SessionTransport};

/// One step of a scripted invocation.
pub enum ScriptStep {
    /// Yield a message to the consumer.
    Emit(AgentMessage),
    /// Yield an error; the stream ends afterwards.
    EmitErr(AgentError),
    /// Fire a hook event through the registered hooks before continuing.
    Hook {
        event: HookEvent,
        payload: HookPayload,
        tool_use_id: Option<String>,
    },
}

impl ScriptStep {
    pub fn hook(event: HookEvent, payload: HookPayload, tool_use_id: Option<&str>) -> Self {
        ScriptStep::Hook {
            event,
            payload,
            tool_use_id: tool_use_id.map(str::to_owned),
        }
    }
}

fn play_script(steps: Vec<ScriptStep>, hooks: HookMap) -> MessageStream {
    Box::pin(stream! {
        for step in steps {
            match step {
                ScriptStep::Emit(message) => yield Ok(message),
                ScriptStep::EmitErr(err) => {
                    yield Err(err);
                    return;
                }
                ScriptStep::Hook { event, payload, tool_use_id } => {
                    dispatch_hooks(&hooks, event, &payload, tool_use_id.as_deref()).await;
                }
            }
        }
    })
}

/// One-shot transport that answers each `query` with the next script.
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Vec<ScriptStep>>>,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<Vec<ScriptStep>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
        }
    }

    /// Transport that answers exactly one query.
    pub fn single(script: Vec<ScriptStep>) -> Self {
        Self::new(vec![script])
    }
}

#[async_trait]
impl AgentTransport for ScriptedTransport {
    async fn query(&self, _prompt: String, options: AgentOptions) -> Result<MessageStream> {
        let steps = self
            .scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| AgentError::transport_error("no scripted response left"))?;
        Ok(play_script(steps, options.hooks))
    }
}

/// Session transport that answers each turn with the next script.
///
/// Hooks are captured from the options passed to `send_query`, matching
/// how a real session applies the options registered at query time.
pub struct ScriptedSession {
    turns: VecDeque<Vec<ScriptStep>>,
    hooks: Option<HookMap>,
    prompts: Vec<String>,
    connected: bool,
}

impl ScriptedSession {
    pub fn new(turns: Vec<Vec<ScriptStep>>) -> Self {
        Self {
            turns: turns.into(),
            hooks: None,
            prompts: Vec::new(),
            connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

#[async_trait]
impl SessionTransport for ScriptedSession {
    async fn connect(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    async fn send_query(&mut self, prompt: String, options: &AgentOptions) -> Result<()> {
        if !self.connected {
            return Err(AgentError::Connection("session not connected".into()));
        }
        self.prompts.push(prompt);
        self.hooks = Some(options.hooks.clone());
        Ok(())
    }

    async fn receive_response(&mut self) -> Result<MessageStream> {
        let steps = self
            .turns
            .pop_front()
            .ok_or_else(|| AgentError::transport_error("no scripted turn left"))?;
        let hooks = self.hooks.clone().unwrap_or_default();
        Ok(play_script(steps, hooks))
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }
}
