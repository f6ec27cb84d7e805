//! Client surface for the conversational-agent SDK
//!
//! This crate defines the call signatures the instrumentation layer
//! decorates: message and usage types, agent options, the hook system,
//! and the transport traits. The scripted transports in [`testing`]
//! stand in for the real backend.

pub mod error;
pub mod hooks;
pub mod message;
pub mod options;
pub mod testing;
pub mod transport;

// Re-exports
pub use error::{AgentError, Result};
pub use hooks::{
    HookCallback, HookContext, HookEvent, HookMap, HookMatcher, HookOutput, HookPayload,
    dispatch_hooks,
};
pub use message::{AgentMessage, ResultMessage, Usage};
pub use options::AgentOptions;
pub use transport::{AgentTransport, MessageStream, SessionClient, SessionTransport};
