//! Hook system fired around tool execution and turn boundaries.
//!
//! Hooks are async callbacks registered per event in [`AgentOptions`].
//! The transport invokes them in registration order on the same task
//! that drives the message stream.

use futures::future::BoxFuture;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

/// Lifecycle events a hook can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    PreToolUse,
    PostToolUse,
    PostToolUseFailure,
    Stop,
    SubagentStop,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::PreToolUse => "PreToolUse",
            HookEvent::PostToolUse => "PostToolUse",
            HookEvent::PostToolUseFailure => "PostToolUseFailure",
            HookEvent::Stop => "Stop",
            HookEvent::SubagentStop => "SubagentStop",
        }
    }
}

/// Raw JSON payload delivered with a hook event.
///
/// The backend ships hook input as loose JSON; accessors expose the
/// fields this layer cares about without committing to a schema.
#[derive(Debug, Clone, Default)]
pub struct HookPayload(Value);

impl HookPayload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn pre_tool_use(tool_name: &str, tool_input: Value) -> Self {
        Self(json!({ "tool_name": tool_name, "tool_input": tool_input }))
    }

    pub fn post_tool_use(tool_name: &str, tool_response: Value) -> Self {
        Self(json!({ "tool_name": tool_name, "tool_response": tool_response }))
    }

    pub fn post_tool_use_failure(tool_name: &str, error: &str) -> Self {
        Self(json!({ "tool_name": tool_name, "error": error }))
    }

    pub fn stop() -> Self {
        Self(json!({}))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.get("tool_name").and_then(Value::as_str)
    }

    pub fn tool_input(&self) -> Option<&Value> {
        self.get("tool_input")
    }

    pub fn tool_response(&self) -> Option<&Value> {
        self.get("tool_response")
    }

    pub fn error(&self) -> Option<&str> {
        self.get("error").and_then(Value::as_str)
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Per-invocation context handle passed to hook callbacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct HookContext;

/// Verdict returned by a hook callback. Empty means "no opinion".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookOutput {
    pub decision: Option<String>,
    pub system_message: Option<String>,
}

/// Async hook callback: payload, optional tool-use id, context.
pub type HookCallback =
    Arc<dyn Fn(HookPayload, Option<String>, HookContext) -> BoxFuture<'static, HookOutput> + Send + Sync>;

/// A set of callbacks, optionally restricted to one tool name.
#[derive(Clone, Default)]
pub struct HookMatcher {
    /// Tool name this matcher applies to; `None` matches every tool.
    pub matcher: Option<String>,
    pub hooks: Vec<HookCallback>,
}

impl HookMatcher {
    pub fn for_all(hooks: Vec<HookCallback>) -> Self {
        Self { matcher: None, hooks }
    }

    pub fn for_tool(tool_name: impl Into<String>, hooks: Vec<HookCallback>) -> Self {
        Self {
            matcher: Some(tool_name.into()),
            hooks,
        }
    }

    fn matches(&self, tool_name: Option<&str>) -> bool {
        match (&self.matcher, tool_name) {
            (None, _) => true,
            (Some(m), Some(name)) => m == name,
            (Some(_), None) => false,
        }
    }
}

impl std::fmt::Debug for HookMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookMatcher")
            .field("matcher", &self.matcher)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Registered hooks, keyed by event.
pub type HookMap = HashMap<HookEvent, Vec<HookMatcher>>;

/// Fire every callback registered for `event`, in registration order.
///
/// Matchers restricted to a tool name are skipped when the payload names
/// a different tool. Outputs are collected in firing order.
pub async fn dispatch_hooks(
    hooks: &HookMap,
    event: HookEvent,
    payload: &HookPayload,
    tool_use_id: Option<&str>,
) -> Vec<HookOutput> {
    let mut outputs = Vec::new();
    let Some(matchers) = hooks.get(&event) else {
        return outputs;
    };
    for matcher in matchers {
        if !matcher.matches(payload.tool_name()) {
            continue;
        }
        for hook in &matcher.hooks {
            let output = hook(
                payload.clone(),
                tool_use_id.map(str::to_owned),
                HookContext,
            )
            .await;
            outputs.push(output);
        }
    }
    outputs
}
