use crate::hooks::HookMap;

/// Request options for an invocation.
#[derive(Clone, Default)]
pub struct AgentOptions {
    /// Model to request; the backend picks a default when unset.
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub max_turns: Option<u32>,
    /// Hook callbacks fired around tool execution and turn boundaries.
    pub hooks: HookMap,
}

impl AgentOptions {
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for AgentOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOptions")
            .field("model", &self.model)
            .field("system_prompt", &self.system_prompt)
            .field("max_turns", &self.max_turns)
            .field("hook_events", &self.hooks.len())
            .finish()
    }
}
