//! Decorator for the multi-turn session client.

use agentspan_client::{HookEvent, MessageStream, Result, SessionClient};
use agentspan_telemetry::set_error_attributes;

use crate::context::ContextSlot;
use crate::hooks::merge_hooks;
use crate::instrument::Instrumentor;

/// Session client wrapper producing one `invoke_agent` span per turn.
///
/// Instrumentation hooks are merged into the client's options once, at
/// wrap time, bound to this client's slot. `query` opens the turn's
/// span; the stream from the matching `receive_response` closes it.
pub struct InstrumentedSessionClient {
    inner: SessionClient,
    turn: TurnGuard,
    // Events that got an instrumentation matcher appended; only these
    // are touched when the client is unwrapped.
    instrumented_events: Vec<HookEvent>,
}

/// Closes out a pending turn when the client is dropped without a
/// matching `receive_response` or `disconnect`. Teardown is idempotent,
/// so the guard is a no-op when the turn already finished.
struct TurnGuard {
    instrumentor: Instrumentor,
    slot: ContextSlot,
}

impl TurnGuard {
    fn teardown(&self, error_type: Option<&str>) {
        self.instrumentor.teardown(&self.slot, error_type);
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.teardown(None);
    }
}

impl InstrumentedSessionClient {
    pub(crate) fn new(instrumentor: Instrumentor, mut inner: SessionClient) -> Self {
        let slot = ContextSlot::new();
        let instrumentation = instrumentor.instrumentation_hooks(&slot);
        let instrumented_events: Vec<HookEvent> = instrumentation.keys().copied().collect();
        let user_hooks = std::mem::take(&mut inner.options_mut().hooks);
        inner.options_mut().hooks = merge_hooks(user_hooks, instrumentation);
        Self {
            inner,
            turn: TurnGuard { instrumentor, slot },
            instrumented_events,
        }
    }

    /// Unwrap the decorator, restoring the original client. Only the
    /// appended instrumentation matchers are removed from its options;
    /// user hooks stay, including ones for events this layer never
    /// instruments.
    pub fn into_inner(self) -> SessionClient {
        let Self {
            mut inner,
            turn,
            instrumented_events,
        } = self;
        let options = inner.options_mut();
        for event in &instrumented_events {
            if let Some(matchers) = options.hooks.get_mut(event) {
                matchers.pop();
            }
        }
        options.hooks.retain(|_, matchers| !matchers.is_empty());
        drop(turn);
        inner
    }

    pub fn options(&self) -> &agentspan_client::AgentOptions {
        self.inner.options()
    }

    pub async fn connect(&mut self) -> Result<()> {
        self.inner.connect().await
    }

    /// Send a prompt, opening the invocation span for this turn. A turn
    /// already in flight is torn down first.
    pub async fn query(&mut self, prompt: impl Into<String> + Send) -> Result<()> {
        self.turn.teardown(None);

        let request_model = self.inner.options().model.clone();
        self.turn.instrumentor.start_invocation(
            &self.turn.slot,
            request_model.as_deref(),
            Some(self.inner.options()),
        );

        match self.inner.query(prompt).await {
            Ok(()) => Ok(()),
            Err(err) => {
                // The response stream will never arrive; close the span now.
                self.turn
                    .slot
                    .with(|ctx| set_error_attributes(&ctx.root_span(), &err));
                self.turn.teardown(Some(err.error_type()));
                Err(err)
            }
        }
    }

    /// Receive the response stream for the pending turn. Without a
    /// pending instrumented turn the inner stream passes through
    /// untouched.
    pub async fn receive_response(&mut self) -> Result<MessageStream> {
        let stream = self.inner.receive_response().await?;
        if self.turn.slot.is_empty() {
            return Ok(stream);
        }
        Ok(self
            .turn
            .instrumentor
            .instrumented_stream(stream, self.turn.slot.clone()))
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        // A turn abandoned before its stream was drained still gets
        // closed out.
        self.turn.teardown(None);
        self.inner.disconnect().await
    }
}
