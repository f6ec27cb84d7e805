//! The instrumentor and the transport decorator.

use std::cell::Cell;
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::StreamExt;
use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::metrics::{Histogram, Meter};
use opentelemetry::KeyValue;

use agentspan_client::{
    AgentMessage, AgentOptions, AgentTransport, HookMap, MessageStream, Result,
};
use agentspan_telemetry::semconv::{
    GEN_AI_OPERATION_NAME, GEN_AI_PROVIDER_NAME, GEN_AI_REQUEST_MODEL, OPERATION_INVOKE_AGENT,
    SYSTEM_ANTHROPIC,
};
use agentspan_telemetry::{
    create_duration_histogram, create_invoke_agent_span, create_token_usage_histogram,
    record_duration, record_token_usage, set_error_attributes, set_response_model,
    set_result_attributes,
};

use crate::context::{ContextSlot, InvocationContext};
use crate::hooks::{build_instrumentation_hooks, merge_hooks};
use crate::session::InstrumentedSessionClient;

/// Instrumentation scope name used for the default tracer and meter.
pub const INSTRUMENTATION_NAME: &str = "agentspan";

/// Telemetry configuration shared by every decorator it produces.
#[derive(Clone)]
pub struct Instrumentor {
    pub(crate) tracer: Arc<BoxedTracer>,
    pub(crate) token_histogram: Histogram<u64>,
    pub(crate) duration_histogram: Histogram<f64>,
    pub(crate) capture_content: bool,
    pub(crate) agent_name: Option<String>,
}

impl Instrumentor {
    pub fn builder() -> InstrumentorBuilder {
        InstrumentorBuilder::new()
    }

    /// Wrap a one-shot transport.
    pub fn instrument(&self, inner: Arc<dyn AgentTransport>) -> InstrumentedTransport {
        InstrumentedTransport {
            inner,
            instrumentor: self.clone(),
        }
    }

    /// Wrap a session client, merging instrumentation hooks into its
    /// options once.
    pub fn instrument_session(
        &self,
        client: agentspan_client::SessionClient,
    ) -> InstrumentedSessionClient {
        InstrumentedSessionClient::new(self.clone(), client)
    }

    /// Escape hatch: the hook map the decorators register, bound to
    /// `slot`. Hosts that manage their own transport wiring can merge
    /// these into their options directly.
    pub fn instrumentation_hooks(&self, slot: &ContextSlot) -> HookMap {
        build_instrumentation_hooks(self.tracer.clone(), slot.clone(), self.capture_content)
    }

    pub(crate) fn start_invocation(
        &self,
        slot: &ContextSlot,
        request_model: Option<&str>,
        options: Option<&AgentOptions>,
    ) {
        let span = create_invoke_agent_span(
            &self.tracer,
            self.agent_name.as_deref(),
            request_model,
            options,
        );
        slot.install(InvocationContext::new(span, self.capture_content));
    }

    /// Metric attributes for one invocation. The request-model dimension
    /// uses the sticky model the context recorded, so both histogram
    /// observations of an invocation agree.
    pub(crate) fn metric_attributes(&self, model: Option<&str>) -> Vec<KeyValue> {
        let mut attrs = vec![
            KeyValue::new(GEN_AI_OPERATION_NAME, OPERATION_INVOKE_AGENT),
            KeyValue::new(GEN_AI_PROVIDER_NAME, SYSTEM_ANTHROPIC),
        ];
        if let Some(model) = model {
            attrs.push(KeyValue::new(GEN_AI_REQUEST_MODEL, model.to_string()));
        }
        attrs
    }

    /// Finish the invocation held in `slot`: record duration, repair any
    /// spans left open, end the root span, and empty the slot. Safe to
    /// call when the slot is already empty.
    pub(crate) fn teardown(&self, slot: &ContextSlot, error_type: Option<&str>) {
        let Some(mut ctx) = slot.take() else {
            return;
        };
        let seconds = ctx.start_time().elapsed().as_secs_f64();
        let attrs = self.metric_attributes(ctx.model());
        record_duration(&self.duration_histogram, seconds, &attrs, error_type);
        ctx.cleanup_unclosed_spans();
        ctx.end_root_span();
    }

    pub(crate) fn observe_message(&self, slot: &ContextSlot, message: &AgentMessage) {
        match message {
            AgentMessage::Assistant {
                model: Some(model), ..
            } => {
                slot.with(|ctx| {
                    ctx.set_model(model);
                    set_response_model(&ctx.root_span(), model);
                });
            }
            AgentMessage::Result(result) => {
                slot.with(|ctx| {
                    set_result_attributes(&ctx.root_span(), result);
                    if let Some(session_id) = &result.session_id {
                        ctx.set_session_id(session_id);
                    }
                    if let Some(usage) = &result.usage {
                        let attrs = self.metric_attributes(ctx.model());
                        record_token_usage(
                            &self.token_histogram,
                            usage.total_input_tokens(),
                            usage.output_tokens,
                            &attrs,
                        );
                    }
                });
            }
            _ => {}
        }
    }

    /// Forward `inner`, recording telemetry per item. The guard ties
    /// teardown to the generator's lifetime, so an abandoned stream still
    /// closes its spans and records its duration.
    pub(crate) fn instrumented_stream(
        &self,
        mut inner: MessageStream,
        slot: ContextSlot,
    ) -> MessageStream {
        let instrumentor = self.clone();
        Box::pin(stream! {
            let guard = TeardownGuard {
                instrumentor: instrumentor.clone(),
                slot: slot.clone(),
                error_type: Cell::new(None),
            };

            while let Some(item) = inner.next().await {
                match item {
                    Ok(message) => {
                        instrumentor.observe_message(&slot, &message);
                        yield Ok(message);
                    }
                    Err(err) => {
                        slot.with(|ctx| set_error_attributes(&ctx.root_span(), &err));
                        guard.error_type.set(Some(err.error_type()));
                        yield Err(err);
                        break;
                    }
                }
            }

            drop(guard);
        })
    }
}

struct TeardownGuard {
    instrumentor: Instrumentor,
    slot: ContextSlot,
    error_type: Cell<Option<&'static str>>,
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        self.instrumentor.teardown(&self.slot, self.error_type.get());
    }
}

/// Builder for [`Instrumentor`]. Without an explicit tracer or meter the
/// globally installed providers are used.
pub struct InstrumentorBuilder {
    tracer: Option<BoxedTracer>,
    meter: Option<Meter>,
    capture_content: bool,
    agent_name: Option<String>,
}

impl InstrumentorBuilder {
    pub fn new() -> Self {
        Self {
            tracer: None,
            meter: None,
            capture_content: false,
            agent_name: None,
        }
    }

    pub fn with_tracer(mut self, tracer: BoxedTracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn with_meter(mut self, meter: Meter) -> Self {
        self.meter = Some(meter);
        self
    }

    /// Record tool-call arguments and results on tool spans. Off by
    /// default: payloads may hold user content.
    pub fn with_capture_content(mut self, capture: bool) -> Self {
        self.capture_content = capture;
        self
    }

    /// Agent name recorded on root spans and appended to their name.
    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = Some(name.into());
        self
    }

    pub fn build(self) -> Instrumentor {
        let tracer = self
            .tracer
            .unwrap_or_else(|| global::tracer(INSTRUMENTATION_NAME));
        let meter = self
            .meter
            .unwrap_or_else(|| global::meter(INSTRUMENTATION_NAME));
        Instrumentor {
            tracer: Arc::new(tracer),
            token_histogram: create_token_usage_histogram(&meter),
            duration_histogram: create_duration_histogram(&meter),
            capture_content: self.capture_content,
            agent_name: self.agent_name,
        }
    }
}

impl Default for InstrumentorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decorator around a one-shot transport. Call signature is unchanged;
/// each `query` gets its own invocation span, context slot, and merged
/// hook map.
pub struct InstrumentedTransport {
    inner: Arc<dyn AgentTransport>,
    instrumentor: Instrumentor,
}

impl InstrumentedTransport {
    /// Unwrap the decorator, restoring the original transport.
    pub fn into_inner(self) -> Arc<dyn AgentTransport> {
        self.inner
    }

    pub fn inner(&self) -> &Arc<dyn AgentTransport> {
        &self.inner
    }
}

#[async_trait]
impl AgentTransport for InstrumentedTransport {
    async fn query(&self, prompt: String, mut options: AgentOptions) -> Result<MessageStream> {
        let slot = ContextSlot::new();
        let user_hooks = std::mem::take(&mut options.hooks);
        options.hooks = merge_hooks(user_hooks, self.instrumentor.instrumentation_hooks(&slot));

        let request_model = options.model.clone();
        self.instrumentor
            .start_invocation(&slot, request_model.as_deref(), Some(&options));

        match self.inner.query(prompt, options).await {
            Ok(stream) => Ok(self.instrumentor.instrumented_stream(stream, slot)),
            Err(err) => {
                slot.with(|ctx| set_error_attributes(&ctx.root_span(), &err));
                self.instrumentor.teardown(&slot, Some(err.error_type()));
                Err(err)
            }
        }
    }
}
