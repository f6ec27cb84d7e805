//! Span builders and attribute setters for agent invocations and tool calls.
//!
//! Builders return owned spans or contexts; mutation happens through
//! `cx.span()` (`SpanRef`) so spans can live inside `Context` maps while
//! remaining addressable.

use opentelemetry::global::{BoxedSpan, BoxedTracer};
use opentelemetry::trace::{Span, SpanKind, SpanRef, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue, StringValue, Value};

use agentspan_client::{AgentError, AgentOptions, ResultMessage};

use crate::semconv::*;

/// Wrap a concrete tracer in the object-safe handle the builders take.
pub fn boxed_tracer<T, S>(tracer: T) -> BoxedTracer
where
    T: Tracer<Span = S> + Send + Sync + 'static,
    S: Span + Send + Sync + 'static,
{
    BoxedTracer::new(Box::new(tracer))
}

/// Start the root CLIENT span for one agent invocation.
///
/// Span name is `invoke_agent {agent}` when an agent name is known,
/// bare `invoke_agent` otherwise. The request model comes from the
/// explicit argument first, then the options.
pub fn create_invoke_agent_span(
    tracer: &BoxedTracer,
    agent_name: Option<&str>,
    request_model: Option<&str>,
    options: Option<&AgentOptions>,
) -> BoxedSpan {
    let span_name = match agent_name {
        Some(agent) => format!("{OPERATION_INVOKE_AGENT} {agent}"),
        None => OPERATION_INVOKE_AGENT.to_string(),
    };

    let mut attributes = vec![
        KeyValue::new(GEN_AI_OPERATION_NAME, OPERATION_INVOKE_AGENT),
        KeyValue::new(GEN_AI_SYSTEM, SYSTEM_ANTHROPIC),
    ];
    if let Some(agent) = agent_name {
        attributes.push(KeyValue::new(GEN_AI_AGENT_NAME, agent.to_string()));
    }
    let model = request_model
        .map(str::to_owned)
        .or_else(|| options.and_then(|o| o.model.clone()));
    if let Some(model) = model {
        attributes.push(KeyValue::new(GEN_AI_REQUEST_MODEL, model));
    }

    tracer
        .span_builder(span_name)
        .with_kind(SpanKind::Client)
        .with_attributes(attributes)
        .start(tracer)
}

/// Record the model that produced an assistant message.
pub fn set_response_model(span: &SpanRef<'_>, model: &str) {
    span.set_attribute(KeyValue::new(GEN_AI_RESPONSE_MODEL, model.to_string()));
}

/// Record outcome attributes from the terminal result message.
///
/// Cache token attributes are only set when non-zero; the input-token
/// attribute is the effective total including cache traffic.
pub fn set_result_attributes(span: &SpanRef<'_>, result: &ResultMessage) {
    if let Some(usage) = &result.usage {
        span.set_attribute(KeyValue::new(
            GEN_AI_USAGE_INPUT_TOKENS,
            usage.total_input_tokens() as i64,
        ));
        span.set_attribute(KeyValue::new(
            GEN_AI_USAGE_OUTPUT_TOKENS,
            usage.output_tokens as i64,
        ));
        if usage.cache_creation_input_tokens > 0 {
            span.set_attribute(KeyValue::new(
                GEN_AI_USAGE_CACHE_CREATION_INPUT_TOKENS,
                usage.cache_creation_input_tokens as i64,
            ));
        }
        if usage.cache_read_input_tokens > 0 {
            span.set_attribute(KeyValue::new(
                GEN_AI_USAGE_CACHE_READ_INPUT_TOKENS,
                usage.cache_read_input_tokens as i64,
            ));
        }
    }

    let finish_reason: StringValue = map_finish_reason(&result.subtype).to_string().into();
    span.set_attribute(KeyValue::new(
        GEN_AI_RESPONSE_FINISH_REASONS,
        Value::Array(vec![finish_reason].into()),
    ));

    if let Some(session_id) = &result.session_id {
        span.set_attribute(KeyValue::new(GEN_AI_CONVERSATION_ID, session_id.clone()));
    }
}

/// Mark the span failed: ERROR status plus the `error.type` attribute.
pub fn set_error_attributes(span: &SpanRef<'_>, err: &AgentError) {
    span.set_status(Status::error(err.to_string()));
    span.set_attribute(KeyValue::new(ERROR_TYPE, err.error_type()));
}

/// Classify a tool by name: MCP-served tools are extensions, everything
/// else is a plain function.
pub fn derive_tool_type(tool_name: &str) -> &'static str {
    if tool_name.starts_with(MCP_TOOL_PREFIX) {
        TOOL_TYPE_EXTENSION
    } else {
        TOOL_TYPE_FUNCTION
    }
}

/// Start an INTERNAL span for one tool call, parented under `parent`
/// when given. Returns the `Context` owning the span.
pub fn create_execute_tool_span(
    tracer: &BoxedTracer,
    tool_name: &str,
    tool_use_id: &str,
    parent: Option<&Context>,
) -> Context {
    let attributes = vec![
        KeyValue::new(GEN_AI_OPERATION_NAME, OPERATION_EXECUTE_TOOL),
        KeyValue::new(GEN_AI_SYSTEM, SYSTEM_ANTHROPIC),
        KeyValue::new(GEN_AI_TOOL_NAME, tool_name.to_string()),
        KeyValue::new(GEN_AI_TOOL_CALL_ID, tool_use_id.to_string()),
        KeyValue::new(GEN_AI_TOOL_TYPE, derive_tool_type(tool_name)),
    ];

    let builder = tracer
        .span_builder(format!("{OPERATION_EXECUTE_TOOL} {tool_name}"))
        .with_kind(SpanKind::Internal)
        .with_attributes(attributes);

    match parent {
        Some(parent_cx) => {
            let span = builder.start_with_context(tracer, parent_cx);
            parent_cx.with_span(span)
        }
        None => {
            let span = builder.start(tracer);
            Context::current().with_span(span)
        }
    }
}

/// Mark a tool span failed with the raw error text from the hook payload.
pub fn set_tool_error_attributes(span: &SpanRef<'_>, error: &str) {
    span.set_status(Status::error(error.to_string()));
    span.set_attribute(KeyValue::new(ERROR_TYPE, error.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentspan_client::Usage;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};
    use std::collections::HashMap;

    // The provider is returned so it outlives the test body; dropping it
    // shuts the export pipeline down.
    fn test_tracer() -> (BoxedTracer, InMemorySpanExporter, SdkTracerProvider) {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        (boxed_tracer(provider.tracer("test")), exporter, provider)
    }

    fn attrs_of(span: &opentelemetry_sdk::trace::SpanData) -> HashMap<String, Value> {
        span.attributes
            .iter()
            .map(|kv| (kv.key.as_str().to_string(), kv.value.clone()))
            .collect()
    }

    fn result_message(usage: Usage) -> ResultMessage {
        ResultMessage::success(usage, "test-session-123")
    }

    #[test]
    fn invoke_agent_span_with_agent_name() {
        let (tracer, exporter, _provider) = test_tracer();

        let mut span = create_invoke_agent_span(&tracer, Some("research"), Some("claude-sonnet-4-20250514"), None);
        span.end();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "invoke_agent research");
        assert_eq!(spans[0].span_kind, SpanKind::Client);

        let attrs = attrs_of(&spans[0]);
        assert_eq!(attrs.get("gen_ai.operation.name").unwrap().as_str(), "invoke_agent");
        assert_eq!(attrs.get("gen_ai.system").unwrap().as_str(), "anthropic");
        assert_eq!(attrs.get("gen_ai.agent.name").unwrap().as_str(), "research");
        assert_eq!(
            attrs.get("gen_ai.request.model").unwrap().as_str(),
            "claude-sonnet-4-20250514"
        );
    }

    #[test]
    fn invoke_agent_span_without_agent_name() {
        let (tracer, exporter, _provider) = test_tracer();

        let mut span = create_invoke_agent_span(&tracer, None, None, None);
        span.end();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].name, "invoke_agent");
        let attrs = attrs_of(&spans[0]);
        assert!(!attrs.contains_key("gen_ai.agent.name"));
        assert!(!attrs.contains_key("gen_ai.request.model"));
    }

    #[test]
    fn explicit_model_wins_over_options() {
        let (tracer, exporter, _provider) = test_tracer();
        let options = AgentOptions::with_model("claude-opus-4");

        let mut span = create_invoke_agent_span(&tracer, None, Some("claude-sonnet-4"), Some(&options));
        span.end();

        let attrs = attrs_of(&exporter.get_finished_spans().unwrap()[0]);
        assert_eq!(attrs.get("gen_ai.request.model").unwrap().as_str(), "claude-sonnet-4");
    }

    #[test]
    fn options_model_used_when_no_explicit_model() {
        let (tracer, exporter, _provider) = test_tracer();
        let options = AgentOptions::with_model("claude-opus-4");

        let mut span = create_invoke_agent_span(&tracer, None, None, Some(&options));
        span.end();

        let attrs = attrs_of(&exporter.get_finished_spans().unwrap()[0]);
        assert_eq!(attrs.get("gen_ai.request.model").unwrap().as_str(), "claude-opus-4");
    }

    #[test]
    fn result_attributes_sum_cache_tokens_into_input() {
        let (tracer, exporter, _provider) = test_tracer();
        let span = create_invoke_agent_span(&tracer, None, None, None);
        let cx = Context::current().with_span(span);

        set_result_attributes(
            &cx.span(),
            &result_message(Usage {
                input_tokens: 100,
                output_tokens: 50,
                cache_creation_input_tokens: 20,
                cache_read_input_tokens: 30,
            }),
        );
        cx.span().end();

        let attrs = attrs_of(&exporter.get_finished_spans().unwrap()[0]);
        assert_eq!(attrs.get("gen_ai.usage.input_tokens").unwrap().as_str(), "150");
        assert_eq!(attrs.get("gen_ai.usage.output_tokens").unwrap().as_str(), "50");
        assert_eq!(
            attrs.get("gen_ai.usage.cache_creation_input_tokens").unwrap().as_str(),
            "20"
        );
        assert_eq!(
            attrs.get("gen_ai.usage.cache_read_input_tokens").unwrap().as_str(),
            "30"
        );
        assert_eq!(attrs.get("gen_ai.conversation.id").unwrap().as_str(), "test-session-123");
    }

    #[test]
    fn zero_cache_tokens_are_omitted() {
        let (tracer, exporter, _provider) = test_tracer();
        let span = create_invoke_agent_span(&tracer, None, None, None);
        let cx = Context::current().with_span(span);

        set_result_attributes(
            &cx.span(),
            &result_message(Usage {
                input_tokens: 100,
                output_tokens: 50,
                ..Default::default()
            }),
        );
        cx.span().end();

        let attrs = attrs_of(&exporter.get_finished_spans().unwrap()[0]);
        assert_eq!(attrs.get("gen_ai.usage.input_tokens").unwrap().as_str(), "100");
        assert!(!attrs.contains_key("gen_ai.usage.cache_creation_input_tokens"));
        assert!(!attrs.contains_key("gen_ai.usage.cache_read_input_tokens"));
    }

    #[test]
    fn finish_reason_is_mapped_single_element_list() {
        let (tracer, exporter, _provider) = test_tracer();
        let span = create_invoke_agent_span(&tracer, None, None, None);
        let cx = Context::current().with_span(span);

        let mut result = result_message(Usage::default());
        result.subtype = "max_turns".to_string();
        set_result_attributes(&cx.span(), &result);
        cx.span().end();

        let attrs = attrs_of(&exporter.get_finished_spans().unwrap()[0]);
        match attrs.get("gen_ai.response.finish_reasons").unwrap() {
            Value::Array(opentelemetry::Array::String(reasons)) => {
                assert_eq!(reasons.len(), 1);
                assert_eq!(reasons[0].as_str(), "max_tokens");
            }
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn error_attributes_set_status_and_type() {
        let (tracer, exporter, _provider) = test_tracer();
        let span = create_invoke_agent_span(&tracer, None, None, None);
        let cx = Context::current().with_span(span);

        set_error_attributes(&cx.span(), &AgentError::Connection("refused".into()));
        cx.span().end();

        let spans = exporter.get_finished_spans().unwrap();
        assert!(matches!(spans[0].status, Status::Error { .. }));
        let attrs = attrs_of(&spans[0]);
        assert_eq!(attrs.get("error.type").unwrap().as_str(), "ConnectionError");
    }

    #[test]
    fn tool_type_derivation() {
        assert_eq!(derive_tool_type("Bash"), "function");
        assert_eq!(derive_tool_type("mcp__github__create_issue"), "extension");
    }

    #[test]
    fn tool_span_is_parented_under_invocation() {
        let (tracer, exporter, _provider) = test_tracer();
        let root = create_invoke_agent_span(&tracer, None, None, None);
        let root_cx = Context::current().with_span(root);
        let root_id = root_cx.span().span_context().span_id();

        let tool_cx = create_execute_tool_span(&tracer, "Bash", "tu-1", Some(&root_cx));
        tool_cx.span().end();
        root_cx.span().end();

        let spans = exporter.get_finished_spans().unwrap();
        let tool = spans.iter().find(|s| s.name == "execute_tool Bash").unwrap();
        assert_eq!(tool.span_kind, SpanKind::Internal);
        assert_eq!(tool.parent_span_id, root_id);

        let attrs = attrs_of(tool);
        assert_eq!(attrs.get("gen_ai.operation.name").unwrap().as_str(), "execute_tool");
        assert_eq!(attrs.get("gen_ai.system").unwrap().as_str(), "anthropic");
        assert_eq!(attrs.get("gen_ai.tool.name").unwrap().as_str(), "Bash");
        assert_eq!(attrs.get("gen_ai.tool.call.id").unwrap().as_str(), "tu-1");
        assert_eq!(attrs.get("gen_ai.tool.type").unwrap().as_str(), "function");
    }

    #[test]
    fn tool_error_attributes_keep_raw_text() {
        let (tracer, exporter, _provider) = test_tracer();
        let tool_cx = create_execute_tool_span(&tracer, "Bash", "tu-1", None);

        set_tool_error_attributes(&tool_cx.span(), "command timed out");
        tool_cx.span().end();

        let spans = exporter.get_finished_spans().unwrap();
        assert!(matches!(spans[0].status, Status::Error { .. }));
        let attrs = attrs_of(&spans[0]);
        assert_eq!(attrs.get("error.type").unwrap().as_str(), "command timed out");
    }
}
