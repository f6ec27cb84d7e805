//! Instrumentation hook callbacks and hook-map merging.
//!
//! The callbacks open and close `execute_tool` spans around tool
//! execution. They are deliberately forgiving: missing context, missing
//! `tool_use_id`, or an unknown id is a benign no-op, never an error
//! surfaced to the host.

use std::sync::Arc;

use opentelemetry::KeyValue;
use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::TraceContextExt;
use serde_json::Value;

use agentspan_client::{HookCallback, HookEvent, HookMap, HookMatcher, HookOutput, HookPayload};
use agentspan_telemetry::semconv::{GEN_AI_TOOL_CALL_ARGUMENTS, GEN_AI_TOOL_CALL_RESULT};
use agentspan_telemetry::{create_execute_tool_span, set_tool_error_attributes};

use crate::context::ContextSlot;

/// Merge instrumentation hooks into user-registered hooks.
///
/// User matchers keep their position and fire first; instrumentation
/// matchers are appended per event.
pub fn merge_hooks(mut user: HookMap, instrumentation: HookMap) -> HookMap {
    for (event, matchers) in instrumentation {
        user.entry(event).or_default().extend(matchers);
    }
    user
}

/// Build the hook map the decorators register for one invocation slot.
pub fn build_instrumentation_hooks(
    tracer: Arc<BoxedTracer>,
    slot: ContextSlot,
    capture_content: bool,
) -> HookMap {
    let mut hooks = HookMap::new();
    hooks.insert(
        HookEvent::PreToolUse,
        vec![HookMatcher::for_all(vec![on_pre_tool_use(
            tracer,
            slot.clone(),
            capture_content,
        )])],
    );
    hooks.insert(
        HookEvent::PostToolUse,
        vec![HookMatcher::for_all(vec![on_post_tool_use(
            slot.clone(),
            capture_content,
        )])],
    );
    hooks.insert(
        HookEvent::PostToolUseFailure,
        vec![HookMatcher::for_all(vec![on_post_tool_use_failure(
            slot.clone(),
        )])],
    );
    hooks.insert(
        HookEvent::Stop,
        vec![HookMatcher::for_all(vec![on_stop(slot)])],
    );
    hooks
}

/// Hook payload fields arrive as loose JSON; strings are recorded as-is,
/// anything else is serialized.
fn content_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn on_pre_tool_use(
    tracer: Arc<BoxedTracer>,
    slot: ContextSlot,
    capture_content: bool,
) -> HookCallback {
    Arc::new(move |payload: HookPayload, tool_use_id, _hook_ctx| {
        let tracer = tracer.clone();
        let slot = slot.clone();
        Box::pin(async move {
            let Some(tool_use_id) = tool_use_id else {
                return HookOutput::default();
            };
            slot.with(|ctx| {
                let tool_name = payload.tool_name().unwrap_or("unknown").to_string();
                let tool_cx = create_execute_tool_span(
                    &tracer,
                    &tool_name,
                    &tool_use_id,
                    Some(ctx.parent_context()),
                );
                if capture_content
                    && ctx.capture_content()
                    && let Some(input) = payload.tool_input()
                {
                    tool_cx.span().set_attribute(KeyValue::new(
                        GEN_AI_TOOL_CALL_ARGUMENTS,
                        content_to_string(input),
                    ));
                }
                ctx.insert_tool_span(tool_use_id.clone(), tool_cx);
            });
            HookOutput::default()
        })
    })
}

fn on_post_tool_use(slot: ContextSlot, capture_content: bool) -> HookCallback {
    Arc::new(move |payload: HookPayload, tool_use_id, _hook_ctx| {
        let slot = slot.clone();
        Box::pin(async move {
            let Some(tool_use_id) = tool_use_id else {
                return HookOutput::default();
            };
            slot.with(|ctx| {
                let Some(tool_cx) = ctx.remove_tool_span(&tool_use_id) else {
                    return;
                };
                if capture_content
                    && ctx.capture_content()
                    && let Some(response) = payload.tool_response()
                {
                    tool_cx.span().set_attribute(KeyValue::new(
                        GEN_AI_TOOL_CALL_RESULT,
                        content_to_string(response),
                    ));
                }
                tool_cx.span().end();
            });
            HookOutput::default()
        })
    })
}

fn on_post_tool_use_failure(slot: ContextSlot) -> HookCallback {
    Arc::new(move |payload: HookPayload, tool_use_id, _hook_ctx| {
        let slot = slot.clone();
        Box::pin(async move {
            let Some(tool_use_id) = tool_use_id else {
                return HookOutput::default();
            };
            slot.with(|ctx| {
                let Some(tool_cx) = ctx.remove_tool_span(&tool_use_id) else {
                    return;
                };
                let error = payload.error().unwrap_or("tool execution failed");
                set_tool_error_attributes(&tool_cx.span(), error);
                tool_cx.span().end();
            });
            HookOutput::default()
        })
    })
}

/// Turn boundary. Nothing to record today; kept as the anchor for
/// sub-agent span support.
fn on_stop(slot: ContextSlot) -> HookCallback {
    Arc::new(move |_payload: HookPayload, _tool_use_id, _hook_ctx| {
        let slot = slot.clone();
        Box::pin(async move {
            slot.with(|_ctx| ());
            HookOutput::default()
        })
    })
}
