//! Per-invocation bookkeeping shared between the streaming engine and
//! the hook callbacks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use opentelemetry::Context;
use opentelemetry::global::BoxedSpan;
use opentelemetry::trace::{SpanRef, Status, TraceContextExt};

/// State for one in-flight agent invocation.
///
/// The root span lives inside an otel `Context` so hook callbacks can
/// parent tool spans under it and mutate it through `SpanRef`.
pub struct InvocationContext {
    root: Context,
    start: Instant,
    active_tool_spans: HashMap<String, Context>,
    active_subagent_spans: HashMap<String, Context>,
    model: Option<String>,
    session_id: Option<String>,
    capture_content: bool,
}

impl InvocationContext {
    pub fn new(root_span: BoxedSpan, capture_content: bool) -> Self {
        Self {
            root: Context::current().with_span(root_span),
            start: Instant::now(),
            active_tool_spans: HashMap::new(),
            active_subagent_spans: HashMap::new(),
            model: None,
            session_id: None,
            capture_content,
        }
    }

    pub fn root_span(&self) -> SpanRef<'_> {
        self.root.span()
    }

    /// Context tool spans are parented under.
    pub fn parent_context(&self) -> &Context {
        &self.root
    }

    pub fn start_time(&self) -> Instant {
        self.start
    }

    pub fn capture_content(&self) -> bool {
        self.capture_content
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Record the responding model. Set-once: later calls are ignored so
    /// metric dimensions stay stable within the invocation.
    pub fn set_model(&mut self, model: &str) {
        if self.model.is_none() {
            self.model = Some(model.to_string());
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Record the session id. At most once per invocation.
    pub fn set_session_id(&mut self, session_id: &str) {
        if self.session_id.is_none() {
            self.session_id = Some(session_id.to_string());
        }
    }

    pub fn insert_tool_span(&mut self, tool_use_id: impl Into<String>, cx: Context) {
        self.active_tool_spans.insert(tool_use_id.into(), cx);
    }

    pub fn remove_tool_span(&mut self, tool_use_id: &str) -> Option<Context> {
        self.active_tool_spans.remove(tool_use_id)
    }

    pub fn open_tool_spans(&self) -> usize {
        self.active_tool_spans.len()
    }

    pub fn insert_subagent_span(&mut self, id: impl Into<String>, cx: Context) {
        self.active_subagent_spans.insert(id.into(), cx);
    }

    pub fn remove_subagent_span(&mut self, id: &str) -> Option<Context> {
        self.active_subagent_spans.remove(id)
    }

    /// End every tool and sub-agent span still open, marking each with
    /// ERROR status. Idempotent: the maps are drained.
    pub fn cleanup_unclosed_spans(&mut self) {
        for (tool_use_id, cx) in self.active_tool_spans.drain() {
            tracing::debug!(tool_use_id = %tool_use_id, "ending tool span left open at teardown");
            let span = cx.span();
            span.set_status(Status::error("span not properly closed"));
            span.end();
        }
        for (id, cx) in self.active_subagent_spans.drain() {
            tracing::debug!(id = %id, "ending sub-agent span left open at teardown");
            let span = cx.span();
            span.set_status(Status::error("span not properly closed"));
            span.end();
        }
    }

    pub fn end_root_span(&self) {
        self.root.span().end();
    }
}

/// Shared cell holding the invocation context for the current
/// invocation.
///
/// Hook callbacks close over a clone; the streaming engine installs a
/// context when an invocation starts and takes it back at teardown.
/// Hooks fire on the task driving the message stream, so each
/// invocation's callbacks only ever see their own slot.
#[derive(Clone, Default)]
pub struct ContextSlot {
    inner: Arc<Mutex<Option<InvocationContext>>>,
}

impl ContextSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock, recovering from poison. The worst-case
    /// inconsistency is a stale span entry, which teardown repairs.
    fn lock(&self) -> MutexGuard<'_, Option<InvocationContext>> {
        self.inner.lock().unwrap_or_else(|e| {
            tracing::warn!("invocation context mutex was poisoned, recovering");
            e.into_inner()
        })
    }

    pub fn install(&self, ctx: InvocationContext) {
        *self.lock() = Some(ctx);
    }

    /// Remove and return the current context, leaving the slot empty.
    pub fn take(&self) -> Option<InvocationContext> {
        self.lock().take()
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    /// Run `f` against the current context, if any.
    pub fn with<R>(&self, f: impl FnOnce(&mut InvocationContext) -> R) -> Option<R> {
        self.lock().as_mut().map(f)
    }
}
