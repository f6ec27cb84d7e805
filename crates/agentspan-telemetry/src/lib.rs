//! GenAI telemetry vocabulary and emission helpers
//!
//! Span builders, metric instruments, semantic-convention constants, and
//! global provider wiring shared by the instrumentation layer.

pub mod metrics;
pub mod provider;
pub mod semconv;
pub mod spans;

// Re-exports
pub use metrics::{
    create_duration_histogram, create_token_usage_histogram, record_duration, record_token_usage,
};
pub use provider::{init_telemetry, register_span_processor, tracer_provider};
pub use spans::{
    boxed_tracer, create_execute_tool_span, create_invoke_agent_span, derive_tool_type,
    set_error_attributes, set_response_model, set_result_attributes, set_tool_error_attributes,
};
