//! OpenTelemetry instrumentation for the conversational-agent client
//!
//! Wraps a transport or session client in a decorator that opens one
//! `invoke_agent` CLIENT span per invocation, child `execute_tool` spans
//! driven by hook callbacks, and records token-usage and duration
//! histograms. The wrapped surface keeps its call signatures; telemetry
//! failures never alter the message stream.
//!
//! ```ignore
//! let instrumentor = Instrumentor::builder().build();
//! let transport = instrumentor.instrument(Arc::new(backend));
//! let stream = transport.query("prompt".into(), options).await?;
//! ```

pub mod context;
pub mod hooks;
pub mod instrument;
pub mod session;

// Re-exports
pub use context::{ContextSlot, InvocationContext};
pub use hooks::{build_instrumentation_hooks, merge_hooks};
pub use instrument::{InstrumentedTransport, Instrumentor, InstrumentorBuilder};
pub use session::InstrumentedSessionClient;
