//! Tracer provider setup and management

use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::{SdkTracerProvider, TracerProviderBuilder};
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Global tracer provider holder
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Provider-builder transforms registered before initialization. Span
/// processors are generic over their exporter, so registration hands
/// over a closure that attaches the processor to the builder instead of
/// a processor value.
type ProviderTransform = Box<dyn FnOnce(TracerProviderBuilder) -> TracerProviderBuilder + Send>;
static PROVIDER_TRANSFORMS: Mutex<Option<Vec<ProviderTransform>>> = Mutex::new(Some(Vec::new()));

/// Register a span processor to be attached when telemetry is
/// initialized. Must be called BEFORE `init_telemetry()`.
pub fn register_span_processor(transform: ProviderTransform) {
    let mut transforms = PROVIDER_TRANSFORMS
        .lock()
        .unwrap_or_else(|e| e.into_inner());

    if let Some(ref mut vec) = *transforms {
        vec.push(transform);
    } else {
        tracing::warn!("attempted to register span processor after telemetry initialization");
    }
}

/// Initialize telemetry with OpenTelemetry support.
///
/// Sets up a tracer provider with any registered span processors,
/// installs it globally so decorators built without an explicit tracer
/// find it, and bridges `tracing` spans through the same pipeline.
pub fn init_telemetry() {
    // Take the registered transforms (can only initialize once)
    let transforms = PROVIDER_TRANSFORMS
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take()
        .unwrap_or_default();

    let mut provider_builder = SdkTracerProvider::builder();
    for transform in transforms {
        provider_builder = transform(provider_builder);
    }
    let tracer_provider = provider_builder.build();

    let tracer = tracer_provider.tracer("agentspan");

    global::set_tracer_provider(tracer_provider.clone());
    let _ = TRACER_PROVIDER.set(tracer_provider);

    let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    let _ = tracing_subscriber::registry()
        .with(telemetry_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_line_number(true),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Get the global tracer provider if initialized
pub fn tracer_provider() -> Option<SdkTracerProvider> {
    TRACER_PROVIDER.get().cloned()
}
