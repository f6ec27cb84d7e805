//! GenAI client metric instruments and recording helpers.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Histogram, Meter};

use crate::semconv::{
    DURATION_BUCKETS, ERROR_TYPE, GEN_AI_TOKEN_TYPE, METRIC_OPERATION_DURATION,
    METRIC_TOKEN_USAGE, TOKEN_TYPE_INPUT, TOKEN_TYPE_OUTPUT, TOKEN_USAGE_BUCKETS,
};

/// Histogram of input/output token counts per invocation.
pub fn create_token_usage_histogram(meter: &Meter) -> Histogram<u64> {
    meter
        .u64_histogram(METRIC_TOKEN_USAGE)
        .with_description("Measures the number of input and output tokens used")
        .with_unit("{token}")
        .with_boundaries(TOKEN_USAGE_BUCKETS.to_vec())
        .build()
}

/// Histogram of end-to-end invocation duration in seconds.
pub fn create_duration_histogram(meter: &Meter) -> Histogram<f64> {
    meter
        .f64_histogram(METRIC_OPERATION_DURATION)
        .with_description("GenAI operation duration")
        .with_unit("s")
        .with_boundaries(DURATION_BUCKETS.to_vec())
        .build()
}

/// Record one invocation's token usage: two observations sharing
/// `attributes`, distinguished by `gen_ai.token.type`.
pub fn record_token_usage(
    histogram: &Histogram<u64>,
    input_tokens: u64,
    output_tokens: u64,
    attributes: &[KeyValue],
) {
    let mut input_attrs = attributes.to_vec();
    input_attrs.push(KeyValue::new(GEN_AI_TOKEN_TYPE, TOKEN_TYPE_INPUT));
    histogram.record(input_tokens, &input_attrs);

    let mut output_attrs = attributes.to_vec();
    output_attrs.push(KeyValue::new(GEN_AI_TOKEN_TYPE, TOKEN_TYPE_OUTPUT));
    histogram.record(output_tokens, &output_attrs);
}

/// Record one invocation's duration, adding `error.type` when it failed.
pub fn record_duration(
    histogram: &Histogram<f64>,
    seconds: f64,
    attributes: &[KeyValue],
    error_type: Option<&str>,
) {
    let mut attrs = attributes.to_vec();
    if let Some(error_type) = error_type {
        attrs.push(KeyValue::new(ERROR_TYPE, error_type.to_string()));
    }
    histogram.record(seconds, &attrs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry_sdk::metrics::data::{AggregatedMetrics, MetricData};
    use opentelemetry_sdk::metrics::{
        InMemoryMetricExporter, PeriodicReader, SdkMeterProvider,
    };

    fn test_meter() -> (Meter, SdkMeterProvider, InMemoryMetricExporter) {
        let exporter = InMemoryMetricExporter::default();
        let reader = PeriodicReader::builder(exporter.clone()).build();
        let provider = SdkMeterProvider::builder().with_reader(reader).build();
        let meter = provider.meter("test");
        (meter, provider, exporter)
    }

    /// Count exported histogram data points for a metric, returning the
    /// `gen_ai.token.type` values seen.
    fn token_type_values(exporter: &InMemoryMetricExporter, metric_name: &str) -> Vec<String> {
        let mut seen = Vec::new();
        for rm in exporter.get_finished_metrics().unwrap() {
            for scope in rm.scope_metrics() {
                for metric in scope.metrics() {
                    if metric.name() != metric_name {
                        continue;
                    }
                    if let AggregatedMetrics::U64(MetricData::Histogram(hist)) = metric.data() {
                        for dp in hist.data_points() {
                            for kv in dp.attributes() {
                                if kv.key.as_str() == "gen_ai.token.type" {
                                    seen.push(kv.value.as_str().to_string());
                                }
                            }
                        }
                    }
                }
            }
        }
        seen.sort();
        seen
    }

    #[test]
    fn token_usage_records_input_and_output_points() {
        let (meter, provider, exporter) = test_meter();
        let histogram = create_token_usage_histogram(&meter);

        record_token_usage(
            &histogram,
            150,
            50,
            &[KeyValue::new("gen_ai.operation.name", "invoke_agent")],
        );
        provider.force_flush().unwrap();

        let token_types = token_type_values(&exporter, "gen_ai.client.token.usage");
        assert_eq!(token_types, vec!["input".to_string(), "output".to_string()]);
    }

    #[test]
    fn duration_records_error_type_only_on_failure() {
        let (meter, provider, exporter) = test_meter();
        let histogram = create_duration_histogram(&meter);

        record_duration(&histogram, 0.25, &[], None);
        record_duration(&histogram, 0.5, &[], Some("ConnectionError"));
        provider.force_flush().unwrap();

        let mut error_types = Vec::new();
        let mut point_count = 0;
        for rm in exporter.get_finished_metrics().unwrap() {
            for scope in rm.scope_metrics() {
                for metric in scope.metrics() {
                    if metric.name() != "gen_ai.client.operation.duration" {
                        continue;
                    }
                    if let AggregatedMetrics::F64(MetricData::Histogram(hist)) = metric.data() {
                        for dp in hist.data_points() {
                            point_count += 1;
                            for kv in dp.attributes() {
                                if kv.key.as_str() == "error.type" {
                                    error_types.push(kv.value.as_str().to_string());
                                }
                            }
                        }
                    }
                }
            }
        }

        // Distinct attribute sets produce distinct data points.
        assert_eq!(point_count, 2);
        assert_eq!(error_types, vec!["ConnectionError".to_string()]);
    }
}
