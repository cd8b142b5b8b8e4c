//! Span export pipeline.
//!
//! Spans are exported over OTLP/gRPC to the configured collector through a
//! batch processor with a one second scheduled delay. Context propagation
//! accepts B3, W3C trace context and baggage headers.

use opentelemetry::global;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace as sdktrace;
use opentelemetry_sdk::Resource;
use std::time::Duration;

const BATCH_SCHEDULED_DELAY: Duration = Duration::from_secs(1);

/// Errors raised by the span export pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ObservabilityError {
    #[error("span exporter construction failed: {0}")]
    Exporter(String),

    #[error("span flush failed: {0}")]
    Flush(String),
}

/// Builds the tracer provider exporting to `endpoint`.
///
/// An unreachable collector does not fail here: the batch processor
/// retries in the background and drops spans when its queue fills.
pub fn build_tracer_provider(
    service_name: &str,
    endpoint: &str,
) -> Result<sdktrace::SdkTracerProvider, ObservabilityError> {
    let builder = opentelemetry_otlp::SpanExporter::builder().with_tonic();
    // An empty endpoint means the exporter default (localhost:4317).
    let builder = if endpoint.is_empty() {
        builder
    } else {
        builder.with_endpoint(endpoint)
    };
    let exporter = builder
        .build()
        .map_err(|e| ObservabilityError::Exporter(e.to_string()))?;

    let batch = sdktrace::BatchSpanProcessor::builder(exporter)
        .with_batch_config(
            sdktrace::BatchConfigBuilder::default()
                .with_scheduled_delay(BATCH_SCHEDULED_DELAY)
                .build(),
        )
        .build();

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .with_attributes([
            KeyValue::new("environment", "production"),
            KeyValue::new("ID", 1i64),
        ])
        .build();

    Ok(sdktrace::SdkTracerProvider::builder()
        .with_resource(resource)
        .with_sampler(sdktrace::Sampler::AlwaysOn)
        .with_span_processor(batch)
        .build())
}

/// Installs the provider and the composite propagator globally. From this
/// point on every span created by the tracing interceptor is exported.
pub fn install_global(provider: sdktrace::SdkTracerProvider) {
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(opentelemetry_zipkin::Propagator::new()),
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));
    global::set_tracer_provider(provider);
}

/// Flushes buffered spans and shuts the provider down. An error here means
/// spans were lost.
pub fn shutdown_tracing(
    provider: &sdktrace::SdkTracerProvider,
) -> Result<(), ObservabilityError> {
    provider
        .force_flush()
        .map_err(|e| ObservabilityError::Flush(e.to_string()))?;
    provider
        .shutdown()
        .map_err(|e| ObservabilityError::Flush(e.to_string()))?;
    Ok(())
}
