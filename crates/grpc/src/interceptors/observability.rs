//! Tracing and metrics stages of the interceptor chain.

use http::{Extensions, HeaderMap};
use opentelemetry::global;
use opentelemetry::propagation::Extractor;
use opentelemetry::trace::{Span, SpanKind, Status as SpanStatus, Tracer, TracerProvider};
use opentelemetry::KeyValue;
use opentelemetry_semantic_conventions::attribute::RPC_GRPC_STATUS_CODE;
use opentelemetry_semantic_conventions::trace::{RPC_METHOD, RPC_SERVICE, RPC_SYSTEM};
use std::sync::Arc;
use std::time::Duration;
use tonic::{Code, Status};

use crate::observability::metrics::RpcMetrics;

use super::{CallHook, CallInfo, HookState};

const TRACER_SCOPE: &str = "matchfn-grpc";

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

/// Opens a server span per call, linked to the caller's trace when the
/// request carries propagation headers, and records the final status code.
pub struct TracingHook;

impl TracingHook {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TracingHook {
    fn default() -> Self {
        Self::new()
    }
}

impl CallHook for TracingHook {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn on_call(
        &self,
        call: &CallInfo,
        headers: &HeaderMap,
        extensions: &mut Extensions,
    ) -> Result<HookState, Status> {
        let parent =
            global::get_text_map_propagator(|prop| prop.extract(&HeaderExtractor(headers)));

        let tracer = global::tracer_provider().tracer(TRACER_SCOPE);
        let span = tracer
            .span_builder(call.full_method.clone())
            .with_kind(SpanKind::Server)
            .with_attributes([
                KeyValue::new(RPC_SYSTEM, "grpc"),
                KeyValue::new(RPC_SERVICE, call.service.clone()),
                KeyValue::new(RPC_METHOD, call.method.clone()),
            ])
            .start_with_context(&tracer, &parent);

        // Downstream handlers can pick the context up for child spans.
        extensions.insert(parent);

        Ok(Some(Box::new(span)))
    }

    fn on_complete(&self, state: HookState, _call: &CallInfo, code: Code, _elapsed: Duration) {
        let Some(state) = state else { return };
        let Ok(mut span) = state.downcast::<opentelemetry::global::BoxedSpan>() else {
            return;
        };
        span.set_attribute(KeyValue::new(RPC_GRPC_STATUS_CODE, code as i64));
        if code == Code::Ok {
            span.set_status(SpanStatus::Ok);
        } else {
            span.set_status(SpanStatus::error(format!("{code:?}")));
        }
        span.end();
    }
}

/// Maintains the RPC counter, histogram and in-flight gauge families.
pub struct MetricsHook {
    metrics: Arc<RpcMetrics>,
}

impl MetricsHook {
    pub fn new(metrics: Arc<RpcMetrics>) -> Self {
        Self { metrics }
    }
}

impl CallHook for MetricsHook {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn on_call(
        &self,
        call: &CallInfo,
        _headers: &HeaderMap,
        _extensions: &mut Extensions,
    ) -> Result<HookState, Status> {
        self.metrics
            .started_total
            .with_label_values(&[&call.service, &call.method, call.kind.as_str()])
            .inc();
        self.metrics.inflight.inc();
        Ok(None)
    }

    fn on_complete(&self, _state: HookState, call: &CallInfo, code: Code, elapsed: Duration) {
        self.metrics.inflight.dec();
        self.metrics
            .handled_total
            .with_label_values(&[
                &call.service,
                &call.method,
                call.kind.as_str(),
                code_label(code),
            ])
            .inc();
        self.metrics
            .handling_seconds
            .with_label_values(&[&call.service, &call.method])
            .observe(elapsed.as_secs_f64());
    }
}

fn code_label(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "Cancelled",
        Code::Unknown => "Unknown",
        Code::InvalidArgument => "InvalidArgument",
        Code::DeadlineExceeded => "DeadlineExceeded",
        Code::NotFound => "NotFound",
        Code::AlreadyExists => "AlreadyExists",
        Code::PermissionDenied => "PermissionDenied",
        Code::ResourceExhausted => "ResourceExhausted",
        Code::FailedPrecondition => "FailedPrecondition",
        Code::Aborted => "Aborted",
        Code::OutOfRange => "OutOfRange",
        Code::Unimplemented => "Unimplemented",
        Code::Internal => "Internal",
        Code::Unavailable => "Unavailable",
        Code::DataLoss => "DataLoss",
        Code::Unauthenticated => "Unauthenticated",
    }
}
