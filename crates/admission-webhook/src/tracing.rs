use std::sync::Arc;

use anyhow::{anyhow, Result};
use axum::Router;
use opentelemetry::trace::{TraceContextExt, TracerProvider};
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::{field, info, info_span, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::context::ReviewContext;
use crate::log::Kv;

pub const SERVICE_NAME: &str = "admission-webhook";

/// The tracing capabilities needed by the webhooks and the HTTP gateway.
pub trait Tracer: Send + Sync {
    /// Start a new span, child of the one carried by `ctx`. The returned context carries the
    /// new span and must be handed to [`Tracer::end_trace`].
    fn new_trace(&self, ctx: &ReviewContext, name: &str) -> ReviewContext;

    /// Close the span carried by `ctx`, marking it as failed when `err` is set.
    fn end_trace(&self, ctx: ReviewContext, err: Option<&str>);

    fn add_trace_values(&self, ctx: &ReviewContext, values: &Kv);

    fn add_trace_event(&self, ctx: &ReviewContext, name: &str, values: &Kv);

    /// The id of the trace the context belongs to, empty when there's none
    fn trace_id(&self, ctx: &ReviewContext) -> String;

    /// Instrument all the requests served by `router`
    fn trace_http_handler(&self, name: &str, router: Router) -> Router;

    /// Return a child tracer that sets `values` on every span it creates.
    fn with_values(&self, values: Kv) -> Arc<dyn Tracer>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn new_trace(&self, ctx: &ReviewContext, _name: &str) -> ReviewContext {
        ctx.clone()
    }

    fn end_trace(&self, _ctx: ReviewContext, _err: Option<&str>) {}

    fn add_trace_values(&self, _ctx: &ReviewContext, _values: &Kv) {}

    fn add_trace_event(&self, _ctx: &ReviewContext, _name: &str, _values: &Kv) {}

    fn trace_id(&self, _ctx: &ReviewContext) -> String {
        String::new()
    }

    fn trace_http_handler(&self, _name: &str, router: Router) -> Router {
        router
    }

    fn with_values(&self, _values: Kv) -> Arc<dyn Tracer> {
        Arc::new(NoopTracer)
    }
}

/// A [`Tracer`] backed by `tracing` spans.
///
/// When the OpenTelemetry layer is installed (see [`setup_tracing`]) the spans are exported,
/// the values become span attributes and the events become span events.
#[derive(Clone, Debug, Default)]
pub struct SpanTracer {
    values: Kv,
}

impl SpanTracer {
    pub fn new() -> Self {
        Self::default()
    }

    fn merge(&self, values: Kv) -> Self {
        let mut merged = self.values.clone();
        merged.extend(values);
        Self { values: merged }
    }
}

fn set_attributes(span: &Span, values: &Kv) {
    for (key, value) in values {
        span.set_attribute(key.clone(), otel_value(value));
    }
}

impl Tracer for SpanTracer {
    fn new_trace(&self, ctx: &ReviewContext, name: &str) -> ReviewContext {
        let span = info_span!(
            parent: ctx.span(),
            "webhook_review",
            otel.name = name,
            otel.status_code = field::Empty,
            otel.status_message = field::Empty,
        );
        set_attributes(&span, &self.values);
        ctx.with_span(span)
    }

    fn end_trace(&self, ctx: ReviewContext, err: Option<&str>) {
        let span = ctx.span();
        match err {
            Some(err) => {
                span.record("otel.status_code", "ERROR");
                span.record("otel.status_message", err);
            }
            None => {
                span.record("otel.status_code", "OK");
            }
        }
        // the span is closed once the last handle, owned by `ctx`, is dropped
    }

    fn add_trace_values(&self, ctx: &ReviewContext, values: &Kv) {
        set_attributes(ctx.span(), values);
    }

    fn add_trace_event(&self, ctx: &ReviewContext, name: &str, values: &Kv) {
        let fields = serde_json::to_string(values).unwrap_or_default();
        info!(parent: ctx.span(), event = name, fields = %fields, "{}", name);
    }

    fn trace_id(&self, ctx: &ReviewContext) -> String {
        trace_id_of(ctx.span())
    }

    fn trace_http_handler(&self, name: &str, router: Router) -> Router {
        let name = name.to_owned();
        let values = self.values.clone();
        router.layer(TraceLayer::new_for_http().make_span_with(
            move |request: &axum::http::Request<axum::body::Body>| {
                let span = info_span!(
                    "http_request",
                    otel.name = %name,
                    method = %request.method(),
                    path = %request.uri().path(),
                );
                set_attributes(&span, &values);
                span
            },
        ))
    }

    fn with_values(&self, values: Kv) -> Arc<dyn Tracer> {
        Arc::new(self.merge(values))
    }
}

fn otel_value(value: &Value) -> opentelemetry::Value {
    match value {
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.into(),
            None => n.as_f64().unwrap_or_default().into(),
        },
        Value::String(s) => s.clone().into(),
        other => other.to_string().into(),
    }
}

fn trace_id_of(span: &Span) -> String {
    let context = span.context();
    let span_context = context.span().span_context().clone();
    if span_context.is_valid() {
        span_context.trace_id().to_string()
    } else {
        String::new()
    }
}

// Setup the tracing system. This MUST be done inside of a tokio Runtime
// because some collectors rely on it and would panic otherwise.
pub fn setup_tracing(log_level: &str, log_fmt: &str, log_no_color: bool) -> Result<()> {
    // setup logging
    let filter_layer = EnvFilter::new(log_level)
        // some of our dependencies generate trace events too, but we don't care about them ->
        // let's filter them
        .add_directive("h2=off".parse()?)
        .add_directive("hyper=off".parse()?)
        .add_directive("rustls=off".parse()?)
        .add_directive("tonic=off".parse()?)
        .add_directive("tower=off".parse()?);

    match log_fmt {
        "json" => tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt::layer().json())
            .init(),
        "text" => {
            let fmt_layer = fmt::layer().with_ansi(!log_no_color);

            tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt_layer)
                .init()
        }
        "otlp" => {
            // Send the spans to an OpenTelemetry collector using the OTLP format over gRPC.
            // The collector must run on localhost (eg: use a sidecar inside of k8s)
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .build()?;
            let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_resource(
                    opentelemetry_sdk::Resource::builder()
                        .with_service_name(SERVICE_NAME)
                        .build(),
                )
                .build();
            let tracer = provider.tracer(SERVICE_NAME);
            opentelemetry::global::set_tracer_provider(provider);

            // Create a tracing layer with the configured tracer
            let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);
            tracing_subscriber::registry()
                .with(filter_layer)
                .with(telemetry)
                .with(fmt::layer())
                .init()
        }

        _ => return Err(anyhow!("Unknown log message format")),
    };

    Ok(())
}
