use std::sync::Arc;
use std::time::Duration;

use axum::{extract::DefaultBodyLimit, routing::post, Router};

use crate::errors::ConfigError;
use crate::log::{self, Logger};
use crate::tracing::{NoopTracer, Tracer};
use crate::webhook::Webhook;

mod api_error;
mod handlers;
pub use handlers::readiness_handler;
mod state;

use state::ApiServerState;

/// The biggest AdmissionReview accepted. The API server limits the size of the objects to
/// 3MiB, the review can carry two of them (old and new object) plus some formatting.
pub const MAX_REQUEST_BODY_BYTES: usize = 6 * 1024 * 1024;

/// Configuration of the HTTP handler serving a webhook.
#[derive(Default)]
pub struct HandlerConfig {
    pub webhook: Option<Arc<dyn Webhook>>,
    pub logger: Option<Arc<dyn Logger>>,
    pub tracer: Option<Arc<dyn Tracer>>,
    /// Deadline of every review, none by default
    pub timeout: Option<Duration>,
}

/// Build the router serving `config.webhook` on `/`.
///
/// The router decodes the AdmissionReview of the request, runs the review on the blocking
/// thread pool and encodes the response using the AdmissionReview version of the request.
pub fn handler_for(config: HandlerConfig) -> Result<Router, ConfigError> {
    let webhook = config
        .webhook
        .ok_or(ConfigError::MissingCapability("webhook"))?;
    let values = crate::kv! {
        "svc" => "http.Handler",
        "webhook-id" => webhook.id(),
        "webhook-kind" => webhook.kind().as_str(),
    };
    let tracer = config
        .tracer
        .unwrap_or_else(|| Arc::new(NoopTracer))
        .with_values(values.clone());
    let logger = config.logger.unwrap_or_else(log::noop).with_values(values);
    let span_name = format!("admissionreview.HTTP/{}", webhook.id());

    let state = Arc::new(ApiServerState {
        webhook,
        logger,
        tracer: tracer.clone(),
        timeout: config.timeout,
    });

    let router = Router::new()
        .route("/", post(handlers::review_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .with_state(state);

    Ok(tracer.trace_http_handler(&span_name, router))
}
