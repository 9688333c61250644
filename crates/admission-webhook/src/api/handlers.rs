use axum::{
    body::Bytes,
    extract,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::admission_review::{self, AdmissionReviewResponse};
use crate::api::{api_error::ApiError, state::ApiServerState};
use crate::context::ReviewContext;
use crate::kv;
use crate::model::{AdmissionResponse, AdmissionReview};

pub async fn readiness_handler() -> StatusCode {
    StatusCode::OK
}

#[tracing::instrument(
    name = "admission_review",
    fields(
        request_uid=tracing::field::Empty,
        operation=tracing::field::Empty,
        kind=tracing::field::Empty,
        namespace=tracing::field::Empty,
        name=tracing::field::Empty,
        dry_run=tracing::field::Empty,
        allowed=tracing::field::Empty,
        mutated=tracing::field::Empty,
    ),
    skip_all)]
/// Review the AdmissionReview sent by the API server.
pub(crate) async fn review_handler(
    extract::State(state): extract::State<Arc<ApiServerState>>,
    uri: Uri,
    body: Bytes,
) -> Result<Response, ApiError> {
    if body.is_empty() {
        return Err(ApiError::no_body());
    }
    let review = admission_review::decode(&body)?;
    populate_span_with_admission_review_data(&review);

    // cancel the review when the client goes away and this future is dropped
    let cancellation = CancellationToken::new();
    let _cancel_on_drop = cancellation.clone().drop_guard();

    let mut ctx = ReviewContext::new()
        .with_cancellation(cancellation)
        .with_span(Span::current());
    if let Some(timeout) = state.timeout {
        ctx = ctx.with_timeout(timeout);
    }
    let ctx = ctx.with_values(kv! {
        "request-id" => review.id.as_str(),
        "op" => review.operation.as_str(),
        "wh-version" => review.version.as_str(),
        "dry-run" => review.dry_run,
        "kind" => review.request_gvk.to_string(),
        "ns" => review.namespace.as_str(),
        "name" => review.name.as_str(),
        "path" => uri.path(),
        "trace-id" => state.tracer.trace_id(&ctx),
    });
    let logger = state.logger.with_ctx_values(&ctx);

    let start = Instant::now();
    let version = review.version;
    let id = review.id.clone();
    let webhook_state = state.clone();
    let span = Span::current();
    let result = task::spawn_blocking(move || {
        let _enter = span.enter();
        webhook_state.webhook.review(&ctx, &review)
    })
    .await
    .map_err(|e| format!("review task failed: {e}"))
    .and_then(|result| result.map_err(|e| e.to_string()));

    let response = match result {
        Ok(response) => response,
        Err(message) => {
            logger.error(&format!("could not review the admission request: {message}"));
            return Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AdmissionReviewResponse::failure(version, &id, message)),
            )
                .into_response());
        }
    };

    if !version.supports_warnings() && !response.warnings().is_empty() {
        logger.warning(&format!(
            "warnings used in a webhook response but the admission review version '{version}' doesn't support them, ignoring them"
        ));
    }
    populate_span_with_review_results(&response);
    logger.info(&format!(
        "admission review request handled, duration: {:?}",
        start.elapsed()
    ));

    Ok(Json(AdmissionReviewResponse::from_model(version, &response)).into_response())
}

fn populate_span_with_admission_review_data(review: &AdmissionReview) {
    Span::current().record("request_uid", review.id.as_str());
    Span::current().record("operation", review.operation.as_str());
    Span::current().record("kind", review.request_gvk.to_string().as_str());
    Span::current().record("namespace", review.namespace.as_str());
    Span::current().record("name", review.name.as_str());
    Span::current().record("dry_run", review.dry_run);
}

fn populate_span_with_review_results(response: &AdmissionResponse) {
    match response {
        AdmissionResponse::Validating(response) => {
            Span::current().record("allowed", response.allowed);
        }
        AdmissionResponse::Mutating(response) => {
            Span::current().record("mutated", response.has_mutated());
        }
    }
}
