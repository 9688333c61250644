use std::sync::Arc;

use itertools::Itertools;

use crate::context::ReviewContext;
use crate::errors::ReviewError;
use crate::kv;
use crate::log::Kv;
use crate::model::{AdmissionResponse, AdmissionReview, WebhookKind};
use crate::tracing::Tracer;

use super::Webhook;

/// Wraps a webhook opening a trace span for every review.
pub struct TracedWebhook {
    webhook: Arc<dyn Webhook>,
    tracer: Arc<dyn Tracer>,
}

impl TracedWebhook {
    pub fn new(tracer: Arc<dyn Tracer>, webhook: Arc<dyn Webhook>) -> Self {
        Self { webhook, tracer }
    }
}

fn review_values(webhook_id: &str, review: &AdmissionReview) -> Kv {
    let user = &review.user_info;
    kv! {
        "webhook_id" => webhook_id,
        "admission_review_version" => review.version.as_str(),
        "admission_review_id" => review.id.as_str(),
        "user_uid" => user.uid.as_deref().unwrap_or_default(),
        "user_username" => user.username.as_deref().unwrap_or_default(),
        "user_groups" => user.groups.iter().flatten().join(","),
        "resource_name" => review.name.as_str(),
        "resource_namespace" => review.namespace.as_str(),
        "resource_kind" => review.request_gvk.to_string(),
        "operation" => review.operation.as_str(),
        "dry_run" => review.dry_run,
    }
}

fn response_values(response: &AdmissionResponse) -> Kv {
    let warnings = response.warnings();
    let mut values = kv! {
        "warnings" => warnings.iter().join(","),
        "has_warnings" => !warnings.is_empty(),
    };
    match response {
        AdmissionResponse::Validating(response) => {
            values.extend(kv! {
                "webhook_type" => WebhookKind::Validating.as_str(),
                "allowed" => response.allowed,
            });
        }
        AdmissionResponse::Mutating(response) => {
            values.extend(kv! {
                "webhook_type" => WebhookKind::Mutating.as_str(),
                "mutated" => response.has_mutated(),
            });
        }
    }
    values
}

impl Webhook for TracedWebhook {
    fn id(&self) -> &str {
        self.webhook.id()
    }

    fn kind(&self) -> WebhookKind {
        self.webhook.kind()
    }

    fn review(
        &self,
        ctx: &ReviewContext,
        review: &AdmissionReview,
    ) -> Result<AdmissionResponse, ReviewError> {
        let mut trace = TraceGuard {
            tracer: &*self.tracer,
            ctx: self
                .tracer
                .new_trace(ctx, &format!("webhook.Review/{}", self.webhook.id())),
            err: Some(UNFINISHED_REVIEW.to_owned()),
        };
        let ctx = &trace.ctx;
        self.tracer
            .add_trace_values(ctx, &review_values(self.webhook.id(), review));
        self.tracer
            .add_trace_event(ctx, "webhook review started", &kv! {});

        let result = self.webhook.review(ctx, review);

        let err = match &result {
            Ok(response) => {
                self.tracer.add_trace_values(ctx, &response_values(response));
                self.tracer
                    .add_trace_event(ctx, "webhook review finished", &kv! {});
                None
            }
            Err(e) => Some(e.to_string()),
        };
        trace.err = err;

        result
    }
}

const UNFINISHED_REVIEW: &str = "webhook review did not finish";

/// Ends the trace when dropped, also when the webhook panics.
struct TraceGuard<'a> {
    tracer: &'a dyn Tracer,
    ctx: ReviewContext,
    err: Option<String>,
}

impl Drop for TraceGuard<'_> {
    fn drop(&mut self) {
        self.tracer.end_trace(self.ctx.clone(), self.err.as_deref());
    }
}
