use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::context::ReviewContext;
use crate::errors::ReviewError;
use crate::metrics::{
    MeasureMutatingOpData, MeasureOpCommonData, MeasureValidatingOpData, MetricsRecorder,
};
use crate::model::{AdmissionResponse, AdmissionReview, WebhookKind};

use super::Webhook;

/// Wraps a webhook measuring every review, including the failed ones.
pub struct MeasuredWebhook {
    webhook: Arc<dyn Webhook>,
    recorder: Arc<dyn MetricsRecorder>,
}

impl MeasuredWebhook {
    pub fn new(recorder: Arc<dyn MetricsRecorder>, webhook: Arc<dyn Webhook>) -> Self {
        Self { webhook, recorder }
    }

    fn measure(&self, review: &AdmissionReview, outcome: &Outcome, duration: Duration) {
        let common = MeasureOpCommonData {
            webhook_id: self.webhook.id().to_owned(),
            webhook_kind: self.webhook.kind(),
            review_version: review.version,
            duration,
            success: !matches!(outcome, Outcome::Failed),
            resource_name: review.name.clone(),
            resource_namespace: review.namespace.clone(),
            resource_kind: review.request_gvk.to_string(),
            operation: review.operation,
            dry_run: review.dry_run,
            warnings_number: outcome.warnings_number(),
        };

        let (allowed, mutated) = match outcome {
            Outcome::Validating { allowed, .. } => (*allowed, false),
            Outcome::Mutating { mutated, .. } => (true, *mutated),
            Outcome::Failed => (false, false),
        };
        match self.webhook.kind() {
            WebhookKind::Validating => self
                .recorder
                .measure_validating_webhook_review_op(&MeasureValidatingOpData { common, allowed }),
            WebhookKind::Mutating => self
                .recorder
                .measure_mutating_webhook_review_op(&MeasureMutatingOpData { common, mutated }),
        }
    }
}

/// What a review ended with, as far as metrics are concerned.
#[derive(Debug, Default)]
enum Outcome {
    Validating {
        allowed: bool,
        warnings: usize,
    },
    Mutating {
        mutated: bool,
        warnings: usize,
    },
    /// The review returned an error or never returned
    #[default]
    Failed,
}

impl Outcome {
    fn of(result: &Result<AdmissionResponse, ReviewError>) -> Self {
        match result {
            Ok(AdmissionResponse::Validating(response)) => Outcome::Validating {
                allowed: response.allowed,
                warnings: response.warnings.len(),
            },
            Ok(AdmissionResponse::Mutating(response)) => Outcome::Mutating {
                mutated: response.has_mutated(),
                warnings: response.warnings.len(),
            },
            Err(_) => Outcome::Failed,
        }
    }

    fn warnings_number(&self) -> usize {
        match self {
            Outcome::Validating { warnings, .. } | Outcome::Mutating { warnings, .. } => *warnings,
            Outcome::Failed => 0,
        }
    }
}

/// Measures the review when dropped, so panicking webhooks are measured as failures.
struct MeasureGuard<'a> {
    webhook: &'a MeasuredWebhook,
    review: &'a AdmissionReview,
    start: Instant,
    outcome: Outcome,
}

impl Drop for MeasureGuard<'_> {
    fn drop(&mut self) {
        self.webhook
            .measure(self.review, &self.outcome, self.start.elapsed());
    }
}

impl Webhook for MeasuredWebhook {
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
        let mut guard = MeasureGuard {
            webhook: self,
            review,
            start: Instant::now(),
            outcome: Outcome::default(),
        };
        let result = self.webhook.review(ctx, review);
        guard.outcome = Outcome::of(&result);
        result
    }
}
