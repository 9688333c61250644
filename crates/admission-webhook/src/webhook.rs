use crate::context::ReviewContext;
use crate::errors::ReviewError;
use crate::model::{AdmissionResponse, AdmissionReview, WebhookKind};

mod measured;
pub use measured::MeasuredWebhook;
mod traced;
pub use traced::TracedWebhook;

/// A Kubernetes admission webhook: reviews an admission request and decides about it.
///
/// Webhooks are built once and shared by all the requests, `review` is called concurrently.
/// Implemented by [`crate::mutating::MutatingWebhook`], [`crate::validating::ValidatingWebhook`]
/// and by the decorators wrapping another webhook, [`MeasuredWebhook`] and [`TracedWebhook`].
pub trait Webhook: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> WebhookKind;
    fn review(
        &self,
        ctx: &ReviewContext,
        review: &AdmissionReview,
    ) -> Result<AdmissionResponse, ReviewError>;
}
