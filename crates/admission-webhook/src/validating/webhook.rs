use std::sync::Arc;

use crate::context::ReviewContext;
use crate::errors::{ConfigError, ReviewError};
use crate::log::{self, Logger};
use crate::model::{AdmissionResponse, AdmissionReview, ValidatingAdmissionResponse, WebhookKind};
use crate::object::{DynamicObjectCreator, ObjectCreator, TypeRegistry};
use crate::webhook::Webhook;

use super::Validator;

/// Configuration of a [`ValidatingWebhook`].
#[derive(Default)]
pub struct WebhookConfig {
    /// Identifies the webhook in logs, metrics and traces
    pub id: String,
    /// How the objects are created out of the review. When missing, the objects are created
    /// dynamically by looking at their `apiVersion` and `kind`.
    pub obj: Option<Arc<dyn ObjectCreator>>,
    pub validator: Option<Arc<dyn Validator>>,
    /// Types known by the dynamic object creator, defaults to [`TypeRegistry::kubernetes`].
    /// Ignored when `obj` is set.
    pub type_registry: Option<Arc<TypeRegistry>>,
    pub logger: Option<Arc<dyn Logger>>,
}

/// A webhook that runs a [`Validator`] and reports its verdict. It never changes the object.
pub struct ValidatingWebhook {
    id: String,
    obj_creator: Arc<dyn ObjectCreator>,
    validator: Arc<dyn Validator>,
    logger: Arc<dyn Logger>,
}

impl ValidatingWebhook {
    pub fn new(cfg: WebhookConfig) -> Result<Self, ConfigError> {
        if cfg.id.is_empty() {
            return Err(ConfigError::EmptyId);
        }
        let validator = cfg
            .validator
            .ok_or(ConfigError::MissingCapability("validator"))?;

        let obj_creator = cfg.obj.unwrap_or_else(|| {
            let registry = cfg
                .type_registry
                .unwrap_or_else(|| Arc::new(TypeRegistry::kubernetes()));
            Arc::new(DynamicObjectCreator::new(registry))
        });
        let logger = cfg.logger.unwrap_or_else(log::noop).with_values(crate::kv! {
            "webhook-id" => cfg.id.as_str(),
            "webhook-type" => WebhookKind::Validating.as_str(),
        });

        Ok(Self {
            id: cfg.id,
            obj_creator,
            validator,
            logger,
        })
    }
}

impl Webhook for ValidatingWebhook {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> WebhookKind {
        WebhookKind::Validating
    }

    fn review(
        &self,
        ctx: &ReviewContext,
        review: &AdmissionReview,
    ) -> Result<AdmissionResponse, ReviewError> {
        let logger = self.logger.with_ctx_values(ctx);
        logger.debug("webhook validating review request received");

        let obj = self.obj_creator.new_object(review.raw_object())?;

        let result = self
            .validator
            .validate(ctx, review, &*obj)
            .map_err(ReviewError::Validation)?;
        logger.debug(&format!(
            "webhook validating review request validated, valid: {}",
            result.valid
        ));

        Ok(ValidatingAdmissionResponse {
            id: review.id.clone(),
            allowed: result.valid,
            message: result.message,
            warnings: result.warnings,
        }
        .into())
    }
}
