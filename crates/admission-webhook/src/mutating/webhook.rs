use std::sync::Arc;

use serde_json::Value;

use crate::context::ReviewContext;
use crate::errors::{ConfigError, ObjectError, ReviewError};
use crate::log::{self, Logger};
use crate::model::{AdmissionResponse, AdmissionReview, MutatingAdmissionResponse, WebhookKind};
use crate::object::{DynamicObjectCreator, KubeObject, ObjectCreator, TypeRegistry};
use crate::webhook::Webhook;

use super::Mutator;

/// Configuration of a [`MutatingWebhook`].
#[derive(Default)]
pub struct WebhookConfig {
    /// Identifies the webhook in logs, metrics and traces
    pub id: String,
    /// How the objects are created out of the review. When missing, the objects are created
    /// dynamically by looking at their `apiVersion` and `kind`.
    pub obj: Option<Arc<dyn ObjectCreator>>,
    pub mutator: Option<Arc<dyn Mutator>>,
    /// Types known by the dynamic object creator, defaults to [`TypeRegistry::kubernetes`].
    /// Ignored when `obj` is set.
    pub type_registry: Option<Arc<TypeRegistry>>,
    pub logger: Option<Arc<dyn Logger>>,
}

/// A webhook that runs a [`Mutator`] and answers with the JSON patch that turns the object
/// received into the mutated one.
pub struct MutatingWebhook {
    id: String,
    obj_creator: Arc<dyn ObjectCreator>,
    mutator: Arc<dyn Mutator>,
    logger: Arc<dyn Logger>,
}

impl MutatingWebhook {
    pub fn new(cfg: WebhookConfig) -> Result<Self, ConfigError> {
        if cfg.id.is_empty() {
            return Err(ConfigError::EmptyId);
        }
        let mutator = cfg
            .mutator
            .ok_or(ConfigError::MissingCapability("mutator"))?;

        let obj_creator = cfg.obj.unwrap_or_else(|| {
            let registry = cfg
                .type_registry
                .unwrap_or_else(|| Arc::new(TypeRegistry::kubernetes()));
            Arc::new(DynamicObjectCreator::new(registry))
        });
        let logger = cfg.logger.unwrap_or_else(log::noop).with_values(crate::kv! {
            "webhook-id" => cfg.id.as_str(),
            "webhook-type" => WebhookKind::Mutating.as_str(),
        });

        Ok(Self {
            id: cfg.id,
            obj_creator,
            mutator,
            logger,
        })
    }

    fn mutating_response(
        &self,
        review: &AdmissionReview,
        original: &Value,
        mutated: &dyn KubeObject,
        warnings: Vec<String>,
    ) -> Result<MutatingAdmissionResponse, ReviewError> {
        let mutated = mutated.to_json().map_err(ObjectError::Serialize)?;

        let patch = json_patch::diff(original, &mutated);
        let json_patch_patch = serde_json::to_vec(&patch).map_err(ReviewError::Patch)?;

        Ok(MutatingAdmissionResponse {
            id: review.id.clone(),
            json_patch_patch,
            warnings,
        })
    }
}

impl Webhook for MutatingWebhook {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> WebhookKind {
        WebhookKind::Mutating
    }

    fn review(
        &self,
        ctx: &ReviewContext,
        review: &AdmissionReview,
    ) -> Result<AdmissionResponse, ReviewError> {
        let logger = self.logger.with_ctx_values(ctx);
        logger.debug("webhook mutating review request received");

        let mut obj = self.obj_creator.new_object(review.raw_object())?;
        // Diff against the decoded object, decoding drops `null` members of the payload.
        let original = obj.to_json().map_err(ObjectError::Serialize)?;

        let result = self
            .mutator
            .mutate(ctx, review, &mut *obj)
            .map_err(ReviewError::Mutation)?;
        let mutated = result.mutated_object.unwrap_or(obj);

        let response = self.mutating_response(review, &original, &*mutated, result.warnings)?;
        logger.debug("webhook mutating review request mutated");

        Ok(response.into())
    }
}
