use std::sync::Arc;

use anyhow::Result;

use crate::context::ReviewContext;
use crate::errors::ChainError;
use crate::log::Logger;
use crate::model::{AdmissionReview, WebhookKind};
use crate::object::KubeObject;

/// The verdict of a [`Validator`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidatorResult {
    /// Don't run the validators that come after this one
    pub stop_chain: bool,
    pub valid: bool,
    /// Shown to the user when the object is not valid
    pub message: String,
    pub warnings: Vec<String>,
}

impl ValidatorResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            ..Default::default()
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn stop(mut self) -> Self {
        self.stop_chain = true;
        self
    }
}

/// Business logic that accepts or rejects Kubernetes objects.
pub trait Validator: Send + Sync {
    fn validate(
        &self,
        ctx: &ReviewContext,
        review: &AdmissionReview,
        obj: &dyn KubeObject,
    ) -> Result<ValidatorResult>;
}

/// Turn a closure into a [`Validator`]
pub struct ValidatorFn<F>(F);

impl<F> ValidatorFn<F>
where
    F: Fn(&ReviewContext, &AdmissionReview, &dyn KubeObject) -> Result<ValidatorResult>
        + Send
        + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Validator for ValidatorFn<F>
where
    F: Fn(&ReviewContext, &AdmissionReview, &dyn KubeObject) -> Result<ValidatorResult>
        + Send
        + Sync,
{
    fn validate(
        &self,
        ctx: &ReviewContext,
        review: &AdmissionReview,
        obj: &dyn KubeObject,
    ) -> Result<ValidatorResult> {
        (self.0)(ctx, review, obj)
    }
}

/// Runs a sequence of validators, in order, until one of them rejects the object or stops
/// the chain. The result of that validator, carrying the warnings of all the validators that
/// ran, is the result of the chain.
pub struct ValidatorChain {
    validators: Vec<Arc<dyn Validator>>,
    logger: Arc<dyn Logger>,
}

impl ValidatorChain {
    pub fn new(logger: Arc<dyn Logger>, validators: Vec<Arc<dyn Validator>>) -> Self {
        Self {
            validators,
            logger: logger.with_values(crate::kv! {"svc" => "validator.Chain"}),
        }
    }
}

impl Validator for ValidatorChain {
    fn validate(
        &self,
        ctx: &ReviewContext,
        review: &AdmissionReview,
        obj: &dyn KubeObject,
    ) -> Result<ValidatorResult> {
        let mut warnings = Vec::new();

        for validator in &self.validators {
            if ctx.is_done() {
                return Err(ChainError::Cancelled(WebhookKind::Validating).into());
            }

            let mut result = validator.validate(ctx, review, obj)?;
            warnings.append(&mut result.warnings);

            if result.stop_chain || !result.valid {
                self.logger.with_ctx_values(ctx).debug(&format!(
                    "chain stopped by a validator, valid: {}",
                    result.valid
                ));
                result.warnings = warnings;
                return Ok(result);
            }
        }

        Ok(ValidatorResult::valid().with_warnings(warnings))
    }
}
