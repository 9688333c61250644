use std::sync::Arc;

use anyhow::Result;

use crate::context::ReviewContext;
use crate::errors::ChainError;
use crate::log::Logger;
use crate::model::{AdmissionReview, WebhookKind};
use crate::object::KubeObject;

/// What a [`Mutator`] did with the object it received.
#[derive(Debug, Default)]
pub struct MutatorResult {
    /// Don't run the mutators that come after this one
    pub stop_chain: bool,
    /// A replacement for the received object. When missing, the received object (mutated in
    /// place or not) is the result of the mutation.
    pub mutated_object: Option<Box<dyn KubeObject>>,
    pub warnings: Vec<String>,
}

impl MutatorResult {
    pub fn replaced_by(obj: Box<dyn KubeObject>) -> Self {
        Self {
            mutated_object: Some(obj),
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

/// Business logic that rewrites Kubernetes objects.
///
/// Mutators are shared by all the reviews served concurrently, they must not keep request
/// state around.
pub trait Mutator: Send + Sync {
    fn mutate(
        &self,
        ctx: &ReviewContext,
        review: &AdmissionReview,
        obj: &mut dyn KubeObject,
    ) -> Result<MutatorResult>;
}

/// Turn a closure into a [`Mutator`]
pub struct MutatorFn<F>(F);

impl<F> MutatorFn<F>
where
    F: Fn(&ReviewContext, &AdmissionReview, &mut dyn KubeObject) -> Result<MutatorResult>
        + Send
        + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Mutator for MutatorFn<F>
where
    F: Fn(&ReviewContext, &AdmissionReview, &mut dyn KubeObject) -> Result<MutatorResult>
        + Send
        + Sync,
{
    fn mutate(
        &self,
        ctx: &ReviewContext,
        review: &AdmissionReview,
        obj: &mut dyn KubeObject,
    ) -> Result<MutatorResult> {
        (self.0)(ctx, review, obj)
    }
}

/// Runs a sequence of mutators, in order. Every mutator receives the object produced by the
/// previous one.
///
/// The warnings of all the mutators that ran are collected. The chain is interrupted as soon as
/// a mutator asks to stop it or fails; in the latter case the error is returned and nothing
/// else.
///
/// A stopping mutator that doesn't return its own replacement keeps the replacement returned
/// by the previous one.
pub struct MutatorChain {
    mutators: Vec<Arc<dyn Mutator>>,
    logger: Arc<dyn Logger>,
}

impl MutatorChain {
    pub fn new(logger: Arc<dyn Logger>, mutators: Vec<Arc<dyn Mutator>>) -> Self {
        Self {
            mutators,
            logger: logger.with_values(crate::kv! {"svc" => "mutator.Chain"}),
        }
    }
}

impl Mutator for MutatorChain {
    fn mutate(
        &self,
        ctx: &ReviewContext,
        review: &AdmissionReview,
        obj: &mut dyn KubeObject,
    ) -> Result<MutatorResult> {
        let mut replacement: Option<Box<dyn KubeObject>> = None;
        let mut warnings = Vec::new();

        for mutator in &self.mutators {
            if ctx.is_done() {
                return Err(ChainError::Cancelled(WebhookKind::Mutating).into());
            }

            let current: &mut dyn KubeObject = match replacement.as_deref_mut() {
                Some(replaced) => replaced,
                None => &mut *obj,
            };
            let mut result = mutator.mutate(ctx, review, current)?;

            warnings.append(&mut result.warnings);
            if let Some(mutated) = result.mutated_object.take() {
                replacement = Some(mutated);
            }

            if result.stop_chain {
                self.logger
                    .with_ctx_values(ctx)
                    .debug("chain stopped by a mutator");
                result.mutated_object = replacement;
                result.warnings = warnings;
                return Ok(result);
            }
        }

        Ok(MutatorResult {
            stop_chain: false,
            mutated_object: replacement,
            warnings,
        })
    }
}
