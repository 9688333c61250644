use std::collections::BTreeMap;

use anyhow::Result;
use itertools::Itertools;

use admission_webhook::model::{AdmissionReview, Operation};
use admission_webhook::mutating::{Mutator, MutatorResult};
use admission_webhook::validating::{Validator, ValidatorResult};
use admission_webhook::{KubeObject, ReviewContext};

/// Sets a fixed set of labels on every object.
pub(crate) struct LabelsMutator {
    labels: BTreeMap<String, String>,
}

impl LabelsMutator {
    pub(crate) fn new(labels: BTreeMap<String, String>) -> Self {
        Self { labels }
    }
}

impl Mutator for LabelsMutator {
    fn mutate(
        &self,
        _ctx: &ReviewContext,
        _review: &AdmissionReview,
        obj: &mut dyn KubeObject,
    ) -> Result<MutatorResult> {
        let current = obj.labels_mut();
        let mut warnings = Vec::new();
        for (key, value) in &self.labels {
            if let Some(previous) = current.insert(key.clone(), value.clone()) {
                if &previous != value {
                    warnings.push(format!("label {key} changed from '{previous}' to '{value}'"));
                }
            }
        }

        Ok(MutatorResult::default().with_warnings(warnings))
    }
}

/// Rejects the objects missing any of the required labels. Deletions are always accepted.
pub(crate) struct RequiredLabelsValidator {
    required: Vec<String>,
}

impl RequiredLabelsValidator {
    pub(crate) fn new(required: Vec<String>) -> Self {
        Self { required }
    }
}

impl Validator for RequiredLabelsValidator {
    fn validate(
        &self,
        _ctx: &ReviewContext,
        review: &AdmissionReview,
        obj: &dyn KubeObject,
    ) -> Result<ValidatorResult> {
        if review.operation == Operation::Delete {
            return Ok(ValidatorResult::valid());
        }

        let labels = obj.labels();
        let missing = self
            .required
            .iter()
            .filter(|key| !labels.is_some_and(|labels| labels.contains_key(key.as_str())))
            .join(", ");

        if missing.is_empty() {
            Ok(ValidatorResult::valid())
        } else {
            Ok(ValidatorResult::invalid(format!(
                "missing required labels: {missing}"
            )))
        }
    }
}
