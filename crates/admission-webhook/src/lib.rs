//! Build Kubernetes dynamic admission webhooks.
//!
//! A webhook is either a [`mutating::MutatingWebhook`], running a chain of
//! [`mutating::Mutator`]s and answering with a JSON patch, or a
//! [`validating::ValidatingWebhook`], running a chain of [`validating::Validator`]s and
//! answering with an allow/deny decision. Both speak the `v1beta1` and `v1` generations of
//! the AdmissionReview API, [`api::handler_for`] exposes them over HTTP.

pub mod admission_review;
pub mod api;
pub mod context;
pub mod errors;
pub mod log;
pub mod metrics;
pub mod model;
pub mod mutating;
pub mod object;
pub mod tracing;
pub mod validating;
pub mod webhook;

pub use context::ReviewContext;
pub use errors::{ChainError, ConfigError, DecodeError, ObjectError, ReviewError};
pub use object::{KubeObject, ObjectCreator, TypeRegistry};
pub use webhook::Webhook;
