use thiserror::Error;

use crate::model::WebhookKind;

/// Errors raised while building a webhook or a handler. They are caught at startup, never
/// at request time.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("webhook id can't be empty")]
    EmptyId,

    #[error("{0} can't be missing")]
    MissingCapability(&'static str),
}

#[derive(Error, Debug)]
pub enum ObjectError {
    #[error("error deserializing request raw object: {0}")]
    Deserialize(String),

    #[error("raw object is empty")]
    EmptyObject,

    #[error("error serializing object: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Errors returned by the chains when they are interrupted.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChainError {
    #[error("{0} chain not finished correctly, context done")]
    Cancelled(WebhookKind),
}

/// Everything that can go wrong while a webhook reviews a request. The HTTP gateway turns
/// any of these into a `Failure` AdmissionResponse.
#[derive(Error, Debug)]
pub enum ReviewError {
    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error(transparent)]
    Mutation(anyhow::Error),

    #[error(transparent)]
    Validation(anyhow::Error),

    #[error("could not create the JSON patch: {0}")]
    Patch(#[source] serde_json::Error),
}

/// Errors raised while decoding an AdmissionReview received from the API server.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("could not decode the admission review from the request: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no kind \"{kind}\" is registered for version \"{api_version}\"")]
    UnknownType { api_version: String, kind: String },

    #[error("admission review has no request")]
    MissingRequest,
}
