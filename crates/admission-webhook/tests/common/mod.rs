use std::sync::Arc;

use admission_webhook::api::{handler_for, HandlerConfig};
use admission_webhook::mutating::{self, MutatingWebhook, Mutator};
use admission_webhook::validating::{self, ValidatingWebhook, Validator};
use axum::{
    body::Body,
    http::{self, header, Request},
    Router,
};

pub(crate) fn mutating_app(mutator: impl Mutator + 'static) -> Router {
    let webhook = MutatingWebhook::new(mutating::WebhookConfig {
        id: "test-mutator".to_owned(),
        mutator: Some(Arc::new(mutator)),
        ..Default::default()
    })
    .unwrap();

    handler_for(HandlerConfig {
        webhook: Some(Arc::new(webhook)),
        ..Default::default()
    })
    .unwrap()
}

pub(crate) fn validating_app(validator: impl Validator + 'static) -> Router {
    let webhook = ValidatingWebhook::new(validating::WebhookConfig {
        id: "test-validator".to_owned(),
        validator: Some(Arc::new(validator)),
        ..Default::default()
    })
    .unwrap();

    handler_for(HandlerConfig {
        webhook: Some(Arc::new(webhook)),
        ..Default::default()
    })
    .unwrap()
}

pub(crate) fn review_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(http::Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .uri("/")
        .body(body.into())
        .unwrap()
}
