mod common;

use admission_webhook::admission_review::{
    AdmissionResponseStatus, AdmissionResponseStatusValue, AdmissionReviewResponse, PatchType,
};
use admission_webhook::api::MAX_REQUEST_BODY_BYTES;
use admission_webhook::model::Operation;
use admission_webhook::mutating::{MutatorFn, MutatorResult};
use admission_webhook::validating::{ValidatorFn, ValidatorResult};
use admission_webhook::KubeObject;
use anyhow::anyhow;
use assert_json_diff::assert_json_eq;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use base64::{engine::general_purpose, Engine as _};
use http_body_util::BodyExt;
use k8s_openapi::api::core::v1::Pod;
use rstest::*;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{mutating_app, review_request, validating_app};

async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

async fn admission_review_response(response: Response) -> AdmissionReviewResponse {
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        mime::APPLICATION_JSON.as_ref()
    );
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn team_labeler() -> MutatorFn<
    impl Fn(
            &admission_webhook::ReviewContext,
            &admission_webhook::model::AdmissionReview,
            &mut dyn KubeObject,
        ) -> anyhow::Result<MutatorResult>
        + Send
        + Sync,
> {
    MutatorFn::new(|_ctx, _review, obj: &mut dyn KubeObject| {
        obj.labels_mut().insert("team".to_owned(), "x".to_owned());
        Ok(MutatorResult::default())
    })
}

#[tokio::test]
async fn test_mutate() {
    let app = mutating_app(team_labeler());
    let fixture = include_str!("data/pod_create_v1.json");

    let response = app.oneshot(review_request(fixture)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let review = admission_review_response(response).await;
    assert_eq!("admission.k8s.io/v1", review.api_version);
    assert_eq!("AdmissionReview", review.kind);
    assert_eq!("9a1f6b7c-6e2d-4a53-9d35-0c3c2b9f3a01", review.response.uid);
    assert!(review.response.allowed);
    assert_eq!(Some(PatchType::JSONPatch), review.response.patch_type);
    assert_eq!(None, review.response.status);

    let patch = general_purpose::STANDARD
        .decode(review.response.patch.unwrap())
        .unwrap();
    assert_json_eq!(
        json!([{"op": "add", "path": "/metadata/labels/team", "value": "x"}]),
        serde_json::from_slice::<Value>(&patch).unwrap()
    );

    // applying the patch to the received object must give the mutated one
    let fixture: Value = serde_json::from_str(fixture).unwrap();
    let mut object = fixture["request"]["object"].clone();
    let patch: json_patch::Patch = serde_json::from_slice(&patch).unwrap();
    json_patch::patch(&mut object, &patch).unwrap();

    let mut expected = fixture["request"]["object"].clone();
    expected["metadata"]["labels"]["team"] = json!("x");
    assert_json_eq!(expected, object);
    assert_eq!(Value::Null, object["metadata"]["creationTimestamp"]);
}

#[tokio::test]
#[rstest]
#[case::typed_object(include_str!("data/pod_create_v1.json"))]
#[case::custom_resource(include_str!("data/house_create_v1.json"))]
async fn test_mutate_without_changes(#[case] fixture: &'static str) {
    let app = mutating_app(MutatorFn::new(|_ctx, _review, _obj: &mut dyn KubeObject| {
        Ok(MutatorResult::default())
    }));

    let response = app.oneshot(review_request(fixture)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let review = admission_review_response(response).await;
    assert!(review.response.allowed);
    assert_eq!(None, review.response.patch_type);
    assert_eq!(None, review.response.patch);
}

#[tokio::test]
async fn test_mutate_typed_object() {
    let app = mutating_app(MutatorFn::new(|_ctx, _review, obj: &mut dyn KubeObject| {
        let pod = obj
            .downcast_mut::<Pod>()
            .ok_or_else(|| anyhow!("not a pod"))?;
        if let Some(spec) = pod.spec.as_mut() {
            for container in spec.containers.iter_mut() {
                container.image_pull_policy = Some("Always".to_owned());
            }
        }
        Ok(MutatorResult::default())
    }));

    let response = app
        .oneshot(review_request(include_str!("data/pod_create_v1.json")))
        .await
        .unwrap();
    let review = admission_review_response(response).await;

    let patch = general_purpose::STANDARD
        .decode(review.response.patch.unwrap())
        .unwrap();
    assert_json_eq!(
        json!([{
            "op": "replace",
            "path": "/spec/containers/0/imagePullPolicy",
            "value": "Always"
        }]),
        serde_json::from_slice::<Value>(&patch).unwrap()
    );
}

#[tokio::test]
async fn test_mutate_custom_resource() {
    let app = mutating_app(MutatorFn::new(|_ctx, _review, obj: &mut dyn KubeObject| {
        let city = obj
            .labels()
            .and_then(|labels| labels.get("city"))
            .cloned()
            .ok_or_else(|| anyhow!("missing city label"))?;
        obj.labels_mut().insert("team".to_owned(), city);
        Ok(MutatorResult::default())
    }));

    let fixture = include_str!("data/house_create_v1.json");
    let response = app.oneshot(review_request(fixture)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let review = admission_review_response(response).await;
    let patch = general_purpose::STANDARD
        .decode(review.response.patch.unwrap())
        .unwrap();
    assert_json_eq!(
        json!([{"op": "add", "path": "/metadata/labels/team", "value": "Bilbo"}]),
        serde_json::from_slice::<Value>(&patch).unwrap()
    );

    // fields unknown to any type survive, `null` ones included
    let fixture: Value = serde_json::from_str(fixture).unwrap();
    let mut object = fixture["request"]["object"].clone();
    let patch: json_patch::Patch = serde_json::from_slice(&patch).unwrap();
    json_patch::patch(&mut object, &patch).unwrap();

    let mut expected = fixture["request"]["object"].clone();
    expected["metadata"]["labels"]["team"] = json!("Bilbo");
    assert_json_eq!(expected, object);
}

#[tokio::test]
#[rstest]
#[case::v1(
    include_str!("data/pod_create_v1.json"),
    "admission.k8s.io/v1",
    Some(vec!["pod has no team label".to_owned()])
)]
#[case::v1beta1(include_str!("data/pod_create_v1beta1.json"), "admission.k8s.io/v1beta1", None)]
async fn test_warnings_depend_on_review_version(
    #[case] fixture: &'static str,
    #[case] api_version: &str,
    #[case] expected_warnings: Option<Vec<String>>,
) {
    let app = validating_app(ValidatorFn::new(|_ctx, _review, obj: &dyn KubeObject| {
        let warnings = if obj.labels().is_none_or(|labels| !labels.contains_key("team")) {
            vec!["pod has no team label".to_owned()]
        } else {
            Vec::new()
        };
        Ok(ValidatorResult::valid().with_warnings(warnings))
    }));

    let response = app.oneshot(review_request(fixture)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let review = admission_review_response(response).await;
    assert_eq!(api_version, review.api_version);
    assert!(review.response.allowed);
    assert_eq!(expected_warnings, review.response.warnings);
}

#[tokio::test]
async fn test_validate_rejected() {
    let app = validating_app(ValidatorFn::new(|_ctx, _review, obj: &dyn KubeObject| {
        Ok(ValidatorResult::invalid(format!(
            "{} is missing the owner label",
            obj.name().unwrap_or_default()
        )))
    }));

    let response = app
        .oneshot(review_request(include_str!("data/pod_create_v1beta1.json")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let review = admission_review_response(response).await;
    assert_eq!("admission.k8s.io/v1beta1", review.api_version);
    assert_eq!("5c0f2d3e-7a1b-4c8d-9e6f-1a2b3c4d5e6f", review.response.uid);
    assert!(!review.response.allowed);
    assert_eq!(
        Some(AdmissionResponseStatus {
            status: Some(AdmissionResponseStatusValue::Failure),
            message: Some("nginx is missing the owner label".to_owned()),
            code: Some(400),
        }),
        review.response.status
    );
}

#[tokio::test]
async fn test_validate_delete_uses_old_object() {
    let app = validating_app(ValidatorFn::new(|_ctx, review, obj: &dyn KubeObject| {
        assert_eq!(Operation::Delete, review.operation);
        assert!(review.dry_run);
        let app = obj.labels().and_then(|labels| labels.get("app"));
        if app.map(String::as_str) == Some("frontend") {
            Ok(ValidatorResult::valid())
        } else {
            Ok(ValidatorResult::invalid("old object not received"))
        }
    }));

    let response = app
        .oneshot(review_request(include_str!(
            "data/deployment_delete_v1.json"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let review = admission_review_response(response).await;
    assert_eq!("0d7e1c52-3b8f-4f6e-a2c4-8e5d9b1a7f33", review.response.uid);
    assert!(review.response.allowed);
    assert_eq!(None, review.response.status);
}

#[tokio::test]
async fn test_review_error() {
    let app = validating_app(ValidatorFn::new(|_ctx, _review, _obj: &dyn KubeObject| {
        Err(anyhow!("validation backend unavailable"))
    }));

    let response = app
        .oneshot(review_request(include_str!("data/pod_create_v1.json")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let review = admission_review_response(response).await;
    assert_eq!("admission.k8s.io/v1", review.api_version);
    assert_eq!("9a1f6b7c-6e2d-4a53-9d35-0c3c2b9f3a01", review.response.uid);
    assert!(!review.response.allowed);
    assert_eq!(
        Some(AdmissionResponseStatus {
            status: Some(AdmissionResponseStatusValue::Failure),
            message: Some("validation backend unavailable".to_owned()),
            code: None,
        }),
        review.response.status
    );
}

#[tokio::test]
#[rstest]
#[case::empty_body(Body::empty(), "no body found")]
#[case::not_json(
    Body::from("this is not an admission review"),
    "could not decode the admission review from the request"
)]
#[case::unknown_kind(
    Body::from(r#"{"apiVersion":"admission.k8s.io/v1","kind":"TokenReview","request":{}}"#),
    "no kind \"TokenReview\" is registered for version \"admission.k8s.io/v1\""
)]
#[case::no_request(
    Body::from(r#"{"apiVersion":"admission.k8s.io/v1","kind":"AdmissionReview"}"#),
    "admission review has no request"
)]
async fn test_bad_request(#[case] body: Body, #[case] expected_message: &str) {
    let app = mutating_app(team_labeler());

    let response = app.oneshot(review_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let message = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(
        message.starts_with(expected_message),
        "unexpected message: {message}"
    );
}

#[tokio::test]
async fn test_body_too_large() {
    let app = mutating_app(team_labeler());

    let response = app
        .oneshot(review_request(vec![b' '; MAX_REQUEST_BODY_BYTES + 1]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_only_post_is_allowed() {
    let app = mutating_app(team_labeler());

    let request = Request::builder()
        .method("GET")
        .uri("/")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
