use base64::{engine::general_purpose, Engine as _};
use k8s_openapi::api::authentication::v1::UserInfo;
use k8s_openapi::apimachinery::pkg::runtime::RawExtension;
use serde::{Deserialize, Serialize};

use crate::errors::DecodeError;
use crate::model::{
    self, AdmissionReviewVersion, GroupVersionKind, GroupVersionResource, Operation,
};

const ADMISSION_REVIEW_KIND: &str = "AdmissionReview";

/// The AdmissionReview sent by the API server, in either of the `admission.k8s.io/v1beta1`
/// and `admission.k8s.io/v1` generations. They share the same layout.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdmissionRequest {
    pub uid: String,
    pub kind: GroupVersionKind,
    pub resource: GroupVersionResource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_kind: Option<GroupVersionKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_resource: Option<GroupVersionResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub operation: String,
    pub user_info: UserInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<RawExtension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_object: Option<RawExtension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

/// The AdmissionReview sent back to the API server. It always uses the generation of the
/// request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewResponse {
    pub kind: String,
    pub api_version: String,
    pub response: AdmissionResponse,
}

/// This models the admission/v1/AdmissionResponse object of Kubernetes, the v1beta1 one is
/// the same minus the warnings.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    /// Copied over from the corresponding AdmissionRequest
    pub uid: String,

    pub allowed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<PatchType>,

    /// Base64 encoded JSON patch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,

    /// Extra details about why the request was denied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionResponseStatus>,

    /// Only known by the v1 generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub enum PatchType {
    #[serde(rename = "JSONPatch")]
    #[default]
    JSONPatch,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub enum AdmissionResponseStatusValue {
    Success,
    Failure,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct AdmissionResponseStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionResponseStatusValue>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Suggested HTTP return code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl AdmissionReviewRequest {
    /// The generation of the review, inferred from its `apiVersion` and `kind`
    pub fn version(&self) -> Result<AdmissionReviewVersion, DecodeError> {
        let api_version = self.api_version.as_deref().unwrap_or_default();
        let kind = self.kind.as_deref().unwrap_or_default();

        match (api_version, kind) {
            ("admission.k8s.io/v1", ADMISSION_REVIEW_KIND) => Ok(AdmissionReviewVersion::V1),
            ("admission.k8s.io/v1beta1", ADMISSION_REVIEW_KIND) => {
                Ok(AdmissionReviewVersion::V1beta1)
            }
            _ => Err(DecodeError::UnknownType {
                api_version: api_version.to_owned(),
                kind: kind.to_owned(),
            }),
        }
    }

    /// Turn the wire review into the version agnostic model
    pub fn into_model(self) -> Result<model::AdmissionReview, DecodeError> {
        let version = self.version()?;
        let request = self.request.ok_or(DecodeError::MissingRequest)?;

        Ok(model::AdmissionReview {
            id: request.uid,
            name: request.name.unwrap_or_default(),
            namespace: request.namespace.unwrap_or_default(),
            operation: Operation::from_wire(&request.operation),
            version,
            // the request kind and resource are operation specific, prefer them
            request_gvk: request.request_kind.unwrap_or(request.kind),
            request_gvr: request.request_resource.unwrap_or(request.resource),
            old_object_raw: raw_bytes(request.old_object)?,
            new_object_raw: raw_bytes(request.object)?,
            dry_run: request.dry_run.unwrap_or(false),
            user_info: request.user_info,
        })
    }
}

fn raw_bytes(raw: Option<RawExtension>) -> Result<Vec<u8>, DecodeError> {
    match raw {
        None | Some(RawExtension(serde_json::Value::Null)) => Ok(Vec::new()),
        Some(RawExtension(value)) => Ok(serde_json::to_vec(&value)?),
    }
}

/// Decode the body of a request sent by the API server
pub fn decode(body: &[u8]) -> Result<model::AdmissionReview, DecodeError> {
    let review: AdmissionReviewRequest = serde_json::from_slice(body)?;
    review.into_model()
}

impl AdmissionReviewResponse {
    pub fn new(version: AdmissionReviewVersion, mut response: AdmissionResponse) -> Self {
        if !version.supports_warnings() {
            response.warnings = None;
        }
        AdmissionReviewResponse {
            api_version: version.api_version().to_owned(),
            kind: ADMISSION_REVIEW_KIND.to_owned(),
            response,
        }
    }

    /// Encode the result of a webhook review
    pub fn from_model(version: AdmissionReviewVersion, response: &model::AdmissionResponse) -> Self {
        Self::new(version, AdmissionResponse::from(response))
    }

    /// The answer to a review that could not be completed
    pub fn failure(version: AdmissionReviewVersion, uid: &str, message: String) -> Self {
        Self::new(
            version,
            AdmissionResponse {
                uid: uid.to_owned(),
                allowed: false,
                status: Some(AdmissionResponseStatus {
                    status: Some(AdmissionResponseStatusValue::Failure),
                    message: Some(message),
                    code: None,
                }),
                ..Default::default()
            },
        )
    }
}

fn non_empty(warnings: &[String]) -> Option<Vec<String>> {
    if warnings.is_empty() {
        None
    } else {
        Some(warnings.to_vec())
    }
}

impl From<&model::AdmissionResponse> for AdmissionResponse {
    fn from(response: &model::AdmissionResponse) -> Self {
        match response {
            model::AdmissionResponse::Validating(response) => {
                let status = (!response.allowed).then(|| AdmissionResponseStatus {
                    status: Some(AdmissionResponseStatusValue::Failure),
                    message: Some(response.message.clone()),
                    code: Some(400),
                });
                AdmissionResponse {
                    uid: response.id.clone(),
                    allowed: response.allowed,
                    status,
                    warnings: non_empty(&response.warnings),
                    ..Default::default()
                }
            }
            model::AdmissionResponse::Mutating(response) => {
                let (patch_type, patch) = if response.has_mutated() {
                    (
                        Some(PatchType::JSONPatch),
                        Some(general_purpose::STANDARD.encode(&response.json_patch_patch)),
                    )
                } else {
                    (None, None)
                };
                AdmissionResponse {
                    uid: response.id.clone(),
                    allowed: true,
                    patch_type,
                    patch,
                    warnings: non_empty(&response.warnings),
                    ..Default::default()
                }
            }
        }
    }
}
