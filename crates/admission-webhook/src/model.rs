use std::fmt;

use k8s_openapi::api::authentication::v1::UserInfo;
use serde::{Deserialize, Serialize};

/// The generation of the `admission.k8s.io` API an AdmissionReview was received with.
/// Responses always echo the generation of the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum AdmissionReviewVersion {
    V1beta1,
    #[default]
    V1,
}

impl AdmissionReviewVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionReviewVersion::V1beta1 => "v1beta1",
            AdmissionReviewVersion::V1 => "v1",
        }
    }

    /// The `apiVersion` of the AdmissionReview envelope for this generation
    pub fn api_version(&self) -> &'static str {
        match self {
            AdmissionReviewVersion::V1beta1 => "admission.k8s.io/v1beta1",
            AdmissionReviewVersion::V1 => "admission.k8s.io/v1",
        }
    }

    /// Only the `v1` generation knows about warnings
    pub fn supports_warnings(&self) -> bool {
        matches!(self, AdmissionReviewVersion::V1)
    }
}

impl fmt::Display for AdmissionReviewVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The operation that triggered the admission review.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Operation {
    Create,
    Update,
    Delete,
    Connect,
    #[default]
    Unknown,
}

impl Operation {
    /// Map the operation string used on the wire (`CREATE`, `UPDATE`...) to the model.
    /// Anything else is reported as `Unknown`.
    pub fn from_wire(op: &str) -> Self {
        match op {
            "CREATE" => Operation::Create,
            "UPDATE" => Operation::Update,
            "DELETE" => Operation::Delete,
            "CONNECT" => Operation::Connect,
            _ => Operation::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Connect => "connect",
            Operation::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionKind {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(group: &str, version: &str, kind: &str) -> Self {
        Self {
            group: group.to_owned(),
            version: version.to_owned(),
            kind: kind.to_owned(),
        }
    }

    /// Build the GVK out of the `apiVersion` and `kind` fields of an object.
    /// `apiVersion` is either `<group>/<version>` or just `<version>` for the core group.
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", api_version),
        };
        Self::new(group, version, kind)
    }
}

impl fmt::Display for GroupVersionKind {
    /// `group/version/kind`, skipping the empty parts (e.g. core group kinds print as `v1/Pod`)
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [
            self.group.as_str(),
            self.version.as_str(),
            self.kind.as_str(),
        ];
        let joined = parts.join("/");
        f.write_str(joined.trim_matches(&['/', ' '][..]))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionResource {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.version, self.resource)
    }
}

/// A version agnostic admission review.
///
/// It is built by the HTTP gateway out of either a `v1beta1` or a `v1` AdmissionReview and it's
/// never modified after that.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AdmissionReview {
    /// The UID of the request, it must be echoed back inside of the response
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub operation: Operation,
    pub version: AdmissionReviewVersion,
    pub request_gvk: GroupVersionKind,
    pub request_gvr: GroupVersionResource,
    /// Serialized object before the operation. Populated for UPDATE and DELETE operations
    pub old_object_raw: Vec<u8>,
    /// Serialized object after the operation. Empty for DELETE operations
    pub new_object_raw: Vec<u8>,
    pub dry_run: bool,
    pub user_info: UserInfo,
}

impl AdmissionReview {
    /// The raw object the webhooks have to work against: the old object on DELETE operations,
    /// the new one otherwise.
    pub fn raw_object(&self) -> &[u8] {
        if self.operation == Operation::Delete {
            &self.old_object_raw
        } else {
            &self.new_object_raw
        }
    }
}

/// The kind of a webhook.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WebhookKind {
    Mutating,
    Validating,
}

impl WebhookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookKind::Mutating => "mutating",
            WebhookKind::Validating => "validating",
        }
    }
}

impl fmt::Display for WebhookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of a webhook review. There are only two kinds of webhooks, hence two
/// kinds of responses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdmissionResponse {
    Validating(ValidatingAdmissionResponse),
    Mutating(MutatingAdmissionResponse),
}

impl AdmissionResponse {
    pub fn id(&self) -> &str {
        match self {
            AdmissionResponse::Validating(r) => &r.id,
            AdmissionResponse::Mutating(r) => &r.id,
        }
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            AdmissionResponse::Validating(r) => &r.warnings,
            AdmissionResponse::Mutating(r) => &r.warnings,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidatingAdmissionResponse {
    pub id: String,
    pub allowed: bool,
    pub message: String,
    pub warnings: Vec<String>,
}

impl From<ValidatingAdmissionResponse> for AdmissionResponse {
    fn from(response: ValidatingAdmissionResponse) -> Self {
        AdmissionResponse::Validating(response)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MutatingAdmissionResponse {
    pub id: String,
    /// Serialized RFC 6902 JSON patch
    pub json_patch_patch: Vec<u8>,
    pub warnings: Vec<String>,
}

impl MutatingAdmissionResponse {
    /// A mutation happened when the patch has at least one operation
    pub fn has_mutated(&self) -> bool {
        !self.json_patch_patch.is_empty() && self.json_patch_patch.as_slice() != b"[]"
    }
}

impl From<MutatingAdmissionResponse> for AdmissionResponse {
    fn from(response: MutatingAdmissionResponse) -> Self {
        AdmissionResponse::Mutating(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::core("v1", "Pod", GroupVersionKind::new("", "v1", "Pod"))]
    #[case::grouped("apps/v1", "Deployment", GroupVersionKind::new("apps", "v1", "Deployment"))]
    #[case::crd(
        "building.kubewebhook.slok.dev/v1",
        "House",
        GroupVersionKind::new("building.kubewebhook.slok.dev", "v1", "House")
    )]
    fn gvk_from_api_version(
        #[case] api_version: &str,
        #[case] kind: &str,
        #[case] expected: GroupVersionKind,
    ) {
        assert_eq!(expected, GroupVersionKind::from_api_version(api_version, kind));
    }

    #[rstest]
    #[case::full(GroupVersionKind::new("apps", "v1", "Deployment"), "apps/v1/Deployment")]
    #[case::core_group(GroupVersionKind::new("", "v1", "Pod"), "v1/Pod")]
    #[case::empty(GroupVersionKind::default(), "")]
    fn gvk_display(#[case] gvk: GroupVersionKind, #[case] expected: &str) {
        assert_eq!(expected, gvk.to_string());
    }

    #[rstest]
    #[case(Operation::Create, b"new".as_slice())]
    #[case(Operation::Update, b"new".as_slice())]
    #[case(Operation::Connect, b"new".as_slice())]
    #[case(Operation::Delete, b"old".as_slice())]
    fn raw_object_depends_on_operation(#[case] operation: Operation, #[case] expected: &[u8]) {
        let review = AdmissionReview {
            operation,
            old_object_raw: b"old".to_vec(),
            new_object_raw: b"new".to_vec(),
            ..Default::default()
        };
        assert_eq!(expected, review.raw_object());
    }

    #[rstest]
    #[case::empty(b"".as_slice(), false)]
    #[case::empty_array(b"[]".as_slice(), false)]
    #[case::patch(br#"[{"op":"remove","path":"/a"}]"#.as_slice(), true)]
    fn mutated_patch(#[case] patch: &[u8], #[case] mutated: bool) {
        let response = MutatingAdmissionResponse {
            json_patch_patch: patch.to_vec(),
            ..Default::default()
        };
        assert_eq!(mutated, response.has_mutated());
    }
}
