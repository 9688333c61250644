use std::{
    any::Any,
    collections::{BTreeMap, HashMap},
    fmt,
    marker::PhantomData,
    sync::Arc,
};

use k8s_openapi::api::{
    apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet},
    autoscaling::v2::HorizontalPodAutoscaler,
    batch::v1::{CronJob, Job},
    core::v1::{
        ConfigMap, Namespace, Node, PersistentVolumeClaim, Pod, Secret, Service, ServiceAccount,
    },
    networking::v1::{Ingress, NetworkPolicy},
    rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
};
use kube::Resource;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::ObjectError;
use crate::model::GroupVersionKind;

/// The capabilities every Kubernetes object handed to mutators and validators has: access
/// to its metadata and serialization to JSON.
///
/// It's implemented for every `kube::Resource`, which covers all the `k8s-openapi` types and
/// the custom resources derived with `kube`, and for [`UnstructuredObject`], the generic
/// representation used when the concrete type is unknown.
pub trait KubeObject: fmt::Debug + Send + Sync + Any {
    fn name(&self) -> Option<&str>;
    fn set_name(&mut self, name: &str);
    fn namespace(&self) -> Option<&str>;
    fn set_namespace(&mut self, namespace: &str);
    fn labels(&self) -> Option<&BTreeMap<String, String>>;
    /// Mutable access to the labels, the map is created when missing
    fn labels_mut(&mut self) -> &mut BTreeMap<String, String>;
    fn annotations(&self) -> Option<&BTreeMap<String, String>>;
    /// Mutable access to the annotations, the map is created when missing
    fn annotations_mut(&mut self) -> &mut BTreeMap<String, String>;
    fn to_json(&self) -> Result<Value, serde_json::Error>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<K> KubeObject for K
where
    K: Resource + Serialize + fmt::Debug + Send + Sync + 'static,
{
    fn name(&self) -> Option<&str> {
        self.meta().name.as_deref()
    }

    fn set_name(&mut self, name: &str) {
        self.meta_mut().name = Some(name.to_owned());
    }

    fn namespace(&self) -> Option<&str> {
        self.meta().namespace.as_deref()
    }

    fn set_namespace(&mut self, namespace: &str) {
        self.meta_mut().namespace = Some(namespace.to_owned());
    }

    fn labels(&self) -> Option<&BTreeMap<String, String>> {
        self.meta().labels.as_ref()
    }

    fn labels_mut(&mut self) -> &mut BTreeMap<String, String> {
        self.meta_mut().labels.get_or_insert_with(BTreeMap::new)
    }

    fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.meta().annotations.as_ref()
    }

    fn annotations_mut(&mut self) -> &mut BTreeMap<String, String> {
        self.meta_mut().annotations.get_or_insert_with(BTreeMap::new)
    }

    fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<'a> dyn KubeObject + 'a {
    /// Get the concrete type behind the object, if it is `K`
    pub fn downcast_ref<K: KubeObject>(&self) -> Option<&K> {
        self.as_any().downcast_ref::<K>()
    }

    pub fn downcast_mut<K: KubeObject>(&mut self) -> Option<&mut K> {
        self.as_any_mut().downcast_mut::<K>()
    }
}

/// A Kubernetes object kept as the JSON tree it was decoded from.
///
/// Serializing it gives back the very same tree, `null` members included, plus the changes
/// done through [`KubeObject`] or [`UnstructuredObject::update`].
#[derive(Clone, Debug, PartialEq)]
pub struct UnstructuredObject {
    data: Value,
    labels: Option<BTreeMap<String, String>>,
    annotations: Option<BTreeMap<String, String>>,
}

impl UnstructuredObject {
    pub fn new(data: Value) -> Result<Self, ObjectError> {
        if !data.is_object() {
            return Err(ObjectError::Deserialize(format!(
                "expected a JSON object, got: {data}"
            )));
        }
        let labels = string_map(&data, "labels");
        let annotations = string_map(&data, "annotations");
        Ok(Self {
            data,
            labels,
            annotations,
        })
    }

    /// Look up a value by JSON pointer (e.g. `/spec/replicas`). Label and annotation changes
    /// not yet serialized are not visible here, use the [`KubeObject`] accessors for them.
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.data.pointer(pointer)
    }

    /// Change the raw tree
    pub fn update<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Value),
    {
        self.flush();
        f(&mut self.data);
        self.labels = string_map(&self.data, "labels");
        self.annotations = string_map(&self.data, "annotations");
    }

    fn flush(&mut self) {
        write_string_map(&mut self.data, "labels", self.labels.as_ref());
        write_string_map(&mut self.data, "annotations", self.annotations.as_ref());
    }

    fn metadata_str(&self, field: &str) -> Option<&str> {
        self.data.get("metadata")?.get(field)?.as_str()
    }
}

fn metadata_mut(data: &mut Value) -> Option<&mut Map<String, Value>> {
    let root = data.as_object_mut()?;
    let metadata = root
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    if !metadata.is_object() {
        *metadata = Value::Object(Map::new());
    }
    metadata.as_object_mut()
}

/// Read `metadata.<field>` when it's a map of strings
fn string_map(data: &Value, field: &str) -> Option<BTreeMap<String, String>> {
    data.get("metadata")?
        .get(field)?
        .as_object()?
        .iter()
        .map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_owned())))
        .collect()
}

/// Write `map` into `metadata.<field>`, leaving the tree untouched when nothing changed
fn write_string_map(data: &mut Value, field: &str, map: Option<&BTreeMap<String, String>>) {
    let Some(map) = map else {
        return;
    };
    let current = string_map(data, field);
    if current.as_ref() == Some(map) || (current.is_none() && map.is_empty()) {
        return;
    }
    if let Some(metadata) = metadata_mut(data) {
        let value = map
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        metadata.insert(field.to_owned(), Value::Object(value));
    }
}

impl KubeObject for UnstructuredObject {
    fn name(&self) -> Option<&str> {
        self.metadata_str("name")
    }

    fn set_name(&mut self, name: &str) {
        if let Some(metadata) = metadata_mut(&mut self.data) {
            metadata.insert("name".to_owned(), Value::String(name.to_owned()));
        }
    }

    fn namespace(&self) -> Option<&str> {
        self.metadata_str("namespace")
    }

    fn set_namespace(&mut self, namespace: &str) {
        if let Some(metadata) = metadata_mut(&mut self.data) {
            metadata.insert("namespace".to_owned(), Value::String(namespace.to_owned()));
        }
    }

    fn labels(&self) -> Option<&BTreeMap<String, String>> {
        self.labels.as_ref()
    }

    fn labels_mut(&mut self) -> &mut BTreeMap<String, String> {
        self.labels.get_or_insert_with(BTreeMap::new)
    }

    fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.annotations.as_ref()
    }

    fn annotations_mut(&mut self) -> &mut BTreeMap<String, String> {
        self.annotations.get_or_insert_with(BTreeMap::new)
    }

    fn to_json(&self) -> Result<Value, serde_json::Error> {
        let mut data = self.data.clone();
        write_string_map(&mut data, "labels", self.labels.as_ref());
        write_string_map(&mut data, "annotations", self.annotations.as_ref());
        Ok(data)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Knows how to turn the raw object of an admission review into a [`KubeObject`].
pub trait ObjectCreator: Send + Sync {
    fn new_object(&self, raw: &[u8]) -> Result<Box<dyn KubeObject>, ObjectError>;
}

/// Parse raw bytes as JSON, falling back to YAML.
fn decode_raw(raw: &[u8]) -> Result<Value, ObjectError> {
    if raw.is_empty() {
        return Err(ObjectError::EmptyObject);
    }

    match serde_json::from_slice::<Value>(raw) {
        Ok(value) => Ok(value),
        Err(json_err) => serde_yaml::from_slice::<Value>(raw).map_err(|yaml_err| {
            debug!(error = %yaml_err, "raw object is not valid YAML either");
            ObjectError::Deserialize(json_err.to_string())
        }),
    }
}

/// Creates objects of a type known at compile time.
pub struct StaticObjectCreator<K> {
    _type: PhantomData<fn() -> K>,
}

impl<K> StaticObjectCreator<K>
where
    K: KubeObject + DeserializeOwned,
{
    pub fn new() -> Self {
        Self { _type: PhantomData }
    }

    /// Build a creator for the type of `prototype`. Only the type matters, each review
    /// gets a freshly decoded object.
    pub fn for_prototype(_prototype: &K) -> Self {
        Self::new()
    }
}

impl<K> Default for StaticObjectCreator<K>
where
    K: KubeObject + DeserializeOwned,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> ObjectCreator for StaticObjectCreator<K>
where
    K: KubeObject + DeserializeOwned,
{
    fn new_object(&self, raw: &[u8]) -> Result<Box<dyn KubeObject>, ObjectError> {
        let value = decode_raw(raw)?;
        let obj: K =
            serde_json::from_value(value).map_err(|e| ObjectError::Deserialize(e.to_string()))?;
        Ok(Box::new(obj))
    }
}

/// Shorthand to get a shared [`StaticObjectCreator`] for `K`
pub fn static_object<K>() -> Arc<dyn ObjectCreator>
where
    K: KubeObject + DeserializeOwned,
{
    Arc::new(StaticObjectCreator::<K>::new())
}

/// Creates objects without knowing their type in advance.
///
/// The type is inferred from the `apiVersion` and `kind` of the raw object and looked up
/// inside of the [`TypeRegistry`]. Unknown kinds, kinds that don't expose the full metadata
/// and payloads the registered type can't decode fall back to an [`UnstructuredObject`], which
/// keeps the payload verbatim.
pub struct DynamicObjectCreator {
    registry: Arc<TypeRegistry>,
}

impl DynamicObjectCreator {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }
}

impl ObjectCreator for DynamicObjectCreator {
    fn new_object(&self, raw: &[u8]) -> Result<Box<dyn KubeObject>, ObjectError> {
        let value = decode_raw(raw)?;

        if let Some(gvk) = gvk_of(&value) {
            match self.registry.get(&gvk) {
                Some(Registration::Object(decode)) => match decode(value.clone()) {
                    Ok(obj) => return Ok(obj),
                    Err(e) => {
                        debug!(%gvk, error = %e, "cannot decode into registered type, using unstructured object");
                    }
                },
                Some(Registration::PartialMetadata) => {
                    debug!(%gvk, "registered type has partial metadata, using unstructured object");
                }
                None => {
                    debug!(%gvk, "type not registered, using unstructured object");
                }
            }
        }

        Ok(Box::new(UnstructuredObject::new(value)?))
    }
}

fn gvk_of(value: &Value) -> Option<GroupVersionKind> {
    let api_version = value.get("apiVersion")?.as_str()?;
    let kind = value.get("kind")?.as_str()?;
    Some(GroupVersionKind::from_api_version(api_version, kind))
}

type Decoder = fn(Value) -> Result<Box<dyn KubeObject>, serde_json::Error>;

fn decode_as<K>(value: Value) -> Result<Box<dyn KubeObject>, serde_json::Error>
where
    K: KubeObject + DeserializeOwned,
{
    Ok(Box::new(serde_json::from_value::<K>(value)?))
}

#[derive(Clone, Copy)]
enum Registration {
    Object(Decoder),
    /// The kind is known but its type doesn't have the full object metadata
    PartialMetadata,
}

/// Table of the concrete types the [`DynamicObjectCreator`] can decode, keyed by
/// group/version/kind. It's immutable once built.
#[derive(Default)]
pub struct TypeRegistry {
    types: HashMap<GroupVersionKind, Registration>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// A registry without types, everything becomes an [`UnstructuredObject`]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry with the most common built-in Kubernetes kinds
    pub fn kubernetes() -> Self {
        Self::builder()
            .register::<Pod>()
            .register::<Service>()
            .register::<ConfigMap>()
            .register::<Secret>()
            .register::<Namespace>()
            .register::<Node>()
            .register::<ServiceAccount>()
            .register::<PersistentVolumeClaim>()
            .register::<Deployment>()
            .register::<StatefulSet>()
            .register::<DaemonSet>()
            .register::<ReplicaSet>()
            .register::<Job>()
            .register::<CronJob>()
            .register::<Ingress>()
            .register::<NetworkPolicy>()
            .register::<Role>()
            .register::<RoleBinding>()
            .register::<ClusterRole>()
            .register::<ClusterRoleBinding>()
            .register::<HorizontalPodAutoscaler>()
            .register_partial_metadata(GroupVersionKind::new("", "v1", "List"))
            .register_partial_metadata(GroupVersionKind::new("meta.k8s.io", "v1", "Status"))
            .build()
    }

    pub fn contains(&self, gvk: &GroupVersionKind) -> bool {
        self.types.contains_key(gvk)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn get(&self, gvk: &GroupVersionKind) -> Option<Registration> {
        self.types.get(gvk).copied()
    }
}

#[derive(Default)]
pub struct TypeRegistryBuilder {
    types: HashMap<GroupVersionKind, Registration>,
}

impl TypeRegistryBuilder {
    /// Register a `k8s-openapi` type under its own group/version/kind
    pub fn register<K>(self) -> Self
    where
        K: k8s_openapi::Resource + KubeObject + DeserializeOwned,
    {
        let gvk = GroupVersionKind::new(K::GROUP, K::VERSION, K::KIND);
        self.register_as::<K>(gvk)
    }

    /// Register a type under an explicit group/version/kind, useful for custom resources
    pub fn register_as<K>(mut self, gvk: GroupVersionKind) -> Self
    where
        K: KubeObject + DeserializeOwned,
    {
        self.types
            .insert(gvk, Registration::Object(decode_as::<K> as Decoder));
        self
    }

    /// Mark a kind as known but lacking the full object metadata. Its objects are always
    /// decoded as [`UnstructuredObject`].
    pub fn register_partial_metadata(mut self, gvk: GroupVersionKind) -> Self {
        self.types.insert(gvk, Registration::PartialMetadata);
        self
    }

    pub fn build(self) -> TypeRegistry {
        TypeRegistry { types: self.types }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn pod_json() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "test",
                "namespace": "default",
                "labels": {"app": "nginx"},
                "annotations": {"owner": "team-a"}
            },
            "spec": {
                "containers": [{"name": "nginx", "image": "nginx:1.27"}]
            }
        }))
        .unwrap()
    }

    fn crd_json() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "apiVersion": "building.kubewebhook.slok.dev/v1",
            "kind": "House",
            "metadata": {
                "name": "test",
                "namespace": "default",
                "labels": {"city": "Bilbo"}
            },
            "spec": {
                "name": "newHouse",
                "address": "whatever 42",
                "owners": [{"name": "user1", "email": "user1@kubebwebhook.slok.dev"}]
            }
        }))
        .unwrap()
    }

    #[test]
    fn static_creator_decodes_into_the_concrete_type() {
        let creator = StaticObjectCreator::for_prototype(&Pod::default());
        let obj = creator.new_object(&pod_json()).unwrap();

        let pod = obj.downcast_ref::<Pod>().expect("should be a pod");
        assert_eq!(Some("test"), pod.metadata.name.as_deref());
        assert_eq!(
            "nginx",
            pod.spec.as_ref().unwrap().containers[0].name.as_str()
        );
    }

    #[test]
    fn static_creator_rejects_invalid_payloads() {
        let creator = StaticObjectCreator::<Pod>::new();
        let err = creator
            .new_object(br#"{"apiVersion": "v1", "kind": "Pod", "spec": "wrong"}"#)
            .unwrap_err();
        assert!(matches!(err, ObjectError::Deserialize(_)));
    }

    #[test]
    fn static_creator_accepts_yaml() {
        let raw = b"apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm\ndata:\n  a: b\n";
        let obj = StaticObjectCreator::<ConfigMap>::new()
            .new_object(raw)
            .unwrap();
        assert_eq!(Some("cm"), obj.name());
    }

    #[rstest]
    #[case::static_creator(static_object::<Pod>())]
    #[case::dynamic_creator(Arc::new(DynamicObjectCreator::new(Arc::new(TypeRegistry::kubernetes()))))]
    fn empty_raw_object_is_an_error(#[case] creator: Arc<dyn ObjectCreator>) {
        let err = creator.new_object(b"").unwrap_err();
        assert!(matches!(err, ObjectError::EmptyObject));
    }

    #[test]
    fn dynamic_creator_infers_registered_types() {
        let creator = DynamicObjectCreator::new(Arc::new(TypeRegistry::kubernetes()));
        let obj = creator.new_object(&pod_json()).unwrap();

        assert!(obj.downcast_ref::<Pod>().is_some());
        assert_eq!(Some("team-a"), obj.annotations().unwrap().get("owner").map(String::as_str));
    }

    #[test]
    fn dynamic_creator_falls_back_for_unknown_kinds() {
        let creator = DynamicObjectCreator::new(Arc::new(TypeRegistry::kubernetes()));
        let obj = creator.new_object(&crd_json()).unwrap();

        assert!(obj.downcast_ref::<UnstructuredObject>().is_some());
        assert_eq!(
            Some(&BTreeMap::from([("city".to_owned(), "Bilbo".to_owned())])),
            obj.labels()
        );
        // Fields unknown to any type are kept verbatim
        let json = obj.to_json().unwrap();
        assert_eq!(json!("whatever 42"), json["spec"]["address"]);
        assert_eq!(json!("House"), json["kind"]);
    }

    #[test]
    fn dynamic_creator_falls_back_when_typed_decoding_fails() {
        let creator = DynamicObjectCreator::new(Arc::new(TypeRegistry::kubernetes()));
        let obj = creator
            .new_object(br#"{"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "odd"}, "spec": "not-a-spec"}"#)
            .unwrap();

        assert!(obj.downcast_ref::<Pod>().is_none());
        assert_eq!(Some("odd"), obj.name());
    }

    #[test]
    fn dynamic_creator_falls_back_for_partial_metadata_kinds() {
        let registry = TypeRegistry::builder()
            .register_partial_metadata(GroupVersionKind::new("", "v1", "Pod"))
            .build();
        let creator = DynamicObjectCreator::new(Arc::new(registry));
        let obj = creator.new_object(&pod_json()).unwrap();

        assert!(obj.downcast_ref::<UnstructuredObject>().is_some());
        assert_eq!(Some("nginx"), obj.labels().unwrap().get("app").map(String::as_str));
    }

    #[test]
    fn dynamic_creator_with_scoped_registry() {
        let registry = TypeRegistry::builder().register::<ConfigMap>().build();
        assert_eq!(1, registry.len());
        assert!(registry.contains(&GroupVersionKind::new("", "v1", "ConfigMap")));

        let creator = DynamicObjectCreator::new(Arc::new(registry));
        let obj = creator.new_object(&pod_json()).unwrap();
        assert!(obj.downcast_ref::<UnstructuredObject>().is_some());
    }

    #[test]
    fn metadata_setters() {
        let mut obj = StaticObjectCreator::<Pod>::new()
            .new_object(&pod_json())
            .unwrap();

        obj.set_name("renamed");
        obj.set_namespace("other");
        obj.labels_mut().insert("team".to_owned(), "x".to_owned());
        obj.annotations_mut().remove("owner");

        let json = obj.to_json().unwrap();
        assert_eq!(json!("renamed"), json["metadata"]["name"]);
        assert_eq!(json!("other"), json["metadata"]["namespace"]);
        assert_eq!(json!({"app": "nginx", "team": "x"}), json["metadata"]["labels"]);
        assert_eq!(json!({}), json["metadata"]["annotations"]);
    }

    fn captured_house() -> Value {
        json!({
            "apiVersion": "building.kubewebhook.slok.dev/v1",
            "kind": "House",
            "metadata": {
                "name": "test",
                "namespace": "default",
                "creationTimestamp": null,
                "labels": {"city": "Bilbo"},
                "finalizers": null
            },
            "spec": {"address": "whatever 42", "rooms": null}
        })
    }

    #[test]
    fn unstructured_object_serializes_the_received_tree() {
        let obj = UnstructuredObject::new(captured_house()).unwrap();

        assert_eq!(captured_house(), obj.to_json().unwrap());
        assert_eq!(Some(&Value::Null), obj.pointer("/metadata/creationTimestamp"));
    }

    #[test]
    fn unstructured_object_metadata_changes() {
        let mut obj = UnstructuredObject::new(captured_house()).unwrap();
        obj.labels_mut().insert("team".to_owned(), "x".to_owned());
        obj.annotations_mut();
        obj.set_namespace("other");

        let mut expected = captured_house();
        expected["metadata"]["labels"]["team"] = json!("x");
        expected["metadata"]["namespace"] = json!("other");
        assert_eq!(expected, obj.to_json().unwrap());
    }

    #[test]
    fn unstructured_object_update_keeps_metadata_changes() {
        let mut obj = UnstructuredObject::new(captured_house()).unwrap();
        obj.labels_mut().insert("team".to_owned(), "x".to_owned());
        obj.update(|data| data["spec"]["rooms"] = json!(4));

        assert_eq!(Some(&json!(4)), obj.pointer("/spec/rooms"));
        assert_eq!(Some(&json!("x")), obj.pointer("/metadata/labels/team"));
        assert_eq!(Some("x"), obj.labels().unwrap().get("team").map(String::as_str));
    }

    #[test]
    fn unstructured_object_must_be_a_json_object() {
        let err = UnstructuredObject::new(json!(["not", "an", "object"])).unwrap_err();
        assert!(matches!(err, ObjectError::Deserialize(_)));
    }
}
