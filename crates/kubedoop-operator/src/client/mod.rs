//! Access to the Kubernetes API.
//!
//! [`Client`] is a thin wrapper around [`kube::Client`]. [`ResourceClient`] is bound to one owner
//! object and is the only place the reconcilers write through: every object it creates or
//! updates carries the owner reference and the owner's labels.
use std::fmt::Debug;

use k8s_openapi::{
    ClusterResourceScope, NamespaceResourceScope, api::core::v1::Secret,
    apimachinery::pkg::apis::meta::v1::OwnerReference,
};
use kube::{
    Api, Resource, ResourceExt,
    api::{DeleteParams, ListParams, Patch, PatchParams, PostParams},
    client::Client as KubeClient,
};
use serde::{Serialize, de::DeserializeOwned};
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::{debug, error, info, instrument, warn};

use crate::{builder::meta::OwnerReferenceBuilder, kvp::Labels};

pub mod managed;
pub mod patch;

pub use managed::ManagedResource;

use crate::kvp::consts::LAST_APPLIED_CONFIGURATION_KEY;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to create kubernetes client"))]
    CreateKubeClient { source: kube::Error },

    #[snafu(display("{kind} {name:?} not found in namespace {namespace:?}"))]
    ObjectNotFound {
        kind: String,
        name: String,
        namespace: String,
    },

    #[snafu(display("failed to get {kind} {name:?} in namespace {namespace:?}"))]
    GetObject {
        source: kube::Error,
        kind: String,
        name: String,
        namespace: String,
    },

    #[snafu(display("failed to list {kind} in namespace {namespace:?}"))]
    ListObjects {
        source: kube::Error,
        kind: String,
        namespace: String,
    },

    #[snafu(display("failed to create {kind} {name:?}"))]
    CreateObject {
        source: kube::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to replace {kind} {name:?}"))]
    ReplaceObject {
        source: kube::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to delete {kind} {name:?}"))]
    DeleteObject {
        source: kube::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to patch the status of {kind} {name:?}"))]
    PatchStatus {
        source: kube::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("object is missing key {key:?}"))]
    MissingObjectKey { key: &'static str },

    #[snafu(display("failed to build the owner reference"))]
    BuildOwnerReference { source: crate::builder::meta::Error },

    #[snafu(display("failed to serialize {kind} {name:?}"))]
    SerializeObject {
        source: serde_json::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("secret {name:?} in namespace {namespace:?} has no key {key:?}"))]
    MissingSecretKey {
        name: String,
        namespace: String,
        key: String,
    },

    #[snafu(display("key {key:?} of secret {name:?} in namespace {namespace:?} is not valid UTF-8"))]
    InvalidSecretValue {
        source: std::string::FromUtf8Error,
        name: String,
        namespace: String,
        key: String,
    },
}

/// Creates a [`Client`] from the in-cluster configuration or the local kubeconfig.
pub async fn initialize_operator(field_manager: Option<String>) -> Result<Client> {
    let client = KubeClient::try_default()
        .await
        .context(CreateKubeClientSnafu)?;
    Ok(Client::new(client, field_manager))
}

/// This `Client` can be used to access Kubernetes.
/// It wraps an underlying [`kube::Client`] and provides some common functionality.
#[derive(Clone)]
pub struct Client {
    client: KubeClient,
    post_params: PostParams,
    patch_params: PatchParams,
}

impl Client {
    pub fn new(client: KubeClient, field_manager: Option<String>) -> Self {
        Self {
            client,
            post_params: PostParams {
                field_manager: field_manager.clone(),
                ..PostParams::default()
            },
            patch_params: PatchParams {
                field_manager,
                ..PatchParams::default()
            },
        }
    }

    /// Returns a [`kube::Client`] that can be freely used.
    pub fn as_kube_client(&self) -> KubeClient {
        self.client.clone()
    }

    /// Retrieves a single namespaced object, `None` if it does not exist.
    pub async fn get_opt<K>(&self, name: &str, namespace: &str) -> Result<Option<K>>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + Debug
            + DeserializeOwned,
    {
        self.get_api::<K>(namespace)
            .get_opt(name)
            .await
            .with_context(|_| GetObjectSnafu {
                kind: K::kind(&()).to_string(),
                name,
                namespace,
            })
    }

    /// Retrieves a single cluster scoped object.
    pub async fn get_cluster_scoped<K>(&self, name: &str) -> Result<K>
    where
        K: Resource<DynamicType = (), Scope = ClusterResourceScope>
            + Clone
            + Debug
            + DeserializeOwned,
    {
        let kind = K::kind(&()).to_string();
        Api::<K>::all(self.client.clone())
            .get_opt(name)
            .await
            .with_context(|_| GetObjectSnafu {
                kind: kind.clone(),
                name,
                namespace: "",
            })?
            .with_context(|| ObjectNotFoundSnafu {
                kind,
                name,
                namespace: "",
            })
    }

    /// Lists the objects in `namespace` matching `list_params`.
    pub async fn list<K>(&self, namespace: &str, list_params: &ListParams) -> Result<Vec<K>>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + Debug
            + DeserializeOwned,
    {
        self.get_api::<K>(namespace)
            .list(list_params)
            .await
            .map(|list| list.items)
            .with_context(|_| ListObjectsSnafu {
                kind: K::kind(&()).to_string(),
                namespace,
            })
    }

    pub async fn create<K>(&self, resource: &K) -> Result<K>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + Debug
            + Serialize
            + DeserializeOwned,
    {
        let namespace = resource.namespace().unwrap_or_default();
        self.get_api::<K>(&namespace)
            .create(&self.post_params, resource)
            .await
            .with_context(|_| CreateObjectSnafu {
                kind: K::kind(&()).to_string(),
                name: resource.name_any(),
            })
    }

    /// Replaces an existing object. The `resourceVersion` of `resource` must match the live one.
    pub async fn replace<K>(&self, resource: &K) -> Result<K>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + Debug
            + Serialize
            + DeserializeOwned,
    {
        let namespace = resource.namespace().unwrap_or_default();
        self.get_api::<K>(&namespace)
            .replace(&resource.name_any(), &self.post_params, resource)
            .await
            .with_context(|_| ReplaceObjectSnafu {
                kind: K::kind(&()).to_string(),
                name: resource.name_any(),
            })
    }

    /// Deletes `resource`, its dependents are removed in the background.
    pub async fn delete<K>(&self, resource: &K) -> Result<()>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + Debug
            + DeserializeOwned,
    {
        let namespace = resource.namespace().unwrap_or_default();
        self.get_api::<K>(&namespace)
            .delete(&resource.name_any(), &DeleteParams::background())
            .await
            .with_context(|_| DeleteObjectSnafu {
                kind: K::kind(&()).to_string(),
                name: resource.name_any(),
            })?;
        Ok(())
    }

    /// Merges `status` into the status subresource of `resource`.
    pub async fn merge_patch_status<K, S>(&self, resource: &K, status: &S) -> Result<K>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + Debug
            + DeserializeOwned,
        S: Serialize + Debug,
    {
        let namespace = resource.namespace().unwrap_or_default();
        let patch = serde_json::json!({ "status": status });
        self.get_api::<K>(&namespace)
            .patch_status(&resource.name_any(), &self.patch_params, &Patch::Merge(patch))
            .await
            .with_context(|_| PatchStatusSnafu {
                kind: K::kind(&()).to_string(),
                name: resource.name_any(),
            })
    }

    pub fn get_api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// A [`Client`] bound to the object owning everything it writes.
#[derive(Clone)]
pub struct ResourceClient {
    client: Client,
    owner_reference: OwnerReference,
    owner_name: String,
    owner_uid: String,
    namespace: String,
    labels: Labels,
}

impl ResourceClient {
    /// Binds `client` to `owner`. `labels` are added to every object written.
    pub fn new<O>(client: Client, owner: &O, labels: Labels) -> Result<Self>
    where
        O: Resource<DynamicType = ()>,
    {
        let owner_reference = OwnerReferenceBuilder::new()
            .initialize_from_resource(owner)
            .block_owner_deletion_opt(Some(true))
            .controller_opt(Some(true))
            .build()
            .context(BuildOwnerReferenceSnafu)?;

        Ok(Self {
            client,
            owner_name: owner.name_any(),
            owner_uid: owner_reference.uid.clone(),
            namespace: owner
                .namespace()
                .context(MissingObjectKeySnafu { key: "namespace" })?,
            owner_reference,
            labels,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn owner_name(&self) -> &str {
        &self.owner_name
    }

    pub fn owner_uid(&self) -> &str {
        &self.owner_uid
    }

    pub fn owner_reference(&self) -> &OwnerReference {
        &self.owner_reference
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// Fetches an object by name, from the owner's namespace unless `namespace` is given.
    #[instrument(skip(self), fields(kind = %K::kind(&())))]
    pub async fn get<K>(&self, name: &str, namespace: Option<&str>) -> Result<K>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + Debug
            + DeserializeOwned,
    {
        let namespace = namespace.unwrap_or(&self.namespace);
        match self.client.get_opt::<K>(name, namespace).await {
            Ok(Some(object)) => Ok(object),
            Ok(None) => {
                debug!(name, namespace, "object not found");
                ObjectNotFoundSnafu {
                    kind: K::kind(&()).to_string(),
                    name,
                    namespace,
                }
                .fail()
            }
            Err(err) => {
                error!(name, namespace, error = &err as &dyn std::error::Error, "failed to get object");
                Err(err)
            }
        }
    }

    /// Reads one key of a secret in the owner's namespace as a string. A missing key is an error.
    pub async fn get_secret_value(&self, name: &str, key: &str) -> Result<String> {
        let secret = self.get::<Secret>(name, None).await?;
        secret_value(&secret, key)
    }

    /// Sets the namespace, the owner reference and the owner's labels on `resource`. Labels
    /// already present on the object take precedence.
    pub fn apply_ownership<K: Resource>(&self, resource: &mut K) {
        let meta = resource.meta_mut();
        if meta.namespace.is_none() {
            meta.namespace = Some(self.namespace.clone());
        }

        let owner_references = meta.owner_references.get_or_insert_with(Vec::new);
        if !owner_references
            .iter()
            .any(|reference| reference.uid == self.owner_reference.uid)
        {
            owner_references.push(self.owner_reference.clone());
        }

        let labels = meta.labels.get_or_insert_with(Default::default);
        for (key, value) in self.labels.iter() {
            labels.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    /// Creates `resource` if it does not exist, otherwise replaces it when it differs from the
    /// live object. Kinds which cannot be replaced are deleted and created by the next call.
    /// Returns whether anything was written.
    #[instrument(skip_all, fields(kind = %K::kind(&()), name = resource.name_any()))]
    pub async fn create_or_update<K: ManagedResource>(&self, mut resource: K) -> Result<bool> {
        self.apply_ownership(&mut resource);
        let name = resource
            .meta()
            .name
            .clone()
            .context(MissingObjectKeySnafu { key: "name" })?;
        let namespace = resource.namespace().unwrap_or_else(|| self.namespace.clone());

        match self.client.get_opt::<K>(&name, &namespace).await? {
            None => {
                info!("creating object");
                self.client.create(&prepare_create(resource)?).await?;
                Ok(true)
            }
            Some(live) => match prepare_update(resource, &live)? {
                None => {
                    debug!("object is up to date");
                    Ok(false)
                }
                Some(_) if K::recreate_on_change() => {
                    info!("deleting object to create it again");
                    self.client.delete(&live).await?;
                    Ok(true)
                }
                Some(update) => {
                    info!("updating object");
                    self.client.replace(&update).await?;
                    Ok(true)
                }
            },
        }
    }
}

/// Returns `desired` as it is created, with its state recorded in the last applied annotation.
pub fn prepare_create<K: ManagedResource>(mut desired: K) -> Result<K> {
    set_last_applied_configuration(&mut desired)?;
    Ok(desired)
}

/// Returns the object to replace `live` with, or `None` if `desired` matches it.
pub fn prepare_update<K: ManagedResource>(mut desired: K, live: &K) -> Result<Option<K>> {
    desired.preserve_server_fields(live);

    let changed = match has_changed(&desired, live) {
        Ok(changed) => changed,
        Err(err) => {
            warn!(
                error = err.as_ref() as &dyn std::error::Error,
                "failed to compare with the live object, assuming it changed"
            );
            true
        }
    };
    if !changed {
        return Ok(None);
    }

    set_last_applied_configuration(&mut desired)?;
    desired
        .meta_mut()
        .resource_version
        .clone_from(&live.meta().resource_version);
    Ok(Some(desired))
}

fn has_changed<K: ManagedResource>(
    desired: &K,
    live: &K,
) -> std::result::Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    let desired = serde_json::to_value(desired)?;
    let live = serde_json::to_value(live)?;
    let patch = patch::calculate_patch(&live, &desired, &K::ignored_diff_pointers())?;
    Ok(!patch.0.is_empty())
}

/// Records the current state of `resource` in the last applied annotation.
fn set_last_applied_configuration<K: ManagedResource>(resource: &mut K) -> Result<()> {
    if let Some(annotations) = resource.meta_mut().annotations.as_mut() {
        annotations.remove(LAST_APPLIED_CONFIGURATION_KEY);
        if annotations.is_empty() {
            resource.meta_mut().annotations = None;
        }
    }

    let serialized = serde_json::to_string(resource).with_context(|_| SerializeObjectSnafu {
        kind: K::kind(&()).to_string(),
        name: resource.name_any(),
    })?;
    resource
        .annotations_mut()
        .insert(LAST_APPLIED_CONFIGURATION_KEY.to_string(), serialized);
    Ok(())
}

/// Reads `key` of `secret`, from `data` or `stringData`.
pub fn secret_value(secret: &Secret, key: &str) -> Result<String> {
    let name = secret.name_any();
    let namespace = secret.namespace().unwrap_or_default();

    if let Some(value) = secret.data.as_ref().and_then(|data| data.get(key)) {
        return String::from_utf8(value.0.clone()).context(InvalidSecretValueSnafu {
            name,
            namespace,
            key,
        });
    }

    secret
        .string_data
        .as_ref()
        .and_then(|data| data.get(key))
        .cloned()
        .context(MissingSecretKeySnafu {
            name,
            namespace,
            key,
        })
}

#[cfg(test)]
mod tests {
    use k8s_openapi::{
        ByteString,
        api::core::v1::{Service, ServicePort, ServiceSpec},
    };
    use kube::api::ObjectMeta;
    use serde_json::json;

    use super::*;

    fn desired_service() -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some("simple-node-default".to_string()),
                namespace: Some("default".to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    name: Some("http".to_string()),
                    port: 8088,
                    ..ServicePort::default()
                }]),
                ..ServiceSpec::default()
            }),
            ..Service::default()
        }
    }

    /// What the API server returns after `written` was stored.
    fn as_stored(written: &Service, cluster_ip: &str) -> Service {
        let mut value = serde_json::to_value(written).expect("serializable");
        value["metadata"]["uid"] = json!("5b2c");
        value["metadata"]["resourceVersion"] = json!("7");
        value["metadata"]["creationTimestamp"] = json!("2024-05-01T10:00:00Z");
        value["spec"]["clusterIP"] = json!(cluster_ip);
        value["spec"]["clusterIPs"] = json!([cluster_ip]);
        value["spec"]["type"] = json!("ClusterIP");
        value["spec"]["sessionAffinity"] = json!("None");
        value["spec"]["ports"][0]["protocol"] = json!("TCP");
        value["spec"]["ports"][0]["targetPort"] = json!(8088);
        value["status"] = json!({"loadBalancer": {}});
        serde_json::from_value(value).expect("valid service")
    }

    #[test]
    fn update_retains_cluster_ip() {
        let mut previous = desired_service();
        set_last_applied_configuration(&mut previous).expect("serializable");
        let live = as_stored(&previous, "10.0.0.5");

        let mut desired = desired_service();
        desired
            .spec
            .as_mut()
            .and_then(|spec| spec.ports.as_mut())
            .expect("ports are set")[0]
            .port = 8089;

        let update = prepare_update(desired, &live)
            .expect("update is computable")
            .expect("port change is an update");

        assert_eq!(
            update.spec.as_ref().and_then(|spec| spec.cluster_ip.as_deref()),
            Some("10.0.0.5")
        );
        assert_eq!(update.metadata.resource_version.as_deref(), Some("7"));
        assert!(
            update
                .annotations()
                .contains_key(LAST_APPLIED_CONFIGURATION_KEY)
        );
    }

    #[test]
    fn unchanged_object_is_not_written() {
        let mut written = desired_service();
        set_last_applied_configuration(&mut written).expect("serializable");
        let live = as_stored(&written, "10.0.0.5");

        let first = prepare_update(desired_service(), &live).expect("update is computable");
        assert!(first.is_none(), "unexpected update: {first:?}");
    }

    #[test]
    fn unreadable_last_applied_assumes_changed() {
        let mut live = as_stored(&desired_service(), "10.0.0.5");
        live.annotations_mut().insert(
            LAST_APPLIED_CONFIGURATION_KEY.to_string(),
            "{broken".to_string(),
        );

        let update = prepare_update(desired_service(), &live).expect("update is computable");
        assert!(update.is_some());
    }

    #[test]
    fn last_applied_does_not_contain_itself() {
        let mut service = desired_service();
        set_last_applied_configuration(&mut service).expect("serializable");
        set_last_applied_configuration(&mut service).expect("serializable");

        let recorded: Service = serde_json::from_str(
            service
                .annotations()
                .get(LAST_APPLIED_CONFIGURATION_KEY)
                .expect("annotation is set"),
        )
        .expect("annotation holds the object");
        assert!(recorded.metadata.annotations.is_none());
    }

    #[test]
    fn secret_values() {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some("db".to_string()),
                namespace: Some("default".to_string()),
                ..ObjectMeta::default()
            },
            data: Some(
                [("host".to_string(), ByteString(b"postgres".to_vec()))]
                    .into_iter()
                    .collect(),
            ),
            ..Secret::default()
        };

        assert_eq!(secret_value(&secret, "host").expect("key exists"), "postgres");
        let err = secret_value(&secret, "port").expect_err("key is missing");
        assert_eq!(
            err.to_string(),
            r#"secret "db" in namespace "default" has no key "port""#
        );
    }
}
