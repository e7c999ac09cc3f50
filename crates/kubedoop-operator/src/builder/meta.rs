use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use snafu::{OptionExt, Snafu};

use crate::kvp::Labels;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display("failed to set owner reference: owner has no {field}"))]
    OwnerMissingField { field: &'static str },
}

/// A builder to build [`ObjectMeta`] objects.
///
/// Of special interest is the [`Self::ownerreference_from_resource`] function which can be used
/// to automatically set the owner reference of a child object.
#[derive(Clone, Debug, Default)]
pub struct ObjectMetaBuilder {
    name: Option<String>,
    namespace: Option<String>,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    ownerreference: Option<OwnerReference>,
}

impl ObjectMetaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    pub fn namespace(&mut self, namespace: impl Into<String>) -> &mut Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn namespace_opt(&mut self, namespace: impl Into<Option<String>>) -> &mut Self {
        self.namespace = namespace.into();
        self
    }

    pub fn ownerreference(&mut self, ownerreference: OwnerReference) -> &mut Self {
        self.ownerreference = Some(ownerreference);
        self
    }

    /// This can be used to set the `OwnerReference` to the provided resource.
    pub fn ownerreference_from_resource<T: Resource<DynamicType = ()>>(
        &mut self,
        resource: &T,
        block_owner_deletion: Option<bool>,
        controller: Option<bool>,
    ) -> Result<&mut Self> {
        self.ownerreference = Some(
            OwnerReferenceBuilder::new()
                .initialize_from_resource(resource)
                .block_owner_deletion_opt(block_owner_deletion)
                .controller_opt(controller)
                .build()?,
        );
        Ok(self)
    }

    pub fn with_labels(&mut self, labels: Labels) -> &mut Self {
        self.labels.extend(BTreeMap::from(labels));
        self
    }

    pub fn with_annotations(&mut self, annotations: BTreeMap<String, String>) -> &mut Self {
        self.annotations.extend(annotations);
        self
    }

    pub fn build(&self) -> ObjectMeta {
        ObjectMeta {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            owner_references: self.ownerreference.clone().map(|ownerreference| vec![ownerreference]),
            labels: (!self.labels.is_empty()).then(|| self.labels.clone()),
            annotations: (!self.annotations.is_empty()).then(|| self.annotations.clone()),
            ..ObjectMeta::default()
        }
    }
}

/// A builder to build [`OwnerReference`] objects.
#[derive(Clone, Debug, Default)]
pub struct OwnerReferenceBuilder {
    api_version: Option<String>,
    block_owner_deletion: Option<bool>,
    controller: Option<bool>,
    kind: Option<String>,
    name: Option<String>,
    uid: Option<String>,
}

impl OwnerReferenceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_owner_deletion_opt(&mut self, block_owner_deletion: Option<bool>) -> &mut Self {
        self.block_owner_deletion = block_owner_deletion;
        self
    }

    pub fn controller_opt(&mut self, controller: Option<bool>) -> &mut Self {
        self.controller = controller;
        self
    }

    pub fn initialize_from_resource<T: Resource<DynamicType = ()>>(
        &mut self,
        resource: &T,
    ) -> &mut Self {
        self.api_version = Some(T::api_version(&()).to_string());
        self.kind = Some(T::kind(&()).to_string());
        self.name = Some(resource.name_any());
        self.uid = resource.meta().uid.clone();
        self
    }

    pub fn build(&self) -> Result<OwnerReference> {
        Ok(OwnerReference {
            api_version: self
                .api_version
                .clone()
                .context(OwnerMissingFieldSnafu {
                    field: "apiVersion",
                })?,
            block_owner_deletion: self.block_owner_deletion,
            controller: self.controller,
            kind: self
                .kind
                .clone()
                .context(OwnerMissingFieldSnafu { field: "kind" })?,
            name: self
                .name
                .clone()
                .context(OwnerMissingFieldSnafu { field: "name" })?,
            uid: self
                .uid
                .clone()
                .context(OwnerMissingFieldSnafu { field: "uid" })?,
        })
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::Pod;

    use super::*;

    fn owner(uid: Option<&str>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("owner".to_string()),
                namespace: Some("default".to_string()),
                uid: uid.map(ToString::to_string),
                ..ObjectMeta::default()
            },
            ..Pod::default()
        }
    }

    #[test]
    fn objectmeta_builder() {
        let owner = owner(Some("uid-1"));
        let meta = ObjectMetaBuilder::new()
            .name("owner")
            .namespace("default")
            .with_labels(Labels::common("superset", "simple").expect("valid labels"))
            .with_annotations(BTreeMap::from([("a".to_string(), "b".to_string())]))
            .ownerreference_from_resource(&owner, Some(true), Some(true))
            .expect("owner has a uid")
            .build();

        assert_eq!(meta.name.as_deref(), Some("owner"));
        assert_eq!(meta.namespace.as_deref(), Some("default"));
        assert_eq!(
            meta.labels
                .expect("labels")
                .get("app.kubernetes.io/instance")
                .map(String::as_str),
            Some("simple")
        );
        assert_eq!(meta.annotations.expect("annotations").len(), 1);

        let owner_references = meta.owner_references.expect("owner references");
        assert_eq!(owner_references.len(), 1);
        let reference = &owner_references[0];
        assert_eq!(reference.kind, "Pod");
        assert_eq!(reference.api_version, "v1");
        assert_eq!(reference.uid, "uid-1");
        assert_eq!(reference.controller, Some(true));
    }

    #[test]
    fn empty_maps_are_left_unset() {
        let meta = ObjectMetaBuilder::new().name("plain").build();
        assert_eq!(meta.labels, None);
        assert_eq!(meta.annotations, None);
        assert_eq!(meta.owner_references, None);
    }

    #[test]
    fn owner_without_uid_is_rejected() {
        let owner = owner(None);
        let result = OwnerReferenceBuilder::new()
            .initialize_from_resource(&owner)
            .build();
        assert_eq!(result, Err(Error::OwnerMissingField { field: "uid" }));
    }
}
