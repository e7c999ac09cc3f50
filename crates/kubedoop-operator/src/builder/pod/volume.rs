use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::{
        ConfigMapVolumeSource, EmptyDirVolumeSource, EphemeralVolumeSource,
        PersistentVolumeClaimSpec, PersistentVolumeClaimTemplate, SecretVolumeSource, Volume,
        VolumeMount, VolumeResourceRequirements,
    },
    apimachinery::pkg::api::resource::Quantity,
};

use crate::builder::meta::ObjectMetaBuilder;

/// The file mode of mounted config files, `0644`.
pub const DEFAULT_FILE_MODE: i32 = 0o644;

pub const SECRET_STORAGE_CLASS: &str = "secrets.kubedoop.dev";
pub const SECRET_CLASS_ANNOTATION: &str = "secrets.kubedoop.dev/class";
pub const SECRET_SCOPE_ANNOTATION: &str = "secrets.kubedoop.dev/scope";

/// A builder to build [`Volume`] objects. May only contain one `volume_source`
/// at a time. E.g. a call like `secret` after `empty_dir` will overwrite the
/// `empty_dir`.
#[derive(Clone, Debug, Default)]
pub struct VolumeBuilder {
    name: String,
    volume_source: VolumeSource,
}

#[derive(Clone, Debug)]
pub enum VolumeSource {
    ConfigMap(ConfigMapVolumeSource),
    EmptyDir(EmptyDirVolumeSource),
    Secret(SecretVolumeSource),
    Ephemeral(Box<EphemeralVolumeSource>),
}

impl Default for VolumeSource {
    fn default() -> Self {
        Self::EmptyDir(EmptyDirVolumeSource::default())
    }
}

impl VolumeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn config_map(&mut self, config_map: impl Into<ConfigMapVolumeSource>) -> &mut Self {
        self.volume_source = VolumeSource::ConfigMap(config_map.into());
        self
    }

    /// Mounts all keys of the named ConfigMap with [`DEFAULT_FILE_MODE`].
    pub fn with_config_map(&mut self, name: impl Into<String>) -> &mut Self {
        self.config_map(ConfigMapVolumeSource {
            name: name.into(),
            default_mode: Some(DEFAULT_FILE_MODE),
            ..ConfigMapVolumeSource::default()
        })
    }

    pub fn empty_dir(&mut self, empty_dir: impl Into<EmptyDirVolumeSource>) -> &mut Self {
        self.volume_source = VolumeSource::EmptyDir(empty_dir.into());
        self
    }

    pub fn with_empty_dir(
        &mut self,
        medium: Option<impl Into<String>>,
        quantity: Option<Quantity>,
    ) -> &mut Self {
        self.empty_dir(EmptyDirVolumeSource {
            medium: medium.map(Into::into),
            size_limit: quantity,
        })
    }

    pub fn secret(&mut self, secret: impl Into<SecretVolumeSource>) -> &mut Self {
        self.volume_source = VolumeSource::Secret(secret.into());
        self
    }

    pub fn with_secret(&mut self, secret_name: impl Into<String>, optional: bool) -> &mut Self {
        self.secret(SecretVolumeSource {
            secret_name: Some(secret_name.into()),
            optional: Some(optional),
            default_mode: Some(DEFAULT_FILE_MODE),
            ..SecretVolumeSource::default()
        })
    }

    pub fn ephemeral(&mut self, ephemeral: impl Into<EphemeralVolumeSource>) -> &mut Self {
        self.volume_source = VolumeSource::Ephemeral(Box::new(ephemeral.into()));
        self
    }

    pub fn build(&self) -> Volume {
        let name = self.name.clone();
        match &self.volume_source {
            VolumeSource::ConfigMap(cm) => Volume {
                name,
                config_map: Some(cm.clone()),
                ..Volume::default()
            },
            VolumeSource::EmptyDir(empty_dir) => Volume {
                name,
                empty_dir: Some(empty_dir.clone()),
                ..Volume::default()
            },
            VolumeSource::Secret(secret) => Volume {
                name,
                secret: Some(secret.clone()),
                ..Volume::default()
            },
            VolumeSource::Ephemeral(ephemeral) => Volume {
                name,
                ephemeral: Some((**ephemeral).clone()),
                ..Volume::default()
            },
        }
    }
}

/// A builder to build [`VolumeMount`] objects.
#[derive(Clone, Debug, Default)]
pub struct VolumeMountBuilder {
    name: String,
    mount_path: String,
    read_only: Option<bool>,
    sub_path: Option<String>,
}

impl VolumeMountBuilder {
    pub fn new(name: impl Into<String>, mount_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mount_path: mount_path.into(),
            ..Self::default()
        }
    }

    pub fn read_only(&mut self, read_only: bool) -> &mut Self {
        self.read_only = Some(read_only);
        self
    }

    pub fn sub_path(&mut self, sub_path: impl Into<String>) -> &mut Self {
        self.sub_path = Some(sub_path.into());
        self
    }

    pub fn build(&self) -> VolumeMount {
        VolumeMount {
            mount_path: self.mount_path.clone(),
            name: self.name.clone(),
            read_only: self.read_only,
            sub_path: self.sub_path.clone(),
            ..VolumeMount::default()
        }
    }
}

/// Where the secret operator takes the identity of a provisioned secret from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SecretOperatorVolumeScope {
    Node,
    Pod,
    Service { name: String },
}

impl SecretOperatorVolumeScope {
    fn to_annotation_value(&self) -> String {
        match self {
            Self::Node => "node".to_string(),
            Self::Pod => "pod".to_string(),
            Self::Service { name } => format!("service={name}"),
        }
    }
}

/// Builds an ephemeral volume that the secret operator fills with the contents of a
/// SecretClass, e.g. bind credentials of an LDAP server.
#[derive(Clone, Debug)]
pub struct SecretOperatorVolumeSourceBuilder {
    secret_class: String,
    scopes: Vec<SecretOperatorVolumeScope>,
}

impl SecretOperatorVolumeSourceBuilder {
    pub fn new(secret_class: impl Into<String>) -> Self {
        Self {
            secret_class: secret_class.into(),
            scopes: Vec::new(),
        }
    }

    pub fn with_node_scope(&mut self) -> &mut Self {
        self.scopes.push(SecretOperatorVolumeScope::Node);
        self
    }

    pub fn with_pod_scope(&mut self) -> &mut Self {
        self.scopes.push(SecretOperatorVolumeScope::Pod);
        self
    }

    pub fn with_service_scope(&mut self, name: impl Into<String>) -> &mut Self {
        self.scopes
            .push(SecretOperatorVolumeScope::Service { name: name.into() });
        self
    }

    pub fn build(&self) -> EphemeralVolumeSource {
        let mut annotations = BTreeMap::from([(
            SECRET_CLASS_ANNOTATION.to_string(),
            self.secret_class.clone(),
        )]);

        if !self.scopes.is_empty() {
            let scopes = self
                .scopes
                .iter()
                .map(SecretOperatorVolumeScope::to_annotation_value)
                .collect::<Vec<_>>()
                .join(",");
            annotations.insert(SECRET_SCOPE_ANNOTATION.to_string(), scopes);
        }

        EphemeralVolumeSource {
            volume_claim_template: Some(PersistentVolumeClaimTemplate {
                metadata: Some(ObjectMetaBuilder::new().with_annotations(annotations).build()),
                spec: PersistentVolumeClaimSpec {
                    storage_class_name: Some(SECRET_STORAGE_CLASS.to_string()),
                    resources: Some(VolumeResourceRequirements {
                        requests: Some(BTreeMap::from([(
                            "storage".to_string(),
                            Quantity("1Mi".to_string()),
                        )])),
                        ..VolumeResourceRequirements::default()
                    }),
                    access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                    ..PersistentVolumeClaimSpec::default()
                },
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_map_volume() {
        let volume = VolumeBuilder::new("config").with_config_map("simple-node-default").build();

        let config_map = volume.config_map.expect("config map source");
        assert_eq!(volume.name, "config");
        assert_eq!(config_map.name, "simple-node-default");
        assert_eq!(config_map.default_mode, Some(420));
    }

    #[test]
    fn later_source_wins() {
        let volume = VolumeBuilder::new("log")
            .with_secret("some-secret", false)
            .with_empty_dir(None::<String>, Some(Quantity("10Mi".to_string())))
            .build();

        assert_eq!(volume.secret, None);
        assert_eq!(
            volume.empty_dir.and_then(|empty_dir| empty_dir.size_limit),
            Some(Quantity("10Mi".to_string()))
        );
    }

    #[test]
    fn secret_operator_volume() {
        let source = SecretOperatorVolumeSourceBuilder::new("ldap-bind")
            .with_pod_scope()
            .with_node_scope()
            .build();

        let template = source.volume_claim_template.expect("claim template");
        let annotations = template
            .metadata
            .and_then(|metadata| metadata.annotations)
            .expect("annotations");
        assert_eq!(
            annotations,
            BTreeMap::from([
                (
                    "secrets.kubedoop.dev/class".to_string(),
                    "ldap-bind".to_string()
                ),
                ("secrets.kubedoop.dev/scope".to_string(), "pod,node".to_string()),
            ])
        );
        assert_eq!(
            template.spec.storage_class_name.as_deref(),
            Some("secrets.kubedoop.dev")
        );
        assert_eq!(
            template.spec.access_modes,
            Some(vec!["ReadWriteOnce".to_string()])
        );
    }
}
