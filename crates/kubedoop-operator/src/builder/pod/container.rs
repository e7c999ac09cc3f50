use std::{collections::BTreeMap, sync::LazyLock};

use indexmap::IndexMap;
use k8s_openapi::api::core::v1::{
    ConfigMapKeySelector, Container, ContainerPort, EnvFromSource, EnvVar, EnvVarSource, Probe,
    ResourceRequirements, SecretEnvSource, SecretKeySelector, VolumeMount,
};
use regex::Regex;
use snafu::{Snafu, ensure};
use tracing::warn;

use crate::builder::pod::probe::{
    LIVENESS_TIMINGS, ProbeHandler, READINESS_TIMINGS, STARTUP_TIMINGS, build_probe,
};

type Result<T, E = Error> = std::result::Result<T, E>;

const CONTAINER_NAME_MAX_LEN: usize = 63;

static RFC_1123_LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("failed to compile RFC 1123 label regex")
});

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display("container name {container_name:?} is not a valid RFC 1123 label"))]
    InvalidContainerName { container_name: String },

    #[snafu(display(
        "colliding mount path {mount_path:?} in volume mounts {existing_volume_name:?} and {new_volume_name:?}"
    ))]
    MountPathCollision {
        mount_path: String,
        existing_volume_name: String,
        new_volume_name: String,
    },
}

/// A builder to build [`Container`] objects.
///
/// Environment variables set with a literal value take precedence over variables referencing a
/// Secret or ConfigMap with the same name, regardless of the order in which they were added.
/// Collisions are logged as a warning.
#[derive(Clone, Debug, Default)]
pub struct ContainerBuilder {
    name: String,
    image: Option<String>,
    image_pull_policy: Option<String>,
    command: Option<Vec<String>>,
    args: Option<Vec<String>>,
    env: IndexMap<String, EnvVar>,
    env_from: Vec<EnvFromSource>,
    ports: Vec<ContainerPort>,
    /// The key is the mount path.
    volume_mounts: IndexMap<String, VolumeMount>,
    resources: Option<ResourceRequirements>,
    startup_probe: Option<Probe>,
    liveness_probe: Option<Probe>,
    readiness_probe: Option<Probe>,
}

impl ContainerBuilder {
    pub fn new(name: &str) -> Result<Self> {
        Self::validate_container_name(name)?;
        Ok(Self {
            name: name.to_string(),
            ..Self::default()
        })
    }

    pub fn image(&mut self, image: impl Into<String>) -> &mut Self {
        self.image = Some(image.into());
        self
    }

    pub fn image_pull_policy(&mut self, image_pull_policy: impl Into<String>) -> &mut Self {
        self.image_pull_policy = Some(image_pull_policy.into());
        self
    }

    pub fn command(&mut self, command: Vec<String>) -> &mut Self {
        self.command = Some(command);
        self
    }

    pub fn args(&mut self, args: Vec<String>) -> &mut Self {
        self.args = Some(args);
        self
    }

    /// Adds an environment variable with a literal value. Replaces a referencing variable of the
    /// same name.
    pub fn add_env_var(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        if let Some(existing) = self.env.get(&name)
            && existing.value_from.is_some()
        {
            warn!(env_var = name.as_str(), "literal environment variable replaces a reference");
        }
        self.env.insert(
            name.clone(),
            EnvVar {
                name,
                value: Some(value.into()),
                ..EnvVar::default()
            },
        );
        self
    }

    /// Adds all variables with literal values, e.g. user provided `envOverrides`.
    pub fn add_env_vars(&mut self, env_vars: &BTreeMap<String, String>) -> &mut Self {
        for (name, value) in env_vars {
            self.add_env_var(name, value);
        }
        self
    }

    pub fn add_env_var_from_secret(
        &mut self,
        name: impl Into<String>,
        secret_name: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> &mut Self {
        self.add_env_var_from_source(
            name.into(),
            EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: secret_name.into(),
                    key: secret_key.into(),
                    ..SecretKeySelector::default()
                }),
                ..EnvVarSource::default()
            },
        )
    }

    pub fn add_env_var_from_config_map(
        &mut self,
        name: impl Into<String>,
        config_map_name: impl Into<String>,
        config_map_key: impl Into<String>,
    ) -> &mut Self {
        self.add_env_var_from_source(
            name.into(),
            EnvVarSource {
                config_map_key_ref: Some(ConfigMapKeySelector {
                    name: config_map_name.into(),
                    key: config_map_key.into(),
                    ..ConfigMapKeySelector::default()
                }),
                ..EnvVarSource::default()
            },
        )
    }

    fn add_env_var_from_source(&mut self, name: String, value_from: EnvVarSource) -> &mut Self {
        if let Some(existing) = self.env.get(&name)
            && existing.value.is_some()
        {
            warn!(
                env_var = name.as_str(),
                "environment variable is already set to a literal value, ignoring the reference"
            );
            return self;
        }
        self.env.insert(
            name.clone(),
            EnvVar {
                name,
                value_from: Some(value_from),
                ..EnvVar::default()
            },
        );
        self
    }

    /// Exposes every key of the Secret as environment variable.
    pub fn add_env_from_secret(&mut self, secret_name: impl Into<String>) -> &mut Self {
        self.env_from.push(EnvFromSource {
            secret_ref: Some(SecretEnvSource {
                name: secret_name.into(),
                ..SecretEnvSource::default()
            }),
            ..EnvFromSource::default()
        });
        self
    }

    pub fn add_container_port(&mut self, name: impl Into<String>, port: i32) -> &mut Self {
        self.ports.push(ContainerPort {
            name: Some(name.into()),
            container_port: port,
            protocol: Some("TCP".to_string()),
            ..ContainerPort::default()
        });
        self
    }

    pub fn add_volume_mount(
        &mut self,
        name: impl Into<String>,
        path: impl Into<String>,
    ) -> Result<&mut Self> {
        self.add_volume_mount_struct(VolumeMount {
            name: name.into(),
            mount_path: path.into(),
            ..VolumeMount::default()
        })
    }

    /// Adds a [`VolumeMount`] while making sure no other volume is mounted at the same path.
    pub fn add_volume_mount_struct(&mut self, volume_mount: VolumeMount) -> Result<&mut Self> {
        if let Some(existing) = self.volume_mounts.get(&volume_mount.mount_path) {
            ensure!(
                existing == &volume_mount,
                MountPathCollisionSnafu {
                    mount_path: &volume_mount.mount_path,
                    existing_volume_name: &existing.name,
                    new_volume_name: &volume_mount.name,
                }
            );
        } else {
            self.volume_mounts
                .insert(volume_mount.mount_path.clone(), volume_mount);
        }
        Ok(self)
    }

    pub fn resources(&mut self, resources: ResourceRequirements) -> &mut Self {
        self.resources = Some(resources);
        self
    }

    pub fn startup_probe(&mut self, probe: Probe) -> &mut Self {
        self.startup_probe = Some(probe);
        self
    }

    pub fn liveness_probe(&mut self, probe: Probe) -> &mut Self {
        self.liveness_probe = Some(probe);
        self
    }

    pub fn readiness_probe(&mut self, probe: Probe) -> &mut Self {
        self.readiness_probe = Some(probe);
        self
    }

    /// Sets startup, liveness and readiness probes derived from the ports added so far.
    /// Containers without a port of a well known name get no probes.
    pub fn automatic_probes(&mut self) -> &mut Self {
        if let Some(handler) = ProbeHandler::from_ports(&self.ports) {
            self.probes_with_handler(&handler);
        }
        self
    }

    /// Sets startup, liveness and readiness probes which GET `/health` on the port named `http`.
    pub fn probes_with_health(&mut self) -> &mut Self {
        self.probes_with_handler(&ProbeHandler::health())
    }

    fn probes_with_handler(&mut self, handler: &ProbeHandler) -> &mut Self {
        self.startup_probe = Some(build_probe(handler, STARTUP_TIMINGS));
        self.liveness_probe = Some(build_probe(handler, LIVENESS_TIMINGS));
        self.readiness_probe = Some(build_probe(handler, READINESS_TIMINGS));
        self
    }

    pub fn build(&self) -> Container {
        Container {
            name: self.name.clone(),
            image: self.image.clone(),
            image_pull_policy: self.image_pull_policy.clone(),
            command: self.command.clone(),
            args: self.args.clone(),
            env: (!self.env.is_empty()).then(|| self.env.values().cloned().collect()),
            env_from: (!self.env_from.is_empty()).then(|| self.env_from.clone()),
            ports: (!self.ports.is_empty()).then(|| self.ports.clone()),
            volume_mounts: (!self.volume_mounts.is_empty())
                .then(|| self.volume_mounts.values().cloned().collect()),
            resources: self.resources.clone(),
            startup_probe: self.startup_probe.clone(),
            liveness_probe: self.liveness_probe.clone(),
            readiness_probe: self.readiness_probe.clone(),
            ..Container::default()
        }
    }

    /// Validates a container name is according to the [RFC 1123](https://www.ietf.org/rfc/rfc1123.txt) standard.
    /// Returns [Ok] if the name matches the standard and [Err] if it does not.
    fn validate_container_name(name: &str) -> Result<()> {
        let valid = name.len() <= CONTAINER_NAME_MAX_LEN && RFC_1123_LABEL_REGEX.is_match(name);
        ensure!(
            valid,
            InvalidContainerNameSnafu {
                container_name: name
            }
        );
        Ok(())
    }
}
