use std::{num::TryFromIntError, time::Duration};

use indexmap::IndexMap;
use k8s_openapi::{
    api::core::v1::{
        Affinity, Container, LocalObjectReference, PodSpec, PodTemplateSpec, Toleration, Volume,
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use snafu::{ResultExt, Snafu};
use tracing::instrument;

use crate::commons::product_image::ResolvedProductImage;

pub mod container;
pub mod probe;
pub mod resources;
pub mod volume;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display("termination grace period is too long (got {duration:?}, maximum allowed is {max})", max = i64::MAX))]
    TerminationGracePeriodTooLong {
        source: TryFromIntError,
        duration: Duration,
    },

    #[snafu(display(
        "Colliding volume name {colliding_volume_name:?} in volumes with different content"
    ))]
    VolumeNameCollision { colliding_volume_name: String },
}

/// A builder to build [`PodTemplateSpec`] objects.
///
/// This struct is using an [`IndexMap`] for the volumes to have consistent ordering (so we don't
/// produce reconcile loops). It is easier to debug for users than a sorted map, as logically
/// grouped volumes are near each other in the list instead of "just" being sorted alphabetically.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PodBuilder {
    containers: Vec<Container>,
    init_containers: Option<Vec<Container>>,
    metadata: Option<ObjectMeta>,
    affinity: Option<Affinity>,
    tolerations: Option<Vec<Toleration>>,

    /// The key is the volume name.
    volumes: IndexMap<String, Volume>,
    image_pull_secrets: Option<Vec<LocalObjectReference>>,
    restart_policy: Option<String>,
    termination_grace_period_seconds: Option<i64>,
}

impl PodBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(&mut self, metadata: impl Into<ObjectMeta>) -> &mut Self {
        self.metadata = Some(metadata.into());
        self
    }

    pub fn affinity(&mut self, affinity: Affinity) -> &mut Self {
        self.affinity = Some(affinity);
        self
    }

    pub fn add_container(&mut self, container: Container) -> &mut Self {
        self.containers.push(container);
        self
    }

    pub fn add_init_container(&mut self, container: Container) -> &mut Self {
        self.init_containers
            .get_or_insert_with(Vec::new)
            .push(container);
        self
    }

    pub fn add_tolerations(&mut self, tolerations: Vec<Toleration>) -> &mut Self {
        if !tolerations.is_empty() {
            self.tolerations
                .get_or_insert_with(Vec::new)
                .extend(tolerations);
        }
        self
    }

    /// Adds a new [`Volume`] to the pod while ensuring that no colliding [`Volume`] exists.
    ///
    /// A colliding [`Volume`] would have the same name but a different content than another
    /// [`Volume`]. An appropriate error is returned when such a colliding volume name is
    /// encountered.
    #[instrument(skip(self))]
    pub fn add_volume(&mut self, volume: Volume) -> Result<&mut Self> {
        if let Some(existing_volume) = self.volumes.get(&volume.name) {
            if existing_volume != &volume {
                let colliding_volume_name = &volume.name;
                // We don't want to include the details in the error message, but instead trace them
                tracing::error!(
                    colliding_volume_name,
                    ?existing_volume,
                    "Colliding volume name in volumes with different content"
                );

                VolumeNameCollisionSnafu {
                    colliding_volume_name,
                }
                .fail()?;
            }
        } else {
            self.volumes.insert(volume.name.clone(), volume);
        }

        Ok(self)
    }

    pub fn image_pull_secrets_from_product_image(
        &mut self,
        product_image: &ResolvedProductImage,
    ) -> &mut Self {
        self.image_pull_secrets.clone_from(&product_image.pull_secrets);
        self
    }

    pub fn restart_policy(&mut self, restart_policy: &str) -> &mut Self {
        self.restart_policy = Some(String::from(restart_policy));
        self
    }

    pub fn termination_grace_period(
        &mut self,
        termination_grace_period: &Duration,
    ) -> Result<&mut Self> {
        let termination_grace_period_seconds = termination_grace_period
            .as_secs()
            .try_into()
            .context(TerminationGracePeriodTooLongSnafu {
                duration: *termination_grace_period,
            })?;

        self.termination_grace_period_seconds = Some(termination_grace_period_seconds);
        Ok(self)
    }

    /// Returns a [`PodTemplateSpec`], usable for building a
    /// [`StatefulSet`](`k8s_openapi::api::apps::v1::StatefulSet`),
    /// [`Deployment`](`k8s_openapi::api::apps::v1::Deployment`) or
    /// [`Job`](`k8s_openapi::api::batch::v1::Job`)
    pub fn build_template(&self) -> PodTemplateSpec {
        PodTemplateSpec {
            metadata: self.metadata.clone(),
            spec: Some(self.build_spec()),
        }
    }

    fn build_spec(&self) -> PodSpec {
        let volumes = if self.volumes.is_empty() {
            None
        } else {
            Some(self.volumes.values().cloned().collect())
        };

        PodSpec {
            containers: self.containers.clone(),
            init_containers: self.init_containers.clone(),
            affinity: self.affinity.clone(),
            tolerations: self.tolerations.clone(),
            volumes,
            // Legacy feature for ancient Docker images
            // In practice, this just causes a bunch of unused environment variables that may conflict with other uses.
            enable_service_links: Some(false),
            image_pull_secrets: self.image_pull_secrets.clone(),
            restart_policy: self.restart_policy.clone(),
            termination_grace_period_seconds: self.termination_grace_period_seconds,
            ..PodSpec::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::EmptyDirVolumeSource;
    use rstest::*;

    use crate::builder::{
        meta::ObjectMetaBuilder,
        pod::{container::ContainerBuilder, volume::VolumeBuilder},
    };

    use super::*;

    // A simple [`Container`] with a name and image.
    #[fixture]
    fn dummy_container() -> Container {
        ContainerBuilder::new("container")
            .expect("ContainerBuilder not created")
            .image("quay.io/zncdatadev/superset:4.0.2-kubedoop0.0.0-dev")
            .build()
    }

    /// A [`PodBuilder`] that already contains the minimum setup to build a template.
    #[fixture]
    fn pod_builder_with_name_and_container(dummy_container: Container) -> PodBuilder {
        let mut builder = PodBuilder::new();
        builder
            .metadata(ObjectMetaBuilder::new().name("testpod").build())
            .add_container(dummy_container);
        builder
    }

    #[rstest]
    fn pod_template(mut pod_builder_with_name_and_container: PodBuilder) {
        let template = pod_builder_with_name_and_container
            .add_init_container(
                ContainerBuilder::new("init")
                    .expect("valid name")
                    .image("apache/superset:dockerize")
                    .build(),
            )
            .restart_policy("Never")
            .termination_grace_period(&Duration::from_secs(120))
            .expect("grace period fits into i64")
            .build_template();

        let spec = template.spec.expect("pod spec");
        assert_eq!(spec.containers.len(), 1);
        assert_eq!(spec.init_containers.map(|init| init.len()), Some(1));
        assert_eq!(spec.restart_policy.as_deref(), Some("Never"));
        assert_eq!(spec.termination_grace_period_seconds, Some(120));
        assert_eq!(spec.enable_service_links, Some(false));
        assert_eq!(
            template.metadata.and_then(|metadata| metadata.name),
            Some("testpod".to_string())
        );
    }

    #[rstest]
    fn add_volume_with_same_content_is_idempotent(mut pod_builder_with_name_and_container: PodBuilder) {
        let volume = VolumeBuilder::new("config").with_config_map("cm").build();

        pod_builder_with_name_and_container
            .add_volume(volume.clone())
            .and_then(|pod| pod.add_volume(volume))
            .expect("identical volumes do not collide");

        let spec = pod_builder_with_name_and_container
            .build_template()
            .spec
            .expect("pod spec");
        assert_eq!(spec.volumes.map(|volumes| volumes.len()), Some(1));
    }

    #[rstest]
    fn add_colliding_volume(mut pod_builder_with_name_and_container: PodBuilder) {
        pod_builder_with_name_and_container
            .add_volume(VolumeBuilder::new("data").with_config_map("cm").build())
            .expect("first volume");

        let result = pod_builder_with_name_and_container.add_volume(
            VolumeBuilder::new("data")
                .empty_dir(EmptyDirVolumeSource::default())
                .build(),
        );

        assert_eq!(
            result.err(),
            Some(Error::VolumeNameCollision {
                colliding_volume_name: "data".to_string()
            })
        );
    }

    #[test]
    fn tolerations_are_left_unset_when_empty() {
        let template = PodBuilder::new().add_tolerations(vec![]).build_template();
        assert_eq!(template.spec.and_then(|spec| spec.tolerations), None);
    }
}
