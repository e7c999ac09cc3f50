//! Builders for the objects that run pods: [`Deployment`], [`StatefulSet`] and [`Job`].
//!
//! All three take a ready [`PodTemplateSpec`] (see [`PodBuilder`](super::pod::PodBuilder)) and
//! optionally user supplied pod overrides, which are merged on top of the built template.
use std::collections::BTreeMap;

use k8s_openapi::{
    DeepMerge,
    api::{
        apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec},
        batch::v1::{Job, JobSpec},
        core::v1::PodTemplateSpec,
    },
    apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta},
};
use snafu::{OptionExt, Snafu};

use crate::kvp::Labels;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display("{kind} is missing key {key:?}"))]
    MissingObjectKey {
        kind: &'static str,
        key: &'static str,
    },
}

/// State shared by all workload builders.
#[derive(Clone, Debug, Default)]
struct WorkloadTemplate {
    metadata: ObjectMeta,
    match_labels: Option<BTreeMap<String, String>>,
    replicas: Option<i32>,
    template: Option<PodTemplateSpec>,
    pod_overrides: Option<PodTemplateSpec>,
}

impl WorkloadTemplate {
    fn selector(&self, kind: &'static str) -> Result<LabelSelector> {
        let match_labels = self
            .match_labels
            .clone()
            .context(MissingObjectKeySnafu {
                kind,
                key: "selector",
            })?;
        Ok(LabelSelector {
            match_labels: Some(match_labels),
            ..LabelSelector::default()
        })
    }

    fn pod_template(&self, kind: &'static str) -> Result<PodTemplateSpec> {
        let mut template = self.template.clone().context(MissingObjectKeySnafu {
            kind,
            key: "template",
        })?;
        if let Some(match_labels) = &self.match_labels {
            template
                .metadata
                .get_or_insert_with(ObjectMeta::default)
                .labels
                .get_or_insert_with(BTreeMap::new)
                .extend(match_labels.clone());
        }
        if let Some(pod_overrides) = &self.pod_overrides {
            template.merge_from(pod_overrides.clone());
        }
        Ok(template)
    }
}

macro_rules! workload_setters {
    () => {
        /// The labels selecting the pods of this workload. They are added to the pod template
        /// labels as well.
        pub fn match_labels(&mut self, labels: Labels) -> &mut Self {
            self.inner.match_labels = Some(labels.into());
            self
        }

        pub fn pod_template(&mut self, template: PodTemplateSpec) -> &mut Self {
            self.inner.template = Some(template);
            self
        }

        /// Merged on top of the pod template, see [`DeepMerge`].
        pub fn pod_overrides(&mut self, pod_overrides: PodTemplateSpec) -> &mut Self {
            self.inner.pod_overrides = Some(pod_overrides);
            self
        }
    };
}

#[derive(Clone, Debug, Default)]
pub struct DeploymentBuilder {
    inner: WorkloadTemplate,
}

impl DeploymentBuilder {
    pub fn new(metadata: impl Into<ObjectMeta>) -> Self {
        Self {
            inner: WorkloadTemplate {
                metadata: metadata.into(),
                ..WorkloadTemplate::default()
            },
        }
    }

    workload_setters!();

    pub fn replicas(&mut self, replicas: i32) -> &mut Self {
        self.inner.replicas = Some(replicas);
        self
    }

    pub fn build(&self) -> Result<Deployment> {
        Ok(Deployment {
            metadata: self.inner.metadata.clone(),
            spec: Some(DeploymentSpec {
                replicas: self.inner.replicas,
                selector: self.inner.selector("Deployment")?,
                template: self.inner.pod_template("Deployment")?,
                ..DeploymentSpec::default()
            }),
            status: None,
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct StatefulSetBuilder {
    inner: WorkloadTemplate,
    service_name: Option<String>,
}

impl StatefulSetBuilder {
    pub fn new(metadata: impl Into<ObjectMeta>) -> Self {
        Self {
            inner: WorkloadTemplate {
                metadata: metadata.into(),
                ..WorkloadTemplate::default()
            },
            service_name: None,
        }
    }

    workload_setters!();

    pub fn replicas(&mut self, replicas: i32) -> &mut Self {
        self.inner.replicas = Some(replicas);
        self
    }

    /// The (headless) Service governing the network identity of the pods.
    pub fn service_name(&mut self, service_name: impl Into<String>) -> &mut Self {
        self.service_name = Some(service_name.into());
        self
    }

    pub fn build(&self) -> Result<StatefulSet> {
        Ok(StatefulSet {
            metadata: self.inner.metadata.clone(),
            spec: Some(StatefulSetSpec {
                replicas: self.inner.replicas,
                selector: self.inner.selector("StatefulSet")?,
                service_name: self.service_name.clone(),
                pod_management_policy: Some("Parallel".to_string()),
                template: self.inner.pod_template("StatefulSet")?,
                ..StatefulSetSpec::default()
            }),
            status: None,
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct JobBuilder {
    inner: WorkloadTemplate,
}

impl JobBuilder {
    pub fn new(metadata: impl Into<ObjectMeta>) -> Self {
        Self {
            inner: WorkloadTemplate {
                metadata: metadata.into(),
                ..WorkloadTemplate::default()
            },
        }
    }

    pub fn pod_template(&mut self, template: PodTemplateSpec) -> &mut Self {
        self.inner.template = Some(template);
        self
    }

    /// Jobs select their pods themselves, the template always gets restart policy `Never`.
    pub fn build(&self) -> Result<Job> {
        let mut template = self.inner.pod_template("Job")?;
        if let Some(spec) = template.spec.as_mut() {
            spec.restart_policy = Some("Never".to_string());
        }

        Ok(Job {
            metadata: self.inner.metadata.clone(),
            spec: Some(JobSpec {
                template,
                ..JobSpec::default()
            }),
            status: None,
        })
    }
}
