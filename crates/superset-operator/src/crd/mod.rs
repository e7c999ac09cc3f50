//! The `SupersetCluster` custom resource.
use const_format::concatcp;
use kubedoop_operator::{
    commons::{
        cluster_operation::ClusterOperation, logging::LoggingSpec, product_image::ProductImage,
        resources::{CpuLimits, MemoryLimits, ResourcesSpec},
    },
    config::merge::Merge,
    k8s_openapi::{
        api::core::v1::{Affinity, Toleration},
        apimachinery::pkg::api::resource::Quantity,
    },
    kube::CustomResource,
    role_utils::Role,
    schemars::{self, JsonSchema},
    status::condition::{ClusterCondition, HasStatusCondition},
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

pub mod cluster_config;

pub use cluster_config::*;

pub const APP_NAME: &str = "superset";
pub const OPERATOR_NAME: &str = "superset.kubedoop.dev";
pub const CONTROLLER_NAME: &str = "supersetcluster";
pub const FULL_CONTROLLER_NAME: &str = concatcp!(CONTROLLER_NAME, '.', OPERATOR_NAME);

pub const DEFAULT_PRODUCT_VERSION: &str = "4.0.2";
pub const DEFAULT_KUBEDOOP_VERSION: &str = "0.0.0-dev";

pub const HTTP_PORT_NAME: &str = "http";
pub const HTTP_PORT: i32 = 8088;
pub const METRICS_PORT_NAME: &str = "metrics";
pub const METRICS_PORT: i32 = 9102;

/// Default seconds a pod gets to finish in-flight requests or tasks before it is killed.
pub const DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS: u64 = 120;

/// A Superset cluster: web servers (`node`) and Celery workers (`worker`) sharing a metadata
/// database and a Redis cache and broker.
#[derive(Clone, CustomResource, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[kube(
    group = "superset.kubedoop.dev",
    version = "v1alpha1",
    kind = "SupersetCluster",
    plural = "supersetclusters",
    shortname = "superset",
    status = "SupersetClusterStatus",
    namespaced,
    crates(
        kube_core = "kubedoop_operator::kube::core",
        k8s_openapi = "kubedoop_operator::k8s_openapi",
        schemars = "kubedoop_operator::schemars"
    )
)]
#[serde(rename_all = "camelCase")]
pub struct SupersetClusterSpec {
    #[serde(default)]
    pub image: ProductImage,

    pub cluster_config: ClusterConfigSpec,

    #[serde(default)]
    pub cluster_operation: ClusterOperation,

    /// The Superset web servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<Role<SupersetConfig>>,

    /// The Celery workers executing async queries and reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<Role<SupersetConfig>>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupersetClusterStatus {
    #[serde(default)]
    pub conditions: Vec<ClusterCondition>,
}

impl HasStatusCondition for SupersetCluster {
    fn conditions(&self) -> Vec<ClusterCondition> {
        self.status
            .as_ref()
            .map(|status| status.conditions.clone())
            .unwrap_or_default()
    }
}

impl SupersetCluster {
    pub fn role(&self, role: SupersetRole) -> Option<&Role<SupersetConfig>> {
        match role {
            SupersetRole::Node => self.spec.node.as_ref(),
            SupersetRole::Worker => self.spec.worker.as_ref(),
        }
    }
}

#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[strum(serialize_all = "lowercase")]
pub enum SupersetRole {
    Node,
    Worker,
}

/// Configuration of a role or role group. Fields left unset on a role group are taken from the
/// role, fields unset on both from [`SupersetConfig::default_for`].
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupersetConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesSpec>,

    /// Seconds a pod is given to shut down gracefully.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graceful_shutdown_timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingSpec>,
}

impl Merge for SupersetConfig {
    fn merge(&mut self, defaults: &Self) {
        self.affinity.merge(&defaults.affinity);
        self.tolerations.merge(&defaults.tolerations);
        self.resources.merge(&defaults.resources);
        self.graceful_shutdown_timeout
            .merge(&defaults.graceful_shutdown_timeout);
        self.logging.merge(&defaults.logging);
    }
}

impl SupersetConfig {
    /// The operator defaults, the lowest layer of the merge.
    pub fn default_for(role: SupersetRole) -> Self {
        let (cpu_min, cpu_max, memory) = match role {
            SupersetRole::Node => ("300m", "1200m", "2Gi"),
            SupersetRole::Worker => ("200m", "1", "1Gi"),
        };

        Self {
            resources: Some(ResourcesSpec {
                cpu: Some(CpuLimits {
                    min: Some(Quantity(cpu_min.to_string())),
                    max: Some(Quantity(cpu_max.to_string())),
                }),
                memory: Some(MemoryLimits {
                    limit: Some(Quantity(memory.to_string())),
                }),
            }),
            graceful_shutdown_timeout: Some(DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS),
            ..Self::default()
        }
    }
}
