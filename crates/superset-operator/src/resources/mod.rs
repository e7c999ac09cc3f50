//! The objects making up a Superset cluster and the reconciler tree writing them.
//!
//! Everything cluster wide is written first (the env and config secrets and the bootstrap job),
//! then the `node` and `worker` roles.
use std::sync::Arc;

use kubedoop_operator::{
    builder, client,
    commons::product_image::ResolvedProductImage,
    crd::authentication,
    kvp::LabelError,
    role_utils::{ClusterInfo, RoleGroup, RoleGroupInfo},
};
use snafu::Snafu;

use crate::crd::{ClusterConfigSpec, SupersetConfig, SupersetRole};

pub mod authentication_class;
pub mod cluster;
pub mod config_map;
pub mod config_secret;
pub mod dependencies;
pub mod env_secret;
pub mod ingress;
pub mod job;
pub mod pdb;
pub mod role;
pub mod service;
pub mod vector;
pub mod workload;

pub const CONFIG_MOUNT_DIR: &str = "/kubedoop/mount/config";
pub const CONFIG_DIR: &str = "/kubedoop/config";
pub const LOG_DIR: &str = "/kubedoop/log";
pub const SECRET_DIR: &str = "/kubedoop/secret";
pub const PYTHONPATH_DIR: &str = "/kubedoop/app/pythonpath";

pub const CONFIG_VOLUME_NAME: &str = "config";
pub const LOG_VOLUME_NAME: &str = "log";

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while building the objects of a cluster.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(context(false))]
    Client { source: client::Error },

    #[snafu(display("SupersetCluster {cluster:?} has no namespace"))]
    MissingNamespace { cluster: String },

    #[snafu(display("redis host is required, cluster: {cluster}, namespace: {namespace}"))]
    MissingRedisHost { cluster: String, namespace: String },

    #[snafu(display("database config is required, cluster: {cluster}, namespace: {namespace}"))]
    MissingDatabase { cluster: String, namespace: String },

    #[snafu(display("port {value:?} in secret {secret:?} is not a valid port"))]
    InvalidDatabasePort {
        source: std::num::ParseIntError,
        secret: String,
        value: String,
    },

    #[snafu(display("failed to fetch AuthenticationClass {name:?}"))]
    FetchAuthenticationClass { source: client::Error, name: String },

    #[snafu(display(
        "AuthenticationClass {name:?} uses the {provider} provider, only ldap and oidc are supported"
    ))]
    UnsupportedAuthenticationProvider { name: String, provider: String },

    #[snafu(display("AuthenticationClass {name:?} is an oidc provider, but no oidc client credentials are configured"))]
    MissingOidcCredentials { name: String },

    #[snafu(display("failed to build the URL of the identity provider"))]
    IdentityProviderUrl { source: authentication::Error },

    #[snafu(display(
        "vector aggregator ConfigMap {name:?} in namespace {namespace:?} has no key {key:?}"
    ))]
    MissingVectorAggregatorAddress {
        name: String,
        namespace: String,
        key: &'static str,
    },

    #[snafu(display("failed to build labels"))]
    BuildLabels { source: LabelError },

    #[snafu(display("failed to build ConfigMap or Secret {name:?}"))]
    BuildConfig {
        source: builder::configmap::Error,
        name: String,
    },

    #[snafu(display("failed to build container {name:?}"))]
    BuildContainer {
        source: builder::pod::container::Error,
        name: String,
    },

    #[snafu(display("failed to build the pod template of {name:?}"))]
    BuildPod {
        source: builder::pod::Error,
        name: String,
    },

    #[snafu(display("failed to build workload {name:?}"))]
    BuildWorkload {
        source: builder::workload::Error,
        name: String,
    },

    #[snafu(display("failed to build Service {name:?}"))]
    BuildService {
        source: builder::service::Error,
        name: String,
    },

    #[snafu(display("failed to build the PodDisruptionBudget of role {role}"))]
    BuildPdb {
        source: builder::pdb::Error,
        role: String,
    },
}

/// Settings derived from the cluster config once per reconciliation pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Holds the connection details of the database and Redis, the administrator and the secret
    /// key, exposed to every Superset container as environment variables.
    pub env_secret_name: String,

    /// Holds `superset_config.py` and the scripts of the bootstrap job.
    pub config_secret_name: String,

    pub spec: ClusterConfigSpec,
}

impl ClusterConfig {
    pub fn new(cluster: &ClusterInfo, spec: &ClusterConfigSpec) -> Self {
        Self {
            env_secret_name: cluster.object_name("env"),
            config_secret_name: cluster.object_name("config"),
            spec: spec.clone(),
        }
    }
}

/// State shared by all builders of one cluster.
#[derive(Clone, Debug)]
pub struct ClusterContext {
    pub cluster: ClusterInfo,
    pub config: ClusterConfig,
    pub image: ResolvedProductImage,
    pub stopped: bool,
}

/// State shared by all builders of one role group.
#[derive(Clone, Debug)]
pub struct RoleGroupContext {
    pub cluster: Arc<ClusterContext>,
    pub info: RoleGroupInfo,
    pub role: SupersetRole,

    /// The role group with the role config and the operator defaults merged in.
    pub spec: RoleGroup<SupersetConfig>,
}

impl RoleGroupContext {
    pub fn config(&self) -> &SupersetConfig {
        &self.spec.config.config
    }

    pub fn replicas(&self) -> i32 {
        i32::from(self.spec.replicas.unwrap_or(1))
    }

    pub fn name(&self) -> String {
        self.info.object_name()
    }
}
