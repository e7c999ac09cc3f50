//! Roles and role groups.
//!
//! A product cluster consists of different kinds of processes working together, Superset for
//! example has a web server (`node`) and Celery workers (`worker`). Each kind is a _role_. The
//! replicas of a role are split into named _role groups_, each deployed as its own workload and
//! each able to carry its own configuration.
//!
//! ```yaml
//! node:
//!   config:
//!     gracefulShutdownTimeout: 60
//!   roleGroups:
//!     default:
//!       replicas: 2
//!     large:
//!       replicas: 1
//!       config:
//!         resources:
//!           memory:
//!             limit: 4Gi
//! ```
//!
//! Anything configured on the role applies to all role groups which do not set it themselves,
//! see [`RoleGroup::merged_with`].
use std::{collections::BTreeMap, fmt::Display};

use k8s_openapi::api::core::v1::PodTemplateSpec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    commons::pdb::GenericRoleConfig,
    config::merge::Merge,
    kvp::{
        LabelError, Labels,
        consts::{K8S_APP_COMPONENT_KEY, K8S_APP_ROLE_GROUP_KEY},
    },
    utils::crds::raw_object_schema,
};

/// Settings available on both the role and its role groups.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(
    rename_all = "camelCase",
    bound(deserialize = "T: Default + Deserialize<'de>")
)]
#[schemars(bound = "T: JsonSchema + Default")]
pub struct CommonConfiguration<T> {
    #[serde(default)]
    pub config: T,

    /// Replaces the command of the main container.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command_overrides: Vec<String>,

    /// Environment variables set on the main container, taking precedence over the ones the
    /// operator sets.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env_overrides: BTreeMap<String, String>,

    /// A PodTemplateSpec merged on top of the generated pod template. Use it to change any
    /// property of the Pods the operator does not expose.
    #[serde(default)]
    #[schemars(schema_with = "raw_object_schema")]
    pub pod_overrides: PodTemplateSpec,
}

impl<T: Merge> Merge for CommonConfiguration<T> {
    fn merge(&mut self, defaults: &Self) {
        self.config.merge(&defaults.config);
        self.command_overrides.merge(&defaults.command_overrides);
        self.env_overrides.merge(&defaults.env_overrides);
        self.pod_overrides.merge(&defaults.pod_overrides);
    }
}

/// A role, such as the Superset web servers. `T` is the config shared with the role groups,
/// `U` the config only available on the role.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[schemars(bound = "T: JsonSchema + Default, U: Default + JsonSchema + Serialize")]
pub struct Role<T, U = GenericRoleConfig>
where
    U: Default + JsonSchema + Serialize,
{
    #[serde(flatten, bound(deserialize = "T: Default + Deserialize<'de>"))]
    pub config: CommonConfiguration<T>,

    #[serde(default)]
    pub role_config: U,

    #[serde(default)]
    pub role_groups: BTreeMap<String, RoleGroup<T>>,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(
    rename_all = "camelCase",
    bound(deserialize = "T: Default + Deserialize<'de>")
)]
#[schemars(bound = "T: JsonSchema + Default")]
pub struct RoleGroup<T> {
    #[serde(flatten)]
    pub config: CommonConfiguration<T>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u16>,
}

impl<T: Merge + Clone> RoleGroup<T> {
    /// Returns a copy of this role group with everything it leaves unset taken from `role`.
    ///
    /// Neither `self` nor `role` are modified, so merging the same custom resource again yields
    /// the same result.
    pub fn merged_with<U>(&self, role: &Role<T, U>) -> Self
    where
        U: Default + JsonSchema + Serialize,
    {
        let mut merged = self.clone();
        merged.config.merge(&role.config);
        merged
    }
}

/// The identity of a product cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterInfo {
    /// The product, such as `superset`.
    pub app_name: String,
    pub name: String,
    pub namespace: String,
}

impl ClusterInfo {
    pub fn new(
        app_name: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// The name of a cluster scoped object, `<cluster>-<suffix>`.
    pub fn object_name(&self, suffix: &str) -> String {
        format!("{}-{suffix}", self.name)
    }

    pub fn labels(&self) -> Result<Labels, LabelError> {
        Labels::common(&self.app_name, &self.name)
    }

    pub fn role(&self, role: impl Into<String>) -> RoleInfo {
        RoleInfo {
            cluster: self.clone(),
            role: role.into(),
        }
    }
}

/// The identity of one role of a product cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleInfo {
    pub cluster: ClusterInfo,
    pub role: String,
}

impl RoleInfo {
    /// `<cluster>-<role>`
    pub fn object_name(&self) -> String {
        self.cluster.object_name(&self.role)
    }

    /// The labels selecting all pods of this role.
    pub fn labels(&self) -> Result<Labels, LabelError> {
        let mut labels = self.cluster.labels()?;
        labels.try_insert(K8S_APP_COMPONENT_KEY, &self.role)?;
        Ok(labels)
    }

    pub fn role_group(&self, role_group: impl Into<String>) -> RoleGroupInfo {
        RoleGroupInfo {
            role: self.clone(),
            role_group: role_group.into(),
        }
    }
}

/// The identity of one role group of a product cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleGroupInfo {
    pub role: RoleInfo,
    pub role_group: String,
}

impl RoleGroupInfo {
    /// `<cluster>-<role>-<role group>`
    pub fn object_name(&self) -> String {
        format!("{}-{}", self.role.object_name(), self.role_group)
    }

    /// The labels selecting all pods of this role group.
    pub fn labels(&self) -> Result<Labels, LabelError> {
        let mut labels = self.role.labels()?;
        labels.try_insert(K8S_APP_ROLE_GROUP_KEY, &self.role_group)?;
        Ok(labels)
    }

    pub fn cluster(&self) -> &ClusterInfo {
        &self.role.cluster
    }

    pub fn role_name(&self) -> &str {
        &self.role.role
    }
}

impl Display for RoleGroupInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "role group {}/{} of {}",
            self.role.role, self.role_group, self.role.cluster.name
        )
    }
}
