use std::sync::Arc;

use async_trait::async_trait;
use kubedoop_operator::{
    builder::pdb::PodDisruptionBudgetBuilder,
    commons::pdb::PdbConfig,
    k8s_openapi::api::policy::v1::PodDisruptionBudget,
    kube::ResourceExt,
    reconciler::ResourceBuilder,
};
use snafu::ResultExt;

use super::{BuildPdbSnafu, Error, Result};
use crate::crd::{APP_NAME, SupersetCluster, SupersetRole};

/// Only one pod of a role may be down at a time unless configured otherwise.
const DEFAULT_MAX_UNAVAILABLE: u16 = 1;

/// The PodDisruptionBudget `<cluster>-<role>` spanning all role groups of a role.
pub struct RolePdbBuilder {
    superset: Arc<SupersetCluster>,
    role: SupersetRole,
    config: PdbConfig,
}

impl RolePdbBuilder {
    pub fn new(superset: Arc<SupersetCluster>, role: SupersetRole, config: PdbConfig) -> Self {
        Self {
            superset,
            role,
            config,
        }
    }
}

#[async_trait]
impl ResourceBuilder for RolePdbBuilder {
    type Error = Error;
    type Resource = PodDisruptionBudget;

    fn name(&self) -> String {
        format!("{}-{}", self.superset.name_any(), self.role)
    }

    async fn build(&self) -> Result<PodDisruptionBudget> {
        role_pdb(&self.superset, self.role, &self.config)
    }
}

pub fn role_pdb(
    superset: &SupersetCluster,
    role: SupersetRole,
    config: &PdbConfig,
) -> Result<PodDisruptionBudget> {
    let role = role.to_string();
    Ok(
        PodDisruptionBudgetBuilder::new_with_role(superset, APP_NAME, &role)
            .context(BuildPdbSnafu { role })?
            .with_max_unavailable(config.max_unavailable_or(DEFAULT_MAX_UNAVAILABLE))
            .build(),
    )
}
