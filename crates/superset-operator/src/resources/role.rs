//! The reconcilers of one role and its role groups.
//!
//! Each role group is written as ConfigMap, workload and Service, in that order, so the pods
//! never start without their configuration. The role wide objects follow once every role group
//! is ready.
use std::sync::Arc;

use kubedoop_operator::{
    client::ResourceClient,
    config::merge::Merge,
    reconciler::{ReconcilerGroup, ResourceReconciler, WorkloadReconciler},
    role_utils::{Role, RoleGroup},
};

use super::{
    ClusterContext, Error, RoleGroupContext,
    config_map::RoleGroupConfigMapBuilder,
    ingress::NodeIngressBuilder,
    pdb::RolePdbBuilder,
    service::{RoleGroupServiceBuilder, RoleServiceBuilder},
    workload::{NodeDeploymentBuilder, WorkerStatefulSetBuilder},
};
use crate::crd::{SupersetCluster, SupersetConfig, SupersetRole};

/// Layers a role group over its role and the operator defaults, in that order of precedence.
///
/// Works on a copy, the custom resource itself stays untouched.
pub fn merged_role_group(
    role: SupersetRole,
    role_spec: &Role<SupersetConfig>,
    role_group: &RoleGroup<SupersetConfig>,
) -> RoleGroup<SupersetConfig> {
    let mut merged = role_group.merged_with(role_spec);
    merged
        .config
        .config
        .merge(&SupersetConfig::default_for(role));
    merged
}

/// The context of the role group `role_group` of `role`, `None` if the cluster has no such role
/// group.
pub fn role_group_context(
    superset: &SupersetCluster,
    cluster: &Arc<ClusterContext>,
    role: SupersetRole,
    role_group: &str,
) -> Option<RoleGroupContext> {
    let role_spec = superset.role(role)?;
    let spec = role_spec.role_groups.get(role_group)?;
    Some(new_role_group_context(cluster, role, role_spec, role_group, spec))
}

fn new_role_group_context(
    cluster: &Arc<ClusterContext>,
    role: SupersetRole,
    role_spec: &Role<SupersetConfig>,
    name: &str,
    role_group: &RoleGroup<SupersetConfig>,
) -> RoleGroupContext {
    RoleGroupContext {
        cluster: Arc::clone(cluster),
        info: cluster.cluster.role(role.to_string()).role_group(name),
        role,
        spec: merged_role_group(role, role_spec, role_group),
    }
}

pub fn role_reconciler(
    superset: &Arc<SupersetCluster>,
    cluster: &Arc<ClusterContext>,
    client: &ResourceClient,
    role: SupersetRole,
    role_spec: &Role<SupersetConfig>,
) -> ReconcilerGroup<Error> {
    let info = cluster.cluster.role(role.to_string());
    let mut group = ReconcilerGroup::new(info.object_name());

    for (name, role_group) in &role_spec.role_groups {
        let role_group = Arc::new(new_role_group_context(
            cluster, role, role_spec, name, role_group,
        ));
        group.register(role_group_reconciler(client, role_group));
    }

    if role == SupersetRole::Node {
        group.register(ResourceReconciler::new(
            client.clone(),
            RoleServiceBuilder::new(Arc::clone(cluster), info.clone()),
        ));
        if let Some(ingress) = &cluster.config.spec.ingress {
            group.register(ResourceReconciler::new(
                client.clone(),
                NodeIngressBuilder::new(Arc::clone(cluster), info.clone(), ingress.clone()),
            ));
        }
    }

    let pdb = &role_spec.role_config.pod_disruption_budget;
    if pdb.enabled {
        group.register(ResourceReconciler::new(
            client.clone(),
            RolePdbBuilder::new(Arc::clone(superset), role, pdb.clone()),
        ));
    }

    group
}

fn role_group_reconciler(
    client: &ResourceClient,
    role_group: Arc<RoleGroupContext>,
) -> ReconcilerGroup<Error> {
    let stopped = role_group.cluster.stopped;
    let mut group = ReconcilerGroup::new(role_group.name());

    group.register(ResourceReconciler::new(
        client.clone(),
        RoleGroupConfigMapBuilder::new(client.clone(), Arc::clone(&role_group)),
    ));
    match role_group.role {
        SupersetRole::Node => group.register(WorkloadReconciler::new(
            client.clone(),
            NodeDeploymentBuilder::new(client.clone(), Arc::clone(&role_group)),
            stopped,
        )),
        SupersetRole::Worker => group.register(WorkloadReconciler::new(
            client.clone(),
            WorkerStatefulSetBuilder::new(client.clone(), Arc::clone(&role_group)),
            stopped,
        )),
    };
    group.register(ResourceReconciler::new(
        client.clone(),
        RoleGroupServiceBuilder::new(role_group),
    ));

    group
}
