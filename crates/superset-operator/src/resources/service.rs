use std::sync::Arc;

use async_trait::async_trait;
use kubedoop_operator::{
    builder::{meta::ObjectMetaBuilder, service::ServiceBuilder},
    k8s_openapi::api::core::v1::Service,
    reconciler::ResourceBuilder,
    role_utils::RoleInfo,
};
use snafu::ResultExt;

use super::{
    BuildLabelsSnafu, BuildServiceSnafu, ClusterContext, Error, Result, RoleGroupContext, workload,
};
use crate::crd::{HTTP_PORT, HTTP_PORT_NAME, SupersetRole};

/// The Service of one role group, named like its workload.
pub struct RoleGroupServiceBuilder {
    role_group: Arc<RoleGroupContext>,
}

impl RoleGroupServiceBuilder {
    pub fn new(role_group: Arc<RoleGroupContext>) -> Self {
        Self { role_group }
    }
}

#[async_trait]
impl ResourceBuilder for RoleGroupServiceBuilder {
    type Error = Error;
    type Resource = Service;

    fn name(&self) -> String {
        self.role_group.name()
    }

    async fn build(&self) -> Result<Service> {
        role_group_service(&self.role_group)
    }
}

/// Exposes the named ports of the role group pods, the UI and metrics of web servers and the
/// metrics of workers. Workers get a headless Service, which gives every pod of the StatefulSet
/// a stable DNS name.
pub fn role_group_service(role_group: &RoleGroupContext) -> Result<Service> {
    let name = role_group.name();
    let labels = role_group.info.labels().context(BuildLabelsSnafu)?;
    let containers = workload::containers(role_group, None)?;

    let mut service = ServiceBuilder::new(
        ObjectMetaBuilder::new()
            .name(&name)
            .namespace(&role_group.cluster.cluster.namespace)
            .with_labels(labels.clone())
            .build(),
    );
    service
        .match_labels(labels)
        .ports_from_containers(&containers);
    if role_group.role == SupersetRole::Worker {
        service.headless();
    }

    service.build().context(BuildServiceSnafu { name })
}

/// The Service balancing over the web servers of all role groups, the entry point for users and
/// the Ingress.
pub struct RoleServiceBuilder {
    cluster: Arc<ClusterContext>,
    role: RoleInfo,
}

impl RoleServiceBuilder {
    pub fn new(cluster: Arc<ClusterContext>, role: RoleInfo) -> Self {
        Self { cluster, role }
    }
}

#[async_trait]
impl ResourceBuilder for RoleServiceBuilder {
    type Error = Error;
    type Resource = Service;

    fn name(&self) -> String {
        self.role.object_name()
    }

    async fn build(&self) -> Result<Service> {
        role_service(&self.cluster, &self.role)
    }
}

pub fn role_service(cluster: &ClusterContext, role: &RoleInfo) -> Result<Service> {
    let name = role.object_name();
    let labels = role.labels().context(BuildLabelsSnafu)?;

    ServiceBuilder::new(
        ObjectMetaBuilder::new()
            .name(&name)
            .namespace(&cluster.cluster.namespace)
            .with_labels(labels.clone())
            .build(),
    )
    .match_labels(labels)
    .add_port(HTTP_PORT_NAME, HTTP_PORT)
    .build()
    .context(BuildServiceSnafu { name })
}
