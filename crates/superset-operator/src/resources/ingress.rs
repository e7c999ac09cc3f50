use std::sync::Arc;

use async_trait::async_trait;
use kubedoop_operator::{
    builder::{ingress::IngressBuilder, meta::ObjectMetaBuilder},
    k8s_openapi::api::networking::v1::Ingress,
    reconciler::ResourceBuilder,
    role_utils::RoleInfo,
};
use snafu::ResultExt;

use super::{BuildLabelsSnafu, ClusterContext, Error, Result};
use crate::crd::{HTTP_PORT_NAME, IngressSpec};

/// Routes external traffic to the `node` role Service. Only registered when the cluster config
/// asks for an Ingress.
pub struct NodeIngressBuilder {
    cluster: Arc<ClusterContext>,
    role: RoleInfo,
    spec: IngressSpec,
}

impl NodeIngressBuilder {
    pub fn new(cluster: Arc<ClusterContext>, role: RoleInfo, spec: IngressSpec) -> Self {
        Self {
            cluster,
            role,
            spec,
        }
    }
}

#[async_trait]
impl ResourceBuilder for NodeIngressBuilder {
    type Error = Error;
    type Resource = Ingress;

    fn name(&self) -> String {
        self.role.object_name()
    }

    async fn build(&self) -> Result<Ingress> {
        node_ingress(&self.cluster, &self.role, &self.spec)
    }
}

pub fn node_ingress(
    cluster: &ClusterContext,
    role: &RoleInfo,
    spec: &IngressSpec,
) -> Result<Ingress> {
    let name = role.object_name();
    Ok(IngressBuilder::new(
        ObjectMetaBuilder::new()
            .name(&name)
            .namespace(&cluster.cluster.namespace)
            .with_labels(role.labels().context(BuildLabelsSnafu)?)
            .with_annotations(spec.annotations.clone())
            .build(),
    )
    .ingress_class_name(spec.ingress_class_name.clone())
    .add_rule(spec.host.clone(), &spec.path, &name, HTTP_PORT_NAME)
    .build())
}
