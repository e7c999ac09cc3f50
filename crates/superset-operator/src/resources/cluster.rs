use std::sync::Arc;

use kubedoop_operator::{
    client::{Client, ResourceClient},
    kube::ResourceExt,
    kvp::consts::K8S_APP_MANAGED_BY_KEY,
    reconciler::{ReconcilerGroup, ResourceReconciler},
    role_utils::ClusterInfo,
};
use snafu::{OptionExt, ResultExt};
use strum::IntoEnumIterator;

use super::{
    BuildLabelsSnafu, ClusterConfig, ClusterContext, Error, MissingNamespaceSnafu, Result,
    config_secret::ConfigSecretBuilder, env_secret::EnvSecretBuilder, job::InitJobBuilder,
    role::role_reconciler,
};
use crate::crd::{
    APP_NAME, DEFAULT_KUBEDOOP_VERSION, DEFAULT_PRODUCT_VERSION, OPERATOR_NAME, SupersetCluster,
    SupersetRole,
};

/// Derives everything the builders need from the custom resource. Nothing is fetched.
pub fn cluster_context(superset: &SupersetCluster) -> Result<ClusterContext> {
    let name = superset.name_any();
    let namespace = superset
        .namespace()
        .context(MissingNamespaceSnafu { cluster: &name })?;
    let cluster = ClusterInfo::new(APP_NAME, name, namespace);

    Ok(ClusterContext {
        config: ClusterConfig::new(&cluster, &superset.spec.cluster_config),
        image: superset.spec.image.resolve(
            APP_NAME,
            DEFAULT_PRODUCT_VERSION,
            DEFAULT_KUBEDOOP_VERSION,
        ),
        stopped: superset.spec.cluster_operation.stopped,
        cluster,
    })
}

/// The reconciler tree of one cluster: the env and config secrets, the bootstrap job unless it is
/// disabled, then the roles in declaration order. Roles missing from the custom resource are
/// skipped.
pub fn cluster_reconciler(
    superset: &Arc<SupersetCluster>,
    client: Client,
) -> Result<ReconcilerGroup<Error>> {
    let ctx = Arc::new(cluster_context(superset)?);

    let mut labels = ctx.cluster.labels().context(BuildLabelsSnafu)?;
    labels
        .try_insert(K8S_APP_MANAGED_BY_KEY, OPERATOR_NAME)
        .context(BuildLabelsSnafu)?;
    let resource_client = ResourceClient::new(client, superset.as_ref(), labels)?;

    let mut group = ReconcilerGroup::new(ctx.cluster.name.clone());
    group
        .register(ResourceReconciler::new(
            resource_client.clone(),
            EnvSecretBuilder::new(resource_client.clone(), ctx.clone()),
        ))
        .register(ResourceReconciler::new(
            resource_client.clone(),
            ConfigSecretBuilder::new(ctx.clone()),
        ));
    if ctx.config.spec.init_job {
        group.register(ResourceReconciler::new(
            resource_client.clone(),
            InitJobBuilder::new(ctx.clone()),
        ));
    }

    for role in SupersetRole::iter() {
        if let Some(spec) = superset.role(role) {
            group.register(role_reconciler(
                superset,
                &ctx,
                &resource_client,
                role,
                spec,
            ));
        }
    }

    Ok(group)
}

#[cfg(test)]
mod tests {
    use kubedoop_operator::commons::product_image::ResolvedProductImage;

    use super::*;
    use crate::resources::test_support::{MINIMAL_CLUSTER, client, cluster};

    #[test]
    fn context_of_minimal_cluster() {
        let ctx = cluster_context(&cluster(MINIMAL_CLUSTER)).expect("valid cluster");

        assert_eq!(ctx.cluster, ClusterInfo::new("superset", "simple", "default"));
        assert_eq!(ctx.config.env_secret_name, "simple-env");
        assert_eq!(ctx.config.config_secret_name, "simple-config");
        assert!(!ctx.stopped);
        let ResolvedProductImage {
            product_version,
            image,
            ..
        } = ctx.image;
        assert_eq!(product_version, DEFAULT_PRODUCT_VERSION);
        assert!(image.ends_with("superset:4.0.2-kubedoop0.0.0-dev"), "{image}");
    }

    #[test]
    fn namespace_is_required() {
        let superset = cluster(&MINIMAL_CLUSTER.replace("  namespace: default\n", ""));
        assert!(matches!(
            cluster_context(&superset),
            Err(Error::MissingNamespace { cluster }) if cluster == "simple"
        ));
    }

    #[tokio::test]
    async fn registers_cluster_objects_before_roles() {
        let superset = Arc::new(cluster(MINIMAL_CLUSTER));
        let group = cluster_reconciler(&superset, client()).expect("reconciler tree builds");

        assert_eq!(
            group.names(),
            vec![
                "simple-env",
                "simple-config",
                "simple-init",
                "simple-node",
                "simple-worker"
            ]
        );
    }

    #[tokio::test]
    async fn missing_roles_are_skipped() {
        let yaml = MINIMAL_CLUSTER
            .split("  worker:")
            .next()
            .expect("split yields a first part");
        let group = cluster_reconciler(&Arc::new(cluster(yaml)), client())
            .expect("reconciler tree builds");

        assert_eq!(
            group.names(),
            vec!["simple-env", "simple-config", "simple-init", "simple-node"]
        );
    }

    #[tokio::test]
    async fn disabled_init_job_is_not_registered() {
        let yaml = MINIMAL_CLUSTER.replace("    redis:\n", "    initJob: false\n    redis:\n");
        let group = cluster_reconciler(&Arc::new(cluster(&yaml)), client())
            .expect("reconciler tree builds");

        assert_eq!(
            group.names(),
            vec!["simple-env", "simple-config", "simple-node", "simple-worker"]
        );
    }
}
