//! The `<cluster>-init` Job upgrading the metadata database and creating the administrator once
//! the database and Redis accept connections.
use std::sync::Arc;

use async_trait::async_trait;
use kubedoop_operator::{
    builder::{
        meta::ObjectMetaBuilder,
        pod::{PodBuilder, container::ContainerBuilder, volume::VolumeBuilder},
        workload::JobBuilder,
    },
    k8s_openapi::api::batch::v1::Job,
    reconciler::ResourceBuilder,
};
use snafu::ResultExt;

use super::{
    BuildContainerSnafu, BuildLabelsSnafu, BuildPodSnafu, BuildWorkloadSnafu, ClusterContext,
    Error, Result,
    config_secret::{BOOTSTRAP_SCRIPT_FILE, INIT_SCRIPT_FILE},
    dependencies::wait_for_dependencies,
};

const INIT_CONTAINER_NAME: &str = "superset-init";

const INIT_CONFIG_VOLUME_NAME: &str = "superset-config";
const INIT_CONFIG_DIR: &str = "/app/pythonpath";

pub struct InitJobBuilder {
    ctx: Arc<ClusterContext>,
}

impl InitJobBuilder {
    pub fn new(ctx: Arc<ClusterContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ResourceBuilder for InitJobBuilder {
    type Error = Error;
    type Resource = Job;

    fn name(&self) -> String {
        job_name(&self.ctx)
    }

    async fn build(&self) -> Result<Job> {
        init_job(&self.ctx)
    }
}

fn job_name(ctx: &ClusterContext) -> String {
    ctx.cluster.object_name("init")
}

pub fn init_job(ctx: &ClusterContext) -> Result<Job> {
    let name = job_name(ctx);
    let env_secret = &ctx.config.env_secret_name;

    let init = ContainerBuilder::new(INIT_CONTAINER_NAME)
        .context(BuildContainerSnafu {
            name: INIT_CONTAINER_NAME,
        })?
        .image(&ctx.image.image)
        .image_pull_policy(&ctx.image.image_pull_policy)
        .command(vec!["/bin/sh".to_string(), "-c".to_string()])
        .args(vec![format!(
            ". {INIT_CONFIG_DIR}/{BOOTSTRAP_SCRIPT_FILE}; sh {INIT_CONFIG_DIR}/{INIT_SCRIPT_FILE}"
        )])
        .add_env_from_secret(env_secret)
        .add_volume_mount(INIT_CONFIG_VOLUME_NAME, INIT_CONFIG_DIR)
        .context(BuildContainerSnafu {
            name: INIT_CONTAINER_NAME,
        })?
        .build();

    let labels = ctx.cluster.labels().context(BuildLabelsSnafu)?;
    let pod_template = PodBuilder::new()
        .metadata(ObjectMetaBuilder::new().with_labels(labels.clone()).build())
        .image_pull_secrets_from_product_image(&ctx.image)
        .add_init_container(wait_for_dependencies(ctx)?)
        .add_container(init)
        .add_volume(
            VolumeBuilder::new(INIT_CONFIG_VOLUME_NAME)
                .with_secret(&ctx.config.config_secret_name, false)
                .build(),
        )
        .context(BuildPodSnafu { name: &name })?
        .build_template();

    JobBuilder::new(
        ObjectMetaBuilder::new()
            .name(&name)
            .namespace(&ctx.cluster.namespace)
            .with_labels(labels)
            .build(),
    )
    .pod_template(pod_template)
    .build()
    .context(BuildWorkloadSnafu { name })
}

#[cfg(test)]
mod tests {
    use kubedoop_operator::client::{ManagedResource, prepare_update};
    use serde_json::json;

    use super::*;
    use crate::resources::{
        dependencies::WAIT_CONTAINER_NAME,
        test_support::{MINIMAL_CLUSTER, cluster, cluster_context, stored},
    };

    #[test]
    fn waits_for_dependencies_before_init() {
        let ctx = cluster_context(&cluster(MINIMAL_CLUSTER));
        let job = init_job(&ctx).expect("job builds");

        assert_eq!(job.metadata.name.as_deref(), Some("simple-init"));
        let pod = job
            .spec
            .expect("job has a spec")
            .template
            .spec
            .expect("template has a spec");
        assert_eq!(pod.restart_policy.as_deref(), Some("Never"));

        let init_containers = pod.init_containers.expect("wait container is set");
        assert_eq!(init_containers.len(), 1);
        let wait = &init_containers[0];
        assert_eq!(wait.name, WAIT_CONTAINER_NAME);
        let wait_args = wait.args.clone().unwrap_or_default().join(" ");
        assert!(wait_args.contains("tcp://$DB_HOST:$DB_PORT"), "{wait_args}");
        assert!(wait_args.contains("tcp://$REDIS_HOST:$REDIS_PORT"), "{wait_args}");

        let init = &pod.containers[0];
        assert_eq!(init.name, INIT_CONTAINER_NAME);
        let env_from = init.env_from.clone().unwrap_or_default();
        assert_eq!(
            env_from[0]
                .secret_ref
                .as_ref()
                .map(|secret| secret.name.as_str()),
            Some("simple-env")
        );

        let volumes = pod.volumes.unwrap_or_default();
        assert_eq!(
            volumes[0]
                .secret
                .as_ref()
                .and_then(|secret| secret.secret_name.as_deref()),
            Some("simple-config")
        );
    }

    #[test]
    fn stored_job_is_up_to_date_until_its_image_changes() {
        let ctx = cluster_context(&cluster(MINIMAL_CLUSTER));
        let job = init_job(&ctx).expect("job builds");

        let live = stored(&job, |value| {
            let controller_uid = json!("5d3c1f0a-2b4e-4f6a-8c9d-0e1f2a3b4c5d");
            let spec = &mut value["spec"];
            spec["backoffLimit"] = json!(6);
            spec["completionMode"] = json!("NonIndexed");
            spec["completions"] = json!(1);
            spec["parallelism"] = json!(1);
            spec["suspend"] = json!(false);
            spec["selector"] = json!({
                "matchLabels": {"batch.kubernetes.io/controller-uid": controller_uid},
            });
            let labels = &mut spec["template"]["metadata"]["labels"];
            labels["batch.kubernetes.io/controller-uid"] = controller_uid.clone();
            labels["batch.kubernetes.io/job-name"] = json!("simple-init");
            labels["controller-uid"] = controller_uid;
            labels["job-name"] = json!("simple-init");
            let pod = &mut spec["template"]["spec"];
            pod["dnsPolicy"] = json!("ClusterFirst");
            pod["schedulerName"] = json!("default-scheduler");
            pod["volumes"][0]["secret"]["defaultMode"] = json!(420);
            value["status"] = json!({"succeeded": 1});
        });

        let update = prepare_update(job.clone(), &live).expect("objects are comparable");
        assert!(update.is_none(), "unexpected update: {update:?}");

        let mut upgraded = job;
        if let Some(container) = upgraded
            .spec
            .as_mut()
            .and_then(|spec| spec.template.spec.as_mut())
            .and_then(|pod| pod.containers.first_mut())
        {
            container.image = Some("registry.example.com/superset:changed".to_string());
        }
        let update = prepare_update(upgraded, &live).expect("objects are comparable");
        assert!(update.is_some());
        assert!(Job::recreate_on_change());
    }
}
