//! The pods of a role group: a Deployment of web servers for `node`, a StatefulSet of Celery
//! workers for `worker`.
//!
//! Both run the same pod layout. An init container waits for the database and Redis. The main
//! container is named after the role and copies the
//! role group ConfigMap onto the `PYTHONPATH` before it starts. A `metrics` sidecar runs the
//! StatsD exporter Superset reports to, and a `vector` sidecar ships the logs when an aggregator
//! is configured.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use indoc::{formatdoc, indoc};
use kubedoop_operator::{
    builder::{
        meta::ObjectMetaBuilder,
        pod::{
            PodBuilder,
            container::ContainerBuilder,
            probe::{ProbeHandler, ProbeTimings, build_probe},
            volume::{VolumeBuilder, VolumeMountBuilder},
        },
        workload::{DeploymentBuilder, StatefulSetBuilder},
    },
    client::ResourceClient,
    commons::affinity::default_role_affinity,
    k8s_openapi::{
        api::{
            apps::v1::{Deployment, StatefulSet},
            core::v1::{Container, PodTemplateSpec, ResourceRequirements},
        },
        apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::ObjectMeta},
    },
    reconciler::ResourceBuilder,
};
use snafu::ResultExt;

use super::{
    BuildContainerSnafu, BuildLabelsSnafu, BuildPodSnafu, BuildWorkloadSnafu, CONFIG_MOUNT_DIR,
    CONFIG_VOLUME_NAME, Error, LOG_DIR, LOG_VOLUME_NAME, PYTHONPATH_DIR, Result, RoleGroupContext,
    authentication_class::ResolvedAuthentication,
    config_secret::SUPERSET_CONFIG_FILE,
    dependencies::wait_for_dependencies,
    vector::{CREATE_SHUTDOWN_FILE_COMMAND, REMOVE_SHUTDOWN_FILE_COMMAND, vector_container},
};
use crate::crd::{
    APP_NAME, DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS, HTTP_PORT, HTTP_PORT_NAME, METRICS_PORT,
    METRICS_PORT_NAME, SupersetRole,
};

const METRICS_CONTAINER_NAME: &str = "metrics";

const LOG_VOLUME_SIZE_LIMIT: &str = "30Mi";

/// Forwards `SIGTERM` to the product started in the background and waits for it to exit, so the
/// shutdown file is only written once the product stopped.
const SIGNAL_HANDLERS: &str = indoc! {r#"
    prepare_signal_handlers()
    {
        unset term_child_pid
        unset term_kill_needed
        trap 'handle_term_signal' TERM
    }

    handle_term_signal()
    {
        if [ "${term_child_pid}" ]; then
            kill -TERM "${term_child_pid}" 2>/dev/null
        else
            term_kill_needed="yes"
        fi
    }

    wait_for_termination()
    {
        set +e
        term_child_pid=$1
        if [[ -v term_kill_needed ]]; then
            kill -TERM "${term_child_pid}" 2>/dev/null
        fi
        wait ${term_child_pid} 2>/dev/null
        trap - TERM
        wait ${term_child_pid} 2>/dev/null
        set -e
    }
"#};

const WEBSERVER_COMMAND: &str = "gunicorn --bind 0.0.0.0:${SUPERSET_PORT} --threads 20 --timeout 300 \
     --limit-request-line 0 --limit-request-field_size 0 'superset.app:create_app()'";

const CELERY_APP: &str = "superset.tasks.celery_app:app";

const WEBSERVER_PROBE_TIMINGS: ProbeTimings = ProbeTimings {
    failure_threshold: 3,
    initial_delay_seconds: Some(30),
    period_seconds: 10,
    success_threshold: 1,
    timeout_seconds: 5,
};

/// `celery inspect ping` is slow, a busy worker may take a while to answer.
const WORKER_PROBE_TIMINGS: ProbeTimings = ProbeTimings {
    failure_threshold: 3,
    initial_delay_seconds: Some(120),
    period_seconds: 60,
    success_threshold: 1,
    timeout_seconds: 60,
};

/// Builds the Deployment of a `node` role group.
pub struct NodeDeploymentBuilder {
    client: ResourceClient,
    role_group: Arc<RoleGroupContext>,
}

impl NodeDeploymentBuilder {
    pub fn new(client: ResourceClient, role_group: Arc<RoleGroupContext>) -> Self {
        Self { client, role_group }
    }
}

#[async_trait]
impl ResourceBuilder for NodeDeploymentBuilder {
    type Error = Error;
    type Resource = Deployment;

    fn name(&self) -> String {
        self.role_group.name()
    }

    async fn build(&self) -> Result<Deployment> {
        let authentication = fetch_authentication(&self.client, &self.role_group).await?;
        node_deployment(&self.role_group, authentication.as_ref())
    }
}

/// Builds the StatefulSet of a `worker` role group.
pub struct WorkerStatefulSetBuilder {
    client: ResourceClient,
    role_group: Arc<RoleGroupContext>,
}

impl WorkerStatefulSetBuilder {
    pub fn new(client: ResourceClient, role_group: Arc<RoleGroupContext>) -> Self {
        Self { client, role_group }
    }
}

#[async_trait]
impl ResourceBuilder for WorkerStatefulSetBuilder {
    type Error = Error;
    type Resource = StatefulSet;

    fn name(&self) -> String {
        self.role_group.name()
    }

    async fn build(&self) -> Result<StatefulSet> {
        let authentication = fetch_authentication(&self.client, &self.role_group).await?;
        worker_statefulset(&self.role_group, authentication.as_ref())
    }
}

async fn fetch_authentication(
    client: &ResourceClient,
    role_group: &RoleGroupContext,
) -> Result<Option<ResolvedAuthentication>> {
    let spec = &role_group.cluster.config.spec;
    ResolvedAuthentication::fetch(client, spec.authentication.as_ref()).await
}

pub fn node_deployment(
    role_group: &RoleGroupContext,
    authentication: Option<&ResolvedAuthentication>,
) -> Result<Deployment> {
    let name = role_group.name();
    DeploymentBuilder::new(workload_metadata(role_group)?)
        .match_labels(role_group.info.labels().context(BuildLabelsSnafu)?)
        .replicas(role_group.replicas())
        .pod_template(pod_template(role_group, authentication)?)
        .pod_overrides(role_group.spec.config.pod_overrides.clone())
        .build()
        .context(BuildWorkloadSnafu { name })
}

/// The pods are addressed through the headless role group Service of the same name.
pub fn worker_statefulset(
    role_group: &RoleGroupContext,
    authentication: Option<&ResolvedAuthentication>,
) -> Result<StatefulSet> {
    let name = role_group.name();
    StatefulSetBuilder::new(workload_metadata(role_group)?)
        .match_labels(role_group.info.labels().context(BuildLabelsSnafu)?)
        .replicas(role_group.replicas())
        .service_name(&name)
        .pod_template(pod_template(role_group, authentication)?)
        .pod_overrides(role_group.spec.config.pod_overrides.clone())
        .build()
        .context(BuildWorkloadSnafu { name })
}

fn workload_metadata(role_group: &RoleGroupContext) -> Result<ObjectMeta> {
    Ok(ObjectMetaBuilder::new()
        .name(role_group.name())
        .namespace(&role_group.cluster.cluster.namespace)
        .with_labels(role_group.info.labels().context(BuildLabelsSnafu)?)
        .build())
}

fn pod_template(
    role_group: &RoleGroupContext,
    authentication: Option<&ResolvedAuthentication>,
) -> Result<PodTemplateSpec> {
    let name = role_group.name();
    let cluster = &role_group.cluster;
    let config = role_group.config();
    let role = role_group.role.to_string();

    let mut pod = PodBuilder::new();
    pod.metadata(
        ObjectMetaBuilder::new()
            .with_labels(role_group.info.labels().context(BuildLabelsSnafu)?)
            .build(),
    )
    .image_pull_secrets_from_product_image(&cluster.image)
    .affinity(
        config
            .affinity
            .clone()
            .unwrap_or_else(|| default_role_affinity(APP_NAME, &cluster.cluster.name, &role)),
    )
    .add_tolerations(config.tolerations.clone())
    .termination_grace_period(&Duration::from_secs(
        config
            .graceful_shutdown_timeout
            .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS),
    ))
    .context(BuildPodSnafu { name: &name })?
    .add_init_container(wait_for_dependencies(cluster)?);

    for container in containers(role_group, authentication)? {
        pod.add_container(container);
    }

    pod.add_volume(
        VolumeBuilder::new(CONFIG_VOLUME_NAME)
            .with_config_map(&name)
            .build(),
    )
    .and_then(|pod| {
        pod.add_volume(
            VolumeBuilder::new(LOG_VOLUME_NAME)
                .with_empty_dir(
                    None::<String>,
                    Some(Quantity(LOG_VOLUME_SIZE_LIMIT.to_string())),
                )
                .build(),
        )
    })
    .context(BuildPodSnafu { name: &name })?;

    if let Some((volume, _)) =
        authentication.and_then(ResolvedAuthentication::bind_credentials_volume)
    {
        pod.add_volume(volume)
            .context(BuildPodSnafu { name: &name })?;
    }

    Ok(pod.build_template())
}

/// The containers of a role group pod: the main container, the StatsD exporter and, when an
/// aggregator is configured, Vector.
pub fn containers(
    role_group: &RoleGroupContext,
    authentication: Option<&ResolvedAuthentication>,
) -> Result<Vec<Container>> {
    let cluster = &role_group.cluster;
    let mut containers = vec![
        main_container(role_group, authentication)?,
        metrics_container(role_group)?,
    ];
    if cluster.config.spec.vector_aggregator_config_map_name.is_some() {
        containers.push(vector_container(
            &cluster.image.image,
            &cluster.image.image_pull_policy,
            role_group.config(),
        )?);
    }
    Ok(containers)
}

fn main_container(
    role_group: &RoleGroupContext,
    authentication: Option<&ResolvedAuthentication>,
) -> Result<Container> {
    let name = role_group.role.to_string();
    let cluster = &role_group.cluster;
    let overrides = &role_group.spec.config;

    let mut container = ContainerBuilder::new(&name).context(BuildContainerSnafu { name: &name })?;
    container
        .image(&cluster.image.image)
        .image_pull_policy(&cluster.image.image_pull_policy)
        .add_env_from_secret(&cluster.config.env_secret_name)
        .add_env_var("SUPERSET_PORT", HTTP_PORT.to_string())
        .add_env_var("PYTHONPATH", PYTHONPATH_DIR)
        .add_env_var(
            "SUPERSET_CONFIG_PATH",
            format!("{PYTHONPATH_DIR}/{SUPERSET_CONFIG_FILE}"),
        )
        .add_volume_mount_struct(
            VolumeMountBuilder::new(CONFIG_VOLUME_NAME, CONFIG_MOUNT_DIR)
                .read_only(true)
                .build(),
        )
        .and_then(|container| container.add_volume_mount(LOG_VOLUME_NAME, LOG_DIR))
        .context(BuildContainerSnafu { name: &name })?;

    if let Some(resources) = &role_group.config().resources {
        container.resources(ResourceRequirements::from(resources));
    }

    match role_group.role {
        SupersetRole::Node => {
            let probe = build_probe(&ProbeHandler::health(), WEBSERVER_PROBE_TIMINGS);
            container
                .command(bash_command())
                .args(vec![run_in_background(WEBSERVER_COMMAND)])
                .add_container_port(HTTP_PORT_NAME, HTTP_PORT)
                .probes_with_health()
                .liveness_probe(probe.clone())
                .readiness_probe(probe);
        }
        SupersetRole::Worker => {
            let ping = format!("celery -A {CELERY_APP} inspect ping -d celery@$HOSTNAME");
            container
                .command(bash_command())
                .args(vec![run_in_background(&format!(
                    "celery --app={CELERY_APP} worker"
                ))])
                .liveness_probe(build_probe(
                    &ProbeHandler::exec(["sh", "-c", ping.as_str()]),
                    WORKER_PROBE_TIMINGS,
                ));
        }
    }

    if let Some(secret) = authentication.and_then(ResolvedAuthentication::client_credentials_secret)
    {
        container.add_env_from_secret(secret);
    }

    if let Some((volume, dir)) =
        authentication.and_then(ResolvedAuthentication::bind_credentials_volume)
    {
        container
            .add_volume_mount_struct(
                VolumeMountBuilder::new(volume.name, dir)
                    .read_only(true)
                    .build(),
            )
            .context(BuildContainerSnafu { name: &name })?;
    }

    container.add_env_vars(&overrides.env_overrides);
    if !overrides.command_overrides.is_empty() {
        container
            .command(overrides.command_overrides.clone())
            .args(Vec::new());
    }

    Ok(container.build())
}

fn bash_command() -> Vec<String> {
    Vec::from(["/bin/bash", "-x", "-euo", "pipefail", "-c"].map(String::from))
}

/// Wraps `command` so it runs with the config files in place, receives `SIGTERM` and tells the
/// Vector sidecar when it exited.
fn run_in_background(command: &str) -> String {
    formatdoc! {"
        mkdir --parents {PYTHONPATH_DIR}
        cp {CONFIG_MOUNT_DIR}/* {PYTHONPATH_DIR}

        {REMOVE_SHUTDOWN_FILE_COMMAND}
        {SIGNAL_HANDLERS}
        prepare_signal_handlers
        {command} &
        wait_for_termination $!
        {CREATE_SHUTDOWN_FILE_COMMAND}
    "}
}

/// Runs the StatsD exporter receiving the metrics Superset reports and exposing them to
/// Prometheus.
fn metrics_container(role_group: &RoleGroupContext) -> Result<Container> {
    let image = &role_group.cluster.image;
    let script = formatdoc! {"
        {SIGNAL_HANDLERS}
        prepare_signal_handlers
        /kubedoop/bin/statsd-exporter &
        wait_for_termination $!
    "};

    let container = ContainerBuilder::new(METRICS_CONTAINER_NAME)
        .context(BuildContainerSnafu {
            name: METRICS_CONTAINER_NAME,
        })?
        .image(&image.image)
        .image_pull_policy(&image.image_pull_policy)
        .command(bash_command())
        .args(vec![script])
        .add_container_port(METRICS_PORT_NAME, METRICS_PORT)
        .automatic_probes()
        .build();
    Ok(container)
}
