use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use kubedoop_operator::{
    YamlSchema,
    cli::{Command, RunArguments},
    client::initialize_operator,
    crd::authentication::AuthenticationClass,
    k8s_openapi::api::{
        apps::v1::{Deployment, StatefulSet},
        batch::v1::Job,
        core::v1::{ConfigMap, Secret, Service},
        networking::v1::Ingress,
        policy::v1::PodDisruptionBudget,
    },
    kube::{
        core::DeserializeGuard,
        runtime::{
            Controller,
            events::{Recorder, Reporter},
            watcher,
        },
    },
    logging::{controller::report_controller_reconciled, initialize_logging},
};
use tracing::{Instrument, info_span};

use crate::{
    controller::Ctx,
    crd::{APP_NAME, FULL_CONTROLLER_NAME, OPERATOR_NAME, SupersetCluster},
};

mod controller;
mod crd;
mod resources;

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

#[derive(Parser)]
#[clap(about, author)]
struct Opts {
    #[clap(subcommand)]
    cmd: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    match opts.cmd {
        Command::Crd => {
            SupersetCluster::print_yaml_schema()?;
            AuthenticationClass::print_yaml_schema()?;
        }
        Command::Run(RunArguments {
            watch_namespace,
            log_format,
        }) => {
            let _log_guard = initialize_logging("SUPERSET_OPERATOR_LOG", APP_NAME, log_format);

            tracing::info!(
                built_info.pkg_version = built_info::PKG_VERSION,
                built_info.git_version = built_info::GIT_VERSION,
                built_info.target = built_info::TARGET,
                built_info.built_time_utc = built_info::BUILT_TIME_UTC,
                built_info.rustc_version = built_info::RUSTC_VERSION,
                "Starting {description}",
                description = built_info::PKG_DESCRIPTION
            );

            let client = initialize_operator(Some(OPERATOR_NAME.to_string())).await?;
            let event_recorder = Arc::new(Recorder::new(
                client.as_kube_client(),
                Reporter {
                    controller: FULL_CONTROLLER_NAME.to_string(),
                    instance: None,
                },
            ));

            Controller::new(
                watch_namespace.get_api::<DeserializeGuard<SupersetCluster>>(&client),
                watcher::Config::default(),
            )
            .owns(
                watch_namespace.get_api::<DeserializeGuard<ConfigMap>>(&client),
                watcher::Config::default(),
            )
            .owns(
                watch_namespace.get_api::<DeserializeGuard<Secret>>(&client),
                watcher::Config::default(),
            )
            .owns(
                watch_namespace.get_api::<DeserializeGuard<Service>>(&client),
                watcher::Config::default(),
            )
            .owns(
                watch_namespace.get_api::<DeserializeGuard<Deployment>>(&client),
                watcher::Config::default(),
            )
            .owns(
                watch_namespace.get_api::<DeserializeGuard<StatefulSet>>(&client),
                watcher::Config::default(),
            )
            .owns(
                watch_namespace.get_api::<DeserializeGuard<Job>>(&client),
                watcher::Config::default(),
            )
            .owns(
                watch_namespace.get_api::<DeserializeGuard<Ingress>>(&client),
                watcher::Config::default(),
            )
            .owns(
                watch_namespace.get_api::<DeserializeGuard<PodDisruptionBudget>>(&client),
                watcher::Config::default(),
            )
            .shutdown_on_signal()
            .run(
                controller::reconcile,
                controller::error_policy,
                Arc::new(Ctx {
                    client: client.clone(),
                }),
            )
            // events are aggregated through the shared recorder
            .for_each_concurrent(16, |result| {
                let event_recorder = event_recorder.clone();
                async move {
                    report_controller_reconciled(&event_recorder, FULL_CONTROLLER_NAME, &result)
                        .await;
                }
            })
            .instrument(info_span!("superset_controller"))
            .await;
        }
    }

    Ok(())
}
