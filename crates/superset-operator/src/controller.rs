//! Reconciles a `SupersetCluster`: the reconciler tree writes the cluster objects, then the
//! status conditions are derived from the workloads and the outcome of the pass. A failed pass
//! is recorded in the status before the error is returned.
use std::{sync::Arc, time::Duration};

use kubedoop_operator::{
    client::{self, Client},
    k8s_openapi::api::apps::v1::{Deployment, StatefulSet},
    kube::{
        ResourceExt,
        api::ListParams,
        core::{DeserializeGuard, error_boundary},
        runtime::controller::Action,
    },
    kvp::{LabelError, Labels},
    logging::controller::ReconcilerError,
    reconciler::{ReconcileAction, Reconciler},
    status::condition::{
        ConditionBuilder, compute_conditions, operations::ClusterOperationsConditionBuilder,
        reconcile::ReconcileConditionBuilder, workload::WorkloadConditionBuilder,
    },
};
use snafu::{OptionExt, ResultExt, Snafu};
use strum::{EnumDiscriminants, IntoStaticStr};

use crate::{
    crd::{APP_NAME, SupersetCluster, SupersetClusterStatus},
    resources::{self, cluster::cluster_reconciler},
};

pub struct Ctx {
    pub client: Client,
}

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
pub enum Error {
    #[snafu(display("SupersetCluster object is invalid"))]
    InvalidSupersetCluster {
        source: error_boundary::InvalidObject,
    },

    #[snafu(display("failed to reconcile the cluster objects"))]
    Reconcile { source: resources::Error },

    #[snafu(display("object has no namespace"))]
    ObjectHasNoNamespace,

    #[snafu(display("failed to build the cluster label selector"))]
    BuildLabels { source: LabelError },

    #[snafu(display("failed to list the workloads of the cluster"))]
    ListWorkloads { source: client::Error },

    #[snafu(display("failed to update the status"))]
    ApplyStatus { source: client::Error },
}

type Result<T, E = Error> = std::result::Result<T, E>;

impl ReconcilerError for Error {
    fn category(&self) -> &'static str {
        ErrorDiscriminants::from(self).into()
    }
}

pub async fn reconcile(
    superset: Arc<DeserializeGuard<SupersetCluster>>,
    ctx: Arc<Ctx>,
) -> Result<Action> {
    tracing::info!("Starting reconcile");

    let superset = Arc::new(
        superset
            .0
            .as_ref()
            .map_err(error_boundary::InvalidObject::clone)
            .context(InvalidSupersetClusterSnafu)?
            .clone(),
    );

    let (action, reconciled) = if superset.spec.cluster_operation.reconciliation_paused {
        tracing::info!("Reconciliation is paused, only the status is updated");
        (Ok(Action::await_change()), None)
    } else {
        let action = reconcile_objects(&superset, &ctx.client).await;
        let reconciled = reconciled_condition(&action);
        (action, Some(reconciled))
    };

    let status = update_status(&superset, &ctx.client, reconciled.as_ref()).await;
    match (action, status) {
        (Ok(action), Ok(())) => Ok(action),
        (Err(error), Ok(())) | (Ok(_), Err(error)) => Err(error),
        (Err(error), Err(status_error)) => {
            tracing::warn!(
                error = &status_error as &dyn std::error::Error,
                "failed to record the failed reconciliation in the status"
            );
            Err(error)
        }
    }
}

/// The `Reconciled` condition for the outcome of [`reconcile_objects`].
fn reconciled_condition(action: &Result<Action>) -> ReconcileConditionBuilder {
    match action {
        Ok(_) => ReconcileConditionBuilder::succeeded(),
        Err(error) => ReconcileConditionBuilder::failed(error),
    }
}

/// Writes the objects of the cluster and, once all of them are written, waits for them to become
/// ready.
async fn reconcile_objects(superset: &Arc<SupersetCluster>, client: &Client) -> Result<Action> {
    let tree = cluster_reconciler(superset, client.clone()).context(ReconcileSnafu)?;
    tracing::debug!(objects = ?tree.names(), "reconciling cluster objects");

    let mut outcome = tree.reconcile().await.context(ReconcileSnafu)?;
    if !outcome.is_requeue() {
        outcome = tree.ready().await.context(ReconcileSnafu)?;
    }

    Ok(to_action(outcome))
}

fn to_action(outcome: ReconcileAction) -> Action {
    match outcome {
        ReconcileAction::Requeue(after) => Action::requeue(after),
        ReconcileAction::Continue => Action::await_change(),
    }
}

/// Renders `labels` as a label selector matching all of them.
fn label_selector(labels: &Labels) -> String {
    labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Derives the conditions from the workloads and the cluster operation. `reconciled` is left out
/// while the reconciliation is paused, which keeps the last recorded outcome.
async fn update_status(
    superset: &SupersetCluster,
    client: &Client,
    reconciled: Option<&ReconcileConditionBuilder>,
) -> Result<()> {
    let namespace = superset.namespace().context(ObjectHasNoNamespaceSnafu)?;
    let labels = Labels::common(APP_NAME, &superset.name_any()).context(BuildLabelsSnafu)?;
    let list_params = ListParams::default().labels(&label_selector(&labels));

    let deployments: Vec<Deployment> = client
        .list(&namespace, &list_params)
        .await
        .context(ListWorkloadsSnafu)?;
    let statefulsets: Vec<StatefulSet> = client
        .list(&namespace, &list_params)
        .await
        .context(ListWorkloadsSnafu)?;

    let mut workloads = WorkloadConditionBuilder::default();
    for deployment in &deployments {
        workloads.add(deployment);
    }
    for statefulset in &statefulsets {
        workloads.add(statefulset);
    }
    let operations = ClusterOperationsConditionBuilder::new(&superset.spec.cluster_operation);

    let status = {
        let mut builders: Vec<&dyn ConditionBuilder> = vec![&workloads, &operations];
        if let Some(reconciled) = reconciled {
            builders.push(reconciled);
        }
        SupersetClusterStatus {
            conditions: compute_conditions(superset, &builders),
        }
    };
    client
        .merge_patch_status(superset, &status)
        .await
        .context(ApplyStatusSnafu)?;

    Ok(())
}

pub fn error_policy(
    _obj: Arc<DeserializeGuard<SupersetCluster>>,
    error: &Error,
    _ctx: Arc<Ctx>,
) -> Action {
    match error {
        Error::InvalidSupersetCluster { .. } => Action::await_change(),
        _ => Action::requeue(Duration::from_secs(5)),
    }
}

#[cfg(test)]
mod tests {
    use kubedoop_operator::status::condition::{ClusterConditionStatus, ClusterConditionType};
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ReconcileAction::Continue, Action::await_change())]
    #[case(
        ReconcileAction::Requeue(Duration::from_secs(1)),
        Action::requeue(Duration::from_secs(1))
    )]
    #[case(
        ReconcileAction::Requeue(Duration::from_secs(5)),
        Action::requeue(Duration::from_secs(5))
    )]
    fn reconcile_outcome_to_action(#[case] outcome: ReconcileAction, #[case] expected: Action) {
        assert_eq!(to_action(outcome), expected);
    }

    #[test]
    fn selector_matches_cluster_labels() {
        let labels = Labels::common(APP_NAME, "simple").expect("valid labels");
        assert_eq!(
            label_selector(&labels),
            "app.kubernetes.io/instance=simple,app.kubernetes.io/name=superset"
        );
    }

    #[test]
    fn failed_reconciliation_is_recorded() {
        let failed: Result<Action> = Err(Error::Reconcile {
            source: resources::Error::MissingNamespace {
                cluster: "simple".to_string(),
            },
        });
        let condition = reconciled_condition(&failed)
            .build_conditions()
            .get(ClusterConditionType::Reconciled)
            .cloned()
            .expect("reconciled condition is set");

        assert_eq!(condition.status, ClusterConditionStatus::False);
        assert_eq!(condition.reason.as_deref(), Some("ReconcileFailed"));
        assert_eq!(
            condition.message.as_deref(),
            Some("failed to reconcile the cluster objects: SupersetCluster \"simple\" has no namespace")
        );

        let succeeded = reconciled_condition(&Ok(Action::await_change()))
            .build_conditions()
            .get(ClusterConditionType::Reconciled)
            .map(|condition| condition.status);
        assert_eq!(succeeded, Some(ClusterConditionStatus::True));
    }

    #[test]
    fn errors_are_categorized_by_variant() {
        let invalid = Error::ObjectHasNoNamespace;
        assert_eq!(ErrorDiscriminants::from(&invalid), ErrorDiscriminants::ObjectHasNoNamespace);
        let category: &'static str = ErrorDiscriminants::from(&invalid).into();
        assert_eq!(category, "ObjectHasNoNamespace");
    }
}
