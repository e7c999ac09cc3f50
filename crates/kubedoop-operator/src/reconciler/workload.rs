use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use tracing::{info, instrument};

use super::{
    NOT_READY_REQUEUE_DELAY, ReconcileAction, Reconciler, ResourceBuilder, ResourceReconciler,
};
use crate::client::{ManagedResource, ResourceClient};

/// A replicated workload whose readiness can be read from its status.
pub trait Workload: ManagedResource {
    fn set_replicas(&mut self, replicas: i32);

    /// The number of replicas asked for, `1` when unset like the API server defaults it.
    fn desired_replicas(&self) -> i32;

    fn ready_replicas(&self) -> i32;
}

impl Workload for Deployment {
    fn set_replicas(&mut self, replicas: i32) {
        self.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
    }

    fn desired_replicas(&self) -> i32 {
        self.spec
            .as_ref()
            .and_then(|spec| spec.replicas)
            .unwrap_or(1)
    }

    fn ready_replicas(&self) -> i32 {
        self.status
            .as_ref()
            .and_then(|status| status.ready_replicas)
            .unwrap_or_default()
    }
}

impl Workload for StatefulSet {
    fn set_replicas(&mut self, replicas: i32) {
        self.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
    }

    fn desired_replicas(&self) -> i32 {
        self.spec
            .as_ref()
            .and_then(|spec| spec.replicas)
            .unwrap_or(1)
    }

    fn ready_replicas(&self) -> i32 {
        self.status
            .as_ref()
            .and_then(|status| status.ready_replicas)
            .unwrap_or_default()
    }
}

/// A [`ResourceReconciler`] for workloads. It scales the workload to zero while the cluster is
/// stopped and polls the ready replicas.
pub struct WorkloadReconciler<B> {
    inner: ResourceReconciler<B>,
    stopped: bool,
}

impl<B> WorkloadReconciler<B>
where
    B: ResourceBuilder,
    B::Resource: Workload,
{
    pub fn new(client: ResourceClient, builder: B, stopped: bool) -> Self {
        Self {
            inner: ResourceReconciler::new(client, builder),
            stopped,
        }
    }
}

/// Forces the replicas of a stopped workload to zero.
pub fn apply_cluster_operation<W: Workload>(workload: &mut W, stopped: bool) {
    if stopped {
        workload.set_replicas(0);
    }
}

/// `Continue` once every desired replica is ready, otherwise poll again.
pub fn readiness<W: Workload>(workload: &W) -> ReconcileAction {
    if workload.ready_replicas() >= workload.desired_replicas() {
        ReconcileAction::Continue
    } else {
        ReconcileAction::Requeue(NOT_READY_REQUEUE_DELAY)
    }
}

#[async_trait]
impl<B> Reconciler for WorkloadReconciler<B>
where
    B: ResourceBuilder,
    B::Resource: Workload,
{
    type Error = B::Error;

    fn name(&self) -> String {
        self.inner.name()
    }

    #[instrument(skip(self), fields(name = self.inner.name(), stopped = self.stopped))]
    async fn reconcile(&self) -> Result<ReconcileAction, Self::Error> {
        let mut workload = self.inner.builder().build().await?;
        apply_cluster_operation(&mut workload, self.stopped);
        self.inner.apply(workload).await
    }

    #[instrument(skip(self), fields(name = self.inner.name()))]
    async fn ready(&self) -> Result<ReconcileAction, Self::Error> {
        let live = self
            .inner
            .client()
            .get::<B::Resource>(&self.inner.name(), None)
            .await?;
        let action = readiness(&live);
        if action.is_requeue() {
            info!(
                ready = live.ready_replicas(),
                desired = live.desired_replicas(),
                "workload is not ready yet"
            );
        }
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus, StatefulSetStatus};
    use rstest::rstest;

    use super::*;

    fn deployment(replicas: Option<i32>, ready: Option<i32>) -> Deployment {
        Deployment {
            spec: Some(DeploymentSpec {
                replicas,
                ..DeploymentSpec::default()
            }),
            status: Some(DeploymentStatus {
                ready_replicas: ready,
                ..DeploymentStatus::default()
            }),
            ..Deployment::default()
        }
    }

    #[rstest]
    #[case(Some(5), true, 0)]
    #[case(Some(5), false, 5)]
    #[case(None, true, 0)]
    #[case(Some(0), false, 0)]
    fn stopped_cluster_has_no_replicas(
        #[case] replicas: Option<i32>,
        #[case] stopped: bool,
        #[case] expected: i32,
    ) {
        let mut workload = deployment(replicas, None);
        apply_cluster_operation(&mut workload, stopped);
        assert_eq!(workload.desired_replicas(), expected);
    }

    #[rstest]
    #[case(Some(2), Some(2), ReconcileAction::Continue)]
    #[case(Some(2), Some(1), ReconcileAction::Requeue(Duration::from_secs(5)))]
    #[case(Some(2), None, ReconcileAction::Requeue(Duration::from_secs(5)))]
    #[case(Some(0), None, ReconcileAction::Continue)]
    #[case(None, Some(1), ReconcileAction::Continue)]
    fn deployment_readiness(
        #[case] replicas: Option<i32>,
        #[case] ready: Option<i32>,
        #[case] expected: ReconcileAction,
    ) {
        assert_eq!(readiness(&deployment(replicas, ready)), expected);
    }

    #[test]
    fn statefulset_without_status_is_not_ready() {
        let mut statefulset = StatefulSet::default();
        statefulset.set_replicas(1);
        assert!(readiness(&statefulset).is_requeue());

        statefulset.status = Some(StatefulSetStatus {
            ready_replicas: Some(1),
            ..StatefulSetStatus::default()
        });
        assert_eq!(readiness(&statefulset), ReconcileAction::Continue);
    }
}
