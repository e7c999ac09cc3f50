use std::cmp;

use kube::ResourceExt;

use crate::{
    reconciler::Workload,
    status::condition::{
        ClusterCondition, ClusterConditionSet, ClusterConditionStatus, ClusterConditionType,
        ConditionBuilder,
    },
};

/// Builds the `Available` condition from the Deployments and StatefulSets of a cluster.
#[derive(Debug, Default)]
pub struct WorkloadConditionBuilder {
    /// Name and availability of every workload added.
    workloads: Vec<(String, ClusterConditionStatus)>,
}

impl ConditionBuilder for WorkloadConditionBuilder {
    fn build_conditions(&self) -> ClusterConditionSet {
        vec![self.available()].into()
    }
}

impl WorkloadConditionBuilder {
    pub fn add<W: Workload>(&mut self, workload: &W) -> &mut Self {
        self.workloads
            .push((workload.name_any(), Self::workload_available(workload)));
        self
    }

    fn available(&self) -> ClusterCondition {
        let mut available = ClusterConditionStatus::True;
        let mut unavailable = Vec::new();
        for (name, status) in &self.workloads {
            if *status != ClusterConditionStatus::True {
                unavailable.push(name.as_str());
            }
            available = cmp::max(available, *status);
        }
        unavailable.sort_unstable();

        let message = match available {
            ClusterConditionStatus::True => {
                "All workloads have the requested amount of ready replicas.".to_string()
            }
            ClusterConditionStatus::False => {
                format!("Workloads {unavailable:?} are missing ready replicas.")
            }
            ClusterConditionStatus::Unknown => "Workload status cannot be determined.".to_string(),
        };

        ClusterCondition {
            message: Some(message),
            status: available,
            type_: ClusterConditionType::Available,
            ..ClusterCondition::default()
        }
    }

    /// A workload is available when all requested replicas are ready. A workload scaled to
    /// zero counts as available.
    fn workload_available<W: Workload>(workload: &W) -> ClusterConditionStatus {
        if workload.ready_replicas() >= workload.desired_replicas() {
            ClusterConditionStatus::True
        } else {
            ClusterConditionStatus::False
        }
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::apps::v1::{
        Deployment, DeploymentSpec, DeploymentStatus, StatefulSet, StatefulSetSpec,
        StatefulSetStatus,
    };
    use kube::api::ObjectMeta;

    use super::*;

    fn deployment(name: &str, replicas: i32, ready: i32) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                ..DeploymentSpec::default()
            }),
            status: Some(DeploymentStatus {
                ready_replicas: Some(ready),
                ..DeploymentStatus::default()
            }),
        }
    }

    fn statefulset(name: &str, replicas: i32, ready: i32) -> StatefulSet {
        StatefulSet {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(StatefulSetSpec {
                replicas: Some(replicas),
                ..StatefulSetSpec::default()
            }),
            status: Some(StatefulSetStatus {
                ready_replicas: Some(ready),
                ..StatefulSetStatus::default()
            }),
        }
    }

    #[test]
    fn all_ready_is_available() {
        let mut builder = WorkloadConditionBuilder::default();
        builder
            .add(&deployment("simple-node-default", 2, 2))
            .add(&statefulset("simple-worker-default", 1, 1));

        let condition = builder.available();
        assert_eq!(condition.status, ClusterConditionStatus::True);
    }

    #[test]
    fn missing_replicas_are_named() {
        let mut builder = WorkloadConditionBuilder::default();
        builder
            .add(&statefulset("simple-worker-default", 1, 0))
            .add(&deployment("simple-node-default", 2, 1))
            .add(&deployment("simple-node-large", 0, 0));

        let condition = builder.available();
        assert_eq!(condition.status, ClusterConditionStatus::False);
        assert_eq!(
            condition.message.as_deref(),
            Some(r#"Workloads ["simple-node-default", "simple-worker-default"] are missing ready replicas."#)
        );
    }
}
