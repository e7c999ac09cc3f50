use crate::{
    commons::cluster_operation::ClusterOperation,
    status::condition::{
        ClusterCondition, ClusterConditionSet, ClusterConditionStatus, ClusterConditionType,
        ConditionBuilder,
    },
};

/// Builds the `ReconciliationPaused` and `Stopped` conditions from the [`ClusterOperation`].
#[derive(Debug, Clone)]
pub struct ClusterOperationsConditionBuilder<'a> {
    cluster_operation: &'a ClusterOperation,
}

impl ConditionBuilder for ClusterOperationsConditionBuilder<'_> {
    fn build_conditions(&self) -> ClusterConditionSet {
        vec![self.reconciliation_paused(), self.cluster_stopped()].into()
    }
}

impl<'a> ClusterOperationsConditionBuilder<'a> {
    pub const fn new(cluster_operation: &'a ClusterOperation) -> Self {
        Self { cluster_operation }
    }

    fn reconciliation_paused(&self) -> ClusterCondition {
        let (status, message) = if self.cluster_operation.reconciliation_paused {
            (
                ClusterConditionStatus::True,
                "The cluster reconciliation is paused. Only the cluster status is reconciled.",
            )
        } else {
            (
                ClusterConditionStatus::False,
                "The cluster is reconciled normally.",
            )
        };

        ClusterCondition {
            message: Some(message.to_string()),
            status,
            type_: ClusterConditionType::ReconciliationPaused,
            ..ClusterCondition::default()
        }
    }

    fn cluster_stopped(&self) -> ClusterCondition {
        let operation = self.cluster_operation;
        let (status, message) = match (operation.stopped, operation.reconciliation_paused) {
            (true, true) => (
                ClusterConditionStatus::Unknown,
                "The cluster stopped status could not be determined. This might be due to the cluster reconciliation being paused.",
            ),
            (true, false) => (ClusterConditionStatus::True, "The cluster is stopped."),
            (false, _) => (ClusterConditionStatus::False, "The cluster is running."),
        };

        ClusterCondition {
            message: Some(message.to_string()),
            status,
            type_: ClusterConditionType::Stopped,
            ..ClusterCondition::default()
        }
    }
}
