use std::{error::Error, iter};

use crate::status::condition::{
    ClusterCondition, ClusterConditionSet, ClusterConditionStatus, ClusterConditionType,
    ConditionBuilder,
};

const SUCCEEDED_REASON: &str = "ReconcileSucceeded";
const FAILED_REASON: &str = "ReconcileFailed";

/// Builds the `Reconciled` condition from the outcome of writing the cluster objects.
#[derive(Clone, Debug)]
pub struct ReconcileConditionBuilder {
    failure: Option<String>,
}

impl ConditionBuilder for ReconcileConditionBuilder {
    fn build_conditions(&self) -> ClusterConditionSet {
        vec![self.reconciled()].into()
    }
}

impl ReconcileConditionBuilder {
    pub const fn succeeded() -> Self {
        Self { failure: None }
    }

    /// The message lists `error` and all of its sources.
    pub fn failed(error: &(dyn Error + 'static)) -> Self {
        let failure = iter::successors(Some(error), |&error| error.source())
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(": ");
        Self {
            failure: Some(failure),
        }
    }

    fn reconciled(&self) -> ClusterCondition {
        let (status, reason, message) = match &self.failure {
            None => (
                ClusterConditionStatus::True,
                SUCCEEDED_REASON,
                "All cluster objects are up to date.".to_string(),
            ),
            Some(failure) => (ClusterConditionStatus::False, FAILED_REASON, failure.clone()),
        };

        ClusterCondition {
            message: Some(message),
            reason: Some(reason.to_string()),
            status,
            type_: ClusterConditionType::Reconciled,
            ..ClusterCondition::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use snafu::Snafu;

    use super::*;

    #[derive(Debug, Snafu)]
    #[snafu(display("failed to write Job \"simple-init\""))]
    struct WriteError {
        source: std::io::Error,
    }

    fn reconciled(builder: &ReconcileConditionBuilder) -> ClusterCondition {
        builder
            .build_conditions()
            .get(ClusterConditionType::Reconciled)
            .cloned()
            .expect("reconciled condition is set")
    }

    #[test]
    fn success_is_reconciled() {
        let condition = reconciled(&ReconcileConditionBuilder::succeeded());
        assert_eq!(condition.status, ClusterConditionStatus::True);
        assert_eq!(condition.reason.as_deref(), Some(SUCCEEDED_REASON));
    }

    #[test]
    fn failure_message_lists_sources() {
        let error = WriteError {
            source: std::io::Error::other("field is immutable"),
        };
        let condition = reconciled(&ReconcileConditionBuilder::failed(&error));

        assert_eq!(condition.status, ClusterConditionStatus::False);
        assert_eq!(condition.reason.as_deref(), Some(FAILED_REASON));
        assert_eq!(
            condition.message.as_deref(),
            Some("failed to write Job \"simple-init\": field is immutable")
        );
    }
}
