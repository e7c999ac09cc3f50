//! Conditions written to the status of a cluster object.
pub mod operations;
pub mod reconcile;
pub mod workload;

use k8s_openapi::{apimachinery::pkg::apis::meta::v1::Time, jiff::Timestamp};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::EnumCount;

/// A **data structure** that contains a vector of `ClusterCondition`s.
/// Should usually be implemented on the status of a `CustomResource` or the `CustomResource` itself.
pub trait HasStatusCondition {
    fn conditions(&self) -> Vec<ClusterCondition>;
}

/// A **data structure** that produces a `ClusterConditionSet` containing all required
/// `ClusterCondition`s.
pub trait ConditionBuilder {
    fn build_conditions(&self) -> ClusterConditionSet;
}

/// Computes the final conditions to be set in the operator status condition field.
///
/// `resource` provides the conditions currently set, which are needed to keep the transition
/// times of conditions whose status did not change. Conditions produced by several
/// `condition_builders` for the same type are combined, the worst status wins.
pub fn compute_conditions<T: HasStatusCondition>(
    resource: &T,
    condition_builders: &[&dyn ConditionBuilder],
) -> Vec<ClusterCondition> {
    compute_conditions_at(resource, condition_builders, &Time(Timestamp::now()))
}

fn compute_conditions_at<T: HasStatusCondition>(
    resource: &T,
    condition_builders: &[&dyn ConditionBuilder],
    now: &Time,
) -> Vec<ClusterCondition> {
    let mut new_resource_conditions = ClusterConditionSet::new();
    for cb in condition_builders {
        let conditions: ClusterConditionSet = cb.build_conditions();
        new_resource_conditions = new_resource_conditions.merge(conditions, update_message);
    }

    let old_resource_conditions: ClusterConditionSet = resource.conditions().into();

    old_resource_conditions
        .merge(new_resource_conditions, |old, new| {
            update_timestamps(old, new, now)
        })
        .into()
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCondition {
    /// Last time the condition transitioned from one status to another.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,

    /// The last time this condition was updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<Time>,

    /// A human readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// The reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Status of the condition, one of True, False, Unknown.
    pub status: ClusterConditionStatus,

    /// Type of the condition.
    #[serde(rename = "type")]
    pub type_: ClusterConditionType,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    EnumCount,
    Eq,
    Hash,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "PascalCase")]
pub enum ClusterConditionType {
    /// Available indicates that every workload of the cluster has all requested replicas ready.
    #[default]
    Available,

    /// ReconciliationPaused indicates that the operator only updates the status of the cluster.
    ReconciliationPaused,

    /// Stopped indicates that all the cluster replicas are scaled down to 0. All resources (e.g.
    /// ConfigMaps, Services etc.) are kept.
    Stopped,

    /// Reconciled indicates that the operator wrote every object of the cluster in its last pass.
    Reconciled,
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "PascalCase")]
pub enum ClusterConditionStatus {
    /// True means a resource is in the condition.
    #[default]
    True,

    /// False means a resource is not in the condition.
    False,

    /// Unknown means kubernetes cannot decide if a resource is in the condition or not.
    Unknown,
}

/// Helper struct to order and merge `ClusterCondition` objects.
///
/// Each [`ClusterConditionType`] has a fixed slot, which keeps the order stable and makes it
/// impossible to store a condition under the wrong type.
#[derive(Clone, Debug, Default)]
pub struct ClusterConditionSet {
    conditions: Vec<Option<ClusterCondition>>,
}

impl ClusterConditionSet {
    pub fn new() -> Self {
        Self {
            conditions: vec![None; ClusterConditionType::COUNT],
        }
    }

    /// Adds a [`ClusterCondition`] to its assigned slot.
    fn put(&mut self, condition: ClusterCondition) {
        if let Some(slot) = self.conditions.get_mut(condition.type_ as usize) {
            *slot = Some(condition);
        }
    }

    pub fn get(&self, type_: ClusterConditionType) -> Option<&ClusterCondition> {
        self.conditions
            .get(type_ as usize)
            .and_then(Option::as_ref)
    }

    /// Merges two sets. `condition_combiner` decides what happens to two conditions of the same
    /// type.
    fn merge(
        self,
        other: Self,
        condition_combiner: impl Fn(ClusterCondition, ClusterCondition) -> ClusterCondition,
    ) -> Self {
        let mut result = Self::new();

        for (old_condition, new_condition) in self.conditions.into_iter().zip(other.conditions) {
            let merged = match (old_condition, new_condition) {
                (Some(old), Some(new)) => Some(condition_combiner(old, new)),
                (Some(old), None) => Some(old),
                (None, Some(new)) => Some(new),
                (None, None) => None,
            };
            if let Some(condition) = merged {
                result.put(condition);
            }
        }

        result
    }
}

/// Updates the timestamps, keeping the transition time when the status did not change.
fn update_timestamps(
    old_condition: ClusterCondition,
    new_condition: ClusterCondition,
    now: &Time,
) -> ClusterCondition {
    if old_condition.status == new_condition.status {
        ClusterCondition {
            last_update_time: Some(now.clone()),
            last_transition_time: old_condition
                .last_transition_time
                .or_else(|| Some(now.clone())),
            ..new_condition
        }
    } else {
        ClusterCondition {
            last_update_time: Some(now.clone()),
            last_transition_time: Some(now.clone()),
            ..new_condition
        }
    }
}

/// Keeps the condition with the worst status. Messages of conditions with the same status are
/// joined.
fn update_message(
    old_condition: ClusterCondition,
    new_condition: ClusterCondition,
) -> ClusterCondition {
    match old_condition.status.cmp(&new_condition.status) {
        std::cmp::Ordering::Equal => {
            let message = [old_condition.message, new_condition.message]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join("\n");

            ClusterCondition {
                message: Some(message),
                ..new_condition
            }
        }
        std::cmp::Ordering::Less => new_condition,
        std::cmp::Ordering::Greater => old_condition,
    }
}

impl From<ClusterConditionSet> for Vec<ClusterCondition> {
    fn from(value: ClusterConditionSet) -> Self {
        value.conditions.into_iter().flatten().collect()
    }
}

impl From<Vec<ClusterCondition>> for ClusterConditionSet {
    fn from(value: Vec<ClusterCondition>) -> Self {
        let mut result = Self::new();
        for condition in value {
            result.put(condition);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Status(Vec<ClusterCondition>);

    impl HasStatusCondition for Status {
        fn conditions(&self) -> Vec<ClusterCondition> {
            self.0.clone()
        }
    }

    struct Fixed(ClusterConditionStatus, &'static str);

    impl ConditionBuilder for Fixed {
        fn build_conditions(&self) -> ClusterConditionSet {
            vec![ClusterCondition {
                type_: ClusterConditionType::Available,
                status: self.0,
                message: Some(self.1.to_string()),
                ..ClusterCondition::default()
            }]
            .into()
        }
    }

    fn time(raw: &str) -> Time {
        Time(raw.parse().expect("valid timestamp"))
    }

    #[test]
    fn new_condition_gets_transition_time() {
        let now = time("2024-05-01T10:00:00Z");
        let got = compute_conditions_at(
            &Status(vec![]),
            &[&Fixed(ClusterConditionStatus::True, "ready")],
            &now,
        );

        assert_eq!(got.len(), 1);
        assert_eq!(got[0].last_transition_time, Some(now.clone()));
        assert_eq!(got[0].last_update_time, Some(now));
    }

    #[test]
    fn unchanged_status_keeps_transition_time() {
        let before = time("2024-05-01T10:00:00Z");
        let now = time("2024-05-01T11:00:00Z");
        let old = ClusterCondition {
            type_: ClusterConditionType::Available,
            status: ClusterConditionStatus::True,
            last_transition_time: Some(before.clone()),
            last_update_time: Some(before.clone()),
            ..ClusterCondition::default()
        };

        let got = compute_conditions_at(
            &Status(vec![old]),
            &[&Fixed(ClusterConditionStatus::True, "ready")],
            &now,
        );

        assert_eq!(got[0].last_transition_time, Some(before));
        assert_eq!(got[0].last_update_time, Some(now));
    }

    #[test]
    fn changed_status_moves_transition_time() {
        let before = time("2024-05-01T10:00:00Z");
        let now = time("2024-05-01T11:00:00Z");
        let old = ClusterCondition {
            type_: ClusterConditionType::Available,
            status: ClusterConditionStatus::True,
            last_transition_time: Some(before),
            ..ClusterCondition::default()
        };

        let got = compute_conditions_at(
            &Status(vec![old]),
            &[&Fixed(ClusterConditionStatus::False, "not ready")],
            &now,
        );

        assert_eq!(got[0].status, ClusterConditionStatus::False);
        assert_eq!(got[0].last_transition_time, Some(now));
    }

    #[test]
    fn worst_status_wins_and_messages_join() {
        let now = time("2024-05-01T10:00:00Z");
        let got = compute_conditions_at(
            &Status(vec![]),
            &[
                &Fixed(ClusterConditionStatus::False, "node missing replicas"),
                &Fixed(ClusterConditionStatus::True, "worker ready"),
                &Fixed(ClusterConditionStatus::False, "worker missing replicas"),
            ],
            &now,
        );

        assert_eq!(got[0].status, ClusterConditionStatus::False);
        assert_eq!(
            got[0].message.as_deref(),
            Some("node missing replicas\nworker missing replicas")
        );
    }
}
