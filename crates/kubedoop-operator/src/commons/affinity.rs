use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::{Affinity, PodAffinityTerm, PodAntiAffinity, WeightedPodAffinityTerm},
    apimachinery::pkg::apis::meta::v1::LabelSelector,
};

use crate::kvp::consts::{K8S_APP_COMPONENT_KEY, K8S_APP_INSTANCE_KEY, K8S_APP_NAME_KEY};

pub const TOPOLOGY_KEY_HOSTNAME: &str = "kubernetes.io/hostname";

/// The weight used when spreading the Pods of one role across nodes.
pub const DEFAULT_ANTI_AFFINITY_WEIGHT: i32 = 70;

/// Creates a `WeightedPodAffinityTerm`, which expresses an affinity towards all Pods of the given
/// product (`app_name`) instance (`cluster_name`) role (`role`).
/// This affinity can be used to attract towards (affinity) or away (anti-affinity) from the
/// specified role. One common example would be to use this to distribute all the Pods of a certain
/// role, so that e.g. the web servers don't share a single point of failure.
pub fn affinity_between_role_pods(
    app_name: &str,
    cluster_name: &str,
    role: &str,
    weight: i32,
) -> WeightedPodAffinityTerm {
    WeightedPodAffinityTerm {
        pod_affinity_term: PodAffinityTerm {
            label_selector: Some(LabelSelector {
                match_expressions: None,
                match_labels: Some(BTreeMap::from([
                    (K8S_APP_NAME_KEY.to_string(), app_name.to_string()),
                    (K8S_APP_INSTANCE_KEY.to_string(), cluster_name.to_string()),
                    (K8S_APP_COMPONENT_KEY.to_string(), role.to_string()),
                    // We don't include the role-group label here, as the affinity should be between all rolegroups of the given role
                ])),
            }),
            topology_key: TOPOLOGY_KEY_HOSTNAME.to_string(),
            ..PodAffinityTerm::default()
        },
        weight,
    }
}

/// The affinity used when the user did not configure one: prefer to schedule Pods of one role
/// on different nodes.
pub fn default_role_affinity(app_name: &str, cluster_name: &str, role: &str) -> Affinity {
    Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                affinity_between_role_pods(
                    app_name,
                    cluster_name,
                    role,
                    DEFAULT_ANTI_AFFINITY_WEIGHT,
                ),
            ]),
            required_during_scheduling_ignored_during_execution: None,
        }),
        ..Affinity::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_affinity_spreads_role_pods() {
        let affinity = default_role_affinity("superset", "simple", "node");

        assert_eq!(affinity.node_affinity, None);
        assert_eq!(affinity.pod_affinity, None);

        let terms = affinity
            .pod_anti_affinity
            .and_then(|anti| anti.preferred_during_scheduling_ignored_during_execution)
            .expect("preferred anti affinity");
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].weight, 70);
        assert_eq!(terms[0].pod_affinity_term.topology_key, "kubernetes.io/hostname");

        let labels = terms[0]
            .pod_affinity_term
            .label_selector
            .as_ref()
            .and_then(|selector| selector.match_labels.as_ref())
            .expect("match labels");
        assert_eq!(labels.len(), 3);
        assert_eq!(
            labels.get("app.kubernetes.io/component").map(String::as_str),
            Some("node")
        );
    }
}
