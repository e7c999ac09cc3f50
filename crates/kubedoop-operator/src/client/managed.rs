//! Per-kind knowledge needed to update objects without fighting the API server.
use std::fmt::Debug;

use k8s_openapi::{
    NamespaceResourceScope,
    api::{
        apps::v1::{Deployment, StatefulSet},
        batch::v1::Job,
        core::v1::{ConfigMap, Secret, Service},
        networking::v1::Ingress,
        policy::v1::PodDisruptionBudget,
    },
};
use kube::Resource;
use serde::{Serialize, de::DeserializeOwned};

/// An object kind the [`ResourceClient`](crate::client::ResourceClient) can create and update.
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Copies fields assigned by the API server from `live` into `self`, so that replacing the
    /// live object with `self` does not reset them.
    fn preserve_server_fields(&mut self, _live: &Self) {}

    /// JSON pointers excluded from the comparison with the live object. A `*` segment matches
    /// every array element.
    fn ignored_diff_pointers() -> Vec<String> {
        Vec::new()
    }

    /// Whether a changed object is deleted instead of replaced, for kinds whose spec is
    /// immutable after creation. The next reconciliation creates it again.
    fn recreate_on_change() -> bool {
        false
    }
}

impl ManagedResource for ConfigMap {}
impl ManagedResource for Secret {}
impl ManagedResource for Deployment {}
impl ManagedResource for Ingress {}
impl ManagedResource for PodDisruptionBudget {}

impl ManagedResource for Service {
    /// Keeps the cluster IP and, for services exposed on nodes, the allocated node ports.
    fn preserve_server_fields(&mut self, live: &Self) {
        let (Some(spec), Some(live_spec)) = (self.spec.as_mut(), live.spec.as_ref()) else {
            return;
        };

        if spec.cluster_ip.is_none() {
            spec.cluster_ip.clone_from(&live_spec.cluster_ip);
        }
        if spec.cluster_ips.is_none() {
            spec.cluster_ips.clone_from(&live_spec.cluster_ips);
        }

        if !matches!(spec.type_.as_deref(), Some("NodePort" | "LoadBalancer")) {
            return;
        }
        let live_ports = live_spec.ports.as_deref().unwrap_or_default();
        for port in spec.ports.iter_mut().flatten() {
            if port.node_port.is_some() {
                continue;
            }
            port.node_port = live_ports
                .iter()
                .find(|live_port| live_port.name == port.name && live_port.port == port.port)
                .and_then(|live_port| live_port.node_port);
        }
    }
}

impl ManagedResource for StatefulSet {
    fn ignored_diff_pointers() -> Vec<String> {
        ["apiVersion", "kind", "metadata", "status"]
            .iter()
            .map(|field| format!("/spec/volumeClaimTemplates/*/{field}"))
            .collect()
    }
}

impl ManagedResource for Job {
    /// The pod template of a Job cannot be changed.
    fn recreate_on_change() -> bool {
        true
    }

    /// The selector and the matching template labels are generated on creation and immutable.
    fn preserve_server_fields(&mut self, live: &Self) {
        let (Some(spec), Some(live_spec)) = (self.spec.as_mut(), live.spec.as_ref()) else {
            return;
        };

        if spec.selector.is_none() {
            spec.selector.clone_from(&live_spec.selector);
            spec.manual_selector = live_spec.manual_selector;
        }

        let live_labels = live_spec
            .template
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.labels.clone())
            .unwrap_or_default();
        if live_labels.is_empty() {
            return;
        }
        let labels = spec
            .template
            .metadata
            .get_or_insert_with(Default::default)
            .labels
            .get_or_insert_with(Default::default);
        for (key, value) in live_labels {
            labels.entry(key).or_insert(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn service(value: serde_json::Value) -> Service {
        serde_json::from_value(value).expect("valid service")
    }

    #[test]
    fn service_keeps_cluster_ip() {
        let mut desired = service(json!({
            "metadata": {"name": "simple-node"},
            "spec": {"ports": [{"name": "http", "port": 8088}]},
        }));
        let live = service(json!({
            "metadata": {"name": "simple-node"},
            "spec": {
                "clusterIP": "10.0.0.5",
                "clusterIPs": ["10.0.0.5"],
                "ports": [{"name": "http", "port": 8088}],
            },
        }));

        desired.preserve_server_fields(&live);

        let spec = desired.spec.expect("spec is set");
        assert_eq!(spec.cluster_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(spec.cluster_ips, Some(vec!["10.0.0.5".to_string()]));
    }

    #[test]
    fn service_keeps_headless_cluster_ip() {
        let mut desired = service(json!({
            "metadata": {"name": "simple-worker"},
            "spec": {"clusterIP": "None"},
        }));
        let live = service(json!({
            "metadata": {"name": "simple-worker"},
            "spec": {"clusterIP": "10.0.0.9"},
        }));

        desired.preserve_server_fields(&live);

        assert_eq!(
            desired.spec.and_then(|spec| spec.cluster_ip).as_deref(),
            Some("None")
        );
    }

    #[test]
    fn node_port_service_keeps_node_ports() {
        let mut desired = service(json!({
            "metadata": {"name": "simple-node"},
            "spec": {
                "type": "NodePort",
                "ports": [{"name": "http", "port": 8088}, {"name": "metrics", "port": 9102}],
            },
        }));
        let live = service(json!({
            "metadata": {"name": "simple-node"},
            "spec": {
                "type": "NodePort",
                "ports": [
                    {"name": "http", "port": 8088, "nodePort": 31000},
                    {"name": "metrics", "port": 9102, "nodePort": 31001},
                ],
            },
        }));

        desired.preserve_server_fields(&live);

        let node_ports = desired
            .spec
            .and_then(|spec| spec.ports)
            .expect("ports are set")
            .into_iter()
            .map(|port| port.node_port)
            .collect::<Vec<_>>();
        assert_eq!(node_ports, vec![Some(31000), Some(31001)]);
    }

    #[test]
    fn cluster_ip_service_does_not_take_node_ports() {
        let mut desired = service(json!({
            "metadata": {"name": "simple-node"},
            "spec": {"ports": [{"name": "http", "port": 8088}]},
        }));
        let live = service(json!({
            "metadata": {"name": "simple-node"},
            "spec": {"type": "NodePort", "ports": [{"name": "http", "port": 8088, "nodePort": 31000}]},
        }));

        desired.preserve_server_fields(&live);

        let port = desired
            .spec
            .and_then(|spec| spec.ports)
            .and_then(|ports| ports.into_iter().next())
            .expect("one port");
        assert_eq!(port.node_port, None);
    }

    #[test]
    fn job_keeps_generated_selector() {
        let mut desired: Job = serde_json::from_value(json!({
            "metadata": {"name": "simple-init"},
            "spec": {"template": {"metadata": {"labels": {"app": "superset"}}}},
        }))
        .expect("valid job");
        let live: Job = serde_json::from_value(json!({
            "metadata": {"name": "simple-init"},
            "spec": {
                "selector": {"matchLabels": {"batch.kubernetes.io/controller-uid": "abc"}},
                "template": {"metadata": {"labels": {
                    "app": "superset",
                    "batch.kubernetes.io/controller-uid": "abc",
                }}},
            },
        }))
        .expect("valid job");

        desired.preserve_server_fields(&live);

        let spec = desired.spec.expect("spec is set");
        assert!(spec.selector.is_some());
        let labels = spec
            .template
            .metadata
            .and_then(|metadata| metadata.labels)
            .expect("labels are set");
        assert_eq!(
            labels.get("batch.kubernetes.io/controller-uid").map(String::as_str),
            Some("abc")
        );
    }

    #[test]
    fn only_jobs_are_recreated() {
        assert!(Job::recreate_on_change());
        assert!(!Deployment::recreate_on_change());
        assert!(!StatefulSet::recreate_on_change());
        assert!(!Service::recreate_on_change());
    }
}
