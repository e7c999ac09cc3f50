use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::{Container, Service, ServicePort, ServiceSpec},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use snafu::{Snafu, ensure};

use crate::kvp::Labels;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display("service {name:?} has neither ports nor is it headless"))]
    NoPorts { name: String },

    #[snafu(display("service {name:?} has no selector"))]
    NoSelector { name: String },
}

/// A builder to build [`Service`] objects, usually exposing the ports of one role group.
#[derive(Clone, Debug, Default)]
pub struct ServiceBuilder {
    metadata: ObjectMeta,
    selector: BTreeMap<String, String>,
    ports: Vec<ServicePort>,
    service_type: Option<String>,
    headless: bool,
}

impl ServiceBuilder {
    pub fn new(metadata: impl Into<ObjectMeta>) -> Self {
        Self {
            metadata: metadata.into(),
            ..Self::default()
        }
    }

    pub fn match_labels(&mut self, labels: Labels) -> &mut Self {
        self.selector = labels.into();
        self
    }

    pub fn add_port(&mut self, name: impl Into<String>, port: i32) -> &mut Self {
        self.ports.push(ServicePort {
            name: Some(name.into()),
            port,
            protocol: Some("TCP".to_string()),
            ..ServicePort::default()
        });
        self
    }

    /// Exposes every named port of the given containers under its container port name.
    pub fn ports_from_containers<'a>(
        &mut self,
        containers: impl IntoIterator<Item = &'a Container>,
    ) -> &mut Self {
        for container in containers {
            for port in container.ports.iter().flatten() {
                if let Some(name) = &port.name {
                    self.ports.push(ServicePort {
                        name: Some(name.clone()),
                        port: port.container_port,
                        protocol: Some(port.protocol.clone().unwrap_or_else(|| "TCP".to_string())),
                        ..ServicePort::default()
                    });
                }
            }
        }
        self
    }

    pub fn service_type(&mut self, service_type: impl Into<String>) -> &mut Self {
        self.service_type = Some(service_type.into());
        self
    }

    /// A headless service does not get a cluster IP, its DNS name resolves to the pod IPs.
    pub fn headless(&mut self) -> &mut Self {
        self.headless = true;
        self
    }

    pub fn build(&self) -> Result<Service> {
        let name = self.metadata.name.clone().unwrap_or_default();
        ensure!(!self.ports.is_empty() || self.headless, NoPortsSnafu { name: &name });
        ensure!(!self.selector.is_empty(), NoSelectorSnafu { name: &name });

        Ok(Service {
            metadata: self.metadata.clone(),
            spec: Some(ServiceSpec {
                type_: Some(
                    self.service_type
                        .clone()
                        .unwrap_or_else(|| "ClusterIP".to_string()),
                ),
                cluster_ip: self.headless.then(|| "None".to_string()),
                ports: (!self.ports.is_empty()).then(|| self.ports.clone()),
                selector: Some(self.selector.clone()),
                ..ServiceSpec::default()
            }),
            status: None,
        })
    }
}
