use k8s_openapi::{
    api::networking::v1::{
        HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
        IngressServiceBackend, IngressSpec, ServiceBackendPort,
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};

/// A builder to build [`Ingress`] objects routing host/path prefixes to a named service port.
#[derive(Clone, Debug, Default)]
pub struct IngressBuilder {
    metadata: ObjectMeta,
    ingress_class_name: Option<String>,
    rules: Vec<IngressRule>,
}

impl IngressBuilder {
    pub fn new(metadata: impl Into<ObjectMeta>) -> Self {
        Self {
            metadata: metadata.into(),
            ..Self::default()
        }
    }

    pub fn ingress_class_name(&mut self, ingress_class_name: Option<String>) -> &mut Self {
        self.ingress_class_name = ingress_class_name;
        self
    }

    /// Routes requests for `host` (any host if `None`) below `path` to the port called
    /// `port_name` of `service_name`.
    pub fn add_rule(
        &mut self,
        host: Option<String>,
        path: impl Into<String>,
        service_name: impl Into<String>,
        port_name: impl Into<String>,
    ) -> &mut Self {
        self.rules.push(IngressRule {
            host,
            http: Some(HTTPIngressRuleValue {
                paths: vec![HTTPIngressPath {
                    path: Some(path.into()),
                    path_type: "Prefix".to_string(),
                    backend: IngressBackend {
                        service: Some(IngressServiceBackend {
                            name: service_name.into(),
                            port: Some(ServiceBackendPort {
                                name: Some(port_name.into()),
                                number: None,
                            }),
                        }),
                        resource: None,
                    },
                }],
            }),
        });
        self
    }

    pub fn build(&self) -> Ingress {
        Ingress {
            metadata: self.metadata.clone(),
            spec: Some(IngressSpec {
                ingress_class_name: self.ingress_class_name.clone(),
                rules: (!self.rules.is_empty()).then(|| self.rules.clone()),
                ..IngressSpec::default()
            }),
            status: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_and_path_rule() {
        let ingress = IngressBuilder::new(ObjectMeta::default())
            .ingress_class_name(Some("nginx".to_string()))
            .add_rule(
                Some("superset.example.com".to_string()),
                "/",
                "simple-node",
                "http",
            )
            .build();

        let spec = ingress.spec.expect("spec");
        assert_eq!(spec.ingress_class_name.as_deref(), Some("nginx"));

        let rules = spec.rules.expect("rules");
        assert_eq!(rules[0].host.as_deref(), Some("superset.example.com"));
        let path = &rules[0].http.as_ref().expect("http rule").paths[0];
        assert_eq!(path.path_type, "Prefix");
        let service = path.backend.service.as_ref().expect("service backend");
        assert_eq!(service.name, "simple-node");
        assert_eq!(
            service.port.as_ref().and_then(|port| port.name.as_deref()),
            Some("http")
        );
    }
}
