use std::collections::BTreeMap;

use k8s_openapi::{api::core::v1::ResourceRequirements, apimachinery::pkg::api::resource::Quantity};

const CPU: &str = "cpu";
const MEMORY: &str = "memory";

/// Collects CPU and memory requests and limits. Unset values are left out of the result.
#[derive(Clone, Debug, Default)]
pub struct ResourceRequirementsBuilder {
    requests: BTreeMap<String, Quantity>,
    limits: BTreeMap<String, Quantity>,
}

impl ResourceRequirementsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cpu_request_opt(&mut self, request: Option<Quantity>) -> &mut Self {
        insert_opt(&mut self.requests, CPU, request);
        self
    }

    pub fn with_cpu_limit_opt(&mut self, limit: Option<Quantity>) -> &mut Self {
        insert_opt(&mut self.limits, CPU, limit);
        self
    }

    pub fn with_memory_request_opt(&mut self, request: Option<Quantity>) -> &mut Self {
        insert_opt(&mut self.requests, MEMORY, request);
        self
    }

    pub fn with_memory_limit_opt(&mut self, limit: Option<Quantity>) -> &mut Self {
        insert_opt(&mut self.limits, MEMORY, limit);
        self
    }

    pub fn build(&self) -> ResourceRequirements {
        ResourceRequirements {
            requests: (!self.requests.is_empty()).then(|| self.requests.clone()),
            limits: (!self.limits.is_empty()).then(|| self.limits.clone()),
            ..ResourceRequirements::default()
        }
    }
}

fn insert_opt(map: &mut BTreeMap<String, Quantity>, key: &str, value: Option<Quantity>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value);
    }
}
