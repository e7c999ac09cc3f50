//! Resource requests and limits as users specify them in a role or role group config.
//!
//! ```yaml
//! resources:
//!   cpu:
//!     min: 250m
//!     max: "1"
//!   memory:
//!     limit: 1Gi
//! ```
//!
//! `cpu.min` becomes the CPU request, `cpu.max` the CPU limit. Memory is not compressible, so
//! `memory.limit` is used as request and limit alike.
use k8s_openapi::{api::core::v1::ResourceRequirements, apimachinery::pkg::api::resource::Quantity};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{builder::pod::resources::ResourceRequirementsBuilder, config::merge::Atomic};

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuLimits>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryLimits>,
}

impl Atomic for ResourcesSpec {}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuLimits {
    /// The minimal amount of CPU cores that Pods need to run. Equivalent to the `request` for
    /// Pod resource configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Quantity>,

    /// The maximum amount of CPU cores that can be requested by Pods. Equivalent to the `limit`
    /// for Pod resource configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Quantity>,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryLimits {
    /// The maximum amount of memory that should be available to the Pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<Quantity>,
}

impl From<&ResourcesSpec> for ResourceRequirements {
    fn from(spec: &ResourcesSpec) -> Self {
        let mut builder = ResourceRequirementsBuilder::new();

        if let Some(cpu) = &spec.cpu {
            builder
                .with_cpu_request_opt(cpu.min.clone())
                .with_cpu_limit_opt(cpu.max.clone());
        }
        if let Some(memory) = &spec.memory {
            builder
                .with_memory_request_opt(memory.limit.clone())
                .with_memory_limit_opt(memory.limit.clone());
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn translate_min_max_spec() {
        let spec: ResourcesSpec = serde_yaml::from_str(indoc! {"
            cpu:
              min: 250m
              max: '1'
            memory:
              limit: 1Gi
        "})
        .expect("valid yaml");

        let requirements = ResourceRequirements::from(&spec);
        let requests = requirements.requests.expect("requests");
        let limits = requirements.limits.expect("limits");

        assert_eq!(requests.get("cpu"), Some(&Quantity("250m".to_string())));
        assert_eq!(limits.get("cpu"), Some(&Quantity("1".to_string())));
        assert_eq!(requests.get("memory"), Some(&Quantity("1Gi".to_string())));
        assert_eq!(limits.get("memory"), Some(&Quantity("1Gi".to_string())));
    }

    #[test]
    fn empty_spec_has_no_requirements() {
        let requirements = ResourceRequirements::from(&ResourcesSpec::default());
        assert_eq!(requirements.requests, None);
        assert_eq!(requirements.limits, None);
    }
}
