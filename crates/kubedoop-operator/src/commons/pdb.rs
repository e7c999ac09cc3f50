use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// This struct is used to configure:
///
/// 1. If PodDisruptionBudgets are created by the operator
/// 2. The allowed number of Pods to be unavailable (`maxUnavailable`)
#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PdbConfig {
    /// Whether a PodDisruptionBudget should be written out for this role.
    /// Disabling this enables you to specify your own - custom - one.
    /// Defaults to true.
    #[serde(default = "default_pdb_enabled")]
    pub enabled: bool,

    /// The number of Pods that are allowed to be down because of voluntary disruptions.
    /// If you don't explicitly set this, the operator will use a sane default based
    /// upon knowledge about the individual product.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<u16>,
}

fn default_pdb_enabled() -> bool {
    true
}

impl Default for PdbConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_unavailable: None,
        }
    }
}

impl PdbConfig {
    /// The `maxUnavailable` to write, falling back to the product default.
    pub fn max_unavailable_or(&self, product_default: u16) -> u16 {
        self.max_unavailable.unwrap_or(product_default)
    }
}

/// Role-level settings that have no role group counterpart.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericRoleConfig {
    #[serde(default)]
    pub pod_disruption_budget: PdbConfig,
}
