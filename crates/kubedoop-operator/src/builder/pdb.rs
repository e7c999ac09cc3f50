use k8s_openapi::{
    api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec},
    apimachinery::pkg::{
        apis::meta::v1::{LabelSelector, ObjectMeta},
        util::intstr::IntOrString,
    },
};
use kube::{Resource, ResourceExt};
use snafu::{ResultExt, Snafu};

use crate::{builder::meta::ObjectMetaBuilder, kvp::Labels};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display("failed to create role selector labels"))]
    RoleSelectorLabels { source: crate::kvp::LabelError },
}

/// This builder is used to construct [`PodDisruptionBudget`]s for all pods of a role.
///
/// The following attributes on a [`PodDisruptionBudget`] are considered mandatory and must be
/// specified before being able to construct the [`PodDisruptionBudget`]:
///
/// 1. [`PodDisruptionBudget::metadata`]
/// 2. [`PodDisruptionBudgetSpec::selector`]
/// 3. [`PodDisruptionBudgetSpec::max_unavailable`]
///
/// The first two are set by [`PodDisruptionBudgetBuilder::new_with_role`].
#[derive(Debug, Default)]
pub struct PodDisruptionBudgetBuilder<ObjectMeta, LabelSelector, MaxUnavailable> {
    metadata: ObjectMeta,
    selector: LabelSelector,
    max_unavailable: MaxUnavailable,
}

impl PodDisruptionBudgetBuilder<(), (), ()> {
    pub fn new() -> Self {
        Self::default()
    }

    /// This method populates [`PodDisruptionBudget::metadata`] and
    /// [`PodDisruptionBudgetSpec::selector`] from the given role (not roleGroup!).
    ///
    /// The budget is named `<owner>-<role>`.
    pub fn new_with_role<T: Resource>(
        owner: &T,
        app_name: &str,
        role: &str,
    ) -> Result<PodDisruptionBudgetBuilder<ObjectMeta, LabelSelector, ()>> {
        let role_selector_labels =
            Labels::role_selector(owner, app_name, role).context(RoleSelectorLabelsSnafu)?;
        let metadata = ObjectMetaBuilder::new()
            .namespace_opt(owner.namespace())
            .name(format!("{}-{}", owner.name_any(), role))
            .with_labels(role_selector_labels.clone())
            .build();

        Ok(PodDisruptionBudgetBuilder {
            metadata,
            selector: LabelSelector {
                match_expressions: None,
                match_labels: Some(role_selector_labels.into()),
            },
            max_unavailable: (),
        })
    }
}

impl PodDisruptionBudgetBuilder<ObjectMeta, LabelSelector, ()> {
    /// Sets the mandatory [`PodDisruptionBudgetSpec::max_unavailable`].
    ///
    /// We intentionally only support fixed numbers, no percentage. `u16` always fits into the
    /// `i32` of [`IntOrString`] and rules out negative numbers.
    pub fn with_max_unavailable(
        self,
        max_unavailable: u16,
    ) -> PodDisruptionBudgetBuilder<ObjectMeta, LabelSelector, u16> {
        PodDisruptionBudgetBuilder {
            metadata: self.metadata,
            selector: self.selector,
            max_unavailable,
        }
    }
}

impl PodDisruptionBudgetBuilder<ObjectMeta, LabelSelector, u16> {
    pub fn build(self) -> PodDisruptionBudget {
        PodDisruptionBudget {
            metadata: self.metadata,
            spec: Some(PodDisruptionBudgetSpec {
                max_unavailable: Some(IntOrString::Int(i32::from(self.max_unavailable))),
                selector: Some(self.selector),
                ..PodDisruptionBudgetSpec::default()
            }),
            status: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::ConfigMap;

    use super::*;

    #[test]
    fn pdb_for_role() {
        let owner = ConfigMap {
            metadata: ObjectMeta {
                name: Some("simple".to_string()),
                namespace: Some("default".to_string()),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        };

        let pdb = PodDisruptionBudgetBuilder::new_with_role(&owner, "superset", "worker")
            .expect("valid labels")
            .with_max_unavailable(1)
            .build();

        assert_eq!(pdb.metadata.name.as_deref(), Some("simple-worker"));
        assert_eq!(pdb.metadata.namespace.as_deref(), Some("default"));

        let spec = pdb.spec.expect("spec");
        assert_eq!(spec.max_unavailable, Some(IntOrString::Int(1)));
        assert_eq!(spec.min_available, None);
        assert_eq!(
            spec.selector.and_then(|selector| selector.match_labels),
            Some(BTreeMap::from([
                (
                    "app.kubernetes.io/component".to_string(),
                    "worker".to_string()
                ),
                (
                    "app.kubernetes.io/instance".to_string(),
                    "simple".to_string()
                ),
                ("app.kubernetes.io/name".to_string(), "superset".to_string()),
            ]))
        );
    }
}
