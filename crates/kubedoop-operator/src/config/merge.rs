use std::collections::BTreeMap;

use k8s_openapi::{
    DeepMerge,
    api::core::v1::{Affinity, PodTemplateSpec, Toleration},
    apimachinery::pkg::api::resource::Quantity,
};

/// A type that can be merged with a less specific "default" of itself.
///
/// Implementations fill every field that is unset on `self` from `defaults` and leave set fields
/// untouched. "Unset" is [`None`] for optional fields and empty for collections.
pub trait Merge {
    /// Merge with `defaults`, preferring values from `self` if they are set there.
    fn merge(&mut self, defaults: &Self);
}

/// Merge two values, preferring the ones in `overrides`.
pub fn merge<T: Merge>(mut overrides: T, defaults: &T) -> T {
    overrides.merge(defaults);
    overrides
}

/// A marker for types that are only ever replaced as a whole when merged.
pub trait Atomic: Clone {}

impl Atomic for bool {}
impl Atomic for u8 {}
impl Atomic for u16 {}
impl Atomic for u32 {}
impl Atomic for u64 {}
impl Atomic for i32 {}
impl Atomic for i64 {}
impl Atomic for String {}
impl Atomic for Quantity {}
impl Atomic for Affinity {}
impl Atomic for Toleration {}

impl<T: Atomic> Merge for Option<T> {
    fn merge(&mut self, defaults: &Self) {
        if self.is_none() {
            self.clone_from(defaults);
        }
    }
}

impl<T: Clone> Merge for Vec<T> {
    fn merge(&mut self, defaults: &Self) {
        if self.is_empty() {
            self.clone_from(defaults);
        }
    }
}

impl<K: Clone + Ord, V: Clone> Merge for BTreeMap<K, V> {
    fn merge(&mut self, defaults: &Self) {
        if self.is_empty() {
            self.clone_from(defaults);
        }
    }
}

/// Pod overrides are the one place where the role-level value is layered below the role group
/// value instead of being replaced, since users patch single fields of the template there.
impl Merge for PodTemplateSpec {
    fn merge(&mut self, defaults: &Self) {
        let mut merged = defaults.clone();
        merged.merge_from(self.clone());
        *self = merged;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::{Container, PodSpec};
    use rstest::rstest;

    use super::*;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Config {
        timeout: Option<u32>,
        enabled: Option<bool>,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    }

    impl Merge for Config {
        fn merge(&mut self, defaults: &Self) {
            self.timeout.merge(&defaults.timeout);
            self.enabled.merge(&defaults.enabled);
            self.args.merge(&defaults.args);
            self.env.merge(&defaults.env);
        }
    }

    #[rstest]
    #[case(None, None, None)]
    #[case(Some(5), None, Some(5))]
    #[case(None, Some(7), Some(7))]
    #[case(Some(5), Some(7), Some(5))]
    #[case(Some(0), Some(7), Some(0))]
    fn option_prefers_the_more_specific_value(
        #[case] group: Option<u32>,
        #[case] role: Option<u32>,
        #[case] expected: Option<u32>,
    ) {
        assert_eq!(merge(group, &role), expected);
    }

    #[test]
    fn collections_are_inherited_only_when_empty() {
        let role = Config {
            args: vec!["--role".to_string()],
            env: BTreeMap::from([("A".to_string(), "role".to_string())]),
            ..Config::default()
        };
        let group = Config {
            env: BTreeMap::from([("B".to_string(), "group".to_string())]),
            ..Config::default()
        };

        let merged = merge(group, &role);

        assert_eq!(merged.args, vec!["--role".to_string()]);
        // Maps are replaced wholesale, not combined
        assert_eq!(
            merged.env,
            BTreeMap::from([("B".to_string(), "group".to_string())])
        );
    }

    #[test]
    fn merge_does_not_touch_the_defaults() {
        let role = Config {
            timeout: Some(10),
            enabled: Some(true),
            ..Config::default()
        };
        let snapshot = role.clone();

        let merged = merge(Config::default(), &role);

        assert_eq!(merged.timeout, Some(10));
        assert_eq!(merged.enabled, Some(true));
        assert_eq!(role, snapshot);
    }

    #[test]
    fn layers_apply_from_most_specific() {
        let operator_defaults = Config {
            timeout: Some(1),
            enabled: Some(false),
            ..Config::default()
        };
        let role = Config {
            timeout: Some(2),
            ..Config::default()
        };
        let group = Config {
            enabled: Some(true),
            ..Config::default()
        };

        let merged = merge(group, &merge(role, &operator_defaults));

        assert_eq!(merged.timeout, Some(2));
        assert_eq!(merged.enabled, Some(true));
    }

    #[test]
    fn pod_template_is_layered() {
        let role = PodTemplateSpec {
            spec: Some(PodSpec {
                service_account_name: Some("role-sa".to_string()),
                containers: vec![Container {
                    name: "main".to_string(),
                    ..Container::default()
                }],
                ..PodSpec::default()
            }),
            ..PodTemplateSpec::default()
        };
        let group = PodTemplateSpec {
            spec: Some(PodSpec {
                priority_class_name: Some("high".to_string()),
                ..PodSpec::default()
            }),
            ..PodTemplateSpec::default()
        };

        let merged = merge(group, &role);
        let spec = merged.spec.expect("spec must be set");

        assert_eq!(spec.service_account_name.as_deref(), Some("role-sa"));
        assert_eq!(spec.priority_class_name.as_deref(), Some("high"));
    }
}
