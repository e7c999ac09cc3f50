//! Labels which are attached to every object an operator creates.
//!
//! Label values are validated against the Kubernetes format, keys are always one of the
//! well-known constants in [`consts`].
use std::{collections::BTreeMap, sync::LazyLock};

use kube::{Resource, ResourceExt};
use regex::Regex;
use snafu::{Snafu, ensure};

pub mod consts;

use self::consts::{K8S_APP_COMPONENT_KEY, K8S_APP_INSTANCE_KEY, K8S_APP_NAME_KEY};

const LABEL_VALUE_MAX_LEN: usize = 63;

static LABEL_VALUE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9A-Z]([a-z0-9A-Z-_.]*[a-z0-9A-Z]+)?$")
        .expect("failed to compile label value regex")
});

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum LabelError {
    #[snafu(display(
        "label value {value:?} exceeds the maximum length - expected 63 characters or less, got {length}"
    ))]
    ValueTooLong { value: String, length: usize },

    #[snafu(display("label value {value:?} violates kubernetes format"))]
    ValueInvalid { value: String },
}

/// A sorted set of validated labels.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Labels(BTreeMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a label after validating the value. An existing label with the same key is
    /// replaced.
    pub fn try_insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<&mut Self, LabelError> {
        let value = value.into();
        validate_value(&value)?;
        self.0.insert(key.into(), value);
        Ok(self)
    }

    pub fn extend(&mut self, other: Self) -> &mut Self {
        self.0.extend(other.0);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Labels> for BTreeMap<String, String> {
    fn from(labels: Labels) -> Self {
        labels.0
    }
}

fn validate_value(value: &str) -> Result<(), LabelError> {
    ensure!(
        value.len() <= LABEL_VALUE_MAX_LEN,
        ValueTooLongSnafu {
            value,
            length: value.len()
        }
    );

    // Empty values are valid label values
    let valid = value.is_empty() || LABEL_VALUE_REGEX.is_match(value);
    ensure!(valid, ValueInvalidSnafu { value });

    Ok(())
}

impl Labels {
    /// The labels selecting all pods of one role, across role groups.
    pub fn role_selector<R: Resource>(
        owner: &R,
        app_name: &str,
        role: &str,
    ) -> Result<Self, LabelError> {
        let mut labels = Self::common(app_name, &owner.name_any())?;
        labels.try_insert(K8S_APP_COMPONENT_KEY, role)?;
        Ok(labels)
    }

    /// `app.kubernetes.io/instance` and `app.kubernetes.io/name`, which identify every object
    /// belonging to one cluster.
    pub fn common(app_name: &str, app_instance: &str) -> Result<Self, LabelError> {
        let mut labels = Self::new();
        labels
            .try_insert(K8S_APP_INSTANCE_KEY, app_instance)?
            .try_insert(K8S_APP_NAME_KEY, app_name)?;
        Ok(labels)
    }
}
